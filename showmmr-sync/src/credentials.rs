use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::SyncResult;

/// On-disk refresh token for one account name.
#[derive(Clone, Debug)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Cached token, or `None` when the file is missing or blank.
    pub fn load(&self) -> SyncResult<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn store(&self, token: &str) -> SyncResult<()> {
        ensure_parent(&self.path)?;
        fs::write(&self.path, token)?;
        debug!(path = %self.path.display(), "stored refresh token");
        Ok(())
    }

    /// Forget the cached token so the next run logs in with a password.
    pub fn invalidate(&self) -> SyncResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "removed refresh token");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Last routing cell id handed out by the service.
#[derive(Clone, Debug)]
pub struct CellIdCache {
    path: PathBuf,
}

impl CellIdCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached cell id; 0 when missing or unreadable.
    pub fn load(&self) -> u32 {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %err, "unable to read cell id");
                }
                return 0;
            }
        };
        match contents.trim().parse() {
            Ok(cell_id) => cell_id,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "ignoring invalid cell id");
                0
            }
        }
    }

    pub fn store(&self, cell_id: u32) -> SyncResult<()> {
        ensure_parent(&self.path)?;
        fs::write(&self.path, cell_id.to_string())?;
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn token_lifecycle() {
        let dir = tempdir().unwrap();
        let cache = TokenCache::new(dir.path().join("tokens").join("alice.txt"));
        assert!(!cache.exists());
        assert_eq!(cache.load().unwrap(), None);

        cache.store("refresh-abc").unwrap();
        assert!(cache.exists());
        assert_eq!(cache.load().unwrap().as_deref(), Some("refresh-abc"));

        cache.invalidate().unwrap();
        assert!(!cache.exists());
        cache.invalidate().unwrap();
    }

    #[test]
    fn blank_token_counts_as_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bob.txt");
        fs::write(&path, "  \r\n").unwrap();
        assert_eq!(TokenCache::new(path).load().unwrap(), None);
    }

    #[test]
    fn cell_id_falls_back_to_zero() {
        let dir = tempdir().unwrap();
        let cache = CellIdCache::new(dir.path().join("cellid.txt"));
        assert_eq!(cache.load(), 0);

        cache.store(42).unwrap();
        assert_eq!(cache.load(), 42);

        fs::write(cache.path(), "not a number").unwrap();
        assert_eq!(cache.load(), 0);
    }
}
