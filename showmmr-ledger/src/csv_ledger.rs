use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use csv::{ReaderBuilder, StringRecord, Terminator, Trim, WriterBuilder};
use showmmr_core::{format_local, MatchRecord, SchemaVariant};
use tracing::debug;

use crate::{LedgerError, LedgerRepository, LedgerResult};

/// CSV file ledger, one row per match, most recent first.
#[derive(Clone, Debug)]
pub struct CsvLedger {
    path: PathBuf,
    schema: SchemaVariant,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>, schema: SchemaVariant) -> Self {
        Self {
            path: path.into(),
            schema,
        }
    }

    /// Ledger stored under `dir` using the conventional per-user file name.
    pub fn for_user(dir: impl AsRef<Path>, user: &str, schema: SchemaVariant) -> Self {
        let file_name = match schema {
            SchemaVariant::Minimal => format!("mmr_hist_{user}.csv"),
            SchemaVariant::Rich => format!("mmr_hist_v2_{user}.csv"),
        };
        Self::new(dir.as_ref().join(file_name), schema)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Schema used when writing.
    pub fn schema(&self) -> SchemaVariant {
        self.schema
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn parse_row(&self, detected: SchemaVariant, row: &StringRecord) -> LedgerResult<MatchRecord> {
        let line = row.position().map(|pos| pos.line()).unwrap_or_default();
        let reader = RowReader {
            path: &self.path,
            row,
            line,
        };
        let record = match detected {
            SchemaVariant::Minimal => MatchRecord::new(
                reader.parse(2, "MatchID")?,
                reader.parse(1, "Unix time")?,
                reader.parse(3, "Start MMR")?,
                reader.parse(4, "Rank Change")?,
            ),
            SchemaVariant::Rich => MatchRecord::new(
                reader.parse(2, "MatchID")?,
                reader.parse(1, "Unix time")?,
                reader.parse(5, "Start MMR")?,
                reader.parse(6, "Rank Change")?,
            )
            .with_solo_rank(reader.flag(3, "Solo Queue")?)
            .with_hero(reader.parse(4, "HeroID")?),
        };
        Ok(record)
    }

    fn write_rows(&self, target: &Path, records: &[MatchRecord]) -> LedgerResult<()> {
        let file = File::create(target)?;
        let mut writer = WriterBuilder::new()
            .terminator(Terminator::CRLF)
            .from_writer(file);
        writer.write_record(self.schema.header())?;
        for record in records {
            let date = format_local(record.start_time);
            let unix = record.start_time.to_string();
            let match_id = record.match_id.to_string();
            let start = record.previous_rank.to_string();
            let change = record.rank_change.to_string();
            match self.schema {
                SchemaVariant::Minimal => {
                    writer.write_record([
                        date.as_str(),
                        unix.as_str(),
                        match_id.as_str(),
                        start.as_str(),
                        change.as_str(),
                    ])?;
                }
                SchemaVariant::Rich => {
                    let solo = if record.solo_rank { "True" } else { "False" };
                    let hero = format!("{:03}", record.hero_id);
                    writer.write_record([
                        date.as_str(),
                        unix.as_str(),
                        match_id.as_str(),
                        solo,
                        hero.as_str(),
                        start.as_str(),
                        change.as_str(),
                    ])?;
                }
            }
        }
        writer.flush()?;
        Ok(())
    }
}

impl LedgerRepository for CsvLedger {
    fn load(&self) -> LedgerResult<Vec<MatchRecord>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "ledger not found, starting empty");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(file);
        let header = reader.headers()?.clone();
        if header.iter().all(str::is_empty) {
            return Ok(Vec::new());
        }
        let detected =
            SchemaVariant::detect(header.iter()).ok_or_else(|| LedgerError::UnknownHeader {
                path: self.path.clone(),
                header: header.iter().collect::<Vec<_>>().join(","),
            })?;

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row.map_err(|err| self.malformed_from_csv(err))?;
            if row.iter().all(str::is_empty) {
                continue;
            }
            records.push(self.parse_row(detected, &row)?);
        }
        debug!(
            path = %self.path.display(),
            schema = %detected,
            rows = records.len(),
            "loaded ledger"
        );
        Ok(records)
    }

    fn replace(&self, records: &[MatchRecord]) -> LedgerResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let staging = self.staging_path();
        if let Err(err) = self.write_rows(&staging, records) {
            let _ = fs::remove_file(&staging);
            return Err(err);
        }
        fs::rename(&staging, &self.path)?;
        debug!(path = %self.path.display(), rows = records.len(), "ledger written");
        Ok(())
    }
}

impl CsvLedger {
    fn malformed_from_csv(&self, err: csv::Error) -> LedgerError {
        let line = err.position().map(|pos| pos.line()).unwrap_or_default();
        match err.kind() {
            csv::ErrorKind::Io(_) => LedgerError::Storage(err.to_string()),
            _ => LedgerError::Malformed {
                path: self.path.clone(),
                line,
                reason: err.to_string(),
            },
        }
    }
}

struct RowReader<'a> {
    path: &'a Path,
    row: &'a StringRecord,
    line: u64,
}

impl RowReader<'_> {
    fn raw(&self, col: usize, label: &str) -> LedgerResult<&str> {
        self.row
            .get(col)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| self.malformed(format!("missing {label} column")))
    }

    fn parse<T>(&self, col: usize, label: &str) -> LedgerResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.raw(col, label)?;
        raw.parse()
            .map_err(|err| self.malformed(format!("invalid {label} '{raw}': {err}")))
    }

    fn flag(&self, col: usize, label: &str) -> LedgerResult<bool> {
        let raw = self.raw(col, label)?;
        if raw.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if raw.eq_ignore_ascii_case("false") {
            Ok(false)
        } else {
            Err(self.malformed(format!("invalid {label} '{raw}'")))
        }
    }

    fn malformed(&self, reason: String) -> LedgerError {
        LedgerError::Malformed {
            path: self.path.to_path_buf(),
            line: self.line,
            reason,
        }
    }
}
