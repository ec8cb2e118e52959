//! JSON-over-HTTP client for the match-history gateway.
//!
//! The gateway is request/response, the session is event driven: a worker
//! task owns the HTTP client, runs the login handshake and answers page
//! commands by pushing [`SessionEvent`]s back to the session.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use showmmr_core::MatchRecord;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{sleep, timeout},
};
use tracing::{debug, info, warn};

use crate::{
    CellIdCache, MatchPage, PageRequest, RemoteMatchService, SessionEvent, SyncError, SyncResult,
    TokenCache,
};

const EVENT_BUFFER: usize = 16;
const BODY_LOG_LIMIT: usize = 256;
const WORKER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Connection settings for [`HttpMatchService`].
#[derive(Clone, Debug)]
pub struct HttpSessionConfig {
    pub base_url: String,
    pub app_id: u32,
    pub request_timeout: Duration,
    pub handshake_delay: Duration,
    pub connect_attempts: u32,
    pub connect_backoff: Duration,
}

impl HttpSessionConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            app_id: 570,
            request_timeout: Duration::from_secs(30),
            handshake_delay: Duration::from_secs(5),
            connect_attempts: 5,
            connect_backoff: Duration::from_secs(5),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

/// Account name plus an optional password. Without a password the cached
/// refresh token is the only way in.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug)]
enum Command {
    FetchPage(PageRequest),
    Disconnect,
}

/// [`RemoteMatchService`] backed by the HTTP gateway.
pub struct HttpMatchService {
    events: mpsc::Receiver<SessionEvent>,
    commands: mpsc::Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl HttpMatchService {
    /// Spawn the session worker. Login happens in the background; its result
    /// arrives as the first events.
    pub fn connect(
        config: HttpSessionConfig,
        credentials: Credentials,
        tokens: TokenCache,
        cells: CellIdCache,
    ) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("showmmr/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (command_tx, command_rx) = mpsc::channel(EVENT_BUFFER);
        let worker = Worker {
            client,
            config,
            credentials,
            tokens,
            cells,
            events: event_tx,
            commands: command_rx,
            access_token: None,
        };
        let handle = tokio::spawn(worker.run());
        Ok(Self {
            events: event_rx,
            commands: command_tx,
            worker: Some(handle),
        })
    }
}

#[async_trait]
impl RemoteMatchService for HttpMatchService {
    async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    async fn request_page(&mut self, request: PageRequest) -> SyncResult<()> {
        self.commands
            .send(Command::FetchPage(request))
            .await
            .map_err(|_| SyncError::SessionClosed)
    }

    async fn disconnect(&mut self) {
        let _ = self.commands.send(Command::Disconnect).await;
        self.events.close();
        if let Some(mut handle) = self.worker.take() {
            if timeout(WORKER_SHUTDOWN_GRACE, &mut handle).await.is_err() {
                warn!("session worker did not stop in time, aborting");
                handle.abort();
            }
        }
    }
}

impl Drop for HttpMatchService {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            handle.abort();
        }
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
    cell_id: u32,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    account_id: u32,
    #[serde(default)]
    account_name: String,
    refresh_token: String,
    access_token: String,
    #[serde(default)]
    cell_id: u32,
}

#[derive(Serialize)]
struct GamesPlayedRequest {
    app_id: u32,
}

#[derive(Debug, Deserialize)]
struct HelloResponse {
    version: u32,
}

#[derive(Debug, Deserialize)]
struct MatchesResponse {
    #[serde(default)]
    matches: Vec<MatchRecord>,
}

/// How a login attempt went wrong.
#[derive(Debug)]
enum LoginFailure {
    /// The gateway answered and said no. Not retried.
    Rejected(String),
    /// The gateway could not be reached or failed internally.
    Unavailable(String),
}

struct Worker {
    client: Client,
    config: HttpSessionConfig,
    credentials: Credentials,
    tokens: TokenCache,
    cells: CellIdCache,
    events: mpsc::Sender<SessionEvent>,
    commands: mpsc::Receiver<Command>,
    access_token: Option<String>,
}

impl Worker {
    async fn run(mut self) {
        let login = match self.log_on().await {
            Ok(login) => login,
            Err(LoginFailure::Rejected(reason)) => {
                self.emit(SessionEvent::Connected).await;
                self.emit(SessionEvent::LogOnFailed { reason }).await;
                return;
            }
            Err(LoginFailure::Unavailable(reason)) => {
                self.emit(SessionEvent::Disconnected { reason }).await;
                return;
            }
        };

        self.emit(SessionEvent::Connected).await;
        info!(
            account_id = login.account_id,
            account_name = %login.account_name,
            "session established"
        );
        self.remember(&login);
        self.access_token = Some(login.access_token);
        if !self
            .emit(SessionEvent::LoggedOn {
                account_id: login.account_id,
            })
            .await
        {
            return;
        }

        let version = match self.handshake().await {
            Ok(Some(version)) => version,
            Ok(None) => return,
            Err(reason) => {
                self.emit(SessionEvent::Disconnected { reason }).await;
                return;
            }
        };
        if !self.emit(SessionEvent::Welcome { version }).await {
            return;
        }

        while let Some(command) = self.commands.recv().await {
            match command {
                Command::FetchPage(request) => match self.fetch_page(&request).await {
                    Ok(page) => {
                        if !self.emit(SessionEvent::MatchHistory(page)).await {
                            return;
                        }
                    }
                    Err(reason) => {
                        self.emit(SessionEvent::Disconnected { reason }).await;
                        return;
                    }
                },
                Command::Disconnect => {
                    debug!("session worker stopping");
                    return;
                }
            }
        }
    }

    /// Returns `false` once nobody is listening.
    async fn emit(&self, event: SessionEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    async fn log_on(&mut self) -> Result<LoginResponse, LoginFailure> {
        let cached = match self.tokens.load() {
            Ok(token) => token,
            Err(err) => {
                warn!(error = %err, "ignoring unreadable token cache");
                None
            }
        };
        let has_password = self.credentials.password.is_some();

        if let Some(token) = cached {
            debug!(user = %self.credentials.username, "logging in with cached token");
            match self.log_on_with_retry(Some(&token)).await {
                Err(LoginFailure::Rejected(reason)) if has_password => {
                    warn!(%reason, "cached token rejected, falling back to password");
                    if let Err(err) = self.tokens.invalidate() {
                        warn!(error = %err, "failed to remove rejected token");
                    }
                }
                result => return result,
            }
        }

        if !has_password {
            return Err(LoginFailure::Rejected(format!(
                "no cached token or password for {}",
                self.credentials.username
            )));
        }
        self.log_on_with_retry(None).await
    }

    async fn log_on_with_retry(
        &self,
        refresh_token: Option<&str>,
    ) -> Result<LoginResponse, LoginFailure> {
        let attempts = self.config.connect_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match self.log_on_once(refresh_token).await {
                Err(LoginFailure::Unavailable(reason)) => {
                    warn!(attempt, attempts, %reason, "unable to reach gateway");
                    last_error = reason;
                    if attempt < attempts {
                        sleep(self.config.connect_backoff).await;
                    }
                }
                result => return result,
            }
        }
        Err(LoginFailure::Unavailable(format!(
            "gave up after {attempts} attempts: {last_error}"
        )))
    }

    async fn log_on_once(&self, refresh_token: Option<&str>) -> Result<LoginResponse, LoginFailure> {
        let body = LoginRequest {
            username: &self.credentials.username,
            password: if refresh_token.is_some() {
                None
            } else {
                self.credentials.password.as_deref()
            },
            refresh_token,
            cell_id: self.cells.load(),
        };
        let response = self
            .client
            .post(self.config.endpoint("v1/session/login"))
            .json(&body)
            .send()
            .await
            .map_err(|err| LoginFailure::Unavailable(err.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| LoginFailure::Unavailable(err.to_string()))?;
        if status.is_server_error() {
            return Err(LoginFailure::Unavailable(format!(
                "login returned {status}: {}",
                truncate(&text, BODY_LOG_LIMIT)
            )));
        }
        if !status.is_success() {
            return Err(LoginFailure::Rejected(format!(
                "login returned {status}: {}",
                truncate(&text, BODY_LOG_LIMIT)
            )));
        }
        serde_json::from_str(&text).map_err(|err| {
            debug!(body = %truncate(&text, BODY_LOG_LIMIT), "unparseable login response");
            LoginFailure::Rejected(format!("invalid login response: {err}"))
        })
    }

    fn remember(&self, login: &LoginResponse) {
        if self.credentials.password.is_some() || self.tokens.exists() {
            if let Err(err) = self.tokens.store(&login.refresh_token) {
                warn!(error = %err, "failed to cache refresh token");
            }
        }
        if let Err(err) = self.cells.store(login.cell_id) {
            warn!(error = %err, "failed to cache cell id");
        }
    }

    /// Announce the game, wait out the handshake delay, then say hello.
    /// `Ok(None)` means the session was closed while waiting.
    async fn handshake(&mut self) -> Result<Option<u32>, String> {
        let body = GamesPlayedRequest {
            app_id: self.config.app_id,
        };
        let response = self
            .authorized(self.client.post(self.config.endpoint("v1/session/games-played")))
            .json(&body)
            .send()
            .await
            .map_err(|err| err.to_string())?;
        expect_success("games-played", response).await?;
        debug!(app_id = self.config.app_id, "announced game session");

        if !self.config.handshake_delay.is_zero() {
            let delay = sleep(self.config.handshake_delay);
            tokio::pin!(delay);
            loop {
                tokio::select! {
                    _ = &mut delay => break,
                    command = self.commands.recv() => match command {
                        None | Some(Command::Disconnect) => return Ok(None),
                        Some(Command::FetchPage(_)) => {
                            debug!("dropping page request received before welcome");
                        }
                    },
                }
            }
        }

        let response = self
            .authorized(self.client.post(self.config.endpoint("v1/gc/hello")))
            .send()
            .await
            .map_err(|err| err.to_string())?;
        let text = expect_success("hello", response).await?;
        let hello: HelloResponse =
            serde_json::from_str(&text).map_err(|err| format!("invalid hello response: {err}"))?;
        Ok(Some(hello.version))
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<MatchPage, String> {
        let url = self
            .config
            .endpoint(&format!("v1/players/{}/matches", request.account_id));
        let mut query = vec![(
            "matches_requested",
            request.matches_requested.to_string(),
        )];
        if let Some(cursor) = request.start_at_match_id {
            query.push(("start_at_match_id", cursor.to_string()));
        }
        debug!(%url, ?query, "requesting page");
        let response = self
            .authorized(self.client.get(&url))
            .query(&query)
            .send()
            .await
            .map_err(|err| err.to_string())?;
        let text = expect_success("match history", response).await?;
        let parsed: MatchesResponse = serde_json::from_str(&text).map_err(|err| {
            debug!(body = %truncate(&text, BODY_LOG_LIMIT), "unparseable match history");
            format!("invalid match history response: {err}")
        })?;
        Ok(MatchPage::new(parsed.matches))
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

async fn expect_success(what: &str, response: reqwest::Response) -> Result<String, String> {
    let status = response.status();
    let text = response.text().await.map_err(|err| err.to_string())?;
    if status.is_success() {
        return Ok(text);
    }
    let reason = if status == StatusCode::UNAUTHORIZED {
        format!("{what} unauthorized")
    } else {
        format!("{what} returned {status}: {}", truncate(&text, BODY_LOG_LIMIT))
    };
    Err(reason)
}

fn truncate(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slashes() {
        let config = HttpSessionConfig::new("http://localhost:9000/");
        assert_eq!(
            config.endpoint("/v1/gc/hello"),
            "http://localhost:9000/v1/gc/hello"
        );
        assert_eq!(
            HttpSessionConfig::new("http://gw").endpoint("v1/session/login"),
            "http://gw/v1/session/login"
        );
    }

    #[test]
    fn login_body_omits_absent_secrets() {
        let body = LoginRequest {
            username: "alice",
            password: None,
            refresh_token: Some("tok"),
            cell_id: 7,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["refresh_token"], "tok");
        assert_eq!(value["cell_id"], 7);
        assert!(value.get("password").is_none());
    }

    #[test]
    fn match_history_defaults_missing_fields() {
        let page: MatchesResponse = serde_json::from_str(
            r#"{"matches":[{"match_id":9,"start_time":1700000000,"previous_rank":3000,"rank_change":-25}]}"#,
        )
        .unwrap();
        assert_eq!(page.matches.len(), 1);
        assert!(page.matches[0].solo_rank);
        assert_eq!(page.matches[0].hero_id, 0);

        let empty: MatchesResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.matches.is_empty());
    }

    #[test]
    fn login_response_requires_both_tokens() {
        let login: LoginResponse = serde_json::from_str(
            r#"{"account_id":4242,"account_name":"a","refresh_token":"r","access_token":"x","cell_id":3}"#,
        )
        .unwrap();
        assert_eq!(login.account_id, 4242);
        assert_eq!(login.account_name, "a");
        assert_eq!(login.refresh_token, "r");
        assert_eq!(login.access_token, "x");
        assert_eq!(login.cell_id, 3);

        let minimal: LoginResponse =
            serde_json::from_str(r#"{"account_id":1,"refresh_token":"r","access_token":"x"}"#)
                .unwrap();
        assert!(minimal.account_name.is_empty());
        assert_eq!(minimal.cell_id, 0);

        let err = serde_json::from_str::<LoginResponse>(
            r#"{"account_id":4242,"account_name":"a","refresh_token":"r","cell_id":3}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("access_token"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("ééé", 3), "é...");
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::new("alice", Some("hunter2".into()));
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }
}
