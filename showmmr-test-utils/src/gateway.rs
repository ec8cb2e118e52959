use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::{anyhow, Result};
use hyper::{
    service::{make_service_fn, service_fn},
    Body, Method, Request, Response, Server, StatusCode,
};
use serde::Deserialize;
use serde_json::{json, Value};
use showmmr_core::MatchId;
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{debug, warn};

use crate::MatchHistory;

/// Largest page the mock hands out, mirroring the real service.
const MAX_PAGE: usize = 20;

/// Behaviour of a [`MockGateway`].
#[derive(Clone, Debug)]
pub struct MockGatewayConfig {
    pub history: MatchHistory,
    pub account_id: u32,
    pub account_name: String,
    /// Password that logs in; any non-empty password when `None`.
    pub password: Option<String>,
    /// Answer every login with 401.
    pub reject_logins: bool,
    /// Answer page requests with 503 once this many pages were served.
    pub fail_after_pages: Option<usize>,
    pub cell_id: u32,
    pub hello_version: u32,
}

impl MockGatewayConfig {
    pub fn new(history: MatchHistory) -> Self {
        Self {
            history,
            account_id: 4242,
            account_name: "mock-player".into(),
            password: None,
            reject_logins: false,
            fail_after_pages: None,
            cell_id: 3,
            hello_version: 1,
        }
    }
}

/// One `GET /v1/players/{id}/matches` seen by the gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageQuery {
    pub account_id: u32,
    pub matches_requested: u32,
    pub start_at_match_id: Option<MatchId>,
}

/// One `POST /v1/session/login` seen by the gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginAttempt {
    pub username: String,
    pub with_password: bool,
    pub with_refresh_token: bool,
    pub cell_id: u32,
    pub accepted: bool,
}

#[derive(Default)]
struct Recorded {
    logins: Vec<LoginAttempt>,
    pages: Vec<PageQuery>,
    games_played: usize,
    hellos: usize,
}

struct GatewayState {
    config: MockGatewayConfig,
    recorded: Mutex<Recorded>,
}

impl GatewayState {
    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.recorded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// In-process HTTP stand-in for the match-history gateway.
pub struct MockGateway {
    addr: SocketAddr,
    state: Arc<GatewayState>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockGateway {
    /// Bind to an ephemeral localhost port and start serving.
    pub async fn start(config: MockGatewayConfig) -> Result<Self> {
        let state = Arc::new(GatewayState {
            config,
            recorded: Mutex::new(Recorded::default()),
        });
        let service_state = Arc::clone(&state);
        let make_service = make_service_fn(move |_| {
            let state = Arc::clone(&service_state);
            async move {
                Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                    let state = Arc::clone(&state);
                    async move { Ok::<_, Infallible>(route(&state, req).await) }
                }))
            }
        });

        let bind: SocketAddr = ([127, 0, 0, 1], 0).into();
        let server = Server::try_bind(&bind)
            .map_err(|err| anyhow!("failed to bind mock gateway: {err}"))?
            .serve(make_service);
        let addr = server.local_addr();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });
        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                warn!(error = %err, "mock gateway failed");
            }
        });
        debug!(%addr, "mock gateway listening");

        Ok(Self {
            addr,
            state,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn page_queries(&self) -> Vec<PageQuery> {
        self.state.recorded().pages.clone()
    }

    pub fn logins(&self) -> Vec<LoginAttempt> {
        self.state.recorded().logins.clone()
    }

    pub fn games_played(&self) -> usize {
        self.state.recorded().games_played
    }

    pub fn hellos(&self) -> usize {
        self.state.recorded().hellos
    }

    /// Stop accepting connections and wait for the server task.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

#[derive(Deserialize)]
struct LoginBody {
    username: String,
    password: Option<String>,
    refresh_token: Option<String>,
    #[serde(default)]
    cell_id: u32,
}

#[derive(Deserialize)]
struct PageParams {
    matches_requested: u32,
    start_at_match_id: Option<MatchId>,
}

async fn route(state: &GatewayState, req: Request<Body>) -> Response<Body> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or_default().to_string();
    let authorized = bearer_matches(&req, state.config.account_id);
    debug!(%method, %path, %query, "mock gateway request");

    match (method, path.as_str()) {
        (Method::POST, "/v1/session/login") => match hyper::body::to_bytes(req.into_body()).await {
            Ok(bytes) => login(state, &bytes),
            Err(err) => reply(StatusCode::BAD_REQUEST, json!({ "error": err.to_string() })),
        },
        (Method::POST, "/v1/session/games-played") => {
            if !authorized {
                return unauthorized();
            }
            state.recorded().games_played += 1;
            reply(StatusCode::OK, json!({}))
        }
        (Method::POST, "/v1/gc/hello") => {
            if !authorized {
                return unauthorized();
            }
            state.recorded().hellos += 1;
            reply(
                StatusCode::OK,
                json!({ "version": state.config.hello_version }),
            )
        }
        (Method::GET, path) => match match_history_account(path) {
            Some(account_id) if authorized => matches(state, account_id, &query),
            Some(_) => unauthorized(),
            None => not_found(),
        },
        _ => not_found(),
    }
}

fn login(state: &GatewayState, bytes: &[u8]) -> Response<Body> {
    let body: LoginBody = match serde_json::from_slice(bytes) {
        Ok(body) => body,
        Err(err) => return reply(StatusCode::BAD_REQUEST, json!({ "error": err.to_string() })),
    };
    let config = &state.config;
    let issued_token = refresh_token_for(&body.username);
    let accepted = !config.reject_logins
        && match (&body.refresh_token, &body.password) {
            (Some(token), _) => *token == issued_token,
            (None, Some(password)) => match &config.password {
                Some(expected) => password == expected,
                None => !password.is_empty(),
            },
            (None, None) => false,
        };
    state.recorded().logins.push(LoginAttempt {
        username: body.username.clone(),
        with_password: body.password.is_some(),
        with_refresh_token: body.refresh_token.is_some(),
        cell_id: body.cell_id,
        accepted,
    });
    if !accepted {
        return reply(
            StatusCode::UNAUTHORIZED,
            json!({ "error": "invalid credentials" }),
        );
    }
    reply(
        StatusCode::OK,
        json!({
            "account_id": config.account_id,
            "account_name": config.account_name,
            "refresh_token": issued_token,
            "access_token": access_token_for(config.account_id),
            "cell_id": config.cell_id,
        }),
    )
}

fn matches(state: &GatewayState, account_id: u32, query: &str) -> Response<Body> {
    let params: PageParams = match serde_urlencoded::from_str(query) {
        Ok(params) => params,
        Err(err) => return reply(StatusCode::BAD_REQUEST, json!({ "error": err.to_string() })),
    };
    let mut recorded = state.recorded();
    if let Some(limit) = state.config.fail_after_pages {
        if recorded.pages.len() >= limit {
            return reply(
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": "match history unavailable" }),
            );
        }
    }
    recorded.pages.push(PageQuery {
        account_id,
        matches_requested: params.matches_requested,
        start_at_match_id: params.start_at_match_id,
    });
    drop(recorded);

    if account_id != state.config.account_id {
        return reply(StatusCode::OK, json!({ "matches": [] }));
    }
    let requested = (params.matches_requested as usize).min(MAX_PAGE);
    let page = state.config.history.page(requested, params.start_at_match_id);
    reply(StatusCode::OK, json!({ "matches": page }))
}

fn match_history_account(path: &str) -> Option<u32> {
    path.strip_prefix("/v1/players/")?
        .strip_suffix("/matches")?
        .parse()
        .ok()
}

fn bearer_matches(req: &Request<Body>, account_id: u32) -> bool {
    let expected = format!("Bearer {}", access_token_for(account_id));
    req.headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == expected)
}

fn refresh_token_for(username: &str) -> String {
    format!("refresh-{username}")
}

fn access_token_for(account_id: u32) -> String {
    format!("access-{account_id}")
}

fn unauthorized() -> Response<Body> {
    reply(StatusCode::UNAUTHORIZED, json!({ "error": "missing or invalid token" }))
}

fn not_found() -> Response<Body> {
    reply(StatusCode::NOT_FOUND, json!({ "error": "no such route" }))
}

fn reply(status: StatusCode, body: Value) -> Response<Body> {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_match_history_paths() {
        assert_eq!(match_history_account("/v1/players/42/matches"), Some(42));
        assert_eq!(match_history_account("/v1/players/abc/matches"), None);
        assert_eq!(match_history_account("/v1/players/42"), None);
    }
}
