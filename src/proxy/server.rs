use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use kube::{
    api::{Api, ListParams},
    Client,
};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::{error, info};

use crate::crds::DebugSession;

#[derive(Clone)]
pub struct ProxyState {
    pub client: Client,
}

pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route("/attach", get(attach))
        .fallback(health)
        .with_state(state)
}

/// Health probes and port-forward checks land here.
async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
struct AttachQuery {
    #[serde(default)]
    ns: String,
    #[serde(default)]
    pod: String,
    #[serde(default)]
    container: String,
}

async fn attach(
    ws: WebSocketUpgrade,
    Query(query): Query<AttachQuery>,
    headers: HeaderMap,
    State(state): State<ProxyState>,
) -> Response {
    if query.ns.is_empty() || query.pod.is_empty() || query.container.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing required query parameters").into_response();
    }

    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let Some(token) = bearer_token(auth_header) else {
        return (StatusCode::UNAUTHORIZED, "Invalid Authorization header").into_response();
    };
    let token = token.to_string();

    let session = match find_session(&state.client, &query.container).await {
        Ok(Some(session)) => session,
        Ok(None) => return (StatusCode::NOT_FOUND, "Debug session not found").into_response(),
        Err(err) => {
            error!("Error listing debug sessions: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
        }
    };

    if !authorized(&session, &token) {
        return (
            StatusCode::UNAUTHORIZED,
            "Unauthorized: Invalid or expired token",
        )
            .into_response();
    }

    info!(
        "Authorized attach to {}/{} container {}",
        query.ns, query.pod, query.container
    );
    let client = state.client.clone();
    ws.on_upgrade(move |socket| {
        super::stream::bridge(socket, client, query.ns, query.pod, query.container)
    })
}

/// Parse `Authorization: Bearer <token>`; the scheme is case-insensitive.
fn bearer_token(header: Option<&str>) -> Option<&str> {
    let parts: Vec<&str> = header?.split(' ').collect();
    if parts.len() != 2 || !parts[0].eq_ignore_ascii_case("bearer") || parts[1].is_empty() {
        return None;
    }
    Some(parts[1])
}

/// The container name encodes the session identity as `debugger-<UID>`.
fn session_uid(container: &str) -> Option<&str> {
    container
        .strip_prefix("debugger-")
        .filter(|uid| !uid.is_empty())
}

async fn find_session(
    client: &Client,
    container: &str,
) -> Result<Option<DebugSession>, kube::Error> {
    let Some(uid) = session_uid(container) else {
        return Ok(None);
    };

    let sessions: Api<DebugSession> = Api::all(client.clone());
    let list = sessions.list(&ListParams::default()).await?;
    Ok(list.items.into_iter().find(|s| s.session_uid() == uid))
}

/// Attach is granted only to a session that is ready for it and presents the
/// exact one-time token.
fn authorized(session: &DebugSession, presented: &str) -> bool {
    let Some(status) = session.status.as_ref() else {
        return false;
    };
    if !status.ready_for_attach {
        return false;
    }
    token_matches(&status.one_time_token, presented)
}

/// Constant-time comparison; the check must not leak the mismatch position.
fn token_matches(expected: &str, presented: &str) -> bool {
    !expected.is_empty() && bool::from(expected.as_bytes().ct_eq(presented.as_bytes()))
}
