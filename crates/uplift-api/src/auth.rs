//! Bearer auth for both route groups.
//!
//! Agent routes carry a session token minted at spawn time; the verified
//! agent name is attached to the request and is the only identity handlers
//! trust. Management routes carry the configured API key.

use crate::error::error_response;
use crate::server::ApiState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

/// The authenticated agent, inserted by [`agent_auth`].
#[derive(Debug, Clone)]
pub struct AgentIdentity(pub String);

fn bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Session-token auth for the agent surface.
pub async fn agent_auth(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request) else {
        return error_response(StatusCode::UNAUTHORIZED, "missing session token");
    };
    match state.kernel.sessions.verify(token) {
        Ok(agent) => {
            request.extensions_mut().insert(AgentIdentity(agent));
            next.run(request).await
        }
        Err(_) => error_response(StatusCode::UNAUTHORIZED, "invalid session token"),
    }
}

/// API-key auth for the management surface. With no key configured the
/// surface is open; the daemon binds to localhost by default.
pub async fn management_auth(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.kernel.config.api_key.as_deref() else {
        return next.run(request).await;
    };
    let Some(presented) = bearer_token(&request) else {
        return error_response(StatusCode::UNAUTHORIZED, "missing API key");
    };
    let matches = presented.len() == expected.len()
        && presented.as_bytes().ct_eq(expected.as_bytes()).into();
    if matches {
        next.run(request).await
    } else {
        tracing::warn!("Management request with wrong API key");
        error_response(StatusCode::FORBIDDEN, "invalid API key")
    }
}
