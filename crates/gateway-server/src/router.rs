//! The `/mcp` HTTP surface: POST carries one client-initiated JSON-RPC
//! message (a request, or a reply to a server-initiated sampling request),
//! GET opens the SSE stream the server pushes requests and notifications on,
//! DELETE ends the session. Bearer verification, rate limiting,
//! protocol-version negotiation and the request-size cap are wired in front
//! of this router by the caller, not by this module.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use futures::stream;
use gateway_core::jsonrpc::{JsonRpcError, JsonRpcMessage, JsonRpcResponse, RequestId};
use gateway_transport::{AuthenticatedCaller, SessionTable};

use crate::instance::{McpInstance, UpstreamCredentials};
use crate::ports::{LogPort, PromptRegistry, ResourceRegistry, ToolRegistry};
use crate::sampling::SamplingContinuation;

pub const SESSION_ID_HEADER: &str = "mcp-session-id";

#[derive(Clone)]
pub struct McpRouterState {
    pub sessions: Arc<SessionTable<McpInstance>>,
    pub tools: Arc<dyn ToolRegistry>,
    pub prompts: Arc<dyn PromptRegistry>,
    pub resources: Arc<dyn ResourceRegistry>,
    pub log: Arc<dyn LogPort>,
    pub continuations: HashMap<String, Arc<dyn SamplingContinuation>>,
}

pub fn router(state: McpRouterState) -> Router {
    Router::new()
        .route("/mcp", post(handle_post))
        .route("/mcp", get(handle_get))
        .route("/mcp", delete(handle_delete))
        .with_state(state)
}

fn session_id_from(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_ID_HEADER).and_then(|v| v.to_str().ok())
}

fn rpc_error(status: StatusCode, code: i64, message: &str) -> Response {
    (status, Json(JsonRpcResponse::error(None, JsonRpcError::new(code, message)))).into_response()
}

fn with_session_header(mut response: Response, session_id: &str) -> Response {
    if let Ok(value) = session_id.parse() {
        response.headers_mut().insert(SESSION_ID_HEADER, value);
    }
    response
}

async fn handle_post(
    State(state): State<McpRouterState>,
    Extension(caller): Extension<AuthenticatedCaller>,
    headers: HeaderMap,
    Json(message): Json<JsonRpcMessage>,
) -> Response {
    let session_id = session_id_from(&headers);

    let session = match state
        .sessions
        .bind_or_create(session_id, |id| {
            McpInstance::new(
                id.to_string(),
                state.tools.clone(),
                state.prompts.clone(),
                state.resources.clone(),
                state.log.clone(),
                state.continuations.clone(),
                UpstreamCredentials {
                    access_token: Some(caller.upstream_access_token.clone()),
                    refresh_token: Some(caller.upstream_refresh_token.clone()),
                },
            )
        })
        .await
    {
        Ok(session) => session,
        Err(err) => return rpc_error(StatusCode::NOT_FOUND, gateway_core::jsonrpc::gateway_error_codes::SESSION_NOT_FOUND, &err.to_string()),
    };

    // Every call re-binds the freshest credential pair from the caller's
    // bearer token onto the session.
    session
        .engine
        .rebind_credentials(UpstreamCredentials {
            access_token: Some(caller.upstream_access_token.clone()),
            refresh_token: Some(caller.upstream_refresh_token.clone()),
        })
        .await;

    match message {
        JsonRpcMessage::Request(request) => {
            let response = session.engine.handle_request(request, &session.transport).await;
            with_session_header((StatusCode::OK, Json(response)).into_response(), &session.id)
        }
        JsonRpcMessage::Response(reply) => {
            let Some(id) = reply.id.clone() else {
                return rpc_error(StatusCode::BAD_REQUEST, gateway_core::jsonrpc::error_codes::INVALID_REQUEST, "reply carried no id");
            };
            let RequestId::String(correlation_id) = id else {
                return rpc_error(StatusCode::BAD_REQUEST, gateway_core::jsonrpc::error_codes::INVALID_REQUEST, "reply id must be a correlation string");
            };
            session.transport.resolve(&correlation_id, JsonRpcMessage::Response(reply)).await;
            with_session_header(StatusCode::ACCEPTED.into_response(), &session.id)
        }
    }
}

async fn handle_get(State(state): State<McpRouterState>, headers: HeaderMap) -> Response {
    let Some(session_id) = session_id_from(&headers) else {
        return rpc_error(StatusCode::BAD_REQUEST, gateway_core::jsonrpc::error_codes::INVALID_REQUEST, "missing mcp-session-id");
    };

    let Some(session) = state.sessions.get_by_id(session_id).await else {
        return rpc_error(StatusCode::NOT_FOUND, gateway_core::jsonrpc::gateway_error_codes::SESSION_NOT_FOUND, "unknown session");
    };

    let Some(receiver) = session.transport.take_outbound_receiver().await else {
        return rpc_error(StatusCode::CONFLICT, gateway_core::jsonrpc::error_codes::INTERNAL_ERROR, "outbound stream already taken");
    };

    let body = stream::unfold(receiver, |mut receiver| async move {
        let message = receiver.recv().await?;
        let data = serde_json::to_string(&message).unwrap_or_default();
        Some((Ok::<Event, axum::Error>(Event::default().event("message").data(data)), receiver))
    });

    Sse::new(body).into_response()
}

async fn handle_delete(State(state): State<McpRouterState>, headers: HeaderMap) -> Response {
    let Some(session_id) = session_id_from(&headers) else {
        return rpc_error(StatusCode::BAD_REQUEST, gateway_core::jsonrpc::error_codes::INVALID_REQUEST, "missing mcp-session-id");
    };
    state.sessions.remove(session_id).await;
    StatusCode::NO_CONTENT.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_header_constant_is_lowercase() {
        assert_eq!(SESSION_ID_HEADER, "mcp-session-id");
    }
}
