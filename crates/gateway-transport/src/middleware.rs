//! The `/mcp` middleware chain: bearer verification, rate limiting,
//! protocol-version negotiation, request-size cap, wired in that order by
//! the server crate.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream;
use gateway_auth::TokenCodec;
use gateway_core::jsonrpc::{JsonRpcError, JsonRpcResponse};
use gateway_core::protocol_version;
use serde_json::json;
use tracing::warn;

use crate::rate_limit::RateLimiter;

/// Claims verified by `BearerCheck`, published into request extensions for
/// handlers downstream (session binding, upstream calls).
#[derive(Clone, Debug)]
pub struct AuthenticatedCaller {
    pub upstream_user_id: String,
    pub upstream_access_token: String,
    pub upstream_refresh_token: String,
}

#[derive(Clone)]
pub struct MiddlewareState {
    pub codec: Arc<TokenCodec>,
    pub rate_limiter: Arc<RateLimiter>,
    pub resource_metadata_url: String,
    pub max_request_bytes: usize,
}

fn www_authenticate_unauthorized(resource_metadata_url: &str) -> Response {
    let mut response = (
        StatusCode::UNAUTHORIZED,
        axum::Json(json!({"error": "invalid_token", "error_description": "missing or invalid bearer token"})),
    )
        .into_response();
    let header_value = format!("Bearer resource_metadata=\"{resource_metadata_url}\"");
    if let Ok(value) = header_value.parse() {
        response.headers_mut().insert("WWW-Authenticate", value);
    }
    response
}

/// A caller that asked to open the streaming-accept (SSE) surface gets its
/// 401 framed as a one-shot event on an (immediately closed) stream rather
/// than a synchronous HTTP 401 — an SSE client reading the response body as
/// a byte stream would otherwise see a bare 401 status as a transport
/// failure rather than an auth rejection it can act on.
fn sse_framed_unauthorized(resource_metadata_url: &str) -> Response {
    let body = json!({"error": "invalid_token", "error_description": "missing or invalid bearer token"});
    let data = body.to_string();
    let events = stream::once(async move { Ok::<Event, axum::Error>(Event::default().event("error").data(data)) });
    let mut response = Sse::new(events).into_response();
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    let header_value = format!("Bearer resource_metadata=\"{resource_metadata_url}\"");
    if let Ok(value) = header_value.parse() {
        response.headers_mut().insert("WWW-Authenticate", value);
    }
    response
}

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"))
}

fn unauthorized(headers: &HeaderMap, resource_metadata_url: &str) -> Response {
    if wants_event_stream(headers) {
        sse_framed_unauthorized(resource_metadata_url)
    } else {
        www_authenticate_unauthorized(resource_metadata_url)
    }
}

fn rpc_error_response(status: StatusCode, code: i64, message: &str) -> Response {
    let body = JsonRpcResponse::error(None, JsonRpcError::new(code, message));
    (status, axum::Json(body)).into_response()
}

/// Extracts and verifies the bearer token. On success, inserts
/// [`AuthenticatedCaller`] into the request extensions and forwards the
/// request; on failure, short-circuits with 401.
pub async fn bearer_check(
    State(state): State<MiddlewareState>,
    headers: HeaderMap,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let header_value = match headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some(v) => v,
        None => return unauthorized(&headers, &state.resource_metadata_url),
    };

    let token = match gateway_auth::token::extract_bearer_token(header_value) {
        Ok(t) => t,
        Err(_) => return unauthorized(&headers, &state.resource_metadata_url),
    };

    let claims = match state.codec.verify(token, chrono::Utc::now()) {
        Ok(c) => c,
        Err(e) => {
            warn!(kind = e.kind(), "bearer verification failed");
            return unauthorized(&headers, &state.resource_metadata_url);
        }
    };

    request.extensions_mut().insert(AuthenticatedCaller {
        upstream_user_id: claims.sub,
        upstream_access_token: claims.upstream_access_token,
        upstream_refresh_token: claims.upstream_refresh_token,
    });

    next.run(request).await
}

/// Fixed-window rate limit keyed by remote address.
pub async fn rate_limit(
    State(state): State<MiddlewareState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let key = addr.ip().to_string();
    if !state.rate_limiter.check(&key).await {
        return rpc_error_response(
            StatusCode::TOO_MANY_REQUESTS,
            gateway_core::jsonrpc::gateway_error_codes::RATE_LIMITED,
            "rate limit exceeded",
        );
    }
    next.run(request).await
}

/// Confirms `mcp-protocol-version`, when present, matches the server's
/// declared version.
pub async fn protocol_version_check(headers: HeaderMap, request: Request<axum::body::Body>, next: Next) -> Response {
    let requested = headers.get("mcp-protocol-version").and_then(|v| v.to_str().ok());
    if let Err(message) = protocol_version::negotiate(requested) {
        return rpc_error_response(StatusCode::BAD_REQUEST, gateway_core::jsonrpc::error_codes::INVALID_REQUEST, &message);
    }
    next.run(request).await
}

/// Rejects request bodies larger than `max_request_bytes` by
/// `Content-Length`. Bodies lying about their length are still bounded by
/// axum's own body-size limits configured at the router level.
pub async fn request_size_cap(
    State(state): State<MiddlewareState>,
    headers: HeaderMap,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if let Some(len) = headers
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
    {
        if len > state.max_request_bytes {
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    }
    next.run(request).await
}

pub const DEFAULT_MAX_REQUEST_BYTES: usize = 10 * 1024 * 1024;

/// Mirrors the session id back to browser callers: `Mcp-Session-Id` is set
/// on responses by the `/mcp` handlers and must be readable from
/// `fetch`/`EventSource` across origins, which requires it in
/// `Access-Control-Expose-Headers`.
pub fn cors_layer() -> tower_http::cors::CorsLayer {
    tower_http::cors::CorsLayer::permissive().expose_headers([axum::http::HeaderName::from_static("mcp-session-id")])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::post;
    use axum::Router;
    use gateway_core::Config;
    use tower::ServiceExt;

    fn test_config() -> Config {
        Config {
            issuer_url: "https://gateway.example.com".to_string(),
            upstream_callback_url: "https://gateway.example.com/oauth/reddit/callback".to_string(),
            upstream_client_id: "client".to_string(),
            upstream_client_secret: "secret".to_string(),
            token_signing_secret: "s".repeat(32),
            upstream_user_agent: "test/1.0".to_string(),
            port: 3000,
            rate_limit_window_secs: 60,
            rate_limit_max_requests: 100,
            redirect_uri_allowlist: vec![],
        }
    }

    fn test_state() -> MiddlewareState {
        let config = test_config();
        MiddlewareState {
            codec: Arc::new(TokenCodec::new(config.token_signing_secret.clone(), config.issuer_url.clone(), "https://gateway.example.com".to_string())),
            rate_limiter: RateLimiter::new(crate::rate_limit::RateLimitConfig::default()),
            resource_metadata_url: config.resource_metadata_url(),
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }

    #[tokio::test]
    async fn missing_bearer_yields_401_with_www_authenticate() {
        let state = test_state();
        let app = Router::new()
            .route("/mcp", post(|| async { StatusCode::OK }))
            .layer(axum::middleware::from_fn_with_state(state.clone(), bearer_check))
            .with_state(state);

        let response = app
            .oneshot(Request::builder().method("POST").uri("/mcp").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get("WWW-Authenticate").is_some());
    }

    #[tokio::test]
    async fn missing_bearer_on_streaming_accept_yields_sse_framed_401() {
        let state = test_state();
        let app = Router::new()
            .route("/mcp", post(|| async { StatusCode::OK }))
            .layer(axum::middleware::from_fn_with_state(state.clone(), bearer_check))
            .with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .header("accept", "text/event-stream")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(axum::http::header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );
        assert!(response.headers().get("WWW-Authenticate").is_some());
    }

    #[tokio::test]
    async fn valid_bearer_is_forwarded() {
        let state = test_state();
        let token = state.codec.mint("alice", "A", "R", chrono::Utc::now()).unwrap();

        let app = Router::new()
            .route("/mcp", post(|| async { StatusCode::OK }))
            .layer(axum::middleware::from_fn_with_state(state.clone(), bearer_check))
            .with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn mismatched_protocol_version_is_rejected() {
        let app = Router::new()
            .route("/mcp", post(|| async { StatusCode::OK }))
            .layer(axum::middleware::from_fn(protocol_version_check));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .header("mcp-protocol-version", "1999-01-01")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_request_is_rejected() {
        let state = MiddlewareState { max_request_bytes: 10, ..test_state() };
        let app = Router::new()
            .route("/mcp", post(|| async { StatusCode::OK }))
            .layer(axum::middleware::from_fn_with_state(state.clone(), request_size_cap))
            .with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .header("content-length", "1000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
