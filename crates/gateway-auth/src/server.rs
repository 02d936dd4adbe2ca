//! `AuthServer`: the HTTP surface of the authorization server. Six routes,
//! each stateless beyond [`OAuthStateStore`], [`TokenCodec`] and
//! [`Config`]. Error responses follow OAuth 2.0: a JSON body with `error`
//! and `error_description`.

use std::sync::Arc;

use axum::extract::{Form, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use gateway_core::error::GatewayError;
use gateway_core::Config;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::pkce;
use crate::redirect_policy;
use crate::state_store::{self, AuthorizationCode, OAuthStateStore, PendingAuthorization, RefreshTokenRecord};
use crate::token::TokenCodec;
use crate::upstream::UpstreamAuthClient;

pub struct AuthServerState {
    pub config: Arc<Config>,
    pub store: Arc<OAuthStateStore>,
    pub codec: TokenCodec,
    pub upstream: UpstreamAuthClient,
}

pub fn router(state: Arc<AuthServerState>) -> Router {
    Router::new()
        .route("/.well-known/oauth-authorization-server", get(discovery_authorization_server))
        .route("/.well-known/oauth-protected-resource", get(discovery_protected_resource))
        .route("/oauth/register", post(register))
        .route("/oauth/authorize", get(authorize))
        .route("/oauth/{upstream}/callback", get(callback))
        .route("/oauth/token", post(token))
        .with_state(state)
}

/// An OAuth-shaped error body, rendered with the status code its kind
/// implies.
struct OAuthError(GatewayError);

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            "invalid_request" | "unsupported_response_type" | "unsupported_grant_type" | "invalid_grant" => {
                StatusCode::BAD_REQUEST
            }
            "invalid_token" => StatusCode::UNAUTHORIZED,
            "access_denied" => StatusCode::FORBIDDEN,
            "upstream_error" | "server_error" => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        (
            status,
            Json(json!({ "error": self.0.kind(), "error_description": self.0.description() })),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------

async fn discovery_authorization_server(State(state): State<Arc<AuthServerState>>) -> Json<serde_json::Value> {
    let issuer = &state.config.issuer_url;
    Json(json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/oauth/authorize"),
        "token_endpoint": format!("{issuer}/oauth/token"),
        "registration_endpoint": format!("{issuer}/oauth/register"),
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code", "refresh_token"],
        "code_challenge_methods_supported": ["S256"],
        "scopes_supported": ["read"],
        "token_endpoint_auth_methods_supported": ["none"],
    }))
}

async fn discovery_protected_resource(State(state): State<Arc<AuthServerState>>) -> Json<serde_json::Value> {
    let issuer = &state.config.issuer_url;
    Json(json!({
        "resource": format!("{issuer}/mcp"),
        "authorization_servers": [issuer],
    }))
}

// ---------------------------------------------------------------------
// Dynamic registration
// ---------------------------------------------------------------------

#[derive(Deserialize, Default)]
struct RegisterRequest {
    #[serde(default)]
    redirect_uris: Vec<String>,
}

#[derive(Serialize)]
struct RegisterResponse {
    client_id: String,
    redirect_uris: Vec<String>,
    token_endpoint_auth_method: &'static str,
}

async fn register(
    State(state): State<Arc<AuthServerState>>,
    body: Option<Json<RegisterRequest>>,
) -> Result<Json<RegisterResponse>, OAuthError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    for uri in &request.redirect_uris {
        if !redirect_policy::is_allowed(uri, &state.config.redirect_uri_allowlist) {
            return Err(OAuthError(GatewayError::InvalidRequest(format!(
                "redirect_uri not permitted: {uri}"
            ))));
        }
    }
    Ok(Json(RegisterResponse {
        client_id: state.config.public_client_id().to_string(),
        redirect_uris: request.redirect_uris,
        token_endpoint_auth_method: "none",
    }))
}

// ---------------------------------------------------------------------
// Authorize
// ---------------------------------------------------------------------

#[derive(Deserialize)]
struct AuthorizeQuery {
    client_id: String,
    redirect_uri: String,
    response_type: String,
    code_challenge: String,
    code_challenge_method: String,
    state: String,
    #[allow(dead_code)]
    scope: Option<String>,
}

async fn authorize(
    State(auth_state): State<Arc<AuthServerState>>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Redirect, OAuthError> {
    if query.response_type != "code" {
        return Err(OAuthError(GatewayError::UnsupportedResponseType(query.response_type)));
    }
    if query.code_challenge_method != "S256" {
        return Err(OAuthError(GatewayError::InvalidRequest(
            "code_challenge_method must be S256".to_string(),
        )));
    }
    if !redirect_policy::is_allowed(&query.redirect_uri, &auth_state.config.redirect_uri_allowlist) {
        return Err(OAuthError(GatewayError::InvalidRequest(format!(
            "redirect_uri not permitted: {}",
            query.redirect_uri
        ))));
    }
    if query.client_id != auth_state.config.public_client_id() {
        return Err(OAuthError(GatewayError::InvalidRequest("unknown client_id".to_string())));
    }

    let now = Utc::now();
    let storage_key = gateway_core::identifiers::generate_storage_key();
    let nonce = gateway_core::identifiers::generate_storage_key();

    auth_state
        .store
        .insert_pending(
            storage_key.clone(),
            PendingAuthorization {
                redirect_uri: query.redirect_uri.clone(),
                code_challenge: query.code_challenge.clone(),
                caller_state: query.state.clone(),
                nonce: nonce.clone(),
                expires_at: state_store::pending_authorization_expiry(now),
            },
            now,
        )
        .await
        .map_err(OAuthError)?;

    let upstream_state = format!("{storage_key}:{nonce}");
    let upstream_url = format!(
        "https://www.reddit.com/api/v1/authorize?client_id={}&response_type=code&redirect_uri={}&state={}&duration=permanent&scope=identity",
        auth_state.config.upstream_client_id,
        urlencode(&auth_state.config.upstream_callback_url),
        urlencode(&upstream_state),
    );
    Ok(Redirect::to(&upstream_url))
}

fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

// ---------------------------------------------------------------------
// Upstream callback
// ---------------------------------------------------------------------

#[derive(Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: String,
    error: Option<String>,
}

async fn callback(
    State(auth_state): State<Arc<AuthServerState>>,
    Path(_upstream): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, OAuthError> {
    if let Some(error) = query.error {
        return Err(OAuthError(GatewayError::AccessDenied(error)));
    }
    let code = query.code.ok_or_else(|| GatewayError::InvalidRequest("missing code".to_string())).map_err(OAuthError)?;

    let (storage_key, nonce) = query
        .state
        .split_once(':')
        .ok_or_else(|| GatewayError::InvalidRequest("malformed state".to_string()))
        .map_err(OAuthError)?;

    let now = Utc::now();
    let pending = auth_state
        .store
        .take_pending(storage_key, now)
        .await
        .ok_or_else(|| GatewayError::InvalidRequest("unknown or consumed pending authorization".to_string()))
        .map_err(OAuthError)?;

    if pending.nonce != nonce {
        return Err(OAuthError(GatewayError::InvalidRequest("nonce mismatch".to_string())));
    }

    let exchanged = auth_state
        .upstream
        .exchange_code(&code, &auth_state.config.upstream_callback_url)
        .await
        .map_err(OAuthError)?;
    let upstream_user_id = auth_state.upstream.identify_user(&exchanged.access_token).await.map_err(OAuthError)?;

    let code_key = gateway_core::identifiers::generate_storage_key();
    auth_state
        .store
        .insert_code(
            code_key.clone(),
            AuthorizationCode {
                redirect_uri: pending.redirect_uri.clone(),
                code_challenge: pending.code_challenge.clone(),
                upstream_user_id,
                upstream_access_token: exchanged.access_token,
                upstream_refresh_token: exchanged.refresh_token,
                expires_at: state_store::authorization_code_expiry(now),
            },
            now,
        )
        .await
        .map_err(OAuthError)?;

    let redirect = format!(
        "{}?code={}&state={}",
        pending.redirect_uri,
        urlencode(&code_key),
        urlencode(&pending.caller_state)
    );
    Ok(Redirect::to(&redirect))
}

// ---------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------

#[derive(Deserialize)]
struct TokenRequest {
    grant_type: String,
    code: Option<String>,
    redirect_uri: Option<String>,
    code_verifier: Option<String>,
    #[allow(dead_code)]
    client_id: Option<String>,
    refresh_token: Option<String>,
}

#[derive(Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
    expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    scope: &'static str,
}

async fn token(
    State(auth_state): State<Arc<AuthServerState>>,
    Form(request): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, OAuthError> {
    match request.grant_type.as_str() {
        "authorization_code" => authorization_code_grant(auth_state, request).await,
        "refresh_token" => refresh_token_grant(auth_state, request).await,
        other => Err(OAuthError(GatewayError::UnsupportedGrantType(other.to_string()))),
    }
}

async fn authorization_code_grant(
    auth_state: Arc<AuthServerState>,
    request: TokenRequest,
) -> Result<Json<TokenResponse>, OAuthError> {
    let code = request.code.ok_or_else(|| GatewayError::InvalidRequest("missing code".to_string())).map_err(OAuthError)?;
    let redirect_uri = request
        .redirect_uri
        .ok_or_else(|| GatewayError::InvalidRequest("missing redirect_uri".to_string()))
        .map_err(OAuthError)?;
    let code_verifier = request
        .code_verifier
        .ok_or_else(|| GatewayError::InvalidRequest("missing code_verifier".to_string()))
        .map_err(OAuthError)?;

    let now = Utc::now();
    let record = auth_state
        .store
        .take_code(&code, now)
        .await
        .ok_or_else(|| GatewayError::InvalidGrant("unknown or expired code".to_string()))
        .map_err(OAuthError)?;

    if record.redirect_uri != redirect_uri {
        return Err(OAuthError(GatewayError::InvalidGrant("redirect_uri mismatch".to_string())));
    }
    if !pkce::verify(&code_verifier, &record.code_challenge) {
        return Err(OAuthError(GatewayError::InvalidGrant("Invalid code verifier".to_string())));
    }

    let access_token = auth_state
        .codec
        .mint(&record.upstream_user_id, &record.upstream_access_token, &record.upstream_refresh_token, now)
        .map_err(OAuthError)?;

    let refresh_token_id = gateway_core::identifiers::generate_storage_key();
    auth_state
        .store
        .insert_refresh_token(
            refresh_token_id.clone(),
            RefreshTokenRecord {
                upstream_user_id: record.upstream_user_id,
                upstream_access_token: record.upstream_access_token,
                upstream_refresh_token: record.upstream_refresh_token,
                expires_at: state_store::refresh_token_expiry(now),
            },
            now,
        )
        .await
        .map_err(OAuthError)?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "Bearer",
        expires_in: crate::token::BEARER_TOKEN_LIFETIME_SECS,
        refresh_token: Some(refresh_token_id),
        scope: "read",
    }))
}

/// Upstream tokens are refreshed opportunistically: only when the cached
/// pair is within this margin of the bearer lifetime. See spec 9's open
/// question — an upstream refresh failure here surfaces as `upstream_error`,
/// not `invalid_grant`, by explicit design choice.
const NEAR_EXPIRY_MARGIN_SECS: i64 = 300;

async fn refresh_token_grant(
    auth_state: Arc<AuthServerState>,
    request: TokenRequest,
) -> Result<Json<TokenResponse>, OAuthError> {
    let refresh_token = request
        .refresh_token
        .ok_or_else(|| GatewayError::InvalidRequest("missing refresh_token".to_string()))
        .map_err(OAuthError)?;

    let now = Utc::now();
    let record = auth_state
        .store
        .take_refresh_token(&refresh_token, now)
        .await
        .ok_or_else(|| GatewayError::InvalidGrant("unknown or expired refresh token".to_string()))
        .map_err(OAuthError)?;

    let near_expiry = record.expires_at - now < chrono::Duration::seconds(NEAR_EXPIRY_MARGIN_SECS);
    let (access_token, refresh_token_value) = if near_expiry {
        let refreshed = auth_state
            .upstream
            .refresh(&record.upstream_refresh_token)
            .await
            .map_err(OAuthError)?;
        (refreshed.access_token, refreshed.refresh_token)
    } else {
        (record.upstream_access_token.clone(), record.upstream_refresh_token.clone())
    };

    let bearer = auth_state
        .codec
        .mint(&record.upstream_user_id, &access_token, &refresh_token_value, now)
        .map_err(OAuthError)?;

    auth_state
        .store
        .insert_refresh_token(
            refresh_token,
            RefreshTokenRecord {
                upstream_user_id: record.upstream_user_id,
                upstream_access_token: access_token,
                upstream_refresh_token: refresh_token_value,
                expires_at: state_store::refresh_token_expiry(now),
            },
            now,
        )
        .await
        .map_err(OAuthError)?;

    Ok(Json(TokenResponse {
        access_token: bearer,
        token_type: "Bearer",
        expires_in: crate::token::BEARER_TOKEN_LIFETIME_SECS,
        refresh_token: None,
        scope: "read",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state() -> Arc<AuthServerState> {
        let config = Arc::new(Config {
            issuer_url: "http://127.0.0.1:3000".to_string(),
            upstream_callback_url: "http://127.0.0.1:3000/oauth/reddit/callback".to_string(),
            upstream_client_id: "upstream-id".to_string(),
            upstream_client_secret: "upstream-secret".to_string(),
            token_signing_secret: "x".repeat(32),
            upstream_user_agent: "mcp-gateway/1.0".to_string(),
            port: 3000,
            rate_limit_window_secs: 60,
            rate_limit_max_requests: 100,
            redirect_uri_allowlist: vec![],
        });
        Arc::new(AuthServerState {
            codec: TokenCodec::new(config.token_signing_secret.clone(), config.issuer_url.clone(), "mcp-gateway"),
            upstream: UpstreamAuthClient::new(&config.upstream_client_id, &config.upstream_client_secret, &config.upstream_user_agent),
            store: OAuthStateStore::new(),
            config,
        })
    }

    #[tokio::test]
    async fn discovery_exposes_pkce_s256_only() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::get("/.well-known/oauth-authorization-server").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn authorize_rejects_non_s256_challenge_method() {
        let app = router(test_state());
        let uri = "/oauth/authorize?client_id=mcp-public-client&redirect_uri=http://localhost:5173/cb&response_type=code&code_challenge=abc&code_challenge_method=plain&state=abc";
        let response = app.oneshot(Request::get(uri).body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn authorize_rejects_disallowed_redirect_uri() {
        let app = router(test_state());
        let uri = "/oauth/authorize?client_id=mcp-public-client&redirect_uri=http://example.com/cb&response_type=code&code_challenge=abc&code_challenge_method=S256&state=abc";
        let response = app.oneshot(Request::get(uri).body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn authorize_redirects_to_upstream_on_success() {
        let app = router(test_state());
        let uri = "/oauth/authorize?client_id=mcp-public-client&redirect_uri=http://localhost:5173/cb&response_type=code&code_challenge=abc&code_challenge_method=S256&state=abc";
        let response = app.oneshot(Request::get(uri).body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn token_endpoint_rejects_unknown_grant_type() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::post("/oauth/token")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("grant_type=password"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn token_endpoint_rejects_unknown_code_as_invalid_grant() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::post("/oauth/token")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from(
                        "grant_type=authorization_code&code=nonexistent&redirect_uri=http://localhost:5173/cb&code_verifier=v&client_id=mcp-public-client",
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
