//! `mcp-gateway`: process entry point. Loads [`Config`] from the
//! environment, wires the OAuth authorization server and the `/mcp`
//! streaming-HTTP surface behind the shared middleware chain, and serves
//! both until a shutdown signal closes every open session.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use gateway_auth::{AuthServerState, OAuthStateStore, TokenCodec, UpstreamAuthClient};
use gateway_core::Config;
use gateway_server::reddit::{RedditApiClient, RedditPromptRegistry, RedditResourceRegistry, RedditToolRegistry};
use gateway_server::{McpInstance, McpRouterState, TracingLogPort};
use gateway_transport::rate_limit::{self, RateLimitConfig, RateLimiter};
use gateway_transport::{session, MiddlewareState, SessionTable};
use serde_json::json;
use tracing::info;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("GATEWAY_LOG").unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json_format = std::env::var("GATEWAY_LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

    if json_format {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> gateway_core::GatewayResult<()> {
    init_tracing();

    let config = Arc::new(Config::from_env()?);
    info!(issuer = %config.issuer_url, port = config.port, "starting mcp-gateway");

    let store = OAuthStateStore::new();
    gateway_auth::state_store::spawn_sweeper(store.clone());

    let codec = Arc::new(TokenCodec::new(
        config.token_signing_secret.clone(),
        config.issuer_url.clone(),
        config.issuer_url.clone(),
    ));
    let upstream_auth = UpstreamAuthClient::new(
        config.upstream_client_id.clone(),
        config.upstream_client_secret.clone(),
        config.upstream_user_agent.clone(),
    );

    let auth_state = Arc::new(AuthServerState {
        config: config.clone(),
        store,
        codec: TokenCodec::new(config.token_signing_secret.clone(), config.issuer_url.clone(), config.issuer_url.clone()),
        upstream: upstream_auth,
    });

    let upstream_api = Arc::new(RedditApiClient::new(config.upstream_user_agent.clone()));
    let tools = Arc::new(RedditToolRegistry::new(upstream_api.clone()));
    let prompts = Arc::new(RedditPromptRegistry);
    let resources = Arc::new(RedditResourceRegistry::new(upstream_api));
    let log = Arc::new(TracingLogPort);

    let sessions = SessionTable::<McpInstance>::new();
    session::spawn_janitor(sessions.clone());

    let rate_limiter = RateLimiter::new(RateLimitConfig {
        window: std::time::Duration::from_secs(config.rate_limit_window_secs),
        max_requests: config.rate_limit_max_requests,
    });
    rate_limit::spawn_cleanup(rate_limiter.clone());

    let middleware_state = MiddlewareState {
        codec,
        rate_limiter,
        resource_metadata_url: config.resource_metadata_url(),
        max_request_bytes: gateway_transport::middleware::DEFAULT_MAX_REQUEST_BYTES,
    };

    let mcp_state = McpRouterState {
        sessions: sessions.clone(),
        tools,
        prompts,
        resources,
        log,
        continuations: Default::default(),
    };

    let mcp_router = gateway_server::mcp_router(mcp_state)
        .layer(axum::middleware::from_fn_with_state(middleware_state.clone(), gateway_transport::middleware::request_size_cap))
        .layer(axum::middleware::from_fn(gateway_transport::middleware::protocol_version_check))
        .layer(axum::middleware::from_fn_with_state(middleware_state.clone(), gateway_transport::middleware::rate_limit))
        .layer(axum::middleware::from_fn_with_state(middleware_state, gateway_transport::middleware::bearer_check))
        .layer(gateway_transport::middleware::cors_layer());

    let index_config = config.clone();
    let app = Router::new()
        .merge(gateway_auth::router(auth_state))
        .merge(mcp_router)
        .route("/health", axum::routing::get(health))
        .route("/", axum::routing::get(move || service_index(index_config)))
        .into_make_service_with_connect_info::<SocketAddr>();

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| gateway_core::GatewayError::ServerError(format!("failed to bind {addr}: {e}")))?;

    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(sessions))
        .await
        .map_err(|e| gateway_core::GatewayError::ServerError(e.to_string()))?;

    Ok(())
}

/// Liveness probe. Capability flags let a caller tell, without an
/// authenticated round trip, whether the surfaces it cares about are
/// compiled in.
async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(json!({
        "status": "ok",
        "capabilities": {
            "oauth": true,
            "mcp": true,
            "sampling": true,
        }
    }))
}

/// Service index: absolute URLs for every route in the external interface
/// table, so a caller can discover the gateway without hardcoding paths.
async fn service_index(config: Arc<Config>) -> axum::Json<serde_json::Value> {
    axum::Json(json!({
        "name": "mcp-gateway",
        "authorization_server": config.authorization_server_metadata_url(),
        "protected_resource": config.resource_metadata_url(),
        "mcp": config.mcp_url(),
    }))
}

/// Waits for Ctrl-C or SIGTERM, then closes every open session before the
/// server stops accepting connections.
async fn shutdown_signal(sessions: Arc<SessionTable<McpInstance>>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, closing sessions");
    sessions.close_all().await;
}
