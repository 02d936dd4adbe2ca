//! Process-level configuration. Loaded once at startup and shared
//! immutably thereafter — nothing in this module is mutated after
//! [`Config::from_env`] returns.

use crate::error::{GatewayError, GatewayResult};

/// Minimum length, in bytes, of the token-signing secret. Below this the
/// HMAC over bearer tokens would be brute-forceable.
pub const MIN_SIGNING_SECRET_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct Config {
    pub issuer_url: String,
    pub upstream_callback_url: String,
    pub upstream_client_id: String,
    pub upstream_client_secret: String,
    pub token_signing_secret: String,
    pub upstream_user_agent: String,
    pub port: u16,
    pub rate_limit_window_secs: u64,
    pub rate_limit_max_requests: u32,
    /// Additional exact-match redirect URIs accepted alongside the default
    /// policy (HTTPS always, HTTP only for localhost/127.0.0.1, custom
    /// schemes matching `^[a-zA-Z][a-zA-Z0-9+.-]*:$`).
    pub redirect_uri_allowlist: Vec<String>,
}

impl Config {
    /// Reads configuration from the process environment. Fatal on any
    /// missing required variable or failed invariant.
    pub fn from_env() -> GatewayResult<Self> {
        let upstream_client_id = require_env("GATEWAY_UPSTREAM_CLIENT_ID")?;
        let upstream_client_secret = require_env("GATEWAY_UPSTREAM_CLIENT_SECRET")?;
        let token_signing_secret = require_env("GATEWAY_TOKEN_SIGNING_SECRET")?;

        let port: u16 = std::env::var("GATEWAY_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        let issuer_url = std::env::var("GATEWAY_ISSUER_URL")
            .unwrap_or_else(|_| format!("http://127.0.0.1:{port}"));

        let upstream_callback_url = std::env::var("GATEWAY_UPSTREAM_CALLBACK_URL")
            .unwrap_or_else(|_| format!("{issuer_url}/oauth/reddit/callback"));

        let upstream_user_agent = std::env::var("GATEWAY_UPSTREAM_USER_AGENT")
            .unwrap_or_else(|_| "mcp-gateway/1.0".to_string());

        let rate_limit_window_secs: u64 = std::env::var("GATEWAY_RATE_LIMIT_WINDOW_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        let rate_limit_max_requests: u32 = std::env::var("GATEWAY_RATE_LIMIT_MAX_REQUESTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100);

        let redirect_uri_allowlist = std::env::var("GATEWAY_REDIRECT_URI_ALLOWLIST")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        let config = Config {
            issuer_url,
            upstream_callback_url,
            upstream_client_id,
            upstream_client_secret,
            token_signing_secret,
            upstream_user_agent,
            port,
            rate_limit_window_secs,
            rate_limit_max_requests,
            redirect_uri_allowlist,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> GatewayResult<()> {
        if self.token_signing_secret.len() < MIN_SIGNING_SECRET_LEN {
            return Err(GatewayError::ServerError(format!(
                "GATEWAY_TOKEN_SIGNING_SECRET must be at least {MIN_SIGNING_SECRET_LEN} bytes"
            )));
        }
        if url::Url::parse(&self.issuer_url).is_err() {
            return Err(GatewayError::ServerError(
                "GATEWAY_ISSUER_URL must be an absolute URL".to_string(),
            ));
        }
        Ok(())
    }

    /// The fixed public client id every dynamic registration resolves to —
    /// this gateway issues no client secrets, only PKCE-bound public
    /// clients.
    pub fn public_client_id(&self) -> &'static str {
        "mcp-public-client"
    }

    pub fn resource_metadata_url(&self) -> String {
        format!("{}/.well-known/oauth-protected-resource", self.issuer_url)
    }

    pub fn authorization_server_metadata_url(&self) -> String {
        format!("{}/.well-known/oauth-authorization-server", self.issuer_url)
    }

    pub fn mcp_url(&self) -> String {
        format!("{}/mcp", self.issuer_url)
    }
}

fn require_env(name: &str) -> GatewayResult<String> {
    std::env::var(name).map_err(|_| {
        GatewayError::ServerError(format!("missing required environment variable {name}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            issuer_url: "http://127.0.0.1:3000".to_string(),
            upstream_callback_url: "http://127.0.0.1:3000/oauth/reddit/callback".to_string(),
            upstream_client_id: "cid".to_string(),
            upstream_client_secret: "csecret".to_string(),
            token_signing_secret: "x".repeat(32),
            upstream_user_agent: "mcp-gateway/1.0".to_string(),
            port: 3000,
            rate_limit_window_secs: 60,
            rate_limit_max_requests: 100,
            redirect_uri_allowlist: vec![],
        }
    }

    #[test]
    fn rejects_short_signing_secret() {
        let mut config = base_config();
        config.token_signing_secret = "too-short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_valid_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn rejects_non_absolute_issuer() {
        let mut config = base_config();
        config.issuer_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }
}
