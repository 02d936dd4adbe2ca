//! `UpstreamAuthClient`: the two calls made against the upstream OAuth
//! provider during the callback step. Reddit is the reference upstream;
//! any OAuth-2-compliant provider that accepts HTTP-Basic client auth at
//! its token endpoint fits this shape.

use gateway_core::error::{GatewayError, GatewayResult};
use serde::Deserialize;

pub struct UpstreamAuthClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    user_agent: String,
    token_endpoint: String,
    identity_endpoint: String,
}

pub struct ExchangedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Deserialize)]
struct TokenResponseBody {
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    86_400
}

#[derive(Deserialize)]
struct IdentityResponseBody {
    /// Reddit's identity endpoint returns the account name under `name`;
    /// other upstreams would substitute their own canonical id field when
    /// swapped in behind this port.
    name: String,
}

impl UpstreamAuthClient {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            user_agent: user_agent.into(),
            token_endpoint: "https://www.reddit.com/api/v1/access_token".to_string(),
            identity_endpoint: "https://oauth.reddit.com/api/v1/me".to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_endpoints(mut self, token_endpoint: String, identity_endpoint: String) -> Self {
        self.token_endpoint = token_endpoint;
        self.identity_endpoint = identity_endpoint;
        self
    }

    /// Posts the code to the upstream token endpoint with HTTP-Basic
    /// client authentication. Fails `upstream_error` on any non-2xx.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> GatewayResult<ExchangedTokens> {
        let response = self
            .http
            .post(&self.token_endpoint)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header("User-Agent", &self.user_agent)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::UpstreamError(format!(
                "upstream token endpoint returned {}",
                response.status()
            )));
        }

        let body: TokenResponseBody = response
            .json()
            .await
            .map_err(|e| GatewayError::UpstreamError(e.to_string()))?;

        Ok(ExchangedTokens {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            expires_in: body.expires_in,
        })
    }

    /// Fetches the upstream identity endpoint and returns the canonical
    /// upstream user id. Failure here is fatal to the in-flight flow.
    pub async fn identify_user(&self, access_token: &str) -> GatewayResult<String> {
        let response = self
            .http
            .get(&self.identity_endpoint)
            .bearer_auth(access_token)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::UpstreamError(format!(
                "upstream identity endpoint returned {}",
                response.status()
            )));
        }

        let body: IdentityResponseBody = response
            .json()
            .await
            .map_err(|e| GatewayError::UpstreamError(e.to_string()))?;

        Ok(body.name)
    }

    /// Refreshes the upstream access token using a stored refresh token,
    /// used opportunistically by the `refresh_token` grant when the
    /// cached pair is near expiry (9, Open question).
    pub async fn refresh(&self, refresh_token: &str) -> GatewayResult<ExchangedTokens> {
        let response = self
            .http
            .post(&self.token_endpoint)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header("User-Agent", &self.user_agent)
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::UpstreamError(format!(
                "upstream token endpoint returned {}",
                response.status()
            )));
        }

        let body: TokenResponseBody = response
            .json()
            .await
            .map_err(|e| GatewayError::UpstreamError(e.to_string()))?;

        Ok(ExchangedTokens {
            access_token: body.access_token,
            refresh_token: if body.refresh_token.is_empty() {
                refresh_token.to_string()
            } else {
                body.refresh_token
            },
            expires_in: body.expires_in,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exchange_code_fails_on_unreachable_endpoint() {
        let client = UpstreamAuthClient::new("id", "secret", "ua/1.0")
            .with_endpoints("http://127.0.0.1:1/token".to_string(), "http://127.0.0.1:1/me".to_string());
        let result = client.exchange_code("code", "http://localhost/cb").await;
        assert!(result.is_err());
    }
}
