//! `TokenCodec`: mints and verifies the bearer-token envelope carrying
//! upstream credentials. Pure — no network, no storage, no mutable state
//! beyond the read-only signing secret.

use chrono::{DateTime, Utc};
use gateway_core::error::{GatewayError, GatewayResult};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Lifetime of a minted bearer token: the upstream access-token's nominal
/// lifetime.
pub const BEARER_TOKEN_LIFETIME_SECS: i64 = 86_400;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BearerClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub upstream_access_token: String,
    pub upstream_refresh_token: String,
}

pub struct TokenCodec {
    signing_secret: String,
    issuer: String,
    audience: String,
}

impl TokenCodec {
    pub fn new(signing_secret: impl Into<String>, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            signing_secret: signing_secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    /// Produces a signed envelope with `iat = now`, `exp = now + 24h`.
    pub fn mint(
        &self,
        subject: &str,
        upstream_access_token: &str,
        upstream_refresh_token: &str,
        now: DateTime<Utc>,
    ) -> GatewayResult<String> {
        let claims = BearerClaims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: now.timestamp() + BEARER_TOKEN_LIFETIME_SECS,
            upstream_access_token: upstream_access_token.to_string(),
            upstream_refresh_token: upstream_refresh_token.to_string(),
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.signing_secret.as_bytes()),
        )?;
        Ok(token)
    }

    /// Checks signature, not-before/not-after, audience, issuer. Any
    /// mismatch fails `invalid_token` — never a more specific leak of which
    /// check failed.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> GatewayResult<BearerClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = 0;
        // `exp`/`iat` are checked below against the caller-supplied clock,
        // not real wall-clock time — tests mint and verify at arbitrary
        // instants without sleeping.
        validation.validate_exp = false;

        let decoded = jsonwebtoken::decode::<BearerClaims>(
            token,
            &DecodingKey::from_secret(self.signing_secret.as_bytes()),
            &validation,
        )
        .map_err(|_| GatewayError::InvalidToken("signature or claim mismatch".to_string()))?;

        let claims = decoded.claims;
        let now_ts = now.timestamp();
        if now_ts < claims.iat || now_ts > claims.exp {
            return Err(GatewayError::InvalidToken("expired".to_string()));
        }
        Ok(claims)
    }
}

/// Extracts the bearer token from an `Authorization` header value.
pub fn extract_bearer_token(header_value: &str) -> GatewayResult<&str> {
    const PREFIX: &str = "Bearer ";
    if !header_value.starts_with(PREFIX) {
        return Err(GatewayError::InvalidToken("missing Bearer prefix".to_string()));
    }
    let token = header_value[PREFIX.len()..].trim();
    if token.is_empty() {
        return Err(GatewayError::InvalidToken("empty token".to_string()));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn codec() -> TokenCodec {
        TokenCodec::new("x".repeat(32), "https://gateway.example", "mcp-gateway")
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn mint_then_verify_round_trips() {
        let codec = codec();
        let now = at(1_000_000);
        let token = codec.mint("alice", "A", "R", now).unwrap();
        let claims = codec.verify(&token, now).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.upstream_access_token, "A");
        assert_eq!(claims.upstream_refresh_token, "R");
    }

    #[test]
    fn verify_succeeds_at_t_plus_86399() {
        let codec = codec();
        let now = at(1_000_000);
        let token = codec.mint("alice", "A", "R", now).unwrap();
        assert!(codec.verify(&token, at(1_000_000 + 86_399)).is_ok());
    }

    #[test]
    fn verify_fails_at_t_plus_86401() {
        let codec = codec();
        let now = at(1_000_000);
        let token = codec.mint("alice", "A", "R", now).unwrap();
        assert!(codec.verify(&token, at(1_000_000 + 86_401)).is_err());
    }

    #[test]
    fn verify_rejects_wrong_audience() {
        let codec = codec();
        let other = TokenCodec::new("x".repeat(32), "https://gateway.example", "other-aud");
        let now = at(1_000_000);
        let token = codec.mint("alice", "A", "R", now).unwrap();
        assert!(other.verify(&token, now).is_err());
    }

    #[test]
    fn extract_bearer_token_requires_prefix() {
        assert!(extract_bearer_token("Bearer abc").is_ok());
        assert!(extract_bearer_token("abc").is_err());
        assert!(extract_bearer_token("Bearer ").is_err());
    }
}
