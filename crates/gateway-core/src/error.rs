use thiserror::Error;

/// The stable error vocabulary exposed at every boundary of the gateway:
/// OAuth endpoints render `{error, error_description}`, the MCP endpoint
/// renders JSON-RPC error objects. Every variant here is one of the kinds
/// named in the error-handling design; there is no open-ended "other".
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unsupported response_type: {0}")]
    UnsupportedResponseType(String),

    #[error("unsupported grant_type: {0}")]
    UnsupportedGrantType(String),

    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("upstream error: {0}")]
    UpstreamError(String),

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("invalid arguments")]
    InvalidArguments { paths: Vec<String> },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("transport closed")]
    TransportClosed,

    #[error("rate limited")]
    RateLimited,

    #[error("server error")]
    ServerError(String),

    #[error("jwt error: {source}")]
    Jwt {
        #[from]
        source: jsonwebtoken::errors::Error,
    },

    #[error("serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    #[error("invalid url: {source}")]
    Url {
        #[from]
        source: url::ParseError,
    },
}

impl GatewayError {
    /// The stable string used in OAuth error bodies and JSON-RPC `data.kind`.
    /// Never leaks secret material regardless of variant.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::UnsupportedResponseType(_) => "unsupported_response_type",
            GatewayError::UnsupportedGrantType(_) => "unsupported_grant_type",
            GatewayError::InvalidGrant(_) => "invalid_grant",
            GatewayError::InvalidToken(_) => "invalid_token",
            GatewayError::AccessDenied(_) => "access_denied",
            GatewayError::UpstreamError(_) => "upstream_error",
            GatewayError::AuthenticationRequired => "authentication_required",
            GatewayError::SessionNotFound(_) => "session_not_found",
            GatewayError::InvalidArguments { .. } => "invalid_arguments",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::DeadlineExceeded => "deadline_exceeded",
            GatewayError::TransportClosed => "transport_closed",
            GatewayError::RateLimited => "rate_limited",
            GatewayError::ServerError(_) => "server_error",
            GatewayError::Jwt { .. } => "invalid_token",
            GatewayError::Serialization { .. } => "server_error",
            GatewayError::Url { .. } => "server_error",
        }
    }

    /// OAuth-shaped `error_description`. Never the raw `Display` of an
    /// internal/`server_error` cause — the logged cause and the
    /// caller-visible description are deliberately different strings.
    pub fn description(&self) -> String {
        match self {
            GatewayError::ServerError(_) => "an internal error occurred".to_string(),
            GatewayError::Jwt { .. } | GatewayError::Serialization { .. } | GatewayError::Url { .. } => {
                "an internal error occurred".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn invalid_arguments(paths: Vec<String>) -> Self {
        GatewayError::InvalidArguments { paths }
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_never_reveals_server_error_cause() {
        let err = GatewayError::ServerError("leaked secret XYZ".to_string());
        assert_eq!(err.kind(), "server_error");
        assert_eq!(err.description(), "an internal error occurred");
    }

    #[test]
    fn invalid_arguments_carries_paths() {
        let err = GatewayError::invalid_arguments(vec!["subreddit".to_string()]);
        match err {
            GatewayError::InvalidArguments { paths } => assert_eq!(paths, vec!["subreddit"]),
            _ => panic!("wrong variant"),
        }
    }
}
