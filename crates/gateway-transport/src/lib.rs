//! Streaming-HTTP transport for the `/mcp` endpoint: per-session message
//! framing ([`stream::StreamTransport`]), the concurrent session table
//! ([`session::SessionTable`]), fixed-window rate limiting
//! ([`rate_limit::RateLimiter`]), and the middleware chain that wires bearer
//! verification, rate limiting, protocol-version negotiation and the
//! request-size cap in front of it ([`middleware`]).

pub mod middleware;
pub mod rate_limit;
pub mod session;
pub mod stream;

pub use middleware::{AuthenticatedCaller, MiddlewareState};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use session::{Session, SessionEngine, SessionTable};
pub use stream::StreamTransport;
