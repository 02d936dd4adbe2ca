//! The per-session MCP protocol engine: [`instance::McpInstance`] dispatches
//! `tools/*`, `prompts/*`, `resources/*` and the `sampling/createMessage`
//! round-trip through the narrow [`ports`] collaborator interfaces, never
//! owning a concrete upstream client itself. [`reddit`] is the reference
//! upstream implementation of those ports.

pub mod instance;
pub mod ports;
pub mod reddit;
pub mod router;
pub mod sampling;

pub use instance::{McpInstance, UpstreamCredentials};
pub use ports::{HandlerContext, LogLevel, LogPort, PromptRegistry, ResourceRegistry, ToolRegistry, TracingLogPort, UpstreamApiPort};
pub use router::{router as mcp_router, McpRouterState};
pub use sampling::SamplingContinuation;
