//! Collaborator ports: the narrow interfaces `McpInstance` dispatches
//! through rather than owning tool bodies, prompt templates, a resource
//! catalog, or an upstream client directly. Swapping the upstream (Reddit
//! here) means supplying new implementations of these traits, not touching
//! the dispatch core.

use std::sync::Arc;

use async_trait::async_trait;
use gateway_core::error::GatewayResult;
use gateway_core::jsonrpc::{JsonRpcMessage, JsonRpcRequest};
use gateway_core::types::{Prompt, Resource, ResourceContents, Tool, ToolCallResult};
use gateway_transport::StreamTransport;
use serde_json::Value;

/// Per-call context handed to a tool executor or resource reader: the
/// session's upstream credential snapshot, identifiers for progress
/// correlation, and the transport a long-running tool can push progress
/// notifications on. Never logged in full — `LogPort` implementations must
/// not render `upstream_access_token`/`upstream_refresh_token`.
#[derive(Clone)]
pub struct HandlerContext {
    pub session_id: String,
    pub upstream_access_token: Option<String>,
    pub upstream_refresh_token: Option<String>,
    pub request_id: Option<String>,
    pub transport: Arc<StreamTransport>,
}

impl HandlerContext {
    pub fn requires_upstream(&self) -> GatewayResult<&str> {
        self.upstream_access_token
            .as_deref()
            .ok_or(gateway_core::error::GatewayError::AuthenticationRequired)
    }

    /// Pushes a `notifications/progress` event on this session's transport.
    /// Best-effort: a closed transport drops the notification silently.
    pub fn emit_progress(&self, payload: Value) {
        let _ = self
            .transport
            .send(JsonRpcMessage::Request(JsonRpcRequest::notification("notifications/progress", Some(payload))));
    }
}

#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// Tool manifest. `McpInstance::handle_tools_list` is responsible for
    /// sorting by name.
    fn list_tools(&self) -> Vec<Tool>;

    /// Looks up `name`'s declared input schema, for argument validation
    /// ahead of `call`.
    fn input_schema(&self, name: &str) -> Option<Value>;

    async fn call(&self, name: &str, arguments: Value, ctx: &HandlerContext) -> GatewayResult<ToolCallResult>;
}

#[async_trait]
pub trait PromptRegistry: Send + Sync {
    fn list_prompts(&self) -> Vec<Prompt>;

    fn get_prompt(&self, name: &str) -> Option<Prompt>;
}

#[async_trait]
pub trait ResourceRegistry: Send + Sync {
    fn list_resources(&self) -> Vec<Resource>;

    async fn read(&self, uri: &str, ctx: &HandlerContext) -> GatewayResult<ResourceContents>;
}

/// One post as surfaced by the reference upstream's listing endpoint.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UpstreamPost {
    pub id: String,
    pub title: String,
    pub author: String,
    pub score: i64,
    pub url: String,
}

/// Narrow façade used by upstream-sensitive tools/resources. Never touched
/// by `AuthServer` or `SessionTable` — those only ever see opaque upstream
/// tokens, never the API itself.
#[async_trait]
pub trait UpstreamApiPort: Send + Sync {
    /// Lists the top posts in `subreddit`, newest-first as returned by the
    /// upstream, using `access_token` for authority.
    async fn list_subreddit_posts(&self, subreddit: &str, access_token: &str, limit: u32) -> GatewayResult<Vec<UpstreamPost>>;

    /// The authenticated account's own identity, for the `reddit://about`
    /// resource.
    async fn about_me(&self, access_token: &str) -> GatewayResult<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

pub trait LogPort: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, fields: Value);
}

/// `tracing`-backed `LogPort`, the default wired by `gateway-cli`.
pub struct TracingLogPort;

impl LogPort for TracingLogPort {
    fn log(&self, level: LogLevel, message: &str, fields: Value) {
        match level {
            LogLevel::Debug => tracing::debug!(%fields, "{message}"),
            LogLevel::Info => tracing::info!(%fields, "{message}"),
            LogLevel::Warn => tracing::warn!(%fields, "{message}"),
            LogLevel::Error => tracing::error!(%fields, "{message}"),
        }
    }
}
