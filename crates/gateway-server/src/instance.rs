//! `McpInstance`: the per-session protocol engine. Dispatches JSON-RPC MCP
//! methods through the four collaborator registries and owns the sampling
//! continuation table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gateway_core::error::{GatewayError, GatewayResult};
use gateway_core::jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId};
use gateway_core::schema;
use gateway_core::types::{
    ContentBlock, GetPromptParams, GetPromptResult, ListPromptsResult, ListResourcesResult, ListToolsResult, PromptMessage, ReadResourceParams,
    ReadResourceResult, ToolCallParams, ToolCallResult,
};
use gateway_transport::{SessionEngine, StreamTransport};
use tokio::sync::RwLock;

use crate::ports::{HandlerContext, LogLevel, LogPort, PromptRegistry, ResourceRegistry, ToolRegistry};
use crate::sampling::{self, SamplingContinuation};

/// Upstream credentials bound to a session at creation and refreshed, never
/// cleared, on subsequent rebinds (spec 3, Session invariant 1).
#[derive(Clone, Debug, Default)]
pub struct UpstreamCredentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

pub struct McpInstance {
    session_id: String,
    tools: Arc<dyn ToolRegistry>,
    prompts: Arc<dyn PromptRegistry>,
    resources: Arc<dyn ResourceRegistry>,
    log: Arc<dyn LogPort>,
    continuations: HashMap<String, Arc<dyn SamplingContinuation>>,
    credentials: RwLock<UpstreamCredentials>,
}

impl McpInstance {
    pub fn new(
        session_id: String,
        tools: Arc<dyn ToolRegistry>,
        prompts: Arc<dyn PromptRegistry>,
        resources: Arc<dyn ResourceRegistry>,
        log: Arc<dyn LogPort>,
        continuations: HashMap<String, Arc<dyn SamplingContinuation>>,
        credentials: UpstreamCredentials,
    ) -> Self {
        Self {
            session_id,
            tools,
            prompts,
            resources,
            log,
            continuations,
            credentials: RwLock::new(credentials),
        }
    }

    /// Replaces the bound upstream credentials. Never call with an empty
    /// pair — callers that want to drop credentials should not call this at
    /// all (spec 3: credentials never weaken).
    pub async fn rebind_credentials(&self, credentials: UpstreamCredentials) {
        *self.credentials.write().await = credentials;
    }

    async fn handler_context(&self, request_id: Option<&RequestId>, transport: &Arc<StreamTransport>) -> HandlerContext {
        let creds = self.credentials.read().await;
        HandlerContext {
            session_id: self.session_id.clone(),
            upstream_access_token: creds.access_token.clone(),
            upstream_refresh_token: creds.refresh_token.clone(),
            request_id: request_id.map(|id| id.to_string()),
            transport: transport.clone(),
        }
    }

    /// Dispatches one client-initiated JSON-RPC request to its MCP handler,
    /// returning the response to send back on the same correlation.
    pub async fn handle_request(&self, request: JsonRpcRequest, transport: &Arc<StreamTransport>) -> JsonRpcResponse {
        let id = request.id.clone();
        let result = self.dispatch(&request, transport).await;
        match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(err) => {
                self.log.log(LogLevel::Warn, "request failed", serde_json::json!({"method": request.method, "kind": err.kind()}));
                JsonRpcResponse::error(id, JsonRpcError::from_gateway_error(&err))
            }
        }
    }

    async fn dispatch(&self, request: &JsonRpcRequest, transport: &Arc<StreamTransport>) -> GatewayResult<serde_json::Value> {
        match request.method.as_str() {
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(request, transport).await,
            "prompts/list" => self.handle_prompts_list(),
            "prompts/get" => self.handle_prompts_get(request, transport).await,
            "resources/list" => self.handle_resources_list(),
            "resources/read" => self.handle_resources_read(request, transport).await,
            other => Err(GatewayError::NotFound(format!("unknown method: {other}"))),
        }
    }

    fn handle_tools_list(&self) -> GatewayResult<serde_json::Value> {
        let mut tools = self.tools.list_tools();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        serde_json::to_value(ListToolsResult { tools }).map_err(|e| GatewayError::Serialization { source: e })
    }

    async fn handle_tools_call(&self, request: &JsonRpcRequest, transport: &Arc<StreamTransport>) -> GatewayResult<serde_json::Value> {
        let params: ToolCallParams = parse_params(request)?;
        let ctx = self.handler_context(request.id.as_ref(), transport).await;
        ctx.requires_upstream()?;

        if let Some(schema) = self.tools.input_schema(&params.name) {
            let violations = schema::validate(&params.arguments, &schema);
            if !violations.is_empty() {
                return Err(GatewayError::invalid_arguments(violations));
            }
        }

        let result: ToolCallResult = self.tools.call(&params.name, params.arguments, &ctx).await?;
        serde_json::to_value(result).map_err(|e| GatewayError::Serialization { source: e })
    }

    fn handle_prompts_list(&self) -> GatewayResult<serde_json::Value> {
        let prompts = self.prompts.list_prompts();
        serde_json::to_value(ListPromptsResult { prompts }).map_err(|e| GatewayError::Serialization { source: e })
    }

    async fn handle_prompts_get(&self, request: &JsonRpcRequest, transport: &Arc<StreamTransport>) -> GatewayResult<serde_json::Value> {
        let params: GetPromptParams = parse_params(request)?;
        let prompt = self.prompts.get_prompt(&params.name).ok_or_else(|| GatewayError::NotFound(params.name.clone()))?;

        let mut missing = Vec::new();
        for arg in &prompt.arguments {
            if arg.required && !params.arguments.contains_key(&arg.name) {
                missing.push(arg.name.clone());
            }
        }
        if !missing.is_empty() {
            return Err(GatewayError::invalid_arguments(missing));
        }

        let mut rendered = prompt.template.clone();
        for (name, value) in &params.arguments {
            rendered = rendered.replace(&format!("{{{{{name}}}}}"), value);
        }

        // Best-effort resource injection: a failed or absent read omits the
        // placeholder rather than failing prompt rendering.
        if !prompt.resource_refs.is_empty() {
            let ctx = self.handler_context(request.id.as_ref(), transport).await;
            for (placeholder, uri) in &prompt.resource_refs {
                let marker = format!("{{{{resource_{placeholder}}}}}");
                if !rendered.contains(&marker) {
                    continue;
                }
                let body = self.resources.read(uri, &ctx).await.map(|c| c.text).unwrap_or_default();
                rendered = rendered.replace(&marker, &body);
            }
        }

        let result = GetPromptResult {
            description: prompt.description.clone(),
            messages: vec![PromptMessage {
                role: "user".to_string(),
                content: ContentBlock::text(rendered),
            }],
        };
        serde_json::to_value(result).map_err(|e| GatewayError::Serialization { source: e })
    }

    fn handle_resources_list(&self) -> GatewayResult<serde_json::Value> {
        let resources = self.resources.list_resources();
        serde_json::to_value(ListResourcesResult { resources }).map_err(|e| GatewayError::Serialization { source: e })
    }

    async fn handle_resources_read(&self, request: &JsonRpcRequest, transport: &Arc<StreamTransport>) -> GatewayResult<serde_json::Value> {
        let params: ReadResourceParams = parse_params(request)?;
        let ctx = self.handler_context(request.id.as_ref(), transport).await;
        let contents = self.resources.read(&params.uri, &ctx).await?;
        serde_json::to_value(ReadResourceResult { contents: vec![contents] }).map_err(|e| GatewayError::Serialization { source: e })
    }

    /// Runs the sampling round-trip described in spec 4.10, steps 3-6: emit
    /// the server-initiated request, suspend for the reply, and — if the
    /// request named a callback — dispatch the continuation.
    pub async fn create_message(
        &self,
        request: gateway_core::types::SamplingRequest,
        transport: &Arc<StreamTransport>,
        deadline: Option<Duration>,
    ) -> GatewayResult<gateway_core::types::SamplingResponse> {
        let result = sampling::create_message(transport, &request, deadline).await?;
        sampling::dispatch_continuation(&request, &result, transport, &self.continuations).await;
        Ok(result)
    }
}

#[async_trait]
impl SessionEngine for McpInstance {
    async fn close(&self) {
        self.log.log(LogLevel::Info, "session closed", serde_json::json!({"session_id": self.session_id}));
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(request: &JsonRpcRequest) -> GatewayResult<T> {
    let params = request.params.clone().unwrap_or(serde_json::Value::Null);
    serde_json::from_value(params).map_err(|e| GatewayError::InvalidRequest(e.to_string()))
}
