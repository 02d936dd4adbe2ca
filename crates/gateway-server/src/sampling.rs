//! The `sampling/createMessage` round-trip: the server asks its client to
//! run an LLM and suspends until the client replies, the transport closes,
//! or a caller-supplied deadline elapses.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gateway_core::error::{GatewayError, GatewayResult};
use gateway_core::identifiers::generate_correlation_id;
use gateway_core::jsonrpc::{JsonRpcMessage, JsonRpcRequest};
use gateway_core::types::{SamplingRequest, SamplingResponse};
use gateway_transport::StreamTransport;

/// A named server-side continuation invoked once a sampling reply with a
/// matching `_meta.callback` tag arrives. Unknown tags are logged and
/// ignored rather than failing the round-trip (spec: "non-fatal").
#[async_trait]
pub trait SamplingContinuation: Send + Sync {
    /// Interprets `result`, validates it against the continuation's own
    /// output schema, and emits a `sampling/complete` notification on
    /// `transport`.
    async fn run(&self, result: &SamplingResponse, transport: &StreamTransport) -> GatewayResult<()>;
}

/// Initiates the round-trip: emits the server-initiated request, then
/// suspends on the client's reply. `deadline` is optional — callers that
/// omit it rely solely on transport closure to unblock.
pub async fn create_message(transport: &StreamTransport, request: &SamplingRequest, deadline: Option<Duration>) -> GatewayResult<SamplingResponse> {
    let correlation_id = generate_correlation_id();
    let params = serde_json::to_value(request).map_err(|e| GatewayError::Serialization { source: e })?;
    let receiver = transport.send_server_request(correlation_id, "sampling/createMessage", params).await?;

    let reply = match deadline {
        Some(d) => tokio::time::timeout(d, receiver)
            .await
            .map_err(|_| GatewayError::DeadlineExceeded)?
            .map_err(|_| GatewayError::TransportClosed)?,
        None => receiver.await.map_err(|_| GatewayError::TransportClosed)?,
    };

    match reply {
        JsonRpcMessage::Response(resp) => {
            if let Some(err) = resp.error {
                return Err(GatewayError::UpstreamError(err.message));
            }
            let result = resp.result.ok_or_else(|| GatewayError::ServerError("sampling reply carried no result".to_string()))?;
            serde_json::from_value(result).map_err(|e| GatewayError::Serialization { source: e })
        }
        JsonRpcMessage::Request(_) => Err(GatewayError::ServerError("sampling reply was itself a request".to_string())),
    }
}

/// Dispatches to the continuation named by `request.callback_tag()`, if
/// any, and folds an unknown tag into a no-op rather than an error.
pub async fn dispatch_continuation(
    request: &SamplingRequest,
    result: &SamplingResponse,
    transport: &StreamTransport,
    continuations: &std::collections::HashMap<String, Arc<dyn SamplingContinuation>>,
) {
    let Some(tag) = request.callback_tag() else {
        return;
    };
    match continuations.get(tag) {
        Some(continuation) => {
            if let Err(e) = continuation.run(result, transport).await {
                tracing::warn!(tag, kind = e.kind(), "sampling continuation failed");
            }
        }
        None => tracing::warn!(tag, "unknown sampling callback tag, ignoring"),
    }
}

/// Builds the `sampling/complete` notification a continuation emits once
/// it has validated the LLM's output.
pub fn completion_notification(payload: serde_json::Value) -> JsonRpcMessage {
    JsonRpcMessage::Request(JsonRpcRequest::notification("sampling/complete", Some(payload)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::jsonrpc::{JsonRpcResponse, RequestId};
    use gateway_core::types::{ContentBlock, SamplingRole};

    fn sample_request() -> SamplingRequest {
        serde_json::from_value(serde_json::json!({
            "messages": [{"role": "user", "content": {"type": "text", "text": "hi"}}],
            "_meta": {"callback": "summarize"}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn create_message_resolves_on_reply() {
        let transport = StreamTransport::new();
        let request = sample_request();

        let join = tokio::spawn({
            let transport = transport.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                let mut receiver = transport.take_outbound_receiver().await.unwrap();
                let outbound = receiver.recv().await.unwrap();
                let JsonRpcMessage::Request(req) = outbound else { panic!("expected request") };
                let id = req.id.unwrap();
                let RequestId::String(corr) = id else { panic!("expected string id") };
                transport
                    .resolve(
                        &corr,
                        JsonRpcMessage::Response(JsonRpcResponse::success(
                            None,
                            serde_json::to_value(SamplingResponse {
                                role: SamplingRole::Assistant,
                                content: ContentBlock::text("ok"),
                                model: "test-model".to_string(),
                                stop_reason: None,
                            })
                            .unwrap(),
                        )),
                    )
                    .await;
            }
        });

        let result = create_message(&transport, &request, Some(Duration::from_secs(1))).await.unwrap();
        join.await.unwrap();
        assert_eq!(result.model, "test-model");
    }

    #[tokio::test]
    async fn create_message_times_out_without_reply() {
        let transport = StreamTransport::new();
        let request = sample_request();
        let result = create_message(&transport, &request, Some(Duration::from_millis(10))).await;
        assert!(matches!(result, Err(GatewayError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn unknown_callback_tag_is_ignored_not_fatal() {
        let transport = StreamTransport::new();
        let request = sample_request();
        let result = SamplingResponse {
            role: SamplingRole::Assistant,
            content: ContentBlock::text("ok"),
            model: "m".to_string(),
            stop_reason: None,
        };
        dispatch_continuation(&request, &result, &transport, &std::collections::HashMap::new()).await;
    }
}
