//! `StreamTransport`: bidirectional framing over a single streaming HTTP
//! connection per session. The client's request body carries JSON-RPC
//! requests; the response channel carries responses, server-initiated
//! requests (sampling), and notifications.

use std::collections::HashMap;
use std::sync::Arc;

use gateway_core::error::{GatewayError, GatewayResult};
use gateway_core::jsonrpc::{JsonRpcMessage, JsonRpcRequest, RequestId};
use tokio::sync::{oneshot, Mutex, RwLock};

/// One outstanding server-initiated request: created when the core emits a
/// `sampling/createMessage` (or similar) request and suspends on the
/// client's reply. Exactly one resolution — reply, transport close, or
/// deadline.
struct PendingCorrelation {
    resolver: oneshot::Sender<JsonRpcMessage>,
}

/// Bidirectional framing for one session. Outbound messages (responses,
/// server-initiated requests, notifications) are pushed onto `outbound`;
/// the HTTP layer drains it into the client's response stream. Inbound
/// replies to server-initiated requests are routed back to their waiting
/// resolver by correlation id.
pub struct StreamTransport {
    outbound: tokio::sync::mpsc::UnboundedSender<JsonRpcMessage>,
    outbound_rx: Mutex<Option<tokio::sync::mpsc::UnboundedReceiver<JsonRpcMessage>>>,
    pending: RwLock<HashMap<String, PendingCorrelation>>,
    closed: std::sync::atomic::AtomicBool,
}

impl StreamTransport {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        Arc::new(Self {
            outbound: tx,
            outbound_rx: Mutex::new(Some(rx)),
            pending: RwLock::new(HashMap::new()),
            closed: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Takes the receiving half so the HTTP layer can drain it into the
    /// client's response stream. Can be taken at most once.
    pub async fn take_outbound_receiver(&self) -> Option<tokio::sync::mpsc::UnboundedReceiver<JsonRpcMessage>> {
        self.outbound_rx.lock().await.take()
    }

    /// Sends a response to a client-initiated request, or a fire-and-forget
    /// notification.
    pub fn send(&self, message: JsonRpcMessage) -> GatewayResult<()> {
        self.outbound
            .send(message)
            .map_err(|_| GatewayError::TransportClosed)
    }

    /// Emits a server-initiated request (sampling) carrying a correlation
    /// id unique within the session, and returns a future that resolves
    /// when the client's reply arrives, the transport closes, or the
    /// caller's deadline elapses (the caller composes the deadline with
    /// `tokio::time::timeout`).
    pub async fn send_server_request(&self, correlation_id: String, method: &str, params: serde_json::Value) -> GatewayResult<oneshot::Receiver<JsonRpcMessage>> {
        let (resolver, receiver) = oneshot::channel();
        self.pending.write().await.insert(correlation_id.clone(), PendingCorrelation { resolver });

        let request = JsonRpcRequest::new(method, Some(params), RequestId::String(correlation_id));
        self.send(JsonRpcMessage::Request(request))?;
        Ok(receiver)
    }

    /// Routes a client reply to its awaiting resolver by correlation id.
    /// Unknown correlation ids are dropped silently — the originating call
    /// has already timed out or the transport reconnected.
    pub async fn resolve(&self, correlation_id: &str, reply: JsonRpcMessage) {
        if let Some(pending) = self.pending.write().await.remove(correlation_id) {
            let _ = pending.resolver.send(reply);
        }
    }

    /// Closes the transport: every pending server-initiated request
    /// resolves via its resolver being dropped, which the caller observes
    /// as `transport_closed` when awaiting the receiver.
    pub async fn close(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
        self.pending.write().await.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::jsonrpc::JsonRpcResponse;

    #[tokio::test]
    async fn resolve_delivers_reply_to_waiting_receiver() {
        let transport = StreamTransport::new();
        let receiver = transport
            .send_server_request("corr-1".to_string(), "sampling/createMessage", serde_json::json!({}))
            .await
            .unwrap();

        transport
            .resolve("corr-1", JsonRpcMessage::Response(JsonRpcResponse::success(None, serde_json::json!({"ok": true}))))
            .await;

        let reply = receiver.await.unwrap();
        match reply {
            JsonRpcMessage::Response(r) => assert_eq!(r.result.unwrap()["ok"], true),
            _ => panic!("expected response"),
        }
    }

    #[tokio::test]
    async fn close_resolves_pending_calls_as_transport_closed() {
        let transport = StreamTransport::new();
        let receiver = transport
            .send_server_request("corr-1".to_string(), "sampling/createMessage", serde_json::json!({}))
            .await
            .unwrap();

        transport.close().await;

        let result = receiver.await;
        assert!(result.is_err(), "dropped resolver should fail the awaiting receiver");
    }

    #[tokio::test]
    async fn unknown_correlation_id_is_dropped_silently() {
        let transport = StreamTransport::new();
        transport
            .resolve("never-sent", JsonRpcMessage::Response(JsonRpcResponse::success(None, serde_json::json!(null))))
            .await;
    }
}
