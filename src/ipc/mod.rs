//! JSON-RPC 2.0 client for the bridge channel.
//!
//! This module provides an async RPC client that handles:
//! - Request/response correlation
//! - Per-method timeouts
//! - Notification broadcasting
//! - Line buffering and oversized line detection
//!
//! Messages are line-delimited JSON over the bridge process's stdio.

/// JSON-RPC 2.0 message types for the bridge channel.
pub mod types;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::time::timeout;

pub use types::*;

/// Maximum line length (1 MiB). Lines exceeding this cause a fatal error.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// RPC client errors.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Timeout waiting for response to {method}")]
    Timeout { method: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Remote error: {kind} - {message}")]
    Remote {
        code: i32,
        message: String,
        kind: String,
    },

    #[error("Disconnected from bridge")]
    Disconnected,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Notification event from the bridge.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub method: String,
    pub params: Value,
}

/// Internal command for the writer task.
enum WriterCommand {
    Send(String),
    Shutdown,
}

/// Pending request waiting for a response.
struct PendingRequest {
    sender: oneshot::Sender<Result<Response, RpcError>>,
}

/// RPC client for communicating with the bridge process.
///
/// Must be constructed inside an async runtime: the reader and writer run
/// as spawned tasks on the ambient runtime.
pub struct RpcClient {
    /// Counter for generating request IDs.
    next_id: AtomicU64,

    /// Channel for sending messages to the writer task.
    writer_tx: mpsc::Sender<WriterCommand>,

    /// Pending requests waiting for responses.
    pending: Arc<Mutex<HashMap<u64, PendingRequest>>>,

    /// Broadcast channel for notifications.
    notification_tx: broadcast::Sender<NotificationEvent>,

    /// Flag indicating if the client is connected.
    connected: Arc<AtomicBool>,
}

impl RpcClient {
    /// Create a new RPC client over the bridge's stdin/stdout pipes.
    pub fn new(stdin: ChildStdin, stdout: ChildStdout) -> Self {
        let (writer_tx, writer_rx) = mpsc::channel::<WriterCommand>(32);
        let (notification_tx, _) = broadcast::channel::<NotificationEvent>(64);

        let pending: Arc<Mutex<HashMap<u64, PendingRequest>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));

        tokio::spawn(Self::writer_loop(
            stdin,
            writer_rx,
            Arc::clone(&connected),
        ));

        tokio::spawn(Self::reader_loop(
            stdout,
            Arc::clone(&pending),
            notification_tx.clone(),
            Arc::clone(&connected),
        ));

        Self {
            next_id: AtomicU64::new(1),
            writer_tx,
            pending,
            notification_tx,
            connected,
        }
    }

    /// Check if the client is connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Subscribe to notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.notification_tx.subscribe()
    }

    /// Call an RPC method and wait for the response.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, RpcError> {
        if !self.is_connected() {
            return Err(RpcError::Disconnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = Request::new(id, method, params);
        let request_json = serde_json::to_string(&request)?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id, PendingRequest { sender: tx });
        }

        if self
            .writer_tx
            .send(WriterCommand::Send(request_json))
            .await
            .is_err()
        {
            self.cleanup_pending(id).await;
            return Err(RpcError::Disconnected);
        }

        let method_timeout = TimeoutConfig::get(method);
        let response = match timeout(method_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                // Response channel was closed
                self.cleanup_pending(id).await;
                return Err(RpcError::Disconnected);
            }
            Err(_) => {
                self.cleanup_pending(id).await;
                return Err(RpcError::Timeout {
                    method: method.to_string(),
                });
            }
        }?;

        if let Some(err) = response.error {
            return Err(RpcError::Remote {
                code: err.code,
                message: err.message,
                kind: err.data.map(|d| d.kind).unwrap_or_default(),
            });
        }

        let result = response
            .result
            .ok_or_else(|| RpcError::Protocol("Missing result in response".to_string()))?;

        serde_json::from_value(result).map_err(RpcError::from)
    }

    /// Clean up a pending request.
    async fn cleanup_pending(&self, id: u64) {
        let mut pending = self.pending.lock().await;
        pending.remove(&id);
    }

    /// Writer loop: serializes outgoing lines onto the bridge's stdin.
    async fn writer_loop(
        mut stdin: ChildStdin,
        mut rx: mpsc::Receiver<WriterCommand>,
        connected: Arc<AtomicBool>,
    ) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                WriterCommand::Send(line) => {
                    let write = async {
                        stdin.write_all(line.as_bytes()).await?;
                        stdin.write_all(b"\n").await?;
                        stdin.flush().await
                    };
                    if let Err(e) = write.await {
                        log::error!("Failed to write to bridge stdin: {}", e);
                        connected.store(false, Ordering::SeqCst);
                        break;
                    }
                }
                WriterCommand::Shutdown => {
                    log::info!("Writer loop shutting down");
                    break;
                }
            }
        }
    }

    /// Reader loop: correlates responses and broadcasts notifications.
    async fn reader_loop(
        stdout: ChildStdout,
        pending: Arc<Mutex<HashMap<u64, PendingRequest>>>,
        notification_tx: broadcast::Sender<NotificationEvent>,
        connected: Arc<AtomicBool>,
    ) {
        let mut lines = BufReader::new(stdout).lines();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(l)) => l,
                Ok(None) => break,
                Err(e) => {
                    log::error!("Error reading from bridge: {}", e);
                    break;
                }
            };

            if line.len() > MAX_LINE_LENGTH {
                log::error!(
                    "Line exceeds maximum length ({} > {}), fatal",
                    line.len(),
                    MAX_LINE_LENGTH
                );
                break;
            }

            if line.trim().is_empty() {
                continue;
            }

            let message: IncomingMessage = match serde_json::from_str(&line) {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("Failed to parse message from bridge: {}", e);
                    continue;
                }
            };

            match message {
                IncomingMessage::Response(response) => {
                    if let Some(RequestId::Number(id)) = response.id {
                        let mut pending_guard = pending.lock().await;
                        if let Some(request) = pending_guard.remove(&id) {
                            let _ = request.sender.send(Ok(response));
                        } else {
                            log::warn!("Received response for unknown request id: {}", id);
                        }
                    }
                }
                IncomingMessage::Notification(notif) => {
                    let event = NotificationEvent {
                        method: notif.method,
                        params: notif.params,
                    };
                    let _ = notification_tx.send(event);
                }
            }
        }

        log::info!("Reader loop ended");
        connected.store(false, Ordering::SeqCst);

        // Fail all pending requests so callers observe the disconnect
        let mut pending_guard = pending.lock().await;
        for (_, request) in pending_guard.drain() {
            let _ = request.sender.send(Err(RpcError::Disconnected));
        }
    }

    /// Shutdown the client.
    pub async fn shutdown(&self) {
        let _ = self.writer_tx.send(WriterCommand::Shutdown).await;
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_display() {
        let err = RpcError::Timeout {
            method: "status.get_integrations".to_string(),
        };
        assert!(err.to_string().contains("Timeout"));

        let err = RpcError::Remote {
            code: -32000,
            message: "Query failed".to_string(),
            kind: "E_QUERY_FAILED".to_string(),
        };
        assert!(err.to_string().contains("E_QUERY_FAILED"));
    }

    #[test]
    fn test_max_line_length_constant() {
        assert_eq!(MAX_LINE_LENGTH, 1024 * 1024);
    }

    #[test]
    fn test_rpc_error_disconnected() {
        let err = RpcError::Disconnected;
        assert!(err.to_string().contains("Disconnected"));
    }

    #[test]
    fn test_incoming_message_response_parsing() {
        let json = r#"{"jsonrpc":"2.0","id":42,"result":[]}"#;
        let msg: IncomingMessage = serde_json::from_str(json).unwrap();

        match msg {
            IncomingMessage::Response(resp) => {
                assert_eq!(resp.id, Some(RequestId::Number(42)));
                assert!(resp.is_success());
            }
            _ => panic!("Expected response"),
        }
    }

    #[test]
    fn test_response_with_error_field() {
        let json = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32600,"message":"Invalid Request","data":{"kind":"E_INVALID_PARAMS"}}}"#;
        let msg: IncomingMessage = serde_json::from_str(json).unwrap();

        match msg {
            IncomingMessage::Response(resp) => {
                assert!(!resp.is_success());
                let err = resp.error.unwrap();
                assert_eq!(err.code, -32600);
                assert_eq!(err.message, "Invalid Request");
            }
            _ => panic!("Expected response"),
        }
    }

    #[tokio::test]
    async fn test_call_cleans_pending_when_writer_channel_is_closed() {
        let (writer_tx, writer_rx) = mpsc::channel::<WriterCommand>(1);
        drop(writer_rx);

        let pending = Arc::new(Mutex::new(HashMap::new()));
        let (notification_tx, _) = broadcast::channel::<NotificationEvent>(1);
        let client = RpcClient {
            next_id: AtomicU64::new(1),
            writer_tx,
            pending: Arc::clone(&pending),
            notification_tx,
            connected: Arc::new(AtomicBool::new(true)),
        };

        let result: Result<Value, RpcError> = client.call(methods::SYSTEM_PING, None).await;
        assert!(matches!(result, Err(RpcError::Disconnected)));
        assert!(pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_call_fails_fast_when_disconnected() {
        let (writer_tx, _writer_rx) = mpsc::channel::<WriterCommand>(1);
        let (notification_tx, _) = broadcast::channel::<NotificationEvent>(1);
        let client = RpcClient {
            next_id: AtomicU64::new(1),
            writer_tx,
            pending: Arc::new(Mutex::new(HashMap::new())),
            notification_tx,
            connected: Arc::new(AtomicBool::new(false)),
        };

        let result: Result<Value, RpcError> = client.call(methods::SYSTEM_PING, None).await;
        assert!(matches!(result, Err(RpcError::Disconnected)));
    }
}
