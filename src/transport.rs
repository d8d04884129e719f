//! Transport layer.
//!
//! Messages are exchanged as line-delimited JSON over stdio: one UTF-8
//! encoded JSON-RPC envelope per line. Framing errors are fatal to the
//! session; the caller is expected to stop the session loop when
//! [`Transport::receive`] fails.

use async_trait::async_trait;
use std::fmt::Debug;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::error::{Result, TransportError};
use crate::types::{
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, MessageType, RawMessage,
};

/// A message that can be sent or received over a transport.
#[derive(Debug, Clone)]
pub enum TransportMessage {
    /// Request expecting a response
    Request(JsonRpcRequest),
    /// Notification (no response)
    Notification(JsonRpcNotification),
    /// Response to a previous request
    Response(JsonRpcResponse),
}

/// Core transport trait.
///
/// Implementations handle framing; [`Transport::send`] must write a complete
/// message atomically and [`Transport::receive`] must block until a complete
/// message is available.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Send a message over the transport.
    async fn send(&self, message: TransportMessage) -> Result<()>;

    /// Receive the next message from the transport.
    async fn receive(&self) -> Result<TransportMessage>;

    /// Close the transport.
    async fn close(&self) -> Result<()>;

    /// Whether the transport is still connected.
    fn is_connected(&self) -> bool {
        true
    }

    /// Transport type name for diagnostics.
    fn transport_type(&self) -> &'static str {
        "unknown"
    }
}

/// Decode one line into a transport message.
///
/// Shared between the stdio transport and tests so framing rules live in one
/// place: invalid JSON and envelopes that are neither request, notification
/// nor response are [`TransportError::InvalidMessage`].
pub fn decode_line(line: &str) -> Result<TransportMessage> {
    let raw: RawMessage = serde_json::from_str(line)
        .map_err(|e| TransportError::InvalidMessage(format!("invalid JSON: {e}")))?;

    if raw.jsonrpc != crate::types::JSONRPC_VERSION {
        return Err(TransportError::InvalidMessage(format!(
            "unsupported jsonrpc version: {}",
            raw.jsonrpc
        ))
        .into());
    }

    match raw.message_type() {
        MessageType::Request => {
            let request: JsonRpcRequest = serde_json::from_str(line)
                .map_err(|e| TransportError::InvalidMessage(format!("invalid request: {e}")))?;
            Ok(TransportMessage::Request(request))
        },
        MessageType::Notification => {
            let notification: JsonRpcNotification = serde_json::from_str(line).map_err(|e| {
                TransportError::InvalidMessage(format!("invalid notification: {e}"))
            })?;
            Ok(TransportMessage::Notification(notification))
        },
        MessageType::Response => {
            let response: JsonRpcResponse = serde_json::from_str(line)
                .map_err(|e| TransportError::InvalidMessage(format!("invalid response: {e}")))?;
            Ok(TransportMessage::Response(response))
        },
        MessageType::Invalid => {
            Err(TransportError::InvalidMessage("not a JSON-RPC message".to_string()).into())
        },
    }
}

/// Encode a transport message as a single line (no trailing newline).
pub fn encode_message(message: &TransportMessage) -> Result<String> {
    let encoded = match message {
        TransportMessage::Request(request) => serde_json::to_string(request)?,
        TransportMessage::Notification(notification) => serde_json::to_string(notification)?,
        TransportMessage::Response(response) => serde_json::to_string(response)?,
    };
    Ok(encoded)
}

/// stdio transport: newline-delimited JSON over stdin/stdout.
#[derive(Debug)]
pub struct StdioTransport {
    stdin: Mutex<BufReader<tokio::io::Stdin>>,
    stdout: Mutex<tokio::io::Stdout>,
    closed: std::sync::atomic::AtomicBool,
}

impl StdioTransport {
    /// Create a new stdio transport.
    pub fn new() -> Self {
        Self {
            stdin: Mutex::new(BufReader::new(tokio::io::stdin())),
            stdout: Mutex::new(tokio::io::stdout()),
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, message: TransportMessage) -> Result<()> {
        if self.closed.load(std::sync::atomic::Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed.into());
        }

        let mut line = encode_message(&message)?;
        line.push('\n');

        let mut stdout = self.stdout.lock().await;
        stdout
            .write_all(line.as_bytes())
            .await
            .map_err(TransportError::from)?;
        stdout.flush().await.map_err(TransportError::from)?;
        Ok(())
    }

    async fn receive(&self) -> Result<TransportMessage> {
        if self.closed.load(std::sync::atomic::Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed.into());
        }

        let mut stdin = self.stdin.lock().await;
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = stdin
                .read_line(&mut line)
                .await
                .map_err(TransportError::from)?;

            if bytes_read == 0 {
                self.closed
                    .store(true, std::sync::atomic::Ordering::Release);
                return Err(TransportError::ConnectionClosed.into());
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            return decode_line(trimmed);
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed
            .store(true, std::sync::atomic::Ordering::Release);
        let mut stdout = self.stdout.lock().await;
        stdout.flush().await.map_err(TransportError::from)?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(std::sync::atomic::Ordering::Acquire)
    }

    fn transport_type(&self) -> &'static str {
        "stdio"
    }
}
