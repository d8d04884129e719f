//! MCP server: framing, capability advertising, request routing and error
//! envelopes.
//!
//! One reader task pulls messages off the transport; tool invocations are
//! dispatched onto a bounded worker pool and may complete out of order
//! (responses are correlated by request id). A single writer task owns the
//! outbound half of the transport. Framing errors close the session and
//! cancel all in-flight handlers; handler errors only fail their own
//! request.

pub mod cancellation;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use crate::dataset::catalog::DEFAULT_LIMIT;
use crate::error::{Error, Result};
use crate::tools::{ToolContext, ToolRegistry};
use crate::transport::{Transport, TransportMessage};
use crate::types::{
    CallToolRequest, CallToolResult, CancelledNotification, Implementation, InitializeResult,
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListResourcesResult,
    ListToolsResult, ProtocolVersion, ReadResourceRequest, ReadResourceResult, ResourceContents,
    ResourceInfo, ServerCapabilities,
};
use cancellation::{CancellationManager, RequestHandlerExtra};

/// Protocol version this server negotiates.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// URI of the recent-datasets resource.
pub const DATASETS_RESOURCE_URI: &str = "fred://datasets/recent";

/// The MCP server.
pub struct Server {
    info: Implementation,
    capabilities: ServerCapabilities,
    context: Arc<ToolContext>,
    registry: Arc<ToolRegistry>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("info", &self.info)
            .field("tools", &self.registry.len())
            .finish()
    }
}

impl Server {
    /// Create a server over a wired component graph.
    pub fn new(context: Arc<ToolContext>) -> Self {
        let registry = Arc::new(ToolRegistry::new(context.clone()));
        Self {
            info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ServerCapabilities::tools_and_resources(),
            context,
            registry,
        }
    }

    /// Run over stdio until the peer disconnects.
    pub async fn run_stdio(self) -> Result<()> {
        self.run(crate::transport::StdioTransport::new()).await
    }

    /// Run over an arbitrary transport until it closes.
    pub async fn run<T: Transport + 'static>(self, transport: T) -> Result<()> {
        let transport = Arc::new(transport);
        let worker_limit = self.worker_limit();
        let session = Arc::new(Session {
            info: self.info,
            capabilities: self.capabilities,
            context: self.context,
            registry: self.registry,
            initialized: AtomicBool::new(false),
            cancellations: CancellationManager::new(),
            workers: Semaphore::new(worker_limit),
        });

        let (response_tx, mut response_rx) = mpsc::channel::<JsonRpcResponse>(64);

        // Single writer task: owns the outbound transport half.
        let writer_transport = transport.clone();
        let writer = tokio::spawn(async move {
            while let Some(response) = response_rx.recv().await {
                if let Err(err) = writer_transport
                    .send(TransportMessage::Response(response))
                    .await
                {
                    error!(%err, "failed to write response; stopping writer");
                    break;
                }
            }
        });

        info!(tools = session.registry.len(), "session open");

        // Reader loop.
        let result = loop {
            match transport.receive().await {
                Ok(TransportMessage::Request(request)) => {
                    session.clone().dispatch_request(request, response_tx.clone());
                },
                Ok(TransportMessage::Notification(notification)) => {
                    session.handle_notification(notification).await;
                },
                Ok(TransportMessage::Response(response)) => {
                    warn!(id = %response.id, "unexpected response message from peer");
                },
                Err(err) => {
                    if matches!(
                        &err,
                        Error::Transport(crate::error::TransportError::ConnectionClosed)
                    ) {
                        debug!("transport closed");
                        break Ok(());
                    }
                    error!(%err, "framing error; closing session");
                    break Err(err);
                },
            }
        };

        // A closed session cancels all in-flight handlers.
        session.cancellations.cancel_all().await;
        drop(response_tx);
        let _ = writer.await;
        let _ = transport.close().await;
        info!("session closed");

        result
    }

    fn worker_limit(&self) -> usize {
        self.context.config.worker_limit.max(1)
    }
}

/// Per-connection state.
struct Session {
    info: Implementation,
    capabilities: ServerCapabilities,
    context: Arc<ToolContext>,
    registry: Arc<ToolRegistry>,
    initialized: AtomicBool,
    cancellations: CancellationManager,
    workers: Semaphore,
}

impl Session {
    /// Route one request onto its own task; tool work is bounded by the
    /// worker semaphore inside [`Session::handle_request`].
    fn dispatch_request(self: Arc<Self>, request: JsonRpcRequest, tx: mpsc::Sender<JsonRpcResponse>) {
        tokio::spawn(async move {
            let id = request.id.clone();
            let response = self.handle_request(request).await;
            self.cancellations.remove(&id).await;
            if tx.send(response).await.is_err() {
                debug!(%id, "response channel closed before reply");
            }
        });
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();

        if request.method == "initialize" {
            return match self.handle_initialize(request.params) {
                Ok(result) => JsonRpcResponse::success(id, result),
                Err(err) => JsonRpcResponse::error(id, err.into()),
            };
        }

        if !self.initialized.load(Ordering::Acquire) {
            return JsonRpcResponse::error(
                id,
                JsonRpcError::from(Error::invalid_request(format!(
                    "{} before initialize",
                    request.method
                ))),
            );
        }

        // Register for cancellation before queueing on the pool, so a
        // cancel notification can still abort a request waiting for a
        // permit.
        let token = self.cancellations.create_token(id.clone()).await;
        let extra = RequestHandlerExtra::new(id.clone(), token.clone());

        // Bounded worker pool: hold a permit for the whole handler run.
        let permit = tokio::select! {
            permit = self.workers.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    return JsonRpcResponse::error(
                        id,
                        JsonRpcError::from(Error::internal("worker pool closed")),
                    );
                },
            },
            () = token.cancelled() => {
                return JsonRpcResponse::error(id, JsonRpcError::from(Error::Cancelled));
            },
        };

        let outcome = match request.method.as_str() {
            "tools/list" => self.handle_list_tools(),
            "tools/call" => self.handle_call_tool(request.params, extra).await,
            "resources/list" => self.handle_list_resources(),
            "resources/read" => self.handle_read_resource(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            other => Err(Error::method_not_found(format!("unknown method {other:?}"))),
        };
        drop(permit);

        match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => {
                debug!(%id, %err, "request failed");
                JsonRpcResponse::error(id, err.into())
            },
        }
    }

    fn handle_initialize(&self, params: Option<serde_json::Value>) -> Result<serde_json::Value> {
        if let Some(params) = params {
            let init: crate::types::InitializeRequest = serde_json::from_value(params)
                .map_err(|e| Error::invalid_params(format!("bad initialize params: {e}")))?;
            debug!(
                client = init.client_info.as_ref().map(|c| c.name.as_str()),
                requested = %init.protocol_version.0,
                "initialize"
            );
        }

        self.initialized.store(true, Ordering::Release);
        info!("session initialized");

        let result = InitializeResult {
            protocol_version: ProtocolVersion(PROTOCOL_VERSION.to_string()),
            capabilities: self.capabilities.clone(),
            server_info: self.info.clone(),
            instructions: Some(
                "FRED economic time-series tools: fetch series, build transformed datasets, \
                 and plot. Check the fred://datasets/recent resource to discover datasets \
                 built in earlier sessions."
                    .to_string(),
            ),
        };
        Ok(serde_json::to_value(result)?)
    }

    fn handle_list_tools(&self) -> Result<serde_json::Value> {
        let result = ListToolsResult { tools: self.registry.list() };
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_call_tool(
        &self,
        params: Option<serde_json::Value>,
        extra: RequestHandlerExtra,
    ) -> Result<serde_json::Value> {
        let params = params.ok_or_else(|| Error::invalid_params("tools/call requires params"))?;
        let call: CallToolRequest = serde_json::from_value(params)
            .map_err(|e| Error::invalid_params(format!("bad tools/call params: {e}")))?;

        let entry = self
            .registry
            .get(&call.name)
            .ok_or_else(|| Error::method_not_found(format!("unknown tool {:?}", call.name)))?;

        debug!(tool = call.name, id = %extra.request_id, "tool call");
        let body = entry.handler.handle(call.arguments, extra).await?;
        Ok(serde_json::to_value(CallToolResult::text(body))?)
    }

    fn handle_list_resources(&self) -> Result<serde_json::Value> {
        let result = ListResourcesResult {
            resources: vec![ResourceInfo {
                uri: DATASETS_RESOURCE_URI.to_string(),
                name: "Recent FRED datasets".to_string(),
                description: Some(
                    "The most recently built datasets with their columns, applied \
                     transformations and file paths."
                        .to_string(),
                ),
                mime_type: Some("text/plain".to_string()),
            }],
        };
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_read_resource(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let params =
            params.ok_or_else(|| Error::invalid_params("resources/read requires params"))?;
        let read: ReadResourceRequest = serde_json::from_value(params)
            .map_err(|e| Error::invalid_params(format!("bad resources/read params: {e}")))?;

        if read.uri != DATASETS_RESOURCE_URI {
            return Err(Error::method_not_found(format!(
                "unknown resource {:?}",
                read.uri
            )));
        }

        let catalog = self.context.catalog.clone();
        let text = tokio::task::spawn_blocking(move || catalog.render_listing(DEFAULT_LIMIT))
            .await
            .map_err(|e| Error::internal(format!("catalog scan panicked: {e}")))??;

        let result = ReadResourceResult {
            contents: vec![ResourceContents {
                uri: read.uri,
                text,
                mime_type: Some("text/plain".to_string()),
            }],
        };
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/cancelled" => {
                let Some(params) = notification.params else {
                    warn!("cancelled notification without params");
                    return;
                };
                match serde_json::from_value::<CancelledNotification>(params) {
                    Ok(cancelled) => {
                        let found = self.cancellations.cancel(&cancelled.request_id).await;
                        info!(
                            id = %cancelled.request_id,
                            found,
                            reason = cancelled.reason.as_deref().unwrap_or("unspecified"),
                            "cancellation requested"
                        );
                    },
                    Err(err) => warn!(%err, "malformed cancelled notification"),
                }
            },
            "notifications/initialized" => {
                debug!("client finished initialization");
            },
            other => {
                debug!(method = other, "ignoring notification");
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;

    fn test_session() -> Arc<Session> {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new("test-key", dir.path()).unwrap();
        let context = Arc::new(ToolContext::new(config).unwrap());
        let registry = Arc::new(ToolRegistry::new(context.clone()));
        Arc::new(Session {
            info: Implementation { name: "fredmcp".into(), version: "0.0.0".into() },
            capabilities: ServerCapabilities::tools_and_resources(),
            context,
            registry,
            initialized: AtomicBool::new(false),
            cancellations: CancellationManager::new(),
            workers: Semaphore::new(4),
        })
    }

    fn request(id: i64, method: &str, params: Option<serde_json::Value>) -> JsonRpcRequest {
        JsonRpcRequest::new(id, method, params)
    }

    #[tokio::test]
    async fn requests_before_initialize_are_rejected() {
        let session = test_session();
        let response = session.handle_request(request(1, "tools/list", None)).await;
        let err = response.get_error().expect("expected error");
        assert_eq!(err.code, -32600);
    }

    #[tokio::test]
    async fn initialize_then_list_tools() {
        let session = test_session();

        let response = session
            .handle_request(request(
                1,
                "initialize",
                Some(json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {"name": "test", "version": "0"}
                })),
            ))
            .await;
        assert!(response.is_success());

        let response = session.handle_request(request(2, "tools/list", None)).await;
        assert!(response.is_success());
        let tools = match &response.payload {
            crate::types::ResponsePayload::Result(value) => value["tools"].clone(),
            crate::types::ResponsePayload::Error(_) => unreachable!(),
        };
        assert_eq!(tools.as_array().unwrap().len(), 15);
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let session = test_session();
        session.initialized.store(true, Ordering::Release);
        let response = session.handle_request(request(3, "prompts/list", None)).await;
        assert_eq!(response.get_error().unwrap().code, -32601);
    }

    #[tokio::test]
    async fn unknown_tool_is_method_not_found() {
        let session = test_session();
        session.initialized.store(true, Ordering::Release);
        let response = session
            .handle_request(request(
                4,
                "tools/call",
                Some(json!({"name": "no_such_tool", "arguments": {}})),
            ))
            .await;
        assert_eq!(response.get_error().unwrap().code, -32601);
    }

    #[tokio::test]
    async fn schema_violation_is_invalid_params() {
        let session = test_session();
        session.initialized.store(true, Ordering::Release);
        let response = session
            .handle_request(request(
                5,
                "tools/call",
                Some(json!({
                    "name": "build_fred_dataset_tool",
                    "arguments": {"series_list": "UNRATE"}
                })),
            ))
            .await;
        assert_eq!(response.get_error().unwrap().code, -32602);
    }

    #[tokio::test]
    async fn resources_list_advertises_catalog() {
        let session = test_session();
        session.initialized.store(true, Ordering::Release);
        let response = session
            .handle_request(request(6, "resources/list", None))
            .await;
        assert!(response.is_success());
        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(
            body["result"]["resources"][0]["uri"],
            DATASETS_RESOURCE_URI
        );
    }

    #[tokio::test]
    async fn read_unknown_resource_fails() {
        let session = test_session();
        session.initialized.store(true, Ordering::Release);
        let response = session
            .handle_request(request(
                7,
                "resources/read",
                Some(json!({"uri": "fred://datasets/other"})),
            ))
            .await;
        assert_eq!(response.get_error().unwrap().code, -32601);
    }

    #[tokio::test]
    async fn read_resource_on_empty_root() {
        let session = test_session();
        session.initialized.store(true, Ordering::Release);
        let response = session
            .handle_request(request(
                8,
                "resources/read",
                Some(json!({"uri": DATASETS_RESOURCE_URI})),
            ))
            .await;
        assert!(response.is_success());
        let body = serde_json::to_value(&response).unwrap();
        let text = body["result"]["contents"][0]["text"].as_str().unwrap();
        assert!(text.contains("No datasets found"));
    }

    #[tokio::test]
    async fn duplicate_series_surfaces_taxonomy_code() {
        let session = test_session();
        session.initialized.store(true, Ordering::Release);
        let response = session
            .handle_request(request(
                9,
                "tools/call",
                Some(json!({
                    "name": "build_fred_dataset_tool",
                    "arguments": {"series_list": ["GDP", "GDP"]}
                })),
            ))
            .await;
        assert_eq!(response.get_error().unwrap().code, -32015);
    }
}
