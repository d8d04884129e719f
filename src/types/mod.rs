//! Protocol type definitions.

pub mod jsonrpc;
pub mod protocol;

pub use jsonrpc::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, MessageType, RawMessage,
    RequestId, ResponsePayload, JSONRPC_VERSION,
};
pub use protocol::{
    CallToolRequest, CallToolResult, CancelledNotification, ClientCapabilities, Content,
    Implementation, InitializeRequest, InitializeResult, ListResourcesResult, ListToolsResult,
    ProtocolVersion, ReadResourceRequest, ReadResourceResult, ResourceCapabilities,
    ResourceContents, ResourceInfo, ServerCapabilities, ToolCapabilities, ToolInfo,
};
