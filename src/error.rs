//! Error types for the FRED MCP server.
//!
//! Every failure path in the crate maps onto one variant here, and every
//! variant carries a stable JSON-RPC error code so handlers can return
//! discriminated results instead of stringly-typed failures.

use std::fmt;
use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type.
#[derive(Error, Debug)]
pub enum Error {
    /// JSON-RPC protocol errors with an explicit code.
    #[error("protocol error: {code} - {message}")]
    Protocol {
        /// Error code as surfaced on the wire
        code: ErrorCode,
        /// Human-readable error message
        message: String,
        /// Optional additional error data
        data: Option<serde_json::Value>,
    },

    /// Transport-level errors. These close the session.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Fatal configuration errors (missing `FRED_API_KEY`).
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed request envelope.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Schema violation in tool arguments.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Unknown tool or resource.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// Unknown series id or missing upstream entity.
    #[error("not found: {0}")]
    NotFound(String),

    /// Gateway 5xx or timeout after the retry budget.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Gateway 429 beyond the retry budget.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Inner merge produced no rows.
    #[error("empty intersection: {0}")]
    EmptyIntersection(String),

    /// Repeated series id in a build request.
    #[error("duplicate series: {0}")]
    DuplicateSeries(String),

    /// Requested dataset column does not exist.
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    /// Dataset directory lacks its metadata sidecar.
    #[error("incomplete dataset: {0}")]
    IncompleteDataset(String),

    /// Request was cancelled by the client.
    #[error("operation cancelled")]
    Cancelled,

    /// Filesystem errors while writing artifacts.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors without a more specific kind.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON-RPC error code newtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    /// Parse error (-32700)
    pub const PARSE_ERROR: Self = Self(-32700);
    /// Invalid request (-32600)
    pub const INVALID_REQUEST: Self = Self(-32600);
    /// Method not found (-32601)
    pub const METHOD_NOT_FOUND: Self = Self(-32601);
    /// Invalid params (-32602)
    pub const INVALID_PARAMS: Self = Self(-32602);
    /// Internal error (-32603)
    pub const INTERNAL_ERROR: Self = Self(-32603);
    /// Unknown series id (-32011)
    pub const NOT_FOUND: Self = Self(-32011);
    /// Upstream 5xx or exhausted timeout budget (-32012)
    pub const UPSTREAM_UNAVAILABLE: Self = Self(-32012);
    /// Upstream 429 beyond the retry budget (-32013)
    pub const RATE_LIMITED: Self = Self(-32013);
    /// Inner merge yielded no rows (-32014)
    pub const EMPTY_INTERSECTION: Self = Self(-32014);
    /// Repeated series id in `series_list` (-32015)
    pub const DUPLICATE_SERIES: Self = Self(-32015);
    /// Dataset column absent (-32016)
    pub const UNKNOWN_COLUMN: Self = Self(-32016);
    /// Metadata sidecar missing (-32017)
    pub const INCOMPLETE_DATASET: Self = Self(-32017);
    /// Request cancelled (-32800, per the MCP cancellation draft)
    pub const CANCELLED: Self = Self(-32800);

    /// Create a custom error code.
    pub const fn other(code: i32) -> Self {
        Self(code)
    }

    /// Convert to the raw i32 value.
    pub const fn as_i32(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport-specific errors.
#[derive(Error, Debug)]
pub enum TransportError {
    /// IO error
    #[error("io error: {0}")]
    Io(String),

    /// Connection closed
    #[error("connection closed")]
    ConnectionClosed,

    /// Invalid message framing or content
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl Error {
    /// Create a protocol error with the given code and message.
    pub fn protocol(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create a protocol error with additional data.
    pub fn protocol_with_data(
        code: ErrorCode,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an invalid-request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create an invalid-params error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    /// Create a method-not-found error.
    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::MethodNotFound(message.into())
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The JSON-RPC code this error surfaces as.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Protocol { code, .. } => *code,
            Self::Transport(_) | Self::InvalidRequest(_) => ErrorCode::INVALID_REQUEST,
            Self::Serialization(_) => ErrorCode::PARSE_ERROR,
            Self::InvalidParams(_) => ErrorCode::INVALID_PARAMS,
            Self::MethodNotFound(_) => ErrorCode::METHOD_NOT_FOUND,
            Self::NotFound(_) => ErrorCode::NOT_FOUND,
            Self::UpstreamUnavailable(_) => ErrorCode::UPSTREAM_UNAVAILABLE,
            Self::RateLimited(_) => ErrorCode::RATE_LIMITED,
            Self::EmptyIntersection(_) => ErrorCode::EMPTY_INTERSECTION,
            Self::DuplicateSeries(_) => ErrorCode::DUPLICATE_SERIES,
            Self::UnknownColumn(_) => ErrorCode::UNKNOWN_COLUMN,
            Self::IncompleteDataset(_) => ErrorCode::INCOMPLETE_DATASET,
            Self::Cancelled => ErrorCode::CANCELLED,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => ErrorCode::INTERNAL_ERROR,
        }
    }

    /// Additional structured data attached to the error, if any.
    pub fn data(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Protocol { data, .. } => data.as_ref(),
            _ => None,
        }
    }

    /// Whether this error must close the session (framing/transport errors).
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Self::Internal(format!("csv: {err}"))
    }
}

impl From<rust_xlsxwriter::XlsxError> for Error {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        Self::Internal(format!("xlsx: {err}"))
    }
}
