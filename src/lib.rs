//! # FRED MCP Server
//!
//! An MCP (Model Context Protocol) server exposing a curated catalog of
//! economic time-series operations over the FRED API: fetching series,
//! building merged and transformed datasets, generating charts, and a
//! recent-datasets resource that lets a stateless client rediscover
//! persisted artifacts across sessions.
//!
//! The crate is organised around the dispatch plane and the ETL engine:
//!
//! - [`server`]: JSON-RPC framing over stdio, capability advertising,
//!   request routing with a bounded worker pool and cancellation.
//! - [`tools`]: the static registry of fifteen typed tools.
//! - [`fred`]: the outbound HTTP gateway with retry and backoff.
//! - [`dataset`]: merge/transform pipeline, artifact emission, catalog.
//! - [`transform`]: the eight-transformation algebra.
//! - [`plot`]: chart generation including differencing analysis.
//! - [`store`]: the on-disk series layout.
//!
//! ## Running
//!
//! ```bash
//! FRED_API_KEY=... fredmcp
//! ```
//!
//! The process speaks line-delimited JSON-RPC 2.0 on stdin/stdout; logs go
//! to stderr.

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod config;
pub mod dataset;
pub mod error;
pub mod fred;
pub mod plot;
pub mod server;
pub mod store;
pub mod tools;
pub mod transform;
pub mod transport;
pub mod types;

pub use config::Config;
pub use error::{Error, ErrorCode, Result};
pub use server::{Server, DATASETS_RESOURCE_URI, PROTOCOL_VERSION};
pub use tools::{ToolContext, ToolRegistry};
pub use transport::{StdioTransport, Transport};
