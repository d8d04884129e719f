//! Tool registry.
//!
//! A static table of typed tool definitions built once at startup: name,
//! human description, JSON-schema input descriptor and handler. Handlers
//! are pure with respect to process memory; all cross-request state lives
//! on disk.

pub mod build;
pub mod fetch;
pub mod plot;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::dataset::{DatasetBuilder, DatasetCatalog};
use crate::error::{Error, Result};
use crate::fred::FredGateway;
use crate::plot::PlotService;
use crate::server::cancellation::RequestHandlerExtra;
use crate::store::SeriesStore;
use crate::types::ToolInfo;

/// Shared dependencies handed to every tool handler.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Server configuration
    pub config: Arc<Config>,
    /// FRED HTTP gateway
    pub gateway: FredGateway,
    /// Series Store
    pub store: SeriesStore,
    /// Dataset builder
    pub builder: DatasetBuilder,
    /// Plot service
    pub plots: PlotService,
    /// Dataset catalog
    pub catalog: DatasetCatalog,
}

impl ToolContext {
    /// Wire up the component graph from a configuration.
    pub fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let gateway = FredGateway::new(&config)?;
        let store = SeriesStore::new(&config.data_root);
        let catalog = DatasetCatalog::new(&config.data_root);
        let builder = DatasetBuilder::new(
            gateway.clone(),
            &config.data_root,
            config.fetch_concurrency,
        );
        let plots = PlotService::new(gateway.clone(), store.clone(), catalog.clone());
        Ok(Self { config, gateway, store, builder, plots, catalog })
    }

    /// Same wiring, but with a caller-supplied gateway (tests point it at a
    /// stub server).
    pub fn with_gateway(config: Config, gateway: FredGateway) -> Self {
        let config = Arc::new(config);
        let store = SeriesStore::new(&config.data_root);
        let catalog = DatasetCatalog::new(&config.data_root);
        let builder = DatasetBuilder::new(
            gateway.clone(),
            &config.data_root,
            config.fetch_concurrency,
        );
        let plots = PlotService::new(gateway.clone(), store.clone(), catalog.clone());
        Self { config, gateway, store, builder, plots, catalog }
    }
}

/// Handler for one tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool. The returned string is the JSON (or plain text)
    /// body of the single text content item.
    async fn handle(&self, args: Value, extra: RequestHandlerExtra) -> Result<String>;
}

/// One registry entry.
pub struct ToolEntry {
    /// Tool name, unique
    pub name: &'static str,
    /// Human-readable description shown to the orchestrating model
    pub description: &'static str,
    /// JSON Schema for the arguments object
    pub input_schema: Value,
    /// The handler
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for ToolEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolEntry")
            .field("name", &self.name)
            .finish()
    }
}

/// The static tool registry.
#[derive(Debug)]
pub struct ToolRegistry {
    entries: Vec<ToolEntry>,
    by_name: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    /// Register the full tool set over a context.
    pub fn new(context: Arc<ToolContext>) -> Self {
        let mut registry = Self { entries: Vec::new(), by_name: HashMap::new() };

        for entry in fetch::entries(&context) {
            registry.push(entry);
        }
        for entry in build::entries(&context) {
            registry.push(entry);
        }
        for entry in plot::entries(&context) {
            registry.push(entry);
        }

        registry
    }

    fn push(&mut self, entry: ToolEntry) {
        debug_assert!(
            !self.by_name.contains_key(entry.name),
            "duplicate tool {}",
            entry.name
        );
        self.by_name.insert(entry.name, self.entries.len());
        self.entries.push(entry);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&ToolEntry> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    /// All tools, in registration order, as protocol records.
    pub fn list(&self) -> Vec<ToolInfo> {
        self.entries
            .iter()
            .map(|entry| ToolInfo {
                name: entry.name.to_string(),
                description: Some(entry.description.to_string()),
                input_schema: entry.input_schema.clone(),
            })
            .collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Decode a tool's argument object into its typed form, mapping failures to
/// `invalid_params`.
pub(crate) fn decode_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T> {
    // Tools without arguments receive null.
    let args = if args.is_null() { Value::Object(Default::default()) } else { args };
    serde_json::from_value(args).map_err(|e| Error::invalid_params(format!("bad arguments: {e}")))
}

/// Parse an optional `YYYY-MM-DD` argument.
pub(crate) fn parse_date_arg(value: Option<&str>, field: &str) -> Result<Option<NaiveDate>> {
    match value {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                Error::invalid_params(format!(
                    "{field} must be a YYYY-MM-DD date, got {raw:?}"
                ))
            }),
    }
}

/// Serialize a handler payload.
pub(crate) fn to_payload<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Run a future, aborting early when the request is cancelled.
pub(crate) async fn cancellable<T>(
    extra: &RequestHandlerExtra,
    future: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        result = future => result,
        () = extra.cancelled() => Err(Error::Cancelled),
    }
}
