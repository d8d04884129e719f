//! Fetch and directory tools: series metadata, observations, search, and
//! the releases/categories/sources directory, plus the two indicator
//! convenience tools built on top of search.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{cancellable, decode_args, parse_date_arg, to_payload, ToolContext, ToolEntry, ToolHandler};
use crate::error::{Error, Result};
use crate::fred::SeriesId;
use crate::server::cancellation::RequestHandlerExtra;

/// Registry entries for this module.
pub fn entries(context: &Arc<ToolContext>) -> Vec<ToolEntry> {
    let series_id_prop = json!({
        "type": "string",
        "description": "FRED series ID (e.g. 'GDP', 'UNRATE', 'CPIAUCSL')"
    });
    let date_props = json!({
        "observation_start": {
            "type": "string",
            "description": "Start date in YYYY-MM-DD format. Optional; omit for full history."
        },
        "observation_end": {
            "type": "string",
            "description": "End date in YYYY-MM-DD format. Optional."
        }
    });

    vec![
        ToolEntry {
            name: "fetch_series_metadata_tool",
            description: "Fetches metadata for a FRED series (title, units, frequency, \
                          seasonal adjustment, observation range, popularity).",
            input_schema: json!({
                "type": "object",
                "properties": { "series_id": series_id_prop.clone() },
                "required": ["series_id"]
            }),
            handler: Arc::new(SeriesMetadataTool { context: context.clone() }),
        },
        ToolEntry {
            name: "fetch_series_observations_tool",
            description: "Fetches historical observations (date/value pairs) for a FRED \
                          series, optionally within a date window.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "series_id": series_id_prop.clone(),
                    "observation_start": date_props["observation_start"].clone(),
                    "observation_end": date_props["observation_end"].clone()
                },
                "required": ["series_id"]
            }),
            handler: Arc::new(SeriesObservationsTool { context: context.clone() }),
        },
        ToolEntry {
            name: "search_fred_series_tool",
            description: "Searches FRED series by text query; results are ordered by \
                          popularity descending.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "search_text": {
                        "type": "string",
                        "description": "Search query (e.g. 'unemployment', 'inflation')"
                    },
                    "limit": {
                        "type": "integer",
                        "default": 50,
                        "description": "Maximum number of results"
                    }
                },
                "required": ["search_text"]
            }),
            handler: Arc::new(SearchSeriesTool { context: context.clone() }),
        },
        ToolEntry {
            name: "fetch_fred_releases_tool",
            description: "Fetches the list of all FRED data releases.",
            input_schema: json!({ "type": "object", "properties": {} }),
            handler: Arc::new(ReleasesTool { context: context.clone() }),
        },
        ToolEntry {
            name: "fetch_release_details_tool",
            description: "Fetches details for a specific FRED release.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "release_id": {
                        "type": "string",
                        "description": "FRED release ID (e.g. '53' for Gross Domestic Product)"
                    }
                },
                "required": ["release_id"]
            }),
            handler: Arc::new(ReleaseDetailsTool { context: context.clone() }),
        },
        ToolEntry {
            name: "fetch_category_details_tool",
            description: "Fetches details for a specific FRED category.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "category_id": {
                        "type": "string",
                        "description": "FRED category ID (e.g. '32991' for Money, Banking, & Finance)"
                    }
                },
                "required": ["category_id"]
            }),
            handler: Arc::new(CategoryDetailsTool { context: context.clone() }),
        },
        ToolEntry {
            name: "fetch_fred_sources_tool",
            description: "Fetches the list of all FRED data sources.",
            input_schema: json!({ "type": "object", "properties": {} }),
            handler: Arc::new(SourcesTool { context: context.clone() }),
        },
        ToolEntry {
            name: "get_economic_indicator",
            description: "Looks up the most popular FRED series matching an indicator for a \
                          country and returns its latest observation.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "country": {
                        "type": "string",
                        "description": "Country name (e.g. 'United States', 'Germany')"
                    },
                    "indicator": {
                        "type": "string",
                        "description": "Indicator name (e.g. 'unemployment rate', 'GDP')"
                    }
                },
                "required": ["country", "indicator"]
            }),
            handler: Arc::new(EconomicIndicatorTool { context: context.clone() }),
        },
        ToolEntry {
            name: "compare_economies",
            description: "Compares the latest value of an economic indicator between two \
                          countries using the most popular matching FRED series for each.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "country1": { "type": "string", "description": "First country" },
                    "country2": { "type": "string", "description": "Second country" },
                    "indicator": {
                        "type": "string",
                        "default": "GDP",
                        "description": "Indicator to compare (default 'GDP')"
                    }
                },
                "required": ["country1", "country2"]
            }),
            handler: Arc::new(CompareEconomiesTool { context: context.clone() }),
        },
    ]
}

fn fetch_stamp() -> String {
    Utc::now().to_rfc3339()
}

/// Release/category ids arrive as strings from some clients and numbers
/// from others; accept both.
fn coerce_id(value: &Value, field: &str) -> Result<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| Error::invalid_params(format!("{field} must be an integer"))),
        Value::String(s) => s
            .parse::<i64>()
            .map_err(|_| Error::invalid_params(format!("{field} must be an integer, got {s:?}"))),
        other => Err(Error::invalid_params(format!(
            "{field} must be an integer, got {other}"
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct SeriesIdArgs {
    series_id: String,
}

struct SeriesMetadataTool {
    context: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for SeriesMetadataTool {
    async fn handle(&self, args: Value, extra: RequestHandlerExtra) -> Result<String> {
        let params: SeriesIdArgs = decode_args(args)?;
        let id = SeriesId::new(&params.series_id)?;
        let meta = cancellable(&extra, self.context.gateway.series_meta(&id)).await?;
        to_payload(&json!({
            "tool": "fetch_series_metadata",
            "series_id": params.series_id,
            "data": meta,
            "metadata": { "fetch_date": fetch_stamp() }
        }))
    }
}

#[derive(Debug, Deserialize)]
struct ObservationsArgs {
    series_id: String,
    observation_start: Option<String>,
    observation_end: Option<String>,
}

struct SeriesObservationsTool {
    context: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for SeriesObservationsTool {
    async fn handle(&self, args: Value, extra: RequestHandlerExtra) -> Result<String> {
        let params: ObservationsArgs = decode_args(args)?;
        let id = SeriesId::new(&params.series_id)?;
        let start = parse_date_arg(params.observation_start.as_deref(), "observation_start")?;
        let end = parse_date_arg(params.observation_end.as_deref(), "observation_end")?;

        let observations =
            cancellable(&extra, self.context.gateway.observations(&id, start, end)).await?;

        let window = match (observations.first(), observations.last()) {
            (Some(first), Some(last)) => json!({ "start": first.date, "end": last.date }),
            _ => json!({ "start": null, "end": null }),
        };
        let total_count = observations.len();

        to_payload(&json!({
            "tool": "fetch_series_observations",
            "series_id": params.series_id,
            "data": observations,
            "metadata": {
                "fetch_date": fetch_stamp(),
                "observation_start": params.observation_start.as_deref().unwrap_or("all"),
                "observation_end": params.observation_end.as_deref().unwrap_or("latest"),
                "total_count": total_count,
                "date_range": window
            }
        }))
    }
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    search_text: String,
    #[serde(default = "default_search_limit")]
    limit: usize,
}

fn default_search_limit() -> usize {
    50
}

struct SearchSeriesTool {
    context: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for SearchSeriesTool {
    async fn handle(&self, args: Value, extra: RequestHandlerExtra) -> Result<String> {
        let params: SearchArgs = decode_args(args)?;
        if params.search_text.trim().is_empty() {
            return Err(Error::invalid_params("search_text must not be empty"));
        }
        let results = cancellable(
            &extra,
            self.context.gateway.search(&params.search_text, params.limit),
        )
        .await?;
        let returned_count = results.len();
        to_payload(&json!({
            "tool": "search_fred_series",
            "search_text": params.search_text,
            "data": results,
            "metadata": {
                "fetch_date": fetch_stamp(),
                "returned_count": returned_count
            }
        }))
    }
}

struct ReleasesTool {
    context: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for ReleasesTool {
    async fn handle(&self, _args: Value, extra: RequestHandlerExtra) -> Result<String> {
        let releases = cancellable(&extra, self.context.gateway.releases()).await?;
        let total_count = releases.len();
        to_payload(&json!({
            "tool": "fetch_fred_releases",
            "data": releases,
            "metadata": {
                "fetch_date": fetch_stamp(),
                "total_count": total_count
            }
        }))
    }
}

#[derive(Debug, Deserialize)]
struct ReleaseDetailsArgs {
    release_id: Value,
}

struct ReleaseDetailsTool {
    context: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for ReleaseDetailsTool {
    async fn handle(&self, args: Value, extra: RequestHandlerExtra) -> Result<String> {
        let params: ReleaseDetailsArgs = decode_args(args)?;
        let release_id = coerce_id(&params.release_id, "release_id")?;
        let release =
            cancellable(&extra, self.context.gateway.release_details(release_id)).await?;
        to_payload(&json!({
            "tool": "fetch_release_details",
            "release_id": release_id,
            "data": release,
            "metadata": { "fetch_date": fetch_stamp() }
        }))
    }
}

#[derive(Debug, Deserialize)]
struct CategoryDetailsArgs {
    category_id: Value,
}

struct CategoryDetailsTool {
    context: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for CategoryDetailsTool {
    async fn handle(&self, args: Value, extra: RequestHandlerExtra) -> Result<String> {
        let params: CategoryDetailsArgs = decode_args(args)?;
        let category_id = coerce_id(&params.category_id, "category_id")?;
        let category =
            cancellable(&extra, self.context.gateway.category_details(category_id)).await?;
        to_payload(&json!({
            "tool": "fetch_category_details",
            "category_id": category_id,
            "data": category,
            "metadata": { "fetch_date": fetch_stamp() }
        }))
    }
}

struct SourcesTool {
    context: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for SourcesTool {
    async fn handle(&self, _args: Value, extra: RequestHandlerExtra) -> Result<String> {
        let sources = cancellable(&extra, self.context.gateway.sources()).await?;
        let total_count = sources.len();
        to_payload(&json!({
            "tool": "fetch_fred_sources",
            "data": sources,
            "metadata": {
                "fetch_date": fetch_stamp(),
                "total_count": total_count
            }
        }))
    }
}

#[derive(Debug, Deserialize)]
struct IndicatorArgs {
    country: String,
    indicator: String,
}

struct EconomicIndicatorTool {
    context: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for EconomicIndicatorTool {
    async fn handle(&self, args: Value, extra: RequestHandlerExtra) -> Result<String> {
        let params: IndicatorArgs = decode_args(args)?;
        let snapshot = cancellable(
            &extra,
            indicator_snapshot(&self.context, &params.country, &params.indicator),
        )
        .await?;
        to_payload(&json!({
            "tool": "get_economic_indicator",
            "country": params.country,
            "indicator": params.indicator,
            "data": snapshot,
            "metadata": { "fetch_date": fetch_stamp() }
        }))
    }
}

#[derive(Debug, Deserialize)]
struct CompareArgs {
    country1: String,
    country2: String,
    #[serde(default = "default_indicator")]
    indicator: String,
}

fn default_indicator() -> String {
    "GDP".to_string()
}

struct CompareEconomiesTool {
    context: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for CompareEconomiesTool {
    async fn handle(&self, args: Value, extra: RequestHandlerExtra) -> Result<String> {
        let params: CompareArgs = decode_args(args)?;
        let (first, second) = cancellable(&extra, async {
            tokio::try_join!(
                indicator_snapshot(&self.context, &params.country1, &params.indicator),
                indicator_snapshot(&self.context, &params.country2, &params.indicator),
            )
        })
        .await?;

        to_payload(&json!({
            "tool": "compare_economies",
            "indicator": params.indicator,
            "country1": { "name": params.country1, "data": first },
            "country2": { "name": params.country2, "data": second },
            "metadata": { "fetch_date": fetch_stamp() }
        }))
    }
}

/// The most popular series matching "<indicator> <country>" and its latest
/// observation.
async fn indicator_snapshot(
    context: &ToolContext,
    country: &str,
    indicator: &str,
) -> Result<Value> {
    let query = format!("{indicator} {country}");
    let matches = context.gateway.search(&query, 5).await?;
    let best = matches.into_iter().next().ok_or_else(|| {
        Error::not_found(format!("no FRED series matches {query:?}"))
    })?;

    // The metadata's observation_end pins the latest observation without
    // pulling the whole history.
    let observations = context
        .gateway
        .observations(&best.id, best.observation_end, best.observation_end)
        .await?;
    let latest = observations.iter().rev().find_map(|o| o.value.map(|v| (o.date, v)));

    Ok(json!({
        "series_id": best.id,
        "title": best.title,
        "units": best.units,
        "frequency": best.frequency,
        "popularity": best.popularity,
        "latest_date": latest.map(|(date, _)| date),
        "latest_value": latest.map(|(_, value)| value),
    }))
}
