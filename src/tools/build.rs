//! Dataset construction tools.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::{decode_args, parse_date_arg, to_payload, ToolContext, ToolEntry, ToolHandler};
use crate::dataset::{BuildRequest, MergeStrategy};
use crate::error::{Error, Result};
use crate::fred::SeriesId;
use crate::server::cancellation::RequestHandlerExtra;
use crate::transform::Transform;

/// Registry entries for this module.
pub fn entries(context: &Arc<ToolContext>) -> Vec<ToolEntry> {
    vec![
        ToolEntry {
            name: "build_fred_dataset_tool",
            description: "Builds a unified macroeconomic dataset from multiple FRED series: \
                          downloads each series, merges them on date, applies per-series \
                          transformations (YoY, QoQ, MoM, diff, pct_change, log, log_diff) \
                          and saves CSV + XLSX + metadata JSON.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "series_list": {
                        "type": "array",
                        "items": { "type": "string" },
                        "minItems": 1,
                        "description": "FRED series IDs (e.g. ['UNRATE', 'CPIAUCSL', 'GDP'])"
                    },
                    "transformations": {
                        "type": "object",
                        "additionalProperties": {
                            "type": "string",
                            "enum": ["none", "YoY", "QoQ", "MoM", "diff", "pct_change", "log", "log_diff"]
                        },
                        "description": "Map of series ID to transformation; omitted series stay raw. \
                                        Example: {\"CPIAUCSL\": \"YoY\", \"GDP\": \"QoQ\"}"
                    },
                    "observation_start": {
                        "type": "string",
                        "description": "Start date in YYYY-MM-DD format. Optional."
                    },
                    "observation_end": {
                        "type": "string",
                        "description": "End date in YYYY-MM-DD format. Optional."
                    },
                    "merge_strategy": {
                        "type": "string",
                        "enum": ["inner", "outer", "left", "right"],
                        "default": "inner",
                        "description": "How to combine series dates: 'inner' keeps only common dates"
                    }
                },
                "required": ["series_list"]
            }),
            handler: Arc::new(BuildDatasetTool { context: context.clone() }),
        },
        ToolEntry {
            name: "find_dataset_tool",
            description: "Finds the most recent dataset containing all of the given columns \
                          (including transformation suffixes like 'CPIAUCSL_YoY').",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "columns": {
                        "type": "array",
                        "items": { "type": "string" },
                        "minItems": 1,
                        "description": "Column names that must all be present"
                    }
                },
                "required": ["columns"]
            }),
            handler: Arc::new(FindDatasetTool { context: context.clone() }),
        },
    ]
}

#[derive(Debug, Deserialize)]
struct BuildArgs {
    series_list: Vec<String>,
    #[serde(default)]
    transformations: Option<HashMap<String, String>>,
    observation_start: Option<String>,
    observation_end: Option<String>,
    merge_strategy: Option<String>,
}

struct BuildDatasetTool {
    context: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for BuildDatasetTool {
    async fn handle(&self, args: Value, extra: RequestHandlerExtra) -> Result<String> {
        let params: BuildArgs = decode_args(args)?;

        let series_list = params
            .series_list
            .iter()
            .map(SeriesId::new)
            .collect::<Result<Vec<_>>>()?;

        let transformations = params
            .transformations
            .unwrap_or_default()
            .into_iter()
            .map(|(series, tag)| Ok((series, tag.parse::<Transform>()?)))
            .collect::<Result<HashMap<String, Transform>>>()?;

        let merge_strategy = match params.merge_strategy.as_deref() {
            None => MergeStrategy::default(),
            Some(raw) => raw.parse::<MergeStrategy>()?,
        };

        let request = BuildRequest {
            series_list,
            transformations,
            observation_start: parse_date_arg(
                params.observation_start.as_deref(),
                "observation_start",
            )?,
            observation_end: parse_date_arg(params.observation_end.as_deref(), "observation_end")?,
            merge_strategy,
        };

        // The builder owns cancellation checks; a cancel mid-build removes
        // partial artifacts before this returns.
        let summary = self
            .context
            .builder
            .build(&request, &extra.cancellation_token)
            .await?;

        to_payload(&json!({
            "tool": "build_fred_dataset",
            "status": "success",
            "dataset": summary,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct FindDatasetArgs {
    columns: Vec<String>,
}

struct FindDatasetTool {
    context: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for FindDatasetTool {
    async fn handle(&self, args: Value, _extra: RequestHandlerExtra) -> Result<String> {
        let params: FindDatasetArgs = decode_args(args)?;
        if params.columns.is_empty() {
            return Err(Error::invalid_params("columns must not be empty"));
        }

        let catalog = self.context.catalog.clone();
        let columns = params.columns.clone();
        let found = tokio::task::spawn_blocking(move || catalog.find_with_columns(&columns))
            .await
            .map_err(|e| Error::internal(format!("catalog scan panicked: {e}")))??;

        match found {
            Some(metadata) => to_payload(&json!({
                "tool": "find_dataset",
                "status": "success",
                "columns": params.columns,
                "dataset": metadata,
            })),
            None => to_payload(&json!({
                "tool": "find_dataset",
                "status": "not_found",
                "columns": params.columns,
                "message": "no dataset contains all requested columns; build one with build_fred_dataset_tool",
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_args_decode_the_spec_payload() {
        let args: BuildArgs = serde_json::from_value(json!({
            "series_list": ["UNRATE", "CPIAUCSL", "GDP"],
            "transformations": {"CPIAUCSL": "YoY", "GDP": "QoQ"},
            "observation_start": "2000-01-01",
            "observation_end": null,
            "merge_strategy": "inner"
        }))
        .unwrap();
        assert_eq!(args.series_list.len(), 3);
        assert_eq!(args.observation_start.as_deref(), Some("2000-01-01"));
        assert_eq!(args.observation_end, None);
        assert_eq!(args.merge_strategy.as_deref(), Some("inner"));
    }

    #[test]
    fn unknown_transformation_tag_is_invalid() {
        let tags: HashMap<String, String> =
            HashMap::from([("GDP".to_string(), "YoY2".to_string())]);
        let parsed: Result<HashMap<String, Transform>> = tags
            .into_iter()
            .map(|(k, v)| Ok((k, v.parse::<Transform>()?)))
            .collect();
        assert!(parsed.is_err());
    }
}
