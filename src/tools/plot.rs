//! Plot tools.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

use super::{cancellable, decode_args, parse_date_arg, to_payload, ToolContext, ToolEntry, ToolHandler};
use crate::error::Result;
use crate::fred::SeriesId;
use crate::server::cancellation::RequestHandlerExtra;

/// Registry entries for this module.
pub fn entries(context: &Arc<ToolContext>) -> Vec<ToolEntry> {
    let color_props = json!({
        "left_color": {
            "type": "string",
            "description": "Hex color for the left series (default '#2E5090')"
        },
        "right_color": {
            "type": "string",
            "description": "Hex color for the right series (default '#C1272D')"
        }
    });

    vec![
        ToolEntry {
            name: "plot_fred_series_tool",
            description: "Creates a time-series line chart of a FRED series and saves it as \
                          PNG together with CSV/XLSX exports of the plotted window.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "series_id": {
                        "type": "string",
                        "description": "FRED series ID (e.g. 'GDP', 'CPIAUCSL', 'UNRATE')"
                    },
                    "observation_start": {
                        "type": "string",
                        "description": "Start date in YYYY-MM-DD format. Optional."
                    },
                    "observation_end": {
                        "type": "string",
                        "description": "End date in YYYY-MM-DD format. Optional."
                    }
                },
                "required": ["series_id"]
            }),
            handler: Arc::new(PlotSeriesTool { context: context.clone() }),
        },
        ToolEntry {
            name: "plot_dual_axis_tool",
            description: "Compares two FRED series on a dual-axis chart: left Y-axis for the \
                          first series, right Y-axis for the second, aligned on shared dates.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "series_id_left": {
                        "type": "string",
                        "description": "FRED series ID for the left Y-axis (e.g. 'UNRATE')"
                    },
                    "series_id_right": {
                        "type": "string",
                        "description": "FRED series ID for the right Y-axis (e.g. 'CPIAUCSL')"
                    },
                    "observation_start": {
                        "type": "string",
                        "description": "Start date in YYYY-MM-DD format. Optional."
                    },
                    "observation_end": {
                        "type": "string",
                        "description": "End date in YYYY-MM-DD format. Optional."
                    },
                    "left_color": color_props["left_color"].clone(),
                    "right_color": color_props["right_color"].clone()
                },
                "required": ["series_id_left", "series_id_right"]
            }),
            handler: Arc::new(PlotDualAxisTool { context: context.clone() }),
        },
        ToolEntry {
            name: "analyze_differencing_tool",
            description: "Analyzes stationarity of a FRED series: plots the level, first and \
                          second differences and runs an augmented Dickey-Fuller test on each, \
                          returning test statistics, p-values and critical values.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "series_id": {
                        "type": "string",
                        "description": "FRED series ID (e.g. 'GDP', 'CPIAUCSL', 'UNRATE')"
                    },
                    "observation_start": {
                        "type": "string",
                        "description": "Start date in YYYY-MM-DD format. Optional."
                    },
                    "observation_end": {
                        "type": "string",
                        "description": "End date in YYYY-MM-DD format. Optional."
                    }
                },
                "required": ["series_id"]
            }),
            handler: Arc::new(AnalyzeDifferencingTool { context: context.clone() }),
        },
        ToolEntry {
            name: "plot_from_dataset_tool",
            description: "Plots two columns from a previously built dataset on a dual-axis \
                          chart without re-downloading anything. Column names include \
                          transformation suffixes (e.g. 'CPIAUCSL_YoY'). Without dataset_path \
                          the most recent dataset containing both columns is used.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "column_left": {
                        "type": "string",
                        "description": "Column for the left Y-axis (e.g. 'UNRATE')"
                    },
                    "column_right": {
                        "type": "string",
                        "description": "Column for the right Y-axis (e.g. 'CPIAUCSL_YoY')"
                    },
                    "dataset_path": {
                        "type": "string",
                        "description": "Path to the dataset CSV. Optional; defaults to the most \
                                        recent dataset containing both columns."
                    },
                    "left_color": color_props["left_color"].clone(),
                    "right_color": color_props["right_color"].clone()
                },
                "required": ["column_left", "column_right"]
            }),
            handler: Arc::new(PlotFromDatasetTool { context: context.clone() }),
        },
    ]
}

#[derive(Debug, Deserialize)]
struct PlotSeriesArgs {
    series_id: String,
    observation_start: Option<String>,
    observation_end: Option<String>,
}

struct PlotSeriesTool {
    context: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for PlotSeriesTool {
    async fn handle(&self, args: Value, extra: RequestHandlerExtra) -> Result<String> {
        let params: PlotSeriesArgs = decode_args(args)?;
        let id = SeriesId::new(&params.series_id)?;
        let start = parse_date_arg(params.observation_start.as_deref(), "observation_start")?;
        let end = parse_date_arg(params.observation_end.as_deref(), "observation_end")?;

        let outcome =
            cancellable(&extra, self.context.plots.plot_series(&id, start, end)).await?;
        to_payload(&json!({
            "tool": "plot_fred_series",
            "status": "success",
            "result": outcome,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct DualAxisArgs {
    series_id_left: String,
    series_id_right: String,
    observation_start: Option<String>,
    observation_end: Option<String>,
    left_color: Option<String>,
    right_color: Option<String>,
}

struct PlotDualAxisTool {
    context: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for PlotDualAxisTool {
    async fn handle(&self, args: Value, extra: RequestHandlerExtra) -> Result<String> {
        let params: DualAxisArgs = decode_args(args)?;
        let left = SeriesId::new(&params.series_id_left)?;
        let right = SeriesId::new(&params.series_id_right)?;
        let start = parse_date_arg(params.observation_start.as_deref(), "observation_start")?;
        let end = parse_date_arg(params.observation_end.as_deref(), "observation_end")?;

        let outcome = cancellable(
            &extra,
            self.context.plots.plot_dual_axis(
                &left,
                &right,
                start,
                end,
                params.left_color.as_deref(),
                params.right_color.as_deref(),
            ),
        )
        .await?;
        to_payload(&json!({
            "tool": "plot_dual_axis",
            "status": "success",
            "result": outcome,
        }))
    }
}

struct AnalyzeDifferencingTool {
    context: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for AnalyzeDifferencingTool {
    async fn handle(&self, args: Value, extra: RequestHandlerExtra) -> Result<String> {
        let params: PlotSeriesArgs = decode_args(args)?;
        let id = SeriesId::new(&params.series_id)?;
        let start = parse_date_arg(params.observation_start.as_deref(), "observation_start")?;
        let end = parse_date_arg(params.observation_end.as_deref(), "observation_end")?;

        let outcome = cancellable(
            &extra,
            self.context.plots.analyze_differencing(&id, start, end),
        )
        .await?;
        to_payload(&json!({
            "tool": "analyze_differencing",
            "status": "success",
            "result": outcome,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct PlotFromDatasetArgs {
    column_left: String,
    column_right: String,
    dataset_path: Option<String>,
    left_color: Option<String>,
    right_color: Option<String>,
}

struct PlotFromDatasetTool {
    context: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for PlotFromDatasetTool {
    async fn handle(&self, args: Value, extra: RequestHandlerExtra) -> Result<String> {
        let params: PlotFromDatasetArgs = decode_args(args)?;
        let dataset_path = params.dataset_path.as_ref().map(PathBuf::from);

        let outcome = cancellable(
            &extra,
            self.context.plots.plot_from_dataset(
                &params.column_left,
                &params.column_right,
                dataset_path.as_deref(),
                params.left_color.as_deref(),
                params.right_color.as_deref(),
            ),
        )
        .await?;
        to_payload(&json!({
            "tool": "plot_from_dataset",
            "status": "success",
            "result": outcome,
        }))
    }
}
