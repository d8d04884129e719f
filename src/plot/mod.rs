//! Plot Service: chart generation with data exports.
//!
//! Four operations: single-series, dual-axis, differencing analysis and
//! dataset-column plots. Every operation returns the file paths it wrote,
//! never image bytes. Fetching operations piggyback a Series Store write so
//! the plotted window is also available as CSV/XLSX.

pub mod adf;
pub mod render;

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::dataset::catalog::DatasetCatalog;
use crate::dataset::table::DataTable;
use crate::error::{Error, Result};
use crate::fred::gateway::DATE_FORMAT;
use crate::fred::{FredGateway, Series, SeriesId};
use crate::store::{today_stamp, SeriesStore};
use crate::transform::Transform;
use adf::AdfResult;
use render::{SeriesLine, DEFAULT_LEFT_COLOR, DEFAULT_RIGHT_COLOR};

/// Result of a single-series plot.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesPlotOutcome {
    /// Series id
    pub series_id: String,
    /// Series title from metadata
    pub title: String,
    /// Chart path
    pub plot_path: PathBuf,
    /// Plotted-window CSV export
    pub csv_path: PathBuf,
    /// Plotted-window XLSX export
    pub xlsx_path: PathBuf,
    /// First plotted date
    pub observation_start: NaiveDate,
    /// Last plotted date
    pub observation_end: NaiveDate,
    /// Number of plotted observations
    pub n_obs: usize,
}

/// Result of a dual-axis plot.
#[derive(Debug, Clone, Serialize)]
pub struct DualAxisOutcome {
    /// Left-axis series id
    pub series_id_left: String,
    /// Right-axis series id
    pub series_id_right: String,
    /// Chart path
    pub plot_path: PathBuf,
    /// Data exports for both series
    pub data_paths: Vec<PathBuf>,
    /// First shared date
    pub observation_start: NaiveDate,
    /// Last shared date
    pub observation_end: NaiveDate,
    /// Number of shared observations
    pub n_obs: usize,
}

/// Result of a differencing analysis.
#[derive(Debug, Clone, Serialize)]
pub struct DifferencingOutcome {
    /// Series id
    pub series_id: String,
    /// Series title from metadata
    pub title: String,
    /// Export of level, first and second differences
    pub csv_path: PathBuf,
    /// XLSX sibling
    pub xlsx_path: PathBuf,
    /// Level chart
    pub level_plot: PathBuf,
    /// First-difference chart
    pub first_diff_plot: PathBuf,
    /// Second-difference chart
    pub second_diff_plot: PathBuf,
    /// ADF results keyed `original`, `first_diff`, `second_diff`
    pub adf: BTreeMap<String, AdfResult>,
}

/// Result of a dataset-column plot.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetPlotOutcome {
    /// Left-axis column
    pub column_left: String,
    /// Right-axis column
    pub column_right: String,
    /// Dataset CSV the columns came from
    pub dataset_path: PathBuf,
    /// Chart path
    pub plot_path: PathBuf,
    /// First plotted date
    pub observation_start: NaiveDate,
    /// Last plotted date
    pub observation_end: NaiveDate,
    /// Number of plotted rows
    pub n_obs: usize,
}

/// The Plot Service.
#[derive(Debug, Clone)]
pub struct PlotService {
    gateway: FredGateway,
    store: SeriesStore,
    catalog: DatasetCatalog,
}

impl PlotService {
    /// Create a service fetching through `gateway` and writing under the
    /// store's root.
    pub fn new(gateway: FredGateway, store: SeriesStore, catalog: DatasetCatalog) -> Self {
        Self { gateway, store, catalog }
    }

    /// Fetch a series and render a single-axis line chart, persisting the
    /// plotted window as CSV/XLSX next to it.
    pub async fn plot_series(
        &self,
        id: &SeriesId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<SeriesPlotOutcome> {
        let series = self.fetch_nonempty(id, start, end).await?;
        let (window_start, window_end) = series
            .observed_window()
            .ok_or_else(|| Error::not_found(format!("no observations for {id}")))?;

        let store = self.store.clone();
        let title = format!("{} ({})", series.meta.title, series.meta.units);
        let label = series.meta.id.to_string();
        let points = non_null_points(&series);
        if points.is_empty() {
            return Err(Error::not_found(format!(
                "{id} has no non-null observations in the requested window"
            )));
        }

        let outcome = tokio::task::spawn_blocking(move || -> Result<SeriesPlotOutcome> {
            let artifacts = store
                .save_series(&series)?
                .ok_or_else(|| Error::not_found(format!("{label} returned no data")))?;
            let plot_path = store.plot_path(&series.meta.id, window_start, window_end)?;
            let line = SeriesLine {
                label: label.clone(),
                color: render::parse_hex_color(DEFAULT_LEFT_COLOR)?,
                points,
            };
            render::render_line(&plot_path, &title, &line)?;
            Ok(SeriesPlotOutcome {
                series_id: label,
                title,
                plot_path,
                csv_path: artifacts.csv_path,
                xlsx_path: artifacts.xlsx_path,
                observation_start: window_start,
                observation_end: window_end,
                n_obs: line.points.len(),
            })
        })
        .await
        .map_err(|e| Error::internal(format!("plot task panicked: {e}")))??;

        info!(series = %outcome.series_id, plot = %outcome.plot_path.display(), "series plotted");
        Ok(outcome)
    }

    /// Fetch two series, align them on their date intersection and render a
    /// dual-axis chart.
    pub async fn plot_dual_axis(
        &self,
        id_left: &SeriesId,
        id_right: &SeriesId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        color_left: Option<&str>,
        color_right: Option<&str>,
    ) -> Result<DualAxisOutcome> {
        let left_color = render::parse_hex_color(color_left.unwrap_or(DEFAULT_LEFT_COLOR))?;
        let right_color = render::parse_hex_color(color_right.unwrap_or(DEFAULT_RIGHT_COLOR))?;

        let (left, right) = tokio::try_join!(
            self.fetch_nonempty(id_left, start, end),
            self.fetch_nonempty(id_right, start, end),
        )?;

        // Intersection of dates where both series have values.
        let right_by_date: std::collections::HashMap<NaiveDate, f64> = right
            .observations
            .iter()
            .filter_map(|o| o.value.map(|v| (o.date, v)))
            .collect();
        let mut left_points = Vec::new();
        let mut right_points = Vec::new();
        for observation in &left.observations {
            if let (Some(left_value), Some(right_value)) = (
                observation.value,
                right_by_date.get(&observation.date).copied(),
            ) {
                left_points.push((observation.date, left_value));
                right_points.push((observation.date, right_value));
            }
        }

        if left_points.is_empty() {
            return Err(Error::EmptyIntersection(format!(
                "{id_left} and {id_right} share no dates with values in the requested window"
            )));
        }
        let window_start = left_points[0].0;
        let window_end = left_points[left_points.len() - 1].0;

        let store = self.store.clone();
        let title = format!("{id_left} vs {id_right}");
        let left_label = id_left.to_string();
        let right_label = id_right.to_string();

        let outcome = tokio::task::spawn_blocking(move || -> Result<DualAxisOutcome> {
            let mut data_paths = Vec::new();
            for series in [&left, &right] {
                if let Some(artifacts) = store.save_series(series)? {
                    data_paths.push(artifacts.csv_path);
                    data_paths.push(artifacts.xlsx_path);
                }
            }

            let plot_path = store.plot_path(&left.meta.id, window_start, window_end)?;
            render::render_dual_axis(
                &plot_path,
                &title,
                &SeriesLine { label: left_label.clone(), color: left_color, points: left_points.clone() },
                &SeriesLine { label: right_label.clone(), color: right_color, points: right_points },
            )?;

            Ok(DualAxisOutcome {
                series_id_left: left_label,
                series_id_right: right_label,
                plot_path,
                data_paths,
                observation_start: window_start,
                observation_end: window_end,
                n_obs: left_points.len(),
            })
        })
        .await
        .map_err(|e| Error::internal(format!("plot task panicked: {e}")))??;

        info!(
            left = %outcome.series_id_left,
            right = %outcome.series_id_right,
            plot = %outcome.plot_path.display(),
            "dual-axis plot generated"
        );
        Ok(outcome)
    }

    /// Level / first-difference / second-difference plots with an augmented
    /// Dickey–Fuller test on each.
    pub async fn analyze_differencing(
        &self,
        id: &SeriesId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<DifferencingOutcome> {
        let series = self.fetch_nonempty(id, start, end).await?;
        let (window_start, window_end) = series
            .observed_window()
            .ok_or_else(|| Error::not_found(format!("no observations for {id}")))?;

        let values: Vec<Option<f64>> = series.observations.iter().map(|o| o.value).collect();
        let first_diff = Transform::Diff.apply(&values);
        let second_diff = Transform::Diff.apply(&first_diff);

        let table = DataTable {
            dates: series.observations.iter().map(|o| o.date).collect(),
            columns: vec![
                crate::dataset::table::Column { name: "value".into(), values: values.clone() },
                crate::dataset::table::Column { name: "first_diff".into(), values: first_diff.clone() },
                crate::dataset::table::Column { name: "second_diff".into(), values: second_diff.clone() },
            ],
        };

        let mut adf_results = BTreeMap::new();
        for (key, column) in [
            ("original", &values),
            ("first_diff", &first_diff),
            ("second_diff", &second_diff),
        ] {
            let clean: Vec<f64> = column.iter().copied().flatten().collect();
            adf_results.insert(key.to_string(), adf::adf_test(&clean)?);
        }

        let store = self.store.clone();
        let id_owned = series.meta.id.clone();
        let title = series.meta.title.clone();
        let dates: Vec<NaiveDate> = series.observations.iter().map(|o| o.date).collect();

        let outcome = tokio::task::spawn_blocking(move || -> Result<DifferencingOutcome> {
            let artifacts = store
                .save_differencing(&id_owned, &table)?
                .ok_or_else(|| Error::not_found(format!("{id_owned} returned no data")))?;

            let plot_dir = store.plot_dir(&id_owned);
            fs::create_dir_all(&plot_dir)?;
            let stamp = today_stamp();
            let color = render::parse_hex_color(DEFAULT_LEFT_COLOR)?;

            let mut plot_paths = Vec::with_capacity(3);
            for (suffix, caption, column) in [
                ("level", "Level", &values),
                ("first_diff", "First difference", &first_diff),
                ("second_diff", "Second difference", &second_diff),
            ] {
                let path = plot_dir.join(format!(
                    "{}_{}_to_{}_{}_plot_{}.png",
                    id_owned.as_str(),
                    window_start.format(DATE_FORMAT),
                    window_end.format(DATE_FORMAT),
                    suffix,
                    stamp,
                ));
                let points: Vec<(NaiveDate, f64)> = dates
                    .iter()
                    .zip(column.iter())
                    .filter_map(|(date, value)| value.map(|v| (*date, v)))
                    .collect();
                let line = SeriesLine {
                    label: format!("{id_owned} ({suffix})"),
                    color,
                    points,
                };
                render::render_line(&path, &format!("{title} - {caption}"), &line)?;
                plot_paths.push(path);
            }

            let mut plots = plot_paths.into_iter();
            Ok(DifferencingOutcome {
                series_id: id_owned.to_string(),
                title,
                csv_path: artifacts.csv_path,
                xlsx_path: artifacts.xlsx_path,
                level_plot: plots.next().unwrap_or_default(),
                first_diff_plot: plots.next().unwrap_or_default(),
                second_diff_plot: plots.next().unwrap_or_default(),
                adf: adf_results,
            })
        })
        .await
        .map_err(|e| Error::internal(format!("plot task panicked: {e}")))??;

        info!(series = %outcome.series_id, "differencing analysis complete");
        Ok(outcome)
    }

    /// Plot two columns of an existing dataset without any network calls.
    ///
    /// When `dataset_path` is omitted, resolves the most recent dataset
    /// containing both columns through the catalog.
    pub async fn plot_from_dataset(
        &self,
        column_left: &str,
        column_right: &str,
        dataset_path: Option<&Path>,
        color_left: Option<&str>,
        color_right: Option<&str>,
    ) -> Result<DatasetPlotOutcome> {
        let left_color = render::parse_hex_color(color_left.unwrap_or(DEFAULT_LEFT_COLOR))?;
        let right_color = render::parse_hex_color(color_right.unwrap_or(DEFAULT_RIGHT_COLOR))?;

        let csv_path = match dataset_path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::not_found(format!(
                        "dataset {} does not exist",
                        path.display()
                    )));
                }
                crate::store::ensure_under_root(self.store.root(), path)?;
                let dir = path.parent().ok_or_else(|| {
                    Error::invalid_params(format!("{} has no parent directory", path.display()))
                })?;
                // The sidecar is the commit marker; an uncommitted folder is
                // an error here rather than a silent skip.
                self.catalog.sidecar_for_dir(dir)?;
                path.to_path_buf()
            },
            None => {
                let metadata = self
                    .catalog
                    .find_with_columns(&[column_left.to_string(), column_right.to_string()])?
                    .ok_or_else(|| {
                        Error::not_found(format!(
                            "no dataset contains both {column_left:?} and {column_right:?}; \
                             build one with build_fred_dataset_tool"
                        ))
                    })?;
                metadata.csv_path
            },
        };

        let csv_path_owned = csv_path.clone();
        let (column_left, column_right) = (column_left.to_string(), column_right.to_string());
        let title = format!("{column_left} vs {column_right}");

        let outcome = tokio::task::spawn_blocking(move || -> Result<DatasetPlotOutcome> {
            let table = DataTable::read_csv(&csv_path_owned)?;

            for column in [&column_left, &column_right] {
                if table.column(column).is_none() {
                    let available = table.column_names().join(", ");
                    return Err(Error::protocol_with_data(
                        crate::error::ErrorCode::UNKNOWN_COLUMN,
                        format!(
                            "column {column:?} not found in dataset; available columns: {available}"
                        ),
                        serde_json::json!({ "available_columns": table.column_names() }),
                    ));
                }
            }

            let left_values = table
                .column(&column_left)
                .map(|c| c.values.clone())
                .unwrap_or_default();
            let right_values = table
                .column(&column_right)
                .map(|c| c.values.clone())
                .unwrap_or_default();

            let mut left_points = Vec::new();
            let mut right_points = Vec::new();
            for (row, date) in table.dates.iter().enumerate() {
                if let (Some(l), Some(r)) = (left_values[row], right_values[row]) {
                    left_points.push((*date, l));
                    right_points.push((*date, r));
                }
            }
            if left_points.is_empty() {
                return Err(Error::invalid_params(format!(
                    "no rows where both {column_left:?} and {column_right:?} have values"
                )));
            }

            let window_start = left_points[0].0;
            let window_end = left_points[left_points.len() - 1].0;

            let dataset_dir = csv_path_owned
                .parent()
                .ok_or_else(|| Error::internal("dataset path has no parent"))?;
            let plots_dir = dataset_dir.join("plots");
            fs::create_dir_all(&plots_dir)?;
            let plot_path = plots_dir.join(format!(
                "{column_left}_vs_{column_right}_plot_{}.png",
                today_stamp()
            ));

            render::render_dual_axis(
                &plot_path,
                &title,
                &SeriesLine { label: column_left.clone(), color: left_color, points: left_points.clone() },
                &SeriesLine { label: column_right.clone(), color: right_color, points: right_points },
            )?;

            Ok(DatasetPlotOutcome {
                column_left,
                column_right,
                dataset_path: csv_path_owned,
                plot_path,
                observation_start: window_start,
                observation_end: window_end,
                n_obs: left_points.len(),
            })
        })
        .await
        .map_err(|e| Error::internal(format!("plot task panicked: {e}")))??;

        info!(
            left = %outcome.column_left,
            right = %outcome.column_right,
            plot = %outcome.plot_path.display(),
            "dataset columns plotted"
        );
        Ok(outcome)
    }

    async fn fetch_nonempty(
        &self,
        id: &SeriesId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Series> {
        let series = self.gateway.series(id, start, end).await?;
        if series.observations.is_empty() {
            return Err(Error::not_found(format!(
                "no observations for {id} in the requested window"
            )));
        }
        Ok(series)
    }
}

/// Non-null (date, value) pairs of a series.
fn non_null_points(series: &Series) -> Vec<(NaiveDate, f64)> {
    series
        .observations
        .iter()
        .filter_map(|o| o.value.map(|v| (o.date, v)))
        .collect()
}
