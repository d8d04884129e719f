//! Recent-datasets catalog.
//!
//! The catalog owns no state: every read re-projects the on-disk layout.
//! A dataset folder counts only when its metadata sidecar exists and
//! parses; the sidecar is the builder's commit marker, so a folder without
//! one is an in-flight or aborted build and is skipped.
//!
//! This resource exists so a stateless caller can resolve references like
//! "plot UNRATE vs CPIAUCSL_YoY" across sessions without recomputing.

use chrono::{DateTime, FixedOffset};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::builder::{DatasetMetadata, DATASET_PREFIX};
use crate::error::Result;

/// Default number of datasets listed by the resource.
pub const DEFAULT_LIMIT: usize = 10;

/// Read-only projection of the dataset folders under a data root.
#[derive(Debug, Clone)]
pub struct DatasetCatalog {
    root: PathBuf,
}

impl DatasetCatalog {
    /// Create a catalog over the given data root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// All committed datasets, newest first.
    pub fn scan(&self) -> Result<Vec<DatasetMetadata>> {
        let mut found: Vec<(DateTime<FixedOffset>, DatasetMetadata)> = Vec::new();

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            // A missing root just means nothing has been built yet.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(dir_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !dir_name.starts_with(DATASET_PREFIX) {
                continue;
            }

            match read_sidecar(&path) {
                Some((created_at, metadata)) => found.push((created_at, metadata)),
                None => {
                    debug!(dir = %path.display(), "skipping dataset without readable sidecar");
                },
            }
        }

        found.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(found.into_iter().map(|(_, metadata)| metadata).collect())
    }

    /// The `limit` most recent datasets.
    pub fn recent(&self, limit: usize) -> Result<Vec<DatasetMetadata>> {
        let mut datasets = self.scan()?;
        datasets.truncate(limit);
        Ok(datasets)
    }

    /// The newest dataset, if any exists.
    pub fn most_recent(&self) -> Result<Option<DatasetMetadata>> {
        Ok(self.scan()?.into_iter().next())
    }

    /// The newest dataset containing every requested column.
    pub fn find_with_columns(&self, columns: &[String]) -> Result<Option<DatasetMetadata>> {
        Ok(self
            .scan()?
            .into_iter()
            .find(|metadata| columns.iter().all(|c| metadata.columns.contains(c))))
    }

    /// The committed sidecar of a specific dataset folder. Errors with
    /// `incomplete_dataset` when the folder has no readable sidecar, which
    /// is the one place (plot-from-dataset) where that is a hard failure
    /// rather than a skip.
    pub fn sidecar_for_dir(&self, dir: &Path) -> Result<DatasetMetadata> {
        read_sidecar(dir).map(|(_, metadata)| metadata).ok_or_else(|| {
            crate::error::Error::IncompleteDataset(format!(
                "{} has no readable metadata sidecar; the dataset is incomplete",
                dir.display()
            ))
        })
    }

    /// Human-readable listing for the `fred://datasets/recent` resource.
    pub fn render_listing(&self, limit: usize) -> Result<String> {
        let datasets = self.recent(limit)?;
        if datasets.is_empty() {
            return Ok(format!(
                "No datasets found under {}.\n\nBuild one with build_fred_dataset_tool, \
                 e.g. series_list=[\"UNRATE\", \"CPIAUCSL\"].",
                self.root.display()
            ));
        }

        let mut lines = vec![format!("RECENT DATASETS (latest {})", datasets.len()), String::new()];
        for (i, metadata) in datasets.iter().enumerate() {
            lines.push(format!("{}. {}", i + 1, metadata.name));
            lines.push(format!("   Created: {}", metadata.created_at));
            if let (Some(start), Some(end)) =
                (metadata.observation_start, metadata.observation_end)
            {
                lines.push(format!("   Period: {start} to {end}"));
            }
            lines.push(format!("   Rows: {}", metadata.row_count));
            lines.push(format!("   Columns: {}", metadata.columns.join(", ")));
            let applied: Vec<String> = metadata
                .transformations
                .iter()
                .filter(|(_, tag)| tag.as_str() != "none")
                .map(|(series, tag)| format!("{series} -> {tag}"))
                .collect();
            if !applied.is_empty() {
                lines.push(format!("   Transformations: {}", applied.join(", ")));
            }
            lines.push(format!("   Path: {}", metadata.csv_path.display()));
            lines.push(String::new());
        }
        lines.push(
            "To plot columns from a dataset use plot_from_dataset_tool(column_left=..., \
             column_right=...); without dataset_path it uses the most recent match."
                .to_string(),
        );
        Ok(lines.join("\n"))
    }
}

/// Read the newest parseable sidecar in a dataset folder.
fn read_sidecar(dir: &Path) -> Option<(DateTime<FixedOffset>, DatasetMetadata)> {
    let mut newest: Option<(DateTime<FixedOffset>, DatasetMetadata)> = None;

    for entry in fs::read_dir(dir).ok()?.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.contains("_metadata_") || !name.ends_with(".json") {
            continue;
        }
        let Ok(body) = fs::read_to_string(&path) else {
            continue;
        };
        let Ok(metadata) = serde_json::from_str::<DatasetMetadata>(&body) else {
            continue;
        };
        let Ok(created_at) = DateTime::parse_from_rfc3339(&metadata.created_at) else {
            continue;
        };
        let newer = newest
            .as_ref()
            .map(|(current, _)| created_at > *current)
            .unwrap_or(true);
        if newer {
            newest = Some((created_at, metadata));
        }
    }

    newest
}
