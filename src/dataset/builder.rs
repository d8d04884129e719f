//! Multi-series ETL: fetch, align, transform, persist.
//!
//! A build fetches every requested series concurrently (bounded), merges
//! them on the Date index, applies per-series transformations on the merged
//! index, and writes CSV + XLSX + a metadata sidecar. The sidecar is written
//! last and is the commit marker: readers treat a dataset folder without one
//! as incomplete.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::table::{DataTable, MergeStrategy};
use crate::error::{Error, Result};
use crate::fred::gateway::DATE_FORMAT;
use crate::fred::{FredGateway, Series, SeriesId};
use crate::store::today_stamp;
use crate::transform::Transform;

/// Dataset folder name prefix.
pub const DATASET_PREFIX: &str = "FRED_dataset_";

/// Inputs to a dataset build.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Series to fetch, in caller order. Must be non-empty and free of
    /// duplicates.
    pub series_list: Vec<SeriesId>,
    /// Per-series transformations; missing entries default to `none`.
    pub transformations: HashMap<String, Transform>,
    /// Optional window start
    pub observation_start: Option<NaiveDate>,
    /// Optional window end
    pub observation_end: Option<NaiveDate>,
    /// How to combine the series' date indices
    pub merge_strategy: MergeStrategy,
}

/// Metadata sidecar written next to the dataset CSV/XLSX.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetMetadata {
    /// Canonical dataset name (`FRED_dataset_<A>_<B>`)
    pub name: String,
    /// Series ids in caller order
    pub series_list: Vec<String>,
    /// Applied transformations (series id -> tag)
    pub transformations: BTreeMap<String, String>,
    /// Merge strategy used
    pub merge_strategy: MergeStrategy,
    /// First date in the trimmed table
    pub observation_start: Option<NaiveDate>,
    /// Last date in the trimmed table
    pub observation_end: Option<NaiveDate>,
    /// Creation timestamp, UTC ISO-8601
    pub created_at: String,
    /// Absolute CSV path
    pub csv_path: PathBuf,
    /// Absolute XLSX path
    pub xlsx_path: PathBuf,
    /// Data column names (with transformation suffixes)
    pub columns: Vec<String>,
    /// Number of data rows
    pub row_count: usize,
}

/// Result of a successful build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    /// Canonical dataset name
    pub name: String,
    /// Absolute CSV path
    pub csv_path: PathBuf,
    /// Absolute XLSX path
    pub xlsx_path: PathBuf,
    /// Absolute sidecar path
    pub metadata_path: PathBuf,
    /// Data column names
    pub columns: Vec<String>,
    /// Number of data rows
    pub row_count: usize,
    /// Observed window start
    pub observation_start: Option<NaiveDate>,
    /// Observed window end
    pub observation_end: Option<NaiveDate>,
    /// Per-series failures that did not abort the build
    pub errors: BTreeMap<String, String>,
}

/// Serializes writers of the same dataset basename.
#[derive(Debug, Default)]
pub struct WriteLocks {
    locks: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl WriteLocks {
    fn for_basename(&self, basename: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(basename.to_string())
            .or_default()
            .clone()
    }
}

/// The dataset builder. Owns writes to dataset folders.
#[derive(Debug, Clone)]
pub struct DatasetBuilder {
    gateway: FredGateway,
    data_root: PathBuf,
    fetch_concurrency: usize,
    locks: Arc<WriteLocks>,
}

impl DatasetBuilder {
    /// Create a builder writing under `data_root`.
    pub fn new(gateway: FredGateway, data_root: impl Into<PathBuf>, fetch_concurrency: usize) -> Self {
        Self {
            gateway,
            data_root: data_root.into(),
            fetch_concurrency: fetch_concurrency.max(1),
            locks: Arc::new(WriteLocks::default()),
        }
    }

    /// Canonical dataset basename for a list of series ids, caller order.
    pub fn basename(series_list: &[SeriesId]) -> String {
        let ids: Vec<&str> = series_list.iter().map(SeriesId::as_str).collect();
        format!("{DATASET_PREFIX}{}", ids.join("_"))
    }

    /// Run a full build. Cancellation is checked between phases and during
    /// artifact writes; a cancelled build leaves no dataset folder behind
    /// unless the sidecar was already committed.
    pub async fn build(
        &self,
        request: &BuildRequest,
        cancel: &CancellationToken,
    ) -> Result<BuildSummary> {
        validate_request(request)?;

        let fetched = self.fetch_all(request, cancel).await?;

        let mut errors = BTreeMap::new();
        let mut succeeded: Vec<Series> = Vec::new();
        for (id, outcome) in fetched {
            match outcome {
                Ok(series) => succeeded.push(series),
                Err(err) => {
                    warn!(series = %id, %err, "series fetch failed, continuing");
                    errors.insert(id.to_string(), err.to_string());
                },
            }
        }

        if succeeded.is_empty() {
            let detail = errors
                .iter()
                .map(|(id, err)| format!("{id}: {err}"))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::UpstreamUnavailable(format!(
                "no series could be fetched ({detail})"
            )));
        }

        let inputs: Vec<(String, Vec<crate::fred::Observation>)> = succeeded
            .iter()
            .map(|s| (s.meta.id.to_string(), s.observations.clone()))
            .collect();

        let mut table = DataTable::merge(&inputs, request.merge_strategy)?;

        for series in &succeeded {
            let transform = request
                .transformations
                .get(series.meta.id.as_str())
                .copied()
                .unwrap_or(Transform::None);
            if transform != Transform::None {
                table.transform_column(series.meta.id.as_str(), transform)?;
            }
        }

        table.trim_null_edges();

        if table.row_count() == 0 {
            return Err(Error::EmptyIntersection(describe_empty_merge(
                &succeeded,
                request.merge_strategy,
            )));
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let succeeded_ids: Vec<SeriesId> =
            succeeded.iter().map(|s| s.meta.id.clone()).collect();
        let name = Self::basename(&succeeded_ids);
        let (start, end) = table
            .observed_window()
            .map(|(s, e)| (Some(s), Some(e)))
            .unwrap_or((None, None));

        let transformations: BTreeMap<String, String> = succeeded_ids
            .iter()
            .map(|id| {
                let tag = request
                    .transformations
                    .get(id.as_str())
                    .copied()
                    .unwrap_or(Transform::None);
                (id.to_string(), tag.tag().to_string())
            })
            .collect();

        let summary = self
            .write_dataset(
                name,
                table,
                transformations,
                &succeeded_ids,
                request.merge_strategy,
                start,
                end,
                errors,
                cancel,
            )
            .await?;

        info!(
            dataset = %summary.name,
            rows = summary.row_count,
            "dataset built"
        );
        Ok(summary)
    }

    async fn fetch_all(
        &self,
        request: &BuildRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<(SeriesId, Result<Series>)>> {
        let limit = self.fetch_concurrency.min(request.series_list.len());
        let semaphore = Arc::new(Semaphore::new(limit));

        let futures = request.series_list.iter().cloned().map(|id| {
            let gateway = self.gateway.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let (start, end) = (request.observation_start, request.observation_end);
            async move {
                let permit = semaphore.acquire_owned().await;
                let outcome = if permit.is_err() {
                    Err(Error::internal("fetch semaphore closed"))
                } else {
                    tokio::select! {
                        result = gateway.series(&id, start, end) => result,
                        () = cancel.cancelled() => Err(Error::Cancelled),
                    }
                };
                (id, outcome)
            }
        });

        let outcomes = futures::future::join_all(futures).await;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(outcomes)
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_dataset(
        &self,
        name: String,
        table: DataTable,
        transformations: BTreeMap<String, String>,
        series_ids: &[SeriesId],
        merge_strategy: MergeStrategy,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        errors: BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<BuildSummary> {
        let dataset_dir = self.data_root.join(&name);
        let window = match (start, end) {
            (Some(start), Some(end)) => format!(
                "{}_to_{}",
                start.format(DATE_FORMAT),
                end.format(DATE_FORMAT)
            ),
            _ => "empty".to_string(),
        };
        let stamp = today_stamp();
        let csv_path = dataset_dir.join(format!("{name}_{window}_built_{stamp}.csv"));
        let xlsx_path = dataset_dir.join(format!("{name}_{window}_built_{stamp}.xlsx"));
        let metadata_path = dataset_dir.join(format!("{name}_metadata_{stamp}.json"));

        let metadata = DatasetMetadata {
            name: name.clone(),
            series_list: series_ids.iter().map(SeriesId::to_string).collect(),
            transformations: transformations.clone(),
            merge_strategy,
            observation_start: start,
            observation_end: end,
            created_at: Utc::now().to_rfc3339(),
            csv_path: csv_path.clone(),
            xlsx_path: xlsx_path.clone(),
            columns: table.column_names().iter().map(|s| s.to_string()).collect(),
            row_count: table.row_count(),
        };

        // Serialize same-basename writers for the whole three-file write.
        let lock = self.locks.for_basename(&name);
        let _guard = lock.lock().await;

        let columns = metadata.columns.clone();
        let row_count = metadata.row_count;
        let summary = BuildSummary {
            name,
            csv_path: csv_path.clone(),
            xlsx_path: xlsx_path.clone(),
            metadata_path: metadata_path.clone(),
            columns,
            row_count,
            observation_start: start,
            observation_end: end,
            errors,
        };

        let write_result = {
            let cancel = cancel.clone();
            let dataset_dir = dataset_dir.clone();
            let csv_path = csv_path.clone();
            let xlsx_path = xlsx_path.clone();
            let metadata_path = metadata_path.clone();
            tokio::task::spawn_blocking(move || {
                write_artifacts(
                    &dataset_dir,
                    &csv_path,
                    &xlsx_path,
                    &metadata_path,
                    &table,
                    &metadata,
                    &cancel,
                )
            })
            .await
            .map_err(|e| Error::internal(format!("artifact writer panicked: {e}")))?
        };

        write_result?;
        Ok(summary)
    }
}

/// Write CSV, XLSX, then the sidecar. The sidecar commits the dataset; if
/// the write is cancelled or fails before the sidecar lands, the partial
/// CSV/XLSX are removed.
fn write_artifacts(
    dataset_dir: &Path,
    csv_path: &Path,
    xlsx_path: &Path,
    metadata_path: &Path,
    table: &DataTable,
    metadata: &DatasetMetadata,
    cancel: &CancellationToken,
) -> Result<()> {
    std::fs::create_dir_all(dataset_dir)?;

    let mut guard = PartialWriteGuard::default();

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    guard.written.push(csv_path.to_path_buf());
    table.write_csv(csv_path)?;

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    guard.written.push(xlsx_path.to_path_buf());
    table.write_xlsx(xlsx_path)?;

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    // Sidecar last, atomically via rename.
    let tmp_path = metadata_path.with_extension("json.tmp");
    guard.written.push(tmp_path.clone());
    let body = serde_json::to_vec_pretty(metadata)?;
    std::fs::write(&tmp_path, body)?;
    std::fs::rename(&tmp_path, metadata_path)?;

    guard.committed = true;
    Ok(())
}

/// Removes partially written artifacts unless the sidecar was committed.
#[derive(Default)]
struct PartialWriteGuard {
    written: Vec<PathBuf>,
    committed: bool,
}

impl Drop for PartialWriteGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for path in &self.written {
            match std::fs::remove_file(path) {
                Ok(()) => {},
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {},
                Err(err) => {
                    warn!(path = %path.display(), %err, "failed to remove partial artifact");
                },
            }
        }
    }
}

fn validate_request(request: &BuildRequest) -> Result<()> {
    if request.series_list.is_empty() {
        return Err(Error::invalid_params("series_list must not be empty"));
    }

    let mut seen = HashSet::new();
    for id in &request.series_list {
        if !seen.insert(id.as_str()) {
            return Err(Error::DuplicateSeries(format!(
                "series {id} appears more than once in series_list"
            )));
        }
    }

    for key in request.transformations.keys() {
        if !seen.contains(key.as_str()) {
            return Err(Error::invalid_params(format!(
                "transformation references {key:?} which is not in series_list"
            )));
        }
    }

    Ok(())
}

fn describe_empty_merge(series: &[Series], strategy: MergeStrategy) -> String {
    let windows = series
        .iter()
        .map(|s| match s.observed_window() {
            Some((start, end)) => format!(
                "{} covers {} to {}",
                s.meta.id,
                start.format(DATE_FORMAT),
                end.format(DATE_FORMAT)
            ),
            None => format!("{} has no observations", s.meta.id),
        })
        .collect::<Vec<_>>()
        .join("; ");
    format!("{strategy} merge produced no rows: {windows}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> SeriesId {
        SeriesId::new(s).unwrap()
    }

    #[test]
    fn basename_preserves_caller_order() {
        assert_eq!(
            DatasetBuilder::basename(&[id("UNRATE"), id("CPIAUCSL"), id("GDP")]),
            "FRED_dataset_UNRATE_CPIAUCSL_GDP"
        );
    }

    #[test]
    fn duplicate_series_rejected() {
        let request = BuildRequest {
            series_list: vec![id("GDP"), id("GDP")],
            transformations: HashMap::new(),
            observation_start: None,
            observation_end: None,
            merge_strategy: MergeStrategy::Inner,
        };
        let err = validate_request(&request).unwrap_err();
        assert!(matches!(err, Error::DuplicateSeries(_)));
    }

    #[test]
    fn transformation_must_reference_requested_series() {
        let mut transformations = HashMap::new();
        transformations.insert("CPIAUCSL".to_string(), Transform::YoY);
        let request = BuildRequest {
            series_list: vec![id("GDP")],
            transformations,
            observation_start: None,
            observation_end: None,
            merge_strategy: MergeStrategy::Inner,
        };
        let err = validate_request(&request).unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));
    }

    #[test]
    fn empty_series_list_rejected() {
        let request = BuildRequest {
            series_list: vec![],
            transformations: HashMap::new(),
            observation_start: None,
            observation_end: None,
            merge_strategy: MergeStrategy::Inner,
        };
        assert!(validate_request(&request).is_err());
    }

    #[test]
    fn partial_write_guard_removes_uncommitted() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("partial.csv");
        std::fs::write(&file, "data").unwrap();
        {
            let mut guard = PartialWriteGuard::default();
            guard.written.push(file.clone());
        }
        assert!(!file.exists());
    }

    #[test]
    fn partial_write_guard_keeps_committed() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("kept.csv");
        std::fs::write(&file, "data").unwrap();
        {
            let mut guard = PartialWriteGuard::default();
            guard.written.push(file.clone());
            guard.committed = true;
        }
        assert!(file.exists());
    }
}
