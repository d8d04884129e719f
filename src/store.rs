//! Durable on-disk layout for raw series.
//!
//! Every series gets its own folder under the data root:
//!
//! ```text
//! <root>/<SERIES_ID>/series/<SERIES_ID>_<start>_to_<end>_downloaded_<YYYYMMDD>.csv (+ .xlsx)
//! <root>/<SERIES_ID>/grafico/<SERIES_ID>_<start>_to_<end>_plot_<YYYYMMDD>.png
//! ```
//!
//! Filenames embed the actual first/last observation dates, so re-running an
//! identical request overwrites in place.

use chrono::{NaiveDate, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::dataset::table::{Column, DataTable};
use crate::error::{Error, Result};
use crate::fred::gateway::DATE_FORMAT;
use crate::fred::{Series, SeriesId};

/// Filename date stamp format.
const STAMP_FORMAT: &str = "%Y%m%d";

/// Paths produced by a series write.
#[derive(Debug, Clone)]
pub struct SeriesArtifacts {
    /// CSV export path
    pub csv_path: PathBuf,
    /// XLSX export path
    pub xlsx_path: PathBuf,
}

/// Series Store rooted at the configured data directory.
#[derive(Debug, Clone)]
pub struct SeriesStore {
    root: PathBuf,
}

impl SeriesStore {
    /// Create a store over the given root. The root itself is created
    /// lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a series' data exports.
    pub fn series_dir(&self, id: &SeriesId) -> PathBuf {
        self.root.join(id.as_str()).join("series")
    }

    /// Directory for a series' charts.
    pub fn plot_dir(&self, id: &SeriesId) -> PathBuf {
        self.root.join(id.as_str()).join("grafico")
    }

    /// Persist a fetched series as CSV + XLSX.
    ///
    /// Empty series are not written; `Ok(None)` is returned instead.
    pub fn save_series(&self, series: &Series) -> Result<Option<SeriesArtifacts>> {
        let Some((start, end)) = series.observed_window() else {
            return Ok(None);
        };

        let table = DataTable {
            dates: series.observations.iter().map(|o| o.date).collect(),
            columns: vec![Column {
                name: "value".to_string(),
                values: series.observations.iter().map(|o| o.value).collect(),
            }],
        };

        let basename = self.window_basename(&series.meta.id, start, end, "downloaded");
        self.write_table(&series.meta.id, &table, &basename)
    }

    /// Persist a differencing analysis export
    /// (`date,value,first_diff,second_diff`).
    pub fn save_differencing(
        &self,
        id: &SeriesId,
        table: &DataTable,
    ) -> Result<Option<SeriesArtifacts>> {
        let Some((start, end)) = table.observed_window() else {
            return Ok(None);
        };
        let basename = self.window_basename(id, start, end, "differencing");
        self.write_table(id, table, &basename)
    }

    /// Path for a chart covering the given window, creating the folder.
    pub fn plot_path(&self, id: &SeriesId, start: NaiveDate, end: NaiveDate) -> Result<PathBuf> {
        let dir = self.plot_dir(id);
        fs::create_dir_all(&dir)?;
        Ok(dir.join(format!(
            "{}_{}_to_{}_plot_{}.png",
            id.as_str(),
            start.format(DATE_FORMAT),
            end.format(DATE_FORMAT),
            today_stamp(),
        )))
    }

    fn window_basename(
        &self,
        id: &SeriesId,
        start: NaiveDate,
        end: NaiveDate,
        kind: &str,
    ) -> String {
        format!(
            "{}_{}_to_{}_{}_{}",
            id.as_str(),
            start.format(DATE_FORMAT),
            end.format(DATE_FORMAT),
            kind,
            today_stamp(),
        )
    }

    fn write_table(
        &self,
        id: &SeriesId,
        table: &DataTable,
        basename: &str,
    ) -> Result<Option<SeriesArtifacts>> {
        let dir = self.series_dir(id);
        fs::create_dir_all(&dir)?;

        let csv_path = dir.join(format!("{basename}.csv"));
        let xlsx_path = dir.join(format!("{basename}.xlsx"));
        table.write_csv(&csv_path)?;
        table.write_xlsx(&xlsx_path)?;
        info!(series = %id, csv = %csv_path.display(), "series saved");

        Ok(Some(SeriesArtifacts { csv_path, xlsx_path }))
    }
}

/// Today's filename stamp (UTC).
pub fn today_stamp() -> String {
    Utc::now().date_naive().format(STAMP_FORMAT).to_string()
}

/// Validate that a path stays under the data root. Dataset paths supplied by
/// the client go through this before being read.
pub fn ensure_under_root(root: &Path, path: &Path) -> Result<()> {
    let canonical_root = root
        .canonicalize()
        .map_err(|e| Error::invalid_params(format!("data root {}: {e}", root.display())))?;
    let canonical = path
        .canonicalize()
        .map_err(|e| Error::invalid_params(format!("{}: {e}", path.display())))?;
    if canonical.starts_with(&canonical_root) {
        Ok(())
    } else {
        Err(Error::invalid_params(format!(
            "{} is outside the data root",
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fred::{Frequency, Observation, SeriesMeta};

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn sample_series() -> Series {
        Series {
            meta: SeriesMeta {
                id: SeriesId::new("UNRATE").unwrap(),
                title: "Unemployment Rate".into(),
                units: "Percent".into(),
                frequency: Frequency::Monthly,
                seasonal_adjustment: "Seasonally Adjusted".into(),
                observation_start: Some(d("1948-01-01")),
                observation_end: Some(d("2025-06-01")),
                popularity: 95,
                notes: None,
            },
            observations: vec![
                Observation { date: d("2025-04-01"), value: Some(3.9) },
                Observation { date: d("2025-05-01"), value: None },
                Observation { date: d("2025-06-01"), value: Some(4.0) },
            ],
        }
    }

    #[test]
    fn save_series_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = SeriesStore::new(dir.path());
        let artifacts = store.save_series(&sample_series()).unwrap().unwrap();

        let expected = format!(
            "UNRATE_2025-04-01_to_2025-06-01_downloaded_{}.csv",
            today_stamp()
        );
        assert_eq!(
            artifacts.csv_path,
            dir.path().join("UNRATE").join("series").join(&expected)
        );
        assert!(artifacts.csv_path.exists());
        assert!(artifacts.xlsx_path.exists());

        let table = DataTable::read_csv(&artifacts.csv_path).unwrap();
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.column("value").unwrap().values[1], None);
    }

    #[test]
    fn empty_series_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = SeriesStore::new(dir.path());
        let mut series = sample_series();
        series.observations.clear();
        assert!(store.save_series(&series).unwrap().is_none());
        assert!(!dir.path().join("UNRATE").exists());
    }

    #[test]
    fn rewriting_same_window_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = SeriesStore::new(dir.path());
        let first = store.save_series(&sample_series()).unwrap().unwrap();
        let second = store.save_series(&sample_series()).unwrap().unwrap();
        assert_eq!(first.csv_path, second.csv_path);
    }

    #[test]
    fn path_escape_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::NamedTempFile::new().unwrap();
        assert!(ensure_under_root(dir.path(), outside.path()).is_err());
    }
}
