//! Date-indexed columnar table.
//!
//! The merge/transform semantics are specified over Date-indexed columns
//! with explicit nulls; this keeps the representation simple (a sorted date
//! index plus one `Vec<Option<f64>>` per column) rather than reaching for an
//! arrow-style buffer layout.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::fred::gateway::DATE_FORMAT;
use crate::fred::Observation;
use crate::transform::Transform;

/// How to combine series indices when building a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Only dates present in every series
    Inner,
    /// Union of all dates, null-filled
    Outer,
    /// Dates of the first input series
    Left,
    /// Dates of the last input series
    Right,
}

impl Default for MergeStrategy {
    fn default() -> Self {
        Self::Inner
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Inner => "inner",
            Self::Outer => "outer",
            Self::Left => "left",
            Self::Right => "right",
        };
        write!(f, "{name}")
    }
}

impl FromStr for MergeStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "inner" => Ok(Self::Inner),
            "outer" => Ok(Self::Outer),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(Error::invalid_params(format!(
                "unknown merge strategy {other:?}; expected inner, outer, left or right"
            ))),
        }
    }
}

/// A named data column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name (`SERIES` or `SERIES_tag`)
    pub name: String,
    /// One value per index row
    pub values: Vec<Option<f64>>,
}

/// A table with a strictly ascending Date index and uniquely named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    /// Date index, strictly ascending
    pub dates: Vec<NaiveDate>,
    /// Data columns, one value per date
    pub columns: Vec<Column>,
}

impl DataTable {
    /// Merge named observation sequences into one table.
    ///
    /// `inner` keeps dates present in every input; `outer` the union with
    /// null fill; `left`/`right` anchor on the first/last input's dates.
    pub fn merge(inputs: &[(String, Vec<Observation>)], strategy: MergeStrategy) -> Result<Self> {
        if inputs.is_empty() {
            return Err(Error::invalid_params("nothing to merge"));
        }

        let mut seen = HashSet::new();
        for (name, _) in inputs {
            if !seen.insert(name.as_str()) {
                return Err(Error::invalid_params(format!("duplicate column {name:?}")));
            }
        }

        let index: Vec<NaiveDate> = match strategy {
            MergeStrategy::Inner => {
                let mut common: Option<BTreeSet<NaiveDate>> = None;
                for (_, observations) in inputs {
                    let dates: BTreeSet<NaiveDate> =
                        observations.iter().map(|o| o.date).collect();
                    common = Some(match common {
                        None => dates,
                        Some(common) => common.intersection(&dates).copied().collect(),
                    });
                }
                common.unwrap_or_default().into_iter().collect()
            },
            MergeStrategy::Outer => {
                let mut union = BTreeSet::new();
                for (_, observations) in inputs {
                    union.extend(observations.iter().map(|o| o.date));
                }
                union.into_iter().collect()
            },
            MergeStrategy::Left => inputs[0].1.iter().map(|o| o.date).collect(),
            MergeStrategy::Right => inputs[inputs.len() - 1].1.iter().map(|o| o.date).collect(),
        };

        let columns = inputs
            .iter()
            .map(|(name, observations)| {
                let by_date: HashMap<NaiveDate, Option<f64>> =
                    observations.iter().map(|o| (o.date, o.value)).collect();
                Column {
                    name: name.clone(),
                    values: index
                        .iter()
                        .map(|date| by_date.get(date).copied().flatten())
                        .collect(),
                }
            })
            .collect();

        Ok(Self { dates: index, columns })
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.dates.len()
    }

    /// Column names in table order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Find a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Apply a transformation to the named column, renaming it to
    /// `{name}_{tag}` for tags other than `none`. Column names stay unique;
    /// a rename that collides with another column is rejected.
    pub fn transform_column(&mut self, name: &str, transform: Transform) -> Result<()> {
        let new_name = transform.column_name(name);
        if new_name != name && self.columns.iter().any(|c| c.name == new_name) {
            return Err(Error::invalid_params(format!(
                "transforming {name:?} would collide with existing column {new_name:?}"
            )));
        }
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::UnknownColumn(format!("no column {name:?}")))?;
        column.values = transform.apply(&column.values);
        column.name = new_name;
        Ok(())
    }

    /// Drop leading and trailing rows where every data column is null.
    pub fn trim_null_edges(&mut self) {
        let is_all_null =
            |row: usize| self.columns.iter().all(|c| c.values[row].is_none());

        let mut start = 0;
        while start < self.row_count() && is_all_null(start) {
            start += 1;
        }
        let mut end = self.row_count();
        while end > start && is_all_null(end - 1) {
            end -= 1;
        }

        self.dates.drain(end..);
        self.dates.drain(..start);
        for column in &mut self.columns {
            column.values.drain(end..);
            column.values.drain(..start);
        }
    }

    /// Observed date window (first and last index entries).
    pub fn observed_window(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.dates.first(), self.dates.last()) {
            (Some(first), Some(last)) => Some((*first, *last)),
            _ => None,
        }
    }

    /// Write the table as CSV with a `date` key column. Nulls become empty
    /// cells.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        let mut header = vec!["date".to_string()];
        header.extend(self.columns.iter().map(|c| c.name.clone()));
        writer.write_record(&header)?;

        for (row, date) in self.dates.iter().enumerate() {
            let mut record = vec![date.format(DATE_FORMAT).to_string()];
            for column in &self.columns {
                record.push(match column.values[row] {
                    Some(value) => format_value(value),
                    None => String::new(),
                });
            }
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the table as XLSX, mirroring the CSV layout.
    pub fn write_xlsx(&self, path: &Path) -> Result<()> {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();

        sheet.write_string(0, 0, "date")?;
        for (i, column) in self.columns.iter().enumerate() {
            sheet.write_string(0, (i + 1) as u16, &column.name)?;
        }

        for (row, date) in self.dates.iter().enumerate() {
            let excel_row = (row + 1) as u32;
            sheet.write_string(excel_row, 0, date.format(DATE_FORMAT).to_string())?;
            for (i, column) in self.columns.iter().enumerate() {
                if let Some(value) = column.values[row] {
                    sheet.write_number(excel_row, (i + 1) as u16, value)?;
                }
            }
        }

        workbook.save(path)?;
        Ok(())
    }

    /// Read a table back from a CSV written by [`DataTable::write_csv`].
    pub fn read_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let header = reader.headers()?.clone();
        if header.get(0) != Some("date") {
            return Err(Error::invalid_params(format!(
                "{} is not a dataset CSV: first column is {:?}, expected \"date\"",
                path.display(),
                header.get(0).unwrap_or("")
            )));
        }

        let mut columns: Vec<Column> = header
            .iter()
            .skip(1)
            .map(|name| Column { name: name.to_string(), values: Vec::new() })
            .collect();
        let mut dates = Vec::new();

        for record in reader.records() {
            let record = record?;
            let date = record
                .get(0)
                .ok_or_else(|| Error::invalid_params("missing date cell"))?;
            dates.push(
                NaiveDate::parse_from_str(date, DATE_FORMAT)
                    .map_err(|e| Error::invalid_params(format!("bad date {date:?}: {e}")))?,
            );
            for (i, column) in columns.iter_mut().enumerate() {
                let cell = record.get(i + 1).unwrap_or("");
                column.values.push(if cell.is_empty() {
                    None
                } else {
                    cell.parse::<f64>().ok()
                });
            }
        }

        Ok(Self { dates, columns })
    }
}

/// Render a float so that reading it back yields the same bits.
/// serde_json's number formatting already round-trips; integral values lose
/// their trailing `.0` to match how the upstream provider prints them.
fn format_value(value: f64) -> String {
    let mut buffer = serde_json::Number::from_f64(value)
        .map(|n| n.to_string())
        .unwrap_or_else(|| value.to_string());
    if buffer.ends_with(".0") {
        buffer.truncate(buffer.len() - 2);
    }
    buffer
}
