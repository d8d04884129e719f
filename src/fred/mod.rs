//! FRED domain model and HTTP gateway.

pub mod gateway;

pub use gateway::FredGateway;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Opaque series identifier (e.g. `GDP`, `UNRATE`). Case-preserving.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesId(String);

impl SeriesId {
    /// Create a series id, rejecting empty or whitespace-bearing input.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(Error::invalid_params(format!("invalid series id: {id:?}")));
        }
        Ok(Self(id))
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Observation frequency as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Daily observations
    Daily,
    /// Weekly observations
    Weekly,
    /// Monthly observations
    Monthly,
    /// Quarterly observations
    Quarterly,
    /// Annual observations
    Annual,
    /// No fixed cadence
    Irregular,
}

impl Frequency {
    /// Parse the provider's short frequency code (`D`, `W`, `M`, `Q`, `A`).
    /// Codes with period modifiers (`BW`, `5Y`, ...) map to `Irregular`.
    pub fn from_short(code: &str) -> Self {
        match code {
            "D" => Self::Daily,
            "W" => Self::Weekly,
            "M" => Self::Monthly,
            "Q" => Self::Quarterly,
            "A" => Self::Annual,
            _ => Self::Irregular,
        }
    }
}

/// A single dated observation. Values the provider marks missing are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Observation date (whole days)
    pub date: NaiveDate,
    /// Observed value, or `None` when the provider reports it missing
    pub value: Option<f64>,
}

/// Series metadata as returned by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesMeta {
    /// Series identifier
    pub id: SeriesId,
    /// Human-readable title
    pub title: String,
    /// Units description
    pub units: String,
    /// Observation frequency
    pub frequency: Frequency,
    /// Seasonal adjustment description
    pub seasonal_adjustment: String,
    /// First available observation date
    pub observation_start: Option<NaiveDate>,
    /// Last available observation date
    pub observation_end: Option<NaiveDate>,
    /// Provider popularity score
    pub popularity: i64,
    /// Free-form notes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// An ordered series of observations plus its metadata.
///
/// Invariant: observation dates are strictly ascending with no duplicates.
/// The gateway enforces this on decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    /// Series metadata
    pub meta: SeriesMeta,
    /// Observations, strictly ascending by date
    pub observations: Vec<Observation>,
}

impl Series {
    /// First and last observation dates, if any observations exist.
    pub fn observed_window(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.observations.first(), self.observations.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date)),
            _ => None,
        }
    }
}

/// A FRED release directory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    /// Release identifier
    pub id: i64,
    /// Release name
    pub name: String,
    /// Whether the release has a press release
    #[serde(default)]
    pub press_release: bool,
    /// Link to the release page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// A FRED category directory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    /// Category identifier
    pub id: i64,
    /// Category name
    pub name: String,
    /// Parent category identifier
    #[serde(default)]
    pub parent_id: i64,
}

/// A FRED data source directory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// Source identifier
    pub id: i64,
    /// Source name
    pub name: String,
    /// Link to the source's site
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_id_rejects_empty_and_whitespace() {
        assert!(SeriesId::new("").is_err());
        assert!(SeriesId::new("GDP NOW").is_err());
        assert_eq!(SeriesId::new("CPIAUCSL").unwrap().as_str(), "CPIAUCSL");
    }

    #[test]
    fn series_id_preserves_case() {
        assert_eq!(SeriesId::new("DgS10").unwrap().as_str(), "DgS10");
    }

    #[test]
    fn frequency_short_codes() {
        assert_eq!(Frequency::from_short("M"), Frequency::Monthly);
        assert_eq!(Frequency::from_short("Q"), Frequency::Quarterly);
        assert_eq!(Frequency::from_short("5Y"), Frequency::Irregular);
    }

    #[test]
    fn observed_window() {
        let meta = SeriesMeta {
            id: SeriesId::new("GDP").unwrap(),
            title: "Gross Domestic Product".into(),
            units: "Billions of Dollars".into(),
            frequency: Frequency::Quarterly,
            seasonal_adjustment: "Seasonally Adjusted Annual Rate".into(),
            observation_start: None,
            observation_end: None,
            popularity: 90,
            notes: None,
        };
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let series = Series {
            meta,
            observations: vec![
                Observation { date: d("2020-01-01"), value: Some(1.0) },
                Observation { date: d("2020-04-01"), value: None },
            ],
        };
        assert_eq!(
            series.observed_window(),
            Some((d("2020-01-01"), d("2020-04-01")))
        );
    }
}
