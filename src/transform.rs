//! Time-series transformations.
//!
//! Each transformation maps a sequence of optional values to a sequence of
//! the same length. Lookback is counted in observations, not calendar units:
//! `YoY` on an already-merged table means "12 rows back in the merged
//! index". The dataset builder aligns frequencies before transforming; this
//! module never resamples.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A named transformation over a single series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transform {
    /// Identity
    #[serde(rename = "none")]
    None,
    /// Year-over-year percent change, 12 observations back
    #[serde(rename = "YoY")]
    YoY,
    /// Quarter-over-quarter percent change, 3 observations back
    #[serde(rename = "QoQ")]
    QoQ,
    /// Month-over-month percent change, 1 observation back
    #[serde(rename = "MoM")]
    MoM,
    /// First difference
    #[serde(rename = "diff")]
    Diff,
    /// Simple ratio change, `x[i]/x[i-1] - 1`
    #[serde(rename = "pct_change")]
    PctChange,
    /// Natural logarithm
    #[serde(rename = "log")]
    Log,
    /// Log difference, `ln(x[i]) - ln(x[i-1])`
    #[serde(rename = "log_diff")]
    LogDiff,
}

impl Transform {
    /// All known tags, in documentation order.
    pub const ALL: [Self; 8] = [
        Self::None,
        Self::YoY,
        Self::QoQ,
        Self::MoM,
        Self::Diff,
        Self::PctChange,
        Self::Log,
        Self::LogDiff,
    ];

    /// The wire tag for this transformation.
    pub fn tag(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::YoY => "YoY",
            Self::QoQ => "QoQ",
            Self::MoM => "MoM",
            Self::Diff => "diff",
            Self::PctChange => "pct_change",
            Self::Log => "log",
            Self::LogDiff => "log_diff",
        }
    }

    /// Number of leading output positions that are necessarily null.
    pub fn lookback(self) -> usize {
        match self {
            Self::None | Self::Log => 0,
            Self::Diff | Self::PctChange | Self::MoM | Self::LogDiff => 1,
            Self::QoQ => 3,
            Self::YoY => 12,
        }
    }

    /// Column name for a series transformed by this tag: the series id
    /// itself for `none`, otherwise `{series}_{tag}`.
    pub fn column_name(self, series: &str) -> String {
        match self {
            Self::None => series.to_string(),
            _ => format!("{series}_{}", self.tag()),
        }
    }

    /// Apply the transformation, preserving length.
    ///
    /// Output position `i` is null when it is inside the lookback window or
    /// when any operand it needs is null (or outside the operand's domain:
    /// zero denominators for ratio changes, non-positive values for logs).
    pub fn apply(self, values: &[Option<f64>]) -> Vec<Option<f64>> {
        match self {
            Self::None => values.to_vec(),
            Self::Log => values
                .iter()
                .map(|v| v.filter(|x| *x > 0.0).map(f64::ln))
                .collect(),
            Self::Diff => shifted_pairs(values, 1, |current, previous| Some(current - previous)),
            Self::PctChange => shifted_pairs(values, 1, ratio_change),
            Self::MoM => shifted_pairs(values, 1, |c, p| ratio_change(c, p).map(|r| r * 100.0)),
            Self::QoQ => shifted_pairs(values, 3, |c, p| ratio_change(c, p).map(|r| r * 100.0)),
            Self::YoY => shifted_pairs(values, 12, |c, p| ratio_change(c, p).map(|r| r * 100.0)),
            Self::LogDiff => shifted_pairs(values, 1, |current, previous| {
                if current > 0.0 && previous > 0.0 {
                    Some(current.ln() - previous.ln())
                } else {
                    None
                }
            }),
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for Transform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.tag() == s)
            .ok_or_else(|| {
                Error::invalid_params(format!(
                    "unknown transformation {s:?}; expected one of: {}",
                    Self::ALL.map(Transform::tag).join(", ")
                ))
            })
    }
}

/// `x[i]/x[i-n] - 1`, null when the denominator is zero.
fn ratio_change(current: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 {
        None
    } else {
        Some(current / previous - 1.0)
    }
}

/// Combine each value with the one `lookback` positions earlier. The first
/// `lookback` outputs are null; otherwise null whenever either operand is.
fn shifted_pairs(
    values: &[Option<f64>],
    lookback: usize,
    f: impl Fn(f64, f64) -> Option<f64>,
) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if i < lookback {
                return None;
            }
            match (values[i], values[i - lookback]) {
                (Some(current), Some(previous)) => f(current, previous),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn none_is_identity_on_values_and_nulls() {
        let input = vec![Some(1.0), None, Some(3.0)];
        assert_eq!(Transform::None.apply(&input), input);
    }

    #[test]
    fn diff_of_constant_series() {
        let output = Transform::Diff.apply(&some(&[5.0, 5.0, 5.0, 5.0]));
        assert_eq!(output, vec![None, Some(0.0), Some(0.0), Some(0.0)]);
    }

    #[test]
    fn output_length_always_matches_input() {
        let input = vec![Some(1.0), Some(2.0), Some(3.0)];
        for transform in Transform::ALL {
            assert_eq!(transform.apply(&input).len(), input.len(), "{transform}");
        }
    }

    #[test]
    fn lookback_prefix_is_null() {
        let input = some(&[1.0; 20]);
        for transform in Transform::ALL {
            let output = transform.apply(&input);
            for (i, value) in output.iter().enumerate().take(transform.lookback()) {
                assert!(value.is_none(), "{transform} position {i}");
            }
        }
    }

    #[test]
    fn pct_change_and_mom_scale() {
        let input = some(&[100.0, 110.0]);
        assert_eq!(Transform::PctChange.apply(&input)[1], Some(0.10000000000000009));
        let mom = Transform::MoM.apply(&input)[1].unwrap();
        assert!((mom - 10.0).abs() < 1e-9);
    }

    #[test]
    fn ratio_changes_null_on_zero_denominator() {
        let input = vec![Some(0.0), Some(5.0)];
        assert_eq!(Transform::PctChange.apply(&input)[1], None);
        assert_eq!(Transform::MoM.apply(&input)[1], None);
    }

    #[test]
    fn null_operands_propagate() {
        let input = vec![Some(1.0), None, Some(3.0)];
        let diff = Transform::Diff.apply(&input);
        assert_eq!(diff, vec![None, None, None]);
    }

    #[test]
    fn log_domain() {
        let input = vec![Some(std::f64::consts::E), Some(0.0), Some(-1.0), None];
        let output = Transform::Log.apply(&input);
        assert!((output[0].unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(&output[1..], &[None, None, None]);
    }

    #[test]
    fn log_diff_requires_positive_operands() {
        let input = vec![Some(-1.0), Some(2.0), Some(4.0)];
        let output = Transform::LogDiff.apply(&input);
        assert_eq!(output[0], None);
        assert_eq!(output[1], None);
        assert!((output[2].unwrap() - std::f64::consts::LN_2).abs() < 1e-12);
    }

    #[test]
    fn log_diff_approximates_pct_change_for_small_moves() {
        let mut values = vec![100.0];
        for i in 1..50 {
            values.push(values[i - 1] * (1.0 + 0.04 * ((i % 5) as f64 - 2.0) / 2.0));
        }
        let input = some(&values);
        let log_diff = Transform::LogDiff.apply(&input);
        let pct = Transform::PctChange.apply(&input);
        for i in 1..input.len() {
            let (ld, pc) = (log_diff[i].unwrap(), pct[i].unwrap());
            if pc.abs() < 0.05 {
                assert!((ld - pc).abs() < 0.01, "position {i}: {ld} vs {pc}");
            }
        }
    }

    #[test]
    fn yoy_counts_observations_not_months() {
        let mut input = some(&[1.0; 13]);
        input[12] = Some(2.0);
        let output = Transform::YoY.apply(&input);
        assert_eq!(output[12], Some(100.0));
        assert!(output[..12].iter().all(Option::is_none));
    }

    #[test]
    fn tags_round_trip() {
        for transform in Transform::ALL {
            assert_eq!(transform.tag().parse::<Transform>().unwrap(), transform);
        }
        assert!("yoy".parse::<Transform>().is_err());
    }

    #[test]
    fn column_names() {
        assert_eq!(Transform::None.column_name("UNRATE"), "UNRATE");
        assert_eq!(Transform::YoY.column_name("CPIAUCSL"), "CPIAUCSL_YoY");
        assert_eq!(Transform::PctChange.column_name("GDP"), "GDP_pct_change");
    }
}
