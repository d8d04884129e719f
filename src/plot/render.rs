//! Chart rendering over the plotters bitmap backend.
//!
//! All functions here are synchronous and CPU/disk bound; callers run them
//! under `spawn_blocking`.

use chrono::NaiveDate;
use plotters::prelude::*;
use std::path::Path;

use crate::error::{Error, Result};

const CHART_SIZE: (u32, u32) = (1200, 600);

/// Default color for left/primary series.
pub const DEFAULT_LEFT_COLOR: &str = "#2E5090";
/// Default color for right/secondary series.
pub const DEFAULT_RIGHT_COLOR: &str = "#C1272D";

/// One plottable series: a label, a color and non-null points.
#[derive(Debug, Clone)]
pub struct SeriesLine {
    /// Legend label
    pub label: String,
    /// Line color
    pub color: RGBColor,
    /// Points, ascending by date, nulls already dropped
    pub points: Vec<(NaiveDate, f64)>,
}

/// Parse a `#RRGGBB` hex color.
pub fn parse_hex_color(s: &str) -> Result<RGBColor> {
    let hex = s.strip_prefix('#').unwrap_or(s);
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::invalid_params(format!(
            "invalid color {s:?}; expected #RRGGBB"
        )));
    }
    let channel = |range: std::ops::Range<usize>| -> u8 {
        u8::from_str_radix(&hex[range], 16).unwrap_or(0)
    };
    Ok(RGBColor(channel(0..2), channel(2..4), channel(4..6)))
}

/// Render a single-axis line chart.
pub fn render_line(path: &Path, title: &str, series: &SeriesLine) -> Result<()> {
    if series.points.is_empty() {
        return Err(Error::invalid_params("nothing to plot: no non-null points"));
    }

    let (x_range, y_range) = ranges(&series.points);
    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(18)
        .x_label_area_size(44)
        .y_label_area_size(64)
        .build_cartesian_2d(x_range, y_range)
        .map_err(draw_err)?;

    chart
        .configure_mesh()
        .light_line_style(RGBColor(230, 230, 230))
        .x_label_formatter(&|d: &NaiveDate| d.format("%Y-%m").to_string())
        .y_desc(series.label.clone())
        .draw()
        .map_err(draw_err)?;

    chart
        .draw_series(LineSeries::new(
            series.points.iter().copied(),
            series.color.stroke_width(2),
        ))
        .map_err(draw_err)?;

    root.present().map_err(draw_err)?;
    Ok(())
}

/// Render two series on independent left/right axes sharing the x axis.
pub fn render_dual_axis(
    path: &Path,
    title: &str,
    left: &SeriesLine,
    right: &SeriesLine,
) -> Result<()> {
    if left.points.is_empty() || right.points.is_empty() {
        return Err(Error::invalid_params("nothing to plot: no non-null points"));
    }

    let mut all_dates: Vec<NaiveDate> = left
        .points
        .iter()
        .chain(right.points.iter())
        .map(|(d, _)| *d)
        .collect();
    all_dates.sort_unstable();
    let x_range = all_dates[0]..all_dates[all_dates.len() - 1];

    let (_, left_range) = ranges(&left.points);
    let (_, right_range) = ranges(&right.points);

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(18)
        .x_label_area_size(44)
        .y_label_area_size(64)
        .right_y_label_area_size(64)
        .build_cartesian_2d(x_range.clone(), left_range)
        .map_err(draw_err)?
        .set_secondary_coord(x_range, right_range);

    chart
        .configure_mesh()
        .light_line_style(RGBColor(230, 230, 230))
        .x_label_formatter(&|d: &NaiveDate| d.format("%Y-%m").to_string())
        .y_desc(left.label.clone())
        .draw()
        .map_err(draw_err)?;

    chart
        .configure_secondary_axes()
        .y_desc(right.label.clone())
        .draw()
        .map_err(draw_err)?;

    let left_color = left.color;
    chart
        .draw_series(LineSeries::new(
            left.points.iter().copied(),
            left_color.stroke_width(2),
        ))
        .map_err(draw_err)?
        .label(left.label.clone())
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], left_color));

    let right_color = right.color;
    chart
        .draw_secondary_series(LineSeries::new(
            right.points.iter().copied(),
            right_color.stroke_width(2),
        ))
        .map_err(draw_err)?
        .label(right.label.clone())
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], right_color));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.85))
        .border_style(BLACK)
        .position(SeriesLabelPosition::UpperLeft)
        .draw()
        .map_err(draw_err)?;

    root.present().map_err(draw_err)?;
    Ok(())
}

/// Padded axis ranges for a point set.
fn ranges(points: &[(NaiveDate, f64)]) -> (std::ops::Range<NaiveDate>, std::ops::Range<f64>) {
    let x_range = points[0].0..points[points.len() - 1].0;

    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for (_, value) in points {
        lo = lo.min(*value);
        hi = hi.max(*value);
    }
    let pad = if hi > lo { (hi - lo) * 0.05 } else { 1.0 };
    (x_range, (lo - pad)..(hi + pad))
}

fn draw_err<E: std::fmt::Display>(err: E) -> Error {
    Error::internal(format!("chart rendering failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn hex_colors() {
        assert_eq!(parse_hex_color("#2E5090").unwrap(), RGBColor(0x2E, 0x50, 0x90));
        assert_eq!(parse_hex_color("C1272D").unwrap(), RGBColor(0xC1, 0x27, 0x2D));
        assert!(parse_hex_color("#zzz").is_err());
        assert!(parse_hex_color("#12345").is_err());
    }

    #[test]
    fn renders_a_line_chart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.png");
        let series = SeriesLine {
            label: "UNRATE".into(),
            color: parse_hex_color(DEFAULT_LEFT_COLOR).unwrap(),
            points: (0..24)
                .map(|i| {
                    (
                        d("2020-01-01") + chrono::Duration::days(30 * i),
                        3.5 + (i as f64 * 0.4).sin(),
                    )
                })
                .collect(),
        };
        render_line(&path, "Unemployment Rate", &series).unwrap();
        assert!(path.exists());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn renders_dual_axis() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dual.png");
        let points: Vec<(NaiveDate, f64)> = (0..24)
            .map(|i| (d("2020-01-01") + chrono::Duration::days(30 * i), i as f64))
            .collect();
        let left = SeriesLine {
            label: "UNRATE".into(),
            color: parse_hex_color(DEFAULT_LEFT_COLOR).unwrap(),
            points: points.clone(),
        };
        let right = SeriesLine {
            label: "CPIAUCSL_YoY".into(),
            color: parse_hex_color(DEFAULT_RIGHT_COLOR).unwrap(),
            points: points.iter().map(|(d, v)| (*d, v * 100.0)).collect(),
        };
        render_dual_axis(&path, "UNRATE vs CPIAUCSL_YoY", &left, &right).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn empty_series_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.png");
        let series = SeriesLine {
            label: "X".into(),
            color: RGBColor(0, 0, 0),
            points: vec![],
        };
        assert!(render_line(&path, "X", &series).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn flat_series_still_renders() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flat.png");
        let series = SeriesLine {
            label: "CONST".into(),
            color: parse_hex_color(DEFAULT_LEFT_COLOR).unwrap(),
            points: (0..12)
                .map(|i| (d("2020-01-01") + chrono::Duration::days(30 * i), 5.0))
                .collect(),
        };
        render_line(&path, "Constant", &series).unwrap();
        assert!(path.exists());
    }
}
