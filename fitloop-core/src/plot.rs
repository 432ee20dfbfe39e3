//! SVG line charts for train/test curves.

use crate::collab::{CollabError, Plotter};
use crate::persistence;
use std::fmt::Write as _;
use std::path::Path;

const MARGIN: f64 = 48.0;
const SERIES_A_COLOR: &str = "#1f77b4";
const SERIES_B_COLOR: &str = "#ff7f0e";

/// [`Plotter`] that writes a standalone SVG with two labelled series.
#[derive(Debug, Clone)]
pub struct SvgPlotter {
    width: f64,
    height: f64,
    labels: (String, String),
}

impl Default for SvgPlotter {
    fn default() -> Self {
        Self::new(640, 400)
    }
}

impl SvgPlotter {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: f64::from(width.max(160)),
            height: f64::from(height.max(120)),
            labels: ("train".to_string(), "test".to_string()),
        }
    }

    /// Legend labels for the two series.
    pub fn with_labels(mut self, a: impl Into<String>, b: impl Into<String>) -> Self {
        self.labels = (a.into(), b.into());
        self
    }

    /// Build the SVG document without writing it.
    pub fn svg(&self, x: &[usize], series_a: &[f64], series_b: &[f64], title: &str) -> String {
        let (x_min, x_max) = padded_range(x.iter().map(|&v| v as f64));
        let (y_min, y_max) = padded_range(
            series_a
                .iter()
                .chain(series_b)
                .copied()
                .filter(|v| v.is_finite()),
        );
        let plot_w = self.width - 2.0 * MARGIN;
        let plot_h = self.height - 2.0 * MARGIN;
        let sx = |v: f64| MARGIN + (v - x_min) / (x_max - x_min) * plot_w;
        let sy = |v: f64| self.height - MARGIN - (v - y_min) / (y_max - y_min) * plot_h;

        let mut svg = String::new();
        let _ = writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = self.width,
            h = self.height
        );
        let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="middle" font-family="sans-serif" font-size="16">{}</text>"#,
            self.width / 2.0,
            MARGIN / 2.0,
            escape(title)
        );

        // Axes
        let (left, right) = (MARGIN, self.width - MARGIN);
        let (top, bottom) = (MARGIN, self.height - MARGIN);
        let _ = writeln!(
            svg,
            r#"<polyline points="{left},{top} {left},{bottom} {right},{bottom}" fill="none" stroke="black"/>"#
        );
        for (value, y) in [(y_max, top), (y_min, bottom)] {
            let _ = writeln!(
                svg,
                r#"<text x="{}" y="{y}" text-anchor="end" font-family="sans-serif" font-size="11">{value:.4}</text>"#,
                left - 4.0
            );
        }
        for (value, x_pos) in [(x_min, left), (x_max, right)] {
            let _ = writeln!(
                svg,
                r#"<text x="{x_pos}" y="{}" text-anchor="middle" font-family="sans-serif" font-size="11">{value:.0}</text>"#,
                bottom + 16.0
            );
        }

        for (series, color, label, legend_y) in [
            (series_a, SERIES_A_COLOR, &self.labels.0, top + 8.0),
            (series_b, SERIES_B_COLOR, &self.labels.1, top + 24.0),
        ] {
            let points: Vec<(f64, f64)> = x
                .iter()
                .zip(series)
                .filter(|(_, v)| v.is_finite())
                .map(|(&xv, &yv)| (sx(xv as f64), sy(yv)))
                .collect();
            if points.len() > 1 {
                let coords: Vec<String> =
                    points.iter().map(|(px, py)| format!("{px:.2},{py:.2}")).collect();
                let _ = writeln!(
                    svg,
                    r#"<polyline points="{}" fill="none" stroke="{color}" stroke-width="2"/>"#,
                    coords.join(" ")
                );
            }
            for (px, py) in &points {
                let _ = writeln!(
                    svg,
                    r#"<circle cx="{px:.2}" cy="{py:.2}" r="3" fill="{color}"/>"#
                );
            }
            let _ = writeln!(
                svg,
                r#"<rect x="{}" y="{}" width="10" height="10" fill="{color}"/><text x="{}" y="{}" font-family="sans-serif" font-size="12">{}</text>"#,
                right - 80.0,
                legend_y - 9.0,
                right - 66.0,
                legend_y,
                escape(label)
            );
        }

        svg.push_str("</svg>\n");
        svg
    }
}

impl Plotter for SvgPlotter {
    fn render(
        &mut self,
        x: &[usize],
        series_a: &[f64],
        series_b: &[f64],
        title: &str,
        path: &Path,
    ) -> Result<(), CollabError> {
        let svg = self.svg(x, series_a, series_b, title);
        persistence::atomic_write(path, svg.as_bytes())?;
        Ok(())
    }
}

/// Min/max of `values`, widened so the range is never empty.
fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    if max - min < f64::EPSILON {
        let pad = if min.abs() > 1.0 { min.abs() * 0.05 } else { 0.5 };
        return (min - pad, max + pad);
    }
    (min, max)
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_writes_svg() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("loss.svg");
        let mut plotter = SvgPlotter::default();
        plotter
            .render(&[1, 2, 3], &[0.9, 0.5, 0.3], &[1.0, 0.7, 0.6], "Loss", &path)
            .unwrap();

        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains(">Loss</text>"));
        assert_eq!(svg.matches("<polyline").count(), 3);
        assert_eq!(svg.matches("<circle").count(), 6);
    }

    #[test]
    fn test_single_point_and_non_finite() {
        let plotter = SvgPlotter::default();
        let svg = plotter.svg(&[1], &[f64::NAN], &[0.5], "Classification accuracy");
        // Axes only; a single point draws a marker but no line.
        assert_eq!(svg.matches("<polyline").count(), 1);
        assert_eq!(svg.matches("<circle").count(), 1);
        assert!(!svg.contains("NaN"));
    }

    #[test]
    fn test_title_is_escaped() {
        let svg = SvgPlotter::default()
            .with_labels("a", "b")
            .svg(&[1, 2], &[1.0, 2.0], &[2.0, 1.0], "loss <raw> & co");
        assert!(svg.contains("loss &lt;raw&gt; &amp; co"));
    }

    #[test]
    fn test_padded_range() {
        assert_eq!(padded_range([0.5, 0.5].into_iter()), (0.0, 1.0));
        assert_eq!(padded_range([10.0, 10.0].into_iter()), (9.5, 10.5));
        assert_eq!(padded_range(std::iter::empty()), (0.0, 1.0));
        assert_eq!(padded_range([0.2, 0.8].into_iter()), (0.2, 0.8));
    }
}
