//! Deterministic SVG rendering for figures captured from the plotting shim.

use serde::{Deserialize, Serialize};

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 480.0;
const MARGIN_LEFT: f64 = 60.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 50.0;
const Y_TICKS: usize = 5;

const PALETTE: &[&str] = &[
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b",
];

/// Figure description emitted by the shim's `show()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FigureSpec {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub xlabel: Option<String>,
    #[serde(default)]
    pub ylabel: Option<String>,
    #[serde(default)]
    pub series: Vec<SeriesSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SeriesSpec {
    Line {
        #[serde(default)]
        x: Vec<f64>,
        y: Vec<f64>,
        #[serde(default)]
        label: Option<String>,
    },
    Scatter {
        #[serde(default)]
        x: Vec<f64>,
        y: Vec<f64>,
        #[serde(default)]
        label: Option<String>,
    },
    Bar {
        labels: Vec<String>,
        y: Vec<f64>,
        #[serde(default)]
        label: Option<String>,
    },
    Hist {
        values: Vec<f64>,
        #[serde(default = "default_bins")]
        bins: usize,
        #[serde(default)]
        label: Option<String>,
    },
}

fn default_bins() -> usize {
    10
}

/// A rendered figure with its session-monotonic sequence number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedFigure {
    pub sequence: u64,
    pub svg: String,
}

// Bar-like marks normalized to (left, width, height) in data space.
struct BarMark {
    x0: f64,
    x1: f64,
    y: f64,
    color: usize,
}

struct PointMark {
    x: f64,
    y: f64,
}

/// Render a spec into a self-contained SVG document. Output depends only on
/// the spec, so re-rendering the same figure is byte-identical.
pub fn render_svg(spec: &FigureSpec) -> String {
    let mut bars: Vec<BarMark> = Vec::new();
    let mut lines: Vec<(Vec<PointMark>, usize)> = Vec::new();
    let mut scatters: Vec<(Vec<PointMark>, usize)> = Vec::new();
    let mut category_labels: Vec<(f64, String)> = Vec::new();

    for (series_idx, series) in spec.series.iter().enumerate() {
        let color = series_idx % PALETTE.len();
        match series {
            SeriesSpec::Line { x, y, .. } => {
                lines.push((points_of(x, y), color));
            }
            SeriesSpec::Scatter { x, y, .. } => {
                scatters.push((points_of(x, y), color));
            }
            SeriesSpec::Bar { labels, y, .. } => {
                for (i, value) in y.iter().enumerate() {
                    bars.push(BarMark {
                        x0: i as f64 + 0.1,
                        x1: i as f64 + 0.9,
                        y: *value,
                        color,
                    });
                }
                for (i, label) in labels.iter().enumerate().take(y.len()) {
                    category_labels.push((i as f64 + 0.5, label.clone()));
                }
            }
            SeriesSpec::Hist { values, bins, .. } => {
                for mark in histogram(values, (*bins).max(1), color) {
                    bars.push(mark);
                }
            }
        }
    }

    let (x_min, x_max, y_min, y_max) = bounds(&bars, &lines, &scatters);
    let plot_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let sx = |x: f64| MARGIN_LEFT + (x - x_min) / (x_max - x_min) * plot_w;
    let sy = |y: f64| MARGIN_TOP + plot_h - (y - y_min) / (y_max - y_min) * plot_h;

    let mut svg = String::new();
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{WIDTH}\" height=\"{HEIGHT}\" viewBox=\"0 0 {WIDTH} {HEIGHT}\">\n"
    ));
    svg.push_str("<rect width=\"100%\" height=\"100%\" fill=\"#ffffff\"/>\n");

    // axes
    svg.push_str(&format!(
        "<line x1=\"{l}\" y1=\"{t}\" x2=\"{l}\" y2=\"{b}\" stroke=\"#333333\"/>\n",
        l = MARGIN_LEFT,
        t = MARGIN_TOP,
        b = MARGIN_TOP + plot_h
    ));
    svg.push_str(&format!(
        "<line x1=\"{l}\" y1=\"{b}\" x2=\"{r}\" y2=\"{b}\" stroke=\"#333333\"/>\n",
        l = MARGIN_LEFT,
        r = MARGIN_LEFT + plot_w,
        b = MARGIN_TOP + plot_h
    ));

    for tick in 0..=Y_TICKS {
        let value = y_min + (y_max - y_min) * tick as f64 / Y_TICKS as f64;
        let y = sy(value);
        svg.push_str(&format!(
            "<line x1=\"{x0}\" y1=\"{y:.2}\" x2=\"{x1}\" y2=\"{y:.2}\" stroke=\"#cccccc\"/>\n",
            x0 = MARGIN_LEFT - 4.0,
            x1 = MARGIN_LEFT + plot_w,
        ));
        svg.push_str(&format!(
            "<text x=\"{x}\" y=\"{ty:.2}\" font-size=\"11\" text-anchor=\"end\" fill=\"#333333\">{}</text>\n",
            format_tick(value),
            x = MARGIN_LEFT - 8.0,
            ty = y + 4.0,
        ));
    }

    for (x, label) in &category_labels {
        svg.push_str(&format!(
            "<text x=\"{px:.2}\" y=\"{py:.2}\" font-size=\"11\" text-anchor=\"middle\" fill=\"#333333\">{}</text>\n",
            escape(label),
            px = sx(*x),
            py = MARGIN_TOP + plot_h + 16.0,
        ));
    }

    for bar in &bars {
        let x = sx(bar.x0);
        let w = sx(bar.x1) - x;
        let baseline = 0.0_f64.clamp(y_min, y_max);
        let top = sy(bar.y.max(baseline));
        let bottom = sy(bar.y.min(baseline));
        svg.push_str(&format!(
            "<rect x=\"{x:.2}\" y=\"{top:.2}\" width=\"{w:.2}\" height=\"{h:.2}\" fill=\"{color}\"/>\n",
            h = bottom - top,
            color = PALETTE[bar.color],
        ));
    }

    for (points, color) in &lines {
        if points.is_empty() {
            continue;
        }
        let path: Vec<String> = points
            .iter()
            .map(|p| format!("{:.2},{:.2}", sx(p.x), sy(p.y)))
            .collect();
        svg.push_str(&format!(
            "<polyline points=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"1.5\"/>\n",
            path.join(" "),
            PALETTE[*color],
        ));
    }

    for (points, color) in &scatters {
        for p in points {
            svg.push_str(&format!(
                "<circle cx=\"{:.2}\" cy=\"{:.2}\" r=\"3\" fill=\"{}\"/>\n",
                sx(p.x),
                sy(p.y),
                PALETTE[*color],
            ));
        }
    }

    if let Some(title) = &spec.title {
        svg.push_str(&format!(
            "<text x=\"{x}\" y=\"24\" font-size=\"15\" text-anchor=\"middle\" fill=\"#111111\">{}</text>\n",
            escape(title),
            x = WIDTH / 2.0,
        ));
    }
    if let Some(xlabel) = &spec.xlabel {
        svg.push_str(&format!(
            "<text x=\"{x}\" y=\"{y}\" font-size=\"12\" text-anchor=\"middle\" fill=\"#333333\">{}</text>\n",
            escape(xlabel),
            x = MARGIN_LEFT + plot_w / 2.0,
            y = HEIGHT - 12.0,
        ));
    }
    if let Some(ylabel) = &spec.ylabel {
        svg.push_str(&format!(
            "<text x=\"16\" y=\"{y}\" font-size=\"12\" text-anchor=\"middle\" transform=\"rotate(-90 16 {y})\" fill=\"#333333\">{}</text>\n",
            escape(ylabel),
            y = MARGIN_TOP + plot_h / 2.0,
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

fn points_of(x: &[f64], y: &[f64]) -> Vec<PointMark> {
    x.iter()
        .zip(y.iter())
        .map(|(x, y)| PointMark { x: *x, y: *y })
        .collect()
}

fn histogram(values: &[f64], bins: usize, color: usize) -> Vec<BarMark> {
    if values.is_empty() {
        return Vec::new();
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = if max > min { max - min } else { 1.0 };
    let width = span / bins as f64;

    let mut counts = vec![0_u64; bins];
    for value in values {
        let idx = (((value - min) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    counts
        .iter()
        .enumerate()
        .map(|(i, count)| BarMark {
            x0: min + i as f64 * width,
            x1: min + (i + 1) as f64 * width,
            y: *count as f64,
            color,
        })
        .collect()
}

fn bounds(
    bars: &[BarMark],
    lines: &[(Vec<PointMark>, usize)],
    scatters: &[(Vec<PointMark>, usize)],
) -> (f64, f64, f64, f64) {
    let mut x_min = f64::INFINITY;
    let mut x_max = f64::NEG_INFINITY;
    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;

    for bar in bars {
        x_min = x_min.min(bar.x0);
        x_max = x_max.max(bar.x1);
        y_min = y_min.min(bar.y.min(0.0));
        y_max = y_max.max(bar.y.max(0.0));
    }
    for (points, _) in lines.iter().chain(scatters.iter()) {
        for p in points {
            x_min = x_min.min(p.x);
            x_max = x_max.max(p.x);
            y_min = y_min.min(p.y);
            y_max = y_max.max(p.y);
        }
    }

    if !x_min.is_finite() || !x_max.is_finite() {
        x_min = 0.0;
        x_max = 1.0;
    }
    if !y_min.is_finite() || !y_max.is_finite() {
        y_min = 0.0;
        y_max = 1.0;
    }
    if (x_max - x_min).abs() < f64::EPSILON {
        x_min -= 0.5;
        x_max += 0.5;
    }
    if (y_max - y_min).abs() < f64::EPSILON {
        y_min -= 0.5;
        y_max += 0.5;
    }
    (x_min, x_max, y_min, y_max)
}

fn format_tick(value: f64) -> String {
    if value.abs() >= 1000.0 || (value.fract().abs() < 1e-9 && value.abs() < 1e15) {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
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

    fn line_spec() -> FigureSpec {
        serde_json::from_value(serde_json::json!({
            "title": "Units over time",
            "xlabel": "day",
            "ylabel": "units",
            "series": [
                {"kind": "line", "x": [0.0, 1.0, 2.0], "y": [3.0, 5.0, 2.0], "label": null}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn renders_line_series() {
        let svg = render_svg(&line_spec());
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("<polyline"));
        assert!(svg.contains("Units over time"));
    }

    #[test]
    fn rendering_is_deterministic() {
        assert_eq!(render_svg(&line_spec()), render_svg(&line_spec()));
    }

    #[test]
    fn parses_shim_payload_kinds() {
        let spec: FigureSpec = serde_json::from_value(serde_json::json!({
            "title": null,
            "xlabel": null,
            "ylabel": null,
            "series": [
                {"kind": "bar", "labels": ["a", "b"], "y": [1.0, 2.0], "label": null},
                {"kind": "hist", "values": [1.0, 1.5, 2.0], "bins": 2, "label": null},
                {"kind": "scatter", "x": [0.0], "y": [1.0], "label": "pts"}
            ]
        }))
        .unwrap();
        let svg = render_svg(&spec);
        assert!(svg.contains("<rect"));
        assert!(svg.contains("<circle"));
    }

    #[test]
    fn empty_figure_still_renders_frame() {
        let spec = FigureSpec {
            title: Some("empty".to_string()),
            xlabel: None,
            ylabel: None,
            series: Vec::new(),
        };
        let svg = render_svg(&spec);
        assert!(svg.contains("empty"));
        assert!(svg.ends_with("</svg>\n"));
    }

    #[test]
    fn titles_are_escaped() {
        let spec = FigureSpec {
            title: Some("a < b & c".to_string()),
            xlabel: None,
            ylabel: None,
            series: Vec::new(),
        };
        assert!(render_svg(&spec).contains("a &lt; b &amp; c"));
    }
}
