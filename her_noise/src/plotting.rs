use std::ops::Range;
use std::path::Path;

use plotters::coord::Shift;
use plotters::prelude::*;
use tracing::info;

use crate::analysis::statistics::min_max;
use crate::errors::{plot_err, NoiseError, Result};
use crate::models::Gene;

pub type Panel<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

pub const SKY_BLUE: RGBColor = RGBColor(0x2A, 0x6E, 0xFF);
pub const MAGENTA: RGBColor = RGBColor(191, 0, 191);
pub const DARK_GREEN: RGBColor = RGBColor(0, 128, 0);
pub const TEAL: RGBColor = RGBColor(0x00, 0x8D, 0x74);
pub const VIOLET: RGBColor = RGBColor(0x72, 0x2A, 0xFF);

/// Total, intrinsic and extrinsic noise colours.
pub const NOISE_COLOURS: [RGBColor; 3] = [SKY_BLUE, MAGENTA, DARK_GREEN];

pub fn gene_colour(gene: Gene) -> RGBColor {
    match gene {
        Gene::Her1 => BLUE,
        Gene::Her7 => RED,
        Gene::Her => VIOLET,
    }
}

/// Accepts `#rrggbb`, single-letter colour codes and common colour names.
pub fn parse_colour(spec: &str) -> Result<RGBColor> {
    let s = spec.trim().to_ascii_lowercase();
    if let Some(hex) = s.strip_prefix('#') {
        if hex.len() == 6 {
            let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);
            if let (Ok(r), Ok(g), Ok(b)) = (channel(0), channel(2), channel(4)) {
                return Ok(RGBColor(r, g, b));
            }
        }
        return Err(NoiseError::InvalidInput(format!("bad colour {}", spec)));
    }
    let rgb = match s.as_str() {
        "b" | "blue" => (0, 0, 255),
        "g" | "green" => (0, 128, 0),
        "r" | "red" => (255, 0, 0),
        "c" | "cyan" => (0, 191, 191),
        "m" | "magenta" => (191, 0, 191),
        "y" | "yellow" => (191, 191, 0),
        "k" | "black" => (0, 0, 0),
        "w" | "white" => (255, 255, 255),
        "orange" => (255, 165, 0),
        "purple" => (128, 0, 128),
        "grey" | "gray" => (128, 128, 128),
        "brown" => (165, 42, 42),
        "pink" => (255, 192, 203),
        "navy" => (0, 0, 128),
        "teal" => (0, 128, 128),
        "olive" => (128, 128, 0),
        "lightblue" => (173, 216, 230),
        "darkblue" => (0, 0, 139),
        "darkred" => (139, 0, 0),
        "lime" => (0, 255, 0),
        _ => return Err(NoiseError::InvalidInput(format!("unknown colour {}", spec))),
    };
    Ok(RGBColor(rgb.0, rgb.1, rgb.2))
}

// ─── Figure ─────────────────────────────────────────────────────────────────

/// Creates a PNG split into `grid` (rows, columns) panels and hands them to `draw`.
pub fn save_figure<F>(path: &Path, size: (u32, u32), grid: (usize, usize), draw: F) -> Result<()>
where
    F: FnOnce(&[Panel<'_>]) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;
    let panels = root.split_evenly(grid);
    draw(&panels)?;
    root.present().map_err(plot_err)?;
    info!("Saved {}", path.display());
    Ok(())
}

// ─── Scatter / line charts ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorPoint {
    pub x: f64,
    pub y: f64,
    /// (left, right)
    pub x_err: (f64, f64),
    /// (down, up)
    pub y_err: (f64, f64),
}

impl ErrorPoint {
    pub fn new(x: f64, y: f64) -> Self {
        ErrorPoint {
            x,
            y,
            x_err: (0.0, 0.0),
            y_err: (0.0, 0.0),
        }
    }

    pub fn y_err(mut self, e: f64) -> Self {
        self.y_err = (e, e);
        self
    }

    pub fn x_err(mut self, e: f64) -> Self {
        self.x_err = (e, e);
        self
    }

    pub fn asym_y(mut self, down: f64, up: f64) -> Self {
        self.y_err = (down, up);
        self
    }

    pub fn asym_x(mut self, left: f64, right: f64) -> Self {
        self.x_err = (left, right);
        self
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Marker {
    Circle,
    Square,
    None,
}

#[derive(Debug, Clone)]
pub struct PlotSeries {
    pub label: Option<String>,
    pub colour: RGBColor,
    pub points: Vec<ErrorPoint>,
    pub line: bool,
    /// (x, low, high) outline of a filled band.
    pub band: Vec<(f64, f64, f64)>,
    pub marker: Marker,
    pub size: u32,
    pub alpha: f64,
}

impl PlotSeries {
    pub fn new(colour: RGBColor, points: Vec<ErrorPoint>) -> Self {
        PlotSeries {
            label: None,
            colour,
            points,
            line: false,
            band: Vec::new(),
            marker: Marker::Circle,
            size: 3,
            alpha: 1.0,
        }
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn line(mut self) -> Self {
        self.line = true;
        self
    }

    pub fn band(mut self, band: Vec<(f64, f64, f64)>) -> Self {
        self.band = band;
        self
    }

    pub fn marker(mut self, marker: Marker) -> Self {
        self.marker = marker;
        self
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    fn x_extent(&self) -> Vec<f64> {
        let mut xs: Vec<f64> = self
            .points
            .iter()
            .flat_map(|p| [p.x - p.x_err.0, p.x + p.x_err.1])
            .collect();
        xs.extend(self.band.iter().map(|b| b.0));
        xs
    }

    fn y_extent(&self) -> Vec<f64> {
        let mut ys: Vec<f64> = self
            .points
            .iter()
            .flat_map(|p| [p.y - p.y_err.0, p.y + p.y_err.1])
            .collect();
        ys.extend(self.band.iter().flat_map(|b| [b.1, b.2]));
        ys
    }
}

#[derive(Debug, Clone, Default)]
pub struct Axes {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub x_range: Option<Range<f64>>,
    pub y_range: Option<Range<f64>>,
    /// Data are log10 values; ticks are labelled with 10^v.
    pub log10: bool,
}

impl Axes {
    pub fn new(title: &str, x_label: &str, y_label: &str) -> Self {
        Axes {
            title: title.to_string(),
            x_label: x_label.to_string(),
            y_label: y_label.to_string(),
            ..Axes::default()
        }
    }

    pub fn x_range(mut self, r: Range<f64>) -> Self {
        self.x_range = Some(r);
        self
    }

    pub fn y_range(mut self, r: Range<f64>) -> Self {
        self.y_range = Some(r);
        self
    }

    pub fn log10(mut self) -> Self {
        self.log10 = true;
        self
    }
}

/// Range covering `values` with `pad` of the span added on both sides.
pub fn padded_range(values: &[f64], pad: f64) -> Range<f64> {
    match min_max(values) {
        Some((lo, hi)) => {
            let span = if (hi - lo).abs() < 1e-12 {
                hi.abs().max(1.0)
            } else {
                hi - lo
            };
            (lo - span * pad)..(hi + span * pad)
        }
        None => 0.0..1.0,
    }
}

fn log_tick(v: f64, decimals: usize) -> String {
    format!("{:.*}", decimals, 10f64.powf(v))
}

pub fn draw_chart(area: &Panel<'_>, axes: &Axes, series: &[PlotSeries]) -> Result<()> {
    let x_range = axes.x_range.clone().unwrap_or_else(|| {
        let xs: Vec<f64> = series.iter().flat_map(|s| s.x_extent()).collect();
        padded_range(&xs, 0.05)
    });
    let y_range = axes.y_range.clone().unwrap_or_else(|| {
        let ys: Vec<f64> = series.iter().flat_map(|s| s.y_extent()).collect();
        padded_range(&ys, 0.08)
    });

    let mut builder = ChartBuilder::on(area);
    builder
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(60);
    if !axes.title.is_empty() {
        builder.caption(&axes.title, ("sans-serif", 20));
    }
    let mut chart = builder
        .build_cartesian_2d(x_range, y_range)
        .map_err(plot_err)?;

    let log_x = |v: &f64| log_tick(*v, 0);
    let log_y = |v: &f64| log_tick(*v, 2);
    let mut mesh = chart.configure_mesh();
    mesh.x_desc(axes.x_label.as_str())
        .y_desc(axes.y_label.as_str())
        .axis_desc_style(("sans-serif", 16))
        .label_style(("sans-serif", 12));
    if axes.log10 {
        mesh.x_label_formatter(&log_x).y_label_formatter(&log_y);
    }
    mesh.draw().map_err(plot_err)?;

    for s in series {
        let colour = s.colour;
        let points: Vec<ErrorPoint> = s.points.iter().copied().filter(ErrorPoint::is_finite).collect();

        let band: Vec<(f64, f64, f64)> = s
            .band
            .iter()
            .copied()
            .filter(|b| b.0.is_finite() && b.1.is_finite() && b.2.is_finite())
            .collect();
        if band.len() > 1 {
            let mut outline: Vec<(f64, f64)> = band.iter().map(|&(x, _, hi)| (x, hi)).collect();
            outline.extend(band.iter().rev().map(|&(x, lo, _)| (x, lo)));
            chart
                .draw_series(std::iter::once(Polygon::new(outline, colour.mix(0.25).filled())))
                .map_err(plot_err)?;
        }

        if s.line && points.len() > 1 {
            chart
                .draw_series(LineSeries::new(
                    points.iter().map(|p| (p.x, p.y)),
                    colour.stroke_width(2),
                ))
                .map_err(plot_err)?;
        }

        chart
            .draw_series(
                points
                    .iter()
                    .filter(|p| p.y_err != (0.0, 0.0))
                    .map(|p| {
                        ErrorBar::new_vertical(p.x, p.y - p.y_err.0, p.y, p.y + p.y_err.1, colour.filled(), 6)
                    }),
            )
            .map_err(plot_err)?;
        chart
            .draw_series(
                points
                    .iter()
                    .filter(|p| p.x_err != (0.0, 0.0))
                    .map(|p| {
                        ErrorBar::new_horizontal(p.y, p.x - p.x_err.0, p.x, p.x + p.x_err.1, colour.filled(), 6)
                    }),
            )
            .map_err(plot_err)?;

        let style = colour.mix(s.alpha).filled();
        let size = s.size as i32;
        let anno = match s.marker {
            Marker::Circle => chart
                .draw_series(points.iter().map(|p| Circle::new((p.x, p.y), s.size, style)))
                .map_err(plot_err)?,
            Marker::Square => chart
                .draw_series(points.iter().map(|p| {
                    EmptyElement::at((p.x, p.y)) + Rectangle::new([(-size, -size), (size, size)], style)
                }))
                .map_err(plot_err)?,
            Marker::None => chart
                .draw_series(std::iter::empty::<Circle<(f64, f64), u32>>())
                .map_err(plot_err)?,
        };
        if let Some(label) = &s.label {
            let marker = s.marker;
            anno.label(label.clone()).legend(move |(x, y)| match marker {
                Marker::Square => {
                    EmptyElement::at((x, y)) + Rectangle::new([(-4, -4), (4, 4)], colour.filled())
                }
                _ => EmptyElement::at((x, y)) + Rectangle::new([(-6, -1), (6, 1)], colour.filled()),
            });
        }
    }

    if series.iter().any(|s| s.label.is_some()) {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .label_font(("sans-serif", 13))
            .draw()
            .map_err(plot_err)?;
    }
    Ok(())
}

// ─── Bar charts ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub x: f64,
    pub height: f64,
    pub err: f64,
    pub colour: RGBColor,
}

/// Bars centred on `x` with black error whiskers. `ticks` label integer group positions.
pub fn draw_bars(
    area: &Panel<'_>,
    axes: &Axes,
    bars: &[Bar],
    width: f64,
    ticks: &[(f64, String)],
    legend: &[(String, RGBColor)],
) -> Result<()> {
    let bars: Vec<Bar> = bars
        .iter()
        .copied()
        .filter(|b| b.height.is_finite())
        .collect();
    let xs: Vec<f64> = bars.iter().map(|b| b.x).chain(ticks.iter().map(|t| t.0)).collect();
    let (x_lo, x_hi) = min_max(&xs).unwrap_or((0.0, 1.0));
    let mut ys: Vec<f64> = bars
        .iter()
        .flat_map(|b| {
            let e = if b.err.is_finite() { b.err } else { 0.0 };
            [b.height + e, b.height - e]
        })
        .collect();
    ys.push(0.0);
    let y_range = axes.y_range.clone().unwrap_or_else(|| {
        let (lo, hi) = min_max(&ys).unwrap_or((0.0, 1.0));
        let span = if hi - lo > 0.0 { hi - lo } else { 1.0 };
        lo.min(0.0)..hi + span * 0.15
    });

    let mut builder = ChartBuilder::on(area);
    builder
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(60);
    if !axes.title.is_empty() {
        builder.caption(&axes.title, ("sans-serif", 20));
    }
    let mut chart = builder
        .build_cartesian_2d((x_lo - 1.0)..(x_hi + 1.0), y_range)
        .map_err(plot_err)?;

    let tick_label = |v: &f64| {
        ticks
            .iter()
            .find(|(x, _)| (x - v).abs() < 1e-6)
            .map(|(_, l)| l.clone())
            .unwrap_or_default()
    };
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(ticks.len() + 3)
        .x_label_formatter(&tick_label)
        .x_desc(axes.x_label.as_str())
        .y_desc(axes.y_label.as_str())
        .axis_desc_style(("sans-serif", 16))
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(bars.iter().map(|b| {
            Rectangle::new(
                [(b.x - width / 2.0, 0.0), (b.x + width / 2.0, b.height)],
                b.colour.filled(),
            )
        }))
        .map_err(plot_err)?;
    chart
        .draw_series(
            bars.iter()
                .filter(|b| b.err.is_finite() && b.err > 0.0)
                .map(|b| ErrorBar::new_vertical(b.x, b.height - b.err, b.height, b.height + b.err, BLACK.filled(), 8)),
        )
        .map_err(plot_err)?;

    for (name, colour) in legend {
        let colour = *colour;
        chart
            .draw_series(std::iter::empty::<Rectangle<(f64, f64)>>())
            .map_err(plot_err)?
            .label(name.clone())
            .legend(move |(x, y)| Rectangle::new([(x - 5, y - 5), (x + 5, y + 5)], colour.filled()));
    }
    if !legend.is_empty() {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(plot_err)?;
    }
    Ok(())
}

// ─── Histograms ─────────────────────────────────────────────────────────────

/// Equal-width histogram over the finite range of `values`: (low edge, high edge, count).
pub fn histogram(values: &[f64], bins: usize) -> Vec<(f64, f64, usize)> {
    let (lo, hi) = match min_max(values) {
        Some(r) if bins > 0 => r,
        _ => return Vec::new(),
    };
    let width = if hi > lo { (hi - lo) / bins as f64 } else { 1.0 };
    let mut counts = vec![0usize; bins];
    for v in values.iter().filter(|v| v.is_finite()) {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, c)| (lo + width * i as f64, lo + width * (i + 1) as f64, c))
        .collect()
}

pub fn draw_histogram(area: &Panel<'_>, axes: &Axes, hist: &[(f64, f64, usize)], colour: RGBColor) -> Result<()> {
    let edges: Vec<f64> = hist.iter().flat_map(|h| [h.0, h.1]).collect();
    let x_range = axes.x_range.clone().unwrap_or_else(|| padded_range(&edges, 0.02));
    let max_count = hist.iter().map(|h| h.2).max().unwrap_or(1).max(1) as f64;

    let mut chart = ChartBuilder::on(area)
        .caption(&axes.title, ("sans-serif", 20))
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, 0.0..max_count * 1.1)
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .x_desc(axes.x_label.as_str())
        .y_desc(axes.y_label.as_str())
        .draw()
        .map_err(plot_err)?;
    chart
        .draw_series(
            hist.iter()
                .map(|&(x0, x1, c)| Rectangle::new([(x0, 0.0), (x1, c as f64)], colour.mix(0.6).filled())),
        )
        .map_err(plot_err)?;
    Ok(())
}
