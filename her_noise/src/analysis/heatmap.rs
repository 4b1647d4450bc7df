use std::ops::Range;
use std::path::Path;

use plotters::prelude::*;
use tracing::info;

use crate::analysis::statistics::min_max;
use crate::config::Config;
use crate::data_handling::cells::{PositionedCell, RegionCells};
use crate::errors::{plot_err, Result};
use crate::models::{Gene, Region};
use crate::plotting::{gene_colour, save_figure};

type Segment = ((f64, f64), (f64, f64));

/// Slice boundaries, region labels and plot extent of one embryo.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapLayout {
    pub segments: Vec<Segment>,
    pub labels: Vec<(f64, f64, &'static str)>,
    pub x_range: Range<f64>,
    pub y_range: Range<f64>,
}

pub fn layout(regions: &[RegionCells]) -> HeatmapLayout {
    let mut segments = Vec::new();
    let mut labels = Vec::new();
    let (mut top, mut bottom) = (0.0, 0.0);
    let (mut left, mut right) = (f64::INFINITY, f64::NEG_INFINITY);

    for r in regions {
        if r.region == Region::Left {
            top = r.top_y;
        }
        bottom = r.bottom_y;

        for e in &r.edges {
            segments.push(((e.bottom_right, r.bottom_y), (e.top_right, r.top_y)));
            segments.push(((e.bottom_left, r.bottom_y), (e.top_left, r.top_y)));
        }
        let (first, last) = match (r.edges.first(), r.edges.last()) {
            (Some(f), Some(l)) => (f, l),
            _ => continue,
        };
        left = left.min(first.top_left).min(first.bottom_left);
        right = right.max(last.top_right).max(last.bottom_right);

        let top_mid = (first.top_left + last.top_right) / 2.0;
        let bottom_mid = (first.bottom_left + last.bottom_right) / 2.0;
        if r.region == Region::Left {
            labels.push((top_mid, r.top_y + 20.0, "L"));
            if regions.len() <= 1 {
                labels.push((bottom_mid, r.bottom_y - 30.0, "R"));
            }
        } else {
            labels.push((bottom_mid, r.bottom_y - 30.0, "R"));
        }
        segments.push(((first.bottom_left, r.bottom_y), (last.bottom_right, r.bottom_y)));
        segments.push(((first.top_left, r.top_y), (last.top_right, r.top_y)));
    }

    if !left.is_finite() {
        left = 0.0;
        right = 0.0;
    }
    HeatmapLayout {
        segments,
        labels,
        x_range: (left - 50.0)..(right + 50.0),
        y_range: (bottom - 50.0)..(top + 50.0),
    }
}

/// Expression level at `fraction` of the way from the region's minimum to its maximum.
pub fn expression_threshold(values: &[f64], fraction: f64) -> Option<f64> {
    min_max(values).map(|(lo, hi)| lo + (hi - lo) * fraction)
}

/// Cells of a region split into (below threshold, at or above threshold).
pub fn split_cells(cells: &[PositionedCell], gene: Gene, fraction: f64) -> (Vec<&PositionedCell>, Vec<&PositionedCell>) {
    let level = |c: &PositionedCell| match gene {
        Gene::Her7 => c.her7,
        Gene::Her1 => c.her1,
        Gene::Her => c.her1 + c.her7,
    };
    let values: Vec<f64> = cells.iter().map(|c| level(c)).collect();
    match expression_threshold(&values, fraction) {
        Some(t) => cells.iter().partition(|c| level(*c) < t),
        None => (cells.iter().collect(), Vec::new()),
    }
}

fn draw_heatmap(path: &Path, regions: &[RegionCells], layout: &HeatmapLayout, gene: Gene, config: &Config) -> Result<()> {
    save_figure(path, (config.figure.width, config.figure.width / 2), (1, 1), |panels| {
        let mut chart = ChartBuilder::on(&panels[0])
            .margin(5)
            .build_cartesian_2d(layout.x_range.clone(), layout.y_range.clone())
            .map_err(plot_err)?;

        chart
            .draw_series(
                layout
                    .segments
                    .iter()
                    .map(|&(a, b)| PathElement::new(vec![a, b], BLACK.stroke_width(1))),
            )
            .map_err(plot_err)?;

        let colour = gene_colour(gene);
        for r in regions {
            let (low, high) = split_cells(&r.cells, gene, config.expression_threshold);
            // low expression first so high cells stay on top
            chart
                .draw_series(low.iter().map(|c| Circle::new((c.x, c.y), 4, BLACK.mix(0.2).filled())))
                .map_err(plot_err)?;
            chart
                .draw_series(high.iter().map(|c| Circle::new((c.x, c.y), 4, colour.filled())))
                .map_err(plot_err)?;
        }

        chart
            .draw_series(
                layout
                    .labels
                    .iter()
                    .map(|&(x, y, text)| Text::new(text, (x, y), ("sans-serif", 16).into_font())),
            )
            .map_err(plot_err)?;
        Ok(())
    })
}

/// Draws `heatmap_her1.png` and `heatmap_her7.png` for one embryo.
pub fn run(regions: &[RegionCells], config: &Config, out_dir: &Path) -> Result<()> {
    info!("Drawing heatmaps of {} regions", regions.len());
    let layout = layout(regions);
    for gene in Gene::REPORTERS {
        let path = out_dir.join(format!("heatmap_{}.png", gene.label()));
        draw_heatmap(&path, regions, &layout, gene, config)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_handling::cells::SliceEdge;

    fn region(region: Region, top_y: f64, bottom_y: f64, edges: &[(f64, f64, f64, f64)]) -> RegionCells {
        RegionCells {
            region,
            top_y,
            bottom_y,
            edges: edges
                .iter()
                .map(|&(bottom_left, bottom_right, top_left, top_right)| SliceEdge {
                    bottom_left,
                    bottom_right,
                    top_left,
                    top_right,
                })
                .collect(),
            cells: Vec::new(),
        }
    }

    #[test]
    fn layout_spans_both_regions() {
        let regions = vec![
            region(Region::Left, 400.0, 250.0, &[(10.0, 20.0, 12.0, 22.0), (20.0, 30.0, 22.0, 32.0)]),
            region(Region::Right, 240.0, 100.0, &[(5.0, 15.0, 6.0, 16.0)]),
        ];
        let l = layout(&regions);
        // two lines per slice plus top and bottom of each region
        assert_eq!(l.segments.len(), 2 * 3 + 4);
        assert_eq!(l.x_range, -45.0..82.0);
        assert_eq!(l.y_range, 50.0..450.0);
        assert_eq!(l.labels, vec![(22.0, 420.0, "L"), (10.0, 70.0, "R")]);
    }

    #[test]
    fn single_region_gets_both_labels() {
        let regions = vec![region(Region::Left, 100.0, 0.0, &[(0.0, 10.0, 0.0, 10.0)])];
        let l = layout(&regions);
        assert_eq!(l.labels.len(), 2);
        assert_eq!(l.labels[1], (5.0, -30.0, "R"));
    }

    #[test]
    fn threshold_at_thirty_percent_of_range() {
        let cells: Vec<PositionedCell> = [0.0, 2.9, 3.0, 10.0]
            .iter()
            .map(|&v| PositionedCell { x: 0.0, y: 0.0, her1: v, her7: 1.0 })
            .collect();
        assert_eq!(expression_threshold(&[0.0, 10.0], 0.3), Some(3.0));
        let (low, high) = split_cells(&cells, Gene::Her1, 0.3);
        assert_eq!(low.len(), 2);
        assert_eq!(high.len(), 2);
        // constant levels are all at the threshold
        let (low, high) = split_cells(&cells, Gene::Her7, 0.3);
        assert!(low.is_empty());
        assert_eq!(high.len(), 4);
    }
}
