use std::path::Path;

use plotters::style::RGBColor;
use polars::prelude::*;
use tracing::info;

use crate::config::Config;
use crate::data_handling::workbook::Workbook;
use crate::errors::Result;
use crate::helper_functions::{frame, int_col, opt_col, str_col};
use crate::models::{EmbryoSlices, Gene};
use crate::plotting::{draw_histogram, histogram, save_figure, Axes};

pub const RAW_EXPRESSION_WORKBOOK: &str = "raw_expression_afterbackgroundsub";
pub const TOO_FEW_CELLS: &str = "Too few cells";

const ORANGE: RGBColor = RGBColor(255, 165, 0);
const LIGHT_BLUE: RGBColor = RGBColor(173, 216, 230);

/// Pooled per-cell values of every valid slice of every embryo.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PooledExpression {
    pub her1: Vec<f64>,
    pub her7: Vec<f64>,
    pub her: Vec<f64>,
}

/// One row per cell and reporter; a slice without cells gets a single marker row per reporter.
pub fn embryo_sheet(embryo: &EmbryoSlices, pooled: &mut PooledExpression) -> Result<DataFrame> {
    let mut region = Vec::new();
    let mut slice = Vec::new();
    let mut gene = Vec::new();
    let mut cell = Vec::new();
    let mut value = Vec::new();
    let mut note = Vec::new();

    for r in &embryo.regions {
        for row in &r.rows {
            let cells = row.cells.as_deref().unwrap_or(&[]);
            for g in Gene::REPORTERS {
                if cells.is_empty() {
                    region.push(r.region.short().to_string());
                    slice.push(row.position as i64 + 1);
                    gene.push(g.sheet_name().to_string());
                    cell.push(None);
                    value.push(None);
                    note.push(TOO_FEW_CELLS.to_string());
                    continue;
                }
                for (i, c) in cells.iter().enumerate() {
                    region.push(r.region.short().to_string());
                    slice.push(row.position as i64 + 1);
                    gene.push(g.sheet_name().to_string());
                    cell.push(Some(i as f64 + 1.0));
                    value.push(Some(g.value(c)));
                    note.push(String::new());
                }
            }
            for c in cells {
                pooled.her1.push(c.her1);
                pooled.her7.push(c.her7);
                pooled.her.push(c.her1 + c.her7);
            }
        }
    }

    frame(vec![
        str_col("Region", region),
        int_col("Slice #", slice),
        str_col("Gene", gene),
        opt_col("Cell", cell),
        opt_col("Value", value),
        str_col("Note", note),
    ])
}

pub fn raw_expression_workbook(embryos: &[EmbryoSlices]) -> Result<(Workbook, PooledExpression)> {
    let mut wb = Workbook::new(RAW_EXPRESSION_WORKBOOK);
    let mut pooled = PooledExpression::default();
    for (i, embryo) in embryos.iter().enumerate() {
        wb.add_sheet(&(i + 1).to_string(), embryo_sheet(embryo, &mut pooled)?);
    }
    Ok((wb, pooled))
}

fn plot_histograms(pooled: &PooledExpression, config: &Config, out_dir: &Path) -> Result<()> {
    let bins = config.histogram_bins;
    let panels = [
        (Gene::Her1, &pooled.her1, ORANGE),
        (Gene::Her7, &pooled.her7, LIGHT_BLUE),
        (Gene::Her, &pooled.her, ORANGE),
    ];
    let size = (config.figure.width, config.figure.height * 3 / 2);
    save_figure(&out_dir.join("combinetotalherhist.png"), size, (3, 1), |areas| {
        for (area, (gene, values, colour)) in areas.iter().zip(panels) {
            let title = if gene == Gene::Her { "Total her".to_string() } else { gene.label().to_string() };
            let axes = Axes::new(&title, "mRNA expression level", "Frequency");
            draw_histogram(area, &axes, &histogram(values, bins), colour)?;
        }
        Ok(())
    })
}

pub fn run(embryos: &[EmbryoSlices], config: &Config, out_dir: &Path) -> Result<()> {
    info!("Writing raw expression of {} embryos", embryos.len());
    let (mut wb, pooled) = raw_expression_workbook(embryos)?;
    wb.save(out_dir)?;
    plot_histograms(&pooled, config, out_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper_functions::{f64_column, string_column};
    use crate::models::{Cell, Region, RegionSlices, SliceRow};
    use std::path::PathBuf;

    #[test]
    fn invalid_slices_are_marked() {
        let embryo = EmbryoSlices {
            source: PathBuf::new(),
            regions: vec![RegionSlices {
                region: Region::Right,
                rows: vec![
                    SliceRow {
                        position: 0,
                        cells: Some(vec![Cell::new(-2.0, 5.0), Cell::new(3.0, 4.0)]),
                    },
                    SliceRow { position: 1, cells: None },
                ],
            }],
        };
        let (wb, pooled) = raw_expression_workbook(&[embryo]).unwrap();
        let df = wb.sheet("1").unwrap();
        // 2 cells x 2 reporters + 2 marker rows
        assert_eq!(df.height(), 6);
        let notes = string_column(df, "Note").unwrap();
        assert_eq!(notes[4].as_deref(), Some(TOO_FEW_CELLS));
        let values = f64_column(df, "Value").unwrap();
        // background subtraction may leave negative counts; they are kept as is
        assert_eq!(values[0], Some(-2.0));
        assert_eq!(values[2], Some(5.0));
        assert_eq!(values[5], None);
        assert_eq!(pooled.her, vec![3.0, 7.0]);
        assert_eq!(string_column(df, "Region").unwrap()[0].as_deref(), Some("R"));
    }
}
