use std::path::Path;

use polars::prelude::*;
use tracing::info;

use crate::analysis::statistics::{decompose, NoiseDecomposition};
use crate::data_handling::workbook::Workbook;
use crate::errors::Result;
use crate::helper_functions::{frame, int_col, opt_col, str_col};
use crate::models::EmbryoSlices;

pub const RAW_NOISE_WORKBOOK: &str = "raw_noise";
pub const COMBINED_SHEET: &str = "Combined";

const HEADERS: [&str; 7] = [
    "Her1 mean",
    "Her7 mean",
    "Her mean",
    "Harmonic mean",
    "Intrinsic noise",
    "Extrinsic noise",
    "Total noise",
];

fn values(n: &NoiseDecomposition) -> [f64; 7] {
    [
        n.her1_mean,
        n.her7_mean,
        n.her_mean(),
        n.harmonic_mean(),
        n.intrinsic,
        n.extrinsic,
        n.total,
    ]
}

fn value_columns(rows: &[Option<NoiseDecomposition>]) -> Vec<Column> {
    HEADERS
        .iter()
        .enumerate()
        .map(|(k, name)| opt_col(name, rows.iter().map(|r| r.as_ref().map(|n| values(n)[k])).collect()))
        .collect()
}

/// Every slice of both regions; noise columns are blank where the slice has too few positive cells.
/// Valid decompositions are appended to `combined`.
pub fn embryo_sheet(embryo: &EmbryoSlices, min_cells: usize, combined: &mut Vec<NoiseDecomposition>) -> Result<DataFrame> {
    let mut region = Vec::new();
    let mut slice = Vec::new();
    let mut rows = Vec::new();
    for r in &embryo.regions {
        for row in &r.rows {
            let noise = if row.is_valid() {
                decompose(&row.positive_cells(), min_cells)
            } else {
                None
            };
            if let Some(n) = noise {
                combined.push(n);
            }
            region.push(r.region.name().to_string());
            slice.push(row.position as i64 + 1);
            rows.push(noise);
        }
    }
    let mut columns = vec![str_col("Region", region), int_col("Slice #", slice)];
    columns.extend(value_columns(&rows));
    frame(columns)
}

pub fn raw_noise_workbook(embryos: &[EmbryoSlices], min_cells: usize) -> Result<Workbook> {
    let mut wb = Workbook::new(RAW_NOISE_WORKBOOK);
    let mut combined = Vec::new();
    for (i, embryo) in embryos.iter().enumerate() {
        wb.add_sheet(&(i + 1).to_string(), embryo_sheet(embryo, min_cells, &mut combined)?);
    }
    let rows: Vec<Option<NoiseDecomposition>> = combined.into_iter().map(Some).collect();
    let mut columns = vec![int_col("Slice #", (1..=rows.len() as i64).collect())];
    columns.extend(value_columns(&rows));
    wb.add_sheet(COMBINED_SHEET, frame(columns)?);
    Ok(wb)
}

pub fn run(embryos: &[EmbryoSlices], min_cells: usize, out_dir: &Path) -> Result<()> {
    info!("Writing raw noise of {} embryos", embryos.len());
    raw_noise_workbook(embryos, min_cells)?.save(out_dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper_functions::f64_column;
    use crate::models::{Cell, Region, RegionSlices, SliceRow};
    use assert_approx_eq::assert_approx_eq;
    use std::path::PathBuf;

    #[test]
    fn combined_sheet_keeps_only_valid_slices() {
        let good = vec![Cell::new(2.0, 4.0), Cell::new(4.0, 8.0), Cell::new(6.0, 12.0)];
        let embryo = EmbryoSlices {
            source: PathBuf::new(),
            regions: vec![
                RegionSlices {
                    region: Region::Left,
                    rows: vec![
                        SliceRow { position: 0, cells: Some(good.clone()) },
                        SliceRow { position: 1, cells: None },
                    ],
                },
                RegionSlices {
                    region: Region::Right,
                    rows: vec![SliceRow {
                        position: 0,
                        cells: Some(vec![Cell::new(1.0, 1.0), Cell::new(-1.0, 1.0), Cell::new(1.0, 2.0)]),
                    }],
                },
            ],
        };
        let wb = raw_noise_workbook(&[embryo], 3).unwrap();
        let sheet = wb.sheet("1").unwrap();
        assert_eq!(sheet.height(), 3);
        assert_eq!(f64_column(sheet, "Total noise").unwrap()[1], None);
        // only two positive pairs on the right
        assert_eq!(f64_column(sheet, "Total noise").unwrap()[2], None);

        let combined = wb.sheet(COMBINED_SHEET).unwrap();
        assert_eq!(combined.height(), 1);
        // her7 = 2 * her1: no intrinsic noise
        let intrinsic = f64_column(combined, "Intrinsic noise").unwrap();
        assert_approx_eq!(intrinsic[0].unwrap(), 0.0);
        let harmonic = f64_column(combined, "Harmonic mean").unwrap();
        assert_approx_eq!(harmonic[0].unwrap(), 2.0 / (1.0 / 4.0 + 1.0 / 8.0));
    }
}
