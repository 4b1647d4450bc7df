use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, DataType, Reader};
use tracing::{debug, info};

use crate::errors::{NoiseError, Result};
use crate::helper_functions::require_file;
use crate::models::{Cell, Dataset, EmbryoSlices, Region, RegionSlices, SliceRow};

/// Column of the first cell's her1 count; her7 follows, then the next cell.
const FIRST_CELL_COLUMN: usize = 8;

/// An embryo's `slices.xls` workbook, one worksheet per region.
pub struct SlicesDataset {
    pub path: PathBuf,
}

impl SlicesDataset {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        SlicesDataset {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl Dataset for SlicesDataset {
    type Output = EmbryoSlices;

    fn load(&self) -> Result<EmbryoSlices> {
        require_file(&self.path)?;
        let mut wb = open_workbook_auto(&self.path).map_err(|e| NoiseError::Workbook {
            source: e,
            path: self.path.clone(),
        })?;

        let sheet_count = wb.sheet_names().len();
        let mut regions = Vec::with_capacity(sheet_count);
        for idx in 0..sheet_count {
            let range = wb
                .worksheet_range_at(idx)
                .ok_or_else(|| NoiseError::MissingSheet {
                    path: self.path.clone(),
                    sheet: idx.to_string(),
                })?
                .map_err(|e| NoiseError::Workbook {
                    source: e,
                    path: self.path.clone(),
                })?;
            let region = Region::from_sheet_index(idx);
            let rows = parse_region_rows(range.rows().skip(1)).map_err(|e| {
                NoiseError::InvalidInput(format!("{} ({}): {}", self.path.display(), region.name(), e))
            })?;
            debug!(
                "{}: {} slices, {} valid",
                region.name(),
                rows.len(),
                rows.iter().filter(|r| r.is_valid()).count()
            );
            regions.push(RegionSlices { region, rows });
        }

        info!("Loaded {} regions from {}", regions.len(), self.path.display());
        Ok(EmbryoSlices {
            source: self.path.clone(),
            regions,
        })
    }
}

/// Loads every slice workbook, checking that all exist before reading any.
pub fn load_embryos(paths: &[PathBuf]) -> Result<Vec<EmbryoSlices>> {
    for p in paths {
        require_file(p)?;
    }
    paths.iter().map(|p| SlicesDataset::new(p).load()).collect()
}

pub fn numeric(cell: &DataType) -> Option<f64> {
    match cell {
        DataType::Float(f) => Some(*f),
        DataType::Int(i) => Some(*i as f64),
        _ => None,
    }
}

/// Parses data rows (header already skipped) into slices.
pub fn parse_region_rows<'a, I>(rows: I) -> std::result::Result<Vec<SliceRow>, String>
where
    I: Iterator<Item = &'a [DataType]>,
{
    let mut slices = Vec::new();
    for (position, row) in rows.enumerate() {
        let cell_count = row.get(1).and_then(numeric);
        let cells = match cell_count {
            Some(n) if n >= 0.0 => {
                let n = n as usize;
                let mut cells = Vec::with_capacity(n);
                for l in 0..n {
                    let her1 = row.get(FIRST_CELL_COLUMN + 2 * l).and_then(numeric);
                    let her7 = row.get(FIRST_CELL_COLUMN + 2 * l + 1).and_then(numeric);
                    match (her1, her7) {
                        (Some(a), Some(b)) => cells.push(Cell::new(a, b)),
                        _ => {
                            return Err(format!(
                                "slice {} lists {} cells but cell {} is missing",
                                position + 1,
                                n,
                                l + 1
                            ))
                        }
                    }
                }
                Some(cells)
            }
            _ => None,
        };
        slices.push(SliceRow { position, cells });
    }
    Ok(slices)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(count: DataType, values: &[f64]) -> Vec<DataType> {
        let mut r = vec![DataType::Int(1), count];
        r.extend(std::iter::repeat(DataType::Empty).take(FIRST_CELL_COLUMN - 2));
        r.extend(values.iter().map(|v| DataType::Float(*v)));
        r
    }

    #[test]
    fn parses_valid_and_invalid_slices() {
        let rows = vec![
            row(DataType::Float(2.0), &[10.0, 20.0, 30.0, -4.0]),
            row(DataType::String("too few cells".into()), &[]),
            row(DataType::Int(1), &[5.0, 6.0, 99.0]),
        ];
        let slices = parse_region_rows(rows.iter().map(|r| r.as_slice())).unwrap();
        assert_eq!(slices.len(), 3);
        assert_eq!(
            slices[0].cells.as_deref(),
            Some(&[Cell::new(10.0, 20.0), Cell::new(30.0, -4.0)][..])
        );
        assert!(slices[1].cells.is_none());
        assert_eq!(slices[2].position, 2);
        assert_eq!(slices[2].cells.as_ref().map(|c| c.len()), Some(1));
    }

    #[test]
    fn truncated_row_is_rejected() {
        let rows = vec![row(DataType::Float(3.0), &[1.0, 2.0, 3.0, 4.0])];
        let err = parse_region_rows(rows.iter().map(|r| r.as_slice())).unwrap_err();
        assert!(err.contains("cell 3"));
    }

    #[test]
    fn missing_workbook_fails_before_reading() {
        let err = load_embryos(&[PathBuf::from("/no/such/slices.xls")]).unwrap_err();
        assert!(matches!(err, NoiseError::MissingFile(_)));
    }
}
