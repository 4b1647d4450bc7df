use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, DataType, Reader, Sheets};
use tracing::info;

use crate::data_handling::slices::numeric;
use crate::errors::{NoiseError, Result};
use crate::helper_functions::require_file;
use crate::models::{Dataset, Region};

/// Data rows of both workbooks start after a four-row preamble.
const FIRST_DATA_ROW: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct PositionedCell {
    pub x: f64,
    pub y: f64,
    pub her1: f64,
    pub her7: f64,
}

/// x positions of one slice boundary at the bottom and top of the region.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceEdge {
    pub bottom_left: f64,
    pub bottom_right: f64,
    pub top_left: f64,
    pub top_right: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionCells {
    pub region: Region,
    pub top_y: f64,
    pub bottom_y: f64,
    pub edges: Vec<SliceEdge>,
    pub cells: Vec<PositionedCell>,
}

/// `cells.xls` together with its `SliceInfo.xls`.
pub struct CellsDataset {
    pub cells_path: PathBuf,
    pub slice_info_path: PathBuf,
}

impl CellsDataset {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(cells: P, slice_info: Q) -> Self {
        CellsDataset {
            cells_path: cells.as_ref().to_path_buf(),
            slice_info_path: slice_info.as_ref().to_path_buf(),
        }
    }
}

fn open(path: &Path) -> Result<Sheets<std::io::BufReader<std::fs::File>>> {
    require_file(path)?;
    open_workbook_auto(path).map_err(|e| NoiseError::Workbook {
        source: e,
        path: path.to_path_buf(),
    })
}

impl Dataset for CellsDataset {
    type Output = Vec<RegionCells>;

    fn load(&self) -> Result<Vec<RegionCells>> {
        let mut cells_wb = open(&self.cells_path)?;
        let mut info_wb = open(&self.slice_info_path)?;

        let mut regions = Vec::new();
        for idx in 0..cells_wb.sheet_names().len() {
            let region = Region::from_sheet_index(idx);
            let sheet = format!("Slice {}", region.short());
            let info = info_wb
                .worksheet_range(&sheet)
                .ok_or_else(|| NoiseError::MissingSheet {
                    path: self.slice_info_path.clone(),
                    sheet: sheet.clone(),
                })?
                .map_err(|e| NoiseError::Workbook {
                    source: e,
                    path: self.slice_info_path.clone(),
                })?;
            let cells = cells_wb
                .worksheet_range_at(idx)
                .ok_or_else(|| NoiseError::MissingSheet {
                    path: self.cells_path.clone(),
                    sheet: idx.to_string(),
                })?
                .map_err(|e| NoiseError::Workbook {
                    source: e,
                    path: self.cells_path.clone(),
                })?;

            let info_rows: Vec<&[DataType]> = info.rows().collect();
            let cell_rows: Vec<&[DataType]> = cells.rows().collect();
            regions.push(parse_region(region, &info_rows, &cell_rows)?);
        }
        info!(
            "Read {} regions of cells from {}",
            regions.len(),
            self.cells_path.display()
        );
        Ok(regions)
    }
}

fn value(row: &[DataType], col: usize, what: &str) -> Result<f64> {
    row.get(col)
        .and_then(numeric)
        .ok_or_else(|| NoiseError::InvalidInput(format!("{} (column {}) is not a number", what, col + 1)))
}

pub fn parse_region(
    region: Region,
    info_rows: &[&[DataType]],
    cell_rows: &[&[DataType]],
) -> Result<RegionCells> {
    let bounds = info_rows.get(1).ok_or_else(|| {
        NoiseError::InvalidInput(format!("slice info of region {} has no bounds row", region.short()))
    })?;
    let top_y = value(bounds, 1, "top y")?;
    let bottom_y = value(bounds, 2, "bottom y")?;

    let edges = info_rows
        .iter()
        .skip(FIRST_DATA_ROW)
        .map(|row| {
            Ok(SliceEdge {
                bottom_left: value(row, 1, "bottom-left x")?,
                bottom_right: value(row, 2, "bottom-right x")?,
                top_left: value(row, 3, "top-left x")?,
                top_right: value(row, 4, "top-right x")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let cells = cell_rows
        .iter()
        .skip(FIRST_DATA_ROW)
        .map(|row| {
            Ok(PositionedCell {
                x: value(row, 0, "cell x")?,
                y: value(row, 1, "cell y")?,
                her1: value(row, 2, "her1")?,
                her7: value(row, 3, "her7")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(RegionCells {
        region,
        top_y,
        bottom_y,
        edges,
        cells,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nums(values: &[f64]) -> Vec<DataType> {
        values.iter().map(|v| DataType::Float(*v)).collect()
    }

    #[test]
    fn parses_bounds_edges_and_cells() {
        let header = vec![DataType::String("h".into())];
        let info = vec![
            header.clone(),
            nums(&[0.0, 400.0, 100.0]),
            header.clone(),
            header.clone(),
            nums(&[0.0, 10.0, 20.0, 12.0, 22.0]),
            nums(&[1.0, 20.0, 30.0, 22.0, 32.0]),
        ];
        let cells = vec![
            header.clone(),
            header.clone(),
            header.clone(),
            header.clone(),
            nums(&[15.0, 150.0, 40.0, 35.0]),
        ];
        let info_rows: Vec<&[DataType]> = info.iter().map(|r| r.as_slice()).collect();
        let cell_rows: Vec<&[DataType]> = cells.iter().map(|r| r.as_slice()).collect();

        let region = parse_region(Region::Left, &info_rows, &cell_rows).unwrap();
        assert_eq!(region.top_y, 400.0);
        assert_eq!(region.bottom_y, 100.0);
        assert_eq!(region.edges.len(), 2);
        assert_eq!(region.edges[1].top_right, 32.0);
        assert_eq!(
            region.cells,
            vec![PositionedCell { x: 15.0, y: 150.0, her1: 40.0, her7: 35.0 }]
        );
    }

    #[test]
    fn missing_bounds_row_is_an_error() {
        let info: Vec<&[DataType]> = Vec::new();
        assert!(parse_region(Region::Right, &info, &[]).is_err());
    }
}
