use std::fmt;
use std::path::PathBuf;

use crate::errors::Result;

/// Inputs that can be read into the crate's in-memory representation.
pub trait Dataset {
    type Output;

    fn load(&self) -> Result<Self::Output>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gene {
    Her1,
    Her7,
    /// her1 + her7 per cell.
    Her,
}

impl Gene {
    pub const ALL: [Gene; 3] = [Gene::Her1, Gene::Her7, Gene::Her];
    pub const REPORTERS: [Gene; 2] = [Gene::Her1, Gene::Her7];

    pub fn sheet_name(&self) -> &'static str {
        match self {
            Gene::Her1 => "Her1",
            Gene::Her7 => "Her7",
            Gene::Her => "Her",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Gene::Her1 => "her1",
            Gene::Her7 => "her7",
            Gene::Her => "her",
        }
    }

    pub fn value(&self, cell: &Cell) -> f64 {
        match self {
            Gene::Her1 => cell.her1,
            Gene::Her7 => cell.her7,
            Gene::Her => cell.her1 + cell.her7,
        }
    }
}

impl fmt::Display for Gene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Left,
    Right,
}

impl Region {
    /// Worksheet 0 holds the left region, every later sheet the right one.
    pub fn from_sheet_index(idx: usize) -> Region {
        if idx == 0 {
            Region::Left
        } else {
            Region::Right
        }
    }

    pub fn short(&self) -> &'static str {
        match self {
            Region::Left => "L",
            Region::Right => "R",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Region::Left => "left",
            Region::Right => "right",
        }
    }
}

/// Background-subtracted transcript counts of one segmented cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub her1: f64,
    pub her7: f64,
}

impl Cell {
    pub fn new(her1: f64, her7: f64) -> Self {
        Cell { her1, her7 }
    }

    pub fn clamped(&self) -> Cell {
        Cell {
            her1: self.her1.max(0.0),
            her7: self.her7.max(0.0),
        }
    }
}

/// One spatial slice of a region. `cells` is `None` when segmentation found too few cells.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceRow {
    pub position: usize,
    pub cells: Option<Vec<Cell>>,
}

impl SliceRow {
    pub fn is_valid(&self) -> bool {
        self.cells.is_some()
    }

    /// Cells where both reporters are strictly positive.
    pub fn positive_cells(&self) -> Vec<Cell> {
        self.cells
            .iter()
            .flatten()
            .filter(|c| c.her1 > 0.0 && c.her7 > 0.0)
            .copied()
            .collect()
    }

    /// All cells with negative counts raised to zero.
    pub fn clamped_cells(&self) -> Option<Vec<Cell>> {
        self.cells
            .as_ref()
            .map(|cells| cells.iter().map(Cell::clamped).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionSlices {
    pub region: Region,
    pub rows: Vec<SliceRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbryoSlices {
    pub source: PathBuf,
    pub regions: Vec<RegionSlices>,
}

/// A genetic background in a comparison: an output folder of `combine` plus display settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Background {
    pub folder: PathBuf,
    pub name: String,
    pub colour: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_cells_drop_zero_and_negative_pairs() {
        let row = SliceRow {
            position: 0,
            cells: Some(vec![
                Cell::new(4.0, 2.0),
                Cell::new(0.0, 3.0),
                Cell::new(5.0, -1.0),
                Cell::new(1.0, 1.0),
            ]),
        };
        assert_eq!(
            row.positive_cells(),
            vec![Cell::new(4.0, 2.0), Cell::new(1.0, 1.0)]
        );
        let clamped = row.clamped_cells().unwrap();
        assert_eq!(clamped[2], Cell::new(5.0, 0.0));
        assert_eq!(clamped.len(), 4);
    }

    #[test]
    fn invalid_slice_has_no_cells() {
        let row = SliceRow {
            position: 3,
            cells: None,
        };
        assert!(!row.is_valid());
        assert!(row.positive_cells().is_empty());
        assert!(row.clamped_cells().is_none());
    }
}
