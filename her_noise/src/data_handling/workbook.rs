use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::errors::{NoiseError, Result};
use crate::helper_functions::{ensure_dir, read_csv, require_file};

/// Lists the sheet names of a saved workbook in the order they were added.
const SHEET_ORDER_FILE: &str = "sheets.json";

/// Named tables written as `<dir>/<name>/<sheet>.csv`.
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub name: String,
    sheets: Vec<(String, DataFrame)>,
}

impl Workbook {
    pub fn new(name: &str) -> Self {
        Workbook {
            name: name.to_string(),
            sheets: Vec::new(),
        }
    }

    /// Adds a sheet, replacing any sheet of the same name.
    pub fn add_sheet(&mut self, sheet: &str, df: DataFrame) {
        match self.sheets.iter_mut().find(|(n, _)| n == sheet) {
            Some(entry) => entry.1 = df,
            None => self.sheets.push((sheet.to_string(), df)),
        }
    }

    pub fn sheet(&self, sheet: &str) -> Result<&DataFrame> {
        self.sheets
            .iter()
            .find(|(n, _)| n == sheet)
            .map(|(_, df)| df)
            .ok_or_else(|| NoiseError::MissingSheet {
                path: PathBuf::from(&self.name),
                sheet: sheet.to_string(),
            })
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn location(dir: &Path, name: &str) -> PathBuf {
        dir.join(name)
    }

    pub fn exists(dir: &Path, name: &str) -> bool {
        Workbook::location(dir, name).is_dir()
    }

    /// Writes every sheet and the sheet order, each through a temporary file renamed into place.
    pub fn save(&mut self, dir: &Path) -> Result<PathBuf> {
        let target = Workbook::location(dir, &self.name);
        ensure_dir(&target)?;
        for (sheet, df) in self.sheets.iter_mut() {
            let path = target.join(format!("{}.csv", sheet));
            let mut tmp = NamedTempFile::new_in(&target)?;
            CsvWriter::new(tmp.as_file_mut())
                .include_header(true)
                .finish(df)?;
            tmp.persist(&path).map_err(|e| e.error)?;
            debug!("Wrote sheet {} ({} rows)", path.display(), df.height());
        }
        let mut tmp = NamedTempFile::new_in(&target)?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), &self.sheet_names())?;
        tmp.persist(target.join(SHEET_ORDER_FILE)).map_err(|e| e.error)?;
        info!("Saved workbook {}", target.display());
        Ok(target)
    }

    /// Sheet names in saved order, or the folder's CSV files by name when no order was written.
    fn saved_sheet_names(target: &Path) -> Result<Vec<String>> {
        let order = target.join(SHEET_ORDER_FILE);
        if order.is_file() {
            return Ok(serde_json::from_reader(fs::File::open(&order)?)?);
        }
        let mut names = fs::read_dir(target)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().map_or(false, |ext| ext == "csv"))
            .map(|p| {
                p.file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| NoiseError::InvalidInput(format!("bad sheet name {:?}", p)))
            })
            .collect::<Result<Vec<String>>>()?;
        names.sort();
        Ok(names)
    }

    pub fn load(dir: &Path, name: &str) -> Result<Workbook> {
        let target = Workbook::location(dir, name);
        if !target.is_dir() {
            return Err(NoiseError::MissingFile(target));
        }
        let mut workbook = Workbook::new(name);
        for sheet in Workbook::saved_sheet_names(&target)? {
            let path = target.join(format!("{}.csv", sheet));
            require_file(&path)?;
            workbook.add_sheet(&sheet, read_csv(&path)?);
        }
        debug!("Loaded workbook {} with sheets {:?}", target.display(), workbook.sheet_names());
        Ok(workbook)
    }
}
