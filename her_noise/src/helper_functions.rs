use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::*;

use crate::errors::{NoiseError, Result};

/// Resolves relative paths against `$PROJECT_ROOT`, or the working directory when it is unset.
pub fn resolve_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let base = env::var_os("PROJECT_ROOT")
        .map(PathBuf::from)
        .or_else(|| env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    base.join(path)
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

pub fn require_file(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(NoiseError::MissingFile(path.to_path_buf()))
    }
}

pub fn read_csv(file_path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .try_into_reader_with_file_path(Some(file_path.to_path_buf()))?
        .finish()?;
    Ok(df)
}

// ─── Column builders ────────────────────────────────────────────────────────

/// Float column where NaN becomes a blank cell.
pub fn num_col(name: &str, values: &[f64]) -> Column {
    let values: Vec<Option<f64>> = values
        .iter()
        .map(|v| if v.is_nan() { None } else { Some(*v) })
        .collect();
    Series::new(PlSmallStr::from(name), values).into()
}

pub fn opt_col(name: &str, values: Vec<Option<f64>>) -> Column {
    let values: Vec<Option<f64>> = values
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect();
    Series::new(PlSmallStr::from(name), values).into()
}

pub fn int_col(name: &str, values: Vec<i64>) -> Column {
    Series::new(PlSmallStr::from(name), values).into()
}

pub fn str_col(name: &str, values: Vec<String>) -> Column {
    Series::new(PlSmallStr::from(name), values).into()
}

pub fn frame(columns: Vec<Column>) -> Result<DataFrame> {
    Ok(DataFrame::new(columns)?)
}

// ─── Column readers ─────────────────────────────────────────────────────────

/// Reads any numeric (or blank) column as optional floats.
pub fn f64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let col = df.column(name)?.cast(&DataType::Float64)?;
    let values = col.f64()?.into_iter().collect();
    Ok(values)
}

/// Like [`f64_column`] but blanks read as NaN.
pub fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    Ok(f64_column(df, name)?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

pub fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let col = df.column(name)?.cast(&DataType::String)?;
    let values = col
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect();
    Ok(values)
}
