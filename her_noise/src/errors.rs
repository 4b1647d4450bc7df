use std::io;
use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NoiseError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Failed to read workbook {path}: {source}")]
    Workbook {
        source: calamine::Error,
        path: PathBuf,
    },

    #[error("Workbook {path} has no sheet {sheet}")]
    MissingSheet { path: PathBuf, sheet: String },

    #[error("File {0} does not exist")]
    MissingFile(PathBuf),

    #[error("Invalid input data: {0}")]
    InvalidInput(String),

    #[error("Plotting error: {0}")]
    Plot(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration from {path}: {source}")]
    ConfigLoad {
        source: toml::de::Error,
        path: PathBuf,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("External command failed: {0}")]
    Command(String),
}

pub type Result<T> = std::result::Result<T, NoiseError>;

/// Plotters errors are generic over the backend, so they are flattened to text.
pub fn plot_err<E: std::fmt::Display>(e: E) -> NoiseError {
    NoiseError::Plot(e.to_string())
}
