use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{NoiseError, Result};

/// Analysis constants. Every field has a default so a partial TOML file is enough.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Upper edges of the fixed mRNA-count bins used by the noise stage.
    #[serde(default = "default_bin_edges")]
    pub bin_edges: Vec<f64>,

    /// Slices with fewer positive her1/her7 pairs carry no noise estimate.
    #[serde(default = "default_min_cells")]
    pub min_cells: usize,

    #[serde(default = "default_slices_per_section")]
    pub slices_per_section: usize,

    /// Share of the pooled slice means taken as top and bottom tails.
    #[serde(default = "default_amplitude_percent")]
    pub amplitude_percent: f64,

    /// Quantile of the per-region row counts used as the number of positions.
    #[serde(default = "default_representative_fraction")]
    pub representative_fraction: f64,

    #[serde(default = "default_fano_bins")]
    pub fano_bins: usize,

    #[serde(default = "default_heatmap_interval")]
    pub heatmap_interval: f64,

    #[serde(default = "default_heatmap_max")]
    pub heatmap_max: f64,

    #[serde(default = "default_histogram_bins")]
    pub histogram_bins: usize,

    /// Fraction of the expression range below which heatmap cells are greyed out.
    #[serde(default = "default_expression_threshold")]
    pub expression_threshold: f64,

    /// Sizes of the consecutive background groups of `normalize`; each group is
    /// normalised to its first background.
    #[serde(default = "default_normalize_groups")]
    pub normalize_groups: Vec<usize>,

    #[serde(default)]
    pub smoothing: SmoothingConfig,

    #[serde(default)]
    pub figure: FigureConfig,

    #[serde(default)]
    pub batch: BatchConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SmoothingConfig {
    #[serde(default = "default_sigma")]
    pub sigma: f64,
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_truncate")]
    pub truncate: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FigureConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BatchConfig {
    #[serde(default = "default_angle")]
    pub angle: f64,
    #[serde(default = "default_delta_angle")]
    pub delta_angle: f64,
    /// Input images are named `<prefix><n>.xlsx`, n starting at 1.
    #[serde(default = "default_input_prefix")]
    pub input_prefix: String,
    #[serde(default = "default_sample_info")]
    pub sample_info: String,
    /// Segmentation executable; the segmentation step is skipped when unset.
    #[serde(default)]
    pub segmentation_command: Option<String>,
    #[serde(default = "default_segmentation_args")]
    pub segmentation_args: Vec<String>,
}

fn default_bin_edges() -> Vec<f64> {
    vec![45.0, 80.0, 100.0, 125.0, 300.0]
}
fn default_min_cells() -> usize {
    3
}
fn default_slices_per_section() -> usize {
    5
}
fn default_amplitude_percent() -> f64 {
    0.1
}
fn default_representative_fraction() -> f64 {
    0.2
}
fn default_fano_bins() -> usize {
    5
}
fn default_heatmap_interval() -> f64 {
    15.0
}
fn default_heatmap_max() -> f64 {
    120.0
}
fn default_histogram_bins() -> usize {
    50
}
fn default_expression_threshold() -> f64 {
    0.3
}
fn default_normalize_groups() -> Vec<usize> {
    vec![3, 2]
}
fn default_sigma() -> f64 {
    10.0
}
fn default_window() -> usize {
    3
}
fn default_truncate() -> f64 {
    4.0
}
fn default_width() -> u32 {
    900
}
fn default_height() -> u32 {
    650
}
fn default_angle() -> f64 {
    41.381
}
fn default_delta_angle() -> f64 {
    0.0403
}
fn default_input_prefix() -> String {
    "embryo_".to_string()
}
fn default_sample_info() -> String {
    "SampleInfo.xlsx".to_string()
}
fn default_segmentation_args() -> Vec<String> {
    ["-n", "2", "-f", "0"].iter().map(|s| s.to_string()).collect()
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        SmoothingConfig {
            sigma: default_sigma(),
            window: default_window(),
            truncate: default_truncate(),
        }
    }
}

impl Default for FigureConfig {
    fn default() -> Self {
        FigureConfig {
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            angle: default_angle(),
            delta_angle: default_delta_angle(),
            input_prefix: default_input_prefix(),
            sample_info: default_sample_info(),
            segmentation_command: None,
            segmentation_args: default_segmentation_args(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bin_edges: default_bin_edges(),
            min_cells: default_min_cells(),
            slices_per_section: default_slices_per_section(),
            amplitude_percent: default_amplitude_percent(),
            representative_fraction: default_representative_fraction(),
            fano_bins: default_fano_bins(),
            heatmap_interval: default_heatmap_interval(),
            heatmap_max: default_heatmap_max(),
            histogram_bins: default_histogram_bins(),
            expression_threshold: default_expression_threshold(),
            normalize_groups: default_normalize_groups(),
            smoothing: SmoothingConfig::default(),
            figure: FigureConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content).map_err(|e| NoiseError::ConfigLoad {
            source: e,
            path: path.to_path_buf(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                info!("Loading configuration from {}", p.display());
                Config::from_file(p)
            }
            None => Ok(Config::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bin_edges.is_empty() {
            return Err(NoiseError::Config("bin_edges must not be empty".into()));
        }
        if self.bin_edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err(NoiseError::Config(
                "bin_edges must be strictly increasing".into(),
            ));
        }
        if self.slices_per_section == 0 || self.fano_bins == 0 || self.histogram_bins == 0 {
            return Err(NoiseError::Config(
                "section size, Fano bins and histogram bins must be positive".into(),
            ));
        }
        if !(0.0..=0.5).contains(&self.amplitude_percent) {
            return Err(NoiseError::Config(format!(
                "amplitude_percent {} outside [0, 0.5]",
                self.amplitude_percent
            )));
        }
        if self.heatmap_interval <= 0.0 || self.heatmap_max < self.heatmap_interval {
            return Err(NoiseError::Config(
                "heatmap_max must be at least one heatmap_interval".into(),
            ));
        }
        if self.normalize_groups.iter().any(|&g| g == 0) {
            return Err(NoiseError::Config("normalize_groups must not contain empty groups".into()));
        }
        Ok(())
    }

    /// Writes the effective configuration as `config.json` in `dir`.
    pub fn write_json(&self, dir: &Path) -> Result<PathBuf> {
        crate::helper_functions::ensure_dir(dir)?;
        let path = dir.join("config.json");
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}
