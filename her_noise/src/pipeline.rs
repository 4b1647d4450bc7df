use std::path::{Path, PathBuf};
use std::process::Command;

use clap::ValueEnum;
use tracing::{debug, error, info};

use crate::analysis::{
    cv_squared, fano_factor, heatmap, noise, raw_expression, raw_noise, scatter, spatial_amplitude,
    spatial_expression,
};
use crate::comparison;
use crate::config::Config;
use crate::data_handling::cells::CellsDataset;
use crate::data_handling::sample_info::{SampleInfoDataset, SampleRecord};
use crate::data_handling::slices::{load_embryos, SlicesDataset};
use crate::errors::{NoiseError, Result};
use crate::helper_functions::{ensure_dir, require_file};
use crate::models::{Background, Dataset, EmbryoSlices};

pub const SLICES_FILE: &str = "slices.xls";
pub const CELLS_FILE: &str = "cells.xls";
pub const SLICE_INFO_FILE: &str = "SliceInfo.xls";

/// Stages of `combine`, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CombineStage {
    SpatialAmplitude,
    FanoFactor,
    Noise,
    Scatter,
    CvSquared,
    RawExpression,
    RawNoise,
}

impl CombineStage {
    pub const ALL: [CombineStage; 7] = [
        CombineStage::SpatialAmplitude,
        CombineStage::FanoFactor,
        CombineStage::Noise,
        CombineStage::Scatter,
        CombineStage::CvSquared,
        CombineStage::RawExpression,
        CombineStage::RawNoise,
    ];
}

/// Stages of `compare`, in the order they run. The fill-area plots read the CV² comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CompareStage {
    SpatialAmplitude,
    FanoFactor,
    Noise,
    NoiseBar,
    GroupedCvSquared,
    CvSquared,
    FillArea,
}

impl CompareStage {
    pub const ALL: [CompareStage; 7] = [
        CompareStage::SpatialAmplitude,
        CompareStage::FanoFactor,
        CompareStage::Noise,
        CompareStage::NoiseBar,
        CompareStage::GroupedCvSquared,
        CompareStage::CvSquared,
        CompareStage::FillArea,
    ];
}

fn selected<T: Copy + PartialEq>(all: &[T], only: &[T]) -> Vec<T> {
    all.iter().copied().filter(|s| only.is_empty() || only.contains(s)).collect()
}

/// Combines the slice workbooks of one genetic background into `out_dir`.
/// An empty `only` runs every stage.
pub fn combine(slice_files: &[PathBuf], num_bins: usize, out_dir: &Path, config: &Config, only: &[CombineStage]) -> Result<()> {
    if slice_files.is_empty() {
        return Err(NoiseError::InvalidInput("no slice workbooks given".into()));
    }
    if num_bins == 0 {
        return Err(NoiseError::InvalidInput("number of bins must be positive".into()));
    }
    let embryos = load_embryos(slice_files)?;
    combine_embryos(&embryos, num_bins, out_dir, config, only)
}

/// Runs the selected `combine` stages on embryos already in memory.
pub fn combine_embryos(
    embryos: &[EmbryoSlices],
    num_bins: usize,
    out_dir: &Path,
    config: &Config,
    only: &[CombineStage],
) -> Result<()> {
    ensure_dir(out_dir)?;
    info!("Combining {} embryos into {}", embryos.len(), out_dir.display());

    for stage in selected(&CombineStage::ALL, only) {
        debug!("Running combine stage {:?}", stage);
        match stage {
            CombineStage::SpatialAmplitude => spatial_amplitude::run(embryos, config, out_dir)?,
            CombineStage::FanoFactor => {
                let slices = noise::collect_slice_noise(embryos, config.min_cells);
                fano_factor::run(&slices, config, out_dir)?
            }
            CombineStage::Noise => noise::run(embryos, num_bins, config, out_dir)?,
            CombineStage::Scatter => scatter::run(config, out_dir)?,
            CombineStage::CvSquared => cv_squared::run(embryos, config, out_dir)?,
            CombineStage::RawExpression => raw_expression::run(embryos, config, out_dir)?,
            CombineStage::RawNoise => raw_noise::run(embryos, config.min_cells, out_dir)?,
        }
    }
    config.write_json(out_dir)?;
    info!("Combined analysis written to {}", out_dir.display());
    Ok(())
}

/// Compares the `combine` outputs of several genetic backgrounds. Every input is checked first.
pub fn compare(backgrounds: &[Background], out_dir: &Path, config: &Config, only: &[CompareStage]) -> Result<()> {
    comparison::check_inputs(backgrounds)?;
    ensure_dir(out_dir)?;
    info!("Comparing {} genetic backgrounds into {}", backgrounds.len(), out_dir.display());

    for stage in selected(&CompareStage::ALL, only) {
        debug!("Running compare stage {:?}", stage);
        match stage {
            CompareStage::SpatialAmplitude => comparison::spatial_amplitude::run(backgrounds, config, out_dir)?,
            CompareStage::FanoFactor => comparison::fano_factor::run(backgrounds, config, out_dir)?,
            CompareStage::Noise => comparison::noise::run(backgrounds, config, out_dir)?,
            CompareStage::NoiseBar => comparison::noise_bar::run(backgrounds, config, out_dir)?,
            CompareStage::GroupedCvSquared => comparison::grouped_cv_squared::run(backgrounds, config, out_dir)?,
            CompareStage::CvSquared => comparison::cv_squared::run(backgrounds, config, out_dir)?,
            CompareStage::FillArea => comparison::fill_area::run(backgrounds, config, out_dir)?,
        }
    }
    config.write_json(out_dir)?;
    Ok(())
}

pub fn normalize(backgrounds: &[Background], out_dir: &Path, config: &Config) -> Result<()> {
    comparison::check_inputs(backgrounds)?;
    ensure_dir(out_dir)?;
    comparison::normalized::run(backgrounds, config, out_dir)?;
    config.write_json(out_dir)?;
    Ok(())
}

/// Heatmaps and spatial expression of one embryo folder holding the segmentation outputs.
pub fn embryo(embryo_dir: &Path, config: &Config) -> Result<()> {
    info!("Analysing embryo {}", embryo_dir.display());
    let cells = CellsDataset::new(embryo_dir.join(CELLS_FILE), embryo_dir.join(SLICE_INFO_FILE)).load()?;
    heatmap::run(&cells, config, embryo_dir)?;
    let slices = SlicesDataset::new(embryo_dir.join(SLICES_FILE)).load()?;
    spatial_expression::run(&slices, config, embryo_dir)
}

/// Arguments of the segmentation command for one embryo image.
pub fn segmentation_args(config: &Config, input: &Path, embryo_dir: &Path, sample: &SampleRecord) -> Vec<String> {
    let mut args = vec![
        "-i".to_string(),
        input.display().to_string(),
        "-d".to_string(),
        embryo_dir.display().to_string(),
        "-a".to_string(),
        config.batch.angle.to_string(),
        "-dA".to_string(),
        config.batch.delta_angle.to_string(),
    ];
    args.extend(config.batch.segmentation_args.iter().cloned());
    args.extend([
        "-m1".to_string(),
        sample.her1_mean.to_string(),
        "-m7".to_string(),
        sample.her7_mean.to_string(),
    ]);
    args
}

fn run_segmentation(program: &Path, args: &[String]) -> Result<()> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    debug!("About to spawn: {:?}", cmd);
    let output = cmd.output()?;
    if !output.status.success() {
        error!("Segmentation failed. Stderr:\n{}", String::from_utf8_lossy(&output.stderr));
        return Err(NoiseError::Command(format!(
            "{} exited with status {}",
            program.display(),
            output.status
        )));
    }
    debug!("Segmentation output:\n{}", String::from_utf8_lossy(&output.stdout));
    Ok(())
}

/// Full batch of one genetic background: optional segmentation, per-embryo plots, then `combine`.
pub fn batch(input_dir: &Path, output_dir: &Path, num_bins: usize, config: &Config) -> Result<()> {
    let samples = SampleInfoDataset::new(input_dir.join(&config.batch.sample_info)).load()?;
    if samples.is_empty() {
        return Err(NoiseError::InvalidInput("sample sheet lists no embryos".into()));
    }
    let program = match &config.batch.segmentation_command {
        Some(cmd) => Some(
            which::which(cmd).map_err(|e| NoiseError::Command(format!("cannot find {}: {}", cmd, e)))?,
        ),
        None => None,
    };

    let mut slice_files = Vec::with_capacity(samples.len());
    for (i, sample) in samples.iter().enumerate() {
        let embryo_dir = output_dir.join(format!("embryo{}", i + 1));
        ensure_dir(&embryo_dir)?;
        debug!(
            "Embryo {}: angles {} / {}, somite means {} / {}",
            i + 1,
            sample.left_angle,
            sample.right_angle,
            sample.her1_mean,
            sample.her7_mean
        );
        if let Some(program) = &program {
            let input = input_dir.join(format!("{}{}.xlsx", config.batch.input_prefix, i + 1));
            require_file(&input)?;
            info!("Segmenting {}", input.display());
            run_segmentation(program, &segmentation_args(config, &input, &embryo_dir, sample))?;
        }
        embryo(&embryo_dir, config)?;
        slice_files.push(embryo_dir.join(SLICES_FILE));
    }

    combine(&slice_files, num_bins, output_dir, config, &[])?;
    info!("Batch of {} embryos done", samples.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::cv_squared::CV_SQUARED_WORKBOOK;
    use crate::analysis::noise::{COMBINED_SLICES_WORKBOOK, NOISE_WORKBOOK};
    use crate::analysis::spatial_expression::SPATIAL_EXPRESSION_WORKBOOK;
    use crate::comparison::cv_squared::COMPARE_CV_WORKBOOK;
    use crate::comparison::noise_bar::COMPARE_NOISE_BAR_WORKBOOK;
    use crate::comparison::normalized::NORMALIZED_NOISE_WORKBOOK;
    use crate::data_handling::workbook::Workbook;
    use crate::models::{Cell, Region, RegionSlices, SliceRow};

    const POSITIONS: usize = 20;
    const CELLS_PER_SLICE: usize = 8;

    /// Expression rises along the axis and with `shift`; one right-hand slice is left unsegmented.
    fn synthetic_embryo(shift: usize, embryo: usize) -> EmbryoSlices {
        let regions = [Region::Left, Region::Right]
            .into_iter()
            .enumerate()
            .map(|(r, region)| RegionSlices {
                region,
                rows: (0..POSITIONS)
                    .map(|p| SliceRow {
                        position: p,
                        cells: (r == 0 || p != 5 + embryo).then(|| {
                            (0..CELLS_PER_SLICE)
                                .map(|k| {
                                    Cell::new(
                                        (20 + 8 * p + 3 * k + 5 * embryo + 2 * r + 4 * shift) as f64,
                                        (15 + 6 * p + 2 * ((7 * k) % 5) + embryo + r + 3 * shift) as f64,
                                    )
                                })
                                .collect()
                        })
                    })
                    .collect(),
            })
            .collect();
        EmbryoSlices {
            source: PathBuf::from(format!("bg{}/embryo{}/slices.xls", shift, embryo + 1)),
            regions,
        }
    }

    #[test]
    fn empty_selection_runs_everything_in_order() {
        assert_eq!(selected(&CombineStage::ALL, &[]), CombineStage::ALL.to_vec());
        assert_eq!(
            selected(&CompareStage::ALL, &[CompareStage::FillArea, CompareStage::Noise]),
            vec![CompareStage::Noise, CompareStage::FillArea]
        );
    }

    #[test]
    fn segmentation_args_carry_sample_means() {
        let config = Config::default();
        let sample = SampleRecord {
            left_angle: 200.0,
            right_angle: -20.0,
            her1_mean: 12.5,
            her7_mean: 7.25,
            her1_variance: 1.0,
            her7_variance: 2.0,
        };
        let args = segmentation_args(&config, Path::new("in/embryo_1.xlsx"), Path::new("out/embryo1"), &sample);
        assert_eq!(&args[..4], &["-i", "in/embryo_1.xlsx", "-d", "out/embryo1"]);
        assert_eq!(args[5], "41.381");
        assert_eq!(&args[8..12], &["-n", "2", "-f", "0"]);
        assert_eq!(&args[12..], &["-m1", "12.5", "-m7", "7.25"]);
    }

    #[test]
    fn combine_rejects_missing_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        assert!(combine(&[], 5, dir.path(), &config, &[]).is_err());
        let missing = vec![dir.path().join("embryo1").join(SLICES_FILE)];
        assert!(matches!(
            combine(&missing, 5, dir.path(), &config, &[]),
            Err(NoiseError::MissingFile(_))
        ));
    }

    #[test]
    fn combined_outputs_feed_compare_and_normalize() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let colours = ["k", "red", "#1f77b4", "green", "orange"];
        let backgrounds: Vec<Background> = colours
            .iter()
            .enumerate()
            .map(|(b, colour)| {
                let folder = dir.path().join(format!("bg{}", b));
                let embryos: Vec<EmbryoSlices> = (0..3).map(|e| synthetic_embryo(b, e)).collect();
                combine_embryos(&embryos, 5, &folder, &config, &[]).unwrap();
                Background {
                    folder,
                    name: format!("bg{}", b),
                    colour: colour.to_string(),
                }
            })
            .collect();

        let first = &backgrounds[0].folder;
        for name in [NOISE_WORKBOOK, COMBINED_SLICES_WORKBOOK, CV_SQUARED_WORKBOOK] {
            assert!(Workbook::exists(first, name), "{} missing", name);
        }
        assert!(first.join("her1_her7_all.png").is_file());
        assert!(first.join("config.json").is_file());

        let compare_dir = dir.path().join("compare");
        compare(&backgrounds, &compare_dir, &config, &[]).unwrap();
        for png in ["compare_noise.png", "compare_CVsquared.png", "CVsquare_fillArea.png", "compare_raw_noise_bar.png"] {
            assert!(compare_dir.join(png).is_file(), "{} missing", png);
        }
        let cv = Workbook::load(&compare_dir, COMPARE_CV_WORKBOOK).unwrap();
        assert!(cv.sheet_names().contains(&"Her_plot_data"));
        let bars = Workbook::load(&compare_dir, COMPARE_NOISE_BAR_WORKBOOK).unwrap();
        assert_eq!(bars.sheet("spss").unwrap().height(), backgrounds.len() * 3 * (2 * POSITIONS - 1));

        let normalized_dir = dir.path().join("normalized");
        normalize(&backgrounds, &normalized_dir, &config).unwrap();
        assert!(normalized_dir.join("normalized_noise.png").is_file());
        assert!(normalized_dir.join("normalized_herAmp.png").is_file());
        assert!(Workbook::exists(&normalized_dir, NORMALIZED_NOISE_WORKBOOK));
    }

    #[test]
    fn embryo_plots_survive_an_unsegmented_region() {
        let dir = tempfile::tempdir().unwrap();
        let mut embryo = synthetic_embryo(0, 0);
        for row in &mut embryo.regions[1].rows {
            row.cells = None;
        }
        spatial_expression::run(&embryo, &Config::default(), dir.path()).unwrap();
        let wb = Workbook::load(dir.path(), SPATIAL_EXPRESSION_WORKBOOK).unwrap();
        assert_eq!(wb.sheet_names(), vec!["left", "right"]);
        assert!(dir.path().join("left_spatial_expression.png").is_file());
    }
}
