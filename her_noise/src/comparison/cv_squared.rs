use std::path::Path;

use polars::prelude::*;
use tracing::info;

use crate::analysis::cv_squared::CV_SQUARED_WORKBOOK;
use crate::comparison::{load_all, Loaded};
use crate::config::Config;
use crate::data_handling::workbook::Workbook;
use crate::errors::Result;
use crate::helper_functions::{f64_column, f64_values, frame, int_col, num_col, opt_col, str_col};
use crate::models::{Background, Gene};
use crate::plotting::{draw_chart, save_figure, Axes, ErrorPoint, PlotSeries};

pub const COMPARE_CV_WORKBOOK: &str = "compare_CVsquared";

/// Per position CV² and standard error of one gene in one background.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CvTrack {
    pub cv2: Vec<Option<f64>>,
    pub se: Vec<Option<f64>>,
}

impl CvTrack {
    pub fn read(sheet: &DataFrame) -> Result<Self> {
        Ok(CvTrack {
            cv2: f64_column(sheet, "CV2")?,
            se: f64_column(sheet, "Std error")?,
        })
    }

    pub fn points(&self) -> Vec<ErrorPoint> {
        self.cv2
            .iter()
            .zip(&self.se)
            .enumerate()
            .filter_map(|(i, (v, se))| v.map(|v| ErrorPoint::new(i as f64, v).y_err(2.0 * se.unwrap_or(0.0))))
            .collect()
    }
}

pub fn plot_data_sheet_name(gene: Gene) -> String {
    format!("{}_plot_data", gene.sheet_name())
}

/// Position column followed by `<name>_cv2` and `<name>_ste_cv2` of every background.
pub fn plot_data_sheet(names: &[String], tracks: &[CvTrack]) -> Result<DataFrame> {
    let n = tracks.iter().map(|t| t.cv2.len()).max().unwrap_or(0);
    let padded = |v: &[Option<f64>]| -> Vec<Option<f64>> { (0..n).map(|i| v.get(i).copied().flatten()).collect() };
    let mut columns = vec![int_col("Cell position", (0..n as i64).collect())];
    for (name, t) in names.iter().zip(tracks) {
        columns.push(opt_col(&format!("{}_cv2", name), padded(&t.cv2)));
        columns.push(opt_col(&format!("{}_ste_cv2", name), padded(&t.se)));
    }
    frame(columns)
}

/// Reads back the tracks of `names` from a [`plot_data_sheet`].
pub fn read_plot_data(sheet: &DataFrame, names: &[String]) -> Result<Vec<CvTrack>> {
    names
        .iter()
        .map(|name| {
            Ok(CvTrack {
                cv2: f64_column(sheet, &format!("{}_cv2", name))?,
                se: f64_column(sheet, &format!("{}_ste_cv2", name))?,
            })
        })
        .collect()
}

/// Long table of slice CV² labelled posterior (region 1) or anterior.
pub fn spss_sheet(loaded: &[Loaded], gene: Gene) -> Result<DataFrame> {
    let mut background = Vec::new();
    let mut region = Vec::new();
    let mut cv2 = Vec::new();
    for l in loaded {
        let sheet = l.workbook.sheet(&format!("spss_ANOVA_{}", gene.label()))?;
        let regions = f64_column(sheet, "Region")?;
        let values = f64_values(sheet, "CV2")?;
        for (r, v) in regions.iter().zip(values) {
            background.push(l.name.clone());
            region.push(if *r == Some(1.0) { "posterior" } else { "anterior" }.to_string());
            cv2.push(v);
        }
    }
    frame(vec![
        str_col("Genetic background", background),
        str_col("Region", region),
        num_col("CV2", &cv2),
    ])
}

pub fn gene_tracks(loaded: &[Loaded], gene: Gene) -> Result<Vec<CvTrack>> {
    loaded
        .iter()
        .map(|l| CvTrack::read(l.workbook.sheet(gene.sheet_name())?))
        .collect()
}

fn series(loaded: &[Loaded], tracks: &[CvTrack]) -> Vec<PlotSeries> {
    loaded
        .iter()
        .zip(tracks)
        .map(|(l, t)| PlotSeries::new(l.colour, t.points()).label(&l.name).size(4))
        .collect()
}

pub fn position_axes(gene: Gene) -> Axes {
    Axes::new("", "Cell position (posterior - anterior)", &format!("CV² ({})", gene.label()))
}

pub fn run(backgrounds: &[Background], config: &Config, out_dir: &Path) -> Result<()> {
    info!("Comparing positional CV² of {} backgrounds", backgrounds.len());
    let loaded = load_all(backgrounds, CV_SQUARED_WORKBOOK)?;
    let names: Vec<String> = loaded.iter().map(|l| l.name.clone()).collect();

    let mut wb = Workbook::new(COMPARE_CV_WORKBOOK);
    let mut all_tracks = Vec::new();
    for gene in Gene::ALL {
        let tracks = gene_tracks(&loaded, gene)?;
        wb.add_sheet(&plot_data_sheet_name(gene), plot_data_sheet(&names, &tracks)?);
        wb.add_sheet(&format!("{}_spss", gene.sheet_name()), spss_sheet(&loaded, gene)?);
        all_tracks.push((gene, tracks));
    }
    wb.save(out_dir)?;

    let size = (config.figure.width, config.figure.height * 2);
    save_figure(&out_dir.join("compare_CVsquared.png"), size, (3, 1), |panels| {
        for (panel, (gene, tracks)) in panels.iter().zip(&all_tracks) {
            draw_chart(panel, &position_axes(*gene), &series(&loaded, tracks))?;
        }
        Ok(())
    })?;

    if let Some((gene, tracks)) = all_tracks.iter().find(|(g, _)| *g == Gene::Her) {
        let size = (config.figure.width, config.figure.height);
        save_figure(&out_dir.join("compare_CVsquared_her.png"), size, (1, 1), |p| {
            draw_chart(&p[0], &position_axes(*gene), &series(&loaded, tracks))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::fixtures::{background, save};

    #[test]
    fn plot_data_pads_shorter_backgrounds() {
        let tracks = vec![
            CvTrack { cv2: vec![Some(0.2), Some(0.3)], se: vec![Some(0.01), Some(0.02)] },
            CvTrack { cv2: vec![Some(0.5)], se: vec![None] },
        ];
        let names = vec!["wt".to_string(), "deltac".to_string()];
        let df = plot_data_sheet(&names, &tracks).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(f64_column(&df, "deltac_cv2").unwrap(), vec![Some(0.5), None]);

        let back = read_plot_data(&df, &names).unwrap();
        assert_eq!(back[0], tracks[0]);
        assert_eq!(back[1].points()[0].y_err, (0.0, 0.0));
    }

    #[test]
    fn spss_regions_are_named() {
        let dir = tempfile::tempdir().unwrap();
        let b = background(dir.path(), "wt", "g");
        save(&b, CV_SQUARED_WORKBOOK, vec![(
            "spss_ANOVA_her1",
            df!("Region" => [1i64, 1, 2], "CV2" => [0.1, 0.2, 0.3]).unwrap(),
        )]);
        let loaded = load_all(&[b], CV_SQUARED_WORKBOOK).unwrap();
        let df = spss_sheet(&loaded, Gene::Her1).unwrap();
        let regions = crate::helper_functions::string_column(&df, "Region").unwrap();
        assert_eq!(regions[1].as_deref(), Some("posterior"));
        assert_eq!(regions[2].as_deref(), Some("anterior"));
        assert!(spss_sheet(&loaded, Gene::Her7).is_err());
    }
}
