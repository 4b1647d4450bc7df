use std::path::Path;

use tracing::{info, warn};

use crate::analysis::noise::{NoiseAxis, NOISE_WORKBOOK};
use crate::comparison::cv_squared::{plot_data_sheet_name, position_axes, read_plot_data, CvTrack, COMPARE_CV_WORKBOOK};
use crate::comparison::noise::{log_points, NOISE_KINDS};
use crate::comparison::load_all;
use crate::config::Config;
use crate::data_handling::workbook::Workbook;
use crate::errors::Result;
use crate::models::{Background, Gene};
use crate::plotting::{draw_chart, parse_colour, save_figure, Axes, ErrorPoint, Marker, PlotSeries};

/// Line through the points with a band covering each point's error bar.
pub fn banded(points: &[ErrorPoint]) -> (Vec<ErrorPoint>, Vec<(f64, f64, f64)>) {
    let line = points.iter().map(|p| ErrorPoint::new(p.x, p.y)).collect();
    let band = points
        .iter()
        .map(|p| (p.x, p.y - p.y_err.0, p.y + p.y_err.1))
        .collect();
    (line, band)
}

/// CV² ± one standard error; the band is drawn only where it is well formed.
pub fn cv_band(track: &CvTrack) -> (Vec<ErrorPoint>, Vec<(f64, f64, f64)>) {
    let points: Vec<ErrorPoint> = track
        .cv2
        .iter()
        .zip(&track.se)
        .enumerate()
        .filter_map(|(i, (v, se))| {
            let se = se.filter(|s| *s >= 0.0)?;
            Some(ErrorPoint::new(i as f64, (*v)?).y_err(se))
        })
        .collect();
    banded(&points)
}

fn band_series(colour: plotters::style::RGBColor, name: &str, line: Vec<ErrorPoint>, band: Vec<(f64, f64, f64)>) -> PlotSeries {
    PlotSeries::new(colour, line).label(name).line().band(band).marker(Marker::None)
}

/// Draws `CVsquare_fillArea.png` from the plot data of a saved CV² comparison
/// and the her noise lines with error bands from each background's noise tables.
pub fn run(backgrounds: &[Background], config: &Config, out_dir: &Path) -> Result<()> {
    info!("Drawing filled-area comparisons of {} backgrounds", backgrounds.len());
    let names: Vec<String> = backgrounds.iter().map(|b| b.name.clone()).collect();
    let colours = backgrounds
        .iter()
        .map(|b| parse_colour(&b.colour))
        .collect::<Result<Vec<_>>>()?;

    if Workbook::exists(out_dir, COMPARE_CV_WORKBOOK) {
        let wb = Workbook::load(out_dir, COMPARE_CV_WORKBOOK)?;
        let mut panels = Vec::new();
        for gene in Gene::ALL {
            let tracks = read_plot_data(wb.sheet(&plot_data_sheet_name(gene))?, &names)?;
            let series: Vec<PlotSeries> = tracks
                .iter()
                .zip(names.iter().zip(&colours))
                .map(|(t, (name, colour))| {
                    let (line, band) = cv_band(t);
                    band_series(*colour, name, line, band)
                })
                .collect();
            panels.push((gene, series));
        }
        let size = (config.figure.width, config.figure.height * 2);
        save_figure(&out_dir.join("CVsquare_fillArea.png"), size, (3, 1), |areas| {
            for (area, (gene, series)) in areas.iter().zip(&panels) {
                draw_chart(area, &position_axes(*gene), series)?;
            }
            Ok(())
        })?;
    } else {
        warn!("No {} in {}; skipping CV² fill plot", COMPARE_CV_WORKBOOK, out_dir.display());
    }

    let loaded = load_all(backgrounds, NOISE_WORKBOOK)?;
    let her_log = NoiseAxis::Her.log_sheet_name();
    let size = (config.figure.width, config.figure.height);
    for kind in NOISE_KINDS {
        let series = loaded
            .iter()
            .map(|l| {
                let (line, band) = banded(&log_points(l.workbook.sheet(&her_log)?, kind)?);
                Ok(band_series(l.colour, &l.name, line, band))
            })
            .collect::<Result<Vec<_>>>()?;
        let axes = Axes::new("", "Mean her mRNA", &format!("{} noise", kind)).log10();
        let path = out_dir.join(format!("compare_{}_noise_log_fillArea.png", kind));
        save_figure(&path, size, (1, 1), |p| draw_chart(&p[0], &axes, &series))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn band_is_one_standard_error_wide() {
        let track = CvTrack {
            cv2: vec![Some(0.2), None, Some(0.4)],
            se: vec![Some(0.05), Some(0.1), Some(0.1)],
        };
        let (line, band) = cv_band(&track);
        assert_eq!(line.len(), 2);
        assert_eq!(line[1].x, 2.0);
        assert_eq!(line[1].y_err, (0.0, 0.0));
        assert_eq!(band[0].0, 0.0);
        assert_approx_eq!(band[0].1, 0.15);
        assert_approx_eq!(band[0].2, 0.25);
    }

    #[test]
    fn asymmetric_errors_shape_the_band() {
        let points = [ErrorPoint::new(1.0, -0.5).asym_y(0.25, 0.125)];
        let (_, band) = banded(&points);
        assert_eq!(band, vec![(1.0, -0.75, -0.375)]);
    }
}
