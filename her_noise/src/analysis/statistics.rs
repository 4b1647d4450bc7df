use statrs::statistics::Statistics;

use crate::models::{Cell, Gene};

/// Arithmetic mean, NaN for an empty sample.
pub fn mean(xs: &[f64]) -> f64 {
    xs.iter().mean()
}

/// Standard deviation with ddof = 0.
pub fn population_std(xs: &[f64]) -> f64 {
    xs.iter().population_std_dev()
}

/// Population standard deviation over √n.
pub fn std_error(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    population_std(xs) / (xs.len() as f64).sqrt()
}

pub fn cv_squared(xs: &[f64]) -> f64 {
    let m = mean(xs);
    (population_std(xs) / m).powi(2)
}

pub fn harmonic_mean(a: f64, b: f64) -> f64 {
    2.0 / (1.0 / a + 1.0 / b)
}

pub fn min_max(xs: &[f64]) -> Option<(f64, f64)> {
    let finite = xs.iter().copied().filter(|v| v.is_finite());
    finite.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// Count, mean and standard error of a group of values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub se: f64,
}

impl Summary {
    pub fn of(xs: &[f64]) -> Summary {
        Summary {
            count: xs.len(),
            mean: mean(xs),
            se: std_error(xs),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Two-reporter noise of a single slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseDecomposition {
    pub her1_mean: f64,
    pub her7_mean: f64,
    pub intrinsic: f64,
    pub extrinsic: f64,
    pub total: f64,
}

impl NoiseDecomposition {
    pub fn her_mean(&self) -> f64 {
        self.her1_mean + self.her7_mean
    }

    pub fn harmonic_mean(&self) -> f64 {
        harmonic_mean(self.her1_mean, self.her7_mean)
    }

    pub fn mean_of(&self, gene: Gene) -> f64 {
        match gene {
            Gene::Her1 => self.her1_mean,
            Gene::Her7 => self.her7_mean,
            Gene::Her => self.her_mean(),
        }
    }

    pub fn fano(&self, gene: Gene) -> f64 {
        self.intrinsic * self.mean_of(gene)
    }
}

/// Splits the variability of paired reporter counts into intrinsic and extrinsic parts.
///
/// `cells` must already be restricted to pairs where both counts are positive.
/// Returns `None` when there are fewer than `min_cells` pairs.
pub fn decompose(cells: &[Cell], min_cells: usize) -> Option<NoiseDecomposition> {
    let n = cells.len();
    if n < min_cells.max(1) {
        return None;
    }
    let a: Vec<f64> = cells.iter().map(|c| c.her1).collect();
    let b: Vec<f64> = cells.iter().map(|c| c.her7).collect();
    let ma = mean(&a);
    let mb = mean(&b);

    let intrinsic = cells
        .iter()
        .map(|c| (c.her1 / ma - c.her7 / mb).powi(2))
        .sum::<f64>()
        / n as f64
        / 2.0;
    let ab: Vec<f64> = cells.iter().map(|c| c.her1 * c.her7).collect();
    let extrinsic = (mean(&ab) - ma * mb) / (ma * mb);

    Some(NoiseDecomposition {
        her1_mean: ma,
        her7_mean: mb,
        intrinsic,
        extrinsic,
        total: intrinsic + extrinsic,
    })
}

/// A binned mean on a log10 axis with asymmetric 2·se error bars.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogPoint {
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

impl LogPoint {
    pub fn of(mean: f64, se: f64) -> LogPoint {
        LogPoint::around(mean, se, mean.log10())
    }

    /// Negative means are drawn at log10(1) = 0; the bars still follow the raw mean.
    pub fn non_negative(mean: f64, se: f64) -> LogPoint {
        let value = if mean < 0.0 { 0.0 } else { mean.log10() };
        LogPoint::around(mean, se, value)
    }

    fn around(mean: f64, se: f64, value: f64) -> LogPoint {
        LogPoint {
            value,
            lower: ((mean - 2.0 * se).abs().log10() - value).abs(),
            upper: ((mean + 2.0 * se).abs().log10() - value).abs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn cells(pairs: &[(f64, f64)]) -> Vec<Cell> {
        pairs.iter().map(|&(a, b)| Cell::new(a, b)).collect()
    }

    #[test]
    fn identical_reporters_have_no_intrinsic_noise() {
        let noise = decompose(&cells(&[(2.0, 2.0), (4.0, 4.0), (6.0, 6.0)]), 3).unwrap();
        assert_approx_eq!(noise.her1_mean, 4.0);
        assert_approx_eq!(noise.intrinsic, 0.0);
        // mean(ab) = 56/3, ma·mb = 16
        assert_approx_eq!(noise.extrinsic, (56.0 / 3.0 - 16.0) / 16.0);
        assert_approx_eq!(noise.total, noise.extrinsic);
        assert_approx_eq!(noise.her_mean(), 8.0);
        assert_approx_eq!(noise.harmonic_mean(), 4.0);
    }

    #[test]
    fn anti_correlated_reporters() {
        let noise = decompose(&cells(&[(1.0, 3.0), (3.0, 1.0), (2.0, 2.0)]), 3).unwrap();
        // normalised differences: -1, 1, 0
        assert_approx_eq!(noise.intrinsic, (1.0 + 1.0) / 3.0 / 2.0);
        assert_approx_eq!(noise.extrinsic, (10.0 / 3.0 - 4.0) / 4.0);
        assert_approx_eq!(noise.fano(Gene::Her7), noise.intrinsic * 2.0);
    }

    #[test]
    fn too_few_cells_gives_nothing() {
        assert!(decompose(&cells(&[(1.0, 1.0), (2.0, 2.0)]), 3).is_none());
        assert!(decompose(&[], 0).is_none());
    }

    #[test]
    fn population_statistics() {
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_approx_eq!(mean(&xs), 5.0);
        assert_approx_eq!(population_std(&xs), 2.0);
        assert_approx_eq!(std_error(&xs), 2.0 / 8f64.sqrt());
        assert_approx_eq!(cv_squared(&xs), 0.16);
        assert!(std_error(&[]).is_nan());
        assert_eq!(min_max(&[3.0, f64::NAN, -1.0]), Some((-1.0, 3.0)));
    }

    #[test]
    fn log_error_bars() {
        let p = LogPoint::of(100.0, 5.0);
        assert_approx_eq!(p.value, 2.0);
        assert_approx_eq!(p.lower, 2.0 - 90f64.log10());
        assert_approx_eq!(p.upper, 110f64.log10() - 2.0);

        let neg = LogPoint::non_negative(-0.01, 0.02);
        assert_approx_eq!(neg.value, 0.0);
        assert_approx_eq!(neg.lower, 0.05f64.log10().abs());
    }
}
