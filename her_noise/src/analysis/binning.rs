use std::cmp::Ordering;
use std::ops::Range;

/// Index of the first edge at or above `value`, `None` above the last edge.
pub fn first_bound_at_or_above(value: f64, bounds: &[f64]) -> Option<usize> {
    bounds.iter().position(|&edge| value <= edge)
}

/// Groups indices of `values` by [`first_bound_at_or_above`]; out-of-range values are dropped.
pub fn group_by_bounds(values: &[f64], bounds: &[f64]) -> Vec<Vec<usize>> {
    let mut bins = vec![Vec::new(); bounds.len()];
    for (i, &v) in values.iter().enumerate() {
        if let Some(b) = first_bound_at_or_above(v, bounds) {
            bins[b].push(i);
        }
    }
    bins
}

/// Upper bounds of `n` equal-width bins over the range of `values`.
/// The last bound is the maximum itself.
pub fn equal_width_bounds(values: &[f64], n: usize) -> Vec<f64> {
    let (lo, hi) = match crate::analysis::statistics::min_max(values) {
        Some(r) => r,
        None => return Vec::new(),
    };
    if n == 0 {
        return Vec::new();
    }
    let width = (hi - lo) / n as f64;
    let mut bounds: Vec<f64> = (0..n).map(|j| lo + width * (j + 1) as f64).collect();
    if let Some(last) = bounds.last_mut() {
        *last = hi;
    }
    bounds
}

/// Sorts indices by `keys` (ties by `tie`) and cuts them into `n` runs of `floor(len/n)`;
/// the last run takes the remainder.
pub fn equal_count_bins(keys: &[f64], tie: &[f64], n: usize) -> Vec<Vec<usize>> {
    if n == 0 {
        return Vec::new();
    }
    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_by(|&a, &b| {
        keys[a]
            .partial_cmp(&keys[b])
            .unwrap_or(Ordering::Equal)
            .then(tie[a].partial_cmp(&tie[b]).unwrap_or(Ordering::Equal))
    });
    let size = keys.len() / n;
    (0..n)
        .map(|i| {
            let start = i * size;
            let end = if i + 1 == n { order.len() } else { start + size };
            order[start..end].to_vec()
        })
        .collect()
}

/// Low/medium/high thresholds over a sample of slice means.
///
/// The first two thresholds average the two sorted values starting at each
/// third; the last is the maximum.
pub fn tercile_thresholds(values: &[f64]) -> Option<[f64; 3]> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let g = sorted.len() / 3;
    let window_mean = |start: usize| {
        let end = (start + 2).min(sorted.len());
        crate::analysis::statistics::mean(&sorted[start..end])
    };
    let max = sorted[sorted.len() - 1];
    Some([window_mean(g), window_mean(2 * g), max])
}

pub fn tercile_group(value: f64, thresholds: &[f64; 3]) -> Option<usize> {
    first_bound_at_or_above(value, thresholds)
}

/// Bin of `value` among `floor(max/interval)` bins of width `interval`.
pub fn interval_bin(value: f64, interval: f64, max: f64) -> Option<usize> {
    let bins = (max / interval).floor() as usize;
    (0..bins).find(|&b| value <= (b + 1) as f64 * interval)
}

/// Assigns each of `n` positions to one of `regions` consecutive regions.
/// The region advances by at most one per position.
pub fn positional_regions(n: usize, regions: usize) -> Vec<usize> {
    let mut current = 0;
    (0..n)
        .map(|i| {
            if current + 1 < regions && i >= n * (current + 1) / regions {
                current += 1;
            }
            current
        })
        .collect()
}

/// Per-region row count covering all but `fraction` of the embryos.
pub fn representative_count(counts: &[usize], num_embryos: usize, fraction: f64) -> usize {
    if counts.is_empty() {
        return 0;
    }
    let mut sorted = counts.to_vec();
    sorted.sort_unstable();
    let idx = (num_embryos as f64 * fraction) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Consecutive position ranges of `size`; a trailing partial section is dropped.
pub fn sections(n_positions: usize, size: usize) -> Vec<Range<usize>> {
    if size == 0 {
        return Vec::new();
    }
    (0..n_positions / size)
        .map(|i| i * size..(i + 1) * size)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_edges_drop_values_above_last() {
        let edges = [45.0, 80.0, 100.0, 125.0, 300.0];
        assert_eq!(first_bound_at_or_above(10.0, &edges), Some(0));
        assert_eq!(first_bound_at_or_above(45.0, &edges), Some(0));
        assert_eq!(first_bound_at_or_above(45.1, &edges), Some(1));
        assert_eq!(first_bound_at_or_above(301.0, &edges), None);
        let bins = group_by_bounds(&[50.0, 10.0, 400.0, 299.0], &edges);
        assert_eq!(bins, vec![vec![1], vec![0], vec![], vec![], vec![3]]);
    }

    #[test]
    fn equal_width_keeps_maximum_in_last_bin() {
        let values = [0.1, 0.2, 0.7];
        let bounds = equal_width_bounds(&values, 3);
        assert_eq!(bounds.len(), 3);
        assert_eq!(*bounds.last().unwrap(), 0.7);
        let bins = group_by_bounds(&values, &bounds);
        assert_eq!(bins.iter().map(Vec::len).sum::<usize>(), 3);
        assert_eq!(bins[2], vec![2]);
        assert!(equal_width_bounds(&[], 3).is_empty());
    }

    #[test]
    fn equal_count_last_bin_takes_rest() {
        let keys = [5.0, 1.0, 4.0, 2.0, 3.0, 6.0, 7.0];
        let tie = [0.0; 7];
        let bins = equal_count_bins(&keys, &tie, 3);
        // floor(7/3) = 2
        assert_eq!(bins, vec![vec![1, 3], vec![4, 2], vec![0, 5, 6]]);
    }

    #[test]
    fn equal_count_with_fewer_values_than_bins() {
        let bins = equal_count_bins(&[1.0, 2.0], &[0.0, 0.0], 5);
        assert_eq!(bins.len(), 5);
        assert!(bins[..4].iter().all(Vec::is_empty));
        assert_eq!(bins[4], vec![0, 1]);
    }

    #[test]
    fn terciles() {
        let values: Vec<f64> = (1..=9).map(f64::from).collect();
        // g = 3: mean(4, 5), mean(7, 8), 9
        let t = tercile_thresholds(&values).unwrap();
        assert_eq!(t, [4.5, 7.5, 9.0]);
        assert_eq!(tercile_group(4.5, &t), Some(0));
        assert_eq!(tercile_group(5.0, &t), Some(1));
        assert_eq!(tercile_group(9.0, &t), Some(2));
        // a single value is its own threshold everywhere
        assert_eq!(tercile_thresholds(&[2.0]).unwrap(), [2.0, 2.0, 2.0]);
    }

    #[test]
    fn heatmap_interval_bins() {
        assert_eq!(interval_bin(15.0, 15.0, 120.0), Some(0));
        assert_eq!(interval_bin(15.5, 15.0, 120.0), Some(1));
        assert_eq!(interval_bin(120.0, 15.0, 120.0), Some(7));
        assert_eq!(interval_bin(121.0, 15.0, 120.0), None);
    }

    #[test]
    fn regions_split_positions_in_thirds() {
        assert_eq!(positional_regions(6, 3), vec![0, 0, 1, 1, 2, 2]);
        assert_eq!(positional_regions(7, 3), vec![0, 0, 1, 1, 2, 2, 2]);
        assert_eq!(positional_regions(2, 3), vec![1, 2]);
    }

    #[test]
    fn representative_count_uses_embryo_fraction() {
        // 3 embryos x 2 regions
        let counts = [30, 28, 31, 25, 29, 27];
        // int(3 * 0.2) = 0 -> smallest
        assert_eq!(representative_count(&counts, 3, 0.2), 25);
        let counts: Vec<usize> = (20..40).collect();
        // 10 embryos -> index 2
        assert_eq!(representative_count(&counts, 10, 0.2), 22);
        assert_eq!(representative_count(&[], 0, 0.2), 0);
    }

    #[test]
    fn sections_drop_partial_tail() {
        assert_eq!(sections(12, 5), vec![0..5, 5..10]);
        assert!(sections(4, 5).is_empty());
    }
}
