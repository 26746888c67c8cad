//! Robust per-group statistics.
//!
//! [`reduce`] turns the raw values of one (material, adsorbate, column) group
//! into a [`Stat`] triple. Missing values are dropped first; groups of more than
//! [`TRIM_THRESHOLD`] values go through an IQR whisker test whose direction is
//! set by [`OutlierPolicy`].

use serde::{Deserialize, Serialize};

/// Groups larger than this are checked for outliers.
pub const TRIM_THRESHOLD: usize = 4;

/// Whisker length in units of the interquartile range.
pub const WHISKER: f64 = 1.5;

/// Which side of the whiskers is kept for groups above [`TRIM_THRESHOLD`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutlierPolicy {
    /// Keep only values strictly outside `[Q1 - 1.5·IQR, Q3 + 1.5·IQR]`.
    /// Matches the numbers published by the existing dashboards.
    #[default]
    RetainOutliers,
    /// Keep only values inside the closed whisker interval.
    DiscardOutliers,
}

/// Central estimate reported for a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CenterStatistic {
    #[default]
    Median,
    Mean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReducerConfig {
    #[serde(default)]
    pub outlier_policy: OutlierPolicy,
    #[serde(default)]
    pub center: CenterStatistic,
}

/// `(count, center, spread)` for one group.
///
/// `spread` is the population standard deviation and is never negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    pub count: usize,
    pub center: f64,
    pub spread: f64,
}

impl Stat {
    /// The `(0, NaN, 0)` triple of a group without valid values.
    pub const EMPTY: Stat = Stat {
        count: 0,
        center: f64::NAN,
        spread: 0.0,
    };

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl Default for Stat {
    fn default() -> Self {
        Stat::EMPTY
    }
}

/// Reduce one group's values. Never fails.
///
/// NaN and infinite values count as missing.
pub fn reduce(values: &[f64], config: &ReducerConfig) -> Stat {
    let mut valid: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    valid.sort_by(f64::total_cmp);

    match valid.len() {
        0 => Stat::EMPTY,
        1 => Stat {
            count: 1,
            center: valid[0],
            spread: 0.0,
        },
        n if n <= TRIM_THRESHOLD => summarize(&valid, config.center),
        _ => {
            let (lo, hi) = whiskers(&valid);
            let kept: Vec<f64> = valid
                .iter()
                .copied()
                .filter(|&v| {
                    let outside = v < lo || v > hi;
                    match config.outlier_policy {
                        OutlierPolicy::RetainOutliers => outside,
                        OutlierPolicy::DiscardOutliers => !outside,
                    }
                })
                .collect();
            summarize(&kept, config.center)
        }
    }
}

/// `(Q1 - 1.5·IQR, Q3 + 1.5·IQR)` of sorted, NaN-free values.
pub fn whiskers(sorted: &[f64]) -> (f64, f64) {
    let q1 = percentile(sorted, 0.25);
    let q3 = percentile(sorted, 0.75);
    let iqr = q3 - q1;
    (q1 - WHISKER * iqr, q3 + WHISKER * iqr)
}

/// Linear-interpolation percentile of sorted values, `q` in `[0, 1]`.
///
/// Position `q·(n-1)`, interpolated between its neighbours. NaN when empty.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = pos.floor() as usize;
            let upper = pos.ceil() as usize;
            let frac = pos - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * frac
        }
    }
}

/// Median of sorted values; NaN when empty.
pub fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    let mid = n / 2;
    if n % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) * 0.5
    } else {
        sorted[mid]
    }
}

/// Arithmetic mean; NaN when empty.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population (ddof = 0) standard deviation; 0 for fewer than two values.
pub fn population_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

fn summarize(sorted: &[f64], center: CenterStatistic) -> Stat {
    let center = match center {
        CenterStatistic::Median => median(sorted),
        CenterStatistic::Mean => mean(sorted),
    };
    Stat {
        count: sorted.len(),
        center,
        spread: population_std(sorted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn literal() -> ReducerConfig {
        ReducerConfig::default()
    }

    fn discarding() -> ReducerConfig {
        ReducerConfig {
            outlier_policy: OutlierPolicy::DiscardOutliers,
            ..ReducerConfig::default()
        }
    }

    #[test]
    fn all_missing_gives_sentinel() {
        for values in [vec![], vec![f64::NAN], vec![f64::NAN, f64::NAN, f64::NAN]] {
            let s = reduce(&values, &literal());
            assert_eq!(s.count, 0);
            assert!(s.center.is_nan());
            assert_eq!(s.spread, 0.0);
        }
    }

    #[test]
    fn single_value() {
        let s = reduce(&[f64::NAN, 4.2, f64::NAN], &literal());
        assert_eq!(
            s,
            Stat {
                count: 1,
                center: 4.2,
                spread: 0.0
            }
        );
    }

    #[test]
    fn infinite_values_are_missing() {
        let s = reduce(&[1.0, f64::INFINITY, f64::NEG_INFINITY, 3.0], &literal());
        assert_eq!(s.count, 2);
        assert_eq!(s.center, 2.0);
        assert_eq!(s.spread, 1.0);

        assert!(reduce(&[f64::INFINITY], &literal()).is_empty());
    }

    #[test]
    fn small_groups_are_not_trimmed() {
        let s = reduce(&[1.0, 2.0, 3.0], &literal());
        assert_eq!(s.count, 3);
        assert_eq!(s.center, 2.0);
        assert_relative_eq!(s.spread, (2.0f64 / 3.0).sqrt(), epsilon = 1e-12);

        let s = reduce(&[1.0, 2.0, 3.0, 1000.0], &literal());
        assert_eq!(s.count, 4);
        assert_eq!(s.center, 2.5);
    }

    #[test]
    fn two_values_median_is_midpoint() {
        let s = reduce(&[2.0, 6.0], &literal());
        assert_eq!(s.count, 2);
        assert_eq!(s.center, 4.0);
        assert_eq!(s.spread, 2.0);
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0, 1000.0];
        assert_relative_eq!(percentile(&v, 0.25), 2.25);
        assert_relative_eq!(percentile(&v, 0.75), 4.75);
        assert_eq!(percentile(&v, 0.0), 1.0);
        assert_eq!(percentile(&v, 1.0), 1000.0);
        assert!(percentile(&[], 0.5).is_nan());
    }

    #[test]
    fn retain_policy_keeps_only_outliers() {
        // Q1 = 2.25, Q3 = 4.75, whiskers (-1.5, 8.5)
        let s = reduce(&[1.0, 2.0, 3.0, 4.0, 5.0, 1000.0], &literal());
        assert_eq!(
            s,
            Stat {
                count: 1,
                center: 1000.0,
                spread: 0.0
            }
        );
    }

    #[test]
    fn discard_policy_keeps_inliers() {
        let s = reduce(&[1000.0, 1.0, 2.0, 3.0, 4.0, 5.0], &discarding());
        assert_eq!(s.count, 5);
        assert_eq!(s.center, 3.0);
        assert_relative_eq!(s.spread, 2.0f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn retain_policy_without_outliers_is_empty() {
        let s = reduce(&[1.0, 2.0, 3.0, 4.0, 5.0], &literal());
        assert_eq!(s.count, 0);
        assert!(s.center.is_nan());
        assert_eq!(s.spread, 0.0);
    }

    #[test]
    fn missing_values_do_not_count() {
        let s = reduce(
            &[1.0, f64::NAN, 2.0, 3.0, 4.0, 5.0, f64::NAN],
            &discarding(),
        );
        assert_eq!(s.count, 5);
        assert_eq!(s.center, 3.0);
    }

    #[test]
    fn mean_center() {
        let config = ReducerConfig {
            center: CenterStatistic::Mean,
            ..ReducerConfig::default()
        };
        let s = reduce(&[1.0, 2.0, 6.0], &config);
        assert_eq!(s.center, 3.0);
    }

    #[test]
    fn reduction_is_deterministic() {
        let values = [3.5, 0.1, 9.9, 2.2, 7.7, 5.0, 4.4, 100.0, -50.0];
        let a = reduce(&values, &literal());
        let b = reduce(&values, &literal());
        assert_eq!(a.count, b.count);
        assert_eq!(a.center.to_bits(), b.center.to_bits());
        assert_eq!(a.spread.to_bits(), b.spread.to_bits());
    }
}
