//! Outlier-resistant feature scaling shared by all prediction targets.

use anyhow::ensure;
use serde::{Deserialize, Serialize};

/// Per-feature centering on the median and scaling by the interquartile
/// range. Features with zero IQR (constant in the batch) pass through
/// centered but unscaled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobustScaler {
    centers: Vec<f64>,
    scales: Vec<f64>,
}

impl RobustScaler {
    pub fn fit(rows: &[Vec<f64>]) -> anyhow::Result<Self> {
        ensure!(!rows.is_empty(), "cannot fit scaler on an empty batch");
        let n_features = rows[0].len();
        ensure!(n_features > 0, "cannot fit scaler on zero-width rows");
        for row in rows {
            ensure!(
                row.len() == n_features,
                "inconsistent row width: expected {n_features}, got {}",
                row.len()
            );
        }

        let mut centers = Vec::with_capacity(n_features);
        let mut scales = Vec::with_capacity(n_features);

        for j in 0..n_features {
            let mut column: Vec<f64> = rows.iter().map(|r| r[j]).collect();
            column.sort_by(|a, b| a.total_cmp(b));

            let median = percentile(&column, 0.5);
            let iqr = percentile(&column, 0.75) - percentile(&column, 0.25);

            centers.push(median);
            scales.push(if iqr > 0.0 { iqr } else { 1.0 });
        }

        Ok(Self { centers, scales })
    }

    pub fn n_features(&self) -> usize {
        self.centers.len()
    }

    pub fn transform(&self, row: &[f64]) -> anyhow::Result<Vec<f64>> {
        ensure!(
            row.len() == self.centers.len(),
            "feature width mismatch: scaler has {}, input has {}",
            self.centers.len(),
            row.len()
        );
        Ok(row
            .iter()
            .zip(self.centers.iter().zip(self.scales.iter()))
            .map(|(x, (c, s))| (x - c) / s)
            .collect())
    }

    pub fn transform_batch(&self, rows: &[Vec<f64>]) -> anyhow::Result<Vec<Vec<f64>>> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}

/// Linear-interpolation percentile over a pre-sorted slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = pos - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centers_median_to_zero() {
        let rows = vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0], vec![5.0]];
        let scaler = RobustScaler::fit(&rows).unwrap();
        let scaled = scaler.transform(&[3.0]).unwrap();
        assert!(scaled[0].abs() < 1e-9);
    }

    #[test]
    fn scales_by_interquartile_range() {
        let rows = vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0], vec![5.0]];
        let scaler = RobustScaler::fit(&rows).unwrap();
        // IQR = 4 - 2 = 2; (5 - 3) / 2 = 1.
        let scaled = scaler.transform(&[5.0]).unwrap();
        assert!((scaled[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn constant_feature_passes_through_centered() {
        let rows = vec![vec![7.0, 1.0], vec![7.0, 2.0], vec![7.0, 3.0]];
        let scaler = RobustScaler::fit(&rows).unwrap();
        let scaled = scaler.transform(&[7.0, 2.0]).unwrap();
        assert_eq!(scaled[0], 0.0);
        assert_eq!(scaled[1], 0.0);
    }

    #[test]
    fn outliers_do_not_dominate_the_scale() {
        let mut rows: Vec<Vec<f64>> = (0..99).map(|i| vec![i as f64 / 100.0]).collect();
        rows.push(vec![1000.0]);
        let scaler = RobustScaler::fit(&rows).unwrap();
        let scaled = scaler.transform(&[0.5]).unwrap();
        assert!(scaled[0].abs() < 2.0);
    }

    #[test]
    fn rejects_width_mismatch() {
        let scaler = RobustScaler::fit(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert!(scaler.transform(&[1.0]).is_err());
    }

    #[test]
    fn rejects_empty_batch() {
        assert!(RobustScaler::fit(&[]).is_err());
    }
}
