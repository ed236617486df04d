use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{AppError, Result};

/// The fixed feature columns, in the exact order the classifier was trained
/// on. Extraction, training and scaling all consume this single constant;
/// reordering it silently corrupts every persisted model.
pub const FEATURE_COLUMNS: [&str; 5] =
    ["vibration", "oil_level", "temperature", "pressure", "rpm"];

/// Number of feature columns
pub const N_FEATURES: usize = FEATURE_COLUMNS.len();

/// Extract the fixed-order feature vector from a raw metrics mapping.
/// Absent metrics default to 0.0; unknown keys are ignored. Infallible by
/// contract.
pub fn extract(metrics: &HashMap<String, f64>) -> [f64; N_FEATURES] {
    let mut vector = [0.0; N_FEATURES];
    for (i, name) in FEATURE_COLUMNS.iter().enumerate() {
        vector[i] = metrics.get(*name).copied().unwrap_or(0.0);
    }
    vector
}

/// Build the training feature matrix from per-sample metric mappings.
///
/// Unlike scoring-time extraction, training resolution is strict: a sample
/// missing any feature column is a validation error, not a silent default.
pub fn training_matrix(rows: &[HashMap<String, f64>]) -> Result<Array2<f64>> {
    let mut matrix = Array2::zeros((rows.len(), N_FEATURES));

    for (i, row) in rows.iter().enumerate() {
        for (j, name) in FEATURE_COLUMNS.iter().enumerate() {
            let value = row.get(*name).copied().ok_or_else(|| {
                AppError::Validation(format!(
                    "training sample {} is missing required feature '{}'",
                    i, name
                ))
            })?;
            matrix[[i, j]] = value;
        }
    }

    Ok(matrix)
}

/// Per-column standardization (zero mean, unit variance), fitted on the full
/// training matrix and applied to every vector before model inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: [f64; N_FEATURES],
    stds: [f64; N_FEATURES],
}

impl StandardScaler {
    /// Fit scaling statistics on a feature matrix, replacing nothing: a fit
    /// always computes fresh statistics from the full matrix.
    pub fn fit(matrix: &Array2<f64>) -> Self {
        let n = matrix.nrows().max(1) as f64;
        let mut means = [0.0; N_FEATURES];
        let mut stds = [1.0; N_FEATURES];

        for (j, column) in matrix.axis_iter(Axis(1)).enumerate() {
            let mean = column.sum() / n;
            let variance = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();

            means[j] = mean;
            // Constant columns scale to zero offset instead of dividing by zero
            stds[j] = if std > 0.0 { std } else { 1.0 };
        }

        Self { means, stds }
    }

    /// Scale a single feature vector
    pub fn transform_row(&self, row: &[f64; N_FEATURES]) -> [f64; N_FEATURES] {
        let mut scaled = [0.0; N_FEATURES];
        for j in 0..N_FEATURES {
            scaled[j] = (row[j] - self.means[j]) / self.stds[j];
        }
        scaled
    }

    /// Scale a full feature matrix
    pub fn transform(&self, matrix: &Array2<f64>) -> Array2<f64> {
        let mut scaled = matrix.clone();
        for (j, mut column) in scaled.axis_iter_mut(Axis(1)).enumerate() {
            column.mapv_inplace(|v| (v - self.means[j]) / self.stds[j]);
        }
        scaled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_extract_fixed_order() {
        let m = metrics(&[
            ("rpm", 1800.0),
            ("vibration", 85.5),
            ("temperature", 95.0),
            ("oil_level", 15.2),
            ("pressure", 45.0),
        ]);

        let vector = extract(&m);
        assert_eq!(vector, [85.5, 15.2, 95.0, 45.0, 1800.0]);
    }

    #[test]
    fn test_extract_defaults_missing_to_zero() {
        let m = metrics(&[("vibration", 12.0)]);
        let vector = extract(&m);
        assert_eq!(vector, [12.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_extract_ignores_unknown_keys() {
        let m = metrics(&[("vibration", 12.0), ("humidity", 55.0)]);
        let vector = extract(&m);
        assert_eq!(vector, [12.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_training_matrix_strict_on_missing_names() {
        let rows = vec![metrics(&[("vibration", 1.0), ("oil_level", 2.0)])];
        let err = training_matrix(&rows).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn test_training_matrix_shape_and_order() {
        let rows = vec![
            metrics(&[
                ("vibration", 1.0),
                ("oil_level", 2.0),
                ("temperature", 3.0),
                ("pressure", 4.0),
                ("rpm", 5.0),
            ]),
            metrics(&[
                ("vibration", 6.0),
                ("oil_level", 7.0),
                ("temperature", 8.0),
                ("pressure", 9.0),
                ("rpm", 10.0),
            ]),
        ];

        let matrix = training_matrix(&rows).unwrap();
        assert_eq!(matrix.shape(), &[2, 5]);
        assert_eq!(matrix[[0, 0]], 1.0);
        assert_eq!(matrix[[1, 4]], 10.0);
    }

    #[test]
    fn test_scaler_zero_mean_unit_variance() {
        let rows = vec![
            metrics(&[
                ("vibration", 0.0),
                ("oil_level", 10.0),
                ("temperature", 20.0),
                ("pressure", 30.0),
                ("rpm", 40.0),
            ]),
            metrics(&[
                ("vibration", 2.0),
                ("oil_level", 14.0),
                ("temperature", 20.0),
                ("pressure", 50.0),
                ("rpm", 60.0),
            ]),
        ];

        let matrix = training_matrix(&rows).unwrap();
        let scaler = StandardScaler::fit(&matrix);
        let scaled = scaler.transform(&matrix);

        for j in 0..N_FEATURES {
            let mean: f64 = (0..2).map(|i| scaled[[i, j]]).sum::<f64>() / 2.0;
            assert!(mean.abs() < 1e-9);
        }
        // Constant column stays untouched rather than becoming NaN
        assert_eq!(scaled[[0, 2]], 0.0);
        assert_eq!(scaled[[1, 2]], 0.0);
    }

    #[test]
    fn test_scaler_row_matches_matrix_transform() {
        let rows = vec![
            metrics(&[
                ("vibration", 1.0),
                ("oil_level", 2.0),
                ("temperature", 3.0),
                ("pressure", 4.0),
                ("rpm", 5.0),
            ]),
            metrics(&[
                ("vibration", 3.0),
                ("oil_level", 6.0),
                ("temperature", 9.0),
                ("pressure", 12.0),
                ("rpm", 15.0),
            ]),
        ];

        let matrix = training_matrix(&rows).unwrap();
        let scaler = StandardScaler::fit(&matrix);
        let scaled = scaler.transform(&matrix);

        let row = [1.0, 2.0, 3.0, 4.0, 5.0];
        let scaled_row = scaler.transform_row(&row);
        for j in 0..N_FEATURES {
            assert!((scaled_row[j] - scaled[[0, j]]).abs() < 1e-12);
        }
    }
}
