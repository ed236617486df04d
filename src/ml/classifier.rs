use chrono::{DateTime, Utc};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_classifier::{
    DecisionTreeClassifier, DecisionTreeClassifierParameters, SplitCriterion,
};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::config::ModelConfig;
use crate::error::{AppError, Result};
use crate::ml::features::{StandardScaler, FEATURE_COLUMNS, N_FEATURES};

/// File name of the persisted ensemble artifact
pub const MODEL_ARTIFACT: &str = "failure_model.bin";

/// File name of the persisted scaler artifact
pub const SCALER_ARTIFACT: &str = "feature_scaler.bin";

type TreeModel = DecisionTreeClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>>;

/// Durable form of the trained ensemble. The embedded feature columns are
/// checked against [`FEATURE_COLUMNS`] on load so a stale artifact from a
/// different schema falls back to Untrained instead of scoring garbage.
#[derive(Serialize, Deserialize)]
struct ModelArtifact {
    feature_columns: Vec<String>,
    trained_at: DateTime<Utc>,
    trees: Vec<TreeModel>,
}

/// Durable form of the fitted scaler, paired with the model artifact
#[derive(Serialize, Deserialize)]
struct ScalerArtifact {
    feature_columns: Vec<String>,
    scaler: StandardScaler,
}

enum ClassifierState {
    Untrained,
    Trained {
        model: ModelArtifact,
        scaler: StandardScaler,
    },
}

/// Trainable binary failure classifier: a bagged ensemble of decision trees
/// plus the feature scaler fitted alongside it.
///
/// Two states only. Untrained (initial, or after a failed load) and Trained
/// (after a successful `fit` or artifact restore). A `fit` call replaces the
/// model and scaler together; callers never observe one without the other.
pub struct FailureClassifier {
    config: ModelConfig,
    state: ClassifierState,
}

impl FailureClassifier {
    /// Create a classifier in the Untrained state
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            state: ClassifierState::Untrained,
        }
    }

    /// Restore persisted state if both artifacts are present and mutually
    /// consistent. Any failure is logged and absorbed into a fresh Untrained
    /// classifier; startup never dies on a bad artifact.
    pub fn load(config: ModelConfig) -> Self {
        let mut classifier = Self::new(config);

        match classifier.try_restore() {
            Ok(trained_at) => {
                info!(trained_at = %trained_at, "Restored persisted classifier state");
            }
            Err(e) => {
                warn!(
                    "No usable persisted model ({}); starting with untrained classifier",
                    e
                );
                classifier.state = ClassifierState::Untrained;
            }
        }

        classifier
    }

    fn try_restore(&mut self) -> Result<DateTime<Utc>> {
        let model_path = self.config.model_dir.join(MODEL_ARTIFACT);
        let scaler_path = self.config.model_dir.join(SCALER_ARTIFACT);

        let model: ModelArtifact = read_artifact(&model_path)?;
        let scaler: ScalerArtifact = read_artifact(&scaler_path)?;

        if model.feature_columns != FEATURE_COLUMNS {
            return Err(AppError::Persistence(format!(
                "model artifact feature columns {:?} do not match engine schema",
                model.feature_columns
            )));
        }
        if scaler.feature_columns != model.feature_columns {
            return Err(AppError::Persistence(
                "model and scaler artifacts disagree on feature columns".to_string(),
            ));
        }
        if model.trees.is_empty() {
            return Err(AppError::Persistence("model artifact holds no trees".to_string()));
        }

        let trained_at = model.trained_at;
        self.state = ClassifierState::Trained {
            model,
            scaler: scaler.scaler,
        };
        Ok(trained_at)
    }

    /// Whether a trained model is available
    pub fn is_trained(&self) -> bool {
        matches!(self.state, ClassifierState::Trained { .. })
    }

    /// Number of trees in the trained ensemble, if any
    pub fn ensemble_size(&self) -> Option<usize> {
        match &self.state {
            ClassifierState::Trained { model, .. } => Some(model.trees.len()),
            ClassifierState::Untrained => None,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Full retrain on a feature matrix and parallel binary labels.
    ///
    /// Re-fits the scaler from scratch, then trains each tree on a seeded
    /// class-balanced bootstrap of the scaled matrix. State transitions to
    /// Trained only once every tree has fitted; a failure partway leaves the
    /// previous state untouched. Returns in-sample accuracy.
    pub fn fit(&mut self, features: &Array2<f64>, labels: &[i32]) -> Result<f64> {
        if features.nrows() != labels.len() {
            return Err(AppError::Validation(format!(
                "features/labels length mismatch: {} != {}",
                features.nrows(),
                labels.len()
            )));
        }
        if labels.is_empty() {
            return Err(AppError::Validation("training dataset is empty".to_string()));
        }
        // An empty ensemble would reach Trained and then divide by zero votes
        if self.config.n_trees == 0 {
            return Err(AppError::Configuration(
                "n_trees must be at least 1".to_string(),
            ));
        }

        let scaler = StandardScaler::fit(features);
        let scaled = scaler.transform(features);

        let n_samples = scaled.nrows();
        let class0: Vec<usize> = (0..n_samples).filter(|&i| labels[i] == 0).collect();
        let class1: Vec<usize> = (0..n_samples).filter(|&i| labels[i] == 1).collect();
        let all: Vec<usize> = (0..n_samples).collect();

        let params = || {
            DecisionTreeClassifierParameters::default()
                .with_max_depth(self.config.max_depth)
                .with_criterion(SplitCriterion::Gini)
        };

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut trees = Vec::with_capacity(self.config.n_trees);

        for _ in 0..self.config.n_trees {
            let rows = bootstrap_rows(&mut rng, n_samples, &class0, &class1, &all);

            let mut data = Vec::with_capacity(rows.len() * N_FEATURES);
            let mut y = Vec::with_capacity(rows.len());
            for &i in &rows {
                for j in 0..N_FEATURES {
                    data.push(scaled[[i, j]]);
                }
                y.push(labels[i]);
            }

            let x = DenseMatrix::new(rows.len(), N_FEATURES, data, false);
            let tree = DecisionTreeClassifier::fit(&x, &y, params())
                .map_err(|e| AppError::Internal(format!("failed to train decision tree: {}", e)))?;
            trees.push(tree);
        }

        let accuracy = in_sample_accuracy(&trees, &scaled, labels)?;

        self.state = ClassifierState::Trained {
            model: ModelArtifact {
                feature_columns: FEATURE_COLUMNS.iter().map(|s| s.to_string()).collect(),
                trained_at: Utc::now(),
                trees,
            },
            scaler,
        };

        Ok(accuracy)
    }

    /// Score a single feature vector.
    ///
    /// Returns the failure probability (fraction of trees voting for the
    /// failure class) and the confidence `|P(no-failure) - P(failure)|`,
    /// maximal when the ensemble is unanimous and near zero at the decision
    /// boundary. Fails with `NotTrained` in the Untrained state; callers are
    /// expected to check state first.
    pub fn predict(&self, vector: &[f64; N_FEATURES]) -> Result<(f64, f64)> {
        let (model, scaler) = match &self.state {
            ClassifierState::Trained { model, scaler } => (model, scaler),
            ClassifierState::Untrained => return Err(AppError::NotTrained),
        };

        let scaled = scaler.transform_row(vector);
        let x = DenseMatrix::new(1, N_FEATURES, scaled.to_vec(), false);

        let mut failure_votes = 0usize;
        for tree in &model.trees {
            let prediction = tree
                .predict(&x)
                .map_err(|e| AppError::Internal(format!("prediction failed: {}", e)))?;
            if prediction[0] == 1 {
                failure_votes += 1;
            }
        }

        let p_failure = failure_votes as f64 / model.trees.len() as f64;
        let confidence = ((1.0 - p_failure) - p_failure).abs();

        Ok((p_failure, confidence))
    }

    /// Serialize the trained model and scaler to their companion artifacts.
    ///
    /// Both artifacts embed the feature-column schema; `load` refuses any
    /// pair that is incomplete or inconsistent, so a crash between the two
    /// writes is detected on the next startup.
    pub fn persist(&self) -> Result<()> {
        let (model, scaler) = match &self.state {
            ClassifierState::Trained { model, scaler } => (model, scaler),
            ClassifierState::Untrained => return Err(AppError::NotTrained),
        };

        let dir = &self.config.model_dir;
        fs::create_dir_all(dir).map_err(|e| {
            AppError::Persistence(format!("failed to create {}: {}", dir.display(), e))
        })?;

        let scaler_artifact = ScalerArtifact {
            feature_columns: model.feature_columns.clone(),
            scaler: scaler.clone(),
        };

        write_artifact(&dir.join(MODEL_ARTIFACT), model)?;
        write_artifact(&dir.join(SCALER_ARTIFACT), &scaler_artifact)?;

        info!(dir = %dir.display(), "Persisted classifier artifacts");
        Ok(())
    }
}

/// Class-balanced bootstrap: alternate draws between the two class pools so
/// each tree sees an even class mix, regardless of label skew in the dataset.
/// Falls back to uniform sampling when only one class is present.
fn bootstrap_rows(
    rng: &mut StdRng,
    n_samples: usize,
    class0: &[usize],
    class1: &[usize],
    all: &[usize],
) -> Vec<usize> {
    let mut rows = Vec::with_capacity(n_samples);
    for k in 0..n_samples {
        let pool = if class0.is_empty() || class1.is_empty() {
            all
        } else if k % 2 == 0 {
            class0
        } else {
            class1
        };
        rows.push(pool[rng.gen_range(0..pool.len())]);
    }
    rows
}

/// Majority-vote accuracy of the ensemble over the full scaled matrix
fn in_sample_accuracy(trees: &[TreeModel], scaled: &Array2<f64>, labels: &[i32]) -> Result<f64> {
    let n_samples = scaled.nrows();
    let data: Vec<f64> = scaled.iter().copied().collect();
    let x = DenseMatrix::new(n_samples, N_FEATURES, data, false);

    let mut votes = vec![0usize; n_samples];
    for tree in trees {
        let predictions = tree
            .predict(&x)
            .map_err(|e| AppError::Internal(format!("prediction failed: {}", e)))?;
        for (i, &p) in predictions.iter().enumerate() {
            if p == 1 {
                votes[i] += 1;
            }
        }
    }

    let correct = votes
        .iter()
        .zip(labels.iter())
        .filter(|(&v, &label)| {
            let predicted = if v * 2 >= trees.len() { 1 } else { 0 };
            predicted == label
        })
        .count();

    Ok(correct as f64 / n_samples as f64)
}

fn read_artifact<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)
        .map_err(|e| AppError::Persistence(format!("failed to read {}: {}", path.display(), e)))?;
    bincode::deserialize(&bytes).map_err(|e| {
        AppError::Persistence(format!("failed to decode {}: {}", path.display(), e))
    })
}

fn write_artifact<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = bincode::serialize(value).map_err(|e| {
        AppError::Persistence(format!("failed to encode {}: {}", path.display(), e))
    })?;
    fs::write(path, bytes)
        .map_err(|e| AppError::Persistence(format!("failed to write {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> ModelConfig {
        ModelConfig {
            model_dir: dir.path().to_path_buf(),
            n_trees: 20,
            max_depth: 5,
            seed: 42,
        }
    }

    /// Separable dataset: low readings labeled healthy, high readings failure
    fn separable_dataset(n_per_class: usize) -> (Array2<f64>, Vec<i32>) {
        let mut matrix = Array2::zeros((n_per_class * 2, N_FEATURES));
        let mut labels = Vec::with_capacity(n_per_class * 2);

        for i in 0..n_per_class {
            let jitter = i as f64 * 0.5;
            for j in 0..N_FEATURES {
                matrix[[i, j]] = 10.0 + jitter + j as f64;
            }
            labels.push(0);
        }
        for i in 0..n_per_class {
            let jitter = i as f64 * 0.5;
            for j in 0..N_FEATURES {
                matrix[[n_per_class + i, j]] = 90.0 + jitter + j as f64;
            }
            labels.push(1);
        }

        (matrix, labels)
    }

    #[test]
    fn test_untrained_predict_fails() {
        let dir = TempDir::new().unwrap();
        let classifier = FailureClassifier::new(test_config(&dir));

        assert!(!classifier.is_trained());
        let err = classifier.predict(&[0.0; N_FEATURES]).unwrap_err();
        assert!(matches!(err, AppError::NotTrained));
    }

    #[test]
    fn test_fit_transitions_to_trained() {
        let dir = TempDir::new().unwrap();
        let mut classifier = FailureClassifier::new(test_config(&dir));

        let (features, labels) = separable_dataset(25);
        let accuracy = classifier.fit(&features, &labels).unwrap();

        assert!(classifier.is_trained());
        assert_eq!(classifier.ensemble_size(), Some(20));
        assert!(accuracy > 0.9, "separable data should fit well, got {}", accuracy);
    }

    #[test]
    fn test_fit_length_mismatch_rejected_before_mutation() {
        let dir = TempDir::new().unwrap();
        let mut classifier = FailureClassifier::new(test_config(&dir));

        let (features, mut labels) = separable_dataset(10);
        labels.pop();

        let err = classifier.fit(&features, &labels).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(!classifier.is_trained());
    }

    #[test]
    fn test_predict_probability_and_confidence() {
        let dir = TempDir::new().unwrap();
        let mut classifier = FailureClassifier::new(test_config(&dir));

        let (features, labels) = separable_dataset(25);
        classifier.fit(&features, &labels).unwrap();

        let (p_healthy, conf_healthy) = classifier.predict(&[12.0, 13.0, 14.0, 15.0, 16.0]).unwrap();
        let (p_failure, conf_failure) = classifier.predict(&[95.0, 96.0, 97.0, 98.0, 99.0]).unwrap();

        assert!(p_healthy < 0.5);
        assert!(p_failure > 0.5);
        for (p, c) in [(p_healthy, conf_healthy), (p_failure, conf_failure)] {
            assert!((0.0..=1.0).contains(&p));
            assert!((c - (1.0 - 2.0 * p).abs()).abs() < 1e-12);
        }
    }

    #[test]
    fn test_fit_is_reproducible_with_fixed_seed() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        let (features, labels) = separable_dataset(20);

        let mut a = FailureClassifier::new(test_config(&dir_a));
        let mut b = FailureClassifier::new(test_config(&dir_b));
        let acc_a = a.fit(&features, &labels).unwrap();
        let acc_b = b.fit(&features, &labels).unwrap();

        assert_eq!(acc_a, acc_b);
        let probe = [50.0, 51.0, 52.0, 53.0, 54.0];
        assert_eq!(a.predict(&probe).unwrap(), b.predict(&probe).unwrap());
    }

    #[test]
    fn test_persist_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        let (features, labels) = separable_dataset(20);
        let mut classifier = FailureClassifier::new(config.clone());
        classifier.fit(&features, &labels).unwrap();
        classifier.persist().unwrap();

        let restored = FailureClassifier::load(config);
        assert!(restored.is_trained());
        assert_eq!(restored.ensemble_size(), Some(20));

        let probe = [95.0, 96.0, 97.0, 98.0, 99.0];
        assert_eq!(
            classifier.predict(&probe).unwrap(),
            restored.predict(&probe).unwrap()
        );
    }

    #[test]
    fn test_load_with_missing_artifact_falls_back_untrained() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        let (features, labels) = separable_dataset(10);
        let mut classifier = FailureClassifier::new(config.clone());
        classifier.fit(&features, &labels).unwrap();
        classifier.persist().unwrap();

        // Simulate a crash between the two artifact writes
        fs::remove_file(dir.path().join(SCALER_ARTIFACT)).unwrap();

        let restored = FailureClassifier::load(config);
        assert!(!restored.is_trained());
    }

    #[test]
    fn test_load_with_corrupt_artifact_falls_back_untrained() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        fs::write(dir.path().join(MODEL_ARTIFACT), b"not a model").unwrap();
        fs::write(dir.path().join(SCALER_ARTIFACT), b"not a scaler").unwrap();

        let restored = FailureClassifier::load(config);
        assert!(!restored.is_trained());
    }

    #[test]
    fn test_persist_untrained_is_an_error() {
        let dir = TempDir::new().unwrap();
        let classifier = FailureClassifier::new(test_config(&dir));
        assert!(matches!(classifier.persist().unwrap_err(), AppError::NotTrained));
    }

    #[test]
    fn test_zero_tree_config_rejected_before_training() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.n_trees = 0;

        let mut classifier = FailureClassifier::new(config);
        let (features, labels) = separable_dataset(5);

        let err = classifier.fit(&features, &labels).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
        // Never reaches Trained, so predict keeps signaling NotTrained
        assert!(!classifier.is_trained());
        assert!(matches!(
            classifier.predict(&[0.0; N_FEATURES]).unwrap_err(),
            AppError::NotTrained
        ));
    }

    #[test]
    fn test_single_class_dataset_still_fits() {
        let dir = TempDir::new().unwrap();
        let mut classifier = FailureClassifier::new(test_config(&dir));

        let mut matrix = Array2::zeros((10, N_FEATURES));
        for i in 0..10 {
            for j in 0..N_FEATURES {
                matrix[[i, j]] = (i * j) as f64;
            }
        }
        let labels = vec![0; 10];

        let accuracy = classifier.fit(&matrix, &labels).unwrap();
        assert_eq!(accuracy, 1.0);

        let (p, _) = classifier.predict(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(p, 0.0);
    }
}
