use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::ModelConfig;
use crate::error::Result;
use crate::ml::classifier::FailureClassifier;
use crate::ml::{features, rules};
use crate::models::{
    round3, ModelStatus, PredictionResult, RiskLevel, TelemetrySnapshot, TrainingDataset,
    TrainingOutcome,
};

/// Confidence reported on the heuristic path. The rule-based score is not
/// probabilistic, so this stays a fixed constant rather than an estimate.
const HEURISTIC_CONFIDENCE: f64 = 0.5;

/// Risk-scoring orchestrator.
///
/// Owns the classifier state behind a single writer lock: `train` holds the
/// write lock across its fit-then-persist critical section, while concurrent
/// `score` calls read a stable snapshot. Both scoring paths are normalized
/// into one response shape; callers only see which mode served them through
/// the confidence value or the status endpoint.
pub struct RiskScoringService {
    classifier: Arc<RwLock<FailureClassifier>>,
}

impl RiskScoringService {
    /// Create a service with an untrained classifier
    pub fn new(config: ModelConfig) -> Self {
        Self {
            classifier: Arc::new(RwLock::new(FailureClassifier::new(config))),
        }
    }

    /// Create a service, restoring persisted classifier state when the
    /// artifacts are usable. Never fails; a bad artifact pair just means
    /// starting untrained.
    pub fn with_restored_state(config: ModelConfig) -> Self {
        Self {
            classifier: Arc::new(RwLock::new(FailureClassifier::load(config))),
        }
    }

    /// Score a telemetry snapshot.
    ///
    /// Risk factors are computed unconditionally. The headline risk comes
    /// from the trained classifier when one exists, otherwise from the
    /// rule-based aggregate with the fixed heuristic confidence.
    pub async fn score(&self, snapshot: &TelemetrySnapshot) -> Result<PredictionResult> {
        let factors = rules::calculate_risk_factors(&snapshot.metrics);

        let classifier = self.classifier.read().await;
        let (failure_risk, confidence) = if classifier.is_trained() {
            let vector = features::extract(&snapshot.metrics);
            classifier.predict(&vector)?
        } else {
            debug!(machine_id = snapshot.machine_id, "No trained model, using rule-based score");
            (factors.aggregate(), HEURISTIC_CONFIDENCE)
        };
        drop(classifier);

        let risk_level = RiskLevel::from_risk(failure_risk);

        Ok(PredictionResult {
            machine_id: snapshot.machine_id,
            failure_risk: round3(failure_risk),
            risk_level,
            confidence: round3(confidence),
            factors,
        })
    }

    /// Retrain the classifier on a labeled dataset and persist the result.
    ///
    /// Validation happens before any classifier state is touched. Persistence
    /// failures surface to the caller after the fit: the in-memory model is
    /// still usable, but durable storage has diverged and the caller needs to
    /// know it was persistence, not training, that failed.
    pub async fn train(&self, dataset: &TrainingDataset) -> Result<TrainingOutcome> {
        dataset.validate()?;
        let matrix = features::training_matrix(&dataset.features)?;

        let mut classifier = self.classifier.write().await;
        let accuracy = classifier.fit(&matrix, &dataset.labels)?;

        info!(
            samples = dataset.labels.len(),
            accuracy = round3(accuracy),
            "Classifier retrained"
        );

        classifier.persist()?;

        Ok(TrainingOutcome {
            accuracy,
            samples: dataset.labels.len(),
        })
    }

    /// Model-status introspection. Idempotent between training runs.
    pub async fn status(&self) -> ModelStatus {
        let classifier = self.classifier.read().await;
        let trained = classifier.is_trained();

        ModelStatus {
            model_loaded: trained,
            feature_columns: features::FEATURE_COLUMNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ensemble_size: classifier.ensemble_size(),
            max_depth: trained.then(|| classifier.config().max_depth as usize),
        }
    }
}
