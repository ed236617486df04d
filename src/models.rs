use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{AppError, Result};

/// A per-machine telemetry snapshot submitted for scoring. Transient, never
/// persisted. Metric keys beyond the recognized feature columns are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySnapshot {
    /// Machine identifier
    pub machine_id: i64,

    /// Raw metric readings keyed by metric name
    pub metrics: HashMap<String, f64>,
}

/// Coarse categorical bucket derived from the failure risk score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Normal,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Map a failure risk score to its level. Total over [0, 1].
    pub fn from_risk(risk: f64) -> Self {
        if risk >= 0.8 {
            RiskLevel::Critical
        } else if risk >= 0.6 {
            RiskLevel::High
        } else if risk >= 0.4 {
            RiskLevel::Medium
        } else if risk >= 0.2 {
            RiskLevel::Low
        } else {
            RiskLevel::Normal
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Normal => write!(f, "normal"),
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Per-metric risk contributions. Always fully populated regardless of which
/// scoring path produced the headline risk; diagnostic only in classifier
/// mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskFactors {
    pub vibration: f64,
    pub oil_level: f64,
    pub temperature: f64,
    pub pressure: f64,
    pub rpm: f64,
}

impl RiskFactors {
    /// Aggregate heuristic risk: arithmetic mean of the five factors,
    /// clamped to 1.0.
    pub fn aggregate(&self) -> f64 {
        let mean =
            (self.vibration + self.oil_level + self.temperature + self.pressure + self.rpm) / 5.0;
        mean.min(1.0)
    }
}

/// Full scoring response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub machine_id: i64,

    /// Probability-like failure risk in [0, 1], rounded to 3 decimals
    pub failure_risk: f64,

    pub risk_level: RiskLevel,

    /// How decisive the scoring path is about its own output, rounded to
    /// 3 decimals
    pub confidence: f64,

    pub factors: RiskFactors,
}

impl PredictionResult {
    /// Derive the legacy-compatibility variant without re-scoring
    pub fn into_legacy(self) -> LegacyPrediction {
        LegacyPrediction {
            machine_id: self.machine_id,
            failure_risk: self.failure_risk,
        }
    }
}

/// Stripped-down response retained for legacy consumers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyPrediction {
    pub machine_id: i64,
    pub failure_risk: f64,
}

/// Labeled dataset for classifier training
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingDataset {
    /// Per-sample metric mappings. During training every feature column must
    /// be present; missing names are rejected, not defaulted.
    pub features: Vec<HashMap<String, f64>>,

    /// Binary failure labels, parallel to `features`
    pub labels: Vec<i32>,
}

impl TrainingDataset {
    /// Reject malformed datasets before any classifier state is touched.
    pub fn validate(&self) -> Result<()> {
        if self.features.is_empty() {
            return Err(AppError::Validation("training dataset is empty".to_string()));
        }
        if self.features.len() != self.labels.len() {
            return Err(AppError::Validation(format!(
                "features/labels length mismatch: {} != {}",
                self.features.len(),
                self.labels.len()
            )));
        }
        if let Some(label) = self.labels.iter().find(|l| **l != 0 && **l != 1) {
            return Err(AppError::Validation(format!(
                "labels must be 0 or 1, got {}",
                label
            )));
        }
        Ok(())
    }
}

/// Result of a completed training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingOutcome {
    /// In-sample accuracy of the just-fitted model
    pub accuracy: f64,

    /// Number of samples consumed
    pub samples: usize,
}

/// Model-status introspection result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub model_loaded: bool,
    pub feature_columns: Vec<String>,
    pub ensemble_size: Option<usize>,
    pub max_depth: Option<usize>,
}

/// Round a score to 3 decimal places for response payloads
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
