/// Risk-scoring engine for machine telemetry
///
/// This module holds the scoring core:
/// - Fixed-order feature extraction and scaling from raw metric mappings
/// - Rule-based risk factor assessment with threshold step functions
/// - A trainable failure classifier (bagged decision-tree ensemble)
/// - The orchestrator that normalizes both scoring paths into one response
/// - Training and artifact persistence lifecycle

pub mod classifier;
pub mod features;
pub mod rules;
pub mod service;

pub use classifier::FailureClassifier;
pub use features::{StandardScaler, FEATURE_COLUMNS, N_FEATURES};
pub use rules::calculate_risk_factors;
pub use service::RiskScoringService;
