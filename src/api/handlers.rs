use crate::api::AppState;
use crate::error::Result;
use crate::models::{
    LegacyPrediction, ModelStatus, PredictionResult, TelemetrySnapshot, TrainingDataset,
    TrainingOutcome,
};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

/// Health check endpoint
pub async fn health_check() -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Score a telemetry snapshot
pub async fn predict(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictionResult>> {
    let snapshot = TelemetrySnapshot {
        machine_id: request.machine_id,
        metrics: request.metrics,
    };

    let result = state.engine.score(&snapshot).await?;
    Ok(Json(result))
}

/// Score a telemetry snapshot, returning the stripped legacy response
pub async fn predict_legacy(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<LegacyPrediction>> {
    let snapshot = TelemetrySnapshot {
        machine_id: request.machine_id,
        metrics: request.metrics,
    };

    let result = state.engine.score(&snapshot).await?;
    Ok(Json(result.into_legacy()))
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub machine_id: i64,
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
}

/// Retrain the failure classifier on a labeled dataset
pub async fn train_model(
    State(state): State<AppState>,
    Json(request): Json<TrainRequest>,
) -> Result<Json<TrainingOutcome>> {
    request.validate()?;

    let dataset = TrainingDataset {
        features: request.features,
        labels: request.labels,
    };

    let outcome = state.engine.train(&dataset).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize, Validate)]
pub struct TrainRequest {
    #[validate(length(min = 1))]
    pub features: Vec<HashMap<String, f64>>,
    #[validate(length(min = 1))]
    pub labels: Vec<i32>,
}

/// Model-status introspection
pub async fn model_status(State(state): State<AppState>) -> Result<Json<ModelStatus>> {
    Ok(Json(state.engine.status().await))
}
