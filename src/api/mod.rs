pub mod handlers;
pub mod routes;

pub use routes::*;

use crate::ml::RiskScoringService;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RiskScoringService>,
}

impl AppState {
    pub fn new(engine: Arc<RiskScoringService>) -> Self {
        Self { engine }
    }
}
