use std::sync::Arc;

use crate::config::CountLimits;
use crate::services::RecommendationService;

/// Shared application state
///
/// Everything in here is read-only after startup, so cloning the state per
/// request only bumps reference counts.
#[derive(Clone)]
pub struct AppState {
    pub recommendations: Arc<dyn RecommendationService>,
    pub limits: CountLimits,
}

impl AppState {
    pub fn new(recommendations: Arc<dyn RecommendationService>, limits: CountLimits) -> Self {
        Self {
            recommendations,
            limits,
        }
    }
}
