use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    middleware::RequestId,
    models::{ModelInfo, RecommendationRequest, RecommendationSet},
};

use super::AppState;

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Describes the loaded model
pub async fn model_info(State(state): State<AppState>) -> Json<ModelInfo> {
    Json(state.recommendations.model_info())
}

/// Recommends repositories for the supplied interaction history
pub async fn recommend(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<RecommendationRequest>, JsonRejection>,
) -> AppResult<Json<RecommendationSet>> {
    let Json(request) = payload?;
    let count = state.limits.resolve(request.count);

    tracing::info!(
        request_id = %request_id,
        repositories = request.repositories.len(),
        count,
        "Processing recommendation request"
    );

    let set = state
        .recommendations
        .recommend(request.repositories, count)
        .await?;

    tracing::info!(
        request_id = %request_id,
        resolved = set.resolved,
        unresolved = set.unresolved.len(),
        returned = set.recommendations.len(),
        "Recommendations completed"
    );

    Ok(Json(set))
}
