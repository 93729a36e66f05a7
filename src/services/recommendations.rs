use crate::{
    engine::Recommender,
    error::{AppError, AppResult},
    models::{ModelInfo, RecommendationSet},
};

/// Recommendation backend used by the HTTP handlers
///
/// Handlers only see this trait, so they can be exercised against a mock
/// without loading a model.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecommendationService: Send + Sync {
    /// Recommends up to `count` repositories for someone who interacted with
    /// `repositories`.
    async fn recommend(
        &self,
        repositories: Vec<String>,
        count: usize,
    ) -> AppResult<RecommendationSet>;

    /// Describes the model backing this service
    fn model_info(&self) -> ModelInfo;
}

/// [`RecommendationService`] backed by an in-process [`Recommender`]
///
/// Solving and ranking are CPU-bound, so each request runs on tokio's
/// blocking pool rather than on an async worker.
#[derive(Clone)]
pub struct EngineService {
    recommender: Recommender,
}

impl EngineService {
    pub fn new(recommender: Recommender) -> Self {
        Self { recommender }
    }
}

#[async_trait::async_trait]
impl RecommendationService for EngineService {
    async fn recommend(
        &self,
        repositories: Vec<String>,
        count: usize,
    ) -> AppResult<RecommendationSet> {
        let recommender = self.recommender.clone();
        let set = tokio::task::spawn_blocking(move || {
            recommender.recommend_with_resolution(repositories.as_slice(), count)
        })
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

        Ok(set)
    }

    fn model_info(&self) -> ModelInfo {
        self.recommender.model_info()
    }
}
