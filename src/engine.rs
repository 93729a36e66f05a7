use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{FeedbackSet, ModelInfo, Recommendation, RecommendationSet};
use crate::ranker::{self, ScoredItem};
use crate::solver::{ImplicitSolver, ModelParams, SolveError};
use crate::store::FactorStore;

/// Per-request failures; none of them affect the shared store
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecommendError {
    #[error("none of the supplied repositories are known to the model")]
    NoUsableFeedback,

    #[error("item index {index} is out of range for a catalog of {size} items")]
    IndexOutOfRange { index: usize, size: usize },

    #[error(transparent)]
    Solve(#[from] SolveError),
}

/// Recommendation pipeline: resolve, solve, rank.
///
/// Cheap to clone; all clones share one read-only [`FactorStore`].
#[derive(Debug, Clone)]
pub struct Recommender {
    store: Arc<FactorStore>,
    solver: ImplicitSolver,
    loaded_at: DateTime<Utc>,
}

impl Recommender {
    pub fn new(store: Arc<FactorStore>, params: ModelParams) -> Self {
        Self {
            store,
            solver: ImplicitSolver::new(params),
            loaded_at: Utc::now(),
        }
    }

    pub fn store(&self) -> &FactorStore {
        &self.store
    }

    /// Catalog indices of the known identifiers; unknown ones are dropped.
    pub fn resolve<S: AsRef<str>>(&self, identifiers: &[S]) -> FeedbackSet {
        self.store.resolve(identifiers).feedback
    }

    /// Recommends up to `n` repositories the caller has not interacted with.
    ///
    /// `n == 0` yields an empty list whatever the feedback. Otherwise, if no
    /// supplied identifier is in the catalog (including when none were
    /// supplied) the call fails with [`RecommendError::NoUsableFeedback`].
    pub fn recommend<S: AsRef<str>>(
        &self,
        identifiers: &[S],
        n: usize,
    ) -> Result<Vec<Recommendation>, RecommendError> {
        self.recommend_with_resolution(identifiers, n)
            .map(|set| set.recommendations)
    }

    /// Like [`Recommender::recommend`], also reporting how the identifiers resolved.
    pub fn recommend_with_resolution<S: AsRef<str>>(
        &self,
        identifiers: &[S],
        n: usize,
    ) -> Result<RecommendationSet, RecommendError> {
        let resolution = self.store.resolve(identifiers);

        tracing::debug!(
            supplied = identifiers.len(),
            resolved = resolution.feedback.len(),
            unresolved = resolution.unresolved.len(),
            n,
            "Resolved feedback"
        );

        let scored = self.recommend_indices(&resolution.feedback, n)?;
        let recommendations = scored
            .into_iter()
            .map(|item| Recommendation {
                repository: self.store.identifier(item.index).to_string(),
                score: item.score,
            })
            .collect();

        Ok(RecommendationSet {
            recommendations,
            resolved: resolution.feedback.len(),
            unresolved: resolution.unresolved,
        })
    }

    /// Runs solve and rank on an already resolved feedback set.
    pub fn recommend_indices(
        &self,
        feedback: &FeedbackSet,
        n: usize,
    ) -> Result<Vec<ScoredItem>, RecommendError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        if feedback.is_empty() {
            return Err(RecommendError::NoUsableFeedback);
        }
        if let Some(index) = feedback.max_index().filter(|&i| i >= self.store.size()) {
            return Err(RecommendError::IndexOutOfRange {
                index,
                size: self.store.size(),
            });
        }

        let preference = self.solver.solve(&self.store, feedback)?;
        Ok(ranker::top_n(&self.store, &preference, feedback, n))
    }

    pub fn model_info(&self) -> ModelInfo {
        let params = self.solver.params();
        ModelInfo {
            items: self.store.size(),
            dimension: self.store.dimension(),
            confidence: params.confidence(),
            regularization: params.regularization(),
            loaded_at: self.loaded_at,
        }
    }
}
