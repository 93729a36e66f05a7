use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A recommended repository and its predicted preference score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub repository: String,
    pub score: f64,
}

/// Ranked recommendations together with how the caller's feedback resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSet {
    /// Best first
    pub recommendations: Vec<Recommendation>,
    /// Number of distinct supplied repositories found in the catalog
    pub resolved: usize,
    /// Supplied repositories the catalog does not contain
    pub unresolved: Vec<String>,
}

/// Request body for the recommendations endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationRequest {
    /// Repositories the user has starred or otherwise interacted with
    pub repositories: Vec<String>,
    /// Number of recommendations wanted; the server default applies when absent
    #[serde(default)]
    pub count: Option<usize>,
}

/// Description of the loaded factor model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub items: usize,
    pub dimension: usize,
    pub confidence: f64,
    pub regularization: f64,
    pub loaded_at: DateTime<Utc>,
}
