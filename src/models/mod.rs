mod feedback;
mod recommendation;

pub use feedback::{FeedbackSet, Resolution};
pub use recommendation::{ModelInfo, Recommendation, RecommendationRequest, RecommendationSet};
