pub mod recommendations;

pub use recommendations::{EngineService, RecommendationService};
