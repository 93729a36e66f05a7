//! Repository recommendations from an offline-trained latent factor model.
//!
//! A [`store::FactorStore`] is loaded once at startup. Per request, the
//! [`engine::Recommender`] resolves the caller's starred repositories to
//! catalog indices, solves for a preference vector with the
//! [`solver::ImplicitSolver`] and picks the best unseen items with
//! [`ranker::top_n`]. The [`api`] module serves this over HTTP.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
mod kernels;
pub mod middleware;
pub mod models;
pub mod ranker;
pub mod services;
pub mod solver;
pub mod store;
pub mod telemetry;
