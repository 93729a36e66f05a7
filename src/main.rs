use std::sync::Arc;

use anyhow::Context;
use repo_recs::{
    api::{create_router, AppState},
    config::Config,
    engine::Recommender,
    services::EngineService,
    store::FactorStore,
    telemetry,
};
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    telemetry::init();

    let params = config.model_params()?;
    let limits = config.count_limits()?;

    // The service must not start with a partial model
    let (factors_path, items_path) = (config.factors_path(), config.items_path());
    let store = tokio::task::spawn_blocking(move || FactorStore::load_files(factors_path, items_path))
        .await
        .context("model loading task panicked")?
        .context("failed to load item factor model")?;

    let recommender = Recommender::new(Arc::new(store), params);
    let state = AppState::new(Arc::new(EngineService::new(recommender)), limits);
    let app = create_router(state);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    tracing::info!(address = %address, "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
