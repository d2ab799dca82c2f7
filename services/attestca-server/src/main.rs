use anyhow::Context;
use attestca_core::{logging, Config};
use axum::{
    extract::DefaultBodyLimit,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tracing::{error, info};

mod config;
mod handlers;
mod seed;
mod state;

use config::Options;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = Options::from_env();
    if options.json_logs {
        logging::init_json();
    } else {
        logging::init();
    }

    let config = Config::from_file(&options.config_path)
        .with_context(|| format!("loading {}", options.config_path.display()))?;
    let state = Arc::new(AppState::from_config(&config)?);

    spawn_sweeper(
        state.clone(),
        Duration::from_secs(config.authority.sweep_interval_secs.max(1)),
    );

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    info!("Attestation CA listening on {}", config.server.bind_address);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    let limit = state.max_body_bytes;
    Router::new()
        .route("/health", get(health_check))
        .route("/identity-claim-tpm2/process", post(handlers::identity_claim))
        .route("/request-certificate-tpm2", post(handlers::certificate_request))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(DefaultBodyLimit::max(limit)))
}

fn spawn_sweeper(state: Arc<AppState>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let authority = state.authority.clone();
            match tokio::task::spawn_blocking(move || authority.sweep_expired_challenges()).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => error!(error = %e, "Challenge sweep failed"),
                Err(e) => error!(error = %e, "Challenge sweep task panicked"),
            }
        }
    });
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "attestca-server",
        "timestamp": Utc::now().to_rfc3339()
    }))
}
