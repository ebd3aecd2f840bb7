mod handlers;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use arbiter_common::config::EngineConfig;
use arbiter_engine::Judge;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

const DEFAULT_ADDR: &str = "0.0.0.0:3000";

pub struct AppState {
    pub judge: Judge,
    pub config: EngineConfig,
    /// One permit per judge call allowed to run at the same time
    pub gate: Arc<Semaphore>,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("ARBITER_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn max_concurrent_judges() -> Result<usize> {
    match std::env::var("ARBITER_MAX_CONCURRENT_JUDGES") {
        Ok(value) => {
            let slots: usize = value
                .parse()
                .with_context(|| format!("Invalid ARBITER_MAX_CONCURRENT_JUDGES: {}", value))?;
            anyhow::ensure!(slots > 0, "ARBITER_MAX_CONCURRENT_JUDGES must be positive");
            Ok(slots)
        }
        Err(_) => Ok(std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Arbiter API booting...");

    let config = EngineConfig::load_default().context("Failed to load engine configuration")?;
    info!(
        languages = ?config.enabled_languages(),
        comparison = ?config.comparison,
        "Loaded engine configuration"
    );

    let slots = max_concurrent_judges()?;
    let state = Arc::new(AppState {
        judge: Judge::from_config(&config),
        config,
        gate: Arc::new(Semaphore::new(slots)),
    });

    let app = Router::new().merge(routes::routes()).with_state(state);

    let addr = std::env::var("ARBITER_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(addr = %addr, max_concurrent_judges = slots, "HTTP server listening");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
