pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::core::{config::Settings, redis::RedisHandle, state::AppState, telemetry};
use crate::services::completion_dispatch::{CompletionDispatcher, HttpCollaborators};

const DISPATCH_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

async fn build_state(
    settings: Settings,
) -> anyhow::Result<(AppState, RedisHandle, JoinHandle<()>)> {
    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let redis = RedisHandle::new(settings.redis().redis_url());
    if let Err(err) = redis.connect().await {
        tracing::error!(
            error = %err,
            "Failed to connect to Redis; continuing without rate limiting"
        );
    } else {
        tracing::info!("Redis connected successfully");
    }

    settings.require_dispatch_targets()?;
    let collaborators = Arc::new(HttpCollaborators::from_settings(settings.dispatch())?);
    let (dispatcher, dispatch_worker) =
        CompletionDispatcher::start(settings.dispatch(), collaborators);

    let state = AppState::new(settings, db_pool, redis.clone(), dispatcher);
    Ok((state, redis, dispatch_worker))
}

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let (state, redis, dispatch_worker) = build_state(settings).await?;
    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "LearnHub grading API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    // The worker drains once the last dispatcher handle is gone.
    drop(state);
    if tokio::time::timeout(DISPATCH_DRAIN_TIMEOUT, dispatch_worker).await.is_err() {
        tracing::warn!("Completion dispatch did not drain before shutdown");
    }

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}

pub async fn run_worker() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    tracing::info!(
        environment = %settings.runtime().environment.as_str(),
        "LearnHub maintenance worker started"
    );

    tasks::scheduler::run(settings, db_pool).await
}
