use std::sync::Arc;

use anyhow::Result;
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::core::config::Settings;
use crate::tasks::maintenance;

/// Runs the maintenance loops until a shutdown signal arrives.
pub(crate) async fn run(settings: Settings, db: PgPool) -> Result<()> {
    let settings = Arc::new(settings);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handles = vec![tokio::spawn(abandon_expired_loop(settings, db, shutdown_rx.clone()))];

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

async fn abandon_expired_loop(
    settings: Arc<Settings>,
    db: PgPool,
    mut shutdown: watch::Receiver<bool>,
) {
    let period = Duration::from_secs(settings.attempts().abandon_sweep_interval_seconds.max(1));
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = maintenance::abandon_expired_attempts(&db, &settings).await {
                    tracing::error!(error = %err, "abandon_expired_attempts failed");
                }
            }
        }
    }
}
