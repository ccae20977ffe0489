use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::core::config::Settings;
use crate::core::time::primitive_now_utc as now_primitive;
use crate::repositories;

/// Marks in-progress attempts abandoned once their time limit plus the grace period has passed.
pub(crate) async fn abandon_expired_attempts(db: &PgPool, settings: &Settings) -> Result<usize> {
    let grace_seconds = i64::try_from(settings.attempts().abandon_grace_seconds)
        .context("ABANDON_GRACE_SECONDS is out of range")?;

    let abandoned =
        repositories::attempts::abandon_expired(db, now_primitive(), grace_seconds)
            .await
            .context("Failed to abandon expired attempts")?;

    if !abandoned.is_empty() {
        tracing::info!(abandoned_attempts = abandoned.len(), "Abandoned expired attempts");
        metrics::counter!("attempts_abandoned_total", "reason" => "expired")
            .increment(abandoned.len() as u64);
    }

    Ok(abandoned.len())
}
