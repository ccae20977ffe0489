use sqlx::PgPool;

use crate::core::time::primitive_now_utc;
use crate::repositories;

/// Rolls a finalized attempt into the exercise aggregates.
///
/// The three writes are independent statements. Concurrent finalizations of the same
/// exercise may interleave between them; each average is a full recomputation over
/// completed attempts, so the rollup converges once the last writer finishes.
pub(crate) async fn record_completion(pool: &PgPool, exercise_id: &str) -> Result<(), sqlx::Error> {
    repositories::exercises::increment_total_attempts(pool, exercise_id, primitive_now_utc())
        .await?;
    repositories::exercises::refresh_average_score(pool, exercise_id).await?;
    repositories::exercises::refresh_average_completion_time(pool, exercise_id).await?;
    Ok(())
}
