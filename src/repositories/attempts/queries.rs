use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::db::models::Attempt;

use super::types::{AttemptListFilter, COLUMNS};

/// Attempts are private to their owner; another user's id behaves like a missing row.
pub(crate) async fn find_for_user(
    pool: &PgPool,
    id: &str,
    user_id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM exercise_attempts WHERE id = $1 AND user_id = $2"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_by_user(
    pool: &PgPool,
    user_id: &str,
    filter: &AttemptListFilter,
    skip: i64,
    limit: i64,
) -> Result<Vec<Attempt>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {COLUMNS} FROM exercise_attempts WHERE user_id = "
    ));
    builder.push_bind(user_id);
    push_filter(&mut builder, filter);

    builder.push(" ORDER BY created_at DESC, attempt_number DESC OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder.build_query_as::<Attempt>().fetch_all(pool).await
}

pub(crate) async fn count_by_user(
    pool: &PgPool,
    user_id: &str,
    filter: &AttemptListFilter,
) -> Result<i64, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM exercise_attempts WHERE user_id = ");
    builder.push_bind(user_id);
    push_filter(&mut builder, filter);

    builder.build_query_scalar::<i64>().fetch_one(pool).await
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &AttemptListFilter) {
    if let Some(exercise_id) = &filter.exercise_id {
        builder.push(" AND exercise_id = ");
        builder.push_bind(exercise_id.clone());
    }

    if let Some(status) = filter.status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }
}
