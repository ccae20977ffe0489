mod commands;
mod queries;
mod types;

pub(crate) use commands::{
    abandon, abandon_expired, acquire_attempt_lock, complete, create, lock_for_update,
    next_attempt_number, refresh_progress,
};
pub(crate) use queries::{count_by_user, find_for_user, list_by_user};
pub(crate) use types::{AttemptListFilter, CompletionUpdate, CreateAttempt};
