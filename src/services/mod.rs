pub(crate) mod attempts;
pub(crate) mod completion_dispatch;
pub(crate) mod exercise_stats;
pub(crate) mod grading;
pub(crate) mod scoring;
