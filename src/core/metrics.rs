use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    describe();
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    metrics::describe_counter!("attempts_started_total", "Exercise attempts created");
    metrics::describe_counter!("attempts_completed_total", "Exercise attempts finalized");
    metrics::describe_counter!("attempts_abandoned_total", "Exercise attempts abandoned");
    metrics::describe_counter!("answers_graded_total", "Answers graded, labelled by result");
    metrics::describe_counter!(
        "completion_dispatch_total",
        "Collaborator calls made for completed attempts, by call and outcome"
    );
    metrics::describe_counter!(
        "completion_dispatch_dropped_total",
        "Completion events dropped because the dispatch queue was full or closed"
    );
}
