use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};

use crate::core::config::DispatchSettings;
use crate::db::types::SkillType;

const INTERNAL_API_KEY_HEADER: &str = "X-Internal-Api-Key";

/// Outcome of a finalized attempt, as propagated to other subsystems.
#[derive(Debug, Clone)]
pub(crate) struct CompletionEvent {
    pub(crate) attempt_id: String,
    pub(crate) user_id: String,
    pub(crate) exercise_id: String,
    pub(crate) exercise_title: String,
    pub(crate) skill: SkillType,
    /// Percentage reported to collaborators.
    pub(crate) score: f64,
    /// Points earned; a zero here skips the skill statistics call.
    pub(crate) points_earned: f64,
    pub(crate) band_score: f64,
    pub(crate) time_spent_seconds: i32,
}

impl CompletionEvent {
    pub(crate) fn time_spent_minutes(&self) -> i32 {
        self.time_spent_seconds.max(0) / 60
    }
}

#[async_trait]
pub(crate) trait CompletionCollaborators: Send + Sync {
    async fn update_skill_statistics(&self, event: &CompletionEvent) -> Result<()>;
    async fn update_progress(&self, event: &CompletionEvent) -> Result<()>;
    async fn send_result_notification(&self, event: &CompletionEvent) -> Result<()>;
}

/// Returned by collaborators whose endpoint is not configured. Never retried.
#[derive(Debug, thiserror::Error)]
#[error("{0} is not configured")]
pub(crate) struct NotConfigured(pub(crate) &'static str);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchCall {
    SkillStatistics,
    Progress,
    Notification,
}

impl DispatchCall {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::SkillStatistics => "skill_statistics",
            Self::Progress => "progress",
            Self::Notification => "notification",
        }
    }
}

#[derive(Debug)]
pub(crate) enum CallOutcome {
    Succeeded { attempts: u32 },
    Skipped,
    NotConfigured,
    GaveUp { attempts: u32, error: anyhow::Error },
}

impl CallOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "succeeded",
            Self::Skipped => "skipped",
            Self::NotConfigured => "not_configured",
            Self::GaveUp { .. } => "gave_up",
        }
    }
}

#[derive(Debug)]
pub(crate) struct DispatchReport {
    pub(crate) skill_statistics: CallOutcome,
    pub(crate) progress: CallOutcome,
    pub(crate) notification: CallOutcome,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub(crate) max_attempts: u32,
    pub(crate) initial_backoff: Duration,
}

impl RetryPolicy {
    pub(crate) fn from_settings(settings: &DispatchSettings) -> Self {
        Self { max_attempts: settings.max_attempts.max(1), initial_backoff: settings.initial_backoff() }
    }

    /// Delay after the failed attempt number `attempt` (1-based): base, 2x base, 4x base...
    fn backoff_after(&self, attempt: u32) -> Duration {
        self.initial_backoff.saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Runs `operation` until it succeeds or `policy.max_attempts` is reached.
/// Returns the number of attempts made alongside the result.
pub(crate) async fn retry_with_backoff<F, Fut, T>(
    policy: RetryPolicy,
    mut operation: F,
) -> (u32, Result<T>)
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return (attempt, Ok(value)),
            Err(err) if err.downcast_ref::<NotConfigured>().is_some() => {
                return (attempt, Err(err));
            }
            Err(err) if attempt >= policy.max_attempts => return (attempt, Err(err)),
            Err(err) => {
                let delay = policy.backoff_after(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "Retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Handle used by request handlers to hand completion events to the background worker.
#[derive(Clone)]
pub(crate) struct CompletionDispatcher {
    sender: mpsc::Sender<CompletionEvent>,
}

impl CompletionDispatcher {
    /// Spawns the dispatch worker. It exits once every dispatcher handle is dropped
    /// and in-flight jobs have finished.
    pub(crate) fn start(
        settings: &DispatchSettings,
        collaborators: Arc<dyn CompletionCollaborators>,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        let worker = DispatchWorker {
            receiver,
            collaborators,
            policy: RetryPolicy::from_settings(settings),
            permits: Arc::new(Semaphore::new(settings.concurrency.max(1))),
        };
        let handle = tokio::spawn(worker.run());
        (Self { sender }, handle)
    }

    pub(crate) fn queue_headroom(&self) -> usize {
        self.sender.capacity()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Never waits: a full or closed queue drops the event.
    pub(crate) fn enqueue(&self, event: CompletionEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(
                    attempt_id = %event.attempt_id,
                    user_id = %event.user_id,
                    "Completion dispatch queue full; dropping event"
                );
                metrics::counter!("completion_dispatch_dropped_total").increment(1);
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::error!(
                    attempt_id = %event.attempt_id,
                    user_id = %event.user_id,
                    "Completion dispatch worker stopped; dropping event"
                );
                metrics::counter!("completion_dispatch_dropped_total").increment(1);
                false
            }
        }
    }
}

struct DispatchWorker {
    receiver: mpsc::Receiver<CompletionEvent>,
    collaborators: Arc<dyn CompletionCollaborators>,
    policy: RetryPolicy,
    permits: Arc<Semaphore>,
}

impl DispatchWorker {
    async fn run(mut self) {
        tracing::info!("Completion dispatch worker started");
        let mut jobs = JoinSet::new();

        loop {
            tokio::select! {
                received = self.receiver.recv() => {
                    let Some(event) = received else { break };
                    let Ok(permit) = self.permits.clone().acquire_owned().await else { break };
                    let collaborators = self.collaborators.clone();
                    let policy = self.policy;
                    jobs.spawn(async move {
                        let _permit = permit;
                        dispatch(collaborators.as_ref(), policy, &event).await;
                    });
                }
                Some(joined) = jobs.join_next(), if !jobs.is_empty() => log_join(joined),
            }
        }

        while let Some(joined) = jobs.join_next().await {
            log_join(joined);
        }
        tracing::info!("Completion dispatch worker stopped");
    }
}

fn log_join(joined: Result<(), JoinError>) {
    match joined {
        Ok(()) => {}
        Err(err) if err.is_panic() => {
            tracing::error!(error = %err, "Completion dispatch job panicked");
        }
        Err(err) => tracing::warn!(error = %err, "Completion dispatch job cancelled"),
    }
}

/// Runs the three collaborator calls for one event in order, each with its own retries.
pub(crate) async fn dispatch(
    collaborators: &dyn CompletionCollaborators,
    policy: RetryPolicy,
    event: &CompletionEvent,
) -> DispatchReport {
    let skill_statistics = if event.points_earned == 0.0 {
        CallOutcome::Skipped
    } else {
        run_call(policy, event, DispatchCall::SkillStatistics, || {
            collaborators.update_skill_statistics(event)
        })
        .await
    };
    record(event, DispatchCall::SkillStatistics, &skill_statistics);

    let progress =
        run_call(policy, event, DispatchCall::Progress, || collaborators.update_progress(event))
            .await;
    record(event, DispatchCall::Progress, &progress);

    let notification = run_call(policy, event, DispatchCall::Notification, || {
        collaborators.send_result_notification(event)
    })
    .await;
    record(event, DispatchCall::Notification, &notification);

    DispatchReport { skill_statistics, progress, notification }
}

async fn run_call<F, Fut>(
    policy: RetryPolicy,
    event: &CompletionEvent,
    call: DispatchCall,
    mut operation: F,
) -> CallOutcome
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let (attempts, result) = retry_with_backoff(policy, |attempt| {
        tracing::debug!(attempt_id = %event.attempt_id, call = call.as_str(), attempt, "Dispatching");
        operation()
    })
    .await;

    match result {
        Ok(()) => CallOutcome::Succeeded { attempts },
        Err(err) if err.downcast_ref::<NotConfigured>().is_some() => CallOutcome::NotConfigured,
        Err(error) => CallOutcome::GaveUp { attempts, error },
    }
}

fn record(event: &CompletionEvent, call: DispatchCall, outcome: &CallOutcome) {
    metrics::counter!(
        "completion_dispatch_total",
        "call" => call.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);

    match outcome {
        CallOutcome::Succeeded { attempts } => tracing::info!(
            attempt_id = %event.attempt_id,
            user_id = %event.user_id,
            call = call.as_str(),
            attempts,
            "Completion call succeeded"
        ),
        CallOutcome::Skipped => tracing::debug!(
            attempt_id = %event.attempt_id,
            user_id = %event.user_id,
            call = call.as_str(),
            "Completion call skipped for zero score"
        ),
        CallOutcome::NotConfigured => tracing::warn!(
            attempt_id = %event.attempt_id,
            user_id = %event.user_id,
            call = call.as_str(),
            "Completion call target not configured"
        ),
        CallOutcome::GaveUp { attempts, error } => tracing::error!(
            attempt_id = %event.attempt_id,
            user_id = %event.user_id,
            call = call.as_str(),
            attempts,
            error = %error,
            "Completion call failed after retries"
        ),
    }
}

/// Talks to the user and notification services over their internal HTTP APIs.
#[derive(Debug, Clone)]
pub(crate) struct HttpCollaborators {
    client: Client,
    user_service_url: String,
    notification_service_url: String,
    internal_api_key: String,
}

impl HttpCollaborators {
    pub(crate) fn from_settings(settings: &DispatchSettings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5).min(settings.request_timeout()))
            .timeout(settings.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            user_service_url: settings.user_service_url.trim_end_matches('/').to_string(),
            notification_service_url: settings
                .notification_service_url
                .trim_end_matches('/')
                .to_string(),
            internal_api_key: settings.internal_api_key.clone(),
        })
    }

    async fn post(&self, url: String, payload: serde_json::Value) -> Result<()> {
        let mut request = self.client.post(&url).json(&payload);
        if !self.internal_api_key.is_empty() {
            request = request.header(INTERNAL_API_KEY_HEADER, &self.internal_api_key);
        }

        let response = request.send().await.with_context(|| format!("POST {url} failed"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("POST {url} returned {status}: {body}");
        }
        Ok(())
    }

    fn user_service(&self) -> Result<&str> {
        if self.user_service_url.is_empty() {
            return Err(NotConfigured("USER_SERVICE_URL").into());
        }
        Ok(&self.user_service_url)
    }

    fn notification_service(&self) -> Result<&str> {
        if self.notification_service_url.is_empty() {
            return Err(NotConfigured("NOTIFICATION_SERVICE_URL").into());
        }
        Ok(&self.notification_service_url)
    }
}

#[async_trait]
impl CompletionCollaborators for HttpCollaborators {
    async fn update_skill_statistics(&self, event: &CompletionEvent) -> Result<()> {
        let url =
            format!("{}/internal/users/{}/skill-statistics", self.user_service()?, event.user_id);
        self.post(
            url,
            json!({
                "skill": event.skill.as_str(),
                "score": event.score,
                "time_spent_minutes": event.time_spent_minutes(),
            }),
        )
        .await
    }

    async fn update_progress(&self, event: &CompletionEvent) -> Result<()> {
        let url = format!("{}/internal/users/{}/progress", self.user_service()?, event.user_id);
        self.post(
            url,
            json!({
                "exercises_completed": 1,
                "study_minutes": event.time_spent_minutes(),
                "skill": event.skill.as_str(),
                "score": event.score,
            }),
        )
        .await
    }

    async fn send_result_notification(&self, event: &CompletionEvent) -> Result<()> {
        let url = format!("{}/internal/notifications/exercise-result", self.notification_service()?);
        self.post(
            url,
            json!({
                "user_id": event.user_id,
                "attempt_id": event.attempt_id,
                "exercise_id": event.exercise_id,
                "exercise_title": event.exercise_title,
                "score": event.score,
                "band_score": event.band_score,
            }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn event(score: f64) -> CompletionEvent {
        CompletionEvent {
            attempt_id: "attempt-1".to_string(),
            user_id: "user-1".to_string(),
            exercise_id: "exercise-1".to_string(),
            exercise_title: "Reading Practice 1".to_string(),
            skill: SkillType::Reading,
            score,
            points_earned: score / 25.0,
            band_score: 7.0,
            time_spent_seconds: 754,
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy { max_attempts: 3, initial_backoff: Duration::from_secs(1) }
    }

    fn settings(user_url: &str, notification_url: &str) -> DispatchSettings {
        DispatchSettings {
            user_service_url: user_url.to_string(),
            notification_service_url: notification_url.to_string(),
            internal_api_key: "internal-key".to_string(),
            request_timeout_seconds: 2,
            max_attempts: 3,
            initial_backoff_ms: 1,
            queue_capacity: 4,
            concurrency: 2,
        }
    }

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<(String, &'static str)>>,
        failures_before_success: AtomicU32,
    }

    impl Recording {
        fn push(&self, event: &CompletionEvent, call: DispatchCall) -> Result<()> {
            if event.attempt_id == "boom" {
                panic!("collaborator defect");
            }
            self.calls.lock().expect("calls lock").push((event.attempt_id.clone(), call.as_str()));
            let remaining = self.failures_before_success.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_before_success.store(remaining - 1, Ordering::SeqCst);
                anyhow::bail!("collaborator unavailable");
            }
            Ok(())
        }

        fn calls(&self) -> Vec<(String, &'static str)> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl CompletionCollaborators for Recording {
        async fn update_skill_statistics(&self, event: &CompletionEvent) -> Result<()> {
            self.push(event, DispatchCall::SkillStatistics)
        }

        async fn update_progress(&self, event: &CompletionEvent) -> Result<()> {
            self.push(event, DispatchCall::Progress)
        }

        async fn send_result_notification(&self, event: &CompletionEvent) -> Result<()> {
            self.push(event, DispatchCall::Notification)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retry_succeeds_on_third_attempt_after_backoff() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let mut attempt_times = Vec::new();

        let (attempts, result) = retry_with_backoff(policy(), |_| {
            attempt_times.push(started.elapsed());
            let seen = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if seen < 2 {
                    anyhow::bail!("transient");
                }
                Ok(())
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(attempts, 3);
        let first_gap = attempt_times[1] - attempt_times[0];
        let second_gap = attempt_times[2] - attempt_times[1];
        assert!(first_gap >= Duration::from_millis(950) && first_gap < Duration::from_millis(1100));
        assert!(
            second_gap >= Duration::from_millis(1950) && second_gap < Duration::from_millis(2100)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let (attempts, result) = retry_with_backoff(policy(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(anyhow::anyhow!("down")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn not_configured_is_not_retried() {
        let calls = AtomicU32::new(0);
        let (attempts, result) = retry_with_backoff(policy(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(NotConfigured("USER_SERVICE_URL").into()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_score_skips_skill_statistics() {
        let collaborators = Recording::default();
        let report = dispatch(&collaborators, policy(), &event(0.0)).await;

        assert!(matches!(report.skill_statistics, CallOutcome::Skipped));
        assert!(matches!(report.progress, CallOutcome::Succeeded { attempts: 1 }));
        assert!(matches!(report.notification, CallOutcome::Succeeded { attempts: 1 }));
        let names: Vec<_> = collaborators.calls().into_iter().map(|(_, call)| call).collect();
        assert_eq!(names, vec!["progress", "notification"]);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_percentage_with_points_still_updates_skill_statistics() {
        let collaborators = Recording::default();
        let mut unweighted = event(0.0);
        unweighted.points_earned = 2.0;

        let report = dispatch(&collaborators, policy(), &unweighted).await;

        assert!(matches!(report.skill_statistics, CallOutcome::Succeeded { attempts: 1 }));
        let names: Vec<_> = collaborators.calls().into_iter().map(|(_, call)| call).collect();
        assert_eq!(names, vec!["skill_statistics", "progress", "notification"]);
    }

    #[tokio::test(start_paused = true)]
    async fn calls_run_in_order_and_failures_do_not_stop_later_calls() {
        let collaborators = Recording::default();
        collaborators.failures_before_success.store(3, Ordering::SeqCst);

        let report = dispatch(&collaborators, policy(), &event(80.0)).await;

        assert!(matches!(report.skill_statistics, CallOutcome::GaveUp { attempts: 3, .. }));
        assert!(matches!(report.progress, CallOutcome::Succeeded { attempts: 1 }));
        assert!(matches!(report.notification, CallOutcome::Succeeded { attempts: 1 }));
        let names: Vec<_> = collaborators.calls().into_iter().map(|(_, call)| call).collect();
        assert_eq!(
            names,
            vec!["skill_statistics", "skill_statistics", "skill_statistics", "progress", "notification"]
        );
    }

    #[tokio::test]
    async fn worker_survives_panicking_job() {
        let collaborators = Arc::new(Recording::default());
        let (dispatcher, worker) =
            CompletionDispatcher::start(&settings("", ""), collaborators.clone());

        let mut panicking = event(50.0);
        panicking.attempt_id = "boom".to_string();
        assert!(dispatcher.enqueue(panicking));
        assert!(dispatcher.enqueue(event(50.0)));

        drop(dispatcher);
        tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .expect("worker finished")
            .expect("worker did not panic");

        let calls = collaborators.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(attempt_id, _)| attempt_id == "attempt-1"));
    }

    #[tokio::test]
    async fn full_queue_drops_events() {
        let (sender, _receiver) = mpsc::channel(1);
        let dispatcher = CompletionDispatcher { sender };

        assert!(dispatcher.enqueue(event(10.0)));
        assert!(!dispatcher.enqueue(event(10.0)));
    }

    #[tokio::test]
    async fn http_collaborators_post_expected_payloads() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/internal/users/user-1/skill-statistics"))
            .and(header("X-Internal-Api-Key", "internal-key"))
            .and(body_partial_json(
                json!({"skill": "reading", "score": 75.0, "time_spent_minutes": 12}),
            ))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/internal/users/user-1/progress"))
            .and(body_partial_json(
                json!({"exercises_completed": 1, "study_minutes": 12, "skill": "reading"}),
            ))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/internal/notifications/exercise-result"))
            .and(body_partial_json(
                json!({"user_id": "user-1", "exercise_title": "Reading Practice 1", "score": 75.0}),
            ))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let uri = format!("{}/", server.uri());
        let client = HttpCollaborators::from_settings(&settings(&uri, &uri)).expect("client");
        let report = dispatch(&client, policy(), &event(75.0)).await;

        assert!(matches!(report.skill_statistics, CallOutcome::Succeeded { attempts: 1 }));
        assert!(matches!(report.progress, CallOutcome::Succeeded { attempts: 1 }));
        assert!(matches!(report.notification, CallOutcome::Succeeded { attempts: 1 }));
    }

    #[tokio::test]
    async fn http_collaborators_retry_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/internal/users/user-1/progress"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/internal/users/user-1/progress"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = HttpCollaborators::from_settings(&settings(&server.uri(), "")).expect("client");
        let fast = RetryPolicy { max_attempts: 3, initial_backoff: Duration::from_millis(5) };
        let event = event(40.0);
        let outcome =
            run_call(fast, &event, DispatchCall::Progress, || client.update_progress(&event)).await;

        assert!(matches!(outcome, CallOutcome::Succeeded { attempts: 2 }));
    }

    #[tokio::test]
    async fn missing_notification_url_reports_not_configured() {
        let client = HttpCollaborators::from_settings(&settings("", "")).expect("client");
        let event = event(40.0);
        let outcome = run_call(policy(), &event, DispatchCall::Notification, || {
            client.send_result_notification(&event)
        })
        .await;

        assert!(matches!(outcome, CallOutcome::NotConfigured));
    }
}
