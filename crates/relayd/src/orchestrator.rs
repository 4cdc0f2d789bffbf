//! Dispatch orchestrator.
//!
//! Flow per request:
//! 1. Classify the prompt once (relevance score per known backend)
//! 2. Skip every backend under the threshold, flag unregistered names
//! 3. Spawn one task per remaining backend, all running concurrently
//! 4. Join every task, then emit outcomes in classifier order
//!
//! Invariants:
//! - One outcome per classified backend, selected or not
//! - Output order is classifier order, never completion order
//! - A backend failure (error, timeout, panic) stays in its own outcome
//! - Only an empty prompt or a classifier failure fails the request

use crate::backend::{Backend, ExecuteRequest};
use crate::classifier::RelevanceClassifier;
use crate::error::{BackendError, DispatchError};
use crate::metrics::{status, DispatchMetrics, UNKNOWN_BACKEND_LABEL};
use crate::registry::BackendRegistry;
use relay_common::{AggregateResponse, BackendAction, BackendOutcome, DEFAULT_THRESHOLD};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Minimum applicability for a backend to run (inclusive)
    pub threshold: u8,
    /// Outer bound on a single backend task
    pub task_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            task_timeout: Duration::from_secs(30),
        }
    }
}

/// Lifecycle of one request. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DispatchPhase {
    Received,
    Classifying,
    Dispatching,
    Awaiting,
    Aggregated,
}

struct PhaseTracker {
    phase: DispatchPhase,
}

impl PhaseTracker {
    fn new() -> Self {
        Self {
            phase: DispatchPhase::Received,
        }
    }

    fn advance(&mut self, next: DispatchPhase) {
        debug_assert!(next > self.phase, "phase went from {:?} to {:?}", self.phase, next);
        debug!("{:?} -> {:?}", self.phase, next);
        self.phase = next;
    }
}

/// One position in the output, filled either immediately or by a task
enum Slot {
    Ready(BackendOutcome),
    Running {
        backend: String,
        handle: JoinHandle<Result<Value, BackendError>>,
    },
}

pub struct Dispatcher {
    classifier: RelevanceClassifier,
    registry: Arc<BackendRegistry>,
    settings: DispatchSettings,
    metrics: Option<DispatchMetrics>,
}

impl Dispatcher {
    pub fn new(
        classifier: RelevanceClassifier,
        registry: Arc<BackendRegistry>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            classifier,
            registry,
            settings,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: DispatchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Run the full classify → fan-out → join → aggregate cycle
    pub async fn dispatch(&self, prompt: &str) -> Result<AggregateResponse, DispatchError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            self.record_request("client_error");
            return Err(DispatchError::EmptyPrompt);
        }

        let span = info_span!("dispatch", request_id = %Uuid::new_v4());
        self.dispatch_inner(prompt).instrument(span).await
    }

    async fn dispatch_inner(&self, prompt: &str) -> Result<AggregateResponse, DispatchError> {
        let start = Instant::now();
        let mut tracker = PhaseTracker::new();

        tracker.advance(DispatchPhase::Classifying);
        let scores = match self.classifier.classify(prompt).await {
            Ok(scores) => scores,
            Err(e) => {
                error!("Classification failed: {}", e);
                self.record_request("classification_error");
                return Err(e.into());
            }
        };
        info!(
            "Classified: [{}]",
            scores
                .iter()
                .map(|s| format!("{}={}", s.backend, s.applicability))
                .collect::<Vec<_>>()
                .join(", ")
        );

        tracker.advance(DispatchPhase::Dispatching);
        let mut slots = Vec::with_capacity(scores.len());
        for score in scores {
            if !score.passes(self.settings.threshold) {
                info!(
                    "Skipping {} (applicability {} < {})",
                    score.backend, score.applicability, self.settings.threshold
                );
                self.record_outcome(&score.backend, status::SKIPPED);
                slots.push(Slot::Ready(BackendOutcome::below_threshold(
                    score.backend,
                    score.applicability,
                )));
                continue;
            }

            let Some(backend) = self.registry.get(&score.backend) else {
                warn!("No backend registered for {}", score.backend);
                self.record_outcome(&score.backend, status::UNREGISTERED);
                slots.push(Slot::Ready(BackendOutcome::unregistered(score.backend)));
                continue;
            };

            let handle = self.spawn_backend(
                &score.backend,
                backend,
                ExecuteRequest::Prompt(prompt.to_string()),
            );
            slots.push(Slot::Running {
                backend: score.backend,
                handle,
            });
        }

        tracker.advance(DispatchPhase::Awaiting);
        let mut outcomes = Vec::with_capacity(slots.len());
        for slot in slots {
            let outcome = match slot {
                Slot::Ready(outcome) => outcome,
                Slot::Running { backend, handle } => self.collect(backend, handle).await,
            };
            outcomes.push(outcome);
        }

        tracker.advance(DispatchPhase::Aggregated);
        let elapsed = start.elapsed();
        info!(
            "Dispatch complete: {} outcomes, {} ok, {:.2}s",
            outcomes.len(),
            outcomes.iter().filter(|o| o.is_success()).count(),
            elapsed.as_secs_f64()
        );
        self.record_request("ok");
        if let Some(metrics) = &self.metrics {
            metrics.observe_duration(elapsed.as_secs_f64());
        }

        Ok(AggregateResponse::new(outcomes))
    }

    /// Run one registered backend with an already-resolved action
    pub async fn execute_action(
        &self,
        backend_name: &str,
        action: BackendAction,
    ) -> Result<BackendOutcome, DispatchError> {
        let backend = self
            .registry
            .get(backend_name)
            .ok_or_else(|| DispatchError::UnknownBackend(backend_name.to_string()))?;

        let handle = self.spawn_backend(backend_name, backend, ExecuteRequest::Action(action));
        Ok(self.collect(backend_name.to_string(), handle).await)
    }

    fn spawn_backend(
        &self,
        name: &str,
        backend: Arc<dyn Backend>,
        request: ExecuteRequest,
    ) -> JoinHandle<Result<Value, BackendError>> {
        let timeout = self.settings.task_timeout;
        let span = info_span!("backend", name = %name);

        tokio::spawn(
            async move {
                match tokio::time::timeout(timeout, backend.execute(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(BackendError::TimedOut(timeout.as_secs())),
                }
            }
            .instrument(span),
        )
    }

    async fn collect(
        &self,
        backend: String,
        handle: JoinHandle<Result<Value, BackendError>>,
    ) -> BackendOutcome {
        let outcome = match handle.await {
            Ok(Ok(Value::Null)) => BackendOutcome::failure(&backend, "backend returned no data"),
            Ok(Ok(data)) => BackendOutcome::success(&backend, data),
            Ok(Err(e)) => BackendOutcome::failure(&backend, e.to_string()),
            Err(join_error) => BackendOutcome::failure(
                &backend,
                format!("backend task aborted: {}", join_error),
            ),
        };

        match &outcome.error {
            None => self.record_outcome(&backend, status::OK),
            Some(message) => {
                warn!("Backend {} failed: {}", backend, message);
                self.record_outcome(&backend, status::FAILED);
            }
        }
        outcome
    }

    fn record_request(&self, result: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_request(result);
        }
    }

    fn record_outcome(&self, backend: &str, status: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_outcome(self.metric_label(backend), status);
        }
    }

    fn metric_label<'a>(&self, backend: &'a str) -> &'a str {
        if self.registry.contains(backend) {
            backend
        } else {
            UNKNOWN_BACKEND_LABEL
        }
    }
}
