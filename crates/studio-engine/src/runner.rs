use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::json;
use studio_contracts::events::{EventPayload, EventWriter};
use studio_contracts::image::EncodedImage;
use studio_contracts::presets::StylePreset;
use studio_contracts::runs::{GenerationTask, RunResultSet, StatusCounts};

use crate::cancel::CancelToken;
use crate::client::EditClient;
use crate::config::{StudioConfig, DEFAULT_PACING_MS};

pub const CUSTOM_DISPLAY_NAME: &str = "Custom Edit";
pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded";
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to generate";
pub const CANCELLED_MESSAGE: &str = "Cancelled";
const EMPTY_ERROR_FALLBACK: &str = "Failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Wait after every batch call, the last one included.
    pub pacing_delay: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            pacing_delay: Duration::from_millis(DEFAULT_PACING_MS),
        }
    }
}

impl From<&StudioConfig> for RunnerConfig {
    fn from(config: &StudioConfig) -> Self {
        Self {
            pacing_delay: config.pacing_delay,
        }
    }
}

/// Why a run was refused without creating any task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Declined {
    #[error("no source image selected")]
    NoSourceImage,
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("a generation run is already in progress")]
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Batch,
    Custom,
}

impl RunKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RunKind::Batch => "batch",
            RunKind::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub kind: RunKind,
    pub task_ids: Vec<String>,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Declined(Declined),
    Finished(RunReport),
}

impl RunOutcome {
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunOutcome::Finished(report) => Some(report),
            RunOutcome::Declined(_) => None,
        }
    }

    pub fn declined(&self) -> Option<Declined> {
        match self {
            RunOutcome::Declined(reason) => Some(*reason),
            RunOutcome::Finished(_) => None,
        }
    }
}

/// Called after every task change: new pending tasks and each transition.
/// Runs on the generating thread with no lock held.
pub trait RunObserver: Send + Sync {
    fn task_updated(&self, task: &GenerationTask);
}

/// Shared read access to a runner's results; safe to poll mid-run.
#[derive(Debug, Clone, Default)]
pub struct ResultsHandle {
    inner: Arc<RwLock<RunResultSet>>,
}

impl ResultsHandle {
    pub fn snapshot(&self) -> RunResultSet {
        self.read(RunResultSet::clone)
    }

    pub fn counts(&self) -> StatusCounts {
        self.read(RunResultSet::counts)
    }

    fn read<R>(&self, f: impl FnOnce(&RunResultSet) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&*guard)
    }

    fn write<R>(&self, f: impl FnOnce(&mut RunResultSet) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut *guard)
    }
}

struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Batch message for a failed preset: quota trouble is named, everything
/// else is generic.
pub fn classify_batch_error(message: &str) -> &'static str {
    if message.contains("429") || message.contains("quota") {
        RATE_LIMIT_MESSAGE
    } else {
        GENERIC_FAILURE_MESSAGE
    }
}

/// Drives batch and ad hoc generation against one [`EditClient`].
///
/// One run at a time: the busy flag is taken with a compare-and-swap and
/// released when the run ends, so a second start from any thread is
/// declined. Results stay readable through [`Runner::results_handle`] while
/// a run is in progress.
pub struct Runner {
    client: Arc<dyn EditClient>,
    config: RunnerConfig,
    events: EventWriter,
    observer: Option<Arc<dyn RunObserver>>,
    results: ResultsHandle,
    busy: AtomicBool,
    last_custom_millis: Mutex<i64>,
}

impl Runner {
    pub fn new(client: Arc<dyn EditClient>, config: RunnerConfig) -> Self {
        Self {
            client,
            config,
            events: EventWriter::disabled(format!(
                "run-{}",
                chrono::Utc::now().format("%Y%m%dT%H%M%S")
            )),
            observer: None,
            results: ResultsHandle::default(),
            busy: AtomicBool::new(false),
            last_custom_millis: Mutex::new(0),
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = events;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn client_name(&self) -> &str {
        self.client.name()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn results(&self) -> RunResultSet {
        self.results.snapshot()
    }

    pub fn results_handle(&self) -> ResultsHandle {
        self.results.clone()
    }

    /// Drops every result. Updates still arriving for a cleared task are
    /// ignored.
    pub fn clear(&self) {
        self.results.write(|results| *results = RunResultSet::new());
    }

    pub fn run_batch(&self, source: Option<&EncodedImage>, presets: &[StylePreset]) -> RunOutcome {
        self.batch(source, presets, None)
    }

    pub fn run_batch_with_cancel(
        &self,
        source: Option<&EncodedImage>,
        presets: &[StylePreset],
        cancel: &CancelToken,
    ) -> RunOutcome {
        self.batch(source, presets, Some(cancel))
    }

    pub fn run_one(
        &self,
        source: Option<&EncodedImage>,
        prompt: &str,
        display_name: &str,
    ) -> RunOutcome {
        let Some(source) = source.filter(|image| !image.is_empty()) else {
            log::debug!("custom run declined: no source image");
            return RunOutcome::Declined(Declined::NoSourceImage);
        };
        if prompt.trim().is_empty() {
            log::debug!("custom run declined: empty prompt");
            return RunOutcome::Declined(Declined::EmptyPrompt);
        }
        let Some(_busy) = BusyGuard::acquire(&self.busy) else {
            log::debug!("custom run declined: runner busy");
            return RunOutcome::Declined(Declined::Busy);
        };

        let started = Instant::now();
        let id = self.next_custom_id();
        let task = GenerationTask::pending(&id, prompt, display_name);
        self.results.write(|results| results.prepend(task.clone()));
        self.notify(&task);
        self.emit(
            "run_started",
            json!({
                "kind": RunKind::Custom.as_str(),
                "client": self.client.name(),
                "tasks": [id],
            }),
        );

        let mut report = RunReport {
            kind: RunKind::Custom,
            task_ids: vec![id.clone()],
            succeeded: 0,
            failed: 0,
            cancelled: 0,
            elapsed: Duration::ZERO,
        };
        match self.client.edit(source, prompt) {
            Ok(image) => {
                log::info!("custom edit {id} succeeded");
                if self.record(&id, Ok(image)) {
                    report.succeeded += 1;
                }
            }
            Err(err) => {
                let raw = err.to_string();
                log::warn!("custom edit {id} failed: {raw}");
                let message = if raw.trim().is_empty() {
                    EMPTY_ERROR_FALLBACK.to_string()
                } else {
                    raw
                };
                if self.record(&id, Err(message)) {
                    report.failed += 1;
                }
            }
        }

        report.elapsed = started.elapsed();
        self.emit_finished(&report);
        RunOutcome::Finished(report)
    }

    fn batch(
        &self,
        source: Option<&EncodedImage>,
        presets: &[StylePreset],
        cancel: Option<&CancelToken>,
    ) -> RunOutcome {
        let Some(source) = source.filter(|image| !image.is_empty()) else {
            log::debug!("batch run declined: no source image");
            return RunOutcome::Declined(Declined::NoSourceImage);
        };
        let Some(_busy) = BusyGuard::acquire(&self.busy) else {
            log::debug!("batch run declined: runner busy");
            return RunOutcome::Declined(Declined::Busy);
        };

        let started = Instant::now();
        let tasks: Vec<GenerationTask> = presets.iter().map(GenerationTask::from_preset).collect();
        self.results
            .write(|results| *results = RunResultSet::from_tasks(tasks.clone()));
        for task in &tasks {
            self.notify(task);
        }
        let task_ids: Vec<String> = tasks.into_iter().map(|task| task.id).collect();
        self.emit(
            "run_started",
            json!({
                "kind": RunKind::Batch.as_str(),
                "client": self.client.name(),
                "tasks": task_ids,
                "pacing_ms": self.config.pacing_delay.as_millis() as u64,
            }),
        );
        log::info!(
            "batch of {} preset(s) via {}",
            presets.len(),
            self.client.name()
        );

        let mut report = RunReport {
            kind: RunKind::Batch,
            task_ids,
            succeeded: 0,
            failed: 0,
            cancelled: 0,
            elapsed: Duration::ZERO,
        };
        let mut interrupted = false;
        for (index, preset) in presets.iter().enumerate() {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                interrupted = true;
                break;
            }
            log::info!(
                "[{}/{}] {} ({})",
                index + 1,
                presets.len(),
                preset.display_name,
                preset.id
            );
            match self.client.edit(source, &preset.prompt_text) {
                Ok(image) => {
                    if self.record(&preset.id, Ok(image)) {
                        report.succeeded += 1;
                    }
                }
                Err(err) => {
                    let raw = err.to_string();
                    log::warn!("preset {} failed: {raw}", preset.id);
                    let message = classify_batch_error(&raw).to_string();
                    if self.record(&preset.id, Err(message)) {
                        report.failed += 1;
                    }
                }
            }
            if self.pace(cancel) {
                interrupted = true;
                break;
            }
        }

        if interrupted {
            let closed = self.close_pending(&report.task_ids);
            report.cancelled = closed;
            log::info!("batch cancelled; {closed} task(s) closed");
            self.emit("run_cancelled", json!({ "closed": closed }));
        }
        report.elapsed = started.elapsed();
        self.emit_finished(&report);
        RunOutcome::Finished(report)
    }

    /// Pacing wait. Returns `true` when the wait was cut short by a cancel.
    fn pace(&self, cancel: Option<&CancelToken>) -> bool {
        match cancel {
            Some(token) => token.wait(self.config.pacing_delay),
            None => {
                if !self.config.pacing_delay.is_zero() {
                    thread::sleep(self.config.pacing_delay);
                }
                false
            }
        }
    }

    /// Applies one transition. Returns `false` when the task is gone (cleared
    /// mid-run) or already settled.
    fn record(&self, id: &str, outcome: Result<EncodedImage, String>) -> bool {
        let (event_type, detail) = match &outcome {
            Ok(image) => ("task_succeeded", json!({ "mime_type": image.mime_type() })),
            Err(message) => ("task_failed", json!({ "error": message })),
        };
        let updated = self.results.write(|results| {
            let updated = match outcome {
                Ok(image) => results.succeed(id, image),
                Err(message) => results.fail(id, message),
            };
            updated.cloned()
        });
        match updated {
            Ok(task) => {
                self.notify(&task);
                let mut payload = json!({
                    "task_id": task.id,
                    "display_name": task.display_name,
                });
                if let (Some(target), Some(extra)) = (payload.as_object_mut(), detail.as_object()) {
                    target.extend(extra.clone());
                }
                self.emit(event_type, payload);
                true
            }
            Err(err) => {
                log::debug!("dropped update for {id}: {err}");
                false
            }
        }
    }

    fn close_pending(&self, ids: &[String]) -> usize {
        let closed: Vec<GenerationTask> = self.results.write(|results| {
            ids.iter()
                .filter_map(|id| results.fail(id, CANCELLED_MESSAGE).ok().cloned())
                .collect()
        });
        for task in &closed {
            self.notify(task);
        }
        closed.len()
    }

    fn next_custom_id(&self) -> String {
        let now = chrono::Utc::now().timestamp_millis();
        let mut last = self
            .last_custom_millis
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let millis = now.max(*last + 1);
        *last = millis;
        format!("custom-{millis}")
    }

    fn notify(&self, task: &GenerationTask) {
        if let Some(observer) = &self.observer {
            observer.task_updated(task);
        }
    }

    fn emit_finished(&self, report: &RunReport) {
        self.emit(
            "run_finished",
            json!({
                "kind": report.kind.as_str(),
                "succeeded": report.succeeded,
                "failed": report.failed,
                "cancelled": report.cancelled,
                "elapsed_ms": report.elapsed.as_millis() as u64,
            }),
        );
    }

    fn emit(&self, event_type: &str, payload: serde_json::Value) {
        let payload: EventPayload = payload.as_object().cloned().unwrap_or_default();
        if let Err(err) = self.events.emit(event_type, payload) {
            log::warn!("event {event_type} not recorded: {err:#}");
        }
    }
}
