//! Job lifecycle states and the notification channels a caller listens on.

use fragcut_job_model::ProcessingResult;
use serde::Serialize;
use tokio::sync::mpsc;

/// Identifier handed out by the orchestrator on submit.
pub type JobId = u64;

/// Per-job state machine.
///
/// `Created -> Probing -> Planning -> CoreRendering -> (IntroRendering) ->
/// Assembling -> Succeeded | Failed | Cancelled`. Failure and cancellation
/// can happen from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Probing,
    Planning,
    CoreRendering,
    IntroRendering,
    Assembling,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn label(self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Probing => "probing",
            JobState::Planning => "planning",
            JobState::CoreRendering => "core_rendering",
            JobState::IntroRendering => "intro_rendering",
            JobState::Assembling => "assembling",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Receives a job's notifications. Calls come from the job's worker thread.
pub trait JobObserver: Send + Sync {
    /// Overall progress, never decreasing, 100 on success.
    fn on_progress(&self, job_id: JobId, percent: u8, phase: &str);

    /// State transition with a human-readable message.
    fn on_status(&self, job_id: JobId, state: JobState, message: &str);

    /// Terminal result. Called exactly once per job.
    fn on_complete(&self, job_id: JobId, result: &ProcessingResult);
}

/// Observer that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl JobObserver for NullObserver {
    fn on_progress(&self, _: JobId, _: u8, _: &str) {}
    fn on_status(&self, _: JobId, _: JobState, _: &str) {}
    fn on_complete(&self, _: JobId, _: &ProcessingResult) {}
}

/// A notification as data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Progress {
        job_id: JobId,
        percent: u8,
        phase: String,
    },
    Status {
        job_id: JobId,
        state: JobState,
        message: String,
    },
    Complete {
        job_id: JobId,
        result: ProcessingResult,
    },
}

/// Forwards notifications into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<JobEvent>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<JobEvent>) -> Self {
        Self { tx }
    }

    /// Observer plus the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn send(&self, event: JobEvent) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl JobObserver for ChannelObserver {
    fn on_progress(&self, job_id: JobId, percent: u8, phase: &str) {
        self.send(JobEvent::Progress {
            job_id,
            percent,
            phase: phase.to_string(),
        });
    }

    fn on_status(&self, job_id: JobId, state: JobState, message: &str) {
        self.send(JobEvent::Status {
            job_id,
            state,
            message: message.to_string(),
        });
    }

    fn on_complete(&self, job_id: JobId, result: &ProcessingResult) {
        self.send(JobEvent::Complete {
            job_id,
            result: result.clone(),
        });
    }
}
