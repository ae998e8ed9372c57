//! Job entity and the partial update applied to it by both store backends.

use radiarch_core::job_state::JobState;
use radiarch_core::types::{EntityId, Timestamp};
use serde::Serialize;

/// Status read model of a plan's execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: EntityId,
    pub plan_id: EntityId,
    pub state: JobState,
    pub progress: f64,
    pub message: Option<String>,
    /// Free-form phase tag, e.g. `fetching` or `computing_beamlets`.
    pub stage: Option<String>,
    /// Advisory seconds remaining in the current stage.
    pub eta_seconds: Option<f64>,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}

impl Job {
    /// A new queued job at zero progress.
    pub fn queued(id: EntityId, plan_id: EntityId) -> Self {
        Self {
            id,
            plan_id,
            state: JobState::Queued,
            progress: 0.0,
            message: None,
            stage: None,
            eta_seconds: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Apply a partial update in place.
    ///
    /// - `started_at` is set on the first entry into `running`.
    /// - `finished_at` is set on the first entry into a terminal state.
    /// - `progress` is clamped to `[0, 1]`, `eta_seconds` to `>= 0`.
    ///
    /// Transition legality is not checked here; callers consult
    /// [`JobState::can_transition`] first.
    pub fn apply(&mut self, update: JobUpdate, now: Timestamp) {
        if let Some(state) = update.state {
            self.state = state;
            if state == JobState::Running && self.started_at.is_none() {
                self.started_at = Some(now);
            }
            if state.is_terminal() && self.finished_at.is_none() {
                self.finished_at = Some(now);
            }
        }
        if let Some(progress) = update.progress {
            self.progress = clamp_progress(progress);
        }
        if let Some(message) = update.message {
            self.message = Some(message);
        }
        if let Some(stage) = update.stage {
            self.stage = Some(stage);
        }
        if let Some(eta) = update.eta_seconds {
            self.eta_seconds = Some(if eta.is_finite() { eta.max(0.0) } else { 0.0 });
        }
    }
}

fn clamp_progress(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Partial job update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub state: Option<JobState>,
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub stage: Option<String>,
    pub eta_seconds: Option<f64>,
}

impl JobUpdate {
    pub fn state(state: JobState) -> Self {
        Self {
            state: Some(state),
            ..Default::default()
        }
    }

    /// A stage transition without a state change.
    pub fn stage(stage: &str, progress: f64, message: impl Into<String>) -> Self {
        Self {
            progress: Some(progress),
            message: Some(message.into()),
            stage: Some(stage.to_string()),
            ..Default::default()
        }
    }

    pub fn with_state(mut self, state: JobState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_stage(mut self, stage: &str) -> Self {
        self.stage = Some(stage.to_string());
        self
    }

    pub fn with_eta(mut self, eta_seconds: f64) -> Self {
        self.eta_seconds = Some(eta_seconds);
        self
    }
}
