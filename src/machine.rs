//! Scan job lifecycle as a plain state machine.
//!
//! `ControllerState::on_event` takes the current state and one event and
//! returns the effects to perform. It never touches the network, a timer or a
//! terminal; the async driver in `controller` and a `View` interpret the
//! effects. That keeps every transition testable without any I/O.
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::PollPolicy;
use crate::error::{PollError, StopError, SubmitError};
use crate::types::{JobId, JobStatus, ProgressSnapshot, ScanRequest};

pub const STATUS_STARTING: &str = "Starting scan...";
pub const STATUS_SCANNING: &str = "Scanning...";
pub const STATUS_COMPLETED: &str = "Scan complete!";
pub const STATUS_FAILED: &str = "Scan failed!";
pub const STATUS_CANCELLED: &str = "Scan cancelled.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Submitting,
    Polling,
    Completed,
    Failed,
    Stopped,
    /// Progress checks kept failing; the job may still run server-side.
    Abandoned,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Phase::Completed | Phase::Failed | Phase::Stopped | Phase::Abandoned
        )
    }
}

/// Handle of one polling timer. A new id is issued every time polling starts,
/// so ticks from a timer that was already cancelled can be recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Success,
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    SendSubmit(ScanRequest),
    SendPoll(JobId),
    SendStop(JobId),
    StartTimer { id: TimerId, every: Duration },
    CancelTimer(TimerId),
    /// Open the progress panel with zeroed counters.
    ShowProgress { target: String },
    HideProgress,
    UpdateProgress(ProgressSnapshot),
    SetStatus(String),
    /// Swap the "stop" control for "view results".
    ShowViewResults,
    Alert { level: AlertLevel, message: String },
    Navigate(String),
}

impl Effect {
    /// True for effects a `View` renders; false for network and timer work.
    pub fn is_ui(&self) -> bool {
        !matches!(
            self,
            Effect::SendSubmit(_)
                | Effect::SendPoll(_)
                | Effect::SendStop(_)
                | Effect::StartTimer { .. }
                | Effect::CancelTimer(_)
        )
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    SubmitRequested(ScanRequest),
    Submitted(JobId),
    SubmitFailed(SubmitError),
    TimerFired(TimerId),
    /// Manual progress check outside the timer.
    PollRequested,
    PollSucceeded { job_id: JobId, snapshot: ProgressSnapshot },
    PollFailed { job_id: JobId, error: PollError },
    StopRequested,
    StopAcknowledged(JobId),
    StopFailed { job_id: JobId, error: StopError },
    ViewResultsRequested,
    Reset,
}

/// Browser path of the results page for a job.
pub fn results_path(job_id: &JobId) -> String {
    format!("/results/{job_id}/")
}

#[derive(Debug, Clone)]
pub struct ControllerState {
    phase: Phase,
    job_id: Option<JobId>,
    timer: Option<TimerId>,
    poll_in_flight: bool,
    poll_failures: u32,
    target: Option<String>,
    progress: ProgressSnapshot,
    status_text: String,
    policy: PollPolicy,
    next_timer: u64,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self::new(PollPolicy::default())
    }
}

impl ControllerState {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            phase: Phase::Idle,
            job_id: None,
            timer: None,
            poll_in_flight: false,
            poll_failures: 0,
            target: None,
            progress: ProgressSnapshot::default(),
            status_text: String::new(),
            policy,
            next_timer: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn job_id(&self) -> Option<&JobId> {
        self.job_id.as_ref()
    }

    pub fn timer(&self) -> Option<TimerId> {
        self.timer
    }

    pub fn is_polling(&self) -> bool {
        self.timer.is_some()
    }

    pub fn poll_in_flight(&self) -> bool {
        self.poll_in_flight
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn progress(&self) -> &ProgressSnapshot {
        &self.progress
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn on_event(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::SubmitRequested(request) => self.on_submit_requested(request),
            Event::Submitted(job_id) => self.on_submitted(job_id),
            Event::SubmitFailed(error) => self.on_submit_failed(error),
            Event::TimerFired(id) => {
                if self.timer != Some(id) {
                    debug!(?id, "tick from a cancelled timer ignored");
                    return Vec::new();
                }
                self.request_poll()
            }
            Event::PollRequested => self.request_poll(),
            Event::PollSucceeded { job_id, snapshot } => self.on_progress(job_id, snapshot),
            Event::PollFailed { job_id, error } => self.on_poll_failed(job_id, error),
            Event::StopRequested => match (&self.job_id, self.phase) {
                (Some(job_id), Phase::Polling | Phase::Abandoned) => {
                    vec![Effect::SendStop(job_id.clone())]
                }
                _ => Vec::new(),
            },
            Event::StopAcknowledged(job_id) => self.on_stop_acknowledged(job_id),
            Event::StopFailed { job_id, error } => {
                if !self.is_current(&job_id) {
                    return Vec::new();
                }
                warn!(job = %job_id, %error, "stop request failed; still polling");
                vec![Effect::Alert {
                    level: AlertLevel::Danger,
                    message: format!("Error stopping scan: {error}"),
                }]
            }
            Event::ViewResultsRequested => match (&self.phase, &self.job_id) {
                (Phase::Completed, Some(job_id)) => {
                    vec![Effect::HideProgress, Effect::Navigate(results_path(job_id))]
                }
                _ => Vec::new(),
            },
            Event::Reset => {
                let mut effects: Vec<Effect> = self.cancel_timer().into_iter().collect();
                self.phase = Phase::Idle;
                self.job_id = None;
                self.target = None;
                self.poll_in_flight = false;
                self.poll_failures = 0;
                self.progress = ProgressSnapshot::default();
                self.status_text.clear();
                effects.push(Effect::HideProgress);
                effects
            }
        }
    }

    fn on_submit_requested(&mut self, request: ScanRequest) -> Vec<Effect> {
        if self.phase == Phase::Submitting {
            debug!("submission already in progress");
            return Vec::new();
        }
        // A new scan silently replaces whatever job was tracked before.
        let mut effects: Vec<Effect> = self.cancel_timer().into_iter().collect();
        if let Some(previous) = self.job_id.take() {
            info!(job = %previous, "no longer tracking previous job");
        }
        self.phase = Phase::Submitting;
        self.poll_in_flight = false;
        self.poll_failures = 0;
        self.progress = ProgressSnapshot::default();
        self.status_text.clear();
        self.target = Some(request.target.clone());
        effects.push(Effect::ShowProgress {
            target: request.target.clone(),
        });
        effects.push(Effect::SendSubmit(request));
        effects
    }

    fn on_submitted(&mut self, job_id: JobId) -> Vec<Effect> {
        if self.phase != Phase::Submitting {
            debug!(job = %job_id, "submit response arrived outside of submission");
            return Vec::new();
        }
        info!(job = %job_id, "scan job created");
        self.phase = Phase::Polling;
        self.job_id = Some(job_id);
        self.status_text = STATUS_STARTING.to_string();
        let mut effects = vec![Effect::SetStatus(STATUS_STARTING.to_string())];
        effects.extend(self.start_polling());
        effects
    }

    fn on_submit_failed(&mut self, error: SubmitError) -> Vec<Effect> {
        if self.phase != Phase::Submitting {
            return Vec::new();
        }
        warn!(%error, "scan submission failed");
        self.phase = Phase::Idle;
        self.target = None;
        vec![
            Effect::HideProgress,
            Effect::Alert {
                level: AlertLevel::Danger,
                message: format!("Error starting scan: {error}"),
            },
        ]
    }

    fn request_poll(&mut self) -> Vec<Effect> {
        let Some(job_id) = self.job_id.clone() else {
            return Vec::new();
        };
        if self.phase != Phase::Polling {
            return Vec::new();
        }
        if self.poll_in_flight {
            debug!(job = %job_id, "previous progress check still pending; tick skipped");
            return Vec::new();
        }
        self.poll_in_flight = true;
        vec![Effect::SendPoll(job_id)]
    }

    fn on_progress(&mut self, job_id: JobId, snapshot: ProgressSnapshot) -> Vec<Effect> {
        if !self.is_current(&job_id) || self.phase != Phase::Polling {
            debug!(job = %job_id, "discarding progress for a job no longer tracked");
            return Vec::new();
        }
        self.poll_in_flight = false;
        self.poll_failures = 0;
        self.progress = snapshot.clone();

        let mut effects = vec![Effect::UpdateProgress(snapshot.clone())];
        let status = match snapshot.status {
            JobStatus::Completed => {
                info!(job = %job_id, open = snapshot.open_count, "scan completed");
                effects.extend(self.cancel_timer());
                self.phase = Phase::Completed;
                effects.push(Effect::ShowViewResults);
                STATUS_COMPLETED
            }
            JobStatus::Failed => {
                warn!(job = %job_id, "scan failed on the server");
                effects.extend(self.cancel_timer());
                self.phase = Phase::Failed;
                effects.push(Effect::Alert {
                    level: AlertLevel::Danger,
                    message: "The scan failed. Check the server logs.".to_string(),
                });
                STATUS_FAILED
            }
            JobStatus::Cancelled => {
                info!(job = %job_id, "scan cancelled on the server");
                effects.extend(self.cancel_timer());
                self.phase = Phase::Stopped;
                self.job_id = None;
                effects.push(Effect::HideProgress);
                effects.push(Effect::Alert {
                    level: AlertLevel::Info,
                    message: "The scan was cancelled.".to_string(),
                });
                STATUS_CANCELLED
            }
            JobStatus::Pending | JobStatus::Running | JobStatus::Unknown => STATUS_SCANNING,
        };
        self.status_text = status.to_string();
        effects.insert(1, Effect::SetStatus(status.to_string()));
        effects
    }

    fn on_poll_failed(&mut self, job_id: JobId, error: PollError) -> Vec<Effect> {
        if !self.is_current(&job_id) || self.phase != Phase::Polling {
            return Vec::new();
        }
        self.poll_in_flight = false;
        self.poll_failures += 1;
        if self.poll_failures <= self.policy.max_retries {
            warn!(
                job = %job_id,
                %error,
                attempt = self.poll_failures,
                "progress check failed; retrying on next tick"
            );
            return Vec::new();
        }
        warn!(job = %job_id, %error, "progress check failed; no longer polling");
        self.phase = Phase::Abandoned;
        self.cancel_timer().into_iter().collect()
    }

    fn on_stop_acknowledged(&mut self, job_id: JobId) -> Vec<Effect> {
        // completed and failed jobs stay that way until the next submit
        if !self.is_current(&job_id)
            || !matches!(self.phase, Phase::Polling | Phase::Abandoned)
        {
            return Vec::new();
        }
        info!(job = %job_id, "scan stopped by user");
        let mut effects: Vec<Effect> = self.cancel_timer().into_iter().collect();
        self.phase = Phase::Stopped;
        self.job_id = None;
        self.poll_in_flight = false;
        self.progress = ProgressSnapshot::default();
        self.status_text.clear();
        effects.push(Effect::HideProgress);
        effects.push(Effect::Alert {
            level: AlertLevel::Info,
            message: "Scan stopped by user.".to_string(),
        });
        effects
    }

    /// At most one timer per controller: a second start is a no-op.
    fn start_polling(&mut self) -> Option<Effect> {
        if self.timer.is_some() {
            return None;
        }
        self.next_timer += 1;
        let id = TimerId(self.next_timer);
        self.timer = Some(id);
        Some(Effect::StartTimer {
            id,
            every: self.policy.interval,
        })
    }

    fn cancel_timer(&mut self) -> Option<Effect> {
        self.timer.take().map(Effect::CancelTimer)
    }

    fn is_current(&self, job_id: &JobId) -> bool {
        self.job_id.as_ref() == Some(job_id)
    }
}
