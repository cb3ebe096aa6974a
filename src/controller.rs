//! Async driver for the lifecycle state machine.
//!
//! `Controller` owns the `ControllerState`, the single polling interval and
//! the outstanding progress requests. It feeds events into the machine,
//! performs the network and timer effects, and hands every UI effect to a
//! `View`.
use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::{self, JoinError, JoinSet};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::api::ScanBackend;
use crate::config::PollPolicy;
use crate::error::{PollError, StopError, SubmitError};
use crate::machine::{ControllerState, Effect, Event, Phase, TimerId};
use crate::types::{JobId, ProgressSnapshot, ScanRequest};
use crate::view::View;

pub struct Controller<B, V> {
    backend: Arc<B>,
    view: V,
    state: ControllerState,
    ticker: Option<(TimerId, Interval)>,
    inflight: JoinSet<Event>,
    polls: HashMap<task::Id, JobId>,
}

impl<B, V> Controller<B, V>
where
    B: ScanBackend + Send + Sync + 'static,
    V: View,
{
    pub fn new(backend: B, view: V, policy: PollPolicy) -> Self {
        Self::with_shared(Arc::new(backend), view, policy)
    }

    pub fn with_shared(backend: Arc<B>, view: V, policy: PollPolicy) -> Self {
        Self {
            backend,
            view,
            state: ControllerState::new(policy),
            ticker: None,
            inflight: JoinSet::new(),
            polls: HashMap::new(),
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    /// Number of live polling intervals. Never more than one.
    pub fn active_timers(&self) -> usize {
        usize::from(self.ticker.is_some())
    }

    /// Start a new scan. Any job tracked so far is dropped (the server is not
    /// told). On success polling starts at the configured interval.
    pub async fn submit(&mut self, request: ScanRequest) -> Result<JobId, SubmitError> {
        let Some(request) = self.dispatch(Event::SubmitRequested(request)).submit else {
            return Err(SubmitError::Transport(
                "a submission is already in progress".to_string(),
            ));
        };
        match self.backend.submit(&request).await {
            Ok(job_id) => {
                self.dispatch(Event::Submitted(job_id.clone()));
                Ok(job_id)
            }
            Err(error) => {
                self.dispatch(Event::SubmitFailed(error.clone()));
                Err(error)
            }
        }
    }

    /// One progress check outside the timer. `Ok(None)` when nothing is being
    /// polled or a check is already outstanding.
    pub async fn poll_once(&mut self) -> Result<Option<ProgressSnapshot>, PollError> {
        let Some(job_id) = self.dispatch(Event::PollRequested).poll else {
            return Ok(None);
        };
        match self.backend.progress(&job_id).await {
            Ok(snapshot) => {
                self.dispatch(Event::PollSucceeded {
                    job_id,
                    snapshot: snapshot.clone(),
                });
                Ok(Some(snapshot))
            }
            Err(error) => {
                self.dispatch(Event::PollFailed {
                    job_id,
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    /// Ask the server to cancel the tracked job. Does nothing without a job.
    pub async fn stop(&mut self) -> Result<(), StopError> {
        let Some(job_id) = self.dispatch(Event::StopRequested).stop else {
            return Ok(());
        };
        match self.backend.stop(&job_id).await {
            Ok(()) => {
                self.dispatch(Event::StopAcknowledged(job_id));
                Ok(())
            }
            Err(error) => {
                self.dispatch(Event::StopFailed {
                    job_id,
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    /// Navigate to the results of a completed job.
    pub fn view_results(&mut self) {
        self.dispatch(Event::ViewResultsRequested);
    }

    pub fn reset(&mut self) {
        self.dispatch(Event::Reset);
    }

    /// Wait for the next timer tick or progress response and apply it.
    /// Returns `false` once there is nothing left to wait for.
    pub async fn step(&mut self) -> bool {
        tokio::select! {
            Some(joined) = self.inflight.join_next_with_id(), if !self.inflight.is_empty() => {
                self.on_joined(joined);
            }
            id = next_tick(&mut self.ticker), if self.ticker.is_some() => {
                self.dispatch_tick(id);
            }
            else => return false,
        }
        true
    }

    /// Keep polling until the job reaches a terminal phase (or polling ends
    /// for any other reason) and return the final phase.
    pub async fn run_until_settled(&mut self) -> Phase {
        while !self.state.phase().is_terminal() {
            if !self.step().await {
                break;
            }
        }
        self.state.phase()
    }

    fn dispatch(&mut self, event: Event) -> Requests {
        let effects = self.state.on_event(event);
        let mut requests = Requests::default();
        for effect in effects {
            if effect.is_ui() {
                self.view.apply(&effect);
                continue;
            }
            match effect {
                Effect::SendSubmit(request) => requests.submit = Some(request),
                Effect::SendStop(job_id) => requests.stop = Some(job_id),
                Effect::SendPoll(job_id) => requests.poll = Some(job_id),
                Effect::StartTimer { id, every } => {
                    let mut interval = time::interval_at(Instant::now() + every, every);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    if let Some((old, _)) = self.ticker.replace((id, interval)) {
                        debug!(?old, "replaced polling timer");
                    }
                }
                Effect::CancelTimer(id) => {
                    if matches!(self.ticker, Some((current, _)) if current == id) {
                        self.ticker = None;
                    }
                }
                _ => {}
            }
        }
        requests
    }

    fn dispatch_tick(&mut self, id: TimerId) {
        let requests = self.dispatch(Event::TimerFired(id));
        if let Some(job_id) = requests.poll {
            self.spawn_poll(job_id);
        }
    }

    fn spawn_poll(&mut self, job_id: JobId) {
        let backend = Arc::clone(&self.backend);
        let tracked = job_id.clone();
        let handle = self.inflight.spawn(async move {
            match backend.progress(&job_id).await {
                Ok(snapshot) => Event::PollSucceeded { job_id, snapshot },
                Err(error) => Event::PollFailed { job_id, error },
            }
        });
        self.polls.insert(handle.id(), tracked);
    }

    /// A progress task that panicked or was aborted counts as a failed check
    /// so the retry budget still applies.
    fn on_joined(&mut self, joined: Result<(task::Id, Event), JoinError>) {
        let event = match joined {
            Ok((id, event)) => {
                self.polls.remove(&id);
                event
            }
            Err(e) => {
                warn!(error = %e, "progress task did not finish");
                let Some(job_id) = self.polls.remove(&e.id()) else {
                    return;
                };
                Event::PollFailed {
                    job_id,
                    error: PollError::Transport(format!("progress check did not finish: {e}")),
                }
            }
        };
        self.dispatch(event);
    }
}

/// Network calls requested by one transition.
#[derive(Default)]
struct Requests {
    submit: Option<ScanRequest>,
    poll: Option<JobId>,
    stop: Option<JobId>,
}

async fn next_tick(ticker: &mut Option<(TimerId, Interval)>) -> TimerId {
    match ticker {
        Some((id, interval)) => {
            interval.tick().await;
            *id
        }
        None => std::future::pending().await,
    }
}
