//! Session controller: the state machine a front end drives.
//!
//! ```text
//! Idle --load--> Loaded --start--> Running <--pause/resume--> Paused
//!   ^                                 |                          |
//!   +------ run finished or cancelled-+--------------------------+
//! ```
//!
//! The current state is published on a `watch` channel. A started run hands
//! back a [`RunHandle`] carrying the control handle, an event stream and the
//! join handle that resolves to the [`RunSummary`].

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::descriptor::{DescriptorStore, StreamDescriptor};
use crate::error::{CheckError, Result};
use crate::fingerprint::{random_identity, ClientIdentity};
use crate::probe::{
    FfmpegProbe, HttpReachability, ProbeOutcome, ProbeStrategy, ReachabilityProbe, TwoStageProbe,
};
use crate::scheduler::{RunControl, RunObserver, RunSummary, Scheduler};
use crate::sink::{ResultSink, RunState};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Loaded,
    Running,
    Paused,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Loaded => "loaded",
            SessionState::Running => "running",
            SessionState::Paused => "paused",
        }
    }

    fn is_active(self) -> bool {
        matches!(self, SessionState::Running | SessionState::Paused)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a run reports while it executes.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// One descriptor was classified and persisted.
    Outcome { outcome: ProbeOutcome, state: RunState },
    /// Counters or pause/cancel flags changed.
    Progress(RunState),
    /// Last event of a run.
    Finished(RunSummary),
}

/// Handle to a started run.
#[derive(Debug)]
pub struct RunHandle {
    pub run_id: Uuid,
    pub control: RunControl,
    pub events: mpsc::UnboundedReceiver<RunEvent>,
    pub join: JoinHandle<RunSummary>,
}

/// Where and how a session runs its probes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub concurrency: usize,
    pub valid_path: PathBuf,
    pub invalid_path: PathBuf,
    pub probe_deadline: Option<Duration>,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            concurrency: config.concurrency,
            valid_path: config.valid_path(),
            invalid_path: config.invalid_path(),
            probe_deadline: config.probe_deadline(),
        }
    }
}

/// Forwards scheduler callbacks as [`RunEvent`]s.
struct ChannelObserver {
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl RunObserver for ChannelObserver {
    fn on_outcome(&mut self, outcome: &ProbeOutcome, state: &RunState) {
        // a dropped receiver just means nobody is watching
        let _ = self.tx.send(RunEvent::Outcome {
            outcome: outcome.clone(),
            state: state.clone(),
        });
    }

    fn on_progress(&mut self, state: &RunState) {
        let _ = self.tx.send(RunEvent::Progress(state.clone()));
    }
}

/// Owns the loaded descriptors and at most one run at a time.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

struct Inner {
    probe: Arc<dyn ProbeStrategy>,
    settings: SessionSettings,
    state: watch::Sender<SessionState>,
    store: Mutex<DescriptorStore>,
    control: Mutex<Option<RunControl>>,
}

impl Inner {
    fn with_control<T>(&self, f: impl FnOnce(&mut Option<RunControl>) -> T) -> T {
        let mut guard = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    fn with_store<T>(&self, f: impl FnOnce(&mut DescriptorStore) -> T) -> T {
        let mut guard = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Back to Idle once the run is over.
    fn finish(&self) {
        self.state.send_modify(|state| {
            self.with_control(|control| *control = None);
            *state = SessionState::Idle;
        });
    }

    /// Undo a start whose setup failed.
    fn abort_start(&self) {
        self.state.send_modify(|state| {
            self.with_control(|control| *control = None);
            *state = SessionState::Loaded;
        });
    }
}

/// Rolls a claimed start back to Loaded unless the run was spawned.
///
/// Covers setup errors and a `start` future dropped mid-setup alike.
struct StartGuard<'a> {
    inner: &'a Inner,
    armed: bool,
}

impl StartGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!("Start did not complete, back to loaded");
            self.inner.abort_start();
        }
    }
}

impl SessionController {
    pub fn new(probe: Arc<dyn ProbeStrategy>, settings: SessionSettings) -> Result<Self> {
        if settings.concurrency == 0 {
            return Err(CheckError::InvalidConcurrency);
        }
        let (state, _) = watch::channel(SessionState::Idle);
        Ok(Self {
            inner: Arc::new(Inner {
                probe,
                settings,
                state,
                store: Mutex::new(DescriptorStore::new()),
                control: Mutex::new(None),
            }),
        })
    }

    /// Build the probe strategy and settings described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        Self::new(build_probe(config)?, SessionSettings::from(config))
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    /// Number of descriptors currently loaded.
    pub fn loaded(&self) -> usize {
        self.inner.with_store(|store| store.len())
    }

    /// Replace the descriptor set and move to Loaded.
    ///
    /// An empty set is rejected and leaves the session untouched.
    pub fn load(&self, descriptors: Vec<StreamDescriptor>) -> Result<usize> {
        let count = descriptors.len();
        let mut result = Ok(count);
        let mut descriptors = Some(descriptors);

        self.inner.state.send_if_modified(|state| {
            if state.is_active() {
                result = Err(CheckError::InvalidTransition {
                    from: state.as_str(),
                    action: "load",
                });
                return false;
            }
            if count == 0 {
                result = Err(CheckError::EmptyInput);
                return false;
            }
            if let Some(descriptors) = descriptors.take() {
                self.inner.with_store(|store| store.load(descriptors));
            }
            let changed = *state != SessionState::Loaded;
            *state = SessionState::Loaded;
            changed
        });

        if result.is_ok() {
            info!(count, "Loaded descriptors");
        }
        result
    }

    /// Start probing the loaded descriptors.
    ///
    /// Output files are created and truncated and the probe is checked
    /// before anything is dispatched; a failure there is returned and the
    /// session stays Loaded.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<RunHandle> {
        let control = RunControl::new();
        let mut claimed = Err(CheckError::EmptyInput);

        self.inner.state.send_if_modified(|state| match *state {
            SessionState::Running | SessionState::Paused => {
                claimed = Err(CheckError::AlreadyRunning);
                false
            }
            SessionState::Idle => {
                claimed = Err(if self.inner.with_store(|store| store.is_empty()) {
                    CheckError::EmptyInput
                } else {
                    CheckError::InvalidTransition {
                        from: state.as_str(),
                        action: "start",
                    }
                });
                false
            }
            SessionState::Loaded => {
                claimed = self.inner.with_store(|store| store.snapshot());
                if claimed.is_err() {
                    return false;
                }
                self.inner
                    .with_control(|current| *current = Some(control.clone()));
                *state = SessionState::Running;
                true
            }
        });
        let descriptors = claimed?;
        let guard = StartGuard {
            inner: &self.inner,
            armed: true,
        };

        let sink = self.prepare(descriptors.len()).await?;

        let scheduler = Scheduler::new(
            Arc::clone(&self.inner.probe),
            self.inner.settings.concurrency,
            control.clone(),
        )?
        .with_probe_deadline(self.inner.settings.probe_deadline);

        let run_id = Uuid::new_v4();
        let (tx, events) = mpsc::unbounded_channel();
        let inner = Arc::clone(&self.inner);

        info!(%run_id, total = descriptors.len(), "Run started");

        let join = tokio::spawn(async move {
            let mut sink = sink;
            let mut observer = ChannelObserver { tx: tx.clone() };
            let summary = scheduler
                .run(run_id, descriptors, &mut sink, &mut observer)
                .await;
            inner.finish();
            let _ = tx.send(RunEvent::Finished(summary.clone()));
            summary
        });
        guard.disarm();

        Ok(RunHandle {
            run_id,
            control,
            events,
            join,
        })
    }

    async fn prepare(&self, total: usize) -> Result<ResultSink> {
        self.inner.probe.prepare().await?;
        let settings = &self.inner.settings;
        ResultSink::create(&settings.valid_path, &settings.invalid_path, total).await
    }

    /// Running -> Paused. Probes already in flight still report.
    pub fn pause(&self) -> Result<()> {
        self.transition("pause", |state, control| match state {
            SessionState::Running => {
                control.pause();
                Some(SessionState::Paused)
            }
            _ => None,
        })
    }

    /// Paused -> Running.
    pub fn resume(&self) -> Result<()> {
        self.transition("resume", |state, control| match state {
            SessionState::Paused => {
                control.resume();
                Some(SessionState::Running)
            }
            _ => None,
        })
    }

    /// Stop the current run. The session returns to Idle once running probes
    /// have wound down.
    pub fn cancel(&self) -> Result<()> {
        self.transition("cancel", |state, control| {
            state.is_active().then(|| {
                control.cancel();
                state
            })
        })
    }

    fn transition(
        &self,
        action: &'static str,
        apply: impl FnOnce(SessionState, &RunControl) -> Option<SessionState>,
    ) -> Result<()> {
        let mut result = Ok(());
        self.inner.state.send_if_modified(|state| {
            let from = *state;
            let next = self
                .inner
                .with_control(|control| control.as_ref().and_then(|c| apply(from, c)));
            match next {
                Some(next) => {
                    debug!(%from, %next, action, "Session transition");
                    *state = next;
                    next != from
                }
                None => {
                    result = Err(CheckError::InvalidTransition {
                        from: from.as_str(),
                        action,
                    });
                    false
                }
            }
        });
        result
    }
}

/// Assemble the probe strategy `config` asks for.
///
/// With `deep_probe` off this is a plain reachability check; otherwise the
/// reachability check is followed by an ffmpeg content probe.
pub fn build_probe(config: &Config) -> Result<Arc<dyn ProbeStrategy>> {
    let identity = match (&config.user_agent, config.rotate_user_agent) {
        (Some(ua), _) => ClientIdentity::with_user_agent(ua),
        (None, true) => random_identity(),
        (None, false) => ClientIdentity::default(),
    };
    let timeouts = config.timeouts();
    let client = Arc::new(HttpReachability::new(
        &identity,
        config.method,
        timeouts.reachability,
    )?);

    if !config.deep_probe {
        return Ok(Arc::new(ReachabilityProbe::new(client, timeouts.reachability)));
    }

    let mut ffmpeg = FfmpegProbe::new().with_user_agent(&identity.user_agent);
    if let Some(path) = &config.ffmpeg_path {
        ffmpeg = ffmpeg.with_ffmpeg_path(&path.to_string_lossy());
    }
    Ok(Arc::new(TwoStageProbe::new(client, Arc::new(ffmpeg), timeouts)))
}
