//! Bounded probe scheduler.
//!
//! Probes run as tasks on a [`JoinSet`], at most `concurrency` at a time (the
//! semaphore permit travels into the task). One select loop dispatches new
//! probes, receives finished ones and records them through the
//! [`ResultSink`], so counters and partition files only ever change in one
//! place.
//!
//! Pause is cooperative: it stops dispatch and lets running probes finish.
//! Cancel stops dispatch and drops the running probe futures, which kills any
//! child processes they spawned.

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::descriptor::StreamDescriptor;
use crate::error::{CheckError, Result};
use crate::probe::{ProbeOutcome, ProbeStrategy, Verdict};
use crate::sink::{ResultSink, RunState};

/// Pause/resume/cancel handle shared between a run and its caller.
#[derive(Debug, Clone)]
pub struct RunControl {
    inner: Arc<ControlInner>,
}

#[derive(Debug)]
struct ControlInner {
    paused: watch::Sender<bool>,
    cancel: CancellationToken,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    #[must_use]
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            inner: Arc::new(ControlInner {
                paused,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Stop dispatching new probes. Running probes finish normally.
    pub fn pause(&self) {
        self.inner.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.inner.paused.send_replace(false);
    }

    /// Stop dispatching and abandon running probes.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_paused(&self) -> bool {
        *self.inner.paused.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.paused.subscribe()
    }

    fn token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Wait until not paused. Returns `false` if the run was cancelled first.
    async fn wait_resumed(&self) -> bool {
        let mut paused = self.subscribe();
        loop {
            if self.is_cancelled() {
                return false;
            }
            if !*paused.borrow_and_update() {
                return true;
            }
            tokio::select! {
                () = self.inner.cancel.cancelled() => return false,
                changed = paused.changed() => {
                    if changed.is_err() {
                        return true;
                    }
                }
            }
        }
    }
}

/// Receives outcomes and progress from the scheduler's consumer loop.
pub trait RunObserver: Send {
    fn on_outcome(&mut self, outcome: &ProbeOutcome, state: &RunState);

    fn on_progress(&mut self, _state: &RunState) {}
}

impl RunObserver for () {
    fn on_outcome(&mut self, _outcome: &ProbeOutcome, _state: &RunState) {}
}

/// Terminal report of a run, complete or cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub total: usize,
    pub completed: usize,
    pub valid: usize,
    pub invalid: usize,
    pub cancelled: bool,
    pub write_failures: usize,
    #[serde(rename = "elapsed_ms", serialize_with = "crate::probe::as_millis")]
    pub elapsed: Duration,
}

/// Dispatches one probe per descriptor with a fixed concurrency limit.
pub struct Scheduler {
    probe: Arc<dyn ProbeStrategy>,
    concurrency: usize,
    control: RunControl,
    probe_deadline: Option<Duration>,
}

impl Scheduler {
    pub fn new(probe: Arc<dyn ProbeStrategy>, concurrency: usize, control: RunControl) -> Result<Self> {
        if concurrency == 0 {
            return Err(CheckError::InvalidConcurrency);
        }
        Ok(Self {
            probe,
            concurrency,
            control,
            probe_deadline: None,
        })
    }

    /// Hard upper bound on a single probe, on top of the probe's own timeouts.
    #[must_use]
    pub fn with_probe_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.probe_deadline = deadline;
        self
    }

    /// Probe every descriptor and record each outcome in `sink`.
    ///
    /// Returns when all dispatched probes have reported, or as soon as running
    /// probes have wound down after a cancel.
    #[instrument(skip_all, fields(run_id = %run_id, total = descriptors.len()))]
    pub async fn run(
        &self,
        run_id: Uuid,
        descriptors: Arc<[StreamDescriptor]>,
        sink: &mut ResultSink,
        observer: &mut dyn RunObserver,
    ) -> RunSummary {
        let start = Instant::now();
        let total = descriptors.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut paused_rx = self.control.subscribe();
        let cancel = self.control.token();

        let mut tasks: JoinSet<(usize, Option<ProbeOutcome>)> = JoinSet::new();
        // dispatched but not yet recorded
        let mut pending = BTreeSet::new();
        let mut next = 0usize;

        info!(concurrency = self.concurrency, "Starting run");

        // paused before the loop subscribed
        if self.control.is_paused() {
            sink.state_mut().paused = true;
            observer.on_progress(sink.state());
        }

        loop {
            let dispatching = next < total && !cancel.is_cancelled();
            if !dispatching && tasks.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => match joined {
                    Ok((index, Some(outcome))) => {
                        pending.remove(&index);
                        Self::record(sink, observer, &outcome).await;
                    }
                    Ok((index, None)) => {
                        pending.remove(&index);
                        debug!(index, "Probe abandoned on cancel");
                    }
                    Err(e) => error!(error = %e, "Probe task did not complete"),
                },

                () = cancel.cancelled(), if !sink.state().cancelled => {
                    warn!(in_flight = tasks.len(), "Run cancelled");
                    sink.state_mut().cancelled = true;
                    observer.on_progress(sink.state());
                }

                changed = paused_rx.changed() => {
                    if changed.is_ok() {
                        let paused = *paused_rx.borrow_and_update();
                        info!(paused, "Dispatch {}", if paused { "paused" } else { "resumed" });
                        sink.state_mut().paused = paused;
                        observer.on_progress(sink.state());
                    }
                }

                permit = self.next_permit(&semaphore), if dispatching => {
                    if let Some(permit) = permit {
                        let index = next;
                        next += 1;
                        pending.insert(index);
                        tasks.spawn(probe_task(
                            Arc::clone(&self.probe),
                            descriptors[index].clone(),
                            index,
                            permit,
                            cancel.clone(),
                            self.probe_deadline,
                        ));
                    }
                }
            }
        }

        // A task that died without reporting still owes an outcome.
        if !cancel.is_cancelled() {
            for index in std::mem::take(&mut pending) {
                let outcome = ProbeOutcome::new(
                    descriptors[index].clone(),
                    Verdict::Invalid,
                    Some("probe task aborted".to_string()),
                );
                Self::record(sink, observer, &outcome).await;
            }
        }

        let state = sink.state();
        let summary = RunSummary {
            run_id,
            total,
            completed: state.completed,
            valid: state.valid_count,
            invalid: state.invalid_count,
            cancelled: cancel.is_cancelled(),
            write_failures: state.write_failures,
            elapsed: start.elapsed(),
        };

        info!(
            completed = summary.completed,
            valid = summary.valid,
            invalid = summary.invalid,
            cancelled = summary.cancelled,
            "Run finished in {:.1}s",
            summary.elapsed.as_secs_f64()
        );

        summary
    }

    /// Wait for a free slot while not paused. `None` once cancelled.
    async fn next_permit(&self, semaphore: &Arc<Semaphore>) -> Option<OwnedSemaphorePermit> {
        loop {
            if !self.control.wait_resumed().await {
                return None;
            }

            let permit = tokio::select! {
                permit = Arc::clone(semaphore).acquire_owned() => permit.ok()?,
                () = self.control.inner.cancel.cancelled() => return None,
            };

            // paused while waiting for the slot
            if self.control.is_paused() {
                drop(permit);
                continue;
            }
            return Some(permit);
        }
    }

    async fn record(sink: &mut ResultSink, observer: &mut dyn RunObserver, outcome: &ProbeOutcome) {
        let state = sink.record(outcome).await;
        info!(
            url = %outcome.descriptor.url(),
            verdict = ?outcome.verdict,
            detail = outcome.detail.as_deref().unwrap_or(""),
            "[{}/{}] {}",
            state.completed,
            state.total,
            outcome.descriptor.display_name()
        );
        observer.on_outcome(outcome, state);
        observer.on_progress(state);
    }
}

async fn probe_task(
    probe: Arc<dyn ProbeStrategy>,
    descriptor: StreamDescriptor,
    index: usize,
    permit: OwnedSemaphorePermit,
    cancel: CancellationToken,
    deadline: Option<Duration>,
) -> (usize, Option<ProbeOutcome>) {
    let _permit = permit;
    let start = Instant::now();

    let guarded = AssertUnwindSafe(run_probe(probe.as_ref(), &descriptor, deadline)).catch_unwind();

    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        result = guarded => Some(result.unwrap_or_else(|panic| {
            ProbeOutcome::new(
                descriptor.clone(),
                Verdict::Invalid,
                Some(format!("probe panicked: {}", panic_message(panic.as_ref()))),
            )
            .with_elapsed(start.elapsed())
        })),
    };

    (index, outcome)
}

async fn run_probe(
    probe: &dyn ProbeStrategy,
    descriptor: &StreamDescriptor,
    deadline: Option<Duration>,
) -> ProbeOutcome {
    let Some(limit) = deadline else {
        return probe.probe(descriptor).await;
    };

    match tokio::time::timeout(limit, probe.probe(descriptor)).await {
        Ok(outcome) => outcome,
        Err(_) => ProbeOutcome::new(
            descriptor.clone(),
            Verdict::TimedOut,
            Some(format!("exceeded probe deadline of {}ms", limit.as_millis())),
        )
        .with_elapsed(limit),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
