//! Scenario pool controller
//!
//! The controller keeps `target` scenarios running. Every decision to spawn is taken under a
//! single lock over [`PoolState`], while scenario construction and execution happen outside of
//! it. Lowering the target never interrupts running scenarios; the pool converges lazily as
//! they complete and are not replaced.
use crate::error::PoolError;
use crate::scenario::{FactoryError, Scenario, ScenarioError, ScenarioFactory};
use crate::summary::RunSummary;
use crate::telemetry;
use futures_util::FutureExt;
use std::collections::HashSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use traffirator_core::{GeneratorConfig, PoolStats, RunMode};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

/// Lifecycle of a [`PoolController`].
///
/// Draining is not a phase of its own: it is a `Running` pool which has been asked to stop, or
/// which has started every scenario of a finite run, and still has active scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    Running,
    Finished,
    TornDown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::NotStarted => "not started",
            Phase::Running => "running",
            Phase::Finished => "finished",
            Phase::TornDown => "torn down",
        };
        f.write_str(name)
    }
}

/// Ownership token of one running scenario. Consumed when its completion is observed.
#[derive(Debug)]
pub(crate) struct ScenarioHandle {
    id: u64,
}

/// Result of a spawn burst.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SpawnOutcome {
    /// Scenarios created and running.
    pub started: usize,
    /// Scenarios the factory could not create. They count as completed immediately.
    pub failed: usize,
}

impl SpawnOutcome {
    pub fn attempted(&self) -> usize {
        self.started + self.failed
    }
}

#[derive(Debug)]
struct PoolState {
    phase: Phase,
    target: usize,
    active: usize,
    started: u64,
    completed: u64,
    failed: u64,
    stopping: bool,
    finished: bool,
    next_id: u64,
    live: HashSet<u64>,
}

impl PoolState {
    fn new(target: usize) -> Self {
        Self {
            phase: Phase::NotStarted,
            target,
            active: 0,
            started: 0,
            completed: 0,
            failed: 0,
            stopping: false,
            finished: false,
            next_id: 0,
            live: HashSet::new(),
        }
    }

    /// Number of scenarios to spawn right now to close the gap to `target`.
    fn deficit(&self, mode: RunMode) -> usize {
        if self.phase != Phase::Running || self.stopping {
            return 0;
        }

        let wanted = self.target.saturating_sub(self.active);
        match mode.remaining(self.started) {
            Some(remaining) => (wanted as u64).min(remaining) as usize,
            None => wanted,
        }
    }

    fn reserve(&mut self, count: usize) -> Vec<ScenarioHandle> {
        (0..count)
            .map(|_| {
                let id = self.next_id;
                self.next_id += 1;
                self.started += 1;
                self.active += 1;
                self.live.insert(id);
                ScenarioHandle { id }
            })
            .collect()
    }

    /// Returns `false` if the handle is not live, in which case nothing is counted.
    fn release(&mut self, handle: ScenarioHandle, failed: bool) -> bool {
        if !self.live.remove(&handle.id) {
            return false;
        }

        self.active -= 1;
        self.completed += 1;
        if failed {
            self.failed += 1;
        }
        true
    }

    /// Returns `true` only on the transition to finished.
    fn update_finished(&mut self, mode: RunMode) -> bool {
        if self.finished {
            return false;
        }

        let exhausted = matches!(mode, RunMode::Finite(total) if self.completed == total);
        if (self.stopping && self.active == 0) || exhausted {
            self.finished = true;
            self.phase = Phase::Finished;
            true
        } else {
            false
        }
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            target: self.target,
            active: self.active,
            started: self.started,
            completed: self.completed,
            failed: self.failed,
        }
    }
}

struct Inner<F> {
    factory: F,
    mode: RunMode,
    state: Mutex<PoolState>,
    finished_tx: watch::Sender<bool>,
    summary: Arc<RunSummary>,
}

impl<F: ScenarioFactory> Inner<F> {
    fn lock(&self) -> Result<MutexGuard<'_, PoolState>, PoolError> {
        Ok(self.state.lock()?)
    }

    fn snapshot(&self) -> PoolStats {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats()
    }

    /// Must be called with the state lock held, right after `update_finished` returned `true`.
    fn notify_finished(&self, state: &PoolState) {
        info!(
            "Scenario pool finished: {} started, {} completed, {} failed",
            state.started, state.completed, state.failed
        );
        self.finished_tx.send_replace(true);
    }

    /// Create and launch a scenario for every reserved handle. Runs outside the state lock.
    fn spawn(self: &Arc<Self>, handles: Vec<ScenarioHandle>) -> SpawnOutcome {
        let mut outcome = SpawnOutcome::default();

        for handle in handles {
            let inner = self.clone();
            match self.create() {
                Ok(scenario) => {
                    outcome.started += 1;
                    trace!("Starting scenario {}", handle.id);
                    tokio::spawn(
                        async move {
                            let result = AssertUnwindSafe(scenario.run())
                                .catch_unwind()
                                .await
                                .unwrap_or(Err(ScenarioError::Panicked));
                            inner.report(handle, result);
                        }
                        .in_current_span(),
                    );
                }
                Err(err) => {
                    outcome.failed += 1;
                    warn!("Scenario {} could not be created: {err}", handle.id);
                    // NOTE: Reported from its own task so that a factory which always fails
                    // cannot recurse through replacements.
                    tokio::spawn(
                        async move {
                            inner.report(handle, Err(err.into()));
                        }
                        .in_current_span(),
                    );
                }
            }
        }

        outcome
    }

    /// A panicking factory is treated like a failing one, so the reserved slot is still
    /// released.
    fn create(&self) -> Result<F::Scenario, FactoryError> {
        std::panic::catch_unwind(AssertUnwindSafe(|| self.factory.create()))
            .unwrap_or_else(|_| Err(FactoryError::new("factory panicked")))
    }

    fn report(self: &Arc<Self>, handle: ScenarioHandle, result: Result<(), ScenarioError>) {
        if let Err(err) = self.complete(handle, result) {
            error!("Unable to record scenario completion: {err}");
        }
    }

    fn complete(
        self: &Arc<Self>,
        handle: ScenarioHandle,
        result: Result<(), ScenarioError>,
    ) -> Result<(), PoolError> {
        let id = handle.id;
        match &result {
            Ok(()) => trace!("Scenario {id} completed"),
            Err(ScenarioError::Factory(_)) => {}
            Err(err) => warn!("Scenario {id} failed: {err}"),
        }

        let replacements = {
            let mut state = self.lock()?;
            if !state.release(handle, result.is_err()) {
                warn!("Ignoring completion of unknown scenario {id}");
                return Ok(());
            }
            telemetry::completed(result.is_err(), &state.stats());

            let count = state.deficit(self.mode).min(1);
            let replacements = state.reserve(count);
            if !replacements.is_empty() {
                telemetry::started(replacements.len(), &state.stats());
            }

            if state.update_finished(self.mode) {
                self.notify_finished(&state);
            }
            replacements
        };

        self.spawn(replacements);
        Ok(())
    }
}

/// Keeps a target number of scenarios running.
///
/// Cheap to clone; clones share the same pool. All operations may be called concurrently from
/// any task, but spawning requires a Tokio runtime.
pub struct PoolController<F> {
    inner: Arc<Inner<F>>,
}

impl<F> Clone for PoolController<F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<F: ScenarioFactory> PoolController<F> {
    pub fn new(
        factory: F,
        mode: RunMode,
        initial_concurrency: usize,
        summary: Arc<RunSummary>,
    ) -> Self {
        let (finished_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                factory,
                mode,
                state: Mutex::new(PoolState::new(initial_concurrency)),
                finished_tx,
                summary,
            }),
        }
    }

    /// Build a pool from the raw configuration, rejecting a negative concurrency and call
    /// counts other than `-1` below zero.
    pub fn from_config(
        factory: F,
        config: &GeneratorConfig,
        summary: Arc<RunSummary>,
    ) -> Result<Self, PoolError> {
        let mode = config.run_mode()?;
        let initial_concurrency = config.initial_concurrency()?;
        Ok(Self::new(factory, mode, initial_concurrency, summary))
    }

    pub fn mode(&self) -> RunMode {
        self.inner.mode
    }

    pub fn summary(&self) -> &Arc<RunSummary> {
        &self.inner.summary
    }

    /// Start spawning scenarios up to the target concurrency.
    #[instrument(name = "pool", skip_all, fields(mode = %self.inner.mode))]
    pub fn start(&self) -> Result<SpawnOutcome, PoolError> {
        let handles = {
            let mut state = self.inner.lock()?;
            if state.phase != Phase::NotStarted {
                return Err(PoolError::InvalidState {
                    op: "start",
                    phase: state.phase,
                });
            }

            state.phase = Phase::Running;
            let count = state.deficit(self.inner.mode);
            let handles = state.reserve(count);
            info!(
                "Starting scenario pool with target concurrency {}, spawning {}",
                state.target,
                handles.len()
            );
            telemetry::started(handles.len(), &state.stats());

            if state.update_finished(self.inner.mode) {
                self.inner.notify_finished(&state);
            }
            handles
        };

        Ok(self.inner.spawn(handles))
    }

    /// Change the number of scenarios which should run at once.
    ///
    /// Raising the target spawns the missing scenarios immediately. Lowering it never stops a
    /// running scenario: completions are simply not replaced until the pool is back under the
    /// target. Every call is recorded in the run summary, including repeated values.
    pub fn set_target_concurrency(&self, target: usize) -> Result<SpawnOutcome, PoolError> {
        let handles = {
            let mut state = self.inner.lock()?;
            if matches!(state.phase, Phase::Finished | Phase::TornDown) {
                return Err(PoolError::InvalidState {
                    op: "set target concurrency",
                    phase: state.phase,
                });
            }

            state.target = target;
            let count = state.deficit(self.inner.mode);
            let handles = state.reserve(count);
            debug!(
                "Target concurrency set to {target}; {} active, spawning {}",
                state.active,
                handles.len()
            );
            if !handles.is_empty() {
                telemetry::started(handles.len(), &state.stats());
            }
            handles
        };

        let outcome = self.inner.spawn(handles);
        self.inner.summary.record_change(target)?;
        Ok(outcome)
    }

    /// Stop spawning scenarios and let the active ones drain.
    ///
    /// If nothing is active the pool is finished by the time this returns.
    pub fn request_stop(&self) -> Result<(), PoolError> {
        let mut state = self.inner.lock()?;
        match state.phase {
            Phase::TornDown => {
                return Err(PoolError::InvalidState {
                    op: "request stop",
                    phase: state.phase,
                })
            }
            Phase::Finished => return Ok(()),
            Phase::NotStarted | Phase::Running => {}
        }

        if !state.stopping {
            info!("Stop requested with {} active scenarios", state.active);
            state.stopping = true;
        }

        if state.update_finished(self.inner.mode) {
            self.inner.notify_finished(&state);
        }
        Ok(())
    }

    /// Resolves once the pool is finished. Returns immediately if it already is.
    pub async fn wait_until_finished(&self) {
        let mut finished_rx = self.inner.finished_tx.subscribe();
        // NOTE: The sender lives in `self.inner`, which we hold, so the channel cannot close.
        let _ = finished_rx.wait_for(|finished| *finished).await;
    }

    pub fn is_finished(&self) -> bool {
        *self.inner.finished_tx.borrow()
    }

    /// Snapshot of the active scenario count. May be stale by the time it is read.
    pub fn current_active_count(&self) -> usize {
        self.inner.snapshot().active
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.snapshot()
    }

    pub fn phase(&self) -> Phase {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .phase
    }

    /// Close a finished pool and return its final counters. Any later mutating call fails.
    pub fn teardown(&self) -> Result<PoolStats, PoolError> {
        let mut state = self.inner.lock()?;
        if state.phase != Phase::Finished {
            return Err(PoolError::InvalidState {
                op: "tear down",
                phase: state.phase,
            });
        }

        state.phase = Phase::TornDown;
        info!("Scenario pool torn down");
        Ok(state.stats())
    }
}
