//! The Dispatch Engine
//!
//! Ties the five components together behind the host-facing surface: stage
//! registration (via the builder, frozen at build), `submit`, `resume`,
//! `cancel`, and configuration.
//!
//! # The Trampoline
//!
//! The dispatcher is a plain loop, deliberately not a coroutine:
//!
//! ```text
//! permit = gate.enter()
//! ctx    = recycled context, data set assigned
//! loop {
//!     cell = grid[(stage, dataset-for-stage)]
//!     outcome = cell.lock { dispatch(stage, ctx) }
//!     Continue(next) → stage = next            // same thread, no hand-off
//!     Done | fault   → release chain, recycle ctx, return
//!     Blocked        → package continuation, return
//! }
//! permit released; queued forks each run this same loop under a fresh permit
//! ```
//!
//! Workers are symmetric: any thread calling `submit` or `resume` runs any
//! stage. Scalability comes from true parallelism across permits, not from a
//! single-threaded event loop.

use crate::arena::{Arena, ArenaSnapshot};
use crate::gate::AdmissionGate;
use crate::grid::PartitionGrid;
use crate::lookaside::{Lookaside, LookasideSnapshot};
use crate::pipeline::{
    Continuation, Disposition, RequestContext, RequestSeed, StageEntry, StageFault, StageId,
    StageScope, StageTable, SubmitOutcome,
};
use crate::sync::atomic::{AtomicU64, Ordering};
use crate::{EngineConfig, EngineError, Partitioning};

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Per-thread magazine capacity for recycled request contexts.
const CONTEXT_MAGAZINE: usize = 8;

/// Builder for an [`Engine`]. Stages are registered here, once, before any
/// admission; `build` freezes them into a read-only table.
pub struct EngineBuilder<R> {
    config: EngineConfig,
    entries: Vec<Option<StageEntry<R>>>,
    invalid: Option<&'static str>,
}

impl<R> EngineBuilder<R> {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
            invalid: None,
        }
    }

    /// Registers a stage that keeps its admission-time data set
    /// ([`Partitioning::Inherit`]).
    pub fn stage<F>(self, id: StageId, dispatch: F) -> Self
    where
        F: Fn(&mut StageScope<'_, R>) -> crate::pipeline::StageResult + Send + Sync + 'static,
    {
        self.stage_with(id, Partitioning::Inherit, dispatch)
    }

    /// Registers a stage with explicit partition behavior.
    /// [`Partitioning::Rehash`] decorrelates this stage's cells from the
    /// previous stage's.
    pub fn stage_with<F>(mut self, id: StageId, partitioning: Partitioning, dispatch: F) -> Self
    where
        F: Fn(&mut StageScope<'_, R>) -> crate::pipeline::StageResult + Send + Sync + 'static,
    {
        let idx = id.0 as usize;
        if self.entries.len() <= idx {
            self.entries.resize_with(idx + 1, || None);
        }
        if self.entries[idx].is_some() {
            self.invalid = Some("stage id registered twice");
            return self;
        }
        self.entries[idx] = Some(StageEntry {
            dispatch: Box::new(dispatch),
            partitioning,
        });
        self
    }

    /// Freezes the stage table and starts the engine (including the
    /// background sweeper when `sweep_interval` is non-zero).
    pub fn build(self) -> crate::Result<Engine<R>>
    where
        R: Send + 'static,
    {
        if let Some(reason) = self.invalid {
            return Err(EngineError::InvariantViolation(reason));
        }
        if self.entries.iter().all(Option::is_none) {
            return Err(EngineError::InvariantViolation(
                "engine built with no stages",
            ));
        }

        let stage_count = self.entries.len();
        let shared = Arc::new(Shared {
            stages: StageTable::new(self.entries),
            grid: PartitionGrid::new(
                stage_count,
                self.config.dataset_count,
                self.config.dataset_assignment,
            ),
            gate: AdmissionGate::new(self.config.max_active_threads),
            arena: Arena::new(),
            contexts: Lookaside::new(CONTEXT_MAGAZINE),
            counters: Counters::default(),
            config: self.config,
        });

        #[cfg(not(all(feature = "loom-model", loom)))]
        let sweeper = if shared.config.sweep_interval.is_zero() {
            None
        } else {
            Some(SweeperHandle::spawn(Arc::clone(&shared)))
        };

        Ok(Engine {
            shared,
            #[cfg(not(all(feature = "loom-model", loom)))]
            sweeper,
        })
    }
}

/// The request-processing engine.
///
/// See the [crate docs](crate) for the architecture and a usage example.
/// `Engine` is `Send + Sync`; hosts typically share it in an `Arc` across a
/// fixed pool of symmetric worker threads.
pub struct Engine<R> {
    shared: Arc<Shared<R>>,
    #[cfg(not(all(feature = "loom-model", loom)))]
    sweeper: Option<SweeperHandle>,
}

struct Shared<R> {
    stages: StageTable<R>,
    grid: PartitionGrid,
    gate: AdmissionGate,
    arena: Arena,
    contexts: Lookaside<Box<RequestContext<R>>>,
    counters: Counters,
    config: EngineConfig,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    resumed: AtomicU64,
    done: AtomicU64,
    failed: AtomicU64,
    parked: AtomicU64,
    forked: AtomicU64,
    cancelled: AtomicU64,
}

impl<R: Send + 'static> Engine<R> {
    /// Starts configuring an engine.
    pub fn builder(config: EngineConfig) -> EngineBuilder<R> {
        EngineBuilder::new(config)
    }

    /// Admits a request and walks the pipeline from `entry` on the calling
    /// thread.
    ///
    /// Blocks only at the admission gate (bounded by
    /// `config.admission_timeout` if set). Returns the primary flow's
    /// disposition plus one disposition per fork spawned during the walk;
    /// each fork ran under its own permit.
    pub fn submit(
        &self,
        seed: RequestSeed<R>,
        entry: StageId,
    ) -> crate::Result<SubmitOutcome<R>> {
        invariant!(
            self.shared.stages.get(entry).is_some(),
            "submit to an unregistered stage"
        );
        let mut pending = Vec::new();
        let primary = {
            let permit = match self.shared.config.admission_timeout {
                #[cfg(not(all(feature = "loom-model", loom)))]
                Some(timeout) => self.shared.gate.enter_timeout(timeout)?,
                #[cfg(all(feature = "loom-model", loom))]
                Some(_) => self.shared.gate.enter(),
                None => self.shared.gate.enter(),
            };
            // Counted only once admitted, so a timed-out request never
            // appears in the submitted total and the terminal counters keep
            // summing to it.
            self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
            let ctx = self.shared.make_context(seed, entry);
            let disposition = self.shared.walk(ctx, &mut pending);
            drop(permit);
            disposition
        };

        let forks = self.shared.drain_forks(pending);
        Ok(SubmitOutcome { primary, forks })
    }

    /// Re-enters the pipeline at the stage a continuation blocked in, under a
    /// fresh admission permit. Called by external readiness sources (I/O
    /// completion, timers, another thread's cached result).
    pub fn resume(&self, continuation: Continuation<R>) -> SubmitOutcome<R> {
        self.shared.counters.resumed.fetch_add(1, Ordering::Relaxed);

        let mut pending = Vec::new();
        let primary = {
            let permit = self.shared.gate.enter();
            let disposition = self.shared.walk(continuation.ctx, &mut pending);
            drop(permit);
            disposition
        };

        let forks = self.shared.drain_forks(pending);
        SubmitOutcome { primary, forks }
    }

    /// Cancels a parked request before resumption: releases its buffer chain
    /// and recycles its context. Cancellation after resumption has begun is
    /// unrepresentable — `resume` consumes the continuation.
    pub fn cancel(&self, continuation: Continuation<R>) {
        self.shared.counters.cancelled.fetch_add(1, Ordering::Relaxed);
        self.shared.destroy(continuation.ctx);
    }

    /// The engine's buffer arena, for hosts that fill chains before
    /// submitting.
    pub fn arena(&self) -> &Arena {
        &self.shared.arena
    }

    /// Runs one generational sweep over the descriptor and context caches.
    /// The background sweeper calls this on its interval; deterministic tests
    /// call it directly. Returns the number of objects released to the
    /// system allocator.
    pub fn sweep(&self) -> usize {
        self.shared.sweep()
    }

    /// Point-in-time engine statistics for an external collector.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            submitted: self.shared.counters.submitted.load(Ordering::Relaxed),
            resumed: self.shared.counters.resumed.load(Ordering::Relaxed),
            done: self.shared.counters.done.load(Ordering::Relaxed),
            failed: self.shared.counters.failed.load(Ordering::Relaxed),
            parked: self.shared.counters.parked.load(Ordering::Relaxed),
            forked: self.shared.counters.forked.load(Ordering::Relaxed),
            cancelled: self.shared.counters.cancelled.load(Ordering::Relaxed),
            gate_limit: self.shared.gate.limit(),
            gate_peak: self.shared.gate.peak(),
            gate_waits: self.shared.gate.waits(),
            total_contention: self.shared.grid.total_contention(),
            arena: self.shared.arena.stats(),
            contexts: self.shared.contexts.stats(),
        }
    }

    /// Per-cell blocking-acquisition counts, row-major by stage. Consumed by
    /// offline repartitioning tools; the engine never repartitions itself.
    pub fn contention_map(&self) -> Vec<u64> {
        self.shared.grid.contention_map()
    }
}

impl<R> Shared<R> {
    /// Builds (or re-arms a recycled) context for an admitted request.
    fn make_context(&self, seed: RequestSeed<R>, entry: StageId) -> Box<RequestContext<R>> {
        let dataset = self.grid.admit(seed.key);
        let mut ctx = self
            .contexts
            .take()
            .unwrap_or_else(|| Box::new(RequestContext::fresh(self.arena.clone())));
        ctx.arm(seed, entry, dataset);
        ctx
    }

    /// The trampoline: runs stages on the calling thread until the walk
    /// completes, faults, or blocks. Fork seeds queued by stages are moved
    /// onto `pending` for the caller to run once the walk returns.
    fn walk(
        &self,
        mut ctx: Box<RequestContext<R>>,
        pending: &mut Vec<(RequestSeed<R>, StageId)>,
    ) -> Disposition<R> {
        loop {
            let stage = ctx.stage;
            let Some(entry) = self.stages.get(stage) else {
                let fault = StageFault {
                    stage,
                    source: Box::new(EngineError::InvariantViolation(
                        "continue to an unregistered stage",
                    )),
                };
                self.queue_forks(&mut ctx, pending);
                self.destroy(ctx);
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                return Disposition::Failed(fault);
            };

            let dataset = self
                .grid
                .stage_dataset(ctx.key, stage, ctx.dataset, entry.partitioning);

            let outcome = {
                // Everything stage `stage` needs on data set `dataset` lives
                // behind this one cell.
                let _cell = self.grid.cell_for(stage, dataset).acquire();
                let mut scope = StageScope::new(&mut ctx, &self.arena, stage);
                catch_unwind(AssertUnwindSafe(|| (entry.dispatch)(&mut scope)))
            };

            self.queue_forks(&mut ctx, pending);

            match outcome {
                Ok(Ok(crate::StageOutcome::Continue(next))) => {
                    // Same thread, immediately: the whole point.
                    ctx.stage = next;
                }
                Ok(Ok(crate::StageOutcome::Done)) => {
                    self.destroy(ctx);
                    self.counters.done.fetch_add(1, Ordering::Relaxed);
                    return Disposition::Done;
                }
                Ok(Ok(crate::StageOutcome::Blocked)) => {
                    self.counters.parked.fetch_add(1, Ordering::Relaxed);
                    return Disposition::Parked(Continuation { ctx });
                }
                Ok(Err(source)) => {
                    self.destroy(ctx);
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    return Disposition::Failed(StageFault { stage, source });
                }
                Err(panic) => {
                    // A panicking stage is a per-request fault, not an engine
                    // crash: the walk terminates, everything is released.
                    self.destroy(ctx);
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    return Disposition::Failed(StageFault {
                        stage,
                        source: panic_reason(panic),
                    });
                }
            }
        }
    }

    /// Moves fork seeds off a context onto the walk's pending list.
    fn queue_forks(&self, ctx: &mut RequestContext<R>, pending: &mut Vec<(RequestSeed<R>, StageId)>) {
        if !ctx.forks.is_empty() {
            self.counters
                .forked
                .fetch_add(ctx.forks.len() as u64, Ordering::Relaxed);
            pending.extend(ctx.forks.drain(..));
        }
    }

    /// Runs every queued fork (transitively, since a fork may fork) on this
    /// thread, each under its own fresh permit, and reports their
    /// dispositions in the order they ran.
    fn drain_forks(
        &self,
        mut pending: Vec<(RequestSeed<R>, StageId)>,
    ) -> Vec<Disposition<R>> {
        let mut dispositions = Vec::new();
        while let Some((seed, entry)) = pending.pop() {
            let disposition = if self.stages.get(entry).is_some() {
                let permit = self.gate.enter();
                let ctx = self.make_context(seed, entry);
                let disposition = self.walk(ctx, &mut pending);
                drop(permit);
                disposition
            } else {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                Disposition::Failed(StageFault {
                    stage: entry,
                    source: Box::new(EngineError::InvariantViolation(
                        "fork into an unregistered stage",
                    )),
                })
            };
            dispositions.push(disposition);
        }
        dispositions
    }

    /// Terminal teardown: release the chain, retire the data-set residency,
    /// recycle the context shell.
    fn destroy(&self, mut ctx: Box<RequestContext<R>>) {
        let dataset = ctx.dataset;
        ctx.disarm();
        self.grid.retire(dataset);
        self.contexts.give(ctx);
    }

    fn sweep(&self) -> usize {
        self.arena.sweep() + self.contexts.sweep()
    }
}

/// Renders a stage panic into a fault reason.
fn panic_reason(panic: Box<dyn std::any::Any + Send>) -> crate::pipeline::StageError {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        (*message).into()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone().into()
    } else {
        "stage dispatch panicked".into()
    }
}

/// Background sweeper: parks without a permit, takes one only for each sweep
/// burst (the maintenance exemption), and shuts down with the engine.
#[cfg(not(all(feature = "loom-model", loom)))]
struct SweeperHandle {
    shutdown: Arc<(crate::sync::Mutex<bool>, crate::sync::Condvar)>,
    thread: Option<std::thread::JoinHandle<()>>,
}

#[cfg(not(all(feature = "loom-model", loom)))]
impl SweeperHandle {
    fn spawn<R: Send + 'static>(shared: Arc<Shared<R>>) -> Self {
        let shutdown = Arc::new((crate::sync::Mutex::new(false), crate::sync::Condvar::new()));
        let pair = Arc::clone(&shutdown);
        let interval = shared.config.sweep_interval;

        let thread = std::thread::spawn(move || {
            let (lock, cv) = &*pair;
            let mut stop = lock.lock();
            loop {
                if *stop {
                    break;
                }
                let (guard, timed_out) = cv.wait_for(stop, interval);
                stop = guard;
                if *stop {
                    break;
                }
                if timed_out {
                    drop(stop);
                    {
                        // Active burst: counted against the limit only while
                        // actually sweeping.
                        let _permit = shared.gate.enter();
                        shared.sweep();
                    }
                    stop = lock.lock();
                }
            }
        });

        Self {
            shutdown,
            thread: Some(thread),
        }
    }
}

#[cfg(not(all(feature = "loom-model", loom)))]
impl Drop for SweeperHandle {
    fn drop(&mut self) {
        *self.shutdown.0.lock() = true;
        self.shutdown.1.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Point-in-time engine counters, consumed by an external statistics
/// collector.
#[derive(Debug, Clone)]
pub struct EngineStats {
    /// Requests submitted.
    pub submitted: u64,
    /// Continuations resumed.
    pub resumed: u64,
    /// Flows that reached `Done`.
    pub done: u64,
    /// Flows terminated by a stage fault (or panic).
    pub failed: u64,
    /// Walks suspended with `Blocked`.
    pub parked: u64,
    /// Fork seeds queued by stages.
    pub forked: u64,
    /// Continuations cancelled before resumption.
    pub cancelled: u64,
    /// Configured admission limit.
    pub gate_limit: usize,
    /// Highest simultaneous permit count observed.
    pub gate_peak: usize,
    /// Admissions that had to wait.
    pub gate_waits: u64,
    /// Sum of all cells' blocking acquisitions.
    pub total_contention: u64,
    /// Buffer arena counters.
    pub arena: ArenaSnapshot,
    /// Request-context cache counters.
    pub contexts: LookasideSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Assignment, StageOutcome, StageScope};

    fn config() -> EngineConfig {
        EngineConfig {
            max_active_threads: 2,
            sweep_interval: core::time::Duration::ZERO, // tests drive sweep()
            dataset_count: 4,
            dataset_assignment: Assignment::Static,
            admission_timeout: None,
        }
    }

    #[test]
    fn test_linear_pipeline_done() {
        let engine: Engine<Vec<u16>> = Engine::builder(config())
            .stage(StageId(0), |scope: &mut StageScope<'_, Vec<u16>>| {
                scope.payload_mut().push(0);
                Ok(StageOutcome::Continue(StageId(1)))
            })
            .stage(StageId(1), |scope| {
                scope.payload_mut().push(1);
                Ok(StageOutcome::Done)
            })
            .build()
            .unwrap();

        let outcome = engine
            .submit(RequestSeed::new(1, Vec::new()), StageId(0))
            .unwrap();
        assert!(outcome.primary.is_done());
        assert!(outcome.forks.is_empty());
        assert_eq!(engine.stats().done, 1);
    }

    #[test]
    fn test_submit_unregistered_stage_rejected() {
        let engine: Engine<()> = Engine::builder(config())
            .stage(StageId(0), |_| Ok(StageOutcome::Done))
            .build()
            .unwrap();
        let err = engine
            .submit(RequestSeed::new(0, ()), StageId(9))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolation(_)));
    }

    #[test]
    fn test_duplicate_stage_rejected_at_build() {
        let result: crate::Result<Engine<()>> = Engine::builder(config())
            .stage(StageId(0), |_| Ok(StageOutcome::Done))
            .stage(StageId(0), |_| Ok(StageOutcome::Done))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_stage_fault_terminates_only_that_request() {
        let engine: Engine<bool> = Engine::builder(config())
            .stage(StageId(0), |scope| {
                if *scope.payload() {
                    Err("poisoned request".into())
                } else {
                    Ok(StageOutcome::Done)
                }
            })
            .build()
            .unwrap();

        let bad = engine.submit(RequestSeed::new(1, true), StageId(0)).unwrap();
        match bad.primary {
            Disposition::Failed(fault) => {
                assert_eq!(fault.stage, StageId(0));
                assert!(fault.to_string().contains("poisoned"));
            }
            other => panic!("expected fault, got {other:?}"),
        }

        // The engine is unharmed; the next request completes.
        let good = engine.submit(RequestSeed::new(2, false), StageId(0)).unwrap();
        assert!(good.primary.is_done());
        assert_eq!(engine.stats().failed, 1);
        assert_eq!(engine.stats().done, 1);
    }

    #[test]
    fn test_stage_panic_reported_as_fault() {
        let engine: Engine<()> = Engine::builder(config())
            .stage(StageId(0), |_| panic!("dispatch bug"))
            .build()
            .unwrap();

        let outcome = engine.submit(RequestSeed::new(0, ()), StageId(0)).unwrap();
        match outcome.primary {
            Disposition::Failed(fault) => assert!(fault.to_string().contains("dispatch bug")),
            other => panic!("expected fault, got {other:?}"),
        }
        // Permit released despite the panic.
        let again = engine.submit(RequestSeed::new(0, ()), StageId(0)).unwrap();
        assert!(matches!(again.primary, Disposition::Failed(_)));
    }

    #[test]
    fn test_block_resume_lifecycle() {
        let engine: Engine<u32> = Engine::builder(config())
            .stage(StageId(0), |scope| {
                if *scope.payload() == 0 {
                    Ok(StageOutcome::Blocked)
                } else {
                    Ok(StageOutcome::Continue(StageId(1)))
                }
            })
            .stage(StageId(1), |_| Ok(StageOutcome::Done))
            .build()
            .unwrap();

        let parked = engine
            .submit(RequestSeed::new(5, 0), StageId(0))
            .unwrap()
            .primary
            .into_parked()
            .expect("blocked at stage 0");
        assert_eq!(parked.stage(), StageId(0));
        assert_eq!(parked.key(), 5);

        // No permit is held while parked.
        assert_eq!(engine.stats().gate_peak, 1);

        // External event: flip the payload condition via a fresh walk. The
        // continuation resumes at the recorded stage on this thread.
        let mut parked = parked;
        *continuation_payload(&mut parked) = 1;
        let outcome = engine.resume(parked);
        assert!(outcome.primary.is_done());
        assert_eq!(engine.stats().resumed, 1);
    }

    // Test-only backdoor to mutate a parked payload, standing in for the
    // external readiness source's side effect.
    fn continuation_payload<R>(continuation: &mut Continuation<R>) -> &mut R {
        continuation
            .ctx
            .payload
            .as_mut()
            .expect("parked context keeps its payload")
    }

    #[test]
    fn test_cancel_releases_resources() {
        let engine: Engine<()> = Engine::builder(config())
            .stage(StageId(0), |scope| {
                let mut buf = scope.arena().acquire(64)?;
                buf.fill(b"pending")?;
                scope.chain_mut().push_back(buf)?;
                Ok(StageOutcome::Blocked)
            })
            .build()
            .unwrap();

        let parked = engine
            .submit(RequestSeed::new(0, ()), StageId(0))
            .unwrap()
            .primary
            .into_parked()
            .unwrap();

        assert_eq!(engine.arena().live(), 1);
        engine.cancel(parked);
        assert_eq!(engine.arena().live(), 0);
        assert_eq!(engine.stats().cancelled, 1);
    }

    #[test]
    fn test_fork_runs_independently() {
        let engine: Engine<u32> = Engine::builder(config())
            .stage(StageId(0), |scope| {
                scope.fork(RequestSeed::new(scope.key() + 100, 7), StageId(1));
                Ok(StageOutcome::Done)
            })
            .stage(StageId(1), |scope| {
                assert_eq!(*scope.payload(), 7);
                Ok(StageOutcome::Done)
            })
            .build()
            .unwrap();

        let outcome = engine.submit(RequestSeed::new(1, 0), StageId(0)).unwrap();
        assert!(outcome.primary.is_done());
        assert_eq!(outcome.forks.len(), 1);
        assert!(outcome.forks[0].is_done());
        assert_eq!(engine.stats().forked, 1);
        assert_eq!(engine.stats().done, 2);
    }

    #[test]
    fn test_context_recycling() {
        let engine: Engine<()> = Engine::builder(config())
            .stage(StageId(0), |_| Ok(StageOutcome::Done))
            .build()
            .unwrap();

        for key in 0..100 {
            engine.submit(RequestSeed::new(key, ()), StageId(0)).unwrap();
        }
        let stats = engine.stats();
        // One shell allocated, ninety-nine reuses.
        assert_eq!(stats.contexts.gives, 100);
        assert_eq!(stats.contexts.reuse_hits, 99);
    }

    #[test]
    fn test_engine_sweep_releases_idle_objects() {
        let engine: Engine<()> = Engine::builder(config())
            .stage(StageId(0), |scope| {
                let buf = scope.arena().acquire(32)?;
                scope.chain_mut().push_back(buf)?;
                Ok(StageOutcome::Done)
            })
            .build()
            .unwrap();

        engine.submit(RequestSeed::new(0, ()), StageId(0)).unwrap();
        assert_eq!(engine.sweep(), 0);
        // Second sweep releases the descriptor and the context shell — unless
        // they were parked in this thread's magazines, which sweeps exempt.
        let _ = engine.sweep();
        assert_eq!(engine.arena().live(), 0);
    }
}
