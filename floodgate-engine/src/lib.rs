//! Floodgate: Bounded-Concurrency Stage-Pipelined Dispatch Engine
//!
//! This crate implements a request-processing core built to survive extreme
//! request rates by eliminating, in order of cost, data copies, context
//! switches, allocator trips, and lock contention.
//!
//! # Architecture
//!
//! The engine is organized into five components, leaves first:
//!
//! - [`arena`]: zero-copy buffer descriptors with reference counting; the
//!   substrate every other component passes around instead of raw data
//! - [`lookaside`]: generational (new/old) free-object cache with a sweeper,
//!   keeping the general-purpose allocator off the hot path
//! - [`grid`]: a stage × data-set matrix of independent lock domains
//! - [`gate`]: a counting semaphore bounding active worker threads to
//!   roughly the number of usable processors
//! - [`pipeline`] / [`engine`]: the symmetric dispatcher — a thread executing
//!   one stage immediately executes the next, with no hand-off, until the
//!   request completes, blocks, or forks
//!
//! # Concurrency Model
//!
//! Workers are plain OS threads and fully symmetric: no thread is permanently
//! a listener or a worker. A thread acquires admission, enters the pipeline
//! at the request's entry stage, and loops stage-to-stage on the same thread
//! (a trampoline, deliberately not a user-space coroutine) until the walk
//! returns. Suspension points are exactly two: a stage returning
//! [`StageOutcome::Blocked`] and the semaphore wait in the admission gate.
//! Stages must not block on I/O directly; they hand off to an external
//! readiness source and return `Blocked`.
//!
//! Contention invariant: two requests contend only if they share both a stage
//! and a data set. Per-stage rehashing decorrelates hot cells across stages.
//!
//! # Example
//!
//! ```rust
//! use floodgate_engine::{
//!     Disposition, Engine, EngineConfig, RequestSeed, StageId, StageOutcome,
//! };
//!
//! const PARSE: StageId = StageId(0);
//! const REPLY: StageId = StageId(1);
//!
//! let engine: Engine<u64> = Engine::builder(EngineConfig::default())
//!     .stage(PARSE, |scope| {
//!         *scope.payload_mut() += 1;
//!         Ok(StageOutcome::Continue(REPLY))
//!     })
//!     .stage(REPLY, |_scope| Ok(StageOutcome::Done))
//!     .build()
//!     .unwrap();
//!
//! let outcome = engine.submit(RequestSeed::new(7, 41), PARSE).unwrap();
//! assert!(matches!(outcome.primary, Disposition::Done));
//! ```
//!
//! # Feature Flags
//!
//! - `statistics`: extended hot-path counters (reuse-hit breakdowns)
//! - `loom-model`: Loom primitives for exhaustive model checking

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

/// Checks an invariant at an API boundary.
///
/// A violation is fatal in debug builds — aborting loudly beats letting the
/// caller continue toward shared-state corruption — and is rejected with
/// [`EngineError::InvariantViolation`] before any shared state is touched in
/// release builds. Test builds take the rejection path as well; that is what
/// lets the rejection contract itself be asserted on.
#[macro_export]
macro_rules! invariant {
    ($cond:expr, $msg:expr) => {
        if !$cond {
            #[cfg(all(debug_assertions, not(test)))]
            {
                panic!("invariant violated: {}", $msg);
            }
            #[cfg(not(all(debug_assertions, not(test))))]
            {
                return Err($crate::EngineError::InvariantViolation($msg));
            }
        }
    };
}

pub mod sync;

pub mod arena;
pub mod gate;
pub mod grid;
pub mod lookaside;
pub mod pipeline;

mod engine;

pub use arena::{Arena, BufRef, Chain};
pub use engine::{Engine, EngineBuilder, EngineStats};
pub use gate::{AdmissionGate, Permit};
pub use grid::{Assignment, DataSetId, PartitionGrid, Partitioning};
pub use lookaside::{Lookaside, LookasideSnapshot, LookasideStats};
pub use pipeline::{
    Continuation, Disposition, RequestSeed, StageFault, StageId, StageOutcome, StageScope,
    SubmitOutcome,
};

use core::num::NonZeroUsize;
use core::time::Duration;

/// Error types for the engine core.
///
/// Per-request errors ([`StageFault`]) are deliberately not part of this
/// enum: a fault in a registered dispatch function terminates that request
/// only and never crashes the engine or other in-flight requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The lookaside cache and the raw allocator are both exhausted.
    OutOfMemory,
    /// The bounded wait on the admission gate elapsed before a permit became
    /// available; the request never entered the pipeline.
    AdmissionTimeout,
    /// An invariant was violated at an API boundary (e.g. mutation of a
    /// shared buffer, dispatch to an unregistered stage). Fatal in debug
    /// builds; in release builds the operation is rejected before shared
    /// state is touched.
    InvariantViolation(&'static str),
}

impl core::fmt::Display for EngineError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EngineError::OutOfMemory => write!(f, "lookaside cache and raw allocator exhausted"),
            EngineError::AdmissionTimeout => {
                write!(f, "admission gate wait exceeded the configured bound")
            }
            EngineError::InvariantViolation(msg) => write!(f, "invariant violated: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Result alias for engine operations.
pub type Result<T> = core::result::Result<T, EngineError>;

/// Engine configuration.
///
/// Recognized options mirror the external contract: active-thread limit,
/// sweep interval, data-set count, and the data-set assignment policy.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on threads actively processing requests. Defaults to the
    /// number of usable processors; oversubscription is treated as a defect,
    /// not tuned around.
    pub max_active_threads: usize,
    /// Interval between background sweeps of the lookaside caches. A zero
    /// interval disables the background sweeper (callers may drive
    /// [`Engine::sweep`] themselves, which tests do for determinism).
    pub sweep_interval: Duration,
    /// Number of data-set partitions in the lock grid.
    pub dataset_count: usize,
    /// Policy for assigning a request to a data set at admission.
    pub dataset_assignment: Assignment,
    /// Optional bound on the admission wait in [`Engine::submit`]. `None`
    /// waits indefinitely.
    pub admission_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_active_threads: usable_processors(),
            sweep_interval: Duration::from_millis(100),
            dataset_count: 16,
            dataset_assignment: Assignment::Static,
            admission_timeout: None,
        }
    }
}

/// Returns the number of usable processors, falling back to 1 when the
/// platform cannot report it.
pub fn usable_processors() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
