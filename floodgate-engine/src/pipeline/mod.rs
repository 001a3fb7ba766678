//! Stage Pipeline Types
//!
//! A stage is an immutable identifier plus a dispatch function from request
//! to outcome. Stages are registered once, before any admission, and the
//! stage table is read-only thereafter — there is no per-request stage
//! mutation.
//!
//! # Outcome Contract
//!
//! A dispatch function is invoked exactly once per `Continue`/resumption and
//! must not assume it is the first or last stage in the chain. It returns:
//!
//! - [`StageOutcome::Continue`]: the same thread immediately runs the named
//!   stage — no queue, no hand-off
//! - [`StageOutcome::Done`]: the request's resources are released
//! - [`StageOutcome::Blocked`]: the walk suspends; the stage has handed the
//!   request to an external readiness source that will
//!   [`resume`](crate::Engine::resume) it later, possibly on another thread
//! - `Err(...)`: a per-request fault; the walk terminates with
//!   [`Disposition::Failed`] and never crashes the engine or other requests
//!
//! Stages must not block inside the dispatch function: the two legal
//! suspension points are the `Blocked` outcome and the admission gate.

mod request;

pub use request::{Continuation, RequestContext, RequestSeed, StageScope};

use core::fmt;

/// Identifier of a registered stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(pub u16);

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage#{}", self.0)
    }
}

/// What a stage decided about its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Run the named stage next, on this same thread, immediately.
    Continue(StageId),
    /// The request is complete; release its resources.
    Done,
    /// The request is waiting on an external event; park it as a
    /// continuation and free this thread.
    Blocked,
}

/// The error type a dispatch function may fail with.
pub type StageError = Box<dyn std::error::Error + Send + Sync>;

/// Result of one dispatch invocation.
pub type StageResult = Result<StageOutcome, StageError>;

/// A per-request fault raised by a stage.
///
/// Faults terminate only the faulting request's walk; for permit and
/// resource accounting they are identical to `Done`.
#[derive(Debug)]
pub struct StageFault {
    /// The stage whose dispatch failed.
    pub stage: StageId,
    /// What the stage reported.
    pub source: StageError,
}

impl fmt::Display for StageFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.source)
    }
}

impl std::error::Error for StageFault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Terminal report for one pipeline flow (a submitted request, a resumed
/// continuation, or a forked sibling).
#[derive(Debug)]
pub enum Disposition<R> {
    /// The flow ran to completion.
    Done,
    /// A stage faulted; the flow's resources were released.
    Failed(StageFault),
    /// A stage returned `Blocked`; ownership of the flow now rests with
    /// whatever external event will resume this continuation.
    Parked(Continuation<R>),
}

impl<R> Disposition<R> {
    /// Whether this flow completed successfully.
    pub fn is_done(&self) -> bool {
        matches!(self, Disposition::Done)
    }

    /// Extracts the continuation of a parked flow.
    pub fn into_parked(self) -> Option<Continuation<R>> {
        match self {
            Disposition::Parked(continuation) => Some(continuation),
            _ => None,
        }
    }
}

/// Everything one `submit`/`resume` call produced: the primary flow's
/// disposition plus one disposition per fork spawned during the walk
/// (transitively — a fork may fork).
#[derive(Debug)]
pub struct SubmitOutcome<R> {
    /// Disposition of the submitted or resumed flow.
    pub primary: Disposition<R>,
    /// Dispositions of forked sibling flows, in the order they ran.
    pub forks: Vec<Disposition<R>>,
}

/// A registered stage: dispatch function plus partition behavior.
pub(crate) struct StageEntry<R> {
    pub(crate) dispatch: Box<DispatchFn<R>>,
    pub(crate) partitioning: crate::Partitioning,
}

/// Dispatch function signature shared by every registered stage.
pub(crate) type DispatchFn<R> =
    dyn Fn(&mut StageScope<'_, R>) -> StageResult + Send + Sync + 'static;

/// The frozen stage table: built once by the engine builder, read-only for
/// the engine's lifetime.
pub(crate) struct StageTable<R> {
    entries: Box<[Option<StageEntry<R>>]>,
}

impl<R> StageTable<R> {
    pub(crate) fn new(entries: Vec<Option<StageEntry<R>>>) -> Self {
        Self {
            entries: entries.into_boxed_slice(),
        }
    }

    #[inline]
    pub(crate) fn get(&self, id: StageId) -> Option<&StageEntry<R>> {
        self.entries.get(id.0 as usize).and_then(Option::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_id_display() {
        assert_eq!(StageId(3).to_string(), "stage#3");
    }

    #[test]
    fn test_fault_display_carries_stage_and_reason() {
        let fault = StageFault {
            stage: StageId(7),
            source: "checksum mismatch".into(),
        };
        assert_eq!(fault.to_string(), "stage#7 failed: checksum mismatch");
    }

    #[test]
    fn test_disposition_predicates() {
        let done: Disposition<()> = Disposition::Done;
        assert!(done.is_done());
        assert!(done.into_parked().is_none());
    }
}
