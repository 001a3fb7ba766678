//! Request Contexts, Continuations, and the Stage Scope
//!
//! A request context is the unit of work threaded through stages: the
//! request key, the data-set partition fixed at admission, the buffer chain,
//! the current stage (which doubles as the resumption point), and the host's
//! payload. Contexts are recycled through a lookaside cache, so admission
//! normally touches no allocator.
//!
//! Ownership is exclusive: exactly one thread or continuation owns a context
//! at any time, and transfer happens only at `Blocked` → resume boundaries
//! and at fork points.

use super::StageId;
use crate::arena::{Arena, Chain};
use crate::grid::DataSetId;

/// The seed a host submits: a partitioning key plus an opaque payload the
/// engine never interprets (the core is agnostic to what a request means).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSeed<R> {
    /// Key used for data-set assignment and per-stage rehashing.
    pub key: u64,
    /// Host-defined request state, carried through the pipeline.
    pub payload: R,
}

impl<R> RequestSeed<R> {
    /// Creates a seed from a key and payload.
    pub fn new(key: u64, payload: R) -> Self {
        Self { key, payload }
    }
}

/// The per-request state threaded through stages. Engine-internal; stages
/// see it through [`StageScope`].
pub struct RequestContext<R> {
    pub(crate) key: u64,
    pub(crate) dataset: DataSetId,
    /// Current stage; after `Blocked` this is the resumption point.
    pub(crate) stage: StageId,
    pub(crate) chain: Chain,
    /// Present for the whole walk; taken on destruction so the context shell
    /// can be recycled without the payload.
    pub(crate) payload: Option<R>,
    /// Fork seeds queued by the current walk, drained by the dispatcher.
    pub(crate) forks: Vec<(RequestSeed<R>, StageId)>,
}

impl<R> RequestContext<R> {
    /// Creates an empty context shell bound to `arena`.
    pub(crate) fn fresh(arena: Arena) -> Self {
        Self {
            key: 0,
            dataset: DataSetId(0),
            stage: StageId(0),
            chain: Chain::new(arena),
            payload: None,
            forks: Vec::new(),
        }
    }

    /// Re-arms a (possibly recycled) shell for a new request.
    pub(crate) fn arm(&mut self, seed: RequestSeed<R>, entry: StageId, dataset: DataSetId) {
        debug_assert!(self.chain.is_empty(), "recycled context kept a chain");
        debug_assert!(self.payload.is_none(), "recycled context kept a payload");
        debug_assert!(self.forks.is_empty(), "recycled context kept fork seeds");
        self.key = seed.key;
        self.dataset = dataset;
        self.stage = entry;
        self.payload = Some(seed.payload);
    }

    /// Strips the context back to a recyclable shell, dropping payload and
    /// buffer chain.
    pub(crate) fn disarm(&mut self) {
        self.chain.clear();
        self.payload = None;
        self.forks.clear();
    }
}

/// A parked request: saved state sufficient to resume the pipeline walk at
/// the stage that blocked, on any thread, under a fresh admission permit.
///
/// The continuation is consumed by [`Engine::resume`](crate::Engine::resume)
/// or [`Engine::cancel`](crate::Engine::cancel); resuming an
/// already-completed flow is therefore unrepresentable rather than checked at
/// run time.
pub struct Continuation<R> {
    pub(crate) ctx: Box<RequestContext<R>>,
}

impl<R> Continuation<R> {
    /// The parked request's key.
    pub fn key(&self) -> u64 {
        self.ctx.key
    }

    /// The stage the walk will re-enter on resume.
    pub fn stage(&self) -> StageId {
        self.ctx.stage
    }
}

impl<R> core::fmt::Debug for Continuation<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Continuation")
            .field("key", &self.ctx.key)
            .field("stage", &self.ctx.stage)
            .finish()
    }
}

/// What a dispatch function sees: its request plus the arena, scoped to one
/// invocation.
pub struct StageScope<'a, R> {
    ctx: &'a mut RequestContext<R>,
    arena: &'a Arena,
    stage: StageId,
}

impl<'a, R> StageScope<'a, R> {
    pub(crate) fn new(ctx: &'a mut RequestContext<R>, arena: &'a Arena, stage: StageId) -> Self {
        Self { ctx, arena, stage }
    }

    /// The request's partitioning key.
    #[inline]
    pub fn key(&self) -> u64 {
        self.ctx.key
    }

    /// The stage currently executing.
    #[inline]
    pub fn stage(&self) -> StageId {
        self.stage
    }

    /// The host payload.
    #[inline]
    pub fn payload(&self) -> &R {
        self.ctx
            .payload
            .as_ref()
            .expect("payload present for the whole walk")
    }

    /// The host payload, mutably.
    #[inline]
    pub fn payload_mut(&mut self) -> &mut R {
        self.ctx
            .payload
            .as_mut()
            .expect("payload present for the whole walk")
    }

    /// The request's buffer chain.
    #[inline]
    pub fn chain(&self) -> &Chain {
        &self.ctx.chain
    }

    /// The request's buffer chain, mutably (append/prepend/pop only — chains
    /// offer no interior mutation).
    #[inline]
    pub fn chain_mut(&mut self) -> &mut Chain {
        &mut self.ctx.chain
    }

    /// The buffer arena, for acquiring descriptors inside a stage.
    #[inline]
    pub fn arena(&self) -> &Arena {
        self.arena
    }

    /// Forks an independently tracked flow.
    ///
    /// The sibling enters the pipeline at `entry` after the current walk
    /// reaches a terminal outcome, under its own admission permit. The
    /// dispatcher does not special-case forks beyond this: the sibling is a
    /// request like any other.
    pub fn fork(&mut self, seed: RequestSeed<R>, entry: StageId) {
        self.ctx.forks.push((seed, entry));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_disarm_roundtrip() {
        let arena = Arena::new();
        let mut ctx: RequestContext<String> = RequestContext::fresh(arena);
        ctx.arm(
            RequestSeed::new(42, String::from("hello")),
            StageId(1),
            DataSetId(3),
        );
        assert_eq!(ctx.key, 42);
        assert_eq!(ctx.stage, StageId(1));
        assert_eq!(ctx.payload.as_deref(), Some("hello"));

        ctx.disarm();
        assert!(ctx.payload.is_none());
        assert!(ctx.chain.is_empty());
    }

    #[test]
    fn test_scope_accessors_and_fork() {
        let arena = Arena::new();
        let mut ctx: RequestContext<u32> = RequestContext::fresh(arena.clone());
        ctx.arm(RequestSeed::new(9, 100), StageId(0), DataSetId(0));

        let mut scope = StageScope::new(&mut ctx, &arena, StageId(0));
        assert_eq!(scope.key(), 9);
        assert_eq!(*scope.payload(), 100);
        *scope.payload_mut() += 1;
        scope.fork(RequestSeed::new(10, 0), StageId(2));

        assert_eq!(ctx.payload, Some(101));
        assert_eq!(ctx.forks.len(), 1);
    }
}
