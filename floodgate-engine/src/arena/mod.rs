//! Buffer Arena
//!
//! Zero-copy buffer management: every component of the engine passes
//! reference-counted buffer descriptors around instead of raw data. The arena
//! is the single acquisition point; descriptors whose reference count reaches
//! zero return to a generational [`Lookaside`](crate::Lookaside) cache, so the
//! hot path touches the general-purpose allocator only when the cache misses.
//!
//! # Lifecycle
//!
//! ```text
//! acquire(size) ──► lookaside hit? ──► reuse descriptor (+ region)
//!                        │ miss
//!                        ▼
//!                  raw region alloc ──► null? ──► OutOfMemory
//!
//! last BufRef drop ──► recycle into lookaside (never straight to free)
//! sweep            ──► unreused descriptors age out to the system allocator
//! ```
//!
//! # Invariants
//!
//! 1. A descriptor is destroyed (recycled) exactly when its reference count
//!    reaches zero — no double-free, no leak.
//! 2. A descriptor with count > 1 is logically immutable: shared holders can
//!    read, only a sole holder can write.
//! 3. Chains are singly-owned; splitting or interior removal is not offered.

mod chain;
mod descriptor;

pub use chain::{Chain, ChainIter};
pub use descriptor::BufRef;

use crate::lookaside::{Lookaside, LookasideSnapshot};
use crate::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use descriptor::{Descriptor, Region};

use core::ptr::NonNull;
use std::sync::Arc;

/// Per-thread magazine capacity for cached descriptors.
const DESCRIPTOR_MAGAZINE: usize = 8;

/// The buffer arena: acquisition point for descriptors and chains.
///
/// Cloning an `Arena` is cheap (shared pool); all clones serve the same
/// descriptor cache.
///
/// # Example
///
/// ```rust
/// use floodgate_engine::Arena;
///
/// let arena = Arena::new();
/// let buf = arena.acquire(4096).unwrap();
/// drop(buf);
///
/// // The descriptor was recycled, not freed: the next acquire reuses it.
/// let again = arena.acquire(4096).unwrap();
/// assert_eq!(again.capacity(), 4096);
/// assert_eq!(arena.stats().raw_allocs, 1);
/// ```
pub struct Arena {
    pool: Arc<Pool>,
}

struct Pool {
    cache: Lookaside<Box<Descriptor>>,
    acquires: AtomicU64,
    raw_allocs: AtomicU64,
    regrows: AtomicU64,
    live: AtomicUsize,
}

impl Arena {
    /// Creates an arena with the default per-thread magazine size.
    pub fn new() -> Self {
        Self::with_magazine(DESCRIPTOR_MAGAZINE)
    }

    /// Creates an arena whose descriptor cache uses per-thread magazines of
    /// `capacity` entries (zero disables them; deterministic tests do this).
    pub fn with_magazine(capacity: usize) -> Self {
        Self {
            pool: Arc::new(Pool {
                cache: Lookaside::new(capacity),
                acquires: AtomicU64::new(0),
                raw_allocs: AtomicU64::new(0),
                regrows: AtomicU64::new(0),
                live: AtomicUsize::new(0),
            }),
        }
    }

    /// Acquires a descriptor with at least `size` bytes of capacity.
    ///
    /// Tries the lookaside cache first; a cached descriptor whose region is
    /// too small gets its region reallocated (counted as a regrow). Fails
    /// with [`EngineError::OutOfMemory`](crate::EngineError::OutOfMemory)
    /// only after both the cache and the raw allocator come up empty.
    pub fn acquire(&self, size: usize) -> crate::Result<BufRef> {
        self.pool.acquires.fetch_add(1, Ordering::Relaxed);

        let mut desc: Box<Descriptor> = match self.pool.cache.take() {
            Some(mut desc) => {
                if desc.region.capacity() < size {
                    desc.region = Region::alloc(size)?;
                    self.pool.regrows.fetch_add(1, Ordering::Relaxed);
                }
                desc
            }
            None => {
                self.pool.raw_allocs.fetch_add(1, Ordering::Relaxed);
                Box::new(Descriptor::with_region(Region::alloc(size)?))
            }
        };

        desc.reset();
        desc.refs.store(1, Ordering::Relaxed);
        self.pool.live.fetch_add(1, Ordering::Relaxed);

        let desc = NonNull::from(Box::leak(desc));
        // SAFETY: the descriptor was just given exactly one reference, now
        // owned by the returned handle.
        Ok(unsafe { BufRef::from_parts(desc, self.clone()) })
    }

    /// Creates an empty buffer chain backed by this arena.
    pub fn new_chain(&self) -> Chain {
        Chain::new(self.clone())
    }

    /// Runs one generational sweep of the descriptor cache, releasing
    /// descriptors unreused for a full interval. Returns the count released.
    pub fn sweep(&self) -> usize {
        self.pool.cache.sweep()
    }

    /// Number of descriptors currently held by handles or chains.
    pub fn live(&self) -> usize {
        self.pool.live.load(Ordering::Relaxed)
    }

    /// Snapshot of the arena's counters.
    pub fn stats(&self) -> ArenaSnapshot {
        ArenaSnapshot {
            acquires: self.pool.acquires.load(Ordering::Relaxed),
            raw_allocs: self.pool.raw_allocs.load(Ordering::Relaxed),
            regrows: self.pool.regrows.load(Ordering::Relaxed),
            live: self.pool.live.load(Ordering::Relaxed),
            cache: self.pool.cache.stats(),
        }
    }

    /// Whether two arena handles share one descriptor pool.
    pub fn same_pool(a: &Arena, b: &Arena) -> bool {
        Arc::ptr_eq(&a.pool, &b.pool)
    }

    /// Takes back a descriptor whose last reference just dropped.
    pub(crate) fn recycle(&self, desc: NonNull<Descriptor>) {
        // SAFETY: called exactly once per descriptor, on the count-to-zero
        // path; the pointer came from Box::leak in acquire().
        let mut desc = unsafe { Box::from_raw(desc.as_ptr()) };
        desc.reset();
        self.pool.live.fetch_sub(1, Ordering::Relaxed);
        self.pool.cache.give(desc);
    }
}

impl Clone for Arena {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
        }
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Arena {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Arena")
            .field("live", &self.live())
            .finish_non_exhaustive()
    }
}

/// Point-in-time copy of the arena's counters, consumed by an external
/// statistics collector.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArenaSnapshot {
    /// Total descriptor acquisitions.
    pub acquires: u64,
    /// Acquisitions that had to allocate a fresh descriptor.
    pub raw_allocs: u64,
    /// Cached descriptors whose region was too small and was reallocated.
    pub regrows: u64,
    /// Descriptors currently held.
    pub live: usize,
    /// Counters of the underlying descriptor cache.
    pub cache: LookasideSnapshot,
}
