//! Generational Lookaside Allocator
//!
//! A reuse cache for freed objects that keeps the general-purpose allocator
//! off the hot path. Each cache holds two independently locked lists, `new`
//! and `old`, plus small cache-padded per-thread magazines in front of them;
//! the shared lists are the overflow fallback for every thread.
//!
//! # Algorithm
//!
//! ```text
//! take():  magazine pop → new-list pop → old-list pop → None (caller
//!          falls back to raw allocation)
//! give(x): magazine push (if below capacity) → new-list push
//! sweep(): 1. lock new list, lock old list   (order fixed everywhere)
//!          2. capture old-list contents for bulk release
//!          3. old ← new, new ← empty         (O(1) pointer swaps)
//!          4. unlock both
//!          5. outside any lock, drop every captured object
//! ```
//!
//! # Staleness Invariant
//!
//! Sweeps are numbered logical ticks. An object given back during the
//! interval after sweep `T` sits in `new`; sweep `T+1` demotes it to `old`;
//! sweep `T+2` releases it to the system allocator. An unreused object
//! therefore survives at least one full sweep interval past its release and
//! strictly less than two — exactly bounding staleness.
//!
//! The sweeper holds both locks only for the O(1) reassignment in steps 1–4,
//! never while freeing, so no `take`/`give` ever waits behind a bulk release.
//!
//! Magazines are the "per-thread private instance" escape hatch: they are
//! capacity-bounded and exempt from aging (a magazine slot is, by
//! construction, about to be reused). A capacity of zero disables them, which
//! the deterministic staleness tests rely on.

use crate::sync::atomic::{AtomicU64, Ordering};
use crate::sync::Mutex;
use crossbeam_utils::CachePadded;

/// Number of per-thread magazine slots. Threads beyond this many share slots;
/// each slot has its own uncontended lock so correctness is unaffected.
const MAGAZINE_SLOTS: usize = 64;

/// A generational free-object cache for objects of type `T`.
///
/// `take` and `give` are safe to call from any number of threads; `sweep` may
/// run concurrently with both (typically from the engine's background sweeper
/// thread, which holds an admission permit only while actively sweeping).
///
/// # Example
///
/// ```rust
/// use floodgate_engine::Lookaside;
///
/// let cache: Lookaside<Vec<u8>> = Lookaside::new(0);
/// cache.give(Vec::with_capacity(4096));
///
/// let buf = cache.take().expect("cached object is reusable");
/// assert_eq!(buf.capacity(), 4096);
/// ```
pub struct Lookaside<T> {
    /// Objects released since the last sweep.
    new_list: Mutex<Vec<T>>,
    /// Objects that have survived exactly one sweep unreused.
    old_list: Mutex<Vec<T>>,
    /// Per-thread front caches, exempt from aging.
    magazines: Box<[CachePadded<Mutex<Vec<T>>>]>,
    /// Capacity of each magazine; zero disables the magazine path.
    magazine_capacity: usize,
    /// Completed sweep count (the logical clock).
    tick: AtomicU64,
    stats: LookasideStats,
}

impl<T> Lookaside<T> {
    /// Creates a cache whose per-thread magazines hold up to
    /// `magazine_capacity` objects each. Zero disables magazines entirely,
    /// routing every `give` through the aged shared lists.
    pub fn new(magazine_capacity: usize) -> Self {
        let slots = if magazine_capacity == 0 {
            0
        } else {
            MAGAZINE_SLOTS
        };
        let magazines = (0..slots)
            .map(|_| CachePadded::new(Mutex::new(Vec::with_capacity(magazine_capacity))))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            new_list: Mutex::new(Vec::new()),
            old_list: Mutex::new(Vec::new()),
            magazines,
            magazine_capacity,
            tick: AtomicU64::new(0),
            stats: LookasideStats::default(),
        }
    }

    /// Takes a reusable object, trying this thread's magazine, then the `new`
    /// list, then the `old` list.
    ///
    /// Returns `None` when the cache is empty; the caller then falls back to
    /// raw allocation (and surfaces `OutOfMemory` only if that also fails).
    pub fn take(&self) -> Option<T> {
        self.stats.takes.fetch_add(1, Ordering::Relaxed);

        if let Some(slot) = self.magazine() {
            if let Some(obj) = slot.lock().pop() {
                self.stats.reuse_hits.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "statistics")]
                self.stats.hits_magazine.fetch_add(1, Ordering::Relaxed);
                return Some(obj);
            }
        }

        if let Some(obj) = self.new_list.lock().pop() {
            self.stats.reuse_hits.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "statistics")]
            self.stats.hits_new.fetch_add(1, Ordering::Relaxed);
            return Some(obj);
        }

        if let Some(obj) = self.old_list.lock().pop() {
            self.stats.reuse_hits.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "statistics")]
            self.stats.hits_old.fetch_add(1, Ordering::Relaxed);
            return Some(obj);
        }

        None
    }

    /// Returns an object to the cache.
    ///
    /// Overflowing the magazine inserts onto the `new` list, so a returned
    /// object always starts a fresh staleness clock.
    pub fn give(&self, obj: T) {
        self.stats.gives.fetch_add(1, Ordering::Relaxed);

        if let Some(slot) = self.magazine() {
            let mut magazine = slot.lock();
            if magazine.len() < self.magazine_capacity {
                magazine.push(obj);
                return;
            }
        }

        self.new_list.lock().push(obj);
    }

    /// Runs one sweep: demotes `new` to `old` and releases the previous `old`
    /// generation to the system allocator. Returns the number of objects
    /// released.
    ///
    /// Both list locks are held only for the O(1) swap; the captured objects
    /// are dropped after both locks are released.
    pub fn sweep(&self) -> usize {
        let captured = {
            // Fixed order: new before old, identical at every acquisition site.
            let mut new_list = self.new_list.lock();
            let mut old_list = self.old_list.lock();
            let captured = core::mem::take(&mut *old_list);
            *old_list = core::mem::take(&mut *new_list);
            captured
        };

        self.tick.fetch_add(1, Ordering::Relaxed);
        self.stats.sweeps.fetch_add(1, Ordering::Relaxed);
        self.stats
            .released
            .fetch_add(captured.len() as u64, Ordering::Relaxed);

        let count = captured.len();
        drop(captured);
        count
    }

    /// Returns the logical clock: the number of completed sweeps.
    #[inline]
    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of the cache's counters.
    pub fn stats(&self) -> LookasideSnapshot {
        self.stats.snapshot()
    }

    /// Number of objects currently parked on the `new` list.
    pub fn new_len(&self) -> usize {
        self.new_list.lock().len()
    }

    /// Number of objects currently parked on the `old` list.
    pub fn old_len(&self) -> usize {
        self.old_list.lock().len()
    }

    /// Resolves this thread's magazine slot, if magazines are enabled.
    #[cfg(not(all(feature = "loom-model", loom)))]
    fn magazine(&self) -> Option<&Mutex<Vec<T>>> {
        if self.magazines.is_empty() {
            return None;
        }
        Some(&*self.magazines[thread_slot() % self.magazines.len()])
    }

    // Loom simulates threads inside one OS thread; the magazine fast path is
    // skipped there to keep the model's state space on the shared lists.
    #[cfg(all(feature = "loom-model", loom))]
    fn magazine(&self) -> Option<&Mutex<Vec<T>>> {
        None
    }
}

/// Assigns each OS thread a stable small integer for magazine indexing.
#[cfg(not(all(feature = "loom-model", loom)))]
fn thread_slot() -> usize {
    use core::sync::atomic::{AtomicUsize as StdAtomicUsize, Ordering as StdOrdering};

    static NEXT_SLOT: StdAtomicUsize = StdAtomicUsize::new(0);

    thread_local! {
        static SLOT: core::cell::Cell<Option<usize>> = const { core::cell::Cell::new(None) };
    }

    SLOT.with(|cell| {
        if let Some(slot) = cell.get() {
            return slot;
        }
        let slot = NEXT_SLOT.fetch_add(1, StdOrdering::Relaxed);
        cell.set(Some(slot));
        slot
    })
}

/// Atomic counters describing a cache's behavior.
///
/// Consumed by an external statistics collector via [`Lookaside::stats`];
/// the cache itself never acts on them.
#[derive(Default)]
pub struct LookasideStats {
    takes: AtomicU64,
    gives: AtomicU64,
    reuse_hits: AtomicU64,
    released: AtomicU64,
    sweeps: AtomicU64,
    #[cfg(feature = "statistics")]
    hits_magazine: AtomicU64,
    #[cfg(feature = "statistics")]
    hits_new: AtomicU64,
    #[cfg(feature = "statistics")]
    hits_old: AtomicU64,
}

impl LookasideStats {
    fn snapshot(&self) -> LookasideSnapshot {
        LookasideSnapshot {
            takes: self.takes.load(Ordering::Relaxed),
            gives: self.gives.load(Ordering::Relaxed),
            reuse_hits: self.reuse_hits.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            #[cfg(feature = "statistics")]
            hits_magazine: self.hits_magazine.load(Ordering::Relaxed),
            #[cfg(feature = "statistics")]
            hits_new: self.hits_new.load(Ordering::Relaxed),
            #[cfg(feature = "statistics")]
            hits_old: self.hits_old.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`LookasideStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookasideSnapshot {
    /// Total `take` calls (hits and misses).
    pub takes: u64,
    /// Total `give` calls.
    pub gives: u64,
    /// `take` calls satisfied from the cache.
    pub reuse_hits: u64,
    /// Objects released to the system allocator by sweeps.
    pub released: u64,
    /// Completed sweeps.
    pub sweeps: u64,
    /// Hits satisfied by this thread's magazine.
    #[cfg(feature = "statistics")]
    pub hits_magazine: u64,
    /// Hits satisfied by the shared `new` list.
    #[cfg(feature = "statistics")]
    pub hits_new: u64,
    /// Hits satisfied by the shared `old` list.
    #[cfg(feature = "statistics")]
    pub hits_old: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_from_empty() {
        let cache: Lookaside<u32> = Lookaside::new(0);
        assert!(cache.take().is_none());
    }

    #[test]
    fn test_give_then_take_reuses() {
        let cache: Lookaside<String> = Lookaside::new(0);
        cache.give(String::from("reusable"));
        assert_eq!(cache.take().as_deref(), Some("reusable"));

        let stats = cache.stats();
        assert_eq!(stats.gives, 1);
        assert_eq!(stats.reuse_hits, 1);
    }

    #[test]
    fn test_magazine_front_cache() {
        let cache: Lookaside<u32> = Lookaside::new(4);
        for i in 0..4 {
            cache.give(i);
        }
        // All four fit in this thread's magazine; shared lists stay empty.
        assert_eq!(cache.new_len(), 0);

        // Overflow spills to the shared new list.
        cache.give(99);
        assert_eq!(cache.new_len(), 1);

        for _ in 0..5 {
            assert!(cache.take().is_some());
        }
        assert!(cache.take().is_none());
    }

    #[test]
    fn test_staleness_bound() {
        // Freed at tick 0: must survive sweep 1 (demoted to old) and be
        // released by sweep 2 — at least one interval, strictly less than two.
        let cache: Lookaside<u64> = Lookaside::new(0);
        for i in 0..100 {
            cache.give(i);
        }
        assert_eq!(cache.tick(), 0);
        assert_eq!(cache.new_len(), 100);

        let released = cache.sweep();
        assert_eq!(released, 0);
        assert_eq!(cache.tick(), 1);
        assert_eq!(cache.old_len(), 100);
        assert_eq!(cache.new_len(), 0);

        let released = cache.sweep();
        assert_eq!(released, 100);
        assert_eq!(cache.tick(), 2);
        assert_eq!(cache.old_len(), 0);
        assert_eq!(cache.stats().released, 100);
    }

    #[test]
    fn test_reuse_resets_staleness_clock() {
        let cache: Lookaside<u64> = Lookaside::new(0);
        cache.give(7);
        cache.sweep(); // now in old

        let obj = cache.take().expect("old list still serves takes");
        cache.give(obj); // back on new: fresh clock

        assert_eq!(cache.sweep(), 0); // old was empty (object had been taken)
        assert_eq!(cache.sweep(), 1); // released on the second sweep after give
    }

    #[test]
    fn test_take_prefers_new_over_old() {
        let cache: Lookaside<&'static str> = Lookaside::new(0);
        cache.give("elder");
        cache.sweep();
        cache.give("fresh");

        assert_eq!(cache.take(), Some("fresh"));
        assert_eq!(cache.take(), Some("elder"));
    }

    #[test]
    fn test_sweep_release_happens_outside_locks() {
        // A Drop impl that re-enters the cache must not deadlock: the sweep
        // contract is that captured objects are dropped after both locks are
        // released.
        use std::sync::Arc;

        struct Reentrant {
            cache: Arc<Lookaside<Reentrant>>,
            probe: bool,
        }

        impl Drop for Reentrant {
            fn drop(&mut self) {
                if self.probe {
                    // Touching both lists from inside drop would deadlock if
                    // sweep still held either lock.
                    let _ = self.cache.new_len();
                    let _ = self.cache.old_len();
                }
            }
        }

        let cache = Arc::new(Lookaside::new(0));
        cache.give(Reentrant {
            cache: Arc::clone(&cache),
            probe: true,
        });
        cache.sweep();
        assert_eq!(cache.sweep(), 1);
    }

    #[test]
    fn test_concurrent_take_give() {
        use std::sync::Arc;

        let cache: Arc<Lookaside<u64>> = Arc::new(Lookaside::new(0));
        let threads: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..1000 {
                        cache.give(t * 1000 + i);
                        if i % 3 == 0 {
                            let _ = cache.take();
                        }
                    }
                })
            })
            .collect();

        let sweeper = {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    cache.sweep();
                    std::thread::yield_now();
                }
            })
        };

        for t in threads {
            t.join().unwrap();
        }
        sweeper.join().unwrap();

        let stats = cache.stats();
        // Conservation: everything given was either retaken, released, or is
        // still cached.
        let cached = (cache.new_len() + cache.old_len()) as u64;
        assert_eq!(stats.gives, stats.reuse_hits + stats.released + cached);
    }
}
