//! Admission Gate
//!
//! A counting semaphore that bounds *active* concurrency to roughly the
//! number of usable processors. Oversubscription is treated as a defect, not
//! tuned around: a thread that cannot get a permit waits here — one of the
//! engine's two legal suspension points — rather than piling onto the run
//! queue.
//!
//! # Maintenance Exemption
//!
//! Background work that sleeps most of the time is not required to hold a
//! permit while sleeping — only while actively running. The engine's sweeper
//! thread follows this: it parks without a permit and takes one just for each
//! sweep burst, so maintenance never counts against the limit except during
//! its active bursts.

use crate::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use crate::sync::{Condvar, Mutex};
#[cfg(not(all(feature = "loom-model", loom)))]
use crate::EngineError;

/// Bounded-concurrency counting semaphore with RAII permits.
///
/// # Example
///
/// ```rust
/// use floodgate_engine::AdmissionGate;
///
/// let gate = AdmissionGate::new(2);
/// let a = gate.enter();
/// let b = gate.enter();
/// assert_eq!(gate.active(), 2);
///
/// drop(a);
/// let _c = gate.enter(); // slot freed by `a`
/// # drop(b);
/// ```
pub struct AdmissionGate {
    limit: usize,
    active: Mutex<usize>,
    available: Condvar,
    /// High-water mark of simultaneously held permits.
    peak: AtomicUsize,
    /// Number of `enter` calls that had to wait.
    waits: AtomicU64,
}

impl AdmissionGate {
    /// Creates a gate admitting at most `limit` concurrent permits
    /// (minimum 1).
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            active: Mutex::new(0),
            available: Condvar::new(),
            peak: AtomicUsize::new(0),
            waits: AtomicU64::new(0),
        }
    }

    /// The configured permit limit.
    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Permits currently held.
    pub fn active(&self) -> usize {
        *self.active.lock()
    }

    /// Highest number of permits ever held simultaneously. Never exceeds
    /// [`limit`](Self::limit).
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    /// Number of admissions that had to wait for a slot.
    pub fn waits(&self) -> u64 {
        self.waits.load(Ordering::Relaxed)
    }

    /// Acquires a permit, blocking until a slot under the limit frees up.
    pub fn enter(&self) -> Permit<'_> {
        let mut active = self.active.lock();
        if *active >= self.limit {
            self.waits.fetch_add(1, Ordering::Relaxed);
            while *active >= self.limit {
                active = self.available.wait(active);
            }
        }
        *active += 1;
        self.peak.fetch_max(*active, Ordering::Relaxed);
        drop(active);
        Permit { gate: self }
    }

    /// Acquires a permit, waiting at most `timeout`.
    ///
    /// On timeout the request has not entered the pipeline and
    /// [`EngineError::AdmissionTimeout`] is surfaced to the submitter.
    #[cfg(not(all(feature = "loom-model", loom)))]
    pub fn enter_timeout(&self, timeout: core::time::Duration) -> crate::Result<Permit<'_>> {
        let deadline = std::time::Instant::now() + timeout;
        let mut active = self.active.lock();
        if *active >= self.limit {
            self.waits.fetch_add(1, Ordering::Relaxed);
            while *active >= self.limit {
                let now = std::time::Instant::now();
                if now >= deadline {
                    return Err(EngineError::AdmissionTimeout);
                }
                let (guard, _timed_out) = self.available.wait_for(active, deadline - now);
                active = guard;
            }
        }
        *active += 1;
        self.peak.fetch_max(*active, Ordering::Relaxed);
        drop(active);
        Ok(Permit { gate: self })
    }

    /// Attempts to acquire a permit without waiting.
    pub fn try_enter(&self) -> Option<Permit<'_>> {
        let mut active = self.active.lock();
        if *active >= self.limit {
            return None;
        }
        *active += 1;
        self.peak.fetch_max(*active, Ordering::Relaxed);
        drop(active);
        Some(Permit { gate: self })
    }

    fn leave(&self) {
        let mut active = self.active.lock();
        debug_assert!(*active > 0, "permit released below zero");
        *active -= 1;
        drop(active);
        self.available.notify_one();
    }
}

/// RAII admission permit; the slot is released on drop.
///
/// A permit is held across a request's entire pipeline walk and released when
/// the walk returns `Done`, `Failed`, or `Blocked` — resumption takes a fresh
/// permit.
#[must_use = "a permit bounds concurrency only while held"]
pub struct Permit<'a> {
    gate: &'a AdmissionGate,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.gate.leave();
    }
}
