//! Conditional Synchronization Primitives
//!
//! This module provides a unified interface for the synchronization types
//! used throughout the engine that works with both the production primitives
//! (std atomics, parking_lot locks) and Loom's model-checking primitives.
//!
//! When the `loom-model` feature is enabled and the build carries
//! `--cfg loom`, this module re-exports Loom's types, which enables
//! exhaustive concurrency testing via model checking.
//!
//! # Loom Integration
//!
//! ```bash
//! RUSTFLAGS="--cfg loom" cargo test --features loom-model --test loom_verification --release
//! ```
//!
//! # Standard Mode
//!
//! In standard mode the atomics are zero-cost re-exports from
//! `core::sync::atomic`, and the `Mutex`/`Condvar` wrappers delegate to
//! parking_lot. The wrappers exist because parking_lot and Loom expose
//! slightly different lock APIs (no poisoning vs. `LockResult`); the engine
//! is written against the normalized surface below.

#[cfg(all(feature = "loom-model", loom))]
pub mod atomic {
    //! Atomic types for Loom model checking.

    pub use loom::sync::atomic::{
        fence, AtomicBool, AtomicIsize, AtomicPtr, AtomicU32, AtomicU64, AtomicUsize, Ordering,
    };
}

#[cfg(not(all(feature = "loom-model", loom)))]
pub mod atomic {
    //! Standard library atomic types.
    //!
    //! In non-Loom mode these are zero-cost re-exports from `core::sync::atomic`.

    pub use core::sync::atomic::{
        fence, AtomicBool, AtomicIsize, AtomicPtr, AtomicU32, AtomicU64, AtomicUsize, Ordering,
    };
}

#[cfg(all(feature = "loom-model", loom))]
pub mod thread {
    //! Loom thread primitives for model checking.

    pub use loom::thread::{spawn, yield_now, JoinHandle};

    /// Runs a Loom model checking session, exploring all interleavings.
    pub fn model<F>(f: F)
    where
        F: Fn() + Sync + Send + 'static,
    {
        loom::model(f);
    }
}

#[cfg(not(all(feature = "loom-model", loom)))]
pub mod thread {
    //! Standard library thread primitives.

    pub use std::thread::{spawn, yield_now, JoinHandle};

    /// No-op in non-Loom mode: simply runs the closure once.
    pub fn model<F>(f: F)
    where
        F: Fn() + Sync + Send + 'static,
    {
        f();
    }
}

#[cfg(all(feature = "loom-model", loom))]
mod imp {
    pub(super) use loom::sync::{Condvar, Mutex};
}

#[cfg(not(all(feature = "loom-model", loom)))]
mod imp {
    pub(super) use parking_lot::{Condvar, Mutex};
}

/// A mutual exclusion lock with a normalized, non-poisoning API.
///
/// Wraps `parking_lot::Mutex` in normal builds and `loom::sync::Mutex` under
/// model checking. Poisoning is not part of the surface: the engine never
/// unwinds while holding one of these locks with broken invariants (lock
/// scopes contain only pointer swaps and counter updates).
pub struct Mutex<T> {
    inner: imp::Mutex<T>,
}

/// RAII guard returned by [`Mutex::lock`].
pub struct MutexGuard<'a, T> {
    #[cfg(all(feature = "loom-model", loom))]
    inner: loom::sync::MutexGuard<'a, T>,
    #[cfg(not(all(feature = "loom-model", loom)))]
    inner: parking_lot::MutexGuard<'a, T>,
}

impl<T> Mutex<T> {
    /// Creates a new mutex protecting `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: imp::Mutex::new(value),
        }
    }

    /// Acquires the lock, blocking until it is available.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        #[cfg(all(feature = "loom-model", loom))]
        {
            // Poisoning cannot occur in the model: test closures do not panic
            // while holding engine locks.
            MutexGuard {
                inner: self.inner.lock().unwrap(),
            }
        }
        #[cfg(not(all(feature = "loom-model", loom)))]
        {
            MutexGuard {
                inner: self.inner.lock(),
            }
        }
    }

    /// Attempts to acquire the lock without blocking.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        #[cfg(all(feature = "loom-model", loom))]
        {
            self.inner
                .try_lock()
                .ok()
                .map(|inner| MutexGuard { inner })
        }
        #[cfg(not(all(feature = "loom-model", loom)))]
        {
            self.inner.try_lock().map(|inner| MutexGuard { inner })
        }
    }
}

impl<T> core::ops::Deref for MutexGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> core::ops::DerefMut for MutexGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

/// A condition variable with a normalized API over parking_lot and Loom.
pub struct Condvar {
    inner: imp::Condvar,
}

impl Condvar {
    /// Creates a new condition variable.
    pub fn new() -> Self {
        Self {
            inner: imp::Condvar::new(),
        }
    }

    /// Blocks until notified, releasing `guard` while waiting.
    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        #[cfg(all(feature = "loom-model", loom))]
        {
            MutexGuard {
                inner: self.inner.wait(guard.inner).unwrap(),
            }
        }
        #[cfg(not(all(feature = "loom-model", loom)))]
        {
            let mut inner = guard.inner;
            self.inner.wait(&mut inner);
            MutexGuard { inner }
        }
    }

    /// Blocks until notified or `timeout` elapses.
    ///
    /// Returns the guard and whether the wait timed out. Not available under
    /// Loom (the model has no time); callers of the timed path are cfg'd out
    /// of model-checked builds.
    #[cfg(not(all(feature = "loom-model", loom)))]
    pub fn wait_for<'a, T>(
        &self,
        guard: MutexGuard<'a, T>,
        timeout: core::time::Duration,
    ) -> (MutexGuard<'a, T>, bool) {
        let mut inner = guard.inner;
        let result = self.inner.wait_for(&mut inner, timeout);
        (MutexGuard { inner }, result.timed_out())
    }

    /// Wakes one waiting thread.
    pub fn notify_one(&self) {
        self.inner.notify_one();
    }

    /// Wakes all waiting threads.
    pub fn notify_all(&self) {
        self.inner.notify_all();
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::atomic::{AtomicUsize, Ordering};
    use super::{Condvar, Mutex};

    #[test]
    fn test_atomic_basic() {
        let counter = AtomicUsize::new(0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        counter.store(42, Ordering::SeqCst);
        assert_eq!(counter.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_mutex_lock_unlock() {
        let m = Mutex::new(7usize);
        {
            let mut g = m.lock();
            *g += 1;
        }
        assert_eq!(*m.lock(), 8);
    }

    #[test]
    fn test_mutex_try_lock_contended() {
        let m = Mutex::new(());
        let g = m.lock();
        assert!(m.try_lock().is_none());
        drop(g);
        assert!(m.try_lock().is_some());
    }

    #[test]
    fn test_condvar_notify() {
        use std::sync::Arc;

        let pair = Arc::new((Mutex::new(false), Condvar::new()));
        let pair2 = Arc::clone(&pair);

        let waiter = std::thread::spawn(move || {
            let (lock, cv) = &*pair2;
            let mut guard = lock.lock();
            while !*guard {
                guard = cv.wait(guard);
            }
        });

        {
            let (lock, cv) = &*pair;
            *lock.lock() = true;
            cv.notify_one();
        }
        waiter.join().unwrap();
    }
}
