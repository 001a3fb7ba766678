//! Exhaustive interleaving checks for the engine's lock-and-counter cores.
//!
//! Run with:
//!
//! ```bash
//! RUSTFLAGS="--cfg loom" cargo test --features loom-model --test loom_verification --release
//! ```
//!
//! Models are kept to two or three threads and a handful of operations each;
//! Loom explores every interleaving, so small models already cover the
//! orderings that matter (permit accounting, count-to-zero recycling, sweep
//! vs. give races).

#![cfg(all(feature = "loom-model", loom))]

use loom::sync::atomic::{AtomicUsize, Ordering};
use loom::sync::Arc;
use loom::thread;

use floodgate_engine::{AdmissionGate, Arena, Lookaside};

#[test]
fn loom_gate_never_exceeds_limit() {
    loom::model(|| {
        let gate = Arc::new(AdmissionGate::new(1));
        let active = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let active = Arc::clone(&active);
                thread::spawn(move || {
                    let _permit = gate.enter();
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    assert!(now <= 1, "two permits inside a one-permit gate");
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(gate.active(), 0);
        assert!(gate.peak() <= 1);
    });
}

#[test]
fn loom_gate_try_enter_respects_holder() {
    loom::model(|| {
        let gate = Arc::new(AdmissionGate::new(1));

        let holder = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                let permit = gate.enter();
                drop(permit);
            })
        };

        // Either the holder has the slot (None) or it is free (Some); both
        // are legal, but the count must stay consistent.
        if let Some(permit) = gate.try_enter() {
            assert!(gate.active() >= 1);
            drop(permit);
        }
        holder.join().unwrap();
        assert_eq!(gate.active(), 0);
    });
}

#[test]
fn loom_lookaside_conserves_objects() {
    loom::model(|| {
        let cache: Arc<Lookaside<Box<u32>>> = Arc::new(Lookaside::new(0));

        let giver = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                cache.give(Box::new(7));
            })
        };
        let taker = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.take())
        };

        let taken = taker.join().unwrap();
        giver.join().unwrap();

        // The object is either in the taker's hands or still cached; a
        // concurrent sweep pair may release it but never duplicate it.
        let released = cache.sweep() + cache.sweep();
        let cached_or_released = usize::from(taken.is_none());
        assert_eq!(released, cached_or_released);
    });
}

#[test]
fn loom_lookaside_sweep_vs_give() {
    loom::model(|| {
        let cache: Arc<Lookaside<Box<u32>>> = Arc::new(Lookaside::new(0));
        cache.give(Box::new(1));

        let sweeper = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.sweep())
        };
        let giver = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                cache.give(Box::new(2));
            })
        };

        let first = sweeper.join().unwrap();
        giver.join().unwrap();

        // First sweep only rotates or releases the pre-aged object; draining
        // afterwards accounts for both objects exactly once.
        let drained = cache.sweep() + cache.sweep();
        assert_eq!(first + drained, 2);
    });
}

#[test]
fn loom_arena_count_to_zero_recycles_once() {
    loom::model(|| {
        let arena = Arena::with_magazine(0);
        let buf = arena.acquire(16).unwrap();
        let clone = buf.clone();

        let dropper = thread::spawn(move || {
            drop(clone);
        });
        drop(buf);
        dropper.join().unwrap();

        // Exactly one count-to-zero event: one recycle, nothing live.
        assert_eq!(arena.live(), 0);
        assert_eq!(arena.stats().cache.gives, 1);
    });
}
