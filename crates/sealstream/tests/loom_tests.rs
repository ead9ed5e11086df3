//! Loom-based concurrency tests for the shutdown and seal protocols.
//!
//! Run with: `cargo test --features loom --test loom_tests --release`
//!
//! Loom explores every interleaving of the modelled threads. The models below
//! mirror the synchronization in `ShutdownSignal` and `Stream` with loom's
//! primitives, keeping the state space small.

#![cfg(feature = "loom")]

use loom::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use loom::sync::{Arc, Mutex};
use loom::thread;

/// Compare-and-swap decision, as in `ShutdownSignal::request_shutdown`.
struct LoomSignal {
    fired: AtomicBool,
    decider: Mutex<Option<usize>>,
}

impl LoomSignal {
    fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
            decider: Mutex::new(None),
        }
    }

    fn request(&self, who: usize) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let mut decider = self.decider.lock().unwrap();
        assert!(decider.is_none(), "decision written twice");
        *decider = Some(who);
        true
    }
}

/// Sealable buffer, as in `Stream`: the sealed flag and the items share a lock.
struct LoomStream {
    state: Mutex<(Vec<usize>, bool)>,
}

impl LoomStream {
    fn new() -> Self {
        Self {
            state: Mutex::new((Vec::new(), false)),
        }
    }

    fn try_push(&self, value: usize) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.1 {
            return false;
        }
        state.0.push(value);
        true
    }

    fn seal(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        !std::mem::replace(&mut state.1, true)
    }
}

#[test]
fn loom_exactly_one_decider() {
    loom::model(|| {
        let signal = Arc::new(LoomSignal::new());
        let wins = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..3)
            .map(|who| {
                let signal = Arc::clone(&signal);
                let wins = Arc::clone(&wins);
                thread::spawn(move || {
                    if signal.request(who) {
                        wins.fetch_add(1, Ordering::Relaxed);
                        Some(who)
                    } else {
                        None
                    }
                })
            })
            .collect();

        let winners: Vec<usize> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();

        assert_eq!(wins.load(Ordering::Relaxed), 1);
        assert_eq!(winners.len(), 1);
        assert_eq!(*signal.decider.lock().unwrap(), Some(winners[0]));
    });
}

#[test]
fn loom_fired_implies_decision_after_request_returns() {
    loom::model(|| {
        let signal = Arc::new(LoomSignal::new());

        let requester = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.request(7))
        };
        let observer = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.fired.load(Ordering::Acquire))
        };

        assert!(requester.join().unwrap());
        observer.join().unwrap();
        assert!(signal.fired.load(Ordering::Acquire));
        assert_eq!(*signal.decider.lock().unwrap(), Some(7));
    });
}

#[test]
fn loom_no_push_after_seal() {
    loom::model(|| {
        let stream = Arc::new(LoomStream::new());

        let pusher = {
            let stream = Arc::clone(&stream);
            thread::spawn(move || (stream.try_push(1), stream.try_push(2)))
        };
        let sealers: Vec<_> = (0..2)
            .map(|_| {
                let stream = Arc::clone(&stream);
                thread::spawn(move || stream.seal())
            })
            .collect();

        let (first, second) = pusher.join().unwrap();
        let effective = sealers
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|sealed| *sealed)
            .count();

        assert_eq!(effective, 1);
        // Once a push is refused, every later push is refused too.
        assert!(first || !second);

        let state = stream.state.lock().unwrap();
        assert!(state.1);
        assert_eq!(state.0.len(), usize::from(first) + usize::from(second));
        drop(state);
        assert!(!stream.try_push(3));
    });
}
