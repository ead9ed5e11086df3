//! One-shot shutdown signal shared by every role of a pipeline.

#[cfg(debug_assertions)]
use crate::invariants::debug_assert_decision_recorded_once;
use crate::role::RoleId;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::Notify;
use tracing::debug;

/// The outcome of the shutdown race: who won and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// The role whose request won.
    pub decider: RoleId,
    /// The reason that role gave.
    pub reason: String,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.decider, self.reason)
    }
}

#[derive(Debug)]
struct SignalState {
    /// Set by the single winning compare-and-swap.
    fired: AtomicBool,
    /// Written once, by the CAS winner, right after it flips `fired`.
    decision: OnceLock<Decision>,
    /// Wakes every task parked in [`ShutdownSignal::fired`].
    notify: Notify,
}

/// A cloneable, one-shot, race-resolved shutdown flag.
///
/// Any number of producers, consumers and third parties may call
/// [`request_shutdown`](Self::request_shutdown) concurrently. Exactly one call
/// returns `true`; its caller is the decider and its reason is recorded.
/// Every other call is a non-blocking no-op returning `false`.
///
/// This is the classic "buffered channel plus non-blocking send" trick for
/// deciding who closes a channel, expressed as a compare-and-swap on an
/// atomic flag plus a broadcast `Notify`.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    state: Arc<SignalState>,
}

impl ShutdownSignal {
    /// Creates an unfired signal.
    pub fn new() -> Self {
        Self {
            state: Arc::new(SignalState {
                fired: AtomicBool::new(false),
                decision: OnceLock::new(),
                notify: Notify::new(),
            }),
        }
    }

    /// Attempts to fire the signal on behalf of `requester`.
    ///
    /// Returns `true` only to the single caller that moved the signal from
    /// unfired to fired. Losers must not repeat any shutdown side effect.
    pub fn request_shutdown(&self, requester: &RoleId, reason: impl Into<String>) -> bool {
        if self
            .state
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let decision = Decision {
            decider: *requester,
            reason: reason.into(),
        };
        debug!(decider = %decision.decider, reason = %decision.reason, "shutdown decided");

        let _stored = self.state.decision.set(decision).is_ok();

        #[cfg(debug_assertions)]
        debug_assert_decision_recorded_once!(_stored);

        self.state.notify.notify_waiters();
        true
    }

    /// Returns `true` once any party has won the race.
    ///
    /// May briefly be `true` before [`decision`](Self::decision) is readable.
    #[inline]
    pub fn is_fired(&self) -> bool {
        self.state.fired.load(Ordering::Acquire)
    }

    /// Returns the recorded decision, if any.
    pub fn decision(&self) -> Option<Decision> {
        self.state.decision.get().cloned()
    }

    /// Waits until the signal has fired and returns the decision.
    ///
    /// Completes immediately if the signal already fired. Cancel-safe.
    pub async fn fired(&self) -> Decision {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(decision) = self.state.decision.get() {
                return decision.clone();
            }

            notified.await;
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
