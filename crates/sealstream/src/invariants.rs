//! Debug assertion macros for shutdown-coordination invariants.
//!
//! These macros are only active in debug builds (`#[cfg(debug_assertions)]`),
//! so there is zero overhead in release builds.

// =============================================================================
// Stream: no push is accepted once sealed
// =============================================================================

/// Assert that an item is only appended while the stream is open.
///
/// **Invariant**: `sealed → no push succeeds`
///
/// Used in: `Stream::try_push()` right before appending to the buffer
macro_rules! debug_assert_open_on_push {
    ($sealed:expr) => {
        debug_assert!(
            !$sealed,
            "push accepted after the stream was sealed"
        )
    };
}

// =============================================================================
// Stream: seal is monotone
// =============================================================================

/// Assert that the effective seal transition starts from `Open`.
///
/// **Invariant**: `Open → Sealed-Draining → Sealed-Empty`, never reversed
///
/// Used in: `Stream::seal()` when flipping the sealed flag
macro_rules! debug_assert_seal_monotone {
    ($was_sealed:expr, $now_sealed:expr) => {
        debug_assert!(
            !$was_sealed && $now_sealed,
            "seal transition must go from open to sealed exactly once (was {}, now {})",
            $was_sealed,
            $now_sealed
        )
    };
}

/// Assert that a registered waiting receiver is released at most once.
///
/// Used in: `Stream::pop()` and its waiter guard
macro_rules! debug_assert_waiter_registered {
    ($waiting:expr) => {
        debug_assert!(
            $waiting > 0,
            "releasing a waiting receiver that was never registered"
        )
    };
}

// =============================================================================
// ShutdownSignal: exactly one decision
// =============================================================================

/// Assert that the CAS winner is the only party that records a decision.
///
/// **Invariant**: `fired == true → decision immutable`
///
/// Used in: `ShutdownSignal::request_shutdown()` after winning the CAS
macro_rules! debug_assert_decision_recorded_once {
    ($stored:expr) => {
        debug_assert!(
            $stored,
            "shutdown decision recorded twice; the fired flag must gate the write"
        )
    };
}

// =============================================================================
// JoinBarrier: counts never underflow
// =============================================================================

/// Assert that a task class had an outstanding task before decrementing.
///
/// **Invariant**: each registered task reports `done` exactly once
///
/// Used in: `TaskGuard::release()`
macro_rules! debug_assert_outstanding {
    ($class:expr, $previous:expr) => {
        debug_assert!(
            $previous > 0,
            "{:?} count underflow: done reported without a matching register",
            $class
        )
    };
}

// =============================================================================
// Re-exports for crate-internal use
// =============================================================================

pub(crate) use debug_assert_decision_recorded_once;
pub(crate) use debug_assert_open_on_push;
pub(crate) use debug_assert_outstanding;
pub(crate) use debug_assert_seal_monotone;
pub(crate) use debug_assert_waiter_registered;
