//! Observation hooks for pipeline runs.

use crate::role::RoleId;
use crate::signal::Decision;
use std::fmt;
use tracing::{info, trace};

/// Injectable sink invoked as a pipeline runs.
///
/// Called from inside role tasks, so implementations should be quick and must
/// not panic: a panicking observer takes the calling task down with it.
pub trait Observer<T>: Send + Sync {
    /// Called once per item, by the consumer it was delivered to, before the
    /// consumer's handler runs.
    fn on_delivered(&self, consumer: &RoleId, item: &T) {
        let _ = (consumer, item);
    }

    /// Called once per run, by the coordinator, when it observes the decision.
    fn on_decided(&self, decision: &Decision) {
        let _ = decision;
    }
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl<T> Observer<T> for NoopObserver {}

/// Observer that reports through `tracing`.
///
/// Deliveries are logged at `TRACE`, the decision at `INFO`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl<T: fmt::Debug> Observer<T> for TracingObserver {
    fn on_delivered(&self, consumer: &RoleId, item: &T) {
        trace!(%consumer, ?item, "item delivered");
    }

    fn on_decided(&self, decision: &Decision) {
        info!(decider = %decision.decider, reason = %decision.reason, "shutdown decided");
    }
}
