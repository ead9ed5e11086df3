//! The coordinator: sole authority over sealing the public stream.
//!
//! Producers never seal a stream they share. Instead the coordinator waits for
//! the shutdown decision (or for producers to run dry), then:
//!
//! 1. seals the relay so no producer can add anything new,
//! 2. forwards whatever the relay had already accepted,
//! 3. seals the public stream so consumers drain and exit.
//!
//! When shutdown fires while a relay item is also ready, the shutdown branch
//! wins. The item is not lost: it is picked up by the final drain in step 2.
//!
//! If every consumer leaves while the public stream is still open (they can
//! only do that by panicking), nobody can drain it any more. The coordinator
//! then decides shutdown itself and drops what it still holds.

use crate::join::JoinBarrier;
use crate::observe::{NoopObserver, Observer};
use crate::role::{RoleId, TaskClass};
use crate::signal::{Decision, ShutdownSignal};
use crate::stream::Stream;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Reason recorded when the coordinator decides because producers ran dry.
pub const PRODUCER_EXHAUSTED: &str = "producer-exhausted";

/// Reason recorded when the coordinator decides because no consumer is left.
pub const CONSUMERS_GONE: &str = "consumers-gone";

/// Result of a coordinator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorOutcome {
    /// The decision the coordinator acted on.
    pub decision: Decision,
    /// Relay items forwarded before the decision.
    pub forwarded: u64,
    /// Relay items forwarded by the final drain, after the decision.
    pub forwarded_after_shutdown: u64,
    /// Relay items that could not be forwarded in time.
    pub dropped: u64,
}

enum Feed<T> {
    /// Producers push into the public stream; seal it once they have all left.
    Direct,
    /// Producers push into this relay; forward from it.
    Relay(Stream<T>),
    /// The only producer seals the public stream itself.
    SoleProducer,
}

/// Decides when the public stream is sealed, and seals it.
pub struct Coordinator<T> {
    out: Stream<T>,
    feed: Feed<T>,
    signal: ShutdownSignal,
    barrier: JoinBarrier,
    observer: Arc<dyn Observer<T>>,
    final_forward_timeout: Duration,
}

impl<T: Send + 'static> Coordinator<T> {
    /// A coordinator for producers writing `out` directly.
    pub fn new(out: Stream<T>, signal: ShutdownSignal, barrier: JoinBarrier) -> Self {
        Self {
            out,
            feed: Feed::Direct,
            signal,
            barrier,
            observer: Arc::new(NoopObserver),
            final_forward_timeout: Duration::from_secs(1),
        }
    }

    /// Forwards from `relay` instead. The coordinator becomes the only writer
    /// of the public stream.
    pub fn with_relay(mut self, relay: Stream<T>) -> Self {
        self.feed = Feed::Relay(relay);
        self
    }

    /// Leaves sealing to the single producer that owns the public stream.
    pub fn leave_sealing_to_producer(mut self) -> Self {
        self.feed = Feed::SoleProducer;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer<T>>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_final_forward_timeout(mut self, timeout: Duration) -> Self {
        self.final_forward_timeout = timeout;
        self
    }

    /// Runs until the public stream is sealed (or, for a sole producer, until
    /// that producer has left).
    pub async fn run(mut self) -> CoordinatorOutcome {
        match std::mem::replace(&mut self.feed, Feed::Direct) {
            Feed::Relay(relay) => self.run_relay(relay).await,
            Feed::Direct => self.run_direct(true).await,
            Feed::SoleProducer => self.run_direct(false).await,
        }
    }

    async fn run_direct(self, seal: bool) -> CoordinatorOutcome {
        let decision = tokio::select! {
            biased;
            decision = self.signal.fired() => decision,
            () = self.barrier.producers_done() => self.declare(PRODUCER_EXHAUSTED).await,
            () = self.consumers_gone() => self.declare(CONSUMERS_GONE).await,
        };
        self.observer.on_decided(&decision);

        // Producers race every push against the signal, so this cannot stall.
        // Anything they pushed before leaving stays buffered when consumers
        // are gone.
        self.barrier.producers_done().await;
        if seal && self.out.seal() {
            debug!(%decision, "public stream sealed");
        }

        CoordinatorOutcome {
            decision,
            forwarded: 0,
            forwarded_after_shutdown: 0,
            dropped: 0,
        }
    }

    async fn run_relay(self, relay: Stream<T>) -> CoordinatorOutcome {
        let mut forwarded = 0u64;
        let mut carried = None;

        let decision = loop {
            tokio::select! {
                biased;
                decision = self.signal.fired() => break decision,
                item = relay.pop() => match item {
                    Some(item) => match self.out.push_until(item, self.stop_forwarding()).await {
                        Ok(()) => forwarded += 1,
                        Err(err) => {
                            carried = Some(err.into_inner());
                            // Returns the existing decision if shutdown already fired.
                            break self.declare(CONSUMERS_GONE).await;
                        }
                    },
                    None => break self.declare(PRODUCER_EXHAUSTED).await,
                },
                () = self.barrier.producers_done() => break self.declare(PRODUCER_EXHAUSTED).await,
                () = self.consumers_gone() => break self.declare(CONSUMERS_GONE).await,
            }
        };
        self.observer.on_decided(&decision);

        relay.seal();

        let mut forwarded_after_shutdown = 0u64;
        let mut dropped = 0u64;
        while let Some(item) = carried.take().or_else(|| relay.try_pop()) {
            if self.forward_final(item).await {
                forwarded_after_shutdown += 1;
            } else {
                dropped += 1;
            }
        }

        if self.out.seal() {
            debug!(
                %decision,
                forwarded,
                forwarded_after_shutdown,
                dropped,
                "public stream sealed"
            );
        }

        CoordinatorOutcome {
            decision,
            forwarded,
            forwarded_after_shutdown,
            dropped,
        }
    }

    async fn forward_final(&self, item: T) -> bool {
        if self.barrier.outstanding(TaskClass::Consumer) == 0 {
            warn!("relay item dropped, no consumer left");
            return false;
        }

        let forward = tokio::time::timeout(self.final_forward_timeout, self.out.push(item));
        let pushed = tokio::select! {
            biased;
            pushed = forward => pushed,
            () = self.consumers_gone() => {
                warn!("relay item dropped, no consumer left");
                return false;
            }
        };

        match pushed {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                warn!(%err, "relay item dropped");
                false
            }
            Err(_) => {
                warn!(
                    timeout = ?self.final_forward_timeout,
                    "relay item dropped, public stream stayed full"
                );
                false
            }
        }
    }

    /// Resolves once shutdown fires or no consumer is left to make room.
    async fn stop_forwarding(&self) {
        tokio::select! {
            biased;
            _ = self.signal.fired() => {}
            () = self.consumers_gone() => {}
        }
    }

    /// Resolves once every consumer has exited while the public stream is
    /// still open. Consumers leaving a sealed stream have simply drained it.
    async fn consumers_gone(&self) {
        self.barrier.consumers_done().await;
        if self.out.is_sealed() {
            std::future::pending::<()>().await;
        }
    }

    /// Requests shutdown on the coordinator's behalf and returns whichever
    /// decision won.
    async fn declare(&self, reason: &str) -> Decision {
        if self.signal.request_shutdown(&RoleId::Coordinator, reason) {
            debug!(reason, "coordinator decided shutdown");
        }
        self.signal.fired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Capacity;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn test_shutdown_wins_tie_but_item_is_forwarded() {
        let out = Stream::unbounded();
        let relay = Stream::bounded(1);
        let signal = ShutdownSignal::new();
        let barrier = JoinBarrier::new();
        let _producer = barrier.register(TaskClass::Producer);
        let _consumer = barrier.register(TaskClass::Consumer);

        relay.try_push(7u32).unwrap();
        signal.request_shutdown(&RoleId::ThirdParty(0), "timeout");

        let outcome = Coordinator::new(out.clone(), signal, barrier)
            .with_relay(relay.clone())
            .run()
            .await;

        assert_eq!(outcome.decision.reason, "timeout");
        assert_eq!(outcome.forwarded, 0);
        assert_eq!(outcome.forwarded_after_shutdown, 1);
        assert!(relay.is_sealed());
        assert!(out.is_sealed());
        assert_eq!(out.try_pop(), Some(7));
    }

    #[tokio::test]
    async fn test_ready_item_forwarded_before_shutdown() {
        let out = Stream::unbounded();
        let relay = Stream::bounded(1);
        let signal = ShutdownSignal::new();
        let barrier = JoinBarrier::new();
        let _producer = barrier.register(TaskClass::Producer);
        let _consumer = barrier.register(TaskClass::Consumer);

        relay.try_push(7u32).unwrap();
        let handle = tokio::spawn(
            Coordinator::new(out.clone(), signal.clone(), barrier)
                .with_relay(relay)
                .run(),
        );

        assert_eq!(timeout(WAIT, out.pop()).await.unwrap(), Some(7));
        assert!(!out.is_sealed());

        signal.request_shutdown(&RoleId::ThirdParty(1), "done");
        let outcome = timeout(WAIT, handle).await.unwrap().unwrap();
        assert_eq!(outcome.forwarded, 1);
        assert_eq!(outcome.forwarded_after_shutdown, 0);
        assert!(out.is_sealed());
    }

    #[tokio::test]
    async fn test_exhausted_producers_decide() {
        let out = Stream::<u32>::unbounded();
        let relay = Stream::new(Capacity::Bounded(0));
        let signal = ShutdownSignal::new();
        let barrier = JoinBarrier::new();

        let outcome = timeout(
            WAIT,
            Coordinator::new(out.clone(), signal.clone(), barrier)
                .with_relay(relay)
                .run(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.decision.decider, RoleId::Coordinator);
        assert_eq!(outcome.decision.reason, PRODUCER_EXHAUSTED);
        assert!(out.is_sealed());
    }

    #[tokio::test]
    async fn test_direct_mode_seals_after_producers_leave() {
        let out = Stream::<u32>::unbounded();
        let signal = ShutdownSignal::new();
        let barrier = JoinBarrier::new();
        let producer = barrier.register(TaskClass::Producer);
        let _consumer = barrier.register(TaskClass::Consumer);

        let handle = tokio::spawn(Coordinator::new(out.clone(), signal.clone(), barrier).run());
        signal.request_shutdown(&RoleId::Consumer(0), "stop");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!out.is_sealed());

        producer.done();
        timeout(WAIT, handle).await.unwrap().unwrap();
        assert!(out.is_sealed());
    }

    #[tokio::test]
    async fn test_sole_producer_mode_never_seals() {
        let out = Stream::<u32>::unbounded();
        let signal = ShutdownSignal::new();
        let barrier = JoinBarrier::new();

        let outcome = timeout(
            WAIT,
            Coordinator::new(out.clone(), signal, barrier)
                .leave_sealing_to_producer()
                .run(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.decision.reason, PRODUCER_EXHAUSTED);
        assert!(!out.is_sealed());
    }

    #[tokio::test]
    async fn test_full_output_drops_after_timeout() {
        let out = Stream::bounded(1);
        out.try_push(0u32).unwrap();
        let relay = Stream::bounded(2);
        relay.try_push(1).unwrap();
        relay.try_push(2).unwrap();
        let signal = ShutdownSignal::new();
        signal.request_shutdown(&RoleId::ThirdParty(0), "abort");
        let barrier = JoinBarrier::new();
        let _consumer = barrier.register(TaskClass::Consumer);

        let outcome = Coordinator::new(out.clone(), signal, barrier)
            .with_relay(relay)
            .with_final_forward_timeout(Duration::from_millis(10))
            .run()
            .await;

        assert_eq!(outcome.dropped, 2);
        assert_eq!(outcome.forwarded_after_shutdown, 0);
        assert!(out.is_sealed());
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn test_forward_blocked_on_full_output_is_carried_into_final_drain() {
        let out = Stream::bounded(1);
        out.try_push(0u32).unwrap();
        let relay = Stream::bounded(1);
        relay.try_push(7).unwrap();
        let signal = ShutdownSignal::new();
        let barrier = JoinBarrier::new();
        let _producer = barrier.register(TaskClass::Producer);
        let _consumer = barrier.register(TaskClass::Consumer);

        let handle = tokio::spawn(
            Coordinator::new(out.clone(), signal.clone(), barrier)
                .with_relay(relay.clone())
                .run(),
        );

        // The coordinator holds 7 while the public stream is full.
        timeout(WAIT, async {
            while !relay.is_empty() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();

        signal.request_shutdown(&RoleId::ThirdParty(0), "stop");
        assert_eq!(timeout(WAIT, out.pop()).await.unwrap(), Some(0));

        let outcome = timeout(WAIT, handle).await.unwrap().unwrap();
        assert_eq!(outcome.forwarded, 0);
        assert_eq!(outcome.forwarded_after_shutdown, 1);
        assert_eq!(outcome.dropped, 0);
        assert!(out.is_sealed());
        assert_eq!(out.try_pop(), Some(7));
    }

    #[tokio::test]
    async fn test_relay_decides_when_consumers_are_gone() {
        let out = Stream::bounded(1);
        out.try_push(0u32).unwrap();
        let relay = Stream::bounded(2);
        relay.try_push(1).unwrap();
        relay.try_push(2).unwrap();
        let signal = ShutdownSignal::new();
        let barrier = JoinBarrier::new();
        let _producer = barrier.register(TaskClass::Producer);
        let consumer = barrier.register(TaskClass::Consumer);

        let handle = tokio::spawn(
            Coordinator::new(out.clone(), signal.clone(), barrier)
                .with_relay(relay)
                .with_final_forward_timeout(Duration::from_secs(60))
                .run(),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!signal.is_fired());
        drop(consumer);

        let outcome = timeout(WAIT, handle).await.unwrap().unwrap();
        assert_eq!(outcome.decision.decider, RoleId::Coordinator);
        assert_eq!(outcome.decision.reason, CONSUMERS_GONE);
        assert_eq!(outcome.forwarded, 0);
        assert_eq!(outcome.dropped, 2);
        assert!(out.is_sealed());
    }

    #[tokio::test]
    async fn test_direct_mode_decides_when_consumers_are_gone() {
        let out = Stream::bounded(1);
        out.try_push(0u32).unwrap();
        let signal = ShutdownSignal::new();
        let barrier = JoinBarrier::new();
        let producer = barrier.register(TaskClass::Producer);
        let consumer = barrier.register(TaskClass::Consumer);

        let handle = tokio::spawn(Coordinator::new(out.clone(), signal.clone(), barrier).run());
        drop(consumer);

        let decision = timeout(WAIT, signal.fired()).await.unwrap();
        assert_eq!(decision.decider, RoleId::Coordinator);
        assert_eq!(decision.reason, CONSUMERS_GONE);

        producer.done();
        timeout(WAIT, handle).await.unwrap().unwrap();
        assert!(out.is_sealed());
    }
}
