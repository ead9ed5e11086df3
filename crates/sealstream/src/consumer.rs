//! Consumer role: drains the public stream until it is sealed and empty.

use crate::join::TaskGuard;
use crate::observe::Observer;
use crate::role::{Consume, Flow, RoleId};
use crate::signal::ShutdownSignal;
use crate::stream::Stream;
use std::sync::Arc;
use tracing::debug;

/// What a consumer did before exiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerSummary {
    pub id: RoleId,
    /// Items popped and handed to the handler.
    pub delivered: u64,
    /// `Some(won)` if the handler asked for shutdown.
    pub requested: Option<bool>,
}

/// A consumer task.
///
/// A consumer only exits when the stream reports sealed-and-empty, so every
/// buffered item is processed. Asking for shutdown only changes when the
/// stream gets sealed, never how the consumer itself leaves.
pub struct Consumer<T> {
    id: RoleId,
    handler: Box<dyn Consume<T>>,
    source: Stream<T>,
    signal: ShutdownSignal,
    observer: Arc<dyn Observer<T>>,
}

impl<T: Send + 'static> Consumer<T> {
    pub fn new(
        id: RoleId,
        handler: Box<dyn Consume<T>>,
        source: Stream<T>,
        signal: ShutdownSignal,
        observer: Arc<dyn Observer<T>>,
    ) -> Self {
        Self {
            id,
            handler,
            source,
            signal,
            observer,
        }
    }

    pub fn id(&self) -> RoleId {
        self.id
    }

    /// Drains the source, then reports completion through `guard`.
    pub async fn run(mut self, guard: TaskGuard) -> ConsumerSummary {
        let mut delivered = 0u64;
        let mut requested = None;

        while let Some(item) = self.source.pop().await {
            self.observer.on_delivered(&self.id, &item);
            delivered += 1;

            if let Flow::Stop(reason) = self.handler.consume(item) {
                if requested.is_none() {
                    requested = Some(self.signal.request_shutdown(&self.id, reason));
                }
            }
        }

        debug!(consumer = %self.id, delivered, "consumer drained");
        guard.done();

        ConsumerSummary {
            id: self.id,
            delivered,
            requested,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::JoinBarrier;
    use crate::observe::NoopObserver;
    use crate::role::TaskClass;

    #[tokio::test]
    async fn test_drains_everything_before_exit() {
        let stream = Stream::unbounded();
        for i in 0..100u32 {
            stream.try_push(i).unwrap();
        }
        stream.seal();

        let barrier = JoinBarrier::new();
        let mut seen = Vec::new();
        let summary = Consumer::new(
            RoleId::Consumer(0),
            Box::new(move |item: u32| {
                seen.push(item);
                Flow::Continue
            }),
            stream.clone(),
            ShutdownSignal::new(),
            Arc::new(NoopObserver),
        )
        .run(barrier.register(TaskClass::Consumer))
        .await;

        assert_eq!(summary.delivered, 100);
        assert_eq!(summary.requested, None);
        assert_eq!(barrier.outstanding(TaskClass::Consumer), 0);
    }

    #[tokio::test]
    async fn test_stop_requests_once_and_keeps_draining() {
        let stream = Stream::unbounded();
        for i in 0..10u32 {
            stream.try_push(i).unwrap();
        }
        stream.seal();

        let signal = ShutdownSignal::new();
        let barrier = JoinBarrier::new();
        let summary = Consumer::new(
            RoleId::Consumer(2),
            Box::new(|item: u32| {
                if item >= 3 {
                    Flow::Stop(format!("saw {}", item))
                } else {
                    Flow::Continue
                }
            }),
            stream,
            signal.clone(),
            Arc::new(NoopObserver),
        )
        .run(barrier.register(TaskClass::Consumer))
        .await;

        assert_eq!(summary.delivered, 10);
        assert_eq!(summary.requested, Some(true));
        assert_eq!(signal.decision().unwrap().reason, "saw 3");
    }
}
