//! Producer role: generates items and pushes them until told to stop.

use crate::error::PushError;
use crate::join::TaskGuard;
use crate::role::{Generate, Produce, RoleId};
use crate::signal::ShutdownSignal;
use crate::stream::Stream;
use std::time::Duration;
use tracing::debug;

/// Why a producer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerExit {
    /// Shutdown fired before or while the producer was pushing.
    ObservedShutdown,
    /// The generator asked to stop; `won` says whether this producer became
    /// the decider.
    RequestedShutdown { won: bool },
    /// The generator finished its bounded work.
    Exhausted,
    /// The target stream was sealed under the producer.
    StreamSealed,
}

/// What a producer did before exiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerSummary {
    pub id: RoleId,
    pub exit: ProducerExit,
    /// Items the target stream accepted.
    pub pushed: u64,
}

/// A producer task.
///
/// Every push is raced against the shutdown signal, so a producer parked on a
/// full buffer leaves as soon as shutdown fires. A producer never seals its
/// target unless it was built with [`owning_stream`](Self::owning_stream).
pub struct Producer<T> {
    id: RoleId,
    generator: Box<dyn Generate<T>>,
    target: Stream<T>,
    signal: ShutdownSignal,
    interval: Option<Duration>,
    owns_stream: bool,
}

impl<T: Send + 'static> Producer<T> {
    pub fn new(
        id: RoleId,
        generator: Box<dyn Generate<T>>,
        target: Stream<T>,
        signal: ShutdownSignal,
    ) -> Self {
        Self {
            id,
            generator,
            target,
            signal,
            interval: None,
            owns_stream: false,
        }
    }

    /// Pauses for `interval` between items.
    pub fn with_interval(mut self, interval: Option<Duration>) -> Self {
        self.interval = interval;
        self
    }

    /// Makes this producer the sole owner of its target: it seals the target
    /// on every exit path, including a panicking generator.
    pub fn owning_stream(mut self) -> Self {
        self.owns_stream = true;
        self
    }

    pub fn id(&self) -> RoleId {
        self.id
    }

    /// Runs until the generator stops, shutdown fires or the target is sealed,
    /// then reports completion through `guard`.
    pub async fn run(mut self, guard: TaskGuard) -> ProducerSummary {
        let seal_on_exit = self.owns_stream.then(|| SealOnDrop(self.target.clone()));
        let mut pushed = 0u64;

        let exit = loop {
            if let Some(interval) = self.interval.filter(|_| pushed > 0) {
                tokio::select! {
                    biased;
                    _ = self.signal.fired() => break ProducerExit::ObservedShutdown,
                    () = tokio::time::sleep(interval) => {}
                }
            }

            let item = match self.generator.generate() {
                Produce::Item(item) => item,
                Produce::Stop(reason) => {
                    let won = self.signal.request_shutdown(&self.id, reason);
                    break ProducerExit::RequestedShutdown { won };
                }
                Produce::Exhausted => break ProducerExit::Exhausted,
            };

            if self.signal.is_fired() {
                break ProducerExit::ObservedShutdown;
            }

            match self.target.push_until(item, self.signal.fired()).await {
                Ok(()) => pushed += 1,
                Err(PushError::Cancelled(_)) => break ProducerExit::ObservedShutdown,
                Err(PushError::Sealed(_) | PushError::Full(_)) => {
                    break ProducerExit::StreamSealed
                }
            }
        };

        debug!(producer = %self.id, ?exit, pushed, "producer exiting");

        // Seal before retiring so "all producers done" implies a sealed target.
        drop(seal_on_exit);
        guard.done();

        ProducerSummary {
            id: self.id,
            exit,
            pushed,
        }
    }
}

/// Seals the wrapped stream when dropped.
struct SealOnDrop<T>(Stream<T>);

impl<T> Drop for SealOnDrop<T> {
    fn drop(&mut self) {
        if self.0.seal() {
            debug!("sole producer sealed its stream");
        }
    }
}
