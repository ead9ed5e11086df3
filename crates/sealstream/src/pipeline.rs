//! Wiring producers, consumers, third parties and the coordinator into a run.

use crate::config::{PipelineConfig, Topology};
use crate::consumer::Consumer;
use crate::coordinator::{Coordinator, CoordinatorOutcome};
use crate::error::PipelineError;
use crate::join::JoinBarrier;
use crate::observe::{NoopObserver, Observer};
use crate::producer::Producer;
use crate::role::{Consume, Flow, Generate, Produce, RoleId, TaskClass};
use crate::signal::ShutdownSignal;
use crate::stream::Stream;
use crate::third_party::ThirdParty;
use futures_util::future::{self, BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug_span, error, info, Instrument};

/// Lifecycle of a pipeline run. Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Built, not yet running.
    Created,
    /// Tasks are spawned.
    Running,
    /// The shutdown decision has been made.
    ShuttingDown,
    /// Every consumer has exited, so the public stream is drained.
    Drained,
    /// Every task has been joined.
    Joined,
}

/// What a finished run reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// The decider's reason.
    pub reason: String,
    /// The role whose shutdown request won.
    pub decider: RoleId,
    /// Items producers got accepted into their target stream.
    pub produced: u64,
    /// Items consumers received.
    pub delivered: u64,
    /// Relay items the coordinator could not forward in time.
    pub dropped: u64,
    /// Tasks that panicked instead of returning.
    pub failed_tasks: usize,
}

type GeneratorFactory<T> = Box<dyn FnMut(usize) -> Box<dyn Generate<T>> + Send>;
type HandlerFactory<T> = Box<dyn FnMut(usize) -> Box<dyn Consume<T>> + Send>;
type ConditionFactory = Box<dyn FnMut(usize) -> BoxFuture<'static, Option<String>> + Send>;

/// A configured producer/consumer pipeline with one shutdown authority.
///
/// ```ignore
/// let report = Pipeline::new(PipelineConfig::fan_out(10, 16))?
///     .with_producers(|_| {
///         let mut n = 0u32;
///         move || {
///             n += 1;
///             if n == 333 { Produce::Stop("hit 333".into()) } else { Produce::Item(n) }
///         }
///     })
///     .run()
///     .await;
/// ```
pub struct Pipeline<T> {
    config: PipelineConfig,
    generators: GeneratorFactory<T>,
    handlers: HandlerFactory<T>,
    conditions: ConditionFactory,
    observer: Arc<dyn Observer<T>>,
    phase: Arc<watch::Sender<Phase>>,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Builds a pipeline from a validated configuration.
    ///
    /// Until replaced, producers are immediately exhausted, consumers discard
    /// what they receive and third parties never request shutdown.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let (phase, _) = watch::channel(Phase::Created);

        Ok(Self {
            config,
            generators: Box::new(|_| -> Box<dyn Generate<T>> {
                Box::new(|| Produce::Exhausted)
            }),
            handlers: Box::new(|_| -> Box<dyn Consume<T>> {
                Box::new(|_item: T| Flow::Continue)
            }),
            conditions: Box::new(|_| future::pending::<Option<String>>().boxed()),
            observer: Arc::new(NoopObserver),
            phase: Arc::new(phase),
        })
    }

    /// Sets how the i-th producer generates items.
    pub fn with_producers<F, G>(mut self, mut factory: F) -> Self
    where
        F: FnMut(usize) -> G + Send + 'static,
        G: Generate<T> + 'static,
    {
        self.generators = Box::new(move |i| -> Box<dyn Generate<T>> { Box::new(factory(i)) });
        self
    }

    /// Sets how the i-th consumer handles items.
    pub fn with_consumers<F, C>(mut self, mut factory: F) -> Self
    where
        F: FnMut(usize) -> C + Send + 'static,
        C: Consume<T> + 'static,
    {
        self.handlers = Box::new(move |i| -> Box<dyn Consume<T>> { Box::new(factory(i)) });
        self
    }

    /// Sets the condition the i-th third party waits on. Resolving to
    /// `Some(reason)` requests shutdown.
    pub fn with_third_parties<F, Fut>(mut self, mut factory: F) -> Self
    where
        F: FnMut(usize) -> Fut + Send + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        self.conditions = Box::new(move |i| factory(i).boxed());
        self
    }

    pub fn with_observer(mut self, observer: impl Observer<T> + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Subscribes to lifecycle phase changes.
    pub fn phases(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Runs every role to completion and reports who decided shutdown.
    ///
    /// Returns once every producer, consumer, third party and the coordinator
    /// has exited. A panicking task is counted in
    /// [`ShutdownReport::failed_tasks`] and does not stall the run.
    pub async fn run(self) -> ShutdownReport {
        let Self {
            config,
            mut generators,
            mut handlers,
            mut conditions,
            observer,
            phase,
        } = self;
        let out = Stream::new(config.buffer_capacity);
        let relay =
            (config.topology == Topology::Relay).then(|| Stream::new(config.relay_capacity));
        let producer_target = relay.clone().unwrap_or_else(|| out.clone());
        let signal = ShutdownSignal::new();
        let barrier = JoinBarrier::new();

        info!(
            producers = config.producers,
            consumers = config.consumers,
            third_parties = config.third_parties,
            topology = ?config.topology,
            "pipeline starting"
        );

        // Register everything first: a class with nothing registered is done.
        let producer_guards: Vec<_> = (0..config.producers)
            .map(|_| barrier.register(TaskClass::Producer))
            .collect();
        let consumer_guards: Vec<_> = (0..config.consumers)
            .map(|_| barrier.register(TaskClass::Consumer))
            .collect();

        let mut consumers = JoinSet::new();
        for (i, guard) in consumer_guards.into_iter().enumerate() {
            let id = RoleId::Consumer(i);
            let consumer = Consumer::new(
                id,
                handlers(i),
                out.clone(),
                signal.clone(),
                Arc::clone(&observer),
            );
            consumers.spawn(consumer.run(guard).instrument(debug_span!("consumer", %id)));
        }

        let mut producers = JoinSet::new();
        for (i, guard) in producer_guards.into_iter().enumerate() {
            let id = RoleId::Producer(i);
            let mut producer = Producer::new(
                id,
                generators(i),
                producer_target.clone(),
                signal.clone(),
            )
            .with_interval(config.produce_interval);
            if config.topology == Topology::SoleProducer {
                producer = producer.owning_stream();
            }
            producers.spawn(producer.run(guard).instrument(debug_span!("producer", %id)));
        }

        let mut third_parties = JoinSet::new();
        for i in 0..config.third_parties {
            let id = RoleId::ThirdParty(i);
            let third = ThirdParty::new(id, conditions(i), signal.clone());
            third_parties.spawn(third.run().instrument(debug_span!("third_party", %id)));
        }

        let mut coordinator = Coordinator::new(out.clone(), signal.clone(), barrier.clone())
            .with_observer(Arc::clone(&observer))
            .with_final_forward_timeout(config.final_forward_timeout);
        coordinator = match (&relay, config.topology) {
            (Some(relay), _) => coordinator.with_relay(relay.clone()),
            (None, Topology::SoleProducer) => coordinator.leave_sealing_to_producer(),
            (None, _) => coordinator,
        };
        let mut coordinator =
            tokio::spawn(coordinator.run().instrument(debug_span!("coordinator")));

        advance(&phase, Phase::Running);

        let mut failed_tasks = 0;
        let coordinated = {
            let shutting_down = async {
                signal.fired().await;
                advance(&phase, Phase::ShuttingDown);
            };
            tokio::pin!(shutting_down);
            let mut seen = false;
            loop {
                tokio::select! {
                    biased;
                    () = &mut shutting_down, if !seen => seen = true,
                    joined = &mut coordinator => break joined,
                }
            }
        };
        let outcome: Option<CoordinatorOutcome> = match coordinated {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                error!(%err, "coordinator failed, sealing streams directly");
                failed_tasks += 1;
                signal.request_shutdown(&RoleId::Coordinator, "coordinator-failed");
                if let Some(relay) = &relay {
                    relay.seal();
                }
                if config.topology != Topology::SoleProducer {
                    barrier.producers_done().await;
                    out.seal();
                }
                None
            }
        };
        advance(&phase, Phase::ShuttingDown);

        barrier.consumers_done().await;
        advance(&phase, Phase::Drained);

        barrier.wait().await;

        let mut produced = 0;
        while let Some(joined) = producers.join_next().await {
            match joined {
                Ok(summary) => produced += summary.pushed,
                Err(err) => {
                    error!(%err, "producer task failed");
                    failed_tasks += 1;
                }
            }
        }
        let mut delivered = 0;
        while let Some(joined) = consumers.join_next().await {
            match joined {
                Ok(summary) => delivered += summary.delivered,
                Err(err) => {
                    error!(%err, "consumer task failed");
                    failed_tasks += 1;
                }
            }
        }
        while let Some(joined) = third_parties.join_next().await {
            if let Err(err) = joined {
                error!(%err, "third party task failed");
                failed_tasks += 1;
            }
        }
        advance(&phase, Phase::Joined);

        let (decision, dropped) = match outcome {
            Some(outcome) => (outcome.decision, outcome.dropped),
            None => (signal.fired().await, 0),
        };

        info!(
            decider = %decision.decider,
            reason = %decision.reason,
            produced,
            delivered,
            dropped,
            failed_tasks,
            "pipeline joined"
        );

        ShutdownReport {
            reason: decision.reason,
            decider: decision.decider,
            produced,
            delivered,
            dropped,
            failed_tasks,
        }
    }
}

/// Moves the phase forward; a phase that is not ahead of the current one is
/// ignored, so racing updates cannot move it back.
fn advance(phase: &watch::Sender<Phase>, next: Phase) {
    phase.send_if_modified(|current| {
        if next > *current {
            *current = next;
            true
        } else {
            false
        }
    });
}
