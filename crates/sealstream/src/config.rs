//! Configuration for pipeline construction.

use crate::error::PipelineError;
use crate::stream::Capacity;
use std::time::Duration;

/// How producers reach the public stream, and who may seal it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// Producers write an internal relay stream. The coordinator is the only
    /// writer of the public stream and the only party that seals it.
    Relay,
    /// Producers push straight into the public stream. The coordinator seals
    /// it once every producer has exited.
    Direct,
    /// A single producer owns the public stream and seals it itself when it
    /// stops. The coordinator never seals.
    SoleProducer,
}

impl Topology {
    /// The default topology for `producers` producers: `Direct` for one,
    /// `Relay` for more.
    pub fn for_producers(producers: usize) -> Self {
        if producers <= 1 {
            Self::Direct
        } else {
            Self::Relay
        }
    }
}

/// Configuration for a pipeline run.
///
/// Every knob is a plain value; nothing is read from the environment.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of producer tasks.
    pub producers: usize,

    /// Number of consumer tasks. Must be at least one.
    pub consumers: usize,

    /// Number of third-party tasks (shutdown requesters without a data role).
    pub third_parties: usize,

    /// Capacity of the public stream consumers drain.
    pub buffer_capacity: Capacity,

    /// Capacity of the relay stream used by [`Topology::Relay`].
    ///
    /// Default: 0 (rendezvous, so at most one value is in flight between a
    /// producer and the coordinator)
    pub relay_capacity: Capacity,

    /// Producer/coordinator arrangement.
    ///
    /// Default: [`Topology::for_producers`]
    pub topology: Topology,

    /// Pause between generated items, per producer. `None` generates as fast
    /// as the stream accepts items.
    ///
    /// Default: None
    pub produce_interval: Option<Duration>,

    /// Upper bound on each forward the coordinator attempts after shutdown
    /// has fired. Items that do not fit in time are dropped and counted.
    ///
    /// Default: 1s
    pub final_forward_timeout: Duration,
}

impl PipelineConfig {
    /// Creates a configuration with the given role counts and buffer capacity.
    pub fn new(
        producers: usize,
        consumers: usize,
        third_parties: usize,
        buffer_capacity: impl Into<Capacity>,
    ) -> Self {
        Self {
            producers,
            consumers,
            third_parties,
            buffer_capacity: buffer_capacity.into(),
            relay_capacity: Capacity::Bounded(0),
            topology: Topology::for_producers(producers),
            produce_interval: None,
            final_forward_timeout: Duration::from_secs(1),
        }
    }

    /// One producer feeding many consumers through the public stream.
    pub fn fan_out(consumers: usize, buffer_capacity: impl Into<Capacity>) -> Self {
        Self::new(1, consumers, 0, buffer_capacity)
    }

    /// Many producers feeding one consumer through the relay.
    pub fn fan_in(producers: usize, buffer_capacity: impl Into<Capacity>) -> Self {
        Self::new(producers, 1, 0, buffer_capacity).with_topology(Topology::Relay)
    }

    /// Sets the topology.
    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Sets the relay capacity.
    pub fn with_relay_capacity(mut self, capacity: impl Into<Capacity>) -> Self {
        self.relay_capacity = capacity.into();
        self
    }

    /// Sets the pause between generated items.
    pub fn with_produce_interval(mut self, interval: Duration) -> Self {
        self.produce_interval = Some(interval);
        self
    }

    /// Sets the bound on forwards attempted after shutdown.
    pub fn with_final_forward_timeout(mut self, timeout: Duration) -> Self {
        self.final_forward_timeout = timeout;
        self
    }

    /// Checks that the configuration can terminate.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.consumers == 0 {
            return Err(PipelineError::NoConsumers);
        }
        if self.topology == Topology::SoleProducer && self.producers != 1 {
            return Err(PipelineError::SoleProducerCount {
                producers: self.producers,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_topology_follows_producer_count() {
        assert_eq!(PipelineConfig::new(1, 4, 0, 8).topology, Topology::Direct);
        assert_eq!(PipelineConfig::new(3, 1, 0, 8).topology, Topology::Relay);
        assert_eq!(PipelineConfig::fan_in(1, 8).topology, Topology::Relay);
    }

    #[test]
    fn test_builders() {
        let config = PipelineConfig::fan_out(10, Capacity::Unbounded)
            .with_relay_capacity(4)
            .with_produce_interval(Duration::from_millis(5))
            .with_final_forward_timeout(Duration::from_millis(50));

        assert_eq!(config.producers, 1);
        assert_eq!(config.consumers, 10);
        assert_eq!(config.buffer_capacity, Capacity::Unbounded);
        assert_eq!(config.relay_capacity, Capacity::Bounded(4));
        assert_eq!(config.produce_interval, Some(Duration::from_millis(5)));
        assert_eq!(config.final_forward_timeout, Duration::from_millis(50));
    }

    #[test]
    fn test_validate() {
        assert_eq!(
            PipelineConfig::new(1, 0, 0, 1).validate(),
            Err(PipelineError::NoConsumers)
        );
        assert_eq!(
            PipelineConfig::new(2, 1, 0, 1)
                .with_topology(Topology::SoleProducer)
                .validate(),
            Err(PipelineError::SoleProducerCount { producers: 2 })
        );
        assert!(PipelineConfig::new(0, 1, 3, 0).validate().is_ok());
    }
}
