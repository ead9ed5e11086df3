//! Role identities and the payload seams roles call into.

use std::fmt;

/// Identity of a pipeline participant, used to attribute the shutdown reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleId {
    /// The i-th producer.
    Producer(usize),
    /// The i-th consumer.
    Consumer(usize),
    /// The i-th third party (no data role, may only request shutdown).
    ThirdParty(usize),
    /// The coordinator, deciding on deterministic producer exhaustion.
    Coordinator,
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Producer(i) => write!(f, "sender-{}", i),
            Self::Consumer(i) => write!(f, "receiver-{}", i),
            Self::ThirdParty(i) => write!(f, "3rd-party#{}", i),
            Self::Coordinator => f.write_str("coordinator"),
        }
    }
}

/// Role classes a [`JoinBarrier`](crate::JoinBarrier) counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
    Producer,
    Consumer,
}

/// What a generator hands back to its producer on each step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Produce<T> {
    /// Push this item.
    Item(T),
    /// Request shutdown with this reason, then exit.
    Stop(String),
    /// Bounded work is finished; exit without requesting anything.
    Exhausted,
}

/// What a consumer handler asks for after processing an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Keep draining.
    Continue,
    /// Request shutdown with this reason. The consumer still drains until the
    /// stream is sealed and empty.
    Stop(String),
}

/// Payload generation, called by a producer once per step.
pub trait Generate<T>: Send {
    fn generate(&mut self) -> Produce<T>;
}

impl<T, F> Generate<T> for F
where
    F: FnMut() -> Produce<T> + Send,
{
    fn generate(&mut self) -> Produce<T> {
        self()
    }
}

/// Payload consumption, called by a consumer once per delivered item.
pub trait Consume<T>: Send {
    fn consume(&mut self, item: T) -> Flow;
}

impl<T, F> Consume<T> for F
where
    F: FnMut(T) -> Flow + Send,
{
    fn consume(&mut self, item: T) -> Flow {
        self(item)
    }
}
