//! Sealable async streams with single-authority shutdown
//!
//! This crate coordinates shutdown between many producers, many consumers and
//! any number of third parties sharing one bounded stream. Anyone may ask for
//! shutdown, exactly one request wins, and only one party ever seals the
//! stream, so a sealed stream is never written to and every accepted item is
//! still delivered.
//!
//! # Features
//!
//! - **Race-resolved decision**: [`ShutdownSignal`] records exactly one decider and reason
//! - **Single sealing authority**: the [`Coordinator`] (or a sole producer) seals the public stream
//! - **Drain on seal**: consumers exit only when the stream is sealed and empty
//! - **Cancellable pushes**: producers blocked on a full stream leave as soon as shutdown fires
//! - **Join barrier**: [`JoinBarrier`] tracks producer and consumer completion separately
//!
//! # Example
//!
//! ```ignore
//! use sealstream::{Flow, Pipeline, PipelineConfig, Produce};
//!
//! #[tokio::main]
//! async fn main() {
//!     let report = Pipeline::new(PipelineConfig::new(1, 100, 0, 16))
//!         .unwrap()
//!         .with_producers(|_| {
//!             let mut n = 0u64;
//!             move || {
//!                 n += 1;
//!                 if n > 333 { Produce::Exhausted } else { Produce::Item(n) }
//!             }
//!         })
//!         .with_consumers(|_| |item: u64| {
//!             println!("{}", item);
//!             Flow::Continue
//!         })
//!         .run()
//!         .await;
//!
//!     println!("{} decided: {}", report.decider, report.reason);
//! }
//! ```

mod config;
mod consumer;
mod coordinator;
mod error;
mod invariants;
mod join;
mod observe;
mod pipeline;
mod producer;
mod role;
mod signal;
mod stream;
mod third_party;

pub use config::{PipelineConfig, Topology};
pub use consumer::{Consumer, ConsumerSummary};
pub use coordinator::{Coordinator, CoordinatorOutcome, CONSUMERS_GONE, PRODUCER_EXHAUSTED};
pub use error::{PipelineError, PushError, StreamError};
pub use join::{JoinBarrier, TaskGuard};
pub use observe::{NoopObserver, Observer, TracingObserver};
pub use pipeline::{Phase, Pipeline, ShutdownReport};
pub use producer::{Producer, ProducerExit, ProducerSummary};
pub use role::{Consume, Flow, Generate, Produce, RoleId, TaskClass};
pub use signal::{Decision, ShutdownSignal};
pub use stream::{Capacity, Stream, StreamState};
pub use third_party::ThirdParty;
