//! Error types for sealstream operations.

use std::fmt;
use thiserror::Error;

/// Errors that can occur in stream operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The stream was sealed before the item could be delivered.
    #[error("push to a sealed stream")]
    Sealed,
}

/// A push that did not complete. The item is always handed back.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum PushError<T> {
    /// The buffer has no room (or no waiting receiver for a rendezvous stream).
    Full(T),
    /// The stream is sealed.
    Sealed(T),
    /// The racing future completed before the item was accepted.
    Cancelled(T),
}

impl<T> PushError<T> {
    /// Returns the item that could not be pushed.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(item) | Self::Sealed(item) | Self::Cancelled(item) => item,
        }
    }

    /// Returns `true` if the stream is sealed and retrying cannot succeed.
    #[inline]
    pub fn is_sealed(&self) -> bool {
        matches!(self, Self::Sealed(_))
    }

    /// Returns `true` if this is a recoverable error (e.g., `Full`).
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Full(_))
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Sealed(_) => f.write_str("Sealed(..)"),
            Self::Cancelled(_) => f.write_str("Cancelled(..)"),
        }
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("stream buffer is full"),
            Self::Sealed(_) => f.write_str("push to a sealed stream"),
            Self::Cancelled(_) => f.write_str("push cancelled before the item was accepted"),
        }
    }
}

impl<T> std::error::Error for PushError<T> {}

/// Errors raised while building a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// Nobody would ever drain the stream.
    #[error("a pipeline needs at least one consumer")]
    NoConsumers,

    /// The sole-producer topology was requested with the wrong producer count.
    #[error("sole-producer topology requires exactly one producer, got {producers}")]
    SoleProducerCount {
        /// The configured number of producers.
        producers: usize,
    },
}
