//! Sealable FIFO stream shared by producers and consumers.

use crate::error::{PushError, StreamError};
#[cfg(debug_assertions)]
use crate::invariants::{
    debug_assert_open_on_push, debug_assert_seal_monotone, debug_assert_waiter_registered,
};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::debug;

/// Buffer capacity of a [`Stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// At most `n` buffered items. `Bounded(0)` is a rendezvous stream: a push
    /// is only accepted while a `pop` is waiting for it.
    Bounded(usize),
    /// No limit on buffered items; pushes never wait.
    Unbounded,
}

impl From<usize> for Capacity {
    fn from(n: usize) -> Self {
        Self::Bounded(n)
    }
}

/// Observable lifecycle of a [`Stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StreamState {
    /// Accepts pushes and delivers items.
    Open,
    /// Sealed, but buffered items are still deliverable.
    SealedDraining,
    /// Sealed and empty. Every `pop` returns `None` from here on.
    SealedEmpty,
}

/// Blocking FIFO queue with a one-shot seal.
///
/// Cloning a `Stream` yields another handle to the same queue. Any handle may
/// push or pop; by convention only the owner (the coordinator, or a sole
/// producer) calls [`seal`](Self::seal).
///
/// # Wake-ups
///
/// Two `Notify`s carry hand-offs, the same way the sender/receiver pair of a
/// ring channel shares a data notify and a backpressure notify:
///
/// - `data_notify`: one waiting `pop` is woken per accepted push
/// - `space_notify`: one waiting `push` is woken per freed slot
///
/// Sealing calls `notify_waiters()` on both, so no task stays parked on a
/// sealed stream.
pub struct Stream<T> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    buffer: Mutex<Buffer<T>>,
    data_notify: Notify,
    space_notify: Notify,
    capacity: Capacity,
}

struct Buffer<T> {
    items: VecDeque<T>,
    sealed: bool,
    /// Pops currently parked on an empty buffer. Only consulted for rendezvous streams.
    waiting_pops: usize,
}

impl<T> Buffer<T> {
    fn has_room(&self, capacity: Capacity) -> bool {
        match capacity {
            Capacity::Unbounded => true,
            Capacity::Bounded(0) => self.items.len() < self.waiting_pops,
            Capacity::Bounded(n) => self.items.len() < n,
        }
    }
}

impl<T> Stream<T> {
    /// Creates an open stream with the given capacity.
    pub fn new(capacity: impl Into<Capacity>) -> Self {
        let capacity = capacity.into();
        let items = match capacity {
            Capacity::Bounded(n) => VecDeque::with_capacity(n),
            Capacity::Unbounded => VecDeque::new(),
        };

        Self {
            shared: Arc::new(Shared {
                buffer: Mutex::new(Buffer {
                    items,
                    sealed: false,
                    waiting_pops: 0,
                }),
                data_notify: Notify::new(),
                space_notify: Notify::new(),
                capacity,
            }),
        }
    }

    /// Creates an open stream buffering at most `capacity` items.
    pub fn bounded(capacity: usize) -> Self {
        Self::new(Capacity::Bounded(capacity))
    }

    /// Creates an open stream without a buffer limit.
    pub fn unbounded() -> Self {
        Self::new(Capacity::Unbounded)
    }

    // The buffer is never left half-updated, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Buffer<T>> {
        self.shared
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Attempts to push an item without waiting.
    ///
    /// Returns `Err(PushError::Full(item))` when there is no room and
    /// `Err(PushError::Sealed(item))` once the stream is sealed. The item is
    /// never lost.
    pub fn try_push(&self, item: T) -> Result<(), PushError<T>> {
        {
            let mut buffer = self.lock();
            if buffer.sealed {
                return Err(PushError::Sealed(item));
            }
            if !buffer.has_room(self.shared.capacity) {
                return Err(PushError::Full(item));
            }

            #[cfg(debug_assertions)]
            debug_assert_open_on_push!(buffer.sealed);

            buffer.items.push_back(item);
        }

        self.shared.data_notify.notify_one();
        Ok(())
    }

    /// Pushes an item, waiting for room until the stream is sealed.
    ///
    /// Returns `StreamError::Sealed` if the stream was sealed before the item
    /// was accepted. This never panics, whoever sealed the stream.
    pub async fn push(&self, item: T) -> Result<(), StreamError> {
        // With a future that never completes, the only way out is Ok or Sealed.
        self.push_until(item, std::future::pending::<()>())
            .await
            .map_err(|_| StreamError::Sealed)
    }

    /// Pushes an item, waiting for room until either the stream is sealed or
    /// `cancel` completes.
    ///
    /// The push is attempted before `cancel` is polled, so an already-completed
    /// `cancel` still lets an item through when there is room. When `cancel`
    /// wins, the item is returned in `PushError::Cancelled`.
    pub async fn push_until<F>(&self, item: T, cancel: F) -> Result<(), PushError<T>>
    where
        F: Future,
    {
        tokio::pin!(cancel);
        let mut item = item;

        loop {
            let space = self.shared.space_notify.notified();
            tokio::pin!(space);
            // Register before checking so a slot freed in between is not missed.
            space.as_mut().enable();

            item = match self.try_push(item) {
                Ok(()) => return Ok(()),
                Err(PushError::Full(item)) => item,
                Err(err) => return Err(err),
            };

            tokio::select! {
                biased;
                _ = &mut cancel => return Err(PushError::Cancelled(item)),
                () = &mut space => {}
            }
        }
    }

    /// Pops the next item, waiting until one is available.
    ///
    /// Returns `None` only once the stream is sealed and every buffered item
    /// has been handed out.
    pub async fn pop(&self) -> Option<T> {
        let mut waiter = Waiter {
            shared: &self.shared,
            registered: false,
        };

        loop {
            let data = self.shared.data_notify.notified();
            tokio::pin!(data);
            data.as_mut().enable();

            {
                let mut buffer = self.lock();
                if let Some(item) = buffer.items.pop_front() {
                    waiter.unregister(&mut buffer);
                    drop(buffer);
                    self.shared.space_notify.notify_one();
                    return Some(item);
                }
                if buffer.sealed {
                    waiter.unregister(&mut buffer);
                    return None;
                }
                if !waiter.registered {
                    buffer.waiting_pops += 1;
                    waiter.registered = true;
                    drop(buffer);
                    if self.shared.capacity == Capacity::Bounded(0) {
                        // A rendezvous push may now be accepted.
                        self.shared.space_notify.notify_one();
                    }
                }
            }

            data.await;
        }
    }

    /// Pops the next item if one is buffered.
    pub fn try_pop(&self) -> Option<T> {
        let item = self.lock().items.pop_front();
        if item.is_some() {
            self.shared.space_notify.notify_one();
        }
        item
    }

    /// Seals the stream against further pushes.
    ///
    /// Returns `true` only for the call that performed the transition; later
    /// calls are no-ops that return `false`. All parked pushes and pops are
    /// woken.
    pub fn seal(&self) -> bool {
        {
            let mut buffer = self.lock();
            let was_sealed = std::mem::replace(&mut buffer.sealed, true);
            if was_sealed {
                return false;
            }

            #[cfg(debug_assertions)]
            debug_assert_seal_monotone!(was_sealed, buffer.sealed);

            debug!(buffered = buffer.items.len(), "stream sealed");
        }

        self.shared.data_notify.notify_waiters();
        self.shared.space_notify.notify_waiters();
        true
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> StreamState {
        let buffer = self.lock();
        match (buffer.sealed, buffer.items.is_empty()) {
            (false, _) => StreamState::Open,
            (true, false) => StreamState::SealedDraining,
            (true, true) => StreamState::SealedEmpty,
        }
    }

    /// Returns `true` once [`seal`](Self::seal) has taken effect.
    pub fn is_sealed(&self) -> bool {
        self.lock().sealed
    }

    /// Returns the number of buffered items.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Returns `true` if no items are buffered.
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Returns the configured capacity.
    pub fn capacity(&self) -> Capacity {
        self.shared.capacity
    }

    /// Converts this handle into an async stream of items that ends once the
    /// stream is sealed and drained.
    pub fn into_items(self) -> impl futures_util::Stream<Item = T> {
        futures_util::stream::unfold(self, |stream| async move {
            let item = stream.pop().await?;
            Some((item, stream))
        })
    }
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("capacity", &self.shared.capacity)
            .field("state", &self.state())
            .field("len", &self.len())
            .finish()
    }
}

/// Keeps `waiting_pops` balanced when a parked `pop` is dropped mid-wait
/// (for example the losing branch of a `select!`).
struct Waiter<'a, T> {
    shared: &'a Shared<T>,
    registered: bool,
}

impl<T> Waiter<'_, T> {
    fn unregister(&mut self, buffer: &mut Buffer<T>) {
        if self.registered {
            #[cfg(debug_assertions)]
            debug_assert_waiter_registered!(buffer.waiting_pops);

            buffer.waiting_pops -= 1;
            self.registered = false;
        }
    }
}

impl<T> Drop for Waiter<'_, T> {
    fn drop(&mut self) {
        if self.registered {
            let mut buffer = self
                .shared
                .buffer
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            #[cfg(debug_assertions)]
            debug_assert_waiter_registered!(buffer.waiting_pops);

            buffer.waiting_pops -= 1;
        }
    }
}
