//! Termination supervisor for producer and consumer tasks.

#[cfg(debug_assertions)]
use crate::invariants::debug_assert_outstanding;
use crate::role::TaskClass;
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug)]
struct BarrierState {
    // Producers and consumers retire from different tasks; keep the counters
    // on separate cache lines.
    producers: CachePadded<AtomicUsize>,
    consumers: CachePadded<AtomicUsize>,
    notify: Notify,
}

impl BarrierState {
    fn counter(&self, class: TaskClass) -> &AtomicUsize {
        match class {
            TaskClass::Producer => &*self.producers,
            TaskClass::Consumer => &*self.consumers,
        }
    }
}

/// Counts outstanding producer and consumer tasks and lets other tasks wait
/// for either class, or both, to reach zero.
///
/// Register every task before spawning any of them: a class with nothing
/// registered counts as done.
#[derive(Debug, Clone)]
pub struct JoinBarrier {
    state: Arc<BarrierState>,
}

impl JoinBarrier {
    pub fn new() -> Self {
        Self {
            state: Arc::new(BarrierState {
                producers: CachePadded::new(AtomicUsize::new(0)),
                consumers: CachePadded::new(AtomicUsize::new(0)),
                notify: Notify::new(),
            }),
        }
    }

    /// Registers one task of `class`. The returned guard reports completion
    /// exactly once, when [`TaskGuard::done`] is called or the guard is dropped.
    pub fn register(&self, class: TaskClass) -> TaskGuard {
        self.state.counter(class).fetch_add(1, Ordering::AcqRel);
        TaskGuard {
            barrier: self.clone(),
            class,
            released: false,
        }
    }

    /// Returns the number of registered tasks of `class` that have not finished.
    pub fn outstanding(&self, class: TaskClass) -> usize {
        self.state.counter(class).load(Ordering::Acquire)
    }

    /// Waits until every registered producer has finished.
    pub async fn producers_done(&self) {
        self.wait_for(|b| b.outstanding(TaskClass::Producer) == 0).await;
    }

    /// Waits until every registered consumer has finished.
    pub async fn consumers_done(&self) {
        self.wait_for(|b| b.outstanding(TaskClass::Consumer) == 0).await;
    }

    /// Waits until every registered producer and consumer has finished.
    pub async fn wait(&self) {
        self.wait_for(|b| {
            b.outstanding(TaskClass::Producer) == 0 && b.outstanding(TaskClass::Consumer) == 0
        })
        .await;
    }

    async fn wait_for(&self, done: impl Fn(&Self) -> bool) {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if done(self) {
                return;
            }

            notified.await;
        }
    }
}

impl Default for JoinBarrier {
    fn default() -> Self {
        Self::new()
    }
}

/// Completion token for one registered task.
#[derive(Debug)]
#[must_use = "dropping the guard immediately reports the task as done"]
pub struct TaskGuard {
    barrier: JoinBarrier,
    class: TaskClass,
    released: bool,
}

impl TaskGuard {
    /// Reports this task as finished.
    pub fn done(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let _previous = self
            .barrier
            .state
            .counter(self.class)
            .fetch_sub(1, Ordering::AcqRel);

        #[cfg(debug_assertions)]
        debug_assert_outstanding!(self.class, _previous);

        self.barrier.state.notify.notify_waiters();
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_empty_barrier_is_done() {
        let barrier = JoinBarrier::new();
        timeout(Duration::from_millis(100), barrier.wait())
            .await
            .expect("nothing registered, wait should return");
    }

    #[tokio::test]
    async fn test_wait_blocks_until_all_done() {
        let barrier = JoinBarrier::new();
        let p = barrier.register(TaskClass::Producer);
        let c = barrier.register(TaskClass::Consumer);
        assert_eq!(barrier.outstanding(TaskClass::Producer), 1);

        assert!(timeout(Duration::from_millis(20), barrier.wait()).await.is_err());

        p.done();
        timeout(Duration::from_millis(100), barrier.producers_done())
            .await
            .expect("producers are done");
        assert!(timeout(Duration::from_millis(20), barrier.wait()).await.is_err());

        drop(c);
        timeout(Duration::from_millis(100), barrier.wait())
            .await
            .expect("all tasks are done");
        assert_eq!(barrier.outstanding(TaskClass::Consumer), 0);
    }

    #[tokio::test]
    async fn test_panicking_task_still_releases() {
        let barrier = JoinBarrier::new();
        let guard = barrier.register(TaskClass::Consumer);

        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("payload blew up");
        });
        assert!(handle.await.is_err());

        timeout(Duration::from_millis(100), barrier.consumers_done())
            .await
            .expect("guard drop during unwind must release the barrier");
    }

    #[tokio::test]
    async fn test_done_is_counted_once() {
        let barrier = JoinBarrier::new();
        let a = barrier.register(TaskClass::Producer);
        let _b = barrier.register(TaskClass::Producer);

        a.done();
        assert_eq!(barrier.outstanding(TaskClass::Producer), 1);
    }
}
