//! Third-party role: may decide shutdown, never touches data.

use crate::role::RoleId;
use crate::signal::ShutdownSignal;
use futures_util::future::BoxFuture;
use tracing::debug;

/// A task with no stream access whose only power is to request shutdown.
///
/// The condition (a timer, an OS signal, a health probe) is raced against
/// the shutdown signal, so a third party whose condition never fires still
/// exits once someone else decides.
pub struct ThirdParty {
    id: RoleId,
    condition: BoxFuture<'static, Option<String>>,
    signal: ShutdownSignal,
}

impl ThirdParty {
    /// `condition` resolves to the shutdown reason, or `None` to exit without
    /// requesting anything.
    pub fn new(
        id: RoleId,
        condition: BoxFuture<'static, Option<String>>,
        signal: ShutdownSignal,
    ) -> Self {
        Self {
            id,
            condition,
            signal,
        }
    }

    pub fn id(&self) -> RoleId {
        self.id
    }

    /// Waits for the condition or for shutdown, whichever comes first.
    /// Returns `true` if this third party became the decider.
    pub async fn run(self) -> bool {
        let Self {
            id,
            condition,
            signal,
        } = self;

        let won = tokio::select! {
            biased;
            _ = signal.fired() => false,
            reason = condition => match reason {
                Some(reason) => signal.request_shutdown(&id, reason),
                None => false,
            },
        };

        debug!(third_party = %id, won, "third party exiting");
        won
    }
}
