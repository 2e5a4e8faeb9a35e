use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cancels a token once a duration has elapsed.
///
/// The timer is aborted when this is dropped, so a deadline only ever fires
/// while the operation it guards is still running.
#[derive(Debug)]
pub struct Deadline {
    token: CancellationToken,
    timer: JoinHandle<()>,
}

impl Deadline {
    /// Spawns a timer that cancels a child of `parent` after `duration`.
    ///
    /// Cancelling `parent` cancels the child too, but not the other way
    /// around.
    #[must_use]
    pub fn spawn(parent: &CancellationToken, duration: Duration) -> Self {
        let token = parent.child_token();
        let timer_token = token.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            timer_token.cancel();
        });
        Self { token, timer }
    }

    /// Token that becomes cancelled when the deadline passes.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.timer.abort();
    }
}
