//! RAII guard that ends the episode if its leader never settles it.

use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;

use crate::error::SessionError;

use super::episode::{release_all, Episode, Release};

/// Held by the leader while the refresh runs. If the leader's future is
/// dropped (or the refresh panics) before `settle`, waiters are released
/// with `RefreshInterrupted` so nobody stays parked.
pub(super) struct EpisodeGuard<'a> {
    pub(super) state: &'a Mutex<Episode>,
    pub(super) generation: u64,
    pub(super) settled: bool,
}

impl EpisodeGuard<'_> {
    /// End the episode normally and take its waiters.
    pub(super) fn settle(&mut self) -> Option<Vec<oneshot::Sender<Release>>> {
        self.settled = true;
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finish(self.generation)
    }
}

impl Drop for EpisodeGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let waiters = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finish(self.generation);
        if let Some(waiters) = waiters {
            tracing::warn!(
                generation = self.generation,
                waiters = waiters.len(),
                "refresh leader dropped before settling"
            );
            release_all(waiters, || Release::Abort(SessionError::RefreshInterrupted));
        }
    }
}
