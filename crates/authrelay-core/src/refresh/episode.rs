//! Shared refresh state: the active flag, generation, and waiter queue.

use tokio::sync::oneshot;

use crate::error::SessionError;

/// How a parked waiter is released.
#[derive(Debug)]
pub(super) enum Release {
    /// The refresh succeeded; replay the original call once.
    Proceed,
    /// The episode ended without a usable session.
    Abort(SessionError),
}

/// What a caller became when it joined the episode.
pub(super) enum Role {
    /// Runs the refresh for the episode with this generation.
    Leader(u64),
    /// Waits for the leader's outcome of the episode with this generation.
    Waiter(u64, oneshot::Receiver<Release>),
}

/// One refresh episode. Only ever touched under the coordinator's mutex.
#[derive(Debug, Default)]
pub(super) struct Episode {
    active: bool,
    generation: u64,
    waiters: Vec<oneshot::Sender<Release>>,
    /// Last generation that already reported the session as lost.
    lost_reported: u64,
}

impl Episode {
    pub(super) fn is_active(&self) -> bool {
        self.active
    }

    pub(super) fn waiter_count(&self) -> usize {
        self.waiters.len()
    }

    /// Lead a new episode if idle, otherwise park behind the current one.
    pub(super) fn join(&mut self) -> Role {
        if !self.active {
            self.active = true;
            self.generation = self.generation.wrapping_add(1);
            return Role::Leader(self.generation);
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        Role::Waiter(self.generation, rx)
    }

    /// Claim the single `Lost` notification for episode `generation`.
    ///
    /// True only for the first caller per generation.
    pub(super) fn claim_lost(&mut self, generation: u64) -> bool {
        if self.lost_reported == generation {
            return false;
        }
        self.lost_reported = generation;
        true
    }

    /// End the episode `generation` and hand back its waiters.
    ///
    /// Returns `None` if that episode was already ended by a reset.
    pub(super) fn finish(&mut self, generation: u64) -> Option<Vec<oneshot::Sender<Release>>> {
        if !self.active || self.generation != generation {
            return None;
        }
        self.active = false;
        Some(std::mem::take(&mut self.waiters))
    }

    /// Forcibly end whatever episode is in flight.
    pub(super) fn reset(&mut self) -> Vec<oneshot::Sender<Release>> {
        self.active = false;
        self.generation = self.generation.wrapping_add(1);
        std::mem::take(&mut self.waiters)
    }
}

/// Resolve every waiter with the same outcome. Dropped receivers are ignored.
pub(super) fn release_all(waiters: Vec<oneshot::Sender<Release>>, outcome: impl Fn() -> Release) {
    for tx in waiters {
        let _ = tx.send(outcome());
    }
}
