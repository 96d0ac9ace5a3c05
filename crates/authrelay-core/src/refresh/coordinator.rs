//! The coordinator: classify, refresh-or-wait, replay once.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use crate::classify::{classify, CallContext, ErrorKind};
use crate::error::{SessionError, TransportError};
use crate::events::{EventSink, SessionEvent};

use super::episode::{release_all, Episode, Release, Role};
use super::guard::EpisodeGuard;

/// Future returned by a refresh operation.
pub type RefreshFuture = Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send>>;

/// Injected session refresh. Opaque: only success or failure is observed.
pub type RefreshFn = Arc<dyn Fn() -> RefreshFuture + Send + Sync>;

/// Wrap an async closure as a [`RefreshFn`].
pub fn refresh_fn<F, Fut>(f: F) -> RefreshFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TransportError>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

tokio::task_local! {
    /// Set while the refresh operation itself is running.
    static IN_REFRESH: ();
}

fn in_refresh() -> bool {
    IN_REFRESH.try_with(|_| ()).is_ok()
}

/// Keeps at most one session refresh in flight and replays the callers
/// that were blocked on it.
///
/// Construct one per authenticated client. The episode state lives behind a
/// plain mutex that is only held for flag flips and queue moves, never
/// across an await.
pub struct RefreshCoordinator {
    state: Mutex<Episode>,
    refresh: RwLock<RefreshFn>,
    refresh_timeout: Duration,
    refresh_count: AtomicU64,
    events: EventSink,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("refreshing", &self.is_refreshing())
            .field("waiters", &self.waiter_count())
            .field("refresh_timeout", &self.refresh_timeout)
            .field("refresh_count", &self.refresh_count())
            .finish()
    }
}

impl RefreshCoordinator {
    pub fn new(refresh: RefreshFn, refresh_timeout: Duration, events: EventSink) -> Self {
        Self {
            state: Mutex::new(Episode::default()),
            refresh: RwLock::new(refresh),
            refresh_timeout,
            refresh_count: AtomicU64::new(0),
            events,
        }
    }

    /// Replace the refresh operation. Takes effect for the next episode.
    pub fn set_refresh(&self, refresh: RefreshFn) {
        *self.refresh.write().unwrap_or_else(PoisonError::into_inner) = refresh;
    }

    /// True while an episode is in flight.
    pub fn is_refreshing(&self) -> bool {
        self.lock().is_active()
    }

    /// Number of callers currently parked behind the in-flight refresh.
    pub fn waiter_count(&self) -> usize {
        self.lock().waiter_count()
    }

    /// Total refresh operations started by this coordinator.
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count.load(Ordering::Relaxed)
    }

    /// Abort the in-flight episode (sign-out). Every waiter is released with
    /// `SessionReset`; a refresh still running will not disturb later episodes.
    /// Returns the number of waiters released.
    pub fn reset(&self) -> usize {
        let waiters = self.lock().reset();
        let n = waiters.len();
        release_all(waiters, || Release::Abort(SessionError::SessionReset));
        tracing::info!(aborted_waiters = n, "session state reset");
        n
    }

    /// Execute `call`; on a refreshable 401, refresh (or wait for the
    /// in-flight refresh) and replay it once.
    pub async fn guard<T, F, Fut>(&self, call: F) -> Result<T, SessionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        self.guard_with(CallContext::default(), call).await
    }

    /// Like [`guard`](Self::guard) with an explicit classification context.
    pub async fn guard_with<T, F, Fut>(
        &self,
        ctx: CallContext<'_>,
        mut call: F,
    ) -> Result<T, SessionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let outcome = call().await;
        self.recover(outcome, ctx, call).await
    }

    /// Apply the refresh protocol to an outcome that was already produced.
    ///
    /// `replay` is invoked at most once, only after a successful refresh.
    pub async fn recover<T, F, Fut>(
        &self,
        outcome: Result<T, TransportError>,
        ctx: CallContext<'_>,
        replay: F,
    ) -> Result<T, SessionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let err = match outcome {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };

        if in_refresh() {
            let ctx = CallContext {
                refresh_call: true,
                ..ctx
            };
            return Err(SessionError::request(classify(&err, &ctx), err));
        }

        let kind = classify(&err, &ctx);
        if kind != ErrorKind::Unauthorized {
            return Err(SessionError::request(kind, err));
        }

        let role = self.lock().join();
        let generation = match role {
            Role::Leader(generation) => {
                self.lead(generation).await?;
                generation
            }
            Role::Waiter(generation, rx) => {
                tracing::debug!("waiting on in-flight session refresh");
                match rx.await {
                    Ok(Release::Proceed) => {}
                    Ok(Release::Abort(e)) => return Err(e),
                    Err(_) => return Err(SessionError::SessionReset),
                }
                generation
            }
        };

        let ctx = CallContext {
            replay: true,
            ..ctx
        };
        match replay().await {
            Ok(v) => Ok(v),
            Err(e) => {
                let kind = classify(&e, &ctx);
                if kind == ErrorKind::UnauthorizedTerminal {
                    tracing::warn!(generation, "replay after session refresh still unauthorized");
                    self.report_lost(generation);
                }
                Err(SessionError::request(kind, e))
            }
        }
    }

    /// Run the refresh for episode `generation` and release its waiters.
    async fn lead(&self, generation: u64) -> Result<(), SessionError> {
        let mut guard = EpisodeGuard {
            state: &self.state,
            generation,
            settled: false,
        };
        self.refresh_count.fetch_add(1, Ordering::Relaxed);
        tracing::info!(generation, "session refresh started");

        let refresh = Arc::clone(&self.refresh.read().unwrap_or_else(PoisonError::into_inner));
        let outcome = match IN_REFRESH
            .scope((), tokio::time::timeout(self.refresh_timeout, refresh()))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::no_response(format!(
                "session refresh timed out after {:?}",
                self.refresh_timeout
            ))),
        };

        let Some(waiters) = guard.settle() else {
            tracing::info!(generation, "session reset while refreshing; outcome discarded");
            return Err(SessionError::SessionReset);
        };

        match outcome {
            Ok(()) => {
                tracing::info!(generation, waiters = waiters.len(), "session refresh succeeded");
                self.events.emit(SessionEvent::Confirmed);
                release_all(waiters, || Release::Proceed);
                Ok(())
            }
            Err(source) => {
                tracing::warn!(
                    generation,
                    waiters = waiters.len(),
                    "session refresh failed: {}",
                    source
                );
                let err = SessionError::RefreshFailed { source };
                release_all(waiters, || Release::Abort(err.clone()));
                self.report_lost(generation);
                Err(err)
            }
        }
    }

    /// Emit `Lost` at most once per episode.
    fn report_lost(&self, generation: u64) {
        if self.lock().claim_lost(generation) {
            self.events.emit(SessionEvent::Lost);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Episode> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
