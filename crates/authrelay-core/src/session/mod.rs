//! Session client: the façade every call site goes through.
//!
//! # Data Flow
//! ```text
//! execute(call)
//!     → call() via transport
//!     → classify outcome
//!     → 401: refresh coordinator (refresh-or-wait, replay once)
//!     → 403: navigation hook
//!     → anything else: returned unchanged
//!
//! execute_with_retry(call)
//!     → first run wrapped in the retry policy (network / 5xx);
//!       execute_with_policy takes a per-call policy instead
//!     → then as above; the post-refresh replay is a single raw call
//! ```

mod navigation;

pub use navigation::{Navigator, PathNavigator, RedirectReason};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::classify::{CallContext, ErrorKind, DEFAULT_ADMIN_SCOPE_MARKER};
use crate::config::ClientConfig;
use crate::error::{SessionError, TransportError};
use crate::events::{EventSink, SessionEvent};
use crate::refresh::{RefreshCoordinator, RefreshFn};
use crate::retry::{run_with_retry, RetryPolicy};

/// Authenticated request layer for one session.
pub struct SessionClient {
    coordinator: RefreshCoordinator,
    retry: RetryPolicy,
    navigator: Option<Arc<dyn Navigator>>,
    admin_scope_marker: String,
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("coordinator", &self.coordinator)
            .field("retry", &self.retry)
            .field("navigator", &self.navigator.is_some())
            .field("admin_scope_marker", &self.admin_scope_marker)
            .finish()
    }
}

/// Builder for [`SessionClient`].
pub struct SessionClientBuilder {
    refresh: RefreshFn,
    refresh_timeout: Duration,
    retry: RetryPolicy,
    events: EventSink,
    navigator: Option<Arc<dyn Navigator>>,
    admin_scope_marker: String,
}

impl SessionClientBuilder {
    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Subscriber for `SessionConfirmed` / `SessionLost`.
    pub fn events(mut self, tx: mpsc::Sender<SessionEvent>) -> Self {
        self.events = EventSink::new(tx);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn admin_scope_marker(mut self, marker: impl Into<String>) -> Self {
        self.admin_scope_marker = marker.into();
        self
    }

    pub fn build(self) -> SessionClient {
        SessionClient {
            coordinator: RefreshCoordinator::new(self.refresh, self.refresh_timeout, self.events),
            retry: self.retry,
            navigator: self.navigator,
            admin_scope_marker: self.admin_scope_marker,
        }
    }
}

impl SessionClient {
    pub fn builder(refresh: RefreshFn) -> SessionClientBuilder {
        SessionClientBuilder {
            refresh,
            refresh_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            events: EventSink::none(),
            navigator: None,
            admin_scope_marker: DEFAULT_ADMIN_SCOPE_MARKER.to_string(),
        }
    }

    /// Builder preloaded from configuration (refresh timeout, retry, admin marker).
    pub fn builder_from_config(cfg: &ClientConfig, refresh: RefreshFn) -> SessionClientBuilder {
        Self::builder(refresh)
            .refresh_timeout(cfg.refresh_timeout())
            .retry_policy(RetryPolicy::from(&cfg.retry_or_default()))
            .admin_scope_marker(cfg.admin_scope_marker.clone())
    }

    pub fn from_config(cfg: &ClientConfig, refresh: RefreshFn) -> Self {
        Self::builder_from_config(cfg, refresh).build()
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Swap the injected refresh operation.
    pub fn set_refresh(&self, refresh: RefreshFn) {
        self.coordinator.set_refresh(refresh);
    }

    /// Sign-out: abort any in-flight refresh episode so no waiter survives
    /// the session boundary. Returns the number of waiters released.
    pub fn reset(&self) -> usize {
        self.coordinator.reset()
    }

    /// Run `call` with refresh-and-replay on 401.
    pub async fn execute<T, F, Fut>(&self, mut call: F) -> Result<T, SessionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let ctx = self.context();
        let outcome = call().await;
        let result = self.coordinator.recover(outcome, ctx, call).await;
        result.map_err(|e| self.route(e))
    }

    /// Like [`execute`](Self::execute) but the first run retries transient
    /// failures with backoff. Use for idempotent calls only.
    pub async fn execute_with_retry<T, F, Fut>(&self, call: F) -> Result<T, SessionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        self.execute_with_policy(&self.retry, call).await
    }

    /// [`execute_with_retry`](Self::execute_with_retry) with a retry policy
    /// chosen by the call site instead of the client default.
    pub async fn execute_with_policy<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        mut call: F,
    ) -> Result<T, SessionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let ctx = self.context();
        let outcome = run_with_retry(policy, &mut call).await;
        let result = self.coordinator.recover(outcome, ctx, call).await;
        result.map_err(|e| self.route(e))
    }

    fn context(&self) -> CallContext<'_> {
        CallContext {
            refresh_call: false,
            replay: false,
            admin_area: self
                .navigator
                .as_ref()
                .is_some_and(|n| n.in_admin_area()),
            admin_scope_marker: &self.admin_scope_marker,
        }
    }

    /// Forward authorization-scope failures to the navigation hook.
    fn route(&self, err: SessionError) -> SessionError {
        let reason = match &err {
            SessionError::Request {
                kind: ErrorKind::Forbidden,
                ..
            } => Some(RedirectReason::Forbidden),
            SessionError::Request {
                kind: ErrorKind::ForbiddenAdminScope,
                ..
            } => Some(RedirectReason::AdminScope),
            _ => None,
        };
        if let (Some(reason), Some(nav)) = (reason, self.navigator.as_ref()) {
            nav.redirect(reason);
        }
        err
    }
}
