//! Navigation hook for authorization-scope failures.

use std::sync::{Mutex, PoisonError, RwLock};

/// Why the client asks the application to navigate away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectReason {
    /// Plain 403.
    Forbidden,
    /// 403 for missing administrative scope inside an admin area.
    AdminScope,
}

impl RedirectReason {
    pub fn code(self) -> &'static str {
        match self {
            RedirectReason::Forbidden => "forbidden",
            RedirectReason::AdminScope => "admin_scope",
        }
    }
}

/// Application navigation, as seen by the request layer.
pub trait Navigator: Send + Sync {
    /// True while the user is inside an admin-restricted area.
    fn in_admin_area(&self) -> bool {
        false
    }

    /// Side-effecting redirect. Called at most once per surfaced 403.
    fn redirect(&self, reason: RedirectReason);
}

/// Navigator driven by a current path and a list of admin path prefixes.
/// Records the last redirect instead of performing one.
#[derive(Debug, Default)]
pub struct PathNavigator {
    current: RwLock<String>,
    admin_prefixes: Vec<String>,
    last_redirect: Mutex<Option<RedirectReason>>,
}

impl PathNavigator {
    pub fn new(current: impl Into<String>, admin_prefixes: Vec<String>) -> Self {
        Self {
            current: RwLock::new(current.into()),
            admin_prefixes,
            last_redirect: Mutex::new(None),
        }
    }

    pub fn set_path(&self, path: impl Into<String>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = path.into();
    }

    pub fn last_redirect(&self) -> Option<RedirectReason> {
        *self.last_redirect.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Navigator for PathNavigator {
    fn in_admin_area(&self) -> bool {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        self.admin_prefixes
            .iter()
            .any(|p| !p.is_empty() && current.starts_with(p.as_str()))
    }

    fn redirect(&self, reason: RedirectReason) {
        tracing::info!(reason = reason.code(), "redirect requested");
        *self.last_redirect.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason);
    }
}
