//! Classify a failed transport attempt into the recovery path it should take.

use std::fmt;

use crate::error::TransportError;

/// Default body marker identifying a 403 caused by missing administrative scope.
pub const DEFAULT_ADMIN_SCOPE_MARKER: &str = "admin_scope";

/// Recovery-relevant classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No response was received.
    Network,
    /// 401 eligible for a session refresh.
    Unauthorized,
    /// 401 from the refresh call itself or from a replay after a refresh.
    UnauthorizedTerminal,
    /// 403.
    Forbidden,
    /// 403 carrying the admin-scope marker while inside an admin area.
    ForbiddenAdminScope,
    /// 5xx.
    Server(u16),
    /// Any other 4xx (and anything outside 4xx/5xx that still failed).
    Client(u16),
}

impl ErrorKind {
    /// Network and server errors are the only kinds the retry policy re-invokes.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Server(_))
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Network => write!(f, "network error"),
            ErrorKind::Unauthorized => write!(f, "unauthorized"),
            ErrorKind::UnauthorizedTerminal => write!(f, "unauthorized after session refresh"),
            ErrorKind::Forbidden => write!(f, "forbidden"),
            ErrorKind::ForbiddenAdminScope => write!(f, "forbidden (admin scope required)"),
            ErrorKind::Server(code) => write!(f, "server error {}", code),
            ErrorKind::Client(code) if (400..500).contains(code) => write!(f, "client error {}", code),
            ErrorKind::Client(code) => write!(f, "unexpected status {}", code),
        }
    }
}

/// Where the failing call came from. Decides the 401 and 403 refinements.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    /// The failing call was the refresh operation.
    pub refresh_call: bool,
    /// The failing call is the one replay granted after a refresh.
    pub replay: bool,
    /// The application is currently inside an admin-restricted area.
    pub admin_area: bool,
    /// Body marker for admin-scope 403s.
    pub admin_scope_marker: &'a str,
}

impl Default for CallContext<'_> {
    fn default() -> Self {
        Self {
            refresh_call: false,
            replay: false,
            admin_area: false,
            admin_scope_marker: DEFAULT_ADMIN_SCOPE_MARKER,
        }
    }
}

/// Classify an HTTP status (with its body) in the given context.
pub fn classify_status(code: u16, body: &str, ctx: &CallContext<'_>) -> ErrorKind {
    match code {
        401 if ctx.refresh_call || ctx.replay => ErrorKind::UnauthorizedTerminal,
        401 => ErrorKind::Unauthorized,
        403 if ctx.admin_area
            && !ctx.admin_scope_marker.is_empty()
            && body.contains(ctx.admin_scope_marker) =>
        {
            ErrorKind::ForbiddenAdminScope
        }
        403 => ErrorKind::Forbidden,
        500..=599 => ErrorKind::Server(code),
        _ => ErrorKind::Client(code),
    }
}

/// Classify a transport failure.
pub fn classify(e: &TransportError, ctx: &CallContext<'_>) -> ErrorKind {
    match e {
        TransportError::NoResponse { .. } => ErrorKind::Network,
        TransportError::Status { code, body } => classify_status(*code, body, ctx),
    }
}
