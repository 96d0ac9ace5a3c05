//! Error types for transport attempts and for what the session layer surfaces.

use thiserror::Error;

use crate::classify::{classify, CallContext, ErrorKind};

/// Failure of a single transport attempt.
///
/// Cloneable so one refresh failure can be handed to every waiter of an episode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No response was received at all (connect failure, DNS, timeout, reset).
    #[error("no response: {reason}")]
    NoResponse { reason: String },
    /// A response arrived with a non-2xx status.
    #[error("HTTP {code}")]
    Status { code: u16, body: String },
}

impl TransportError {
    pub fn no_response(reason: impl Into<String>) -> Self {
        TransportError::NoResponse {
            reason: reason.into(),
        }
    }

    pub fn status(code: u16, body: impl Into<String>) -> Self {
        TransportError::Status {
            code,
            body: body.into(),
        }
    }

    /// HTTP status if a response was received.
    pub fn code(&self) -> Option<u16> {
        match self {
            TransportError::NoResponse { .. } => None,
            TransportError::Status { code, .. } => Some(*code),
        }
    }
}

/// Error surfaced to a call site by [`crate::session::SessionClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The call itself failed and no recovery applied (or recovery was exhausted).
    #[error("{kind}: {source}")]
    Request {
        kind: ErrorKind,
        #[source]
        source: TransportError,
    },
    /// The shared session refresh failed; every caller of the episode gets this.
    #[error("session refresh failed: {source}")]
    RefreshFailed {
        #[source]
        source: TransportError,
    },
    /// The refresh leader was cancelled before the refresh settled.
    #[error("session refresh interrupted")]
    RefreshInterrupted,
    /// The session was reset (sign-out) while the call was waiting on a refresh.
    #[error("session reset")]
    SessionReset,
}

impl SessionError {
    pub(crate) fn request(kind: ErrorKind, source: TransportError) -> Self {
        SessionError::Request { kind, source }
    }

    /// Classification of the surfaced failure. A refresh failure reports the
    /// classification of the refresh error (e.g. `Network` for a timeout).
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            SessionError::Request { kind, .. } => Some(*kind),
            SessionError::RefreshFailed { source } => Some(classify(
                source,
                &CallContext {
                    refresh_call: true,
                    ..CallContext::default()
                },
            )),
            SessionError::RefreshInterrupted | SessionError::SessionReset => None,
        }
    }

    /// HTTP status carried by the underlying transport failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            SessionError::Request { source, .. } | SessionError::RefreshFailed { source } => {
                source.code()
            }
            SessionError::RefreshInterrupted | SessionError::SessionReset => None,
        }
    }

    /// True when the application must treat the session as ended.
    pub fn ends_session(&self) -> bool {
        match self {
            SessionError::Request { kind, .. } => *kind == ErrorKind::UnauthorizedTerminal,
            SessionError::RefreshFailed { .. }
            | SessionError::RefreshInterrupted
            | SessionError::SessionReset => true,
        }
    }
}
