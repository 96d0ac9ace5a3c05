pub mod classify;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod refresh;
pub mod retry;
pub mod session;
pub mod transport;

pub use classify::{classify, classify_status, CallContext, ErrorKind};
pub use error::{SessionError, TransportError};
pub use events::SessionEvent;
pub use refresh::{refresh_fn, RefreshCoordinator, RefreshFn};
pub use retry::RetryPolicy;
pub use session::{Navigator, PathNavigator, RedirectReason, SessionClient};
pub use transport::{CookieJar, HttpTransport};
