//! Wiring shared by the request commands: config → jar → transport → client.

use anyhow::Result;
use authrelay_core::config::ClientConfig;
use authrelay_core::events::SessionEvent;
use authrelay_core::session::{Navigator, PathNavigator, SessionClient};
use authrelay_core::transport::{CookieJar, HttpTransport};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct CliSession {
    pub transport: Arc<HttpTransport>,
    pub client: Arc<SessionClient>,
    pub navigator: Arc<PathNavigator>,
    events: mpsc::Receiver<SessionEvent>,
    jar_path: PathBuf,
}

impl CliSession {
    pub fn open(cfg: &ClientConfig, area: &str) -> Result<Self> {
        let jar_path = CookieJar::default_path()?;
        let jar = CookieJar::load(&jar_path)?;
        tracing::debug!(cookies = jar.len(), "loaded cookie jar from {}", jar_path.display());

        let transport = Arc::new(HttpTransport::from_config(cfg, jar)?);
        let navigator = Arc::new(PathNavigator::new(area, cfg.admin_path_prefixes.clone()));
        let (tx, events) = mpsc::channel(16);
        let client = SessionClient::builder_from_config(cfg, transport.refresher(&cfg.refresh_path))
            .events(tx)
            .navigator(Arc::clone(&navigator) as Arc<dyn Navigator>)
            .build();

        Ok(Self {
            transport,
            client: Arc::new(client),
            navigator,
            events,
            jar_path,
        })
    }

    /// Report session events and redirects, then persist the jar.
    pub fn finish(mut self) -> Result<()> {
        while let Ok(event) = self.events.try_recv() {
            match event {
                SessionEvent::Confirmed => eprintln!("session refreshed"),
                SessionEvent::Lost => eprintln!("session lost; sign in again"),
            }
        }
        if let Some(reason) = self.navigator.last_redirect() {
            eprintln!("redirect: {}", reason.code());
        }
        self.transport.jar().save(&self.jar_path)
    }
}
