//! `authrelay get <path>` – one authenticated GET.

use anyhow::Result;
use authrelay_core::config::ClientConfig;

use crate::cli::session::CliSession;

pub async fn run_get(cfg: &ClientConfig, path: &str, retry: bool, area: &str) -> Result<()> {
    let session = CliSession::open(cfg, area)?;
    let transport = &session.transport;
    let result = if retry {
        session.client.execute_with_retry(|| transport.get(path)).await
    } else {
        session.client.execute(|| transport.get(path)).await
    };
    let refreshes = session.client.coordinator().refresh_count();
    session.finish()?;

    let response = result?;
    tracing::info!(path, status = response.status, refreshes, "get finished");
    println!("{}", response.text());
    Ok(())
}
