//! `authrelay burst <path>` – concurrent GETs against one session.

use anyhow::Result;
use authrelay_core::config::ClientConfig;
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::cli::session::CliSession;

pub async fn run_burst(cfg: &ClientConfig, path: &str, count: usize, retry: bool) -> Result<()> {
    let session = CliSession::open(cfg, "/")?;
    let mut tasks = JoinSet::new();
    for i in 0..count.max(1) {
        let client = Arc::clone(&session.client);
        let transport = Arc::clone(&session.transport);
        let path = path.to_string();
        tasks.spawn(async move {
            let result = if retry {
                client.execute_with_retry(|| transport.get(&path)).await
            } else {
                client.execute(|| transport.get(&path)).await
            };
            (i, result)
        });
    }

    let mut failed = 0usize;
    let mut results = Vec::with_capacity(count);
    while let Some(joined) = tasks.join_next().await {
        results.push(joined?);
    }
    results.sort_by_key(|(i, _)| *i);
    println!("{:<4} {:<8} {}", "#", "RESULT", "DETAIL");
    for (i, result) in &results {
        match result {
            Ok(response) => println!("{:<4} {:<8} HTTP {}", i, "ok", response.status),
            Err(e) => {
                failed += 1;
                println!("{:<4} {:<8} {}", i, "error", e);
            }
        }
    }
    println!(
        "{} requests, {} failed, {} session refresh(es)",
        results.len(),
        failed,
        session.client.coordinator().refresh_count()
    );
    session.finish()
}
