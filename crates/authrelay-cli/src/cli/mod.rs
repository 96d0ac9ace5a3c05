//! CLI for the authrelay session layer.

mod commands;
mod session;

use anyhow::Result;
use authrelay_core::config;
use clap::{Parser, Subcommand};
use clap_complete::Shell;

use commands::{run_burst, run_completions, run_config, run_get, run_sign_out};

/// Top-level CLI for authrelay.
#[derive(Debug, Parser)]
#[command(name = "authrelay")]
#[command(about = "authrelay: cookie-session REST client with single-flight refresh", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// GET a path relative to the configured base URL.
    Get {
        /// Request path, e.g. `feed` or `admin/users`.
        path: String,
        /// Retry network failures and 5xx with backoff (idempotent calls only).
        #[arg(long)]
        retry: bool,
        /// Navigation path the request is made from (decides admin-area handling).
        #[arg(long, value_name = "PATH", default_value = "/")]
        area: String,
    },

    /// Issue N concurrent GETs that share one session refresh.
    Burst {
        /// Request path.
        path: String,
        /// Number of concurrent requests.
        #[arg(long, default_value = "5", value_name = "N")]
        count: usize,
        /// Retry network failures and 5xx with backoff.
        #[arg(long)]
        retry: bool,
    },

    /// Drop all stored session cookies.
    SignOut,

    /// Print the config file location and its current values.
    Config,

    /// Print a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        if let CliCommand::Completions { shell } = cli.command {
            run_completions(shell);
            return Ok(());
        }

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Get { path, retry, area } => run_get(&cfg, &path, retry, &area).await?,
            CliCommand::Burst { path, count, retry } => {
                run_burst(&cfg, &path, count, retry).await?
            }
            CliCommand::SignOut => run_sign_out()?,
            CliCommand::Config => run_config(&cfg)?,
            CliCommand::Completions { .. } => {}
        }

        Ok(())
    }
}
