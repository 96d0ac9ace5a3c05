//! `authrelay config` – show where the config lives and what it holds.

use anyhow::Result;
use authrelay_core::config::{self, ClientConfig};

pub fn run_config(cfg: &ClientConfig) -> Result<()> {
    println!("# {}", config::config_path()?.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}
