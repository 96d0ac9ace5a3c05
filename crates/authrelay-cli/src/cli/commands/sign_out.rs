//! `authrelay sign-out` – forget the stored session.

use anyhow::Result;
use authrelay_core::transport::CookieJar;

pub fn run_sign_out() -> Result<()> {
    let path = CookieJar::default_path()?;
    let jar = CookieJar::load(&path)?;
    let n = jar.len();
    jar.clear();
    jar.save(&path)?;
    tracing::info!(cookies = n, "signed out");
    println!("Signed out ({} cookie(s) removed).", n);
    Ok(())
}
