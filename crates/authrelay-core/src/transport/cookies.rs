//! Cookie jar: the opaque credential scope shared by every request.
//!
//! Cookies are kept as Netscape cookie-file lines, the format libcurl reads
//! and writes. Each request injects the current jar and merges back only the
//! cookies it changed, so a slow request that started before a refresh
//! cannot overwrite the refreshed session with its stale copy.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";
const FILE_HEADER: &str = "# Netscape HTTP Cookie File\n";

/// Identity of a cookie: (domain, path, name).
type CookieKey<'a> = (&'a str, &'a str, &'a str);

fn cookie_key(line: &str) -> Option<CookieKey<'_>> {
    let line = line.strip_prefix(HTTP_ONLY_PREFIX).unwrap_or(line);
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 7 {
        return None;
    }
    Some((fields[0], fields[2], fields[5]))
}

fn is_cookie_line(line: &str) -> bool {
    let line = line.trim_end();
    !line.is_empty()
        && (line.starts_with(HTTP_ONLY_PREFIX) || !line.starts_with('#'))
        && cookie_key(line).is_some()
}

/// Shared, cloneable cookie jar.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    lines: Arc<Mutex<Vec<String>>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Default jar location (`~/.local/state/authrelay/cookies.txt`).
    pub fn default_path() -> Result<PathBuf> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("authrelay")?;
        Ok(xdg_dirs.place_state_file("cookies.txt")?)
    }

    /// Load a Netscape cookie file. A missing file yields an empty jar.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let data =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let jar = Self::new();
        jar.lock().extend(
            data.lines()
                .filter(|l| is_cookie_line(l))
                .map(|l| l.trim_end().to_string()),
        );
        Ok(jar)
    }

    /// Save as a Netscape cookie file (creates parent dir if needed).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = String::from(FILE_HEADER);
        for line in self.snapshot() {
            out.push_str(&line);
            out.push('\n');
        }
        fs::write(path, out).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// Add or replace a single cookie line.
    pub fn insert(&self, line: &str) {
        let Some(key) = cookie_key(line) else {
            tracing::debug!("ignoring malformed cookie line");
            return;
        };
        let mut lines = self.lock();
        lines.retain(|l| cookie_key(l) != Some(key));
        lines.push(line.to_string());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Merge what one request saw back into the jar.
    ///
    /// `sent` is what the request started with; `received` is the request's
    /// cookie list after the response. New or changed cookies replace the
    /// jar's entry for the same key; cookies the response removed are dropped
    /// only if the jar still holds the exact line that was sent.
    pub fn merge(&self, sent: &[String], received: &[String]) {
        let mut lines = self.lock();
        for line in received {
            if sent.contains(line) {
                continue;
            }
            let Some(key) = cookie_key(line) else {
                continue;
            };
            lines.retain(|l| cookie_key(l) != Some(key));
            lines.push(line.clone());
        }
        for line in sent {
            let Some(key) = cookie_key(line) else {
                continue;
            };
            if !received.iter().any(|r| cookie_key(r) == Some(key)) {
                lines.retain(|l| l != line);
            }
        }
    }
}
