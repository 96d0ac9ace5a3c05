//! HTTP transport for session-authenticated calls.
//!
//! Uses the curl crate (libcurl) with its cookie engine enabled. Every
//! request is seeded from the shared [`CookieJar`] and merges the cookies the
//! server set back into it, so the refresh endpoint and ordinary calls share
//! one credential scope without the client ever reading a token.
//! Blocking curl work runs on `spawn_blocking`.

mod cookies;

pub use cookies::CookieJar;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::refresh::{refresh_fn, RefreshFn};

/// A 2xx response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Cookie-carrying HTTP client rooted at a base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base: Url,
    jar: CookieJar,
    connect_timeout: Duration,
    request_timeout: Duration,
}

struct Request {
    url: String,
    body: Option<Vec<u8>>,
    jar: CookieJar,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: &str, jar: CookieJar) -> Result<Self> {
        let base = Url::parse(base_url).with_context(|| format!("invalid base URL {}", base_url))?;
        Ok(Self {
            base,
            jar,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        })
    }

    pub fn from_config(cfg: &ClientConfig, jar: CookieJar) -> Result<Self> {
        let mut transport = Self::new(&cfg.base_url, jar)?;
        transport.connect_timeout = Duration::from_secs(cfg.connect_timeout_secs.max(1));
        transport.request_timeout = Duration::from_secs(cfg.request_timeout_secs.max(1));
        Ok(transport)
    }

    pub fn jar(&self) -> &CookieJar {
        &self.jar
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base
            .join(path)
            .map_err(|e| TransportError::no_response(format!("bad request path {:?}: {}", path, e)))
    }

    pub async fn get(&self, path: &str) -> Result<Response, TransportError> {
        self.send(path, None).await
    }

    pub async fn post(&self, path: &str, body: &[u8]) -> Result<Response, TransportError> {
        self.send(path, Some(body.to_vec())).await
    }

    /// Refresh operation that POSTs to `path`; any 2xx counts as success.
    pub fn refresher(self: &Arc<Self>, path: &str) -> RefreshFn {
        let transport = Arc::clone(self);
        let path = path.to_string();
        refresh_fn(move || {
            let transport = Arc::clone(&transport);
            let path = path.clone();
            async move { transport.post(&path, b"").await.map(|_| ()) }
        })
    }

    async fn send(&self, path: &str, body: Option<Vec<u8>>) -> Result<Response, TransportError> {
        let request = Request {
            url: self.endpoint(path)?.to_string(),
            body,
            jar: self.jar.clone(),
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
        };
        tokio::task::spawn_blocking(move || perform(request))
            .await
            .map_err(|e| TransportError::no_response(format!("transport task failed: {}", e)))?
    }
}

fn curl_failure(e: curl::Error) -> TransportError {
    TransportError::no_response(e.to_string())
}

/// Blocking request; call from `spawn_blocking`.
fn perform(request: Request) -> Result<Response, TransportError> {
    let mut body = Vec::new();
    let sent = request.jar.snapshot();

    let mut easy = curl::easy::Easy::new();
    easy.url(&request.url).map_err(curl_failure)?;
    easy.connect_timeout(request.connect_timeout).map_err(curl_failure)?;
    easy.timeout(request.request_timeout).map_err(curl_failure)?;
    // Empty name turns on the cookie engine without reading a file.
    easy.cookie_file("").map_err(curl_failure)?;
    for line in &sent {
        easy.cookie_list(line).map_err(curl_failure)?;
    }
    if let Some(payload) = &request.body {
        easy.post(true).map_err(curl_failure)?;
        easy.post_fields_copy(payload).map_err(curl_failure)?;
    }

    {
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })
            .map_err(curl_failure)?;
        transfer.perform().map_err(curl_failure)?;
    }

    let code = easy.response_code().map_err(curl_failure)?;
    let received: Vec<String> = easy
        .cookies()
        .map_err(curl_failure)?
        .iter()
        .map(|raw| String::from_utf8_lossy(raw).into_owned())
        .collect();
    request.jar.merge(&sent, &received);

    let status = u16::try_from(code).unwrap_or(0);
    tracing::debug!(url = %request.url, status, "request finished");
    if !(200..300).contains(&status) {
        return Err(TransportError::status(
            status,
            String::from_utf8_lossy(&body).into_owned(),
        ));
    }
    Ok(Response { status, body })
}
