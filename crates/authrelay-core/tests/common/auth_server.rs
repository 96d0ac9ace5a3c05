//! Minimal HTTP/1.1 backend with cookie sessions for integration tests.
//!
//! - `GET /feed` returns 200 when the `session` cookie matches the current
//!   token, otherwise 401.
//! - `POST /auth/refresh` requires the `refresh=ok` cookie; it waits
//!   `refresh_delay`, rotates the token and sets `session=<token>`.
//! - `GET /admin/...` always returns 403 with an admin-scope body.
//! - `GET /flaky` returns 503 for the first `flaky_failures` requests.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct AuthServerOptions {
    /// How long the refresh endpoint takes before answering.
    pub refresh_delay: Duration,
    /// Number of 503s `/flaky` serves before succeeding.
    pub flaky_failures: usize,
}

impl Default for AuthServerOptions {
    fn default() -> Self {
        Self {
            refresh_delay: Duration::from_millis(300),
            flaky_failures: 2,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    token: Mutex<Option<String>>,
    refreshes: AtomicUsize,
    feed_hits: AtomicUsize,
    flaky_hits: AtomicUsize,
}

pub struct AuthServer {
    pub url: String,
    state: Arc<State>,
}

impl AuthServer {
    pub fn refresh_count(&self) -> usize {
        self.state.refreshes.load(Ordering::SeqCst)
    }

    pub fn feed_hits(&self) -> usize {
        self.state.feed_hits.load(Ordering::SeqCst)
    }

    pub fn flaky_hits(&self) -> usize {
        self.state.flaky_hits.load(Ordering::SeqCst)
    }
}

/// Starts the server in a background thread. It runs until the process exits.
pub fn start(opts: AuthServerOptions) -> AuthServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let state = Arc::new(State::default());
    let server_state = Arc::clone(&state);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let state = Arc::clone(&server_state);
            thread::spawn(move || handle(stream, &state, opts));
        }
    });
    AuthServer {
        url: format!("http://127.0.0.1:{}/", port),
        state,
    }
}

fn handle(mut stream: TcpStream, state: &State, opts: AuthServerOptions) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(_) => return,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let (method, path, cookies) = parse_request(request);
    let cookie = |name: &str| {
        cookies
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    };

    match (method.as_str(), path.as_str()) {
        ("POST", "/auth/refresh") => {
            if cookie("refresh").as_deref() != Some("ok") {
                respond(&mut stream, "401 Unauthorized", "", r#"{"error":"refresh_rejected"}"#);
                return;
            }
            thread::sleep(opts.refresh_delay);
            let n = state.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            let token = format!("tok{}", n);
            *state.token.lock().unwrap() = Some(token.clone());
            let set_cookie = format!("Set-Cookie: session={}; Path=/; HttpOnly\r\n", token);
            respond(&mut stream, "200 OK", &set_cookie, "");
        }
        ("GET", "/feed") => {
            state.feed_hits.fetch_add(1, Ordering::SeqCst);
            let current = state.token.lock().unwrap().clone();
            if current.is_some() && cookie("session") == current {
                respond(&mut stream, "200 OK", "", r#"{"posts":[]}"#);
            } else {
                respond(&mut stream, "401 Unauthorized", "", r#"{"error":"expired"}"#);
            }
        }
        ("GET", "/flaky") => {
            let hit = state.flaky_hits.fetch_add(1, Ordering::SeqCst);
            if hit < opts.flaky_failures {
                respond(&mut stream, "503 Service Unavailable", "", "busy");
            } else {
                respond(&mut stream, "200 OK", "", "ok");
            }
        }
        ("GET", p) if p.starts_with("/admin") => {
            respond(&mut stream, "403 Forbidden", "", r#"{"error":"admin_scope"}"#);
        }
        _ => respond(&mut stream, "404 Not Found", "", ""),
    }
}

fn respond(stream: &mut TcpStream, status: &str, extra_headers: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
        status,
        body.len(),
        extra_headers,
        body
    );
    let _ = stream.write_all(response.as_bytes());
}

/// Returns (method, path, cookies from the `Cookie` header).
fn parse_request(request: &str) -> (String, String, Vec<(String, String)>) {
    let mut method = String::new();
    let mut path = String::new();
    let mut cookies = Vec::new();
    for line in request.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if method.is_empty() {
            let mut parts = line.split_whitespace();
            method = parts.next().unwrap_or("").to_string();
            path = parts.next().unwrap_or("").to_string();
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("cookie") {
                for pair in value.split(';') {
                    if let Some((k, v)) = pair.trim().split_once('=') {
                        cookies.push((k.to_string(), v.to_string()));
                    }
                }
            }
        }
    }
    (method, path, cookies)
}
