//! Shared test doubles: a scriptable runtime stub and a minimal HTTP stub

use crate::core::host::{ScriptHost, ScriptHostError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Scripting runtime stand-in. Responses are served from a queue, then from
/// a configurable default; every evaluated script is recorded.
pub struct StubScriptHost {
    delay: Duration,
    responses: parking_lot::Mutex<VecDeque<Result<String, String>>>,
    default: parking_lot::Mutex<Result<String, String>>,
    calls: parking_lot::Mutex<Vec<String>>,
}

impl StubScriptHost {
    pub fn new() -> Self {
        StubScriptHost {
            delay: Duration::ZERO,
            responses: parking_lot::Mutex::new(VecDeque::new()),
            default: parking_lot::Mutex::new(Ok("true".to_string())),
            calls: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// A runtime that is never reachable.
    pub fn failing(message: &str) -> Self {
        let host = Self::new();
        *host.default.lock() = Err(message.to_string());
        host
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn enqueue_ok(&self, result: &str) {
        self.responses.lock().push_back(Ok(result.to_string()));
    }

    pub fn enqueue_err(&self, message: &str) {
        self.responses.lock().push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ScriptHost for StubScriptHost {
    async fn eval(&self, script: &str) -> Result<String, ScriptHostError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.calls.lock().push(script.to_string());
        let response = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default.lock().clone());
        response.map_err(ScriptHostError::Unreachable)
    }
}

/// Minimal HTTP/1.1 stub: answers every request with the given status and
/// body, counting hits. Good enough for `reqwest` against localhost.
pub async fn spawn_http_stub(
    status: u16,
    body: &'static str,
) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(serve_one(stream, status, body));
        }
    });

    (format!("http://{addr}"), hits)
}

async fn serve_one(mut stream: TcpStream, status: u16, body: &'static str) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    // Read until the end of the headers.
    let header_end = loop {
        let Ok(n) = stream.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    // Drain the body so the client sees a clean exchange.
    let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let content_length = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let Ok(n) = stream.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let reason = match status {
        200 => "OK",
        403 => "Forbidden",
        500 => "Internal Server Error",
        _ => "Status",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
