//! Webhook receiver: accepts alert POSTs and keeps each one as a JSON file.
//!
//! Plain `TcpListener` server, one request per connection. Intended for local
//! testing and as a reference endpoint for the webhook channel.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const MAX_HEADER_BYTES: usize = 8192;
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone, Debug)]
pub struct ReceiverConfig {
    pub addr: String,
    pub log_dir: PathBuf,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8000".to_string(),
            log_dir: PathBuf::from("alert_logs"),
        }
    }
}

#[derive(Debug)]
pub struct ReceiverHandle {
    pub addr: SocketAddr,
    received: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ReceiverHandle {
    /// Base URL of the alert endpoint, e.g. `http://127.0.0.1:8000/alert`.
    pub fn alert_url(&self) -> String {
        format!("http://{}/alert", self.addr)
    }

    /// Alerts stored since the server started.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::SeqCst)
    }

    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("alert receiver thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ReceiverServer {
    cfg: ReceiverConfig,
}

impl ReceiverServer {
    pub fn new(cfg: ReceiverConfig) -> Self {
        Self { cfg }
    }

    pub fn spawn(self) -> Result<ReceiverHandle> {
        std::fs::create_dir_all(&self.cfg.log_dir).with_context(|| {
            format!("create alert log dir {}", self.cfg.log_dir.display())
        })?;
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .with_context(|| format!("invalid receiver address '{}'", self.cfg.addr))?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let received = Arc::new(AtomicU64::new(0));
        let shutdown_thread = shutdown.clone();
        let received_thread = received.clone();
        let log_dir = self.cfg.log_dir.clone();
        let join = std::thread::Builder::new()
            .name("alert-receiver".to_string())
            .spawn(move || {
                if let Err(err) = run_receiver(listener, &log_dir, &received_thread, &shutdown_thread)
                {
                    log::error!("alert receiver stopped: {}", err);
                }
            })?;

        log::info!("alert receiver listening on {}", addr);
        Ok(ReceiverHandle {
            addr,
            received,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_receiver(
    listener: TcpListener,
    log_dir: &Path,
    received: &AtomicU64,
    shutdown: &AtomicBool,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => match handle_connection(stream, log_dir) {
                Ok(true) => {
                    received.fetch_add(1, Ordering::SeqCst);
                }
                Ok(false) => {}
                Err(err) => log::warn!("alert receiver: request from {} failed: {}", peer, err),
            },
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Returns `Ok(true)` when an alert was stored.
fn handle_connection(mut stream: TcpStream, log_dir: &Path) -> Result<bool> {
    stream.set_nonblocking(false)?;
    let request = read_request(&mut stream)?;
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => {
            write_json_response(&mut stream, 200, r#"{"status":"ok"}"#)?;
            Ok(false)
        }
        ("POST", "/alert") => {
            let body: serde_json::Value = match serde_json::from_slice(&request.body) {
                Ok(body) => body,
                Err(err) => {
                    log::warn!("alert receiver: malformed alert body: {}", err);
                    write_json_response(&mut stream, 400, r#"{"error":"invalid_json"}"#)?;
                    return Ok(false);
                }
            };
            match store_alert(log_dir, &body) {
                Ok(path) => {
                    log::info!(
                        "alert received ({}):\n{}",
                        path.display(),
                        serde_json::to_string_pretty(&body)?
                    );
                    write_json_response(
                        &mut stream,
                        200,
                        r#"{"status":"ok","message":"alert received"}"#,
                    )?;
                    Ok(true)
                }
                Err(err) => {
                    write_json_response(&mut stream, 500, r#"{"error":"storage_failed"}"#)?;
                    Err(err)
                }
            }
        }
        (_, "/health") | (_, "/alert") => {
            write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)?;
            Ok(false)
        }
        _ => {
            write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#)?;
            Ok(false)
        }
    }
}

/// Write `body` as `alert_<YYYYmmdd_HHMMSS_micros>.json`, never overwriting.
pub fn store_alert(log_dir: &Path, body: &serde_json::Value) -> Result<PathBuf> {
    let stem = format!("alert_{}", Utc::now().format("%Y%m%d_%H%M%S_%6f"));
    let mut path = log_dir.join(format!("{stem}.json"));
    let mut n = 1;
    while path.exists() {
        path = log_dir.join(format!("{stem}_{n}.json"));
        n += 1;
    }
    let pretty = serde_json::to_string_pretty(body)?;
    std::fs::write(&path, pretty).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    let header_end = loop {
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request headers too large"));
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before end of headers"));
        }
        data.extend_from_slice(&buf[..n]);
    };

    let head = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| anyhow!("invalid content-length '{}'", value))?,
        None => 0,
    };
    if content_length > MAX_BODY_BYTES {
        return Err(anyhow!("request body too large"));
    }
    let mut body = data[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before end of body"));
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        body,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body.as_bytes())?;
    stream.flush()?;
    Ok(())
}
