//! Socket transport
//!
//! A minimal HTTP/1.1 listener on the loopback interface that answers every
//! request through [`Router::resolve_socket`]. One request per connection;
//! the response always carries `Connection: close`.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::router::Router;

/// Upper bound on the request head we are willing to buffer
const MAX_HEAD_BYTES: usize = 16 * 1024;

/// A parsed request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub target: String,
}

impl RequestLine {
    /// Parse `GET /path?query HTTP/1.1`
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let method = parts.next()?;
        let target = parts.next()?;
        let version = parts.next()?;
        if !version.starts_with("HTTP/") || parts.next().is_some() {
            return None;
        }
        Some(Self {
            method: method.to_string(),
            target: target.to_string(),
        })
    }
}

/// Guess a `Content-Type` from the path's extension
pub fn content_type(target: &str) -> &'static str {
    let path = target.split(['?', '#']).next().unwrap_or_default();
    let extension = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
    match extension.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "xml" => "application/xml",
        "txt" => "text/plain; charset=utf-8",
        "png" => "image/png",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

fn response_head(status: u16, reason: &str, content_type: &str, length: usize) -> String {
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status, reason, content_type, length
    )
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// A bound, not yet serving, listener
pub struct SocketServer {
    listener: TcpListener,
    addr: SocketAddr,
}

impl SocketServer {
    /// Bind `127.0.0.1` on an ephemeral port
    pub async fn bind() -> Result<Self> {
        Self::bind_addr(SocketAddr::from(([127, 0, 0, 1], 0))).await
    }

    pub async fn bind_addr(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|source| Error::Transport { source })?;
        let addr = listener.local_addr().map_err(|source| Error::Transport { source })?;
        debug!(%addr, "socket transport bound");
        Ok(Self { listener, addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// `http://127.0.0.1:<port>`
    pub fn origin(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Start answering connections with `router`. Serving stops when the
    /// returned handle is dropped.
    pub fn serve(self, router: Arc<Router>) -> ServerHandle {
        let origin = self.origin();
        let addr = self.addr;
        let listener = self.listener;
        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let router = Arc::clone(&router);
                        let origin = origin.clone();
                        tokio::spawn(async move {
                            if let Err(err) = handle_connection(stream, &router, &origin).await {
                                debug!(%peer, error = %err, "connection dropped");
                            }
                        });
                    }
                    Err(err) => warn!(error = %err, "accept failed"),
                }
            }
        });
        ServerHandle { addr, task }
    }
}

/// Running listener; aborts the accept loop on drop
pub struct ServerHandle {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn origin(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Wait until the accept loop ends, which only happens when it is aborted
    pub async fn wait(mut self) {
        let _ = (&mut self.task).await;
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle_connection(stream: TcpStream, router: &Router, origin: &str) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let mut head_bytes = request_line.len();
    loop {
        let mut header = String::new();
        let read = reader.read_line(&mut header).await?;
        head_bytes += read;
        if read == 0 || header == "\r\n" || header == "\n" || head_bytes > MAX_HEAD_BYTES {
            break;
        }
    }

    let mut stream = reader.into_inner();
    let Some(request) = RequestLine::parse(request_line.trim_end()) else {
        stream.write_all(response_head(400, "Bad Request", "text/plain", 0).as_bytes()).await?;
        return stream.shutdown().await;
    };

    let url = format!("{}{}", origin, request.target);
    match router.resolve_socket(&url).await {
        Ok(body) => {
            let head = response_head(200, "OK", content_type(&request.target), body.len());
            stream.write_all(head.as_bytes()).await?;
            if request.method != "HEAD" {
                stream.write_all(&body).await?;
            }
        }
        Err(err) => {
            let message = err.to_string();
            let head = response_head(500, "Internal Server Error", "text/plain; charset=utf-8", message.len());
            stream.write_all(head.as_bytes()).await?;
            if request.method != "HEAD" {
                stream.write_all(message.as_bytes()).await?;
            }
        }
    }
    stream.shutdown().await
}
