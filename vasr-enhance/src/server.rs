//! Line-JSON request server
//!
//! One request per TCP connection: read a line, dispatch, write one response
//! line, close. Each connection runs as its own task and the blocking
//! enhancement work runs on the blocking pool, so a slow or failing request
//! never stalls the accept loop or other connections.
//!
//! An optional admission gate bounds how many requests dispatch at once.
//! Requests over the limit wait for a permit; nothing else changes.

use crate::external::{copy_file, FallbackLadder};
use crate::pipeline::ChannelDispatcher;
use std::future::Future;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream as StdTcpStream};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader as AsyncBufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use vasr_common::protocol::{
    ServerRequest, ServerResponse, RC_COPY_FAILED, RC_DISABLED, RC_INTERNAL, RC_INVALID_REQUEST,
};

/// Longest request line accepted, newline included
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// What the server does with a valid request
pub enum Backend {
    /// Segmented pipeline against the in-process model handle
    Model(ChannelDispatcher),
    /// External command-line tool behind the fallback ladder
    Cli(FallbackLadder),
    /// Reject every request
    Disabled,
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Model(_) => "model",
            Backend::Cli(_) => "cli",
            Backend::Disabled => "disabled",
        }
    }
}

/// Read-only state shared by every connection
pub struct ServerContext {
    pub backend: Backend,
    pub always_copy: bool,
}

impl ServerContext {
    pub fn new(backend: Backend, always_copy: bool) -> Self {
        Self { backend, always_copy }
    }

    /// Parse one request line and produce its response
    pub fn respond(&self, line: &str) -> ServerResponse {
        match serde_json::from_str::<ServerRequest>(line.trim()) {
            Ok(request) => self.dispatch(&request),
            Err(e) => {
                warn!(error = %e, "Malformed request");
                ServerResponse::failure(RC_INTERNAL, e.to_string())
            }
        }
    }

    /// Handle a parsed request (blocking)
    pub fn dispatch(&self, request: &ServerRequest) -> ServerResponse {
        let Some((input, output)) = request.paths() else {
            return ServerResponse::failure(RC_INVALID_REQUEST, "invalid request");
        };
        let (input, output) = (Path::new(input), Path::new(output));

        if self.always_copy {
            return match copy_file(input, output) {
                Ok(()) => {
                    info!(input = %input.display(), output = %output.display(), "always-copy: copied");
                    ServerResponse::success("copied")
                }
                Err(e) => ServerResponse::failure(RC_COPY_FAILED, e.to_string()),
            };
        }

        info!(input = %input.display(), output = %output.display(), backend = self.backend.name(), "Processing request");
        match &self.backend {
            Backend::Disabled => ServerResponse::failure(RC_DISABLED, "enhancement disabled"),
            Backend::Model(dispatcher) => match dispatcher.enhance_file(input, output) {
                Ok(report) => ServerResponse::success(report.to_string()),
                Err(e) => {
                    if e.is_resource_exhausted() {
                        error!(input = %input.display(), error = %e, "Device memory exhausted");
                    } else {
                        warn!(input = %input.display(), error = %e, "Enhancement failed");
                    }
                    e.into()
                }
            },
            Backend::Cli(ladder) => ladder.run(input, output),
        }
    }
}

/// TCP request server
pub struct RequestServer {
    listener: TcpListener,
    context: Arc<ServerContext>,
    gate: Option<Arc<Semaphore>>,
}

impl RequestServer {
    /// Bind the listening socket
    ///
    /// `max_concurrent` of `None` or `0` leaves admission unbounded.
    pub async fn bind(
        addr: impl ToSocketAddrs,
        context: ServerContext,
        max_concurrent: Option<usize>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let gate = max_concurrent
            .filter(|n| *n > 0)
            .map(|n| Arc::new(Semaphore::new(n)));
        Ok(Self {
            listener,
            context: Arc::new(context),
            gate,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until the process ends
    pub async fn run(self) -> io::Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` completes
    ///
    /// In-flight connections keep running on their own tasks after the accept
    /// loop stops.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> io::Result<()> {
        let addr = self.local_addr()?;
        info!(
            %addr,
            backend = self.context.backend.name(),
            always_copy = self.context.always_copy,
            "Listening"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let context = Arc::clone(&self.context);
                        let gate = self.gate.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, context, gate).await {
                                debug!(%peer, error = %e, "Connection ended with error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
                _ = &mut shutdown => {
                    info!("Request server stopping");
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    context: Arc<ServerContext>,
    gate: Option<Arc<Semaphore>>,
) -> io::Result<()> {
    let peer = stream.peer_addr()?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = AsyncBufReader::new(reader);

    let mut bytes = Vec::new();
    let read = (&mut reader)
        .take(MAX_REQUEST_BYTES as u64 + 1)
        .read_until(b'\n', &mut bytes)
        .await?;
    if read == 0 {
        debug!(%peer, "Connection closed without a request");
        return Ok(());
    }

    let response = if bytes.len() > MAX_REQUEST_BYTES {
        warn!(%peer, limit = MAX_REQUEST_BYTES, "Request line too long");
        ServerResponse::failure(RC_INVALID_REQUEST, "request too large")
    } else {
        match String::from_utf8(bytes) {
            Ok(line) => dispatch_line(line, peer, context, gate).await?,
            Err(e) => {
                warn!(%peer, error = %e, "Request is not valid UTF-8");
                ServerResponse::failure(RC_INTERNAL, format!("internal error: {}", e))
            }
        }
    };
    debug!(%peer, rc = response.rc, "Responding");

    let mut payload = serde_json::to_string(&response).map_err(io::Error::other)?;
    payload.push('\n');
    writer.write_all(payload.as_bytes()).await?;
    writer.flush().await?;
    writer.shutdown().await
}

async fn dispatch_line(
    line: String,
    peer: SocketAddr,
    context: Arc<ServerContext>,
    gate: Option<Arc<Semaphore>>,
) -> io::Result<ServerResponse> {
    let _permit = match gate {
        Some(gate) => Some(gate.acquire_owned().await.map_err(io::Error::other)?),
        None => None,
    };

    Ok(tokio::task::spawn_blocking(move || context.respond(&line))
        .await
        .unwrap_or_else(|e| {
            error!(%peer, error = %e, "Request handler panicked");
            ServerResponse::failure(RC_INTERNAL, format!("internal error: {}", e))
        }))
}

/// Blocking client for the request server
pub struct ServerClient {
    addr: String,
    timeout: Option<Duration>,
}

impl ServerClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: None,
        }
    }

    /// Bound how long to wait for the response; enhancement can take minutes
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Send one request and read its response
    pub fn send(&self, request: &ServerRequest) -> anyhow::Result<ServerResponse> {
        let mut stream = StdTcpStream::connect(&self.addr)?;
        stream.set_read_timeout(self.timeout)?;

        let json = serde_json::to_string(request)?;
        writeln!(stream, "{}", json)?;
        stream.flush()?;

        let mut reader = BufReader::new(&stream);
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let response: ServerResponse = serde_json::from_str(&line)?;

        Ok(response)
    }
}
