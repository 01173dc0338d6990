use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::ConfigModel;
use crate::handler::{self, PeerInfo};
use crate::http::parser::{Advance, BodyPlan, ParseError, RequestParser};
use crate::http::request::{Method, Request, Version};
use crate::http::response::{Response, StatusCode};
use crate::http::writer::{serialize_response, ResponseWriter, CONTINUE_LINE};
use crate::router;

/// How long a connection may sit idle before its headers are complete.
/// Firing produces a synthesized `408 Request Timeout` and a close.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

const READ_CHUNK: usize = 4096;

/// Handles a single client connection: requests are read incrementally,
/// dispatched, and answered strictly in arrival order, cycling until the
/// peer leaves or a close-worthy condition arises.
///
/// # State machine
///
/// ```text
///        ┌──────────────┐
///        │   Reading    │ ← incremental parse of line/headers/body
///        └──────┬───────┘
///               │ request complete
///               ▼
///        ┌──────────────┐
///        │ Dispatching  │ ← route to virtual server, run handler
///        └──────┬───────┘
///               │ response ready
///               ▼
///        ┌──────────────┐
///        │   Writing    │ ← drain serialized bytes
///        └──────┬───────┘
///               │
///               ├─ keep-alive → Reading (same connection)
///               └─ close → drop
/// ```
///
/// All per-request parser state resets on the way back to Reading, so a
/// chunked request never leaks framing flags into its successor.
pub struct Connection {
    stream: TcpStream,
    peer: PeerInfo,
    config: Arc<ConfigModel>,
    in_buf: BytesMut,
    parser: RequestParser,
    last_activity: Instant,
    should_close: bool,
    continue_sent: bool,
}

enum ReadOutcome {
    Request(Request),
    Failed(ParseError),
    TimedOut,
    Closed,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: PeerInfo, config: Arc<ConfigModel>) -> Self {
        Self {
            stream,
            peer,
            config,
            in_buf: BytesMut::with_capacity(READ_CHUNK),
            parser: RequestParser::new(),
            last_activity: Instant::now(),
            should_close: false,
            continue_sent: false,
        }
    }

    /// Serves requests until the connection closes.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match self.read_request().await? {
                ReadOutcome::Closed => {
                    tracing::debug!("client closed connection");
                    return Ok(());
                }
                ReadOutcome::TimedOut => {
                    tracing::debug!("idle timeout before headers completed");
                    self.write_error(StatusCode::RequestTimeout).await?;
                    return Ok(());
                }
                ReadOutcome::Failed(e) => {
                    tracing::debug!(error = e.detail(), "request rejected");
                    self.write_error(e.status()).await?;
                    return Ok(());
                }
                ReadOutcome::Request(req) => {
                    let started = Instant::now();
                    tracing::info!(
                        method = req.method.as_str(),
                        path = %req.path,
                        "received HTTP request"
                    );

                    let response = self.dispatch(&req).await;
                    let status = response.status.as_u16();

                    self.should_close = !req.keep_alive();
                    self.write_response(response, req.version, req.method == Method::HEAD)
                        .await?;

                    tracing::info!(
                        method = req.method.as_str(),
                        path = %req.path,
                        status,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "HTTP request completed"
                    );

                    if self.should_close {
                        return Ok(());
                    }
                    self.parser.reset();
                    self.continue_sent = false;
                }
            }
        }
    }

    /// Drives the parser over the inbound buffer, reading more bytes
    /// whenever it suspends. The idle timeout only covers the phase up to
    /// the end of headers; body reads wait as long as the peer keeps the
    /// connection open.
    async fn read_request(&mut self) -> anyhow::Result<ReadOutcome> {
        loop {
            match self.parser.advance(&mut self.in_buf) {
                Err(e) => return Ok(ReadOutcome::Failed(e)),
                Ok(Advance::Done(req)) => return Ok(ReadOutcome::Request(req)),
                Ok(Advance::HeadersDone) => {
                    if let Err(e) = self.on_headers_done().await {
                        return Ok(ReadOutcome::Failed(e));
                    }
                }
                Ok(Advance::NeedMore) => {
                    let mut chunk = [0u8; READ_CHUNK];
                    let n = if self.parser.headers_done() {
                        self.stream.read(&mut chunk).await?
                    } else {
                        let budget = IDLE_TIMEOUT.saturating_sub(self.last_activity.elapsed());
                        match timeout(budget, self.stream.read(&mut chunk)).await {
                            Err(_) => return Ok(ReadOutcome::TimedOut),
                            Ok(result) => result?,
                        }
                    };
                    if n == 0 {
                        return Ok(ReadOutcome::Closed);
                    }
                    self.last_activity = Instant::now();
                    self.in_buf.extend_from_slice(&chunk[..n]);
                }
            }
        }
    }

    /// Headers just completed: pick the virtual server, install its body
    /// budget, choose the body framing, and answer `Expect: 100-continue`
    /// once the size check has passed.
    async fn on_headers_done(&mut self) -> Result<(), ParseError> {
        let local = self.peer.local;
        let host = self.parser.header("host").map(|h| h.to_string());
        let ctx = router::resolve(&self.config, local, host.as_deref(), self.parser.path());
        self.parser.set_body_limit(ctx.client_max_body_size());

        let expects_continue = self
            .parser
            .header("expect")
            .map(|v| v.to_ascii_lowercase().contains("100-continue"))
            .unwrap_or(false);

        let plan = self.parser.decide_body()?;

        if expects_continue && plan != BodyPlan::None && !self.continue_sent {
            self.continue_sent = true;
            self.stream
                .write_all(CONTINUE_LINE)
                .await
                .map_err(|_| ParseError::BadRequest("peer went away"))?;
        }
        Ok(())
    }

    async fn dispatch(&self, req: &Request) -> Response {
        let ctx = router::resolve(&self.config, self.peer.local, req.header("host"), &req.path);
        handler::handle(req, &ctx, self.peer).await
    }

    async fn write_response(
        &mut self,
        mut response: Response,
        version: Version,
        head_like: bool,
    ) -> anyhow::Result<()> {
        response
            .headers
            .entry("Connection".to_string())
            .or_insert_with(|| {
                if self.should_close {
                    "close".to_string()
                } else {
                    "keep-alive".to_string()
                }
            });

        let bytes = serialize_response(&response, version, head_like);
        ResponseWriter::new(bytes)
            .write_to_stream(&mut self.stream)
            .await
    }

    /// Synthesizes an error response for a request that never made it to
    /// dispatch. These always close the connection; the error page of the
    /// best-guess virtual server still applies.
    async fn write_error(&mut self, status: StatusCode) -> anyhow::Result<()> {
        self.should_close = true;
        let host = self.parser.header("host").map(|h| h.to_string());
        let ctx = router::resolve(&self.config, self.peer.local, host.as_deref(), self.parser.path());
        let response = handler::error_response(&ctx, status).await;
        let version = self.parser.version();
        self.write_response(response, version, false).await
    }
}
