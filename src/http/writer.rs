use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::http::request::Version;
use crate::http::response::Response;

/// The interim response for `Expect: 100-continue`, sent at most once per
/// request, before any body byte is consumed.
pub const CONTINUE_LINE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Serialize a response for the wire.
///
/// The status line mirrors the version the client spoke. `head_like`
/// suppresses the body while keeping Content-Length and the other headers
/// intact, which is what HEAD requires.
pub fn serialize_response(resp: &Response, version: Version, head_like: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256 + resp.body.len());

    let status_line = format!(
        "{} {} {}\r\n",
        version.as_str(),
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    for (k, v) in &resp.headers {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    buf.extend_from_slice(b"\r\n");

    if !head_like {
        buf.extend_from_slice(&resp.body);
    }

    buf
}

/// Drains a pre-serialized response into a stream, tracking partial writes.
pub struct ResponseWriter {
    buffer: Vec<u8>,
    written: usize,
}

impl ResponseWriter {
    pub fn new(buffer: Vec<u8>) -> Self {
        Self { buffer, written: 0 }
    }

    pub async fn write_to_stream(&mut self, stream: &mut TcpStream) -> anyhow::Result<()> {
        while self.written < self.buffer.len() {
            let n = stream.write(&self.buffer[self.written..]).await?;

            if n == 0 {
                return Err(anyhow::anyhow!("connection closed while writing"));
            }

            self.written += n;
        }
        stream.flush().await?;

        Ok(())
    }
}
