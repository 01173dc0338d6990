use bytes::{Buf, BytesMut};
use std::collections::HashMap;

use crate::http::request::{Method, Request, Version};
use crate::http::response::StatusCode;

/// Longest accepted request line, in bytes (CRLF excluded).
pub const MAX_START_LINE: usize = 8 * 1024;
/// Running cap on the header block: each line counts its length plus CRLF.
pub const MAX_HEADERS_SIZE: usize = 32 * 1024;
/// Cap on the number of header fields.
pub const MAX_HEADERS_COUNT: usize = 100;
/// Body budget applied until the virtual server's own limit is resolved.
pub const DEFAULT_MAX_BODY: usize = 64 * 1024;

/// Errors produced while parsing a request.
///
/// Every variant maps to the status code the connection answers with
/// before closing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Malformed request line, header, chunk framing, or percent-encoding
    BadRequest(&'static str),
    /// Request line longer than `MAX_START_LINE`
    UriTooLong,
    /// Header block over `MAX_HEADERS_SIZE` or more than `MAX_HEADERS_COUNT` fields
    HeadersTooLarge,
    /// Declared or accumulated body size above the effective limit
    PayloadTooLarge,
    /// Method outside the recognized set
    UnknownMethod,
}

impl ParseError {
    pub fn status(&self) -> StatusCode {
        match self {
            ParseError::BadRequest(_) => StatusCode::BadRequest,
            ParseError::UriTooLong => StatusCode::UriTooLong,
            ParseError::HeadersTooLarge => StatusCode::HeaderFieldsTooLarge,
            ParseError::PayloadTooLarge => StatusCode::PayloadTooLarge,
            ParseError::UnknownMethod => StatusCode::NotImplemented,
        }
    }

    pub fn detail(&self) -> &'static str {
        match self {
            ParseError::BadRequest(msg) => msg,
            ParseError::UriTooLong => "request line too long",
            ParseError::HeadersTooLarge => "header block too large",
            ParseError::PayloadTooLarge => "body over configured limit",
            ParseError::UnknownMethod => "method not supported",
        }
    }
}

/// Result of one call to [`RequestParser::advance`].
#[derive(Debug)]
pub enum Advance {
    /// No further progress without more bytes.
    NeedMore,
    /// The header block just completed. The caller must resolve the
    /// virtual server, install the effective body limit with
    /// [`RequestParser::set_body_limit`], and then call
    /// [`RequestParser::decide_body`] before advancing again.
    HeadersDone,
    /// A full request was assembled.
    Done(Request),
}

/// How the body will be framed, decided once headers are complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyPlan {
    /// No body follows; the request is complete.
    None,
    /// Content-Length framing with the given size.
    Length(usize),
    /// Transfer-Encoding: chunked framing.
    Chunked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    RequestLine,
    Headers,
    BodyDecision,
    BodyLength { remaining: usize },
    ChunkSize,
    ChunkData { remaining: usize },
    ChunkTrailerCrlf,
    Trailers,
    Complete,
}

/// Incremental HTTP/1.1 request parser.
///
/// A pure state machine over the connection's inbound buffer: it consumes
/// a well-defined prefix per transition and suspends between arbitrary
/// bytes, so requests may arrive in any fragmentation. It performs no I/O.
///
/// The lifecycle per request is `advance` until [`Advance::HeadersDone`],
/// then `set_body_limit` + `decide_body` (the caller needs the Host header
/// to know which virtual server's body budget applies), then `advance`
/// until [`Advance::Done`], then [`RequestParser::reset`].
pub struct RequestParser {
    state: ParseState,
    method: Option<Method>,
    path: String,
    raw_query: String,
    query: Vec<(String, String)>,
    version: Version,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    headers_size: usize,
    header_count: usize,
    body_limit: usize,
    done_taken: bool,
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::RequestLine,
            method: None,
            path: String::new(),
            raw_query: String::new(),
            query: Vec::new(),
            version: Version::Http11,
            headers: HashMap::new(),
            body: Vec::new(),
            headers_size: 0,
            header_count: 0,
            body_limit: DEFAULT_MAX_BODY,
            done_taken: false,
        }
    }

    /// Clears all per-request state. Called on the transition back to the
    /// request line so nothing (chunked flags included) leaks into the
    /// next request on a keep-alive connection.
    pub fn reset(&mut self) {
        *self = RequestParser::new();
    }

    /// True once the header block of the current request has been
    /// consumed. The idle timeout only applies while this is false.
    pub fn headers_done(&self) -> bool {
        !matches!(self.state, ParseState::RequestLine | ParseState::Headers)
    }

    /// Header lookup by lowercase name, valid once headers are done.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|v| v.as_str())
    }

    /// Decoded request path, valid once the request line is consumed.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Installs the virtual server's `client_max_body_size`.
    pub fn set_body_limit(&mut self, limit: usize) {
        self.body_limit = limit;
    }

    /// Consume as much of `buf` as possible, returning the first event.
    pub fn advance(&mut self, buf: &mut BytesMut) -> Result<Advance, ParseError> {
        loop {
            match self.state {
                ParseState::RequestLine => match self.step_request_line(buf)? {
                    false => return Ok(Advance::NeedMore),
                    true => continue,
                },
                ParseState::Headers => match self.step_header_line(buf)? {
                    HeaderStep::NeedMore => return Ok(Advance::NeedMore),
                    HeaderStep::Field => continue,
                    HeaderStep::EndOfHeaders => {
                        self.state = ParseState::BodyDecision;
                        return Ok(Advance::HeadersDone);
                    }
                },
                ParseState::BodyDecision => {
                    // The caller resolves the body plan explicitly; reaching
                    // advance() in this state means no body was expected.
                    self.decide_body()?;
                    continue;
                }
                ParseState::BodyLength { remaining } => {
                    if buf.is_empty() && remaining > 0 {
                        return Ok(Advance::NeedMore);
                    }
                    let take = remaining.min(buf.len());
                    self.body.extend_from_slice(&buf[..take]);
                    buf.advance(take);
                    let left = remaining - take;
                    if left == 0 {
                        self.state = ParseState::Complete;
                    } else {
                        self.state = ParseState::BodyLength { remaining: left };
                        return Ok(Advance::NeedMore);
                    }
                }
                ParseState::ChunkSize => {
                    let line = match pop_line(buf) {
                        Some(line) => line,
                        None => return Ok(Advance::NeedMore),
                    };
                    let size = parse_chunk_size(&line)?;
                    if size == 0 {
                        self.state = ParseState::Trailers;
                    } else if self.body.len() + size > self.body_limit {
                        return Err(ParseError::PayloadTooLarge);
                    } else {
                        self.state = ParseState::ChunkData { remaining: size };
                    }
                }
                ParseState::ChunkData { remaining } => {
                    if buf.is_empty() {
                        return Ok(Advance::NeedMore);
                    }
                    let take = remaining.min(buf.len());
                    self.body.extend_from_slice(&buf[..take]);
                    buf.advance(take);
                    let left = remaining - take;
                    if left == 0 {
                        self.state = ParseState::ChunkTrailerCrlf;
                    } else {
                        self.state = ParseState::ChunkData { remaining: left };
                        return Ok(Advance::NeedMore);
                    }
                }
                ParseState::ChunkTrailerCrlf => {
                    if buf.len() < 2 {
                        return Ok(Advance::NeedMore);
                    }
                    if &buf[..2] != b"\r\n" {
                        return Err(ParseError::BadRequest("expected CRLF after chunk data"));
                    }
                    buf.advance(2);
                    self.state = ParseState::ChunkSize;
                }
                ParseState::Trailers => {
                    let line = match pop_line(buf) {
                        Some(line) => line,
                        None => return Ok(Advance::NeedMore),
                    };
                    if line.is_empty() {
                        self.state = ParseState::Complete;
                    }
                }
                ParseState::Complete => {
                    if self.done_taken {
                        return Ok(Advance::NeedMore);
                    }
                    self.done_taken = true;
                    return Ok(Advance::Done(self.take_request()));
                }
            }
        }
    }

    /// Chooses the body framing once headers are complete and the body
    /// limit is installed. Declared Content-Length over the limit fails
    /// here, before a single body byte is read.
    pub fn decide_body(&mut self) -> Result<BodyPlan, ParseError> {
        debug_assert_eq!(self.state, ParseState::BodyDecision);

        if header_value_contains(&self.headers, "transfer-encoding", "chunked") {
            self.state = ParseState::ChunkSize;
            return Ok(BodyPlan::Chunked);
        }

        match self.headers.get("content-length") {
            Some(raw) => {
                let cl: usize = raw
                    .trim()
                    .parse()
                    .map_err(|_| ParseError::BadRequest("invalid Content-Length"))?;
                if cl == 0 {
                    self.state = ParseState::Complete;
                    Ok(BodyPlan::None)
                } else if cl > self.body_limit {
                    Err(ParseError::PayloadTooLarge)
                } else {
                    self.state = ParseState::BodyLength { remaining: cl };
                    Ok(BodyPlan::Length(cl))
                }
            }
            None => {
                self.state = ParseState::Complete;
                Ok(BodyPlan::None)
            }
        }
    }

    fn step_request_line(&mut self, buf: &mut BytesMut) -> Result<bool, ParseError> {
        let line = match pop_line_limited(buf, MAX_START_LINE, ParseError::UriTooLong)? {
            Some(line) => line,
            None => return Ok(false),
        };

        let line = printable_str(&line).ok_or(ParseError::BadRequest("invalid request line"))?;

        let sp1 = line.find(' ');
        let sp2 = sp1.and_then(|i| line[i + 1..].find(' ').map(|j| i + 1 + j));
        let (sp1, sp2) = match (sp1, sp2) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(ParseError::BadRequest("invalid request line")),
        };

        let method = &line[..sp1];
        let target = &line[sp1 + 1..sp2];
        let version = &line[sp2 + 1..];
        if method.is_empty() || target.is_empty() || version.is_empty() {
            return Err(ParseError::BadRequest("invalid request line"));
        }

        self.version =
            Version::from_str(version).ok_or(ParseError::BadRequest("unsupported version"))?;
        self.method = Some(Method::from_str(method).ok_or(ParseError::UnknownMethod)?);

        let (raw_path, raw_query) = match target.find('?') {
            Some(q) => (&target[..q], &target[q + 1..]),
            None => (target, ""),
        };
        self.path = percent_decode(raw_path)
            .ok_or(ParseError::BadRequest("invalid percent-encoding in path"))?;
        self.raw_query = raw_query.to_string();
        self.query = parse_query(raw_query)
            .ok_or(ParseError::BadRequest("invalid percent-encoding in query"))?;

        self.state = ParseState::Headers;
        self.headers_size = 0;
        self.header_count = 0;
        Ok(true)
    }

    fn step_header_line(&mut self, buf: &mut BytesMut) -> Result<HeaderStep, ParseError> {
        let line = match pop_line(buf) {
            Some(line) => line,
            None => {
                // Bound the block even while a line is still incomplete.
                if self.headers_size + buf.len() > MAX_HEADERS_SIZE {
                    return Err(ParseError::HeadersTooLarge);
                }
                return Ok(HeaderStep::NeedMore);
            }
        };

        self.headers_size += line.len() + 2;
        if self.headers_size > MAX_HEADERS_SIZE {
            return Err(ParseError::HeadersTooLarge);
        }

        if line.is_empty() {
            if self.version == Version::Http11 && !self.headers.contains_key("host") {
                return Err(ParseError::BadRequest("missing Host header"));
            }
            return Ok(HeaderStep::EndOfHeaders);
        }

        let line = printable_str(&line).ok_or(ParseError::BadRequest("invalid header"))?;
        let colon = line
            .find(':')
            .ok_or(ParseError::BadRequest("invalid header"))?;
        let name = line[..colon].trim().to_ascii_lowercase();
        let value = line[colon + 1..].trim().to_string();
        if name.is_empty() {
            return Err(ParseError::BadRequest("invalid header"));
        }

        // Duplicate names: the last value wins.
        self.headers.insert(name, value);
        self.header_count += 1;
        if self.header_count > MAX_HEADERS_COUNT {
            return Err(ParseError::HeadersTooLarge);
        }
        Ok(HeaderStep::Field)
    }

    fn take_request(&mut self) -> Request {
        Request {
            method: self.method.take().unwrap_or(Method::GET),
            path: std::mem::take(&mut self.path),
            raw_query: std::mem::take(&mut self.raw_query),
            query: std::mem::take(&mut self.query),
            version: self.version,
            headers: std::mem::take(&mut self.headers),
            body: std::mem::take(&mut self.body),
        }
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

enum HeaderStep {
    NeedMore,
    Field,
    EndOfHeaders,
}

/// Pops one exact-CRLF-terminated line. A bare `\n` never terminates a
/// line; it stays in the content and is rejected by the printable check.
fn pop_line(buf: &mut BytesMut) -> Option<Vec<u8>> {
    let pos = find_crlf(buf)?;
    let line = buf.split_to(pos).to_vec();
    buf.advance(2);
    Some(line)
}

fn pop_line_limited(
    buf: &mut BytesMut,
    max: usize,
    err: ParseError,
) -> Result<Option<Vec<u8>>, ParseError> {
    match find_crlf(buf) {
        Some(pos) if pos > max => Err(err),
        Some(pos) => {
            let line = buf.split_to(pos).to_vec();
            buf.advance(2);
            Ok(Some(line))
        }
        None if buf.len() > max => Err(err),
        None => Ok(None),
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// UTF-8 with no control bytes; tabs are the one allowed exception.
fn printable_str(line: &[u8]) -> Option<&str> {
    let s = std::str::from_utf8(line).ok()?;
    if s.bytes().any(|b| (b < 0x20 && b != b'\t') || b == 0x7f) {
        return None;
    }
    Some(s)
}

fn header_value_contains(headers: &HashMap<String, String>, name: &str, needle: &str) -> bool {
    headers
        .get(name)
        .map(|v| v.to_ascii_lowercase().contains(needle))
        .unwrap_or(false)
}

fn parse_chunk_size(line: &[u8]) -> Result<usize, ParseError> {
    let line = std::str::from_utf8(line).map_err(|_| ParseError::BadRequest("invalid chunk size"))?;
    // Chunk extensions after ';' are tolerated and ignored.
    let hex = line.split(';').next().unwrap_or("").trim();
    if hex.is_empty() {
        return Err(ParseError::BadRequest("invalid chunk size"));
    }
    usize::from_str_radix(hex, 16).map_err(|_| ParseError::BadRequest("invalid chunk size"))
}

/// Decodes `%xx` escapes. Returns None on a truncated or non-hex escape.
pub fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = hex_digit(*bytes.get(i + 1)?)?;
            let lo = hex_digit(*bytes.get(i + 2)?)?;
            out.push(hi << 4 | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Splits a raw query string into decoded key/value pairs, preserving
/// order. Pairs with empty keys are skipped; a pair without `=` gets an
/// empty value.
pub fn parse_query(raw: &str) -> Option<Vec<(String, String)>> {
    let mut out = Vec::new();
    if raw.is_empty() {
        return Some(out);
    }
    for pair in raw.split('&') {
        let (k, v) = match pair.find('=') {
            Some(eq) => (&pair[..eq], &pair[eq + 1..]),
            None => (pair, ""),
        };
        let k = percent_decode(k)?;
        let v = percent_decode(v)?;
        if !k.is_empty() {
            out.push((k, v));
        }
    }
    Some(out)
}
