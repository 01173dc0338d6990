use bytes::BytesMut;

use portico::http::parser::{
    parse_query, percent_decode, Advance, BodyPlan, ParseError, RequestParser, MAX_HEADERS_COUNT,
    MAX_START_LINE,
};
use portico::http::request::{Method, Request, Version};

/// Drives a parser over a complete byte buffer, using the default body
/// limit, until a request or an error falls out.
fn parse_all(raw: &[u8]) -> Result<Request, ParseError> {
    parse_with_limit(raw, None)
}

fn parse_with_limit(raw: &[u8], limit: Option<usize>) -> Result<Request, ParseError> {
    let mut parser = RequestParser::new();
    let mut buf = BytesMut::from(raw);
    loop {
        match parser.advance(&mut buf)? {
            Advance::HeadersDone => {
                if let Some(limit) = limit {
                    parser.set_body_limit(limit);
                }
                parser.decide_body()?;
            }
            Advance::Done(req) => return Ok(req),
            Advance::NeedMore => panic!("test input is not a complete request"),
        }
    }
}

#[test]
fn test_parse_simple_get_request() {
    let req = parse_all(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();

    assert_eq!(req.method, Method::GET);
    assert_eq!(req.path, "/");
    assert_eq!(req.version, Version::Http11);
    assert_eq!(req.header("host").unwrap(), "example.com");
    assert!(req.body.is_empty());
}

#[test]
fn test_parse_post_request_with_body() {
    let req =
        parse_all(b"POST /api HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhello").unwrap();

    assert_eq!(req.method, Method::POST);
    assert_eq!(req.path, "/api");
    assert_eq!(req.body, b"hello".to_vec());
}

#[test]
fn test_parse_header_names_lowercased_values_trimmed() {
    let req = parse_all(b"GET / HTTP/1.1\r\nHost: x\r\nX-Custom-Header:   spaced   \r\n\r\n")
        .unwrap();

    assert_eq!(req.header("x-custom-header").unwrap(), "spaced");
    assert!(req.headers.contains_key("host"));
}

#[test]
fn test_parse_duplicate_header_last_value_wins() {
    let req = parse_all(b"GET / HTTP/1.1\r\nHost: x\r\nX-Tag: first\r\nX-Tag: second\r\n\r\n")
        .unwrap();

    assert_eq!(req.header("x-tag").unwrap(), "second");
}

#[test]
fn test_parse_query_string_split_and_decoded() {
    let req = parse_all(b"GET /search?q=rust%20lang&page=2&flag HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();

    assert_eq!(req.path, "/search");
    assert_eq!(req.raw_query, "q=rust%20lang&page=2&flag");
    assert_eq!(req.query_param("q").unwrap(), "rust lang");
    assert_eq!(req.query_param("page").unwrap(), "2");
    assert_eq!(req.query_param("flag").unwrap(), "");
}

#[test]
fn test_parse_percent_decoded_path() {
    let req = parse_all(b"GET /a%20dir/file%2Etxt HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();

    assert_eq!(req.path, "/a dir/file.txt");
}

#[test]
fn test_parse_malformed_percent_encoding_rejected() {
    let result = parse_all(b"GET /bad%zz HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(matches!(result, Err(ParseError::BadRequest(_))));

    let result = parse_all(b"GET /truncated%2 HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(matches!(result, Err(ParseError::BadRequest(_))));
}

#[test]
fn test_parse_incremental_byte_at_a_time() {
    let raw = b"POST /up HTTP/1.1\r\nHost: x\r\nContent-Length: 4\r\n\r\nwxyz";
    let mut parser = RequestParser::new();
    let mut buf = BytesMut::new();
    let mut result = None;

    for &byte in raw.iter() {
        buf.extend_from_slice(&[byte]);
        loop {
            match parser.advance(&mut buf).unwrap() {
                Advance::NeedMore => break,
                Advance::HeadersDone => {
                    parser.decide_body().unwrap();
                }
                Advance::Done(req) => {
                    result = Some(req);
                    break;
                }
            }
        }
    }

    let req = result.expect("request should complete on the last byte");
    assert_eq!(req.method, Method::POST);
    assert_eq!(req.body, b"wxyz".to_vec());
}

#[test]
fn test_parse_pipelined_second_request_left_in_buffer() {
    let raw = b"GET /one HTTP/1.1\r\nHost: x\r\n\r\nGET /two HTTP/1.1\r\nHost: x\r\n\r\n";
    let mut parser = RequestParser::new();
    let mut buf = BytesMut::from(&raw[..]);

    let first = loop {
        match parser.advance(&mut buf).unwrap() {
            Advance::HeadersDone => {
                parser.decide_body().unwrap();
            }
            Advance::Done(req) => break req,
            Advance::NeedMore => panic!("first request should be complete"),
        }
    };
    assert_eq!(first.path, "/one");

    parser.reset();
    let second = loop {
        match parser.advance(&mut buf).unwrap() {
            Advance::HeadersDone => {
                parser.decide_body().unwrap();
            }
            Advance::Done(req) => break req,
            Advance::NeedMore => panic!("second request should be complete"),
        }
    };
    assert_eq!(second.path, "/two");
    assert!(buf.is_empty());
}

#[test]
fn test_parse_chunked_body_reassembled() {
    let raw = b"POST /up HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n\
                5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
    let req = parse_all(raw).unwrap();

    assert_eq!(req.body, b"hello world".to_vec());
}

#[test]
fn test_parse_chunked_extension_ignored() {
    let raw = b"POST /up HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n\
                5;name=value\r\nhello\r\n0\r\n\r\n";
    let req = parse_all(raw).unwrap();

    assert_eq!(req.body, b"hello".to_vec());
}

#[test]
fn test_parse_chunked_with_trailers_accepted() {
    let raw = b"POST /up HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n\
                3\r\nabc\r\n0\r\nX-Trailer: ignored\r\n\r\n";
    let req = parse_all(raw).unwrap();

    assert_eq!(req.body, b"abc".to_vec());
}

#[test]
fn test_parse_chunked_overrides_content_length() {
    let raw = b"POST /up HTTP/1.1\r\nHost: x\r\nContent-Length: 999\r\n\
                Transfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n";
    let req = parse_all(raw).unwrap();

    assert_eq!(req.body, b"abc".to_vec());
}

#[test]
fn test_parse_invalid_chunk_size_rejected() {
    let raw = b"POST /up HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\nxyz\r\n";
    let result = parse_all(raw);

    assert!(matches!(result, Err(ParseError::BadRequest(_))));
}

#[test]
fn test_parse_missing_crlf_after_chunk_data_rejected() {
    let raw = b"POST /up HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n\
                3\r\nabcXX0\r\n\r\n";
    let result = parse_all(raw);

    assert!(matches!(result, Err(ParseError::BadRequest(_))));
}

#[test]
fn test_parse_content_length_over_limit_rejected_before_body() {
    let mut raw = b"POST /up HTTP/1.1\r\nHost: x\r\nContent-Length: 2048\r\n\r\n".to_vec();
    // Body bytes are present but must never be consumed.
    raw.extend_from_slice(&[b'a'; 2048]);

    let result = parse_with_limit(&raw, Some(1024));
    assert!(matches!(result, Err(ParseError::PayloadTooLarge)));
}

#[test]
fn test_parse_chunked_body_over_limit_rejected() {
    let mut raw =
        b"POST /up HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
    raw.extend_from_slice(b"400\r\n");
    raw.extend_from_slice(&[b'a'; 0x400]);
    raw.extend_from_slice(b"\r\n400\r\n");
    raw.extend_from_slice(&[b'a'; 0x400]);
    raw.extend_from_slice(b"\r\n0\r\n\r\n");

    let result = parse_with_limit(&raw, Some(1024));
    assert!(matches!(result, Err(ParseError::PayloadTooLarge)));
}

#[test]
fn test_parse_request_line_at_exact_limit_succeeds() {
    // "GET /" + padding + " HTTP/1.1" == MAX_START_LINE bytes
    let padding = MAX_START_LINE - "GET /".len() - " HTTP/1.1".len();
    let mut raw = format!("GET /{} HTTP/1.1\r\n", "a".repeat(padding)).into_bytes();
    raw.extend_from_slice(b"Host: x\r\n\r\n");

    let req = parse_all(&raw).unwrap();
    assert_eq!(req.path.len(), 1 + padding);
}

#[test]
fn test_parse_request_line_one_byte_over_limit_rejected() {
    let padding = MAX_START_LINE - "GET /".len() - " HTTP/1.1".len() + 1;
    let mut raw = format!("GET /{} HTTP/1.1\r\n", "a".repeat(padding)).into_bytes();
    raw.extend_from_slice(b"Host: x\r\n\r\n");

    let result = parse_all(&raw);
    assert!(matches!(result, Err(ParseError::UriTooLong)));
}

#[test]
fn test_parse_header_block_over_limit_rejected() {
    let mut raw = b"GET / HTTP/1.1\r\nHost: x\r\n".to_vec();
    raw.extend_from_slice(format!("X-Big: {}\r\n", "v".repeat(33 * 1024)).as_bytes());
    raw.extend_from_slice(b"\r\n");

    let result = parse_all(&raw);
    assert!(matches!(result, Err(ParseError::HeadersTooLarge)));
}

#[test]
fn test_parse_too_many_headers_rejected() {
    let mut raw = b"GET / HTTP/1.1\r\nHost: x\r\n".to_vec();
    for i in 0..MAX_HEADERS_COUNT {
        raw.extend_from_slice(format!("X-H{}: v\r\n", i).as_bytes());
    }
    raw.extend_from_slice(b"\r\n");

    let result = parse_all(&raw);
    assert!(matches!(result, Err(ParseError::HeadersTooLarge)));
}

#[test]
fn test_parse_unknown_method_not_implemented() {
    for raw in [
        &b"PATCH / HTTP/1.1\r\nHost: x\r\n\r\n"[..],
        &b"PUT / HTTP/1.1\r\nHost: x\r\n\r\n"[..],
        &b"BREW / HTTP/1.1\r\nHost: x\r\n\r\n"[..],
    ] {
        assert!(matches!(parse_all(raw), Err(ParseError::UnknownMethod)));
    }
}

#[test]
fn test_parse_unsupported_version_rejected() {
    let result = parse_all(b"GET / HTTP/2.0\r\nHost: x\r\n\r\n");
    assert!(matches!(result, Err(ParseError::BadRequest(_))));
}

#[test]
fn test_parse_malformed_request_line_rejected() {
    for raw in [
        &b"GET /\r\nHost: x\r\n\r\n"[..],
        &b"GET\r\nHost: x\r\n\r\n"[..],
        &b"GET  / HTTP/1.1\r\nHost: x\r\n\r\n"[..],
    ] {
        assert!(matches!(parse_all(raw), Err(ParseError::BadRequest(_))));
    }
}

#[test]
fn test_parse_bare_lf_is_not_a_line_terminator() {
    let result = parse_all(b"GET / HTTP/1.1\nHost: x\r\n\r\n");
    assert!(matches!(result, Err(ParseError::BadRequest(_))));
}

#[test]
fn test_parse_header_without_colon_rejected() {
    let result = parse_all(b"GET / HTTP/1.1\r\nHost: x\r\nBrokenHeader\r\n\r\n");
    assert!(matches!(result, Err(ParseError::BadRequest(_))));
}

#[test]
fn test_parse_missing_host_on_http11_rejected() {
    let result = parse_all(b"GET / HTTP/1.1\r\n\r\n");
    assert!(matches!(result, Err(ParseError::BadRequest(_))));
}

#[test]
fn test_parse_http10_without_host_accepted() {
    let req = parse_all(b"GET / HTTP/1.0\r\n\r\n").unwrap();
    assert_eq!(req.version, Version::Http10);
}

#[test]
fn test_body_plan_decisions() {
    let mut parser = RequestParser::new();
    let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"[..]);
    assert!(matches!(
        parser.advance(&mut buf).unwrap(),
        Advance::HeadersDone
    ));
    assert_eq!(parser.decide_body().unwrap(), BodyPlan::None);

    let mut parser = RequestParser::new();
    let mut buf = BytesMut::from(&b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 7\r\n\r\n"[..]);
    assert!(matches!(
        parser.advance(&mut buf).unwrap(),
        Advance::HeadersDone
    ));
    assert_eq!(parser.decide_body().unwrap(), BodyPlan::Length(7));

    let mut parser = RequestParser::new();
    let mut buf =
        BytesMut::from(&b"POST / HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n"[..]);
    assert!(matches!(
        parser.advance(&mut buf).unwrap(),
        Advance::HeadersDone
    ));
    assert_eq!(parser.decide_body().unwrap(), BodyPlan::Chunked);
}

#[test]
fn test_keep_alive_defaults_by_version() {
    let req = parse_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    assert!(req.keep_alive());

    let req = parse_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").unwrap();
    assert!(!req.keep_alive());

    let req = parse_all(b"GET / HTTP/1.0\r\n\r\n").unwrap();
    assert!(!req.keep_alive());

    let req = parse_all(b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n").unwrap();
    assert!(req.keep_alive());
}

#[test]
fn test_percent_decode_helpers() {
    assert_eq!(percent_decode("plain").unwrap(), "plain");
    assert_eq!(percent_decode("a%20b").unwrap(), "a b");
    assert_eq!(percent_decode("%41%42").unwrap(), "AB");
    assert!(percent_decode("%4").is_none());
    assert!(percent_decode("%GG").is_none());

    let q = parse_query("a=1&b=%32&c").unwrap();
    assert_eq!(
        q,
        vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
            ("c".to_string(), String::new()),
        ]
    );
    assert!(parse_query("a=%zz").is_none());
}
