//! Lexer and block parser for the nginx-like configuration syntax.
//!
//! ```text
//! http {
//!   server {
//!     listen 8080 0.0.0.0;
//!     root /srv/www;
//!     location /upload {
//!       allow_methods POST;
//!       upload_dir /srv/uploads;
//!     }
//!   }
//! }
//! ```
//!
//! Directives end with ';', blocks are brace-delimited, '#' comments run
//! to end of line.

use anyhow::{anyhow, bail, Context};
use std::net::Ipv4Addr;

use super::{parse_size, with_trailing_slash, Endpoint, Location, Redirect, VirtualServer};
use crate::http::request::Method;
use crate::http::response::StatusCode;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    LBrace,
    RBrace,
    Semi,
}

fn lex(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '#' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '{' | '}' | ';' => {
                if !word.is_empty() {
                    tokens.push(Token::Word(std::mem::take(&mut word)));
                }
                tokens.push(match c {
                    '{' => Token::LBrace,
                    '}' => Token::RBrace,
                    _ => Token::Semi,
                });
            }
            c if c.is_whitespace() => {
                if !word.is_empty() {
                    tokens.push(Token::Word(std::mem::take(&mut word)));
                }
            }
            c => word.push(c),
        }
    }
    if !word.is_empty() {
        tokens.push(Token::Word(word));
    }
    tokens
}

struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl Cursor {
    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn expect_word(&mut self, expected: &str) -> anyhow::Result<()> {
        match self.next() {
            Some(Token::Word(w)) if w == expected => Ok(()),
            other => bail!("expected '{}', found {:?}", expected, other),
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> anyhow::Result<()> {
        match self.next() {
            Some(t) if t == token => Ok(()),
            other => bail!("expected {}, found {:?}", what, other),
        }
    }

    /// Collects the word arguments of a directive up to its ';'.
    fn directive_args(&mut self, name: &str) -> anyhow::Result<Vec<String>> {
        let mut args = Vec::new();
        loop {
            match self.next() {
                Some(Token::Word(w)) => args.push(w),
                Some(Token::Semi) => return Ok(args),
                other => bail!("unterminated '{}' directive, found {:?}", name, other),
            }
        }
    }
}

/// Parses configuration text into server blocks. Validation that spans
/// blocks (non-empty listens, root present) happens in `ConfigModel`.
pub fn parse(input: &str) -> anyhow::Result<Vec<VirtualServer>> {
    let mut cursor = Cursor {
        tokens: lex(input),
        pos: 0,
    };

    cursor.expect_word("http")?;
    cursor.expect(Token::LBrace, "'{' after http")?;

    let mut servers = Vec::new();
    loop {
        match cursor.next() {
            Some(Token::Word(w)) if w == "server" => {
                cursor.expect(Token::LBrace, "'{' after server")?;
                servers.push(parse_server(&mut cursor)?);
            }
            Some(Token::RBrace) => break,
            other => bail!("expected 'server' block, found {:?}", other),
        }
    }
    if cursor.peek().is_some() {
        bail!("trailing tokens after closing '}}'");
    }
    Ok(servers)
}

fn parse_server(cursor: &mut Cursor) -> anyhow::Result<VirtualServer> {
    let mut server = VirtualServer::default();
    let mut index_set = false;

    loop {
        match cursor.next() {
            Some(Token::RBrace) => return Ok(server),
            Some(Token::Word(directive)) => match directive.as_str() {
                "listen" => {
                    let args = cursor.directive_args("listen")?;
                    server.listens.push(parse_listen(&args)?);
                }
                "server_name" => {
                    let args = cursor.directive_args("server_name")?;
                    if args.is_empty() {
                        bail!("server_name requires at least one name");
                    }
                    server.names.extend(args);
                }
                "root" => {
                    let args = cursor.directive_args("root")?;
                    server.root = with_trailing_slash(single_arg(&args, "root")?);
                }
                "index" => {
                    let args = cursor.directive_args("index")?;
                    if args.is_empty() {
                        bail!("index requires at least one file name");
                    }
                    if !index_set {
                        server.index_files.clear();
                        index_set = true;
                    }
                    server.index_files.extend(args);
                }
                "client_max_body_size" => {
                    let args = cursor.directive_args("client_max_body_size")?;
                    server.client_max_body_size = parse_body_size(&args)?;
                }
                "autoindex" => {
                    let args = cursor.directive_args("autoindex")?;
                    server.autoindex = parse_on_off(&args)?;
                }
                "error_page" => {
                    let args = cursor.directive_args("error_page")?;
                    add_error_pages(&mut server.error_pages, &args)?;
                }
                "location" => {
                    let prefix = match cursor.next() {
                        Some(Token::Word(w)) => w,
                        other => bail!("location requires a path prefix, found {:?}", other),
                    };
                    cursor.expect(Token::LBrace, "'{' after location prefix")?;
                    server.locations.push(parse_location(cursor, prefix)?);
                }
                other => bail!("unknown directive '{}' in server block", other),
            },
            other => bail!("unexpected token {:?} in server block", other),
        }
    }
}

fn parse_location(cursor: &mut Cursor, path: String) -> anyhow::Result<Location> {
    let mut location = Location {
        path,
        ..Location::default()
    };

    loop {
        match cursor.next() {
            Some(Token::RBrace) => return Ok(location),
            Some(Token::Word(directive)) => match directive.as_str() {
                "root" => {
                    let args = cursor.directive_args("root")?;
                    location.root = Some(with_trailing_slash(single_arg(&args, "root")?));
                }
                "index" => {
                    let args = cursor.directive_args("index")?;
                    if args.is_empty() {
                        bail!("index requires at least one file name");
                    }
                    location.index_files.get_or_insert_with(Vec::new).extend(args);
                }
                "autoindex" => {
                    let args = cursor.directive_args("autoindex")?;
                    location.autoindex = Some(parse_on_off(&args)?);
                }
                "client_max_body_size" => {
                    let args = cursor.directive_args("client_max_body_size")?;
                    location.client_max_body_size = Some(parse_body_size(&args)?);
                }
                "error_page" => {
                    let args = cursor.directive_args("error_page")?;
                    add_error_pages(&mut location.error_pages, &args)?;
                }
                "allow_methods" => {
                    let args = cursor.directive_args("allow_methods")?;
                    if args.is_empty() {
                        bail!("allow_methods requires at least one method");
                    }
                    for m in &args {
                        let method = Method::from_str(m)
                            .ok_or_else(|| anyhow!("unknown method '{}' in allow_methods", m))?;
                        if !location.allowed_methods.contains(&method) {
                            location.allowed_methods.push(method);
                        }
                    }
                }
                "upload_dir" => {
                    let args = cursor.directive_args("upload_dir")?;
                    location.upload_dir =
                        Some(with_trailing_slash(single_arg(&args, "upload_dir")?));
                }
                "cgi_pass" => {
                    let args = cursor.directive_args("cgi_pass")?;
                    if args.len() != 2 {
                        bail!("cgi_pass requires an extension and an interpreter path");
                    }
                    if !args[0].starts_with('.') {
                        bail!("cgi_pass extension must start with '.', got '{}'", args[0]);
                    }
                    location.cgi_map.insert(args[0].clone(), args[1].clone());
                }
                "return" => {
                    let args = cursor.directive_args("return")?;
                    location.redirect = Some(parse_return(&args)?);
                }
                other => bail!("unknown directive '{}' in location block", other),
            },
            other => bail!("unexpected token {:?} in location block", other),
        }
    }
}

fn parse_listen(args: &[String]) -> anyhow::Result<Endpoint> {
    if args.is_empty() || args.len() > 2 {
        bail!("listen requires a port and an optional address");
    }
    let port: u16 = args[0]
        .parse()
        .with_context(|| format!("invalid listen port '{}'", args[0]))?;
    let address: Ipv4Addr = match args.get(1) {
        Some(addr) => addr
            .parse()
            .with_context(|| format!("invalid listen address '{}'", addr))?,
        None => Ipv4Addr::UNSPECIFIED,
    };
    Ok(Endpoint { address, port })
}

fn parse_body_size(args: &[String]) -> anyhow::Result<usize> {
    let raw = single_arg(args, "client_max_body_size")?;
    parse_size(raw).ok_or_else(|| anyhow!("invalid size '{}'", raw))
}

fn parse_on_off(args: &[String]) -> anyhow::Result<bool> {
    match single_arg(args, "autoindex")? {
        "on" => Ok(true),
        "off" => Ok(false),
        other => bail!("autoindex expects 'on' or 'off', got '{}'", other),
    }
}

/// `error_page <code> [<code> ...] <path>;` — every listed code maps to
/// the final path argument. Codes outside 300..=599 are rejected.
fn add_error_pages(
    pages: &mut std::collections::HashMap<u16, String>,
    args: &[String],
) -> anyhow::Result<()> {
    let Some((path, codes)) = args.split_last() else {
        bail!("error_page requires at least one code and a path");
    };
    if codes.is_empty() {
        bail!("error_page requires at least one code and a path");
    }
    for code in codes {
        let code: u16 = code
            .parse()
            .with_context(|| format!("invalid error_page code '{}'", code))?;
        if !(300..=599).contains(&code) {
            bail!("error_page code {} outside 300..=599", code);
        }
        pages.insert(code, path.clone());
    }
    Ok(())
}

fn parse_return(args: &[String]) -> anyhow::Result<Redirect> {
    if args.is_empty() || args.len() > 2 {
        bail!("return requires a status code and an optional target");
    }
    let code: u16 = args[0]
        .parse()
        .with_context(|| format!("invalid return code '{}'", args[0]))?;
    let status = StatusCode::from_u16(code)
        .ok_or_else(|| anyhow!("unsupported status code {} in return", code))?;
    Ok(Redirect {
        status,
        target: args.get(1).cloned(),
    })
}

fn single_arg<'a>(args: &'a [String], directive: &str) -> anyhow::Result<&'a str> {
    match args {
        [one] => Ok(one.as_str()),
        _ => bail!("'{}' requires exactly one argument", directive),
    }
}
