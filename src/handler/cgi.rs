//! CGI execution.
//!
//! The interpreter is spawned per request with the CGI/1.1 environment,
//! the request body piped to its stdin, and its stdout read to EOF. The
//! child's output must be a CGI response (headers, blank line, body); a
//! `Status:` header selects the HTTP status. The whole exchange runs
//! under a wall-clock timeout; an expired child is killed and the client
//! gets 504.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use super::{error_response, PeerInfo};
use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::router::RequestContext;

/// Wall-clock budget for one CGI execution.
pub const CGI_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn handle(
    req: &Request,
    ctx: &RequestContext<'_>,
    interpreter: &str,
    peer: PeerInfo,
) -> Response {
    let script = match ctx.resolve_path(&req.path) {
        Some(script) => script,
        None => return error_response(ctx, StatusCode::Forbidden).await,
    };

    match tokio::fs::metadata(&script).await {
        Ok(meta) if meta.is_file() => {}
        _ => return error_response(ctx, StatusCode::NotFound).await,
    }

    let script_dir = script
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| Path::new(".").to_path_buf());

    let mut command = Command::new(interpreter);
    command
        .arg(&script)
        .current_dir(&script_dir)
        .env_clear()
        .envs(build_env(req, ctx, &script, peer))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        // Dropping the child on timeout must not leave the interpreter behind.
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::error!(interpreter, script = %script.display(), error = %e, "CGI spawn failed");
            return error_response(ctx, StatusCode::InternalServerError).await;
        }
    };

    let body = req.body.clone();
    let exchange = async move {
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&body).await?;
            // Closing stdin signals EOF to the script.
            drop(stdin);
        }
        child.wait_with_output().await
    };

    let output = match timeout(CGI_TIMEOUT, exchange).await {
        Err(_) => {
            tracing::warn!(script = %script.display(), "CGI timed out");
            return error_response(ctx, StatusCode::GatewayTimeout).await;
        }
        Ok(Err(e)) => {
            tracing::error!(script = %script.display(), error = %e, "CGI I/O failed");
            return error_response(ctx, StatusCode::InternalServerError).await;
        }
        Ok(Ok(output)) => output,
    };

    if !output.status.success() {
        tracing::warn!(script = %script.display(), status = ?output.status.code(), "CGI exited nonzero");
        return error_response(ctx, StatusCode::InternalServerError).await;
    }

    match parse_cgi_output(&output.stdout) {
        Some(response) => response,
        None => {
            tracing::warn!(script = %script.display(), "CGI produced invalid framing");
            error_response(ctx, StatusCode::InternalServerError).await
        }
    }
}

fn build_env(
    req: &Request,
    ctx: &RequestContext<'_>,
    script: &Path,
    peer: PeerInfo,
) -> Vec<(String, String)> {
    let server_name = ctx
        .server
        .names
        .first()
        .cloned()
        .or_else(|| {
            req.header("host")
                .map(|h| h.split(':').next().unwrap_or(h).to_string())
        })
        .unwrap_or_default();

    let mut env = vec![
        ("REQUEST_METHOD".to_string(), req.method.as_str().to_string()),
        ("QUERY_STRING".to_string(), req.raw_query.clone()),
        ("PATH_INFO".to_string(), req.path.clone()),
        ("SCRIPT_NAME".to_string(), req.path.clone()),
        (
            "SCRIPT_FILENAME".to_string(),
            script.to_string_lossy().into_owned(),
        ),
        (
            "SERVER_PROTOCOL".to_string(),
            req.version.as_str().to_string(),
        ),
        ("SERVER_NAME".to_string(), server_name),
        ("SERVER_PORT".to_string(), peer.local.port().to_string()),
        ("REMOTE_ADDR".to_string(), peer.remote.ip().to_string()),
        ("DOCUMENT_ROOT".to_string(), ctx.root().to_string()),
        ("GATEWAY_INTERFACE".to_string(), "CGI/1.1".to_string()),
        // Required by php-cgi before it will execute anything.
        ("REDIRECT_STATUS".to_string(), "200".to_string()),
    ];

    if let Some(ct) = req.header("content-type") {
        env.push(("CONTENT_TYPE".to_string(), ct.to_string()));
    }
    env.push(("CONTENT_LENGTH".to_string(), req.body.len().to_string()));

    // Interpreters resolve their own tooling through PATH.
    if let Ok(path) = std::env::var("PATH") {
        env.push(("PATH".to_string(), path));
    }

    for (name, value) in &req.headers {
        let mut key = String::with_capacity(5 + name.len());
        key.push_str("HTTP_");
        for c in name.chars() {
            key.push(match c {
                '-' => '_',
                c => c.to_ascii_uppercase(),
            });
        }
        env.push((key, value.clone()));
    }

    env
}

/// Frames the child's stdout into an HTTP response. The output must hold
/// a header block, a blank line, and the body; `Status:` picks the HTTP
/// status and is not forwarded as a header.
fn parse_cgi_output(stdout: &[u8]) -> Option<Response> {
    let (head, body) = split_output(stdout)?;
    let head = std::str::from_utf8(head).ok()?;

    let mut status = StatusCode::Ok;
    let mut builder = ResponseBuilder::new(StatusCode::Ok);
    let mut saw_content_type = false;

    for line in head.split("\r\n").flat_map(|l| l.split('\n')) {
        if line.is_empty() {
            continue;
        }
        let colon = line.find(':')?;
        let name = line[..colon].trim();
        let value = line[colon + 1..].trim();

        if name.eq_ignore_ascii_case("status") {
            let code: u16 = value.split(' ').next()?.parse().ok()?;
            status = StatusCode::from_u16(code)?;
        } else {
            if name.eq_ignore_ascii_case("content-type") {
                saw_content_type = true;
            }
            builder = builder.header(name, value);
        }
    }

    if !saw_content_type {
        builder = builder.header("Content-Type", "text/html");
    }

    let mut response = builder.body(body.to_vec()).build();
    response.status = status;
    response
        .headers
        .insert("Content-Length".to_string(), body.len().to_string());
    Some(response)
}

/// Splits CGI output at the first blank line, accepting both CRLF and
/// bare-LF conventions (scripts commonly emit plain `\n`).
fn split_output(stdout: &[u8]) -> Option<(&[u8], &[u8])> {
    if let Some(pos) = stdout.windows(4).position(|w| w == b"\r\n\r\n") {
        return Some((&stdout[..pos], &stdout[pos + 4..]));
    }
    if let Some(pos) = stdout.windows(2).position(|w| w == b"\n\n") {
        return Some((&stdout[..pos], &stdout[pos + 2..]));
    }
    None
}
