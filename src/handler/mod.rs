//! Request handlers.
//!
//! The dispatcher applies the resolved location policy in a fixed order:
//! `return` short-circuit, method gate, CGI extension match, then the
//! per-method code path. Handlers always produce a `Response`; errors are
//! rendered through the configured error pages.

pub mod autoindex;
pub mod cgi;
pub mod delete;
pub mod static_files;
pub mod upload;

use std::net::SocketAddr;

use crate::config::Redirect;
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::router::{resolve_under, RequestContext};

/// Addresses of the connection a request arrived on; CGI exports them.
#[derive(Debug, Clone, Copy)]
pub struct PeerInfo {
    pub remote: SocketAddr,
    pub local: SocketAddr,
}

pub async fn handle(req: &Request, ctx: &RequestContext<'_>, peer: PeerInfo) -> Response {
    if let Some(redirect) = ctx.redirect() {
        return redirect_response(redirect);
    }

    if !ctx.method_allowed(req.method) {
        let mut response = error_response(ctx, StatusCode::MethodNotAllowed).await;
        response
            .headers
            .insert("Allow".to_string(), ctx.allow_header());
        return response;
    }

    if let Some(interpreter) = ctx.cgi_interpreter(&req.path) {
        return cgi::handle(req, ctx, interpreter, peer).await;
    }

    match req.method {
        Method::GET | Method::HEAD => static_files::handle(req, ctx).await,
        Method::POST => upload::handle(req, ctx).await,
        Method::DELETE => delete::handle(req, ctx).await,
    }
}

/// Builds an error response, preferring the configured error page for the
/// status (read relative to the resolved root) over the built-in body.
pub async fn error_response(ctx: &RequestContext<'_>, status: StatusCode) -> Response {
    if let Some(page) = ctx.error_page(status.as_u16()) {
        if let Some(path) = resolve_under(ctx.root(), page) {
            match tokio::fs::read(&path).await {
                Ok(contents) => {
                    return ResponseBuilder::new(status)
                        .header("Content-Type", "text/html")
                        .body(contents)
                        .build();
                }
                Err(e) => {
                    tracing::warn!(page = %path.display(), error = %e, "failed to load error page");
                }
            }
        }
    }
    Response::fallback_error(status)
}

/// Renders a `return` directive: a `Location` header for redirect codes,
/// a fixed plaintext body otherwise.
fn redirect_response(redirect: &Redirect) -> Response {
    match (&redirect.target, redirect.status.is_redirect()) {
        (Some(target), true) => ResponseBuilder::new(redirect.status)
            .header("Location", target.clone())
            .header("Content-Type", "text/html")
            .body(
                format!(
                    "<html><body><h1>{} {}</h1></body></html>",
                    redirect.status.as_u16(),
                    redirect.status.reason_phrase()
                )
                .into_bytes(),
            )
            .build(),
        (Some(target), false) => ResponseBuilder::new(redirect.status)
            .header("Content-Type", "text/plain")
            .body(target.clone().into_bytes())
            .build(),
        (None, _) => ResponseBuilder::new(redirect.status).build(),
    }
}
