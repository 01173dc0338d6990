//! GET and HEAD: static files, index resolution, autoindex fallback.

use std::io::ErrorKind;
use std::path::PathBuf;

use tokio::fs;

use super::{autoindex, error_response};
use crate::http::mime;
use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::router::RequestContext;

pub async fn handle(req: &Request, ctx: &RequestContext<'_>) -> Response {
    let path = match ctx.resolve_path(&req.path) {
        Some(path) => path,
        None => return error_response(ctx, StatusCode::Forbidden).await,
    };

    let meta = match fs::metadata(&path).await {
        Ok(meta) => meta,
        Err(e) => return error_response(ctx, io_status(e.kind())).await,
    };

    if !meta.is_dir() {
        return serve_file(ctx, path).await;
    }

    // Directory: try the index candidates in order.
    for candidate in ctx.index_files() {
        let index_path = path.join(candidate);
        match fs::metadata(&index_path).await {
            Ok(m) if m.is_file() => return serve_file(ctx, index_path).await,
            _ => {}
        }
    }

    if ctx.autoindex() {
        let request_dir = if req.path.ends_with('/') {
            req.path.clone()
        } else {
            format!("{}/", req.path)
        };
        return match autoindex::listing(&path, &request_dir).await {
            Ok(response) => response,
            Err(e) => error_response(ctx, io_status(e.kind())).await,
        };
    }

    error_response(ctx, StatusCode::NotFound).await
}

async fn serve_file(ctx: &RequestContext<'_>, path: PathBuf) -> Response {
    match fs::read(&path).await {
        Ok(contents) => ResponseBuilder::new(StatusCode::Ok)
            .header("Content-Type", mime::content_type(&path))
            .header("Content-Length", contents.len().to_string())
            .body(contents)
            .build(),
        Err(e) => error_response(ctx, io_status(e.kind())).await,
    }
}

fn io_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NotFound,
        ErrorKind::PermissionDenied => StatusCode::Forbidden,
        _ => StatusCode::InternalServerError,
    }
}
