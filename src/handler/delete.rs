//! DELETE: unlink files, remove empty directories.

use std::io::ErrorKind;

use tokio::fs;

use super::error_response;
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
        Err(e) => {
            let status = match e.kind() {
                ErrorKind::NotFound => StatusCode::NotFound,
                ErrorKind::PermissionDenied => StatusCode::Forbidden,
                _ => StatusCode::InternalServerError,
            };
            return error_response(ctx, status).await;
        }
    };

    let result = if meta.is_dir() {
        match dir_is_empty(&path).await {
            Ok(false) => {
                // Non-empty directories are never removed.
                return ResponseBuilder::new(StatusCode::Conflict)
                    .header("Content-Type", "text/plain")
                    .body(b"Cannot delete non-empty directory".to_vec())
                    .build();
            }
            Ok(true) => fs::remove_dir(&path).await,
            Err(e) => Err(e),
        }
    } else {
        fs::remove_file(&path).await
    };

    match result {
        Ok(()) => {
            tracing::info!(path = %path.display(), "deleted");
            ResponseBuilder::new(StatusCode::NoContent).build()
        }
        Err(e) => {
            let status = match e.kind() {
                ErrorKind::PermissionDenied => StatusCode::Forbidden,
                _ => StatusCode::InternalServerError,
            };
            tracing::warn!(path = %path.display(), error = %e, "delete failed");
            error_response(ctx, status).await
        }
    }
}

async fn dir_is_empty(path: &std::path::Path) -> std::io::Result<bool> {
    let mut reader = fs::read_dir(path).await?;
    Ok(reader.next_entry().await?.is_none())
}
