//! POST: write the request body into the location's upload directory.

use std::io::ErrorKind;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::fs;

use super::error_response;
use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::router::{resolve_under, RequestContext};

pub async fn handle(req: &Request, ctx: &RequestContext<'_>) -> Response {
    let upload_dir = ctx.upload_dir();

    // Filename from the last path segment; synthesized when the request
    // targets the directory itself.
    let filename = match req.path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            format!("upload_{}.txt", now)
        }
    };

    // The destination must stay under the upload directory.
    let dest = match resolve_under(upload_dir, &filename) {
        Some(dest) => dest,
        None => return error_response(ctx, StatusCode::Forbidden).await,
    };

    let existed = fs::metadata(&dest).await.is_ok();

    if let Err(e) = fs::write(&dest, &req.body).await {
        let status = match e.kind() {
            ErrorKind::PermissionDenied => StatusCode::Forbidden,
            _ => StatusCode::InternalServerError,
        };
        tracing::warn!(dest = %dest.display(), error = %e, "upload failed");
        return error_response(ctx, status).await;
    }

    tracing::info!(dest = %dest.display(), bytes = req.body.len(), "upload stored");

    if existed {
        let body = format!("File updated successfully: {}\n", filename);
        ResponseBuilder::new(StatusCode::Ok)
            .header("Content-Type", "text/plain")
            .body(body.into_bytes())
            .build()
    } else {
        ResponseBuilder::new(StatusCode::Created)
            .header("Content-Type", "text/plain")
            .build()
    }
}
