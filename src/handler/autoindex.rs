//! Synthesized HTML directory listings.

use std::path::Path;

use tokio::fs;

use crate::http::response::{Response, ResponseBuilder, StatusCode};

/// Renders a directory as an HTML listing: a parent link, then entries
/// sorted by name, directories marked with a trailing slash, files with
/// their size.
pub async fn listing(dir: &Path, request_dir: &str) -> std::io::Result<Response> {
    let mut entries = Vec::new();
    let mut reader = fs::read_dir(dir).await?;
    while let Some(entry) = reader.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let meta = entry.metadata().await?;
        entries.push((name, meta.is_dir(), meta.len()));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let title = escape_html(request_dir);
    let mut body = format!(
        "<html>\n<head><title>Index of {title}</title></head>\n\
         <body>\n<h1>Index of {title}</h1>\n<hr>\n<pre>\n\
         <a href=\"../\">../</a>\n"
    );
    for (name, is_dir, len) in &entries {
        let slash = if *is_dir { "/" } else { "" };
        let size = if *is_dir {
            "-".to_string()
        } else {
            len.to_string()
        };
        body.push_str(&format!(
            "<a href=\"{href}{slash}\">{text}{slash}</a>  {size}\n",
            href = encode_href(name),
            text = escape_html(name),
        ));
    }
    body.push_str("</pre>\n<hr>\n</body>\n</html>\n");

    Ok(ResponseBuilder::new(StatusCode::Ok)
        .header("Content-Type", "text/html")
        .body(body.into_bytes())
        .build())
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

fn encode_href(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            b => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
