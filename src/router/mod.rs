//! Request routing: virtual-server selection, location matching, and the
//! resolved directive view handlers work against.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::config::{ConfigModel, Location, Redirect, VirtualServer};
use crate::http::request::{Method, DEFAULT_METHODS};

/// Picks the virtual server for a connection's local endpoint and the
/// request's Host header.
///
/// Servers claiming the endpoint (exact address or 0.0.0.0) are candidates;
/// an exact Host name match wins, otherwise the first server listed for the
/// endpoint is the default.
pub fn select_server<'a>(
    config: &'a ConfigModel,
    local: SocketAddr,
    host: Option<&str>,
) -> &'a VirtualServer {
    let candidates: Vec<&VirtualServer> = config
        .servers
        .iter()
        .filter(|s| s.listens.iter().any(|l| endpoint_matches(l, local)))
        .collect();

    // Host header may carry a port; only the name part matters.
    let hostname = host.map(|h| h.split(':').next().unwrap_or(h));

    if let Some(name) = hostname {
        for server in &candidates {
            if server.names.iter().any(|n| n == name) {
                return server;
            }
        }
    }

    candidates
        .first()
        .copied()
        .unwrap_or_else(|| &config.servers[0])
}

/// Longest path-prefix match over the server's locations, declaration
/// order breaking ties.
pub fn select_location<'a>(server: &'a VirtualServer, path: &str) -> Option<&'a Location> {
    let mut best: Option<&Location> = None;
    for location in &server.locations {
        if path.starts_with(&location.path) {
            match best {
                Some(b) if location.path.len() <= b.path.len() => {}
                _ => best = Some(location),
            }
        }
    }
    best
}

pub fn resolve<'a>(
    config: &'a ConfigModel,
    local: SocketAddr,
    host: Option<&str>,
    path: &str,
) -> RequestContext<'a> {
    let server = select_server(config, local, host);
    let location = select_location(server, path);
    RequestContext { server, location }
}

fn endpoint_matches(listen: &crate::config::Endpoint, local: SocketAddr) -> bool {
    if listen.port != local.port() {
        return false;
    }
    if listen.address.is_unspecified() {
        return true;
    }
    matches!(local.ip(), IpAddr::V4(v4) if v4 == listen.address)
}

/// The resolved directive set for one request: every accessor walks the
/// location → server fallback chain.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    pub server: &'a VirtualServer,
    pub location: Option<&'a Location>,
}

impl<'a> RequestContext<'a> {
    pub fn root(&self) -> &'a str {
        match self.location.and_then(|l| l.root.as_deref()) {
            Some(root) => root,
            None => &self.server.root,
        }
    }

    pub fn index_files(&self) -> &'a [String] {
        match self.location.and_then(|l| l.index_files.as_deref()) {
            Some(files) => files,
            None => &self.server.index_files,
        }
    }

    pub fn autoindex(&self) -> bool {
        self.location
            .and_then(|l| l.autoindex)
            .unwrap_or(self.server.autoindex)
    }

    pub fn client_max_body_size(&self) -> usize {
        self.location
            .and_then(|l| l.client_max_body_size)
            .unwrap_or(self.server.client_max_body_size)
    }

    /// The permitted methods, in declaration order; an unrestricted
    /// location inherits the full default set.
    pub fn allowed_methods(&self) -> &'a [Method] {
        match self.location {
            Some(l) if !l.allowed_methods.is_empty() => &l.allowed_methods,
            _ => &DEFAULT_METHODS,
        }
    }

    pub fn method_allowed(&self, method: Method) -> bool {
        self.allowed_methods().contains(&method)
    }

    /// Value for the `Allow` header on a 405.
    pub fn allow_header(&self) -> String {
        self.allowed_methods()
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn upload_dir(&self) -> &'a str {
        match self.location.and_then(|l| l.upload_dir.as_deref()) {
            Some(dir) => dir,
            None => self.root(),
        }
    }

    pub fn redirect(&self) -> Option<&'a Redirect> {
        self.location.and_then(|l| l.redirect.as_ref())
    }

    /// Interpreter for the request path, when the location maps its
    /// extension through `cgi_pass`.
    pub fn cgi_interpreter(&self, path: &str) -> Option<&'a str> {
        let location = self.location?;
        if location.cgi_map.is_empty() {
            return None;
        }
        let filename = path.rsplit('/').next()?;
        let dot = filename.rfind('.')?;
        location
            .cgi_map
            .get(&filename[dot..])
            .map(|s| s.as_str())
    }

    /// Error page path for a status code, location first, then server.
    pub fn error_page(&self, code: u16) -> Option<&'a str> {
        if let Some(location) = self.location {
            if let Some(page) = location.error_pages.get(&code) {
                return Some(page);
            }
        }
        self.server.error_pages.get(&code).map(|s| s.as_str())
    }

    /// Maps a request path onto the resolved root, resolving `.` and `..`
    /// segments logically. Any attempt to climb above the root yields
    /// `None`, which handlers answer with 403.
    pub fn resolve_path(&self, request_path: &str) -> Option<PathBuf> {
        resolve_under(self.root(), request_path)
    }
}

/// Joins `request_path` under `base` with logical dot-segment handling;
/// `None` when the path would escape the base directory.
pub fn resolve_under(base: &str, request_path: &str) -> Option<PathBuf> {
    let mut stack: Vec<&str> = Vec::new();
    for segment in request_path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if stack.pop().is_none() {
                    return None;
                }
            }
            s => stack.push(s),
        }
    }

    let mut path = PathBuf::from(base);
    for segment in stack {
        path.push(segment);
    }
    Some(path)
}
