//! Resolved server configuration.
//!
//! The configuration is parsed once at startup, validated, and immutable
//! for the process lifetime; every handler works against shared references.

pub mod parser;

use anyhow::{bail, Context};
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;

use crate::http::parser::DEFAULT_MAX_BODY;
use crate::http::request::Method;
use crate::http::response::StatusCode;

/// Configuration file loaded when the binary is started without arguments.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.conf";

/// A listening endpoint. `0.0.0.0` means any interface. Every distinct
/// endpoint referenced by any server binds exactly one listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    pub address: Ipv4Addr,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// One `server { ... }` block.
#[derive(Debug, Clone)]
pub struct VirtualServer {
    pub listens: Vec<Endpoint>,
    pub names: Vec<String>,
    /// Document root, normalized to end in '/'.
    pub root: String,
    pub index_files: Vec<String>,
    pub client_max_body_size: usize,
    pub error_pages: HashMap<u16, String>,
    pub autoindex: bool,
    pub locations: Vec<Location>,
}

/// A `location <prefix> { ... }` block. Unset fields fall back to the
/// enclosing server's directives.
#[derive(Debug, Clone, Default)]
pub struct Location {
    pub path: String,
    pub root: Option<String>,
    pub index_files: Option<Vec<String>>,
    pub autoindex: Option<bool>,
    pub client_max_body_size: Option<usize>,
    pub error_pages: HashMap<u16, String>,
    /// Empty means inherit the default method set.
    pub allowed_methods: Vec<Method>,
    pub upload_dir: Option<String>,
    /// File extension (with leading dot) to interpreter path.
    pub cgi_map: HashMap<String, String>,
    pub redirect: Option<Redirect>,
}

/// A `return <code> [<target>];` short-circuit.
#[derive(Debug, Clone)]
pub struct Redirect {
    pub status: StatusCode,
    pub target: Option<String>,
}

/// The whole validated configuration tree.
#[derive(Debug, Clone)]
pub struct ConfigModel {
    pub servers: Vec<VirtualServer>,
}

impl ConfigModel {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read configuration file {}", path.display()))?;
        Self::from_str(&text)
            .with_context(|| format!("invalid configuration in {}", path.display()))
    }

    pub fn from_str(text: &str) -> anyhow::Result<Self> {
        let servers = parser::parse(text)?;
        let model = Self { servers };
        model.validate()?;
        Ok(model)
    }

    /// Distinct endpoints across all servers, in stable order.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        let mut out: Vec<Endpoint> = self
            .servers
            .iter()
            .flat_map(|s| s.listens.iter().copied())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.servers.is_empty() {
            bail!("configuration declares no server");
        }
        for server in &self.servers {
            if server.listens.is_empty() {
                bail!("server block without a listen directive");
            }
            if server.root.is_empty() {
                bail!("server block without a root directive");
            }
        }
        Ok(())
    }
}

impl Default for VirtualServer {
    fn default() -> Self {
        Self {
            listens: Vec::new(),
            names: Vec::new(),
            root: String::new(),
            index_files: vec!["index.html".to_string()],
            client_max_body_size: DEFAULT_MAX_BODY,
            error_pages: HashMap::new(),
            autoindex: false,
            locations: Vec::new(),
        }
    }
}

/// Parses a `<number>[k|m|g]` size form, case-insensitive suffix.
pub fn parse_size(input: &str) -> Option<usize> {
    if input.is_empty() {
        return None;
    }
    let (digits, factor) = match input.chars().last()? {
        'k' | 'K' => (&input[..input.len() - 1], 1024),
        'm' | 'M' => (&input[..input.len() - 1], 1024 * 1024),
        'g' | 'G' => (&input[..input.len() - 1], 1024 * 1024 * 1024),
        '0'..='9' => (input, 1),
        _ => return None,
    };
    let n: usize = digits.parse().ok()?;
    n.checked_mul(factor)
}

/// Normalizes a directory path so it always ends in '/'.
pub fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}
