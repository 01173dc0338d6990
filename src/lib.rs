//! portico - a miniature nginx-shaped HTTP/1.1 origin server
//!
//! Virtual hosts, static files, uploads, deletion, directory indexes,
//! CGI execution, and configured redirects, driven by an nginx-like
//! configuration file.

pub mod config;
pub mod handler;
pub mod http;
pub mod router;
pub mod server;
