//! HTTP/1.1 protocol implementation.
//!
//! # Architecture
//!
//! - **`parser`**: incremental request parser, a pure state machine over
//!   the inbound buffer with strict size limits
//! - **`request`**: methods, versions, and the parsed request type
//! - **`response`**: status codes and the response builder
//! - **`writer`**: response serialization and partial-write tracking
//! - **`connection`**: the per-client driver tying parser, router, and
//!   handlers together, with keep-alive and the idle timeout
//! - **`mime`**: extension to media type table
//!
//! Bytes flow `connection → parser → router → handler → writer` and the
//! serialized response travels back out through the connection.

pub mod connection;
pub mod mime;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
