use std::net::SocketAddr;

use anyhow::Context;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;

use crate::config::Endpoint;

const BACKLOG: i32 = 128;

/// Binds one listening socket for an endpoint.
///
/// `SO_REUSEADDR` is set before bind so restarts do not trip over sockets
/// in TIME_WAIT. The socket is non-blocking before it is handed to the
/// runtime.
pub fn bind(endpoint: Endpoint) -> anyhow::Result<TcpListener> {
    let addr = SocketAddr::from((endpoint.address, endpoint.port));

    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
        .context("failed to create socket")?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket
        .bind(&addr.into())
        .with_context(|| format!("failed to bind {}", endpoint))?;
    socket
        .listen(BACKLOG)
        .with_context(|| format!("failed to listen on {}", endpoint))?;

    TcpListener::from_std(socket.into())
        .with_context(|| format!("failed to register listener for {}", endpoint))
}
