//! Listener setup and the accept loops.
//!
//! Every distinct `(address, port)` across all virtual servers binds
//! exactly one listening socket, shared by every server claiming it; the
//! Host header decides between them per request.

pub mod listener;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::ConfigModel;
use crate::handler::PeerInfo;
use crate::http::connection::Connection;

/// Binds all endpoints and serves until the process is stopped. Bind
/// failures abort startup; accept failures are logged and survived.
pub async fn run(config: Arc<ConfigModel>) -> anyhow::Result<()> {
    let mut listeners = Vec::new();
    for endpoint in config.endpoints() {
        let listener = listener::bind(endpoint)?;
        info!("listening on {}", endpoint);
        listeners.push(listener);
    }

    let mut tasks = Vec::new();
    for listener in listeners {
        let config = config.clone();
        tasks.push(tokio::spawn(accept_loop(listener, config)));
    }
    for task in tasks {
        task.await?;
    }
    Ok(())
}

async fn accept_loop(listener: TcpListener, config: Arc<ConfigModel>) {
    loop {
        match listener.accept().await {
            Ok((stream, remote)) => {
                let local = match stream.local_addr() {
                    Ok(local) => local,
                    Err(e) => {
                        warn!(error = %e, "accepted socket without local address");
                        continue;
                    }
                };
                debug!(%remote, "accepted connection");

                let config = config.clone();
                tokio::spawn(async move {
                    let peer = PeerInfo { remote, local };
                    let mut conn = Connection::new(stream, peer, config);
                    if let Err(e) = conn.run().await {
                        debug!(error = %e, "connection ended with error");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
            }
        }
    }
}
