/*!
 * Listener: accept loop and per-connection session spawn
 */

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread;

use tracing::{error, info};

use crate::config::RelayConfig;
use crate::core::session;
use crate::error::{RelayError, Result};

/// The duplicator's listening endpoint.
///
/// Binding and running are separate so callers can learn the bound address
/// (port 0 in tests) before the accept loop starts.
pub struct Server {
    listener: TcpListener,
    config: Arc<RelayConfig>,
}

impl Server {
    /// Bind the listening socket. Bind failure is fatal for the process.
    pub fn bind(config: RelayConfig) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(config.listen.as_str()).map_err(|e| RelayError::Bind {
            addr: config.listen.clone(),
            source: e,
        })?;
        Ok(Self {
            listener,
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, one session thread per client.
    ///
    /// Accept failures are logged and the loop continues; only bind failures
    /// (already handled) abort the process.
    pub fn run(&self) {
        let mut conn_no: u64 = 0;
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let local = stream
                        .local_addr()
                        .map(|a| a.to_string())
                        .unwrap_or_else(|_| self.config.listen.clone());
                    info!(
                        conn = conn_no,
                        "accepted connection ({} <-> {})", peer, local
                    );

                    let config = Arc::clone(&self.config);
                    let n = conn_no;
                    thread::spawn(move || session::run(n, stream, &config));
                    conn_no += 1;
                }
                Err(e) => {
                    error!("error while accepting: {}", e);
                }
            }
        }
    }
}
