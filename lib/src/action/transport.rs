//! Underlying bytestream used by SSH sessions.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::Error;
use crate::Result;

/// Factory that builds plain TCP connections.
#[derive(Debug, Clone, Copy)]
pub struct TcpTransport {
    connect_timeout: Duration,
}

impl TcpTransport {
    #[must_use]
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Resolves `host` and dials `host:port`.
    ///
    /// # Errors
    ///
    /// [`Error::Network`] if resolution or the connect fails, or the connect
    /// timeout elapses.
    pub async fn connect(&self, host: &str, port: u16) -> Result<TcpStream> {
        let addr = format!("{host}:{port}");
        let network = |reason: String| Error::Network {
            addr: addr.clone(),
            reason,
        };

        let stream = timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| network("TCP connect timed out".to_owned()))?
            .map_err(|error| network(format!("TCP connect failed: {error}")))?;

        if let Err(error) = stream.set_nodelay(true) {
            debug!(?error, %addr, "unable to set TCP_NODELAY");
        }

        Ok(stream)
    }
}
