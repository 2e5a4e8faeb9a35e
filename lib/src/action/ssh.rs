use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::Handle;
use russh::keys::PublicKey;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use super::auth::CredentialChain;
use super::transport::TcpTransport;
use super::Exec;
use super::ExecOutput;
use crate::config::ConnectionConfig;
use crate::config::HostKeyPolicy;
use crate::Error;
use crate::Result;

/// Authenticated russh client handle.
pub type SshHandle = Handle<SessionHandler>;

// Session --------------------------------------------------------------------

/// One authenticated SSH connection to one host.
///
/// Commands are serialized: at most one is in flight per session, however
/// many tasks share it.
pub struct Session {
    addr: String,
    elevation: bool,
    handle: Mutex<SshHandle>,
}

impl Session {
    /// Dials the host, verifies its key and runs the credential chain.
    ///
    /// # Errors
    ///
    /// - [`Error::Network`] if the TCP connect or SSH handshake fails
    /// - [`Error::HostKey`] if the host key is not trusted
    /// - [`Error::Auth`] or [`Error::PrivateKey`] if authentication fails
    #[instrument(skip_all, fields(addr = %config.addr(), user = %config.user))]
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let addr = config.addr();

        let stream = TcpTransport::new(config.connect_timeout)
            .connect(&config.host, config.port)
            .await?;

        let ssh_config = Arc::new(russh::client::Config {
            keepalive_interval: Some(Duration::from_secs(15)),
            ..Default::default()
        });
        let handler = SessionHandler::new(&config.host, config.port, config.host_key_policy.clone());

        let mut handle = russh::client::connect_stream(ssh_config, stream, handler)
            .await
            .map_err(|error| match error {
                russh::Error::UnknownKey => Error::HostKey {
                    host: addr.clone(),
                    reason: "server key is not trusted by the host key policy".to_owned(),
                },
                other => Error::Network {
                    addr: addr.clone(),
                    reason: format!("SSH handshake failed: {other}"),
                },
            })?;

        let chain = CredentialChain::from_config(config);
        let strategy = chain.authenticate(&mut handle, &config.user).await?;

        info!(%addr, strategy, elevation = config.use_sudo, "SSH session established");

        Ok(Self {
            addr,
            elevation: config.use_sudo,
            handle: Mutex::new(handle),
        })
    }

    /// `host:port` this session is connected to.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Whether privileged commands on this session are elevated.
    #[must_use]
    pub fn elevation_enabled(&self) -> bool {
        self.elevation
    }

    /// Disconnects from the host.
    ///
    /// # Errors
    ///
    /// If the disconnect message cannot be sent.
    pub async fn close(&self) -> Result<()> {
        let handle = self.handle.lock().await;
        handle
            .disconnect(russh::Disconnect::ByApplication, "", "English")
            .await
            .map_err(|error| Error::Network {
                addr: self.addr.clone(),
                reason: format!("disconnect failed: {error}"),
            })
    }
}

#[async_trait]
impl Exec for Session {
    async fn exec(&self, command: &str, stdin: &[u8]) -> Result<ExecOutput> {
        // Held until the exit status arrives.
        let handle = self.handle.lock().await;

        let channel_error = |error: russh::Error| Error::channel(command, error);

        let mut channel = handle.channel_open_session().await.map_err(channel_error)?;
        channel.exec(true, command).await.map_err(channel_error)?;
        if !stdin.is_empty() {
            channel.data(stdin).await.map_err(channel_error)?;
        }
        channel.eof().await.map_err(channel_error)?;

        let mut code = None;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        loop {
            let Some(msg) = channel.wait().await else {
                break;
            };

            match msg {
                russh::ChannelMsg::Data { ref data } => {
                    stdout
                        .write_all(data)
                        .await
                        .map_err(|error| Error::channel(command, error))?;
                }
                russh::ChannelMsg::ExtendedData { ref data, ext: 1 } => {
                    stderr
                        .write_all(data)
                        .await
                        .map_err(|error| Error::channel(command, error))?;
                }
                russh::ChannelMsg::ExitStatus { exit_status } => {
                    code = Some(exit_status);
                    // cannot leave the loop immediately, there might still be
                    // more data to receive
                }
                _ => {}
            }
        }

        let exit_status =
            code.ok_or_else(|| Error::channel(command, "program did not exit cleanly"))?;
        debug!(addr = %self.addr, %command, exit_status, "remote command finished");

        Ok(ExecOutput {
            exit_status,
            stdout,
            stderr,
        })
    }
}

// russh details --------------------------------------------------------------

/// Client-side protocol callbacks, chiefly host key verification.
#[derive(Debug)]
pub struct SessionHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

impl SessionHandler {
    fn new(host: &str, port: u16, policy: HostKeyPolicy) -> Self {
        Self {
            host: host.to_owned(),
            port,
            policy,
        }
    }

    /// Applies the host key policy to the key the server presented.
    fn verify(&self, key: &PublicKey) -> bool {
        let fingerprint = key.fingerprint(Default::default()).to_string();

        match self.policy {
            HostKeyPolicy::Insecure => {
                warn!(host = %self.host, %fingerprint, "host key accepted without verification");
                true
            }
            HostKeyPolicy::Pinned(ref expected) => {
                let trusted = *expected == fingerprint;
                if !trusted {
                    warn!(host = %self.host, %fingerprint, %expected, "host key does not match pinned fingerprint");
                }
                trusted
            }
            HostKeyPolicy::KnownHosts(ref path) => {
                match russh::keys::check_known_hosts_path(&self.host, self.port, key, path) {
                    Ok(true) => true,
                    Ok(false) => {
                        match russh::keys::known_hosts::learn_known_hosts_path(
                            &self.host, self.port, key, path,
                        ) {
                            Ok(()) => {
                                info!(host = %self.host, %fingerprint, %path, "learned new host key");
                                true
                            }
                            Err(error) => {
                                warn!(?error, host = %self.host, %path, "unable to record host key");
                                false
                            }
                        }
                    }
                    Err(error) => {
                        warn!(?error, host = %self.host, %fingerprint, %path, "host key verification failed");
                        false
                    }
                }
            }
        }
    }
}

impl russh::client::Handler for SessionHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(self.verify(server_public_key))
    }
}

// Tests ----------------------------------------------------------------------
