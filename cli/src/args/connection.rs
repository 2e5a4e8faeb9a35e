use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Args;
use rusr::config::ConnectionConfig;
use rusr::config::HostKeyPolicy;

use super::AuthArgs;

const HEADING: Option<&str> = Some("Connection Options");

/// Where to connect and how long to wait.
#[derive(Debug, Args, Clone)]
pub struct ConnectionArgs {
    /// Host to reconcile.
    #[arg(short = 'H', long, env = "RUSR_HOST", help_heading = HEADING, global = true)]
    pub host: Option<String>,

    /// SSH port.
    #[arg(short, long, default_value_t = 22, help_heading = HEADING, global = true)]
    pub port: u16,

    /// Run account tools without `sudo -n`, for when the remote user is root.
    #[arg(long, help_heading = HEADING, global = true)]
    pub no_sudo: bool,

    /// Accept any host key. Only for throwaway hosts.
    #[arg(long, conflicts_with_all = ["host_key", "known_hosts"], help_heading = HEADING, global = true)]
    pub insecure: bool,

    /// Expected SHA-256 fingerprint of the host key (SHA256:...).
    #[arg(long, conflicts_with = "known_hosts", help_heading = HEADING, global = true)]
    pub host_key: Option<String>,

    /// Known hosts file to verify against and learn new hosts into.
    #[arg(long, help_heading = HEADING, global = true)]
    pub known_hosts: Option<Utf8PathBuf>,

    /// Timeout for establishing the TCP connection.
    #[arg(long, default_value = "10s", value_parser = humantime::parse_duration, help_heading = HEADING, global = true)]
    pub connect_timeout: Duration,

    /// Timeout for each remote command.
    #[arg(long, default_value = "60s", value_parser = humantime::parse_duration, help_heading = HEADING, global = true)]
    pub command_timeout: Duration,

    /// Timeout for a whole operation. Unbounded if unset.
    #[arg(long, value_parser = humantime::parse_duration, help_heading = HEADING, global = true)]
    pub operation_timeout: Option<Duration>,
}

impl ConnectionArgs {
    fn host_key_policy(&self) -> HostKeyPolicy {
        if self.insecure {
            HostKeyPolicy::Insecure
        } else if let Some(fingerprint) = &self.host_key {
            HostKeyPolicy::Pinned(fingerprint.clone())
        } else if let Some(path) = &self.known_hosts {
            HostKeyPolicy::KnownHosts(path.clone())
        } else {
            HostKeyPolicy::default()
        }
    }

    /// Combines connection and credential flags into a library config.
    pub fn config(&self, auth: &AuthArgs) -> Result<ConnectionConfig> {
        let Some(host) = &self.host else {
            bail!("no host given, use --host or RUSR_HOST");
        };

        Ok(ConnectionConfig::builder()
            .host(host)
            .port(self.port)
            .user(&auth.user)
            .maybe_password(auth.password()?)
            .private_key(auth.key_source())
            .maybe_agent_socket(auth.ssh_agent.clone())
            .use_sudo(!self.no_sudo)
            .host_key_policy(self.host_key_policy())
            .connect_timeout(self.connect_timeout)
            .command_timeout(self.command_timeout)
            .maybe_operation_timeout(self.operation_timeout)
            .build())
    }
}
