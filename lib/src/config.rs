use std::time::Duration;

use bon::Builder;
use camino::Utf8PathBuf;

use crate::util::dirs;
use crate::util::secret::SecureString;

pub const DEFAULT_PORT: u16 = 22;
pub const DEFAULT_USER: &str = "root";
pub const DEFAULT_KEY_FILE: &str = "id_rsa";
pub const DEFAULT_KNOWN_HOSTS_FILE: &str = "known_hosts";
pub const AGENT_SOCKET_ENV: &str = "SSH_AUTH_SOCK";

/// Everything needed to open a [`Session`](crate::action::Session) to one
/// host.
#[derive(Debug, Builder)]
pub struct ConnectionConfig {
    #[builder(into)]
    pub host: String,

    #[builder(default = DEFAULT_PORT)]
    pub port: u16,

    /// Remote principal to authenticate as.
    #[builder(into, default = DEFAULT_USER.to_owned())]
    pub user: String,

    /// Static secret. When set, no key-based method is attempted.
    #[builder(into)]
    pub password: Option<SecureString>,

    #[builder(default)]
    pub private_key: KeySource,

    /// Socket of a running SSH agent. See [`ConnectionConfig::agent_socket`].
    #[builder(into)]
    pub agent_socket: Option<Utf8PathBuf>,

    /// Whether privileged commands are prefixed with `sudo -n`.
    #[builder(default = true)]
    pub use_sudo: bool,

    #[builder(default)]
    pub host_key_policy: HostKeyPolicy,

    #[builder(default = Duration::from_secs(10))]
    pub connect_timeout: Duration,

    /// Deadline for a single remote command.
    #[builder(default = Duration::from_secs(60))]
    pub command_timeout: Duration,

    /// Deadline for a whole create/read/update/delete operation.
    pub operation_timeout: Option<Duration>,
}

impl ConnectionConfig {
    /// `host:port` as used for dialing and in log lines.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The configured agent socket, else the one advertised in
    /// `SSH_AUTH_SOCK`.
    #[must_use]
    pub fn agent_socket(&self) -> Option<Utf8PathBuf> {
        self.agent_socket.clone().or_else(|| {
            std::env::var(AGENT_SOCKET_ENV)
                .ok()
                .filter(|path| !path.is_empty())
                .map(Utf8PathBuf::from)
        })
    }
}

/// Where the private key for public key authentication comes from.
///
/// A missing file is only tolerated for [`KeySource::Default`]. Any other
/// read or decode failure is fatal for both variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// The conventional `~/.ssh/id_rsa`, used when nothing was configured.
    Default(Utf8PathBuf),
    /// A path the user asked for explicitly.
    Explicit(Utf8PathBuf),
}

impl KeySource {
    #[must_use]
    pub fn path(&self) -> &Utf8PathBuf {
        match self {
            KeySource::Default(path) | KeySource::Explicit(path) => path,
        }
    }

    #[must_use]
    pub fn is_explicit(&self) -> bool {
        matches!(self, KeySource::Explicit(_))
    }
}

impl Default for KeySource {
    fn default() -> Self {
        KeySource::Default(dirs::ssh_path(DEFAULT_KEY_FILE))
    }
}

impl From<Option<Utf8PathBuf>> for KeySource {
    fn from(value: Option<Utf8PathBuf>) -> Self {
        value.map_or_else(KeySource::default, KeySource::Explicit)
    }
}

/// How the server's host key is verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Accept any host key. Vulnerable to impersonation.
    Insecure,
    /// Accept only a key with this SHA-256 fingerprint (`SHA256:...`).
    Pinned(String),
    /// Trust on first use, remembering keys in an OpenSSH `known_hosts` file.
    KnownHosts(Utf8PathBuf),
}

impl Default for HostKeyPolicy {
    fn default() -> Self {
        HostKeyPolicy::KnownHosts(dirs::ssh_path(DEFAULT_KNOWN_HOSTS_FILE))
    }
}
