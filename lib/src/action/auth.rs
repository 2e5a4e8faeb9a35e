//! Credential chain used when opening a [`Session`](super::Session).
//!
//! The chain is an ordered list of strategies evaluated until one succeeds.
//! Each strategy reports whether it was skipped (nothing to offer), tried
//! (offered and denied) or succeeded. A configured static secret is used
//! exclusively; otherwise the private key file and the agent's keys are
//! offered in turn.

use std::io::ErrorKind;
use std::sync::Arc;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use enum_dispatch::enum_dispatch;
use russh::keys::agent::client::AgentClient;
use russh::keys::PrivateKey;
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::Algorithm;
use russh::keys::HashAlg;
use tracing::debug;
use tracing::warn;

use super::ssh::SshHandle;
use crate::config::ConnectionConfig;
use crate::config::KeySource;
use crate::util::secret::SecureString;
use crate::Error;
use crate::Result;

/// Outcome of one strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    /// The server accepted the credential.
    Succeeded,
    /// The credential was offered and denied.
    Tried,
    /// There was nothing to offer, with the reason why.
    Skipped(String),
}

/// One way of authenticating an SSH session.
#[async_trait]
#[enum_dispatch]
pub trait Strategy {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Tries to authenticate `user` on `session`.
    ///
    /// Only failures that must abort the whole chain are returned as errors.
    async fn attempt(&self, session: &mut SshHandle, user: &str) -> Result<Attempt>;
}

/// All credential strategies.
#[enum_dispatch(Strategy)]
#[derive(Debug)]
pub enum StrategyImpl {
    Password(PasswordStrategy),
    KeyFile(KeyFileStrategy),
    Agent(AgentStrategy),
}

// Chain ----------------------------------------------------------------------

/// Ordered list of strategies, evaluated once per session.
#[derive(Debug)]
pub struct CredentialChain {
    strategies: Vec<StrategyImpl>,
}

impl CredentialChain {
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, strategy: impl Into<StrategyImpl>) -> Self {
        self.strategies.push(strategy.into());
        self
    }

    /// Builds the chain described by `config`.
    #[must_use]
    pub fn from_config(config: &ConnectionConfig) -> Self {
        if let Some(ref password) = config.password {
            return Self::new().with(PasswordStrategy::new(password.clone()));
        }

        let mut chain = Self::new().with(KeyFileStrategy::new(config.private_key.clone()));
        if let Some(socket) = config.agent_socket() {
            chain = chain.with(AgentStrategy::new(socket));
        }
        chain
    }

    /// Names of the strategies in evaluation order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.strategies.iter().map(Strategy::name)
    }

    /// Evaluates strategies in order until one succeeds.
    ///
    /// # Errors
    ///
    /// - [`Error::Auth`] if every strategy was skipped or denied
    /// - Any fatal error a strategy raises, such as an unreadable key
    pub async fn authenticate(&self, session: &mut SshHandle, user: &str) -> Result<&'static str> {
        let mut outcomes = Vec::new();

        for strategy in &self.strategies {
            let name = strategy.name();
            match strategy.attempt(session, user).await? {
                Attempt::Succeeded => {
                    debug!(%user, strategy = name, "ssh authentication succeeded");
                    return Ok(name);
                }
                Attempt::Tried => {
                    debug!(%user, strategy = name, "ssh authentication denied");
                    outcomes.push(format!("{name}: denied"));
                }
                Attempt::Skipped(reason) => {
                    debug!(%user, strategy = name, %reason, "ssh authentication skipped");
                    outcomes.push(format!("{name}: {reason}"));
                }
            }
        }

        let reason = if outcomes.is_empty() {
            "no credentials configured".to_owned()
        } else {
            outcomes.join("; ")
        };
        Err(Error::Auth {
            user: user.to_owned(),
            reason,
        })
    }
}

impl Default for CredentialChain {
    fn default() -> Self {
        Self::new()
    }
}

// Password -------------------------------------------------------------------

#[derive(Debug)]
pub struct PasswordStrategy {
    password: SecureString,
}

impl PasswordStrategy {
    #[must_use]
    pub fn new(password: SecureString) -> Self {
        Self { password }
    }
}

#[async_trait]
impl Strategy for PasswordStrategy {
    fn name(&self) -> &'static str {
        "password"
    }

    async fn attempt(&self, session: &mut SshHandle, user: &str) -> Result<Attempt> {
        let result = session
            .authenticate_password(user, self.password.expose())
            .await
            .map_err(|error| auth_error(user, self.name(), &error))?;
        Ok(if result.success() {
            Attempt::Succeeded
        } else {
            Attempt::Tried
        })
    }
}

// Key file -------------------------------------------------------------------

#[derive(Debug)]
pub struct KeyFileStrategy {
    source: KeySource,
}

impl KeyFileStrategy {
    #[must_use]
    pub fn new(source: KeySource) -> Self {
        Self { source }
    }

    /// Reads and decodes the key.
    ///
    /// Returns `None` only when the default key path does not exist.
    ///
    /// # Errors
    ///
    /// [`Error::PrivateKey`] for any other read or decode failure.
    pub async fn load(&self) -> Result<Option<PrivateKey>> {
        let path = self.source.path();
        let key_error = |reason: String| Error::PrivateKey {
            path: path.clone(),
            reason,
        };

        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == ErrorKind::NotFound && !self.source.is_explicit() => {
                return Ok(None);
            }
            Err(error) => return Err(key_error(error.to_string())),
        };

        let key = russh::keys::decode_secret_key(&contents, None)
            .map_err(|error| key_error(error.to_string()))?;
        Ok(Some(key))
    }
}

#[async_trait]
impl Strategy for KeyFileStrategy {
    fn name(&self) -> &'static str {
        "key_file"
    }

    async fn attempt(&self, session: &mut SshHandle, user: &str) -> Result<Attempt> {
        let Some(key) = self.load().await? else {
            return Ok(Attempt::Skipped(format!(
                "{} does not exist",
                self.source.path()
            )));
        };

        let hash_alg = rsa_hash(&key.algorithm());
        let key = PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg);

        let result = session
            .authenticate_publickey(user, key)
            .await
            .map_err(|error| auth_error(user, self.name(), &error))?;
        Ok(if result.success() {
            Attempt::Succeeded
        } else {
            Attempt::Tried
        })
    }
}

// Agent ----------------------------------------------------------------------

#[derive(Debug)]
pub struct AgentStrategy {
    socket: Utf8PathBuf,
}

impl AgentStrategy {
    #[must_use]
    pub fn new(socket: Utf8PathBuf) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl Strategy for AgentStrategy {
    fn name(&self) -> &'static str {
        "agent"
    }

    /// Iterates through all identities found in the agent and returns on the
    /// first authentication success.
    async fn attempt(&self, session: &mut SshHandle, user: &str) -> Result<Attempt> {
        let mut agent = match AgentClient::connect_uds(&self.socket).await {
            Ok(agent) => agent,
            Err(error) => return Ok(Attempt::Skipped(format!("agent unavailable: {error}"))),
        };
        let identities = match agent.request_identities().await {
            Ok(identities) => identities,
            Err(error) => return Ok(Attempt::Skipped(format!("agent unavailable: {error}"))),
        };
        if identities.is_empty() {
            return Ok(Attempt::Skipped("agent holds no keys".to_owned()));
        }

        for key in identities {
            let fingerprint = key.fingerprint(Default::default());
            let hash_alg = rsa_hash(&key.algorithm());
            let result = session
                .authenticate_publickey_with(user, key, hash_alg, &mut agent)
                .await;
            match result {
                Ok(auth_result) if auth_result.success() => return Ok(Attempt::Succeeded),
                Ok(_) => debug!(%user, key = %fingerprint, "ssh agent key denied"),
                Err(error) => warn!(?error, key = %fingerprint, "ssh agent auth failed"),
            }
        }

        Ok(Attempt::Tried)
    }
}

/// RSA keys sign with SHA-256 unless the key pins a hash; `ssh-rsa` (SHA-1)
/// is refused by current OpenSSH servers.
fn rsa_hash(algorithm: &Algorithm) -> Option<HashAlg> {
    match algorithm {
        Algorithm::Rsa { hash } => hash.or(Some(HashAlg::Sha256)),
        _else => None,
    }
}

fn auth_error(user: &str, strategy: &str, error: &russh::Error) -> Error {
    Error::Auth {
        user: user.to_owned(),
        reason: format!("{strategy}: {error}"),
    }
}
