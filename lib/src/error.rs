//! Error taxonomy shared by every layer of the reconciler.

use std::fmt;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reaching, observing or mutating a remote host.
///
/// Absence of an entity is not represented here: reads and deletes report it
/// as `None`/`Ok(())`.
#[derive(Debug, Error)]
pub enum Error {
    /// No credential strategy was accepted by the server.
    #[error("authentication failed for {user}: {reason}")]
    Auth { user: String, reason: String },

    /// A configured private key could not be read or decoded.
    #[error("unable to load private key {path}: {reason}")]
    PrivateKey { path: Utf8PathBuf, reason: String },

    /// The transport to the host could not be established.
    #[error("unable to reach {addr}: {reason}")]
    Network { addr: String, reason: String },

    /// The host presented a key that the configured policy does not trust.
    #[error("host key for {host} rejected: {reason}")]
    HostKey { host: String, reason: String },

    /// A remote command did not complete successfully.
    #[error("command `{command}` failed with {kind}: {}", .stderr.trim())]
    Execution {
        command: String,
        kind: ExecutionKind,
        stderr: String,
    },

    /// Introspection output did not match its positional format.
    #[error("unexpected output from `{command}`: {reason}")]
    Parse { command: String, reason: String },

    /// A persisted identifier is not a well-formed numeric id.
    #[error("identifier {0:?} is not a numeric id")]
    Identifier(String),

    /// An entity that must exist was not found on the host.
    #[error("{kind} with id {id} not found")]
    NotFound { kind: &'static str, id: u32 },

    /// Invalid connection or desired-state configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Why a remote command counts as failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionKind {
    /// The command exited with a non-zero status.
    ExitStatus(u32),
    /// The per-command deadline elapsed.
    Timeout,
    /// The command was aborted through its cancellation token.
    Cancelled,
    /// The SSH channel failed before an exit status was received.
    Channel(String),
}

impl fmt::Display for ExecutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionKind::ExitStatus(code) => write!(f, "exit status {code}"),
            ExecutionKind::Timeout => write!(f, "timeout"),
            ExecutionKind::Cancelled => write!(f, "cancellation"),
            ExecutionKind::Channel(reason) => write!(f, "channel error ({reason})"),
        }
    }
}

impl Error {
    /// Exit status of a failed remote command, if it got that far.
    #[must_use]
    pub fn exit_status(&self) -> Option<u32> {
        match self {
            Error::Execution {
                kind: ExecutionKind::ExitStatus(code),
                ..
            } => Some(*code),
            _ => None,
        }
    }

    pub(crate) fn parse(command: &str, reason: impl Into<String>) -> Self {
        Error::Parse {
            command: command.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn channel(command: &str, reason: impl fmt::Display) -> Self {
        Error::Execution {
            command: command.to_owned(),
            kind: ExecutionKind::Channel(reason.to_string()),
            stderr: String::new(),
        }
    }
}
