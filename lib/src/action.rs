//! Remote execution: transport, authentication, SSH sessions and the
//! privileged executor built on top of them.

pub mod auth;
pub mod executor;
pub mod ssh;
pub mod transport;

use std::fmt;

use async_trait::async_trait;
use bstr::ByteSlice;

pub use self::executor::Executor;
pub use self::ssh::Session;
use crate::Result;

/// Runs exactly one command on a host and captures what it produced.
///
/// Implementations must allow at most one command in flight at a time.
#[async_trait]
pub trait Exec {
    /// Executes `command`, writing `stdin` to it before closing its input.
    ///
    /// A non-zero exit status is not an error at this level.
    async fn exec(&self, command: &str, stdin: &[u8]) -> Result<ExecOutput>;
}

/// Output of a command run by [`Exec`].
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_status: u32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// Stdout as text, untrimmed.
    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stderr as text, untrimmed.
    #[must_use]
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

impl fmt::Debug for ExecOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecOutput")
            .field("exit_status", &self.exit_status)
            .field("stdout", &self.stdout.as_bstr())
            .field("stderr", &self.stderr.as_bstr())
            .finish()
    }
}
