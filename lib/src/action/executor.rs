use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Exec;
use super::ExecOutput;
use super::Session;
use crate::error::ExecutionKind;
use crate::util::tokio::Deadline;
use crate::Error;
use crate::Result;

/// Prefix for elevated commands. `-n` makes sudo fail rather than prompt.
pub const ELEVATION_PREFIX: &str = "sudo -n";

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs single commands over a shared [`Exec`], elevating on request.
///
/// Cheap to clone; clones share the underlying session and cancellation.
#[derive(Clone)]
pub struct Executor {
    shell: Arc<dyn Exec + Send + Sync>,
    elevation: bool,
    command_timeout: Duration,
    cancel: CancellationToken,
}

impl Executor {
    /// `elevation` controls whether `elevate` requests are honoured at all.
    pub fn new(shell: Arc<dyn Exec + Send + Sync>, elevation: bool) -> Self {
        Self {
            shell,
            elevation,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }

    /// Executor over an SSH session, honouring its elevation flag.
    #[must_use]
    pub fn for_session(session: Arc<Session>) -> Self {
        let elevation = session.elevation_enabled();
        Self::new(session, elevation)
    }

    #[must_use]
    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    /// Token that aborts in-flight and future commands when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Returns an executor whose commands are cancelled once `duration` has
    /// elapsed, along with the guard keeping that deadline armed.
    #[must_use]
    pub fn with_deadline(&self, duration: Duration) -> (Self, Deadline) {
        let deadline = Deadline::spawn(&self.cancel, duration);
        let executor = Self {
            cancel: deadline.token().clone(),
            ..self.clone()
        };
        (executor, deadline)
    }

    /// Like [`Executor::with_deadline`], but a `None` timeout leaves the
    /// executor unbounded.
    #[must_use]
    pub fn scoped(&self, timeout: Option<Duration>) -> (Self, Option<Deadline>) {
        match timeout {
            Some(duration) => {
                let (executor, deadline) = self.with_deadline(duration);
                (executor, Some(deadline))
            }
            None => (self.clone(), None),
        }
    }

    /// Command line actually sent to the host.
    #[must_use]
    pub fn command_line(&self, elevate: bool, command: &str) -> String {
        if elevate && self.elevation {
            format!("{ELEVATION_PREFIX} {command}")
        } else {
            command.to_owned()
        }
    }

    /// Runs one command and requires it to exit zero.
    ///
    /// # Errors
    ///
    /// [`Error::Execution`] carrying the command line, stderr and exit
    /// status, or the timeout/cancellation that stopped it.
    pub async fn run(&self, elevate: bool, command: &str, stdin: &str) -> Result<ExecOutput> {
        let output = self.run_unchecked(elevate, command, stdin).await?;
        if output.success() {
            return Ok(output);
        }
        Err(Error::Execution {
            command: self.command_line(elevate, command),
            kind: ExecutionKind::ExitStatus(output.exit_status),
            stderr: output.stderr_lossy(),
        })
    }

    /// Runs one command and returns its output whatever its exit status.
    ///
    /// # Errors
    ///
    /// [`Error::Execution`] if the command could not be run to completion.
    pub async fn run_unchecked(
        &self,
        elevate: bool,
        command: &str,
        stdin: &str,
    ) -> Result<ExecOutput> {
        let line = self.command_line(elevate, command);
        let failed = |kind| Error::Execution {
            command: line.clone(),
            kind,
            stderr: String::new(),
        };

        if self.cancel.is_cancelled() {
            return Err(failed(ExecutionKind::Cancelled));
        }

        debug!(command = %line, elevate, "running remote command");

        let exec = self.shell.exec(&line, stdin.as_bytes());
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(failed(ExecutionKind::Cancelled)),
            result = tokio::time::timeout(self.command_timeout, exec) => match result {
                Ok(output) => output,
                Err(_elapsed) => Err(failed(ExecutionKind::Timeout)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Answers every command with a fixed output after an optional delay.
    struct Canned {
        output: ExecOutput,
        delay: Duration,
        seen: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl Canned {
        fn new(exit_status: u32, stdout: &str, stderr: &str) -> Arc<Self> {
            Arc::new(Self {
                output: ExecOutput {
                    exit_status,
                    stdout: stdout.as_bytes().to_vec(),
                    stderr: stderr.as_bytes().to_vec(),
                },
                delay: Duration::ZERO,
                seen: Mutex::default(),
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                output: ExecOutput::default(),
                delay,
                seen: Mutex::default(),
            })
        }
    }

    #[async_trait]
    impl Exec for Canned {
        async fn exec(&self, command: &str, stdin: &[u8]) -> Result<ExecOutput> {
            self.seen
                .lock()
                .unwrap()
                .push((command.to_owned(), stdin.to_vec()));
            tokio::time::sleep(self.delay).await;
            Ok(self.output.clone())
        }
    }

    #[tokio::test]
    async fn elevates_only_when_enabled() {
        let shell = Canned::new(0, "", "");

        let executor = Executor::new(shell.clone(), true);
        executor.run(true, "/usr/sbin/userdel bob", "").await.unwrap();
        executor.run(false, "getent passwd bob", "").await.unwrap();

        let executor = Executor::new(shell.clone(), false);
        executor.run(true, "/usr/sbin/userdel bob", "").await.unwrap();

        let seen: Vec<_> = shell.seen.lock().unwrap().iter().map(|(c, _)| c.clone()).collect();
        assert_eq!(
            seen,
            [
                "sudo -n /usr/sbin/userdel bob",
                "getent passwd bob",
                "/usr/sbin/userdel bob",
            ]
        );
    }

    #[tokio::test]
    async fn passes_stdin_and_keeps_output_untrimmed() {
        let shell = Canned::new(0, "  bob:x:1000:1000::/home/bob:/bin/bash\n", "");
        let executor = Executor::new(shell.clone(), true);

        let output = executor.run(false, "cat", "payload\n").await.unwrap();

        assert_eq!(output.stdout_lossy(), "  bob:x:1000:1000::/home/bob:/bin/bash\n");
        assert_eq!(shell.seen.lock().unwrap()[0].1, b"payload\n");
    }

    #[tokio::test]
    async fn failed_elevation_is_an_execution_error() {
        let shell = Canned::new(1, "", "sudo: a password is required\n");
        let executor = Executor::new(shell, true);

        let error = executor
            .run(true, "/usr/sbin/useradd bob", "")
            .await
            .unwrap_err();

        match error {
            Error::Execution {
                command,
                kind,
                stderr,
            } => {
                assert_eq!(command, "sudo -n /usr/sbin/useradd bob");
                assert_eq!(kind, ExecutionKind::ExitStatus(1));
                assert_eq!(stderr, "sudo: a password is required\n");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unchecked_run_tolerates_non_zero_exit() {
        let shell = Canned::new(2, "", "");
        let executor = Executor::new(shell, true);
        let output = executor.run_unchecked(false, "getent passwd 4242", "").await.unwrap();
        assert_eq!(output.exit_status, 2);
    }

    #[tokio::test]
    async fn command_timeout() {
        let executor = Executor::new(Canned::slow(Duration::from_secs(30)), true)
            .with_command_timeout(Duration::from_millis(20));
        let error = executor.run(false, "sleep 30", "").await.unwrap_err();
        assert!(matches!(error, Error::Execution { kind: ExecutionKind::Timeout, .. }));
    }

    #[tokio::test]
    async fn operation_deadline_cancels_in_flight_command() {
        let executor = Executor::new(Canned::slow(Duration::from_secs(30)), true);
        let (scoped, _deadline) = executor.with_deadline(Duration::from_millis(20));

        let error = scoped.run(false, "sleep 30", "").await.unwrap_err();
        assert!(matches!(error, Error::Execution { kind: ExecutionKind::Cancelled, ref command, .. } if command == "sleep 30"));

        // The parent executor is unaffected.
        assert!(!executor.cancellation_token().is_cancelled());
    }

    #[tokio::test]
    async fn unscoped_executor_has_no_deadline() {
        let executor = Executor::new(Canned::new(0, "", ""), true);
        let (scoped, deadline) = executor.scoped(None);
        assert!(deadline.is_none());
        scoped.run(false, "true", "").await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_executor_runs_nothing() {
        let shell = Canned::new(0, "", "");
        let executor = Executor::new(shell.clone(), true);
        executor.cancellation_token().cancel();

        let error = executor.run(false, "true", "").await.unwrap_err();
        assert!(matches!(error, Error::Execution { kind: ExecutionKind::Cancelled, .. }));
        assert!(shell.seen.lock().unwrap().is_empty());
    }
}
