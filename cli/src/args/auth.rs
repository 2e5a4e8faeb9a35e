use anyhow::Context;
use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Args;
use rusr::config::KeySource;
use rusr::util::secret::SecureString;

const HEADING: Option<&str> = Some("Authentication Options");

/// Credentials offered to the remote host.
#[derive(Debug, Args, Clone)]
pub struct AuthArgs {
    /// Remote user to authenticate as.
    #[arg(short = 'u', long, default_value = "root", help_heading = HEADING, global = true)]
    pub user: String,

    /// Path to password file. When given, no key is offered.
    #[arg(long, help_heading = HEADING, global = true)]
    pub password_file: Option<Utf8PathBuf>,

    /// Path to SSH agent socket.
    #[arg(long, env = "SSH_AUTH_SOCK", help_heading = HEADING, global = true)]
    pub ssh_agent: Option<Utf8PathBuf>,

    /// Path to SSH private key. Defaults to ~/.ssh/id_rsa if it exists.
    #[arg(long, help_heading = HEADING, global = true)]
    pub ssh_key: Option<Utf8PathBuf>,
}

impl AuthArgs {
    /// Reads the password file, dropping one trailing newline.
    pub fn password(&self) -> Result<Option<SecureString>> {
        let Some(path) = &self.password_file else {
            return Ok(None);
        };
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read password file {path}"))?;
        let password = contents
            .strip_suffix('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .unwrap_or(&contents);
        Ok(Some(SecureString::from(password)))
    }

    pub fn key_source(&self) -> KeySource {
        KeySource::from(self.ssh_key.clone())
    }
}
