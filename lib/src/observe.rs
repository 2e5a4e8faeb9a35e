//! Read-only introspection of the host's account databases.
//!
//! Every query runs unelevated and is parsed strictly by field position. A
//! line with the wrong number of fields or a non-numeric id is a
//! [`Error::Parse`], never a silent default.

use std::collections::BTreeSet;

use tracing::debug;

use crate::action::ExecOutput;
use crate::action::Executor;
use crate::command;
use crate::error::ExecutionKind;
use crate::model::GroupRecord;
use crate::model::UserRecord;
use crate::model::SYSTEM_ID_CEILING;
use crate::Error;
use crate::Result;

/// `getent` exit status for "key not found".
const GETENT_NOT_FOUND: u32 = 2;

/// One line of `getent passwd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswdEntry {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub comment: String,
    pub home: String,
    pub shell: String,
}

impl PasswdEntry {
    /// Parses `name:passwd:uid:gid:gecos:home:shell`.
    ///
    /// # Errors
    ///
    /// [`Error::Parse`] on a wrong field count or a non-numeric id.
    pub fn parse(command: &str, line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split(':').collect();
        let [name, _passwd, uid, gid, gecos, home, shell] = fields[..] else {
            return Err(Error::parse(
                command,
                format!("expected 7 fields, got {} in {line:?}", fields.len()),
            ));
        };

        Ok(Self {
            name: name.to_owned(),
            uid: parse_id(command, "uid", uid)?,
            gid: parse_id(command, "gid", gid)?,
            comment: gecos.to_owned(),
            home: home.to_owned(),
            shell: shell.to_owned(),
        })
    }
}

/// One line of `getent group`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    pub gid: u32,
    pub members: Vec<String>,
}

impl GroupEntry {
    /// Parses `name:passwd:gid:member,member`.
    ///
    /// # Errors
    ///
    /// [`Error::Parse`] on a wrong field count or a non-numeric gid.
    pub fn parse(command: &str, line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split(':').collect();
        let [name, _passwd, gid, members] = fields[..] else {
            return Err(Error::parse(
                command,
                format!("expected 4 fields, got {} in {line:?}", fields.len()),
            ));
        };

        Ok(Self {
            name: name.to_owned(),
            gid: parse_id(command, "gid", gid)?,
            members: members
                .split(',')
                .filter(|member| !member.is_empty())
                .map(str::to_owned)
                .collect(),
        })
    }
}

/// Issues introspection queries through an [`Executor`].
#[derive(Clone)]
pub struct Observer {
    executor: Executor,
}

impl Observer {
    #[must_use]
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }

    /// Fully populated user record for `uid`, or `None` if there is no such
    /// user.
    ///
    /// # Errors
    ///
    /// If any of the underlying queries fails or returns malformed output.
    pub async fn user_by_id(&self, uid: u32) -> Result<Option<UserRecord>> {
        let Some(entry) = self.passwd_by_id(uid).await? else {
            return Ok(None);
        };
        self.complete_user(entry).await.map(Some)
    }

    /// Auxiliary lookup; reconciliation never resolves identity by name.
    ///
    /// # Errors
    ///
    /// If any of the underlying queries fails or returns malformed output.
    pub async fn user_by_name(&self, name: &str) -> Result<Option<UserRecord>> {
        let Some(entry) = self.passwd_by_name(name).await? else {
            return Ok(None);
        };
        self.complete_user(entry).await.map(Some)
    }

    /// # Errors
    ///
    /// If `getent` fails or prints a malformed line.
    pub async fn passwd_by_id(&self, uid: u32) -> Result<Option<PasswdEntry>> {
        self.passwd(&uid.to_string()).await
    }

    /// # Errors
    ///
    /// If `getent` fails or prints a malformed line.
    pub async fn passwd_by_name(&self, name: &str) -> Result<Option<PasswdEntry>> {
        self.passwd(name).await
    }

    /// Uid the host assigned to `name`.
    ///
    /// # Errors
    ///
    /// If `id` fails, which includes the user not existing.
    pub async fn uid_by_name(&self, name: &str) -> Result<Option<u32>> {
        let command = command::id_user(name);
        let output = self.executor.run(false, &command, "").await?;
        let stdout = output.stdout_lossy();
        let uid = stdout.trim();
        if uid.is_empty() {
            return Ok(None);
        }
        parse_id(&command, "uid", uid).map(Some)
    }

    /// Secondary group names of `name`.
    ///
    /// `id` lists the primary group first; it is dropped here since the
    /// primary group is carried as the record's gid.
    ///
    /// # Errors
    ///
    /// If `id` fails.
    pub async fn group_membership(&self, name: &str) -> Result<BTreeSet<String>> {
        let command = command::id_groups(name);
        let output = self.executor.run(false, &command, "").await?;
        Ok(output
            .stdout_lossy()
            .split_whitespace()
            .skip(1)
            .map(str::to_owned)
            .collect())
    }

    /// Primary gid of an already parsed user. No round trip.
    #[must_use]
    pub fn gid_for_user(entry: &PasswdEntry) -> u32 {
        entry.gid
    }

    /// # Errors
    ///
    /// If `getent` fails or prints a malformed line.
    pub async fn group_by_id(&self, gid: u32) -> Result<Option<GroupRecord>> {
        self.group(&gid.to_string()).await
    }

    /// # Errors
    ///
    /// If `getent` fails or prints a malformed line.
    pub async fn group_by_name(&self, name: &str) -> Result<Option<GroupRecord>> {
        self.group(name).await
    }

    /// Whether `path` is a directory on the host.
    ///
    /// # Errors
    ///
    /// If `test` exits with anything other than 0 or 1.
    pub async fn home_exists(&self, path: &str) -> Result<bool> {
        if path.is_empty() {
            return Ok(false);
        }
        let command = command::test_dir(path);
        let output = self.executor.run_unchecked(false, &command, "").await?;
        match output.exit_status {
            0 => Ok(true),
            1 => Ok(false),
            code => Err(execution_error(&command, code, &output)),
        }
    }

    async fn complete_user(&self, entry: PasswdEntry) -> Result<UserRecord> {
        let gid = Self::gid_for_user(&entry);
        let groups = self.group_membership(&entry.name).await?;
        let create_home = self.home_exists(&entry.home).await?;

        Ok(UserRecord {
            system: entry.uid < SYSTEM_ID_CEILING,
            name: entry.name,
            uid: entry.uid,
            gid,
            comment: entry.comment,
            home: entry.home,
            create_home,
            shell: entry.shell,
            groups,
        })
    }

    async fn passwd(&self, key: &str) -> Result<Option<PasswdEntry>> {
        let command = command::getent_passwd(key);
        let Some(line) = self.getent(&command).await? else {
            return Ok(None);
        };
        PasswdEntry::parse(&command, &line).map(Some)
    }

    async fn group(&self, key: &str) -> Result<Option<GroupRecord>> {
        let command = command::getent_group(key);
        let Some(line) = self.getent(&command).await? else {
            return Ok(None);
        };
        let entry = GroupEntry::parse(&command, &line)?;
        Ok(Some(GroupRecord {
            system: entry.gid < SYSTEM_ID_CEILING,
            name: entry.name,
            gid: entry.gid,
        }))
    }

    /// First line printed by a `getent` query, `None` when the key is unknown.
    async fn getent(&self, command: &str) -> Result<Option<String>> {
        let output = self.executor.run_unchecked(false, command, "").await?;
        let stdout = output.stdout_lossy();
        let line = stdout.lines().map(str::trim_end).find(|line| !line.is_empty());

        match (output.exit_status, line) {
            (0, Some(line)) => Ok(Some(line.to_owned())),
            (0 | GETENT_NOT_FOUND, None) => {
                debug!(%command, "no such entry");
                Ok(None)
            }
            (code, _) => Err(execution_error(command, code, &output)),
        }
    }
}

fn parse_id(command: &str, field: &str, value: &str) -> Result<u32> {
    value
        .parse()
        .map_err(|_| Error::parse(command, format!("{field} {value:?} is not numeric")))
}

fn execution_error(command: &str, code: u32, output: &ExecOutput) -> Error {
    Error::Execution {
        command: command.to_owned(),
        kind: ExecutionKind::ExitStatus(code),
        stderr: output.stderr_lossy(),
    }
}
