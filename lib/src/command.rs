//! Command lines for the remote account tools.
//!
//! Flag spellings and output formats of these tools are a compatibility
//! contract with the host, so every command string is built here and nowhere
//! else. Values that may contain shell metacharacters are quoted for a POSIX
//! shell.

use std::collections::BTreeSet;

use shell_words::quote;

use crate::model::GroupSpec;
use crate::model::UserSpec;

pub const USERADD: &str = "/usr/sbin/useradd";
pub const USERMOD: &str = "/usr/sbin/usermod";
pub const USERDEL: &str = "/usr/sbin/userdel";
pub const GROUPADD: &str = "/usr/sbin/groupadd";
pub const GROUPMOD: &str = "/usr/sbin/groupmod";
pub const GROUPDEL: &str = "/usr/sbin/groupdel";

// Introspection --------------------------------------------------------------

/// `getent passwd` keyed by uid or name.
#[must_use]
pub fn getent_passwd(key: &str) -> String {
    format!("getent passwd {}", quote(key))
}

/// `getent group` keyed by gid or name.
#[must_use]
pub fn getent_group(key: &str) -> String {
    format!("getent group {}", quote(key))
}

#[must_use]
pub fn id_user(name: &str) -> String {
    format!("id --user {}", quote(name))
}

#[must_use]
pub fn id_groups(name: &str) -> String {
    format!("id --name --groups {}", quote(name))
}

#[must_use]
pub fn test_dir(path: &str) -> String {
    format!("test -d {}", quote(path))
}

// Users ----------------------------------------------------------------------

/// Single `useradd` invocation carrying every settable attribute.
#[must_use]
pub fn useradd(spec: &UserSpec) -> String {
    let mut command = format!("{USERADD} --home-dir {}", quote(&spec.home_dir()));
    if spec.create_home {
        command.push_str(" --create-home");
    }
    if !spec.comment.is_empty() {
        command.push_str(&format!(" --comment {}", quote(&spec.comment)));
    }
    if !spec.shell.is_empty() {
        command.push_str(&format!(" --shell {}", quote(&spec.shell)));
    }
    if let Some(uid) = spec.pinned_uid() {
        command.push_str(&format!(" --uid {uid}"));
    }
    if let Some(gid) = spec.pinned_gid() {
        command.push_str(&format!(" --gid {gid}"));
    }
    if !spec.groups.is_empty() {
        command.push_str(&format!(" --groups {}", quote(&join_groups(&spec.groups))));
    }
    if spec.system {
        command.push_str(" --system");
    }
    command.push_str(&format!(" {}", quote(&spec.name)));
    command
}

#[must_use]
pub fn userdel(name: &str) -> String {
    format!("{USERDEL} {}", quote(name))
}

/// One field of a user that `usermod` can change.
#[derive(Debug, Clone, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum UserChange {
    Name(String),
    Gid(u32),
    Home(String),
    Shell(String),
    Comment(String),
    /// Replaces the full secondary group list.
    Groups(BTreeSet<String>),
}

impl UserChange {
    /// `usermod` carrying only this change, addressed to `subject`.
    #[must_use]
    pub fn command(&self, subject: &str) -> String {
        let flag = match self {
            UserChange::Name(name) => format!("--login {}", quote(name)),
            UserChange::Gid(gid) => format!("--gid {gid}"),
            UserChange::Home(home) => format!("--move-home --home {}", quote(home)),
            UserChange::Shell(shell) => format!("--shell {}", quote(shell)),
            UserChange::Comment(comment) => format!("--comment {}", quote(comment)),
            UserChange::Groups(groups) => format!("--groups {}", quote(&join_groups(groups))),
        };
        format!("{USERMOD} {flag} {}", quote(subject))
    }
}

// Groups ---------------------------------------------------------------------

#[must_use]
pub fn groupadd(spec: &GroupSpec) -> String {
    let mut command = GROUPADD.to_owned();
    if let Some(gid) = spec.pinned_gid() {
        command.push_str(&format!(" --gid {gid}"));
    }
    if spec.system {
        command.push_str(" --system");
    }
    command.push_str(&format!(" {}", quote(&spec.name)));
    command
}

#[must_use]
pub fn groupdel(name: &str) -> String {
    format!("{GROUPDEL} {}", quote(name))
}

/// One field of a group that `groupmod` changes in place. The gid is the
/// group's identity and is never among them.
#[derive(Debug, Clone, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum GroupChange {
    Name(String),
}

impl GroupChange {
    #[must_use]
    pub fn command(&self, subject: &str) -> String {
        let GroupChange::Name(name) = self;
        format!("{GROUPMOD} --new-name {} {}", quote(name), quote(subject))
    }
}

fn join_groups(groups: &BTreeSet<String>) -> String {
    groups.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}
