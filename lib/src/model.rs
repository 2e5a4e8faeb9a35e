//! Desired-state specs handed in by the orchestrator and the records observed
//! on the host.

use std::collections::BTreeSet;

use bon::Builder;
use serde::Deserialize;
use serde::Serialize;

pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Ids below this are allocated to system accounts (`SYS_UID_MAX` + 1 in a
/// stock `login.defs`).
pub const SYSTEM_ID_CEILING: u32 = 1000;

// User -----------------------------------------------------------------------

/// Desired state of a user account.
///
/// `uid` and `gid` of `None` (or `0`) mean "let the host pick".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
pub struct UserSpec {
    #[builder(into)]
    pub name: String,

    #[serde(default)]
    pub uid: Option<u32>,

    #[serde(default)]
    pub gid: Option<u32>,

    #[serde(default)]
    #[builder(into, default)]
    pub comment: String,

    /// Empty means `/home/<name>` at creation and "unmanaged" afterwards.
    #[serde(default)]
    #[builder(into, default)]
    pub home: String,

    #[serde(default = "default_true")]
    #[builder(default = true)]
    pub create_home: bool,

    #[serde(default = "default_shell")]
    #[builder(into, default = DEFAULT_SHELL.to_owned())]
    pub shell: String,

    /// Secondary groups. Empty leaves membership unmanaged.
    #[serde(default)]
    #[builder(default)]
    pub groups: BTreeSet<String>,

    #[serde(default)]
    #[builder(default)]
    pub system: bool,
}

impl UserSpec {
    #[must_use]
    pub fn pinned_uid(&self) -> Option<u32> {
        pinned(self.uid)
    }

    #[must_use]
    pub fn pinned_gid(&self) -> Option<u32> {
        pinned(self.gid)
    }

    /// Home directory passed to `useradd`.
    #[must_use]
    pub fn home_dir(&self) -> String {
        if self.home.is_empty() {
            format!("/home/{}", self.name)
        } else {
            self.home.clone()
        }
    }

    /// Whether reaching this spec from `observed` needs delete-then-create.
    ///
    /// The uid is the stable identifier, so a pinned uid that differs from
    /// the observed one can never be applied in place.
    #[must_use]
    pub fn requires_replacement(&self, observed: &UserRecord) -> bool {
        self.pinned_uid().is_some_and(|uid| uid != observed.uid)
    }
}

/// A user account as observed on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub comment: String,
    pub home: String,
    pub create_home: bool,
    pub shell: String,
    pub groups: BTreeSet<String>,
    pub system: bool,
}

// Group ----------------------------------------------------------------------

/// Desired state of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
pub struct GroupSpec {
    #[builder(into)]
    pub name: String,

    #[serde(default)]
    pub gid: Option<u32>,

    #[serde(default)]
    #[builder(default)]
    pub system: bool,
}

impl GroupSpec {
    #[must_use]
    pub fn pinned_gid(&self) -> Option<u32> {
        pinned(self.gid)
    }

    /// Whether reaching this spec from `observed` needs delete-then-create.
    ///
    /// The gid is the group's stable identifier, so it never moves in place.
    #[must_use]
    pub fn requires_replacement(&self, observed: &GroupRecord) -> bool {
        self.pinned_gid().is_some_and(|gid| gid != observed.gid)
    }
}

/// A group as observed on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub name: String,
    pub gid: u32,
    pub system: bool,
}

// Helpers --------------------------------------------------------------------

fn pinned(id: Option<u32>) -> Option<u32> {
    id.filter(|&id| id > 0)
}

fn default_true() -> bool {
    true
}

fn default_shell() -> String {
    DEFAULT_SHELL.to_owned()
}
