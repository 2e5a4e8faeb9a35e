//! In-memory host that speaks the account tool command surface.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::MutexGuard;

use async_trait::async_trait;

use crate::action::Exec;
use crate::action::ExecOutput;
use crate::command;
use crate::Result;

const SUDO: &str = "sudo -n ";

#[derive(Debug, Clone)]
struct User {
    name: String,
    gid: u32,
    gecos: String,
    home: String,
    shell: String,
    groups: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct State {
    users: BTreeMap<u32, User>,
    groups: BTreeMap<u32, String>,
    dirs: BTreeSet<String>,
    log: Vec<String>,
    deny_elevation: bool,
}

/// Fake Linux host for reconciler tests.
///
/// Mutating tools only succeed when elevated, unknown keys make `getent` exit
/// 2, and ids are allocated the way a stock `login.defs` would.
#[derive(Debug, Default)]
pub struct FakeHost {
    state: Mutex<State>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every elevated command fail as `sudo -n` would without a
    /// NOPASSWD rule.
    pub fn deny_elevation(&self) {
        self.state().deny_elevation = true;
    }

    pub fn add_group(&self, name: &str, gid: u32) {
        self.state().groups.insert(gid, name.to_owned());
    }

    /// Adds a user with a private group of the same id and an existing home.
    pub fn add_user(&self, name: &str, uid: u32, home: &str, groups: &[&str]) {
        let mut state = self.state();
        state.groups.insert(uid, name.to_owned());
        state.dirs.insert(home.to_owned());
        state.users.insert(
            uid,
            User {
                name: name.to_owned(),
                gid: uid,
                gecos: String::new(),
                home: home.to_owned(),
                shell: "/bin/bash".to_owned(),
                groups: groups.iter().map(|&group| group.to_owned()).collect(),
            },
        );
    }

    /// Every command received, in order, as sent.
    pub fn commands(&self) -> Vec<String> {
        self.state().log.clone()
    }

    /// Commands that invoked one of the account modification tools.
    pub fn mutations(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|line| line.trim_start_matches(SUDO).starts_with("/usr/sbin/"))
            .collect()
    }

    pub fn clear_log(&self) {
        self.state().log.clear();
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl Exec for FakeHost {
    async fn exec(&self, line: &str, _stdin: &[u8]) -> Result<ExecOutput> {
        let mut state = self.state();
        state.log.push(line.to_owned());

        let (elevated, line) = match line.strip_prefix(SUDO) {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        if elevated && state.deny_elevation {
            return Ok(fail(1, "sudo: a password is required"));
        }

        let Ok(argv) = shell_words::split(line) else {
            return Ok(fail(2, "sh: syntax error"));
        };
        let Some((program, args)) = argv.split_first() else {
            return Ok(ok(""));
        };
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        if program.starts_with("/usr/sbin/") && !elevated {
            let tool = program.trim_start_matches("/usr/sbin/");
            return Ok(fail(1, &format!("{tool}: Permission denied.")));
        }

        Ok(match program.as_str() {
            command::USERADD => state.useradd(&args),
            command::USERMOD => state.usermod(&args),
            command::USERDEL => state.userdel(&args),
            command::GROUPADD => state.groupadd(&args),
            command::GROUPMOD => state.groupmod(&args),
            command::GROUPDEL => state.groupdel(&args),
            "getent" => state.getent(&args),
            "id" => state.id(&args),
            "test" => state.test(&args),
            other => fail(127, &format!("sh: {other}: command not found")),
        })
    }
}

impl State {
    fn uid_of(&self, name: &str) -> Option<u32> {
        self.users
            .iter()
            .find_map(|(&uid, user)| (user.name == name).then_some(uid))
    }

    fn gid_of(&self, name: &str) -> Option<u32> {
        self.groups
            .iter()
            .find_map(|(&gid, group)| (group == name).then_some(gid))
    }

    fn unknown_group<'a>(&self, groups: &'a BTreeSet<String>) -> Option<&'a String> {
        groups.iter().find(|group| self.gid_of(group).is_none())
    }

    /// Lowest free id at or above 1000, or highest free id below 1000 for
    /// system accounts.
    fn allocate(taken: impl Fn(u32) -> bool, system: bool) -> u32 {
        if system {
            (100..1000).rev().find(|&id| !taken(id)).unwrap_or(0)
        } else {
            (1000..).find(|&id| !taken(id)).unwrap_or(0)
        }
    }

    fn useradd(&mut self, args: &[&str]) -> ExecOutput {
        let mut flags = Flags::parse(args);
        let Some(name) = flags.subject.take() else {
            return fail(2, "Usage: useradd [options] LOGIN");
        };
        if self.uid_of(&name).is_some() {
            return fail(9, &format!("useradd: user '{name}' already exists"));
        }
        let system = flags.switch("--system");

        let uid = match flags.number("--uid") {
            Some(uid) if self.users.contains_key(&uid) => {
                return fail(4, &format!("useradd: UID {uid} is not unique"));
            }
            Some(uid) => uid,
            None => Self::allocate(|id| self.users.contains_key(&id), system),
        };

        let gid = match flags.number("--gid") {
            Some(gid) if !self.groups.contains_key(&gid) => {
                return fail(6, &format!("useradd: group '{gid}' does not exist"));
            }
            Some(gid) => gid,
            None if self.gid_of(&name).is_some() => {
                return fail(
                    9,
                    &format!("useradd: group {name} exists - if you want to add this user to that group, use -g."),
                );
            }
            None if !self.groups.contains_key(&uid) => uid,
            None => Self::allocate(|id| self.groups.contains_key(&id), system),
        };

        let groups = flags.list("--groups");
        if let Some(group) = self.unknown_group(&groups) {
            return fail(6, &format!("useradd: group '{group}' does not exist"));
        }

        if flags.number("--gid").is_none() {
            self.groups.insert(gid, name.clone());
        }
        let home = flags.value("--home-dir").unwrap_or_else(|| format!("/home/{name}"));
        if flags.switch("--create-home") {
            self.dirs.insert(home.clone());
        }
        self.users.insert(
            uid,
            User {
                name,
                gid,
                gecos: flags.value("--comment").unwrap_or_default(),
                home,
                shell: flags.value("--shell").unwrap_or_else(|| "/bin/sh".to_owned()),
                groups,
            },
        );
        ok("")
    }

    fn usermod(&mut self, args: &[&str]) -> ExecOutput {
        let mut flags = Flags::parse(args);
        let Some(subject) = flags.subject.take() else {
            return fail(2, "Usage: usermod [options] LOGIN");
        };
        let Some(uid) = self.uid_of(&subject) else {
            return fail(6, &format!("usermod: user '{subject}' does not exist"));
        };

        if let Some(login) = flags.value("--login") {
            if login != subject && self.uid_of(&login).is_some() {
                return fail(9, &format!("usermod: user '{login}' already exists"));
            }
        }
        if let Some(gid) = flags.number("--gid") {
            if !self.groups.contains_key(&gid) {
                return fail(6, &format!("usermod: group '{gid}' does not exist"));
            }
        }
        let groups = flags.value("--groups").map(|_| flags.list("--groups"));
        if let Some(group) = groups.as_ref().and_then(|groups| self.unknown_group(groups)) {
            return fail(6, &format!("usermod: group '{group}' does not exist"));
        }

        let moved = flags.value("--home");
        let user = self.users.get_mut(&uid).map(|user| {
            if let Some(login) = flags.value("--login") {
                user.name = login;
            }
            if let Some(gid) = flags.number("--gid") {
                user.gid = gid;
            }
            if let Some(shell) = flags.value("--shell") {
                user.shell = shell;
            }
            if let Some(comment) = flags.value("--comment") {
                user.gecos = comment;
            }
            if let Some(groups) = groups {
                user.groups = groups;
            }
            let old_home = user.home.clone();
            if let Some(home) = moved.clone() {
                user.home = home;
            }
            old_home
        });

        if let (Some(old_home), Some(home)) = (user, moved) {
            if flags.switch("--move-home") && self.dirs.remove(&old_home) {
                self.dirs.insert(home);
            }
        }
        ok("")
    }

    fn userdel(&mut self, args: &[&str]) -> ExecOutput {
        let Some(&name) = args.last() else {
            return fail(2, "Usage: userdel [options] LOGIN");
        };
        let Some(uid) = self.uid_of(name) else {
            return fail(6, &format!("userdel: user '{name}' does not exist"));
        };
        if let Some(user) = self.users.remove(&uid) {
            // USERGROUPS_ENAB removes the private group along with the user.
            let private = self.groups.get(&user.gid).is_some_and(|group| *group == user.name);
            let used = self.users.values().any(|other| other.gid == user.gid);
            if private && !used {
                self.groups.remove(&user.gid);
            }
        }
        ok("")
    }

    fn groupadd(&mut self, args: &[&str]) -> ExecOutput {
        let mut flags = Flags::parse(args);
        let Some(name) = flags.subject.take() else {
            return fail(2, "Usage: groupadd [options] GROUP");
        };
        if self.gid_of(&name).is_some() {
            return fail(9, &format!("groupadd: group '{name}' already exists"));
        }
        let gid = match flags.number("--gid") {
            Some(gid) if self.groups.contains_key(&gid) => {
                return fail(4, &format!("groupadd: GID '{gid}' already exists"));
            }
            Some(gid) => gid,
            None => Self::allocate(|id| self.groups.contains_key(&id), flags.switch("--system")),
        };
        self.groups.insert(gid, name);
        ok("")
    }

    fn groupmod(&mut self, args: &[&str]) -> ExecOutput {
        let mut flags = Flags::parse(args);
        let Some(subject) = flags.subject.take() else {
            return fail(2, "Usage: groupmod [options] GROUP");
        };
        let Some(gid) = self.gid_of(&subject) else {
            return fail(6, &format!("groupmod: group '{subject}' does not exist"));
        };

        if let Some(new_name) = flags.value("--new-name") {
            if new_name != subject && self.gid_of(&new_name).is_some() {
                return fail(9, &format!("groupmod: {new_name} is not a unique name"));
            }
            for user in self.users.values_mut() {
                if user.groups.remove(&subject) {
                    user.groups.insert(new_name.clone());
                }
            }
            self.groups.insert(gid, new_name);
        }
        ok("")
    }

    fn groupdel(&mut self, args: &[&str]) -> ExecOutput {
        let Some(&name) = args.last() else {
            return fail(2, "Usage: groupdel [options] GROUP");
        };
        let Some(gid) = self.gid_of(name) else {
            return fail(6, &format!("groupdel: group '{name}' does not exist"));
        };
        if let Some(user) = self.users.values().find(|user| user.gid == gid) {
            return fail(
                8,
                &format!("groupdel: cannot remove the primary group of user '{}'", user.name),
            );
        }
        self.groups.remove(&gid);
        for user in self.users.values_mut() {
            user.groups.remove(name);
        }
        ok("")
    }

    fn getent(&self, args: &[&str]) -> ExecOutput {
        let [database, key] = args[..] else {
            return fail(1, "Unknown database or key");
        };
        let by_id = key.parse::<u32>().ok();

        match database {
            "passwd" => {
                let found = match by_id {
                    Some(uid) => self.users.get_key_value(&uid),
                    None => self.users.iter().find(|(_, user)| user.name == key),
                };
                match found {
                    Some((uid, user)) => ok(&format!(
                        "{}:x:{uid}:{}:{}:{}:{}\n",
                        user.name, user.gid, user.gecos, user.home, user.shell
                    )),
                    None => fail(2, ""),
                }
            }
            "group" => {
                let found = match by_id {
                    Some(gid) => self.groups.get_key_value(&gid),
                    None => self.groups.iter().find(|(_, group)| *group == key),
                };
                match found {
                    Some((gid, group)) => {
                        let members: Vec<&str> = self
                            .users
                            .values()
                            .filter(|user| user.groups.contains(group))
                            .map(|user| user.name.as_str())
                            .collect();
                        ok(&format!("{group}:x:{gid}:{}\n", members.join(",")))
                    }
                    None => fail(2, ""),
                }
            }
            _ => fail(1, "Unknown database"),
        }
    }

    fn id(&self, args: &[&str]) -> ExecOutput {
        let Some(&name) = args.last() else {
            return fail(1, "id: missing operand");
        };
        let Some(uid) = self.uid_of(name) else {
            return fail(1, &format!("id: '{name}': no such user"));
        };
        let Some(user) = self.users.get(&uid) else {
            return fail(1, &format!("id: '{name}': no such user"));
        };

        match args {
            ["--user", _] => ok(&format!("{uid}\n")),
            ["--name", "--groups", _] => {
                let primary = self
                    .groups
                    .get(&user.gid)
                    .cloned()
                    .unwrap_or_else(|| user.gid.to_string());
                let secondary = user.groups.iter().filter(|group| **group != primary);
                let names: Vec<&str> = std::iter::once(primary.as_str())
                    .chain(secondary.map(String::as_str))
                    .collect();
                ok(&format!("{}\n", names.join(" ")))
            }
            _ => fail(1, "id: unsupported options"),
        }
    }

    fn test(&self, args: &[&str]) -> ExecOutput {
        match args {
            ["-d", path] if self.dirs.contains(*path) => ok(""),
            _ => fail(1, ""),
        }
    }
}

/// Options of an account tool invocation; the final word is the subject.
struct Flags {
    options: Vec<(String, Option<String>)>,
    subject: Option<String>,
}

impl Flags {
    const SWITCHES: [&'static str; 3] = ["--create-home", "--system", "--move-home"];

    fn parse(args: &[&str]) -> Self {
        let mut options = Vec::new();
        let mut subject = None;
        let mut args = args.iter();
        while let Some(&arg) = args.next() {
            if Self::SWITCHES.iter().any(|&switch| switch == arg) {
                options.push((arg.to_owned(), None));
            } else if arg.starts_with("--") {
                options.push((arg.to_owned(), args.next().map(|&value| value.to_owned())));
            } else {
                subject = Some(arg.to_owned());
            }
        }
        Self { options, subject }
    }

    fn switch(&self, name: &str) -> bool {
        self.options.iter().any(|(option, _)| option == name)
    }

    fn value(&self, name: &str) -> Option<String> {
        self.options
            .iter()
            .find(|(option, _)| option == name)
            .and_then(|(_, value)| value.clone())
    }

    fn number(&self, name: &str) -> Option<u32> {
        self.value(name).and_then(|value| value.parse().ok())
    }

    fn list(&self, name: &str) -> BTreeSet<String> {
        self.value(name)
            .map(|value| {
                value
                    .split(',')
                    .filter(|item| !item.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn ok(stdout: &str) -> ExecOutput {
    ExecOutput {
        exit_status: 0,
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

fn fail(exit_status: u32, stderr: &str) -> ExecOutput {
    ExecOutput {
        exit_status,
        stdout: Vec::new(),
        stderr: if stderr.is_empty() {
            Vec::new()
        } else {
            format!("{stderr}\n").into_bytes()
        },
    }
}
