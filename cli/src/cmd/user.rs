use anyhow::Context;
use anyhow::Result;
use clap::Args;
use clap::Subcommand;
use rusr::model::UserSpec;
use rusr::model::DEFAULT_SHELL;
use rusr::reconcile::Reconciler;
use rusr::util::id::EntityId;
use serde_json::json;

use super::print_json;
use super::Host;
use super::Run;

/// Manage user accounts
#[derive(Debug, Args)]
pub struct UserArgs {
    #[command(subcommand)]
    command: UserCommand,
}

#[derive(Debug, Subcommand)]
enum UserCommand {
    /// Create a user and print its uid and record
    Create(UserSpecArgs),

    /// Print the user with this uid, or `absent`
    Read { id: EntityId },

    /// Converge the user with this uid to the given state
    Update {
        id: EntityId,

        #[command(flatten)]
        spec: UserSpecArgs,
    },

    /// Delete the user with this uid, if it still exists
    Delete { id: EntityId },
}

/// Desired state of a user.
#[derive(Debug, Args)]
struct UserSpecArgs {
    /// Login name.
    name: String,

    /// Pinned uid. Assigned by the host if unset.
    #[arg(long)]
    uid: Option<u32>,

    /// Pinned primary gid. Assigned by the host if unset.
    #[arg(long)]
    gid: Option<u32>,

    /// GECOS comment.
    #[arg(long, default_value = "")]
    comment: String,

    /// Home directory. Defaults to /home/<name> and is unmanaged after
    /// creation when unset.
    #[arg(long, default_value = "")]
    home: String,

    /// Do not create the home directory.
    #[arg(long)]
    no_create_home: bool,

    /// Login shell.
    #[arg(long, default_value = DEFAULT_SHELL)]
    shell: String,

    /// Secondary groups, comma separated. Unmanaged when empty.
    #[arg(long, value_delimiter = ',')]
    groups: Vec<String>,

    /// Create a system account.
    #[arg(long)]
    system: bool,
}

impl UserSpecArgs {
    fn spec(&self) -> UserSpec {
        UserSpec::builder()
            .name(&self.name)
            .maybe_uid(self.uid)
            .maybe_gid(self.gid)
            .comment(&self.comment)
            .home(&self.home)
            .create_home(!self.no_create_home)
            .shell(&self.shell)
            .groups(self.groups.iter().cloned().collect())
            .system(self.system)
            .build()
    }
}

impl Run for UserArgs {
    async fn run(&self, host: &Host) -> Result<()> {
        let users = &host.users;
        match &self.command {
            UserCommand::Create(spec) => {
                let (id, record) = users
                    .create(&spec.spec())
                    .await
                    .context("unable to create user")?;
                print_json(&json!({ "id": id, "record": record }))
            }
            UserCommand::Read { id } => match users.read(*id).await? {
                Some(record) => print_json(&json!(record)),
                None => {
                    println!("absent");
                    Ok(())
                }
            },
            UserCommand::Update { id, spec } => {
                let record = users
                    .update(*id, &spec.spec())
                    .await
                    .with_context(|| format!("unable to update user {id}"))?;
                print_json(&json!(record))
            }
            UserCommand::Delete { id } => users
                .delete(*id)
                .await
                .with_context(|| format!("unable to delete user {id}")),
        }
    }
}
