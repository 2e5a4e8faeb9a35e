use anyhow::Context;
use anyhow::Result;
use clap::Args;
use clap::Subcommand;
use rusr::model::GroupSpec;
use rusr::reconcile::Reconciler;
use rusr::util::id::EntityId;
use serde_json::json;

use super::print_json;
use super::Host;
use super::Run;

/// Manage groups
#[derive(Debug, Args)]
pub struct GroupArgs {
    #[command(subcommand)]
    command: GroupCommand,
}

#[derive(Debug, Subcommand)]
enum GroupCommand {
    /// Create a group and print its gid and record
    Create(GroupSpecArgs),

    /// Print the group with this gid, or `absent`
    Read { id: EntityId },

    /// Converge the group with this gid to the given state
    Update {
        id: EntityId,

        #[command(flatten)]
        spec: GroupSpecArgs,
    },

    /// Delete the group with this gid, if it still exists
    Delete { id: EntityId },
}

#[derive(Debug, Args)]
struct GroupSpecArgs {
    /// Group name.
    name: String,

    /// Pinned gid. A different gid on update is refused; delete and
    /// recreate the group instead.
    #[arg(long)]
    gid: Option<u32>,

    /// Create a system group.
    #[arg(long)]
    system: bool,
}

impl GroupSpecArgs {
    fn spec(&self) -> GroupSpec {
        GroupSpec::builder()
            .name(&self.name)
            .maybe_gid(self.gid)
            .system(self.system)
            .build()
    }
}

impl Run for GroupArgs {
    async fn run(&self, host: &Host) -> Result<()> {
        let groups = &host.groups;
        match &self.command {
            GroupCommand::Create(spec) => {
                let (id, record) = groups
                    .create(&spec.spec())
                    .await
                    .context("unable to create group")?;
                print_json(&json!({ "id": id, "record": record }))
            }
            GroupCommand::Read { id } => match groups.read(*id).await? {
                Some(record) => print_json(&json!(record)),
                None => {
                    println!("absent");
                    Ok(())
                }
            },
            GroupCommand::Update { id, spec } => {
                let record = groups
                    .update(*id, &spec.spec())
                    .await
                    .with_context(|| format!("unable to update group {id}"))?;
                print_json(&json!(record))
            }
            GroupCommand::Delete { id } => groups
                .delete(*id)
                .await
                .with_context(|| format!("unable to delete group {id}")),
        }
    }
}
