mod group;
mod user;

use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use enum_dispatch::enum_dispatch;
use rusr::action::Executor;
use rusr::action::Session;
use rusr::reconcile::GroupReconciler;
use rusr::reconcile::UserReconciler;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use crate::args::AuthArgs;
use crate::args::ConnectionArgs;
use crate::args::GlobalArgs;

/// Converge users and groups on a remote host over SSH
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    #[clap(flatten)]
    global_args: GlobalArgs,

    #[clap(flatten)]
    connection_args: ConnectionArgs,

    #[clap(flatten)]
    auth_args: AuthArgs,
}

/// Reconcilers bound to the connected host.
pub struct Host {
    pub users: UserReconciler,
    pub groups: GroupReconciler,
}

/// Subcommands must implement [`Run`] to be executed at runtime.
#[enum_dispatch]
pub trait Run {
    async fn run(&self, host: &Host) -> Result<()>;
}

#[enum_dispatch(Run)]
#[derive(Debug, Subcommand)]
enum Command {
    User(user::UserArgs),
    Group(group::GroupArgs),
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.connection_args.config(&cli.auth_args)?;
    let _guard = cli.global_args.init_tracing(&config.host)?;

    let session = Session::connect(&config)
        .await
        .with_context(|| format!("unable to connect to {}", config.addr()))?;
    let session = Arc::new(session);

    let executor =
        Executor::for_session(Arc::clone(&session)).with_command_timeout(config.command_timeout);
    let host = Host {
        users: UserReconciler::new(executor.clone())
            .with_operation_timeout(config.operation_timeout),
        groups: GroupReconciler::new(executor.clone())
            .with_operation_timeout(config.operation_timeout),
    };

    let cancel = executor.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling in-flight command");
            cancel.cancel();
        }
    });

    let result = cli.command.run(&host).await;

    if let Err(error) = session.close().await {
        debug!(?error, "unable to close session");
    }

    result
}

/// Prints a value as pretty JSON on stdout.
fn print_json(value: &Value) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("unable to render output")?;
    println!("{rendered}");
    Ok(())
}
