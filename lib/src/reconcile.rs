//! Diff desired state against what the host reports and converge it.

pub mod group;
pub mod user;

use async_trait::async_trait;
use tracing::info;

pub use self::group::GroupReconciler;
pub use self::user::UserReconciler;
use crate::action::Executor;
use crate::command::GroupChange;
use crate::command::UserChange;
use crate::util::id::EntityId;
use crate::Result;

/// Lifecycle contract offered to the orchestrator, keyed by stable id.
#[async_trait]
pub trait Reconciler {
    type Spec: Send + Sync;
    type Record: Send;

    /// Creates the entity and adopts the id the host assigned.
    async fn create(&self, desired: &Self::Spec) -> Result<(EntityId, Self::Record)>;

    /// `None` means the entity is gone and the orchestrator should drop it.
    async fn read(&self, id: EntityId) -> Result<Option<Self::Record>>;

    /// Applies the field-level difference between the host and `desired`.
    async fn update(&self, id: EntityId, desired: &Self::Spec) -> Result<Self::Record>;

    /// Removing an entity that no longer exists succeeds.
    async fn delete(&self, id: EntityId) -> Result<()>;
}

/// A single-field modification that may rename its subject.
pub trait Change {
    /// New name of the subject once this change is applied, if it renames.
    fn renames_to(&self) -> Option<&str>;

    /// Command applying this change to the entity currently named `subject`.
    fn command(&self, subject: &str) -> String;

    fn field(&self) -> &'static str;
}

impl Change for UserChange {
    fn renames_to(&self) -> Option<&str> {
        match self {
            UserChange::Name(name) => Some(name.as_str()),
            _ => None,
        }
    }

    fn command(&self, subject: &str) -> String {
        UserChange::command(self, subject)
    }

    fn field(&self) -> &'static str {
        self.into()
    }
}

impl Change for GroupChange {
    fn renames_to(&self) -> Option<&str> {
        let GroupChange::Name(name) = self;
        Some(name.as_str())
    }

    fn command(&self, subject: &str) -> String {
        GroupChange::command(self, subject)
    }

    fn field(&self) -> &'static str {
        self.into()
    }
}

/// One command of an update, addressed to the name the entity will have when
/// the command runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub field: &'static str,
    pub subject: String,
    pub command: String,
}

/// Orders `changes` into steps, addressing each one to the name established
/// by every rename before it.
pub fn steps<C: Change>(current_name: &str, changes: &[C]) -> Vec<Step> {
    let mut subject = current_name.to_owned();
    changes
        .iter()
        .map(|change| {
            let step = Step {
                field: change.field(),
                command: change.command(&subject),
                subject: subject.clone(),
            };
            if let Some(name) = change.renames_to() {
                name.clone_into(&mut subject);
            }
            step
        })
        .collect()
}

/// Runs `steps` in order, elevated, stopping at the first failure.
pub(crate) async fn apply(executor: &Executor, steps: &[Step]) -> Result<()> {
    for step in steps {
        executor.run(true, &step.command, "").await?;
        info!(field = step.field, subject = %step.subject, "applied change");
    }
    Ok(())
}
