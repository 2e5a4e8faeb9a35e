use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use tracing::info;
use tracing::instrument;

use super::Reconciler;
use crate::action::Executor;
use crate::command;
use crate::command::GroupChange;
use crate::model::GroupRecord;
use crate::model::GroupSpec;
use crate::observe::Observer;
use crate::util::id::EntityId;
use crate::util::tokio::Deadline;
use crate::Error;
use crate::Result;

const KIND: &str = "group";

/// Converges groups on one host.
#[derive(Clone)]
pub struct GroupReconciler {
    executor: Executor,
    operation_timeout: Option<Duration>,
}

impl GroupReconciler {
    #[must_use]
    pub fn new(executor: Executor) -> Self {
        Self {
            executor,
            operation_timeout: None,
        }
    }

    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    fn scope(&self) -> (Executor, Observer, Option<Deadline>) {
        let (executor, deadline) = self.executor.scoped(self.operation_timeout);
        let observer = Observer::new(executor.clone());
        (executor, observer, deadline)
    }
}

#[async_trait]
impl Reconciler for GroupReconciler {
    type Spec = GroupSpec;
    type Record = GroupRecord;

    #[instrument(skip_all, fields(name = %desired.name))]
    async fn create(&self, desired: &GroupSpec) -> Result<(EntityId, GroupRecord)> {
        let (executor, observer, _deadline) = self.scope();

        executor.run(true, &command::groupadd(desired), "").await?;

        let record = observer.group_by_name(&desired.name).await?.ok_or_else(|| {
            Error::parse(&command::getent_group(&desired.name), "group missing after creation")
        })?;

        info!(gid = record.gid, "group created");
        Ok((EntityId::new(record.gid), record))
    }

    #[instrument(skip_all, fields(%id))]
    async fn read(&self, id: EntityId) -> Result<Option<GroupRecord>> {
        let (_executor, observer, _deadline) = self.scope();
        let record = observer.group_by_id(id.get()).await?;
        if record.is_none() {
            debug!("group is gone");
        }
        Ok(record)
    }

    /// A pinned gid that differs from the observed one is refused; the
    /// caller drives delete-then-create.
    #[instrument(skip_all, fields(%id, name = %desired.name))]
    async fn update(&self, id: EntityId, desired: &GroupSpec) -> Result<GroupRecord> {
        let (executor, observer, _deadline) = self.scope();

        let observed = observer
            .group_by_id(id.get())
            .await?
            .ok_or(Error::NotFound {
                kind: KIND,
                id: id.get(),
            })?;
        if desired.requires_replacement(&observed) {
            return Err(Error::Config(format!(
                "gid of {} cannot change from {} in place, delete and recreate it",
                observed.name, observed.gid
            )));
        }

        let changes = plan(&observed, desired);
        if changes.is_empty() {
            debug!("group already converged");
            return Ok(observed);
        }

        let steps = super::steps(&observed.name, &changes);
        super::apply(&executor, &steps).await?;

        observer
            .group_by_id(id.get())
            .await?
            .ok_or(Error::NotFound {
                kind: KIND,
                id: id.get(),
            })
    }

    #[instrument(skip_all, fields(%id))]
    async fn delete(&self, id: EntityId) -> Result<()> {
        let (executor, observer, _deadline) = self.scope();

        let Some(record) = observer.group_by_id(id.get()).await? else {
            debug!("group already absent");
            return Ok(());
        };

        executor.run(true, &command::groupdel(&record.name), "").await?;
        info!(name = %record.name, "group deleted");
        Ok(())
    }
}

/// Only the name is updated in place. `system` only matters at creation and a
/// gid change is a replacement.
#[must_use]
pub fn plan(observed: &GroupRecord, desired: &GroupSpec) -> Vec<GroupChange> {
    let mut changes = Vec::new();
    if desired.name != observed.name {
        changes.push(GroupChange::Name(desired.name.clone()));
    }
    changes
}
