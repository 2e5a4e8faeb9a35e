use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use tracing::info;
use tracing::instrument;

use super::Reconciler;
use crate::action::Executor;
use crate::command;
use crate::command::UserChange;
use crate::model::UserRecord;
use crate::model::UserSpec;
use crate::observe::Observer;
use crate::util::id::EntityId;
use crate::util::tokio::Deadline;
use crate::Error;
use crate::Result;

const KIND: &str = "user";

/// Converges user accounts on one host.
#[derive(Clone)]
pub struct UserReconciler {
    executor: Executor,
    operation_timeout: Option<Duration>,
}

impl UserReconciler {
    #[must_use]
    pub fn new(executor: Executor) -> Self {
        Self {
            executor,
            operation_timeout: None,
        }
    }

    /// Bounds every create/read/update/delete as a whole.
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
impl Reconciler for UserReconciler {
    type Spec = UserSpec;
    type Record = UserRecord;

    #[instrument(skip_all, fields(name = %desired.name))]
    async fn create(&self, desired: &UserSpec) -> Result<(EntityId, UserRecord)> {
        let (executor, observer, _deadline) = self.scope();

        executor.run(true, &command::useradd(desired), "").await?;

        let uid = observer
            .uid_by_name(&desired.name)
            .await?
            .ok_or_else(|| Error::parse(&command::id_user(&desired.name), "no uid printed"))?;
        let record = observer
            .user_by_id(uid)
            .await?
            .ok_or(Error::NotFound { kind: KIND, id: uid })?;

        info!(uid, "user created");
        Ok((EntityId::new(uid), record))
    }

    #[instrument(skip_all, fields(%id))]
    async fn read(&self, id: EntityId) -> Result<Option<UserRecord>> {
        let (_executor, observer, _deadline) = self.scope();
        let record = observer.user_by_id(id.get()).await?;
        if record.is_none() {
            debug!("user is gone");
        }
        Ok(record)
    }

    #[instrument(skip_all, fields(%id, name = %desired.name))]
    async fn update(&self, id: EntityId, desired: &UserSpec) -> Result<UserRecord> {
        let (executor, observer, _deadline) = self.scope();
        let not_found = || Error::NotFound {
            kind: KIND,
            id: id.get(),
        };

        let observed = observer.user_by_id(id.get()).await?.ok_or_else(not_found)?;
        if desired.requires_replacement(&observed) {
            return Err(Error::Config(format!(
                "uid of {} cannot change from {} in place, delete and recreate it",
                observed.name, observed.uid
            )));
        }

        let primary_group = if desired.groups.is_empty() {
            None
        } else {
            let gid = desired.pinned_gid().unwrap_or(observed.gid);
            observer.group_by_id(gid).await?.map(|group| group.name)
        };

        let changes = plan(&observed, desired, primary_group.as_deref());
        if changes.is_empty() {
            debug!("user already converged");
            return Ok(observed);
        }

        let steps = super::steps(&observed.name, &changes);
        super::apply(&executor, &steps).await?;

        observer.user_by_id(id.get()).await?.ok_or_else(not_found)
    }

    #[instrument(skip_all, fields(%id))]
    async fn delete(&self, id: EntityId) -> Result<()> {
        let (executor, observer, _deadline) = self.scope();

        let Some(entry) = observer.passwd_by_id(id.get()).await? else {
            debug!("user already absent");
            return Ok(());
        };

        executor.run(true, &command::userdel(&entry.name), "").await?;
        info!(name = %entry.name, "user deleted");
        Ok(())
    }
}

/// Field-level changes taking `observed` to `desired`, in application order.
///
/// Fields the desired state leaves unmanaged (an unpinned gid, an empty home
/// or group set) never produce a change, and neither do the creation-only
/// `create_home` and `system`.
///
/// `primary_group` names the group the user will have as primary once the
/// update is applied. `id` never lists it among the secondary groups, so it
/// is left out of the comparison.
#[must_use]
pub fn plan(
    observed: &UserRecord,
    desired: &UserSpec,
    primary_group: Option<&str>,
) -> Vec<UserChange> {
    let mut changes = Vec::new();

    if desired.name != observed.name {
        changes.push(UserChange::Name(desired.name.clone()));
    }
    if let Some(gid) = desired.pinned_gid().filter(|&gid| gid != observed.gid) {
        changes.push(UserChange::Gid(gid));
    }
    if !desired.home.is_empty() && desired.home != observed.home {
        changes.push(UserChange::Home(desired.home.clone()));
    }
    if !desired.shell.is_empty() && desired.shell != observed.shell {
        changes.push(UserChange::Shell(desired.shell.clone()));
    }
    if desired.comment != observed.comment {
        changes.push(UserChange::Comment(desired.comment.clone()));
    }
    if !desired.groups.is_empty() {
        let mut secondary = desired.groups.clone();
        if let Some(primary) = primary_group {
            secondary.remove(primary);
        }
        if secondary != observed.groups {
            changes.push(UserChange::Groups(desired.groups.clone()));
        }
    }

    changes
}
