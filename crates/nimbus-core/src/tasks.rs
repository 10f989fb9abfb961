//! Allocation lifecycle tasks
//!
//! `{no project} -> activate -> {active} -> disable -> {disabled} -> activate -> {active}`
//!
//! Tasks are keyed by allocation id and load the allocation, its resource and
//! its backend on every run, so a queued task sees current records.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use nimbus_common::attributes::{
    ALLOCATION_INSTITUTION_SPECIFIC_CODE, ALLOCATION_PROJECT_ID, ALLOCATION_PROJECT_NAME,
};
use nimbus_common::{
    AllocationHandle, AllocationSource, AttributeStore, DEFAULT_INSTITUTION_CODE, NimbusError,
    Result,
};
use nimbus_plugin::{Allocator, PluginRegistry};

use crate::poll::Poller;

/// A unit of lifecycle work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum Task {
    Activate { allocation_id: String },
    Disable { allocation_id: String },
    AddUser { allocation_id: String, username: String },
    RemoveUser { allocation_id: String, username: String },
}

impl Task {
    pub fn allocation_id(&self) -> &str {
        match self {
            Task::Activate { allocation_id }
            | Task::Disable { allocation_id }
            | Task::AddUser { allocation_id, .. }
            | Task::RemoveUser { allocation_id, .. } => allocation_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Task::Activate { .. } => "activate",
            Task::Disable { .. } => "disable",
            Task::AddUser { .. } => "add_user",
            Task::RemoveUser { .. } => "remove_user",
        }
    }
}

/// Result of an activation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activation {
    pub project_id: String,
    /// `false` for a fresh project, `true` when an existing one was re-enabled
    pub reactivated: bool,
}

pub struct TaskRunner {
    registry: Arc<PluginRegistry>,
    source: Arc<dyn AllocationSource>,
    store: Arc<dyn AttributeStore>,
    poller: Poller,
}

impl TaskRunner {
    pub fn new(
        registry: Arc<PluginRegistry>,
        source: Arc<dyn AllocationSource>,
        store: Arc<dyn AttributeStore>,
        poller: Poller,
    ) -> Self {
        Self {
            registry,
            source,
            store,
            poller,
        }
    }

    /// Run one task; unsupported resource types are a no-op
    pub async fn run(&self, task: &Task) -> Result<()> {
        let Some(allocator) = self.allocator_for(task.allocation_id()).await? else {
            return Ok(());
        };
        let allocator = allocator.as_ref();
        match task {
            Task::Activate { .. } => activate(allocator).await.map(|_| ()),
            Task::Disable { .. } => disable(allocator).await.map(|_| ()),
            Task::AddUser { username, .. } => add_user(allocator, username, &self.poller).await,
            Task::RemoveUser { username, .. } => remove_user(allocator, username).await,
        }
    }

    pub async fn activate(&self, allocation_id: &str) -> Result<Option<Activation>> {
        match self.allocator_for(allocation_id).await? {
            Some(allocator) => activate(allocator.as_ref()).await.map(Some),
            None => Ok(None),
        }
    }

    async fn allocator_for(&self, allocation_id: &str) -> Result<Option<Box<dyn Allocator>>> {
        let allocation = self
            .source
            .allocation(allocation_id)
            .await?
            .ok_or_else(|| NimbusError::not_found(format!("allocation {}", allocation_id)))?;
        let resource = self
            .source
            .resource(&allocation.resource_name)
            .await?
            .ok_or_else(|| NimbusError::not_found(format!("resource {}", allocation.resource_name)))?;

        let handle = AllocationHandle::new(allocation, self.store.clone());
        let allocator = self.registry.resolve(&resource, handle).await?;
        if allocator.is_none() {
            debug!(
                allocation_id = %allocation_id,
                resource_type = %resource.resource_type,
                "Resource type not handled, nothing to do"
            );
        }
        Ok(allocator)
    }
}

/// Create and provision the project, or re-enable it when one is recorded
pub async fn activate(allocator: &dyn Allocator) -> Result<Activation> {
    let handle = allocator.allocation();
    let allocation = &handle.allocation;

    if let Some(project_id) = handle.get_text(ALLOCATION_PROJECT_ID).await? {
        info!(allocation_id = %handle.id(), project_id = %project_id, "Reactivating project");
        allocator.reactivate_project(&project_id).await?;
        federate_pi(allocator, &project_id).await?;
        allocator.set_quota(&project_id).await?;
        return Ok(Activation {
            project_id,
            reactivated: true,
        });
    }

    let project = allocator.create_project(&allocation.project_title).await?;
    handle.set(ALLOCATION_PROJECT_ID, project.id.as_str()).await?;
    handle.set(ALLOCATION_PROJECT_NAME, project.name.as_str()).await?;
    if handle.get(ALLOCATION_INSTITUTION_SPECIFIC_CODE).await?.is_none() {
        handle
            .set(ALLOCATION_INSTITUTION_SPECIFIC_CODE, DEFAULT_INSTITUTION_CODE)
            .await?;
    }
    info!(
        allocation_id = %handle.id(),
        project_id = %project.id,
        project_name = %project.name,
        "Project created"
    );

    for (attribute, spec) in allocator.quota_specs().iter() {
        if handle.get(attribute).await?.is_some() {
            continue;
        }
        let value = spec.quota_by_quantity(handle.quantity());
        handle.set(attribute, value).await?;
        debug!(allocation_id = %handle.id(), attribute = %attribute, value, "Default quota recorded");
    }

    allocator.create_project_defaults(&project.id).await?;
    federate_pi(allocator, &project.id).await?;
    allocator.set_quota(&project.id).await?;

    Ok(Activation {
        project_id: project.id,
        reactivated: false,
    })
}

async fn federate_pi(allocator: &dyn Allocator, project_id: &str) -> Result<()> {
    let pi = &allocator.allocation().allocation.pi_username;
    if pi.is_empty() {
        warn!(project_id = %project_id, "Allocation has no PI to add");
        return Ok(());
    }
    allocator.get_or_create_federated_user(pi).await?;
    allocator.assign_role_on_user(pi, project_id).await
}

/// Disable the recorded project; returns `false` when there is none
pub async fn disable(allocator: &dyn Allocator) -> Result<bool> {
    let handle = allocator.allocation();
    let Some(project_id) = handle.get_text(ALLOCATION_PROJECT_ID).await? else {
        warn!(allocation_id = %handle.id(), "No project to disable");
        return Ok(false);
    };
    allocator.disable_project(&project_id).await?;
    info!(allocation_id = %handle.id(), project_id = %project_id, "Project disabled");
    Ok(true)
}

/// Grant a user the project role, waiting for activation to record the project
pub async fn add_user(allocator: &dyn Allocator, username: &str, poller: &Poller) -> Result<()> {
    let handle = allocator.allocation();
    let project_id = poller
        .until("allocated project id", move || handle.get_text(ALLOCATION_PROJECT_ID))
        .await?;

    allocator.get_or_create_federated_user(username).await?;
    allocator.assign_role_on_user(username, &project_id).await?;
    info!(allocation_id = %handle.id(), project_id = %project_id, username = %username, "User added");
    Ok(())
}

pub async fn remove_user(allocator: &dyn Allocator, username: &str) -> Result<()> {
    let handle = allocator.allocation();
    let Some(project_id) = handle.get_text(ALLOCATION_PROJECT_ID).await? else {
        warn!(allocation_id = %handle.id(), username = %username, "No project, nothing to remove");
        return Ok(());
    };
    allocator.remove_role_from_user(username, &project_id).await?;
    info!(allocation_id = %handle.id(), project_id = %project_id, username = %username, "User removed");
    Ok(())
}
