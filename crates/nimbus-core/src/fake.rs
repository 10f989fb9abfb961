//! In-process backend used by the engine and task tests
//!
//! Provider state lives in a shared [`FakeCloud`] so tests can seed it, run a
//! pass, and inspect what changed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use nimbus_common::{
    AllocationHandle, NimbusError, Resource, ResourceKind, Result, unique_project_name,
};
use nimbus_plugin::{
    Allocator, AllocatorPlugin, FederatedUser, LimitRangeItem, Plugin, ProjectIdentity,
    ProjectInfo, ShapedProject, stored_quota_values,
};
use nimbus_quota::{
    ObservedQuota, QuotaCategory, QuotaSpecDocument, QuotaValue, object_storage_bytes,
};

#[derive(Debug, Default)]
pub struct CloudState {
    pub projects: BTreeMap<String, ProjectInfo>,
    pub members: BTreeMap<String, BTreeSet<String>>,
    pub quotas: BTreeMap<String, ObservedQuota>,
    pub limits: BTreeMap<String, Vec<LimitRangeItem>>,
    pub federated: BTreeSet<String>,
    pub mutations: usize,
    pub set_quota_calls: usize,
    pub fail_set_quota: bool,
}

#[derive(Clone, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<CloudState>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut CloudState) -> R) -> R {
        f(&mut self.state.lock())
    }

    pub fn add_project(&self, id: &str, labels: &[(&str, &str)]) {
        self.with(|s| {
            s.projects.insert(
                id.to_string(),
                ProjectInfo {
                    id: id.to_string(),
                    name: id.to_string(),
                    enabled: true,
                    labels: labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                },
            );
        });
    }

    pub fn set_members(&self, project_id: &str, users: &[&str]) {
        self.with(|s| {
            s.members.insert(
                project_id.to_string(),
                users.iter().map(|u| u.to_string()).collect(),
            );
        });
    }

    pub fn set_observed(&self, project_id: &str, key: &str, value: QuotaValue) {
        self.with(|s| {
            s.quotas
                .entry(project_id.to_string())
                .or_default()
                .insert(key.to_string(), value);
        });
    }

    pub fn members(&self, project_id: &str) -> BTreeSet<String> {
        self.with(|s| s.members.get(project_id).cloned().unwrap_or_default())
    }

    pub fn observed(&self, project_id: &str) -> ObservedQuota {
        self.with(|s| s.quotas.get(project_id).cloned().unwrap_or_default())
    }

    pub fn mutations(&self) -> usize {
        self.with(|s| s.mutations)
    }
}

pub fn default_labels() -> BTreeMap<String, String> {
    [("modelmesh-enabled".to_string(), "true".to_string())].into()
}

pub fn default_limits() -> Vec<LimitRangeItem> {
    vec![LimitRangeItem::new("Container").with_default("memory", "1Gi")]
}

pub struct FakeAllocator {
    kind: ResourceKind,
    resource: Resource,
    allocation: AllocationHandle,
    specs: QuotaSpecDocument,
    cloud: FakeCloud,
    labels: BTreeMap<String, String>,
    limits: Vec<LimitRangeItem>,
}

impl FakeAllocator {
    pub fn new(resource: Resource, allocation: AllocationHandle, cloud: FakeCloud) -> Result<Self> {
        let kind = resource
            .kind()
            .ok_or_else(|| NimbusError::Config(format!("unknown type {}", resource.resource_type)))?;
        let specs = QuotaSpecDocument::from_resource(&resource)?;
        Ok(Self {
            kind,
            resource,
            allocation,
            specs,
            cloud,
            labels: default_labels(),
            limits: default_limits(),
        })
    }
}

#[async_trait]
impl Allocator for FakeAllocator {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn resource(&self) -> &Resource {
        &self.resource
    }

    fn allocation(&self) -> &AllocationHandle {
        &self.allocation
    }

    fn quota_specs(&self) -> &QuotaSpecDocument {
        &self.specs
    }

    fn project_name_max_length(&self) -> usize {
        32
    }

    fn manages_quota(&self, category: QuotaCategory) -> bool {
        match self.kind {
            ResourceKind::OpenShift => category == QuotaCategory::Cluster,
            _ => category != QuotaCategory::Cluster,
        }
    }

    async fn create_project(&self, suggested_name: &str) -> Result<ProjectIdentity> {
        let name = unique_project_name(suggested_name, 32);
        let id = format!("id-{}", name);
        self.cloud.add_project(&id, &[]);
        self.cloud.with(|s| s.mutations += 1);
        Ok(ProjectIdentity { name, id })
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<ProjectInfo>> {
        Ok(self.cloud.with(|s| s.projects.get(project_id).cloned()))
    }

    async fn disable_project(&self, project_id: &str) -> Result<()> {
        self.cloud.with(|s| {
            if let Some(p) = s.projects.get_mut(project_id) {
                p.enabled = false;
                s.mutations += 1;
            }
        });
        Ok(())
    }

    async fn reactivate_project(&self, project_id: &str) -> Result<()> {
        self.cloud.with(|s| match s.projects.get_mut(project_id) {
            Some(p) => p.enabled = true,
            None => {
                s.projects.insert(
                    project_id.to_string(),
                    ProjectInfo {
                        id: project_id.to_string(),
                        name: project_id.to_string(),
                        enabled: true,
                        labels: BTreeMap::new(),
                    },
                );
            }
        });
        self.cloud.with(|s| s.mutations += 1);
        Ok(())
    }

    async fn create_project_defaults(&self, project_id: &str) -> Result<()> {
        if self.kind == ResourceKind::OpenShift {
            let limits = self.limits.clone();
            self.cloud.with(|s| {
                s.limits.entry(project_id.to_string()).or_insert(limits);
            });
        }
        Ok(())
    }

    async fn get_quota(&self, project_id: &str) -> Result<ObservedQuota> {
        Ok(self.cloud.observed(project_id))
    }

    async fn set_quota(&self, project_id: &str) -> Result<()> {
        if self.cloud.with(|s| s.fail_set_quota) {
            return Err(NimbusError::provider(503, "quota service unavailable"));
        }
        let values = stored_quota_values(&self.allocation, &self.specs).await?;
        self.cloud.with(|s| {
            let quota = s.quotas.entry(project_id.to_string()).or_default();
            for stored in &values {
                if !self.manages_quota(stored.spec.category) {
                    continue;
                }
                if stored.spec.is_object_storage() {
                    quota.insert(
                        stored.spec.label.clone(),
                        QuotaValue::Number(object_storage_bytes(stored.value)),
                    );
                } else if let Some(value) = stored.value {
                    let (key, formatted) = stored.spec.provider_entry(value);
                    let value = if stored.spec.unit_suffix.is_empty() {
                        QuotaValue::Number(value)
                    } else {
                        QuotaValue::Quantity(formatted)
                    };
                    quota.insert(key, value);
                }
            }
            s.set_quota_calls += 1;
            s.mutations += 1;
        });
        Ok(())
    }

    async fn get_users(&self, project_id: &str) -> Result<BTreeSet<String>> {
        Ok(self.cloud.members(project_id))
    }

    async fn assign_role_on_user(&self, username: &str, project_id: &str) -> Result<()> {
        self.cloud.with(|s| {
            if s.members
                .entry(project_id.to_string())
                .or_default()
                .insert(username.to_string())
            {
                s.mutations += 1;
            }
        });
        Ok(())
    }

    async fn remove_role_from_user(&self, username: &str, project_id: &str) -> Result<()> {
        self.cloud.with(|s| {
            if s.members
                .get_mut(project_id)
                .is_some_and(|m| m.remove(username))
            {
                s.mutations += 1;
            }
        });
        Ok(())
    }

    async fn get_or_create_federated_user(&self, username: &str) -> Result<FederatedUser> {
        self.cloud.with(|s| {
            if s.federated.insert(username.to_string()) {
                s.mutations += 1;
            }
        });
        Ok(FederatedUser {
            username: username.to_string(),
            user_id: format!("uid-{}", username),
        })
    }

    fn shaped(&self) -> Option<&dyn ShapedProject> {
        (self.kind == ResourceKind::OpenShift).then_some(self as &dyn ShapedProject)
    }
}

#[async_trait]
impl ShapedProject for FakeAllocator {
    fn default_labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    async fn get_project_labels(
        &self,
        project_id: &str,
    ) -> Result<Option<BTreeMap<String, String>>> {
        Ok(self
            .cloud
            .with(|s| s.projects.get(project_id).map(|p| p.labels.clone())))
    }

    async fn merge_project_labels(
        &self,
        project_id: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.cloud.with(|s| {
            if let Some(p) = s.projects.get_mut(project_id) {
                p.labels.extend(labels.clone());
                s.mutations += 1;
            }
        });
        Ok(())
    }

    fn expected_limits(&self) -> &[LimitRangeItem] {
        &self.limits
    }

    async fn get_limits(&self, project_id: &str) -> Result<Option<Vec<LimitRangeItem>>> {
        Ok(self.cloud.with(|s| s.limits.get(project_id).cloned()))
    }

    async fn replace_limits(&self, project_id: &str) -> Result<()> {
        let limits = self.limits.clone();
        self.cloud.with(|s| {
            s.limits.insert(project_id.to_string(), limits);
            s.mutations += 1;
        });
        Ok(())
    }
}

/// Serves OpenStack and OpenShift resources from one [`FakeCloud`]
pub struct FakePlugin {
    cloud: FakeCloud,
}

impl FakePlugin {
    pub fn new(cloud: FakeCloud) -> Self {
        Self { cloud }
    }
}

#[async_trait]
impl Plugin for FakePlugin {
    fn name(&self) -> &str {
        "fake"
    }

    async fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl AllocatorPlugin for FakePlugin {
    fn kinds(&self) -> &[ResourceKind] {
        &[ResourceKind::OpenStack, ResourceKind::OpenShift]
    }

    async fn build(
        &self,
        resource: &Resource,
        allocation: AllocationHandle,
    ) -> Result<Box<dyn Allocator>> {
        Ok(Box::new(FakeAllocator::new(
            resource.clone(),
            allocation,
            self.cloud.clone(),
        )?))
    }
}
