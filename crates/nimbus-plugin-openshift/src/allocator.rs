//! OpenShift and OpenShift-VM allocator
//!
//! A project is a namespace named after its sanitized unique name, so the
//! project id and name coincide. OpenShift has no disabled state: disabling
//! deletes the project and reactivation recreates it under the same name.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{LimitRange, ResourceQuota};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde_json::{Value, json};
use tracing::{debug, info};

use nimbus_common::attributes::{RESOURCE_IDENTITY_NAME, RESOURCE_ROLE};
use nimbus_common::{
    AllocationHandle, NimbusError, Resource, ResourceKind, Result, unique_project_name,
};
use nimbus_plugin::{
    Allocator, FederatedUser, LimitRangeItem, ProjectIdentity, ProjectInfo, ShapedProject,
    stored_quota_values,
};
use nimbus_quota::{ObservedQuota, QuotaCategory, QuotaSpecDocument, QuotaValue};

use crate::client::{
    IDENTITY, LIMIT_RANGE, ObjectKind, PROJECT, RESOURCE_QUOTA, ROLE_BINDING, ResourceClient,
    USER, USER_IDENTITY_MAPPING,
};
use crate::config::OpenShiftConfig;

pub const PROJECT_NAME_MAX_LENGTH: usize = 63;

/// Cluster roles a project member may hold
pub const ROLES: [&str; 3] = ["admin", "edit", "view"];

const DEFAULT_ROLE: &str = "edit";
const DEFAULT_IDENTITY_PROVIDER: &str = "sso_auth";
const RBAC_GROUP: &str = "rbac.authorization.k8s.io";

pub struct OpenShiftAllocator {
    kind: ResourceKind,
    resource: Resource,
    allocation: AllocationHandle,
    specs: QuotaSpecDocument,
    client: Arc<dyn ResourceClient>,
    config: Arc<OpenShiftConfig>,
    limits: Vec<LimitRangeItem>,
    identity_provider: String,
    role: String,
}

impl OpenShiftAllocator {
    pub fn new(
        resource: Resource,
        allocation: AllocationHandle,
        client: Arc<dyn ResourceClient>,
        config: Arc<OpenShiftConfig>,
    ) -> Result<Self> {
        let kind = match resource.kind() {
            Some(kind @ (ResourceKind::OpenShift | ResourceKind::OpenShiftVm)) => kind,
            _ => {
                return Err(NimbusError::Config(format!(
                    "resource '{}' of type '{}' is not an OpenShift resource",
                    resource.name, resource.resource_type
                )));
            }
        };
        let limits = config.require_limits()?.to_vec();
        let specs = QuotaSpecDocument::from_resource(&resource)?;
        let identity_provider = resource
            .attribute(RESOURCE_IDENTITY_NAME)
            .unwrap_or(DEFAULT_IDENTITY_PROVIDER)
            .to_string();
        let role = resource
            .attribute(RESOURCE_ROLE)
            .unwrap_or(DEFAULT_ROLE)
            .to_string();

        Ok(Self {
            kind,
            resource,
            allocation,
            specs,
            client,
            config,
            limits,
            identity_provider,
            role,
        })
    }

    /// Configured member role; anything outside [`ROLES`] is rejected
    fn role(&self) -> Result<&str> {
        if ROLES.contains(&self.role.as_str()) {
            Ok(&self.role)
        } else {
            Err(NimbusError::InvalidRole(self.role.clone()))
        }
    }

    fn identity_name(&self, username: &str) -> String {
        format!("{}:{}", self.identity_provider, username)
    }

    fn project_object(&self, name: &str) -> Value {
        let allocation = &self.allocation.allocation;
        json!({
            "apiVersion": PROJECT.api_version,
            "kind": PROJECT.kind,
            "metadata": {
                "name": name,
                "labels": self.config.default_labels,
                "annotations": {
                    "openshift.io/display-name": allocation.project_title,
                    "openshift.io/requester": allocation.pi_username,
                },
            },
        })
    }

    fn limit_range_object(&self, project_id: &str) -> Value {
        json!({
            "apiVersion": LIMIT_RANGE.api_version,
            "kind": LIMIT_RANGE.kind,
            "metadata": {"name": format!("{}-limits", project_id), "namespace": project_id},
            "spec": {"limits": self.limits},
        })
    }

    async fn get(&self, kind: ObjectKind, namespace: &str, name: &str) -> Result<Option<Value>> {
        Ok(self.client.get(kind, namespace, name).await?)
    }

    async fn create(&self, kind: ObjectKind, namespace: &str, object: &Value) -> Result<Value> {
        Ok(self.client.create(kind, namespace, object).await?)
    }

    /// Set the subjects of a role binding, creating the binding when absent
    async fn write_binding(
        &self,
        project_id: &str,
        role: &str,
        subjects: Vec<Value>,
    ) -> Result<()> {
        match self.get(ROLE_BINDING, project_id, role).await? {
            Some(_) => {
                self.client
                    .patch(ROLE_BINDING, project_id, role, &json!({"subjects": subjects}))
                    .await?;
            }
            None => {
                let binding = json!({
                    "apiVersion": ROLE_BINDING.api_version,
                    "kind": ROLE_BINDING.kind,
                    "metadata": {"name": role, "namespace": project_id},
                    "roleRef": {"apiGroup": RBAC_GROUP, "kind": "ClusterRole", "name": role},
                    "subjects": subjects,
                });
                self.create(ROLE_BINDING, project_id, &binding).await?;
            }
        }
        Ok(())
    }
}

fn user_subject(username: &str) -> Value {
    json!({"kind": "User", "apiGroup": RBAC_GROUP, "name": username})
}

fn is_user(subject: &Value, username: &str) -> bool {
    subject["kind"] == "User" && subject["name"] == username
}

fn subjects_of(binding: &Value) -> Vec<Value> {
    binding["subjects"].as_array().cloned().unwrap_or_default()
}

fn string_map(value: &Value) -> BTreeMap<String, String> {
    value
        .as_object()
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn quantities(map: Option<BTreeMap<String, Quantity>>) -> BTreeMap<String, String> {
    map.unwrap_or_default()
        .into_iter()
        .map(|(k, q)| (k, q.0))
        .collect()
}

#[async_trait]
impl Allocator for OpenShiftAllocator {
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
        PROJECT_NAME_MAX_LENGTH
    }

    fn manages_quota(&self, category: QuotaCategory) -> bool {
        category == QuotaCategory::Cluster
    }

    async fn create_project(&self, suggested_name: &str) -> Result<ProjectIdentity> {
        let name = unique_project_name(suggested_name, PROJECT_NAME_MAX_LENGTH);
        self.create(PROJECT, "", &self.project_object(&name)).await?;

        info!(
            allocation_id = %self.allocation.id(),
            project_id = %name,
            "Created OpenShift project"
        );
        Ok(ProjectIdentity {
            id: name.clone(),
            name,
        })
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<ProjectInfo>> {
        Ok(self.get(PROJECT, "", project_id).await?.map(|project| ProjectInfo {
            id: project_id.to_string(),
            name: project["metadata"]["name"]
                .as_str()
                .unwrap_or(project_id)
                .to_string(),
            enabled: true,
            labels: string_map(&project["metadata"]["labels"]),
        }))
    }

    async fn disable_project(&self, project_id: &str) -> Result<()> {
        if self.client.delete(PROJECT, "", project_id).await? {
            info!(project_id = %project_id, "Deleted OpenShift project");
        } else {
            debug!(project_id = %project_id, "Project already gone");
        }
        Ok(())
    }

    async fn reactivate_project(&self, project_id: &str) -> Result<()> {
        if self.get(PROJECT, "", project_id).await?.is_some() {
            debug!(project_id = %project_id, "Project exists, nothing to reactivate");
            return Ok(());
        }
        self.create(PROJECT, "", &self.project_object(project_id)).await?;
        info!(project_id = %project_id, "Recreated OpenShift project");
        // The limit range went away with the deleted namespace
        self.create_project_defaults(project_id).await
    }

    async fn create_project_defaults(&self, project_id: &str) -> Result<()> {
        if self.client.list(LIMIT_RANGE, project_id).await?.is_empty() {
            self.create(LIMIT_RANGE, project_id, &self.limit_range_object(project_id))
                .await?;
            info!(project_id = %project_id, "Created default limit range");
        }
        Ok(())
    }

    async fn get_quota(&self, project_id: &str) -> Result<ObservedQuota> {
        let mut observed = ObservedQuota::new();
        for value in self.client.list(RESOURCE_QUOTA, project_id).await? {
            let quota: ResourceQuota = serde_json::from_value(value)?;
            let hard = quota.spec.and_then(|s| s.hard);
            for (key, quantity) in quantities(hard) {
                observed.insert(key, QuotaValue::Quantity(quantity));
            }
        }
        Ok(observed)
    }

    async fn set_quota(&self, project_id: &str) -> Result<()> {
        let values = stored_quota_values(&self.allocation, &self.specs).await?;
        let hard: BTreeMap<String, String> = values
            .iter()
            .filter(|v| v.spec.category == QuotaCategory::Cluster)
            .filter_map(|v| v.value.map(|value| v.spec.provider_entry(value)))
            .collect();

        let name = format!("{}-project", project_id);
        match self.get(RESOURCE_QUOTA, project_id, &name).await? {
            Some(_) => {
                self.client
                    .patch(RESOURCE_QUOTA, project_id, &name, &json!({"spec": {"hard": hard}}))
                    .await?;
            }
            None => {
                let quota = json!({
                    "apiVersion": RESOURCE_QUOTA.api_version,
                    "kind": RESOURCE_QUOTA.kind,
                    "metadata": {"name": name, "namespace": project_id},
                    "spec": {"hard": hard},
                });
                self.create(RESOURCE_QUOTA, project_id, &quota).await?;
            }
        }

        info!(
            allocation_id = %self.allocation.id(),
            project_id = %project_id,
            entries = hard.len(),
            "Applied OpenShift quota"
        );
        Ok(())
    }

    async fn get_users(&self, project_id: &str) -> Result<BTreeSet<String>> {
        let mut users = BTreeSet::new();
        for binding in self.client.list(ROLE_BINDING, project_id).await? {
            let role = binding["roleRef"]["name"].as_str().unwrap_or_default();
            if !ROLES.contains(&role) {
                continue;
            }
            users.extend(
                subjects_of(&binding)
                    .iter()
                    .filter(|s| s["kind"] == "User")
                    .filter_map(|s| s["name"].as_str().map(str::to_string)),
            );
        }
        Ok(users)
    }

    async fn assign_role_on_user(&self, username: &str, project_id: &str) -> Result<()> {
        let role = self.role()?;
        let mut subjects = match self.get(ROLE_BINDING, project_id, role).await? {
            Some(binding) => subjects_of(&binding),
            None => Vec::new(),
        };
        if subjects.iter().any(|s| is_user(s, username)) {
            debug!(username = %username, project_id = %project_id, "Role already assigned");
            return Ok(());
        }
        subjects.push(user_subject(username));
        self.write_binding(project_id, role, subjects).await?;
        info!(username = %username, project_id = %project_id, role = %role, "Assigned role");
        Ok(())
    }

    async fn remove_role_from_user(&self, username: &str, project_id: &str) -> Result<()> {
        for role in ROLES {
            let Some(binding) = self.get(ROLE_BINDING, project_id, role).await? else {
                continue;
            };
            let subjects = subjects_of(&binding);
            if !subjects.iter().any(|s| is_user(s, username)) {
                continue;
            }
            let remaining = subjects.into_iter().filter(|s| !is_user(s, username)).collect();
            self.write_binding(project_id, role, remaining).await?;
            info!(username = %username, project_id = %project_id, role = %role, "Removed role");
        }
        Ok(())
    }

    async fn get_or_create_federated_user(&self, username: &str) -> Result<FederatedUser> {
        if self.get(USER, "", username).await?.is_none() {
            let user = json!({
                "apiVersion": USER.api_version,
                "kind": USER.kind,
                "metadata": {"name": username},
                "fullName": username,
            });
            self.create(USER, "", &user).await?;
            info!(username = %username, "Created user");
        }

        let identity_name = self.identity_name(username);
        if self.get(IDENTITY, "", &identity_name).await?.is_none() {
            let identity = json!({
                "apiVersion": IDENTITY.api_version,
                "kind": IDENTITY.kind,
                "metadata": {"name": identity_name},
                "providerName": self.identity_provider,
                "providerUserName": username,
            });
            self.create(IDENTITY, "", &identity).await?;
            info!(identity = %identity_name, "Created identity");
        }

        if self
            .get(USER_IDENTITY_MAPPING, "", &identity_name)
            .await?
            .is_none()
        {
            let mapping = json!({
                "apiVersion": USER_IDENTITY_MAPPING.api_version,
                "kind": USER_IDENTITY_MAPPING.kind,
                "metadata": {"name": identity_name},
                "user": {"name": username},
                "identity": {"name": identity_name},
            });
            self.create(USER_IDENTITY_MAPPING, "", &mapping).await?;
            info!(identity = %identity_name, username = %username, "Linked identity to user");
        }

        Ok(FederatedUser {
            username: username.to_string(),
            user_id: username.to_string(),
        })
    }

    fn shaped(&self) -> Option<&dyn ShapedProject> {
        Some(self)
    }
}

#[async_trait]
impl ShapedProject for OpenShiftAllocator {
    fn default_labels(&self) -> &BTreeMap<String, String> {
        &self.config.default_labels
    }

    async fn get_project_labels(
        &self,
        project_id: &str,
    ) -> Result<Option<BTreeMap<String, String>>> {
        Ok(self
            .get(PROJECT, "", project_id)
            .await?
            .map(|p| string_map(&p["metadata"]["labels"])))
    }

    async fn merge_project_labels(
        &self,
        project_id: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.client
            .patch(PROJECT, "", project_id, &json!({"metadata": {"labels": labels}}))
            .await?;
        info!(project_id = %project_id, labels = labels.len(), "Merged project labels");
        Ok(())
    }

    fn expected_limits(&self) -> &[LimitRangeItem] {
        &self.limits
    }

    async fn get_limits(&self, project_id: &str) -> Result<Option<Vec<LimitRangeItem>>> {
        let ranges = self.client.list(LIMIT_RANGE, project_id).await?;
        if ranges.is_empty() {
            return Ok(None);
        }
        let mut items = Vec::new();
        for value in ranges {
            let range: LimitRange = serde_json::from_value(value)?;
            for item in range.spec.map(|s| s.limits).unwrap_or_default() {
                items.push(LimitRangeItem {
                    type_: item.type_,
                    default: quantities(item.default),
                    default_request: quantities(item.default_request),
                    min: quantities(item.min),
                    max: quantities(item.max),
                });
            }
        }
        Ok(Some(items))
    }

    async fn replace_limits(&self, project_id: &str) -> Result<()> {
        for range in self.client.list(LIMIT_RANGE, project_id).await? {
            if let Some(name) = range["metadata"]["name"].as_str() {
                self.client.delete(LIMIT_RANGE, project_id, name).await?;
            }
        }
        self.create(LIMIT_RANGE, project_id, &self.limit_range_object(project_id))
            .await?;
        info!(project_id = %project_id, "Replaced limit range");
        Ok(())
    }
}

impl std::fmt::Debug for OpenShiftAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenShiftAllocator")
            .field("kind", &self.kind)
            .field("resource", &self.resource.name)
            .field("allocation", &self.allocation.id())
            .finish_non_exhaustive()
    }
}
