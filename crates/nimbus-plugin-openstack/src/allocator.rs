//! OpenStack and ESI allocator
//!
//! Projects live in Keystone; quotas are spread over Nova, Cinder, Neutron and
//! Swift. ESI shares the identity mechanics but only manages network quotas
//! and has no default network setup.

use std::collections::BTreeSet;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use nimbus_common::attributes::{
    RESOURCE_AUTH_URL, RESOURCE_DEFAULT_NETWORK_CIDR, RESOURCE_DEFAULT_PUBLIC_NETWORK,
    RESOURCE_FEDERATION_PROTOCOL, RESOURCE_IDP, RESOURCE_PROJECT_DOMAIN, RESOURCE_ROLE,
    RESOURCE_USER_DOMAIN,
};
use nimbus_common::{
    AllocationHandle, NimbusError, OptionalExt, Resource, ResourceKind, Result,
    unique_project_name,
};
use nimbus_plugin::{
    Allocator, FederatedUser, ProjectIdentity, ProjectInfo, stored_quota_values,
};
use nimbus_quota::{OBJECT_STORAGE_LABEL, ObservedQuota, QuotaCategory, QuotaSpecDocument, QuotaValue};

use crate::credentials::ApplicationCredential;
use crate::error::OpenStackError;
use crate::quota::{QuotaPayload, manages, numeric_entries, swift_account_url};
use crate::session::{
    OpenStackClient, SERVICE_COMPUTE, SERVICE_IDENTITY, SERVICE_NETWORK, SERVICE_OBJECT_STORE,
    SERVICE_VOLUME,
};

pub const PROJECT_NAME_MAX_LENGTH: usize = 64;

pub const DEFAULT_NETWORK_NAME: &str = "default_network";
pub const DEFAULT_SUBNET_NAME: &str = "default_subnet";
pub const DEFAULT_ROUTER_NAME: &str = "default_router";
pub const DEFAULT_NETWORK_CIDR: &str = "192.168.0.0/24";

const SWIFT_QUOTA_HEADER: &str = "X-Account-Meta-Quota-Bytes";

/// Static per-resource settings, read from resource attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenStackSettings {
    pub project_domain: String,
    pub user_domain: String,
    pub idp: String,
    pub protocol: String,
    pub role: String,
    pub public_network: Option<String>,
    pub network_cidr: String,
}

impl OpenStackSettings {
    pub fn from_resource(resource: &Resource) -> Self {
        let or = |name: &str, default: &str| {
            resource.attribute(name).unwrap_or(default).to_string()
        };
        Self {
            project_domain: or(RESOURCE_PROJECT_DOMAIN, "default"),
            user_domain: or(RESOURCE_USER_DOMAIN, "default"),
            idp: or(RESOURCE_IDP, "sso"),
            protocol: or(RESOURCE_FEDERATION_PROTOCOL, "openid"),
            role: or(RESOURCE_ROLE, "member"),
            public_network: resource
                .attribute(RESOURCE_DEFAULT_PUBLIC_NETWORK)
                .map(str::to_string),
            network_cidr: or(RESOURCE_DEFAULT_NETWORK_CIDR, DEFAULT_NETWORK_CIDR),
        }
    }
}

pub struct OpenStackAllocator {
    kind: ResourceKind,
    resource: Resource,
    allocation: AllocationHandle,
    specs: QuotaSpecDocument,
    settings: OpenStackSettings,
    client: OpenStackClient,
    role_id: OnceCell<String>,
}

impl OpenStackAllocator {
    pub fn new(
        resource: Resource,
        allocation: AllocationHandle,
        http: Client,
        credential: ApplicationCredential,
    ) -> Result<Self> {
        let kind = match resource.kind() {
            Some(kind @ (ResourceKind::OpenStack | ResourceKind::Esi)) => kind,
            _ => {
                return Err(NimbusError::Config(format!(
                    "resource '{}' of type '{}' is not an OpenStack resource",
                    resource.name, resource.resource_type
                )));
            }
        };
        let auth_url = resource.require_attribute(RESOURCE_AUTH_URL)?.to_string();
        let specs = QuotaSpecDocument::from_resource(&resource)?;
        let settings = OpenStackSettings::from_resource(&resource);
        for (name, spec) in specs.iter() {
            if !manages(kind, spec.category) {
                warn!(quota = %name, "Quota ignored by {} backend", kind);
            }
        }

        Ok(Self {
            kind,
            client: OpenStackClient::new(http, &auth_url, credential),
            resource,
            allocation,
            specs,
            settings,
            role_id: OnceCell::new(),
        })
    }

    pub fn settings(&self) -> &OpenStackSettings {
        &self.settings
    }

    fn has_category(&self, category: QuotaCategory) -> bool {
        manages(self.kind, category) && self.specs.in_category(category).next().is_some()
    }

    async fn role_id(&self) -> Result<&str> {
        let id = self
            .role_id
            .get_or_try_init(|| async {
                let body = self
                    .client
                    .get_json(SERVICE_IDENTITY, "roles", &[("name", self.settings.role.as_str())])
                    .await
                    .map_err(NimbusError::from)?;
                first_id(&body["roles"])
                    .ok_or_else(|| NimbusError::InvalidRole(self.settings.role.clone()))
            })
            .await?;
        Ok(id.as_str())
    }

    /// Federated lookup by unique id, falling back to name in the user domain
    async fn find_user(&self, username: &str) -> Result<Option<String>> {
        let body = self
            .client
            .get_json(SERVICE_IDENTITY, "users", &[("unique_id", username)])
            .await?;
        if let Some(id) = first_id(&body["users"]) {
            return Ok(Some(id));
        }

        let body = self
            .client
            .get_json(
                SERVICE_IDENTITY,
                "users",
                &[("name", username), ("domain_id", self.settings.user_domain.as_str())],
            )
            .await?;
        Ok(first_id(&body["users"]))
    }

    async fn set_enabled(&self, project_id: &str, enabled: bool) -> Result<()> {
        let body = json!({"project": {"enabled": enabled}});
        self.client
            .send_json(
                Method::PATCH,
                SERVICE_IDENTITY,
                &format!("projects/{}", project_id),
                Some(&body),
            )
            .await?;
        info!(project_id = %project_id, enabled, "Updated OpenStack project state");
        Ok(())
    }

    async fn swift_account(&self, project_id: &str) -> Result<String> {
        let endpoint = self.client.endpoint(SERVICE_OBJECT_STORE).await?;
        Ok(swift_account_url(&endpoint, project_id))
    }

    async fn create_default_network(&self, project_id: &str, public_network: &str) -> Result<()> {
        let existing = self
            .client
            .get_json(
                SERVICE_NETWORK,
                "v2.0/networks",
                &[("name", DEFAULT_NETWORK_NAME), ("project_id", project_id)],
            )
            .await?;
        if existing["networks"].as_array().is_some_and(|n| !n.is_empty()) {
            debug!(project_id = %project_id, "Default network already exists");
            return Ok(());
        }

        let network = self
            .client
            .send_json(
                Method::POST,
                SERVICE_NETWORK,
                "v2.0/networks",
                Some(&json!({"network": {
                    "name": DEFAULT_NETWORK_NAME,
                    "project_id": project_id,
                    "admin_state_up": true,
                }})),
            )
            .await?;
        let network_id = required_str(&network["network"]["id"], "network id")?;

        let subnet = self
            .client
            .send_json(
                Method::POST,
                SERVICE_NETWORK,
                "v2.0/subnets",
                Some(&json!({"subnet": {
                    "name": DEFAULT_SUBNET_NAME,
                    "network_id": network_id,
                    "project_id": project_id,
                    "ip_version": 4,
                    "cidr": self.settings.network_cidr,
                }})),
            )
            .await?;
        let subnet_id = required_str(&subnet["subnet"]["id"], "subnet id")?;

        let router = self
            .client
            .send_json(
                Method::POST,
                SERVICE_NETWORK,
                "v2.0/routers",
                Some(&json!({"router": {
                    "name": DEFAULT_ROUTER_NAME,
                    "project_id": project_id,
                    "external_gateway_info": {"network_id": public_network},
                }})),
            )
            .await?;
        let router_id = required_str(&router["router"]["id"], "router id")?;

        self.client
            .send_json(
                Method::PUT,
                SERVICE_NETWORK,
                &format!("v2.0/routers/{}/add_router_interface", router_id),
                Some(&json!({"subnet_id": subnet_id})),
            )
            .await?;

        info!(
            project_id = %project_id,
            network_id = %network_id,
            router_id = %router_id,
            "Created default network"
        );
        Ok(())
    }
}

fn first_id(list: &Value) -> Option<String> {
    list.as_array()?
        .first()?
        .get("id")?
        .as_str()
        .map(str::to_string)
}

fn required_str(value: &Value, what: &str) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| OpenStackError::UnexpectedResponse(format!("missing {}", what)).into())
}

#[async_trait]
impl Allocator for OpenStackAllocator {
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
        manages(self.kind, category)
    }

    async fn create_project(&self, suggested_name: &str) -> Result<ProjectIdentity> {
        let name = unique_project_name(suggested_name, PROJECT_NAME_MAX_LENGTH);
        let body = json!({"project": {
            "name": name,
            "domain_id": self.settings.project_domain,
            "enabled": true,
            "description": self.allocation.allocation.project_title,
        }});
        let created = self
            .client
            .send_json(Method::POST, SERVICE_IDENTITY, "projects", Some(&body))
            .await?;
        let id = required_str(&created["project"]["id"], "project id")?;

        info!(
            allocation_id = %self.allocation.id(),
            project_id = %id,
            project_name = %name,
            "Created OpenStack project"
        );
        Ok(ProjectIdentity { name, id })
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<ProjectInfo>> {
        let body = self
            .client
            .get_json(SERVICE_IDENTITY, &format!("projects/{}", project_id), &[])
            .await
            .map_err(NimbusError::from)
            .optional()?;
        Ok(body.map(|b| {
            let project = &b["project"];
            ProjectInfo {
                id: project["id"].as_str().unwrap_or(project_id).to_string(),
                name: project["name"].as_str().unwrap_or_default().to_string(),
                enabled: project["enabled"].as_bool().unwrap_or(true),
                labels: Default::default(),
            }
        }))
    }

    async fn disable_project(&self, project_id: &str) -> Result<()> {
        self.set_enabled(project_id, false).await
    }

    async fn reactivate_project(&self, project_id: &str) -> Result<()> {
        self.set_enabled(project_id, true).await
    }

    async fn create_project_defaults(&self, project_id: &str) -> Result<()> {
        if self.kind == ResourceKind::Esi {
            return Ok(());
        }
        match &self.settings.public_network {
            Some(public_network) => self.create_default_network(project_id, public_network).await,
            None => {
                debug!(project_id = %project_id, "No public network configured, skipping default network");
                Ok(())
            }
        }
    }

    async fn get_quota(&self, project_id: &str) -> Result<ObservedQuota> {
        let mut observed = ObservedQuota::new();

        if self.has_category(QuotaCategory::Compute) {
            let body = self
                .client
                .get_json(SERVICE_COMPUTE, &format!("os-quota-sets/{}", project_id), &[])
                .await?;
            numeric_entries(&body["quota_set"], &mut observed);
        }
        if self.has_category(QuotaCategory::Volume) {
            let body = self
                .client
                .get_json(SERVICE_VOLUME, &format!("os-quota-sets/{}", project_id), &[])
                .await?;
            numeric_entries(&body["quota_set"], &mut observed);
        }
        if self.has_category(QuotaCategory::Network) {
            let body = self
                .client
                .get_json(SERVICE_NETWORK, &format!("v2.0/quotas/{}", project_id), &[])
                .await?;
            numeric_entries(&body["quota"], &mut observed);
        }
        if self.has_category(QuotaCategory::ObjectStorage) {
            let url = self.swift_account(project_id).await?;
            match self.client.head(&url).await {
                Ok(headers) => {
                    if let Some(bytes) = headers
                        .get(SWIFT_QUOTA_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.trim().parse::<i64>().ok())
                    {
                        observed.insert(OBJECT_STORAGE_LABEL.to_string(), QuotaValue::Number(bytes));
                    }
                }
                Err(e) if e.status() == Some(404) => {
                    debug!(project_id = %project_id, "Swift account does not exist yet");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(observed)
    }

    async fn set_quota(&self, project_id: &str) -> Result<()> {
        let values = stored_quota_values(&self.allocation, &self.specs).await?;
        let payload = QuotaPayload::build(self.kind, &values);

        if !payload.compute.is_empty() {
            self.client
                .send_json(
                    Method::PUT,
                    SERVICE_COMPUTE,
                    &format!("os-quota-sets/{}", project_id),
                    Some(&json!({"quota_set": payload.compute})),
                )
                .await?;
        }
        if !payload.volume.is_empty() {
            self.client
                .send_json(
                    Method::PUT,
                    SERVICE_VOLUME,
                    &format!("os-quota-sets/{}", project_id),
                    Some(&json!({"quota_set": payload.volume})),
                )
                .await?;
        }
        if !payload.network.is_empty() {
            self.client
                .send_json(
                    Method::PUT,
                    SERVICE_NETWORK,
                    &format!("v2.0/quotas/{}", project_id),
                    Some(&json!({"quota": payload.network})),
                )
                .await?;
        }
        if let Some(bytes) = payload.object_storage_bytes {
            let url = self.swift_account(project_id).await?;
            self.client
                .post_headers(&url, &[(SWIFT_QUOTA_HEADER, bytes.to_string())])
                .await?;
        }

        info!(
            allocation_id = %self.allocation.id(),
            project_id = %project_id,
            "Applied OpenStack quota"
        );
        Ok(())
    }

    async fn get_users(&self, project_id: &str) -> Result<BTreeSet<String>> {
        let role_id = self.role_id().await?;
        let body = self
            .client
            .get_json(
                SERVICE_IDENTITY,
                "role_assignments",
                &[
                    ("scope.project.id", project_id),
                    ("role.id", role_id),
                    ("include_names", "true"),
                ],
            )
            .await?;

        Ok(body["role_assignments"]
            .as_array()
            .map(|assignments| {
                assignments
                    .iter()
                    .filter_map(|a| a["user"]["name"].as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn assign_role_on_user(&self, username: &str, project_id: &str) -> Result<()> {
        let user_id = self
            .find_user(username)
            .await?
            .ok_or_else(|| NimbusError::not_found(format!("user {}", username)))?;
        let role_id = self.role_id().await?;
        self.client
            .send_json(
                Method::PUT,
                SERVICE_IDENTITY,
                &format!("projects/{}/users/{}/roles/{}", project_id, user_id, role_id),
                None,
            )
            .await?;
        info!(username = %username, project_id = %project_id, "Assigned role");
        Ok(())
    }

    async fn remove_role_from_user(&self, username: &str, project_id: &str) -> Result<()> {
        let Some(user_id) = self.find_user(username).await? else {
            debug!(username = %username, "User does not exist, nothing to remove");
            return Ok(());
        };
        let role_id = self.role_id().await?;
        let removed = self
            .client
            .delete(
                SERVICE_IDENTITY,
                &format!("projects/{}/users/{}/roles/{}", project_id, user_id, role_id),
            )
            .await
            .map_err(NimbusError::from)
            .optional()?;
        if removed.is_some() {
            info!(username = %username, project_id = %project_id, "Removed role");
        }
        Ok(())
    }

    async fn get_or_create_federated_user(&self, username: &str) -> Result<FederatedUser> {
        if let Some(user_id) = self.find_user(username).await? {
            return Ok(FederatedUser {
                username: username.to_string(),
                user_id,
            });
        }

        let body = json!({"user": {
            "name": username,
            "domain_id": self.settings.user_domain,
            "email": username,
            "federated": [{
                "idp_id": self.settings.idp,
                "protocols": [{
                    "protocol_id": self.settings.protocol,
                    "unique_id": username,
                }]
            }]
        }});
        let created = self
            .client
            .send_json(Method::POST, SERVICE_IDENTITY, "users", Some(&body))
            .await?;
        let user_id = required_str(&created["user"]["id"], "user id")?;

        info!(username = %username, user_id = %user_id, "Created federated user");
        Ok(FederatedUser {
            username: username.to_string(),
            user_id,
        })
    }
}

impl std::fmt::Debug for OpenStackAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenStackAllocator")
            .field("kind", &self.kind)
            .field("resource", &self.resource.name)
            .field("allocation", &self.allocation.id())
            .finish_non_exhaustive()
    }
}
