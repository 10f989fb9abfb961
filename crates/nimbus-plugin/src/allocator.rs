//! Provider Allocator SPI
//!
//! Every backend (OpenStack, OpenShift, OpenShift-VM, ESI) implements
//! [`Allocator`]. An allocator is built per allocation: it reads the
//! allocation's stored quota values through its [`AllocationHandle`] and keeps
//! at most one cached provider session for the duration of a call.
//!
//! Read operations map a provider not-found to `None`; authorization and API
//! failures propagate. Role assignment and removal are idempotent.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use nimbus_common::{AllocationHandle, Resource, ResourceKind, Result};
use nimbus_quota::{ObservedQuota, QuotaCategory, QuotaSpec, QuotaSpecDocument};

use crate::shape::ShapedProject;

/// Identity returned by project creation
///
/// `id` is the durable provider identifier; `name` is the sanitized unique
/// name actually used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectIdentity {
    pub name: String,
    pub id: String,
}

/// Provider-side view of a project
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Provider identity linked to an application username
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedUser {
    pub username: String,
    /// Provider user ID (OpenStack) or user object name (OpenShift)
    pub user_id: String,
}

/// One configured quota with the allocation's current stored value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredQuota {
    pub display_name: String,
    pub spec: QuotaSpec,
    pub value: Option<i64>,
}

#[async_trait]
pub trait Allocator: Send + Sync {
    fn kind(&self) -> ResourceKind;

    fn resource(&self) -> &Resource;

    fn allocation(&self) -> &AllocationHandle;

    fn quota_specs(&self) -> &QuotaSpecDocument;

    /// Maximum provider project name length
    fn project_name_max_length(&self) -> usize;

    /// Whether `get_quota` and `set_quota` cover quotas of this category
    fn manages_quota(&self, _category: QuotaCategory) -> bool {
        true
    }

    /// Create a project under a sanitized, uniquely suffixed name
    async fn create_project(&self, suggested_name: &str) -> Result<ProjectIdentity>;

    /// `None` when the project does not exist
    async fn get_project(&self, project_id: &str) -> Result<Option<ProjectInfo>>;

    async fn disable_project(&self, project_id: &str) -> Result<()>;

    async fn reactivate_project(&self, project_id: &str) -> Result<()>;

    /// One-time backend setup for a fresh project; skips what already exists
    async fn create_project_defaults(&self, project_id: &str) -> Result<()>;

    async fn get_quota(&self, project_id: &str) -> Result<ObservedQuota>;

    /// Apply every configured quota from the allocation's stored values
    async fn set_quota(&self, project_id: &str) -> Result<()>;

    /// Usernames holding any recognized role on the project
    async fn get_users(&self, project_id: &str) -> Result<BTreeSet<String>>;

    async fn assign_role_on_user(&self, username: &str, project_id: &str) -> Result<()>;

    async fn remove_role_from_user(&self, username: &str, project_id: &str) -> Result<()>;

    async fn get_or_create_federated_user(&self, username: &str) -> Result<FederatedUser>;

    /// Label and limit-range reconciliation, for backends that have them
    fn shaped(&self) -> Option<&dyn ShapedProject> {
        None
    }
}

/// Every configured quota paired with the allocation's stored value
pub async fn stored_quota_values(
    allocation: &AllocationHandle,
    specs: &QuotaSpecDocument,
) -> Result<Vec<StoredQuota>> {
    let mut values = Vec::with_capacity(specs.len());
    for (display_name, spec) in specs.iter() {
        values.push(StoredQuota {
            display_name: display_name.clone(),
            spec: spec.clone(),
            value: allocation.get_int(display_name).await?,
        });
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use nimbus_common::{Allocation, InMemoryStore};
    use nimbus_quota::QuotaCategory;

    #[tokio::test]
    async fn test_stored_quota_values() {
        let store = Arc::new(InMemoryStore::new());
        let handle = AllocationHandle::new(Allocation::new("1", "cloud", 1), store.clone());
        handle.set("vCPU", 4).await.unwrap();

        let mut specs = QuotaSpecDocument::new();
        specs
            .add("vCPU", QuotaSpec::new("cores", QuotaCategory::Compute))
            .unwrap();
        specs
            .add("RAM", QuotaSpec::new("ram", QuotaCategory::Compute))
            .unwrap();

        let values = stored_quota_values(&handle, &specs).await.unwrap();
        assert_eq!(values.len(), 2);
        let ram = values.iter().find(|v| v.display_name == "RAM").unwrap();
        assert_eq!(ram.value, None);
        let cpu = values.iter().find(|v| v.display_name == "vCPU").unwrap();
        assert_eq!(cpu.value, Some(4));
    }
}
