//! Allocation and resource records
//!
//! These records are owned by the surrounding application. Nimbus reads them
//! and writes back only through [`AttributeStore::set_attribute`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{NimbusError, Result};
use crate::traits::AttributeStore;

/// Cloud backend type of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    OpenStack,
    OpenShift,
    OpenShiftVm,
    Esi,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::OpenStack => "openstack",
            ResourceKind::OpenShift => "openshift",
            ResourceKind::OpenShiftVm => "openshift_vm",
            ResourceKind::Esi => "esi",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openstack" => Ok(ResourceKind::OpenStack),
            "openshift" => Ok(ResourceKind::OpenShift),
            "openshift_vm" | "openshift virtualization" => Ok(ResourceKind::OpenShiftVm),
            "esi" => Ok(ResourceKind::Esi),
            _ => Err(format!("Unsupported resource type: {}", s)),
        }
    }
}

/// A configured cloud backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub resource_type: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Resource {
    pub fn new(name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_type: resource_type.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Backend type, or `None` for resource types no backend handles
    pub fn kind(&self) -> Option<ResourceKind> {
        self.resource_type.parse().ok()
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn require_attribute(&self, name: &str) -> Result<&str> {
        self.attribute(name).ok_or_else(|| {
            NimbusError::Config(format!(
                "resource '{}' is missing attribute '{}'",
                self.name, name
            ))
        })
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }
}

/// Allocation lifecycle status as tracked by the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStatus {
    #[default]
    New,
    Active,
    ActiveNeedsRenewal,
    Denied,
    Expired,
    Revoked,
    Inactive,
}

impl AllocationStatus {
    /// Whether reconciliation should look at allocations in this status
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AllocationStatus::Active | AllocationStatus::ActiveNeedsRenewal
        )
    }
}

/// Snapshot of an allocation record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: String,
    #[serde(default)]
    pub status: AllocationStatus,
    /// Service units; scales every quota spec
    pub quantity: i64,
    #[serde(default)]
    pub project_title: String,
    #[serde(default)]
    pub pi_username: String,
    /// Usernames of active allocation members
    #[serde(default)]
    pub members: BTreeSet<String>,
    pub resource_name: String,
}

impl Allocation {
    pub fn new(id: impl Into<String>, resource_name: impl Into<String>, quantity: i64) -> Self {
        Self {
            id: id.into(),
            resource_name: resource_name.into(),
            quantity,
            ..Default::default()
        }
    }

    pub fn with_pi(mut self, username: impl Into<String>) -> Self {
        let username = username.into();
        self.members.insert(username.clone());
        self.pi_username = username;
        self
    }

    pub fn with_member(mut self, username: impl Into<String>) -> Self {
        self.members.insert(username.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.project_title = title.into();
        self
    }

    pub fn with_status(mut self, status: AllocationStatus) -> Self {
        self.status = status;
        self
    }
}

/// Value of a stored attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Int(i64),
    Text(String),
}

impl AttributeValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(v) => Some(*v),
            AttributeValue::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_text(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Int(value as i64)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

/// An allocation together with the store its attributes live in
#[derive(Clone)]
pub struct AllocationHandle {
    pub allocation: Allocation,
    store: Arc<dyn AttributeStore>,
}

impl AllocationHandle {
    pub fn new(allocation: Allocation, store: Arc<dyn AttributeStore>) -> Self {
        Self { allocation, store }
    }

    pub fn id(&self) -> &str {
        &self.allocation.id
    }

    pub fn quantity(&self) -> i64 {
        self.allocation.quantity
    }

    pub async fn get(&self, name: &str) -> Result<Option<AttributeValue>> {
        self.store.get_attribute(&self.allocation.id, name).await
    }

    /// Integer attribute; a non-numeric stored value is a parse error
    pub async fn get_int(&self, name: &str) -> Result<Option<i64>> {
        match self.get(name).await? {
            None => Ok(None),
            Some(v) => v.as_int().map(Some).ok_or_else(|| {
                NimbusError::Parse(format!(
                    "attribute '{}' of allocation {} is not an integer: {}",
                    name, self.allocation.id, v
                ))
            }),
        }
    }

    pub async fn get_text(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .get(name)
            .await?
            .map(|v| v.as_text())
            .filter(|s| !s.is_empty()))
    }

    pub async fn set(&self, name: &str, value: impl Into<AttributeValue>) -> Result<()> {
        self.store
            .set_attribute(&self.allocation.id, name, value.into())
            .await
    }
}

impl std::fmt::Debug for AllocationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocationHandle")
            .field("allocation", &self.allocation)
            .finish_non_exhaustive()
    }
}
