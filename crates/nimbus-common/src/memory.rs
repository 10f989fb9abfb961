//! In-memory attribute store and allocation source
//!
//! Backs tests and dry runs. Attributes are keyed by allocation ID then
//! attribute name.

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;
use crate::model::{Allocation, AttributeValue, Resource};
use crate::traits::{AllocationSource, AttributeStore};

#[derive(Default)]
pub struct InMemoryStore {
    allocations: DashMap<String, Allocation>,
    resources: DashMap<String, Resource>,
    attributes: DashMap<String, BTreeMap<String, AttributeValue>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_allocation(&self, allocation: Allocation) {
        self.allocations.insert(allocation.id.clone(), allocation);
    }

    pub fn insert_resource(&self, resource: Resource) {
        self.resources.insert(resource.name.clone(), resource);
    }

    /// Snapshot of one allocation's attributes
    pub fn attributes_of(&self, allocation_id: &str) -> BTreeMap<String, AttributeValue> {
        self.attributes
            .get(allocation_id)
            .map(|a| a.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AttributeStore for InMemoryStore {
    async fn get_attribute(
        &self,
        allocation_id: &str,
        name: &str,
    ) -> Result<Option<AttributeValue>> {
        Ok(self
            .attributes
            .get(allocation_id)
            .and_then(|attrs| attrs.get(name).cloned()))
    }

    async fn set_attribute(
        &self,
        allocation_id: &str,
        name: &str,
        value: AttributeValue,
    ) -> Result<()> {
        self.attributes
            .entry(allocation_id.to_string())
            .or_default()
            .insert(name.to_string(), value);
        Ok(())
    }
}

#[async_trait]
impl AllocationSource for InMemoryStore {
    async fn allocation(&self, id: &str) -> Result<Option<Allocation>> {
        Ok(self.allocations.get(id).map(|a| a.clone()))
    }

    async fn active_allocations(&self) -> Result<Vec<Allocation>> {
        let mut active: Vec<Allocation> = self
            .allocations
            .iter()
            .filter(|a| a.status.is_active())
            .map(|a| a.clone())
            .collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(active)
    }

    async fn resource(&self, name: &str) -> Result<Option<Resource>> {
        Ok(self.resources.get(name).map(|r| r.clone()))
    }

    async fn save_resource(&self, resource: &Resource) -> Result<()> {
        self.resources
            .insert(resource.name.clone(), resource.clone());
        Ok(())
    }
}
