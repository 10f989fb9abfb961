//! Context traits for dependency injection
//!
//! The allocation-management application owns allocation and resource
//! persistence. These traits are the only way Nimbus reaches it.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Allocation, AttributeValue, Resource};

/// Key-value attribute store scoped per allocation
///
/// `set_attribute` is an upsert by name. Reads issued after a write within
/// the same call observe the written value.
#[async_trait]
pub trait AttributeStore: Send + Sync {
    async fn get_attribute(
        &self,
        allocation_id: &str,
        name: &str,
    ) -> Result<Option<AttributeValue>>;

    async fn set_attribute(
        &self,
        allocation_id: &str,
        name: &str,
        value: AttributeValue,
    ) -> Result<()>;
}

/// Read access to allocation and resource records
#[async_trait]
pub trait AllocationSource: Send + Sync {
    /// Get allocation by ID
    async fn allocation(&self, id: &str) -> Result<Option<Allocation>>;

    /// All allocations whose status is active
    async fn active_allocations(&self) -> Result<Vec<Allocation>>;

    /// Get resource by name
    async fn resource(&self, name: &str) -> Result<Option<Resource>>;

    /// Persist a resource's attributes (quota spec document edits)
    async fn save_resource(&self, resource: &Resource) -> Result<()>;
}
