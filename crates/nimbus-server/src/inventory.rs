//! JSON file inventory of resources and allocations
//!
//! Stands in for the allocation-management application when Nimbus runs
//! standalone. Every write rewrites the whole file through a temporary file in
//! the same directory followed by a rename, so readers never see a partial
//! document.
//!
//! ```json
//! {
//!   "resources": [{"name": "NERC", "resource_type": "OpenStack", "attributes": {}}],
//!   "allocations": [{"id": "1", "status": "active", "quantity": 1,
//!                    "resource_name": "NERC", "attributes": {}}]
//! }
//! ```

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use nimbus_common::{
    Allocation, AllocationSource, AttributeStore, AttributeValue, NimbusError, Resource, Result,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryAllocation {
    #[serde(flatten)]
    pub allocation: Allocation,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryDocument {
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub allocations: Vec<InventoryAllocation>,
}

impl InventoryDocument {
    fn allocation_mut(&mut self, id: &str) -> Option<&mut InventoryAllocation> {
        self.allocations.iter_mut().find(|a| a.allocation.id == id)
    }
}

pub struct FileInventory {
    path: PathBuf,
    document: Mutex<InventoryDocument>,
}

impl FileInventory {
    /// Load an inventory; a missing file is an empty inventory
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let document = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|e| store_error(&path, e))?;
            serde_json::from_str(&raw)?
        } else {
            InventoryDocument::default()
        };
        debug!(
            path = %path.display(),
            resources = document.resources.len(),
            allocations = document.allocations.len(),
            "Loaded inventory"
        );
        Ok(Self {
            path,
            document: Mutex::new(document),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> InventoryDocument {
        self.document.lock().clone()
    }

    /// Apply `change` to a copy, write it out, and only then make it current
    fn update(&self, change: impl FnOnce(&mut InventoryDocument) -> Result<()>) -> Result<()> {
        let mut current = self.document.lock();
        let mut next = current.clone();
        change(&mut next)?;
        self.persist(&next)?;
        *current = next;
        Ok(())
    }

    fn persist(&self, document: &InventoryDocument) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let json = serde_json::to_vec_pretty(document)?;

        let mut file = tempfile::NamedTempFile::new_in(&dir).map_err(|e| store_error(&dir, e))?;
        file.write_all(&json)
            .and_then(|_| file.as_file().sync_all())
            .map_err(|e| store_error(&self.path, e))?;
        file.persist(&self.path)
            .map_err(|e| store_error(&self.path, e.error))?;
        Ok(())
    }
}

fn store_error(path: &Path, error: std::io::Error) -> NimbusError {
    NimbusError::Store(format!("{}: {}", path.display(), error))
}

#[async_trait]
impl AttributeStore for FileInventory {
    async fn get_attribute(
        &self,
        allocation_id: &str,
        name: &str,
    ) -> Result<Option<AttributeValue>> {
        let document = self.document.lock();
        Ok(document
            .allocations
            .iter()
            .find(|a| a.allocation.id == allocation_id)
            .and_then(|a| a.attributes.get(name).cloned()))
    }

    async fn set_attribute(
        &self,
        allocation_id: &str,
        name: &str,
        value: AttributeValue,
    ) -> Result<()> {
        self.update(|document| {
            let entry = document
                .allocation_mut(allocation_id)
                .ok_or_else(|| NimbusError::not_found(format!("allocation {}", allocation_id)))?;
            entry.attributes.insert(name.to_string(), value);
            Ok(())
        })
    }
}

#[async_trait]
impl AllocationSource for FileInventory {
    async fn allocation(&self, id: &str) -> Result<Option<Allocation>> {
        let document = self.document.lock();
        Ok(document
            .allocations
            .iter()
            .find(|a| a.allocation.id == id)
            .map(|a| a.allocation.clone()))
    }

    async fn active_allocations(&self) -> Result<Vec<Allocation>> {
        let document = self.document.lock();
        Ok(document
            .allocations
            .iter()
            .filter(|a| a.allocation.status.is_active())
            .map(|a| a.allocation.clone())
            .collect())
    }

    async fn resource(&self, name: &str) -> Result<Option<Resource>> {
        let document = self.document.lock();
        Ok(document.resources.iter().find(|r| r.name == name).cloned())
    }

    async fn save_resource(&self, resource: &Resource) -> Result<()> {
        self.update(|document| {
            match document.resources.iter_mut().find(|r| r.name == resource.name) {
                Some(existing) => *existing = resource.clone(),
                None => document.resources.push(resource.clone()),
            }
            Ok(())
        })
    }
}
