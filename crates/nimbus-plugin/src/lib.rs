//! Nimbus Plugin - Provider allocator SPI definitions
//!
//! This crate provides:
//! - Plugin traits and lifecycle management
//! - The `Allocator` capability set every cloud backend implements
//! - `ShapedProject` for backends with namespace labels and limit ranges
//! - A registry resolving a resource's type to its backend

use std::sync::Arc;

use async_trait::async_trait;

use nimbus_common::{AllocationHandle, Resource, ResourceKind, Result};

pub mod allocator;
pub mod shape;

pub use allocator::{
    Allocator, FederatedUser, ProjectIdentity, ProjectInfo, StoredQuota, stored_quota_values,
};
pub use shape::{LimitRangeItem, ShapedProject};

/// Plugin trait for extensibility
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Get the plugin name
    fn name(&self) -> &str;

    /// Initialize the plugin; a configuration error here aborts startup
    async fn init(&self) -> anyhow::Result<()>;

    /// Shutdown the plugin
    async fn shutdown(&self) -> anyhow::Result<()>;
}

/// A backend plugin that builds allocators for its resource kinds
#[async_trait]
pub trait AllocatorPlugin: Plugin {
    /// Resource kinds this plugin serves
    fn kinds(&self) -> &[ResourceKind];

    /// Build an allocator bound to one resource and allocation
    async fn build(
        &self,
        resource: &Resource,
        allocation: AllocationHandle,
    ) -> Result<Box<dyn Allocator>>;
}

/// Plugin registry for managing backend plugins
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn AllocatorPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// Register a plugin
    pub fn register(&mut self, plugin: Arc<dyn AllocatorPlugin>) {
        self.plugins.push(plugin);
    }

    /// Initialize all plugins
    pub async fn init_all(&self) -> anyhow::Result<()> {
        for plugin in &self.plugins {
            plugin.init().await?;
            tracing::info!("Plugin '{}' initialized", plugin.name());
        }
        Ok(())
    }

    /// Shutdown all plugins
    pub async fn shutdown_all(&self) -> anyhow::Result<()> {
        for plugin in self.plugins.iter().rev() {
            plugin.shutdown().await?;
            tracing::info!("Plugin '{}' shutdown", plugin.name());
        }
        Ok(())
    }

    /// Get plugin by name
    pub fn get(&self, name: &str) -> Option<&dyn AllocatorPlugin> {
        self.plugins
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }

    /// List all plugin names
    pub fn list(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Plugin serving a resource kind
    pub fn for_kind(&self, kind: ResourceKind) -> Option<&dyn AllocatorPlugin> {
        self.plugins
            .iter()
            .find(|p| p.kinds().contains(&kind))
            .map(|p| p.as_ref())
    }

    pub fn supports(&self, resource: &Resource) -> bool {
        resource.kind().and_then(|k| self.for_kind(k)).is_some()
    }

    /// Allocator for the resource, or `None` when no plugin serves its type
    pub async fn resolve(
        &self,
        resource: &Resource,
        allocation: AllocationHandle,
    ) -> Result<Option<Box<dyn Allocator>>> {
        let Some(plugin) = resource.kind().and_then(|k| self.for_kind(k)) else {
            tracing::debug!(
                resource = %resource.name,
                resource_type = %resource.resource_type,
                "No backend for resource type"
            );
            return Ok(None);
        };
        plugin.build(resource, allocation).await.map(Some)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_common::{Allocation, InMemoryStore, NimbusError};

    struct NullPlugin;

    #[async_trait]
    impl Plugin for NullPlugin {
        fn name(&self) -> &str {
            "null"
        }

        async fn init(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn shutdown(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl AllocatorPlugin for NullPlugin {
        fn kinds(&self) -> &[ResourceKind] {
            &[ResourceKind::Esi]
        }

        async fn build(
            &self,
            resource: &Resource,
            _allocation: AllocationHandle,
        ) -> Result<Box<dyn Allocator>> {
            Err(NimbusError::Config(format!("cannot build for {}", resource.name)))
        }
    }

    #[tokio::test]
    async fn test_registry_lookup() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(NullPlugin));
        registry.init_all().await.unwrap();

        assert_eq!(registry.list(), vec!["null"]);
        assert!(registry.get("null").is_some());
        assert!(registry.get("other").is_none());
        assert!(registry.for_kind(ResourceKind::Esi).is_some());
        assert!(registry.for_kind(ResourceKind::OpenStack).is_none());
        assert!(registry.supports(&Resource::new("esi", "esi")));
        assert!(!registry.supports(&Resource::new("hpc", "Cluster")));

        registry.shutdown_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_resolve_unsupported_is_none() {
        let registry = PluginRegistry::new();
        let store = Arc::new(InMemoryStore::new());
        let handle = AllocationHandle::new(Allocation::new("1", "hpc", 1), store);

        let resolved = registry
            .resolve(&Resource::new("hpc", "Cluster"), handle)
            .await
            .unwrap();
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn test_resolve_propagates_build_error() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(NullPlugin));
        let store = Arc::new(InMemoryStore::new());
        let handle = AllocationHandle::new(Allocation::new("1", "esi", 1), store);

        let result = registry.resolve(&Resource::new("esi", "esi"), handle).await;
        assert!(matches!(result, Err(NimbusError::Config(_))));
    }
}
