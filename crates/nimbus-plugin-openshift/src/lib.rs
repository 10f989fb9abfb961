//! Nimbus OpenShift Plugin - OpenShift and OpenShift-VM backends
//!
//! This crate provides:
//! - A dynamic resource client over kube with per-kind API caching
//! - Projects, resource quotas, limit ranges and role bindings
//! - User, identity and identity-mapping creation for federated users
//! - An in-memory client for tests and dry runs

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::info;

use nimbus_common::attributes::RESOURCE_API_URL;
use nimbus_common::{AllocationHandle, Resource, ResourceKind, Result};
use nimbus_plugin::{Allocator, AllocatorPlugin, Plugin};

pub mod allocator;
pub mod client;
pub mod config;
pub mod error;
pub mod memory;

pub use allocator::{OpenShiftAllocator, PROJECT_NAME_MAX_LENGTH, ROLES};
pub use client::{KubeResourceClient, ObjectKind, ResourceClient};
pub use config::{OpenShiftConfig, token_from_env, token_var};
pub use error::OpenShiftError;
pub use memory::InMemoryResourceClient;

/// Builds OpenShift allocators, one API client per resource
pub struct OpenShiftPlugin {
    config: Arc<OpenShiftConfig>,
    clients: DashMap<String, Arc<dyn ResourceClient>>,
}

impl OpenShiftPlugin {
    /// Fails when no limit ranges are configured
    pub fn new(config: OpenShiftConfig) -> anyhow::Result<Self> {
        config.require_limits()?;
        Ok(Self {
            config: Arc::new(config),
            clients: DashMap::new(),
        })
    }

    /// Use `client` for every allocator of `resource_name`
    pub fn with_client(
        self,
        resource_name: impl Into<String>,
        client: Arc<dyn ResourceClient>,
    ) -> Self {
        self.clients.insert(resource_name.into(), client);
        self
    }

    fn client_for(&self, resource: &Resource) -> Result<Arc<dyn ResourceClient>> {
        if let Some(client) = self.clients.get(&resource.name) {
            return Ok(client.clone());
        }
        let api_url = resource.require_attribute(RESOURCE_API_URL)?;
        let token = token_from_env(&resource.name)?;
        let client: Arc<dyn ResourceClient> =
            Arc::new(KubeResourceClient::connect(api_url, token)?);
        info!(resource = %resource.name, api_url = %api_url, "Connected to OpenShift API");
        self.clients.insert(resource.name.clone(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Plugin for OpenShiftPlugin {
    fn name(&self) -> &str {
        "openshift"
    }

    async fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        self.clients.clear();
        Ok(())
    }
}

#[async_trait]
impl AllocatorPlugin for OpenShiftPlugin {
    fn kinds(&self) -> &[ResourceKind] {
        &[ResourceKind::OpenShift, ResourceKind::OpenShiftVm]
    }

    async fn build(
        &self,
        resource: &Resource,
        allocation: AllocationHandle,
    ) -> Result<Box<dyn Allocator>> {
        let client = self.client_for(resource)?;
        let allocator =
            OpenShiftAllocator::new(resource.clone(), allocation, client, self.config.clone())?;
        Ok(Box::new(allocator))
    }
}
