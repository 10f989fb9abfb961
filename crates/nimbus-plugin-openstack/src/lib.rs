//! Nimbus OpenStack Plugin - OpenStack and ESI backends
//!
//! This crate provides:
//! - Keystone application-credential sessions with a cached service catalog
//! - Quota get/set across Nova, Cinder, Neutron and Swift
//! - Federated user lookup and creation, role assignment
//! - Default network setup for fresh projects

use std::time::Duration;

use async_trait::async_trait;

use nimbus_common::{AllocationHandle, Resource, ResourceKind, Result};
use nimbus_plugin::{Allocator, AllocatorPlugin, Plugin};

pub mod allocator;
pub mod credentials;
pub mod error;
pub mod quota;
pub mod session;

pub use allocator::{OpenStackAllocator, OpenStackSettings, PROJECT_NAME_MAX_LENGTH};
pub use credentials::ApplicationCredential;
pub use error::OpenStackError;
pub use session::OpenStackClient;

/// HTTP settings shared by every OpenStack allocator
#[derive(Debug, Clone)]
pub struct OpenStackPluginConfig {
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
}

impl Default for OpenStackPluginConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            read_timeout_ms: 60_000,
        }
    }
}

/// Builds OpenStack and ESI allocators with credentials from the environment
pub struct OpenStackPlugin {
    http: reqwest::Client,
}

impl OpenStackPlugin {
    pub fn new(config: OpenStackPluginConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Plugin for OpenStackPlugin {
    fn name(&self) -> &str {
        "openstack"
    }

    async fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl AllocatorPlugin for OpenStackPlugin {
    fn kinds(&self) -> &[ResourceKind] {
        &[ResourceKind::OpenStack, ResourceKind::Esi]
    }

    async fn build(
        &self,
        resource: &Resource,
        allocation: AllocationHandle,
    ) -> Result<Box<dyn Allocator>> {
        let credential = ApplicationCredential::from_env(&resource.name)?;
        let allocator =
            OpenStackAllocator::new(resource.clone(), allocation, self.http.clone(), credential)?;
        Ok(Box::new(allocator))
    }
}
