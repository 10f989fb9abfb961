//! Backend registration and command context assembly

use std::sync::Arc;

use anyhow::Context as _;
use tracing::{info, warn};

use nimbus_common::{NimbusError, Resource, ResourceKind};
use nimbus_plugin::PluginRegistry;
use nimbus_plugin_openshift::{OpenShiftConfig, OpenShiftPlugin};
use nimbus_plugin_openstack::{OpenStackPlugin, OpenStackPluginConfig};

use crate::commands::Context;
use crate::config::Configuration;
use crate::inventory::FileInventory;

fn needs_openshift(resources: &[Resource]) -> bool {
    resources.iter().any(|r| {
        matches!(
            r.kind(),
            Some(ResourceKind::OpenShift | ResourceKind::OpenShiftVm)
        )
    })
}

/// Register every backend
///
/// OpenShift backends need limit ranges. Without an `openshift` section they
/// stay unregistered, unless the inventory holds OpenShift resources, in which
/// case startup fails.
pub async fn build_registry(
    openstack: OpenStackPluginConfig,
    openshift: Option<OpenShiftConfig>,
    resources: &[Resource],
) -> anyhow::Result<PluginRegistry> {
    let mut registry = PluginRegistry::new();
    registry.register(Arc::new(OpenStackPlugin::new(openstack)?));

    match openshift {
        Some(config) => {
            let plugin = OpenShiftPlugin::new(config).context("invalid openshift configuration")?;
            registry.register(Arc::new(plugin));
        }
        None if needs_openshift(resources) => {
            return Err(NimbusError::Config(
                "inventory has OpenShift resources but no openshift section is configured"
                    .to_string(),
            )
            .into());
        }
        None => warn!("No openshift configuration; OpenShift resources are unsupported"),
    }

    registry.init_all().await?;
    info!(plugins = ?registry.list(), "Backends registered");
    Ok(registry)
}

pub async fn build_context(configuration: &Configuration) -> anyhow::Result<Context> {
    let inventory_path = configuration.inventory_path();
    let inventory = Arc::new(
        FileInventory::open(&inventory_path)
            .with_context(|| format!("failed to load inventory {}", inventory_path))?,
    );

    let registry = build_registry(
        configuration.openstack(),
        configuration.openshift()?,
        &inventory.snapshot().resources,
    )
    .await?;

    Ok(Context {
        registry: Arc::new(registry),
        source: inventory.clone(),
        store: inventory,
        task: configuration.task()?,
        concurrency: configuration.reconcile_concurrency(),
    })
}
