//! Configuration management for Nimbus
//!
//! `conf/application.yml` (optional) layered under `NIMBUS`-prefixed
//! environment variables, with command line overrides on top.

use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::de::DeserializeOwned;

use nimbus_core::TaskConfig;
use nimbus_plugin_openshift::OpenShiftConfig;
use nimbus_plugin_openstack::OpenStackPluginConfig;

pub const DEFAULT_CONFIG_PATH: &str = "conf/application.yml";
pub const DEFAULT_INVENTORY_PATH: &str = "data/inventory.json";
const DEFAULT_RECONCILE_CONCURRENCY: i64 = 4;

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn load(path: &Path, inventory: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("NIMBUS")
                    .separator(".")
                    .try_parsing(true),
            );

        if let Some(inventory) = inventory {
            builder = builder.set_override("inventory.path", inventory)?;
        }

        Ok(Configuration {
            config: builder.build()?,
        })
    }

    fn section<T: DeserializeOwned + Default>(&self, key: &str) -> anyhow::Result<T> {
        match self.config.get::<T>(key) {
            Ok(value) => Ok(value),
            Err(ConfigError::NotFound(_)) => Ok(T::default()),
            Err(e) => Err(anyhow::anyhow!("invalid '{}' configuration: {}", key, e)),
        }
    }

    pub fn inventory_path(&self) -> String {
        self.config
            .get_string("inventory.path")
            .unwrap_or(DEFAULT_INVENTORY_PATH.to_string())
    }

    pub fn reconcile_concurrency(&self) -> usize {
        self.config
            .get_int("reconcile.concurrency")
            .unwrap_or(DEFAULT_RECONCILE_CONCURRENCY)
            .max(1) as usize
    }

    pub fn task(&self) -> anyhow::Result<TaskConfig> {
        self.section("task")
    }

    /// `None` when the section is absent, so OpenShift backends stay unregistered
    pub fn openshift(&self) -> anyhow::Result<Option<OpenShiftConfig>> {
        match self.config.get::<OpenShiftConfig>("openshift") {
            Ok(value) => Ok(Some(value)),
            Err(ConfigError::NotFound(_)) => Ok(None),
            Err(e) => Err(anyhow::anyhow!("invalid 'openshift' configuration: {}", e)),
        }
    }

    pub fn openstack(&self) -> OpenStackPluginConfig {
        let defaults = OpenStackPluginConfig::default();
        OpenStackPluginConfig {
            connect_timeout_ms: self
                .config
                .get_int("openstack.connect_timeout_ms")
                .map(|v| v as u64)
                .unwrap_or(defaults.connect_timeout_ms),
            read_timeout_ms: self
                .config
                .get_int("openstack.read_timeout_ms")
                .map(|v| v as u64)
                .unwrap_or(defaults.read_timeout_ms),
        }
    }
}
