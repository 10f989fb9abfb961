//! OpenShift backend configuration
//!
//! Default namespace labels and default limit ranges. Limit ranges have no
//! sensible fallback, so a backend cannot be built without them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use nimbus_common::{NimbusError, Result, env_key};
use nimbus_plugin::LimitRangeItem;

fn default_labels() -> BTreeMap<String, String> {
    [
        ("opendatahub.io/dashboard", "true"),
        ("modelmesh-enabled", "true"),
        ("nerc.mghpcc.org/allow-unencrypted-routes", "true"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenShiftConfig {
    /// Labels every project must carry
    #[serde(default = "default_labels")]
    pub default_labels: BTreeMap<String, String>,

    /// Limit range entries applied to every project
    #[serde(default)]
    pub limits: Option<Vec<LimitRangeItem>>,
}

impl Default for OpenShiftConfig {
    fn default() -> Self {
        Self {
            default_labels: default_labels(),
            limits: None,
        }
    }
}

impl OpenShiftConfig {
    pub fn with_limits(mut self, limits: Vec<LimitRangeItem>) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Configured limit ranges; absent or empty is a configuration error
    pub fn require_limits(&self) -> Result<&[LimitRangeItem]> {
        match &self.limits {
            Some(limits) if !limits.is_empty() => Ok(limits),
            _ => Err(NimbusError::Config(
                "openshift.limits must define at least one limit range".to_string(),
            )),
        }
    }
}

/// Bearer token variable for a resource: `OPENSHIFT_<RESOURCE>_TOKEN`
pub fn token_var(resource_name: &str) -> String {
    format!("OPENSHIFT_{}_TOKEN", env_key(resource_name))
}

pub fn token_from_env(resource_name: &str) -> Result<String> {
    let var = token_var(resource_name);
    std::env::var(&var)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| NimbusError::Config(format!("{} is not set", var)))
}
