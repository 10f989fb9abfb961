//! Project shape: labels and limit ranges
//!
//! OpenShift-style backends carry namespace labels and default
//! limit/request ranges that reconciliation keeps in line with configuration.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use nimbus_common::Result;

/// One entry of a limit range (`spec.limits[*]`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitRangeItem {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub default: BTreeMap<String, String>,
    #[serde(
        default,
        alias = "defaultrequest",
        alias = "default_request",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub default_request: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub min: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub max: BTreeMap<String, String>,
}

impl LimitRangeItem {
    pub fn new(type_: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            ..Default::default()
        }
    }

    pub fn with_default(mut self, resource: &str, value: &str) -> Self {
        self.default.insert(resource.to_string(), value.to_string());
        self
    }

    pub fn with_default_request(mut self, resource: &str, value: &str) -> Self {
        self.default_request
            .insert(resource.to_string(), value.to_string());
        self
    }

    pub fn with_min(mut self, resource: &str, value: &str) -> Self {
        self.min.insert(resource.to_string(), value.to_string());
        self
    }

    pub fn with_max(mut self, resource: &str, value: &str) -> Self {
        self.max.insert(resource.to_string(), value.to_string());
        self
    }

    /// Named field maps, in reporting order
    pub fn fields(&self) -> [(&'static str, &BTreeMap<String, String>); 4] {
        [
            ("default", &self.default),
            ("defaultRequest", &self.default_request),
            ("min", &self.min),
            ("max", &self.max),
        ]
    }
}

#[async_trait]
pub trait ShapedProject: Send + Sync {
    /// Labels every project must carry
    fn default_labels(&self) -> &BTreeMap<String, String>;

    /// `None` when the project does not exist
    async fn get_project_labels(
        &self,
        project_id: &str,
    ) -> Result<Option<BTreeMap<String, String>>>;

    /// Merge labels into the project, keeping labels not mentioned
    async fn merge_project_labels(
        &self,
        project_id: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Configured limit range entries
    fn expected_limits(&self) -> &[LimitRangeItem];

    /// `None` when the project has no limit range
    async fn get_limits(&self, project_id: &str) -> Result<Option<Vec<LimitRangeItem>>>;

    /// Drop existing limit ranges and create the configured one
    async fn replace_limits(&self, project_id: &str) -> Result<()>;
}
