//! Quota specifications
//!
//! A resource carries a JSON document mapping quota display names to specs:
//!
//! ```json
//! {"OpenStack Compute vCPU Quota": {"label": "cores", "multiplier": 1,
//!   "static_quota": 0, "unit_suffix": "", "resource_type": "compute",
//!   "invoice_name": "CPU"}}
//! ```
//!
//! Labels are unique within a document. Removing a spec only affects
//! allocations computed afterwards; stored allocation values are untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use nimbus_common::attributes::RESOURCE_QUOTA_RESOURCES;
use nimbus_common::{NimbusError, Resource, Result};

use crate::units::{UnitKind, format_quantity};

/// Swift account metadata key holding the object-storage quota in bytes
pub const OBJECT_STORAGE_LABEL: &str = "x-account-meta-quota-bytes";

/// Byte quota written for a zero or unset object-storage quota; some
/// backends read a literal 0 as unlimited
pub const OBJECT_STORAGE_SENTINEL_BYTES: i64 = 1;

pub const GIB_BYTES: i64 = 1 << 30;

/// Bytes expected on the provider for a stored GiB value; zero or unset
/// becomes the sentinel
pub fn object_storage_bytes(gib: Option<i64>) -> i64 {
    match gib {
        Some(v) if v > 0 => v.saturating_mul(GIB_BYTES),
        _ => OBJECT_STORAGE_SENTINEL_BYTES,
    }
}

/// Stored GiB value for a provider byte quota; the sentinel reads back as zero
pub fn object_storage_gib(bytes: i64) -> i64 {
    if bytes == OBJECT_STORAGE_SENTINEL_BYTES {
        0
    } else {
        bytes / GIB_BYTES
    }
}

/// Provider sub-service a quota belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaCategory {
    Compute,
    Volume,
    Network,
    ObjectStorage,
    /// Single combined resource quota (OpenShift-style)
    Cluster,
}

impl std::fmt::Display for QuotaCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaCategory::Compute => write!(f, "compute"),
            QuotaCategory::Volume => write!(f, "volume"),
            QuotaCategory::Network => write!(f, "network"),
            QuotaCategory::ObjectStorage => write!(f, "object_storage"),
            QuotaCategory::Cluster => write!(f, "cluster"),
        }
    }
}

impl std::str::FromStr for QuotaCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "compute" => Ok(QuotaCategory::Compute),
            "volume" => Ok(QuotaCategory::Volume),
            "network" => Ok(QuotaCategory::Network),
            "object_storage" => Ok(QuotaCategory::ObjectStorage),
            "cluster" => Ok(QuotaCategory::Cluster),
            _ => Err(format!("Invalid quota category: {}", s)),
        }
    }
}

/// Linear rule deriving a provider quota from allocation service units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSpec {
    /// Provider-side quota key
    pub label: String,
    #[serde(default)]
    pub multiplier: i64,
    #[serde(default, rename = "static_quota")]
    pub static_addend: i64,
    #[serde(default)]
    pub unit_suffix: String,
    #[serde(rename = "resource_type")]
    pub category: QuotaCategory,
    #[serde(default)]
    pub invoice_name: String,
}

impl QuotaSpec {
    pub fn new(label: impl Into<String>, category: QuotaCategory) -> Self {
        Self {
            label: label.into(),
            multiplier: 0,
            static_addend: 0,
            unit_suffix: String::new(),
            category,
            invoice_name: String::new(),
        }
    }

    pub fn with_multiplier(mut self, multiplier: i64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_static(mut self, static_addend: i64) -> Self {
        self.static_addend = static_addend;
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.unit_suffix = suffix.into();
        self
    }

    pub fn with_invoice_name(mut self, name: impl Into<String>) -> Self {
        self.invoice_name = name.into();
        self
    }

    /// `static_addend + multiplier * quantity`, saturating
    pub fn quota_by_quantity(&self, quantity: i64) -> i64 {
        self.multiplier
            .saturating_mul(quantity.max(0))
            .saturating_add(self.static_addend)
    }

    /// How provider values for this quota are normalised
    pub fn unit_kind(&self) -> UnitKind {
        match self.unit_suffix.as_str() {
            "Mi" => UnitKind::Memory,
            "Gi" => UnitKind::Storage,
            _ if self.category == QuotaCategory::ObjectStorage => UnitKind::Storage,
            _ if self.label.ends_with("cpu") => UnitKind::Cpu,
            _ => UnitKind::Count,
        }
    }

    pub fn is_object_storage(&self) -> bool {
        self.category == QuotaCategory::ObjectStorage
    }

    /// Provider payload fragment for a stored value
    pub fn provider_entry(&self, value: i64) -> (String, String) {
        (self.label.clone(), format_quantity(value, &self.unit_suffix))
    }

    pub fn validate(&self) -> Result<()> {
        if self.label.trim().is_empty() {
            return Err(NimbusError::Parse("quota label must not be empty".to_string()));
        }
        if self.multiplier < 0 || self.static_addend < 0 {
            return Err(NimbusError::Parse(format!(
                "quota '{}' must have non-negative multiplier and static quota",
                self.label
            )));
        }
        Ok(())
    }
}

/// A resource's quota display name to spec mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuotaSpecDocument {
    specs: BTreeMap<String, QuotaSpec>,
}

impl QuotaSpecDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, QuotaSpec> = serde_json::from_str(json)?;
        let mut document = Self::new();
        for (name, spec) in raw {
            document.add(name, spec)?;
        }
        Ok(document)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.specs)?)
    }

    /// Document stored on a resource; an absent attribute is an empty document
    pub fn from_resource(resource: &Resource) -> Result<Self> {
        match resource.attribute(RESOURCE_QUOTA_RESOURCES) {
            Some(json) => Self::from_json(json),
            None => Ok(Self::new()),
        }
    }

    pub fn write_to(&self, resource: &mut Resource) -> Result<()> {
        resource.set_attribute(RESOURCE_QUOTA_RESOURCES, self.to_json()?);
        Ok(())
    }

    /// Insert or replace a spec, rejecting a label owned by another display name
    pub fn add(&mut self, display_name: impl Into<String>, spec: QuotaSpec) -> Result<()> {
        let display_name = display_name.into();
        spec.validate()?;
        if let Some((existing, _)) = self
            .specs
            .iter()
            .find(|(name, s)| s.label == spec.label && **name != display_name)
        {
            return Err(NimbusError::DuplicateQuotaLabel {
                label: spec.label,
                existing: existing.clone(),
            });
        }
        self.specs.insert(display_name, spec);
        Ok(())
    }

    pub fn remove(&mut self, display_name: &str) -> Option<QuotaSpec> {
        self.specs.remove(display_name)
    }

    pub fn get(&self, display_name: &str) -> Option<&QuotaSpec> {
        self.specs.get(display_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &QuotaSpec)> {
        self.specs.iter()
    }

    pub fn in_category(
        &self,
        category: QuotaCategory,
    ) -> impl Iterator<Item = (&String, &QuotaSpec)> {
        self.specs.iter().filter(move |(_, s)| s.category == category)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.specs.values().map(|s| s.label.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
