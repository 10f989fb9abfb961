//! Quota payloads for the OpenStack sub-services
//!
//! Stored allocation values are grouped by category into one request per
//! sub-service. Object storage is sent to Swift in bytes, with a one-byte
//! sentinel standing in for zero.

use serde_json::{Map, Value};

use nimbus_common::ResourceKind;
use nimbus_plugin::StoredQuota;
use nimbus_quota::{ObservedQuota, QuotaCategory, QuotaValue, object_storage_bytes};

/// Whether a category is managed by this kind of backend
pub fn manages(kind: ResourceKind, category: QuotaCategory) -> bool {
    match kind {
        ResourceKind::Esi => category == QuotaCategory::Network,
        _ => category != QuotaCategory::Cluster,
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct QuotaPayload {
    pub compute: Map<String, Value>,
    pub volume: Map<String, Value>,
    pub network: Map<String, Value>,
    /// Swift account quota in bytes, when an object-storage quota is configured
    pub object_storage_bytes: Option<i64>,
}

impl QuotaPayload {
    pub fn build(kind: ResourceKind, values: &[StoredQuota]) -> Self {
        let mut payload = Self::default();
        for stored in values {
            let category = stored.spec.category;
            if !manages(kind, category) {
                tracing::debug!(
                    quota = %stored.display_name,
                    %category,
                    "Quota category not handled by {} backend",
                    kind
                );
                continue;
            }
            if category == QuotaCategory::ObjectStorage {
                payload.object_storage_bytes = Some(object_storage_bytes(stored.value));
                continue;
            }
            let Some(value) = stored.value else {
                continue;
            };
            let section = match category {
                QuotaCategory::Compute => &mut payload.compute,
                QuotaCategory::Volume => &mut payload.volume,
                _ => &mut payload.network,
            };
            section.insert(stored.spec.label.clone(), Value::from(value));
        }
        payload
    }
}

/// Integer entries of a quota section, ignoring fields such as `id`
pub fn numeric_entries(section: &Value, observed: &mut ObservedQuota) {
    if let Some(map) = section.as_object() {
        for (key, value) in map {
            if let Some(v) = value.as_i64() {
                observed.insert(key.clone(), QuotaValue::Number(v));
            }
        }
    }
}

/// Account URL for a project, derived from the catalog's object-store endpoint
pub fn swift_account_url(endpoint: &str, project_id: &str) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    let base = match endpoint.rfind("/AUTH_") {
        Some(idx) => &endpoint[..idx],
        None => endpoint,
    };
    format!("{}/AUTH_{}", base, project_id)
}
