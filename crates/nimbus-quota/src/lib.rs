//! Nimbus Quota - quota model and quantity handling
//!
//! This crate provides:
//! - Quantity parsing and formatting for provider-native strings (`4Gi`, `500m`)
//! - `QuotaSpec`: the linear rule mapping service units to a provider quota
//! - `QuotaSpecDocument`: a resource's display-name to spec mapping
//! - Default spec documents per resource kind

pub mod defaults;
pub mod observed;
pub mod spec;
pub mod units;

pub use defaults::default_quota_specs;
pub use observed::{ObservedQuota, QuotaValue};
pub use spec::{
    GIB_BYTES, OBJECT_STORAGE_LABEL, OBJECT_STORAGE_SENTINEL_BYTES, QuotaCategory, QuotaSpec,
    QuotaSpecDocument, object_storage_bytes, object_storage_gib,
};
pub use units::{UnitKind, format_quantity, parse_quantity, quantities_equal};
