//! Observed provider quota
//!
//! Recomputed on every reconciliation pass by querying the provider; never
//! persisted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use nimbus_common::Result;

use crate::units::{UnitKind, parse_quantity, scale_number};

/// A provider-native quota value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuotaValue {
    Number(i64),
    Quantity(String),
}

impl QuotaValue {
    /// Normalise into the integer units allocations store
    pub fn parse(&self, kind: UnitKind) -> Result<i64> {
        match self {
            QuotaValue::Number(v) => Ok(scale_number(*v, kind)),
            QuotaValue::Quantity(s) => parse_quantity(s, kind),
        }
    }
}

impl std::fmt::Display for QuotaValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaValue::Number(v) => write!(f, "{}", v),
            QuotaValue::Quantity(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for QuotaValue {
    fn from(value: i64) -> Self {
        QuotaValue::Number(value)
    }
}

impl From<&str> for QuotaValue {
    fn from(value: &str) -> Self {
        QuotaValue::Quantity(value.to_string())
    }
}

impl From<String> for QuotaValue {
    fn from(value: String) -> Self {
        QuotaValue::Quantity(value)
    }
}

/// Provider quota key to provider-native value
pub type ObservedQuota = BTreeMap<String, QuotaValue>;
