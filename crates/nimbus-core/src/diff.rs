//! Expected/observed comparisons used by the reconciler
//!
//! Every function here is pure; the reconciler decides what to do with the
//! result.

use std::collections::{BTreeMap, BTreeSet};

use nimbus_common::Result;
use nimbus_plugin::LimitRangeItem;
use nimbus_quota::{
    QuotaSpec, QuotaValue, UnitKind, object_storage_bytes, object_storage_gib, parse_quantity,
    quantities_equal,
};

/// Members to add and principals to remove
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserDiff {
    pub missing: BTreeSet<String>,
    pub extra: BTreeSet<String>,
}

impl UserDiff {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }
}

pub fn diff_users(expected: &BTreeSet<String>, actual: &BTreeSet<String>) -> UserDiff {
    UserDiff {
        missing: expected.difference(actual).cloned().collect(),
        extra: actual.difference(expected).cloned().collect(),
    }
}

/// Result of comparing one quota attribute, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaCheck {
    /// Neither the allocation nor the provider has a value
    NeverSet,
    /// Provider has a value the allocation never recorded
    Adopt(i64),
    /// Allocation value differs from the provider, or the provider has none
    Mismatch,
    Match,
}

/// Compare a stored value against the provider's
///
/// Object storage is compared in provider bytes, where a stored zero or unset
/// value is expected to appear as the one-byte sentinel.
pub fn check_quota(
    spec: &QuotaSpec,
    expected: Option<i64>,
    observed: Option<&QuotaValue>,
) -> Result<QuotaCheck> {
    if spec.is_object_storage() {
        let current = observed.map(raw_number).transpose()?;
        return Ok(match (expected, current) {
            (None, None) => QuotaCheck::NeverSet,
            (None, Some(bytes)) => QuotaCheck::Adopt(object_storage_gib(bytes)),
            (Some(gib), Some(bytes)) if bytes == object_storage_bytes(Some(gib)) => {
                QuotaCheck::Match
            }
            (Some(_), _) => QuotaCheck::Mismatch,
        });
    }

    let current = observed.map(|v| v.parse(spec.unit_kind())).transpose()?;
    Ok(match (expected, current) {
        (None, None) => QuotaCheck::NeverSet,
        (None, Some(value)) => QuotaCheck::Adopt(value),
        (Some(e), Some(c)) if e == c => QuotaCheck::Match,
        (Some(_), _) => QuotaCheck::Mismatch,
    })
}

fn raw_number(value: &QuotaValue) -> Result<i64> {
    match value {
        QuotaValue::Number(n) => Ok(*n),
        QuotaValue::Quantity(s) => parse_quantity(s, UnitKind::Count),
    }
}

/// Default labels that are absent or carry another value
pub fn missing_labels(
    defaults: &BTreeMap<String, String>,
    actual: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    defaults
        .iter()
        .filter(|(k, v)| actual.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// A limit-range difference: `(field_path, expected, actual)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitDiff {
    pub path: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

/// Field-by-field limit-range comparison, entries matched by type
///
/// Quantities compare by amount, so `1Gi` matches `1024Mi`.
pub fn diff_limits(expected: &[LimitRangeItem], actual: &[LimitRangeItem]) -> Vec<LimitDiff> {
    let mut diffs = Vec::new();

    for item in expected {
        let prefix = format!("limits[{}]", item.type_);
        let Some(found) = actual.iter().find(|a| a.type_ == item.type_) else {
            diffs.push(LimitDiff {
                path: prefix,
                expected: Some("present".to_string()),
                actual: None,
            });
            continue;
        };

        for ((field, want), (_, have)) in item.fields().into_iter().zip(found.fields()) {
            let keys: BTreeSet<&String> = want.keys().chain(have.keys()).collect();
            for key in keys {
                let (w, h) = (want.get(key), have.get(key));
                let same = match (w, h) {
                    (Some(w), Some(h)) => quantities_equal(w, h),
                    (None, None) => true,
                    _ => false,
                };
                if !same {
                    diffs.push(LimitDiff {
                        path: format!("{}.{}.{}", prefix, field, key),
                        expected: w.cloned(),
                        actual: h.cloned(),
                    });
                }
            }
        }
    }

    for item in actual {
        if !expected.iter().any(|e| e.type_ == item.type_) {
            diffs.push(LimitDiff {
                path: format!("limits[{}]", item.type_),
                expected: None,
                actual: Some("present".to_string()),
            });
        }
    }

    diffs
}
