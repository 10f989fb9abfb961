//! Quantity parsing with real numbers
//!
//! Provider quotas arrive as magnitude-suffixed strings (`8Gi`, `500m`,
//! `20G`). Parsing turns them into the integer units allocations store:
//! memory in MiB, storage in GiB, CPU and counts unscaled.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use nimbus_common::{NimbusError, Result};

static QUANTITY_PATTERN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^\s*(-?)(\d+)(?:\.(\d+))?(Ki|Mi|Gi|Ti|Pi|Ei|m|k|K|M|G|T|P|E)?\s*$")
        .expect("Invalid regex pattern")
});

const KIBI: i128 = 1 << 10;
const MEBI: i128 = 1 << 20;
const GIBI: i128 = 1 << 30;

/// How a parsed quantity is normalised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Cpu,
    /// Normalised to MiB
    Memory,
    /// Normalised to GiB
    Storage,
    Count,
}

impl UnitKind {
    fn divisor(&self) -> i128 {
        match self {
            UnitKind::Memory => MEBI,
            UnitKind::Storage => GIBI,
            UnitKind::Cpu | UnitKind::Count => 1,
        }
    }
}

/// Suffix multiplier as an exact fraction `(numerator, denominator)`
fn suffix_factor(suffix: &str) -> (i128, i128) {
    match suffix {
        "m" => (1, 1000),
        "k" | "K" => (1_000, 1),
        "M" => (1_000_000, 1),
        "G" => (1_000_000_000, 1),
        "T" => (1_000_000_000_000, 1),
        "P" => (1_000_000_000_000_000, 1),
        "E" => (1_000_000_000_000_000_000, 1),
        "Ki" => (KIBI, 1),
        "Mi" => (KIBI.pow(2), 1),
        "Gi" => (KIBI.pow(3), 1),
        "Ti" => (KIBI.pow(4), 1),
        "Pi" => (KIBI.pow(5), 1),
        "Ei" => (KIBI.pow(6), 1),
        _ => (1, 1),
    }
}

/// Division rounding half up
fn div_round(n: i128, d: i128) -> i128 {
    let q = n.div_euclid(d);
    let r = n.rem_euclid(d);
    if 2 * r >= d { q + 1 } else { q }
}

/// Exact value of a quantity in base units, as `(numerator, denominator)`
fn parse_exact(value: &str) -> Result<(i128, i128)> {
    let overflow = || NimbusError::Parse(format!("quantity out of range: {}", value));

    let caps = QUANTITY_PATTERN
        .captures(value)
        .ok_or_else(|| NimbusError::Parse(format!("invalid quantity: '{}'", value)))?;

    let negative = !caps[1].is_empty();
    let whole: i128 = caps[2].parse().map_err(|_| overflow())?;
    let (mut num, mut den) = (whole, 1i128);

    if let Some(frac) = caps.get(3) {
        let digits = frac.as_str();
        let scale = 10i128
            .checked_pow(digits.len() as u32)
            .ok_or_else(overflow)?;
        let frac_value: i128 = digits.parse().map_err(|_| overflow())?;
        num = whole
            .checked_mul(scale)
            .and_then(|w| w.checked_add(frac_value))
            .ok_or_else(overflow)?;
        den = scale;
    }

    let (f_num, f_den) = suffix_factor(caps.get(4).map_or("", |m| m.as_str()));
    num = num.checked_mul(f_num).ok_or_else(overflow)?;
    den = den.checked_mul(f_den).ok_or_else(overflow)?;

    if negative {
        num = -num;
    }
    Ok((num, den))
}

/// Parse a provider quantity string into normalised integer units
///
/// `"0"` is zero regardless of kind. Empty input is an error; absence of a
/// value is the caller's concern.
///
/// # Examples
///
/// ```
/// use nimbus_quota::{UnitKind, parse_quantity};
///
/// assert_eq!(parse_quantity("8Gi", UnitKind::Memory).unwrap(), 8192);
/// assert_eq!(parse_quantity("20Gi", UnitKind::Storage).unwrap(), 20);
/// assert_eq!(parse_quantity("2000m", UnitKind::Cpu).unwrap(), 2);
/// assert!(parse_quantity("lots", UnitKind::Count).is_err());
/// ```
pub fn parse_quantity(value: &str, kind: UnitKind) -> Result<i64> {
    if value.trim() == "0" {
        return Ok(0);
    }
    let (num, den) = parse_exact(value)?;
    let scaled = den
        .checked_mul(kind.divisor())
        .ok_or_else(|| NimbusError::Parse(format!("quantity out of range: {}", value)))?;
    i64::try_from(div_round(num, scaled))
        .map_err(|_| NimbusError::Parse(format!("quantity out of range: {}", value)))
}

/// Normalise an already-numeric provider value
pub fn scale_number(value: i64, kind: UnitKind) -> i64 {
    div_round(value as i128, kind.divisor()) as i64
}

/// Render a value with its provider unit suffix
pub fn format_quantity(value: i64, suffix: &str) -> String {
    format!("{}{}", value, suffix)
}

/// Whether two quantity strings denote the same amount (`1Gi == 1024Mi`)
///
/// Unparseable strings fall back to textual comparison.
pub fn quantities_equal(a: &str, b: &str) -> bool {
    match (parse_exact(a), parse_exact(b)) {
        (Ok((an, ad)), Ok((bn, bd))) => match (an.checked_mul(bd), bn.checked_mul(ad)) {
            (Some(l), Some(r)) => l == r,
            _ => a.trim() == b.trim(),
        },
        _ => a.trim() == b.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_plain_numbers() {
        assert_eq!(parse_quantity("0", UnitKind::Memory).unwrap(), 0);
        assert_eq!(parse_quantity("4", UnitKind::Count).unwrap(), 4);
        assert_eq!(parse_quantity(" 16 ", UnitKind::Cpu).unwrap(), 16);
        assert_eq!(parse_quantity("-1", UnitKind::Count).unwrap(), -1);
    }

    #[test]
    fn test_parse_binary_suffixes() {
        assert_eq!(parse_quantity("4096Mi", UnitKind::Memory).unwrap(), 4096);
        assert_eq!(parse_quantity("2Gi", UnitKind::Memory).unwrap(), 2048);
        assert_eq!(parse_quantity("1Ti", UnitKind::Storage).unwrap(), 1024);
        assert_eq!(parse_quantity("1Ki", UnitKind::Count).unwrap(), 1024);
        assert_eq!(parse_quantity("1Ei", UnitKind::Storage).unwrap(), 1 << 30);
    }

    #[test]
    fn test_parse_decimal_suffixes() {
        assert_eq!(parse_quantity("500m", UnitKind::Cpu).unwrap(), 1);
        assert_eq!(parse_quantity("400m", UnitKind::Cpu).unwrap(), 0);
        assert_eq!(parse_quantity("3k", UnitKind::Count).unwrap(), 3000);
        assert_eq!(parse_quantity("3K", UnitKind::Count).unwrap(), 3000);
        assert_eq!(parse_quantity("1G", UnitKind::Count).unwrap(), 1_000_000_000);
        // 1 GB is 953.67 MiB
        assert_eq!(parse_quantity("1G", UnitKind::Memory).unwrap(), 954);
    }

    #[test]
    fn test_parse_fraction() {
        assert_eq!(parse_quantity("1.5Gi", UnitKind::Memory).unwrap(), 1536);
        assert_eq!(parse_quantity("0.5", UnitKind::Cpu).unwrap(), 1);
    }

    #[test]
    fn test_parse_storage_bytes() {
        assert_eq!(parse_quantity("10737418240", UnitKind::Storage).unwrap(), 10);
        assert_eq!(parse_quantity("1", UnitKind::Storage).unwrap(), 0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_quantity("", UnitKind::Count).is_err());
        assert!(parse_quantity("Gi", UnitKind::Memory).is_err());
        assert!(parse_quantity("12Xi", UnitKind::Memory).is_err());
        assert!(parse_quantity("unlimited", UnitKind::Count).is_err());
    }

    #[test]
    fn test_parse_overflow_is_error() {
        assert!(parse_quantity("99999999999999999999999Ei", UnitKind::Count).is_err());
    }

    #[test]
    fn test_format_quantity() {
        assert_eq!(format_quantity(4096, "Mi"), "4096Mi");
        assert_eq!(format_quantity(2, ""), "2");
    }

    #[test]
    fn test_scale_number() {
        assert_eq!(scale_number(4, UnitKind::Count), 4);
        assert_eq!(scale_number(3 << 30, UnitKind::Storage), 3);
    }

    #[test]
    fn test_quantities_equal() {
        assert!(quantities_equal("1Gi", "1024Mi"));
        assert!(quantities_equal("500m", "0.5"));
        assert!(quantities_equal("2", "2"));
        assert!(!quantities_equal("1G", "1Gi"));
        assert!(quantities_equal("weird", "weird"));
        assert!(!quantities_equal("weird", "1"));
    }

    proptest! {
        #[test]
        fn prop_memory_round_trip(v in 0i64..1_000_000_000) {
            prop_assert_eq!(parse_quantity(&format_quantity(v, "Mi"), UnitKind::Memory).unwrap(), v);
        }

        #[test]
        fn prop_storage_round_trip(v in 0i64..1_000_000_000) {
            prop_assert_eq!(parse_quantity(&format_quantity(v, "Gi"), UnitKind::Storage).unwrap(), v);
        }

        #[test]
        fn prop_count_round_trip(v in 0i64..i64::MAX) {
            prop_assert_eq!(parse_quantity(&format_quantity(v, ""), UnitKind::Count).unwrap(), v);
        }
    }
}
