//! Utility functions for Nimbus
//!
//! Common helper functions used across the codebase.

use std::sync::LazyLock;

use rand::Rng;

/// Runs of characters not allowed in provider project names
static DISALLOWED_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new("[^a-z0-9]+").expect("Invalid regex pattern"));

/// Length of the `-xxxxxxxx` disambiguating suffix
const UNIQUE_SUFFIX_LEN: usize = 9;

/// Sanitize a display name into a provider-safe project name
///
/// Lowercases, collapses every run of characters outside `[a-z0-9]` to a
/// single `-`, and strips leading/trailing hyphens.
///
/// # Examples
///
/// ```
/// use nimbus_common::sanitize_project_name;
///
/// assert_eq!(sanitize_project_name("  My Project! "), "my-project");
/// assert_eq!(sanitize_project_name("a__b..c"), "a-b-c");
/// ```
pub fn sanitize_project_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    DISALLOWED_PATTERN
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// Sanitized name plus a random suffix, at most `max_length` characters
///
/// The base name is truncated to leave room for the suffix, so the result is
/// exactly `max_length` long whenever the sanitized base alone would not fit.
/// A hyphen left at the cut is dropped and the suffix grows to fill its place,
/// so hyphens never run together.
pub fn unique_project_name(name: &str, max_length: usize) -> String {
    let mut base = sanitize_project_name(name);
    if base.is_empty() {
        base = "project".to_string();
    }
    let room = max_length.saturating_sub(UNIQUE_SUFFIX_LEN);
    // Sanitized names are ASCII, byte truncation is safe
    base.truncate(room);
    let kept = base.trim_end_matches('-').len();
    let suffix_len = UNIQUE_SUFFIX_LEN - 1 + (base.len() - kept);
    base.truncate(kept);

    let mut rng = rand::rng();
    let suffix: String = (0..suffix_len)
        .map(|_| char::from_digit(rng.random_range(0..16), 16).unwrap_or('0'))
        .collect();
    format!("{}-{}", base, suffix)
}

/// Environment-variable fragment for a resource name
///
/// ```
/// use nimbus_common::env_key;
///
/// assert_eq!(env_key("NERC OpenStack-1"), "NERC_OPENSTACK_1");
/// ```
pub fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sanitize_collapses_and_trims() {
        assert_eq!(sanitize_project_name("  My Project! "), "my-project");
        assert_eq!(sanitize_project_name("--Already-OK--"), "already-ok");
        assert_eq!(sanitize_project_name("Ünïcode Lab"), "n-code-lab");
        assert_eq!(sanitize_project_name("!!!"), "");
    }

    #[test]
    fn test_unique_name_short_base() {
        let name = unique_project_name("  My Project! ", 63);
        assert!(name.starts_with("my-project-"));
        assert_eq!(name.len(), "my-project".len() + UNIQUE_SUFFIX_LEN);
    }

    #[test]
    fn test_unique_name_truncates_to_exact_length() {
        let long = "x".repeat(100);
        assert_eq!(unique_project_name(&long, 63).len(), 63);
        assert_eq!(unique_project_name(&long, 64).len(), 64);
    }

    #[test]
    fn test_unique_name_cut_at_separator() {
        let name = format!("{} {}", "x".repeat(53), "y".repeat(20));
        let result = unique_project_name(&name, 63);
        assert_eq!(result.len(), 63);
        assert!(!result.contains("--"));
        assert!(result.starts_with(&format!("{}-", "x".repeat(53))));
    }

    #[test]
    fn test_unique_name_empty_base() {
        let name = unique_project_name("***", 63);
        assert!(name.starts_with("project-"));
    }

    #[test]
    fn test_unique_names_differ() {
        let a = unique_project_name("lab", 63);
        let b = unique_project_name("lab", 63);
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn prop_unique_name_within_bounds(name in ".{0,120}", max in 16usize..80) {
            let result = unique_project_name(&name, max);
            prop_assert!(result.len() <= max);
            prop_assert!(!result.starts_with('-'));
            prop_assert!(!result.contains("--"));
            prop_assert!(result.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            if sanitize_project_name(&name).len() > max - UNIQUE_SUFFIX_LEN {
                prop_assert_eq!(result.len(), max);
            }
        }
    }
}
