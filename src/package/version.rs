//! Version comparison for installed packages.
//!
//! Only two concrete version strings are ever compared; ranges are not
//! interpreted. Versions that cannot be read as semver are "invalid" and the
//! caller decides how to break ties between them.

use semver::Version;
use std::cmp::Ordering;

/// Version comparator - pure functions over concrete version strings.
///
/// All methods are stateless.
pub struct VersionComparator;

impl VersionComparator {
    /// Parse a concrete version, tolerating a leading `v`/`=` and missing
    /// minor or patch components (`1.2` reads as `1.2.0`).
    pub fn parse(version: &str) -> Option<Version> {
        let trimmed = version.trim();
        let trimmed = trimmed
            .strip_prefix('=')
            .unwrap_or(trimmed)
            .trim_start_matches(['v', 'V']);

        if let Ok(v) = Version::parse(trimmed) {
            return Some(v);
        }

        // Pad the numeric core, keeping any pre-release/build suffix
        let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
        let (core, suffix) = trimmed.split_at(split);
        let parts: Vec<&str> = core.split('.').collect();
        if parts.is_empty()
            || parts.len() > 3
            || parts
                .iter()
                .any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()))
        {
            return None;
        }

        let mut padded = parts.join(".");
        for _ in parts.len()..3 {
            padded.push_str(".0");
        }
        padded.push_str(suffix);
        Version::parse(&padded).ok()
    }

    /// Check whether a version string is usable for ordering.
    pub fn is_valid(version: &str) -> bool {
        Self::parse(version).is_some()
    }

    /// Order two versions by semver precedence; build metadata is ignored.
    /// `None` when either one is not a valid version.
    pub fn compare(a: &str, b: &str) -> Option<Ordering> {
        Some(Self::parse(a)?.cmp_precedence(&Self::parse(b)?))
    }

    /// True when `candidate` is strictly newer than `current`.
    pub fn is_newer(candidate: &str, current: &str) -> bool {
        Self::compare(candidate, current) == Some(Ordering::Greater)
    }
}
