//! Package handles: all versions of one name, merged across sources and
//! sorted by preference.

use std::cmp::Ordering;
use std::sync::Arc;

use rapt_version::compare_version_strings;

use crate::cache::version::{BinaryVersion, SourceVersion};

/// A binary package: one name, pin-sorted versions.
#[derive(Debug, Clone)]
pub struct BinaryPackage {
    pub name: String,
    versions: Vec<Arc<BinaryVersion>>,
}

impl BinaryPackage {
    /// Build from finished versions with their pins; sorts by pin descending
    /// with a stable version-string tie-break, newest first.
    pub(crate) fn new(name: String, mut versions: Vec<(Arc<BinaryVersion>, i64)>) -> Self {
        versions.sort_by(|(left, left_pin), (right, right_pin)| {
            right_pin.cmp(left_pin).then_with(|| {
                compare_version_strings(&right.version_string, &left.version_string)
            })
        });
        Self {
            name,
            versions: versions.into_iter().map(|(version, _)| version).collect(),
        }
    }

    /// Versions in preference order.
    pub fn versions(&self) -> &[Arc<BinaryVersion>] {
        &self.versions
    }

    /// The pin-preferred version.
    pub fn policy_version(&self) -> Option<&Arc<BinaryVersion>> {
        self.versions.first()
    }

    pub fn specific_version(&self, version_string: &str) -> Option<&Arc<BinaryVersion>> {
        self.versions
            .iter()
            .find(|v| v.version_string == version_string)
    }

    /// The version currently installed on the system, if any.
    pub fn installed_version(&self) -> Option<&Arc<BinaryVersion>> {
        self.versions.iter().find(|v| v.installed)
    }
}

/// A source package: one name, versions sorted newest first.
#[derive(Debug, Clone)]
pub struct SourcePackage {
    pub name: String,
    versions: Vec<Arc<SourceVersion>>,
}

impl SourcePackage {
    pub(crate) fn new(name: String, mut versions: Vec<Arc<SourceVersion>>) -> Self {
        versions.sort_by(|left, right| {
            compare_version_strings(&right.version_string, &left.version_string)
        });
        Self { name, versions }
    }

    pub fn versions(&self) -> &[Arc<SourceVersion>] {
        &self.versions
    }

    pub fn specific_version(&self, version_string: &str) -> Option<&Arc<SourceVersion>> {
        self.versions
            .iter()
            .find(|v| v.version_string == version_string)
    }
}

/// Whether two records of the same `(package, version)` agree on content.
/// Mismatching duplicates are diagnosed and only the first is kept.
pub(crate) fn hashes_agree(left: &BinaryVersion, right: &BinaryVersion) -> bool {
    left.file.md5 == right.file.md5
        && left.file.sha1 == right.file.sha1
        && left.file.sha256 == right.file.sha256
}

/// Stable ordering for version lists in diagnostics.
pub(crate) fn compare_versions(left: &BinaryVersion, right: &BinaryVersion) -> Ordering {
    left.package_name
        .cmp(&right.package_name)
        .then_with(|| compare_version_strings(&left.version_string, &right.version_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::version::BinaryVersionBuilder;

    fn version(name: &str, version_string: &str) -> Arc<BinaryVersion> {
        Arc::new(BinaryVersionBuilder::new(name, version_string).finish())
    }

    #[test]
    fn test_versions_sorted_by_pin_then_version() {
        let package = BinaryPackage::new(
            "acme".to_string(),
            vec![
                (version("acme", "1.0"), 500),
                (version("acme", "2.0"), 500),
                (version("acme", "3.0"), 100),
            ],
        );
        let order: Vec<&str> = package
            .versions()
            .iter()
            .map(|v| v.version_string.as_str())
            .collect();
        assert_eq!(order, vec!["2.0", "1.0", "3.0"]);
        assert_eq!(package.policy_version().unwrap().version_string, "2.0");
    }

    #[test]
    fn test_specific_version() {
        let package = BinaryPackage::new(
            "acme".to_string(),
            vec![(version("acme", "1.0"), 500), (version("acme", "2.0"), 500)],
        );
        assert!(package.specific_version("1.0").is_some());
        assert!(package.specific_version("1.5").is_none());
    }
}
