//! The package universe: a read-only view over all known packages,
//! versions, relations, installed state and pins.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use rapt_version::{Relation, RelationExpression};

use crate::cache::package::{hashes_agree, BinaryPackage, SourcePackage};
use crate::cache::pin::PinPreferences;
use crate::cache::state::{InstalledRecord, SystemState};
use crate::cache::version::{BinaryVersion, BinaryVersionBuilder, SourceVersion};

/// The immutable universe. Built once by [`CacheBuilder`], then only read
/// for the lifetime of a resolve call.
#[derive(Debug)]
pub struct Cache {
    binary_packages: HashMap<String, Arc<BinaryPackage>>,
    source_packages: HashMap<String, Arc<SourcePackage>>,
    system_state: SystemState,
    // virtual package name -> providing package names
    can_provide: HashMap<String, Vec<String>>,
    pins: HashMap<(String, String), i64>,
}

impl Cache {
    pub fn binary_package(&self, package_name: &str) -> Option<&Arc<BinaryPackage>> {
        self.binary_packages.get(package_name)
    }

    pub fn source_package(&self, package_name: &str) -> Option<&Arc<SourcePackage>> {
        self.source_packages.get(package_name)
    }

    pub fn binary_package_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.binary_packages.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn source_package_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.source_packages.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn system_state(&self) -> &SystemState {
        &self.system_state
    }

    pub fn is_automatically_installed(&self, package_name: &str) -> bool {
        self.system_state.is_automatically_installed(package_name)
    }

    /// The pin score of a version, precomputed at build time.
    pub fn get_pin(&self, version: &BinaryVersion) -> i64 {
        self.pins
            .get(&(
                version.package_name.clone(),
                version.version_string.clone(),
            ))
            .copied()
            .unwrap_or(0)
    }

    /// The pin-preferred version of a package.
    pub fn policy_version(&self, package_name: &str) -> Option<Arc<BinaryVersion>> {
        self.binary_package(package_name)
            .and_then(|package| package.policy_version().cloned())
    }

    /// Whether a version may satisfy relations of other packages. An
    /// installed version in a partially-installed state that exists nowhere
    /// in the archive may not.
    fn may_satisfy(&self, version: &BinaryVersion) -> bool {
        if !version.installed || !version.sources.is_empty() {
            return true;
        }
        match self.system_state.installed_record(&version.package_name) {
            Some(record) => record.status.satisfies_relations(),
            None => true,
        }
    }

    /// Versions satisfying a single relation. Virtual packages are only
    /// considered for un-versioned relations.
    pub fn get_satisfying_versions_for_relation(
        &self,
        relation: &Relation,
    ) -> Vec<Arc<BinaryVersion>> {
        let mut result = Vec::new();

        if let Some(package) = self.binary_package(&relation.package_name) {
            for version in package.versions() {
                if relation.is_satisfied_by(&version.version_string) && self.may_satisfy(version) {
                    result.push(version.clone());
                }
            }
        }

        if relation.is_unversioned() {
            if let Some(provider_names) = self.can_provide.get(&relation.package_name) {
                for provider_name in provider_names {
                    let Some(package) = self.binary_package(provider_name) else {
                        continue;
                    };
                    for version in package.versions() {
                        if version
                            .provides
                            .iter()
                            .any(|p| p == &relation.package_name)
                            && self.may_satisfy(version)
                        {
                            result.push(version.clone());
                        }
                    }
                }
            }
        }

        result
    }

    /// Versions satisfying a relation expression: the union over all
    /// alternatives, de-duplicated, preserving disjunction order.
    pub fn get_satisfying_versions(
        &self,
        expression: &RelationExpression,
    ) -> Vec<Arc<BinaryVersion>> {
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        for relation in &expression.0 {
            for version in self.get_satisfying_versions_for_relation(relation) {
                let key = (version.package_name.clone(), version.version_string.clone());
                if seen.insert(key) {
                    result.push(version);
                }
            }
        }
        result
    }

    /// All installed versions, sorted by package name.
    pub fn get_installed_versions(&self) -> Vec<Arc<BinaryVersion>> {
        let mut result: Vec<Arc<BinaryVersion>> = self
            .binary_packages
            .values()
            .filter_map(|package| package.installed_version().cloned())
            .collect();
        result.sort_by(|left, right| left.package_name.cmp(&right.package_name));
        result
    }

    pub fn installed_version(&self, package_name: &str) -> Option<Arc<BinaryVersion>> {
        self.binary_package(package_name)
            .and_then(|package| package.installed_version().cloned())
    }
}

/// Accumulates already-parsed index metadata and produces the immutable
/// [`Cache`].
#[derive(Debug, Default)]
pub struct CacheBuilder {
    versions: IndexMap<(String, String), BinaryVersionBuilder>,
    source_versions: Vec<SourceVersion>,
    installed: Vec<(String, String, InstalledRecord)>,
    state: SystemState,
    preferences: PinPreferences,
    default_release: String,
}

impl CacheBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one version record in. Duplicate `(package, version)` records
    /// must agree on their file hashes; a mismatching duplicate is dropped
    /// with a warning and the first record wins.
    pub fn add_binary_version(&mut self, builder: BinaryVersionBuilder) {
        let key = (
            builder.package_name().to_string(),
            builder.version_string().to_string(),
        );
        match self.versions.get_mut(&key) {
            None => {
                self.versions.insert(key, builder);
            }
            Some(existing) => {
                let incoming = builder.finish();
                let current = existing.clone().finish();
                if !hashes_agree(&current, &incoming) {
                    log::warn!(
                        "discarding duplicate record for '{} {}': file hashes differ",
                        incoming.package_name,
                        incoming.version_string
                    );
                    return;
                }
                for source in incoming.sources {
                    existing.add_source(source.release, source.directory);
                }
            }
        }
    }

    pub fn add_source_version(&mut self, version: SourceVersion) {
        self.source_versions.push(version);
    }

    /// Record the installed instance of a package. If the version is not
    /// known from any index, a bare record is synthesized, the way the
    /// status database describes versions no longer downloadable.
    pub fn set_installed(
        &mut self,
        package_name: impl Into<String>,
        version_string: impl Into<String>,
        record: InstalledRecord,
    ) {
        self.installed
            .push((package_name.into(), version_string.into(), record));
    }

    pub fn mark_auto_installed(&mut self, package_name: impl Into<String>) {
        self.state.mark_auto_installed(package_name);
    }

    pub fn set_preferences(&mut self, preferences: PinPreferences) {
        self.preferences = preferences;
    }

    pub fn set_default_release(&mut self, default_release: impl Into<String>) {
        self.default_release = default_release.into();
    }

    /// Freeze into the immutable universe.
    pub fn finish(mut self) -> Cache {
        for (package_name, version_string, record) in std::mem::take(&mut self.installed) {
            let key = (package_name.clone(), version_string.clone());
            let builder = self
                .versions
                .entry(key)
                .or_insert_with(|| BinaryVersionBuilder::new(&package_name, &version_string));
            builder.set_installed(record.status.is_present());
            self.state.set_record(package_name, record);
        }

        let mut pins = HashMap::new();
        let mut by_package: IndexMap<String, Vec<(Arc<BinaryVersion>, i64)>> = IndexMap::new();
        let mut can_provide: HashMap<String, Vec<String>> = HashMap::new();

        for (_, builder) in self.versions {
            let version = Arc::new(builder.finish());
            let pin = self.preferences.pin_of(&version, &self.default_release);
            pins.insert(
                (version.package_name.clone(), version.version_string.clone()),
                pin,
            );
            for provided in &version.provides {
                let providers = can_provide.entry(provided.clone()).or_default();
                if !providers.contains(&version.package_name) {
                    providers.push(version.package_name.clone());
                }
            }
            by_package
                .entry(version.package_name.clone())
                .or_default()
                .push((version, pin));
        }

        let binary_packages = by_package
            .into_iter()
            .map(|(name, versions)| {
                let package = Arc::new(BinaryPackage::new(name.clone(), versions));
                (name, package)
            })
            .collect();

        let mut by_source: IndexMap<String, Vec<Arc<SourceVersion>>> = IndexMap::new();
        for version in self.source_versions {
            by_source
                .entry(version.package_name.clone())
                .or_default()
                .push(Arc::new(version));
        }
        let source_packages = by_source
            .into_iter()
            .map(|(name, versions)| {
                let package = Arc::new(SourcePackage::new(name.clone(), versions));
                (name, package)
            })
            .collect();

        Cache {
            binary_packages,
            source_packages,
            system_state: self.state,
            can_provide,
            pins,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::version::{DependencyKind, FileRecord};
    use rapt_version::RelationLine;

    fn builder_with_deps(name: &str, version: &str, depends: &str) -> BinaryVersionBuilder {
        BinaryVersionBuilder::new(name, version)
            .relation(DependencyKind::Depends, RelationLine::parse(depends).unwrap())
    }

    #[test]
    fn test_missing_package_gives_empty_list() {
        let cache = CacheBuilder::new().finish();
        let expression = RelationExpression::parse("no-such-package").unwrap();
        assert!(cache.get_satisfying_versions(&expression).is_empty());
        assert!(cache.binary_package("no-such-package").is_none());
    }

    #[test]
    fn test_satisfying_versions_respect_restrictions() {
        let mut builder = CacheBuilder::new();
        builder.add_binary_version(BinaryVersionBuilder::new("acme", "1.0"));
        builder.add_binary_version(BinaryVersionBuilder::new("acme", "2.0"));
        let cache = builder.finish();

        let expression = RelationExpression::parse("acme (>= 2.0)").unwrap();
        let satisfying = cache.get_satisfying_versions(&expression);
        assert_eq!(satisfying.len(), 1);
        assert_eq!(satisfying[0].version_string, "2.0");
    }

    #[test]
    fn test_provides_only_unversioned() {
        let mut builder = CacheBuilder::new();
        builder.add_binary_version(
            BinaryVersionBuilder::new("exim4", "4.96")
                .provides(vec!["mail-transport-agent".to_string()]),
        );
        let cache = builder.finish();

        let unversioned = RelationExpression::parse("mail-transport-agent").unwrap();
        assert_eq!(cache.get_satisfying_versions(&unversioned).len(), 1);

        let versioned = RelationExpression::parse("mail-transport-agent (>= 1)").unwrap();
        assert!(cache.get_satisfying_versions(&versioned).is_empty());
    }

    #[test]
    fn test_disjunction_order_preserved() {
        let mut builder = CacheBuilder::new();
        builder.add_binary_version(BinaryVersionBuilder::new("postfix", "3.7"));
        builder.add_binary_version(BinaryVersionBuilder::new("exim4", "4.96"));
        let cache = builder.finish();

        let expression = RelationExpression::parse("exim4 | postfix").unwrap();
        let satisfying = cache.get_satisfying_versions(&expression);
        let names: Vec<&str> = satisfying.iter().map(|v| v.package_name.as_str()).collect();
        assert_eq!(names, vec!["exim4", "postfix"]);
    }

    #[test]
    fn test_duplicate_with_mismatching_hashes_is_dropped() {
        let mut builder = CacheBuilder::new();
        builder.add_binary_version(BinaryVersionBuilder::new("acme", "1.0").file(FileRecord {
            md5: "aaa".to_string(),
            ..FileRecord::default()
        }));
        builder.add_binary_version(BinaryVersionBuilder::new("acme", "1.0").file(FileRecord {
            md5: "bbb".to_string(),
            ..FileRecord::default()
        }));
        let cache = builder.finish();
        let package = cache.binary_package("acme").unwrap();
        assert_eq!(package.versions().len(), 1);
        assert_eq!(package.versions()[0].file.md5, "aaa");
    }

    #[test]
    fn test_installed_versions() {
        let mut builder = CacheBuilder::new();
        builder.add_binary_version(builder_with_deps("acme", "1.0", "libc6"));
        builder.set_installed("acme", "1.0", InstalledRecord::installed());
        builder.set_installed("ghost", "0.1", InstalledRecord::installed());
        let cache = builder.finish();

        let installed = cache.get_installed_versions();
        let names: Vec<&str> = installed.iter().map(|v| v.package_name.as_str()).collect();
        assert_eq!(names, vec!["acme", "ghost"]);
        // the ghost version was synthesized from the status database
        assert!(cache.installed_version("ghost").unwrap().sources.is_empty());
    }

    #[test]
    fn test_broken_installed_only_version_does_not_satisfy() {
        let mut builder = CacheBuilder::new();
        builder.add_binary_version(BinaryVersionBuilder::new("user", "1.0"));
        builder.set_installed(
            "dep",
            "1.0",
            InstalledRecord::parse("dep", "install ok half-installed").unwrap(),
        );
        let cache = builder.finish();

        let expression = RelationExpression::parse("dep").unwrap();
        assert!(cache.get_satisfying_versions(&expression).is_empty());
    }
}
