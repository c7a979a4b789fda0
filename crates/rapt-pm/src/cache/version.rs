//! Version records: the parsed metadata of one package version.
//!
//! Versions are built in two phases: a mutable builder accumulates sources
//! while index files are merged, `finish()` produces the immutable value the
//! universe hands out behind an `Arc`.

use std::fmt;
use std::sync::Arc;

use rapt_version::{RelationExpression, RelationLine};

/// Debian package priority classes, most important first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PackagePriority {
    Required,
    Important,
    Standard,
    Optional,
    Extra,
}

impl PackagePriority {
    pub fn as_str(self) -> &'static str {
        match self {
            PackagePriority::Required => "required",
            PackagePriority::Important => "important",
            PackagePriority::Standard => "standard",
            PackagePriority::Optional => "optional",
            PackagePriority::Extra => "extra",
        }
    }
}

impl fmt::Display for PackagePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The relation kinds a binary version may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DependencyKind {
    PreDepends,
    Depends,
    Recommends,
    Suggests,
    Enhances,
    Conflicts,
    Breaks,
    Replaces,
}

impl DependencyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DependencyKind::PreDepends => "Pre-Depends",
            DependencyKind::Depends => "Depends",
            DependencyKind::Recommends => "Recommends",
            DependencyKind::Suggests => "Suggests",
            DependencyKind::Enhances => "Enhances",
            DependencyKind::Conflicts => "Conflicts",
            DependencyKind::Breaks => "Breaks",
            DependencyKind::Replaces => "Replaces",
        }
    }

    /// Anti relations forbid co-installation instead of requiring it.
    pub fn is_anti(self) -> bool {
        matches!(self, DependencyKind::Conflicts | DependencyKind::Breaks)
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One relation line per relation kind.
#[derive(Debug, Clone, Default)]
pub struct Relations {
    pub pre_depends: RelationLine,
    pub depends: RelationLine,
    pub recommends: RelationLine,
    pub suggests: RelationLine,
    pub enhances: RelationLine,
    pub conflicts: RelationLine,
    pub breaks: RelationLine,
    pub replaces: RelationLine,
}

impl Relations {
    pub fn get(&self, kind: DependencyKind) -> &RelationLine {
        match kind {
            DependencyKind::PreDepends => &self.pre_depends,
            DependencyKind::Depends => &self.depends,
            DependencyKind::Recommends => &self.recommends,
            DependencyKind::Suggests => &self.suggests,
            DependencyKind::Enhances => &self.enhances,
            DependencyKind::Conflicts => &self.conflicts,
            DependencyKind::Breaks => &self.breaks,
            DependencyKind::Replaces => &self.replaces,
        }
    }

    pub fn get_mut(&mut self, kind: DependencyKind) -> &mut RelationLine {
        match kind {
            DependencyKind::PreDepends => &mut self.pre_depends,
            DependencyKind::Depends => &mut self.depends,
            DependencyKind::Recommends => &mut self.recommends,
            DependencyKind::Suggests => &mut self.suggests,
            DependencyKind::Enhances => &mut self.enhances,
            DependencyKind::Conflicts => &mut self.conflicts,
            DependencyKind::Breaks => &mut self.breaks,
            DependencyKind::Replaces => &mut self.replaces,
        }
    }

    /// Whether the given expression appears verbatim under the given kind.
    pub fn contains_expression(&self, kind: DependencyKind, expression: &RelationExpression) -> bool {
        let key = expression.hash_string();
        self.get(kind).0.iter().any(|e| e.hash_string() == key)
    }
}

/// Release metadata of one index a version is available from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub archive: String,
    pub codename: String,
    pub component: String,
    pub vendor: String,
    pub label: String,
    pub version: String,
    pub origin: String,
    pub base_uri: String,
    pub verified: bool,
}

/// The archive file carrying a binary version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRecord {
    pub name: String,
    pub size: u64,
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
}

/// One index entry a version was read from.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub release: Arc<ReleaseInfo>,
    pub directory: String,
}

/// A download location with its expected file record.
#[derive(Debug, Clone)]
pub struct DownloadRecord {
    pub base_uri: String,
    pub directory: String,
}

/// A binary package version as shipped to a system.
#[derive(Debug, Clone)]
pub struct BinaryVersion {
    pub package_name: String,
    pub version_string: String,
    pub architecture: String,
    pub section: String,
    pub maintainer: String,
    pub priority: PackagePriority,
    pub essential: bool,
    pub relations: Relations,
    pub provides: Vec<String>,
    pub source_package_name: String,
    pub source_version_string: String,
    pub installed_size: u64,
    pub file: FileRecord,
    pub sources: Vec<SourceRecord>,
    pub installed: bool,
}

impl BinaryVersion {
    /// Whether any carrying release was verified.
    pub fn is_verified(&self) -> bool {
        self.sources.iter().any(|s| s.release.verified)
    }

    /// De-duplicated download locations across all sources.
    pub fn download_records(&self) -> Vec<DownloadRecord> {
        let mut seen = std::collections::HashSet::new();
        let mut result = Vec::new();
        for source in &self.sources {
            if source.release.base_uri.is_empty() {
                continue;
            }
            let full = format!("{}/{}", source.release.base_uri, source.directory);
            if seen.insert(full) {
                result.push(DownloadRecord {
                    base_uri: source.release.base_uri.clone(),
                    directory: source.directory.clone(),
                });
            }
        }
        result
    }
}

impl fmt::Display for BinaryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.package_name, self.version_string)
    }
}

/// Mutable first phase of a [`BinaryVersion`].
#[derive(Debug, Clone)]
pub struct BinaryVersionBuilder {
    version: BinaryVersion,
}

impl BinaryVersionBuilder {
    pub fn new(package_name: impl Into<String>, version_string: impl Into<String>) -> Self {
        Self {
            version: BinaryVersion {
                package_name: package_name.into(),
                version_string: version_string.into(),
                architecture: "all".to_string(),
                section: String::new(),
                maintainer: String::new(),
                priority: PackagePriority::Optional,
                essential: false,
                relations: Relations::default(),
                provides: Vec::new(),
                source_package_name: String::new(),
                source_version_string: String::new(),
                installed_size: 0,
                file: FileRecord::default(),
                sources: Vec::new(),
                installed: false,
            },
        }
    }

    pub fn architecture(mut self, architecture: impl Into<String>) -> Self {
        self.version.architecture = architecture.into();
        self
    }

    pub fn section(mut self, section: impl Into<String>) -> Self {
        self.version.section = section.into();
        self
    }

    pub fn maintainer(mut self, maintainer: impl Into<String>) -> Self {
        self.version.maintainer = maintainer.into();
        self
    }

    pub fn priority(mut self, priority: PackagePriority) -> Self {
        self.version.priority = priority;
        self
    }

    pub fn essential(mut self, essential: bool) -> Self {
        self.version.essential = essential;
        self
    }

    pub fn relation(mut self, kind: DependencyKind, line: RelationLine) -> Self {
        *self.version.relations.get_mut(kind) = line;
        self
    }

    pub fn provides(mut self, names: Vec<String>) -> Self {
        self.version.provides = names;
        self
    }

    pub fn source(
        mut self,
        source_package_name: impl Into<String>,
        source_version_string: impl Into<String>,
    ) -> Self {
        self.version.source_package_name = source_package_name.into();
        self.version.source_version_string = source_version_string.into();
        self
    }

    pub fn installed_size(mut self, size: u64) -> Self {
        self.version.installed_size = size;
        self
    }

    pub fn file(mut self, file: FileRecord) -> Self {
        self.version.file = file;
        self
    }

    /// Record one more index carrying this version.
    pub fn add_source(&mut self, release: Arc<ReleaseInfo>, directory: impl Into<String>) {
        self.version.sources.push(SourceRecord {
            release,
            directory: directory.into(),
        });
    }

    pub(crate) fn set_installed(&mut self, installed: bool) {
        self.version.installed = installed;
    }

    pub(crate) fn file_record(&self) -> &FileRecord {
        &self.version.file
    }

    pub(crate) fn package_name(&self) -> &str {
        &self.version.package_name
    }

    pub(crate) fn version_string(&self) -> &str {
        &self.version.version_string
    }

    /// Freeze into the immutable value.
    pub fn finish(mut self) -> BinaryVersion {
        if self.version.source_package_name.is_empty() {
            self.version.source_package_name = self.version.package_name.clone();
        }
        if self.version.source_version_string.is_empty() {
            self.version.source_version_string = self.version.version_string.clone();
        }
        self.version
    }
}

/// A source-package version, producing one or more binary packages.
#[derive(Debug, Clone)]
pub struct SourceVersion {
    pub package_name: String,
    pub version_string: String,
    pub binary_package_names: Vec<String>,
    pub maintainer: String,
    pub priority: PackagePriority,
    pub sources: Vec<SourceRecord>,
}

impl fmt::Display for SourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.package_name, self.version_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let version = BinaryVersionBuilder::new("acme", "1.0-1").finish();
        assert_eq!(version.package_name, "acme");
        assert_eq!(version.version_string, "1.0-1");
        assert_eq!(version.priority, PackagePriority::Optional);
        // source fields default to the binary ones
        assert_eq!(version.source_package_name, "acme");
        assert_eq!(version.source_version_string, "1.0-1");
    }

    #[test]
    fn test_download_records_deduplicate() {
        let release = Arc::new(ReleaseInfo {
            base_uri: "http://deb.example.org/debian".to_string(),
            ..ReleaseInfo::default()
        });
        let mut builder = BinaryVersionBuilder::new("acme", "1.0-1");
        builder.add_source(release.clone(), "pool/main/a/acme");
        builder.add_source(release, "pool/main/a/acme");
        let version = builder.finish();
        assert_eq!(version.download_records().len(), 1);
    }

    #[test]
    fn test_relations_lookup() {
        let line = RelationLine::parse("libc6 (>= 2.31)").unwrap();
        let version = BinaryVersionBuilder::new("acme", "1.0")
            .relation(DependencyKind::Depends, line.clone())
            .finish();
        assert_eq!(version.relations.get(DependencyKind::Depends).0.len(), 1);
        assert!(version
            .relations
            .contains_expression(DependencyKind::Depends, &line.0[0]));
        assert!(!version
            .relations
            .contains_expression(DependencyKind::PreDepends, &line.0[0]));
    }
}
