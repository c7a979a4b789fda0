//! Pin preferences: numeric version scoring from release defaults and user
//! pinning rules.

use glob::Pattern;
use regex::Regex;

use crate::cache::version::BinaryVersion;
use crate::error::{RaptError, Result};

/// Pin given to versions available from the configured default release.
pub const DEFAULT_RELEASE_PIN: i64 = 990;
/// Pin given to versions available from any other release.
pub const OTHER_RELEASE_PIN: i64 = 500;
/// Pin given to versions present on the system but in no release.
pub const INSTALLED_ONLY_PIN: i64 = 100;

/// Release attributes a pin rule may match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseAttribute {
    Archive,
    Codename,
    Component,
    Label,
    Origin,
    Vendor,
    Version,
}

/// The match predicate of one pin rule.
#[derive(Debug, Clone)]
pub enum PinPredicate {
    /// Package name globs; the rule applies when any pattern matches.
    PackageName(Vec<Pattern>),
    /// Origin (host) of any source release.
    Origin(String),
    /// Conjunction of release attribute requirements.
    Release(Vec<(ReleaseAttribute, String)>),
    /// Version string regular expression.
    VersionRegex(Regex),
}

/// One ordered preference rule.
#[derive(Debug, Clone)]
pub struct PinRule {
    pub predicate: PinPredicate,
    pub priority: i64,
}

/// The compiled preference list. Patterns and regexes are compiled once when
/// the rule is added, not per package.
#[derive(Debug, Clone, Default)]
pub struct PinPreferences {
    rules: Vec<PinRule>,
}

impl PinPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&mut self, rule: PinRule) {
        self.rules.push(rule);
    }

    /// Add a package-name glob rule.
    pub fn pin_package_names(&mut self, patterns: &[&str], priority: i64) -> Result<()> {
        let mut compiled = Vec::new();
        for pattern in patterns {
            let pattern = Pattern::new(pattern).map_err(|e| {
                RaptError::Config(format!("invalid pin glob '{}': {}", pattern, e))
            })?;
            compiled.push(pattern);
        }
        self.add_rule(PinRule {
            predicate: PinPredicate::PackageName(compiled),
            priority,
        });
        Ok(())
    }

    /// Add a release-attribute rule.
    pub fn pin_release(&mut self, requirements: Vec<(ReleaseAttribute, String)>, priority: i64) {
        self.add_rule(PinRule {
            predicate: PinPredicate::Release(requirements),
            priority,
        });
    }

    /// Add an origin rule.
    pub fn pin_origin(&mut self, origin: impl Into<String>, priority: i64) {
        self.add_rule(PinRule {
            predicate: PinPredicate::Origin(origin.into()),
            priority,
        });
    }

    /// Add a version-regex rule.
    pub fn pin_version_regex(&mut self, pattern: &str, priority: i64) -> Result<()> {
        let regex = Regex::new(pattern).map_err(|e| {
            RaptError::Config(format!("invalid pin version regex '{}': {}", pattern, e))
        })?;
        self.add_rule(PinRule {
            predicate: PinPredicate::VersionRegex(regex),
            priority,
        });
        Ok(())
    }

    fn rule_matches(rule: &PinRule, version: &BinaryVersion) -> bool {
        match &rule.predicate {
            PinPredicate::PackageName(patterns) => patterns
                .iter()
                .any(|pattern| pattern.matches(&version.package_name)),
            PinPredicate::Origin(origin) => version
                .sources
                .iter()
                .any(|source| &source.release.origin == origin),
            PinPredicate::Release(requirements) => version.sources.iter().any(|source| {
                requirements.iter().all(|(attribute, value)| {
                    let actual = match attribute {
                        ReleaseAttribute::Archive => &source.release.archive,
                        ReleaseAttribute::Codename => &source.release.codename,
                        ReleaseAttribute::Component => &source.release.component,
                        ReleaseAttribute::Label => &source.release.label,
                        ReleaseAttribute::Origin => &source.release.origin,
                        ReleaseAttribute::Vendor => &source.release.vendor,
                        ReleaseAttribute::Version => &source.release.version,
                    };
                    actual == value
                })
            }),
            PinPredicate::VersionRegex(regex) => regex.is_match(&version.version_string),
        }
    }

    /// Compute the pin of a version: the highest-priority matching rule, or
    /// the release-level default, plus the installed bias.
    pub fn pin_of(&self, version: &BinaryVersion, default_release: &str) -> i64 {
        let explicit = self
            .rules
            .iter()
            .filter(|rule| Self::rule_matches(rule, version))
            .map(|rule| rule.priority)
            .max();

        match explicit {
            Some(priority) => priority,
            None => {
                if version.sources.is_empty() {
                    INSTALLED_ONLY_PIN
                } else if !default_release.is_empty()
                    && version.sources.iter().any(|source| {
                        source.release.archive == default_release
                            || source.release.codename == default_release
                    })
                {
                    DEFAULT_RELEASE_PIN
                } else {
                    OTHER_RELEASE_PIN
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::version::{BinaryVersionBuilder, ReleaseInfo};
    use std::sync::Arc;

    fn version_in_release(archive: &str, installed: bool) -> BinaryVersion {
        let release = Arc::new(ReleaseInfo {
            archive: archive.to_string(),
            origin: "deb.example.org".to_string(),
            ..ReleaseInfo::default()
        });
        let mut builder = BinaryVersionBuilder::new("acme", "1.0");
        builder.add_source(release, "pool/main/a/acme");
        builder.set_installed(installed);
        builder.finish()
    }

    #[test]
    fn test_release_defaults() {
        let preferences = PinPreferences::new();
        let version = version_in_release("stable", false);
        assert_eq!(preferences.pin_of(&version, "stable"), DEFAULT_RELEASE_PIN);
        assert_eq!(preferences.pin_of(&version, "testing"), OTHER_RELEASE_PIN);
        assert_eq!(preferences.pin_of(&version, ""), OTHER_RELEASE_PIN);
    }

    #[test]
    fn test_installed_version_keeps_its_release_pin() {
        let preferences = PinPreferences::new();
        let version = version_in_release("stable", true);
        assert_eq!(preferences.pin_of(&version, "stable"), DEFAULT_RELEASE_PIN);

        let orphan = BinaryVersionBuilder::new("acme", "0.9").finish();
        // present on the system only, not in any release
        assert_eq!(preferences.pin_of(&orphan, ""), INSTALLED_ONLY_PIN);
    }

    #[test]
    fn test_package_name_glob() {
        let mut preferences = PinPreferences::new();
        preferences.pin_package_names(&["acme*"], 1200).unwrap();
        let version = version_in_release("stable", false);
        assert_eq!(preferences.pin_of(&version, "stable"), 1200);
    }

    #[test]
    fn test_highest_matching_rule_wins() {
        let mut preferences = PinPreferences::new();
        preferences.pin_package_names(&["acme"], 700).unwrap();
        preferences.pin_origin("deb.example.org", 900);
        let version = version_in_release("stable", false);
        assert_eq!(preferences.pin_of(&version, ""), 900);
    }

    #[test]
    fn test_version_regex() {
        let mut preferences = PinPreferences::new();
        preferences.pin_version_regex(r"^1\.", 50).unwrap();
        let version = version_in_release("stable", false);
        assert_eq!(preferences.pin_of(&version, ""), 50);
    }

    #[test]
    fn test_invalid_patterns_are_errors() {
        let mut preferences = PinPreferences::new();
        assert!(preferences.pin_package_names(&["[invalid"], 100).is_err());
        assert!(preferences.pin_version_regex("(unclosed", 100).is_err());
    }
}
