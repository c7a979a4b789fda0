//! Classification of packages for the auto-removal pass.

use glob::Pattern;

use crate::cache::{BinaryVersion, Cache};
use crate::config::Config;
use crate::error::{RaptError, Result};

/// May a version be dropped by auto-removal?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoRemovalAllow {
    No,
    Yes,
    /// Only when nothing in the final state depends on it. Under the
    /// reachability formulation this coincides with `Yes`; see DESIGN.md.
    YesIfNoRDepends,
}

/// Compiled once per resolve call; pattern lists are not recompiled per
/// package.
pub struct AutoRemovalPossibility {
    can_autoremove: bool,
    never_patterns: Vec<Pattern>,
    no_rdepends_patterns: Vec<Pattern>,
}

fn compile_patterns(patterns: &[String], option_name: &str) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|e| {
                RaptError::Config(format!(
                    "invalid glob '{}' in '{}': {}",
                    pattern, option_name, e
                ))
            })
        })
        .collect()
}

impl AutoRemovalPossibility {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            can_autoremove: config.auto_remove,
            never_patterns: compile_patterns(&config.never_autoremove, "apt::neverautoremove")?,
            no_rdepends_patterns: compile_patterns(
                &config.no_autoremove_if_rdepends_exist,
                "cupt::resolver::no-autoremove-if-rdepends-exist",
            )?,
        })
    }

    fn never_autoremove(&self, package_name: &str) -> bool {
        self.never_patterns
            .iter()
            .any(|pattern| pattern.matches(package_name))
    }

    /// Classify one in-solution version.
    pub fn classify(
        &self,
        cache: &Cache,
        version: &BinaryVersion,
        was_installed_before: bool,
        manually_requested: bool,
    ) -> AutoRemovalAllow {
        let package_name = &version.package_name;

        if manually_requested {
            return AutoRemovalAllow::No;
        }
        if version.essential {
            return AutoRemovalAllow::No;
        }
        let can_autoremove_this =
            self.can_autoremove && cache.is_automatically_installed(package_name);
        if was_installed_before && !can_autoremove_this {
            return AutoRemovalAllow::No;
        }
        if self.never_autoremove(package_name) {
            return AutoRemovalAllow::No;
        }
        if self
            .no_rdepends_patterns
            .iter()
            .any(|pattern| pattern.matches(package_name))
        {
            return AutoRemovalAllow::YesIfNoRDepends;
        }
        AutoRemovalAllow::Yes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::version::BinaryVersionBuilder;
    use crate::cache::CacheBuilder;

    fn cache_with_auto(auto: &[&str]) -> Cache {
        let mut builder = CacheBuilder::new();
        for name in auto {
            builder.mark_auto_installed(*name);
        }
        builder.finish()
    }

    #[test]
    fn test_manual_request_blocks_removal() {
        let possibility = AutoRemovalPossibility::new(&Config::new()).unwrap();
        let cache = cache_with_auto(&["lib"]);
        let version = BinaryVersionBuilder::new("lib", "1.0").finish();
        assert_eq!(
            possibility.classify(&cache, &version, true, true),
            AutoRemovalAllow::No
        );
    }

    #[test]
    fn test_auto_installed_old_package_is_removable() {
        let possibility = AutoRemovalPossibility::new(&Config::new()).unwrap();
        let cache = cache_with_auto(&["lib"]);
        let version = BinaryVersionBuilder::new("lib", "1.0").finish();
        assert_eq!(
            possibility.classify(&cache, &version, true, false),
            AutoRemovalAllow::Yes
        );
    }

    #[test]
    fn test_manually_installed_old_package_is_kept() {
        let possibility = AutoRemovalPossibility::new(&Config::new()).unwrap();
        let cache = cache_with_auto(&[]);
        let version = BinaryVersionBuilder::new("app", "1.0").finish();
        assert_eq!(
            possibility.classify(&cache, &version, true, false),
            AutoRemovalAllow::No
        );
    }

    #[test]
    fn test_essential_is_never_removed() {
        let possibility = AutoRemovalPossibility::new(&Config::new()).unwrap();
        let cache = cache_with_auto(&["base"]);
        let version = BinaryVersionBuilder::new("base", "1.0").essential(true).finish();
        assert_eq!(
            possibility.classify(&cache, &version, true, false),
            AutoRemovalAllow::No
        );
    }

    #[test]
    fn test_never_autoremove_globs() {
        let mut config = Config::new();
        config.never_autoremove.push("linux-image-*".to_string());
        let possibility = AutoRemovalPossibility::new(&config).unwrap();
        let cache = cache_with_auto(&["linux-image-6.1"]);
        let version = BinaryVersionBuilder::new("linux-image-6.1", "6.1").finish();
        assert_eq!(
            possibility.classify(&cache, &version, true, false),
            AutoRemovalAllow::No
        );
    }

    #[test]
    fn test_rdepends_globs_degrade_to_conditional() {
        let mut config = Config::new();
        config
            .no_autoremove_if_rdepends_exist
            .push("lib*".to_string());
        let possibility = AutoRemovalPossibility::new(&config).unwrap();
        let cache = cache_with_auto(&["libfoo"]);
        let version = BinaryVersionBuilder::new("libfoo", "1.0").finish();
        assert_eq!(
            possibility.classify(&cache, &version, true, false),
            AutoRemovalAllow::YesIfNoRDepends
        );
    }

    #[test]
    fn test_invalid_glob_is_an_error() {
        let mut config = Config::new();
        config.never_autoremove.push("[bad".to_string());
        assert!(AutoRemovalPossibility::new(&config).is_err());
    }
}
