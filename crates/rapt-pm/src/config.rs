//! Resolver and archive configuration.
//!
//! All options are typed fields with defaults; string key/value overrides
//! are accepted through [`Config::set`] so callers can forward `-o key=value`
//! style input. Unknown keys are ignored with a warning, invalid values are
//! errors.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{RaptError, Result};

/// Which solution the chooser expands next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverType {
    /// Always expand the best solution.
    Fair,
    /// Expand any unfinished solution first, falling back to fair.
    Full,
}

/// Source-version synchronization level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynchronizeLevel {
    None,
    Soft,
    Hard,
}

/// Integer multipliers for the score sub-components.
#[derive(Debug, Clone)]
pub struct ScoreTuning {
    pub new: i64,
    pub removal: i64,
    pub upgrade: i64,
    pub downgrade: i64,
    pub quality_adjustment: i64,
    pub position_penalty: i64,
    pub unsatisfied_recommends: i64,
    pub unsatisfied_suggests: i64,
    pub failed_synchronization: i64,
}

impl Default for ScoreTuning {
    fn default() -> Self {
        Self {
            new: 1,
            removal: 5,
            upgrade: 1,
            downgrade: 2,
            quality_adjustment: 1,
            position_penalty: 1,
            unsatisfied_recommends: 300,
            unsatisfied_suggests: 50,
            failed_synchronization: 200,
        }
    }
}

/// The full configuration consumed by the core.
#[derive(Debug, Clone)]
pub struct Config {
    pub resolver_type: ResolverType,
    pub max_solution_count: usize,
    pub keep_recommends: bool,
    pub keep_suggests: bool,
    pub auto_remove: bool,
    pub no_remove: bool,
    pub synchronize_source_versions: SynchronizeLevel,
    /// Hard synchronization may displace explicit user requests; surfaced as
    /// a sub-policy instead of guessing (see DESIGN.md).
    pub sync_hard_overrides_requests: bool,
    pub track_reasons: bool,
    pub quality_bar: i64,
    pub score_tuning: ScoreTuning,
    pub never_autoremove: Vec<String>,
    pub no_autoremove_if_rdepends_exist: Vec<String>,
    pub default_release: String,
    pub architecture: String,
    pub debug_resolver: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolver_type: ResolverType::Fair,
            max_solution_count: 512,
            keep_recommends: true,
            keep_suggests: false,
            auto_remove: true,
            no_remove: false,
            synchronize_source_versions: SynchronizeLevel::None,
            sync_hard_overrides_requests: false,
            track_reasons: false,
            quality_bar: 10,
            score_tuning: ScoreTuning::default(),
            never_autoremove: Vec::new(),
            no_autoremove_if_rdepends_exist: Vec::new(),
            default_release: String::new(),
            architecture: "amd64".to_string(),
            debug_resolver: false,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(RaptError::Config(format!(
            "the option '{}' requires a boolean value, got '{}'",
            key, value
        ))),
    }
}

fn parse_integer(key: &str, value: &str) -> Result<i64> {
    value.parse().map_err(|_| {
        RaptError::Config(format!(
            "the option '{}' requires an integer value, got '{}'",
            key, value
        ))
    })
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one `key=value` override. Unknown keys warn and are ignored.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "cupt::resolver::type" => {
                self.resolver_type = match value {
                    "fair" => ResolverType::Fair,
                    "full" => ResolverType::Full,
                    _ => {
                        return Err(RaptError::Config(format!(
                            "wrong resolver type '{}'",
                            value
                        )))
                    }
                };
            }
            "cupt::resolver::max-solution-count" => {
                let count = parse_integer(key, value)?;
                if count <= 0 {
                    return Err(RaptError::Config(format!(
                        "the option '{}' must be positive",
                        key
                    )));
                }
                self.max_solution_count = count as usize;
            }
            "cupt::resolver::keep-recommends" => self.keep_recommends = parse_bool(key, value)?,
            "cupt::resolver::keep-suggests" => self.keep_suggests = parse_bool(key, value)?,
            "cupt::resolver::auto-remove" => self.auto_remove = parse_bool(key, value)?,
            "cupt::resolver::no-remove" => self.no_remove = parse_bool(key, value)?,
            "cupt::resolver::synchronize-source-versions" => {
                self.synchronize_source_versions = match value {
                    "none" => SynchronizeLevel::None,
                    "soft" => SynchronizeLevel::Soft,
                    "hard" => SynchronizeLevel::Hard,
                    _ => {
                        return Err(RaptError::Config(format!(
                            "the option '{}' can have only values 'none', 'soft' or 'hard'",
                            key
                        )))
                    }
                };
            }
            "cupt::resolver::synchronize-source-versions::hard-overrides-requests" => {
                self.sync_hard_overrides_requests = parse_bool(key, value)?
            }
            "cupt::resolver::track-reasons" => self.track_reasons = parse_bool(key, value)?,
            "cupt::resolver::quality-bar" => self.quality_bar = parse_integer(key, value)?,
            "cupt::resolver::tune-score::new" => {
                self.score_tuning.new = parse_integer(key, value)?
            }
            "cupt::resolver::tune-score::removal" => {
                self.score_tuning.removal = parse_integer(key, value)?
            }
            "cupt::resolver::tune-score::upgrade" => {
                self.score_tuning.upgrade = parse_integer(key, value)?
            }
            "cupt::resolver::tune-score::downgrade" => {
                self.score_tuning.downgrade = parse_integer(key, value)?
            }
            "cupt::resolver::tune-score::quality-adjustment" => {
                self.score_tuning.quality_adjustment = parse_integer(key, value)?
            }
            "cupt::resolver::tune-score::position-penalty" => {
                self.score_tuning.position_penalty = parse_integer(key, value)?
            }
            "cupt::resolver::tune-score::failed-recommends" => {
                self.score_tuning.unsatisfied_recommends = parse_integer(key, value)?
            }
            "cupt::resolver::tune-score::failed-suggests" => {
                self.score_tuning.unsatisfied_suggests = parse_integer(key, value)?
            }
            "cupt::resolver::tune-score::failed-synchronization" => {
                self.score_tuning.failed_synchronization = parse_integer(key, value)?
            }
            "apt::default-release" => self.default_release = value.to_string(),
            "apt::architecture" => self.architecture = value.to_string(),
            "debug::resolver" => self.debug_resolver = parse_bool(key, value)?,
            // list-valued options accept one element per call
            "apt::neverautoremove" => self.never_autoremove.push(value.to_string()),
            "cupt::resolver::no-autoremove-if-rdepends-exist" => {
                self.no_autoremove_if_rdepends_exist.push(value.to_string())
            }
            _ => {
                log::warn!("ignoring unknown configuration option '{}'", key);
            }
        }
        Ok(())
    }

    /// Load overrides from a JSON file mapping option names to values.
    ///
    /// Scalar values apply as single overrides, arrays append to
    /// list-valued options.
    pub fn load_overrides(&mut self, path: &Path) -> Result<()> {
        let raw = std::fs::read_to_string(path)?;
        let parsed: HashMap<String, OverrideValue> = serde_json::from_str(&raw)?;
        let mut keys: Vec<&String> = parsed.keys().collect();
        keys.sort();
        for key in keys {
            match &parsed[key] {
                OverrideValue::String(value) => self.set(key, value)?,
                OverrideValue::Bool(value) => self.set(key, if *value { "true" } else { "false" })?,
                OverrideValue::Integer(value) => self.set(key, &value.to_string())?,
                OverrideValue::List(values) => {
                    for value in values {
                        self.set(key, value)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OverrideValue {
    String(String),
    Bool(bool),
    Integer(i64),
    List(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new();
        assert_eq!(config.resolver_type, ResolverType::Fair);
        assert_eq!(config.max_solution_count, 512);
        assert!(config.keep_recommends);
        assert!(!config.keep_suggests);
    }

    #[test]
    fn test_set_known_options() {
        let mut config = Config::new();
        config.set("cupt::resolver::type", "full").unwrap();
        config.set("cupt::resolver::max-solution-count", "64").unwrap();
        config.set("cupt::resolver::track-reasons", "true").unwrap();
        config.set("apt::neverautoremove", "linux-image-*").unwrap();

        assert_eq!(config.resolver_type, ResolverType::Full);
        assert_eq!(config.max_solution_count, 64);
        assert!(config.track_reasons);
        assert_eq!(config.never_autoremove, vec!["linux-image-*".to_string()]);
    }

    #[test]
    fn test_invalid_values_are_errors() {
        let mut config = Config::new();
        assert!(config.set("cupt::resolver::type", "unfair").is_err());
        assert!(config.set("cupt::resolver::max-solution-count", "-1").is_err());
        assert!(config.set("cupt::resolver::auto-remove", "maybe").is_err());
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let mut config = Config::new();
        assert!(config.set("cupt::resolver::does-not-exist", "1").is_ok());
    }
}
