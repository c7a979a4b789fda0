//! Numeric cost model for candidate transitions.

use std::fmt;
use std::sync::Arc;

use crate::cache::version::PackagePriority;
use crate::cache::{BinaryVersion, Cache};
use crate::config::Config;

/// Weight added to installed versions so near-ties favor keeping the
/// system as it is.
const INSTALLED_RETENTION_BONUS: i64 = 5;

const SUB_SCORE_COUNT: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubScore {
    New = 0,
    Removal,
    Upgrade,
    Downgrade,
    QualityAdjustment,
    PositionPenalty,
    UnsatisfiedRecommends,
    UnsatisfiedSuggests,
    FailedSync,
}

const SUB_SCORE_TAGS: [&str; SUB_SCORE_COUNT] = ["a", "r", "u", "d", "q", "pp", "fr", "fs", "fy"];

/// An opaque score delta of one candidate action: the per-component values,
/// a formatted log string and a stable position.
#[derive(Debug, Clone, Default)]
pub struct ScoreChange {
    sub_scores: [i64; SUB_SCORE_COUNT],
}

impl ScoreChange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic tie-break: later candidates get a small penalty.
    pub fn set_position(&mut self, position: usize) {
        self.sub_scores[SubScore::PositionPenalty as usize] = -(position as i64);
    }
}

impl fmt::Display for ScoreChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut empty = true;
        for (index, &value) in self.sub_scores.iter().enumerate() {
            if value != 0 {
                if !empty {
                    write!(f, "/")?;
                }
                write!(f, "{}{}", value, SUB_SCORE_TAGS[index])?;
                empty = false;
            }
        }
        Ok(())
    }
}

/// Computes score changes from pins, priority classes and the configured
/// multipliers.
pub struct ScoreManager {
    cache: Arc<Cache>,
    multipliers: [i64; SUB_SCORE_COUNT],
    quality_bar: i64,
}

impl ScoreManager {
    pub fn new(config: &Config, cache: Arc<Cache>) -> Self {
        let tuning = &config.score_tuning;
        let multipliers = [
            tuning.new,
            tuning.removal,
            tuning.upgrade,
            tuning.downgrade,
            tuning.quality_adjustment,
            tuning.position_penalty,
            tuning.unsatisfied_recommends,
            tuning.unsatisfied_suggests,
            tuning.failed_synchronization,
        ];
        Self {
            cache,
            multipliers,
            quality_bar: config.quality_bar,
        }
    }

    fn priority_bonus(priority: PackagePriority) -> i64 {
        match priority {
            PackagePriority::Required => 40,
            PackagePriority::Important => 30,
            PackagePriority::Standard => 20,
            PackagePriority::Optional => 10,
            PackagePriority::Extra => 0,
        }
    }

    fn version_weight(&self, version: Option<&Arc<BinaryVersion>>) -> i64 {
        match version {
            Some(version) => {
                let retention = if version.installed {
                    INSTALLED_RETENTION_BONUS
                } else {
                    0
                };
                self.cache.get_pin(version) + Self::priority_bonus(version.priority) + retention
            }
            None => 0,
        }
    }

    /// The score change of swapping `original` for `supposed` in a
    /// solution; either side may be absent (install / removal).
    pub fn version_score_change(
        &self,
        original: Option<&Arc<BinaryVersion>>,
        supposed: Option<&Arc<BinaryVersion>>,
    ) -> ScoreChange {
        let mut value = self.version_weight(supposed) - self.version_weight(original);

        let sub_score = match (original, supposed) {
            (None, _) => SubScore::New,
            (Some(original), None) => {
                if value < 0 && original.essential {
                    value *= 5;
                }
                SubScore::Removal
            }
            (Some(original), Some(supposed)) => {
                if rapt_version::compare_version_strings(
                    &original.version_string,
                    &supposed.version_string,
                ) == std::cmp::Ordering::Less
                {
                    SubScore::Upgrade
                } else {
                    SubScore::Downgrade
                }
            }
        };

        let mut change = ScoreChange::new();
        change.sub_scores[sub_score as usize] = value;
        // every action pays the quality bar, biasing toward short solutions
        change.sub_scores[SubScore::QualityAdjustment as usize] -= self.quality_bar;
        change
    }

    pub fn unsatisfied_recommends_score_change(&self) -> ScoreChange {
        let mut change = ScoreChange::new();
        change.sub_scores[SubScore::UnsatisfiedRecommends as usize] = -1;
        change
    }

    pub fn unsatisfied_suggests_score_change(&self) -> ScoreChange {
        let mut change = ScoreChange::new();
        change.sub_scores[SubScore::UnsatisfiedSuggests as usize] = -1;
        change
    }

    pub fn unsatisfied_synchronization_score_change(&self) -> ScoreChange {
        let mut change = ScoreChange::new();
        change.sub_scores[SubScore::FailedSync as usize] = -1;
        change
    }

    /// Collapse a score change to its scalar value. Version-swap components
    /// are damped so pins dominate structure, not magnitude.
    pub fn score_change_value(&self, change: &ScoreChange) -> i64 {
        let mut result = 0;
        for (index, &sub_score) in change.sub_scores.iter().enumerate() {
            let mut sub_value = sub_score * self.multipliers[index];
            if index <= SubScore::Downgrade as usize {
                sub_value /= 10;
            }
            result += sub_value;
        }
        result
    }

    pub fn score_change_string(&self, change: &ScoreChange) -> String {
        format!("{}={}", change, self.score_change_value(change))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::version::BinaryVersionBuilder;
    use crate::cache::CacheBuilder;

    fn manager() -> (ScoreManager, Arc<BinaryVersion>, Arc<BinaryVersion>) {
        let mut builder = CacheBuilder::new();
        builder.add_binary_version(BinaryVersionBuilder::new("acme", "1.0"));
        builder.add_binary_version(BinaryVersionBuilder::new("acme", "2.0"));
        let cache = Arc::new(builder.finish());
        let old = cache.binary_package("acme").unwrap().specific_version("1.0").unwrap().clone();
        let new = cache.binary_package("acme").unwrap().specific_version("2.0").unwrap().clone();
        (ScoreManager::new(&Config::new(), cache), old, new)
    }

    #[test]
    fn test_install_is_positive_removal_negative() {
        let (manager, old, _) = manager();
        let install = manager.version_score_change(None, Some(&old));
        let removal = manager.version_score_change(Some(&old), None);
        assert!(manager.score_change_value(&install) > manager.score_change_value(&removal));
        assert!(manager.score_change_value(&removal) < 0);
    }

    #[test]
    fn test_upgrade_beats_downgrade() {
        let (manager, old, new) = manager();
        let upgrade = manager.version_score_change(Some(&old), Some(&new));
        let downgrade = manager.version_score_change(Some(&new), Some(&old));
        assert!(manager.score_change_value(&upgrade) >= manager.score_change_value(&downgrade));
    }

    #[test]
    fn test_position_breaks_ties() {
        let (manager, old, _) = manager();
        let mut first = manager.version_score_change(None, Some(&old));
        let mut second = manager.version_score_change(None, Some(&old));
        first.set_position(0);
        second.set_position(1);
        assert!(manager.score_change_value(&first) > manager.score_change_value(&second));
    }

    #[test]
    fn test_score_change_string() {
        let (manager, old, _) = manager();
        let mut change = manager.version_score_change(None, Some(&old));
        change.set_position(2);
        let formatted = manager.score_change_string(&change);
        assert!(formatted.contains('a'));
        assert!(formatted.contains("pp"));
        assert!(formatted.contains('='));
    }
}
