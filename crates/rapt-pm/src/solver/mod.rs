//! The dependency resolver: graph, scoring, solution storage and the
//! best-first search engine.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use rapt_version::RelationExpression;

use crate::cache::version::DependencyKind;
use crate::cache::BinaryVersion;

pub mod auto_removal;
pub mod fail_tree;
pub mod graph;
pub mod score;
pub mod solution;
#[allow(clippy::module_inception)]
mod solver;


pub use graph::{DependencyGraph, Element, ElementId, InitialPackageEntry, UnsatisfiedKind};
pub use score::{ScoreChange, ScoreManager};
pub use solution::{
    Action, BrokenSuccessor, IntroducedBy, PackageEntry, Solution, SolutionStorage,
};
pub use solver::NativeResolver;

/// The caller's verdict on a proposed solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAnswer {
    /// Take this solution; resolution ends successfully.
    Accept,
    /// Keep searching for another solution.
    Decline,
    /// Stop resolving entirely.
    Abandon,
}

/// Why a package ended up in its suggested state.
#[derive(Debug, Clone)]
pub enum Reason {
    /// Explicitly requested by the user.
    User,
    /// Dropped by the auto-removal pass.
    AutoRemoval,
    /// Needed (or forbidden) by a relation of another version.
    RelationExpression {
        version: Arc<BinaryVersion>,
        dependency_kind: DependencyKind,
        relation_expression: Arc<RelationExpression>,
    },
    /// Pulled along to synchronize source versions.
    Synchronization { package_name: String },
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::User => write!(f, "user request"),
            Reason::AutoRemoval => write!(f, "auto-removal"),
            Reason::RelationExpression {
                version,
                dependency_kind,
                relation_expression,
            } => write!(
                f,
                "{} {} {} '{}'",
                version.package_name, version.version_string, dependency_kind, relation_expression
            ),
            Reason::Synchronization { package_name } => {
                write!(f, "synchronization with {}", package_name)
            }
        }
    }
}

/// One package's suggested state in an offer.
#[derive(Debug, Clone)]
pub struct SuggestedPackage {
    /// The version to end up with; empty means removal.
    pub version: Option<Arc<BinaryVersion>>,
    pub manually_selected: bool,
    pub reasons: Vec<Reason>,
}

/// A proposed solution, handed to the caller's callback.
#[derive(Debug, Clone, Default)]
pub struct Offer {
    pub suggested_packages: IndexMap<String, SuggestedPackage>,
    pub unresolved_problems: Vec<Reason>,
}

impl Offer {
    /// The suggested version of a package, flattened; `None` when the
    /// package is unknown to the offer or suggested removed.
    pub fn suggested_version(&self, package_name: &str) -> Option<&Arc<BinaryVersion>> {
        self.suggested_packages
            .get(package_name)
            .and_then(|suggested| suggested.version.as_ref())
    }

    /// Whether the offer suggests removing the package.
    pub fn suggests_removal(&self, package_name: &str) -> bool {
        self.suggested_packages
            .get(package_name)
            .map(|suggested| suggested.version.is_none())
            .unwrap_or(false)
    }
}
