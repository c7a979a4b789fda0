//! The core of a high-level Debian-family package manager: a read-only
//! package universe, a best-first dependency resolver and an action planner
//! feeding a low-level installer.

pub mod cache;
pub mod config;
pub mod error;
pub mod planner;
pub mod solver;

pub use cache::{
    BinaryPackage, BinaryVersion, BinaryVersionBuilder, Cache, CacheBuilder, DependencyKind,
    InstalledRecord, PackagePriority, PinPreferences, ReleaseInfo, SourcePackage, SourceVersion,
    SystemState,
};
pub use config::{Config, ResolverType, SynchronizeLevel};
pub use error::{RaptError, Result};
pub use planner::{ActionGroup, DownloadManifestEntry, InnerAction, InnerActionKind, Plan, Planner};
pub use solver::{NativeResolver, Offer, Reason, SuggestedPackage, UserAnswer};
