//! The package universe and its supporting state.

#[allow(clippy::module_inception)]
mod cache;
pub mod package;
pub mod pin;
pub mod state;
pub mod version;

pub use cache::{Cache, CacheBuilder};
pub use package::{BinaryPackage, SourcePackage};
pub use pin::{PinPreferences, PinPredicate, PinRule, ReleaseAttribute};
pub use state::{Flag, InstalledRecord, Status, SystemState, Want};
pub use version::{
    BinaryVersion, BinaryVersionBuilder, DependencyKind, DownloadRecord, FileRecord,
    PackagePriority, ReleaseInfo, Relations, SourceRecord, SourceVersion,
};
