//! Debian version strings and package relations
//!
//! This crate implements the Debian policy algorithm for comparing version
//! strings (epoch / upstream / revision) and the parser for inter-package
//! relation fields (`Depends`, `Conflicts`, ...), including architecture
//! qualifiers.

pub mod relation;
mod version;

pub use relation::{
    filter_architecture, ArchitecturedRelation, ArchitecturedRelationExpression,
    ArchitecturedRelationLine, Relation, RelationError, RelationExpression, RelationLine,
    RelationOp,
};
pub use version::{check_version_string, compare_version_strings, VersionError};
