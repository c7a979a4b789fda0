//! Inter-package relation parsing and satisfaction
//!
//! A relation line (the value of a `Depends`-style field) is a
//! comma-separated conjunction of relation expressions; a relation
//! expression is a `|`-separated disjunction of single relations; a single
//! relation names a package with an optional `(op version)` restriction and
//! an optional `[arch ...]` qualifier list.

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

use crate::version::{check_version_string, compare_version_strings, VersionError};

/// Error type for relation parsing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelationError {
    #[error("failed to parse package name in relation \"{0}\"")]
    PackageName(String),
    #[error("failed to parse versioned info in relation \"{0}\"")]
    VersionedInfo(String),
    #[error("failed to parse architecture filters \"{0}\"")]
    ArchitectureFilters(String),
    #[error(transparent)]
    Version(#[from] VersionError),
}

/// A version restriction operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationOp {
    Less,
    LessOrEqual,
    Equal,
    MoreOrEqual,
    More,
}

impl RelationOp {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationOp::Less => "<<",
            RelationOp::LessOrEqual => "<=",
            RelationOp::Equal => "=",
            RelationOp::MoreOrEqual => ">=",
            RelationOp::More => ">>",
        }
    }

    fn matches(self, ordering: Ordering) -> bool {
        match self {
            RelationOp::Less => ordering == Ordering::Less,
            RelationOp::LessOrEqual => ordering != Ordering::Greater,
            RelationOp::Equal => ordering == Ordering::Equal,
            RelationOp::MoreOrEqual => ordering != Ordering::Less,
            RelationOp::More => ordering == Ordering::Greater,
        }
    }
}

impl fmt::Display for RelationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single relation: a target package name with an optional version
/// restriction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Relation {
    pub package_name: String,
    pub restriction: Option<(RelationOp, String)>,
}

fn is_package_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'+' || byte == b'-' || byte == b'.'
}

fn consume_package_name(input: &str) -> (&str, &str) {
    let end = input
        .bytes()
        .position(|b| !is_package_name_byte(b))
        .unwrap_or(input.len());
    (&input[..end], &input[end..])
}

impl Relation {
    /// Parse a relation like `libc6 (>= 2.31)`.
    pub fn parse(unparsed: &str) -> Result<Self, RelationError> {
        let trimmed = unparsed.trim();
        let (package_name, rest) = consume_package_name(trimmed);
        if package_name.is_empty() {
            return Err(RelationError::PackageName(unparsed.to_string()));
        }

        let rest = rest.trim_start();
        if rest.is_empty() {
            return Ok(Relation {
                package_name: package_name.to_string(),
                restriction: None,
            });
        }

        let inner = rest
            .strip_prefix('(')
            .and_then(|r| r.trim_end().strip_suffix(')'))
            .ok_or_else(|| RelationError::VersionedInfo(unparsed.to_string()))?
            .trim();

        let (op, version_part) = if let Some(v) = inner.strip_prefix(">=") {
            (RelationOp::MoreOrEqual, v)
        } else if let Some(v) = inner.strip_prefix(">>") {
            (RelationOp::More, v)
        } else if let Some(v) = inner.strip_prefix("<=") {
            (RelationOp::LessOrEqual, v)
        } else if let Some(v) = inner.strip_prefix("<<") {
            (RelationOp::Less, v)
        } else if let Some(v) = inner.strip_prefix('=') {
            (RelationOp::Equal, v)
        } else if let Some(v) = inner.strip_prefix('>') {
            // deprecated single-character form, means >=
            (RelationOp::MoreOrEqual, v)
        } else if let Some(v) = inner.strip_prefix('<') {
            (RelationOp::LessOrEqual, v)
        } else {
            return Err(RelationError::VersionedInfo(unparsed.to_string()));
        };

        let version_string = version_part.trim();
        if version_string.is_empty() || version_string.contains(' ') {
            return Err(RelationError::VersionedInfo(unparsed.to_string()));
        }
        check_version_string(version_string)?;

        Ok(Relation {
            package_name: package_name.to_string(),
            restriction: Some((op, version_string.to_string())),
        })
    }

    /// Whether the relation permits considering virtual packages: only
    /// un-versioned relations may be satisfied through provides.
    pub fn is_unversioned(&self) -> bool {
        self.restriction.is_none()
    }

    /// Check whether a concrete version string satisfies this relation.
    pub fn is_satisfied_by(&self, version_string: &str) -> bool {
        match &self.restriction {
            None => true,
            Some((op, restriction_version)) => {
                op.matches(compare_version_strings(version_string, restriction_version))
            }
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.package_name)?;
        if let Some((op, version)) = &self.restriction {
            write!(f, " ({} {})", op, version)?;
        }
        Ok(())
    }
}

/// A disjunction of relations: all `|` alternatives of one `Depends` clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RelationExpression(pub Vec<Relation>);

impl RelationExpression {
    /// Parse an expression like `exim4 | mail-transport-agent`.
    pub fn parse(unparsed: &str) -> Result<Self, RelationError> {
        let mut relations = Vec::new();
        for part in unparsed.split('|') {
            relations.push(Relation::parse(part)?);
        }
        Ok(RelationExpression(relations))
    }

    /// A stable interning key: relations joined in source order.
    pub fn hash_string(&self) -> String {
        let mut result = String::new();
        for relation in &self.0 {
            if !result.is_empty() {
                result.push('|');
            }
            result.push_str(&relation.package_name);
            if let Some((op, version)) = &relation.restriction {
                result.push(' ');
                result.push_str(op.as_str());
                result.push(' ');
                result.push_str(version);
            }
        }
        result
    }
}

impl fmt::Display for RelationExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|r| r.to_string()).collect();
        f.write_str(&parts.join(" | "))
    }
}

/// A conjunction of relation expressions: a whole `Depends`-style field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelationLine(pub Vec<RelationExpression>);

impl RelationLine {
    /// Parse a whole field value, empty input giving an empty line.
    pub fn parse(unparsed: &str) -> Result<Self, RelationError> {
        let trimmed = unparsed.trim();
        if trimmed.is_empty() {
            return Ok(RelationLine::default());
        }
        let mut expressions = Vec::new();
        for part in trimmed.split(',') {
            expressions.push(RelationExpression::parse(part)?);
        }
        Ok(RelationLine(expressions))
    }
}

impl fmt::Display for RelationLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        f.write_str(&parts.join(", "))
    }
}

/// A relation with architecture qualifiers, e.g. `gcc [!armel]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchitecturedRelation {
    pub relation: Relation,
    pub architecture_filters: Vec<String>,
}

impl ArchitecturedRelation {
    pub fn parse(unparsed: &str) -> Result<Self, RelationError> {
        match unparsed.find('[') {
            None => Ok(ArchitecturedRelation {
                relation: Relation::parse(unparsed)?,
                architecture_filters: Vec::new(),
            }),
            Some(bracket) => {
                let filters = unparsed[bracket..].trim();
                let inner = filters
                    .strip_prefix('[')
                    .and_then(|f| f.strip_suffix(']'))
                    .ok_or_else(|| RelationError::ArchitectureFilters(unparsed.to_string()))?;
                Ok(ArchitecturedRelation {
                    relation: Relation::parse(&unparsed[..bracket])?,
                    architecture_filters: inner
                        .split_whitespace()
                        .map(str::to_string)
                        .collect(),
                })
            }
        }
    }

    /// Whether the relation applies to the given architecture, per Debian
    /// Policy §7.1 (positive and negated filter lists).
    pub fn is_eligible_for(&self, architecture: &str) -> bool {
        if self.architecture_filters.is_empty() {
            return true;
        }
        let negated = self.architecture_filters[0].starts_with('!');
        for filter in &self.architecture_filters {
            let pattern = filter.strip_prefix('!').unwrap_or(filter);
            if architecture_match(architecture, pattern) {
                return !negated;
            }
        }
        negated
    }
}

/// Architecture wildcard matching: `any` components match everything, so
/// `linux-any` matches `amd64` (implicitly `linux-amd64`).
fn architecture_match(architecture: &str, pattern: &str) -> bool {
    if pattern == "any" || pattern == architecture {
        return true;
    }
    if let Some((os, cpu)) = pattern.split_once('-') {
        let (arch_os, arch_cpu) = architecture.split_once('-').unwrap_or(("linux", architecture));
        let os_matches = os == "any" || os == arch_os;
        let cpu_matches = cpu == "any" || cpu == arch_cpu;
        return os_matches && cpu_matches;
    }
    false
}

/// An architecture-qualified relation expression.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArchitecturedRelationExpression(pub Vec<ArchitecturedRelation>);

impl ArchitecturedRelationExpression {
    pub fn parse(unparsed: &str) -> Result<Self, RelationError> {
        let mut relations = Vec::new();
        for part in unparsed.split('|') {
            relations.push(ArchitecturedRelation::parse(part)?);
        }
        Ok(ArchitecturedRelationExpression(relations))
    }
}

/// An architecture-qualified relation line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArchitecturedRelationLine(pub Vec<ArchitecturedRelationExpression>);

impl ArchitecturedRelationLine {
    pub fn parse(unparsed: &str) -> Result<Self, RelationError> {
        let trimmed = unparsed.trim();
        if trimmed.is_empty() {
            return Ok(ArchitecturedRelationLine::default());
        }
        let mut expressions = Vec::new();
        for part in trimmed.split(',') {
            expressions.push(ArchitecturedRelationExpression::parse(part)?);
        }
        Ok(ArchitecturedRelationLine(expressions))
    }
}

/// Drop relations not applying to the given architecture, producing a plain
/// relation line. Expressions where no alternative survives are dropped.
pub fn filter_architecture(line: &ArchitecturedRelationLine, architecture: &str) -> RelationLine {
    let mut result = Vec::new();
    for expression in &line.0 {
        let survivors: Vec<Relation> = expression
            .0
            .iter()
            .filter(|r| r.is_eligible_for(architecture))
            .map(|r| r.relation.clone())
            .collect();
        if !survivors.is_empty() {
            result.push(RelationExpression(survivors));
        }
    }
    RelationLine(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unversioned() {
        let relation = Relation::parse("mail-transport-agent").unwrap();
        assert_eq!(relation.package_name, "mail-transport-agent");
        assert!(relation.restriction.is_none());
        assert!(relation.is_satisfied_by("0.1"));
    }

    #[test]
    fn test_parse_versioned() {
        let relation = Relation::parse("libc6 (>= 2.31)").unwrap();
        assert_eq!(relation.package_name, "libc6");
        assert_eq!(
            relation.restriction,
            Some((RelationOp::MoreOrEqual, "2.31".to_string()))
        );
        assert!(relation.is_satisfied_by("2.31"));
        assert!(relation.is_satisfied_by("2.35-3"));
        assert!(!relation.is_satisfied_by("2.30"));
    }

    #[test]
    fn test_parse_strict_operators() {
        let relation = Relation::parse("u (<< 2)").unwrap();
        assert!(relation.is_satisfied_by("1.9"));
        assert!(!relation.is_satisfied_by("2"));
        assert!(!relation.is_satisfied_by("2.1"));

        let relation = Relation::parse("u (>> 2)").unwrap();
        assert!(!relation.is_satisfied_by("2"));
        assert!(relation.is_satisfied_by("2.0.1"));
    }

    #[test]
    fn test_deprecated_single_character_operators() {
        let relation = Relation::parse("a (> 1)").unwrap();
        assert_eq!(relation.restriction.as_ref().unwrap().0, RelationOp::MoreOrEqual);
        let relation = Relation::parse("a (< 1)").unwrap();
        assert_eq!(relation.restriction.as_ref().unwrap().0, RelationOp::LessOrEqual);
    }

    #[test]
    fn test_parse_failures() {
        assert!(Relation::parse("").is_err());
        assert!(Relation::parse("(>= 1)").is_err());
        assert!(Relation::parse("a (>= )").is_err());
        assert!(Relation::parse("a (>= 1").is_err());
        assert!(Relation::parse("a (~= 1)").is_err());
    }

    #[test]
    fn test_expression_and_line() {
        let line = RelationLine::parse("exim4 | postfix, libc6 (>= 2.31)").unwrap();
        assert_eq!(line.0.len(), 2);
        assert_eq!(line.0[0].0.len(), 2);
        assert_eq!(line.to_string(), "exim4 | postfix, libc6 (>= 2.31)");
    }

    #[test]
    fn test_hash_string_is_stable() {
        let a = RelationExpression::parse("a (>= 1) | b").unwrap();
        let b = RelationExpression::parse("a (>=  1)  |  b").unwrap();
        assert_eq!(a.hash_string(), b.hash_string());

        let c = RelationExpression::parse("b | a (>= 1)").unwrap();
        assert_ne!(a.hash_string(), c.hash_string());
    }

    #[test]
    fn test_architecture_filters() {
        let relation = ArchitecturedRelation::parse("gcc-multilib [amd64 i386]").unwrap();
        assert!(relation.is_eligible_for("amd64"));
        assert!(!relation.is_eligible_for("armel"));

        let negated = ArchitecturedRelation::parse("libjit (>= 1) [!armel !mips]").unwrap();
        assert!(negated.is_eligible_for("amd64"));
        assert!(!negated.is_eligible_for("armel"));

        let wildcard = ArchitecturedRelation::parse("seccomp [linux-any]").unwrap();
        assert!(wildcard.is_eligible_for("amd64"));
    }

    #[test]
    fn test_filter_architecture() {
        let line = ArchitecturedRelationLine::parse("a [amd64] | b [armel], c").unwrap();
        let filtered = filter_architecture(&line, "armel");
        assert_eq!(filtered.to_string(), "b, c");
    }
}
