//! Version string validation and comparison

use std::cmp::Ordering;

use thiserror::Error;

/// Error type for version string validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("empty version string")]
    Empty,
    #[error("invalid character {character:?} in version string \"{version}\"")]
    InvalidCharacter { version: String, character: char },
    #[error("invalid epoch in version string \"{0}\"")]
    InvalidEpoch(String),
}

/// Check that a version string is well-formed.
///
/// Allowed characters are alphanumerics and `.`, `+`, `-`, `:`, `~`.
/// If an epoch is present (everything before the first `:`) it must be a
/// non-empty decimal number.
pub fn check_version_string(version: &str) -> Result<(), VersionError> {
    if version.is_empty() {
        return Err(VersionError::Empty);
    }
    for character in version.chars() {
        let ok = character.is_ascii_alphanumeric() || ".+-:~".contains(character);
        if !ok {
            return Err(VersionError::InvalidCharacter {
                version: version.to_string(),
                character,
            });
        }
    }
    if let Some(colon) = version.find(':') {
        let epoch = &version[..colon];
        if epoch.is_empty() || !epoch.bytes().all(|b| b.is_ascii_digit()) {
            return Err(VersionError::InvalidEpoch(version.to_string()));
        }
    }
    Ok(())
}

/// Split a version string into (epoch, upstream, revision).
///
/// The epoch defaults to 0, the revision to the empty string. The revision
/// separator is the last `-` so upstream versions may contain dashes.
fn split_version(version: &str) -> (u64, &str, &str) {
    let (epoch, rest) = match version.find(':') {
        Some(colon) => {
            let epoch = version[..colon].parse::<u64>().unwrap_or(0);
            (epoch, &version[colon + 1..])
        }
        None => (0, version),
    };
    match rest.rfind('-') {
        Some(dash) => (epoch, &rest[..dash], &rest[dash + 1..]),
        None => (epoch, rest, ""),
    }
}

/// Ordering weight of a single byte in the non-digit portion of a segment.
///
/// `~` sorts before everything including the end of the string, letters sort
/// before all other characters, the end of the string sorts before letters.
fn lexical_order(byte: Option<u8>) -> i32 {
    match byte {
        None => 0,
        Some(b'~') => -1,
        Some(b) if b.is_ascii_alphabetic() => i32::from(b),
        Some(b) => i32::from(b) + 256,
    }
}

/// Compare one upstream-version or revision fragment.
fn compare_fragment(left: &str, right: &str) -> Ordering {
    let left = left.as_bytes();
    let right = right.as_bytes();
    let mut i = 0;
    let mut j = 0;

    while i < left.len() || j < right.len() {
        // non-digit run
        loop {
            let a = left.get(i).copied().filter(|b| !b.is_ascii_digit());
            let b = right.get(j).copied().filter(|b| !b.is_ascii_digit());
            if a.is_none() && b.is_none() {
                break;
            }
            let ordering = lexical_order(a).cmp(&lexical_order(b));
            if ordering != Ordering::Equal {
                return ordering;
            }
            i += 1;
            j += 1;
        }

        // digit run, compared numerically with leading zeros ignored
        let digits_start_left = i;
        while i < left.len() && left[i].is_ascii_digit() {
            i += 1;
        }
        let digits_start_right = j;
        while j < right.len() && right[j].is_ascii_digit() {
            j += 1;
        }
        let mut a = &left[digits_start_left..i];
        let mut b = &right[digits_start_right..j];
        while let [b'0', rest @ ..] = a {
            a = rest;
        }
        while let [b'0', rest @ ..] = b {
            b = rest;
        }
        let ordering = a.len().cmp(&b.len()).then_with(|| a.cmp(b));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Compare two Debian version strings.
///
/// Implements the algorithm from Debian policy §5.6.12: the epochs are
/// compared numerically, then the upstream versions, then the revisions.
pub fn compare_version_strings(left: &str, right: &str) -> Ordering {
    let (left_epoch, left_upstream, left_revision) = split_version(left);
    let (right_epoch, right_upstream, right_revision) = split_version(right);

    left_epoch
        .cmp(&right_epoch)
        .then_with(|| compare_fragment(left_upstream, right_upstream))
        .then_with(|| compare_fragment(left_revision, right_revision))
}
