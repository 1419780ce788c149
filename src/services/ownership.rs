//! File Ownership Engine
//!
//! Conservative pattern-overlap decisions for declared file regions.
//! Patterns are treated as directory-prefix globs: everything up to the
//! first `*` is the normalized prefix, and two patterns overlap when one
//! prefix is a prefix of the other. False positives are surfaced as
//! warnings; false negatives would be silent conflicts.

use crate::models::task::{FileOwnership, OwnershipType};

/// Patterns held by another task, as input to conflict checks
#[derive(Debug, Clone)]
pub struct OwnedPatterns {
    pub task_id: String,
    pub task_title: String,
    pub patterns: Vec<FileOwnership>,
}

/// A pattern pair flagged by `find_pattern_conflicts`
#[derive(Debug, Clone)]
pub struct PatternConflict {
    /// The other task's id
    pub task_id: String,
    /// The other task's title
    pub task_title: String,
    /// The other task's pattern
    pub pattern: String,
    /// The other task's ownership strength
    pub ownership: OwnershipType,
}

/// Normalized prefix of a pattern: everything before the first `*`.
///
/// `src/db/**` and `src/db/*` both normalize to `src/db/`; a bare `**`
/// normalizes to the empty prefix, which matches everything.
pub fn normalized_prefix(pattern: &str) -> &str {
    match pattern.find('*') {
        Some(index) => &pattern[..index],
        None => pattern,
    }
}

/// Whether two patterns overlap. Symmetric and reflexive.
pub fn patterns_overlap(a: &str, b: &str) -> bool {
    let pa = normalized_prefix(a);
    let pb = normalized_prefix(b);
    pa.starts_with(pb) || pb.starts_with(pa)
}

/// Whether a file path falls under a pattern: it begins with the normalized
/// prefix or equals the pattern exactly.
pub fn file_matches(file: &str, pattern: &str) -> bool {
    file == pattern || file.starts_with(normalized_prefix(pattern))
}

/// Pattern pairs that collide between one task's claims and other tasks'.
///
/// A pair conflicts when the patterns overlap and at least one side is
/// exclusive; two shared patterns never conflict.
pub fn find_pattern_conflicts(
    mine: &[FileOwnership],
    others: &[OwnedPatterns],
) -> Vec<PatternConflict> {
    let mut conflicts = Vec::new();
    for my in mine {
        for other in others {
            for theirs in &other.patterns {
                let either_exclusive = my.ownership == OwnershipType::Exclusive
                    || theirs.ownership == OwnershipType::Exclusive;
                if either_exclusive && patterns_overlap(&my.file_pattern, &theirs.file_pattern) {
                    conflicts.push(PatternConflict {
                        task_id: other.task_id.clone(),
                        task_title: other.task_title.clone(),
                        pattern: theirs.file_pattern.clone(),
                        ownership: theirs.ownership,
                    });
                }
            }
        }
    }
    conflicts
}

/// Human-readable warnings for changed files that fall under other tasks'
/// exclusive patterns. Shared patterns never warn.
pub fn check_file_conflicts(changed_files: &[String], others: &[OwnedPatterns]) -> Vec<String> {
    let mut warnings = Vec::new();
    for file in changed_files {
        for other in others {
            for theirs in &other.patterns {
                if theirs.ownership == OwnershipType::Exclusive
                    && file_matches(file, &theirs.file_pattern)
                {
                    warnings.push(format!(
                        "File '{}' matches exclusive pattern '{}' owned by task '{}'",
                        file, theirs.file_pattern, other.task_title
                    ));
                }
            }
        }
    }
    warnings
}
