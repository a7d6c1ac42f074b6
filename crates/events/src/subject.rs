//! Bus subjects for catalog mutations.
//!
//! Subjects are dot-separated tokens (`good.created`). Patterns may use `*` to
//! match exactly one token and a trailing `>` to match one or more tokens.

use serde::{Deserialize, Serialize};

/// Pattern the audit consumer subscribes to.
pub const SUBJECT_WILDCARD: &str = "good.*";

/// The kind of canonical mutation an audit event describes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Created,
    Updated,
    Deleted,
    Reprioritized,
}

impl MutationKind {
    pub const ALL: [MutationKind; 4] = [
        MutationKind::Created,
        MutationKind::Updated,
        MutationKind::Deleted,
        MutationKind::Reprioritized,
    ];

    pub fn subject(self) -> &'static str {
        match self {
            MutationKind::Created => "good.created",
            MutationKind::Updated => "good.updated",
            MutationKind::Deleted => "good.deleted",
            MutationKind::Reprioritized => "good.reprioritized",
        }
    }

    pub fn from_subject(subject: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.subject() == subject)
    }
}

impl core::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.subject())
    }
}

/// Returns true when `subject` is matched by `pattern`.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return pattern_tokens.next().is_none(),
            (Some("*"), Some(s)) if !s.is_empty() => continue,
            (Some(p), Some(s)) if p == s && !s.is_empty() => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
