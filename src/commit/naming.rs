//! Branch naming for automatically created branches.
//!
//! Generated names look like `<base>-<label>-<month>.<day>-<hour>.<minute>.<second>-0`.
//! The timestamp only makes collisions unlikely; the trailing `-<N>` is what
//! actually deconflicts, by incrementing until a free name is found.

use chrono::{Datelike, Timelike};
use lazy_regex::regex_captures;
use thiserror::Error;

/// Upper bound on probes when walking a `-<N>` series.
pub const MAX_PROBES: usize = 100;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NamingError {
    #[error("Branch name '{0}' has no trailing -<number> to increment")]
    Exhausted(String),

    #[error("Invalid branch name '{name}': {reason}")]
    Invalid { name: String, reason: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchNamingPolicy {
    label: String,
}

impl BranchNamingPolicy {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    /// Timestamped suffix marking a branch as auto-created.
    pub fn suffix<T: Datelike + Timelike>(&self, now: &T) -> String {
        format!(
            "-{}-{}.{}-{}.{}.{}-0",
            self.label,
            now.month(),
            now.day(),
            now.hour(),
            now.minute(),
            now.second()
        )
    }

    /// First candidate name for a branch derived from `base`.
    pub fn candidate<T: Datelike + Timelike>(&self, base: &str, now: &T) -> String {
        format!("{base}{}", self.suffix(now))
    }
}

/// `<base>-<N>` becomes `<base>-<N+1>`.
///
/// A name without a trailing `-<N>` cannot be incremented and yields
/// [`NamingError::Exhausted`].
pub fn next_available(name: &str) -> Result<String, NamingError> {
    let Some((_, base, number)) = regex_captures!(r"^(.+-)(\d+)$", name) else {
        return Err(NamingError::Exhausted(name.to_string()));
    };
    let next = number
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_add(1))
        .ok_or_else(|| NamingError::Exhausted(name.to_string()))?;
    Ok(format!("{base}{next}"))
}

/// Whether `name` ends in `-<N>` and can therefore be incremented.
pub fn has_generation(name: &str) -> bool {
    regex_captures!(r"^(.+-)(\d+)$", name).is_some()
}

/// Like [`next_available`], but a bare name starts its series at `-1`.
///
/// Used on forks, where every upstream branch name is already taken by the
/// fork's mirror of it.
pub fn seed_or_next(name: &str) -> Result<String, NamingError> {
    if has_generation(name) {
        next_available(name)
    } else {
        Ok(format!("{name}-1"))
    }
}

/// Reject names git would refuse as a branch.
pub fn validate(name: &str) -> Result<(), NamingError> {
    let invalid = |reason| {
        Err(NamingError::Invalid {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return invalid("name is empty");
    }
    if name.starts_with('.') {
        return invalid("must not start with '.'");
    }
    if name.ends_with('/') || name.ends_with(".lock") {
        return invalid("must not end with '/' or '.lock'");
    }
    if name
        .chars()
        .any(|c| matches!(c, '~' | '^' | ':' | '\\') || c.is_whitespace())
    {
        return invalid("must not contain '~', '^', ':', '\\' or whitespace");
    }
    if name.contains("..") {
        return invalid("must not contain '..'");
    }
    Ok(())
}
