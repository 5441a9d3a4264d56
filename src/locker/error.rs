// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Entity locker error types.

/// Errors that can occur in lock operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    #[error("interrupted while waiting for lock")]
    Interrupted,

    #[error("lock is held by another thread")]
    NotOwner,

    #[error("lock is not held")]
    NotHeld,

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LockError {
    /// Returns true if the error is a release by a thread that does not own the lock.
    ///
    /// These indicate a bug at the call site rather than a runtime condition.
    pub fn is_ownership_violation(&self) -> bool {
        matches!(self, LockError::NotOwner | LockError::NotHeld)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ownership_violation_kinds() {
        assert!(LockError::NotOwner.is_ownership_violation());
        assert!(LockError::NotHeld.is_ownership_violation());
        assert!(!LockError::Interrupted.is_ownership_violation());
        assert!(!LockError::Unsupported("x").is_ownership_violation());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            LockError::InvalidConfig("threshold".into()).to_string(),
            "invalid configuration: threshold"
        );
    }
}
