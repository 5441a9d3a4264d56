// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Configuration for the entity locker.

use super::error::LockError;

/// Default number of distinct entities a thread may hold before its next
/// acquisition escalates to the global lock.
pub const DEFAULT_ESCALATION_THRESHOLD: usize = 8;

/// Configuration for EntityLocker initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockerConfig {
    /// Distinct entities held by one thread that trigger escalation.
    pub escalation_threshold: usize,
}

impl Default for LockerConfig {
    fn default() -> Self {
        Self {
            escalation_threshold: DEFAULT_ESCALATION_THRESHOLD,
        }
    }
}

impl LockerConfig {
    /// Sets the escalation threshold.
    pub fn with_escalation_threshold(mut self, threshold: usize) -> Self {
        self.escalation_threshold = threshold;
        self
    }

    /// Checks that the configuration is usable.
    pub fn validate(&self) -> Result<(), LockError> {
        if self.escalation_threshold == 0 {
            return Err(LockError::InvalidConfig(
                "escalation_threshold must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_threshold() {
        let config = LockerConfig::default();
        assert_eq!(config.escalation_threshold, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let config = LockerConfig::default().with_escalation_threshold(0);
        assert!(matches!(config.validate(), Err(LockError::InvalidConfig(_))));
    }
}
