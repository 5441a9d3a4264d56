// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Lock trait.

use std::time::Duration;

use super::error::LockError;

/// Standard mutual-exclusion contract.
///
/// Every successful acquisition must be paired with one [`Lock::unlock`] on
/// the same thread.
pub trait Lock {
    /// Wait condition produced by [`Lock::new_condition`].
    type Condition;

    /// Acquires the lock, blocking until it is available.
    fn lock(&self);

    /// Acquires the lock, blocking until it is available or the thread is
    /// interrupted.
    ///
    /// # Returns
    /// - `Ok(())` if the lock was acquired
    /// - `Err(LockError::Interrupted)` if the thread was interrupted first
    fn lock_interruptibly(&self) -> Result<(), LockError>;

    /// Acquires the lock only if it is free right now.
    fn try_lock(&self) -> bool;

    /// Acquires the lock, waiting at most `timeout`.
    ///
    /// Returns `Ok(false)` if the timeout elapsed first.
    fn try_lock_for(&self, timeout: Duration) -> Result<bool, LockError>;

    /// Releases one level of the lock.
    ///
    /// Fails with an ownership violation if the calling thread does not hold it.
    fn unlock(&self) -> Result<(), LockError>;

    /// Creates a wait condition bound to this lock.
    fn new_condition(&self) -> Result<Self::Condition, LockError>;
}
