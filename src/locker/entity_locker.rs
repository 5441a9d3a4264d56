// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Entity locker facade.

use std::sync::Arc;

use super::config::LockerConfig;
use super::error::LockError;
use super::handle::{EntityLock, EntityLockGuard};
use super::lock::Lock;
use super::sync::EntitySync;
use super::table::EntityId;

/// Entry point for per-entity locking.
///
/// Cloning is cheap; clones share the same lock table.
pub struct EntityLocker<Id> {
    sync: Arc<EntitySync<Id>>,
    config: LockerConfig,
}

impl<Id: EntityId> EntityLocker<Id> {
    /// Creates a locker with the default configuration.
    pub fn new() -> Self {
        let config = LockerConfig::default();
        Self {
            sync: Arc::new(EntitySync::new(&config)),
            config,
        }
    }

    /// Creates a locker with the given configuration.
    pub fn with_config(config: LockerConfig) -> Result<Self, LockError> {
        config.validate()?;
        Ok(Self {
            sync: Arc::new(EntitySync::new(&config)),
            config,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &LockerConfig {
        &self.config
    }

    /// Returns the underlying synchronizer.
    pub fn sync(&self) -> &Arc<EntitySync<Id>> {
        &self.sync
    }

    /// Returns a lock handle for `id`; `None` means the global lock.
    pub fn lock(&self, id: impl Into<Option<Id>>) -> EntityLock<Id> {
        EntityLock::new(id.into(), Arc::clone(&self.sync))
    }

    /// Returns a handle for the global lock.
    pub fn global(&self) -> EntityLock<Id> {
        self.lock(None)
    }

    /// Runs `action` while holding the lock for `id`.
    ///
    /// The lock is released when `action` returns or panics.
    pub fn exclusive<T, F>(&self, id: impl Into<Option<Id>>, action: F) -> T
    where
        F: FnOnce() -> T,
    {
        let lock = self.lock(id);
        let _guard = lock.guard();
        action()
    }

    /// Runs `action` if the lock for `id` is free right now.
    pub fn try_exclusive<T, F>(&self, id: impl Into<Option<Id>>, action: F) -> Option<T>
    where
        F: FnOnce() -> T,
    {
        let lock = self.lock(id);
        if !lock.try_lock() {
            return None;
        }
        let _guard = EntityLockGuard::adopt(&lock);
        Some(action())
    }

    /// Runs `action` while holding the lock for `id`, waiting interruptibly.
    ///
    /// Waiting does not give back other held locks, so circular waits are
    /// only broken by interrupting one of the threads.
    pub fn exclusive_interruptibly<T, F>(
        &self,
        id: impl Into<Option<Id>>,
        action: F,
    ) -> Result<T, LockError>
    where
        F: FnOnce() -> T,
    {
        let lock = self.lock(id);
        lock.lock_interruptibly()?;
        let _guard = EntityLockGuard::adopt(&lock);
        Ok(action())
    }
}

impl<Id: EntityId> Default for EntityLocker<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id> Clone for EntityLocker<Id> {
    fn clone(&self) -> Self {
        Self {
            sync: Arc::clone(&self.sync),
            config: self.config.clone(),
        }
    }
}

impl<Id> std::fmt::Debug for EntityLocker<Id> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityLocker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Creates a locker that escalates to the global lock once a thread holds
/// `escalation_threshold` distinct entities.
pub fn create_locker<Id: EntityId>(
    escalation_threshold: usize,
) -> Result<EntityLocker<Id>, LockError> {
    EntityLocker::with_config(
        LockerConfig::default().with_escalation_threshold(escalation_threshold),
    )
}
