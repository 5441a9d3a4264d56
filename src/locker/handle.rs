// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Per-entity lock handle.

use std::sync::Arc;
use std::time::Duration;

use tracing::{trace, warn};

use super::condition::GlobalCondition;
use super::error::LockError;
use super::lock::Lock;
use super::sync::{Attempt, EntitySync, SyncMode};
use super::table::EntityId;

/// Lock on one entity id, or on everything when the id is `None`.
///
/// Before each operation the handle decides whether the request is global:
/// a `None` id, a thread already holding the global lock, or a thread holding
/// at least the escalation threshold of distinct ids all take the global path.
pub struct EntityLock<Id> {
    id: Option<Id>,
    sync: Arc<EntitySync<Id>>,
}

impl<Id: EntityId> EntityLock<Id> {
    pub(crate) fn new(id: Option<Id>, sync: Arc<EntitySync<Id>>) -> Self {
        Self { id, sync }
    }

    /// Returns the entity id (`None` for the global lock).
    #[inline]
    pub fn id(&self) -> Option<&Id> {
        self.id.as_ref()
    }

    /// Returns true if the id is `None` or the calling thread holds the global lock.
    pub fn is_global(&self) -> bool {
        self.id.is_none() || self.sync.is_held_exclusively()
    }

    /// Returns true if the next acquisition from this thread takes the global lock.
    pub fn is_effectively_global(&self) -> bool {
        self.is_global() || self.sync.should_escalate_to_global()
    }

    /// Returns the id the next acquisition uses (`None` when global).
    pub fn effective_id(&self) -> Option<Id> {
        if self.is_effectively_global() {
            None
        } else {
            self.id.clone()
        }
    }

    /// Stages the effective id and returns true if the request is global.
    fn stage(&self) -> bool {
        let effective = self.effective_id();
        let global = effective.is_none();
        if global && self.id.is_some() && !self.is_global() {
            trace!(entity = ?self.id, "escalating to global lock");
        }
        self.sync.set_staged_id(effective);
        global
    }

    /// Acquires the lock and returns a guard that releases it on drop.
    pub fn guard(&self) -> EntityLockGuard<'_, Id> {
        self.lock();
        EntityLockGuard::adopt(self)
    }
}

impl<Id: EntityId> Lock for EntityLock<Id> {
    type Condition = GlobalCondition<Id>;

    fn lock(&self) {
        if self.stage() {
            self.sync.acquire(SyncMode::AvoidDeadlock);
        } else {
            self.sync.acquire_shared(SyncMode::AvoidDeadlock);
        }
    }

    fn lock_interruptibly(&self) -> Result<(), LockError> {
        let result = if self.stage() {
            self.sync.acquire_interruptibly(SyncMode::IgnoreDeadlock)
        } else {
            self.sync.acquire_shared_interruptibly(SyncMode::IgnoreDeadlock)
        };
        if result.is_err() {
            self.sync.discard_thread_state_if_idle();
        }
        result
    }

    fn try_lock(&self) -> bool {
        let attempt = if self.stage() {
            self.sync.try_acquire_global()
        } else {
            self.sync.try_acquire_shared(SyncMode::IgnoreDeadlock)
        };
        if attempt == Attempt::Park {
            self.sync.discard_thread_state_if_idle();
        }
        attempt == Attempt::Acquired
    }

    fn try_lock_for(&self, timeout: Duration) -> Result<bool, LockError> {
        let result = if self.stage() {
            self.sync.try_acquire_for(SyncMode::IgnoreDeadlock, timeout)
        } else {
            self.sync
                .try_acquire_shared_for(SyncMode::IgnoreDeadlock, timeout)
        };
        if !matches!(result, Ok(true)) {
            self.sync.discard_thread_state_if_idle();
        }
        result
    }

    fn unlock(&self) -> Result<(), LockError> {
        // Route by where the lock was taken, not by escalation.
        let result = if self.is_global() {
            self.sync.set_staged_id(None);
            self.sync.release(SyncMode::IgnoreDeadlock)
        } else {
            self.sync.set_staged_id(self.id.clone());
            self.sync.release_shared(SyncMode::IgnoreDeadlock)
        };
        self.sync.discard_thread_state_if_idle();
        result
    }

    fn new_condition(&self) -> Result<Self::Condition, LockError> {
        if self.id.is_some() {
            return Err(LockError::Unsupported(
                "wait conditions require the global lock",
            ));
        }
        Ok(GlobalCondition::new(Arc::clone(&self.sync)))
    }
}

impl<Id: EntityId> std::fmt::Debug for EntityLock<Id> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityLock").field("id", &self.id).finish()
    }
}

/// Releases an [`EntityLock`] when dropped.
pub struct EntityLockGuard<'a, Id: EntityId> {
    lock: &'a EntityLock<Id>,
}

impl<'a, Id: EntityId> EntityLockGuard<'a, Id> {
    /// Wraps a lock the calling thread already acquired.
    pub(crate) fn adopt(lock: &'a EntityLock<Id>) -> Self {
        Self { lock }
    }
}

impl<Id: EntityId> Drop for EntityLockGuard<'_, Id> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.unlock() {
            warn!(entity = ?self.lock.id, error = %e, "failed to release entity lock");
        }
    }
}
