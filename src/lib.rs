// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! entity-lock: per-entity reentrant locking with deadlock avoidance
//!
//! This crate serializes work on the same entity while letting work on
//! different entities run in parallel, and provides a global critical section
//! that excludes all of it.

pub mod locker;

pub use locker::{
    create_locker, EntityId, EntityLock, EntityLockGuard, EntityLocker, GlobalCondition,
    Interrupter, Lock, LockError, LockerConfig, SyncMode,
};
