// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Per-entity locking with deadlock avoidance.
//!
//! This module provides mutual exclusion over entities identified by arbitrary
//! keys, with:
//! - Full parallelism between operations on different entities
//! - Reentrant per-entity locks owned by a single thread
//! - A global lock excluding every per-entity holder
//! - Deadlock avoidance by giving back held locks before waiting
//! - Automatic escalation to the global lock for threads holding many entities
//!
//! # Key Concepts
//!
//! ## Lock Table
//!
//! All lock state lives in one immutable map, replaced as a whole by
//! compare-and-swap. A single commit can therefore release several entities
//! and acquire another, which the deadlock-avoidance step relies on.
//!
//! ## Deadlock Avoidance
//!
//! [`Lock::lock`] never waits while holding entity locks:
//! - If the requested entity is free (or already ours), take it
//! - Otherwise give back every entity this thread holds and park
//! - On wake-up, regain all of them plus the requested one in one commit
//!
//! [`Lock::lock_interruptibly`] and [`Lock::try_lock_for`] wait while keeping
//! their locks. They can deadlock; interruption or the timeout ends the wait.
//!
//! # Example
//!
//! ```
//! use entity_lock::locker::{EntityLocker, Lock};
//!
//! let locker: EntityLocker<u64> = EntityLocker::new();
//!
//! // Scoped: released on return or panic.
//! let balance = locker.exclusive(42, || 100);
//! assert_eq!(balance, 100);
//!
//! // Manual.
//! let lock = locker.lock(7);
//! lock.lock();
//! lock.unlock().unwrap();
//!
//! // Global critical section.
//! locker.exclusive(None, || println!("nothing else is locked"));
//! ```

mod condition;
mod config;
mod entity_locker;
mod error;
mod handle;
mod interrupt;
mod lock;
mod sync;
mod table;
mod thread_state;
mod wait;

pub use condition::GlobalCondition;
pub use config::{LockerConfig, DEFAULT_ESCALATION_THRESHOLD};
pub use entity_locker::{create_locker, EntityLocker};
pub use error::LockError;
pub use handle::{EntityLock, EntityLockGuard};
pub use interrupt::{take_interrupted, Interrupter};
pub use lock::Lock;
pub use sync::{Attempt, EntitySync, SyncMode};
pub use table::{EntityId, LockState, LockTable, Snapshot};
pub use wait::{Wake, WaitQueue};
