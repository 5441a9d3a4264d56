// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Lock table: the process-wide map from entity id to lock state.
//!
//! The table is an immutable [`Snapshot`] behind an [`ArcSwap`]. Writers clone
//! the current snapshot, edit the copy and publish it with compare-and-swap, so
//! a single commit can release several ids and take a new one at once.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use arc_swap::ArcSwap;

/// Key type usable as an entity id.
pub trait EntityId: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T> EntityId for T where T: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// Ownership record of a held lock.
///
/// The owner never changes while the record exists. The reentrant count is
/// only modified by the owning thread.
#[derive(Debug)]
pub struct LockState {
    owner: ThreadId,
    count: AtomicUsize,
}

impl LockState {
    /// Creates a record owned by the calling thread with a count of one.
    pub fn new() -> Self {
        Self {
            owner: thread::current().id(),
            count: AtomicUsize::new(1),
        }
    }

    /// Returns the owning thread.
    #[inline]
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Returns true if the calling thread owns this record.
    #[inline]
    pub fn is_owned_by_current(&self) -> bool {
        self.owner == thread::current().id()
    }

    /// Returns the reentrant count.
    #[inline]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub(crate) fn increment(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn decrement(&self) {
        self.count.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn set_count(&self, count: usize) {
        self.count.store(count, Ordering::Relaxed);
    }
}

impl Default for LockState {
    fn default() -> Self {
        Self::new()
    }
}

/// One immutable version of the lock table.
#[derive(Debug, Clone)]
pub struct Snapshot<Id> {
    entries: HashMap<Id, Arc<LockState>>,
    global: Option<Arc<LockState>>,
}

impl<Id: EntityId> Snapshot<Id> {
    fn empty() -> Self {
        Self {
            entries: HashMap::new(),
            global: None,
        }
    }

    /// Returns the record for an id.
    pub fn get(&self, id: &Id) -> Option<&Arc<LockState>> {
        self.entries.get(id)
    }

    /// Returns the global lock record, if the global lock is held.
    pub fn global(&self) -> Option<&Arc<LockState>> {
        self.global.as_ref()
    }

    /// Number of per-entity records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no per-entity lock is held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if some per-entity lock is held by a thread other than `thread`.
    pub fn has_foreign_entries(&self, thread: ThreadId) -> bool {
        self.entries.values().any(|state| state.owner() != thread)
    }

    /// Inserts `state` unless the id is already present.
    ///
    /// Returns the present record when the insert did not happen.
    pub(crate) fn insert_if_absent(
        &mut self,
        id: Id,
        state: Arc<LockState>,
    ) -> Option<Arc<LockState>> {
        match self.entries.get(&id) {
            Some(present) => Some(Arc::clone(present)),
            None => {
                self.entries.insert(id, state);
                None
            }
        }
    }

    pub(crate) fn remove(&mut self, id: &Id) -> Option<Arc<LockState>> {
        self.entries.remove(id)
    }

    pub(crate) fn set_global(&mut self, state: Option<Arc<LockState>>) {
        self.global = state;
    }
}

/// Proposed next version of the table.
pub(crate) enum Proposal<Id> {
    /// Commit succeeds only if the table has not moved since the snapshot.
    Unchanged,
    /// Publish a new version.
    Replace(Snapshot<Id>),
}

/// Atomically swapped lock table.
pub struct LockTable<Id> {
    current: ArcSwap<Snapshot<Id>>,
}

impl<Id: EntityId> LockTable<Id> {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot::empty()),
        }
    }

    /// Returns the current version.
    #[inline]
    pub fn load(&self) -> Arc<Snapshot<Id>> {
        self.current.load_full()
    }

    /// Publishes `proposal` if the table is still at version `expected`.
    ///
    /// Returns false if another thread committed first.
    pub(crate) fn commit(&self, expected: &Arc<Snapshot<Id>>, proposal: Proposal<Id>) -> bool {
        match proposal {
            Proposal::Unchanged => Arc::ptr_eq(&self.current.load(), expected),
            Proposal::Replace(next) => {
                let previous = self.current.compare_and_swap(expected, Arc::new(next));
                Arc::ptr_eq(&previous, expected)
            }
        }
    }
}

impl<Id: EntityId> Default for LockTable<Id> {
    fn default() -> Self {
        Self::new()
    }
}
