// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Entity synchronizer.
//!
//! Arbitrates between per-thread requests and the shared [`LockTable`]:
//!
//! - **Shared mode** locks one entity id. Distinct ids never block each other.
//! - **Exclusive mode** is the global lock. It waits until no other thread holds
//!   a shared lock and then excludes every shared and exclusive request.
//!
//! # Deadlock avoidance
//!
//! When a shared request finds its id owned by another thread and the caller
//! asked for [`SyncMode::AvoidDeadlock`], the thread gives back every id it
//! holds in the same commit and parks. On each wake-up it must regain all of
//! them plus the requested id in a single commit. A thread waiting this way
//! holds nothing, so no circular wait can form through it.
//!
//! With [`SyncMode::IgnoreDeadlock`] the thread parks while keeping what it
//! holds. Such waits can deadlock and are only ended by interruption or timeout.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::config::LockerConfig;
use super::error::LockError;
use super::interrupt;
use super::table::{EntityId, LockState, LockTable, Proposal};
use super::thread_state::{self, SharedThreadState};
use super::wait::{Wake, WaitQueue};

/// How a contended shared request behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Give back every held id before parking.
    AvoidDeadlock,
    /// Park while keeping held ids.
    IgnoreDeadlock,
}

/// Outcome of a single acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// The lock was acquired.
    Acquired,
    /// The caller must park and retry after the table changes.
    Park,
}

/// Action run once the proposed table version is committed.
enum Deferred {
    Record(Arc<LockState>),
    Reenter(Arc<LockState>),
    GiveBack,
    Wait,
}

/// Lock synchronizer shared by every handle of one locker.
pub struct EntitySync<Id> {
    registry_key: u64,
    table: LockTable<Id>,
    queue: Arc<WaitQueue>,
    escalation_threshold: usize,
}

impl<Id: EntityId> EntitySync<Id> {
    /// Creates a synchronizer with the given configuration.
    pub fn new(config: &LockerConfig) -> Self {
        Self {
            registry_key: thread_state::next_registry_key(),
            table: LockTable::new(),
            queue: Arc::new(WaitQueue::new()),
            escalation_threshold: config.escalation_threshold,
        }
    }

    fn state(&self) -> SharedThreadState<Id> {
        thread_state::thread_state(self.registry_key)
    }

    /// Returns the id staged for the calling thread's next shared operation.
    pub fn staged_id(&self) -> Option<Id> {
        self.state().borrow().id.clone()
    }

    /// Stages the id used by the calling thread's next shared operation.
    ///
    /// `None` routes shared operations to the global lock.
    pub fn set_staged_id(&self, id: Option<Id>) {
        self.state().borrow_mut().id = id;
    }

    /// Returns the thread owning `id`, if it is locked.
    pub fn holder(&self, id: &Id) -> Option<thread::ThreadId> {
        self.table.load().get(id).map(|state| state.owner())
    }

    /// Returns true if `id` is locked by any thread.
    pub fn is_held(&self, id: &Id) -> bool {
        self.table.load().get(id).is_some()
    }

    /// Number of distinct ids the calling thread holds.
    pub fn held_count(&self) -> usize {
        self.state().borrow().acquired.len()
    }

    /// Returns true if the calling thread holds the global lock.
    pub fn is_held_exclusively(&self) -> bool {
        self.table
            .load()
            .global()
            .is_some_and(|state| state.is_owned_by_current())
    }

    /// Returns true if the calling thread holds enough ids that its next
    /// request should take the global lock instead.
    pub fn should_escalate_to_global(&self) -> bool {
        self.held_count() >= self.escalation_threshold
    }

    /// Single non-blocking attempt to lock the staged id.
    pub fn try_acquire_shared(&self, mode: SyncMode) -> Attempt {
        let state = self.state();
        let Some(id) = state.borrow().id.clone() else {
            return self.try_acquire_global();
        };
        let me = thread::current().id();

        loop {
            let present = self.table.load();
            if present.global().is_some_and(|global| global.owner() != me) {
                return Attempt::Park;
            }

            let mut proposed = (*present).clone();
            let sleeping = state.borrow().sleeping;
            if sleeping {
                for (held, record) in &state.borrow().acquired {
                    if proposed
                        .insert_if_absent(held.clone(), Arc::clone(record))
                        .is_some()
                    {
                        // something we gave back is still taken
                        return Attempt::Park;
                    }
                }
            }

            let fresh = Arc::new(LockState::new());
            let present_state = proposed.insert_if_absent(id.clone(), Arc::clone(&fresh));
            let (deferred, proposal) = match present_state {
                None => (Deferred::Record(fresh), Proposal::Replace(proposed)),
                Some(existing) if existing.owner() == me => {
                    let proposal = if sleeping {
                        Proposal::Replace(proposed)
                    } else {
                        Proposal::Unchanged
                    };
                    (Deferred::Reenter(existing), proposal)
                }
                // Already given back; dropping the re-inserts keeps it that way.
                Some(_) if sleeping => (Deferred::Wait, Proposal::Unchanged),
                Some(_) => match mode {
                    SyncMode::AvoidDeadlock => {
                        for held in state.borrow().acquired.keys() {
                            proposed.remove(held);
                        }
                        (Deferred::GiveBack, Proposal::Replace(proposed))
                    }
                    SyncMode::IgnoreDeadlock => (Deferred::Wait, Proposal::Unchanged),
                },
            };

            if !self.table.commit(&present, proposal) {
                continue;
            }

            let mut state = state.borrow_mut();
            return match deferred {
                Deferred::Record(record) => {
                    if state.sleeping {
                        debug!(
                            entity = ?id,
                            regained = state.acquired.len(),
                            "regained held entities"
                        );
                    }
                    state.acquired.insert(id, record);
                    state.sleeping = false;
                    Attempt::Acquired
                }
                Deferred::Reenter(record) => {
                    record.increment();
                    state.sleeping = false;
                    Attempt::Acquired
                }
                Deferred::GiveBack => {
                    let given_back = state.acquired.len();
                    debug!(entity = ?id, given_back, "entity contended, giving back held entities");
                    state.sleeping = true;
                    drop(state);
                    if given_back > 0 {
                        // Wake threads waiting on what we gave back.
                        let _ = self.release_shared(SyncMode::AvoidDeadlock);
                    }
                    Attempt::Park
                }
                Deferred::Wait => Attempt::Park,
            };
        }
    }

    /// Single release step for the staged id.
    ///
    /// Returns `Ok(false)` if the id is not locked. In
    /// [`SyncMode::AvoidDeadlock`] this is a no-op: the give-back commit
    /// already removed the ids.
    pub fn try_release_shared(&self, mode: SyncMode) -> Result<bool, LockError> {
        if mode == SyncMode::AvoidDeadlock {
            return Ok(true);
        }
        let state = self.state();
        let Some(id) = state.borrow().id.clone() else {
            return self.try_release_global().map(|_| true);
        };

        loop {
            let present = self.table.load();
            let Some(record) = present.get(&id) else {
                return Ok(false);
            };
            if !record.is_owned_by_current() {
                warn!(entity = ?id, owner = ?record.owner(), "unlock by non-owner");
                return Err(LockError::NotOwner);
            }
            if record.count() > 1 {
                record.decrement();
                return Ok(true);
            }

            let mut proposed = (*present).clone();
            proposed.remove(&id);
            if self.table.commit(&present, Proposal::Replace(proposed)) {
                state.borrow_mut().acquired.remove(&id);
                return Ok(true);
            }
        }
    }

    /// Locks the staged id, parking until it is available.
    pub fn acquire_shared(&self, mode: SyncMode) {
        // Uninterruptible without a deadline, so this never fails.
        let _ = self.park_until(|| self.try_acquire_shared(mode), None, false);
    }

    /// Locks the staged id, failing if the thread is interrupted first.
    pub fn acquire_shared_interruptibly(&self, mode: SyncMode) -> Result<(), LockError> {
        self.park_until(|| self.try_acquire_shared(mode), None, true)
            .map(|_| ())
    }

    /// Locks the staged id, giving up after `timeout`.
    pub fn try_acquire_shared_for(
        &self,
        mode: SyncMode,
        timeout: Duration,
    ) -> Result<bool, LockError> {
        let deadline = Instant::now() + timeout;
        self.park_until(|| self.try_acquire_shared(mode), Some(deadline), true)
    }

    /// Releases the staged id and wakes waiters.
    pub fn release_shared(&self, mode: SyncMode) -> Result<(), LockError> {
        if self.try_release_shared(mode)? {
            self.queue.wake_all();
            Ok(())
        } else {
            warn!(entity = ?self.staged_id(), "unlock of entity that is not locked");
            Err(LockError::NotHeld)
        }
    }

    /// Single non-blocking attempt to take the global lock.
    pub fn try_acquire_global(&self) -> Attempt {
        let me = thread::current().id();
        loop {
            let present = self.table.load();
            if let Some(global) = present.global() {
                if global.owner() != me {
                    return Attempt::Park;
                }
                global.increment();
                return Attempt::Acquired;
            }
            if present.has_foreign_entries(me) {
                return Attempt::Park;
            }

            let mut proposed = (*present).clone();
            proposed.set_global(Some(Arc::new(LockState::new())));
            if self.table.commit(&present, Proposal::Replace(proposed)) {
                debug!(own_entities = present.len(), "acquired global lock");
                return Attempt::Acquired;
            }
        }
    }

    /// Releases one level of the global lock.
    ///
    /// Returns true if the lock became free.
    fn try_release_global(&self) -> Result<bool, LockError> {
        loop {
            let present = self.table.load();
            let Some(global) = present.global() else {
                return Err(LockError::NotHeld);
            };
            if !global.is_owned_by_current() {
                warn!(owner = ?global.owner(), "global unlock by non-owner");
                return Err(LockError::NotOwner);
            }
            if global.count() > 1 {
                global.decrement();
                return Ok(false);
            }

            let mut proposed = (*present).clone();
            proposed.set_global(None);
            if self.table.commit(&present, Proposal::Replace(proposed)) {
                debug!("released global lock");
                return Ok(true);
            }
        }
    }

    /// Takes the global lock, parking until it is available.
    ///
    /// The mode is accepted for symmetry with the shared path; the global lock
    /// never gives anything back.
    pub fn acquire(&self, mode: SyncMode) {
        trace!(?mode, "requesting global lock");
        let _ = self.park_until(|| self.try_acquire_global(), None, false);
    }

    /// Takes the global lock, failing if the thread is interrupted first.
    pub fn acquire_interruptibly(&self, mode: SyncMode) -> Result<(), LockError> {
        trace!(?mode, "requesting global lock");
        self.park_until(|| self.try_acquire_global(), None, true)
            .map(|_| ())
    }

    /// Takes the global lock, giving up after `timeout`.
    pub fn try_acquire_for(&self, mode: SyncMode, timeout: Duration) -> Result<bool, LockError> {
        trace!(?mode, ?timeout, "requesting global lock");
        let deadline = Instant::now() + timeout;
        self.park_until(|| self.try_acquire_global(), Some(deadline), true)
    }

    /// Releases one level of the global lock and wakes waiters when it is freed.
    pub fn release(&self, _mode: SyncMode) -> Result<(), LockError> {
        if self.try_release_global()? {
            self.queue.wake_all();
        }
        Ok(())
    }

    /// Frees the global lock regardless of its reentrant count.
    ///
    /// Returns the count to restore with [`EntitySync::reacquire`].
    pub(crate) fn release_fully(&self) -> Result<usize, LockError> {
        let held = match self.table.load().global() {
            Some(global) if global.is_owned_by_current() => global.count(),
            Some(_) => return Err(LockError::NotOwner),
            None => return Err(LockError::NotHeld),
        };
        if let Some(global) = self.table.load().global() {
            global.set_count(1);
        }
        self.release(SyncMode::IgnoreDeadlock)?;
        Ok(held)
    }

    /// Takes the global lock again with a saved reentrant count.
    pub(crate) fn reacquire(&self, count: usize) {
        self.acquire(SyncMode::IgnoreDeadlock);
        if let Some(global) = self.table.load().global() {
            global.set_count(count);
        }
    }

    /// Runs `attempt` until it acquires, parking between tries.
    ///
    /// Returns `Ok(false)` on timeout.
    fn park_until<F>(
        &self,
        mut attempt: F,
        deadline: Option<Instant>,
        interruptible: bool,
    ) -> Result<bool, LockError>
    where
        F: FnMut() -> Attempt,
    {
        if interruptible && interrupt::take_interrupted() {
            return Err(LockError::Interrupted);
        }
        loop {
            let observed = self.queue.generation();
            if attempt() == Attempt::Acquired {
                return Ok(true);
            }
            match self.queue.park(observed, deadline, interruptible) {
                Wake::Changed => continue,
                Wake::TimedOut => {
                    self.abandon();
                    return Ok(false);
                }
                Wake::Interrupted => {
                    interrupt::take_interrupted();
                    self.abandon();
                    return Err(LockError::Interrupted);
                }
            }
        }
    }

    /// Cleans up after a wait that gave up.
    ///
    /// A thread that gave its ids back and then stops waiting is left holding
    /// none of them, never a subset.
    fn abandon(&self) {
        let state = self.state();
        let mut state = state.borrow_mut();
        if state.sleeping {
            warn!(
                dropped = state.acquired.len(),
                "wait abandoned after giving back held entities"
            );
            state.acquired.clear();
            state.sleeping = false;
        }
    }

    /// Forgets the calling thread's bookkeeping if it holds nothing.
    pub(crate) fn discard_thread_state_if_idle(&self) {
        thread_state::discard_if_idle::<Id>(self.registry_key);
    }
}

impl<Id> std::fmt::Debug for EntitySync<Id> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitySync")
            .field("registry_key", &self.registry_key)
            .field("escalation_threshold", &self.escalation_threshold)
            .finish_non_exhaustive()
    }
}
