// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Wait conditions on the global lock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::trace;

use super::error::LockError;
use super::interrupt;
use super::sync::EntitySync;
use super::table::EntityId;
use super::wait::{Wake, WaitQueue};

/// Condition variable tied to the global lock of one locker.
///
/// Waiting releases the global lock completely and takes it back, with the
/// same reentrant count, before returning.
pub struct GlobalCondition<Id> {
    sync: Arc<EntitySync<Id>>,
    signals: Arc<WaitQueue>,
}

impl<Id: EntityId> GlobalCondition<Id> {
    pub(crate) fn new(sync: Arc<EntitySync<Id>>) -> Self {
        Self {
            sync,
            signals: Arc::new(WaitQueue::new()),
        }
    }

    /// Waits until signalled or interrupted.
    pub fn wait(&self) -> Result<(), LockError> {
        self.wait_until(None).map(|_| ())
    }

    /// Waits until signalled, interrupted or `timeout` elapses.
    ///
    /// Returns `Ok(false)` on timeout.
    pub fn wait_for(&self, timeout: Duration) -> Result<bool, LockError> {
        self.wait_until(Some(Instant::now() + timeout))
    }

    fn wait_until(&self, deadline: Option<Instant>) -> Result<bool, LockError> {
        if !self.sync.is_held_exclusively() {
            return Err(LockError::NotOwner);
        }
        if interrupt::take_interrupted() {
            return Err(LockError::Interrupted);
        }

        let observed = self.signals.generation();
        let saved = self.sync.release_fully()?;
        trace!(saved, "waiting on global condition");
        let wake = self.signals.park(observed, deadline, true);
        self.sync.reacquire(saved);

        match wake {
            Wake::Changed => Ok(true),
            Wake::TimedOut => Ok(false),
            Wake::Interrupted => {
                interrupt::take_interrupted();
                Err(LockError::Interrupted)
            }
        }
    }

    /// Wakes one waiter.
    ///
    /// The wait queue keeps no order, so every waiter is woken and re-checks
    /// its own predicate.
    pub fn signal(&self) -> Result<(), LockError> {
        self.signal_all()
    }

    /// Wakes every waiter.
    pub fn signal_all(&self) -> Result<(), LockError> {
        if !self.sync.is_held_exclusively() {
            return Err(LockError::NotOwner);
        }
        self.signals.wake_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locker::config::LockerConfig;
    use crate::locker::interrupt::Interrupter;
    use crate::locker::sync::SyncMode;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn new_sync() -> Arc<EntitySync<u32>> {
        Arc::new(EntitySync::new(&LockerConfig::default()))
    }

    #[test]
    fn test_wait_requires_global_lock() {
        let condition = GlobalCondition::new(new_sync());
        assert_eq!(condition.wait(), Err(LockError::NotOwner));
        assert_eq!(condition.signal_all(), Err(LockError::NotOwner));
    }

    #[test]
    fn test_wait_for_times_out_and_restores_count() {
        let sync = new_sync();
        let condition = GlobalCondition::new(Arc::clone(&sync));
        sync.acquire(SyncMode::AvoidDeadlock);
        sync.acquire(SyncMode::AvoidDeadlock);

        assert!(!condition.wait_for(Duration::from_millis(20)).unwrap());

        assert!(sync.is_held_exclusively());
        sync.release(SyncMode::IgnoreDeadlock).unwrap();
        assert!(sync.is_held_exclusively());
        sync.release(SyncMode::IgnoreDeadlock).unwrap();
        assert!(!sync.is_held_exclusively());
    }

    #[test]
    fn test_signal_wakes_waiter() {
        let sync = new_sync();
        let condition = Arc::new(GlobalCondition::new(Arc::clone(&sync)));
        let ready = Arc::new(AtomicBool::new(false));

        let waiter = {
            let sync = Arc::clone(&sync);
            let condition = Arc::clone(&condition);
            let ready = Arc::clone(&ready);
            thread::spawn(move || {
                sync.acquire(SyncMode::AvoidDeadlock);
                while !ready.load(Ordering::SeqCst) {
                    condition.wait_for(Duration::from_secs(5)).unwrap();
                }
                sync.release(SyncMode::IgnoreDeadlock).unwrap();
            })
        };

        thread::sleep(Duration::from_millis(20));
        sync.acquire(SyncMode::AvoidDeadlock);
        ready.store(true, Ordering::SeqCst);
        condition.signal_all().unwrap();
        sync.release(SyncMode::IgnoreDeadlock).unwrap();

        waiter.join().unwrap();
        assert!(!sync.is_held_exclusively());
    }

    #[test]
    fn test_interrupted_wait_reacquires() {
        let sync = new_sync();
        let condition = Arc::new(GlobalCondition::new(Arc::clone(&sync)));
        let (tx, rx) = std::sync::mpsc::channel();

        let waiter = {
            let sync = Arc::clone(&sync);
            let condition = Arc::clone(&condition);
            thread::spawn(move || {
                sync.acquire(SyncMode::AvoidDeadlock);
                tx.send(Interrupter::current()).unwrap();
                let result = condition.wait();
                let held = sync.is_held_exclusively();
                sync.release(SyncMode::IgnoreDeadlock).unwrap();
                (result, held)
            })
        };

        let interrupter = rx.recv().unwrap();
        thread::sleep(Duration::from_millis(20));
        interrupter.interrupt();

        let (result, held) = waiter.join().unwrap();
        assert_eq!(result, Err(LockError::Interrupted));
        assert!(held);
    }
}
