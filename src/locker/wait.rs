// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Park/wake primitive.
//!
//! Waiters record the queue generation before evaluating their predicate and
//! park only while the generation is unchanged. Every state change that may
//! unblock someone bumps the generation and wakes all waiters, so a change
//! between the predicate check and parking is never lost.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use super::interrupt;

/// Why a parked thread woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The queue generation moved; re-evaluate the predicate.
    Changed,
    /// The deadline passed with no change.
    TimedOut,
    /// The thread was interrupted.
    Interrupted,
}

/// Wait queue with wake-all semantics.
#[derive(Debug, Default)]
pub struct WaitQueue {
    generation: Mutex<u64>,
    condvar: Condvar,
}

impl WaitQueue {
    /// Creates an empty wait queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current generation.
    #[inline]
    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// Advances the generation and wakes every parked thread.
    pub fn wake_all(&self) {
        let mut generation = self.generation.lock();
        *generation = generation.wrapping_add(1);
        self.condvar.notify_all();
    }

    /// Wakes parked threads without advancing the generation.
    ///
    /// Used by interruption so woken waiters re-check their interrupt flag.
    pub(crate) fn nudge(&self) {
        let _generation = self.generation.lock();
        self.condvar.notify_all();
    }

    /// Parks the calling thread until the generation differs from `observed`.
    ///
    /// With `interruptible` set, an interrupt of the calling thread also ends
    /// the wait. The interrupt flag is left for the caller to clear.
    pub fn park(
        self: &Arc<Self>,
        observed: u64,
        deadline: Option<Instant>,
        interruptible: bool,
    ) -> Wake {
        let _registration = interruptible.then(|| interrupt::register_park(Arc::clone(self)));

        let mut generation = self.generation.lock();
        loop {
            if *generation != observed {
                return Wake::Changed;
            }
            if interruptible && interrupt::is_interrupted() {
                return Wake::Interrupted;
            }
            match deadline {
                Some(deadline) => {
                    if self.condvar.wait_until(&mut generation, deadline).timed_out() {
                        return if *generation != observed {
                            Wake::Changed
                        } else {
                            Wake::TimedOut
                        };
                    }
                }
                None => self.condvar.wait(&mut generation),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_park_returns_when_generation_moved() {
        let queue = Arc::new(WaitQueue::new());
        let observed = queue.generation();
        queue.wake_all();
        assert_eq!(queue.park(observed, None, false), Wake::Changed);
    }

    #[test]
    fn test_park_times_out() {
        let queue = Arc::new(WaitQueue::new());
        let observed = queue.generation();
        let deadline = Instant::now() + Duration::from_millis(20);
        assert_eq!(queue.park(observed, Some(deadline), false), Wake::TimedOut);
    }

    #[test]
    fn test_wake_all_from_other_thread() {
        let queue = Arc::new(WaitQueue::new());
        let observed = queue.generation();

        let waker = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.wake_all();
            })
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        assert_eq!(queue.park(observed, Some(deadline), false), Wake::Changed);
        waker.join().unwrap();
    }
}
