// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Thread interruption.
//!
//! Each thread has an interrupt flag. Another thread holding an [`Interrupter`]
//! can set it, which wakes the target if it is parked in an interruptible wait.
//! Interruptible operations fail with `LockError::Interrupted` and clear the
//! flag; uninterruptible ones leave it set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::wait::WaitQueue;

#[derive(Debug, Default)]
struct InterruptState {
    interrupted: AtomicBool,
    parked_on: Mutex<Option<Arc<WaitQueue>>>,
}

thread_local! {
    static CURRENT: Arc<InterruptState> = Arc::new(InterruptState::default());
}

/// Handle used to interrupt a thread.
#[derive(Debug, Clone)]
pub struct Interrupter {
    state: Arc<InterruptState>,
}

impl Interrupter {
    /// Returns a handle that interrupts the calling thread.
    pub fn current() -> Self {
        Self {
            state: CURRENT.with(Arc::clone),
        }
    }

    /// Sets the interrupt flag and wakes the thread if it is parked.
    pub fn interrupt(&self) {
        self.state.interrupted.store(true, Ordering::SeqCst);
        let parked_on = self.state.parked_on.lock().clone();
        if let Some(queue) = parked_on {
            trace!("waking interrupted thread");
            queue.nudge();
        }
    }

    /// Returns true if the flag is set, without clearing it.
    pub fn is_interrupted(&self) -> bool {
        self.state.interrupted.load(Ordering::SeqCst)
    }
}

/// Clears the calling thread's interrupt flag, returning its previous value.
pub fn take_interrupted() -> bool {
    CURRENT.with(|state| state.interrupted.swap(false, Ordering::SeqCst))
}

/// Returns true if the calling thread's interrupt flag is set.
pub(crate) fn is_interrupted() -> bool {
    CURRENT.with(|state| state.interrupted.load(Ordering::SeqCst))
}

/// Marks the calling thread as parked on `queue` until dropped.
pub(crate) fn register_park(queue: Arc<WaitQueue>) -> ParkRegistration {
    let state = CURRENT.with(Arc::clone);
    *state.parked_on.lock() = Some(queue);
    ParkRegistration { state }
}

pub(crate) struct ParkRegistration {
    state: Arc<InterruptState>,
}

impl Drop for ParkRegistration {
    fn drop(&mut self) {
        self.state.parked_on.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locker::wait::Wake;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_take_interrupted_clears_flag() {
        Interrupter::current().interrupt();
        assert!(take_interrupted());
        assert!(!take_interrupted());
    }

    #[test]
    fn test_interrupt_wakes_parked_thread() {
        let queue = Arc::new(WaitQueue::new());
        let (tx, rx) = std::sync::mpsc::channel();

        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                tx.send(Interrupter::current()).unwrap();
                let observed = queue.generation();
                let deadline = Instant::now() + Duration::from_secs(5);
                let wake = queue.park(observed, Some(deadline), true);
                (wake, take_interrupted())
            })
        };

        let interrupter = rx.recv().unwrap();
        thread::sleep(Duration::from_millis(20));
        interrupter.interrupt();

        let (wake, flag) = waiter.join().unwrap();
        assert_eq!(wake, Wake::Interrupted);
        assert!(flag);
    }

    #[test]
    fn test_uninterruptible_park_ignores_flag() {
        let queue = Arc::new(WaitQueue::new());
        Interrupter::current().interrupt();

        let observed = queue.generation();
        let deadline = Instant::now() + Duration::from_millis(20);
        assert_eq!(queue.park(observed, Some(deadline), false), Wake::TimedOut);
        assert!(take_interrupted());
    }
}
