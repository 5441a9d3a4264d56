// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Per-thread bookkeeping for the synchronizer.
//!
//! Each thread keeps, per synchronizer, the id staged for the next operation,
//! the lock records it holds and whether it is parked after giving its locks
//! back. The state lives in a thread-local registry keyed by synchronizer so it
//! is never reachable from another thread.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::table::{EntityId, LockState};

static NEXT_REGISTRY_KEY: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static REGISTRY: RefCell<HashMap<u64, Box<dyn Any>>> = RefCell::new(HashMap::new());
}

/// Allocates a registry key for a new synchronizer.
pub(crate) fn next_registry_key() -> u64 {
    NEXT_REGISTRY_KEY.fetch_add(1, Ordering::Relaxed)
}

/// State of one thread with respect to one synchronizer.
#[derive(Debug)]
pub struct ThreadState<Id> {
    /// Id staged for the next shared operation (None = global).
    pub(crate) id: Option<Id>,
    /// Records this thread holds, including ones given back while sleeping.
    pub(crate) acquired: HashMap<Id, Arc<LockState>>,
    /// Set while parked after giving back every held id.
    pub(crate) sleeping: bool,
}

impl<Id: EntityId> ThreadState<Id> {
    fn new() -> Self {
        Self {
            id: None,
            acquired: HashMap::new(),
            sleeping: false,
        }
    }

    /// Returns true if the state carries nothing worth keeping.
    pub(crate) fn is_idle(&self) -> bool {
        self.acquired.is_empty() && !self.sleeping
    }
}

pub(crate) type SharedThreadState<Id> = Rc<RefCell<ThreadState<Id>>>;

/// Returns the calling thread's state for the synchronizer registered under `key`.
pub(crate) fn thread_state<Id: EntityId>(key: u64) -> SharedThreadState<Id> {
    REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        let slot = registry
            .entry(key)
            .or_insert_with(|| Box::new(Rc::new(RefCell::new(ThreadState::<Id>::new()))));
        match slot.downcast_ref::<SharedThreadState<Id>>() {
            Some(state) => Rc::clone(state),
            None => {
                // Keys are unique per synchronizer, so the type always matches.
                let state = Rc::new(RefCell::new(ThreadState::<Id>::new()));
                *slot = Box::new(Rc::clone(&state));
                state
            }
        }
    })
}

/// Drops the calling thread's state for `key` if it holds nothing.
pub(crate) fn discard_if_idle<Id: EntityId>(key: u64) {
    REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        let idle = registry
            .get(&key)
            .and_then(|slot| slot.downcast_ref::<SharedThreadState<Id>>())
            .is_some_and(|state| state.try_borrow().is_ok_and(|state| state.is_idle()));
        if idle {
            registry.remove(&key);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_per_key() {
        let a = next_registry_key();
        let b = next_registry_key();

        thread_state::<u32>(a).borrow_mut().id = Some(1);
        thread_state::<u32>(b).borrow_mut().id = Some(2);

        assert_eq!(thread_state::<u32>(a).borrow().id, Some(1));
        assert_eq!(thread_state::<u32>(b).borrow().id, Some(2));
    }

    #[test]
    fn test_state_is_per_thread() {
        let key = next_registry_key();
        thread_state::<u32>(key).borrow_mut().id = Some(9);

        let seen = std::thread::spawn(move || thread_state::<u32>(key).borrow().id)
            .join()
            .unwrap();
        assert_eq!(seen, None);
    }

    #[test]
    fn test_discard_if_idle() {
        let key = next_registry_key();
        let state = thread_state::<u32>(key);
        state
            .borrow_mut()
            .acquired
            .insert(3, Arc::new(LockState::new()));

        discard_if_idle::<u32>(key);
        assert_eq!(thread_state::<u32>(key).borrow().acquired.len(), 1);

        state.borrow_mut().acquired.clear();
        discard_if_idle::<u32>(key);
        drop(state);
        assert!(thread_state::<u32>(key).borrow().acquired.is_empty());
        assert_eq!(thread_state::<u32>(key).borrow().id, None);
    }
}
