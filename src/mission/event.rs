//! event.rs
//! One-shot "this state is ending" signal from the judge loop to the control thread.

use parking_lot::{Condvar, Mutex};
use std::{
    fmt,
    hash::Hash,
    time::{Duration, Instant},
};

/// Transition labels: anything hashable and cheap to clone.
pub trait Flag: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static> Flag for T {}

#[derive(Debug)]
enum Slot<F> {
    Cleared,
    /// `None` when the activation ended without a flag (error or shutdown).
    Set(Option<F>),
}

/// Set at most once per activation; the runtime clears it between activations.
pub struct PostEvent<F> {
    slot: Mutex<Slot<F>>,
    cond: Condvar,
}

impl<F: Flag> Default for PostEvent<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Flag> PostEvent<F> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Cleared),
            cond: Condvar::new(),
        }
    }

    fn fill(&self, payload: Option<F>) -> bool {
        let mut slot = self.slot.lock();
        if matches!(*slot, Slot::Set(_)) {
            return false;
        }
        *slot = Slot::Set(payload);
        self.cond.notify_all();
        true
    }

    /// Sets the event with `flag`. Returns false if it was already set; the
    /// first payload is kept.
    pub fn set(&self, flag: F) -> bool {
        self.fill(Some(flag))
    }

    /// Sets the event without a payload.
    pub fn abort(&self) -> bool {
        self.fill(None)
    }

    pub fn is_set(&self) -> bool {
        matches!(*self.slot.lock(), Slot::Set(_))
    }

    pub fn payload(&self) -> Option<F> {
        match &*self.slot.lock() {
            Slot::Set(payload) => payload.clone(),
            Slot::Cleared => None,
        }
    }

    /// Blocks until set or until `timeout` elapses. Returns whether it is set.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        while matches!(*slot, Slot::Cleared) {
            if self.cond.wait_until(&mut slot, deadline).timed_out() {
                return matches!(*slot, Slot::Set(_));
            }
        }
        true
    }

    pub(crate) fn clear(&self) {
        *self.slot.lock() = Slot::Cleared;
    }
}

impl<F: Flag> fmt::Debug for PostEvent<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostEvent")
            .field("slot", &*self.slot.lock())
            .finish()
    }
}
