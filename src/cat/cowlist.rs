//! A copy-on-write list for fan-out listener sets.
//!
//! Mutation clones the current snapshot, mutates the clone, and swaps it in;
//! readers take a cheap `Arc` clone of the current snapshot and iterate it
//! without holding any lock that a writer (or another reader) could block
//! on. This is the pattern spec.md calls for on the AI listener set, the
//! rigctl session list, and the audio stream-listener list: none of them may
//! block the hot path that produces events.

use std::sync::{Arc, Mutex};

pub struct CowList<T> {
    inner: Mutex<Arc<Vec<T>>>,
}

impl<T: Clone> CowList<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Arc::new(Vec::new())),
        }
    }

    /// Immutable snapshot for lock-free iteration.
    pub fn snapshot(&self) -> Arc<Vec<T>> {
        self.inner.lock().expect("cowlist mutex poisoned").clone()
    }

    pub fn push(&self, item: T) {
        let mut guard = self.inner.lock().expect("cowlist mutex poisoned");
        let mut next = (**guard).clone();
        next.push(item);
        *guard = Arc::new(next);
    }

    /// Removes every item for which `predicate` returns `true`.
    pub fn retain<F: Fn(&T) -> bool>(&self, predicate: F) {
        let mut guard = self.inner.lock().expect("cowlist mutex poisoned");
        let mut next = (**guard).clone();
        next.retain(predicate);
        *guard = Arc::new(next);
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for CowList<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_snapshot() {
        let list: CowList<i32> = CowList::new();
        list.push(1);
        list.push(2);
        let snap = list.snapshot();
        assert_eq!(*snap, vec![1, 2]);
    }

    #[test]
    fn retain_drops_matching() {
        let list: CowList<i32> = CowList::new();
        list.push(1);
        list.push(2);
        list.push(3);
        list.retain(|v| *v != 2);
        assert_eq!(*list.snapshot(), vec![1, 3]);
    }

    #[test]
    fn snapshot_is_stable_across_mutation() {
        let list: CowList<i32> = CowList::new();
        list.push(1);
        let snap = list.snapshot();
        list.push(2);
        assert_eq!(*snap, vec![1]);
        assert_eq!(*list.snapshot(), vec![1, 2]);
    }
}
