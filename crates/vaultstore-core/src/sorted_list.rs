//! Sorted forward list with per-link locking.
//!
//! Every link carries its own mutex guarding the pointer to its successor.
//! Traversal is hand-over-hand: the successor's lock is acquired before
//! the predecessor's is released, so inserts and unlinks behind a walking
//! thread can never skip it past live elements. This permits iteration
//! concurrent with insertion and removal without a whole-list lock, at the
//! cost of contention along the traversal — acceptable for the short lists
//! it backs (observer handles, observed-node sets).
//!
//! Guards are the owned `lock_arc` flavor: each guard keeps its link alive
//! on its own, which is what lets a traversal hand a guard forward without
//! borrowing from a local that is about to be reassigned.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

struct Link<T> {
    data: T,
    next: NextSlot<T>,
}

type NextSlot<T> = Arc<Mutex<Option<Arc<Link<T>>>>>;
type SlotGuard<T> = ArcMutexGuard<RawMutex, Option<Arc<Link<T>>>>;

/// Concurrent ordered list with fine-grained locking.
///
/// Ordering is supplied at construction as a `sorts_before` predicate; new
/// elements are spliced in before the first element they sort ahead of, so
/// equal elements keep insertion order.
pub struct SortedList<T> {
    head: NextSlot<T>,
    len: AtomicUsize,
    sorts_before: fn(&T, &T) -> bool,
}

impl<T: Clone> SortedList<T> {
    /// Create a list ordered by `sorts_before`.
    pub fn new(sorts_before: fn(&T, &T) -> bool) -> Self {
        Self {
            head: Arc::new(Mutex::new(None)),
            len: AtomicUsize::new(0),
            sorts_before,
        }
    }

    /// Create an unordered list: new elements append at the tail.
    pub fn unordered() -> Self {
        fn never<T>(_: &T, _: &T) -> bool {
            false
        }
        Self::new(never::<T>)
    }

    /// Insert `value` at its sorted position.
    pub fn push(&self, value: T) {
        let mut guard: SlotGuard<T> = self.head.lock_arc();
        loop {
            let next = match guard.as_ref() {
                Some(link) => Arc::clone(link),
                None => break,
            };
            if (self.sorts_before)(&value, &next.data) {
                break;
            }
            let next_guard = next.next.lock_arc();
            drop(guard);
            guard = next_guard;
        }

        let successor = guard.take();
        *guard = Some(Arc::new(Link {
            data: value,
            next: Arc::new(Mutex::new(successor)),
        }));
        self.len.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy of the first element, if any.
    pub fn front(&self) -> Option<T> {
        let guard = self.head.lock_arc();
        guard.as_ref().map(|link| link.data.clone())
    }

    /// Copy of the first element matching `pred`, walking in list order.
    pub fn find_first_if(&self, mut pred: impl FnMut(&T) -> bool) -> Option<T> {
        let mut guard: SlotGuard<T> = self.head.lock_arc();
        loop {
            let next = match guard.as_ref() {
                Some(link) => Arc::clone(link),
                None => return None,
            };
            let next_guard = next.next.lock_arc();
            if pred(&next.data) {
                return Some(next.data.clone());
            }
            drop(guard);
            guard = next_guard;
        }
    }

    /// Unlink every element matching `pred`.
    ///
    /// Safe to call concurrently with traversals: an unlink happens under
    /// both the predecessor's and the victim's lock.
    pub fn remove_if(&self, mut pred: impl FnMut(&T) -> bool) {
        let mut guard: SlotGuard<T> = self.head.lock_arc();
        loop {
            let next = match guard.as_ref() {
                Some(link) => Arc::clone(link),
                None => return,
            };
            let mut next_guard = next.next.lock_arc();
            if pred(&next.data) {
                *guard = next_guard.take();
                self.len.fetch_sub(1, Ordering::Relaxed);
                // keep the predecessor's lock and examine the new successor
            } else {
                drop(guard);
                guard = next_guard;
            }
        }
    }

    /// Apply `f` to every element in list order.
    ///
    /// `f` runs while the current link's lock is held; it must not touch
    /// this list again.
    pub fn for_each(&self, mut f: impl FnMut(&T)) {
        let mut guard: SlotGuard<T> = self.head.lock_arc();
        loop {
            let next = match guard.as_ref() {
                Some(link) => Arc::clone(link),
                None => return,
            };
            let next_guard = next.next.lock_arc();
            f(&next.data);
            drop(guard);
            guard = next_guard;
        }
    }

    /// Element count (atomic read; exact under held locks).
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// True if the list holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ascending(a: &u32, b: &u32) -> bool {
        a < b
    }

    fn collect(list: &SortedList<u32>) -> Vec<u32> {
        let mut out = Vec::new();
        list.for_each(|v| out.push(*v));
        out
    }

    #[test]
    fn test_push_keeps_order() {
        let list = SortedList::new(ascending);
        for v in [5u32, 1, 4, 2, 3] {
            list.push(v);
        }
        assert_eq!(collect(&list), vec![1, 2, 3, 4, 5]);
        assert_eq!(list.len(), 5);
        assert_eq!(list.front(), Some(1));
    }

    #[test]
    fn test_unordered_appends() {
        let list: SortedList<u32> = SortedList::unordered();
        for v in [3u32, 1, 2] {
            list.push(v);
        }
        assert_eq!(collect(&list), vec![3, 1, 2]);
    }

    #[test]
    fn test_front_empty() {
        let list = SortedList::new(ascending);
        assert_eq!(list.front(), None);
        assert!(list.is_empty());
    }

    #[test]
    fn test_find_first_if() {
        let list = SortedList::new(ascending);
        for v in [1u32, 2, 3, 4] {
            list.push(v);
        }
        assert_eq!(list.find_first_if(|v| *v > 2), Some(3));
        assert_eq!(list.find_first_if(|v| *v > 9), None);
    }

    #[test]
    fn test_remove_if() {
        let list = SortedList::new(ascending);
        for v in [1u32, 2, 3, 4, 5] {
            list.push(v);
        }
        list.remove_if(|v| v % 2 == 0);
        assert_eq!(collect(&list), vec![1, 3, 5]);
        assert_eq!(list.len(), 3);

        list.remove_if(|_| true);
        assert!(list.is_empty());
        assert_eq!(list.front(), None);
    }

    #[test]
    fn test_remove_adjacent_matches() {
        let list = SortedList::new(ascending);
        for v in [1u32, 2, 2, 2, 3] {
            list.push(v);
        }
        list.remove_if(|v| *v == 2);
        assert_eq!(collect(&list), vec![1, 3]);
    }

    #[test]
    fn test_concurrent_push() {
        let list = std::sync::Arc::new(SortedList::new(ascending));
        let mut handles = vec![];
        for t in 0..4u32 {
            let l = std::sync::Arc::clone(&list);
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    l.push(t * 50 + i);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let collected = collect(&list);
        assert_eq!(collected.len(), 200);
        assert!(collected.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(list.len(), 200);
    }

    #[test]
    fn test_concurrent_push_and_remove() {
        let list = std::sync::Arc::new(SortedList::new(ascending));
        for v in 0..100u32 {
            list.push(v);
        }

        let pusher = {
            let l = std::sync::Arc::clone(&list);
            std::thread::spawn(move || {
                for v in 100..200u32 {
                    l.push(v);
                }
            })
        };
        let remover = {
            let l = std::sync::Arc::clone(&list);
            std::thread::spawn(move || {
                l.remove_if(|v| v % 2 == 0);
            })
        };
        pusher.join().unwrap();
        remover.join().unwrap();

        // one full pass with nothing running concurrently settles the rest
        list.remove_if(|v| v % 2 == 0);
        let collected = collect(&list);
        assert!(collected.iter().all(|v| v % 2 == 1));
        assert!(collected.windows(2).all(|w| w[0] <= w[1]));
    }
}
