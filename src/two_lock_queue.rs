//! Two-lock concurrent queue.
//!
//! The list always holds a sentinel. One lock serializes enqueuers (they only touch the last
//! node), the other serializes dequeuers (they only touch the sentinel and its successor), so one
//! enqueue and one dequeue can run at the same time. When the list holds just the sentinel both
//! sides reach the same node, which is why `next` is atomic even here.

use crate::error::Status;
use crate::node::{self, Node, NodePtr};
use crate::queue::Queue;
use crate::util::CachePadded;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard, PoisonError};

struct End<T>(NodePtr<T>);

unsafe impl<T: Send> Send for End<T> {}

pub struct TwoLockQueue<T> {
    head: CachePadded<Mutex<End<T>>>,
    tail: CachePadded<Mutex<End<T>>>,
}

// No critical section can panic halfway through relinking, so a poisoned lock still guards a
// consistent list.
fn lock<T>(end: &Mutex<End<T>>) -> MutexGuard<'_, End<T>> {
    end.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> TwoLockQueue<T> {
    pub fn new() -> TwoLockQueue<T> {
        let head = Node::alloc_sentinel().unwrap_or_else(|s| node::alloc_failed::<T>(s));
        TwoLockQueue {
            head: CachePadded::new(Mutex::new(End(head))),
            tail: CachePadded::new(Mutex::new(End(head))),
        }
    }

    pub fn try_enqueue(&self, v: T) -> Result<(), Status> {
        let node = Node::alloc(v)?;
        let mut tail = lock(&self.tail);
        unsafe { (*tail.0).next.store(node, Ordering::Release) };
        tail.0 = node;
        Ok(())
    }

    pub fn enqueue(&self, v: T) {
        if let Err(status) = self.try_enqueue(v) {
            node::alloc_failed::<T>(status)
        }
    }

    pub fn dequeue(&self) -> Option<T> {
        let mut head = lock(&self.head);
        let node = head.0;
        let next = unsafe { (*node).next.load(Ordering::Acquire) };
        if next.is_null() {
            return None;
        }
        let ret = unsafe { Node::take_value(next) };
        head.0 = next;
        // The old sentinel is behind the new one, no enqueuer or dequeuer can reach it anymore.
        unsafe { Node::free(node) };
        Some(ret)
    }
}

impl<T> Default for TwoLockQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T> Queue<T> for &'a TwoLockQueue<T> {
    fn enqueue(&mut self, value: T) {
        TwoLockQueue::enqueue(self, value)
    }

    fn dequeue(&mut self) -> Option<T> {
        TwoLockQueue::dequeue(self)
    }
}

impl<T> Drop for TwoLockQueue<T> {
    fn drop(&mut self) {
        let head = self
            .head
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .0;
        unsafe { Node::free_chain(head) }
    }
}

#[cfg(test)]
mod test {
    use crate::queue::Queue;
    use crate::two_lock_queue::TwoLockQueue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    struct Node<'a, T> {
        cnt: &'a AtomicUsize,
        v: T,
    }

    impl<'a, T> Drop for Node<'a, T> {
        fn drop(&mut self) {
            self.cnt.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_base() {
        let queue = TwoLockQueue::new();
        assert!(queue.dequeue().is_none());
        queue.enqueue(1);
        assert_eq!(queue.dequeue().unwrap(), 1);
        let test_num = 100;
        for i in 0..test_num {
            queue.enqueue(i);
        }
        for i in 0..test_num {
            assert_eq!(queue.dequeue().unwrap(), i);
        }
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_queue_handle() {
        let queue = TwoLockQueue::new();
        let mut handle = &queue;
        Queue::enqueue(&mut handle, 7);
        Queue::enqueue(&mut handle, 8);
        assert_eq!(Queue::dequeue(&mut handle), Some(7));
        assert_eq!(queue.dequeue(), Some(8));
    }

    #[test]
    fn test_memory_leak() {
        let cnt = AtomicUsize::new(0);
        let queue = TwoLockQueue::new();
        let test_num = 100;
        for i in 0..test_num {
            queue.enqueue(Node { cnt: &cnt, v: i });
        }
        for i in 0..test_num / 2 {
            assert_eq!(queue.dequeue().unwrap().v, i);
        }
        assert_eq!(cnt.load(Ordering::Relaxed), test_num / 2);
        drop(queue);
        assert_eq!(cnt.load(Ordering::Relaxed), test_num);
    }

    #[test]
    fn test_one_producer_one_consumer() {
        let queue = TwoLockQueue::new();
        let test_num = 10_000u64;
        thread::scope(|s| {
            s.spawn(|| {
                for i in 0..test_num {
                    queue.enqueue(i);
                }
            });
            s.spawn(|| {
                let mut expect = 0;
                while expect < test_num {
                    if let Some(v) = queue.dequeue() {
                        assert_eq!(v, expect);
                        expect += 1;
                    }
                }
            });
        });
        assert!(queue.dequeue().is_none());
    }
}
