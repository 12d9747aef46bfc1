use crate::error::Status;
use crate::node::{self, Node, NodePtr};
use crate::queue::Queue;
use std::sync::atomic::Ordering;

/// Unsynchronized sentinel-headed queue, the baseline that measures the cost of synchronization.
/// It is `!Sync` and every operation takes `&mut self`, so it cannot be shared between threads.
pub struct BaselineQueue<T> {
    head: NodePtr<T>,
    tail: NodePtr<T>,
}

unsafe impl<T: Send> Send for BaselineQueue<T> {}

impl<T> BaselineQueue<T> {
    pub fn new() -> BaselineQueue<T> {
        let head = Node::alloc_sentinel().unwrap_or_else(|s| node::alloc_failed::<T>(s));
        BaselineQueue { head, tail: head }
    }

    pub fn try_enqueue(&mut self, v: T) -> Result<(), Status> {
        let node = Node::alloc(v)?;
        unsafe { (*self.tail).next.store(node, Ordering::Relaxed) };
        self.tail = node;
        Ok(())
    }

    pub fn enqueue(&mut self, v: T) {
        if let Err(status) = self.try_enqueue(v) {
            node::alloc_failed::<T>(status)
        }
    }

    pub fn dequeue(&mut self) -> Option<T> {
        unsafe {
            let node = self.head;
            let next = (*node).next.load(Ordering::Relaxed);
            if next.is_null() {
                return None;
            }
            let ret = Node::take_value(next);
            self.head = next;
            Node::free(node);
            Some(ret)
        }
    }

    pub fn is_empty(&self) -> bool {
        unsafe { (*self.head).next.load(Ordering::Relaxed).is_null() }
    }
}

impl<T> Default for BaselineQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Queue<T> for BaselineQueue<T> {
    fn enqueue(&mut self, value: T) {
        BaselineQueue::enqueue(self, value)
    }

    fn dequeue(&mut self) -> Option<T> {
        BaselineQueue::dequeue(self)
    }
}

impl<T> Drop for BaselineQueue<T> {
    fn drop(&mut self) {
        unsafe { Node::free_chain(self.head) }
    }
}
