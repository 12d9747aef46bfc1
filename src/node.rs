//! Linked list cell shared by all queue variants.
//!
//! Every queue keeps a sentinel node at its head. A node's value slot is initialized when the
//! node is created by an enqueue, and moved out exactly once, by the dequeue that turns the node
//! into the new sentinel. Sentinels therefore never hold a live value, and freeing a node never
//! drops a value: whoever owns the value has already taken it.

use std::alloc::{self, Layout};
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::error::Status;
use crate::hazard_pointer::HazardRecord;

pub(crate) type NodePtr<T> = *mut Node<T>;

pub(crate) struct Node<T> {
    value: MaybeUninit<T>,
    pub(crate) next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    /// Allocate a node holding `value`, with a null successor.
    /// On failure `value` is dropped.
    pub(crate) fn alloc(value: T) -> Result<NodePtr<T>, Status> {
        let node = Self::alloc_raw()?;
        unsafe {
            ptr::write(
                node,
                Node {
                    value: MaybeUninit::new(value),
                    next: AtomicPtr::new(ptr::null_mut()),
                },
            );
        }
        Ok(node)
    }

    /// Allocate a node holding no value.
    pub(crate) fn alloc_sentinel() -> Result<NodePtr<T>, Status> {
        let node = Self::alloc_raw()?;
        unsafe {
            ptr::write(
                node,
                Node {
                    value: MaybeUninit::uninit(),
                    next: AtomicPtr::new(ptr::null_mut()),
                },
            );
        }
        Ok(node)
    }

    fn alloc_raw() -> Result<NodePtr<T>, Status> {
        let layout = Layout::new::<Node<T>>();
        let node = unsafe { alloc::alloc(layout) } as NodePtr<T>;
        if node.is_null() {
            warn!("node alloc fail, size={}", layout.size());
            return Err(Status::NodeAllocFailed);
        }
        Ok(node)
    }

    /// Move the value out of `node`.
    ///
    /// # Safety
    ///
    /// `node` must be live, its value must have been initialized and not taken yet, and the caller
    /// must be the only one ever taking it.
    #[inline]
    pub(crate) unsafe fn take_value(node: NodePtr<T>) -> T {
        ptr::read((*node).value.as_ptr())
    }

    /// Release the memory of `node` without dropping its value slot.
    ///
    /// # Safety
    ///
    /// `node` must come from `alloc`/`alloc_sentinel`, must be unreachable for every other thread,
    /// and must not be used afterwards.
    #[inline]
    pub(crate) unsafe fn free(node: NodePtr<T>) {
        alloc::dealloc(node as *mut u8, Layout::new::<Node<T>>());
    }

    /// Free a whole chain starting from the sentinel `head`, dropping the values of every node
    /// after it.
    ///
    /// # Safety
    ///
    /// The caller must own the entire chain exclusively.
    pub(crate) unsafe fn free_chain(head: NodePtr<T>) {
        let mut node = (*head).next.load(Ordering::Relaxed);
        Self::free(head);
        while !node.is_null() {
            let next = (*node).next.load(Ordering::Relaxed);
            drop(Self::take_value(node));
            Self::free(node);
            node = next;
        }
    }
}

/// Layout of the allocation `status` reports as failed.
fn failed_layout<T>(status: Status) -> Layout {
    match status {
        Status::NodeAllocFailed => Layout::new::<Node<T>>(),
        Status::RecordAllocFailed => HazardRecord::<T>::layout(),
    }
}

/// Handle to the unrecoverable allocation failure of an infallible operation.
pub(crate) fn alloc_failed<T>(status: Status) -> ! {
    warn!("unrecoverable allocation failure, status={}", status);
    alloc::handle_alloc_error(failed_layout::<T>(status))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counted<'a>(&'a AtomicUsize);

    impl<'a> Drop for Counted<'a> {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_take_and_free() {
        let node = Node::alloc(String::from("abc")).unwrap();
        unsafe {
            assert!((*node).next.load(Ordering::Relaxed).is_null());
            assert_eq!(Node::take_value(node), "abc");
            Node::free(node);
        }
    }

    #[test]
    fn test_free_chain_drops_values_once() {
        let cnt = AtomicUsize::new(0);
        let head = Node::<Counted>::alloc_sentinel().unwrap();
        let mut tail = head;
        for _ in 0..10 {
            let node = Node::alloc(Counted(&cnt)).unwrap();
            unsafe { (*tail).next.store(node, Ordering::Relaxed) };
            tail = node;
        }
        assert_eq!(cnt.load(Ordering::Relaxed), 0);
        unsafe { Node::free_chain(head) };
        assert_eq!(cnt.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn test_failed_layout() {
        assert_eq!(
            failed_layout::<u64>(Status::NodeAllocFailed),
            Layout::new::<Node<u64>>()
        );
        assert_eq!(
            failed_layout::<u64>(Status::RecordAllocFailed),
            Layout::new::<HazardRecord<u64>>()
        );
        assert!(
            failed_layout::<u64>(Status::RecordAllocFailed).size()
                > failed_layout::<u64>(Status::NodeAllocFailed).size()
        );
    }
}
