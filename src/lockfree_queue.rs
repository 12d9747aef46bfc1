//! Lock-free multi-producer multi-consumer queue.
//!
//! The queue is a singly linked list with a sentinel at its head, updated only through CAS on
//! `head`, `tail` and the `next` links of its nodes. `tail` may lag one link behind the last
//! node; any thread noticing it helps to swing it forward.
//!
//! Threads access the queue through a `ThreadAccessor`, which owns one hazard record of the
//! queue's registry. Before dereferencing a node, an accessor publishes it in one of the record's
//! slots and re-reads the shared pointer it came from: if the pointer is unchanged the node
//! cannot have been freed in between, because a dequeuer unlinks a node before it looks for
//! hazards, and frees it only if none is found. Unlinked nodes wait on the accessor's retire list
//! until a scan of all records finds them unprotected.

use std::marker::PhantomData;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::error::Status;
use crate::hazard_pointer::{HazardRecord, HazardRegistry, RetireList};
use crate::node::{self, Node, NodePtr};
use crate::queue::Queue;
use crate::util::{self, CachePadded};

const HP_HEAD: usize = 0;
const HP_NEXT: usize = 1;
const HP_TAIL: usize = 0;

pub struct LockFreeQueue<T> {
    head: CachePadded<AtomicPtr<Node<T>>>,
    tail: CachePadded<AtomicPtr<Node<T>>>,
    registry: HazardRegistry<T>,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for LockFreeQueue<T> {}

unsafe impl<T: Send> Sync for LockFreeQueue<T> {}

impl<T> LockFreeQueue<T> {
    /// Create an empty queue. A retire list is scanned once it holds `H * K` nodes, `H` being the
    /// number of hazard slots allocated so far and `K` the slots per record.
    ///
    /// # Examples
    ///
    /// ```
    /// use rs_hpqueue::lockfree_queue::LockFreeQueue;
    ///
    /// let queue = LockFreeQueue::new();
    /// let mut accessor = queue.create_accessor();
    /// accessor.enqueue(1);
    /// accessor.enqueue(2);
    /// assert_eq!(accessor.dequeue(), Some(1));
    /// assert_eq!(accessor.dequeue(), Some(2));
    /// assert_eq!(accessor.dequeue(), None);
    /// ```
    ///
    pub fn new() -> LockFreeQueue<T> {
        Self::with_scan_threshold(0)
    }

    /// Same as `new`, except that retire lists are not scanned before they hold at least
    /// `min_scan_threshold` nodes. With few accessors `H * K` is tiny, and a larger floor trades
    /// memory held by unlinked nodes for fewer scans.
    ///
    /// # Examples
    ///
    /// ```
    /// use rs_hpqueue::lockfree_queue::LockFreeQueue;
    ///
    /// let queue = LockFreeQueue::<i64>::with_scan_threshold(128);
    /// let _accessor = queue.create_accessor();
    /// assert_eq!(queue.scan_threshold(), 128);
    /// ```
    ///
    pub fn with_scan_threshold(min_scan_threshold: usize) -> LockFreeQueue<T> {
        let head = Node::alloc_sentinel().unwrap_or_else(|s| node::alloc_failed::<T>(s));
        LockFreeQueue {
            head: CachePadded::new(AtomicPtr::new(head)),
            tail: CachePadded::new(AtomicPtr::new(head)),
            registry: HazardRegistry::new(min_scan_threshold),
            _marker: PhantomData,
        }
    }

    #[inline]
    fn atomic_load_head(&self) -> NodePtr<T> {
        self.head.load(Ordering::SeqCst)
    }

    #[inline]
    fn atomic_load_tail(&self) -> NodePtr<T> {
        self.tail.load(Ordering::SeqCst)
    }

    #[inline]
    fn atomic_cxchg_head(&self, old: NodePtr<T>, new: NodePtr<T>) -> bool {
        self.head
            .compare_exchange(old, new, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    #[inline]
    fn atomic_cxchg_tail(&self, old: NodePtr<T>, new: NodePtr<T>) -> bool {
        self.tail
            .compare_exchange(old, new, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Get a handle for the calling thread. Create at most one per thread at a time and drop it
    /// when the thread is done with the queue; its hazard record is then kept for reuse.
    ///
    /// # Examples
    ///
    /// ```
    /// use rs_hpqueue::lockfree_queue::LockFreeQueue;
    /// use std::thread;
    ///
    /// let queue = LockFreeQueue::new();
    /// let accessors: Vec<_> = (0..4).map(|_| queue.create_accessor()).collect();
    /// thread::scope(|s| {
    ///     for (i, mut accessor) in accessors.into_iter().enumerate() {
    ///         s.spawn(move || accessor.enqueue(i));
    ///     }
    /// });
    /// assert_eq!(queue.record_count(), 4);
    /// let mut accessor = queue.create_accessor();
    /// let mut sum = 0;
    /// while let Some(v) = accessor.dequeue() {
    ///     sum += v;
    /// }
    /// assert_eq!(sum, 6);
    /// assert_eq!(queue.record_count(), 4);
    /// ```
    ///
    pub fn create_accessor(&self) -> ThreadAccessor<'_, T> {
        self.try_create_accessor()
            .unwrap_or_else(|s| node::alloc_failed::<T>(s))
    }

    /// Same as `create_accessor`, but returns `Status::RecordAllocFailed` instead of aborting
    /// when a new hazard record cannot be allocated.
    pub fn try_create_accessor(&self) -> Result<ThreadAccessor<'_, T>, Status> {
        let record = self.registry.allocate_record()?;
        // Adopt what the previous owner left, unless a helper took it already.
        let retired = record.take_parked().unwrap_or_default();
        Ok(ThreadAccessor {
            queue: self,
            record,
            retired,
        })
    }

    /// Number of hazard records ever allocated. It grows only when an accessor is created while
    /// every record is bound to another accessor, so it stays within the peak number of accessors
    /// alive or being created at once.
    pub fn record_count(&self) -> usize {
        self.registry.record_count()
    }

    /// `H`, hazard slots over all records.
    pub fn hazard_slot_count(&self) -> usize {
        self.registry.hazard_slot_count()
    }

    /// Retire list length that triggers a scan.
    pub fn scan_threshold(&self) -> usize {
        self.registry.scan_threshold()
    }
}

impl<T> Default for LockFreeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LockFreeQueue<T> {
    fn drop(&mut self) {
        // No accessor outlives the queue, so the list is ours alone. Retired nodes are freed by
        // the registry.
        unsafe { Node::free_chain(*self.head.get_mut()) }
    }
}

/// Per-thread handle to a `LockFreeQueue`, bound to one hazard record.
///
/// Dropping the accessor retires its record: the slots are cleared and the record is flagged
/// reusable. Nodes still waiting on its retire list are parked on the record for other accessors
/// to collect.
pub struct ThreadAccessor<'a, T> {
    queue: &'a LockFreeQueue<T>,
    record: &'a HazardRecord<T>,
    retired: RetireList<T>,
}

unsafe impl<'a, T: Send> Send for ThreadAccessor<'a, T> {}

impl<'a, T> ThreadAccessor<'a, T> {
    /// Add `v` at the back of the queue.
    pub fn enqueue(&mut self, v: T) {
        if let Err(status) = self.try_enqueue(v) {
            node::alloc_failed::<T>(status)
        }
    }

    /// Same as `enqueue`, but returns `Status::NodeAllocFailed` instead of aborting when the node
    /// cannot be allocated. `v` is dropped in that case.
    pub fn try_enqueue(&mut self, v: T) -> Result<(), Status> {
        let node = Node::alloc(v)?;
        unsafe { self.inner_enqueue(node) };
        Ok(())
    }

    unsafe fn inner_enqueue(&mut self, node: NodePtr<T>) {
        let queue = self.queue;
        let mut t;
        loop {
            t = queue.atomic_load_tail();
            self.record.protect(HP_TAIL, t);
            if queue.atomic_load_tail() != t {
                continue;
            }
            let next = (*t).next.load(Ordering::SeqCst);
            if queue.atomic_load_tail() != t {
                continue;
            }
            if !next.is_null() {
                // tail is lagging, swing it and retry
                queue.atomic_cxchg_tail(t, next);
                continue;
            }
            if (*t)
                .next
                .compare_exchange(ptr::null_mut(), node, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break;
            }
            util::pause();
        }
        // Whoever finds tail lagging will swing it otherwise.
        queue.atomic_cxchg_tail(t, node);
    }

    /// Remove the value at the front of the queue, `None` if it is empty.
    pub fn dequeue(&mut self) -> Option<T> {
        unsafe { self.inner_dequeue() }
    }

    unsafe fn inner_dequeue(&mut self) -> Option<T> {
        let queue = self.queue;
        let mut h;
        let mut next;
        loop {
            h = queue.atomic_load_head();
            self.record.protect(HP_HEAD, h);
            if queue.atomic_load_head() != h {
                continue;
            }
            let t = queue.atomic_load_tail();
            next = (*h).next.load(Ordering::SeqCst);
            self.record.protect(HP_NEXT, next);
            if queue.atomic_load_head() != h {
                continue;
            }
            if next.is_null() {
                return None;
            }
            if h == t {
                // an enqueue linked `next` but has not swung tail yet
                queue.atomic_cxchg_tail(t, next);
                continue;
            }
            if queue.atomic_cxchg_head(h, next) {
                break;
            }
            util::pause();
        }
        // `next` is the new sentinel. It stays protected by HP_NEXT, and only the winner of the
        // CAS above takes its value.
        let ret = Node::take_value(next);
        self.retire_node(h);
        Some(ret)
    }

    /// Number of unlinked nodes this accessor still waits to free.
    pub fn pending_reclaim(&self) -> usize {
        self.retired.len()
    }

    unsafe fn retire_node(&mut self, node: NodePtr<T>) {
        self.retired.push(node);
        if self.retired.len() >= self.queue.registry.scan_threshold() {
            self.scan();
            self.help_scan();
        }
    }

    /// Free every node of the retire list that no hazard slot protects.
    unsafe fn scan(&mut self) {
        let protected = self.queue.registry.protected();
        let cap = self.retired.capacity();
        let retired = mem::replace(&mut self.retired, Vec::with_capacity(cap));
        let total = retired.len();
        for node in retired {
            if protected.binary_search(&node).is_ok() {
                self.retired.push(node);
            } else {
                Node::free(node);
            }
        }
        trace!(
            "scan freed {} nodes, {} still protected",
            total - self.retired.len(),
            self.retired.len()
        );
    }

    /// Collect the retire lists parked on records by accessors that are gone, so that their
    /// nodes get freed as well. Taking a list does not claim its record.
    unsafe fn help_scan(&mut self) {
        let queue = self.queue;
        for rec in queue.registry.records() {
            if !rec.has_parked() {
                continue;
            }
            let orphans = match rec.take_parked() {
                Some(orphans) => orphans,
                None => continue,
            };
            debug!("help scan took {} parked nodes", orphans.len());
            for node in orphans {
                self.retired.push(node);
                if self.retired.len() >= queue.registry.scan_threshold() {
                    self.scan();
                }
            }
        }
    }
}

impl<'a, T> Queue<T> for ThreadAccessor<'a, T> {
    fn enqueue(&mut self, value: T) {
        ThreadAccessor::enqueue(self, value)
    }

    fn dequeue(&mut self) -> Option<T> {
        ThreadAccessor::dequeue(self)
    }
}

impl<'a, T> Drop for ThreadAccessor<'a, T> {
    fn drop(&mut self) {
        let retired = mem::replace(&mut self.retired, Vec::new());
        self.queue.registry.retire_record(self.record, retired);
    }
}
