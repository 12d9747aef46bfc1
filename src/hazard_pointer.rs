//! Hazard records and the registry chaining them.
//!
//! A `HazardRecord` belongs to one accessor at a time. It publishes up to
//! `HAZARD_SLOTS_PER_RECORD` nodes the accessor is about to dereference. While the record is
//! active, the nodes its accessor unlinked but could not free yet (its retire list) stay with the
//! accessor; when the accessor goes away the list is parked on the record.
//!
//! Records form a singly linked chain which only grows, at its head, by CAS. Records are never
//! unlinked while the registry lives: a retired record is flagged inactive and handed to the next
//! accessor that needs one. Traversing the chain is therefore always safe without any further
//! synchronization.
//!
//! A parked list is owned by whoever swaps it out of the record first, either the accessor that
//! reuses the record or one helping to reclaim it. The `active` flag only tells whether the
//! record's slots belong to an accessor, so helping never keeps a record from being reused.

use std::alloc::{self, Layout};
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

use crate::error::Status;
use crate::node::{Node, NodePtr};
use crate::util::CachePadded;

/// Hazard slots per record, `K`. Dequeue protects the sentinel and its successor.
pub const HAZARD_SLOTS_PER_RECORD: usize = 2;

type HazardRecordPtr<T> = *mut HazardRecord<T>;

pub(crate) type RetireList<T> = Vec<NodePtr<T>>;

pub(crate) struct HazardRecord<T> {
    slots: CachePadded<[AtomicPtr<Node<T>>; HAZARD_SLOTS_PER_RECORD]>,
    next: HazardRecordPtr<T>,
    active: AtomicBool,
    parked: AtomicPtr<RetireList<T>>,
}

unsafe impl<T: Send> Send for HazardRecord<T> {}

unsafe impl<T: Send> Sync for HazardRecord<T> {}

impl<T> HazardRecord<T> {
    pub(crate) fn layout() -> Layout {
        Layout::new::<HazardRecord<T>>()
    }

    fn alloc() -> Result<HazardRecordPtr<T>, Status> {
        let layout = Self::layout();
        let rec = unsafe { alloc::alloc(layout) } as HazardRecordPtr<T>;
        if rec.is_null() {
            warn!("hazard record alloc fail, size={}", layout.size());
            return Err(Status::RecordAllocFailed);
        }
        unsafe {
            ptr::write(
                rec,
                HazardRecord {
                    slots: CachePadded::default(),
                    next: ptr::null_mut(),
                    active: AtomicBool::new(true),
                    parked: AtomicPtr::new(ptr::null_mut()),
                },
            );
        }
        Ok(rec)
    }

    /// Frees the record and every node left on its parked list.
    unsafe fn destroy(rec: HazardRecordPtr<T>) {
        if let Some(retired) = (*rec).take_parked() {
            for node in retired {
                Node::free(node);
            }
        }
        ptr::drop_in_place(rec);
        alloc::dealloc(rec as *mut u8, Self::layout());
    }

    /// Publish `node` in slot `idx`. The store is sequentially consistent: it must be ordered
    /// before the caller re-reads the shared pointer it loaded `node` from.
    #[inline]
    pub(crate) fn protect(&self, idx: usize, node: NodePtr<T>) {
        self.slots[idx].store(node, Ordering::SeqCst);
    }

    #[inline]
    pub(crate) fn hazard(&self, idx: usize) -> NodePtr<T> {
        self.slots[idx].load(Ordering::SeqCst)
    }

    fn clear(&self) {
        for slot in self.slots.iter() {
            slot.store(ptr::null_mut(), Ordering::SeqCst);
        }
    }

    #[inline]
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Take ownership of an inactive record's slots.
    #[inline]
    fn try_claim(&self) -> bool {
        !self.is_active()
            && self
                .active
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
    }

    #[inline]
    fn release(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Whether a retire list waits on this record.
    #[inline]
    pub(crate) fn has_parked(&self) -> bool {
        !self.parked.load(Ordering::Acquire).is_null()
    }

    /// Detach the parked retire list, if any. At most one caller gets a given list.
    pub(crate) fn take_parked(&self) -> Option<RetireList<T>> {
        let list = self.parked.swap(ptr::null_mut(), Ordering::AcqRel);
        if list.is_null() {
            None
        } else {
            // The swap made us the only holder of the box.
            Some(*unsafe { Box::from_raw(list) })
        }
    }

    /// Park `retired` on the record, merged with whatever is parked there already.
    fn park(&self, mut retired: RetireList<T>) {
        if let Some(prev) = self.take_parked() {
            retired.extend(prev);
        }
        if retired.is_empty() {
            return;
        }
        let prev = self
            .parked
            .swap(Box::into_raw(Box::new(retired)), Ordering::AcqRel);
        // Only the owner of the slots parks, and it does so once, before releasing them.
        debug_assert!(prev.is_null());
    }
}

/// Iterator over every record of a registry, active or not.
pub(crate) struct Records<'a, T> {
    curr: HazardRecordPtr<T>,
    _marker: PhantomData<&'a HazardRecord<T>>,
}

impl<'a, T> Iterator for Records<'a, T> {
    type Item = &'a HazardRecord<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.curr.is_null() {
            None
        } else {
            let rec = unsafe { &*self.curr };
            self.curr = rec.next;
            Some(rec)
        }
    }
}

/// The chain of hazard records of one queue, together with `H`, the number of hazard slots the
/// chain holds.
pub(crate) struct HazardRegistry<T> {
    head: CachePadded<AtomicPtr<HazardRecord<T>>>,
    hazard_slot_count: CachePadded<AtomicUsize>,
    min_scan_threshold: usize,
}

impl<T> HazardRegistry<T> {
    pub(crate) fn new(min_scan_threshold: usize) -> HazardRegistry<T> {
        HazardRegistry {
            head: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            hazard_slot_count: CachePadded::new(AtomicUsize::new(0)),
            min_scan_threshold,
        }
    }

    #[inline]
    fn atomic_load_head(&self) -> HazardRecordPtr<T> {
        self.head.load(Ordering::Acquire)
    }

    pub(crate) fn records(&self) -> Records<'_, T> {
        Records {
            curr: self.atomic_load_head(),
            _marker: PhantomData,
        }
    }

    /// `H`.
    #[inline]
    pub(crate) fn hazard_slot_count(&self) -> usize {
        self.hazard_slot_count.load(Ordering::Relaxed)
    }

    pub(crate) fn record_count(&self) -> usize {
        self.records().count()
    }

    /// `R = H * K`, or the configured floor if larger. A retire list reaching this length is
    /// scanned.
    #[inline]
    pub(crate) fn scan_threshold(&self) -> usize {
        let r = self.hazard_slot_count() * HAZARD_SLOTS_PER_RECORD;
        if r < self.min_scan_threshold {
            self.min_scan_threshold
        } else {
            r
        }
    }

    /// Hand out an active record owned by the caller: an inactive one if the chain has any,
    /// otherwise a new one pushed at the head of the chain.
    pub(crate) fn allocate_record(&self) -> Result<&HazardRecord<T>, Status> {
        for rec in self.records() {
            if rec.try_claim() {
                debug!("hazard record reused, parked={}", rec.has_parked());
                return Ok(rec);
            }
        }

        let rec = HazardRecord::alloc()?;
        self.hazard_slot_count
            .fetch_add(HAZARD_SLOTS_PER_RECORD, Ordering::Relaxed);

        let mut old = self.atomic_load_head();
        loop {
            // Not published yet, nobody else can see `next`.
            unsafe { (*rec).next = old };
            match self
                .head
                .compare_exchange_weak(old, rec, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(curr) => old = curr,
            }
        }
        debug!(
            "hazard record allocated, hazard_slot_count={}",
            self.hazard_slot_count()
        );
        Ok(unsafe { &*rec })
    }

    /// Deactivate `rec` for reuse. `retired`, the retire list of its accessor, is parked on it
    /// until the next owner of the record or a helping accessor takes it.
    pub(crate) fn retire_record(&self, rec: &HazardRecord<T>, retired: RetireList<T>) {
        rec.clear();
        debug!("hazard record retired, pending={}", retired.len());
        rec.park(retired);
        rec.release();
    }

    /// Every node currently published in any slot of any record, sorted, without duplicates.
    /// Inactive records are included: a record that is being reused may publish again at any
    /// time.
    pub(crate) fn protected(&self) -> Vec<NodePtr<T>> {
        let mut ret = Vec::with_capacity(self.hazard_slot_count());
        for rec in self.records() {
            for idx in 0..HAZARD_SLOTS_PER_RECORD {
                let hazard = rec.hazard(idx);
                if !hazard.is_null() {
                    ret.push(hazard);
                }
            }
        }
        ret.sort_unstable();
        ret.dedup();
        ret
    }
}

impl<T> Drop for HazardRegistry<T> {
    fn drop(&mut self) {
        let mut rec = *self.head.get_mut();
        while !rec.is_null() {
            unsafe {
                let next = (*rec).next;
                HazardRecord::destroy(rec);
                rec = next;
            }
        }
    }
}
