//! FIFO queues sharing one interface, for comparing synchronization strategies under concurrent
//! producers and consumers.
//!
//! * `BaselineQueue`, single threaded, no synchronization at all.
//! * `TwoLockQueue`, one lock for enqueuers and one for dequeuers.
//! * `LockFreeQueue`, the Michael-Scott queue driven only by CAS, with
//!   [`Hazard Pointers`](http://www.cs.otago.ac.nz/cosc440/readings/hazard-pointers.pdf)
//!   reclaiming the nodes it unlinks.
//!
//! A lock-free dequeue cannot free the node it unlinked right away, since other threads may still
//! be reading it. With hazard pointers every thread publishes the nodes it is about to access,
//! and a node is freed only once no thread has it published. This also avoids the
//! [`ABA problem`](https://en.wikipedia.org/wiki/ABA_problem) without tagged pointers: a node
//! cannot be freed and reallocated while someone still compares against it.
//!
//! Per-thread state lives in an explicit handle, `ThreadAccessor`, rather than in thread local
//! storage. Each accessor owns a hazard record of its queue; records are reused once their
//! accessor is dropped, so their number is the peak number of live accessors.
//!
//! All variants implement `queue::Queue`.
//!
//! # Examples
//!
//! ```
//! use rs_hpqueue::lockfree_queue::LockFreeQueue;
//! use rs_hpqueue::queue::Queue;
//! use rs_hpqueue::two_lock_queue::TwoLockQueue;
//!
//! fn drain<Q: Queue<u32>>(q: &mut Q) -> Vec<u32> {
//!     let mut ret = vec![];
//!     while let Some(v) = q.dequeue() {
//!         ret.push(v);
//!     }
//!     ret
//! }
//!
//! let lockfree = LockFreeQueue::new();
//! let mut accessor = lockfree.create_accessor();
//! accessor.enqueue(1);
//! accessor.enqueue(2);
//! assert_eq!(drain(&mut accessor), vec![1, 2]);
//!
//! let two_lock = TwoLockQueue::new();
//! two_lock.enqueue(3);
//! assert_eq!(drain(&mut &two_lock), vec![3]);
//! ```
//!

mod node;
pub mod baseline_queue;
pub mod error;
pub mod hazard_pointer;
pub mod lockfree_queue;
pub mod queue;
pub mod two_lock_queue;
pub mod util;

#[macro_use]
extern crate log;

#[macro_use]
extern crate cfg_if;

pub use crate::baseline_queue::BaselineQueue;
pub use crate::lockfree_queue::{LockFreeQueue, ThreadAccessor};
pub use crate::queue::Queue;
pub use crate::two_lock_queue::TwoLockQueue;
