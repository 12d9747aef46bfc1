#![allow(dead_code)]

use rand::Rng;
use rs_hpqueue::queue::Queue;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Value carrying a redundant checksum, so reading a freed or overwritten node shows up as a
/// broken `sum`.
pub struct QueueValue<'a> {
    pub a: u64,
    pub b: u64,
    pub sum: u64,
    live: &'a AtomicUsize,
}

impl<'a> QueueValue<'a> {
    pub fn new(tag: u64, live: &'a AtomicUsize) -> Self {
        live.fetch_add(1, Ordering::Relaxed);
        QueueValue {
            a: tag,
            b: tag.wrapping_mul(2).wrapping_add(0x9e37_79b9),
            sum: tag.wrapping_mul(3).wrapping_add(0x9e37_79b9),
            live,
        }
    }

    /// Check the value is intact and return its tag.
    pub fn check(&self) -> u64 {
        assert_eq!(self.a.wrapping_add(self.b), self.sum);
        self.a
    }
}

impl<'a> Drop for QueueValue<'a> {
    fn drop(&mut self) {
        self.check();
        self.live.fetch_sub(1, Ordering::Relaxed);
    }
}

pub fn init_log() {
    let _ = env_logger::try_init();
}

pub fn cpu_count() -> usize {
    core_affinity::get_core_ids().map_or(1, |cpus| cpus.len())
}

pub fn set_cpu_affinity(idx: usize) {
    if let Some(cpus) = core_affinity::get_core_ids() {
        if !cpus.is_empty() {
            core_affinity::set_for_current(cpus[idx % cpus.len()]);
        }
    }
}

/// Enqueue `count` values tagged `base..base + count`, dequeuing once after every other enqueue.
/// Returns the tags dequeued.
pub fn mixed_worker<'a, Q>(q: &mut Q, base: u64, count: u64, live: &'a AtomicUsize) -> Vec<u64>
where
    Q: Queue<QueueValue<'a>>,
{
    let mut ret = vec![];
    for i in 0..count {
        q.enqueue(QueueValue::new(base + i, live));
        if i % 2 == 1 {
            if let Some(v) = q.dequeue() {
                ret.push(v.check());
            }
        }
    }
    ret
}

/// Dequeue until empty, returning the tags.
pub fn drain<'a, Q>(q: &mut Q) -> Vec<u64>
where
    Q: Queue<QueueValue<'a>>,
{
    let mut ret = vec![];
    while let Some(v) = q.dequeue() {
        ret.push(v.check());
    }
    ret
}

/// Every tag in `0..total` exactly once.
pub fn assert_conserved(mut tags: Vec<u64>, total: u64) {
    assert_eq!(tags.len() as u64, total);
    tags.sort_unstable();
    for (i, tag) in tags.into_iter().enumerate() {
        assert_eq!(i as u64, tag);
    }
}

/// The single-thread scenario: enqueue 1,3,5,7,9,77, dequeue two, enqueue 8, dequeue the rest.
pub fn scenario<Q: Queue<i32>>(q: &mut Q) {
    for v in &[1, 3, 5, 7, 9, 77] {
        q.enqueue(*v);
    }
    assert_eq!(q.dequeue(), Some(1));
    assert_eq!(q.dequeue(), Some(3));
    q.enqueue(8);
    for v in &[5, 7, 9, 77, 8] {
        assert_eq!(q.dequeue(), Some(*v));
    }
    assert_eq!(q.dequeue(), None);
}

/// A random operation sequence: an even number enqueues, an odd one dequeues.
pub fn random_ops(len: usize) -> Vec<u32> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen()).collect()
}

/// Run `ops` against `q`. Returns the sum of the values enqueued minus the sum dequeued.
pub fn random_worker<Q: Queue<i64>>(q: &mut Q, ops: &[u32]) -> i64 {
    let mut sum = 0;
    for &r in ops {
        if r % 2 == 0 {
            let x = (r % 37) as i64;
            q.enqueue(x);
            sum += x;
        } else if let Some(x) = q.dequeue() {
            sum -= x;
        }
    }
    sum
}

/// Dequeue until empty, returning the sum of the values.
pub fn drain_sum<Q: Queue<i64>>(q: &mut Q) -> i64 {
    let mut sum = 0;
    while let Some(x) = q.dequeue() {
        sum += x;
    }
    sum
}
