//! The contract every queue variant implements.

/// A FIFO queue handle.
///
/// Consumers (benchmarks, tests) only depend on this trait. Handles take `&mut self`: a handle
/// belongs to one thread at a time. Variants shareable between threads hand out one handle per
/// thread: a `ThreadAccessor` for `LockFreeQueue`, a plain shared reference for `TwoLockQueue`.
pub trait Queue<T> {
    /// Add `value` at the back. Always succeeds; allocation failure is fatal.
    fn enqueue(&mut self, value: T);

    /// Remove the value at the front, or return `None` if the queue was empty at some point during
    /// the call. Never blocks waiting for data.
    fn dequeue(&mut self) -> Option<T>;
}
