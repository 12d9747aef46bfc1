//! Small helpers shared by the queues: cache line padding, spin hint and wall clock.

extern crate time;

use std::hint;
use std::ops::{Deref, DerefMut};

cfg_if! {
    if #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))] {
        /// Pads and aligns `T` to the cache line size, so that words written by different threads
        /// (for example `head` and `tail` of a queue) do not suffer from
        /// [`False sharing`](https://en.wikipedia.org/wiki/False_sharing). Adjacent line prefetch
        /// on these targets pulls cache lines in pairs, hence 128 bytes.
        #[repr(align(128))]
        pub struct CachePadded<T>(pub T);
    } else {
        /// Pads and aligns `T` to the cache line size, so that words written by different threads
        /// (for example `head` and `tail` of a queue) do not suffer from
        /// [`False sharing`](https://en.wikipedia.org/wiki/False_sharing).
        #[repr(align(64))]
        pub struct CachePadded<T>(pub T);
    }
}

impl<T> CachePadded<T> {
    pub const fn new(t: T) -> Self {
        CachePadded(t)
    }
}

impl<T> Default for CachePadded<T>
where
    T: Default,
{
    fn default() -> Self {
        CachePadded(T::default())
    }
}

impl<T> Deref for CachePadded<T> {
    type Target = T;

    fn deref(&self) -> &<Self as Deref>::Target {
        &self.0
    }
}

impl<T> DerefMut for CachePadded<T> {
    fn deref_mut(&mut self) -> &mut <Self as Deref>::Target {
        &mut self.0
    }
}

/// Current wall clock time in microseconds.
pub fn get_cur_microseconds_time() -> i64 {
    let timespec = time::get_time();
    timespec.sec * 1_000_000 + timespec.nsec as i64 / 1_000
}

/// Spin hint between two failed CAS rounds.
#[inline]
pub fn pause() {
    hint::spin_loop();
}

#[cfg(test)]
mod test {
    use super::*;
    use std::mem;

    #[test]
    fn test_cache_padded() {
        let a = [CachePadded::new(1u8), CachePadded::new(2u8)];
        let addr_0 = &a[0] as *const _ as usize;
        let addr_1 = &a[1] as *const _ as usize;
        assert!(addr_1 - addr_0 >= 64);
        assert_eq!(addr_0 % mem::align_of::<CachePadded<u8>>(), 0);
        assert_eq!(*a[1], 2);
    }

    #[test]
    fn test_time() {
        let t1 = get_cur_microseconds_time();
        let t2 = get_cur_microseconds_time();
        assert!(t1 > 0);
        assert!(t2 >= t1);
    }
}
