//! Definition of error and status.

use std::error::Error;
use std::fmt;

/// Failure of a queue operation. Running out of elements is not an error: `dequeue` returns
/// `None` for that. CAS contention is retried internally and never surfaces either, so the only
/// remaining failures are allocation failures.
#[derive(PartialEq, Copy, Clone, Debug)]
pub enum Status {
    /// A queue node could not be allocated
    NodeAllocFailed,
    /// A hazard record could not be allocated
    RecordAllocFailed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Error for Status {}
