use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time counters of a [`CoalescionService`](crate::CoalescionService).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct CoalescionStats {
    /// Calls that started a new underlying operation
    pub initiated: u64,
    /// Calls that attached to an operation already in the table
    pub joined: u64,
    /// Operations that produced a value
    pub succeeded: u64,
    /// Operations that failed or panicked
    pub failed: u64,
    /// Callers whose copy of a value could not be made
    pub replicate_failures: u64,
    /// Operations started but not yet settled
    pub in_flight: u64,
}

impl CoalescionStats {
    /// Total calls that reached the table
    pub fn requests(&self) -> u64 {
        self.initiated + self.joined
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    initiated: AtomicU64,
    joined: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    replicate_failures: AtomicU64,
    in_flight: AtomicU64,
}

impl Counters {
    pub fn initiated(&self) {
        self.initiated.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    pub fn joined(&self) {
        self.joined.fetch_add(1, Ordering::Relaxed);
    }

    pub fn succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    /// Operations started and not yet succeeded or failed
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn replicate_failed(&self) {
        self.replicate_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CoalescionStats {
        CoalescionStats {
            initiated: self.initiated.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            replicate_failures: self.replicate_failures.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
        }
    }
}
