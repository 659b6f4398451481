//! Admission gate bounding how many probes run at once.
//!
//! The gate is a fixed-capacity atomic counter. Acquisition never waits: a
//! request either takes a slot immediately, is told the gate is busy, or is
//! found to have been cancelled by its caller before the slot was taken.
//! Slots are RAII guards, so every admitted request releases exactly once on
//! any exit path (return, error, panic unwind, or the future being dropped).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Result of a non-blocking admission attempt
#[derive(Debug)]
pub enum Admission {
    /// A slot was taken; it is released when the `Slot` is dropped
    Admitted(Slot),
    /// Every slot is in use
    Busy,
    /// The caller cancelled before a slot was taken
    CallerGone,
}

/// Process-wide bounded pool of probe slots. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    inner: Arc<GateInner>,
}

#[derive(Debug)]
struct GateInner {
    capacity: usize,
    in_use: AtomicUsize,
}

impl AdmissionGate {
    /// Create a gate with `capacity` slots. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(GateInner {
                capacity: capacity.max(1),
                in_use: AtomicUsize::new(0),
            }),
        }
    }

    /// Try to take a slot without waiting.
    ///
    /// Cancellation is checked immediately before each compare-and-swap, so a
    /// caller that has gone away is never admitted and never reported busy.
    pub fn try_acquire(&self, cancel: &CancellationToken) -> Admission {
        let mut current = self.inner.in_use.load(Ordering::Acquire);
        loop {
            if cancel.is_cancelled() {
                return Admission::CallerGone;
            }
            if current >= self.inner.capacity {
                return Admission::Busy;
            }
            match self.inner.in_use.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Admission::Admitted(Slot {
                        gate: Arc::clone(&self.inner),
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Slots currently held
    pub fn in_use(&self) -> usize {
        self.inner.in_use.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.capacity().saturating_sub(self.in_use())
    }
}

/// A held admission slot. Not cloneable; dropping it frees the slot.
#[derive(Debug)]
pub struct Slot {
    gate: Arc<GateInner>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.gate.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}
