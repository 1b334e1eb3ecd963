use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Result, TcLensError};

/// Ceiling used when none (or zero) is configured.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Counting limiter bounding the number of HTTP calls in flight for one
/// client, with a gauge of current and peak occupancy.
#[derive(Clone, Debug)]
pub struct CapacityGate {
    inner: Arc<GateInner>,
}

#[derive(Debug)]
struct GateInner {
    semaphore: Arc<Semaphore>,
    ceiling: usize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Slot held for the duration of one call; released on drop.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    gate: Arc<GateInner>,
}

impl CapacityGate {
    pub fn new(ceiling: usize) -> Self {
        let ceiling = if ceiling == 0 {
            DEFAULT_CONCURRENCY
        } else {
            ceiling
        };

        Self {
            inner: Arc::new(GateInner {
                semaphore: Arc::new(Semaphore::new(ceiling)),
                ceiling,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
        }
    }

    /// Waits for a free slot.
    ///
    /// # Errors
    ///
    /// Returns `DispatcherClosed` once the gate has been closed.
    pub async fn acquire(&self) -> Result<GatePermit> {
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| TcLensError::DispatcherClosed)?;

        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak.fetch_max(now, Ordering::SeqCst);

        Ok(GatePermit {
            _permit: permit,
            gate: Arc::clone(&self.inner),
        })
    }

    pub fn ceiling(&self) -> usize {
        self.inner.ceiling
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of slots ever held at the same time.
    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }

    pub fn close(&self) {
        self.inner.semaphore.close();
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
