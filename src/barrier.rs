use std::hint;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// One-shot start flag shared by every worker.
///
/// Waiters spin instead of blocking: a blocked waiter's wake-up latency
/// would show up in the very series it is about to measure.
///
/// Workers [`arrive`](Self::arrive) once their setup is done so the
/// orchestrator can hold the release until every one of them is ready. A
/// worker whose setup failed calls [`abort`](Self::abort) first, and the
/// others then skip sampling once released.
#[derive(Debug, Default)]
pub struct ReleaseBarrier {
    released: AtomicBool,
    aborted: AtomicBool,
    arrived: AtomicUsize,
}

impl ReleaseBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that one more worker has finished its setup.
    pub fn arrive(&self) {
        self.arrived.fetch_add(1, Ordering::AcqRel);
    }

    /// Number of workers that have arrived so far.
    pub fn arrived(&self) -> usize {
        self.arrived.load(Ordering::Acquire)
    }

    /// Mark the run as failed. Must happen before the caller arrives.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    /// Spin until [`release`](Self::release) has been called. Returns
    /// `false` if the run was aborted, in which case nothing should be
    /// sampled.
    #[inline]
    pub fn wait(&self) -> bool {
        while !self.released.load(Ordering::Acquire) {
            hint::spin_loop();
        }
        !self.aborted.load(Ordering::Acquire)
    }

    /// Set the flag. Returns `false` if it had already been set.
    pub fn release(&self) -> bool {
        !self.released.swap(true, Ordering::Release)
    }
}
