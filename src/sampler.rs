//! The fixed-quantum measurement loop run by every worker.
//!
//! A worker waits for the release barrier, runs a few uncounted warm-up
//! quanta, then fills its partition with back-to-back quanta. Each quantum
//! starts at the tick where the previous one ended, so the series tiles the
//! worker's time without gaps and a dip in one sample's count pins displaced
//! work to that window.

use std::hint::black_box;

use crate::barrier::ReleaseBarrier;
use crate::buffer::Sample;
use crate::platform::Platform;

/// Additions per work unit. One unit costs a few tens of cycles on current
/// cores, which bounds the time resolution of a quantum from below.
pub const WORK_GRAIN: u32 = 32;

/// Quanta run and thrown away before sampling starts.
pub const WARMUP_QUANTA: usize = 16;

const PAGE_SIZE: usize = 4096;

/// One fixed-cost unit of work. Every step goes through `black_box`, so the
/// compiler can neither fold the loop nor hoist it across clock reads.
#[inline(always)]
fn work_unit() {
    let mut acc: u64 = 0;
    for _ in 0..WORK_GRAIN {
        acc = black_box(acc.wrapping_add(1));
    }
    black_box(acc);
}

pub struct Sampler<'a, P: Platform> {
    platform: &'a P,
    quantum_ticks: u64,
}

impl<'a, P: Platform> Sampler<'a, P> {
    /// `quantum_ticks` below one is raised to one.
    pub fn new(platform: &'a P, quantum_ticks: u64) -> Self {
        Self {
            platform,
            quantum_ticks: quantum_ticks.max(1),
        }
    }

    /// Run work units from `start` until at least one quantum has elapsed.
    /// The clock is only checked between units, so overshoot is kept and
    /// shows up in the count. Returns the end tick and the unit count.
    #[inline(always)]
    fn quantum(&self, start: u64) -> (u64, u64) {
        let mut count: u64 = 0;
        loop {
            work_unit();
            count += 1;
            let now = self.platform.read_ticks();
            if now.wrapping_sub(start) >= self.quantum_ticks {
                return (now, count);
            }
        }
    }

    /// Prime caches and branch predictors and fault in every page of
    /// `partition`. Nothing measured here is kept.
    pub fn warmup(&self, partition: &mut [Sample]) {
        let stride = (PAGE_SIZE / std::mem::size_of::<Sample>()).max(1);
        for slot in partition.iter_mut().step_by(stride) {
            *black_box(slot) = Sample::default();
        }
        if let Some(last) = partition.last_mut() {
            *black_box(last) = Sample::default();
        }

        let mut start = self.platform.read_ticks();
        for _ in 0..WARMUP_QUANTA {
            let (end, count) = self.quantum(start);
            black_box(count);
            start = end;
        }
    }

    /// Fill `partition` with one sample per quantum, in order.
    pub fn sample_into(&self, partition: &mut [Sample]) {
        let mut start = self.platform.read_ticks();
        for slot in partition.iter_mut() {
            let (end, count) = self.quantum(start);
            *slot = Sample { tick: end, count };
            start = end;
        }
    }

    /// Wait for release, warm up, then sample. Returns `false` without
    /// touching `partition` when the run was aborted.
    pub fn run(&self, barrier: &ReleaseBarrier, partition: &mut [Sample]) -> bool {
        if !barrier.wait() {
            return false;
        }
        self.warmup(partition);
        self.sample_into(partition);
        true
    }
}
