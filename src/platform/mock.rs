use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::Platform;

/// Deterministic platform for tests. Every tick read advances the counter by
/// `tick_step`, every nanosecond read by `nanos_step`.
#[derive(Debug)]
pub struct MockPlatform {
    ticks: AtomicU64,
    nanos: AtomicU64,
    tick_step: u64,
    nanos_step: u64,
    cores: usize,
    fail_bind: bool,
    fail_core: Option<usize>,
    pub tick_reads: AtomicUsize,
    pub bind_calls: AtomicUsize,
    pub realtime_calls: AtomicUsize,
}

impl MockPlatform {
    pub fn new(tick_step: u64, nanos_step: u64) -> Self {
        Self {
            ticks: AtomicU64::new(1_000),
            nanos: AtomicU64::new(0),
            tick_step,
            nanos_step,
            cores: 4,
            fail_bind: false,
            fail_core: None,
            tick_reads: AtomicUsize::new(0),
            bind_calls: AtomicUsize::new(0),
            realtime_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_cores(mut self, cores: usize) -> Self {
        self.cores = cores;
        self
    }

    pub fn failing_bind(mut self) -> Self {
        self.fail_bind = true;
        self
    }

    /// Fail binding to `core` only.
    pub fn failing_core(mut self, core: usize) -> Self {
        self.fail_core = Some(core);
        self
    }
}

impl Platform for MockPlatform {
    fn read_ticks(&self) -> u64 {
        self.tick_reads.fetch_add(1, Ordering::Relaxed);
        self.ticks.fetch_add(self.tick_step, Ordering::Relaxed) + self.tick_step
    }

    fn read_nanos(&self) -> u64 {
        self.nanos.fetch_add(self.nanos_step, Ordering::Relaxed) + self.nanos_step
    }

    fn bind_to_core(&self, core: usize) -> io::Result<()> {
        self.bind_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_bind || self.fail_core == Some(core) {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "mock bind failure"))
        } else {
            Ok(())
        }
    }

    fn request_realtime(&self) -> io::Result<()> {
        self.realtime_calls.fetch_add(1, Ordering::Relaxed);
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "mock realtime refused"))
    }

    fn core_count(&self) -> usize {
        self.cores
    }

    fn describe(&self, out: &mut dyn Write, core: usize) -> io::Result<()> {
        writeln!(out, "# mock platform, core {}", core)
    }
}
