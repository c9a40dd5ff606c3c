use std::io::{self, Write};
use std::sync::OnceLock;
use std::thread;
use std::time::Instant;

use super::Platform;
use crate::clock;

/// Adapter for targets without a dedicated one. Thread wiring and realtime
/// scheduling are reported as unsupported, so runs here need `-w`.
#[derive(Debug, Default)]
pub struct PortablePlatform;

fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

impl Platform for PortablePlatform {
    #[inline(always)]
    fn read_ticks(&self) -> u64 {
        clock::read_counter()
    }

    fn read_nanos(&self) -> u64 {
        epoch().elapsed().as_nanos() as u64
    }

    fn bind_to_core(&self, _core: usize) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "thread wiring is not supported on this platform",
        ))
    }

    fn request_realtime(&self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "realtime scheduling is not supported on this platform",
        ))
    }

    fn core_count(&self) -> usize {
        thread::available_parallelism().map_or(1, |n| n.get())
    }

    fn describe(&self, out: &mut dyn Write, core: usize) -> io::Result<()> {
        writeln!(
            out,
            "# os: {} {} ({} cores, core {})",
            std::env::consts::OS,
            std::env::consts::ARCH,
            self.core_count(),
            core
        )
    }
}
