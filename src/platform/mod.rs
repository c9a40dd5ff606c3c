//! Operating system capabilities the sampler depends on.
//!
//! The engine and the orchestrator are generic over [`Platform`]; each
//! supported OS provides one adapter and [`NativePlatform`] names the one
//! compiled for the build target.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(test)]
pub mod mock;
#[cfg(not(target_os = "linux"))]
mod portable;

use std::io::{self, Write};

#[cfg(target_os = "linux")]
pub use linux::LinuxPlatform as NativePlatform;
#[cfg(not(target_os = "linux"))]
pub use portable::PortablePlatform as NativePlatform;

pub trait Platform: Sync {
    /// Raw hardware tick counter. Called between every work unit, so it must
    /// stay a handful of cycles.
    fn read_ticks(&self) -> u64;

    /// Monotonic wall clock in nanoseconds.
    fn read_nanos(&self) -> u64;

    /// Pin the calling thread to one logical core.
    fn bind_to_core(&self, core: usize) -> io::Result<()>;

    /// Ask for realtime scheduling of the calling thread.
    fn request_realtime(&self) -> io::Result<()>;

    /// Number of logical cores available for wiring.
    fn core_count(&self) -> usize;

    /// Write `#`-commented lines describing the OS and the given core.
    fn describe(&self, out: &mut dyn Write, core: usize) -> io::Result<()>;
}
