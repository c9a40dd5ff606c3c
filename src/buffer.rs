//! Flat sample storage split into one exclusive partition per worker.

use std::fmt;
use std::ptr::NonNull;
use std::slice::{ChunksExact, ChunksExactMut};

use crate::error::Error;

/// One quantum's result: the tick at which it ended and the number of work
/// units it completed.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sample {
    pub tick: u64,
    pub count: u64,
}

/// Where the samples live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    /// Locked and pre-faulted anonymous mapping.
    Locked,
    /// Ordinary heap allocation; page faults may land inside quanta.
    Heap,
}

enum Storage {
    Locked { ptr: NonNull<Sample>, len: usize },
    Heap(Vec<Sample>),
}

/// `samples * threads` zeroed samples. Worker `j` owns
/// `[j * samples, (j + 1) * samples)`.
pub struct SampleBuffer {
    storage: Storage,
    samples: usize,
    threads: usize,
}

impl SampleBuffer {
    /// Allocate storage for `threads` partitions of `samples` each.
    ///
    /// A locked, pre-faulted mapping is tried first; if the OS refuses,
    /// ordinary heap memory is used instead.
    pub fn allocate(samples: usize, threads: usize) -> Result<Self, Error> {
        if samples == 0 || threads == 0 {
            return Err(Error::InvalidArgs(
                "sample buffer needs at least one sample and one thread".into(),
            ));
        }
        let len = samples
            .checked_mul(threads)
            .filter(|len| {
                len.checked_mul(std::mem::size_of::<Sample>())
                    .is_some_and(|bytes| bytes <= isize::MAX as usize)
            })
            .ok_or_else(|| {
                Error::InvalidArgs(format!(
                    "{} samples x {} threads does not fit in memory",
                    samples, threads
                ))
            })?;

        let storage = match map_locked(len) {
            Ok(ptr) => Storage::Locked { ptr, len },
            Err(e) => {
                log::warn!(
                    "failed to lock sample buffer in memory ({}), falling back to heap; \
                     page faults may show up as noise",
                    e
                );
                Storage::Heap(vec![Sample::default(); len])
            }
        };

        let mut buffer = Self {
            storage,
            samples,
            threads,
        };
        // in case the mapping was not populated
        buffer.as_mut_slice().fill(Sample::default());
        Ok(buffer)
    }

    pub fn backing(&self) -> Backing {
        match self.storage {
            Storage::Locked { .. } => Backing::Locked,
            Storage::Heap(_) => Backing::Heap,
        }
    }

    pub fn samples_per_thread(&self) -> usize {
        self.samples
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    fn as_slice(&self) -> &[Sample] {
        match &self.storage {
            // SAFETY: ptr points at len initialized samples owned by self.
            Storage::Locked { ptr, len } => unsafe {
                std::slice::from_raw_parts(ptr.as_ptr(), *len)
            },
            Storage::Heap(v) => v.as_slice(),
        }
    }

    fn as_mut_slice(&mut self) -> &mut [Sample] {
        match &mut self.storage {
            // SAFETY: ptr points at len initialized samples owned by self,
            // and &mut self guarantees exclusivity.
            Storage::Locked { ptr, len } => unsafe {
                std::slice::from_raw_parts_mut(ptr.as_ptr(), *len)
            },
            Storage::Heap(v) => v.as_mut_slice(),
        }
    }

    /// Read-only view of one worker's samples.
    pub fn partition(&self, thread: usize) -> &[Sample] {
        let start = thread * self.samples;
        &self.as_slice()[start..start + self.samples]
    }

    /// Read-only views of every partition, in worker order.
    pub fn partitions(&self) -> ChunksExact<'_, Sample> {
        let samples = self.samples;
        self.as_slice().chunks_exact(samples)
    }

    /// Split the buffer into its disjoint per-worker partitions, in worker order.
    pub fn partitions_mut(&mut self) -> ChunksExactMut<'_, Sample> {
        let samples = self.samples;
        self.as_mut_slice().chunks_exact_mut(samples)
    }
}

impl fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("backing", &self.backing())
            .field("samples_per_thread", &self.samples)
            .field("threads", &self.threads)
            .finish()
    }
}

impl Drop for SampleBuffer {
    fn drop(&mut self) {
        if let Storage::Locked { ptr, len } = self.storage {
            unmap(ptr, len);
        }
    }
}

#[cfg(target_os = "linux")]
fn map_locked(len: usize) -> std::io::Result<NonNull<Sample>> {
    let bytes = len * std::mem::size_of::<Sample>();
    // SAFETY: anonymous private mapping, no file descriptor involved.
    let addr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            bytes,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_ANONYMOUS | libc::MAP_PRIVATE | libc::MAP_POPULATE | libc::MAP_LOCKED,
            -1,
            0,
        )
    };
    if addr == libc::MAP_FAILED {
        return Err(std::io::Error::last_os_error());
    }
    NonNull::new(addr.cast::<Sample>())
        .ok_or_else(|| std::io::Error::other("mmap returned a null mapping"))
}

#[cfg(not(target_os = "linux"))]
fn map_locked(_len: usize) -> std::io::Result<NonNull<Sample>> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "locked mappings are not supported on this platform",
    ))
}

#[cfg(target_os = "linux")]
fn unmap(ptr: NonNull<Sample>, len: usize) {
    // SAFETY: ptr and len describe a mapping created by map_locked.
    unsafe {
        libc::munmap(ptr.as_ptr().cast(), len * std::mem::size_of::<Sample>());
    }
}

#[cfg(not(target_os = "linux"))]
fn unmap(_ptr: NonNull<Sample>, _len: usize) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_is_zeroed() {
        let buffer = SampleBuffer::allocate(128, 3).unwrap();
        assert_eq!(buffer.samples_per_thread(), 128);
        assert_eq!(buffer.threads(), 3);
        assert!(buffer.partitions().all(|p| p.iter().all(|s| *s == Sample::default())));
    }

    #[test]
    fn test_partitions_are_disjoint_and_ordered() {
        let mut buffer = SampleBuffer::allocate(10, 4).unwrap();
        let parts: Vec<&mut [Sample]> = buffer.partitions_mut().collect();
        assert_eq!(parts.len(), 4);
        for (j, part) in parts.into_iter().enumerate() {
            assert_eq!(part.len(), 10);
            for (i, s) in part.iter_mut().enumerate() {
                *s = Sample {
                    tick: j as u64,
                    count: i as u64,
                };
            }
        }

        for j in 0..4 {
            let part = buffer.partition(j);
            assert!(part.iter().all(|s| s.tick == j as u64));
            assert_eq!(part[9].count, 9);
        }
    }

    #[test]
    fn test_debug_shows_layout() {
        let buffer = SampleBuffer::allocate(16, 2).unwrap();
        let text = format!("{:?}", buffer);
        assert!(text.contains("samples_per_thread: 16"));
        assert!(text.contains("threads: 2"));
    }

    #[test]
    fn test_zero_sized_rejected() {
        assert!(SampleBuffer::allocate(0, 1).is_err());
        assert!(SampleBuffer::allocate(1, 0).is_err());
    }

    #[test]
    fn test_overflow_rejected() {
        assert!(SampleBuffer::allocate(usize::MAX / 2, 4).is_err());
    }

    #[test]
    fn test_backing_reported() {
        let buffer = SampleBuffer::allocate(16, 1).unwrap();
        // either backing is valid depending on RLIMIT_MEMLOCK
        assert!(matches!(buffer.backing(), Backing::Locked | Backing::Heap));
        assert_eq!(buffer.partition(0).len(), 16);
    }
}
