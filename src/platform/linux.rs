use std::ffi::CStr;
use std::fs;
use std::io::{self, Write};
use std::mem;

use libc::cpu_set_t;

use super::Platform;
use crate::clock;

/// Adapter for Linux: `rdtsc`-class tick counter, `CLOCK_MONOTONIC`,
/// `sched_setaffinity` and `SCHED_FIFO`.
#[derive(Debug, Default)]
pub struct LinuxPlatform;

fn clock_gettime_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    (ts.tv_sec as u64)
        .wrapping_mul(1_000_000_000)
        .wrapping_add(ts.tv_nsec as u64)
}

fn field_to_string(field: &[libc::c_char]) -> String {
    // SAFETY: uname(2) NUL-terminates every field it fills.
    unsafe { CStr::from_ptr(field.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

fn uname_line() -> io::Result<String> {
    // SAFETY: all zeroes is a valid utsname.
    let mut uts: libc::utsname = unsafe { mem::zeroed() };
    // SAFETY: uts is a valid, writable utsname.
    if unsafe { libc::uname(&mut uts) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(format!(
        "{} {} {} {} {}",
        field_to_string(&uts.sysname),
        field_to_string(&uts.nodename),
        field_to_string(&uts.release),
        field_to_string(&uts.version),
        field_to_string(&uts.machine),
    ))
}

/// Pull `model name` and `cpu MHz` out of the `/proc/cpuinfo` block whose
/// `processor` entry matches `core`.
fn cpu_description(cpuinfo: &str, core: usize) -> Vec<String> {
    let block = cpuinfo.split("\n\n").find(|block| {
        block.lines().any(|line| match line.split_once(':') {
            Some((key, value)) => {
                key.trim() == "processor" && value.trim().parse::<usize>() == Ok(core)
            }
            None => false,
        })
    });

    let Some(block) = block else {
        return Vec::new();
    };

    block
        .lines()
        .filter_map(|line| line.split_once(':'))
        .filter(|(key, _)| matches!(key.trim(), "model name" | "cpu MHz"))
        .map(|(key, value)| format!("{}: {}", key.trim(), value.trim()))
        .collect()
}

impl Platform for LinuxPlatform {
    #[inline(always)]
    fn read_ticks(&self) -> u64 {
        clock::read_counter()
    }

    fn read_nanos(&self) -> u64 {
        clock_gettime_ns()
    }

    fn bind_to_core(&self, core: usize) -> io::Result<()> {
        if core >= libc::CPU_SETSIZE as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("core {} is beyond the cpu set size", core),
            ));
        }

        // SAFETY: zero-initialized cpu_set_t is a valid value.
        let mut cpuset: cpu_set_t = unsafe { mem::zeroed() };
        // SAFETY: core is within CPU_SETSIZE, checked above.
        unsafe { libc::CPU_SET(core, &mut cpuset) };

        // 0 means the calling thread.
        // SAFETY: cpuset is a valid cpu_set_t of the size we pass.
        let result = unsafe { libc::sched_setaffinity(0, mem::size_of::<cpu_set_t>(), &cpuset) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    fn request_realtime(&self) -> io::Result<()> {
        // SAFETY: no safety requirements.
        let priority = unsafe { libc::sched_get_priority_max(libc::SCHED_FIFO) };
        if priority < 0 {
            return Err(io::Error::last_os_error());
        }
        let param = libc::sched_param {
            sched_priority: priority,
        };
        // SAFETY: param is a valid sched_param; 0 means the calling thread.
        let result = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    fn core_count(&self) -> usize {
        // SAFETY: no safety requirements.
        let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        if n < 1 {
            1
        } else {
            n as usize
        }
    }

    fn describe(&self, out: &mut dyn Write, core: usize) -> io::Result<()> {
        match uname_line() {
            Ok(line) => writeln!(out, "# uname: {}", line)?,
            Err(e) => writeln!(out, "# uname unavailable: {}", e)?,
        }
        let cpuinfo = fs::read_to_string("/proc/cpuinfo").unwrap_or_default();
        for line in cpu_description(&cpuinfo, core) {
            writeln!(out, "# {}", line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CPUINFO: &str = "processor\t: 0\nvendor_id\t: GenuineIntel\nmodel name\t: Test CPU @ 2.00GHz\ncpu MHz\t\t: 2000.000\n\nprocessor\t: 1\nvendor_id\t: GenuineIntel\nmodel name\t: Test CPU @ 2.00GHz\ncpu MHz\t\t: 1800.500\n";

    #[test]
    fn test_cpu_description_matches_core() {
        let lines = cpu_description(CPUINFO, 1);
        assert_eq!(
            lines,
            vec!["model name: Test CPU @ 2.00GHz", "cpu MHz: 1800.500"]
        );
    }

    #[test]
    fn test_cpu_description_unknown_core() {
        assert!(cpu_description(CPUINFO, 7).is_empty());
        assert!(cpu_description("", 0).is_empty());
    }

    #[test]
    fn test_clock_is_monotonic() {
        let p = LinuxPlatform;
        let a = p.read_nanos();
        let b = p.read_nanos();
        assert!(b >= a);
        let t0 = p.read_ticks();
        let t1 = p.read_ticks();
        assert!(t1 >= t0);
    }

    #[test]
    fn test_core_count_positive() {
        assert!(LinuxPlatform.core_count() >= 1);
    }

    #[test]
    fn test_bind_out_of_range_fails() {
        let err = LinuxPlatform.bind_to_core(usize::MAX).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_describe_writes_comments() {
        let mut buf = Vec::new();
        LinuxPlatform.describe(&mut buf, 0).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("# uname"));
        assert!(text.lines().all(|l| l.starts_with('#')));
    }
}
