use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use crate::buffer::Sample;
use crate::config::RunConfig;
use crate::error::Error;
use crate::platform::Platform;
use crate::run::{RunReport, WorkerOutcome};

/// `<prefix>_<index>.dat`
pub fn output_path(prefix: &str, index: usize) -> PathBuf {
    PathBuf::from(format!("{}_{}.dat", prefix, index))
}

/// Round to `digits` significant digits, like printf's `%g`.
fn significant(value: f64, digits: i32) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let scale = 10f64.powi(digits - 1 - value.abs().log10().floor() as i32);
    (value * scale).round() / scale
}

fn write_header<P: Platform>(
    out: &mut dyn Write,
    config: &RunConfig,
    report: &RunReport,
    worker: &WorkerOutcome,
    platform: &P,
) -> io::Result<()> {
    let hz = config.frequency_hz();
    writeln!(out, "# Frequency {:.6}", hz)?;
    writeln!(out, "# Ticks per ns: {}", significant(report.ratio.ticks_per_ns(), 6))?;
    writeln!(out, "# octave: pkg load signal")?;
    writeln!(out, "# x = load(<file name>)")?;
    writeln!(out, "# pwelch(x(:,2),[],[],[],{:.6})", hz)?;
    writeln!(out, "# core {}", worker.core)?;
    if !worker.bound {
        writeln!(out, "# Warning: not wired to this core; results may be flaky")?;
    }
    platform.describe(out, worker.core)
}

/// One `<elapsed-ns> <count>` line per sample, shifted so the first
/// sample sits at zero.
fn write_series(out: &mut dyn Write, partition: &[Sample], ns_per_tick: f64) -> io::Result<()> {
    let Some(base) = partition.first().map(|s| s.tick) else {
        return Ok(());
    };
    for sample in partition {
        let elapsed = (ns_per_tick * sample.tick.wrapping_sub(base) as f64) as u64;
        writeln!(out, "{} {}", elapsed, sample.count)?;
    }
    Ok(())
}

fn write_worker<P: Platform>(
    out: &mut dyn Write,
    config: &RunConfig,
    report: &RunReport,
    worker: &WorkerOutcome,
    partition: &[Sample],
    platform: &P,
) -> io::Result<()> {
    write_header(out, config, report, worker, platform)?;
    write_series(out, partition, report.ns_per_tick)?;
    out.flush()
}

/// Write every worker's series: to stdout for `-s`, otherwise one file per
/// worker. Returns the files written.
pub fn write_report<P: Platform>(
    report: &RunReport,
    config: &RunConfig,
    platform: &P,
) -> Result<Vec<PathBuf>, Error> {
    if config.use_stdout {
        let stdout = io::stdout();
        let mut out = BufWriter::new(stdout.lock());
        for (worker, partition) in report.workers.iter().zip(report.buffer.partitions()) {
            write_worker(&mut out, config, report, worker, partition, platform)?;
        }
        return Ok(Vec::new());
    }

    let mut written = Vec::with_capacity(report.workers.len());
    for (worker, partition) in report.workers.iter().zip(report.buffer.partitions()) {
        let path = output_path(&config.outname, worker.index);
        let file = File::create(&path).map_err(|e| {
            Error::Io(io::Error::new(
                e.kind(),
                format!("can not create file {}: {}", path.display(), e),
            ))
        })?;
        let mut out = BufWriter::new(file);
        write_worker(&mut out, config, report, worker, partition, platform)?;
        log::debug!("wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}
