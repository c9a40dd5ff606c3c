use std::path::PathBuf;

use clap::Parser;

use crate::logging::LogArgs;

#[derive(Debug, Parser)]
#[command(
    name = "ftq",
    about = "Fixed Time Quantum microbenchmark: measures per-core platform noise"
)]
pub struct Cli {
    /// Number of threads, one per core (default: 1)
    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,

    /// Samples per thread (default: 524288, at most 2000000)
    #[arg(short = 'n', long = "numsamples")]
    pub numsamples: Option<usize>,

    /// Sample frequency in Hz; the quantum is 1e9/frequency ns (default: 10000)
    #[arg(short = 'f', long = "frequency")]
    pub frequency: Option<u64>,

    /// Output file prefix (default: ftq)
    #[arg(short = 'o', long = "outname")]
    pub outname: Option<String>,

    /// Write single-thread results to stdout
    #[arg(short = 's', long = "stdout")]
    pub stdout: bool,

    /// Ticks per nanosecond; skips dynamic clock calibration
    #[arg(short = 'T', long = "ticksperns")]
    pub ticksperns: Option<f64>,

    /// Ignore failures to wire threads to cores (results may be flaky)
    #[arg(short = 'w', long = "ignore_wire_failures")]
    pub ignore_wire_failures: bool,

    /// Request realtime scheduling for worker threads
    #[arg(short = 'r', long = "realtime")]
    pub realtime: bool,

    /// Opaque test argument, passed through untouched
    #[arg(short = 'a', long = "argument")]
    pub argument: Option<String>,

    /// Configuration file path (default: /etc/ftq.toml)
    #[arg(long = "config")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub log: LogArgs,
}
