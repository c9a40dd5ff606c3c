use std::path::Path;

use serde::Deserialize;

use crate::error::Error;

/// Absolute upper bound on samples per thread.
pub const MAX_SAMPLES: usize = 2_000_000;
pub const DEFAULT_SAMPLES: usize = 524_288;
/// Default quantum length in nanoseconds (10 kHz sampling).
pub const DEFAULT_INTERVAL_NS: u64 = 100_000;
pub const DEFAULT_OUTNAME: &str = "ftq";

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Run settings as layered from defaults, the TOML file and the command line.
/// Nothing here has been checked yet; see [`RunSettings::validate`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub threads: usize,
    pub samples: usize,
    /// Sampling frequency in Hz; `None` keeps the default quantum.
    pub frequency: Option<u64>,
    pub outname: String,
    pub stdout: bool,
    pub ticks_per_ns: Option<f64>,
    pub ignore_wire_failures: bool,
    pub realtime: bool,
    pub argument: Option<String>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            threads: 1,
            samples: DEFAULT_SAMPLES,
            frequency: None,
            outname: DEFAULT_OUTNAME.to_string(),
            stdout: false,
            ticks_per_ns: None,
            ignore_wire_failures: false,
            realtime: false,
            argument: None,
        }
    }
}

/// Immutable configuration of one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub threads: usize,
    pub samples: usize,
    pub interval_ns: u64,
    pub outname: String,
    pub use_stdout: bool,
    /// Trusted tick ratio; `None` means calibrate at startup.
    pub ticks_per_ns: Option<f64>,
    pub ignore_wire_failures: bool,
    pub realtime: bool,
    pub argument: Option<String>,
}

impl RunConfig {
    pub fn frequency_hz(&self) -> f64 {
        NANOS_PER_SEC as f64 / self.interval_ns as f64
    }
}

/// Clamp a requested sample count to [`MAX_SAMPLES`].
pub fn clamp_samples(samples: usize) -> usize {
    samples.min(MAX_SAMPLES)
}

impl RunSettings {
    /// Check flag combinations and produce the run configuration.
    ///
    /// Runs before anything is allocated or spawned, so a rejected
    /// configuration never leaves partial output behind.
    pub fn validate(self) -> Result<RunConfig, Error> {
        if self.threads == 0 {
            return Err(Error::InvalidArgs("thread count must be greater than 0".into()));
        }
        if self.stdout && self.threads > 1 {
            return Err(Error::InvalidArgs(
                "cannot output to stdout for more than one thread".into(),
            ));
        }
        if self.samples == 0 {
            return Err(Error::InvalidArgs("sample count must be greater than 0".into()));
        }

        let samples = clamp_samples(self.samples);
        if samples != self.samples {
            log::warn!(
                "sample count {} exceeds maximum, setting count to {}",
                self.samples,
                samples
            );
        }

        let interval_ns = match self.frequency {
            None => DEFAULT_INTERVAL_NS,
            Some(0) => {
                return Err(Error::InvalidArgs("frequency must be greater than 0".into()));
            }
            Some(hz) if hz > NANOS_PER_SEC => {
                return Err(Error::InvalidArgs(format!(
                    "frequency {} Hz gives a quantum shorter than 1 ns",
                    hz
                )));
            }
            Some(hz) => NANOS_PER_SEC / hz,
        };

        let ticks_per_ns = match self.ticks_per_ns {
            // 0 asks for dynamic calibration, as with the classic -T 0.
            Some(r) if r == 0.0 => None,
            Some(r) if !r.is_finite() || r < 0.0 => {
                return Err(Error::InvalidArgs(format!("invalid ticks per ns: {}", r)));
            }
            other => other,
        };

        if !self.stdout && self.outname.is_empty() {
            return Err(Error::InvalidArgs("output name must not be empty".into()));
        }

        Ok(RunConfig {
            threads: self.threads,
            samples,
            interval_ns,
            outname: self.outname,
            use_stdout: self.stdout,
            ticks_per_ns,
            ignore_wire_failures: self.ignore_wire_failures,
            realtime: self.realtime,
            argument: self.argument,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub run: RunSettings,
}

/// Load configuration from a TOML file.
///
/// - If `explicit_path` is `Some` and the file is missing, returns an error.
/// - If `explicit_path` is `None`, tries `/etc/ftq.toml`; if missing, returns defaults.
pub fn load_config(explicit_path: Option<&Path>) -> Result<Config, Error> {
    let path = match explicit_path {
        Some(p) => {
            if !p.exists() {
                return Err(Error::InvalidArgs(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            p.to_path_buf()
        }
        None => {
            let default = Path::new("/etc/ftq.toml");
            if !default.exists() {
                return Ok(Config::default());
            }
            default.to_path_buf()
        }
    };

    let contents = std::fs::read_to_string(&path).map_err(|e| {
        Error::InvalidArgs(format!("failed to read config {}: {}", path.display(), e))
    })?;

    let config: Config = toml::from_str(&contents).map_err(|e| {
        Error::InvalidArgs(format!("failed to parse config {}: {}", path.display(), e))
    })?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_values() {
        let cfg = RunSettings::default().validate().unwrap();
        assert_eq!(cfg.threads, 1);
        assert_eq!(cfg.samples, DEFAULT_SAMPLES);
        assert_eq!(cfg.interval_ns, DEFAULT_INTERVAL_NS);
        assert_eq!(cfg.outname, "ftq");
        assert!(!cfg.use_stdout);
        assert!(cfg.ticks_per_ns.is_none());
        assert!(!cfg.ignore_wire_failures);
        assert!(!cfg.realtime);
        assert!((cfg.frequency_hz() - 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_clamp_samples() {
        assert_eq!(clamp_samples(100), 100);
        assert_eq!(clamp_samples(MAX_SAMPLES), MAX_SAMPLES);
        assert_eq!(clamp_samples(MAX_SAMPLES + 1), MAX_SAMPLES);
        assert_eq!(clamp_samples(usize::MAX), MAX_SAMPLES);
    }

    #[test]
    fn test_clamp_is_idempotent() {
        for n in [0, 1, 5000, MAX_SAMPLES, MAX_SAMPLES * 3] {
            assert_eq!(clamp_samples(clamp_samples(n)), clamp_samples(n));
        }
    }

    #[test]
    fn test_validate_clamps_samples() {
        let cfg = RunSettings {
            samples: MAX_SAMPLES * 2,
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(cfg.samples, MAX_SAMPLES);
    }

    #[test]
    fn test_stdout_with_threads_rejected() {
        let result = RunSettings {
            threads: 2,
            stdout: true,
            ..Default::default()
        }
        .validate();
        let msg = format!("{}", result.unwrap_err());
        assert!(msg.contains("stdout"));
    }

    #[test]
    fn test_stdout_single_thread_accepted() {
        let cfg = RunSettings {
            stdout: true,
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert!(cfg.use_stdout);
    }

    #[test]
    fn test_frequency_to_interval() {
        let cfg = RunSettings {
            frequency: Some(1000),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(cfg.interval_ns, 1_000_000);
        assert!((cfg.frequency_hz() - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let zero_threads = RunSettings {
            threads: 0,
            ..Default::default()
        };
        assert!(zero_threads.validate().is_err());

        let zero_samples = RunSettings {
            samples: 0,
            ..Default::default()
        };
        assert!(zero_samples.validate().is_err());

        let zero_freq = RunSettings {
            frequency: Some(0),
            ..Default::default()
        };
        assert!(zero_freq.validate().is_err());

        let huge_freq = RunSettings {
            frequency: Some(2_000_000_000),
            ..Default::default()
        };
        assert!(huge_freq.validate().is_err());

        let negative_ratio = RunSettings {
            ticks_per_ns: Some(-1.0),
            ..Default::default()
        };
        assert!(negative_ratio.validate().is_err());

        let nan_ratio = RunSettings {
            ticks_per_ns: Some(f64::NAN),
            ..Default::default()
        };
        assert!(nan_ratio.validate().is_err());
    }

    #[test]
    fn test_zero_ratio_means_calibrate() {
        let cfg = RunSettings {
            ticks_per_ns: Some(0.0),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert!(cfg.ticks_per_ns.is_none());

        let cfg = RunSettings {
            ticks_per_ns: Some(2.5),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(cfg.ticks_per_ns, Some(2.5));
    }

    #[test]
    fn test_toml_parsing() {
        let dir = std::env::temp_dir();
        let path = dir.join("ftq_test_config.toml");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            write!(
                f,
                r#"
[run]
threads = 4
frequency = 2000
outname = "noise"
ignore_wire_failures = true
"#
            )
            .unwrap();
        }
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.run.threads, 4);
        assert_eq!(config.run.frequency, Some(2000));
        assert_eq!(config.run.outname, "noise");
        assert!(config.run.ignore_wire_failures);
        // Unset fields should get defaults
        assert_eq!(config.run.samples, DEFAULT_SAMPLES);
        assert!(!config.run.realtime);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_explicit_config_errors() {
        let path = std::path::Path::new("/tmp/ftq_nonexistent_config.toml");
        let result = load_config(Some(path));
        assert!(result.is_err());
    }
}
