mod barrier;
mod buffer;
mod cli;
mod clock;
mod config;
mod error;
mod logging;
mod output;
mod platform;
mod run;
mod sampler;

use std::path::Path;
use std::process;

use clap::Parser;

use cli::Cli;
use config::RunSettings;
use platform::NativePlatform;

/// Build the run settings by layering: defaults → TOML file → CLI overrides.
fn build_settings(config_file: Option<&Path>, cli: &Cli) -> RunSettings {
    let mut settings = match config::load_config(config_file) {
        Ok(c) => c.run,
        Err(e) => {
            log::warn!("{}", e);
            RunSettings::default()
        }
    };

    // Apply CLI overrides (only if explicitly set)
    if let Some(v) = cli.threads {
        settings.threads = v;
    }
    if let Some(v) = cli.numsamples {
        settings.samples = v;
    }
    if let Some(v) = cli.frequency {
        settings.frequency = Some(v);
    }
    if let Some(ref v) = cli.outname {
        settings.outname = v.clone();
    }
    if cli.stdout {
        settings.stdout = true;
    }
    if let Some(v) = cli.ticksperns {
        settings.ticks_per_ns = Some(v);
    }
    if cli.ignore_wire_failures {
        settings.ignore_wire_failures = true;
    }
    if cli.realtime {
        settings.realtime = true;
    }
    if let Some(ref v) = cli.argument {
        settings.argument = Some(v.clone());
    }

    settings
}

fn main() {
    let cli = Cli::parse();
    logging::init(&cli.log);

    let settings = build_settings(cli.config_file.as_deref(), &cli);
    let config = match settings.validate() {
        Ok(c) => c,
        Err(e) => {
            log::error!("{}", e);
            process::exit(1);
        }
    };

    let platform = NativePlatform::default();
    let report = match run::run(&config, &platform) {
        Ok(r) => r,
        Err(e) => {
            log::error!("{}", e);
            process::exit(1);
        }
    };

    if let Err(e) = output::write_report(&report, &config, &platform) {
        log::error!("error writing output: {}", e);
        process::exit(1);
    }
}
