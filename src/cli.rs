//! CLI argument parsing for blockprof

use crate::config::DEFAULT_CALIBRATION_MS;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// How the demo workloads are driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DemoMode {
    /// Run every workload once and report the profiler (default)
    Single,
    /// Repeat the bandwidth workload and report statistics
    Fixed,
    /// Search for the fastest run of each workload within time budgets
    BestOf,
}

#[derive(Parser, Debug)]
#[command(name = "blockprof")]
#[command(version)]
#[command(about = "Instrumentation block profiler: CPU timer calibration and demo workloads", long_about = None)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Estimate the CPU timer frequency against the OS clock
    Calibrate {
        /// Busy-wait duration in milliseconds
        #[arg(long, value_name = "MS", default_value_t = DEFAULT_CALIBRATION_MS)]
        ms: u64,
    },
    /// Run the built-in instrumented workloads
    Demo(DemoArgs),
}

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// How to drive the workloads
    #[arg(long, value_enum, default_value = "single")]
    pub mode: DemoMode,

    /// Repetitions for --mode fixed
    #[arg(short = 'n', long, default_value_t = 100)]
    pub repetitions: usize,

    /// Number of u64 elements each workload fills
    #[arg(long, default_value_t = 8192)]
    pub elements: usize,

    /// Per-test budget for --mode best-of, restarted on every new best
    #[arg(long = "per-test-timeout", value_name = "SECONDS", default_value_t = 1.0)]
    pub per_test_timeout: f64,

    /// Global budget for --mode best-of
    #[arg(long = "global-timeout", value_name = "SECONDS", default_value_t = 3.0)]
    pub global_timeout: f64,

    /// Export CSV: a file for --mode single, a directory otherwise
    #[arg(long, value_name = "PATH")]
    pub csv: Option<PathBuf>,

    /// Export JSON to this file
    #[arg(long, value_name = "FILE")]
    pub json: Option<PathBuf>,

    /// Do not sample the OS page-fault counter
    #[arg(long = "no-page-faults")]
    pub no_page_faults: bool,

    /// CPU frequency calibration busy-wait in milliseconds
    #[arg(long = "calibration-ms", value_name = "MS", default_value_t = DEFAULT_CALIBRATION_MS)]
    pub calibration_ms: u64,
}
