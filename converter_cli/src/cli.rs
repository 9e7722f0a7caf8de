//! CLI argument definitions.

use std::path::PathBuf;
use std::sync::OnceLock;

/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "converter", version, about = "Power converter regulation engine demo")]
pub struct Cli {
    /// Log as JSON lines instead of pretty
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive the regulation engine against its own simulator for a fixed
    /// number of iterations and report a summary.
    Run {
        /// Path to the scenario config TOML
        #[arg(long, value_name = "FILE")]
        config: PathBuf,
        /// Number of ticks to run
        #[arg(long, default_value_t = 1000)]
        iterations: u64,
        /// Regulation mode to enter before the first tick
        #[arg(long, value_enum, default_value_t = RunMode::Current)]
        mode: RunMode,
        /// Reference value the engine is driven towards every tick
        #[arg(long, default_value_t = 0.0)]
        reference: f32,
        /// Expected cruise rate (units/s) for a smooth parabolic approach
        /// to `reference` instead of stepping to it immediately; 0 steps.
        /// Requires `reference-accel` to also be non-zero and `--mode
        /// voltage`.
        #[arg(long = "reference-rate", default_value_t = 0.0)]
        reference_rate: f32,
        /// Acceleration (units/s^2) of the approach to `reference`.
        #[arg(long = "reference-accel", default_value_t = 0.0)]
        reference_accel: f32,
        /// Pace ticks against wall-clock time at the config's iter_period
        /// instead of running as fast as possible
        #[arg(long, action = clap::ArgAction::SetTrue)]
        real_time: bool,
    },
    /// Parse and validate a scenario config without running it
    Check {
        #[arg(long, value_name = "FILE")]
        config: PathBuf,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum RunMode {
    None,
    Voltage,
    Current,
    Field,
}

impl From<RunMode> for converter_core::RegMode {
    fn from(mode: RunMode) -> Self {
        match mode {
            RunMode::None => converter_core::RegMode::None,
            RunMode::Voltage => converter_core::RegMode::Voltage,
            RunMode::Current => converter_core::RegMode::Current,
            RunMode::Field => converter_core::RegMode::Field,
        }
    }
}
