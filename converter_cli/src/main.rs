#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Demo CLI for the converter regulation engine.
//!
//! This is not the "textual parameter/command shell" the engine itself
//! stays clear of: it only exercises the public tick/simulate surface —
//! load a TOML scenario, build the engine, drive it for a fixed number of
//! iterations, and print a JSON summary.

mod bridge;
mod cli;
mod summary;

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use converter_core::channel::InputStatus;
use converter_core::orchestrator::MeasurementInput;
use converter_traits::{Clock, MonotonicClock};
use eyre::WrapErr;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, RunMode, JSON_MODE};

fn main() -> eyre::Result<()> {
    let _ = color_eyre::install();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nreceived shutdown signal, stopping after the current tick");
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        eprintln!("warning: failed to install signal handler: {e}");
    }

    if let Err(e) = real_main(shutdown) {
        let json = *JSON_MODE.get().unwrap_or(&false);
        if json {
            println!("{}", serde_json::json!({ "error": e.to_string() }));
        } else {
            eprintln!("error: {e:#}");
        }
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(json: bool, log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        let _ = subscriber.json().try_init();
    } else {
        let _ = subscriber.try_init();
    }
}

fn real_main(shutdown: Arc<AtomicBool>) -> eyre::Result<()> {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    init_tracing(cli.json, &cli.log_level);

    match cli.cmd {
        Commands::Check { config } => {
            let cfg = read_config(&config)?;
            cfg.validate().wrap_err("invalid configuration")?;
            println!("{config:?}: ok");
            Ok(())
        }
        Commands::Run { config, iterations, mode, reference, reference_rate, reference_accel, real_time } => {
            let cfg = read_config(&config)?;
            cfg.validate().wrap_err("invalid configuration")?;

            let ramp_requested = reference_rate > 0.0 && reference_accel > 0.0;
            if ramp_requested && mode != RunMode::Voltage {
                return Err(eyre::eyre!(
                    "--reference-rate/--reference-accel only apply to --mode voltage: in current/field \
                     mode `v_ref` is an actuation voltage, not a reference in the mode's own units, so \
                     it can't be fed back as a ramp target"
                ));
            }

            let period = std::time::Duration::from_secs_f32(cfg.iter_period.max(0.0));
            let clock = MonotonicClock::new();

            let mut engine = bridge::build_engine(&cfg)?;
            engine.set_mode(mode.into());

            // A rate/accel-limited reference ramps smoothly towards
            // `reference` instead of stepping to it on the first tick;
            // `notify_returned` rejoins the ramp from wherever downstream
            // clipping actually left the reference. Only meaningful in
            // VOLTAGE mode, where the engine's returned `v_ref` is in the
            // same units as the commanded reference.
            let mut ramped_reference =
                ramp_requested.then(|| converter_core::refgen::Direct::new(0.0, reference_rate, reference_accel));
            if let Some(direct) = &mut ramped_reference {
                direct.set_target(reference, 0.0);
            }

            let mut report = summary::RunSummary::default();
            let mut field_meas = MeasurementInput::ok(0.0);
            let mut current_meas = MeasurementInput::ok(0.0);
            let mut voltage_meas = MeasurementInput::ok(0.0);

            for i in 0..iterations {
                if shutdown.load(Ordering::SeqCst) {
                    tracing::warn!(iteration = i, "run interrupted by shutdown signal");
                    break;
                }

                let tick_start = clock.now();
                let sim_time = f64::from(cfg.iter_period) * i as f64;

                let ref_in = match &mut ramped_reference {
                    Some(direct) => direct.gen(sim_time).1,
                    None => reference,
                };

                engine.set_measurements(field_meas, current_meas, voltage_meas);
                let tick = engine.tick(ref_in);
                report.observe(&tick);

                if let Some(direct) = &mut ramped_reference {
                    direct.notify_returned(tick.v_ref, reference_rate);
                }

                if let Some(sim_out) = engine.simulate(0.0) {
                    field_meas = to_measurement(sim_out.field);
                    current_meas = to_measurement(sim_out.current);
                    voltage_meas = to_measurement(sim_out.voltage);
                }

                if real_time {
                    let elapsed = clock.now().saturating_duration_since(tick_start);
                    clock.sleep(period.saturating_sub(elapsed));
                }
            }

            if cli.json {
                println!("{}", report.to_json());
            } else {
                println!("{report}");
            }
            Ok(())
        }
    }
}

fn to_measurement(sim: converter_core::simulator::SimMeas) -> MeasurementInput {
    match sim.status {
        converter_core::simulator::MeasStatus::Ok => MeasurementInput::ok(sim.value),
        converter_core::simulator::MeasStatus::Invalid => MeasurementInput { value: sim.value, status: InputStatus::Invalid },
    }
}

fn read_config(path: &std::path::Path) -> eyre::Result<converter_config::Config> {
    let text = fs::read_to_string(path).wrap_err_with(|| format!("read config {path:?}"))?;
    converter_config::load_toml(&text).wrap_err_with(|| format!("parse config {path:?}"))
}
