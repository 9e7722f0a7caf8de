//! Turns a validated `converter_config::Config` into the runtime types
//! `converter_core` actually ticks.

use converter_config::{
    ActuationCfg, ChannelCfg, Config, RefClipCfg, RstAlgorithmCfg, RstCfg, SimulatorCfg,
};
use converter_core::builder::{ChannelConfig, ConverterEngineBuilder};
use converter_core::limits::RefClip;
use converter_core::load::LoadModel;
use converter_core::rst::RstAlgorithm;
use converter_core::simulator::{Actuation, MeasChannel, Simulator, VoltageSource};
use converter_core::ConverterEngine;
use eyre::{Result, WrapErr};

fn channel_config(cfg: &ChannelCfg) -> ChannelConfig {
    ChannelConfig {
        pos: cfg.limits.pos,
        neg: cfg.limits.neg,
        low: cfg.limits.low,
        zero: cfg.limits.zero,
        invert: cfg.limits.invert,
        rms_warning: cfg.limits.rms_warning,
        rms_fault: cfg.limits.rms_fault,
        rms_tc: cfg.limits.rms_tc,
        fir_lengths: [cfg.filter.fir_len0, cfg.filter.fir_len1],
        extrapolation_len_iters: cfg.filter.extrapolation_len_iters,
        meas_hw_delay_iters: cfg.filter.meas_hw_delay_iters,
    }
}

fn ref_clip(cfg: &RefClipCfg) -> RefClip {
    RefClip::new(cfg.pos, cfg.min, cfg.neg, cfg.rate, cfg.invert, cfg.closeloop)
}

fn rst_algorithm(cfg: &RstCfg) -> RstAlgorithm {
    match cfg.algorithm {
        RstAlgorithmCfg::PiDeadbeat => RstAlgorithm::PiDeadbeat,
        RstAlgorithmCfg::TwoAuxPoles => RstAlgorithm::TwoAuxPoles {
            auxpoles2_hz: cfg.auxpoles2_hz,
            z: cfg.z,
        },
    }
}

fn load_model(cfg: &converter_config::LoadCfg) -> LoadModel {
    let load = LoadModel::new(cfg.ohms_ser, cfg.ohms_par, cfg.ohms_mag, cfg.henrys, cfg.gauss_per_amp);
    match cfg.saturation {
        Some(sat) => load.with_saturation(sat.henrys_sat, sat.i_sat_start, sat.i_sat_end),
        None => load,
    }
}

fn meas_channel(cfg: &converter_config::MeasChannelCfg) -> MeasChannel {
    MeasChannel::new(
        cfg.delay_ticks,
        cfg.noise_pp,
        cfg.tone_half_period_iters,
        cfg.tone_amplitude,
        cfg.invalid_probability,
    )
}

fn simulator(cfg: &SimulatorCfg, load: LoadModel, period: f32) -> Simulator {
    let vs = VoltageSource::from_tustin(
        cfg.voltage_source.bandwidth_hz,
        cfg.voltage_source.damping,
        cfg.voltage_source.zero_tc,
        period,
    );
    let actuation = match cfg.actuation {
        ActuationCfg::VoltageRef => Actuation::VoltageRef,
        ActuationCfg::CurrentRef => Actuation::CurrentRef,
    };
    Simulator::new(
        vs,
        actuation,
        load,
        period,
        meas_channel(&cfg.field),
        meas_channel(&cfg.current),
        meas_channel(&cfg.voltage),
    )
}

/// Build the engine (and, if configured, its plant simulator) from a
/// validated config.
pub fn build_engine(cfg: &Config) -> Result<ConverterEngine> {
    let load = load_model(&cfg.load);

    let mut builder = ConverterEngineBuilder::new(cfg.iter_period)
        .reg_period_iters(cfg.reg_period_iters)
        .load(load)
        .field_channel(channel_config(&cfg.field))
        .current_channel(channel_config(&cfg.current))
        .voltage_channel(channel_config(&cfg.voltage))
        .ref_clip(ref_clip(&cfg.ref_clip))
        .current_algorithm(rst_algorithm(&cfg.current_rst))
        .field_algorithm(rst_algorithm(&cfg.field_rst))
        .pure_delay_periods(cfg.current_rst.pure_delay_periods)
        .modulus_margin_warning(cfg.current_rst.modulus_margin_warning)
        .current_error_thresholds(cfg.current.error_warning, cfg.current.error_fault)
        .field_error_thresholds(cfg.field.error_warning, cfg.field.error_fault);

    if let Some(sim_cfg) = &cfg.simulator {
        builder = builder.simulator(simulator(sim_cfg, load, cfg.iter_period));
    }

    builder.build().wrap_err("failed to build converter engine")
}
