#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! TOML configuration schemas for the converter regulation engine.
//!
//! These are deserialized straight off disk by `converter_cli`; they are
//! deliberately dumber than `converter_core`'s runtime types (plain fields,
//! no invariants enforced by construction) and get turned into the real
//! thing only after `Config::validate` passes.
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct LoadCfg {
    pub ohms_ser: f32,
    pub ohms_par: f32,
    pub ohms_mag: f32,
    pub henrys: f32,
    pub gauss_per_amp: f32,
    #[serde(default)]
    pub saturation: Option<SaturationCfg>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct SaturationCfg {
    pub henrys_sat: f32,
    pub i_sat_start: f32,
    pub i_sat_end: f32,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ChannelLimitsCfg {
    pub pos: f32,
    pub neg: f32,
    pub low: f32,
    pub zero: f32,
    pub invert: bool,
    pub rms_warning: f32,
    pub rms_fault: f32,
    pub rms_tc: f32,
}

impl Default for ChannelLimitsCfg {
    fn default() -> Self {
        Self {
            pos: 0.0,
            neg: 0.0,
            low: 0.0,
            zero: 0.0,
            invert: false,
            rms_warning: 0.0,
            rms_fault: 0.0,
            rms_tc: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ChannelFilterCfg {
    pub fir_len0: usize,
    pub fir_len1: usize,
    pub extrapolation_len_iters: usize,
    pub meas_hw_delay_iters: f32,
}

impl Default for ChannelFilterCfg {
    fn default() -> Self {
        Self {
            fir_len0: 1,
            fir_len1: 1,
            extrapolation_len_iters: 0,
            meas_hw_delay_iters: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ChannelCfg {
    pub limits: ChannelLimitsCfg,
    pub filter: ChannelFilterCfg,
    pub error_warning: f32,
    pub error_fault: f32,
}

impl Default for ChannelCfg {
    fn default() -> Self {
        Self {
            limits: ChannelLimitsCfg::default(),
            filter: ChannelFilterCfg::default(),
            error_warning: 0.0,
            error_fault: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RefClipCfg {
    pub pos: f32,
    pub min: f32,
    pub neg: f32,
    pub rate: f32,
    #[serde(default)]
    pub invert: bool,
    /// Tighter bound active only while a closed-loop regulation mode is
    /// running. `-1e30` (the default) disables it.
    #[serde(default = "default_closeloop")]
    pub closeloop: f32,
}

fn default_closeloop() -> f32 {
    -1.0e30
}

#[derive(Debug, Deserialize, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum RstAlgorithmCfg {
    #[default]
    PiDeadbeat,
    TwoAuxPoles,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct RstCfg {
    pub algorithm: RstAlgorithmCfg,
    /// Used only when `algorithm = "two_aux_poles"`.
    pub auxpoles2_hz: f32,
    pub z: f32,
    pub pure_delay_periods: f64,
    pub modulus_margin_warning: f64,
}

impl Default for RstCfg {
    fn default() -> Self {
        Self {
            algorithm: RstAlgorithmCfg::PiDeadbeat,
            auxpoles2_hz: 10.0,
            z: 0.9,
            pure_delay_periods: 1.0,
            modulus_margin_warning: 0.2,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct VoltageSourceCfg {
    pub bandwidth_hz: f32,
    pub damping: f32,
    pub zero_tc: f32,
}

impl Default for VoltageSourceCfg {
    fn default() -> Self {
        Self {
            bandwidth_hz: 1000.0,
            damping: 0.9,
            zero_tc: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct MeasChannelCfg {
    pub delay_ticks: f32,
    pub noise_pp: f32,
    pub tone_half_period_iters: u32,
    pub tone_amplitude: f32,
    pub invalid_probability: f32,
}

impl Default for MeasChannelCfg {
    fn default() -> Self {
        Self {
            delay_ticks: 0.0,
            noise_pp: 0.0,
            tone_half_period_iters: 0,
            tone_amplitude: 0.0,
            invalid_probability: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum ActuationCfg {
    VoltageRef,
    CurrentRef,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct SimulatorCfg {
    pub actuation: ActuationCfg,
    pub voltage_source: VoltageSourceCfg,
    #[serde(default)]
    pub field: MeasChannelCfg,
    #[serde(default)]
    pub current: MeasChannelCfg,
    #[serde(default)]
    pub voltage: MeasChannelCfg,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub level: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub iter_period: f32,
    #[serde(default = "default_reg_period_iters")]
    pub reg_period_iters: u32,
    pub load: LoadCfg,
    #[serde(default)]
    pub field: ChannelCfg,
    #[serde(default)]
    pub current: ChannelCfg,
    #[serde(default)]
    pub voltage: ChannelCfg,
    pub ref_clip: RefClipCfg,
    #[serde(default)]
    pub current_rst: RstCfg,
    #[serde(default)]
    pub field_rst: RstCfg,
    #[serde(default)]
    pub simulator: Option<SimulatorCfg>,
    #[serde(default)]
    pub logging: Logging,
}

fn default_reg_period_iters() -> u32 {
    1
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        if self.iter_period <= 0.0 {
            eyre::bail!("iter_period must be > 0");
        }
        if self.reg_period_iters == 0 {
            eyre::bail!("reg_period_iters must be >= 1");
        }
        if self.load.ohms_mag <= 0.0 {
            eyre::bail!("load.ohms_mag must be > 0");
        }
        if self.load.henrys <= 0.0 {
            eyre::bail!("load.henrys must be > 0");
        }
        if let Some(sat) = self.load.saturation
            && sat.i_sat_end <= sat.i_sat_start
        {
            eyre::bail!("load.saturation.i_sat_end must be > i_sat_start");
        }

        for (name, ch) in [
            ("field", &self.field),
            ("current", &self.current),
            ("voltage", &self.voltage),
        ] {
            if ch.limits.pos <= ch.limits.neg {
                eyre::bail!("{name}.limits.pos must be > {name}.limits.neg");
            }
            if ch.filter.fir_len0 == 0 || ch.filter.fir_len1 == 0 {
                eyre::bail!("{name}.filter fir lengths must be >= 1");
            }
        }

        if self.ref_clip.pos <= self.ref_clip.neg {
            eyre::bail!("ref_clip.pos must be > ref_clip.neg");
        }
        if self.ref_clip.rate <= 0.0 {
            eyre::bail!("ref_clip.rate must be > 0");
        }

        if let RstAlgorithmCfg::TwoAuxPoles = self.current_rst.algorithm
            && self.current_rst.auxpoles2_hz <= 0.0
        {
            eyre::bail!("current_rst.auxpoles2_hz must be > 0 for two_aux_poles");
        }
        if let RstAlgorithmCfg::TwoAuxPoles = self.field_rst.algorithm
            && self.field_rst.auxpoles2_hz <= 0.0
        {
            eyre::bail!("field_rst.auxpoles2_hz must be > 0 for two_aux_poles");
        }

        if let Some(sim) = &self.simulator
            && sim.voltage_source.bandwidth_hz <= 0.0
        {
            eyre::bail!("simulator.voltage_source.bandwidth_hz must be > 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
        iter_period = 0.001

        [load]
        ohms_ser = 0.1
        ohms_par = 1.0e9
        ohms_mag = 0.5
        henrys = 2.0
        gauss_per_amp = 1.0

        [ref_clip]
        pos = 100.0
        min = 0.0
        neg = -100.0
        rate = 1.0e6
        "#
    }

    #[test]
    fn parses_minimal_config() {
        let cfg = load_toml(minimal_toml()).expect("should parse");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.reg_period_iters, 1);
        assert!(matches!(cfg.current_rst.algorithm, RstAlgorithmCfg::PiDeadbeat));
    }

    #[test]
    fn rejects_nonpositive_iter_period() {
        let mut cfg = load_toml(minimal_toml()).unwrap();
        cfg.iter_period = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_inverted_ref_clip_bounds() {
        let mut cfg = load_toml(minimal_toml()).unwrap();
        cfg.ref_clip.pos = -1.0;
        cfg.ref_clip.neg = 1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_degenerate_saturation_range() {
        let mut cfg = load_toml(minimal_toml()).unwrap();
        cfg.load.saturation = Some(SaturationCfg {
            henrys_sat: 1.0,
            i_sat_start: 10.0,
            i_sat_end: 5.0,
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn two_aux_poles_requires_positive_frequency() {
        let mut cfg = load_toml(minimal_toml()).unwrap();
        cfg.current_rst.algorithm = RstAlgorithmCfg::TwoAuxPoles;
        cfg.current_rst.auxpoles2_hz = 0.0;
        assert!(cfg.validate().is_err());
    }
}
