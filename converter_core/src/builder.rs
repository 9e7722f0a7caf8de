//! Non-RT builder for [`ConverterEngine`]: validates parameters the way
//! the RT tick loop never has to, and performs the one-shot RST design
//! that seeds both regulation channels.

use crate::channel::Channel;
use crate::error::{BuildError, ConverterError, Result};
use crate::error_monitor::ErrorMonitor;
use crate::filter::BoxcarFilter;
use crate::limits::{MeasLimits, RefClip, RmsLimits};
use crate::load::LoadModel;
use crate::orchestrator::ConverterEngine;
use crate::rst::{design, DesignStatus, RstAlgorithm, RstSlot};
use crate::simulator::Simulator;

/// Per-channel limit/filter configuration the builder turns into a
/// [`Channel`].
#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    pub pos: f32,
    pub neg: f32,
    pub low: f32,
    pub zero: f32,
    pub invert: bool,
    pub rms_warning: f32,
    pub rms_fault: f32,
    pub rms_tc: f32,
    pub fir_lengths: [usize; 2],
    pub extrapolation_len_iters: usize,
    pub meas_hw_delay_iters: f32,
}

impl ChannelConfig {
    fn build(self, rate_period_iters: u32, iter_period: f32) -> Channel {
        Channel::new(
            MeasLimits::new(self.pos, self.neg, self.low, self.zero, self.invert),
            RmsLimits::new(self.rms_warning, self.rms_fault, self.rms_tc, iter_period),
            BoxcarFilter::new(
                self.fir_lengths[0],
                self.fir_lengths[1],
                self.extrapolation_len_iters,
                self.meas_hw_delay_iters,
                self.pos,
                self.neg,
            ),
            rate_period_iters,
        )
    }
}

/// Everything needed to construct one [`ConverterEngine`], gathered before
/// any tick runs.
#[derive(Debug, Clone)]
pub struct ConverterEngineBuilder {
    iter_period: f32,
    reg_period_iters: u32,
    load: Option<LoadModel>,
    field: Option<ChannelConfig>,
    current: Option<ChannelConfig>,
    voltage: Option<ChannelConfig>,
    v_clip: Option<RefClip>,
    current_algorithm: RstAlgorithm,
    field_algorithm: RstAlgorithm,
    pure_delay_periods: f64,
    modulus_margin_warning: f64,
    current_error_thresholds: (f32, f32),
    field_error_thresholds: (f32, f32),
    simulator: Option<Simulator>,
}

impl ConverterEngineBuilder {
    #[must_use]
    pub fn new(iter_period: f32) -> Self {
        Self {
            iter_period,
            reg_period_iters: 1,
            load: None,
            field: None,
            current: None,
            voltage: None,
            v_clip: None,
            current_algorithm: RstAlgorithm::PiDeadbeat,
            field_algorithm: RstAlgorithm::PiDeadbeat,
            pure_delay_periods: 1.0,
            modulus_margin_warning: 0.2,
            current_error_thresholds: (0.0, 0.0),
            field_error_thresholds: (0.0, 0.0),
            simulator: None,
        }
    }

    #[must_use]
    pub fn reg_period_iters(mut self, n: u32) -> Self {
        self.reg_period_iters = n;
        self
    }

    #[must_use]
    pub fn load(mut self, load: LoadModel) -> Self {
        self.load = Some(load);
        self
    }

    #[must_use]
    pub fn field_channel(mut self, cfg: ChannelConfig) -> Self {
        self.field = Some(cfg);
        self
    }

    #[must_use]
    pub fn current_channel(mut self, cfg: ChannelConfig) -> Self {
        self.current = Some(cfg);
        self
    }

    #[must_use]
    pub fn voltage_channel(mut self, cfg: ChannelConfig) -> Self {
        self.voltage = Some(cfg);
        self
    }

    #[must_use]
    pub fn ref_clip(mut self, clip: RefClip) -> Self {
        self.v_clip = Some(clip);
        self
    }

    #[must_use]
    pub fn current_algorithm(mut self, alg: RstAlgorithm) -> Self {
        self.current_algorithm = alg;
        self
    }

    #[must_use]
    pub fn field_algorithm(mut self, alg: RstAlgorithm) -> Self {
        self.field_algorithm = alg;
        self
    }

    #[must_use]
    pub fn pure_delay_periods(mut self, p: f64) -> Self {
        self.pure_delay_periods = p;
        self
    }

    #[must_use]
    pub fn modulus_margin_warning(mut self, m: f64) -> Self {
        self.modulus_margin_warning = m;
        self
    }

    #[must_use]
    pub fn current_error_thresholds(mut self, warning: f32, fault: f32) -> Self {
        self.current_error_thresholds = (warning, fault);
        self
    }

    #[must_use]
    pub fn field_error_thresholds(mut self, warning: f32, fault: f32) -> Self {
        self.field_error_thresholds = (warning, fault);
        self
    }

    #[must_use]
    pub fn simulator(mut self, sim: Simulator) -> Self {
        self.simulator = Some(sim);
        self
    }

    /// Validate and assemble the engine, running the initial RST design
    /// for both regulation channels.
    pub fn build(self) -> Result<ConverterEngine> {
        if self.iter_period <= 0.0 {
            return Err(BuildError::InvalidIterPeriod.into());
        }
        let load = self.load.ok_or(BuildError::MissingLoad)?;
        let field_cfg = self
            .field
            .ok_or(BuildError::InvalidConfig("missing field channel config"))?;
        let current_cfg = self
            .current
            .ok_or(BuildError::InvalidConfig("missing current channel config"))?;
        let voltage_cfg = self
            .voltage
            .ok_or(BuildError::InvalidConfig("missing voltage channel config"))?;
        let v_clip = self
            .v_clip
            .ok_or(BuildError::InvalidConfig("missing reference clip"))?;

        let reg_period = crate::util::reg_period(self.iter_period, self.reg_period_iters);

        let (current_pars, current_status) =
            design(self.current_algorithm, &load, reg_period, self.pure_delay_periods, self.modulus_margin_warning);
        if current_status == crate::rst::DesignStatus::Fault {
            tracing::error!("current RST design rejected by the Jury test");
            return Err(ConverterError::RstDesign("current RST design rejected by the Jury test".into()).into());
        }
        if let DesignStatus::Warning { modulus_margin } = current_status {
            tracing::warn!(modulus_margin, "current RST design below modulus-margin warning threshold");
        }
        let (field_pars, field_status) =
            design(self.field_algorithm, &load, reg_period, self.pure_delay_periods, self.modulus_margin_warning);
        if field_status == crate::rst::DesignStatus::Fault {
            tracing::error!("field RST design rejected by the Jury test");
            return Err(ConverterError::RstDesign("field RST design rejected by the Jury test".into()).into());
        }
        if let DesignStatus::Warning { modulus_margin } = field_status {
            tracing::warn!(modulus_margin, "field RST design below modulus-margin warning threshold");
        }

        let field = field_cfg.build(self.reg_period_iters, self.iter_period);
        let current = current_cfg.build(self.reg_period_iters, self.iter_period);
        let voltage = voltage_cfg.build(self.reg_period_iters, self.iter_period);

        let (cw, cf) = self.current_error_thresholds;
        let (fw, ff) = self.field_error_thresholds;

        Ok(ConverterEngine::new(
            self.iter_period,
            self.reg_period_iters,
            load,
            field,
            current,
            voltage,
            v_clip,
            RstSlot::new(current_pars),
            RstSlot::new(field_pars),
            ErrorMonitor::new(cw, cf),
            ErrorMonitor::new(fw, ff),
            self.simulator,
        ))
    }
}
