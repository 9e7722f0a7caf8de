//! Tick-driven converter orchestrator: mode state machine, measurement
//! acquisition with invalid-input substitution, the active RST regulation
//! loop, and the optional closed-loop simulator, wired together in the
//! order the external caller drives them.

use crate::channel::{Channel, ChannelFlags, InputStatus};
use crate::error_monitor::{ErrorMonitor, ErrorMonitorFlags};
use crate::limits::{RefClip, RefClipFlags};
use crate::load::LoadModel;
use crate::rst::{DesignStatus, RstExecutor, RstHistory, RstSlot, TrackDelayEstimator};
use crate::simulator::{Simulator, SimOutputs};

/// Regulation mode. Transitions only take effect at the next tick's entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegMode {
    #[default]
    None,
    Voltage,
    Current,
    Field,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MeasurementInput {
    pub value: f32,
    pub status: InputStatus,
}

impl MeasurementInput {
    #[must_use]
    pub fn ok(value: f32) -> Self {
        Self { value, status: InputStatus::Ok }
    }

    #[must_use]
    pub fn invalid() -> Self {
        Self { value: 0.0, status: InputStatus::Invalid }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Measurements {
    field: MeasurementInput,
    current: MeasurementInput,
    voltage: MeasurementInput,
}

/// Everything the caller needs from one `tick`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickOutput {
    pub is_regulation_iter: bool,
    pub v_ref: f32,
    pub field_flags: ChannelFlags,
    pub current_flags: ChannelFlags,
    pub voltage_flags: ChannelFlags,
    pub ref_clip_flags: RefClipFlags,
    pub current_design: Option<DesignStatus>,
    pub field_design: Option<DesignStatus>,
    pub current_error: ErrorMonitorFlags,
    pub field_error: ErrorMonitorFlags,
}

/// The full regulation engine, one instance per converter channel set.
#[derive(Debug)]
pub struct ConverterEngine {
    pub iter_period: f32,
    reg_period_iters: u32,
    tick_counter: u32,
    reg_mode: RegMode,
    load: LoadModel,
    pub field: Channel,
    pub current: Channel,
    pub voltage: Channel,
    pub v_clip: RefClip,
    current_rst: RstSlot,
    current_exec: RstExecutor,
    pub current_track_delay: TrackDelayEstimator,
    field_rst: RstSlot,
    field_exec: RstExecutor,
    pub field_track_delay: TrackDelayEstimator,
    current_error: ErrorMonitor,
    field_error: ErrorMonitor,
    pending: Measurements,
    v_ref: f32,
    prev_v_ref: f32,
    pub simulator: Option<Simulator>,
}

impl ConverterEngine {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        iter_period: f32,
        reg_period_iters: u32,
        load: LoadModel,
        field: Channel,
        current: Channel,
        voltage: Channel,
        v_clip: RefClip,
        current_rst: RstSlot,
        field_rst: RstSlot,
        current_error: ErrorMonitor,
        field_error: ErrorMonitor,
        simulator: Option<Simulator>,
    ) -> Self {
        let current_track_delay = TrackDelayEstimator::new(current_rst.active().track_delay_periods);
        let field_track_delay = TrackDelayEstimator::new(field_rst.active().track_delay_periods);
        Self {
            iter_period,
            reg_period_iters: reg_period_iters.max(1),
            tick_counter: 0,
            reg_mode: RegMode::None,
            load,
            field,
            current,
            voltage,
            v_clip,
            current_rst,
            current_exec: RstExecutor::default(),
            current_track_delay,
            field_rst,
            field_exec: RstExecutor::default(),
            field_track_delay,
            current_error,
            field_error,
            pending: Measurements::default(),
            v_ref: 0.0,
            prev_v_ref: 0.0,
            simulator,
        }
    }

    #[must_use]
    pub fn reg_mode(&self) -> RegMode {
        self.reg_mode
    }

    #[must_use]
    pub fn reg_period(&self) -> f32 {
        crate::util::reg_period(self.iter_period, self.reg_period_iters)
    }

    pub fn publish_current_rst(&self, pars: crate::rst::RstPars) {
        self.current_rst.publish(pars);
    }

    pub fn publish_field_rst(&self, pars: crate::rst::RstPars) {
        self.field_rst.publish(pars);
    }

    /// Transition the regulation mode, seeding or releasing RST state so
    /// the first tick in the new mode doesn't bump the actuation.
    pub fn set_mode(&mut self, mode: RegMode) {
        if mode == self.reg_mode {
            return;
        }
        tracing::info!(from = ?self.reg_mode, to = ?mode, "regulation mode transition");
        match mode {
            RegMode::None => {
                self.v_ref = 0.0;
                self.prev_v_ref = 0.0;
                self.current_error.reset();
                self.field_error.reset();
                self.current_exec.history = RstHistory::default();
                self.field_exec.history = RstHistory::default();
            }
            RegMode::Voltage => {
                let avg = if self.reg_mode == RegMode::Current {
                    let raw = self.current_exec.history.act_average() as f32;
                    self.load.inverse_vref_sat(self.current.last_filtered, raw)
                } else {
                    self.field_exec.history.act_average() as f32
                };
                self.v_ref = avg;
                self.prev_v_ref = avg;
            }
            RegMode::Current => {
                let meas = f64::from(self.current.last_filtered);
                self.current_exec.history.seed(f64::from(self.prev_v_ref), meas, meas);
            }
            RegMode::Field => {
                let meas = f64::from(self.field.last_filtered);
                self.field_exec.history.seed(f64::from(self.prev_v_ref), meas, meas);
            }
        }
        self.reg_mode = mode;
    }

    pub fn set_measurements(&mut self, field: MeasurementInput, current: MeasurementInput, voltage: MeasurementInput) {
        self.pending = Measurements { field, current, voltage };
    }

    /// Run one iteration: publish any pending RST design, acquire and
    /// filter measurements, run the active RST loop on regulation ticks,
    /// and return the flags the caller needs.
    pub fn tick(&mut self, ref_in: f32) -> TickOutput {
        self.current_rst.poll_swap();
        self.field_rst.poll_swap();

        let period = self.reg_period();
        let reg_period = f64::from(period);

        let regulated_current_sub = (self.reg_mode == RegMode::Current).then(|| {
            let delayed = self
                .current_exec
                .history
                .delayed_ref(self.current_rst.active().ref_delay_periods, 0.0, reg_period) as f32;
            delayed - self.current_error.last_err
        });
        let regulated_field_sub = (self.reg_mode == RegMode::Field).then(|| {
            let delayed = self
                .field_exec
                .history
                .delayed_ref(self.field_rst.active().ref_delay_periods, 0.0, reg_period) as f32;
            delayed - self.field_error.last_err
        });

        let (_, field_flags) = self
            .field
            .ingest(self.pending.field.value, self.pending.field.status, regulated_field_sub, self.iter_period);
        let (current_out, current_flags) = self.current.ingest(
            self.pending.current.value,
            self.pending.current.status,
            regulated_current_sub,
            self.iter_period,
        );
        let (_, voltage_flags) =
            self.voltage
                .ingest(self.pending.voltage.value, self.pending.voltage.status, None, self.iter_period);

        self.v_clip.compute_vref_envelope(current_out.filtered);
        self.v_clip
            .set_closeloop_active(matches!(self.reg_mode, RegMode::Current | RegMode::Field));

        self.tick_counter += 1;
        let is_regulation_iter = self.tick_counter >= self.reg_period_iters;
        if is_regulation_iter {
            self.tick_counter = 0;
        }

        let mut ref_clip_flags = RefClipFlags::default();
        let mut current_design = None;
        let mut field_design = None;
        let mut current_error_flags = ErrorMonitorFlags::default();
        let mut field_error_flags = ErrorMonitorFlags::default();

        if is_regulation_iter {
            match self.reg_mode {
                RegMode::Current => {
                    let pars = self.current_rst.active().clone();
                    let meas = f64::from(current_out.filtered);
                    let act = self.current_exec.calc_act(&pars, f64::from(ref_in), meas) as f32;
                    let v_sat = self.load.vref_sat(current_out.filtered, act);
                    let (clipped, flags) = self.v_clip.clip(v_sat, self.prev_v_ref, period);
                    ref_clip_flags = flags;
                    if flags.clip || flags.rate {
                        let unsat = self.load.inverse_vref_sat(current_out.filtered, clipped);
                        self.current_exec.back_calculate(&pars, f64::from(unsat), meas);
                    }
                    self.current_track_delay.update(f64::from(ref_in), f64::from(clipped));
                    self.v_ref = clipped;
                    let delayed_ref =
                        self.current_exec.history.delayed_ref(pars.ref_delay_periods, 0.0, reg_period) as f32;
                    current_error_flags = self.current_error.check(delayed_ref, current_out.filtered);
                    if current_error_flags.fault {
                        tracing::error!(err = self.current_error.last_err, "current regulation error fault");
                    } else if current_error_flags.warning {
                        tracing::warn!(err = self.current_error.last_err, "current regulation error warning");
                    }
                }
                RegMode::Field => {
                    let pars = self.field_rst.active().clone();
                    let field_meas = f64::from(self.field.last_filtered);
                    let act = self.field_exec.calc_act(&pars, f64::from(ref_in), field_meas) as f32;
                    let (clipped, flags) = self.v_clip.clip(act, self.prev_v_ref, period);
                    ref_clip_flags = flags;
                    if flags.clip || flags.rate {
                        self.field_exec.back_calculate(&pars, f64::from(clipped), field_meas);
                    }
                    self.field_track_delay.update(f64::from(ref_in), f64::from(clipped));
                    self.v_ref = clipped;
                    let delayed_ref =
                        self.field_exec.history.delayed_ref(pars.ref_delay_periods, 0.0, reg_period) as f32;
                    field_error_flags = self.field_error.check(delayed_ref, self.field.last_filtered);
                    if field_error_flags.fault {
                        tracing::error!(err = self.field_error.last_err, "field regulation error fault");
                    } else if field_error_flags.warning {
                        tracing::warn!(err = self.field_error.last_err, "field regulation error warning");
                    }
                }
                RegMode::Voltage => {
                    let (clipped, flags) = self.v_clip.clip(ref_in, self.prev_v_ref, period);
                    self.v_ref = clipped;
                    ref_clip_flags = flags;
                }
                RegMode::None => {
                    self.v_ref = 0.0;
                }
            }
            self.prev_v_ref = self.v_ref;

            current_design = Some(if self.current_rst.active().s[0].abs() < 1.0e-12 {
                DesignStatus::Fault
            } else {
                DesignStatus::Ok
            });
            field_design = Some(if self.field_rst.active().s[0].abs() < 1.0e-12 {
                DesignStatus::Fault
            } else {
                DesignStatus::Ok
            });
        }

        TickOutput {
            is_regulation_iter,
            v_ref: self.v_ref,
            field_flags,
            current_flags,
            voltage_flags,
            ref_clip_flags,
            current_design,
            field_design,
            current_error: current_error_flags,
            field_error: field_error_flags,
        }
    }

    /// Step the simulator, if one is attached, from the latest `v_ref`.
    pub fn simulate(&mut self, v_perturbation: f32) -> Option<SimOutputs> {
        self.simulator.as_mut().map(|sim| sim.tick(self.v_ref, v_perturbation))
    }
}
