//! Reference function generator: limit checking shared by every function
//! family, and the families themselves (Ramp, PLEP, PPPL, Table/Direct,
//! test tones, Trim, Pulse). Each family is a pair of an `init` that
//! validates against [`FgLimits`] and precomputes segment boundaries, and
//! a `gen` that is idempotent for a given `time`.

use std::f32::consts::PI;

use crate::limits::RefClip;

/// Fractional margin applied to limits before a value is rejected, so a
/// reference sitting exactly on the limit is accepted.
const CLIP_LIMIT_FACTOR: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FgError {
    BadParameter,
    BadArrayLen,
    InvalidTime,
    OutOfAccelerationLimits,
    OutOfLimits,
    OutOfRateLimits,
    OutOfVoltageLimits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FgLimitsPolarity {
    #[default]
    Normal,
    Negative,
    Auto,
}

/// Bound on reference level, rate, and acceleration for function-init
/// validation. `user_check_limits`, when set, runs after the built-in
/// checks pass (e.g. a converter-specific voltage envelope check that
/// back-computes V from I and dI/dt via the load model and [`RefClip`]).
#[derive(Debug, Clone, Copy)]
pub struct FgLimits {
    pub pos: f32,
    pub min: f32,
    pub neg: f32,
    pub rate: f32,
    pub acceleration: f32,
    pub user_check_limits: Option<UserCheckLimits>,
    /// Context read by [`check_voltage_envelope`] when installed as
    /// `user_check_limits`; unused by any other callback.
    pub voltage_envelope: Option<VoltageEnvelopeCtx>,
}

pub type UserCheckLimits =
    fn(&FgLimits, bool, f32, f32, f32) -> Result<(), FgError>;

/// Load/clip context `check_voltage_envelope` needs to back-compute a
/// voltage demand from a current reference and rate.
#[derive(Debug, Clone, Copy)]
pub struct VoltageEnvelopeCtx {
    pub ohms: f32,
    pub henrys: f32,
    pub i_meas: f32,
    pub v_clip: RefClip,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FgMetaError {
    pub index: u32,
    pub data: [f32; 4],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FgMetaRange {
    pub start: f32,
    pub end: f32,
    pub min: f32,
    pub max: f32,
}

/// Summary produced by every family's `init`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FgMeta {
    pub error: FgMetaError,
    pub duration: f32,
    pub range: FgMetaRange,
}

impl FgMeta {
    #[must_use]
    pub fn reset(init_ref: f32) -> Self {
        Self {
            error: FgMetaError::default(),
            duration: 0.0,
            range: FgMetaRange {
                start: init_ref,
                end: 0.0,
                min: init_ref,
                max: init_ref,
            },
        }
    }

    pub fn track_min_max(&mut self, ref_value: f32) {
        if ref_value > self.range.max {
            self.range.max = ref_value;
        } else if ref_value < self.range.min {
            self.range.min = ref_value;
        }
    }
}

/// Validate `ref_value`/`rate`/`acceleration` against `limits`, inverting
/// them first if `polarity` or the function's own sign calls for it.
pub fn check_ref(
    limits: &FgLimits,
    polarity: FgLimitsPolarity,
    negative_flag: bool,
    ref_value: f32,
    rate: f32,
    acceleration: f32,
    meta: &mut FgMeta,
) -> Result<(), FgError> {
    let invert = polarity == FgLimitsPolarity::Negative
        || (polarity == FgLimitsPolarity::Auto && negative_flag);

    let (max, min) = if invert {
        (
            -(1.0 - CLIP_LIMIT_FACTOR) * limits.min,
            -(1.0 + CLIP_LIMIT_FACTOR) * limits.pos,
        )
    } else {
        let min = if limits.neg < 0.0 {
            (1.0 + CLIP_LIMIT_FACTOR) * limits.neg
        } else {
            (1.0 - CLIP_LIMIT_FACTOR) * limits.min
        };
        ((1.0 + CLIP_LIMIT_FACTOR) * limits.pos, min)
    };

    if ref_value > max || ref_value < min {
        meta.error.data = [max, ref_value, min, 0.0];
        return Err(FgError::OutOfLimits);
    }

    if limits.rate > 0.0 {
        let limit = (1.0 + CLIP_LIMIT_FACTOR) * limits.rate;
        if rate.abs() > limit {
            meta.error.data = [limits.rate, limit, rate, 0.0];
            return Err(FgError::OutOfRateLimits);
        }
    }

    if limits.acceleration > 0.0 {
        let limit = (1.0 + CLIP_LIMIT_FACTOR) * limits.acceleration;
        if acceleration.abs() > limit {
            meta.error.data = [limits.acceleration, limit, acceleration, 0.0];
            return Err(FgError::OutOfAccelerationLimits);
        }
    }

    if let Some(cb) = limits.user_check_limits {
        return cb(limits, invert, ref_value, rate, acceleration);
    }

    Ok(())
}

/// Back-compute the voltage a current reference and its rate would
/// demand from the load, and reject if it falls outside the reference
/// clip's envelope. Installed as a `user_check_limits` callback for
/// current/field functions running against a converter with a Q41
/// voltage envelope; reads its load/clip context from
/// `limits.voltage_envelope`, since a bare fn pointer cannot capture it.
pub fn check_voltage_envelope(
    limits: &FgLimits,
    _invert: bool,
    i_ref: f32,
    i_rate: f32,
    _acceleration: f32,
) -> Result<(), FgError> {
    let Some(ctx) = limits.voltage_envelope else {
        return Ok(());
    };
    let mut v_clip = ctx.v_clip;
    v_clip.compute_vref_envelope(ctx.i_meas);
    let v_demand = ctx.ohms * i_ref + ctx.henrys * i_rate;
    let (_, flags) = v_clip.clip(v_demand, v_demand, 1.0);
    if flags.clip {
        Err(FgError::OutOfVoltageLimits)
    } else {
        Ok(())
    }
}

/// `BEFORE_FUNC` / `DURING_FUNC` / `AFTER_FUNC`, returned by every `gen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenStatus {
    BeforeFunc,
    DuringFunc,
    AfterFunc,
}

fn phase_status(time: f64, start: f64, end: f64) -> GenStatus {
    if time < start {
        GenStatus::BeforeFunc
    } else if time < end {
        GenStatus::DuringFunc
    } else {
        GenStatus::AfterFunc
    }
}

// ---------------------------------------------------------------------
// Ramp: parabola-parabola S-curve, with a returned-ref time shift so a
// rate-limited ramp still rejoins its parabolic tail smoothly.
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct Ramp {
    delay: f64,
    accel: f32,
    ref_seg: [f32; 3],
    time_seg: [f64; 3],
    time_shift: f64,
    prev_ref: f32,
}

impl Ramp {
    pub fn init(
        limits: Option<&FgLimits>,
        polarity: FgLimitsPolarity,
        initial_ref: f32,
        final_ref: f32,
        acceleration: f32,
        delay: f64,
        meta: &mut FgMeta,
    ) -> Result<Self, FgError> {
        if acceleration <= 0.0 {
            return Err(FgError::BadParameter);
        }
        *meta = FgMeta::reset(initial_ref);

        let delta = final_ref - initial_ref;
        let accel = if delta < 0.0 { -acceleration } else { acceleration };
        let t_half = (delta.abs() / acceleration).sqrt();
        let mid_ref = initial_ref + 0.5 * accel * t_half * t_half;

        meta.duration = (2.0 * t_half) as f32;
        meta.range.end = final_ref;
        meta.track_min_max(mid_ref);
        meta.track_min_max(final_ref);

        if let Some(limits) = limits {
            let peak_rate = accel * t_half;
            check_ref(limits, polarity, final_ref < 0.0, final_ref, 0.0, accel, meta)?;
            check_ref(limits, polarity, final_ref < 0.0, mid_ref, peak_rate, 0.0, meta)?;
        }

        Ok(Self {
            delay,
            accel,
            ref_seg: [initial_ref, mid_ref, final_ref],
            time_seg: [delay, delay + f64::from(t_half), delay + 2.0 * f64::from(t_half)],
            time_shift: 0.0,
            prev_ref: initial_ref,
        })
    }

    pub fn gen(&mut self, time: f64) -> (GenStatus, f32) {
        let t = time - self.time_shift;
        let status = phase_status(t, self.time_seg[0], self.time_seg[2]);
        let ref_value = if t < self.time_seg[0] {
            self.ref_seg[0]
        } else if t < self.time_seg[1] {
            let dt = (t - self.time_seg[0]) as f32;
            self.ref_seg[0] + 0.5 * self.accel * dt * dt
        } else if t < self.time_seg[2] {
            let dt = (self.time_seg[2] - t) as f32;
            self.ref_seg[2] - 0.5 * self.accel * dt * dt
        } else {
            self.ref_seg[2]
        };
        self.prev_ref = ref_value;
        (status, ref_value)
    }

    /// Feed back the ref actually applied after downstream clipping, so
    /// the next `gen` call rejoins the parabola from where rate-limiting
    /// left off instead of the unclipped ideal.
    pub fn notify_returned(&mut self, returned_ref: f32, local_rate: f32) {
        if local_rate.abs() > 1.0e-6 {
            let err = self.prev_ref - returned_ref;
            self.time_shift += f64::from(err / local_rate);
        }
    }
}

// ---------------------------------------------------------------------
// PLEP: parabola - linear - exponential(optional) - parabola.
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum PlepTail {
    /// Parabola back down to `final_rate`, ending at `final_ref`.
    Parabola { accel: f32 },
    /// Exponential approach to `exp_final`, held forever once settled.
    Exponential { exp_final: f32, inv_tc: f32 },
}

#[derive(Debug, Clone, Copy)]
pub struct Plep {
    ref_seg: [f32; 2],
    time_seg: [f64; 3],
    accel_in: f32,
    linear_rate: f32,
    tail: PlepTail,
}

impl Plep {
    #[allow(clippy::too_many_arguments)]
    pub fn init(
        limits: Option<&FgLimits>,
        polarity: FgLimitsPolarity,
        initial_ref: f32,
        initial_rate: f32,
        final_ref: f32,
        final_rate: f32,
        acceleration: f32,
        linear_rate: f32,
        exp_tc: f32,
        exp_final: f32,
        delay: f64,
        meta: &mut FgMeta,
    ) -> Result<Self, FgError> {
        if acceleration <= 0.0 || linear_rate <= 0.0 {
            return Err(FgError::BadParameter);
        }
        *meta = FgMeta::reset(initial_ref);

        let sign = if final_ref < initial_ref { -1.0f32 } else { 1.0 };
        let cruise_rate = sign * linear_rate;
        let accel_in = if cruise_rate < initial_rate { -acceleration } else { acceleration };
        let t1 = ((cruise_rate - initial_rate) / accel_in).max(0.0);
        let ref_after_p1 = initial_ref + initial_rate * t1 + 0.5 * accel_in * t1 * t1;

        if exp_tc > 0.0 {
            // Run parabola-in then settle asymptotically toward exp_final.
            let ref_exp_start = ref_after_p1;
            meta.duration = (t1 as f64 + 5.0 * f64::from(exp_tc)) as f32;
            meta.range.end = exp_final;
            meta.track_min_max(exp_final);

            if let Some(limits) = limits {
                check_ref(limits, polarity, exp_final < 0.0, exp_final, 0.0, 0.0, meta)?;
            }

            return Ok(Self {
                ref_seg: [initial_ref, ref_exp_start],
                time_seg: [delay, delay + f64::from(t1), delay + f64::from(t1) + 5.0 * f64::from(exp_tc)],
                accel_in,
                linear_rate: cruise_rate,
                tail: PlepTail::Exponential {
                    exp_final,
                    inv_tc: 1.0 / exp_tc,
                },
            });
        }

        // No exponential: parabola - linear - parabola with a possibly
        // non-zero final rate.
        let accel_out = if final_rate < cruise_rate { -acceleration } else { acceleration };
        let t3 = ((final_rate - cruise_rate) / accel_out).max(0.0);
        let delta_p1 = ref_after_p1 - initial_ref;
        let delta_p3 = cruise_rate * t3 + 0.5 * accel_out * t3 * t3;
        let total_delta = final_ref - initial_ref;
        let delta_linear = total_delta - delta_p1 - delta_p3;
        let t2 = if cruise_rate.abs() > 1.0e-9 {
            (delta_linear / cruise_rate).max(0.0)
        } else {
            0.0
        };

        let ref_after_p2 = ref_after_p1 + cruise_rate * t2;

        meta.duration = (t1 + t2 + t3) as f32;
        meta.range.end = final_ref;
        meta.track_min_max(ref_after_p1);
        meta.track_min_max(ref_after_p2);
        meta.track_min_max(final_ref);

        if let Some(limits) = limits {
            check_ref(limits, polarity, final_ref < 0.0, final_ref, final_rate, 0.0, meta)?;
            check_ref(limits, polarity, final_ref < 0.0, ref_after_p1, cruise_rate, accel_in, meta)?;
        }

        Ok(Self {
            ref_seg: [initial_ref, ref_after_p1],
            time_seg: [delay, delay + f64::from(t1), delay + f64::from(t1) + f64::from(t2)],
            accel_in,
            linear_rate: cruise_rate,
            tail: PlepTail::Parabola { accel: accel_out },
        })
    }

    pub fn gen(&mut self, time: f64, initial_rate: f32) -> (GenStatus, f32) {
        if time < self.time_seg[0] {
            return (GenStatus::BeforeFunc, self.ref_seg[0]);
        }
        if time < self.time_seg[1] {
            let dt = (time - self.time_seg[0]) as f32;
            let r = self.ref_seg[0] + initial_rate * dt + 0.5 * self.accel_in * dt * dt;
            return (GenStatus::DuringFunc, r);
        }
        match self.tail {
            PlepTail::Exponential { exp_final, inv_tc } => {
                if time < self.time_seg[2] {
                    let dt = (time - self.time_seg[1]) as f32;
                    let r = exp_final + (self.ref_seg[1] - exp_final) * (-dt * inv_tc).exp();
                    (GenStatus::DuringFunc, r)
                } else {
                    (GenStatus::AfterFunc, exp_final)
                }
            }
            PlepTail::Parabola { accel } => {
                if time < self.time_seg[2] {
                    let dt = (time - self.time_seg[1]) as f32;
                    let r = self.ref_seg[1] + self.linear_rate * dt;
                    (GenStatus::DuringFunc, r)
                } else {
                    let dt = (time - self.time_seg[2]) as f32;
                    let r = self.ref_seg[1]
                        + self.linear_rate * (self.time_seg[2] - self.time_seg[1]) as f32
                        + self.linear_rate * dt
                        + 0.5 * accel * dt * dt;
                    (GenStatus::DuringFunc, r)
                }
            }
        }
    }
}

// ---------------------------------------------------------------------
// PPPL: up to 8 concatenated {parabola, parabola, parabola, linear}
// quadruples, each a plain a2*t^2 + a1*t + a0 polynomial over its own
// time window.
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct PpplSegment {
    pub a2: f32,
    pub a1: f32,
    pub a0: f32,
    pub t_start: f64,
    pub t_end: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Pppl {
    segments: Vec<PpplSegment>,
}

impl Pppl {
    /// `segments` must be time-ordered and contiguous; up to 32 segments
    /// (8 parabola/parabola/parabola/linear quadruples).
    pub fn init(segments: Vec<PpplSegment>, meta: &mut FgMeta) -> Result<Self, FgError> {
        if segments.is_empty() || segments.len() > 32 {
            return Err(FgError::BadArrayLen);
        }
        let init_ref = Self::eval_at(&segments[0], segments[0].t_start);
        *meta = FgMeta::reset(init_ref);
        for seg in &segments {
            meta.track_min_max(Self::eval_at(seg, seg.t_start));
            meta.track_min_max(Self::eval_at(seg, seg.t_end));
        }
        let last = &segments[segments.len() - 1];
        meta.duration = (last.t_end - segments[0].t_start) as f32;
        meta.range.end = Self::eval_at(last, last.t_end);
        Ok(Self { segments })
    }

    fn eval_at(seg: &PpplSegment, t: f64) -> f32 {
        let dt = (t - seg.t_start) as f32;
        seg.a2 * dt * dt + seg.a1 * dt + seg.a0
    }

    pub fn gen(&self, time: f64) -> (GenStatus, f32) {
        let first = self.segments.first();
        let last = self.segments.last();
        let (Some(first), Some(last)) = (first, last) else {
            return (GenStatus::AfterFunc, 0.0);
        };
        if time < first.t_start {
            return (GenStatus::BeforeFunc, Self::eval_at(first, first.t_start));
        }
        for seg in &self.segments {
            if time < seg.t_end {
                return (GenStatus::DuringFunc, Self::eval_at(seg, time));
            }
        }
        (GenStatus::AfterFunc, Self::eval_at(last, last.t_end))
    }
}

// ---------------------------------------------------------------------
// Table / Direct: piecewise linear over a (time, value) array. Direct
// re-arms an inline Ramp whenever the target value changes, so the
// effective output stays rate- and accel-limited even though the table
// itself has no rate information.
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Table {
    times: Vec<f64>,
    values: Vec<f32>,
}

impl Table {
    pub fn init(times: Vec<f64>, values: Vec<f32>, meta: &mut FgMeta) -> Result<Self, FgError> {
        if times.len() != values.len() || times.len() < 2 {
            return Err(FgError::BadArrayLen);
        }
        if times.windows(2).any(|w| w[1] <= w[0]) {
            return Err(FgError::BadParameter);
        }
        *meta = FgMeta::reset(values[0]);
        for &v in &values {
            meta.track_min_max(v);
        }
        meta.duration = (times[times.len() - 1] - times[0]) as f32;
        meta.range.end = values[values.len() - 1];
        Ok(Self { times, values })
    }

    pub fn gen(&self, time: f64) -> (GenStatus, f32) {
        if time < self.times[0] {
            return (GenStatus::BeforeFunc, self.values[0]);
        }
        let last = self.times.len() - 1;
        if time >= self.times[last] {
            return (GenStatus::AfterFunc, self.values[last]);
        }
        let idx = match self.times.binary_search_by(|t| t.partial_cmp(&time).unwrap()) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let (t0, t1) = (self.times[idx], self.times[idx + 1]);
        let (v0, v1) = (self.values[idx], self.values[idx + 1]);
        let frac = ((time - t0) / (t1 - t0)) as f32;
        (GenStatus::DuringFunc, v0 + (v1 - v0) * frac)
    }
}

/// Direct: re-arms a [`Ramp`] whenever the caller sets a new target.
#[derive(Debug, Clone, Copy)]
pub struct Direct {
    target: f32,
    current: f32,
    rate: f32,
    accel: f32,
    ramp: Option<Ramp>,
}

impl Direct {
    #[must_use]
    pub fn new(initial_ref: f32, rate: f32, accel: f32) -> Self {
        Self {
            target: initial_ref,
            current: initial_ref,
            rate,
            accel,
            ramp: None,
        }
    }

    pub fn set_target(&mut self, target: f32, now: f64) {
        if (target - self.target).abs() > f32::EPSILON {
            self.target = target;
            let mut meta = FgMeta::default();
            self.ramp = Ramp::init(None, FgLimitsPolarity::Normal, self.current, target, self.accel, now, &mut meta)
                .ok();
        }
    }

    pub fn gen(&mut self, time: f64) -> (GenStatus, f32) {
        if let Some(ramp) = &mut self.ramp {
            let (status, r) = ramp.gen(time);
            self.current = r;
            if status == GenStatus::AfterFunc {
                self.ramp = None;
            }
            (GenStatus::DuringFunc, r)
        } else {
            (GenStatus::DuringFunc, self.current)
        }
    }

    /// Forward the ref actually applied, after downstream clipping, to the
    /// inline ramp so the next `gen` rejoins from where clipping left off.
    /// A no-op once the ramp has finished (`self.ramp` is `None`).
    pub fn notify_returned(&mut self, returned_ref: f32, local_rate: f32) {
        if let Some(ramp) = &mut self.ramp {
            ramp.notify_returned(returned_ref, local_rate);
        }
    }
}

// ---------------------------------------------------------------------
// Test tones: STEPS, SQUARE, SINE, COSINE.
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneShape {
    Steps,
    Square,
    Sine,
    Cosine,
}

#[derive(Debug, Clone, Copy)]
pub struct Tone {
    shape: ToneShape,
    initial_ref: f32,
    amplitude_pp: f32,
    period: f64,
    num_cycles: u32,
    delay: f64,
    window: bool,
}

impl Tone {
    pub fn init(
        shape: ToneShape,
        initial_ref: f32,
        amplitude_pp: f32,
        period: f64,
        num_cycles: u32,
        delay: f64,
        window: bool,
        meta: &mut FgMeta,
    ) -> Result<Self, FgError> {
        if period <= 0.0 || num_cycles == 0 {
            return Err(FgError::BadParameter);
        }
        *meta = FgMeta::reset(initial_ref);
        meta.duration = (period * f64::from(num_cycles)) as f32;
        meta.range.end = initial_ref;
        meta.track_min_max(initial_ref + amplitude_pp * 0.5);
        meta.track_min_max(initial_ref - amplitude_pp * 0.5);
        Ok(Self {
            shape,
            initial_ref,
            amplitude_pp,
            period,
            num_cycles,
            delay,
            window,
        })
    }

    pub fn gen(&self, time: f64) -> (GenStatus, f32) {
        let duration = self.period * f64::from(self.num_cycles);
        let status = phase_status(time, self.delay, self.delay + duration);
        if status != GenStatus::DuringFunc {
            return (status, self.initial_ref);
        }
        let t = time - self.delay;
        let phase = (t % self.period) / self.period;
        let half_amp = self.amplitude_pp * 0.5;

        let mut raw = match self.shape {
            ToneShape::Steps => {
                // Rectangular staircase: one flat level per cycle, rising
                // monotonically from -half_amp to +half_amp across the run,
                // unlike SQUARE's fixed two-level oscillation.
                let cycle = (t / self.period).floor().max(0.0) as u32;
                let cycle = cycle.min(self.num_cycles.saturating_sub(1));
                if self.num_cycles > 1 {
                    let frac = f64::from(cycle) / f64::from(self.num_cycles - 1);
                    (self.amplitude_pp as f64 * frac - f64::from(half_amp)) as f32
                } else {
                    half_amp
                }
            }
            ToneShape::Square => {
                if phase < 0.5 {
                    half_amp
                } else {
                    -half_amp
                }
            }
            ToneShape::Sine => half_amp * (2.0 * PI * phase as f32).sin(),
            ToneShape::Cosine => half_amp * (2.0 * PI * phase as f32).cos(),
        };

        if self.window {
            let w = 0.5 * (1.0 - (2.0 * PI * (t / duration) as f32).cos());
            raw *= w;
        }

        (GenStatus::DuringFunc, self.initial_ref + raw)
    }
}

// ---------------------------------------------------------------------
// Trim: LTRIM (linear) or CTRIM (cubic, zero end-point slope).
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimShape {
    Linear,
    Cubic,
}

#[derive(Debug, Clone, Copy)]
pub struct Trim {
    shape: TrimShape,
    initial_ref: f32,
    final_ref: f32,
    delay: f64,
    duration: f64,
}

impl Trim {
    pub fn init(
        shape: TrimShape,
        initial_ref: f32,
        final_ref: f32,
        delay: f64,
        duration: f64,
        meta: &mut FgMeta,
    ) -> Result<Self, FgError> {
        if duration <= 0.0 {
            return Err(FgError::BadParameter);
        }
        *meta = FgMeta::reset(initial_ref);
        meta.duration = duration as f32;
        meta.range.end = final_ref;
        meta.track_min_max(final_ref);
        Ok(Self {
            shape,
            initial_ref,
            final_ref,
            delay,
            duration,
        })
    }

    pub fn gen(&self, time: f64) -> (GenStatus, f32) {
        let status = phase_status(time, self.delay, self.delay + self.duration);
        let delta = self.final_ref - self.initial_ref;
        let ref_value = match status {
            GenStatus::BeforeFunc => self.initial_ref,
            GenStatus::AfterFunc => self.final_ref,
            GenStatus::DuringFunc => {
                let frac = ((time - self.delay) / self.duration) as f32;
                match self.shape {
                    TrimShape::Linear => self.initial_ref + delta * frac,
                    TrimShape::Cubic => {
                        let s = 3.0 * frac * frac - 2.0 * frac * frac * frac;
                        self.initial_ref + delta * s
                    }
                }
            }
        };
        (status, ref_value)
    }
}

// ---------------------------------------------------------------------
// Pulse: an LTRIM of the requested duration placed at a requested time.
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct Pulse {
    trim: Trim,
}

impl Pulse {
    pub fn init(
        baseline_ref: f32,
        pulse_ref: f32,
        at_time: f64,
        duration: f64,
        meta: &mut FgMeta,
    ) -> Result<Self, FgError> {
        let trim = Trim::init(TrimShape::Linear, baseline_ref, pulse_ref, at_time, duration, meta)?;
        Ok(Self { trim })
    }

    pub fn gen(&self, time: f64) -> (GenStatus, f32) {
        self.trim.gen(time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_reaches_final_value_and_duration() {
        let mut meta = FgMeta::default();
        let mut ramp = Ramp::init(None, FgLimitsPolarity::Normal, 0.0, 10.0, 2.0, 0.0, &mut meta).unwrap();
        let (status, r) = ramp.gen(meta.duration as f64);
        assert_eq!(status, GenStatus::AfterFunc);
        assert!((r - 10.0).abs() < 1e-3);
    }

    #[test]
    fn ramp_is_idempotent_for_same_time() {
        let mut meta = FgMeta::default();
        let mut ramp = Ramp::init(None, FgLimitsPolarity::Normal, 0.0, 10.0, 2.0, 0.0, &mut meta).unwrap();
        let (_, r1) = ramp.gen(0.5);
        let (_, r2) = ramp.gen(0.5);
        assert_eq!(r1, r2);
    }

    #[test]
    fn plep_exponential_settles_near_exp_final() {
        let mut meta = FgMeta::default();
        let mut plep = Plep::init(
            None,
            FgLimitsPolarity::Normal,
            0.0,
            0.0,
            50.0,
            0.0,
            2.0,
            5.0,
            0.5,
            50.0,
            0.0,
            &mut meta,
        )
        .unwrap();
        let (status, r) = plep.gen(f64::from(meta.duration), 0.0);
        assert_eq!(status, GenStatus::AfterFunc);
        assert!((r - 50.0).abs() < 0.5);
    }

    #[test]
    fn plep_without_exponential_reaches_final_ref() {
        let mut meta = FgMeta::default();
        let mut plep = Plep::init(
            None,
            FgLimitsPolarity::Normal,
            0.0,
            0.0,
            100.0,
            0.0,
            5.0,
            10.0,
            0.0,
            0.0,
            0.0,
            &mut meta,
        )
        .unwrap();
        let (_, r) = plep.gen(f64::from(meta.duration), 0.0);
        assert!((r - 100.0).abs() < 1.0, "r={r}");
    }

    #[test]
    fn pppl_evaluates_each_segment_in_its_window() {
        let segs = vec![
            PpplSegment { a2: 0.0, a1: 1.0, a0: 0.0, t_start: 0.0, t_end: 1.0 },
            PpplSegment { a2: 0.0, a1: 0.0, a0: 1.0, t_start: 1.0, t_end: 2.0 },
        ];
        let mut meta = FgMeta::default();
        let pppl = Pppl::init(segs, &mut meta).unwrap();
        assert_eq!(pppl.gen(0.5).1, 0.5);
        assert_eq!(pppl.gen(1.5).1, 1.0);
        assert_eq!(pppl.gen(10.0).0, GenStatus::AfterFunc);
    }

    #[test]
    fn table_interpolates_linearly_between_points() {
        let mut meta = FgMeta::default();
        let table = Table::init(vec![0.0, 1.0, 2.0], vec![0.0, 10.0, 0.0], &mut meta).unwrap();
        let (status, r) = table.gen(0.5);
        assert_eq!(status, GenStatus::DuringFunc);
        assert!((r - 5.0).abs() < 1e-6);
    }

    #[test]
    fn direct_rearms_ramp_on_new_target() {
        let mut direct = Direct::new(0.0, 5.0, 2.0);
        direct.set_target(10.0, 0.0);
        let (_, r) = direct.gen(100.0);
        assert!((r - 10.0).abs() < 1e-3);
    }

    #[test]
    fn sine_tone_returns_to_baseline_at_end_of_cycle() {
        let mut meta = FgMeta::default();
        let tone = Tone::init(ToneShape::Sine, 0.0, 10.0, 1.0, 2, 0.0, false, &mut meta).unwrap();
        let (_, r) = tone.gen(0.0);
        assert!(r.abs() < 1e-4);
    }

    #[test]
    fn steps_rise_monotonically_across_cycles_unlike_square() {
        let mut meta = FgMeta::default();
        let steps = Tone::init(ToneShape::Steps, 0.0, 10.0, 1.0, 5, 0.0, false, &mut meta).unwrap();
        let levels: Vec<f32> = (0..5).map(|i| steps.gen(f64::from(i) + 0.5).1).collect();
        for pair in levels.windows(2) {
            assert!(pair[1] > pair[0], "levels not monotonic: {levels:?}");
        }
        assert!((levels[0] - (-5.0)).abs() < 1e-4);
        assert!((levels[4] - 5.0).abs() < 1e-4);

        let square = Tone::init(ToneShape::Square, 0.0, 10.0, 1.0, 5, 0.0, false, &mut meta).unwrap();
        let square_levels: Vec<f32> = (0..5).map(|i| square.gen(f64::from(i) + 0.25).1).collect();
        assert!(square_levels.iter().all(|&v| (v - 5.0).abs() < 1e-4));
    }

    #[test]
    fn ctrim_has_zero_slope_at_endpoints() {
        let mut meta = FgMeta::default();
        let trim = Trim::init(TrimShape::Cubic, 0.0, 10.0, 0.0, 1.0, &mut meta).unwrap();
        let (_, r_start) = trim.gen(1.0e-6);
        let (_, r_near_start) = trim.gen(1.0e-3);
        // Slope should be much smaller than the linear-equivalent near t=0.
        assert!((r_near_start - r_start).abs() < 1.0e-1);
    }

    #[test]
    fn pulse_returns_to_baseline_after_duration() {
        let mut meta = FgMeta::default();
        let pulse = Pulse::init(0.0, 100.0, 1.0, 0.5, &mut meta).unwrap();
        assert_eq!(pulse.gen(0.0).0, GenStatus::BeforeFunc);
        assert_eq!(pulse.gen(2.0).0, GenStatus::AfterFunc);
    }

    #[test]
    fn check_ref_rejects_out_of_limits() {
        let limits = FgLimits {
            pos: 10.0,
            min: 0.0,
            neg: 0.0,
            rate: 0.0,
            acceleration: 0.0,
            user_check_limits: None,
            voltage_envelope: None,
        };
        let mut meta = FgMeta::default();
        let err = check_ref(&limits, FgLimitsPolarity::Normal, false, 20.0, 0.0, 0.0, &mut meta).unwrap_err();
        assert_eq!(err, FgError::OutOfLimits);
    }

    #[test]
    fn check_ref_runs_voltage_envelope_callback_when_installed() {
        let v_clip = RefClip::new(1000.0, 0.0, 0.0, 0.0, false, -1.0);
        let limits = FgLimits {
            pos: 10.0,
            min: 0.0,
            neg: 0.0,
            rate: 0.0,
            acceleration: 0.0,
            user_check_limits: Some(check_voltage_envelope),
            voltage_envelope: Some(VoltageEnvelopeCtx {
                ohms: 1.0,
                henrys: 0.0,
                i_meas: 0.0,
                v_clip,
            }),
        };
        let mut meta = FgMeta::default();
        check_ref(&limits, FgLimitsPolarity::Normal, false, 5.0, 0.0, 0.0, &mut meta)
            .expect("5 V demand at 1 ohm is within a 1000 V envelope");

        let mut tight_limits = limits;
        tight_limits.voltage_envelope = Some(VoltageEnvelopeCtx {
            ohms: 1.0,
            henrys: 0.0,
            i_meas: 0.0,
            v_clip: RefClip::new(2.0, 0.0, 0.0, 0.0, false, -1.0),
        });
        let err = check_ref(&tight_limits, FgLimitsPolarity::Normal, false, 5.0, 0.0, 0.0, &mut meta)
            .unwrap_err();
        assert_eq!(err, FgError::OutOfVoltageLimits);
    }
}
