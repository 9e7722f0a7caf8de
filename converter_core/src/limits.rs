//! Measurement and reference limit checking: trip/low/zero flags on a
//! measured quantity, an RMS² trip/warning filter, reference clipping
//! (absolute + rate), and the Q41 sloped voltage envelope.

use crate::util::FP32_MARGIN;

/// Margin added to `pos`/`neg` before a measurement trips (no hysteresis).
const TRIP_MARGIN: f32 = 0.1;
/// Hysteresis fraction applied to the low/zero/warning thresholds.
const HYSTERESIS: f32 = 0.05;
/// Margin added to user-facing reference limits before they become clip
/// limits, so a reference sitting exactly at the user limit never clips.
const CLIP_MARGIN: f32 = 1.0e-3;

/// Trip/low/zero checker for a measured quantity (current, field, voltage).
#[derive(Debug, Clone, Copy, Default)]
pub struct MeasLimits {
    pos_trip: f32,
    neg_trip: f32,
    low: f32,
    zero: f32,
    low_hysteresis: f32,
    zero_hysteresis: f32,
    pub invert: bool,
    flag_trip: bool,
    flag_low: bool,
    flag_zero: bool,
}

/// Flags produced by [`MeasLimits::check`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeasLimitFlags {
    pub trip: bool,
    pub low: bool,
    pub zero: bool,
}

impl MeasLimits {
    /// `neg` is expected `<= 0.0` for a bipolar quantity; a non-negative
    /// `neg` disables the negative trip (unipolar quantity).
    #[must_use]
    pub fn new(pos: f32, neg: f32, low: f32, zero: f32, invert: bool) -> Self {
        Self {
            pos_trip: pos * (1.0 + TRIP_MARGIN),
            neg_trip: neg * (1.0 + TRIP_MARGIN),
            low,
            zero,
            low_hysteresis: low * (1.0 - HYSTERESIS),
            zero_hysteresis: zero * (1.0 - HYSTERESIS),
            invert,
            flag_trip: false,
            flag_low: false,
            flag_zero: false,
        }
    }

    /// Evaluate the trip/low/zero flags for one measurement and latch the
    /// hysteresis-based ones internally.
    pub fn check(&mut self, meas: f32) -> MeasLimitFlags {
        let meas = if self.invert { -meas } else { meas };
        let abs_meas = meas.abs();

        self.flag_trip = meas > self.pos_trip || (self.neg_trip < 0.0 && meas < self.neg_trip);

        if self.zero > 0.0 {
            if self.flag_zero {
                if abs_meas > self.zero {
                    self.flag_zero = false;
                }
            } else if abs_meas < self.zero_hysteresis {
                self.flag_zero = true;
            }
        }

        if self.low > 0.0 {
            if self.flag_low {
                if abs_meas > self.low {
                    self.flag_low = false;
                }
            } else if abs_meas < self.low_hysteresis {
                self.flag_low = true;
            }
        }

        MeasLimitFlags {
            trip: self.flag_trip,
            low: self.flag_low,
            zero: self.flag_zero,
        }
    }
}

/// Single-pole low-pass filter on `meas^2` driving warning/fault flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct RmsLimits {
    meas2_filter_factor: f32,
    meas2_filter: f32,
    rms2_fault: f32,
    rms2_warning: f32,
    rms2_warning_hysteresis: f32,
    flag_fault: bool,
    flag_warning: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RmsLimitFlags {
    pub fault: bool,
    pub warning: bool,
}

impl RmsLimits {
    /// `rms_tc <= 0.0` disables the filter entirely (flags stay false).
    #[must_use]
    pub fn new(warning: f32, fault: f32, rms_tc: f32, period: f32) -> Self {
        let meas2_filter_factor = if rms_tc > 0.0 { period / rms_tc } else { 0.0 };
        Self {
            meas2_filter_factor,
            meas2_filter: 0.0,
            rms2_fault: fault * fault,
            rms2_warning: warning * warning,
            rms2_warning_hysteresis: warning * warning * (1.0 - 2.0 * HYSTERESIS),
            flag_fault: false,
            flag_warning: false,
        }
    }

    pub fn check(&mut self, meas: f32) -> RmsLimitFlags {
        if self.meas2_filter_factor > 0.0 {
            self.meas2_filter += (meas * meas - self.meas2_filter) * self.meas2_filter_factor;

            self.flag_fault = self.rms2_fault > 0.0 && self.meas2_filter > self.rms2_fault;

            if self.rms2_warning > 0.0 {
                if !self.flag_warning {
                    if self.meas2_filter > self.rms2_warning {
                        self.flag_warning = true;
                    }
                } else if self.meas2_filter < self.rms2_warning_hysteresis {
                    self.flag_warning = false;
                }
            }
        }

        RmsLimitFlags {
            fault: self.flag_fault,
            warning: self.flag_warning,
        }
    }
}

/// Flags produced by [`RefClip::clip`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefClipFlags {
    pub clip: bool,
    pub rate: bool,
}

/// Absolute + rate clip for a reference value, with the sloped Q41 voltage
/// envelope folded in when configured.
#[derive(Debug, Clone, Copy)]
pub struct RefClip {
    pub min: f32,
    pub pos: f32,
    pub neg: f32,
    pub rate: f32,
    min_clip_user: f32,
    max_clip_user: f32,
    min_clip: f32,
    max_clip: f32,
    rate_clip: f32,
    unipolar: bool,
    pub invert: bool,
    /// Tighter absolute bound used only while a closed-loop mode is
    /// active; `-1e30` (effectively disabled) for bipolar channels.
    pub closeloop: f32,
    closeloop_active: bool,
    // Q41 exclusion line, disabled when `i_quadrants41_max` is very negative.
    dvdi: f32,
    v0: f32,
    i_quadrants41_max: f32,
    flag_clip: bool,
    flag_rate: bool,
}

impl RefClip {
    #[must_use]
    pub fn new(pos: f32, min: f32, neg: f32, rate: f32, invert: bool, closeloop: f32) -> Self {
        let rate_clip = rate * (1.0 + CLIP_MARGIN);
        let max_clip_user = pos * (1.0 + CLIP_MARGIN);
        let (unipolar, min_clip_user, closeloop) = if neg < 0.0 {
            (false, neg * (1.0 + CLIP_MARGIN), -1.0e30)
        } else {
            (true, 0.0, closeloop)
        };
        Self {
            min,
            pos,
            neg,
            rate,
            min_clip_user,
            max_clip_user,
            min_clip: min_clip_user,
            max_clip: max_clip_user,
            rate_clip,
            unipolar,
            invert,
            closeloop,
            closeloop_active: false,
            dvdi: 0.0,
            v0: 0.0,
            i_quadrants41_max: -1.0e10,
            flag_clip: false,
            flag_rate: false,
        }
    }

    /// Enable the Q41 sloped voltage envelope. A spread of less than 1 A
    /// between the two current points disables it (collapses to the user
    /// box), matching the minimum-spread requirement on real converters.
    pub fn enable_q41(&mut self, i_points: [f32; 2], v_points: [f32; 2]) {
        let delta_i = i_points[1] - i_points[0];
        if delta_i >= 1.0 {
            self.dvdi = (v_points[1] - v_points[0]) / delta_i;
            self.v0 = (v_points[0] - self.dvdi * i_points[0]) * (1.0 + CLIP_MARGIN);
            self.i_quadrants41_max = i_points[1];
        } else {
            self.i_quadrants41_max = -1.0e10;
        }
        self.compute_vref_envelope(0.0);
    }

    /// Recompute `min_clip`/`max_clip` from the Q41 exclusion line for the
    /// current measurement. A no-op (envelope == user box) when Q41 is
    /// disabled.
    pub fn compute_vref_envelope(&mut self, i_meas: f32) {
        let i_meas = if self.invert { -i_meas } else { i_meas };

        self.max_clip = self.max_clip_user;
        if i_meas < self.i_quadrants41_max {
            let v_lim = (self.v0 + self.dvdi * i_meas).max(0.0);
            if v_lim < self.max_clip {
                self.max_clip = v_lim;
            }
        }

        self.min_clip = self.min_clip_user;
        if i_meas > -self.i_quadrants41_max {
            let v_lim = (-self.v0 + self.dvdi * i_meas).min(0.0);
            if v_lim > self.min_clip {
                self.min_clip = v_lim;
            }
        }
    }

    #[must_use]
    pub fn is_unipolar(&self) -> bool {
        self.unipolar
    }

    /// Arm or disarm the tighter `closeloop` bound; the orchestrator calls
    /// this on every tick with `reg_mode == CURRENT || reg_mode == FIELD`.
    pub fn set_closeloop_active(&mut self, active: bool) {
        self.closeloop_active = active;
    }

    /// Effective `(min_clip, max_clip)` for this tick: the Q41 envelope
    /// box, tightened to `closeloop` while a closed-loop mode is active.
    fn active_bounds(&self) -> (f32, f32) {
        if self.closeloop_active && self.closeloop > -1.0e29 {
            (self.min_clip.max(-self.closeloop), self.max_clip.min(self.closeloop))
        } else {
            (self.min_clip, self.max_clip)
        }
    }

    /// Clip `ref_value` to `[min_clip, max_clip]` (or their negation, when
    /// inverted) and then to the rate limit against `prev_ref`.
    pub fn clip(&mut self, ref_value: f32, prev_ref: f32, period: f32) -> (f32, RefClipFlags) {
        let mut r = ref_value;
        let (min_clip, max_clip) = self.active_bounds();

        if !self.invert {
            if r < min_clip {
                r = min_clip;
                self.flag_clip = true;
            } else if r > max_clip {
                r = max_clip;
                self.flag_clip = true;
            } else {
                self.flag_clip = false;
            }
        } else if r > -min_clip {
            r = -min_clip;
            self.flag_clip = true;
        } else if r < -max_clip {
            r = -max_clip;
            self.flag_clip = true;
        } else {
            self.flag_clip = false;
        }

        self.flag_rate = false;
        if self.rate_clip > 0.0 {
            let delta = r - prev_ref;
            if delta > 0.0 {
                let rate_lim_ref = prev_ref * (1.0 + FP32_MARGIN) + self.rate_clip * period;
                if r > rate_lim_ref {
                    r = rate_lim_ref;
                    self.flag_rate = true;
                }
            } else if delta < 0.0 {
                let rate_lim_ref = prev_ref * (1.0 - FP32_MARGIN) - self.rate_clip * period;
                if r < rate_lim_ref {
                    r = rate_lim_ref;
                    self.flag_rate = true;
                }
            }
        }

        (
            r,
            RefClipFlags {
                clip: self.flag_clip,
                rate: self.flag_rate,
            },
        )
    }
}
