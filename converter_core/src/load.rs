//! Magnet circuit load model: unsaturated RL time constant and DC gain,
//! the analytic per-iteration step-response coefficients the simulator
//! steps exactly (rather than integrating numerically), and the
//! saturation-compensation maps used around the reference clipper.

/// Unsaturated load electrical parameters and their derived step-response
/// coefficients.
#[derive(Debug, Clone, Copy)]
pub struct LoadModel {
    pub ohms_ser: f32,
    pub ohms_par: f32,
    pub ohms_mag: f32,
    pub henrys: f32,
    /// `Rs + Rm*Rp/(Rm+Rp)`: the resistance the inductor sees.
    pub ohms: f32,
    /// `Rm*Rp/(Rm+Rp)`, the parallel combination alone.
    pub ohms1: f32,
    /// `L / ohms`, the circuit's open-loop time constant.
    pub tc: f32,
    pub gauss_per_amp: f32,
    sat: Option<Saturation>,
}

/// Per-iteration coefficients for exact analytic stepping of the first
/// order RL response `L di/dt + ohms*i = v`, held constant over one
/// iteration of length `period`:
/// `i(period) = gain1*i(0) + gain2*v`, `gain0` the DC gain and `gain3`
/// the slope coefficient used to recover `di/dt` without re-deriving it.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepCoeffs {
    pub gain0: f32,
    pub gain1: f32,
    pub gain2: f32,
    pub gain3: f32,
}

impl LoadModel {
    #[must_use]
    pub fn new(ohms_ser: f32, ohms_par: f32, ohms_mag: f32, henrys: f32, gauss_per_amp: f32) -> Self {
        let ohms1 = if ohms_mag + ohms_par != 0.0 {
            ohms_mag * ohms_par / (ohms_mag + ohms_par)
        } else {
            0.0
        };
        let ohms = ohms_ser + ohms1;
        let tc = if ohms > 0.0 { henrys / ohms } else { 0.0 };
        Self {
            ohms_ser,
            ohms_par,
            ohms_mag,
            henrys,
            ohms,
            ohms1,
            tc,
            gauss_per_amp,
            sat: None,
        }
    }

    /// Attach the saturation map; `i_sat_end <= i_sat_start` disables it.
    pub fn with_saturation(mut self, henrys_sat: f32, i_sat_start: f32, i_sat_end: f32) -> Self {
        if i_sat_end > i_sat_start {
            self.sat = Some(Saturation {
                henrys0: self.henrys,
                henrys_sat,
                i_sat_start,
                i_sat_end,
            });
        }
        self
    }

    /// Exact step-response coefficients for one iteration of length
    /// `period`, for the unsaturated model.
    #[must_use]
    pub fn step_coeffs(&self, period: f32) -> StepCoeffs {
        if self.tc <= 0.0 || self.henrys <= 0.0 {
            return StepCoeffs {
                gain0: 0.0,
                gain1: 0.0,
                gain2: 0.0,
                gain3: 0.0,
            };
        }
        let gain0 = 1.0 / self.ohms;
        let gain1 = (-period / self.tc).exp();
        let gain2 = gain0 * (1.0 - gain1);
        let gain3 = self.ohms / self.henrys;
        StepCoeffs {
            gain0,
            gain1,
            gain2,
            gain3,
        }
    }

    /// Instantaneous ratio `L(i)/L0`, `1.0` when saturation is disabled.
    #[must_use]
    pub fn sat_factor(&self, i: f32) -> f32 {
        self.sat.map_or(1.0, |s| s.local_inductance(i) / s.henrys0)
    }

    /// Scale a reference voltage to account for the reduced effective
    /// inductance as the magnet enters saturation.
    #[must_use]
    pub fn vref_sat(&self, i: f32, v: f32) -> f32 {
        v * self.sat_factor(i)
    }

    /// Undo [`Self::vref_sat`], recovering the uncompensated voltage from
    /// one that may have since been clipped.
    #[must_use]
    pub fn inverse_vref_sat(&self, i: f32, v_sat: f32) -> f32 {
        let factor = self.sat_factor(i);
        if factor > 0.0 {
            v_sat / factor
        } else {
            v_sat
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Saturation {
    henrys0: f32,
    henrys_sat: f32,
    i_sat_start: f32,
    i_sat_end: f32,
}

impl Saturation {
    /// Monotonic piecewise-linear inductance map: flat at `henrys0` below
    /// `i_sat_start`, flat at `henrys_sat` above `i_sat_end`, linear
    /// between.
    fn local_inductance(&self, i: f32) -> f32 {
        let ai = i.abs();
        if ai <= self.i_sat_start {
            self.henrys0
        } else if ai >= self.i_sat_end {
            self.henrys_sat
        } else {
            let span = self.i_sat_end - self.i_sat_start;
            let frac = (ai - self.i_sat_start) / span;
            self.henrys0 + (self.henrys_sat - self.henrys0) * frac
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tc_and_ohms_match_series_parallel_formula() {
        let load = LoadModel::new(0.5, 1.0e9, 2.0, 1.0, 1.0);
        // ohms_par effectively infinite, so ohms1 -> ohms_mag.
        assert!((load.ohms1 - 2.0).abs() < 1e-3);
        assert!((load.ohms - 2.5).abs() < 1e-3);
        assert!((load.tc - 1.0 / 2.5).abs() < 1e-6);
    }

    #[test]
    fn step_response_converges_to_dc_gain() {
        let load = LoadModel::new(0.5, 1.0e9, 2.0, 1.0, 1.0);
        let coeffs = load.step_coeffs(0.01);
        let v = 10.0f32;
        let mut i = 0.0f32;
        for _ in 0..5000 {
            i = coeffs.gain1 * i + coeffs.gain2 * v;
        }
        let expected = coeffs.gain0 * v;
        assert!((i - expected).abs() < 1e-3, "i={i} expected={expected}");
    }

    #[test]
    fn saturation_disabled_returns_unity_factor() {
        let load = LoadModel::new(0.5, 1.0e9, 2.0, 1.0, 1.0);
        assert_eq!(load.sat_factor(1000.0), 1.0);
        assert_eq!(load.vref_sat(50.0, 12.0), 12.0);
    }

    #[test]
    fn saturation_factor_is_monotonic_and_bounded() {
        let load =
            LoadModel::new(0.5, 1.0e9, 2.0, 1.0, 1.0).with_saturation(0.4, 100.0, 200.0);
        let f_low = load.sat_factor(50.0);
        let f_mid = load.sat_factor(150.0);
        let f_high = load.sat_factor(300.0);
        assert_eq!(f_low, 1.0);
        assert!((f_high - 0.4).abs() < 1e-6);
        assert!(f_mid < f_low && f_mid > f_high);
    }

    #[test]
    fn vref_sat_round_trips_through_inverse() {
        let load =
            LoadModel::new(0.5, 1.0e9, 2.0, 1.0, 1.0).with_saturation(0.4, 100.0, 200.0);
        let v = 37.0f32;
        let i = 150.0f32;
        let compensated = load.vref_sat(i, v);
        let back = load.inverse_vref_sat(i, compensated);
        assert!((back - v).abs() < 1e-4);
    }
}
