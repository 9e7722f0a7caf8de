//! RST (three-polynomial) digital feedback regulator: pole-placement
//! design against the load's discretized pole, a Jury stability check, a
//! modulus-margin robustness check, fixed-point-free `f64` execution with
//! back-calculation anti-windup, and the non-RT-to-RT atomic parameter
//! swap.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::load::LoadModel;

/// Pole-placement family. Both place the discretized load pole and two
/// extra closed-loop poles via the same third-order characteristic
/// polynomial; they differ only in where those two extra poles go.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RstAlgorithm {
    /// Deadbeat placement: all three closed-loop poles at `z = 0`. The
    /// resulting `S`/`R` reduce to a textbook discrete PI controller.
    PiDeadbeat,
    /// Places a complex conjugate pole pair at the given natural
    /// frequency (Hz) and damping ratio, with the load pole left as the
    /// third root.
    TwoAuxPoles { auxpoles2_hz: f32, z: f32 },
}

/// Outcome of [`design`] beyond the polynomials themselves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DesignStatus {
    Ok,
    /// Stable, but the modulus margin is below the warning threshold.
    Warning { modulus_margin: f64 },
    /// The Jury test rejected the closed loop; `pars` in [`design`]'s
    /// return value is the last stable design attempted, not this one.
    Fault,
}

/// The three polynomials and bookkeeping constants produced by [`design`].
/// `s`/`r`/`t` are in ascending powers of `z^-1` (`s[0]` multiplies
/// `act[k]`, etc).
#[derive(Debug, Clone, PartialEq)]
pub struct RstPars {
    pub s: [f64; 3],
    pub r: [f64; 2],
    pub t: [f64; 1],
    pub track_delay_periods: f64,
    pub ref_delay_periods: f64,
}

/// Design an RST triplet for a first-order load against the requested
/// algorithm. `pure_delay_periods` folds into the track-delay estimate
/// that seeds [`TrackDelayEstimator`].
#[must_use]
pub fn design(
    alg: RstAlgorithm,
    load: &LoadModel,
    reg_period: f32,
    pure_delay_periods: f64,
    modulus_margin_warning: f64,
) -> (RstPars, DesignStatus) {
    let coeffs = load.step_coeffs(reg_period);
    // Plant in ascending z^-1: A = [1, a1], B = [0, b1].
    let a1 = -f64::from(coeffs.gain1);
    let b1 = f64::from(coeffs.gain2);

    let (d1, d2, d3) = match alg {
        RstAlgorithm::PiDeadbeat => (0.0, 0.0, 0.0),
        RstAlgorithm::TwoAuxPoles { auxpoles2_hz, z } => {
            let ts = f64::from(reg_period);
            let wn = 2.0 * std::f64::consts::PI * f64::from(auxpoles2_hz);
            let zeta = f64::from(z);
            let decay = (-zeta * wn * ts).exp();
            let wd = wn * (1.0 - zeta * zeta).max(0.0).sqrt();
            let re_pole = decay * (wd * ts).cos();
            let pole_mag2 = decay * decay;
            // desired = (z - pole_z) * (z^2 - 2*re_pole*z + pole_mag2)
            let pole_z = f64::from(coeffs.gain1);
            let d1 = -2.0 * re_pole - pole_z;
            let d2 = pole_mag2 + 2.0 * re_pole * pole_z;
            let d3 = -pole_mag2 * pole_z;
            (d1, d2, d3)
        }
    };

    // Solve s1, r0, r1 from the three characteristic-polynomial equations
    // (see module docs for the derivation: S = (1-z^-1)(1+s1 z^-1),
    // R = r0 + r1 z^-1, against a first-order plant A = [1,a1], B=[0,b1]).
    let s1 = if a1.abs() > 1.0e-12 { -d3 / a1 } else { 0.0 };
    let r0 = (d1 - s1 + 1.0 - a1) / b1;
    let r1 = (d2 - s1 * (a1 - 1.0) + a1) / b1;

    let s = [1.0, s1 - 1.0, -s1];
    let r = [r0, r1];
    let t_sum = r[0] + r[1] + s[0] + s[1] + s[2];
    let t = [t_sum];

    let char_poly = [1.0, d1, d2, d3];
    let pars = RstPars {
        s,
        r,
        t,
        track_delay_periods: pure_delay_periods,
        ref_delay_periods: pure_delay_periods,
    };

    if !jury_stable(&char_poly) {
        return (pars, DesignStatus::Fault);
    }

    let margin = modulus_margin(&[1.0, a1], &s, &[0.0, b1], &r);
    if margin < modulus_margin_warning {
        (pars, DesignStatus::Warning { modulus_margin: margin })
    } else {
        (pars, DesignStatus::Ok)
    }
}

/// Jury stability test via the step-down (reflection-coefficient)
/// recursion: equivalent to the classical Jury array, implemented as
/// repeated polynomial deflation. `coeffs` is `[1, c1, .., cn]`, the
/// monic characteristic polynomial in descending powers of `z`.
#[must_use]
pub fn jury_stable(coeffs: &[f64]) -> bool {
    let mut a: Vec<f64> = coeffs.to_vec();
    if a.is_empty() || a[0] == 0.0 {
        return false;
    }
    let a0 = a[0];
    for x in &mut a {
        *x /= a0;
    }
    let mut n = a.len() - 1;
    while n > 0 {
        let k = a[n];
        if k.abs() >= 1.0 {
            return false;
        }
        let mut next = vec![0.0f64; n];
        next[0] = 1.0;
        let denom = 1.0 - k * k;
        for i in 1..n {
            next[i] = (a[i] - k * a[n - i]) / denom;
        }
        a = next;
        n -= 1;
    }
    true
}

fn complex_eval(poly: &[f64], w: f64) -> (f64, f64) {
    let mut re = 0.0;
    let mut im = 0.0;
    for (k, c) in poly.iter().enumerate() {
        let theta = -(k as f64) * w;
        re += c * theta.cos();
        im += c * theta.sin();
    }
    (re, im)
}

fn cmul(a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    (a.0 * b.0 - a.1 * b.1, a.0 * b.1 + a.1 * b.0)
}

fn cadd(a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    (a.0 + b.0, a.1 + b.1)
}

fn cabs(a: (f64, f64)) -> f64 {
    a.0.hypot(a.1)
}

/// Minimum, over a dense frequency grid, of `|1 + L(e^{jw})|` where
/// `L = B R / (A S)` is the open-loop transfer function: the distance of
/// the Nyquist curve of the loop gain from the critical point `-1`.
#[must_use]
pub fn modulus_margin(a: &[f64], s: &[f64], b: &[f64], r: &[f64]) -> f64 {
    const STEPS: usize = 256;
    let mut min_ratio = f64::INFINITY;
    for i in 0..=STEPS {
        let w = std::f64::consts::PI * (i as f64) / (STEPS as f64);
        let av = complex_eval(a, w);
        let sv = complex_eval(s, w);
        let bv = complex_eval(b, w);
        let rv = complex_eval(r, w);
        let as_ = cmul(av, sv);
        let br = cmul(bv, rv);
        let p = cadd(as_, br);
        let denom = cabs(as_).max(1.0e-12);
        min_ratio = min_ratio.min(cabs(p) / denom);
    }
    min_ratio
}

const HIST_LEN: usize = 16;
const HIST_MASK: usize = HIST_LEN - 1;

/// Ring history of `act`/`ref`/`meas` samples the execution step reads
/// and writes.
#[derive(Debug, Clone)]
pub struct RstHistory {
    act: [f64; HIST_LEN],
    ref_: [f64; HIST_LEN],
    meas: [f64; HIST_LEN],
    index: usize,
}

impl Default for RstHistory {
    fn default() -> Self {
        Self {
            act: [0.0; HIST_LEN],
            ref_: [0.0; HIST_LEN],
            meas: [0.0; HIST_LEN],
            index: 0,
        }
    }
}

impl RstHistory {
    /// Seed every slot of the history with a single steady-state sample,
    /// used on a mode change so the first execution tick doesn't see a
    /// discontinuity against zeroed history.
    pub fn seed(&mut self, act: f64, ref_v: f64, meas: f64) {
        self.act = [act; HIST_LEN];
        self.ref_ = [ref_v; HIST_LEN];
        self.meas = [meas; HIST_LEN];
    }

    fn at(ring: &[f64; HIST_LEN], index: usize, back: usize) -> f64 {
        ring[index.wrapping_sub(back) & HIST_MASK]
    }

    /// Current actuation, before any back-calculation.
    #[must_use]
    pub fn act(&self) -> f64 {
        self.act[self.index]
    }

    /// Current entry in the reference ring (post-clip).
    #[must_use]
    pub fn ref_value(&self) -> f64 {
        self.ref_[self.index]
    }

    /// Index into the reference ring at `ref_delay_periods + offset_iters
    /// / period` regulation periods in the past.
    #[must_use]
    pub fn delayed_ref(&self, ref_delay_periods: f64, offset_iters: f64, period: f64) -> f64 {
        let back_periods = ref_delay_periods + offset_iters / period.max(1.0e-9);
        let back = back_periods.round().max(0.0) as usize;
        Self::at(&self.ref_, self.index, back.min(HIST_LEN - 1))
    }

    /// Mean of the actuation ring, used to hand off a representative
    /// steady-state value when leaving closed loop for `VOLTAGE` mode.
    #[must_use]
    pub fn act_average(&self) -> f64 {
        self.act.iter().sum::<f64>() / (HIST_LEN as f64)
    }
}

/// Execute one regulation tick: advance history, compute `act[k]`, and
/// (if the caller reports the downstream clipper limited it) recompute
/// `ref[k]` so the histories stay consistent with the limited
/// actuation — wind-up free without an explicit anti-windup scheme.
#[derive(Debug, Clone, Default)]
pub struct RstExecutor {
    pub history: RstHistory,
}

impl RstExecutor {
    /// Compute `act[k]` from `ref_k`/`meas_k` and advance the histories.
    pub fn calc_act(&mut self, pars: &RstPars, ref_k: f64, meas_k: f64) -> f64 {
        self.history.index = (self.history.index + 1) & HIST_MASK;
        let idx = self.history.index;
        self.history.ref_[idx] = ref_k;
        self.history.meas[idx] = meas_k;

        let mut sum = pars.t[0] * ref_k - pars.r[0] * meas_k;
        for i in 1..pars.r.len() {
            sum -= pars.r[i] * RstHistory::at(&self.history.meas, idx, i);
        }
        for i in 1..pars.t.len() {
            sum += pars.t[i] * RstHistory::at(&self.history.ref_, idx, i);
        }
        for i in 1..pars.s.len() {
            sum -= pars.s[i] * RstHistory::at(&self.history.act, idx, i);
        }
        let act = sum / pars.s[0];
        self.history.act[idx] = act;
        act
    }

    /// Recompute `ref[k]` so that `act_limited` (what the downstream
    /// clipper actually applied) is consistent with the histories,
    /// overwriting both rings at the current index.
    pub fn back_calculate(&mut self, pars: &RstPars, act_limited: f64, meas_k: f64) -> f64 {
        let idx = self.history.index;
        let mut sum = -pars.r[0] * meas_k;
        for i in 1..pars.r.len() {
            sum -= pars.r[i] * RstHistory::at(&self.history.meas, idx, i);
        }
        for i in 1..pars.t.len() {
            sum += pars.t[i] * RstHistory::at(&self.history.ref_, idx, i);
        }
        for i in 1..pars.s.len() {
            sum -= pars.s[i] * RstHistory::at(&self.history.act, idx, i);
        }
        let ref_k = (pars.s[0] * act_limited - sum) / pars.t[0];
        self.history.ref_[idx] = ref_k;
        self.history.act[idx] = act_limited;
        ref_k
    }
}

/// Moving-window estimate of the control loop's track delay, by finding
/// the lag (in periods) that best aligns the commanded reference with
/// its clipped counterpart.
#[derive(Debug, Clone)]
pub struct TrackDelayEstimator {
    window: VecDeque<(f64, f64)>,
    capacity: usize,
    max_lag: usize,
    pub estimate_periods: f64,
}

impl TrackDelayEstimator {
    #[must_use]
    pub fn new(initial_periods: f64) -> Self {
        Self {
            window: VecDeque::with_capacity(16),
            capacity: 16,
            max_lag: 4,
            estimate_periods: initial_periods,
        }
    }

    pub fn update(&mut self, ref_cmd: f64, ref_limited: f64) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back((ref_cmd, ref_limited));
        if self.window.len() < self.max_lag + 2 {
            return;
        }

        let cmd: Vec<f64> = self.window.iter().map(|p| p.0).collect();
        let lim: Vec<f64> = self.window.iter().map(|p| p.1).collect();
        let n = cmd.len();

        let mut best_lag = 0usize;
        let mut best_err = f64::INFINITY;
        for lag in 0..=self.max_lag {
            if lag >= n {
                break;
            }
            let mut err = 0.0;
            for i in lag..n {
                let d = cmd[i - lag] - lim[i];
                err += d * d;
            }
            if err < best_err {
                best_err = err;
                best_lag = lag;
            }
        }

        // Exponential smoothing towards the best-fit lag to avoid chatter.
        self.estimate_periods += 0.25 * (best_lag as f64 - self.estimate_periods);
    }
}

/// Non-RT-to-RT atomic parameter swap: the non-RT side stages a new
/// [`RstPars`] into `next` and raises `use_next`; the tick loop polls it
/// once per iteration and, if set, swaps `active` for `next` and clears
/// the flag. `next` is a [`Mutex`] rather than a raw pointer swap since
/// safe Rust has no lock-free `Box` swap without an external crate; the
/// lock is uncontended except during the rare swap itself.
#[derive(Debug)]
pub struct RstSlot {
    active: RstPars,
    next: Mutex<Option<RstPars>>,
    use_next: AtomicBool,
}

impl RstSlot {
    #[must_use]
    pub fn new(initial: RstPars) -> Self {
        Self {
            active: initial,
            next: Mutex::new(None),
            use_next: AtomicBool::new(false),
        }
    }

    /// Called from non-RT code to publish a new design.
    pub fn publish(&self, pars: RstPars) {
        if let Ok(mut guard) = self.next.lock() {
            *guard = Some(pars);
        }
        self.use_next.store(true, Ordering::Release);
    }

    /// Called once per tick loop entry. Swaps in the staged parameters if
    /// one was published since the last call.
    pub fn poll_swap(&mut self) {
        if self.use_next.swap(false, Ordering::Acquire) {
            if let Ok(mut guard) = self.next.lock() {
                if let Some(p) = guard.take() {
                    self.active = p;
                }
            }
        }
    }

    #[must_use]
    pub fn active(&self) -> &RstPars {
        &self.active
    }
}
