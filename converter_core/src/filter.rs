//! Two-stage cascaded box-car measurement filter, its extrapolation stage,
//! and the four-sample least-squares rate estimator that rides on top of
//! the filtered signal.

use crate::fixed_point::{trunc_div_i32, QuantScale};

/// The three views of a measurement a channel can regulate on or log.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FilterOutput {
    pub unfiltered: f32,
    pub filtered: f32,
    pub extrapolated: f32,
}

/// Two cascaded box-car FIR stages with `i32` accumulators, followed by an
/// extrapolation stage that cancels the filter's group delay.
#[derive(Debug, Clone)]
pub struct BoxcarFilter {
    l0: usize,
    l1: usize,
    buf0: Vec<i32>,
    idx0: usize,
    acc0: i32,
    buf1: Vec<i32>,
    idx1: usize,
    acc1: i32,
    extrap_buf: Vec<f32>,
    e_idx: usize,
    extrapolation_factor: f32,
    max_meas_value: f32,
    scale: QuantScale,
    pub enabled: bool,
    /// Total measurement delay in iterations: hardware delay plus half the
    /// combined FIR length.
    pub filter_delay_iters: f32,
}

impl BoxcarFilter {
    /// `l0`/`l1` are the box-car lengths (`l1 <= l0` for exact DC
    /// reconstruction); `extrapolation_len_iters` sizes the delay-canceling
    /// ring; `meas_hw_delay_iters` is the upstream hardware filter's own
    /// delay, in iterations; `pos`/`neg` bound the signal this filter will
    /// ever see and size the fixed-point quantizer.
    #[must_use]
    pub fn new(
        l0: usize,
        l1: usize,
        extrapolation_len_iters: usize,
        meas_hw_delay_iters: f32,
        pos: f32,
        neg: f32,
    ) -> Self {
        let l0 = l0.max(1);
        let l1 = l1.max(1);
        let e_len = extrapolation_len_iters.max(1);
        let max_meas_value = 1.1 * pos.max(-neg).max(f32::MIN_POSITIVE);
        let total = (l0 + l1) as f32;
        let filter_delay_iters = meas_hw_delay_iters + 0.5 * (total - 2.0);

        Self {
            l0,
            l1,
            buf0: vec![0; l0],
            idx0: 0,
            acc0: 0,
            buf1: vec![0; l1],
            idx1: 0,
            acc1: 0,
            extrap_buf: vec![0.0; e_len],
            e_idx: 0,
            extrapolation_factor: filter_delay_iters / (e_len as f32),
            max_meas_value,
            scale: QuantScale::new(l0, l1, max_meas_value),
            enabled: true,
            filter_delay_iters,
        }
    }

    /// Run one iteration of the filter on `unfiltered`. When disabled, all
    /// three outputs equal the input directly.
    pub fn tick(&mut self, unfiltered: f32) -> FilterOutput {
        if !self.enabled {
            return FilterOutput {
                unfiltered,
                filtered: unfiltered,
                extrapolated: unfiltered,
            };
        }

        let sample = self.scale.quantize(unfiltered, self.max_meas_value);

        self.acc0 += sample - self.buf0[self.idx0];
        self.buf0[self.idx0] = sample;
        self.idx0 += 1;
        if self.idx0 >= self.l0 {
            self.idx0 = 0;
        }

        let stage0_out = trunc_div_i32(self.acc0, self.l0);

        self.acc1 += stage0_out - self.buf1[self.idx1];
        self.buf1[self.idx1] = stage0_out;
        self.idx1 += 1;
        if self.idx1 >= self.l1 {
            self.idx1 = 0;
        }

        let filtered = (self.acc1 as f32) * self.scale.integer_to_float;

        let old = self.extrap_buf[self.e_idx];
        self.extrap_buf[self.e_idx] = filtered;
        self.e_idx += 1;
        if self.e_idx >= self.extrap_buf.len() {
            self.e_idx = 0;
        }

        let extrapolated = filtered + self.extrapolation_factor * (filtered - old);

        FilterOutput {
            unfiltered,
            filtered,
            extrapolated,
        }
    }
}

const RATE_BUF_LEN: usize = 4;
const RATE_BUF_MASK: usize = RATE_BUF_LEN - 1;

/// Least-squares rate (d/dt) estimator through the last four samples of a
/// signal stored every `period_iters` ticks.
#[derive(Debug, Clone, Copy)]
pub struct RateEstimator {
    history: [f32; RATE_BUF_LEN],
    index: usize,
    iter_counter: u32,
    period_iters: u32,
    estimate: f32,
}

impl RateEstimator {
    #[must_use]
    pub fn new(period_iters: u32) -> Self {
        Self {
            history: [0.0; RATE_BUF_LEN],
            index: 0,
            iter_counter: 0,
            period_iters: period_iters.max(1),
            estimate: 0.0,
        }
    }

    /// Feed one filtered sample. Only every `period_iters`-th call updates
    /// the stored history and recomputes the estimate; `period` is the time
    /// between stored samples (`period_iters * iter_period`).
    pub fn update(&mut self, filtered_meas: f32, period: f32) -> f32 {
        self.iter_counter += 1;
        if self.iter_counter >= self.period_iters {
            self.iter_counter = 0;
            self.index = (self.index + 1) & RATE_BUF_MASK;
            self.history[self.index] = filtered_meas;

            let s0 = self.history[self.index];
            let s1 = self.history[(self.index.wrapping_sub(1)) & RATE_BUF_MASK];
            let s2 = self.history[(self.index.wrapping_sub(2)) & RATE_BUF_MASK];
            let s3 = self.history[(self.index.wrapping_sub(3)) & RATE_BUF_MASK];

            self.estimate = (2.0 / (20.0 * period)) * (3.0 * (s0 - s3) + (s1 - s2));
        }
        self.estimate
    }

    #[must_use]
    pub fn estimate(&self) -> f32 {
        self.estimate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_input_converges_to_itself() {
        let mut f = BoxcarFilter::new(8, 4, 4, 0.0, 100.0, -100.0);
        let x = 37.5f32;
        let mut last = FilterOutput::default();
        for _ in 0..64 {
            last = f.tick(x);
        }
        assert!(
            (last.filtered - x).abs() < 0.1,
            "filtered={} x={x}",
            last.filtered
        );
        assert!((last.extrapolated - x).abs() < 0.1);
    }

    #[test]
    fn disabled_filter_bypasses_stages() {
        let mut f = BoxcarFilter::new(8, 4, 4, 0.0, 100.0, -100.0);
        f.enabled = false;
        let out = f.tick(12.34);
        assert_eq!(out.unfiltered, 12.34);
        assert_eq!(out.filtered, 12.34);
        assert_eq!(out.extrapolated, 12.34);
    }

    #[test]
    fn filter_delay_matches_formula() {
        let f = BoxcarFilter::new(10, 6, 8, 2.0, 100.0, -100.0);
        // 2.0 + 0.5*(16-2) = 9.0
        assert!((f.filter_delay_iters - 9.0).abs() < 1e-6);
    }

    #[test]
    fn rate_estimator_tracks_ramp_slope() {
        let mut rate = RateEstimator::new(1);
        let period = 1.0f32;
        let slope = 2.0f32;
        let mut last = 0.0;
        for i in 0..20 {
            last = rate.update(slope * (i as f32), period);
        }
        assert!((last - slope).abs() < 0.2, "rate={last}");
    }

    #[test]
    fn rate_estimator_only_samples_every_period_iters() {
        let mut rate = RateEstimator::new(4);
        let before = rate.estimate();
        rate.update(100.0, 1.0);
        rate.update(100.0, 1.0);
        rate.update(100.0, 1.0);
        assert_eq!(rate.estimate(), before);
        rate.update(100.0, 1.0);
        // Fourth call crosses period_iters and recomputes.
    }
}
