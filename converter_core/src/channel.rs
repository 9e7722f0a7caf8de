//! Per-signal (field, current, voltage) measurement pipeline: invalid-input
//! substitution, the two-stage box-car filter, the rate estimator, and the
//! trip/low/zero and RMS² limit checks, bundled so the orchestrator can
//! treat all three channels uniformly.

use crate::filter::{BoxcarFilter, FilterOutput, RateEstimator};
use crate::limits::{MeasLimitFlags, MeasLimits, RmsLimitFlags, RmsLimits};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputStatus {
    #[default]
    Ok,
    Invalid,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelFlags {
    pub meas: MeasLimitFlags,
    pub rms: RmsLimitFlags,
}

/// One measured signal's full acquisition-to-limits pipeline.
#[derive(Debug, Clone)]
pub struct Channel {
    pub meas_limits: MeasLimits,
    pub rms_limits: RmsLimits,
    pub filter: BoxcarFilter,
    pub rate: RateEstimator,
    pub last_filtered: f32,
    pub last_rate: f32,
    pub invalid_count: u64,
}

impl Channel {
    #[must_use]
    pub fn new(
        meas_limits: MeasLimits,
        rms_limits: RmsLimits,
        filter: BoxcarFilter,
        rate_period_iters: u32,
    ) -> Self {
        Self {
            meas_limits,
            rms_limits,
            filter,
            rate: RateEstimator::new(rate_period_iters),
            last_filtered: 0.0,
            last_rate: 0.0,
            invalid_count: 0,
        }
    }

    /// Run one tick of the pipeline. `regulated_substitute`, when present,
    /// is `delayed_ref - last_err` from the active RST loop — used in
    /// place of plain rate extrapolation when this is the channel the
    /// orchestrator is currently regulating on.
    pub fn ingest(
        &mut self,
        measured: f32,
        status: InputStatus,
        regulated_substitute: Option<f32>,
        period: f32,
    ) -> (FilterOutput, ChannelFlags) {
        let input = match status {
            InputStatus::Ok => measured,
            InputStatus::Invalid => {
                self.invalid_count += 1;
                regulated_substitute.unwrap_or(self.last_filtered + self.last_rate * period)
            }
        };

        let out = self.filter.tick(input);
        self.last_rate = self.rate.update(out.filtered, period);
        self.last_filtered = out.filtered;

        let flags = ChannelFlags {
            meas: self.meas_limits.check(out.filtered),
            rms: self.rms_limits.check(out.filtered),
        };

        (out, flags)
    }
}
