//! Regulation error monitor: tracks `delayed_ref - meas` and raises sticky
//! warning/fault flags against absolute thresholds. Purely observational —
//! it never forces a mode change itself, the orchestrator reads its flags.

/// Flags produced by [`ErrorMonitor::check`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorMonitorFlags {
    pub warning: bool,
    pub fault: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ErrorMonitor {
    warning_threshold: f32,
    fault_threshold: f32,
    pub last_err: f32,
    pub max_abs_err: f32,
    flag_warning: bool,
    flag_fault: bool,
}

impl ErrorMonitor {
    /// A non-positive threshold disables that flag entirely.
    #[must_use]
    pub fn new(warning_threshold: f32, fault_threshold: f32) -> Self {
        Self {
            warning_threshold,
            fault_threshold,
            last_err: 0.0,
            max_abs_err: 0.0,
            flag_warning: false,
            flag_fault: false,
        }
    }

    pub fn check(&mut self, delayed_ref: f32, meas: f32) -> ErrorMonitorFlags {
        let err = delayed_ref - meas;
        self.last_err = err;
        let abs_err = err.abs();
        if abs_err > self.max_abs_err {
            self.max_abs_err = abs_err;
        }

        self.flag_warning = self.warning_threshold > 0.0 && abs_err > self.warning_threshold;
        self.flag_fault = self.fault_threshold > 0.0 && abs_err > self.fault_threshold;

        ErrorMonitorFlags {
            warning: self.flag_warning,
            fault: self.flag_fault,
        }
    }

    pub fn reset(&mut self) {
        self.last_err = 0.0;
        self.max_abs_err = 0.0;
        self.flag_warning = false;
        self.flag_fault = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_signed_error_and_running_max() {
        let mut mon = ErrorMonitor::new(1.0, 2.0);
        mon.check(10.0, 9.5);
        assert!((mon.last_err - 0.5).abs() < 1e-6);
        mon.check(10.0, 12.0);
        assert!((mon.last_err - -2.0).abs() < 1e-6);
        assert!((mon.max_abs_err - 2.0).abs() < 1e-6);
    }

    #[test]
    fn warning_and_fault_trip_independently() {
        let mut mon = ErrorMonitor::new(1.0, 2.0);
        let flags = mon.check(10.0, 8.5);
        assert!(flags.warning);
        assert!(!flags.fault);

        let flags = mon.check(10.0, 7.0);
        assert!(flags.warning);
        assert!(flags.fault);
    }

    #[test]
    fn disabled_thresholds_never_trip() {
        let mut mon = ErrorMonitor::new(0.0, 0.0);
        let flags = mon.check(10.0, -1000.0);
        assert!(!flags.warning);
        assert!(!flags.fault);
    }

    #[test]
    fn reset_clears_state() {
        let mut mon = ErrorMonitor::new(1.0, 2.0);
        mon.check(10.0, 0.0);
        assert!(mon.max_abs_err > 0.0);
        mon.reset();
        assert_eq!(mon.max_abs_err, 0.0);
        assert_eq!(mon.last_err, 0.0);
    }
}
