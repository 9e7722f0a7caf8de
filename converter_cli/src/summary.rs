//! Aggregates `TickOutput`s from a `Run` invocation into a compact report.

use std::fmt;

use converter_core::orchestrator::TickOutput;
use converter_core::rst::DesignStatus;
use serde_json::json;

#[derive(Debug, Default)]
pub struct RunSummary {
    pub ticks: u64,
    pub regulation_ticks: u64,
    pub last_v_ref: f32,
    pub field_trips: u64,
    pub current_trips: u64,
    pub voltage_trips: u64,
    pub ref_clips: u64,
    pub current_error_faults: u64,
    pub field_error_faults: u64,
    pub current_design_warning: bool,
    pub field_design_warning: bool,
}

impl RunSummary {
    pub fn observe(&mut self, tick: &TickOutput) {
        self.ticks += 1;
        self.last_v_ref = tick.v_ref;
        if tick.is_regulation_iter {
            self.regulation_ticks += 1;
        }
        if tick.field_flags.meas.trip {
            self.field_trips += 1;
        }
        if tick.current_flags.meas.trip {
            self.current_trips += 1;
        }
        if tick.voltage_flags.meas.trip {
            self.voltage_trips += 1;
        }
        if tick.ref_clip_flags.clip {
            self.ref_clips += 1;
        }
        if tick.current_error.fault {
            self.current_error_faults += 1;
        }
        if tick.field_error.fault {
            self.field_error_faults += 1;
        }
        if matches!(tick.current_design, Some(DesignStatus::Warning { .. })) {
            self.current_design_warning = true;
        }
        if matches!(tick.field_design, Some(DesignStatus::Warning { .. })) {
            self.field_design_warning = true;
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "ticks": self.ticks,
            "regulation_ticks": self.regulation_ticks,
            "last_v_ref": self.last_v_ref,
            "field_trips": self.field_trips,
            "current_trips": self.current_trips,
            "voltage_trips": self.voltage_trips,
            "ref_clips": self.ref_clips,
            "current_error_faults": self.current_error_faults,
            "field_error_faults": self.field_error_faults,
            "current_design_warning": self.current_design_warning,
            "field_design_warning": self.field_design_warning,
        })
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ticks: {} ({} regulation)", self.ticks, self.regulation_ticks)?;
        writeln!(f, "final v_ref: {:.4}", self.last_v_ref)?;
        writeln!(
            f,
            "trips: field={} current={} voltage={} ref_clip={}",
            self.field_trips, self.current_trips, self.voltage_trips, self.ref_clips
        )?;
        writeln!(
            f,
            "error faults: current={} field={}",
            self.current_error_faults, self.field_error_faults
        )?;
        write!(
            f,
            "rst design warnings: current={} field={}",
            self.current_design_warning, self.field_design_warning
        )
    }
}
