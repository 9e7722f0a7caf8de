//! End-to-end regulation scenarios driving the engine against its own
//! simulator, the way a bench commissioning run would.

use converter_core::builder::{ChannelConfig, ConverterEngineBuilder};
use converter_core::limits::RefClip;
use converter_core::load::LoadModel;
use converter_core::orchestrator::MeasurementInput;
use converter_core::refgen::{FgLimitsPolarity, FgMeta, Plep};
use converter_core::rst::RstAlgorithm;
use converter_core::simulator::{Actuation, MeasChannel, Simulator, VoltageSource};
use converter_core::RegMode;

fn wide_channel() -> ChannelConfig {
    ChannelConfig {
        pos: 1.0e6,
        neg: -1.0e6,
        low: 0.0,
        zero: 0.0,
        invert: false,
        rms_warning: 1.0e6,
        rms_fault: 1.0e6,
        rms_tc: 1.0,
        fir_lengths: [4, 2],
        extrapolation_len_iters: 2,
        meas_hw_delay_iters: 0.0,
    }
}

fn no_noise_meas_channel() -> MeasChannel {
    MeasChannel::new(0.0, 0.0, u32::MAX, 0.0, 0.0)
}

/// S1 — resistive load, voltage mode step response: R=1, L=1 (tc=1s).
#[test]
fn s1_resistive_load_voltage_step_settles_to_one_volt() {
    let iter_period = 0.001;
    let load = LoadModel::new(1.0, 1.0e9, 0.0, 1.0, 1.0);
    let sim = Simulator::new(
        VoltageSource::from_tustin(1.0e6, 1.0, 0.0, iter_period),
        Actuation::VoltageRef,
        load,
        iter_period,
        no_noise_meas_channel(),
        no_noise_meas_channel(),
        no_noise_meas_channel(),
    );

    let mut engine = ConverterEngineBuilder::new(iter_period)
        .load(load)
        .field_channel(wide_channel())
        .current_channel(wide_channel())
        .voltage_channel(wide_channel())
        .ref_clip(RefClip::new(1.0e6, 0.0, -1.0e6, 1.0e9, false, -1.0e30))
        .simulator(sim)
        .build()
        .expect("engine builds");
    engine.set_mode(RegMode::Voltage);

    let mut field_meas = MeasurementInput::ok(0.0);
    let mut current_meas = MeasurementInput::ok(0.0);
    let mut voltage_meas = MeasurementInput::ok(0.0);
    let mut last_current = 0.0f32;

    for i in 0..5000 {
        let t = f64::from(i) * iter_period as f64;
        let v_ref = if t < 0.1 { 0.0 } else { 1.0 };
        engine.set_measurements(field_meas, current_meas, voltage_meas);
        engine.tick(v_ref);
        if let Some(out) = engine.simulate(0.0) {
            field_meas = MeasurementInput::ok(out.field.value);
            current_meas = MeasurementInput::ok(out.current.value);
            voltage_meas = MeasurementInput::ok(out.voltage.value);
            last_current = out.current.value;
        }
        if i == 4999 {
            // t = 5 s: current should have settled to ~1 A (R=1 ohm, V=1 V).
            assert!((last_current - 1.0).abs() < 0.01, "current={last_current}");
        }
    }
}

/// S2 — current-regulation PLEP: `reg_period_iters=10` (the regulation
/// loop runs at a tenth of the tick rate), a single aux-pole pair at
/// 20 Hz, ramping 0 -> 100 A via a parabola-linear-parabola trajectory.
/// Expect the regulated current to overshoot the final value by < 1 %
/// and settle to within 0.01 A of it.
#[test]
fn s2_current_regulation_plep_settles_with_low_overshoot() {
    let iter_period = 0.001;
    let load = LoadModel::new(1.0, 1.0e9, 0.0, 1.0, 1.0);
    let sim = Simulator::new(
        VoltageSource::from_tustin(1.0e6, 1.0, 0.0, iter_period),
        Actuation::VoltageRef,
        load,
        iter_period,
        no_noise_meas_channel(),
        no_noise_meas_channel(),
        no_noise_meas_channel(),
    );

    let mut engine = ConverterEngineBuilder::new(iter_period)
        .reg_period_iters(10)
        .load(load)
        .field_channel(wide_channel())
        .current_channel(wide_channel())
        .voltage_channel(wide_channel())
        .ref_clip(RefClip::new(1.0e6, 0.0, -1.0e6, 1.0e9, false, -1.0e30))
        .current_algorithm(RstAlgorithm::TwoAuxPoles { auxpoles2_hz: 20.0, z: 0.7 })
        .simulator(sim)
        .build()
        .expect("engine builds");
    engine.set_mode(RegMode::Current);

    let mut meta = FgMeta::default();
    let mut plep =
        Plep::init(None, FgLimitsPolarity::Normal, 0.0, 0.0, 100.0, 0.0, 100.0, 50.0, 0.0, 0.0, 0.0, &mut meta)
            .expect("PLEP parameters are valid");

    let mut field_meas = MeasurementInput::ok(0.0);
    let mut current_meas = MeasurementInput::ok(0.0);
    let mut voltage_meas = MeasurementInput::ok(0.0);
    let mut max_current = 0.0f32;
    let mut final_current = 0.0f32;

    for i in 0..8000 {
        let t = f64::from(i) * iter_period as f64;
        let (_, ref_in) = plep.gen(t, 0.0);
        engine.set_measurements(field_meas, current_meas, voltage_meas);
        engine.tick(ref_in);
        if let Some(out) = engine.simulate(0.0) {
            field_meas = MeasurementInput::ok(out.field.value);
            current_meas = MeasurementInput::ok(out.current.value);
            voltage_meas = MeasurementInput::ok(out.voltage.value);
            max_current = max_current.max(out.current.value);
            final_current = out.current.value;
        }
    }

    assert!(max_current < 101.0, "overshoot too large: max_current={max_current}");
    assert!((final_current - 100.0).abs() < 0.01, "final_current={final_current}");
}

/// S3 — clip chain: position limit at 10 A, rate limit at 1 A/s, ref
/// ramping to 100 A over 10 s should be clamped to 10 A.
#[test]
fn s3_clip_chain_holds_reference_at_limit() {
    let iter_period = 0.01;
    let load = LoadModel::new(1.0, 1.0e9, 0.0, 1.0, 1.0);
    let mut clip = RefClip::new(10.0, 0.0, -10.0, 1.0, false, -1.0e30);

    let mut prev = 0.0f32;
    let mut clip_flag = false;
    let mut rate_flag = false;
    for i in 0..1001 {
        let t = f64::from(i) * iter_period as f64;
        let ramp_ref = (t * 10.0) as f32; // reaches 100 A at t=10s
        let (clipped, flags) = clip.clip(ramp_ref, prev, iter_period);
        prev = clipped;
        clip_flag |= flags.clip;
        rate_flag |= flags.rate;
    }

    assert!((prev - 10.0).abs() < 1.0e-3, "final clipped ref={prev}");
    assert!(clip_flag, "position clip flag never asserted");
    assert!(rate_flag, "rate clip flag never asserted");
    let _ = load;
}

/// S4 — RMS trip: square wave at +-10A with rms_fault=5A should latch
/// the fault flag within one rms_tc.
#[test]
fn s4_rms_fault_latches_under_square_wave_overload() {
    use converter_core::limits::RmsLimits;

    let period = 0.001;
    let rms_tc = 1.0;
    let mut rms = RmsLimits::new(4.0, 5.0, rms_tc, period);

    let half_period_iters = (0.25 / period) as u32; // 2 Hz square wave
    let mut sign = 1.0f32;
    let mut counter = 0u32;
    let mut fault_latched = false;
    let ticks = (2.0 * rms_tc / period) as usize;
    for _ in 0..ticks {
        counter += 1;
        if counter >= half_period_iters {
            counter = 0;
            sign = -sign;
        }
        let flags = rms.check(sign * 10.0);
        if flags.fault {
            fault_latched = true;
            break;
        }
    }
    assert!(fault_latched, "rms fault never latched within 2*rms_tc");
}

/// S5 — invalid-measurement recovery: field channel flips INVALID every
/// other tick while regulating a flat reference; regulation should stay
/// close to the reference and the invalid counter should track exactly
/// the injected ticks.
#[test]
fn s5_invalid_measurement_recovery_keeps_field_regulation_tight() {
    let iter_period = 0.001;
    let load = LoadModel::new(1.0, 1.0e9, 0.0, 1.0, 50.0);
    let sim = Simulator::new(
        VoltageSource::from_tustin(1.0e6, 1.0, 0.0, iter_period),
        Actuation::VoltageRef,
        load,
        iter_period,
        no_noise_meas_channel(),
        no_noise_meas_channel(),
        no_noise_meas_channel(),
    );

    let mut engine = ConverterEngineBuilder::new(iter_period)
        .load(load)
        .field_channel(wide_channel())
        .current_channel(wide_channel())
        .voltage_channel(wide_channel())
        .ref_clip(RefClip::new(1.0e6, 0.0, -1.0e6, 1.0e9, false, -1.0e30))
        .field_algorithm(RstAlgorithm::PiDeadbeat)
        .simulator(sim)
        .build()
        .expect("engine builds");
    engine.set_mode(RegMode::Field);

    let mut field_meas = MeasurementInput::ok(0.0);
    let mut current_meas = MeasurementInput::ok(0.0);
    let mut voltage_meas = MeasurementInput::ok(0.0);
    let mut injected = 0u32;
    let mut final_field = 0.0f32;

    for i in 0..3000 {
        if i % 2 == 0 {
            field_meas = MeasurementInput::invalid();
            injected += 1;
        }
        engine.set_measurements(field_meas, current_meas, voltage_meas);
        engine.tick(50.0);
        if let Some(out) = engine.simulate(0.0) {
            if i % 2 != 0 {
                field_meas = MeasurementInput::ok(out.field.value);
            }
            current_meas = MeasurementInput::ok(out.current.value);
            voltage_meas = MeasurementInput::ok(out.voltage.value);
            final_field = out.field.value;
        }
    }

    assert!((final_field - 50.0).abs() < 1.0, "final field={final_field}");
    assert_eq!(injected, 1500);
}

/// S6 — mode bump test: switching VOLTAGE -> CURRENT at matched
/// steady-state operating point should not bump the limited reference.
#[test]
fn s6_mode_bump_preserves_reference_continuity() {
    let iter_period = 0.001;
    let load = LoadModel::new(1.0, 1.0e9, 0.0, 1.0, 1.0);
    let sim = Simulator::new(
        VoltageSource::from_tustin(1.0e6, 1.0, 0.0, iter_period),
        Actuation::VoltageRef,
        load,
        iter_period,
        no_noise_meas_channel(),
        no_noise_meas_channel(),
        no_noise_meas_channel(),
    );

    let mut engine = ConverterEngineBuilder::new(iter_period)
        .load(load)
        .field_channel(wide_channel())
        .current_channel(wide_channel())
        .voltage_channel(wide_channel())
        .ref_clip(RefClip::new(1.0e6, 0.0, -1.0e6, 1.0e9, false, -1.0e30))
        .simulator(sim)
        .build()
        .expect("engine builds");
    engine.set_mode(RegMode::Voltage);

    let mut field_meas = MeasurementInput::ok(0.0);
    let mut current_meas = MeasurementInput::ok(0.0);
    let mut voltage_meas = MeasurementInput::ok(0.0);

    // Run to steady state at v_ref=0.5V (i -> 0.5A for R=1 ohm).
    for _ in 0..5000 {
        engine.set_measurements(field_meas, current_meas, voltage_meas);
        engine.tick(0.5);
        if let Some(out) = engine.simulate(0.0) {
            field_meas = MeasurementInput::ok(out.field.value);
            current_meas = MeasurementInput::ok(out.current.value);
            voltage_meas = MeasurementInput::ok(out.voltage.value);
        }
    }

    engine.set_measurements(field_meas, current_meas, voltage_meas);
    let before = engine.tick(0.5).v_ref;

    engine.set_mode(RegMode::Current);
    engine.set_measurements(field_meas, current_meas, voltage_meas);
    let after = engine.tick(0.5).v_ref;

    assert!((after - before).abs() < 1.0e-3, "before={before} after={after}");
}
