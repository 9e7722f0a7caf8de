//! Fixed-point helpers for the cascaded box-car measurement filter.
//!
//! The filter's two accumulators are `i32` rather than `f32` so a constant
//! input never drifts over a long run. Input samples are quantized into
//! that integer domain and the second accumulator is scaled back to `f32`
//! on the way out.

/// Scale factors for the quantizer: `float_to_integer` maps a measurement in
/// `[-max_meas_value, max_meas_value]` onto the `i32` accumulator domain, and
/// `integer_to_float` inverts it once the two box-cars have accumulated.
///
/// For the output to reconstruct a constant input exactly, the second stage
/// must be no longer than the first (`l1 <= l0`): the first stage is the
/// main averaging window, the second a shorter smoothing pass.
#[derive(Debug, Clone, Copy)]
pub struct QuantScale {
    pub float_to_integer: f32,
    pub integer_to_float: f32,
}

impl QuantScale {
    /// Build the scale pair for cascaded box-cars of lengths `l0` and `l1`
    /// and a clamp ceiling `max_meas_value`.
    #[must_use]
    pub fn new(l0: usize, l1: usize, max_meas_value: f32) -> Self {
        let longest = l0.max(l1).max(1) as f32;
        let shortest = l0.min(l1).max(1) as f32;
        let denom = (longest * max_meas_value.max(f32::MIN_POSITIVE)).max(f32::MIN_POSITIVE);
        let float_to_integer = (i32::MAX as f32) / denom;
        let integer_to_float = 1.0 / (float_to_integer * shortest);
        Self {
            float_to_integer,
            integer_to_float,
        }
    }

    /// Clamp `x` to `±max_meas_value` and quantize to an `i32` sample,
    /// rounding to nearest.
    #[must_use]
    pub fn quantize(&self, x: f32, max_meas_value: f32) -> i32 {
        if !x.is_finite() {
            return 0;
        }
        let clamped = x.clamp(-max_meas_value, max_meas_value);
        let scaled = (clamped * self.float_to_integer).round();
        if scaled >= i32::MAX as f32 {
            i32::MAX
        } else if scaled <= i32::MIN as f32 {
            i32::MIN
        } else {
            scaled as i32
        }
    }
}

/// Truncating integer divide used for each box-car stage's running mean
/// (`accumulator / length`), matching the C implementation's integer
/// division semantics exactly (rounds toward zero).
#[inline]
#[must_use]
pub fn trunc_div_i32(acc: i32, len: usize) -> i32 {
    if len == 0 {
        return 0;
    }
    acc / (len as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_clamps_and_rounds() {
        let q = QuantScale::new(4, 4, 100.0);
        assert_eq!(q.quantize(f32::NAN, 100.0), 0);
        let over = q.quantize(1000.0, 100.0);
        let at_max = q.quantize(100.0, 100.0);
        assert_eq!(over, at_max);
    }

    #[test]
    fn trunc_div_matches_c_semantics() {
        assert_eq!(trunc_div_i32(7, 2), 3);
        assert_eq!(trunc_div_i32(-7, 2), -3);
        assert_eq!(trunc_div_i32(5, 0), 0);
    }

    #[test]
    fn round_trip_recovers_constant_input_within_one_lsb() {
        // l1 <= l0, as required for exact reconstruction.
        let l0 = 8usize;
        let l1 = 4usize;
        let max_meas = 50.0f32;
        let q = QuantScale::new(l0, l1, max_meas);
        let x = 12.5f32;
        let sample = q.quantize(x, max_meas);

        // Steady state: stage 0's accumulator holds l0 copies of `sample`.
        let acc0 = sample * (l0 as i32);
        let stage0_out = trunc_div_i32(acc0, l0);
        // Stage 1's accumulator holds l1 copies of stage0_out.
        let acc1 = stage0_out * (l1 as i32);
        let back = (acc1 as f32) * q.integer_to_float;

        assert!((back - x).abs() < 0.05, "back={back} x={x}");
    }
}
