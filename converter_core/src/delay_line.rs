//! Fractional-tick delay line used to reproduce voltage-source and
//! measurement transport delay in the simulator.

/// A rolling buffer with linear interpolation between the two integer
/// taps bracketing a non-integer delay, so the effective delay is exactly
/// `delay_in_ticks` rather than rounded to the nearest tick.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buf: Vec<f32>,
    head: usize,
    int_delay: usize,
    frac: f32,
    bypass: bool,
}

impl DelayLine {
    /// `delay_in_ticks <= 0.0` (an under-sampled channel) bypasses the
    /// buffer entirely and returns the input unchanged.
    #[must_use]
    pub fn new(delay_in_ticks: f32) -> Self {
        if delay_in_ticks <= 0.0 {
            return Self {
                buf: vec![0.0],
                head: 0,
                int_delay: 0,
                frac: 0.0,
                bypass: true,
            };
        }
        let int_delay = delay_in_ticks.floor() as usize;
        let frac = delay_in_ticks - int_delay as f32;
        Self {
            buf: vec![0.0; int_delay + 2],
            head: 0,
            int_delay,
            frac,
            bypass: false,
        }
    }

    /// Push `input` and return the value delayed by `delay_in_ticks`.
    pub fn tick(&mut self, input: f32) -> f32 {
        if self.bypass {
            return input;
        }
        let n = self.buf.len();
        self.head = (self.head + 1) % n;
        self.buf[self.head] = input;
        let idx0 = (self.head + n - self.int_delay) % n;
        let idx1 = (self.head + n - self.int_delay - 1) % n;
        self.buf[idx0] + self.frac * (self.buf[idx1] - self.buf[idx0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bypassed_for_nonpositive_delay() {
        let mut d = DelayLine::new(0.0);
        assert_eq!(d.tick(42.0), 42.0);
        assert_eq!(d.tick(7.0), 7.0);
    }

    #[test]
    fn integer_delay_reproduces_input_n_ticks_later() {
        let mut d = DelayLine::new(3.0);
        let input: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let mut out = Vec::new();
        for &x in &input {
            out.push(d.tick(x));
        }
        for i in 3..10 {
            assert!((out[i] - input[i - 3]).abs() < 1e-6, "i={i} out={} exp={}", out[i], input[i - 3]);
        }
    }

    #[test]
    fn fractional_delay_interpolates_linearly_on_a_ramp() {
        let mut d = DelayLine::new(2.5);
        let input: Vec<f32> = (0..20).map(|i| i as f32).collect();
        let mut out = 0.0;
        for &x in &input {
            out = d.tick(x);
        }
        // On a unit-slope ramp, the delay simply subtracts the delay amount.
        let last_input_index = (input.len() - 1) as f32;
        assert!((out - (last_input_index - 2.5)).abs() < 1e-5, "out={out}");
    }
}
