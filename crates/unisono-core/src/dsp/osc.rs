//! Phase-accumulator oscillator core.

use std::f64::consts::TAU;

/// Partials above this fraction of the sample rate are skipped when
/// summing harmonics (soft anti-aliasing).
pub const MAX_PARTIAL_FRACTION: f64 = 0.45;

/// Basic oscillator waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Waveform {
    #[default]
    Sine,
    Saw,
    Square,
    Triangle,
}

impl Waveform {
    /// Evaluate at a phase in [0, 1), square duty 0.5.
    #[inline]
    pub fn evaluate(&self, phase: f64) -> f32 {
        self.evaluate_duty(phase, 0.5)
    }

    /// Evaluate with an explicit square duty cycle.
    #[inline]
    pub fn evaluate_duty(&self, phase: f64, duty: f64) -> f32 {
        match self {
            Waveform::Sine => (phase * TAU).sin() as f32,
            Waveform::Saw => (2.0 * phase - 1.0) as f32,
            Waveform::Square => {
                if phase < duty {
                    -1.0
                } else {
                    1.0
                }
            }
            Waveform::Triangle => ((4.0 * phase - 2.0).abs() - 1.0) as f32,
        }
    }

    pub fn all() -> &'static [Waveform] {
        &[
            Waveform::Sine,
            Waveform::Saw,
            Waveform::Square,
            Waveform::Triangle,
        ]
    }

    /// Waveform from a parameter value (0=sine, 1=saw, 2=square, 3=triangle).
    pub fn from_index(index: usize) -> Waveform {
        *Self::all().get(index).unwrap_or(&Waveform::Sine)
    }
}

/// Phase accumulator in [0, 1), wrapped by subtraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct Phase {
    value: f64,
}

impl Phase {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }

    pub fn set(&mut self, phase: f64) {
        self.value = phase.rem_euclid(1.0);
    }

    /// Advance by one sample at `frequency`; returns true on wrap.
    #[inline]
    pub fn advance(&mut self, frequency: f64, sample_rate: f64) -> bool {
        self.value += frequency / sample_rate;
        if self.value >= 1.0 {
            self.value -= 1.0;
            // A huge frequency can overshoot a whole cycle; fold the rest.
            if self.value >= 1.0 {
                self.value = self.value.rem_euclid(1.0);
            }
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_waveform_ranges() {
        for wf in Waveform::all() {
            for i in 0..256 {
                let v = wf.evaluate(i as f64 / 256.0);
                assert!((-1.0..=1.0).contains(&v), "{wf:?} at {i}: {v}");
            }
        }
    }

    #[test]
    fn test_saw_endpoints() {
        assert_relative_eq!(Waveform::Saw.evaluate(0.0), -1.0);
        assert_relative_eq!(Waveform::Saw.evaluate(0.5), 0.0);
    }

    #[test]
    fn test_triangle_shape() {
        assert_relative_eq!(Waveform::Triangle.evaluate(0.0), 1.0);
        assert_relative_eq!(Waveform::Triangle.evaluate(0.25), 0.0);
        assert_relative_eq!(Waveform::Triangle.evaluate(0.5), -1.0);
    }

    #[test]
    fn test_phase_wraps() {
        let mut phase = Phase::new();
        let mut wraps = 0;
        for _ in 0..48000 {
            if phase.advance(440.5, 48000.0) {
                wraps += 1;
            }
        }
        assert_eq!(wraps, 440);
        assert!(phase.value() < 1.0);
    }
}
