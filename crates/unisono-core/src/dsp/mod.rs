//! DSP primitives shared by the generator families.

pub mod delay;
pub mod envelope;
pub mod filter;
pub mod noise;
pub mod osc;
pub mod rng;

pub use delay::DelayLine;
pub use envelope::{
    AdsrEnvelope, AdsrParams, OpnEnvelope, OpnEnvelopeParams, StageEnvelope, StagePoint,
    SILENCE_THRESHOLD,
};
pub use filter::{Biquad, OnePole};
pub use noise::{MetallicNoise, NoiseColor, NoiseSource, PinkNoise};
pub use osc::{Phase, Waveform, MAX_PARTIAL_FRACTION};
pub use rng::Rng;

/// Saturating master-bus clip used at the end of a generator's voice sum.
#[inline]
pub fn soft_clip(x: f32) -> f32 {
    x.tanh()
}

/// Linear interpolation between adjacent table entries at fractional
/// position `pos` (wrapping).
#[inline]
pub fn lerp_table(table: &[f32], pos: f64) -> f32 {
    let len = table.len();
    debug_assert!(len > 0);
    let i = pos as usize % len;
    let frac = (pos - pos.floor()) as f32;
    let a = table[i];
    let b = table[(i + 1) % len];
    a + frac * (b - a)
}

/// Equal-power stereo gains for a pan position in [-1, 1].
#[inline]
pub fn equal_power_pan(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * core::f32::consts::FRAC_PI_4;
    (angle.cos(), angle.sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_soft_clip_bounded() {
        assert!(soft_clip(100.0) <= 1.0);
        assert!(soft_clip(-100.0) >= -1.0);
        assert_relative_eq!(soft_clip(0.0), 0.0);
    }

    #[test]
    fn test_equal_power_pan_center() {
        let (l, r) = equal_power_pan(0.0);
        assert_relative_eq!(l, r, epsilon = 1e-6);
        assert_relative_eq!(l * l + r * r, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_equal_power_pan_extremes() {
        let (l, r) = equal_power_pan(-1.0);
        assert_relative_eq!(l, 1.0, epsilon = 1e-6);
        assert_relative_eq!(r, 0.0, epsilon = 1e-6);
        let (l, r) = equal_power_pan(1.0);
        assert_relative_eq!(l, 0.0, epsilon = 1e-6);
        assert_relative_eq!(r, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_lerp_table() {
        let table = [0.0, 1.0];
        assert_relative_eq!(lerp_table(&table, 0.5), 0.5, epsilon = 1e-6);
        // Wraps from the last entry back to the first.
        assert_relative_eq!(lerp_table(&table, 1.5), 0.5, epsilon = 1e-6);
    }
}
