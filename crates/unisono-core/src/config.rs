//! Audio format configuration.

use crate::{Error, Result};

/// Audio format a generator is constructed for.
///
/// Passed by value into every generator constructor. The sample rate is
/// fixed for the generator's lifetime; rendering at a different rate means
/// constructing a new generator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioContext {
    pub sample_rate: f64,
    pub channels: usize,
    pub buffer_size: usize,
}

impl Default for AudioContext {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            channels: 2,
            buffer_size: 512,
        }
    }
}

impl AudioContext {
    pub fn new(sample_rate: f64, channels: usize) -> Self {
        Self {
            sample_rate,
            channels,
            ..Self::default()
        }
    }

    /// Seconds per sample.
    #[inline]
    pub fn delta_time(&self) -> f64 {
        1.0 / self.sample_rate
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate < 8000.0 || self.sample_rate > 384000.0 {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if self.channels == 0 || self.channels > 2 {
            return Err(Error::InvalidConfig(format!(
                "channels {} out of range (1-2)",
                self.channels
            )));
        }
        if self.buffer_size == 0 {
            return Err(Error::InvalidConfig("buffer_size must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_context() {
        let ctx = AudioContext::default();
        assert_eq!(ctx.sample_rate, 44100.0);
        assert_eq!(ctx.channels, 2);
        assert!(ctx.validate().is_ok());
    }

    #[test]
    fn test_invalid_sample_rate() {
        let ctx = AudioContext::new(100.0, 2);
        assert!(ctx.validate().is_err());
    }

    #[test]
    fn test_delta_time() {
        let ctx = AudioContext::new(48000.0, 2);
        assert!((ctx.delta_time() - 1.0 / 48000.0).abs() < 1e-12);
    }
}
