//! Process setup and per-block context.

use serde::{Deserialize, Serialize};

/// Sample width the plugin processes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SymbolicSampleSize {
    #[default]
    F32,
    F64,
}

/// How the host drives processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProcessMode {
    #[default]
    Realtime,
    /// Faster-than-realtime with lookahead (freeze, pre-render).
    Prefetch,
    Offline,
}

/// Fixed per-session processing parameters, agreed before streaming
/// starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessSetup {
    pub sample_rate: f64,
    pub max_block_size: usize,
    pub symbolic_sample_size: SymbolicSampleSize,
    pub process_mode: ProcessMode,
}

impl Default for ProcessSetup {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            max_block_size: 512,
            symbolic_sample_size: SymbolicSampleSize::F32,
            process_mode: ProcessMode::Realtime,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }
}

/// Transport snapshot forwarded with a render block when the host has
/// one. All fields are optional: a bare context is a valid context.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcessContext {
    pub bpm: Option<f64>,
    /// Musical position in quarter notes.
    pub ppq_pos: Option<f64>,
    pub time_sig: Option<TimeSignature>,
    pub playing: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_defaults() {
        let setup = ProcessSetup::default();
        assert_eq!(setup.symbolic_sample_size, SymbolicSampleSize::F32);
        assert_eq!(setup.process_mode, ProcessMode::Realtime);
        assert_eq!(setup.max_block_size, 512);
    }

    #[test]
    fn test_context_serde() {
        let context = ProcessContext {
            bpm: Some(128.0),
            ppq_pos: Some(16.5),
            time_sig: Some(TimeSignature {
                numerator: 3,
                denominator: 4,
            }),
            playing: true,
        };
        let json = serde_json::to_string(&context).unwrap();
        let back: ProcessContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back, context);
    }
}
