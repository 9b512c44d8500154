//! The module trait.

use crate::port::ModulePort;
use unisono_core::AudioContext;

/// Stable handle to a module inside a graph.
pub type ModuleId = u64;

/// Coarse module classification, mostly for editors and debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Oscillator,
    Filter,
    Amplifier,
    Envelope,
    Lfo,
    Mixer,
    Noise,
    NoteIn,
    Output,
    Other,
}

/// Per-block processing environment.
#[derive(Debug, Clone, Copy)]
pub struct ProcessEnv {
    pub context: AudioContext,
    pub block_size: usize,
}

/// A DSP block inside the patch graph.
///
/// `process` reads one block from each input slice (resolved by the
/// graph from the connected upstream output, or all-zero when the input
/// is unpatched) and fills its own output buffers. Implementations never
/// allocate inside `process`.
pub trait Module: Send {
    fn kind(&self) -> ModuleKind;

    fn inputs(&self) -> &'static [ModulePort];

    fn outputs(&self) -> &'static [ModulePort];

    /// Set a named parameter; unknown names are ignored, values clamped.
    fn set_param(&mut self, name: &str, value: f32);

    /// Current value of a named parameter.
    fn param(&self, name: &str) -> Option<f32>;

    fn process(&mut self, inputs: &[&[f32]], outputs: &mut [Vec<f32>], env: &ProcessEnv);
}
