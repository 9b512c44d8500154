//! Synthesis kernel for the Unisono engine.
//!
//! Everything the sound-generator crates share lives here:
//! - the [`SoundGenerator`] contract (note events in, interleaved float
//!   samples out),
//! - the [`VoicePool`] polyphony discipline (allocation, re-trigger,
//!   oldest-voice stealing),
//! - DSP primitives (envelopes, filters, delay lines, oscillator cores,
//!   seeded noise),
//! - the [`GeneratorRegistry`] for creating generators by string id.
//!
//! The concurrency model is deliberately simple: a generator owns one
//! mutex guarding its entire control surface and voice state. Control
//! calls hold it briefly; `render` holds it for the duration of a buffer
//! fill. Nothing on the render path allocates once voices are warm, and
//! nothing on it performs I/O.

pub mod error;
pub use error::{Error, Result};

pub mod config;
pub use config::AudioContext;

pub mod note;
pub use note::{note_to_hz, NoteEvent};

pub mod generator;
pub use generator::{find_param, ParamKind, ParamSpec, ParamUnit, SoundGenerator};

pub mod voice;
pub use voice::{PoolVoice, VoicePool};

pub mod registry;
pub use registry::{GeneratorCategory, GeneratorFactory, GeneratorInfo, GeneratorRegistry};

pub mod dsp;
