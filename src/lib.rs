//! # Unisono - Real-time Synthesis Core
//!
//! Polyphonic sound generation built from modular subsystems:
//! - **unisono-core** - generator contract, voice pool, DSP primitives,
//!   generator registry
//! - **unisono-synth** - generator families (subtractive, PadSynth,
//!   Karplus-Strong, modal, FM, phase distortion, tonewheel, drums)
//! - **unisono-sampler** - SF2 SoundFont sampler and loop slicer
//! - **unisono-graph** - modular patch graph with typed ports and cables
//! - **unisono-plugin** - plugin-bridge collaboration shapes
//!
//! ## Quick Start
//!
//! ```
//! use unisono::prelude::*;
//!
//! let context = AudioContext::new(48000.0, 2);
//! let synth = SubtractiveSynth::new(context, 16);
//!
//! synth.note_on(69, 100); // A4
//! let mut buffer = vec![0.0f32; 1024];
//! synth.render(&mut buffer, 0, 1024);
//! ```
//!
//! ## Feature Flags
//!
//! - `default` / `full` - everything below
//! - `synth` - the generator families
//! - `sampler` - SoundFont sampler and slicer
//! - `graph` - the modular patch graph
//! - `plugin` - plugin-bridge shapes

/// Re-export of unisono-core for direct access.
pub use unisono_core as core;

pub use unisono_core::{
    note_to_hz, AudioContext, GeneratorCategory, GeneratorInfo, GeneratorRegistry, NoteEvent,
    ParamKind, ParamSpec, ParamUnit, PoolVoice, SoundGenerator, VoicePool,
};

#[cfg(feature = "synth")]
pub use unisono_synth::{
    DrumKit, DrumMachine, FmSynth, HarmonicProfile, KarplusStrong, ModalSynth, PadSynth,
    PhaseDistortion, SubtractiveSynth, Tonewheel,
};

#[cfg(feature = "sampler")]
pub use unisono_sampler::{Sf2Sampler, SliceMode, SlicePlayer, SoundFont};

#[cfg(feature = "graph")]
pub use unisono_graph::{Module, PatchGraph, PortKind};

#[cfg(feature = "plugin")]
pub use unisono_plugin::{
    EventList, HostEvent, ParameterChanges, ProcessContext, ProcessSetup,
};

/// Everything most callers want in scope.
pub mod prelude {
    pub use unisono_core::{
        note_to_hz, AudioContext, GeneratorRegistry, SoundGenerator,
    };

    #[cfg(feature = "synth")]
    pub use unisono_synth::{
        DrumMachine, FmSynth, KarplusStrong, ModalSynth, PadSynth, PhaseDistortion,
        SubtractiveSynth, Tonewheel,
    };

    #[cfg(feature = "sampler")]
    pub use unisono_sampler::{Sf2Sampler, SlicePlayer, SoundFont};

    #[cfg(feature = "graph")]
    pub use unisono_graph::PatchGraph;
}
