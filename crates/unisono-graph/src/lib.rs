//! Modular patch graph for the Unisono engine.
//!
//! A [`PatchGraph`] holds modules with typed ports, connected by cables.
//! Each render pass runs the modules in a dependency order rebuilt
//! lazily after edits (a cycle degrades into a one-block feedback
//! delay), then the Output module's inputs are interleaved into the
//! caller's buffer. The graph itself implements
//! [`unisono_core::SoundGenerator`], with note events fanned out to its
//! note-input modules.

pub mod error;
pub use error::{GraphError, Result};

pub mod port;
pub use port::{ModulePort, PortKind, PortRef};

pub mod module;
pub use module::{Module, ModuleId, ModuleKind, ProcessEnv};

pub mod modules;
pub use modules::{
    AdsrModule, LfoModule, MixerModule, NoiseModule, NoteInModule, OutputModule, VcaModule,
    VcfModule, VcoModule,
};

pub mod graph;
pub use graph::{CableId, PatchGraph};
