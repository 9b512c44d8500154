//! Sound generator families for the Unisono engine.
//!
//! Each generator drives a [`unisono_core::VoicePool`] of its own voice
//! type behind a single mutex, and implements the
//! [`unisono_core::SoundGenerator`] contract: note events and parameter
//! changes from a control thread, `render` from the audio callback.
//!
//! Families:
//! - [`SubtractiveSynth`] - virtual-analog oscillators into a resonant
//!   lowpass
//! - [`PadSynth`] - bandwidth-spread IFFT wavetables (Paul Nasca's
//!   algorithm) with unison
//! - [`KarplusStrong`] - plucked-string waveguide with body resonance
//! - [`ModalSynth`] - struck/bowed resonator bank
//! - [`FmSynth`] - four-operator phase modulation in the OPN mould
//! - [`PhaseDistortion`] - CZ-style warped-sine lines
//! - [`Tonewheel`] - drawbar organ with a rotary-speaker stage
//! - [`DrumMachine`] - analogue-flavoured drum voices with choke groups

pub mod subtractive;
pub use subtractive::SubtractiveSynth;

pub mod padsynth;
pub use padsynth::{HarmonicProfile, PadSynth};

pub mod karplus;
pub use karplus::{BodyPreset, KarplusStrong, StringMaterial};

pub mod modal;
pub use modal::{Exciter, ModalMaterial, ModalSynth};

pub mod fm;
pub use fm::FmSynth;

pub mod phasedist;
pub use phasedist::{LineMode, PdWaveform, PhaseDistortion};

pub mod tonewheel;
pub use tonewheel::Tonewheel;

pub mod drums;
pub use drums::{DrumKit, DrumMachine};

mod render;
