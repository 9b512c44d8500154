//! Sample-based generators for the Unisono engine.
//!
//! - [`soundfont`]: a bit-exact SF2 RIFF loader and the
//!   [`Sf2Sampler`](soundfont::Sf2Sampler) generator driving
//!   preset/instrument zone pairs through DAHDSR sample voices.
//! - [`slicer`]: REX-style loop slicing (transient, equal, beat grid and
//!   manual modes) and the [`SlicePlayer`](slicer::SlicePlayer)
//!   generator mapping slices onto MIDI notes.
//!
//! Load operations run on the control thread and report failures as
//! [`Error`]; a generator whose data failed to load renders silence.

pub mod error;
pub use error::{Error, Result};

pub mod soundfont;
pub use soundfont::{Sf2Sampler, SoundFont};

pub mod slicer;
pub use slicer::{PlayMode, Slice, SliceMode, SlicePlayer};

mod render_util;
