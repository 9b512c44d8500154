//! Collaboration shapes between the synthesis core and an externally
//! hosted plugin.
//!
//! This crate defines the *data contract* only: sample-offset-ordered
//! parameter queues and event lists going in, process setup and
//! transport context alongside, and host-callback events coming back.
//! How those structures cross a process or ABI boundary is the hosting
//! layer's concern and stays out of the core.

pub mod parameters;
pub use parameters::{ParameterChanges, ParameterPoint, ParameterQueue};

pub mod events;
pub use events::{EventBody, EventList, PluginEvent};

pub mod process;
pub use process::{
    ProcessContext, ProcessMode, ProcessSetup, SymbolicSampleSize, TimeSignature,
};

pub mod host;
pub use host::{HostEvent, RestartFlags, StreamingFlag};
