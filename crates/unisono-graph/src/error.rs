//! Structural errors for graph edits.
//!
//! Every edit either succeeds or leaves the graph unchanged; the render
//! path never sees a partially-applied edit.

use crate::port::PortKind;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GraphError {
    #[error("No such module: {0}")]
    NoSuchModule(u64),

    #[error("No such port '{port}' on module {module}")]
    NoSuchPort { module: u64, port: String },

    #[error("No such cable: {0}")]
    NoSuchCable(u64),

    #[error("Port '{port}' on module {module} has the wrong direction")]
    DirectionMismatch { module: u64, port: String },

    #[error("Port kinds are incompatible: {from:?} -> {to:?}")]
    KindMismatch { from: PortKind, to: PortKind },

    #[error("The graph has no output module")]
    NoOutputModule,
}

pub type Result<T> = core::result::Result<T, GraphError>;
