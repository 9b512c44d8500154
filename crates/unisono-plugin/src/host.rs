//! Host-callback events and the streaming-session flag.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Component aspects a plugin asks the host to re-read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RestartFlags(pub u32);

impl RestartFlags {
    pub const IO_CHANGED: RestartFlags = RestartFlags(1 << 0);
    pub const PARAM_VALUES_CHANGED: RestartFlags = RestartFlags(1 << 1);
    pub const LATENCY_CHANGED: RestartFlags = RestartFlags(1 << 2);

    pub fn contains(&self, other: RestartFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(&self, other: RestartFlags) -> RestartFlags {
        RestartFlags(self.0 | other.0)
    }
}

/// Events a hosted plugin raises back at the engine. The bridge turns
/// host callbacks into this stream; the containing subsystem observes
/// it without knowing anything about the callback transport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum HostEvent {
    /// A control surface or editor grabbed a parameter.
    BeginEdit { param_id: u32 },
    /// A grabbed parameter moved.
    PerformEdit { param_id: u32, value: f64 },
    /// The parameter was let go.
    EndEdit { param_id: u32 },
    /// The plugin wants part of the component re-read.
    RestartComponent { flags: RestartFlags },
    /// Plugin state diverged from the last save.
    StateDirty,
    /// The plugin asks the host to open its editor.
    OpenEditorRequest,
    /// Several edits follow that form one undo step.
    BeginGroupEdit,
    EndGroupEdit,
}

/// Shared "processing" flag held for the lifetime of a streaming
/// session. The bridge sets it before the first `process` call of a
/// session and clears it after the last; the audio side reads it
/// without locking.
#[derive(Debug, Clone, Default)]
pub struct StreamingFlag {
    processing: Arc<AtomicBool>,
}

impl StreamingFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) {
        self.processing.store(true, Ordering::Release);
    }

    pub fn stop(&self) {
        self.processing.store(false, Ordering::Release);
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_flags() {
        let flags = RestartFlags::IO_CHANGED.union(RestartFlags::LATENCY_CHANGED);
        assert!(flags.contains(RestartFlags::IO_CHANGED));
        assert!(flags.contains(RestartFlags::LATENCY_CHANGED));
        assert!(!flags.contains(RestartFlags::PARAM_VALUES_CHANGED));
    }

    #[test]
    fn test_streaming_flag_shared() {
        let flag = StreamingFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_processing());
        flag.start();
        assert!(observer.is_processing());
        flag.stop();
        assert!(!observer.is_processing());
    }

    #[test]
    fn test_edit_bracket_serde() {
        let events = vec![
            HostEvent::BeginEdit { param_id: 4 },
            HostEvent::PerformEdit {
                param_id: 4,
                value: 0.75,
            },
            HostEvent::EndEdit { param_id: 4 },
        ];
        let json = serde_json::to_string(&events).unwrap();
        let back: Vec<HostEvent> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, events);
    }
}
