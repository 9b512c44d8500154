//! Sample-accurate event lists.

use serde::{Deserialize, Serialize};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EventBody {
    NoteOn {
        channel: u8,
        note: u8,
        velocity: u8,
    },
    NoteOff {
        channel: u8,
        note: u8,
    },
    PolyPressure {
        channel: u8,
        note: u8,
        pressure: u8,
    },
    Controller {
        channel: u8,
        controller: u8,
        value: u8,
    },
    PitchBend {
        channel: u8,
        /// 14-bit value, 8192 = centre.
        value: u16,
    },
}

/// One event inside a render block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PluginEvent {
    /// Sample offset within the current block.
    pub sample_offset: u32,
    pub body: EventBody,
}

/// Events for one render block, kept sorted by sample offset; events
/// sharing an offset keep their arrival order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventList {
    events: Vec<PluginEvent>,
}

impl EventList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample_offset: u32, body: EventBody) {
        let index = self
            .events
            .partition_point(|e| e.sample_offset <= sample_offset);
        self.events.insert(
            index,
            PluginEvent {
                sample_offset,
                body,
            },
        );
    }

    pub fn events(&self) -> &[PluginEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginEvent> {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_sorted_by_offset() {
        let mut list = EventList::new();
        list.push(
            100,
            EventBody::NoteOff {
                channel: 0,
                note: 60,
            },
        );
        list.push(
            0,
            EventBody::NoteOn {
                channel: 0,
                note: 60,
                velocity: 100,
            },
        );
        list.push(
            50,
            EventBody::Controller {
                channel: 0,
                controller: 1,
                value: 64,
            },
        );

        let offsets: Vec<u32> = list.iter().map(|e| e.sample_offset).collect();
        assert_eq!(offsets, vec![0, 50, 100]);
    }

    #[test]
    fn test_same_offset_keeps_arrival_order() {
        let mut list = EventList::new();
        for note in [60, 64, 67] {
            list.push(
                0,
                EventBody::NoteOn {
                    channel: 0,
                    note,
                    velocity: 100,
                },
            );
        }
        let notes: Vec<u8> = list
            .iter()
            .map(|e| match e.body {
                EventBody::NoteOn { note, .. } => note,
                _ => 0,
            })
            .collect();
        assert_eq!(notes, vec![60, 64, 67]);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut list = EventList::new();
        list.push(7, EventBody::PitchBend { channel: 1, value: 8192 });
        let json = serde_json::to_string(&list).unwrap();
        let back: EventList = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back.events()[0], list.events()[0]);
    }
}
