//! Sample-accurate parameter automation queues.

use serde::{Deserialize, Serialize};

/// One automation point inside a render block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterPoint {
    /// Sample offset within the current block (0 = first sample).
    pub sample_offset: u32,
    /// Normalized value in [0, 1].
    pub value: f64,
}

/// Automation points for a single parameter, kept sorted by sample
/// offset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterQueue {
    pub param_id: u32,
    points: Vec<ParameterPoint>,
}

impl ParameterQueue {
    pub fn new(param_id: u32) -> Self {
        Self {
            param_id,
            points: Vec::new(),
        }
    }

    /// Insert a point, keeping the queue sorted by sample offset.
    /// Points sharing an offset keep their insertion order.
    pub fn add_point(&mut self, sample_offset: u32, value: f64) {
        let value = value.clamp(0.0, 1.0);
        let index = self
            .points
            .partition_point(|p| p.sample_offset <= sample_offset);
        self.points.insert(
            index,
            ParameterPoint {
                sample_offset,
                value,
            },
        );
    }

    pub fn points(&self) -> &[ParameterPoint] {
        &self.points
    }

    /// The last value at or before `sample_offset`, if any.
    pub fn value_at(&self, sample_offset: u32) -> Option<f64> {
        let index = self
            .points
            .partition_point(|p| p.sample_offset <= sample_offset);
        index.checked_sub(1).map(|i| self.points[i].value)
    }
}

/// All parameter changes for one render block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterChanges {
    queues: Vec<ParameterQueue>,
}

impl ParameterChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// The queue for `param_id`, created on first use.
    pub fn queue_mut(&mut self, param_id: u32) -> &mut ParameterQueue {
        if let Some(index) = self.queues.iter().position(|q| q.param_id == param_id) {
            return &mut self.queues[index];
        }
        self.queues.push(ParameterQueue::new(param_id));
        self.queues.last_mut().unwrap()
    }

    pub fn queues(&self) -> &[ParameterQueue] {
        &self.queues
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    pub fn clear(&mut self) {
        self.queues.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_stay_sorted() {
        let mut queue = ParameterQueue::new(7);
        queue.add_point(128, 0.5);
        queue.add_point(0, 0.1);
        queue.add_point(64, 0.3);
        queue.add_point(64, 0.4);

        let offsets: Vec<u32> = queue.points().iter().map(|p| p.sample_offset).collect();
        assert_eq!(offsets, vec![0, 64, 64, 128]);
        // Ties keep insertion order.
        assert_eq!(queue.points()[1].value, 0.3);
        assert_eq!(queue.points()[2].value, 0.4);
    }

    #[test]
    fn test_value_clamped_to_normalized_range() {
        let mut queue = ParameterQueue::new(0);
        queue.add_point(0, 3.5);
        queue.add_point(1, -1.0);
        assert_eq!(queue.points()[0].value, 1.0);
        assert_eq!(queue.points()[1].value, 0.0);
    }

    #[test]
    fn test_value_at() {
        let mut queue = ParameterQueue::new(0);
        queue.add_point(10, 0.2);
        queue.add_point(20, 0.8);
        assert_eq!(queue.value_at(5), None);
        assert_eq!(queue.value_at(10), Some(0.2));
        assert_eq!(queue.value_at(15), Some(0.2));
        assert_eq!(queue.value_at(100), Some(0.8));
    }

    #[test]
    fn test_changes_reuse_queue_per_param() {
        let mut changes = ParameterChanges::new();
        changes.queue_mut(3).add_point(0, 0.1);
        changes.queue_mut(3).add_point(8, 0.2);
        changes.queue_mut(9).add_point(4, 0.9);
        assert_eq!(changes.queues().len(), 2);
        assert_eq!(changes.queues()[0].points().len(), 2);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut changes = ParameterChanges::new();
        changes.queue_mut(1).add_point(32, 0.25);
        let json = serde_json::to_string(&changes).unwrap();
        let back: ParameterChanges = serde_json::from_str(&json).unwrap();
        assert_eq!(back.queues().len(), 1);
        assert_eq!(back.queues()[0].points()[0].sample_offset, 32);
    }
}
