//! Slice boundary detection.

use super::{slices_from_boundaries, snap_to_zero_crossing, Slice, SliceMode};

/// Tunables for boundary detection.
#[derive(Debug, Clone, Copy)]
pub struct DetectionParams {
    /// Short-term energy must exceed the trailing energy by this ratio.
    pub threshold: f32,
    /// Analysis window in samples.
    pub window: usize,
    /// Minimum gap between onsets, in samples.
    pub min_gap: usize,
    /// Zero-crossing search radius around each boundary.
    pub snap_window: usize,
    /// Slice count for [`SliceMode::Equal`].
    pub pieces: usize,
    /// Grid tempo for [`SliceMode::Beat`].
    pub bpm: f64,
    pub beats_per_slice: f64,
    /// First assigned MIDI note.
    pub base_note: u8,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            threshold: 2.5,
            window: 512,
            min_gap: 2400, // 50 ms at 48 kHz
            snap_window: 64,
            pieces: 8,
            bpm: 120.0,
            beats_per_slice: 1.0,
            base_note: 36,
        }
    }
}

/// Detect slice boundaries in mono material and build the slice list.
/// `boundaries` is only consulted for [`SliceMode::Manual`].
pub fn detect_slices(
    samples: &[f32],
    sample_rate: f64,
    mode: SliceMode,
    params: &DetectionParams,
    manual_boundaries: &[usize],
) -> Vec<Slice> {
    if samples.is_empty() {
        return Vec::new();
    }
    let mut boundaries = match mode {
        SliceMode::Transient => transient_boundaries(samples, params),
        SliceMode::Equal => equal_boundaries(samples.len(), params.pieces),
        SliceMode::Beat => beat_boundaries(samples.len(), sample_rate, params),
        SliceMode::Manual => {
            let mut b: Vec<usize> = manual_boundaries
                .iter()
                .copied()
                .filter(|&p| p < samples.len())
                .collect();
            b.sort_unstable();
            b.dedup();
            b
        }
    };

    // Every mode produces a closed partition of the material.
    if boundaries.first() != Some(&0) {
        boundaries.insert(0, 0);
    }
    if boundaries.last() != Some(&samples.len()) {
        boundaries.push(samples.len());
    }

    // Snap interior boundaries to the nearest zero crossing.
    for boundary in boundaries.iter_mut().skip(1) {
        if *boundary < samples.len() {
            *boundary = snap_to_zero_crossing(samples, *boundary, params.snap_window);
        }
    }
    boundaries.dedup();

    log::debug!("slicer: {mode:?} produced {} boundaries", boundaries.len());
    slices_from_boundaries(&boundaries, samples.len(), params.base_note)
}

/// Onset positions where short-term energy jumps above the trailing
/// average by the configured ratio.
fn transient_boundaries(samples: &[f32], params: &DetectionParams) -> Vec<usize> {
    let window = params.window.max(16);
    if samples.len() < window * 2 {
        return Vec::new();
    }

    let hop = window / 2;
    let mut onsets = Vec::new();
    let mut trailing = energy(&samples[..window]);
    let mut last_onset = 0usize;
    let floor = 1e-6f32;

    let mut pos = hop;
    while pos + window <= samples.len() {
        let current = energy(&samples[pos..pos + window]);
        let jumped = current > (trailing + floor) * params.threshold && current > floor * 10.0;
        let gap_ok = pos >= last_onset + params.min_gap || onsets.is_empty();
        if jumped && gap_ok {
            onsets.push(pos);
            last_onset = pos;
        }
        // Slow trailing average so a sustained level does not retrigger.
        trailing = trailing * 0.7 + current * 0.3;
        pos += hop;
    }
    onsets
}

#[inline]
fn energy(window: &[f32]) -> f32 {
    window.iter().map(|s| s * s).sum::<f32>() / window.len() as f32
}

fn equal_boundaries(len: usize, pieces: usize) -> Vec<usize> {
    let pieces = pieces.max(1);
    (0..pieces).map(|i| i * len / pieces).collect()
}

fn beat_boundaries(len: usize, sample_rate: f64, params: &DetectionParams) -> Vec<usize> {
    let samples_per_slice =
        (60.0 / params.bpm.max(1.0)) * params.beats_per_slice.max(0.001) * sample_rate;
    let mut boundaries = Vec::new();
    let mut pos = 0.0f64;
    while (pos as usize) < len {
        boundaries.push(pos as usize);
        pos += samples_per_slice;
    }
    boundaries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clicks_at(positions: &[usize], len: usize) -> Vec<f32> {
        let mut samples = vec![0.0f32; len];
        for &pos in positions {
            for i in 0..400.min(len - pos) {
                samples[pos + i] = 0.8 * (-0.01 * i as f32).exp() * if i % 2 == 0 { 1.0 } else { -1.0 };
            }
        }
        samples
    }

    #[test]
    fn test_transient_mode_finds_hits() {
        let samples = clicks_at(&[4800, 24000, 43200], 60000);
        let slices = detect_slices(
            &samples,
            48000.0,
            SliceMode::Transient,
            &DetectionParams::default(),
            &[],
        );
        // Leading silence plus three hits: at least three slices.
        assert!(slices.len() >= 3, "got {} slices", slices.len());
    }

    #[test]
    fn test_equal_mode_partitions() {
        let samples = vec![0.1f32; 8000];
        let params = DetectionParams {
            pieces: 4,
            snap_window: 0,
            ..Default::default()
        };
        let slices = detect_slices(&samples, 48000.0, SliceMode::Equal, &params, &[]);
        assert_eq!(slices.len(), 4);
        assert_eq!(slices[0].start_sample, 0);
        assert_eq!(slices[3].end_sample, 8000);
        // Contiguous partition.
        for pair in slices.windows(2) {
            assert_eq!(pair[0].end_sample, pair[1].start_sample);
        }
    }

    #[test]
    fn test_beat_mode_grid() {
        // 120 BPM at 48 kHz: one beat = 24000 samples.
        let samples = vec![0.1f32; 96000];
        let params = DetectionParams {
            bpm: 120.0,
            beats_per_slice: 1.0,
            snap_window: 0,
            ..Default::default()
        };
        let slices = detect_slices(&samples, 48000.0, SliceMode::Beat, &params, &[]);
        assert_eq!(slices.len(), 4);
        assert_eq!(slices[1].start_sample, 24000);
    }

    #[test]
    fn test_manual_mode() {
        let samples = vec![0.1f32; 1000];
        let params = DetectionParams {
            snap_window: 0,
            ..Default::default()
        };
        let slices = detect_slices(
            &samples,
            48000.0,
            SliceMode::Manual,
            &params,
            &[700, 300, 300, 2000],
        );
        assert_eq!(slices.len(), 3); // 0..300, 300..700, 700..1000
        assert_eq!(slices[1].start_sample, 300);
    }
}
