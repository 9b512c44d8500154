//! Slice playback generator.
//!
//! Slices map onto MIDI notes; a voice reads its slice's sample range
//! with linear interpolation, applying per-slice gain and pitch, short
//! attack/release ramps, and a boundary crossfade at both ends.

use super::detect::{detect_slices, DetectionParams};
use super::{PlayMode, Slice, SliceMode};
use crate::render_util::clear_region;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use unisono_core::dsp::soft_clip;
use unisono_core::generator::find_param;
use unisono_core::{AudioContext, ParamKind, ParamSpec, PoolVoice, SoundGenerator, VoicePool};

const PARAMS: &[ParamSpec] = &[
    ParamSpec::new("play_mode", 0.0, 0.0, 2.0).with_kind(ParamKind::Choice),
    ParamSpec::new("crossfade", 64.0, 0.0, 4096.0).with_kind(ParamKind::Int),
    ParamSpec::new("gain", 0.9, 0.0, 1.0),
];

/// Attack/release ramp length in seconds.
const EDGE_RAMP_SECONDS: f64 = 0.002;

struct SliceVoice {
    note: u8,
    seq: u64,
    velocity: f32,
    active: bool,
    releasing: bool,
    slice: Slice,
    /// Absolute position in the source material.
    position: f64,
    rate: f64,
    play_mode: PlayMode,
    crossfade: usize,
    ramp: f32,
    ramp_step: f32,
}

impl SliceVoice {
    fn new() -> Self {
        Self {
            note: 0,
            seq: 0,
            velocity: 0.0,
            active: false,
            releasing: false,
            slice: Slice {
                index: 0,
                start_sample: 0,
                end_sample: 1,
                gain: 1.0,
                pitch: 1.0,
                reverse: false,
                midi_note: 0,
                name: String::new(),
            },
            position: 0.0,
            rate: 1.0,
            play_mode: PlayMode::OneShot,
            crossfade: 0,
            ramp: 0.0,
            ramp_step: 0.0,
        }
    }

    /// Gain window: fade in/out over `crossfade` samples at both slice
    /// edges.
    #[inline]
    fn edge_window(&self) -> f32 {
        if self.crossfade == 0 {
            return 1.0;
        }
        let from_start = self.position - self.slice.start_sample as f64;
        let from_end = self.slice.end_sample as f64 - self.position;
        let fade = self.crossfade as f64;
        let win = (from_start / fade).min(from_end / fade).clamp(0.0, 1.0);
        win as f32
    }
}

impl PoolVoice for SliceVoice {
    fn is_active(&self) -> bool {
        self.active
    }
    fn note(&self) -> u8 {
        self.note
    }
    fn trigger_seq(&self) -> u64 {
        self.seq
    }
    fn begin_release(&mut self) {
        match self.play_mode {
            // One-shots play out; loop and gate release on note-off.
            PlayMode::OneShot => {}
            PlayMode::Loop | PlayMode::Gate => self.releasing = true,
        }
    }
    fn steal(&mut self) {
        self.active = false;
    }
}

struct Core {
    context: AudioContext,
    pool: VoicePool<SliceVoice>,
    material: Arc<Vec<f32>>,
    source_rate: f64,
    slices: Vec<Slice>,
    play_mode: PlayMode,
    crossfade_samples: usize,
    gain: f32,
}

impl Core {
    fn note_on(&mut self, note: u8, velocity: u8) {
        let Some(slice) = self.slices.iter().find(|s| s.midi_note == note).cloned() else {
            return; // no slice on this note
        };
        if self.material.is_empty() {
            return;
        }
        let (voice, seq) = self.pool.allocate(note, SliceVoice::new);
        voice.note = note;
        voice.seq = seq;
        voice.velocity = velocity as f32 / 127.0;
        voice.releasing = false;
        voice.position = if slice.reverse {
            slice.end_sample.saturating_sub(1) as f64
        } else {
            slice.start_sample as f64
        };
        let direction = if slice.reverse { -1.0 } else { 1.0 };
        voice.rate = direction * slice.pitch.abs() as f64 * self.source_rate
            / self.context.sample_rate;
        voice.play_mode = self.play_mode;
        voice.crossfade = self.crossfade_samples;
        voice.ramp = 0.0;
        voice.ramp_step = (1.0 / (EDGE_RAMP_SECONDS * self.context.sample_rate)) as f32;
        voice.slice = slice;
        voice.active = true;
    }

    fn render(&mut self, region: &mut [f32]) {
        let channels = self.context.channels;
        let material = Arc::clone(&self.material);
        if material.is_empty() {
            return;
        }

        for voice in self.pool.voices_mut() {
            if !voice.active {
                continue;
            }
            for frame in region.chunks_exact_mut(channels) {
                let start = voice.slice.start_sample as f64;
                let end = voice.slice.end_sample as f64;

                // Edge ramp up while playing, down while releasing.
                if voice.releasing {
                    voice.ramp -= voice.ramp_step;
                    if voice.ramp <= 0.0 {
                        voice.active = false;
                        break;
                    }
                } else if voice.ramp < 1.0 {
                    voice.ramp = (voice.ramp + voice.ramp_step).min(1.0);
                }

                let sample = read_interpolated(&material, voice.position)
                    * voice.slice.gain
                    * voice.edge_window()
                    * voice.ramp
                    * voice.velocity;
                for out in frame.iter_mut() {
                    *out += sample;
                }

                voice.position += voice.rate;
                let out_of_range = voice.position >= end - 1.0 || voice.position <= start;
                if out_of_range {
                    match voice.play_mode {
                        PlayMode::OneShot => {
                            voice.active = false;
                            break;
                        }
                        PlayMode::Loop | PlayMode::Gate => {
                            voice.position = if voice.slice.reverse {
                                end - 1.0
                            } else {
                                start
                            };
                        }
                    }
                }
            }
        }

        for out in region.iter_mut() {
            *out = soft_clip(*out * self.gain);
        }
        self.pool.sweep();
    }

    fn set_parameter(&mut self, name: &str, value: f32) {
        let Some(spec) = find_param(PARAMS, name) else {
            return;
        };
        let value = spec.clamp(value);
        match spec.name {
            "play_mode" => {
                self.play_mode = match value as usize {
                    1 => PlayMode::Loop,
                    2 => PlayMode::Gate,
                    _ => PlayMode::OneShot,
                }
            }
            "crossfade" => self.crossfade_samples = value as usize,
            "gain" => self.gain = value,
            _ => {}
        }
    }
}

#[inline]
fn read_interpolated(data: &[f32], position: f64) -> f32 {
    if position < 0.0 {
        return 0.0;
    }
    let i = position as usize;
    if i + 1 >= data.len() {
        return data.get(i).copied().unwrap_or(0.0);
    }
    let frac = (position - i as f64) as f32;
    data[i] + frac * (data[i + 1] - data[i])
}

/// Slice playback generator.
pub struct SlicePlayer {
    core: Mutex<Core>,
}

impl SlicePlayer {
    pub fn new(context: AudioContext, max_voices: usize) -> Self {
        Self {
            core: Mutex::new(Core {
                context,
                pool: VoicePool::new(max_voices),
                material: Arc::new(Vec::new()),
                source_rate: context.sample_rate,
                slices: Vec::new(),
                play_mode: PlayMode::OneShot,
                crossfade_samples: 64,
                gain: 0.9,
            }),
        }
    }

    /// Load source material (interleaved; stereo is downmixed to mono)
    /// and detect slices in the given mode.
    pub fn load(
        &self,
        interleaved: &[f32],
        channels: usize,
        sample_rate: f64,
        mode: SliceMode,
        params: &DetectionParams,
    ) -> Result<usize> {
        if channels == 0 || interleaved.is_empty() {
            return Err(Error::Format("empty source material".into()));
        }
        let mono: Vec<f32> = match channels {
            1 => interleaved.to_vec(),
            _ => interleaved
                .chunks(channels)
                .map(|f| (f[0] + f[1.min(f.len() - 1)]) * 0.5)
                .collect(),
        };
        let slices = detect_slices(&mono, sample_rate, mode, params, &[]);
        log::debug!("slicer: loaded {} frames, {} slices", mono.len(), slices.len());

        let mut core = self.core.lock();
        core.pool.choke_all();
        core.material = Arc::new(mono);
        core.source_rate = sample_rate;
        core.slices = slices;
        Ok(core.slices.len())
    }

    /// Replace the slice table with caller-supplied boundaries.
    pub fn set_manual_slices(&self, boundaries: &[usize], base_note: u8) -> Result<usize> {
        let mut core = self.core.lock();
        if core.material.is_empty() {
            return Err(Error::NotLoaded);
        }
        let params = DetectionParams {
            base_note,
            ..Default::default()
        };
        let material = Arc::clone(&core.material);
        let source_rate = core.source_rate;
        core.slices = detect_slices(
            &material,
            source_rate,
            SliceMode::Manual,
            &params,
            boundaries,
        );
        Ok(core.slices.len())
    }

    /// The current slice table.
    pub fn slices(&self) -> Vec<Slice> {
        self.core.lock().slices.clone()
    }

    /// Adjust one slice's gain/pitch/reverse in place.
    pub fn update_slice(&self, index: usize, gain: f32, pitch: f32, reverse: bool) -> Result<()> {
        let mut core = self.core.lock();
        let slice = core
            .slices
            .get_mut(index)
            .ok_or(Error::InvalidSlice { start: index, end: index })?;
        slice.gain = gain.clamp(0.0, 2.0);
        slice.pitch = if pitch.abs() < 0.01 { 1.0 } else { pitch };
        slice.reverse = reverse;
        Ok(())
    }

    pub fn active_voices(&self) -> usize {
        self.core.lock().pool.active_count()
    }
}

impl SoundGenerator for SlicePlayer {
    fn note_on(&self, note: u8, velocity: u8) {
        if note > 127 {
            return;
        }
        if velocity == 0 {
            self.note_off(note);
            return;
        }
        self.core.lock().note_on(note, velocity);
    }

    fn note_off(&self, note: u8) {
        if note > 127 {
            return;
        }
        self.core.lock().pool.release(note);
    }

    fn all_notes_off(&self) {
        self.core.lock().pool.release_all();
    }

    fn set_parameter(&self, name: &str, value: f32) {
        self.core.lock().set_parameter(name, value);
    }

    fn parameters(&self) -> &[ParamSpec] {
        PARAMS
    }

    fn render(&self, buffer: &mut [f32], offset: usize, count: usize) -> usize {
        let region = clear_region(buffer, offset, count);
        if region.is_empty() {
            return 0;
        }
        let written = region.len();
        self.core.lock().render(region);
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_material() -> Vec<f32> {
        // 1 s of 440 Hz sine at 48 kHz, mono.
        (0..48000)
            .map(|i| (i as f64 * 440.0 / 48000.0 * std::f64::consts::TAU).sin() as f32 * 0.5)
            .collect()
    }

    fn loaded_player(mode: SliceMode) -> SlicePlayer {
        let player = SlicePlayer::new(AudioContext::new(48000.0, 2), 16);
        let params = DetectionParams {
            pieces: 4,
            ..Default::default()
        };
        player
            .load(&test_material(), 1, 48000.0, mode, &params)
            .unwrap();
        player
    }

    #[test]
    fn test_equal_slices_assigned_to_notes() {
        let player = loaded_player(SliceMode::Equal);
        let slices = player.slices();
        assert_eq!(slices.len(), 4);
        assert_eq!(slices[0].midi_note, 36);
        assert_eq!(slices[3].midi_note, 39);
    }

    #[test]
    fn test_trigger_slice_renders() {
        let player = loaded_player(SliceMode::Equal);
        player.note_on(36, 127);
        let mut buf = vec![0.0f32; 4096];
        player.render(&mut buf, 0, 4096);
        let energy: f32 = buf.iter().map(|s| s * s).sum();
        assert!(energy > 0.0);
    }

    #[test]
    fn test_unmapped_note_silent() {
        let player = loaded_player(SliceMode::Equal);
        player.note_on(100, 127);
        assert_eq!(player.active_voices(), 0);
    }

    #[test]
    fn test_one_shot_ends() {
        let player = loaded_player(SliceMode::Equal);
        player.note_on(36, 127);
        // Each slice is 12000 frames; 2 x 24000 stereo samples covers it.
        let mut buf = vec![0.0f32; 24000];
        player.render(&mut buf, 0, 24000);
        player.render(&mut buf, 0, 24000);
        assert_eq!(player.active_voices(), 0);
    }

    #[test]
    fn test_gate_loops_until_release() {
        let player = loaded_player(SliceMode::Equal);
        player.set_parameter("play_mode", 2.0); // gate
        player.note_on(36, 127);
        let mut buf = vec![0.0f32; 24000];
        for _ in 0..4 {
            player.render(&mut buf, 0, 24000);
        }
        assert_eq!(player.active_voices(), 1, "gate voice should loop");

        player.note_off(36);
        player.render(&mut buf, 0, 24000);
        assert_eq!(player.active_voices(), 0);
    }

    #[test]
    fn test_reverse_plays_backwards() {
        let player = loaded_player(SliceMode::Equal);
        player.update_slice(0, 1.0, 1.0, true).unwrap();
        player.note_on(36, 127);
        let mut buf = vec![0.0f32; 4096];
        player.render(&mut buf, 0, 4096);
        let energy: f32 = buf.iter().map(|s| s * s).sum();
        assert!(energy > 0.0);
    }
}
