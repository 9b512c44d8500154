//! SoundFont sample-playback generator.
//!
//! `note_on` intersects preset zones with the note and velocity, walks
//! the linked instrument's zones the same way, and gives the voice one
//! playback layer per surviving pair, parametrised by the summed
//! generator values. Sample memory is shared by reference; a voice only
//! holds positions, rates and envelope state.

use super::generator::{timecents_to_seconds, LoopMode, ZoneParams};
use super::loader::SoundFont;
use crate::render_util::clear_region;
use parking_lot::Mutex;
use std::sync::Arc;
use unisono_core::dsp::{equal_power_pan, soft_clip, SILENCE_THRESHOLD};
use unisono_core::generator::find_param;
use unisono_core::{AudioContext, ParamKind, ParamSpec, PoolVoice, SoundGenerator, VoicePool};

const PARAMS: &[ParamSpec] = &[
    ParamSpec::new("bank", 0.0, 0.0, 128.0).with_kind(ParamKind::Int),
    ParamSpec::new("program", 0.0, 0.0, 127.0).with_kind(ParamKind::Int),
    ParamSpec::new("gain", 0.8, 0.0, 1.0),
];

/// DAHDSR volume envelope with SF2 semantics: linear attack, exponential
/// decay to the sustain gain, exponential release.
#[derive(Debug, Clone, Copy)]
struct DahdsrEnvelope {
    stage: DahdsrStage,
    value: f32,
    samples_in_stage: f64,
    delay: f64,
    attack: f64,
    hold: f64,
    decay: f64,
    sustain: f32,
    release: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DahdsrStage {
    Delay,
    Attack,
    Hold,
    Decay,
    Sustain,
    Release,
    Idle,
}

impl DahdsrEnvelope {
    fn from_zone(params: &ZoneParams, sample_rate: f64) -> Self {
        Self {
            stage: DahdsrStage::Delay,
            value: 0.0,
            samples_in_stage: 0.0,
            delay: timecents_to_seconds(params.delay_tc) * sample_rate,
            attack: timecents_to_seconds(params.attack_tc) * sample_rate,
            hold: timecents_to_seconds(params.hold_tc) * sample_rate,
            decay: timecents_to_seconds(params.decay_tc) * sample_rate,
            sustain: params.sustain_gain(),
            release: timecents_to_seconds(params.release_tc) * sample_rate,
        }
    }

    fn release(&mut self) {
        if self.stage != DahdsrStage::Idle {
            self.stage = DahdsrStage::Release;
            self.samples_in_stage = 0.0;
        }
    }

    fn is_idle(&self) -> bool {
        self.stage == DahdsrStage::Idle
    }

    fn is_releasing(&self) -> bool {
        matches!(self.stage, DahdsrStage::Release | DahdsrStage::Idle)
    }

    fn next(&mut self) -> f32 {
        self.samples_in_stage += 1.0;
        match self.stage {
            DahdsrStage::Delay => {
                self.value = 0.0;
                if self.samples_in_stage >= self.delay {
                    self.stage = DahdsrStage::Attack;
                    self.samples_in_stage = 0.0;
                }
            }
            DahdsrStage::Attack => {
                self.value = (self.samples_in_stage / self.attack.max(1.0)) as f32;
                if self.value >= 1.0 {
                    self.value = 1.0;
                    self.stage = DahdsrStage::Hold;
                    self.samples_in_stage = 0.0;
                }
            }
            DahdsrStage::Hold => {
                self.value = 1.0;
                if self.samples_in_stage >= self.hold {
                    self.stage = DahdsrStage::Decay;
                    self.samples_in_stage = 0.0;
                }
            }
            DahdsrStage::Decay => {
                let coeff = 1.0 - (-1.0 / (self.decay.max(1.0) / 4.0)).exp() as f32;
                self.value += coeff * (self.sustain - self.value);
                if (self.value - self.sustain).abs() < 1e-4 {
                    self.value = self.sustain;
                    self.stage = DahdsrStage::Sustain;
                }
            }
            DahdsrStage::Sustain => {
                self.value = self.sustain;
                if self.value < SILENCE_THRESHOLD {
                    self.stage = DahdsrStage::Idle;
                }
            }
            DahdsrStage::Release => {
                let coeff = 1.0 - (-1.0 / (self.release.max(1.0) / 6.9)).exp() as f32;
                self.value -= coeff * self.value;
                if self.value < SILENCE_THRESHOLD {
                    self.value = 0.0;
                    self.stage = DahdsrStage::Idle;
                }
            }
            DahdsrStage::Idle => self.value = 0.0,
        }
        self.value
    }
}

/// One (preset zone, instrument zone) playback layer.
struct Layer {
    position: f64,
    rate: f64,
    end: f64,
    loop_start: f64,
    loop_end: f64,
    loop_mode: LoopMode,
    gain: f32,
    pan_left: f32,
    pan_right: f32,
    env: DahdsrEnvelope,
    finished: bool,
}

struct SampleVoice {
    note: u8,
    seq: u64,
    layers: Vec<Layer>,
}

impl SampleVoice {
    fn new() -> Self {
        Self {
            note: 0,
            seq: 0,
            layers: Vec::new(),
        }
    }
}

impl PoolVoice for SampleVoice {
    fn is_active(&self) -> bool {
        self.layers.iter().any(|l| !l.finished && !l.env.is_idle())
    }
    fn note(&self) -> u8 {
        self.note
    }
    fn trigger_seq(&self) -> u64 {
        self.seq
    }
    fn begin_release(&mut self) {
        for layer in self.layers.iter_mut() {
            layer.env.release();
        }
    }
    fn steal(&mut self) {
        self.layers.clear();
    }
}

struct Core {
    context: AudioContext,
    pool: VoicePool<SampleVoice>,
    font: Option<Arc<SoundFont>>,
    bank: u16,
    program: u16,
    gain: f32,
}

impl Core {
    fn current_preset(&self) -> Option<(&Arc<SoundFont>, usize)> {
        let font = self.font.as_ref()?;
        let index = font
            .presets
            .iter()
            .position(|p| p.bank == self.bank && p.program == self.program)?;
        Some((font, index))
    }

    fn note_on(&mut self, note: u8, velocity: u8) {
        let Some((font, preset_index)) = self.current_preset() else {
            return; // not loaded or unknown preset: stay silent
        };
        let font = Arc::clone(font);
        let preset = &font.presets[preset_index];
        let out_rate = self.context.sample_rate;

        // Collect layers for every matching (preset zone, instrument
        // zone) pair before touching the pool.
        let mut layers = Vec::new();
        for preset_zone in preset.zones.iter().filter(|z| z.matches(note, velocity)) {
            let Some(instrument) = preset_zone
                .instrument
                .and_then(|i| font.instruments.get(i as usize))
            else {
                continue;
            };
            for inst_zone in instrument.zones.iter().filter(|z| z.matches(note, velocity)) {
                let Some(header) = inst_zone
                    .sample
                    .and_then(|s| font.sample_headers.get(s as usize))
                else {
                    continue;
                };

                // Defaults, overridden by the instrument zone, then the
                // preset zone's deltas added on top.
                let mut params = ZoneParams::default();
                for &(gen, amount) in &inst_zone.generators {
                    params.apply(gen, amount, false);
                }
                for &(gen, amount) in &preset_zone.generators {
                    params.apply(gen, amount, true);
                }

                let root_key = if params.root_key_override >= 0 {
                    params.root_key_override
                } else {
                    header.original_pitch as i32
                };
                let semitones = note as i32 - root_key + params.coarse_tune;
                let cents = params.fine_tune + header.pitch_correction as i32;
                let rate = (header.sample_rate as f64 / out_rate)
                    * 2.0f64.powf(semitones as f64 / 12.0 + cents as f64 / 1200.0);

                let velocity_db = (1.0 - velocity as f32 / 127.0) * 48.0;
                let gain =
                    params.attenuation_gain() * 10.0f32.powf(-velocity_db / 20.0);
                let (pan_left, pan_right) = equal_power_pan(params.pan_position());

                let data_len = font.sample_data.len() as f64;
                layers.push(Layer {
                    position: (header.start as f64).min(data_len),
                    rate,
                    end: (header.end as f64).min(data_len),
                    loop_start: (header.loop_start as f64).min(data_len),
                    loop_end: (header.loop_end as f64).min(data_len),
                    loop_mode: params.loop_mode,
                    gain,
                    pan_left,
                    pan_right,
                    env: DahdsrEnvelope::from_zone(&params, out_rate),
                    finished: false,
                });
            }
        }
        if layers.is_empty() {
            return;
        }

        let (voice, seq) = self.pool.allocate(note, SampleVoice::new);
        voice.note = note;
        voice.seq = seq;
        voice.layers = layers;
    }

    fn render(&mut self, region: &mut [f32]) {
        let Some(font) = self.font.as_ref() else {
            return; // silence until a font is loaded
        };
        let data = Arc::clone(&font.sample_data);
        let channels = self.context.channels;

        for voice in self.pool.voices_mut() {
            if !voice.is_active() {
                continue;
            }
            for frame in region.chunks_exact_mut(channels) {
                let mut left = 0.0f32;
                let mut right = 0.0f32;
                for layer in voice.layers.iter_mut() {
                    if layer.finished || layer.env.is_idle() {
                        continue;
                    }
                    let sample = read_interpolated(&data, layer.position);
                    let env = layer.env.next();
                    left += sample * env * layer.gain * layer.pan_left;
                    right += sample * env * layer.gain * layer.pan_right;

                    layer.position += layer.rate;
                    let looping = match layer.loop_mode {
                        LoopMode::Continuous => true,
                        LoopMode::DuringRelease => !layer.env.is_releasing(),
                        LoopMode::NoLoop => false,
                    };
                    if looping && layer.position >= layer.loop_end && layer.loop_end > layer.loop_start {
                        layer.position = layer.loop_start + (layer.position - layer.loop_end);
                    } else if layer.position >= layer.end - 1.0 {
                        layer.finished = true;
                    }
                }
                if channels == 2 {
                    frame[0] += left;
                    frame[1] += right;
                } else {
                    frame[0] += (left + right) * 0.5;
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
            "bank" => self.bank = value as u16,
            "program" => self.program = value as u16,
            "gain" => self.gain = value,
            _ => {}
        }
    }
}

#[inline]
fn read_interpolated(data: &[f32], position: f64) -> f32 {
    let i = position as usize;
    if i + 1 >= data.len() {
        return data.get(i).copied().unwrap_or(0.0);
    }
    let frac = (position - i as f64) as f32;
    data[i] + frac * (data[i + 1] - data[i])
}

/// SoundFont sample-playback generator.
pub struct Sf2Sampler {
    core: Mutex<Core>,
}

impl Sf2Sampler {
    pub fn new(context: AudioContext, max_voices: usize) -> Self {
        Self {
            core: Mutex::new(Core {
                context,
                pool: VoicePool::new(max_voices),
                font: None,
                bank: 0,
                program: 0,
                gain: 0.8,
            }),
        }
    }

    /// Install a loaded SoundFont. Replaces any previous one; sounding
    /// voices are cut, since their sample memory is going away.
    pub fn set_font(&self, font: Arc<SoundFont>) {
        let mut core = self.core.lock();
        core.pool.choke_all();
        core.font = Some(font);
    }

    /// Enumerate `(bank, program, name)` for every loaded preset.
    pub fn presets(&self) -> Vec<(u16, u16, String)> {
        let core = self.core.lock();
        core.font
            .as_ref()
            .map(|f| {
                f.presets
                    .iter()
                    .map(|p| (p.bank, p.program, p.name.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn active_voices(&self) -> usize {
        self.core.lock().pool.active_count()
    }
}

impl SoundGenerator for Sf2Sampler {
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
    use crate::soundfont::test_fixture::minimal_sf2;

    fn loaded_sampler() -> Sf2Sampler {
        let font = SoundFont::parse(&minimal_sf2()).unwrap();
        let sampler = Sf2Sampler::new(AudioContext::new(48000.0, 2), 16);
        sampler.set_font(Arc::new(font));
        sampler
    }

    #[test]
    fn test_silence_before_load() {
        let sampler = Sf2Sampler::new(AudioContext::new(48000.0, 2), 16);
        sampler.note_on(60, 100);
        let mut buf = vec![1.0f32; 256];
        assert_eq!(sampler.render(&mut buf, 0, 256), 256);
        assert!(buf.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_preset_enumeration() {
        let sampler = loaded_sampler();
        assert_eq!(sampler.presets(), vec![(0, 0, "Test Preset".to_string())]);
    }

    #[test]
    fn test_note_plays_sample() {
        let sampler = loaded_sampler();
        sampler.note_on(60, 100);
        let mut buf = vec![0.0f32; 4096];
        sampler.render(&mut buf, 0, 4096);
        let energy: f32 = buf.iter().map(|s| s * s).sum();
        assert!(energy > 0.0);
    }

    #[test]
    fn test_loop_sustains_past_sample_end() {
        // The fixture sample is 1000 frames; with a continuous loop the
        // voice must still be sounding after several times that length.
        let sampler = loaded_sampler();
        sampler.note_on(60, 100);
        let mut buf = vec![0.0f32; 9600];
        for _ in 0..10 {
            sampler.render(&mut buf, 0, 9600);
        }
        let energy: f32 = buf.iter().map(|s| s * s).sum();
        assert!(energy > 0.0, "looping voice went silent");
    }

    #[test]
    fn test_release_fades_out() {
        let sampler = loaded_sampler();
        sampler.note_on(60, 100);
        let mut buf = vec![0.0f32; 9600];
        sampler.render(&mut buf, 0, 9600);
        sampler.note_off(60);
        for _ in 0..20 {
            sampler.render(&mut buf, 0, 9600);
        }
        assert_eq!(sampler.active_voices(), 0);
    }

    #[test]
    fn test_octave_doubles_rate() {
        // Note 72 must advance the sample twice as fast as note 60:
        // compare zero-crossing counts over the same span.
        let count_crossings = |note: u8| {
            let sampler = loaded_sampler();
            sampler.note_on(note, 127);
            let mut buf = vec![0.0f32; 19200];
            // Skip the attack, then count over a steady window.
            sampler.render(&mut buf, 0, 19200);
            sampler.render(&mut buf, 0, 19200);
            let mono: Vec<f32> = buf.chunks(2).map(|f| f[0]).collect();
            mono.windows(2).filter(|w| w[0] < 0.0 && w[1] >= 0.0).count()
        };
        let base = count_crossings(60);
        let octave = count_crossings(72);
        assert!(base > 0);
        let ratio = octave as f64 / base as f64;
        assert!((ratio - 2.0).abs() < 0.15, "ratio {ratio}");
    }
}
