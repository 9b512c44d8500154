//! Analogue-flavoured drum machine.
//!
//! Each note maps to a preset; a drum voice blends a pitch-enveloped tone
//! oscillator, an optional second harmonic tone, a click burst, and
//! filtered noise, with an exponential amplitude envelope and optional
//! tanh drive. Hi-hats share a choke group: triggering one silences the
//! others immediately.

use crate::render::clear_region;
use parking_lot::Mutex;
use std::f64::consts::TAU;
use unisono_core::dsp::{soft_clip, NoiseColor, NoiseSource, OnePole, Phase, SILENCE_THRESHOLD};
use unisono_core::generator::find_param;
use unisono_core::{AudioContext, ParamKind, ParamSpec, ParamUnit, PoolVoice, SoundGenerator, VoicePool};

const PARAMS: &[ParamSpec] = &[
    ParamSpec::new("kit", 0.0, 0.0, 1.0).with_kind(ParamKind::Choice),
    ParamSpec::new("tune", 0.0, -12.0, 12.0).with_unit(ParamUnit::Semitones),
    ParamSpec::new("drive", 0.0, 0.0, 1.0),
    ParamSpec::new("gain", 0.9, 0.0, 1.0),
];

/// Kit flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrumKit {
    #[default]
    NineOhNine,
    EightOhEight,
}

impl DrumKit {
    pub fn from_index(index: usize) -> Self {
        if index == 1 {
            DrumKit::EightOhEight
        } else {
            DrumKit::NineOhNine
        }
    }
}

/// Everything a drum voice needs, snapshotted at trigger time.
#[derive(Debug, Clone, Copy)]
struct DrumPreset {
    /// Tone oscillator base frequency.
    tone_freq: f64,
    /// Pitch envelope start, as a multiple of the base frequency.
    pitch_start: f32,
    /// Pitch envelope decay in seconds.
    pitch_decay: f32,
    /// Tone amplitude decay in seconds.
    tone_decay: f32,
    tone_level: f32,
    /// Optional second tone an octave-ish above.
    tone2_ratio: f64,
    tone2_level: f32,
    click_level: f32,
    /// Click burst length in samples at 48 kHz (scaled by sample rate).
    click_samples: usize,
    noise: NoiseColor,
    noise_level: f32,
    noise_decay: f32,
    noise_filter_freq: f64,
    /// Overall amplitude decay in seconds.
    amp_decay: f32,
    drive: f32,
    choke_group: Option<u8>,
}

const HAT_CHOKE_GROUP: u8 = 1;

/// GM-flavoured note map shared by both kits; the kit changes voicing,
/// not the layout.
fn preset_for(kit: DrumKit, note: u8) -> Option<DrumPreset> {
    let eight = kit == DrumKit::EightOhEight;
    let preset = match note {
        35 | 36 => DrumPreset {
            // Kick: sine drop with a hard click.
            tone_freq: if eight { 55.0 } else { 48.0 },
            pitch_start: if eight { 3.0 } else { 6.0 },
            pitch_decay: 0.03,
            tone_decay: if eight { 0.5 } else { 0.28 },
            tone_level: 1.0,
            tone2_ratio: 0.0,
            tone2_level: 0.0,
            click_level: if eight { 0.3 } else { 0.8 },
            click_samples: 32,
            noise: NoiseColor::White,
            noise_level: 0.05,
            noise_decay: 0.02,
            noise_filter_freq: 800.0,
            amp_decay: if eight { 0.6 } else { 0.35 },
            drive: if eight { 0.2 } else { 0.5 },
            choke_group: None,
        },
        38 | 40 => DrumPreset {
            // Snare: tone plus bright noise.
            tone_freq: 180.0,
            pitch_start: 2.0,
            pitch_decay: 0.02,
            tone_decay: 0.12,
            tone_level: 0.5,
            tone2_ratio: 1.6,
            tone2_level: 0.25,
            click_level: 0.4,
            click_samples: 24,
            noise: NoiseColor::White,
            noise_level: 0.9,
            noise_decay: if eight { 0.12 } else { 0.18 },
            noise_filter_freq: 7000.0,
            amp_decay: 0.2,
            drive: 0.2,
            choke_group: None,
        },
        42 => hat(eight, 0.06, HAT_CHOKE_GROUP),  // closed
        44 => hat(eight, 0.04, HAT_CHOKE_GROUP),  // pedal
        46 => hat(eight, 0.45, HAT_CHOKE_GROUP),  // open
        39 => DrumPreset {
            // Clap: a long noise click into band-limited noise.
            tone_freq: 0.0,
            pitch_start: 1.0,
            pitch_decay: 0.01,
            tone_decay: 0.01,
            tone_level: 0.0,
            tone2_ratio: 0.0,
            tone2_level: 0.0,
            click_level: 0.6,
            click_samples: 96,
            noise: NoiseColor::White,
            noise_level: 1.0,
            noise_decay: 0.12,
            noise_filter_freq: 2400.0,
            amp_decay: 0.16,
            drive: 0.1,
            choke_group: None,
        },
        50 => tom(172.0), // hi
        47 => tom(130.0), // mid
        45 => tom(98.0),  // low
        37 => DrumPreset {
            // Rim shot.
            tone_freq: 440.0,
            pitch_start: 1.2,
            pitch_decay: 0.005,
            tone_decay: 0.04,
            tone_level: 0.7,
            tone2_ratio: 2.3,
            tone2_level: 0.3,
            click_level: 0.9,
            click_samples: 16,
            noise: NoiseColor::White,
            noise_level: 0.1,
            noise_decay: 0.01,
            noise_filter_freq: 4000.0,
            amp_decay: 0.06,
            drive: 0.3,
            choke_group: None,
        },
        56 => DrumPreset {
            // Cowbell: two detuned squares worth of metallic tone.
            tone_freq: 540.0,
            pitch_start: 1.0,
            pitch_decay: 0.01,
            tone_decay: 0.25,
            tone_level: 0.6,
            tone2_ratio: 1.48,
            tone2_level: 0.5,
            click_level: 0.2,
            click_samples: 12,
            noise: NoiseColor::Metallic,
            noise_level: 0.15,
            noise_decay: 0.08,
            noise_filter_freq: 3000.0,
            amp_decay: 0.3,
            drive: 0.4,
            choke_group: None,
        },
        49 => cymbal(1.6),  // crash
        51 => cymbal(2.8),  // ride
        _ => return None,
    };
    Some(preset)
}

fn hat(eight: bool, decay: f32, group: u8) -> DrumPreset {
    DrumPreset {
        tone_freq: 0.0,
        pitch_start: 1.0,
        pitch_decay: 0.01,
        tone_decay: 0.01,
        tone_level: 0.0,
        tone2_ratio: 0.0,
        tone2_level: 0.0,
        click_level: 0.15,
        click_samples: 10,
        noise: if eight { NoiseColor::Metallic } else { NoiseColor::White },
        noise_level: 1.0,
        noise_decay: decay,
        noise_filter_freq: 9000.0,
        amp_decay: decay,
        drive: 0.0,
        choke_group: Some(group),
    }
}

fn tom(freq: f64) -> DrumPreset {
    DrumPreset {
        tone_freq: freq,
        pitch_start: 1.8,
        pitch_decay: 0.05,
        tone_decay: 0.3,
        tone_level: 0.9,
        tone2_ratio: 0.0,
        tone2_level: 0.0,
        click_level: 0.3,
        click_samples: 20,
        noise: NoiseColor::Pink,
        noise_level: 0.12,
        noise_decay: 0.05,
        noise_filter_freq: 1500.0,
        amp_decay: 0.35,
        drive: 0.15,
        choke_group: None,
    }
}

fn cymbal(decay: f32) -> DrumPreset {
    DrumPreset {
        tone_freq: 0.0,
        pitch_start: 1.0,
        pitch_decay: 0.01,
        tone_decay: 0.01,
        tone_level: 0.0,
        tone2_ratio: 0.0,
        tone2_level: 0.0,
        click_level: 0.25,
        click_samples: 16,
        noise: NoiseColor::Metallic,
        noise_level: 1.0,
        noise_decay: decay,
        noise_filter_freq: 11000.0,
        amp_decay: decay,
        drive: 0.1,
        choke_group: None,
    }
}

struct DrumVoice {
    note: u8,
    seq: u64,
    velocity: f32,
    active: bool,
    preset: DrumPreset,
    tone_phase: Phase,
    tone2_phase: Phase,
    pitch_env: f32,
    tone_env: f32,
    noise_env: f32,
    amp_env: f32,
    click_remaining: usize,
    click_total: usize,
    noise: NoiseSource,
    noise_filter: OnePole,
}

impl DrumVoice {
    fn new(sample_rate: f64) -> Self {
        Self {
            note: 0,
            seq: 0,
            velocity: 0.0,
            active: false,
            preset: preset_for(DrumKit::NineOhNine, 36).unwrap(),
            tone_phase: Phase::new(),
            tone2_phase: Phase::new(),
            pitch_env: 0.0,
            tone_env: 0.0,
            noise_env: 0.0,
            amp_env: 0.0,
            click_remaining: 0,
            click_total: 1,
            noise: NoiseSource::new(NoiseColor::White, sample_rate, 0x909),
            noise_filter: OnePole::new(),
        }
    }
}

impl PoolVoice for DrumVoice {
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
        // Drum voices are one-shots; note-off is ignored and choke is the
        // only early cut.
    }
    fn steal(&mut self) {
        self.active = false;
    }
}

struct Core {
    context: AudioContext,
    pool: VoicePool<DrumVoice>,
    kit: DrumKit,
    tune_semitones: f32,
    drive: f32,
    gain: f32,
    seed_counter: u64,
}

impl Core {
    fn note_on(&mut self, note: u8, velocity: u8) {
        let Some(preset) = preset_for(self.kit, note) else {
            return; // unknown drum note: silently ignored
        };

        // Choke group: cut every sounding member before the new trigger.
        if let Some(group) = preset.choke_group {
            for voice in self.pool.voices_mut() {
                if voice.active && voice.preset.choke_group == Some(group) {
                    voice.steal();
                }
            }
        }

        let sample_rate = self.context.sample_rate;
        let (voice, seq) = self.pool.allocate(note, || DrumVoice::new(sample_rate));
        voice.note = note;
        voice.seq = seq;
        voice.velocity = velocity as f32 / 127.0;
        voice.preset = preset;
        voice.tone_phase.reset();
        voice.tone2_phase.reset();
        voice.pitch_env = 1.0;
        voice.tone_env = 1.0;
        voice.noise_env = 1.0;
        voice.amp_env = 1.0;
        voice.click_total = ((preset.click_samples as f64 * sample_rate / 48000.0) as usize).max(1);
        voice.click_remaining = voice.click_total;
        self.seed_counter += 1;
        voice.noise = NoiseSource::new(preset.noise, sample_rate, 0x909 ^ self.seed_counter);
        voice.noise_filter = OnePole::lowpass(sample_rate, preset.noise_filter_freq);
        voice.active = true;
    }

    fn render(&mut self, region: &mut [f32]) {
        let channels = self.context.channels;
        let sr = self.context.sample_rate;
        let dt = (1.0 / sr) as f32;
        let tune = 2.0f64.powf(self.tune_semitones as f64 / 12.0);
        let extra_drive = self.drive;

        for voice in self.pool.voices_mut() {
            if !voice.active {
                continue;
            }
            let p = voice.preset;
            let pitch_coeff = (-dt / p.pitch_decay.max(1e-4)).exp();
            let tone_coeff = (-dt / p.tone_decay.max(1e-4)).exp();
            let noise_coeff = (-dt / p.noise_decay.max(1e-4)).exp();
            let amp_coeff = (-dt / p.amp_decay.max(1e-4)).exp();
            let drive = (p.drive + extra_drive).min(1.0);

            for frame in region.chunks_exact_mut(channels) {
                let mut sample = 0.0f32;

                if p.tone_level > 0.0 {
                    let freq =
                        p.tone_freq * tune * (1.0 + (p.pitch_start - 1.0) * voice.pitch_env) as f64;
                    sample += (voice.tone_phase.value() * TAU).sin() as f32
                        * p.tone_level
                        * voice.tone_env;
                    voice.tone_phase.advance(freq, sr);
                    if p.tone2_level > 0.0 {
                        sample += (voice.tone2_phase.value() * TAU).sin() as f32
                            * p.tone2_level
                            * voice.tone_env;
                        voice.tone2_phase.advance(freq * p.tone2_ratio, sr);
                    }
                }

                if voice.click_remaining > 0 {
                    voice.click_remaining -= 1;
                    let window = voice.click_remaining as f32 / voice.click_total as f32;
                    sample += voice.noise.next() * p.click_level * window;
                }

                if p.noise_level > 0.0 {
                    let noise = voice.noise_filter.process(voice.noise.next());
                    sample += noise * p.noise_level * voice.noise_env;
                }

                sample *= voice.amp_env * voice.velocity;
                if drive > 0.0 {
                    sample = (sample * (1.0 + drive * 4.0)).tanh();
                }

                voice.pitch_env *= pitch_coeff;
                voice.tone_env *= tone_coeff;
                voice.noise_env *= noise_coeff;
                voice.amp_env *= amp_coeff;

                for out in frame.iter_mut() {
                    *out += sample;
                }
            }

            if voice.amp_env < SILENCE_THRESHOLD {
                voice.active = false;
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
            "kit" => self.kit = DrumKit::from_index(value as usize),
            "tune" => self.tune_semitones = value,
            "drive" => self.drive = value,
            "gain" => self.gain = value,
            _ => {}
        }
    }
}

/// Drum-machine generator with per-note presets and choke groups.
pub struct DrumMachine {
    core: Mutex<Core>,
}

impl DrumMachine {
    pub fn new(context: AudioContext, max_voices: usize) -> Self {
        Self {
            core: Mutex::new(Core {
                context,
                pool: VoicePool::new(max_voices),
                kit: DrumKit::NineOhNine,
                tune_semitones: 0.0,
                drive: 0.0,
                gain: 0.9,
                seed_counter: 0,
            }),
        }
    }

    pub fn active_voices(&self) -> usize {
        self.core.lock().pool.active_count()
    }

    /// True if the voice for `note` is currently sounding.
    pub fn is_sounding(&self, note: u8) -> bool {
        let core = self.core.lock();
        core.pool
            .voices()
            .iter()
            .any(|v| v.active && v.note == note)
    }
}

impl SoundGenerator for DrumMachine {
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

    fn note_off(&self, _note: u8) {
        // One-shot voices play out; note-off carries no meaning here.
    }

    fn all_notes_off(&self) {
        // Percussive generator: choke rather than release.
        self.core.lock().pool.choke_all();
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

    fn ctx() -> AudioContext {
        AudioContext::new(48000.0, 2)
    }

    #[test]
    fn test_kick_renders() {
        let drums = DrumMachine::new(ctx(), 8);
        drums.note_on(36, 127);
        let mut buf = vec![0.0f32; 4096];
        drums.render(&mut buf, 0, 4096);
        let energy: f32 = buf.iter().map(|s| s * s).sum();
        assert!(energy > 0.0);
    }

    #[test]
    fn test_unknown_note_ignored() {
        let drums = DrumMachine::new(ctx(), 8);
        drums.note_on(3, 127);
        assert_eq!(drums.active_voices(), 0);
    }

    #[test]
    fn test_hat_choke() {
        let drums = DrumMachine::new(ctx(), 8);
        drums.note_on(46, 100); // open hat
        let mut buf = vec![0.0f32; 1000];
        drums.render(&mut buf, 0, 1000);
        assert!(drums.is_sounding(46));

        // Closed hat chokes the open one before it even renders a sample.
        drums.note_on(42, 100);
        assert!(!drums.is_sounding(46));
        assert!(drums.is_sounding(42));
    }

    #[test]
    fn test_snare_does_not_choke_kick() {
        let drums = DrumMachine::new(ctx(), 8);
        drums.note_on(36, 100);
        drums.note_on(38, 100);
        assert!(drums.is_sounding(36));
        assert!(drums.is_sounding(38));
    }

    #[test]
    fn test_all_notes_off_chokes() {
        let drums = DrumMachine::new(ctx(), 8);
        drums.note_on(36, 100);
        drums.note_on(49, 100);
        drums.all_notes_off();
        assert_eq!(drums.active_voices(), 0);
    }

    #[test]
    fn test_voice_dies_out() {
        let drums = DrumMachine::new(ctx(), 8);
        drums.note_on(42, 100); // closed hat, short decay
        let mut buf = vec![0.0f32; 48000];
        drums.render(&mut buf, 0, 48000);
        drums.render(&mut buf, 0, 48000);
        assert_eq!(drums.active_voices(), 0);
    }
}
