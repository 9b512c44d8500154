//! Modal synthesis: banks of exponentially-decaying sinusoids.
//!
//! A material preset defines up to 32 modes as `(frequency ratio,
//! amplitude, decay)`; an exciter decides how energy enters them. Struck
//! and plucked exciters inject energy once; the bow runs a simplified
//! stick-slip loop for as long as the key is held.

use crate::render::clear_region;
use parking_lot::Mutex;
use std::f64::consts::TAU;
use unisono_core::dsp::{soft_clip, OnePole, Phase, Rng, MAX_PARTIAL_FRACTION, SILENCE_THRESHOLD};
use unisono_core::generator::find_param;
use unisono_core::{note_to_hz, AudioContext, ParamKind, ParamSpec, PoolVoice, SoundGenerator, VoicePool};

pub const MAX_MODES: usize = 32;

const PARAMS: &[ParamSpec] = &[
    ParamSpec::new("material", 0.0, 0.0, 5.0).with_kind(ParamKind::Choice),
    ParamSpec::new("exciter", 0.0, 0.0, 4.0).with_kind(ParamKind::Choice),
    ParamSpec::new("decay_scale", 1.0, 0.1, 10.0),
    ParamSpec::new("stiffness", 0.0, 0.0, 1.0),
    ParamSpec::new("strike_position", 0.3, 0.0, 1.0),
    ParamSpec::new("bow_force", 0.5, 0.0, 1.0),
    ParamSpec::new("bow_velocity", 0.5, 0.0, 1.0),
    ParamSpec::new("gain", 0.8, 0.0, 1.0),
];

/// Material preset selecting the mode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModalMaterial {
    #[default]
    WoodBar,
    MetalBar,
    Glass,
    Bell,
    Membrane,
    String,
}

/// `(frequency ratio, amplitude, decay seconds)` per mode.
type ModeDef = (f64, f32, f32);

impl ModalMaterial {
    pub fn from_index(index: usize) -> Self {
        match index {
            1 => ModalMaterial::MetalBar,
            2 => ModalMaterial::Glass,
            3 => ModalMaterial::Bell,
            4 => ModalMaterial::Membrane,
            5 => ModalMaterial::String,
            _ => ModalMaterial::WoodBar,
        }
    }

    fn modes(&self) -> &'static [ModeDef] {
        match self {
            // Free-bar ratios (1 : 2.756 : 5.404 : ...), wood damps fast.
            ModalMaterial::WoodBar => &[
                (1.0, 1.0, 0.5),
                (2.756, 0.6, 0.25),
                (5.404, 0.3, 0.12),
                (8.933, 0.15, 0.06),
                (13.34, 0.08, 0.03),
            ],
            ModalMaterial::MetalBar => &[
                (1.0, 1.0, 3.0),
                (2.756, 0.7, 2.2),
                (5.404, 0.5, 1.5),
                (8.933, 0.35, 1.0),
                (13.34, 0.2, 0.6),
                (18.64, 0.12, 0.3),
            ],
            ModalMaterial::Glass => &[
                (1.0, 1.0, 2.0),
                (2.32, 0.6, 1.6),
                (4.25, 0.35, 1.1),
                (6.63, 0.2, 0.7),
                (9.38, 0.1, 0.4),
            ],
            // Church-bell partials: hum, prime, tierce, quint, nominal...
            ModalMaterial::Bell => &[
                (0.5, 0.7, 6.0),
                (1.0, 1.0, 5.0),
                (1.2, 0.8, 4.0),
                (1.5, 0.6, 3.2),
                (2.0, 0.7, 2.6),
                (2.66, 0.4, 1.8),
                (3.0, 0.3, 1.4),
                (4.0, 0.25, 1.0),
                (5.33, 0.15, 0.7),
                (6.0, 0.1, 0.5),
            ],
            // Circular-membrane Bessel ratios.
            ModalMaterial::Membrane => &[
                (1.0, 1.0, 0.4),
                (1.594, 0.7, 0.3),
                (2.136, 0.5, 0.22),
                (2.296, 0.45, 0.2),
                (2.653, 0.35, 0.16),
                (2.918, 0.3, 0.14),
                (3.156, 0.2, 0.1),
                (3.501, 0.15, 0.08),
            ],
            ModalMaterial::String => &[
                (1.0, 1.0, 2.5),
                (2.0, 0.55, 1.8),
                (3.0, 0.35, 1.3),
                (4.0, 0.25, 0.9),
                (5.0, 0.18, 0.7),
                (6.0, 0.12, 0.5),
                (7.0, 0.08, 0.35),
                (8.0, 0.05, 0.25),
            ],
        }
    }
}

/// How energy enters the mode bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Exciter {
    #[default]
    Impulse,
    NoiseBurst,
    Pluck,
    Bow,
    Friction,
}

impl Exciter {
    pub fn from_index(index: usize) -> Self {
        match index {
            1 => Exciter::NoiseBurst,
            2 => Exciter::Pluck,
            3 => Exciter::Bow,
            4 => Exciter::Friction,
            _ => Exciter::Impulse,
        }
    }

    fn is_continuous(&self) -> bool {
        matches!(self, Exciter::Bow | Exciter::Friction)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ModeState {
    phase: Phase,
    frequency: f64,
    amplitude: f32,
    env: f32,
    /// Modal velocity, driven by the bow's stick-slip friction.
    velocity: f32,
    decay: f32,
}

struct ModalVoice {
    note: u8,
    seq: u64,
    velocity: f32,
    active: bool,
    gate: bool,
    exciter: Exciter,
    modes: [ModeState; MAX_MODES],
    mode_count: usize,
    burst_remaining: usize,
    burst_filter: OnePole,
}

impl ModalVoice {
    fn new() -> Self {
        Self {
            note: 0,
            seq: 0,
            velocity: 0.0,
            active: false,
            gate: false,
            exciter: Exciter::Impulse,
            modes: [ModeState::default(); MAX_MODES],
            mode_count: 0,
            burst_remaining: 0,
            burst_filter: OnePole::new(),
        }
    }
}

impl PoolVoice for ModalVoice {
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
        self.gate = false;
    }
    fn steal(&mut self) {
        self.active = false;
    }
}

struct Core {
    context: AudioContext,
    pool: VoicePool<ModalVoice>,
    material: ModalMaterial,
    exciter: Exciter,
    decay_scale: f32,
    stiffness: f32,
    strike_position: f32,
    bow_force: f32,
    bow_velocity: f32,
    gain: f32,
    rng: Rng,
}

impl Core {
    fn note_on(&mut self, note: u8, velocity: u8) {
        let (voice, seq) = self.pool.allocate(note, ModalVoice::new);
        voice.note = note;
        voice.seq = seq;
        voice.velocity = velocity as f32 / 127.0;
        voice.gate = true;
        voice.exciter = self.exciter;

        let sr = self.context.sample_rate;
        let f0 = note_to_hz(note);
        let nyquist_guard = sr * MAX_PARTIAL_FRACTION;

        let defs = self.material.modes();
        voice.mode_count = 0;
        for &(ratio, amp, decay) in defs.iter().take(MAX_MODES) {
            let stiffened =
                ratio * (1.0 + self.stiffness as f64 * (ratio - 1.0).powi(2) * 0.01);
            let frequency = f0 * stiffened;
            if frequency >= nyquist_guard {
                continue;
            }
            // Striking nearer a node weakens the modes anchored there.
            let position_weight =
                (std::f32::consts::PI * ratio as f32 * self.strike_position).sin().abs();
            let amplitude = amp * (0.2 + 0.8 * position_weight);
            if amplitude < 1e-4 {
                continue;
            }
            let mode = &mut voice.modes[voice.mode_count];
            mode.phase = Phase::new();
            mode.frequency = frequency;
            mode.amplitude = amplitude;
            mode.decay = decay;
            mode.velocity = 0.0;
            mode.env = match voice.exciter {
                Exciter::Impulse => voice.velocity,
                _ => 0.0,
            };
            voice.mode_count += 1;
        }

        match voice.exciter {
            Exciter::NoiseBurst | Exciter::Pluck => {
                voice.burst_remaining = (sr * 0.005) as usize;
                voice.burst_filter = if voice.exciter == Exciter::Pluck {
                    OnePole::lowpass(sr, 1800.0)
                } else {
                    OnePole::with_coeff(1.0)
                };
            }
            _ => voice.burst_remaining = 0,
        }

        voice.active = voice.mode_count > 0;
    }

    fn render(&mut self, region: &mut [f32]) {
        let channels = self.context.channels;
        let sr = self.context.sample_rate;
        let dt = (1.0 / sr) as f32;
        let decay_scale = self.decay_scale;
        let bow_force = self.bow_force;
        let bow_velocity = self.bow_velocity;
        let rng = &mut self.rng;

        for voice in self.pool.voices_mut() {
            if !voice.active {
                continue;
            }
            let continuous = voice.exciter.is_continuous();
            let mut peak = 0.0f32;

            for frame in region.chunks_exact_mut(channels) {
                // Excitation input for this sample.
                let burst = if voice.burst_remaining > 0 {
                    voice.burst_remaining -= 1;
                    voice.burst_filter.process(rng.next_bipolar()) * voice.velocity
                } else {
                    0.0
                };

                let mut sample = 0.0f32;
                for mode in voice.modes[..voice.mode_count].iter_mut() {
                    if continuous {
                        // Simplified stick-slip: friction follows the
                        // velocity difference, saturating like a real bow.
                        let drive = if voice.gate {
                            bow_velocity * voice.velocity
                        } else {
                            0.0
                        };
                        let dv = drive - mode.velocity;
                        let friction = (5.0 * dv).tanh() * bow_force;
                        mode.velocity = (mode.velocity + friction * dt * 60.0) * 0.999;
                        mode.env = mode.velocity.abs();
                    } else {
                        mode.env += burst.abs() * 0.2;
                        mode.env *= (-dt / (mode.decay * decay_scale)).exp();
                    }

                    if mode.env > 1e-4 {
                        sample +=
                            (mode.phase.value() * TAU).sin() as f32 * mode.env * mode.amplitude;
                    }
                    mode.phase.advance(mode.frequency, sr);
                }

                if !continuous {
                    sample = sample * 0.5 + burst * 0.1;
                }
                peak = peak.max(sample.abs());
                for out in frame.iter_mut() {
                    *out += sample;
                }
            }

            // A struck voice dies with its envelopes; a bowed voice dies
            // once the bow has lifted and the modes have rung down.
            let energy: f32 = voice.modes[..voice.mode_count]
                .iter()
                .map(|m| m.env)
                .sum();
            if (peak < SILENCE_THRESHOLD && energy < SILENCE_THRESHOLD)
                || (continuous && !voice.gate && energy < SILENCE_THRESHOLD)
            {
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
            "material" => self.material = ModalMaterial::from_index(value as usize),
            "exciter" => self.exciter = Exciter::from_index(value as usize),
            "decay_scale" => self.decay_scale = value,
            "stiffness" => self.stiffness = value,
            "strike_position" => self.strike_position = value,
            "bow_force" => self.bow_force = value,
            "bow_velocity" => self.bow_velocity = value,
            "gain" => self.gain = value,
            _ => {}
        }
    }
}

/// Struck/bowed resonator-bank generator.
pub struct ModalSynth {
    core: Mutex<Core>,
}

impl ModalSynth {
    pub fn new(context: AudioContext, max_voices: usize) -> Self {
        Self {
            core: Mutex::new(Core {
                context,
                pool: VoicePool::new(max_voices),
                material: ModalMaterial::WoodBar,
                exciter: Exciter::Impulse,
                decay_scale: 1.0,
                stiffness: 0.0,
                strike_position: 0.3,
                bow_force: 0.5,
                bow_velocity: 0.5,
                gain: 0.8,
                rng: Rng::from_seed(0x6d6f64),
            }),
        }
    }

    pub fn active_voices(&self) -> usize {
        self.core.lock().pool.active_count()
    }
}

impl SoundGenerator for ModalSynth {
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

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_struck_bar_rings_then_decays() {
        let synth = ModalSynth::new(AudioContext::new(48000.0, 2), 4);
        synth.set_parameter("material", 1.0); // metal bar, long decay
        synth.note_on(60, 110);

        let mut buf = vec![0.0f32; 9600];
        synth.render(&mut buf, 0, 9600);
        let early = rms(&buf);
        assert!(early > 0.0);

        // Skip ahead 4 s; the bank must have decayed well below onset level.
        for _ in 0..20 {
            synth.render(&mut buf, 0, 9600);
        }
        assert!(rms(&buf) < early);
    }

    #[test]
    fn test_bow_sustains_while_held() {
        let synth = ModalSynth::new(AudioContext::new(48000.0, 2), 4);
        synth.set_parameter("exciter", 3.0); // bow
        synth.note_on(55, 100);

        let mut buf = vec![0.0f32; 9600];
        synth.render(&mut buf, 0, 9600);
        for _ in 0..5 {
            synth.render(&mut buf, 0, 9600);
        }
        let held = rms(&buf);
        assert!(held > 0.0, "bowed voice fell silent while held");

        synth.note_off(55);
        for _ in 0..40 {
            synth.render(&mut buf, 0, 9600);
        }
        assert!(rms(&buf) < held * 0.5, "bow did not decay after release");
    }

    #[test]
    fn test_high_modes_skipped_near_nyquist() {
        // At note 120 most overtone ratios exceed 0.45 * sr.
        let synth = ModalSynth::new(AudioContext::new(22050.0, 2), 4);
        synth.note_on(120, 100);
        let mut buf = vec![0.0f32; 1024];
        assert_eq!(synth.render(&mut buf, 0, 1024), 1024);
    }
}
