//! Drawbar tonewheel organ with a rotary-speaker stage.
//!
//! Nine drawbar harmonics per voice, tonewheel leakage, key click and the
//! percussion register; the summed organ signal then passes through a
//! two-rotor Leslie with asymmetric spin-up/spin-down and a small Doppler
//! detune on the horn.

use crate::render::clear_region;
use parking_lot::Mutex;
use std::f64::consts::TAU;
use unisono_core::dsp::{soft_clip, AdsrEnvelope, AdsrParams, DelayLine, Phase, Rng, MAX_PARTIAL_FRACTION};
use unisono_core::generator::find_param;
use unisono_core::{note_to_hz, AudioContext, ParamKind, ParamSpec, PoolVoice, SoundGenerator, VoicePool};

/// Drawbar pitch ratios: sub-octave, quint, unison, then the upper work.
const DRAWBAR_RATIOS: [f64; 9] = [0.5, 1.5, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 8.0];

/// Key click length in seconds.
const KEY_CLICK_SECONDS: f64 = 0.003;

/// Percussion decay rates (per second, exponential).
const PERCUSSION_FAST_RATE: f32 = 15.0;
const PERCUSSION_SLOW_RATE: f32 = 8.0;

/// Leslie rotor targets in RPM.
const LESLIE_SLOW_RPM: [f64; 2] = [40.0, 48.0];
const LESLIE_FAST_RPM: [f64; 2] = [340.0, 400.0];

/// Ramp time constants (seconds to ~63% of the target speed).
const ROTOR_RAMP_SECONDS: f64 = 1.5;
const HORN_RAMP_SECONDS: f64 = 0.5;

/// Spin-down is slower than spin-up by these factors.
const ROTOR_DECEL_FACTOR: f64 = 0.5;
const HORN_DECEL_FACTOR: f64 = 0.3;

/// Horn Doppler depth: +/-0.2% of the nominal path length.
const HORN_DOPPLER_DEPTH: f32 = 0.002;
const HORN_DELAY_SAMPLES: f32 = 64.0;

const PARAMS: &[ParamSpec] = &[
    ParamSpec::new("drawbar1", 8.0, 0.0, 8.0).with_kind(ParamKind::Int),
    ParamSpec::new("drawbar2", 8.0, 0.0, 8.0).with_kind(ParamKind::Int),
    ParamSpec::new("drawbar3", 8.0, 0.0, 8.0).with_kind(ParamKind::Int),
    ParamSpec::new("drawbar4", 0.0, 0.0, 8.0).with_kind(ParamKind::Int),
    ParamSpec::new("drawbar5", 0.0, 0.0, 8.0).with_kind(ParamKind::Int),
    ParamSpec::new("drawbar6", 0.0, 0.0, 8.0).with_kind(ParamKind::Int),
    ParamSpec::new("drawbar7", 0.0, 0.0, 8.0).with_kind(ParamKind::Int),
    ParamSpec::new("drawbar8", 0.0, 0.0, 8.0).with_kind(ParamKind::Int),
    ParamSpec::new("drawbar9", 0.0, 0.0, 8.0).with_kind(ParamKind::Int),
    ParamSpec::new("percussion", 0.0, 0.0, 2.0).with_kind(ParamKind::Choice),
    ParamSpec::new("percussion_fast", 1.0, 0.0, 1.0).with_kind(ParamKind::Toggle),
    ParamSpec::new("leakage", 0.02, 0.0, 0.1),
    ParamSpec::new("key_click", 0.5, 0.0, 1.0),
    ParamSpec::new("leslie", 1.0, 0.0, 2.0).with_kind(ParamKind::Choice),
    ParamSpec::new("horn_level", 0.7, 0.0, 1.0),
    ParamSpec::new("drum_level", 0.7, 0.0, 1.0),
    ParamSpec::new("gain", 0.8, 0.0, 1.0),
];

struct OrganVoice {
    note: u8,
    seq: u64,
    velocity: f32,
    frequency: f64,
    harmonics: [Phase; 9],
    env: AdsrEnvelope,
    click_remaining: usize,
    click_total: usize,
    percussion_phase: Phase,
    percussion_env: f32,
}

impl OrganVoice {
    fn new(sample_rate: f64) -> Self {
        Self {
            note: 0,
            seq: 0,
            velocity: 0.0,
            frequency: 0.0,
            harmonics: [Phase::new(); 9],
            env: AdsrEnvelope::new(sample_rate),
            click_remaining: 0,
            click_total: 1,
            percussion_phase: Phase::new(),
            percussion_env: 0.0,
        }
    }
}

impl PoolVoice for OrganVoice {
    fn is_active(&self) -> bool {
        !self.env.is_idle()
    }
    fn note(&self) -> u8 {
        self.note
    }
    fn trigger_seq(&self) -> u64 {
        self.seq
    }
    fn begin_release(&mut self) {
        self.env.release();
    }
    fn steal(&mut self) {
        self.env.reset();
    }
}

/// One Leslie rotor: angular position plus first-order speed tracking.
struct Rotor {
    phase: f64,
    speed_hz: f64,
    ramp_seconds: f64,
    decel_factor: f64,
}

impl Rotor {
    fn new(ramp_seconds: f64, decel_factor: f64) -> Self {
        Self {
            phase: 0.0,
            speed_hz: 0.0,
            ramp_seconds,
            decel_factor,
        }
    }

    #[inline]
    fn tick(&mut self, target_hz: f64, dt: f64) {
        let ramp = if target_hz >= self.speed_hz {
            self.ramp_seconds
        } else {
            self.ramp_seconds / self.decel_factor
        };
        self.speed_hz += (target_hz - self.speed_hz) * (dt / ramp);
        self.phase = (self.phase + self.speed_hz * dt).rem_euclid(1.0);
    }
}

/// Rotary mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum LeslieMode {
    Off,
    #[default]
    Slow,
    Fast,
}

struct Core {
    context: AudioContext,
    pool: VoicePool<OrganVoice>,
    drawbars: [f32; 9],
    percussion: u8,
    percussion_fast: bool,
    leakage: f32,
    key_click: f32,
    leslie_mode: LeslieMode,
    horn_level: f32,
    drum_level: f32,
    gain: f32,
    drum_rotor: Rotor,
    horn_rotor: Rotor,
    horn_delay: DelayLine,
    rng: Rng,
}

impl Core {
    fn note_on(&mut self, note: u8, velocity: u8) {
        let sample_rate = self.context.sample_rate;
        let (voice, seq) = self.pool.allocate(note, || OrganVoice::new(sample_rate));
        voice.note = note;
        voice.seq = seq;
        voice.velocity = velocity as f32 / 127.0;
        voice.frequency = note_to_hz(note);
        voice.click_total = (sample_rate * KEY_CLICK_SECONDS) as usize;
        voice.click_remaining = voice.click_total;
        voice.percussion_phase.reset();
        voice.percussion_env = 1.0;
        voice.env.trigger();
    }

    fn render(&mut self, region: &mut [f32]) {
        let channels = self.context.channels;
        let sr = self.context.sample_rate;
        let dt = 1.0 / sr;
        let nyquist_guard = sr * MAX_PARTIAL_FRACTION;
        // Organs gate on and off with only a tiny de-click ramp.
        let organ_adsr = AdsrParams {
            attack: 0.004,
            decay: 0.001,
            sustain: 1.0,
            release: 0.008,
        };
        let percussion_rate = if self.percussion_fast {
            PERCUSSION_FAST_RATE
        } else {
            PERCUSSION_SLOW_RATE
        };
        let percussion_ratio = match self.percussion {
            1 => Some(2.0f64),
            2 => Some(3.0f64),
            _ => None,
        };
        let drawbars = self.drawbars;
        let leakage = self.leakage;
        let key_click = self.key_click;
        let rng = &mut self.rng;

        // Mono organ sum for this block, pre-Leslie.
        for frame_index in 0..region.len() / channels {
            let mut organ = 0.0f32;
            for voice in self.pool.voices_mut() {
                if !voice.is_active() {
                    continue;
                }
                let mut sum = 0.0f32;
                for (h, &ratio) in DRAWBAR_RATIOS.iter().enumerate() {
                    let amp = drawbars[h] / 8.0;
                    let freq = voice.frequency * ratio;
                    if freq >= nyquist_guard {
                        continue;
                    }
                    let theta = voice.harmonics[h].value() * TAU;
                    voice.harmonics[h].advance(freq, sr);
                    if amp <= 0.0 && leakage <= 0.0 {
                        continue;
                    }
                    let partial = theta.sin() as f32;
                    // Tonewheel leakage bleeds in the 2nd and 3rd partials
                    // of each sounding wheel.
                    let bleed = leakage * ((theta * 2.0).sin() + (theta * 3.0).sin()) as f32 * 0.5;
                    sum += amp * (partial + bleed);
                }
                sum /= DRAWBAR_RATIOS.len() as f32;

                if let Some(ratio) = percussion_ratio {
                    let theta = voice.percussion_phase.value() * TAU;
                    voice.percussion_phase.advance(voice.frequency * ratio, sr);
                    sum += (theta.sin() as f32) * voice.percussion_env * 0.5;
                    voice.percussion_env *= (-percussion_rate * dt as f32).exp();
                }

                if voice.click_remaining > 0 {
                    voice.click_remaining -= 1;
                    let window = voice.click_remaining as f32 / voice.click_total as f32;
                    sum += rng.next_bipolar() * key_click * window * 0.3;
                }

                organ += sum * voice.env.next(&organ_adsr) * voice.velocity;
            }

            let frame = &mut region[frame_index * channels..(frame_index + 1) * channels];
            match self.leslie_mode {
                LeslieMode::Off => {
                    for out in frame.iter_mut() {
                        *out += organ;
                    }
                }
                mode => {
                    let (drum_target, horn_target) = match mode {
                        LeslieMode::Fast => (LESLIE_FAST_RPM[0] / 60.0, LESLIE_FAST_RPM[1] / 60.0),
                        _ => (LESLIE_SLOW_RPM[0] / 60.0, LESLIE_SLOW_RPM[1] / 60.0),
                    };
                    self.drum_rotor.tick(drum_target, dt);
                    self.horn_rotor.tick(horn_target, dt);

                    // Horn path gets the Doppler wobble via a modulated tap.
                    self.horn_delay.push(organ * self.horn_level);
                    let horn_angle = (self.horn_rotor.phase * TAU).sin() as f32;
                    let tap = HORN_DELAY_SAMPLES * (1.0 + HORN_DOPPLER_DEPTH * horn_angle);
                    let horn = self.horn_delay.read_frac(tap);
                    let horn_am = 0.5 + 0.5 * horn_angle;

                    let drum_angle = (self.drum_rotor.phase * TAU).sin() as f32;
                    let drum = organ * self.drum_level;
                    let drum_am = 0.5 + 0.5 * drum_angle;

                    if channels == 2 {
                        let horn_l = horn * horn_am * (0.5 - 0.35 * horn_angle);
                        let horn_r = horn * horn_am * (0.5 + 0.35 * horn_angle);
                        let drum_l = drum * drum_am * (0.5 - 0.35 * drum_angle);
                        let drum_r = drum * drum_am * (0.5 + 0.35 * drum_angle);
                        frame[0] += horn_l + drum_l;
                        frame[1] += horn_r + drum_r;
                    } else {
                        frame[0] += horn * horn_am + drum * drum_am;
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
            "percussion" => self.percussion = value as u8,
            "percussion_fast" => self.percussion_fast = value != 0.0,
            "leakage" => self.leakage = value,
            "key_click" => self.key_click = value,
            "leslie" => {
                self.leslie_mode = match value as usize {
                    0 => LeslieMode::Off,
                    2 => LeslieMode::Fast,
                    _ => LeslieMode::Slow,
                }
            }
            "horn_level" => self.horn_level = value,
            "drum_level" => self.drum_level = value,
            "gain" => self.gain = value,
            name => {
                if let Some(index) = name.strip_prefix("drawbar") {
                    if let Ok(index) = index.parse::<usize>() {
                        if (1..=9).contains(&index) {
                            self.drawbars[index - 1] = value.round();
                        }
                    }
                }
            }
        }
    }
}

/// Drawbar organ generator.
pub struct Tonewheel {
    core: Mutex<Core>,
}

impl Tonewheel {
    pub fn new(context: AudioContext, max_voices: usize) -> Self {
        Self {
            core: Mutex::new(Core {
                context,
                pool: VoicePool::new(max_voices),
                drawbars: [8.0, 8.0, 8.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                percussion: 0,
                percussion_fast: true,
                leakage: 0.02,
                key_click: 0.5,
                leslie_mode: LeslieMode::Slow,
                horn_level: 0.7,
                drum_level: 0.7,
                gain: 0.8,
                drum_rotor: Rotor::new(ROTOR_RAMP_SECONDS, ROTOR_DECEL_FACTOR),
                horn_rotor: Rotor::new(HORN_RAMP_SECONDS, HORN_DECEL_FACTOR),
                horn_delay: DelayLine::new(256),
                rng: Rng::from_seed(0xb3),
            }),
        }
    }

    pub fn active_voices(&self) -> usize {
        self.core.lock().pool.active_count()
    }
}

impl SoundGenerator for Tonewheel {
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

    #[test]
    fn test_organ_sounds_while_held() {
        let organ = Tonewheel::new(AudioContext::new(48000.0, 2), 8);
        organ.note_on(60, 100);
        let mut buf = vec![0.0f32; 9600];
        organ.render(&mut buf, 0, 9600);
        let energy: f32 = buf.iter().map(|s| s * s).sum();
        assert!(energy > 0.0);
    }

    #[test]
    fn test_gate_release_is_quick() {
        let organ = Tonewheel::new(AudioContext::new(48000.0, 2), 8);
        organ.note_on(60, 100);
        let mut buf = vec![0.0f32; 4800];
        organ.render(&mut buf, 0, 4800);
        organ.note_off(60);
        // 100 ms is far beyond the organ's de-click release.
        organ.render(&mut buf, 0, 4800);
        assert_eq!(organ.active_voices(), 0);
    }

    #[test]
    fn test_leslie_modulates_amplitude() {
        let organ = Tonewheel::new(AudioContext::new(48000.0, 2), 8);
        organ.set_parameter("leslie", 2.0); // fast
        organ.set_parameter("key_click", 0.0);
        organ.note_on(60, 100);

        // Let the rotors spin up, then compare short-window RMS values:
        // at ~6 Hz the tremolo must swing the level across 50 ms windows.
        let mut buf = vec![0.0f32; 48000 * 2];
        organ.render(&mut buf, 0, 48000 * 2);
        organ.render(&mut buf, 0, 48000 * 2);

        let window = 4800; // 50 ms of stereo samples
        let mut rms = Vec::new();
        for chunk in buf.chunks(window) {
            rms.push((chunk.iter().map(|s| s * s).sum::<f32>() / window as f32).sqrt());
        }
        let max = rms.iter().cloned().fold(0.0f32, f32::max);
        let min = rms.iter().cloned().fold(f32::MAX, f32::min);
        assert!(max > min * 1.2, "no tremolo: min {min}, max {max}");
    }

    #[test]
    fn test_drawbar_clamp() {
        let organ = Tonewheel::new(AudioContext::new(48000.0, 2), 8);
        organ.set_parameter("drawbar1", 99.0);
        organ.set_parameter("drawbar9", -5.0);
        // Clamped to [0, 8]; render must stay well-formed.
        organ.note_on(60, 100);
        let mut buf = vec![0.0f32; 512];
        assert_eq!(organ.render(&mut buf, 0, 512), 512);
    }
}
