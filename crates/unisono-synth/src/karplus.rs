//! Karplus-Strong plucked-string waveguide.
//!
//! Per-voice delay-line string with a one-pole loop lowpass, material
//! damping, an all-pass for fractional tuning, pickup-position comb
//! colouration, optional sympathetic strings, and a parallel bandpass
//! bank modelling the instrument body.

use crate::render::clear_region;
use parking_lot::Mutex;
use unisono_core::dsp::{soft_clip, Biquad, DelayLine, OnePole, Rng, SILENCE_THRESHOLD};
use unisono_core::generator::find_param;
use unisono_core::{note_to_hz, AudioContext, ParamKind, ParamSpec, PoolVoice, SoundGenerator, VoicePool};

const PARAMS: &[ParamSpec] = &[
    ParamSpec::new("material", 0.0, 0.0, 3.0).with_kind(ParamKind::Choice),
    ParamSpec::new("body", 1.0, 0.0, 4.0).with_kind(ParamKind::Choice),
    ParamSpec::new("brightness", 0.7, 0.05, 1.0),
    ParamSpec::new("pluck_position", 0.25, 0.0, 1.0),
    ParamSpec::new("pickup_position", 0.2, 0.0, 1.0),
    ParamSpec::new("stiffness", 0.0, 0.0, 1.0),
    ParamSpec::new("sympathetic", 0.0, 0.0, 1.0).with_kind(ParamKind::Toggle),
    ParamSpec::new("body_mix", 0.35, 0.0, 1.0),
    ParamSpec::new("gain", 0.8, 0.0, 1.0),
];

/// String material, selecting loop damping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringMaterial {
    #[default]
    Nylon,
    Steel,
    Bronze,
    Piano,
}

impl StringMaterial {
    pub fn from_index(index: usize) -> Self {
        match index {
            1 => StringMaterial::Steel,
            2 => StringMaterial::Bronze,
            3 => StringMaterial::Piano,
            _ => StringMaterial::Nylon,
        }
    }

    /// Loop damping per round trip, always below 1.
    fn damping(&self) -> f32 {
        match self {
            StringMaterial::Nylon => 0.994,
            StringMaterial::Steel => 0.998,
            StringMaterial::Bronze => 0.9965,
            StringMaterial::Piano => 0.9995,
        }
    }
}

/// Body-resonance preset: parallel bandpass sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyPreset {
    None,
    #[default]
    AcousticGuitar,
    Electric,
    Piano,
    Harp,
}

impl BodyPreset {
    pub fn from_index(index: usize) -> Self {
        match index {
            0 => BodyPreset::None,
            2 => BodyPreset::Electric,
            3 => BodyPreset::Piano,
            4 => BodyPreset::Harp,
            _ => BodyPreset::AcousticGuitar,
        }
    }

    /// `(frequency, q, gain)` per resonant section, at most 8.
    fn resonances(&self) -> &'static [(f64, f64, f32)] {
        match self {
            BodyPreset::None => &[],
            BodyPreset::AcousticGuitar => &[
                (100.0, 8.0, 0.9),
                (204.0, 10.0, 0.7),
                (399.0, 12.0, 0.5),
                (628.0, 14.0, 0.35),
                (1204.0, 16.0, 0.2),
            ],
            BodyPreset::Electric => &[(2600.0, 2.0, 0.3), (4800.0, 3.0, 0.15)],
            BodyPreset::Piano => &[
                (85.0, 5.0, 0.8),
                (170.0, 6.0, 0.6),
                (340.0, 8.0, 0.45),
                (680.0, 9.0, 0.3),
                (1360.0, 10.0, 0.2),
                (2720.0, 12.0, 0.1),
            ],
            BodyPreset::Harp => &[
                (140.0, 9.0, 0.8),
                (280.0, 11.0, 0.55),
                (560.0, 12.0, 0.35),
                (1120.0, 14.0, 0.2),
            ],
        }
    }
}

/// Sympathetic-string pitch ratios relative to the played note.
const SYMPATHETIC_RATIOS: [f64; 4] = [0.5, 2.0 / 3.0, 1.5, 2.0];
const SYMPATHETIC_FEEDBACK: f32 = 0.995;
const SYMPATHETIC_SEND: f32 = 0.02;
const SYMPATHETIC_LEVEL: f32 = 0.4;

struct SympatheticString {
    delay: DelayLine,
}

impl SympatheticString {
    fn tick(&mut self, input: f32) -> f32 {
        let len = self.delay.len();
        let y = self.delay.read(len - 1) * SYMPATHETIC_FEEDBACK + input * SYMPATHETIC_SEND;
        self.delay.push(y);
        y
    }
}

struct StringVoice {
    note: u8,
    seq: u64,
    velocity: f32,
    active: bool,
    delay: DelayLine,
    loop_filter: OnePole,
    damping: f32,
    // One-coefficient all-pass for the fractional part of the loop length.
    ap_coeff: f32,
    ap_x1: f32,
    ap_y1: f32,
    pickup_offset: f32,
    release_gain: f32,
    releasing: bool,
    sympathetics: Vec<SympatheticString>,
    block_peak: f32,
}

impl StringVoice {
    fn new() -> Self {
        Self {
            note: 0,
            seq: 0,
            velocity: 0.0,
            active: false,
            delay: DelayLine::new(2),
            loop_filter: OnePole::new(),
            damping: 0.994,
            ap_coeff: 0.0,
            ap_x1: 0.0,
            ap_y1: 0.0,
            pickup_offset: 0.0,
            release_gain: 1.0,
            releasing: false,
            sympathetics: Vec::new(),
            block_peak: 0.0,
        }
    }

    #[inline]
    fn allpass(&mut self, x: f32) -> f32 {
        let y = self.ap_coeff * x + self.ap_x1 - self.ap_coeff * self.ap_y1;
        self.ap_x1 = x;
        self.ap_y1 = y;
        y
    }
}

impl PoolVoice for StringVoice {
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
        self.releasing = true;
    }
    fn steal(&mut self) {
        self.active = false;
        self.delay.clear();
    }
}

struct Core {
    context: AudioContext,
    pool: VoicePool<StringVoice>,
    material: StringMaterial,
    body: BodyPreset,
    body_filters: Vec<(Biquad, f32)>,
    brightness: f32,
    pluck_position: f32,
    pickup_position: f32,
    stiffness: f32,
    sympathetic: bool,
    body_mix: f32,
    gain: f32,
    rng: Rng,
}

impl Core {
    fn rebuild_body(&mut self) {
        let sr = self.context.sample_rate;
        self.body_filters = self
            .body
            .resonances()
            .iter()
            .map(|&(freq, q, gain)| (Biquad::bandpass(sr, freq, q), gain / q as f32))
            .collect();
    }

    fn note_on(&mut self, note: u8, velocity: u8) {
        let (voice, seq) = self.pool.allocate(note, StringVoice::new);
        voice.note = note;
        voice.seq = seq;
        voice.velocity = velocity as f32 / 127.0;
        voice.releasing = false;
        voice.release_gain = 1.0;
        voice.damping = self.material.damping();

        let sr = self.context.sample_rate;
        // Stiffness raises the effective pitch slightly, the way string
        // inharmonicity sharpens upper partials.
        let freq = note_to_hz(note) * (1.0 + self.stiffness as f64 * 0.002);
        let exact = sr / freq;
        let len = (exact.round() as usize).max(2);
        // The all-pass absorbs the leftover fraction of the loop length,
        // shifted into [0.5, 1.5) to keep its coefficient stable.
        let frac = (exact - len as f64 + 1.0).clamp(0.5, 1.5) as f32;
        voice.ap_coeff = (1.0 - frac) / (1.0 + frac);
        voice.ap_x1 = 0.0;
        voice.ap_y1 = 0.0;

        voice.delay.resize(len);
        voice.loop_filter.reset();
        voice.loop_filter.set_coeff(self.brightness);
        voice.pickup_offset = self.pickup_position * len as f32 / 2.0;

        // Excitation: noise shaped by a triangle peaking at the pluck point.
        let pluck = (self.pluck_position.clamp(0.0, 1.0) * len as f32).max(1.0);
        let rng = &mut self.rng;
        let vel = voice.velocity;
        voice.delay.fill_with(|i| {
            let x = i as f32;
            let env = if x < pluck {
                x / pluck
            } else {
                1.0 - (x - pluck) / (len as f32 - pluck).max(1.0)
            };
            rng.next_bipolar() * env * vel
        });

        if self.sympathetic {
            if voice.sympathetics.len() != SYMPATHETIC_RATIOS.len() {
                voice.sympathetics = SYMPATHETIC_RATIOS
                    .iter()
                    .map(|_| SympatheticString {
                        delay: DelayLine::new(2),
                    })
                    .collect();
            }
            for (string, ratio) in voice.sympathetics.iter_mut().zip(SYMPATHETIC_RATIOS) {
                let len = ((sr / (freq * ratio)).round() as usize).max(2);
                string.delay.resize(len);
            }
        } else {
            voice.sympathetics.clear();
        }

        voice.active = true;
    }

    fn render(&mut self, region: &mut [f32]) {
        let channels = self.context.channels;
        let body_mix = if self.body_filters.is_empty() {
            0.0
        } else {
            self.body_mix
        };

        for voice in self.pool.voices_mut() {
            if !voice.active {
                continue;
            }
            voice.block_peak = 0.0;
            let len = voice.delay.len();
            let pickup = voice.pickup_offset;

            for frame in region.chunks_exact_mut(channels) {
                // Pickup blends adjacent taps for comb colouration.
                let tap = pickup as usize;
                let pickup_out = 0.5 * (voice.delay.read(tap) + voice.delay.read(tap + 1));

                // Loop: oldest sample -> lowpass -> damping -> all-pass -> back in.
                let oldest = voice.delay.read(len - 1);
                let mut looped = voice.loop_filter.process(oldest) * voice.damping;
                looped = voice.allpass(looped);
                voice.delay.push(looped);

                let mut sample = pickup_out;
                if !voice.sympathetics.is_empty() {
                    let mut sym = 0.0;
                    for string in voice.sympathetics.iter_mut() {
                        sym += string.tick(sample);
                    }
                    sample += sym * SYMPATHETIC_LEVEL;
                }

                if voice.releasing {
                    // Damp fast once the key is up.
                    voice.release_gain *= 0.9995;
                    sample *= voice.release_gain;
                }

                voice.block_peak = voice.block_peak.max(sample.abs());
                for out in frame.iter_mut() {
                    *out += sample;
                }
            }

            if voice.block_peak < SILENCE_THRESHOLD {
                voice.active = false;
            }
        }

        // Instrument body: parallel bandpass bank over the summed strings.
        if body_mix > 0.0 {
            for frame in region.chunks_exact_mut(channels) {
                let dry = frame[0];
                let mut wet = 0.0;
                for (filter, gain) in self.body_filters.iter_mut() {
                    wet += filter.process(dry) * *gain;
                }
                let mixed = dry * (1.0 - body_mix) + wet * body_mix;
                for out in frame.iter_mut() {
                    *out = mixed;
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
            "material" => self.material = StringMaterial::from_index(value as usize),
            "body" => {
                self.body = BodyPreset::from_index(value as usize);
                self.rebuild_body();
            }
            "brightness" => self.brightness = value,
            "pluck_position" => self.pluck_position = value,
            "pickup_position" => self.pickup_position = value,
            "stiffness" => self.stiffness = value,
            "sympathetic" => self.sympathetic = value != 0.0,
            "body_mix" => self.body_mix = value,
            "gain" => self.gain = value,
            _ => {}
        }
    }
}

/// Plucked-string generator.
pub struct KarplusStrong {
    core: Mutex<Core>,
}

impl KarplusStrong {
    pub fn new(context: AudioContext, max_voices: usize) -> Self {
        let mut core = Core {
            context,
            pool: VoicePool::new(max_voices),
            material: StringMaterial::Nylon,
            body: BodyPreset::AcousticGuitar,
            body_filters: Vec::new(),
            brightness: 0.7,
            pluck_position: 0.25,
            pickup_position: 0.2,
            stiffness: 0.0,
            sympathetic: false,
            body_mix: 0.35,
            gain: 0.8,
            rng: Rng::from_seed(0x4b53),
        };
        core.rebuild_body();
        Self {
            core: Mutex::new(core),
        }
    }

    pub fn active_voices(&self) -> usize {
        self.core.lock().pool.active_count()
    }
}

impl SoundGenerator for KarplusStrong {
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
    fn test_pluck_rings_and_decays() {
        let synth = KarplusStrong::new(AudioContext::new(48000.0, 2), 4);
        synth.note_on(64, 100);

        // Render 2 s in blocks, tracking the RMS per quarter second.
        let mut buf = vec![0.0f32; 24000];
        let mut window_rms = Vec::new();
        for _ in 0..8 {
            synth.render(&mut buf, 0, 24000);
            window_rms.push(rms(&buf));
        }
        assert!(window_rms[0] > 0.0, "string never sounded");
        // Monotonic decay with 5% ripple allowance for resonator motion.
        for pair in window_rms.windows(2) {
            assert!(pair[1] <= pair[0] * 1.05, "rms rose: {pair:?}");
        }
    }

    #[test]
    fn test_note_off_speeds_decay() {
        let held = KarplusStrong::new(AudioContext::new(48000.0, 2), 4);
        let released = KarplusStrong::new(AudioContext::new(48000.0, 2), 4);
        held.note_on(60, 100);
        released.note_on(60, 100);
        released.note_off(60);

        let mut buf_held = vec![0.0f32; 48000];
        let mut buf_rel = vec![0.0f32; 48000];
        held.render(&mut buf_held, 0, 48000);
        released.render(&mut buf_rel, 0, 48000);
        // Same excitation seed, so the comparison is apples to apples.
        assert!(rms(&buf_rel[40000..]) < rms(&buf_held[40000..]));
    }

    #[test]
    fn test_delay_length_min_two() {
        let synth = KarplusStrong::new(AudioContext::new(8000.0, 2), 2);
        // Note 127 at 8 kHz forces a sub-2-sample period.
        synth.note_on(127, 100);
        let mut buf = vec![0.0f32; 512];
        assert_eq!(synth.render(&mut buf, 0, 512), 512);
    }
}
