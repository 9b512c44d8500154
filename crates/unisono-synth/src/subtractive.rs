//! Virtual-analog subtractive synthesizer.
//!
//! Two detunable phase-accumulator oscillators per voice, a resonant
//! lowpass with envelope modulation, and a per-voice ADSR.

use crate::render::clear_region;
use parking_lot::Mutex;
use unisono_core::dsp::{soft_clip, AdsrEnvelope, AdsrParams, Biquad, Phase, Waveform};
use unisono_core::generator::find_param;
use unisono_core::{note_to_hz, AudioContext, ParamKind, ParamSpec, ParamUnit, PoolVoice, SoundGenerator, VoicePool};

const PARAMS: &[ParamSpec] = &[
    ParamSpec::new("waveform", 1.0, 0.0, 3.0).with_kind(ParamKind::Choice),
    ParamSpec::new("attack", 0.01, 0.0, 10.0).with_unit(ParamUnit::Seconds),
    ParamSpec::new("decay", 0.1, 0.0, 10.0).with_unit(ParamUnit::Seconds),
    ParamSpec::new("sustain", 0.7, 0.0, 1.0),
    ParamSpec::new("release", 0.2, 0.0, 10.0).with_unit(ParamUnit::Seconds),
    ParamSpec::new("cutoff", 8000.0, 20.0, 20000.0).with_unit(ParamUnit::Hertz),
    ParamSpec::new("resonance", 0.707, 0.5, 10.0),
    ParamSpec::new("env_amount", 0.0, 0.0, 4.0),
    ParamSpec::new("detune", 7.0, 0.0, 50.0).with_unit(ParamUnit::Cents),
    ParamSpec::new("osc_mix", 0.5, 0.0, 1.0),
    ParamSpec::new("gain", 0.8, 0.0, 1.0),
];

struct SubVoice {
    note: u8,
    seq: u64,
    velocity: f32,
    frequency: f64,
    phase1: Phase,
    phase2: Phase,
    env: AdsrEnvelope,
    filter: Biquad,
}

impl SubVoice {
    fn new(sample_rate: f64) -> Self {
        Self {
            note: 0,
            seq: 0,
            velocity: 0.0,
            frequency: 0.0,
            phase1: Phase::new(),
            phase2: Phase::new(),
            env: AdsrEnvelope::new(sample_rate),
            filter: Biquad::identity(),
        }
    }

    fn trigger(&mut self, note: u8, velocity: u8, seq: u64) {
        self.note = note;
        self.seq = seq;
        self.velocity = velocity as f32 / 127.0;
        self.frequency = note_to_hz(note);
        self.env.trigger();
    }
}

impl PoolVoice for SubVoice {
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
        self.filter.reset();
    }
}

struct Core {
    context: AudioContext,
    pool: VoicePool<SubVoice>,
    waveform: Waveform,
    adsr: AdsrParams,
    cutoff: f32,
    resonance: f32,
    env_amount: f32,
    detune_cents: f32,
    osc_mix: f32,
    gain: f32,
}

impl Core {
    fn note_on(&mut self, note: u8, velocity: u8) {
        let sample_rate = self.context.sample_rate;
        let (voice, seq) = self.pool.allocate(note, || SubVoice::new(sample_rate));
        voice.trigger(note, velocity, seq);
    }

    fn render(&mut self, region: &mut [f32]) {
        let channels = self.context.channels;
        let sr = self.context.sample_rate;
        let detune_ratio = 2.0f64.powf(self.detune_cents as f64 / 1200.0);

        for voice in self.pool.voices_mut() {
            if !voice.is_active() {
                continue;
            }
            // Filter coefficients are updated once per block, tracking the
            // envelope level at the block boundary.
            let env_level = voice.env.value();
            let cutoff = (self.cutoff as f64 * (1.0 + self.env_amount as f64 * env_level as f64))
                .min(sr * 0.45);
            let coeffs = Biquad::lowpass(sr, cutoff, self.resonance as f64);
            voice.filter.set_coefficients_from(&coeffs);

            for frame in region.chunks_exact_mut(channels) {
                let osc1 = self.waveform.evaluate(voice.phase1.value());
                let osc2 = self.waveform.evaluate(voice.phase2.value());
                voice.phase1.advance(voice.frequency, sr);
                voice.phase2.advance(voice.frequency * detune_ratio, sr);

                let mixed = osc1 * (1.0 - self.osc_mix) + osc2 * self.osc_mix;
                let shaped = voice.filter.process(mixed);
                let sample = shaped * voice.env.next(&self.adsr) * voice.velocity;

                for out in frame.iter_mut() {
                    *out += sample;
                }
                if voice.env.is_idle() {
                    break;
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
            "waveform" => self.waveform = Waveform::from_index(value as usize),
            "attack" => self.adsr.attack = value,
            "decay" => self.adsr.decay = value,
            "sustain" => self.adsr.sustain = value,
            "release" => self.adsr.release = value,
            "cutoff" => self.cutoff = value,
            "resonance" => self.resonance = value,
            "env_amount" => self.env_amount = value,
            "detune" => self.detune_cents = value,
            "osc_mix" => self.osc_mix = value,
            "gain" => self.gain = value,
            _ => {}
        }
    }
}

/// Polyphonic virtual-analog synth.
pub struct SubtractiveSynth {
    core: Mutex<Core>,
}

impl SubtractiveSynth {
    pub fn new(context: AudioContext, max_voices: usize) -> Self {
        Self {
            core: Mutex::new(Core {
                context,
                pool: VoicePool::new(max_voices),
                waveform: Waveform::Saw,
                adsr: AdsrParams::default(),
                cutoff: 8000.0,
                resonance: 0.707,
                env_amount: 0.0,
                detune_cents: 7.0,
                osc_mix: 0.5,
                gain: 0.8,
            }),
        }
    }

    pub fn active_voices(&self) -> usize {
        self.core.lock().pool.active_count()
    }
}

impl SoundGenerator for SubtractiveSynth {
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

    fn ctx() -> AudioContext {
        AudioContext::new(48000.0, 2)
    }

    #[test]
    fn test_silence_with_no_notes() {
        let synth = SubtractiveSynth::new(ctx(), 8);
        let mut buf = vec![1.0f32; 512];
        assert_eq!(synth.render(&mut buf, 0, 512), 512);
        assert!(buf.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_note_produces_signal() {
        let synth = SubtractiveSynth::new(ctx(), 8);
        synth.note_on(69, 100);
        let mut buf = vec![0.0f32; 4096];
        synth.render(&mut buf, 0, 4096);
        let energy: f32 = buf.iter().map(|s| s * s).sum();
        assert!(energy > 0.0, "note rendered silence");
    }

    #[test]
    fn test_velocity_zero_is_note_off() {
        let synth = SubtractiveSynth::new(ctx(), 8);
        synth.note_on(60, 100);
        synth.note_on(60, 0);
        // Voice should be releasing; after the release time it goes idle.
        synth.set_parameter("release", 0.01);
        let mut buf = vec![0.0f32; 9600];
        for _ in 0..10 {
            synth.render(&mut buf, 0, 9600);
        }
        assert_eq!(synth.active_voices(), 0);
    }

    #[test]
    fn test_cap_is_honored() {
        let synth = SubtractiveSynth::new(ctx(), 2);
        synth.note_on(60, 100);
        synth.note_on(64, 100);
        synth.note_on(67, 100);
        assert_eq!(synth.active_voices(), 2);
        // The oldest (note 60) was stolen: releasing it is a no-op, the
        // other two still sound.
        synth.note_off(60);
        assert_eq!(synth.active_voices(), 2);
    }

    #[test]
    fn test_unknown_parameter_ignored() {
        let synth = SubtractiveSynth::new(ctx(), 2);
        synth.set_parameter("does_not_exist", 42.0);
        synth.set_parameter("CUTOFF", 1234.0); // case-insensitive
        let mut buf = vec![0.0f32; 64];
        assert_eq!(synth.render(&mut buf, 0, 64), 64);
    }

    #[test]
    fn test_out_of_range_note_ignored() {
        let synth = SubtractiveSynth::new(ctx(), 2);
        synth.note_on(200, 100);
        assert_eq!(synth.active_voices(), 0);
    }
}
