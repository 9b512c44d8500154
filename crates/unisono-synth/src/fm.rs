//! Four-operator FM in the OPN (YM2612) mould.
//!
//! Six channels, each a voice of four sine operators; eight algorithm
//! routings decide which operators modulate which and which are summed as
//! carriers. Operator 1 has a self-feedback path fed by the average of
//! its last two outputs. A global LFO at the eight hardware rates applies
//! amplitude modulation per channel.

use crate::render::clear_region;
use parking_lot::Mutex;
use std::f32::consts::PI;
use std::f64::consts::TAU;
use unisono_core::dsp::{soft_clip, OpnEnvelope, OpnEnvelopeParams, Phase};
use unisono_core::generator::find_param;
use unisono_core::{note_to_hz, AudioContext, ParamKind, ParamSpec, PoolVoice, SoundGenerator, VoicePool};

/// The OPN has six hardware channels; the pool maps notes onto them.
pub const CHANNELS: usize = 6;

/// The eight hardware LFO frequencies in Hz.
const LFO_RATES: [f64; 8] = [3.98, 5.56, 6.02, 6.37, 6.88, 9.63, 48.1, 72.2];

/// Feedback level 1..=7 maps to a modulation gain of `2^(level - 5)`.
const FEEDBACK_BASE: i32 = -5;

const PARAMS: &[ParamSpec] = &[
    ParamSpec::new("algorithm", 4.0, 0.0, 7.0).with_kind(ParamKind::Choice),
    ParamSpec::new("feedback", 3.0, 0.0, 7.0).with_kind(ParamKind::Int),
    ParamSpec::new("lfo_rate", 3.0, 0.0, 7.0).with_kind(ParamKind::Int),
    ParamSpec::new("lfo_enable", 0.0, 0.0, 1.0).with_kind(ParamKind::Toggle),
    ParamSpec::new("am_sensitivity", 0.0, 0.0, 3.0).with_kind(ParamKind::Int),
    ParamSpec::new("pan", 3.0, 0.0, 3.0).with_kind(ParamKind::Int),
    ParamSpec::new("op1_multiple", 1.0, 0.5, 15.0),
    ParamSpec::new("op2_multiple", 1.0, 0.5, 15.0),
    ParamSpec::new("op3_multiple", 1.0, 0.5, 15.0),
    ParamSpec::new("op4_multiple", 1.0, 0.5, 15.0),
    ParamSpec::new("op1_level", 0.8, 0.0, 1.0),
    ParamSpec::new("op2_level", 0.8, 0.0, 1.0),
    ParamSpec::new("op3_level", 0.8, 0.0, 1.0),
    ParamSpec::new("op4_level", 0.9, 0.0, 1.0),
    ParamSpec::new("op1_attack", 31.0, 0.0, 31.0).with_kind(ParamKind::Int),
    ParamSpec::new("op2_attack", 31.0, 0.0, 31.0).with_kind(ParamKind::Int),
    ParamSpec::new("op3_attack", 31.0, 0.0, 31.0).with_kind(ParamKind::Int),
    ParamSpec::new("op4_attack", 31.0, 0.0, 31.0).with_kind(ParamKind::Int),
    ParamSpec::new("op1_decay1", 12.0, 0.0, 31.0).with_kind(ParamKind::Int),
    ParamSpec::new("op2_decay1", 12.0, 0.0, 31.0).with_kind(ParamKind::Int),
    ParamSpec::new("op3_decay1", 12.0, 0.0, 31.0).with_kind(ParamKind::Int),
    ParamSpec::new("op4_decay1", 12.0, 0.0, 31.0).with_kind(ParamKind::Int),
    ParamSpec::new("op1_decay2", 4.0, 0.0, 31.0).with_kind(ParamKind::Int),
    ParamSpec::new("op2_decay2", 4.0, 0.0, 31.0).with_kind(ParamKind::Int),
    ParamSpec::new("op3_decay2", 4.0, 0.0, 31.0).with_kind(ParamKind::Int),
    ParamSpec::new("op4_decay2", 4.0, 0.0, 31.0).with_kind(ParamKind::Int),
    ParamSpec::new("op1_release", 15.0, 0.0, 31.0).with_kind(ParamKind::Int),
    ParamSpec::new("op2_release", 15.0, 0.0, 31.0).with_kind(ParamKind::Int),
    ParamSpec::new("op3_release", 15.0, 0.0, 31.0).with_kind(ParamKind::Int),
    ParamSpec::new("op4_release", 15.0, 0.0, 31.0).with_kind(ParamKind::Int),
    ParamSpec::new("op1_sustain", 0.6, 0.0, 1.0),
    ParamSpec::new("op2_sustain", 0.6, 0.0, 1.0),
    ParamSpec::new("op3_sustain", 0.6, 0.0, 1.0),
    ParamSpec::new("op4_sustain", 0.7, 0.0, 1.0),
    ParamSpec::new("gain", 0.8, 0.0, 1.0),
];

/// Per-operator patch settings.
#[derive(Debug, Clone, Copy)]
struct OperatorParams {
    multiple: f64,
    level: f32,
    envelope: OpnEnvelopeParams,
}

impl Default for OperatorParams {
    fn default() -> Self {
        Self {
            multiple: 1.0,
            level: 0.8,
            envelope: OpnEnvelopeParams::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Operator {
    phase: Phase,
    env: OpnEnvelope,
    /// Last two outputs, for the operator-1 feedback average.
    out_prev: [f32; 2],
}

impl Operator {
    fn new(sample_rate: f64) -> Self {
        Self {
            phase: Phase::new(),
            env: OpnEnvelope::new(sample_rate),
            out_prev: [0.0; 2],
        }
    }

    #[inline]
    fn tick(&mut self, frequency: f64, modulation: f32, params: &OperatorParams, sr: f64) -> f32 {
        let out = ((self.phase.value() * TAU) as f32 + PI * modulation).sin()
            * self.env.next(&params.envelope)
            * params.level;
        self.phase.advance(frequency * params.multiple, sr);
        self.out_prev[1] = self.out_prev[0];
        self.out_prev[0] = out;
        out
    }
}

struct FmVoice {
    note: u8,
    seq: u64,
    velocity: f32,
    frequency: f64,
    operators: [Operator; 4],
}

impl FmVoice {
    fn new(sample_rate: f64) -> Self {
        Self {
            note: 0,
            seq: 0,
            velocity: 0.0,
            frequency: 0.0,
            operators: [Operator::new(sample_rate); 4],
        }
    }
}

impl PoolVoice for FmVoice {
    fn is_active(&self) -> bool {
        self.operators.iter().any(|op| !op.env.is_idle())
    }
    fn note(&self) -> u8 {
        self.note
    }
    fn trigger_seq(&self) -> u64 {
        self.seq
    }
    fn begin_release(&mut self) {
        for op in self.operators.iter_mut() {
            op.env.release();
        }
    }
    fn steal(&mut self) {
        for op in self.operators.iter_mut() {
            op.env.reset();
            op.out_prev = [0.0; 2];
        }
    }
}

/// Which operators feed the output for each of the eight algorithms.
/// Operators are numbered 0-3 here (1-4 in the hardware manuals).
pub fn is_carrier(algorithm: u8, op: usize) -> bool {
    match algorithm {
        0..=3 => op == 3,
        4 => op == 1 || op == 3,
        5 | 6 => op != 0,
        _ => true,
    }
}

struct Core {
    context: AudioContext,
    pool: VoicePool<FmVoice>,
    algorithm: u8,
    feedback: u8,
    operators: [OperatorParams; 4],
    lfo_enable: bool,
    lfo_rate: usize,
    lfo_phase: Phase,
    am_sensitivity: u8,
    pan_mask: u8,
    gain: f32,
}

impl Core {
    fn note_on(&mut self, note: u8, velocity: u8) {
        let sample_rate = self.context.sample_rate;
        let (voice, seq) = self.pool.allocate(note, || FmVoice::new(sample_rate));
        voice.note = note;
        voice.seq = seq;
        voice.velocity = velocity as f32 / 127.0;
        voice.frequency = note_to_hz(note);
        for op in voice.operators.iter_mut() {
            op.phase.reset();
            op.out_prev = [0.0; 2];
            op.env.trigger();
        }
    }

    /// Run one channel for one sample, returning the summed carrier output.
    #[inline]
    fn tick_voice(voice: &mut FmVoice, params: &[OperatorParams; 4], algorithm: u8, fb_gain: f32, sr: f64) -> f32 {
        let f = voice.frequency;
        let fb_in = (voice.operators[0].out_prev[0] + voice.operators[0].out_prev[1]) * 0.5 * fb_gain;

        let o1 = voice.operators[0].tick(f, fb_in, &params[0], sr);
        match algorithm {
            0 => {
                // 1 -> 2 -> 3 -> 4
                let o2 = voice.operators[1].tick(f, o1, &params[1], sr);
                let o3 = voice.operators[2].tick(f, o2, &params[2], sr);
                voice.operators[3].tick(f, o3, &params[3], sr)
            }
            1 => {
                // (1 + 2) -> 3 -> 4
                let o2 = voice.operators[1].tick(f, 0.0, &params[1], sr);
                let o3 = voice.operators[2].tick(f, o1 + o2, &params[2], sr);
                return voice.operators[3].tick(f, o3, &params[3], sr);
            }
            2 => {
                // 1 -> 4, 2 -> 3 -> 4
                let o2 = voice.operators[1].tick(f, 0.0, &params[1], sr);
                let o3 = voice.operators[2].tick(f, o2, &params[2], sr);
                return voice.operators[3].tick(f, o1 + o3, &params[3], sr);
            }
            3 => {
                // (1 -> 2) + 3 -> 4
                let o2 = voice.operators[1].tick(f, o1, &params[1], sr);
                let o3 = voice.operators[2].tick(f, 0.0, &params[2], sr);
                return voice.operators[3].tick(f, o2 + o3, &params[3], sr);
            }
            4 => {
                // 1 -> 2, 3 -> 4; carriers 2 and 4
                let o2 = voice.operators[1].tick(f, o1, &params[1], sr);
                let o3 = voice.operators[2].tick(f, 0.0, &params[2], sr);
                let o4 = voice.operators[3].tick(f, o3, &params[3], sr);
                return o2 + o4;
            }
            5 => {
                // 1 modulates 2, 3 and 4; all three are carriers
                let o2 = voice.operators[1].tick(f, o1, &params[1], sr);
                let o3 = voice.operators[2].tick(f, o1, &params[2], sr);
                let o4 = voice.operators[3].tick(f, o1, &params[3], sr);
                return o2 + o3 + o4;
            }
            6 => {
                // 1 -> 2; 3 and 4 run free
                let o2 = voice.operators[1].tick(f, o1, &params[1], sr);
                let o3 = voice.operators[2].tick(f, 0.0, &params[2], sr);
                let o4 = voice.operators[3].tick(f, 0.0, &params[3], sr);
                return o2 + o3 + o4;
            }
            _ => {
                // All four in parallel
                let o2 = voice.operators[1].tick(f, 0.0, &params[1], sr);
                let o3 = voice.operators[2].tick(f, 0.0, &params[2], sr);
                let o4 = voice.operators[3].tick(f, 0.0, &params[3], sr);
                return o1 + o2 + o3 + o4;
            }
        }
    }

    fn render(&mut self, region: &mut [f32]) {
        let channels = self.context.channels;
        let sr = self.context.sample_rate;
        let fb_gain = if self.feedback == 0 {
            0.0
        } else {
            2.0f32.powi(self.feedback as i32 + FEEDBACK_BASE)
        };
        let am_depth = if self.lfo_enable {
            self.am_sensitivity as f32 / 3.0
        } else {
            0.0
        };
        let lfo_freq = LFO_RATES[self.lfo_rate.min(7)];
        let left_on = self.pan_mask & 0b10 != 0;
        let right_on = self.pan_mask & 0b01 != 0;
        let algorithm = self.algorithm;
        let params = self.operators;

        for frame in region.chunks_exact_mut(channels) {
            let lfo = (self.lfo_phase.value() * TAU).sin() as f32;
            self.lfo_phase.advance(lfo_freq, sr);
            let am = 1.0 - am_depth * (0.5 + 0.5 * lfo);

            let mut sum = 0.0f32;
            for voice in self.pool.voices_mut() {
                if !voice.is_active() {
                    continue;
                }
                sum += Self::tick_voice(voice, &params, algorithm, fb_gain, sr) * voice.velocity;
            }
            let sample = sum * am;

            if channels == 2 {
                frame[0] += if left_on { sample } else { 0.0 };
                frame[1] += if right_on { sample } else { 0.0 };
            } else {
                frame[0] += sample;
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
            "algorithm" => self.algorithm = value as u8,
            "feedback" => self.feedback = value as u8,
            "lfo_rate" => self.lfo_rate = value as usize,
            "lfo_enable" => self.lfo_enable = value != 0.0,
            "am_sensitivity" => self.am_sensitivity = value as u8,
            "pan" => self.pan_mask = value as u8,
            "gain" => self.gain = value,
            name => {
                // Per-operator parameters: "op<N>_<field>".
                let Some(rest) = name.strip_prefix("op") else {
                    return;
                };
                let Some((index, field)) = rest.split_once('_') else {
                    return;
                };
                let Ok(index) = index.parse::<usize>() else {
                    return;
                };
                if !(1..=4).contains(&index) {
                    return;
                }
                let op = &mut self.operators[index - 1];
                match field {
                    "multiple" => op.multiple = value as f64,
                    "level" => op.level = value,
                    "attack" => op.envelope.attack_rate = value as u8,
                    "decay1" => op.envelope.decay1_rate = value as u8,
                    "decay2" => op.envelope.decay2_rate = value as u8,
                    "release" => op.envelope.release_rate = value as u8,
                    "sustain" => op.envelope.sustain_level = value,
                    _ => {}
                }
            }
        }
    }
}

/// Six-channel four-operator FM generator.
pub struct FmSynth {
    core: Mutex<Core>,
}

impl FmSynth {
    pub fn new(context: AudioContext) -> Self {
        Self {
            core: Mutex::new(Core {
                context,
                pool: VoicePool::new(CHANNELS),
                algorithm: 4,
                feedback: 3,
                operators: [
                    OperatorParams::default(),
                    OperatorParams {
                        level: 0.8,
                        ..Default::default()
                    },
                    OperatorParams {
                        multiple: 2.0,
                        level: 0.5,
                        ..Default::default()
                    },
                    OperatorParams {
                        level: 0.9,
                        envelope: OpnEnvelopeParams {
                            sustain_level: 0.7,
                            ..Default::default()
                        },
                        ..Default::default()
                    },
                ],
                lfo_enable: false,
                lfo_rate: 3,
                lfo_phase: Phase::new(),
                am_sensitivity: 0,
                pan_mask: 0b11,
                gain: 0.8,
            }),
        }
    }

    pub fn active_voices(&self) -> usize {
        self.core.lock().pool.active_count()
    }
}

impl SoundGenerator for FmSynth {
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
    fn test_six_channel_cap() {
        let synth = FmSynth::new(AudioContext::new(48000.0, 2));
        for note in 60..68 {
            synth.note_on(note, 100);
        }
        assert_eq!(synth.active_voices(), CHANNELS);
    }

    #[test]
    fn test_all_algorithms_render() {
        for algorithm in 0..8 {
            let synth = FmSynth::new(AudioContext::new(48000.0, 2));
            synth.set_parameter("algorithm", algorithm as f32);
            synth.note_on(60, 100);
            let mut buf = vec![0.0f32; 2048];
            synth.render(&mut buf, 0, 2048);
            let energy: f32 = buf.iter().map(|s| s * s).sum();
            assert!(energy > 0.0, "algorithm {algorithm} rendered silence");
        }
    }

    #[test]
    fn test_pan_mask_mutes_side() {
        let synth = FmSynth::new(AudioContext::new(48000.0, 2));
        synth.set_parameter("pan", 0b10 as f32); // left only
        synth.note_on(60, 100);
        let mut buf = vec![0.0f32; 2048];
        synth.render(&mut buf, 0, 2048);
        let right: f32 = buf.iter().skip(1).step_by(2).map(|s| s * s).sum();
        let left: f32 = buf.iter().step_by(2).map(|s| s * s).sum();
        assert!(left > 0.0);
        assert_eq!(right, 0.0);
    }

    #[test]
    fn test_carrier_table_matches_algorithms() {
        // Algorithm 7: everything is a carrier.
        for op in 0..4 {
            assert!(is_carrier(7, op));
        }
        // Algorithm 0: only the last operator reaches the output.
        assert!(is_carrier(0, 3));
        assert!(!is_carrier(0, 0));
    }
}
