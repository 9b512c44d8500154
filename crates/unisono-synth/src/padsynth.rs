//! PadSynth wavetable generator (Paul Nasca's algorithm).
//!
//! Each harmonic of a base spectrum is spread across a Gaussian band
//! whose width grows with harmonic number, every bin gets a random phase
//! from a seeded generator, and one large inverse FFT turns the spectrum
//! into a lush, loopable wavetable. The table is built on the control
//! thread (preset load / parameter change); playback is just interpolated
//! table reads, shared read-only across voices.

use crate::render::clear_region;
use parking_lot::Mutex;
use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::TAU;
use std::sync::Arc;
use unisono_core::dsp::{equal_power_pan, lerp_table, soft_clip, AdsrEnvelope, AdsrParams, Rng};
use unisono_core::generator::find_param;
use unisono_core::{note_to_hz, AudioContext, ParamKind, ParamSpec, ParamUnit, PoolVoice, SoundGenerator, VoicePool};

/// Wavetable length. 2^18 gives several seconds of non-repeating texture
/// at typical rates.
pub const TABLE_SIZE: usize = 1 << 18;

/// Base frequency the table is rendered at; playback scales from here.
const TABLE_FUNDAMENTAL: f64 = 65.41; // C2

/// Harmonics below this amplitude are not spread into the spectrum.
const HARMONIC_EPSILON: f32 = 1e-5;

const MAX_UNISON: usize = 7;

const PARAMS: &[ParamSpec] = &[
    ParamSpec::new("profile", 0.0, 0.0, 3.0).with_kind(ParamKind::Choice),
    ParamSpec::new("bandwidth", 50.0, 1.0, 200.0).with_unit(ParamUnit::Cents),
    ParamSpec::new("bandwidth_scale", 1.0, 0.5, 2.0),
    ParamSpec::new("seed", 1.0, 0.0, 1_000_000.0).with_kind(ParamKind::Int),
    ParamSpec::new("unison", 3.0, 1.0, 7.0).with_kind(ParamKind::Int),
    ParamSpec::new("unison_detune", 12.0, 0.0, 50.0).with_unit(ParamUnit::Cents),
    ParamSpec::new("attack", 0.05, 0.0, 10.0).with_unit(ParamUnit::Seconds),
    ParamSpec::new("decay", 0.2, 0.0, 10.0).with_unit(ParamUnit::Seconds),
    ParamSpec::new("sustain", 0.8, 0.0, 1.0),
    ParamSpec::new("release", 0.5, 0.0, 10.0).with_unit(ParamUnit::Seconds),
    ParamSpec::new("gain", 0.8, 0.0, 1.0),
];

/// Shape of the harmonic amplitude series fed into the spread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HarmonicProfile {
    #[default]
    Saw,
    Square,
    Organ,
    Choir,
}

impl HarmonicProfile {
    pub fn from_index(index: usize) -> Self {
        match index {
            1 => HarmonicProfile::Square,
            2 => HarmonicProfile::Organ,
            3 => HarmonicProfile::Choir,
            _ => HarmonicProfile::Saw,
        }
    }

    /// Amplitude of harmonic `h` (1-based).
    fn amplitude(&self, h: usize) -> f32 {
        let hf = h as f32;
        match self {
            HarmonicProfile::Saw => 1.0 / hf,
            HarmonicProfile::Square => {
                if h % 2 == 1 {
                    1.0 / hf
                } else {
                    0.0
                }
            }
            HarmonicProfile::Organ => match h {
                1 | 2 | 3 | 4 | 6 | 8 => 0.8 / hf.sqrt(),
                _ => 0.0,
            },
            // Bell curves around the first and third harmonics.
            HarmonicProfile::Choir => {
                let d1 = hf - 1.0;
                let d3 = (hf - 3.0) / 2.0;
                (-d1 * d1).exp() + 0.5 * (-d3 * d3).exp()
            }
        }
    }
}

/// Build a PadSynth wavetable. Deterministic: the same
/// `(seed, harmonics, bandwidth, bandwidth_scale)` yields a bit-identical
/// table.
pub fn build_wavetable(
    sample_rate: f64,
    harmonics: &[f32],
    bandwidth_cents: f32,
    bandwidth_scale: f32,
    seed: u64,
) -> Vec<f32> {
    let n = TABLE_SIZE;
    let half = n / 2;
    let f0 = TABLE_FUNDAMENTAL;

    // Spread each harmonic over a Gaussian band of the magnitude spectrum.
    let mut magnitude = vec![0.0f64; half + 1];
    for (i, &amp) in harmonics.iter().enumerate() {
        if amp <= HARMONIC_EPSILON {
            continue;
        }
        let h = (i + 1) as f64;
        let center_hz = f0 * h;
        if center_hz >= sample_rate * 0.5 {
            break;
        }
        let bw_hz =
            center_hz * (2.0f64.powf(bandwidth_cents as f64 * h.powf(bandwidth_scale as f64) / 1200.0) - 1.0);
        let center_bin = center_hz * n as f64 / sample_rate;
        let bw_bins = (bw_hz * n as f64 / sample_rate).max(1.0);

        let lo = ((center_bin - 3.0 * bw_bins).floor() as i64).max(1);
        let hi = ((center_bin + 3.0 * bw_bins).ceil() as i64).min(half as i64 - 1);
        for bin in lo..=hi {
            let d = (bin as f64 - center_bin) / bw_bins;
            magnitude[bin as usize] += amp as f64 * (-d * d / 2.0).exp();
        }
    }

    // Normalise the spectrum so the loudest band sits at unity.
    let peak = magnitude.iter().cloned().fold(0.0f64, f64::max);
    if peak > 0.0 {
        for m in magnitude.iter_mut() {
            *m /= peak;
        }
    }

    // Random phase per bin, then reflect to the negative-frequency half.
    let mut rng = Rng::from_seed(seed);
    let mut spectrum = vec![Complex::new(0.0f32, 0.0f32); n];
    for bin in 1..half {
        let theta = rng.next_f64() * TAU;
        let mag = magnitude[bin];
        let value = Complex::new((mag * theta.cos()) as f32, (mag * theta.sin()) as f32);
        spectrum[bin] = value;
        spectrum[n - bin] = value.conj();
    }

    FftPlanner::new().plan_fft_inverse(n).process(&mut spectrum);

    // Normalise the time-domain table to 0.95 peak.
    let mut table: Vec<f32> = spectrum.iter().map(|c| c.re).collect();
    let peak = table.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
    if peak > 0.0 {
        let scale = 0.95 / peak;
        for s in table.iter_mut() {
            *s *= scale;
        }
    }
    table
}

struct PadVoice {
    note: u8,
    seq: u64,
    velocity: f32,
    positions: [f64; MAX_UNISON],
    increments: [f64; MAX_UNISON],
    env: AdsrEnvelope,
}

impl PadVoice {
    fn new(sample_rate: f64) -> Self {
        Self {
            note: 0,
            seq: 0,
            velocity: 0.0,
            positions: [0.0; MAX_UNISON],
            increments: [0.0; MAX_UNISON],
            env: AdsrEnvelope::new(sample_rate),
        }
    }
}

impl PoolVoice for PadVoice {
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

struct Core {
    context: AudioContext,
    pool: VoicePool<PadVoice>,
    table: Arc<Vec<f32>>,
    table_dirty: bool,
    profile: HarmonicProfile,
    harmonic_count: usize,
    bandwidth_cents: f32,
    bandwidth_scale: f32,
    seed: u64,
    unison: usize,
    unison_detune_cents: f32,
    adsr: AdsrParams,
    gain: f32,
    voice_rng: Rng,
}

impl Core {
    fn rebuild_table(&mut self) {
        let harmonics: Vec<f32> = (1..=self.harmonic_count)
            .map(|h| self.profile.amplitude(h))
            .collect();
        log::debug!(
            "padsynth: rebuilding table (profile {:?}, bw {} cents, seed {})",
            self.profile,
            self.bandwidth_cents,
            self.seed
        );
        self.table = Arc::new(build_wavetable(
            self.context.sample_rate,
            &harmonics,
            self.bandwidth_cents,
            self.bandwidth_scale,
            self.seed,
        ));
        self.table_dirty = false;
    }

    fn note_on(&mut self, note: u8, velocity: u8) {
        if self.table_dirty {
            self.rebuild_table();
        }
        let sample_rate = self.context.sample_rate;
        let (voice, seq) = self.pool.allocate(note, || PadVoice::new(sample_rate));
        voice.note = note;
        voice.seq = seq;
        voice.velocity = velocity as f32 / 127.0;

        let base = note_to_hz(note);
        let spread = self.unison_detune_cents as f64;
        for p in 0..self.unison {
            // Equal-spread detune across [-spread, +spread] cents.
            let frac = if self.unison > 1 {
                p as f64 / (self.unison - 1) as f64 * 2.0 - 1.0
            } else {
                0.0
            };
            let freq = base * 2.0f64.powf(frac * spread / 1200.0);
            voice.increments[p] = freq / TABLE_FUNDAMENTAL;
            // Scatter start positions so unison partners decorrelate.
            voice.positions[p] = self.voice_rng.next_f64() * TABLE_SIZE as f64;
        }
        voice.env.trigger();
    }

    fn render(&mut self, region: &mut [f32]) {
        let channels = self.context.channels;
        let table = Arc::clone(&self.table);
        let table_len = table.len() as f64;
        let unison = self.unison;

        for voice in self.pool.voices_mut() {
            if !voice.is_active() {
                continue;
            }
            for frame in region.chunks_exact_mut(channels) {
                let mut left = 0.0f32;
                let mut right = 0.0f32;
                for p in 0..unison {
                    let sample = lerp_table(&table, voice.positions[p]);
                    voice.positions[p] += voice.increments[p];
                    if voice.positions[p] >= table_len {
                        voice.positions[p] -= table_len;
                    }
                    // Equal-power placement across the unison fan.
                    let pan = if unison > 1 {
                        p as f32 / (unison - 1) as f32 * 2.0 - 1.0
                    } else {
                        0.0
                    };
                    let (l, r) = equal_power_pan(pan);
                    left += sample * l;
                    right += sample * r;
                }
                let env = voice.env.next(&self.adsr) * voice.velocity / unison as f32;
                if channels == 2 {
                    frame[0] += left * env;
                    frame[1] += right * env;
                } else {
                    frame[0] += (left + right) * 0.5 * env;
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
            "profile" => {
                self.profile = HarmonicProfile::from_index(value as usize);
                self.table_dirty = true;
            }
            "bandwidth" => {
                self.bandwidth_cents = value;
                self.table_dirty = true;
            }
            "bandwidth_scale" => {
                self.bandwidth_scale = value;
                self.table_dirty = true;
            }
            "seed" => {
                self.seed = value as u64;
                self.table_dirty = true;
            }
            "unison" => self.unison = (value as usize).clamp(1, MAX_UNISON),
            "unison_detune" => self.unison_detune_cents = value,
            "attack" => self.adsr.attack = value,
            "decay" => self.adsr.decay = value,
            "sustain" => self.adsr.sustain = value,
            "release" => self.adsr.release = value,
            "gain" => self.gain = value,
            _ => {}
        }
    }
}

/// PadSynth generator: shared wavetable, per-voice unison playback.
pub struct PadSynth {
    core: Mutex<Core>,
}

impl PadSynth {
    pub fn new(context: AudioContext, max_voices: usize) -> Self {
        let mut core = Core {
            context,
            pool: VoicePool::new(max_voices),
            table: Arc::new(Vec::new()),
            table_dirty: true,
            profile: HarmonicProfile::Saw,
            harmonic_count: 64,
            bandwidth_cents: 50.0,
            bandwidth_scale: 1.0,
            seed: 1,
            unison: 3,
            unison_detune_cents: 12.0,
            adsr: AdsrParams {
                attack: 0.05,
                decay: 0.2,
                sustain: 0.8,
                release: 0.5,
            },
            gain: 0.8,
            voice_rng: Rng::from_seed(0x9a4d),
        };
        core.rebuild_table();
        Self {
            core: Mutex::new(core),
        }
    }

    /// Rebuild the wavetable now (otherwise a dirty table is rebuilt on
    /// the next `note_on`, still on the control thread).
    pub fn rebuild(&self) {
        self.core.lock().rebuild_table();
    }

    /// Snapshot of the current wavetable (for inspection and tests).
    pub fn wavetable(&self) -> Arc<Vec<f32>> {
        Arc::clone(&self.core.lock().table)
    }

    pub fn active_voices(&self) -> usize {
        self.core.lock().pool.active_count()
    }
}

impl SoundGenerator for PadSynth {
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
    fn test_wavetable_deterministic() {
        let harmonics: Vec<f32> = (1..=32).map(|h| 1.0 / h as f32).collect();
        let a = build_wavetable(48000.0, &harmonics, 50.0, 1.0, 42);
        let b = build_wavetable(48000.0, &harmonics, 50.0, 1.0, 42);
        assert_eq!(a.len(), TABLE_SIZE);
        // Bit-identical, not merely close.
        assert!(a
            .iter()
            .zip(b.iter())
            .all(|(x, y)| x.to_bits() == y.to_bits()));
    }

    #[test]
    fn test_wavetable_seed_changes_output() {
        let harmonics: Vec<f32> = (1..=16).map(|h| 1.0 / h as f32).collect();
        let a = build_wavetable(48000.0, &harmonics, 50.0, 1.0, 1);
        let b = build_wavetable(48000.0, &harmonics, 50.0, 1.0, 2);
        assert!(a.iter().zip(b.iter()).any(|(x, y)| x != y));
    }

    #[test]
    fn test_wavetable_peak_normalised() {
        let harmonics: Vec<f32> = (1..=8).map(|h| 1.0 / h as f32).collect();
        let table = build_wavetable(48000.0, &harmonics, 30.0, 1.0, 7);
        let peak = table.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
        assert!((peak - 0.95).abs() < 1e-3, "peak {peak}");
    }

    #[test]
    fn test_note_renders_audio() {
        let synth = PadSynth::new(AudioContext::new(48000.0, 2), 4);
        synth.note_on(60, 100);
        let mut buf = vec![0.0f32; 8192];
        synth.render(&mut buf, 0, 8192);
        let energy: f32 = buf.iter().map(|s| s * s).sum();
        assert!(energy > 0.0);
    }

    #[test]
    fn test_silence_when_idle() {
        let synth = PadSynth::new(AudioContext::new(48000.0, 2), 4);
        let mut buf = vec![1.0f32; 256];
        synth.render(&mut buf, 0, 256);
        assert!(buf.iter().all(|&s| s == 0.0));
    }
}
