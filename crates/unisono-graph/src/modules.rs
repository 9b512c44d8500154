//! Built-in module set: the classic subtractive rack.

use crate::module::{Module, ModuleKind, ProcessEnv};
use crate::port::ModulePort;
use unisono_core::dsp::{AdsrEnvelope, AdsrParams, Biquad, Phase, Rng, Waveform};

/// C4, the 0 V reference of the pitch CV scale (log2 octaves around it).
const PITCH_CV_REFERENCE: f64 = 261.6256;

/// Note input: fans the graph's current note state out as pitch CV,
/// gate, and velocity CV. Driven by the graph via `set_param`.
pub struct NoteInModule {
    frequency: f32,
    gate: f32,
    velocity: f32,
}

impl NoteInModule {
    pub fn new() -> Self {
        Self {
            frequency: 0.0,
            gate: 0.0,
            velocity: 0.0,
        }
    }
}

impl Default for NoteInModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for NoteInModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::NoteIn
    }

    fn inputs(&self) -> &'static [ModulePort] {
        &[]
    }

    fn outputs(&self) -> &'static [ModulePort] {
        &const { [
            ModulePort::cv("pitch"),
            ModulePort::gate("gate"),
            ModulePort::cv("velocity"),
        ] }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "frequency" => self.frequency = value.max(0.0),
            "gate" => self.gate = if value != 0.0 { 1.0 } else { 0.0 },
            "velocity" => self.velocity = value.clamp(0.0, 1.0),
            _ => {}
        }
    }

    fn param(&self, name: &str) -> Option<f32> {
        match name {
            "frequency" => Some(self.frequency),
            "gate" => Some(self.gate),
            "velocity" => Some(self.velocity),
            _ => None,
        }
    }

    fn process(&mut self, _inputs: &[&[f32]], outputs: &mut [Vec<f32>], _env: &ProcessEnv) {
        let pitch = if self.frequency > 0.0 {
            (self.frequency as f64 / PITCH_CV_REFERENCE).log2() as f32
        } else {
            0.0
        };
        outputs[0].fill(pitch);
        outputs[1].fill(self.gate);
        outputs[2].fill(self.velocity);
    }
}

/// Voltage-controlled oscillator. The pitch input is in octaves around
/// the base frequency.
pub struct VcoModule {
    waveform: Waveform,
    base_frequency: f64,
    octave: f32,
    phase: Phase,
}

impl VcoModule {
    pub fn new() -> Self {
        Self {
            waveform: Waveform::Sine,
            base_frequency: PITCH_CV_REFERENCE,
            octave: 0.0,
            phase: Phase::new(),
        }
    }
}

impl Default for VcoModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for VcoModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Oscillator
    }

    fn inputs(&self) -> &'static [ModulePort] {
        &const { [ModulePort::cv("pitch")] }
    }

    fn outputs(&self) -> &'static [ModulePort] {
        &const { [ModulePort::audio("out")] }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "waveform" => self.waveform = Waveform::from_index(value.clamp(0.0, 3.0) as usize),
            "frequency" => self.base_frequency = value.clamp(0.1, 20000.0) as f64,
            "octave" => self.octave = value.clamp(-4.0, 4.0).round(),
            _ => {}
        }
    }

    fn param(&self, name: &str) -> Option<f32> {
        match name {
            "frequency" => Some(self.base_frequency as f32),
            "octave" => Some(self.octave),
            _ => None,
        }
    }

    fn process(&mut self, inputs: &[&[f32]], outputs: &mut [Vec<f32>], env: &ProcessEnv) {
        let sr = env.context.sample_rate;
        for i in 0..env.block_size {
            let cv = inputs[0][i] as f64 + self.octave as f64;
            let frequency = self.base_frequency * 2.0f64.powf(cv);
            outputs[0][i] = self.waveform.evaluate(self.phase.value());
            self.phase.advance(frequency.min(sr * 0.45), sr);
        }
    }
}

/// Voltage-controlled lowpass filter with a cutoff CV in octaves.
pub struct VcfModule {
    cutoff: f64,
    resonance: f64,
    filter: Biquad,
    /// CV value the current coefficients were computed for.
    last_cv: f32,
    coeffs_ready: bool,
}

impl VcfModule {
    pub fn new() -> Self {
        Self {
            cutoff: 2000.0,
            resonance: 0.707,
            filter: Biquad::identity(),
            last_cv: f32::NAN,
            coeffs_ready: false,
        }
    }
}

impl Default for VcfModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for VcfModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Filter
    }

    fn inputs(&self) -> &'static [ModulePort] {
        &const { [ModulePort::audio("in"), ModulePort::cv("cutoff")] }
    }

    fn outputs(&self) -> &'static [ModulePort] {
        &const { [ModulePort::audio("out")] }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "cutoff" => {
                self.cutoff = value.clamp(20.0, 20000.0) as f64;
                self.coeffs_ready = false;
            }
            "resonance" => {
                self.resonance = value.clamp(0.5, 10.0) as f64;
                self.coeffs_ready = false;
            }
            _ => {}
        }
    }

    fn param(&self, name: &str) -> Option<f32> {
        match name {
            "cutoff" => Some(self.cutoff as f32),
            "resonance" => Some(self.resonance as f32),
            _ => None,
        }
    }

    fn process(&mut self, inputs: &[&[f32]], outputs: &mut [Vec<f32>], env: &ProcessEnv) {
        // Coefficients track the CV at block rate.
        let cv = inputs[1][0];
        if !self.coeffs_ready || (cv - self.last_cv).abs() > 1e-3 {
            let sr = env.context.sample_rate;
            let cutoff = (self.cutoff * 2.0f64.powf(cv as f64)).clamp(20.0, sr * 0.45);
            self.filter
                .set_coefficients_from(&Biquad::lowpass(sr, cutoff, self.resonance));
            self.last_cv = cv;
            self.coeffs_ready = true;
        }
        for i in 0..env.block_size {
            outputs[0][i] = self.filter.process(inputs[0][i]);
        }
    }
}

/// Voltage-controlled amplifier: audio in times CV (clamped at zero).
pub struct VcaModule {
    gain: f32,
}

impl VcaModule {
    pub fn new() -> Self {
        Self { gain: 1.0 }
    }
}

impl Default for VcaModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for VcaModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Amplifier
    }

    fn inputs(&self) -> &'static [ModulePort] {
        &const { [ModulePort::audio("in"), ModulePort::cv("cv")] }
    }

    fn outputs(&self) -> &'static [ModulePort] {
        &const { [ModulePort::audio("out")] }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        if name == "gain" {
            self.gain = value.clamp(0.0, 2.0);
        }
    }

    fn param(&self, name: &str) -> Option<f32> {
        (name == "gain").then_some(self.gain)
    }

    fn process(&mut self, inputs: &[&[f32]], outputs: &mut [Vec<f32>], env: &ProcessEnv) {
        for i in 0..env.block_size {
            outputs[0][i] = inputs[0][i] * inputs[1][i].max(0.0) * self.gain;
        }
    }
}

/// Gate-driven ADSR envelope as a CV source.
pub struct AdsrModule {
    params: AdsrParams,
    env: Option<AdsrEnvelope>,
    gate_high: bool,
}

impl AdsrModule {
    pub fn new() -> Self {
        Self {
            params: AdsrParams {
                attack: 0.005,
                decay: 0.05,
                sustain: 1.0,
                release: 0.1,
            },
            env: None,
            gate_high: false,
        }
    }
}

impl Default for AdsrModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for AdsrModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Envelope
    }

    fn inputs(&self) -> &'static [ModulePort] {
        &const { [ModulePort::gate("gate")] }
    }

    fn outputs(&self) -> &'static [ModulePort] {
        &const { [ModulePort::cv("env")] }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        let value = value.clamp(0.0, 10.0);
        match name {
            "attack" => self.params.attack = value,
            "decay" => self.params.decay = value,
            "sustain" => self.params.sustain = value.min(1.0),
            "release" => self.params.release = value,
            _ => {}
        }
    }

    fn param(&self, name: &str) -> Option<f32> {
        match name {
            "attack" => Some(self.params.attack),
            "decay" => Some(self.params.decay),
            "sustain" => Some(self.params.sustain),
            "release" => Some(self.params.release),
            _ => None,
        }
    }

    fn process(&mut self, inputs: &[&[f32]], outputs: &mut [Vec<f32>], env: &ProcessEnv) {
        let envelope = self
            .env
            .get_or_insert_with(|| AdsrEnvelope::new(env.context.sample_rate));
        for i in 0..env.block_size {
            let gate = inputs[0][i] > 0.5;
            if gate && !self.gate_high {
                envelope.trigger();
            } else if !gate && self.gate_high {
                envelope.release();
            }
            self.gate_high = gate;
            outputs[0][i] = envelope.next(&self.params);
        }
    }
}

/// Low-frequency oscillator as a bipolar CV source.
pub struct LfoModule {
    rate: f64,
    depth: f32,
    waveform: Waveform,
    phase: Phase,
}

impl LfoModule {
    pub fn new() -> Self {
        Self {
            rate: 2.0,
            depth: 1.0,
            waveform: Waveform::Sine,
            phase: Phase::new(),
        }
    }
}

impl Default for LfoModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for LfoModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Lfo
    }

    fn inputs(&self) -> &'static [ModulePort] {
        &[]
    }

    fn outputs(&self) -> &'static [ModulePort] {
        &const { [ModulePort::cv("out")] }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "rate" => self.rate = value.clamp(0.01, 50.0) as f64,
            "depth" => self.depth = value.clamp(0.0, 1.0),
            "waveform" => self.waveform = Waveform::from_index(value.clamp(0.0, 3.0) as usize),
            _ => {}
        }
    }

    fn param(&self, name: &str) -> Option<f32> {
        match name {
            "rate" => Some(self.rate as f32),
            "depth" => Some(self.depth),
            _ => None,
        }
    }

    fn process(&mut self, _inputs: &[&[f32]], outputs: &mut [Vec<f32>], env: &ProcessEnv) {
        let sr = env.context.sample_rate;
        for i in 0..env.block_size {
            outputs[0][i] = self.waveform.evaluate(self.phase.value()) * self.depth;
            self.phase.advance(self.rate, sr);
        }
    }
}

/// Four-into-one mixer with per-channel levels.
pub struct MixerModule {
    levels: [f32; 4],
}

impl MixerModule {
    pub fn new() -> Self {
        Self { levels: [1.0; 4] }
    }
}

impl Default for MixerModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for MixerModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Mixer
    }

    fn inputs(&self) -> &'static [ModulePort] {
        &const { [
            ModulePort::audio("in1"),
            ModulePort::audio("in2"),
            ModulePort::audio("in3"),
            ModulePort::audio("in4"),
        ] }
    }

    fn outputs(&self) -> &'static [ModulePort] {
        &const { [ModulePort::audio("out")] }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        if let Some(index) = name.strip_prefix("level") {
            if let Ok(index) = index.parse::<usize>() {
                if (1..=4).contains(&index) {
                    self.levels[index - 1] = value.clamp(0.0, 2.0);
                }
            }
        }
    }

    fn param(&self, name: &str) -> Option<f32> {
        let index = name.strip_prefix("level")?.parse::<usize>().ok()?;
        (1..=4).contains(&index).then(|| self.levels[index - 1])
    }

    fn process(&mut self, inputs: &[&[f32]], outputs: &mut [Vec<f32>], env: &ProcessEnv) {
        for i in 0..env.block_size {
            let mut sum = 0.0;
            for (input, level) in inputs.iter().zip(self.levels) {
                sum += input[i] * level;
            }
            outputs[0][i] = sum;
        }
    }
}

/// White-noise source.
pub struct NoiseModule {
    rng: Rng,
    level: f32,
}

impl NoiseModule {
    pub fn new() -> Self {
        Self {
            rng: Rng::from_seed(0x6e6f),
            level: 1.0,
        }
    }
}

impl Default for NoiseModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for NoiseModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Noise
    }

    fn inputs(&self) -> &'static [ModulePort] {
        &[]
    }

    fn outputs(&self) -> &'static [ModulePort] {
        &const { [ModulePort::audio("out")] }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        if name == "level" {
            self.level = value.clamp(0.0, 1.0);
        }
    }

    fn param(&self, name: &str) -> Option<f32> {
        (name == "level").then_some(self.level)
    }

    fn process(&mut self, _inputs: &[&[f32]], outputs: &mut [Vec<f32>], _env: &ProcessEnv) {
        for out in outputs[0].iter_mut() {
            *out = self.rng.next_bipolar() * self.level;
        }
    }
}

/// Stereo sink. Holds no DSP of its own: the graph reads this module's
/// input connections when interleaving into the caller's buffer, which
/// is the one additive write in the engine.
pub struct OutputModule;

impl OutputModule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OutputModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for OutputModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Output
    }

    fn inputs(&self) -> &'static [ModulePort] {
        &const { [ModulePort::audio("left"), ModulePort::audio("right")] }
    }

    fn outputs(&self) -> &'static [ModulePort] {
        &[]
    }

    fn set_param(&mut self, _name: &str, _value: f32) {}

    fn param(&self, _name: &str) -> Option<f32> {
        None
    }

    fn process(&mut self, _inputs: &[&[f32]], _outputs: &mut [Vec<f32>], _env: &ProcessEnv) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use unisono_core::AudioContext;

    fn make_env(block: usize) -> ProcessEnv {
        ProcessEnv {
            context: AudioContext::new(48000.0, 2),
            block_size: block,
        }
    }

    #[test]
    fn test_vco_tracks_pitch_cv() {
        let mut vco = VcoModule::new();
        let env = make_env(48000);
        let mut outputs = vec![vec![0.0f32; 48000]];
        // +1 octave above the 261.63 Hz base: ~523 Hz.
        let cv = vec![1.0f32; 48000];
        vco.process(&[&cv], &mut outputs, &env);

        let crossings = outputs[0]
            .windows(2)
            .filter(|w| w[0] < 0.0 && w[1] >= 0.0)
            .count();
        assert!((crossings as i64 - 523).abs() <= 2, "crossings {crossings}");
    }

    #[test]
    fn test_vca_multiplies() {
        let mut vca = VcaModule::new();
        let env = make_env(4);
        let audio = vec![1.0f32, -1.0, 0.5, 0.25];
        let cv = vec![0.5f32; 4];
        let mut outputs = vec![vec![0.0f32; 4]];
        vca.process(&[&audio, &cv], &mut outputs, &env);
        assert_eq!(outputs[0], vec![0.5, -0.5, 0.25, 0.125]);
    }

    #[test]
    fn test_adsr_follows_gate() {
        let mut adsr = AdsrModule::new();
        let gate = vec![1.0f32; 4800];
        let mut outputs = vec![vec![0.0f32; 4800]];
        adsr.process(&[&gate], &mut outputs, &make_env(4800));
        // 100 ms into a 5 ms attack with full sustain: pinned at 1.
        assert!(outputs[0][4799] > 0.99);

        let gate = vec![0.0f32; 48000];
        let mut outputs = vec![vec![0.0f32; 48000]];
        adsr.process(&[&gate], &mut outputs, &make_env(48000));
        assert!(outputs[0][47999] < 1e-3);
    }

    #[test]
    fn test_mixer_levels() {
        let mut mixer = MixerModule::new();
        mixer.set_param("level2", 0.0);
        let env = make_env(2);
        let one = vec![1.0f32; 2];
        let mut outputs = vec![vec![0.0f32; 2]];
        mixer.process(&[&one, &one, &one, &one], &mut outputs, &env);
        assert_eq!(outputs[0], vec![3.0, 3.0]);
    }
}
