//! Amplitude and modulation envelopes.

/// Linear level below which a voice counts as silent.
pub const SILENCE_THRESHOLD: f32 = 1e-4;

/// ADSR parameters, times in seconds, sustain in [0, 1].
#[derive(Debug, Clone, Copy)]
pub struct AdsrParams {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Default for AdsrParams {
    fn default() -> Self {
        Self {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.7,
            release: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum AdsrStage {
    #[default]
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// ADSR envelope: linear attack, exponential decay and release.
///
/// `release()` may be called from any stage and begins from the current
/// level; transitions never jump. The envelope reports idle once the
/// release tail drops below [`SILENCE_THRESHOLD`].
#[derive(Debug, Clone, Copy)]
pub struct AdsrEnvelope {
    stage: AdsrStage,
    value: f32,
    sample_rate: f32,
}

impl AdsrEnvelope {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            stage: AdsrStage::Idle,
            value: 0.0,
            sample_rate: sample_rate as f32,
        }
    }

    /// Start (or re-start) the attack from the current level.
    pub fn trigger(&mut self) {
        self.stage = AdsrStage::Attack;
    }

    /// Enter the release phase from whatever stage is current.
    pub fn release(&mut self) {
        if self.stage != AdsrStage::Idle {
            self.stage = AdsrStage::Release;
        }
    }

    /// Stop immediately.
    pub fn reset(&mut self) {
        self.stage = AdsrStage::Idle;
        self.value = 0.0;
    }

    pub fn is_idle(&self) -> bool {
        self.stage == AdsrStage::Idle
    }

    pub fn is_releasing(&self) -> bool {
        self.stage == AdsrStage::Release
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// Advance one sample and return the new level.
    pub fn next(&mut self, params: &AdsrParams) -> f32 {
        match self.stage {
            AdsrStage::Idle => {
                self.value = 0.0;
            }
            AdsrStage::Attack => {
                let step = 1.0 / (params.attack.max(1e-4) * self.sample_rate);
                self.value += step;
                if self.value >= 1.0 {
                    self.value = 1.0;
                    self.stage = AdsrStage::Decay;
                }
            }
            AdsrStage::Decay => {
                let coeff = stage_coeff(params.decay, self.sample_rate);
                self.value += coeff * (params.sustain - self.value);
                if (self.value - params.sustain).abs() < 1e-4 {
                    self.value = params.sustain;
                    self.stage = AdsrStage::Sustain;
                }
            }
            AdsrStage::Sustain => {
                self.value = params.sustain;
                if self.value < SILENCE_THRESHOLD {
                    self.stage = AdsrStage::Release;
                }
            }
            AdsrStage::Release => {
                let coeff = stage_coeff(params.release, self.sample_rate);
                self.value += coeff * (0.0 - self.value);
                if self.value < SILENCE_THRESHOLD {
                    self.value = 0.0;
                    self.stage = AdsrStage::Idle;
                }
            }
        }
        self.value
    }
}

/// One-pole coefficient reaching ~63% of the target in `time` seconds.
#[inline]
fn stage_coeff(time: f32, sample_rate: f32) -> f32 {
    1.0 - (-1.0 / (time.max(1e-4) * sample_rate)).exp()
}

/// One stage of a multi-stage envelope: rate and target level, both 0-99.
#[derive(Debug, Clone, Copy, Default)]
pub struct StagePoint {
    pub rate: f32,
    pub level: f32,
}

impl StagePoint {
    pub const fn new(rate: f32, level: f32) -> Self {
        Self { rate, level }
    }

    /// Stage duration in seconds: rate 99 is near-instant, rate 0 is 2 s.
    fn duration(&self) -> f32 {
        (100.0 - self.rate.clamp(0.0, 99.0)) / 99.0 * 2.0 + 0.01
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum StageState {
    #[default]
    Idle,
    Running,
    Sustaining,
    Released,
}

/// Eight-stage rate/level envelope with a sustain point.
///
/// Gate-on walks stages `0..=sustain_point` then holds; gate-off resumes
/// at `sustain_point + 1` through `end_point`. Stage motion is linear in
/// time from the previous level to the stage's target level.
#[derive(Debug, Clone, Copy)]
pub struct StageEnvelope {
    stages: [StagePoint; 8],
    sustain_point: usize,
    end_point: usize,
    state: StageState,
    current: usize,
    samples_in_stage: f32,
    start_level: f32,
    value: f32,
    sample_rate: f32,
}

impl StageEnvelope {
    pub fn new(
        sample_rate: f64,
        stages: [StagePoint; 8],
        sustain_point: usize,
        end_point: usize,
    ) -> Self {
        Self {
            stages,
            sustain_point: sustain_point.min(7),
            end_point: end_point.clamp(sustain_point.min(7), 7),
            state: StageState::Idle,
            current: 0,
            samples_in_stage: 0.0,
            start_level: 0.0,
            value: 0.0,
            sample_rate: sample_rate as f32,
        }
    }

    pub fn trigger(&mut self) {
        self.state = StageState::Running;
        self.current = 0;
        self.samples_in_stage = 0.0;
        self.start_level = self.value;
    }

    pub fn release(&mut self) {
        if self.state == StageState::Idle {
            return;
        }
        if self.sustain_point >= self.end_point {
            self.state = StageState::Idle;
            self.value = 0.0;
            return;
        }
        self.state = StageState::Released;
        self.current = self.sustain_point + 1;
        self.samples_in_stage = 0.0;
        self.start_level = self.value;
    }

    pub fn is_idle(&self) -> bool {
        self.state == StageState::Idle
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// Advance one sample; output normalized to [0, 1].
    pub fn next(&mut self) -> f32 {
        match self.state {
            StageState::Idle => {
                self.value = 0.0;
            }
            StageState::Sustaining => {}
            StageState::Running | StageState::Released => {
                let stage = self.stages[self.current];
                let total = stage.duration() * self.sample_rate;
                self.samples_in_stage += 1.0;
                let t = (self.samples_in_stage / total).min(1.0);
                let target = stage.level / 99.0;
                self.value = self.start_level + t * (target - self.start_level);

                if t >= 1.0 {
                    self.start_level = target;
                    self.samples_in_stage = 0.0;
                    if self.state == StageState::Running {
                        if self.current >= self.sustain_point {
                            self.state = StageState::Sustaining;
                        } else {
                            self.current += 1;
                        }
                    } else if self.current >= self.end_point {
                        self.state = StageState::Idle;
                        self.value = 0.0;
                    } else {
                        self.current += 1;
                    }
                }
            }
        }
        self.value
    }
}

/// Per-operator envelope rates for the OPN-style FM generator, 0-31.
#[derive(Debug, Clone, Copy)]
pub struct OpnEnvelopeParams {
    pub attack_rate: u8,
    pub decay1_rate: u8,
    pub decay2_rate: u8,
    pub release_rate: u8,
    /// Level where decay1 hands over to decay2, in [0, 1].
    pub sustain_level: f32,
}

impl Default for OpnEnvelopeParams {
    fn default() -> Self {
        Self {
            attack_rate: 31,
            decay1_rate: 12,
            decay2_rate: 4,
            release_rate: 15,
            sustain_level: 0.5,
        }
    }
}

/// Map a 0-31 rate onto a per-second slope: `2^((r-15)/4) * 10`.
#[inline]
fn opn_rate(rate: u8) -> f32 {
    2.0f32.powf((rate.min(31) as f32 - 15.0) / 4.0) * 10.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum OpnStage {
    #[default]
    Idle,
    Attack,
    Decay1,
    Decay2,
    Release,
}

/// Four-segment hardware-style envelope: attack to 1, decay1 to the
/// sustain level, decay2 slowly to 0, release quickly to 0.
#[derive(Debug, Clone, Copy)]
pub struct OpnEnvelope {
    stage: OpnStage,
    level: f32,
    sample_rate: f32,
}

impl OpnEnvelope {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            stage: OpnStage::Idle,
            level: 0.0,
            sample_rate: sample_rate as f32,
        }
    }

    pub fn trigger(&mut self) {
        self.stage = OpnStage::Attack;
    }

    pub fn release(&mut self) {
        if self.stage != OpnStage::Idle {
            self.stage = OpnStage::Release;
        }
    }

    pub fn reset(&mut self) {
        self.stage = OpnStage::Idle;
        self.level = 0.0;
    }

    pub fn is_idle(&self) -> bool {
        self.stage == OpnStage::Idle
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn next(&mut self, params: &OpnEnvelopeParams) -> f32 {
        let dt = 1.0 / self.sample_rate;
        match self.stage {
            OpnStage::Idle => self.level = 0.0,
            OpnStage::Attack => {
                self.level += opn_rate(params.attack_rate) * dt;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = OpnStage::Decay1;
                }
            }
            OpnStage::Decay1 => {
                self.level -= opn_rate(params.decay1_rate) * dt;
                if self.level <= params.sustain_level {
                    self.level = params.sustain_level;
                    self.stage = OpnStage::Decay2;
                }
            }
            OpnStage::Decay2 => {
                self.level -= opn_rate(params.decay2_rate) * dt;
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.stage = OpnStage::Idle;
                }
            }
            OpnStage::Release => {
                self.level -= opn_rate(params.release_rate) * dt;
                if self.level <= SILENCE_THRESHOLD {
                    self.level = 0.0;
                    self.stage = OpnStage::Idle;
                }
            }
        }
        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adsr_reaches_sustain() {
        let params = AdsrParams {
            attack: 0.001,
            decay: 0.01,
            sustain: 0.5,
            release: 0.05,
        };
        let mut env = AdsrEnvelope::new(48000.0);
        env.trigger();
        for _ in 0..48000 / 10 {
            env.next(&params);
        }
        assert!((env.value() - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_adsr_release_ends_within_time() {
        let params = AdsrParams {
            release: 0.1,
            ..Default::default()
        };
        let mut env = AdsrEnvelope::new(48000.0);
        env.trigger();
        for _ in 0..4800 {
            env.next(&params);
        }
        env.release();
        // Exponential release to the 1e-4 floor: well under release * 12.
        let mut samples = 0usize;
        while !env.is_idle() && samples < 48000 {
            env.next(&params);
            samples += 1;
        }
        assert!(env.is_idle(), "release never went idle");
        assert_eq!(env.value(), 0.0);
    }

    #[test]
    fn test_adsr_release_from_attack_is_continuous() {
        let params = AdsrParams {
            attack: 0.1,
            ..Default::default()
        };
        let mut env = AdsrEnvelope::new(48000.0);
        env.trigger();
        for _ in 0..100 {
            env.next(&params);
        }
        let before = env.value();
        env.release();
        let after = env.next(&params);
        assert!((before - after).abs() < 0.01, "release jumped: {before} -> {after}");
    }

    #[test]
    fn test_stage_envelope_holds_at_sustain_point() {
        let stages = [
            StagePoint::new(95.0, 99.0),
            StagePoint::new(90.0, 70.0),
            StagePoint::new(80.0, 0.0),
            StagePoint::default(),
            StagePoint::default(),
            StagePoint::default(),
            StagePoint::default(),
            StagePoint::default(),
        ];
        let mut env = StageEnvelope::new(48000.0, stages, 1, 2);
        env.trigger();
        for _ in 0..48000 {
            env.next();
        }
        // Held at stage 1's level (70/99) until release.
        assert!((env.value() - 70.0 / 99.0).abs() < 0.01);

        env.release();
        for _ in 0..48000 {
            env.next();
        }
        assert!(env.is_idle());
    }

    #[test]
    fn test_opn_envelope_shape() {
        let params = OpnEnvelopeParams::default();
        let mut env = OpnEnvelope::new(48000.0);
        env.trigger();

        let mut peak = 0.0f32;
        for _ in 0..48000 {
            peak = peak.max(env.next(&params));
        }
        assert!((peak - 1.0).abs() < 1e-3);

        env.release();
        for _ in 0..48000 {
            env.next(&params);
        }
        assert!(env.is_idle());
    }
}
