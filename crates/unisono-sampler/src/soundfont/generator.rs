//! SF2 generator ids and the effective per-voice parameter set.

/// The generator opcodes this sampler recognises. Values are the SF2
/// specification's generator enumerators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum GenId {
    Pan = 17,
    DelayVolEnv = 33,
    AttackVolEnv = 34,
    HoldVolEnv = 35,
    DecayVolEnv = 36,
    SustainVolEnv = 37,
    ReleaseVolEnv = 38,
    Instrument = 41,
    KeyRange = 43,
    VelRange = 44,
    InitialAttenuation = 48,
    CoarseTune = 51,
    FineTune = 52,
    SampleId = 53,
    SampleModes = 54,
    OverridingRootKey = 58,
}

impl GenId {
    pub fn from_raw(raw: u16) -> Option<Self> {
        Some(match raw {
            17 => GenId::Pan,
            33 => GenId::DelayVolEnv,
            34 => GenId::AttackVolEnv,
            35 => GenId::HoldVolEnv,
            36 => GenId::DecayVolEnv,
            37 => GenId::SustainVolEnv,
            38 => GenId::ReleaseVolEnv,
            41 => GenId::Instrument,
            43 => GenId::KeyRange,
            44 => GenId::VelRange,
            48 => GenId::InitialAttenuation,
            51 => GenId::CoarseTune,
            52 => GenId::FineTune,
            53 => GenId::SampleId,
            54 => GenId::SampleModes,
            58 => GenId::OverridingRootKey,
            _ => return None,
        })
    }
}

/// Sample playback loop behaviour (`SampleModes` values 0, 1 and 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    NoLoop,
    Continuous,
    /// Loop until the voice enters its release phase, then play through.
    DuringRelease,
}

impl LoopMode {
    pub fn from_raw(raw: i16) -> Self {
        match raw {
            1 => LoopMode::Continuous,
            3 => LoopMode::DuringRelease,
            _ => LoopMode::NoLoop,
        }
    }
}

/// `2^(tc/1200)` seconds with the SF2 floor of 1 ms.
#[inline]
pub fn timecents_to_seconds(timecents: i32) -> f64 {
    2.0f64.powf(timecents as f64 / 1200.0).max(0.001)
}

/// Effective generator values for one (preset zone, instrument zone)
/// pair: instrument-level values replace the defaults, preset-level
/// values are added on top.
#[derive(Debug, Clone, Copy)]
pub struct ZoneParams {
    pub root_key_override: i32,
    pub coarse_tune: i32,
    /// Cents.
    pub fine_tune: i32,
    /// Centibels of attenuation.
    pub attenuation_cb: i32,
    /// Tenths of a percent, -500 (left) to +500 (right).
    pub pan_tenths: i32,
    pub loop_mode: LoopMode,
    /// Volume envelope segment times in timecents.
    pub delay_tc: i32,
    pub attack_tc: i32,
    pub hold_tc: i32,
    pub decay_tc: i32,
    /// Sustain attenuation in centibels below peak.
    pub sustain_cb: i32,
    pub release_tc: i32,
}

impl Default for ZoneParams {
    fn default() -> Self {
        Self {
            root_key_override: -1,
            coarse_tune: 0,
            fine_tune: 0,
            attenuation_cb: 0,
            pan_tenths: 0,
            loop_mode: LoopMode::NoLoop,
            delay_tc: -12000,
            attack_tc: -12000,
            hold_tc: -12000,
            decay_tc: -12000,
            sustain_cb: 0,
            release_tc: -12000,
        }
    }
}

impl ZoneParams {
    /// Apply one generator record. `additive` is true for preset-level
    /// zones, whose deltas stack on the instrument-level values.
    pub fn apply(&mut self, gen: GenId, amount: i16, additive: bool) {
        let amount = amount as i32;
        let set = |slot: &mut i32| {
            if additive {
                *slot += amount;
            } else {
                *slot = amount;
            }
        };
        match gen {
            GenId::Pan => set(&mut self.pan_tenths),
            GenId::DelayVolEnv => set(&mut self.delay_tc),
            GenId::AttackVolEnv => set(&mut self.attack_tc),
            GenId::HoldVolEnv => set(&mut self.hold_tc),
            GenId::DecayVolEnv => set(&mut self.decay_tc),
            GenId::SustainVolEnv => set(&mut self.sustain_cb),
            GenId::ReleaseVolEnv => set(&mut self.release_tc),
            GenId::InitialAttenuation => set(&mut self.attenuation_cb),
            GenId::CoarseTune => set(&mut self.coarse_tune),
            GenId::FineTune => set(&mut self.fine_tune),
            GenId::OverridingRootKey => {
                // A root-key override is never additive.
                if !additive && amount >= 0 {
                    self.root_key_override = amount;
                }
            }
            GenId::SampleModes => {
                if !additive {
                    self.loop_mode = LoopMode::from_raw(amount as i16);
                }
            }
            // Ranges and links are structural, handled by the zone walk.
            GenId::KeyRange | GenId::VelRange | GenId::Instrument | GenId::SampleId => {}
        }
    }

    /// Linear gain from the accumulated attenuation (10 cB = 1 dB).
    pub fn attenuation_gain(&self) -> f32 {
        10.0f32.powf(-(self.attenuation_cb.clamp(0, 1440) as f32) / 200.0)
    }

    /// Linear sustain level of the volume envelope.
    pub fn sustain_gain(&self) -> f32 {
        10.0f32.powf(-(self.sustain_cb.clamp(0, 1440) as f32) / 200.0)
    }

    /// Pan position in [-1, 1].
    pub fn pan_position(&self) -> f32 {
        (self.pan_tenths.clamp(-500, 500) as f32) / 500.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_timecents() {
        assert_relative_eq!(timecents_to_seconds(0), 1.0);
        assert_relative_eq!(timecents_to_seconds(1200), 2.0);
        // Floor at 1 ms.
        assert_eq!(timecents_to_seconds(-32768), 0.001);
    }

    #[test]
    fn test_preset_deltas_are_additive() {
        let mut params = ZoneParams::default();
        params.apply(GenId::AttackVolEnv, -2400, false); // instrument: 0.25 s
        params.apply(GenId::AttackVolEnv, 1200, true); // preset: one octave up
        assert_eq!(params.attack_tc, -1200);
        assert_relative_eq!(timecents_to_seconds(params.attack_tc), 0.5);
    }

    #[test]
    fn test_attenuation_gain() {
        let mut params = ZoneParams::default();
        assert_relative_eq!(params.attenuation_gain(), 1.0);
        params.apply(GenId::InitialAttenuation, 200, false); // 20 dB
        assert_relative_eq!(params.attenuation_gain(), 0.1, epsilon = 1e-6);
    }

    #[test]
    fn test_loop_mode_raw() {
        assert_eq!(LoopMode::from_raw(0), LoopMode::NoLoop);
        assert_eq!(LoopMode::from_raw(1), LoopMode::Continuous);
        assert_eq!(LoopMode::from_raw(2), LoopMode::NoLoop);
        assert_eq!(LoopMode::from_raw(3), LoopMode::DuringRelease);
    }
}
