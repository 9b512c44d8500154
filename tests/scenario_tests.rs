//! End-to-end scenarios across the generator families.
//!
//! Each test drives a generator the way a host would - note events from
//! one side, `render` from the other - and checks the audible outcome
//! (spectra, zero crossings, decay envelopes) rather than internal
//! state.

#![cfg(all(feature = "synth", feature = "sampler", feature = "graph"))]

#[path = "helpers/mod.rs"]
mod helpers;

use helpers::*;
use std::sync::Arc;
use unisono::prelude::*;
use unisono::AudioContext;

fn ctx() -> AudioContext {
    AudioContext::new(48000.0, 2)
}

/// Three notes against a polyphony cap of two: the oldest is stolen and
/// the spectrum contains the two surviving fundamentals.
#[test]
fn test_steal_leaves_surviving_fundamentals() {
    let synth = SubtractiveSynth::new(ctx(), 2);
    synth.set_parameter("waveform", 0.0); // sine, for a clean spectrum
    synth.set_parameter("osc_mix", 0.0);
    synth.set_parameter("detune", 0.0);
    synth.set_parameter("attack", 0.001);
    synth.set_parameter("gain", 0.3);

    synth.note_on(60, 100); // C4 - will be stolen
    synth.note_on(64, 100); // E4
    synth.note_on(67, 100); // G4
    assert_eq!(synth.active_voices(), 2);

    let frames = 65536;
    let mut buf = vec![0.0f32; frames * 2];
    assert_eq!(synth.render(&mut buf, 0, frames * 2), frames * 2);
    let left = left_channel(&buf);
    assert!(rms(&left) > 0.0);

    let spectrum = magnitude_spectrum(&left);
    let e4 = band_peak(&spectrum, 48000.0, frames, 329.63, 4);
    let g4 = band_peak(&spectrum, 48000.0, frames, 392.0, 4);
    let c4 = band_peak(&spectrum, 48000.0, frames, 261.63, 4);
    assert!(e4 > c4 * 10.0, "E4 fundamental missing: {e4} vs C4 {c4}");
    assert!(g4 > c4 * 10.0, "G4 fundamental missing: {g4} vs C4 {c4}");
}

/// Open hi-hat triggered while the closed hat rings: the closed voice
/// is choked immediately.
#[test]
fn test_hat_choke_group() {
    let drums = DrumMachine::new(ctx(), 8);
    drums.note_on(42, 100); // closed hat
    let mut buf = vec![0.0f32; 1000];
    drums.render(&mut buf, 0, 1000); // 500 frames later...
    assert!(drums.is_sounding(42));

    drums.note_on(46, 100); // open hat
    assert!(!drums.is_sounding(42), "closed hat not choked");
    assert!(drums.is_sounding(46));
}

/// Regenerating the PadSynth wavetable with identical settings yields a
/// bit-identical table.
#[test]
fn test_padsynth_regeneration_deterministic() {
    let synth = PadSynth::new(ctx(), 4);
    synth.set_parameter("seed", 42.0);
    synth.set_parameter("profile", 0.0); // saw
    synth.set_parameter("bandwidth", 50.0);

    synth.rebuild();
    let first = synth.wavetable();
    synth.rebuild();
    let second = synth.wavetable();

    assert!(!first.is_empty());
    assert!(first
        .iter()
        .take(256)
        .zip(second.iter())
        .all(|(a, b)| a.to_bits() == b.to_bits()));
}

/// The default patch at A4: the zero-crossing count over a known span
/// matches the fundamental.
#[test]
fn test_default_patch_pitch_by_zero_crossings() {
    let graph = PatchGraph::default_patch(ctx());
    graph.note_on(69, 127); // A4 = 440 Hz

    let frames = 4096;
    let mut buf = vec![0.0f32; frames * 2];
    graph.render(&mut buf, 0, frames * 2);
    let left = left_channel(&buf);

    let expected = (440.0 * frames as f64 / 48000.0 * 2.0).round() as i64;
    let counted = zero_crossings(&left) as i64;
    assert!(
        (counted - expected).abs() <= 2,
        "expected ~{expected} crossings, counted {counted}"
    );
}

/// A looping SoundFont note is continuous across loop wraps: no dropouts
/// and no sample-to-sample jumps.
#[test]
fn test_soundfont_loop_is_seamless() {
    let font = SoundFont::parse(&minimal_sf2()).expect("fixture parses");
    let sampler = Sf2Sampler::new(ctx(), 8);
    sampler.set_font(Arc::new(font));

    assert_eq!(sampler.presets(), vec![(0, 0, "Test Preset".to_string())]);

    sampler.note_on(60, 100);
    // 2 s of audio: the 1000-frame source loops dozens of times.
    let mut buf = vec![0.0f32; 96000 * 2];
    sampler.render(&mut buf, 0, 96000 * 2);
    let left = left_channel(&buf);

    // Non-silent throughout (after the attack ramp settles).
    for (i, window) in left[4800..].chunks(4800).enumerate() {
        assert!(rms(window) > 1e-3, "dropout in window {i}");
    }
    // No discontinuity: adjacent samples of a ~440 Hz sine stay close.
    let max_step = left[100..]
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .fold(0.0f32, f32::max);
    assert!(max_step < 0.05, "discontinuity of {max_step} at a loop wrap");
}

/// A plucked string decays monotonically and darkens as it rings.
#[test]
fn test_plucked_string_decays_and_darkens() {
    let synth = KarplusStrong::new(ctx(), 4);
    synth.note_on(64, 100);

    let window_frames = 12000; // 0.25 s
    let mut windows: Vec<Vec<f32>> = Vec::new();
    let mut buf = vec![0.0f32; window_frames * 2];
    for _ in 0..8 {
        synth.render(&mut buf, 0, window_frames * 2);
        windows.push(left_channel(&buf));
    }

    let levels: Vec<f32> = windows.iter().map(|w| rms(w)).collect();
    assert!(levels[0] > 0.0, "string never sounded");
    for pair in levels.windows(2) {
        assert!(
            pair[1] <= pair[0] * 1.05,
            "rms rose between windows: {pair:?}"
        );
    }

    // Spectral centroid falls as the loop lowpass eats the highs.
    let early = spectral_centroid(&windows[0], 48000.0);
    let late = spectral_centroid(&windows[6], 48000.0);
    assert!(
        late < early,
        "centroid did not drop: early {early:.0} Hz, late {late:.0} Hz"
    );
}
