//! Shared helpers for the integration suites: signal measurements,
//! spectral analysis, and an in-memory SF2 fixture.

#![allow(dead_code)]

use rustfft::{num_complex::Complex, FftPlanner};

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Deinterleave the left channel of a stereo buffer.
pub fn left_channel(interleaved: &[f32]) -> Vec<f32> {
    interleaved.chunks(2).map(|f| f[0]).collect()
}

/// Strict sign flips; runs of exact zeros are not double-counted.
pub fn zero_crossings(samples: &[f32]) -> usize {
    samples
        .windows(2)
        .filter(|w| (w[0] < 0.0 && w[1] >= 0.0) || (w[0] > 0.0 && w[1] <= 0.0))
        .count()
}

/// Hann-windowed magnitude spectrum (first half).
pub fn magnitude_spectrum(samples: &[f32]) -> Vec<f32> {
    let n = samples.len();
    let mut buffer: Vec<Complex<f32>> = samples
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let w = 0.5
                * (1.0
                    - (2.0 * std::f32::consts::PI * i as f32 / (n - 1) as f32).cos());
            Complex::new(s * w, 0.0)
        })
        .collect();
    FftPlanner::new().plan_fft_forward(n).process(&mut buffer);
    buffer[..n / 2].iter().map(|c| c.norm()).collect()
}

/// Largest magnitude within `radius` bins of `frequency`.
pub fn band_peak(spectrum: &[f32], sample_rate: f64, n: usize, frequency: f64, radius: usize) -> f32 {
    let center = (frequency * n as f64 / sample_rate).round() as usize;
    let lo = center.saturating_sub(radius);
    let hi = (center + radius).min(spectrum.len() - 1);
    spectrum[lo..=hi].iter().cloned().fold(0.0, f32::max)
}

/// Amplitude-weighted mean frequency.
pub fn spectral_centroid(samples: &[f32], sample_rate: f64) -> f64 {
    let n = samples.len();
    let spectrum = magnitude_spectrum(samples);
    let mut weighted = 0.0f64;
    let mut total = 0.0f64;
    for (bin, &mag) in spectrum.iter().enumerate() {
        let freq = bin as f64 * sample_rate / n as f64;
        weighted += freq * mag as f64;
        total += mag as f64;
    }
    if total > 0.0 {
        weighted / total
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------
// SF2 fixture: one preset, one instrument, one seamlessly looping sine.
// ---------------------------------------------------------------------

fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + body.len() + 1);
    out.extend_from_slice(id);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    if body.len() % 2 == 1 {
        out.push(0);
    }
    out
}

fn list(form: &[u8; 4], children: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + children.len());
    body.extend_from_slice(form);
    body.extend_from_slice(children);
    chunk(b"LIST", &body)
}

fn name20(name: &str) -> [u8; 20] {
    let mut out = [0u8; 20];
    out[..name.len().min(20)].copy_from_slice(&name.as_bytes()[..name.len().min(20)]);
    out
}

fn gen(oper: u16, amount: i16) -> [u8; 4] {
    let mut out = [0u8; 4];
    out[..2].copy_from_slice(&oper.to_le_bytes());
    out[2..].copy_from_slice(&amount.to_le_bytes());
    out
}

/// A minimal well-formed SF2: "Test Preset" (bank 0, program 0) playing
/// a 441 Hz sine whose 100..900 loop covers exactly eight periods.
pub fn minimal_sf2() -> Vec<u8> {
    let mut smpl = Vec::new();
    for i in 0..1000u32 {
        let phase = i as f64 * 441.0 / 44100.0;
        let value = (phase * std::f64::consts::TAU).sin();
        smpl.extend_from_slice(&((value * 24000.0) as i16).to_le_bytes());
    }

    let mut shdr = Vec::new();
    shdr.extend_from_slice(&name20("Test Sample"));
    for value in [0u32, 1000, 100, 900, 44100] {
        shdr.extend_from_slice(&value.to_le_bytes());
    }
    shdr.push(60);
    shdr.push(0);
    shdr.extend_from_slice(&0u16.to_le_bytes());
    shdr.extend_from_slice(&1u16.to_le_bytes());
    shdr.extend_from_slice(&name20("EOS"));
    shdr.extend_from_slice(&[0u8; 26]);

    let mut igen = Vec::new();
    igen.extend_from_slice(&gen(43, i16::from_le_bytes([0, 127]))); // KeyRange
    igen.extend_from_slice(&gen(44, i16::from_le_bytes([0, 127]))); // VelRange
    igen.extend_from_slice(&gen(54, 1)); // continuous loop
    igen.extend_from_slice(&gen(53, 0)); // SampleId
    igen.extend_from_slice(&gen(0, 0));

    let mut ibag = Vec::new();
    for value in [0u16, 0, 4, 0] {
        ibag.extend_from_slice(&value.to_le_bytes());
    }

    let mut inst = Vec::new();
    inst.extend_from_slice(&name20("Test Inst"));
    inst.extend_from_slice(&0u16.to_le_bytes());
    inst.extend_from_slice(&name20("EOI"));
    inst.extend_from_slice(&1u16.to_le_bytes());

    let mut pgen = Vec::new();
    pgen.extend_from_slice(&gen(41, 0)); // Instrument link
    pgen.extend_from_slice(&gen(0, 0));

    let mut pbag = Vec::new();
    for value in [0u16, 0, 1, 0] {
        pbag.extend_from_slice(&value.to_le_bytes());
    }

    let mut phdr = Vec::new();
    phdr.extend_from_slice(&name20("Test Preset"));
    for value in [0u16, 0, 0] {
        phdr.extend_from_slice(&value.to_le_bytes());
    }
    phdr.extend_from_slice(&[0u8; 12]);
    phdr.extend_from_slice(&name20("EOP"));
    for value in [0u16, 0, 1] {
        phdr.extend_from_slice(&value.to_le_bytes());
    }
    phdr.extend_from_slice(&[0u8; 12]);

    let mut pdta = Vec::new();
    pdta.extend_from_slice(&chunk(b"phdr", &phdr));
    pdta.extend_from_slice(&chunk(b"pbag", &pbag));
    pdta.extend_from_slice(&chunk(b"pgen", &pgen));
    pdta.extend_from_slice(&chunk(b"inst", &inst));
    pdta.extend_from_slice(&chunk(b"ibag", &ibag));
    pdta.extend_from_slice(&chunk(b"igen", &igen));
    pdta.extend_from_slice(&chunk(b"shdr", &shdr));

    let mut body = Vec::new();
    body.extend_from_slice(b"sfbk");
    body.extend_from_slice(&list(b"INFO", &[]));
    body.extend_from_slice(&list(b"sdta", &chunk(b"smpl", &smpl)));
    body.extend_from_slice(&list(b"pdta", &pdta));

    chunk(b"RIFF", &body)
}
