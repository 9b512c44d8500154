//! SF2 RIFF parser.
//!
//! Walks `RIFF ... sfbk ( LIST INFO ) ( LIST sdta ( smpl ) ) ( LIST pdta
//! ( phdr pbag pgen inst ibag igen shdr ) )`, converts the 16-bit sample
//! pool to floats, and rebuilds the preset -> zone and instrument -> zone
//! trees by slicing the flat bag/generator arrays with consecutive
//! header indices.

use super::generator::GenId;
use super::riff::{Chunk, Cursor};
use crate::{Error, Result};
use std::path::Path;
use std::sync::Arc;

/// Record sizes fixed by the SF2 specification.
const PHDR_SIZE: usize = 38;
const BAG_SIZE: usize = 4;
const GEN_SIZE: usize = 4;
const INST_SIZE: usize = 22;
const SHDR_SIZE: usize = 46;

/// One `shdr` record.
#[derive(Debug, Clone)]
pub struct SampleHeader {
    pub name: String,
    pub start: u32,
    pub end: u32,
    pub loop_start: u32,
    pub loop_end: u32,
    pub sample_rate: u32,
    pub original_pitch: u8,
    pub pitch_correction: i8,
    pub sample_link: u16,
    pub sample_type: u16,
}

/// A preset or instrument zone: ranges, raw generator list, and the link
/// this zone carries (instrument index at preset level, sample index at
/// instrument level).
#[derive(Debug, Clone, Default)]
pub struct Zone {
    pub key_lo: u8,
    pub key_hi: u8,
    pub vel_lo: u8,
    pub vel_hi: u8,
    pub generators: Vec<(GenId, i16)>,
    pub instrument: Option<u16>,
    pub sample: Option<u16>,
}

impl Zone {
    fn new() -> Self {
        Self {
            key_lo: 0,
            key_hi: 127,
            vel_lo: 0,
            vel_hi: 127,
            ..Self::default()
        }
    }

    pub fn matches(&self, note: u8, velocity: u8) -> bool {
        (self.key_lo..=self.key_hi).contains(&note)
            && (self.vel_lo..=self.vel_hi).contains(&velocity)
    }
}

#[derive(Debug, Clone)]
pub struct Preset {
    pub name: String,
    pub bank: u16,
    pub program: u16,
    pub zones: Vec<Zone>,
}

#[derive(Debug, Clone)]
pub struct Instrument {
    pub name: String,
    pub zones: Vec<Zone>,
}

/// A parsed SoundFont: preset and instrument trees plus the shared
/// float sample pool.
pub struct SoundFont {
    pub presets: Vec<Preset>,
    pub instruments: Vec<Instrument>,
    pub sample_headers: Vec<SampleHeader>,
    pub sample_data: Arc<Vec<f32>>,
}

impl SoundFont {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes)
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let riff = Chunk::read(&mut cursor)?;
        if &riff.id != b"RIFF" {
            return Err(Error::Format("not a RIFF file".into()));
        }
        if &cursor.fourcc()? != b"sfbk" {
            return Err(Error::Format("RIFF form is not sfbk".into()));
        }
        let file_end = riff.end_aligned().min(data.len());

        let mut sample_data: Option<Vec<f32>> = None;
        let mut pdta: Option<(usize, usize)> = None;

        while cursor.pos() + 8 <= file_end {
            let list = Chunk::read(&mut cursor)?;
            if &list.id != b"LIST" {
                return Err(Error::Format(format!(
                    "expected LIST chunk, got {:?}",
                    String::from_utf8_lossy(&list.id)
                )));
            }
            let form = cursor.fourcc()?;
            match &form {
                b"INFO" => {}
                b"sdta" => {
                    sample_data = Some(Self::parse_sdta(
                        &mut Cursor::new(data),
                        cursor.pos(),
                        list.end_aligned(),
                    )?);
                }
                b"pdta" => pdta = Some((cursor.pos(), list.end_aligned())),
                _ => log::warn!("sf2: skipping unknown LIST form {:?}", form),
            }
            cursor.seek(list.end_aligned())?;
        }

        let sample_data = sample_data.ok_or(Error::ChunkMissing("sdta.smpl"))?;
        let (pdta_start, pdta_end) = pdta.ok_or(Error::ChunkMissing("pdta"))?;

        let mut font = Self::parse_pdta(data, pdta_start, pdta_end)?;
        font.sample_data = Arc::new(sample_data);
        log::debug!(
            "sf2: {} presets, {} instruments, {} samples, {} frames",
            font.presets.len(),
            font.instruments.len(),
            font.sample_headers.len(),
            font.sample_data.len()
        );
        Ok(font)
    }

    /// `sdta` holds a single `smpl` chunk of 16-bit PCM.
    fn parse_sdta(cursor: &mut Cursor, start: usize, end: usize) -> Result<Vec<f32>> {
        cursor.seek(start)?;
        while cursor.pos() + 8 <= end {
            let chunk = Chunk::read(cursor)?;
            if &chunk.id == b"smpl" {
                let bytes = cursor.read_bytes(chunk.size)?;
                let mut samples = Vec::with_capacity(chunk.size / 2);
                for pair in bytes.chunks_exact(2) {
                    let v = i16::from_le_bytes([pair[0], pair[1]]);
                    samples.push(v as f32 / 32768.0);
                }
                return Ok(samples);
            }
            cursor.seek(chunk.end_aligned())?;
        }
        Err(Error::ChunkMissing("sdta.smpl"))
    }

    fn parse_pdta(data: &[u8], start: usize, end: usize) -> Result<SoundFont> {
        let mut cursor = Cursor::new(data);
        cursor.seek(start)?;

        let mut phdr = None;
        let mut pbag = None;
        let mut pgen = None;
        let mut inst = None;
        let mut ibag = None;
        let mut igen = None;
        let mut shdr = None;

        while cursor.pos() + 8 <= end {
            let chunk = Chunk::read(&mut cursor)?;
            let range = (chunk.start, chunk.size);
            match &chunk.id {
                b"phdr" => phdr = Some(range),
                b"pbag" => pbag = Some(range),
                b"pgen" => pgen = Some(range),
                b"inst" => inst = Some(range),
                b"ibag" => ibag = Some(range),
                b"igen" => igen = Some(range),
                b"shdr" => shdr = Some(range),
                b"pmod" | b"imod" => {} // modulators are not interpreted
                other => log::warn!("sf2: unknown pdta chunk {:?}", other),
            }
            cursor.seek(chunk.end_aligned())?;
        }

        let phdr = phdr.ok_or(Error::ChunkMissing("phdr"))?;
        let pbag = pbag.ok_or(Error::ChunkMissing("pbag"))?;
        let pgen = pgen.ok_or(Error::ChunkMissing("pgen"))?;
        let inst = inst.ok_or(Error::ChunkMissing("inst"))?;
        let ibag = ibag.ok_or(Error::ChunkMissing("ibag"))?;
        let igen = igen.ok_or(Error::ChunkMissing("igen"))?;
        let shdr = shdr.ok_or(Error::ChunkMissing("shdr"))?;

        let pbags = Self::parse_bags(data, pbag)?;
        let pgens = Self::parse_gens(data, pgen)?;
        let ibags = Self::parse_bags(data, ibag)?;
        let igens = Self::parse_gens(data, igen)?;

        // Presets: phdr records are 38 bytes; the final record is the
        // EOP terminator whose bag index closes the previous preset.
        let mut presets = Vec::new();
        let mut cursor = Cursor::new(data);
        cursor.seek(phdr.0)?;
        let count = phdr.1 / PHDR_SIZE;
        let mut headers = Vec::with_capacity(count);
        for _ in 0..count {
            let name = cursor.read_name(20)?;
            let program = cursor.read_u16()?;
            let bank = cursor.read_u16()?;
            let bag_index = cursor.read_u16()? as usize;
            cursor.skip(12)?; // library, genre, morphology
            headers.push((name, program, bank, bag_index));
        }
        for window in headers.windows(2) {
            let (name, program, bank, bag_start) = window[0].clone();
            let bag_end = window[1].3;
            let zones = Self::build_zones(&pbags, &pgens, bag_start, bag_end, true)?;
            presets.push(Preset {
                name,
                bank,
                program,
                zones,
            });
        }

        // Instruments, same slicing scheme.
        let mut instruments = Vec::new();
        let mut cursor = Cursor::new(data);
        cursor.seek(inst.0)?;
        let count = inst.1 / INST_SIZE;
        let mut headers = Vec::with_capacity(count);
        for _ in 0..count {
            let name = cursor.read_name(20)?;
            let bag_index = cursor.read_u16()? as usize;
            headers.push((name, bag_index));
        }
        for window in headers.windows(2) {
            let (name, bag_start) = window[0].clone();
            let bag_end = window[1].1;
            let zones = Self::build_zones(&ibags, &igens, bag_start, bag_end, false)?;
            instruments.push(Instrument { name, zones });
        }

        // Sample headers; the final EOS record is dropped.
        let mut cursor = Cursor::new(data);
        cursor.seek(shdr.0)?;
        let count = shdr.1 / SHDR_SIZE;
        let mut sample_headers = Vec::with_capacity(count.saturating_sub(1));
        for i in 0..count {
            let header = SampleHeader {
                name: cursor.read_name(20)?,
                start: cursor.read_u32()?,
                end: cursor.read_u32()?,
                loop_start: cursor.read_u32()?,
                loop_end: cursor.read_u32()?,
                sample_rate: cursor.read_u32()?,
                original_pitch: cursor.read_u8()?,
                pitch_correction: cursor.read_i8()?,
                sample_link: cursor.read_u16()?,
                sample_type: cursor.read_u16()?,
            };
            if i + 1 < count {
                sample_headers.push(header);
            }
        }

        Ok(SoundFont {
            presets,
            instruments,
            sample_headers,
            sample_data: Arc::new(Vec::new()),
        })
    }

    fn parse_bags(data: &[u8], (start, size): (usize, usize)) -> Result<Vec<usize>> {
        let mut cursor = Cursor::new(data);
        cursor.seek(start)?;
        let count = size / BAG_SIZE;
        let mut gen_indices = Vec::with_capacity(count);
        for _ in 0..count {
            gen_indices.push(cursor.read_u16()? as usize);
            cursor.skip(2)?; // modulator index, not interpreted
        }
        Ok(gen_indices)
    }

    fn parse_gens(data: &[u8], (start, size): (usize, usize)) -> Result<Vec<(u16, i16)>> {
        let mut cursor = Cursor::new(data);
        cursor.seek(start)?;
        let count = size / GEN_SIZE;
        let mut gens = Vec::with_capacity(count);
        for _ in 0..count {
            let oper = cursor.read_u16()?;
            let amount = cursor.read_i16()?;
            gens.push((oper, amount));
        }
        Ok(gens)
    }

    /// Slice `bags[bag_start..bag_end]` into zones; each bag's generator
    /// run is `gens[bag[b]..bag[b + 1]]`. A leading zone without a
    /// terminal link is the global zone: its generators are folded into
    /// every following zone.
    fn build_zones(
        bags: &[usize],
        gens: &[(u16, i16)],
        bag_start: usize,
        bag_end: usize,
        preset_level: bool,
    ) -> Result<Vec<Zone>> {
        let mut zones = Vec::new();
        let mut global: Option<Zone> = None;

        for b in bag_start..bag_end {
            let gen_start = *bags
                .get(b)
                .ok_or_else(|| Error::Format(format!("bag index {b} out of range")))?;
            let gen_end = *bags
                .get(b + 1)
                .ok_or_else(|| Error::Format(format!("bag index {} out of range", b + 1)))?;
            if gen_end < gen_start || gen_end > gens.len() {
                return Err(Error::Format(format!(
                    "generator range {gen_start}..{gen_end} out of bounds"
                )));
            }

            let mut zone = match &global {
                Some(g) => g.clone(),
                None => Zone::new(),
            };
            for &(oper, amount) in &gens[gen_start..gen_end] {
                let Some(gen) = GenId::from_raw(oper) else {
                    continue; // unrecognised generators are skipped
                };
                match gen {
                    GenId::KeyRange => {
                        let bytes = (amount as u16).to_le_bytes();
                        zone.key_lo = bytes[0].min(127);
                        zone.key_hi = bytes[1].min(127);
                    }
                    GenId::VelRange => {
                        let bytes = (amount as u16).to_le_bytes();
                        zone.vel_lo = bytes[0].min(127);
                        zone.vel_hi = bytes[1].min(127);
                    }
                    GenId::Instrument => zone.instrument = Some(amount as u16),
                    GenId::SampleId => zone.sample = Some(amount as u16),
                    other => zone.generators.push((other, amount)),
                }
            }

            let has_link = if preset_level {
                zone.instrument.is_some()
            } else {
                zone.sample.is_some()
            };
            if has_link {
                zones.push(zone);
            } else if zones.is_empty() && global.is_none() {
                global = Some(zone);
            }
            // A link-less zone after the first position is ill-formed
            // and silently dropped, matching common parser behaviour.
        }

        Ok(zones)
    }
}
