//! In-memory SF2 fixture: one preset, one instrument, one looping sine
//! sample. Byte layout follows the record sizes in the SF2 spec so the
//! loader is exercised end to end.

fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + body.len() + 1);
    out.extend_from_slice(id);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    if body.len() % 2 == 1 {
        out.push(0); // RIFF pad byte
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

/// `(generator, amount)` record.
fn gen(oper: u16, amount: i16) -> [u8; 4] {
    let mut out = [0u8; 4];
    out[..2].copy_from_slice(&oper.to_le_bytes());
    out[2..].copy_from_slice(&amount.to_le_bytes());
    out
}

/// Range amount: low byte, high byte.
fn range(lo: u8, hi: u8) -> i16 {
    i16::from_le_bytes([lo, hi])
}

/// Build the complete file image.
pub fn minimal_sf2() -> Vec<u8> {
    // 1000 samples of a 441 Hz sine at 44.1 kHz: the period is exactly
    // 100 samples, so the 100..900 loop is seamless.
    let mut smpl = Vec::new();
    for i in 0..1000u32 {
        let phase = i as f64 * 441.0 / 44100.0;
        let value = (phase * std::f64::consts::TAU).sin();
        smpl.extend_from_slice(&((value * 24000.0) as i16).to_le_bytes());
    }

    // shdr: the real sample plus the EOS terminator.
    let mut shdr = Vec::new();
    shdr.extend_from_slice(&name20("Test Sample"));
    for value in [0u32, 1000, 100, 900, 44100] {
        shdr.extend_from_slice(&value.to_le_bytes());
    }
    shdr.push(60); // original pitch
    shdr.push(0); // pitch correction
    shdr.extend_from_slice(&0u16.to_le_bytes()); // sample link
    shdr.extend_from_slice(&1u16.to_le_bytes()); // mono sample type
    shdr.extend_from_slice(&name20("EOS"));
    shdr.extend_from_slice(&[0u8; 26]);

    // Instrument zone generators; SampleId must come last.
    let mut igen = Vec::new();
    igen.extend_from_slice(&gen(43, range(0, 127))); // KeyRange
    igen.extend_from_slice(&gen(44, range(0, 127))); // VelRange
    igen.extend_from_slice(&gen(54, 1)); // SampleModes: continuous loop
    igen.extend_from_slice(&gen(53, 0)); // SampleId
    igen.extend_from_slice(&gen(0, 0)); // terminator

    let mut ibag = Vec::new();
    ibag.extend_from_slice(&0u16.to_le_bytes()); // zone 0 gens start at 0
    ibag.extend_from_slice(&0u16.to_le_bytes());
    ibag.extend_from_slice(&4u16.to_le_bytes()); // terminal bag closes at 4
    ibag.extend_from_slice(&0u16.to_le_bytes());

    let mut inst = Vec::new();
    inst.extend_from_slice(&name20("Test Inst"));
    inst.extend_from_slice(&0u16.to_le_bytes());
    inst.extend_from_slice(&name20("EOI"));
    inst.extend_from_slice(&1u16.to_le_bytes());

    // Preset zone generators; Instrument must come last.
    let mut pgen = Vec::new();
    pgen.extend_from_slice(&gen(41, 0)); // Instrument link
    pgen.extend_from_slice(&gen(0, 0)); // terminator

    let mut pbag = Vec::new();
    pbag.extend_from_slice(&0u16.to_le_bytes());
    pbag.extend_from_slice(&0u16.to_le_bytes());
    pbag.extend_from_slice(&1u16.to_le_bytes());
    pbag.extend_from_slice(&0u16.to_le_bytes());

    let mut phdr = Vec::new();
    phdr.extend_from_slice(&name20("Test Preset"));
    phdr.extend_from_slice(&0u16.to_le_bytes()); // program
    phdr.extend_from_slice(&0u16.to_le_bytes()); // bank
    phdr.extend_from_slice(&0u16.to_le_bytes()); // bag index
    phdr.extend_from_slice(&[0u8; 12]); // library, genre, morphology
    phdr.extend_from_slice(&name20("EOP"));
    phdr.extend_from_slice(&0u16.to_le_bytes());
    phdr.extend_from_slice(&0u16.to_le_bytes());
    phdr.extend_from_slice(&1u16.to_le_bytes());
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
