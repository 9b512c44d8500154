//! Polyphonic voice pool shared by every generator family.
//!
//! Implements the allocation discipline once: re-trigger a mapped note,
//! reuse an idle voice, grow up to the polyphony cap, then steal the
//! voice with the smallest trigger sequence. The sequence is a monotonic
//! counter issued by the pool, so steal order is deterministic and
//! testable (no wall-clock involved).

/// Per-voice state the pool needs to manage a generator's voices.
pub trait PoolVoice {
    /// True from trigger until the amplitude envelope falls silent or the
    /// voice is stolen.
    fn is_active(&self) -> bool;

    /// The note this voice is currently sounding.
    fn note(&self) -> u8;

    /// The trigger sequence number the pool issued at allocation.
    fn trigger_seq(&self) -> u64;

    /// Enter the release phase.
    fn begin_release(&mut self);

    /// Stop immediately (stolen or choked).
    fn steal(&mut self);
}

/// Fixed-cap voice pool with note-to-voice mapping and oldest-stealing.
pub struct VoicePool<V> {
    voices: Vec<V>,
    note_to_voice: [Option<usize>; 128],
    cap: usize,
    next_seq: u64,
}

impl<V: PoolVoice> VoicePool<V> {
    pub fn new(cap: usize) -> Self {
        Self {
            voices: Vec::with_capacity(cap.max(1)),
            note_to_voice: [None; 128],
            cap: cap.max(1),
            next_seq: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn voices(&self) -> &[V] {
        &self.voices
    }

    pub fn voices_mut(&mut self) -> &mut [V] {
        &mut self.voices
    }

    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    /// Find or make a voice for `note` and hand it to the caller for
    /// triggering, together with the issued sequence number.
    ///
    /// `make` is only called when the pool grows (at most `cap` times over
    /// the pool's lifetime); after warm-up, allocation never touches the
    /// heap.
    pub fn allocate(&mut self, note: u8, make: impl FnOnce() -> V) -> (&mut V, u64) {
        let seq = self.next_seq;
        self.next_seq += 1;

        // Already sounding: re-trigger the same voice (legato re-attack).
        if let Some(idx) = self.note_to_voice[note as usize] {
            return (&mut self.voices[idx], seq);
        }

        // Reuse an idle voice.
        if let Some(idx) = self.voices.iter().position(|v| !v.is_active()) {
            self.clear_mapping_to(idx);
            self.note_to_voice[note as usize] = Some(idx);
            return (&mut self.voices[idx], seq);
        }

        // Grow up to the cap.
        if self.voices.len() < self.cap {
            self.voices.push(make());
            let idx = self.voices.len() - 1;
            self.note_to_voice[note as usize] = Some(idx);
            return (&mut self.voices[idx], seq);
        }

        // Steal: smallest trigger sequence, ties broken by lowest index.
        let idx = self
            .voices
            .iter()
            .enumerate()
            .min_by_key(|(i, v)| (v.trigger_seq(), *i))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let old_note = self.voices[idx].note();
        if self.note_to_voice[old_note as usize] == Some(idx) {
            self.note_to_voice[old_note as usize] = None;
        }
        self.voices[idx].steal();
        self.note_to_voice[note as usize] = Some(idx);
        (&mut self.voices[idx], seq)
    }

    /// Release the voice mapped from `note`, if any. The mapping stays in
    /// place while the voice rings out, so a quick re-trigger reaches the
    /// same voice; [`sweep`](Self::sweep) clears it once silent.
    pub fn release(&mut self, note: u8) -> Option<&mut V> {
        let idx = self.note_to_voice[note as usize]?;
        let voice = &mut self.voices[idx];
        if voice.is_active() {
            voice.begin_release();
            Some(&mut self.voices[idx])
        } else {
            None
        }
    }

    /// Release every active voice.
    pub fn release_all(&mut self) {
        for v in &mut self.voices {
            if v.is_active() {
                v.begin_release();
            }
        }
    }

    /// Silence every voice immediately.
    pub fn choke_all(&mut self) {
        for v in &mut self.voices {
            if v.is_active() {
                v.steal();
            }
        }
        self.note_to_voice = [None; 128];
    }

    /// Drop note mappings whose voice has gone silent. Call once per
    /// render block, after the buffer fill.
    pub fn sweep(&mut self) {
        for slot in self.note_to_voice.iter_mut() {
            if let Some(idx) = *slot {
                if !self.voices[idx].is_active() {
                    *slot = None;
                }
            }
        }
    }

    fn clear_mapping_to(&mut self, idx: usize) {
        for slot in self.note_to_voice.iter_mut() {
            if *slot == Some(idx) {
                *slot = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestVoice {
        note: u8,
        seq: u64,
        active: bool,
        releasing: bool,
    }

    impl TestVoice {
        fn new() -> Self {
            Self {
                note: 0,
                seq: 0,
                active: false,
                releasing: false,
            }
        }

        fn trigger(&mut self, note: u8, seq: u64) {
            self.note = note;
            self.seq = seq;
            self.active = true;
            self.releasing = false;
        }
    }

    impl PoolVoice for TestVoice {
        fn is_active(&self) -> bool {
            self.active
        }
        fn note(&self) -> u8 {
            self.note
        }
        fn trigger_seq(&self) -> u64 {
            self.seq
        }
        fn begin_release(&mut self) {
            self.releasing = true;
        }
        fn steal(&mut self) {
            self.active = false;
        }
    }

    fn on(pool: &mut VoicePool<TestVoice>, note: u8) {
        let (voice, seq) = pool.allocate(note, TestVoice::new);
        voice.trigger(note, seq);
    }

    #[test]
    fn test_grow_then_steal_oldest() {
        let mut pool = VoicePool::new(2);
        on(&mut pool, 60);
        on(&mut pool, 64);
        assert_eq!(pool.active_count(), 2);

        // Third note steals the voice for note 60 (smallest sequence).
        on(&mut pool, 67);
        assert_eq!(pool.active_count(), 2);
        assert_eq!(pool.voices()[0].note(), 67);
        assert!(pool.release(60).is_none());
    }

    #[test]
    fn test_retrigger_same_note_no_second_allocation() {
        let mut pool = VoicePool::new(4);
        on(&mut pool, 60);
        on(&mut pool, 60);
        assert_eq!(pool.voices().len(), 1);
        assert_eq!(pool.active_count(), 1);
    }

    #[test]
    fn test_release_unmapped_is_noop() {
        let mut pool: VoicePool<TestVoice> = VoicePool::new(2);
        assert!(pool.release(72).is_none());
    }

    #[test]
    fn test_reuse_idle_voice() {
        let mut pool = VoicePool::new(4);
        on(&mut pool, 60);
        pool.voices_mut()[0].active = false;
        pool.sweep();

        on(&mut pool, 64);
        assert_eq!(pool.voices().len(), 1, "idle voice reused, not grown");
        assert_eq!(pool.voices()[0].note(), 64);
    }

    #[test]
    fn test_active_cap_invariant() {
        let mut pool = VoicePool::new(3);
        for note in 40..80 {
            on(&mut pool, note);
            assert!(pool.active_count() <= 3);
        }
    }

    #[test]
    fn test_choke_all() {
        let mut pool = VoicePool::new(4);
        on(&mut pool, 60);
        on(&mut pool, 64);
        pool.choke_all();
        assert_eq!(pool.active_count(), 0);
    }
}
