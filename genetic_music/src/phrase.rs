// The phrase: the individual (genome) that the genetic algorithm evolves.
//
// A phrase is a fixed number of measures, each cut into `subdivision` equal
// time slots. The melody is stored run-length encoded in two parallel arrays
// of length `slot_count`:
//
//   pitches: [60, 0, 0, 0, 62, 0, 0, 0, 0, 0, 0, 0, 64, 0, 0, 0]
//   rhythm:  [ 4, 0, 0, 0,  8, 0, 0, 0, 0, 0, 0, 0,  4, 0, 0, 0]
//
// A run starts wherever `rhythm[i] > 0`; its duration is `rhythm[i]` slots
// and it sounds `pitches[i]` (0 means rest). Interior slots of a run hold 0
// in both arrays. The runs must tile `[0, slot_count)` exactly: no holes, no
// overlaps, nothing past the end. `note_count` caches the number of runs,
// rests included.
//
// Alongside the melody sits the harmony: one `Chord` per beat (four chord
// blocks per measure).
//
// Phrases are only created by the arena (`pool.rs`), which keeps their
// buffers alive across generations. Everything that rewrites a phrase
// (breeding, mutation, MIDI import) goes through the helpers here and then
// calls `validate`, which is the single definition of a well-formed phrase.

use crate::error::{GaError, InvariantViolation};
use crate::harmony::Chord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lowest playable pitch (A0).
pub const MIN_PITCH: u8 = 21;
/// Highest playable pitch (C8).
pub const MAX_PITCH: u8 = 108;
/// Pitch value marking a rest.
pub const REST: u8 = 0;
/// Fitness assigned before a phrase has been scored.
pub const NEUTRAL_FITNESS: f32 = 0.5;

/// Shape of every phrase in a run: measure count and slots per measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhraseDims {
    pub num_measures: u32,
    /// Slots per measure. A power of two; 16 means sixteenth-note resolution.
    pub subdivision: u32,
}

impl Default for PhraseDims {
    fn default() -> Self {
        PhraseDims {
            num_measures: 4,
            subdivision: 16,
        }
    }
}

impl PhraseDims {
    pub const MIN_SUBDIVISION: u32 = 4;
    pub const MAX_SUBDIVISION: u32 = 128;
    /// Beats (and therefore chord blocks) per measure.
    pub const BEATS_PER_MEASURE: u32 = 4;

    pub fn new(num_measures: u32, subdivision: u32) -> Result<Self, GaError> {
        let dims = PhraseDims {
            num_measures,
            subdivision,
        };
        dims.validate()?;
        Ok(dims)
    }

    pub fn validate(&self) -> Result<(), GaError> {
        if self.num_measures == 0 {
            return Err(GaError::Config("phrase needs at least one measure".into()));
        }
        if !self.subdivision.is_power_of_two()
            || !(Self::MIN_SUBDIVISION..=Self::MAX_SUBDIVISION).contains(&self.subdivision)
        {
            return Err(GaError::Config(format!(
                "subdivision {} must be a power of two in {}..={}",
                self.subdivision,
                Self::MIN_SUBDIVISION,
                Self::MAX_SUBDIVISION
            )));
        }
        // Durations are stored as u16.
        if self.slot_count() > usize::from(u16::MAX) {
            return Err(GaError::Config(format!(
                "{} measures of {} slots exceed the maximum phrase length",
                self.num_measures, self.subdivision
            )));
        }
        Ok(())
    }

    pub fn slot_count(&self) -> usize {
        self.num_measures as usize * self.subdivision as usize
    }

    pub fn measure_len(&self) -> usize {
        self.subdivision as usize
    }

    /// Slots covered by one chord.
    pub fn chord_block_len(&self) -> usize {
        (self.subdivision / Self::BEATS_PER_MEASURE) as usize
    }

    pub fn chord_count(&self) -> usize {
        (self.num_measures * Self::BEATS_PER_MEASURE) as usize
    }
}

static NEXT_PHRASE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique phrase identity. A slot reused by the pool gets a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhraseId(u64);

impl PhraseId {
    fn fresh() -> Self {
        PhraseId(NEXT_PHRASE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PhraseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One run of the melody: a note or a rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub slot: usize,
    pub pitch: u8,
    pub duration: u16,
}

impl Run {
    pub fn is_rest(&self) -> bool {
        self.pitch == REST
    }

    /// First slot after the run.
    pub fn end(&self) -> usize {
        self.slot + usize::from(self.duration)
    }
}

/// A melodic phrase with its harmony and fitness.
#[derive(Debug, Clone, PartialEq)]
pub struct Phrase {
    dims: PhraseDims,
    pitches: Vec<u8>,
    rhythm: Vec<u16>,
    note_count: u32,
    chords: Vec<Chord>,
    fitness: f32,
    id: PhraseId,
}

impl Phrase {
    /// An empty phrase: zeroed arrays (not yet valid) and neutral fitness.
    pub(crate) fn blank(dims: PhraseDims) -> Self {
        Phrase {
            dims,
            pitches: vec![REST; dims.slot_count()],
            rhythm: vec![0; dims.slot_count()],
            note_count: 0,
            chords: vec![Chord::default(); dims.chord_count()],
            fitness: NEUTRAL_FITNESS,
            id: PhraseId::fresh(),
        }
    }

    /// Zero the melody and harmony and take a fresh identity. Buffers are
    /// reused, never reallocated.
    pub(crate) fn reset(&mut self) {
        self.clear_melody();
        self.chords.fill(Chord::default());
        self.fitness = NEUTRAL_FITNESS;
        self.id = PhraseId::fresh();
    }

    fn clear_melody(&mut self) {
        self.pitches.fill(REST);
        self.rhythm.fill(0);
        self.note_count = 0;
    }

    pub fn dims(&self) -> PhraseDims {
        self.dims
    }

    pub fn id(&self) -> PhraseId {
        self.id
    }

    pub fn pitches(&self) -> &[u8] {
        &self.pitches
    }

    pub fn rhythm(&self) -> &[u16] {
        &self.rhythm
    }

    /// Cached number of runs, rests included.
    pub fn note_count(&self) -> u32 {
        self.note_count
    }

    pub fn chords(&self) -> &[Chord] {
        &self.chords
    }

    pub fn chords_mut(&mut self) -> &mut [Chord] {
        &mut self.chords
    }

    /// Chord governing a slot.
    pub fn chord_at(&self, slot: usize) -> Chord {
        let block = slot / self.dims.chord_block_len().max(1);
        self.chords.get(block).copied().unwrap_or_default()
    }

    pub fn set_chords(&mut self, chords: &[Chord]) -> Result<(), GaError> {
        if chords.len() != self.chords.len() {
            return Err(InvariantViolation::ArrayLength {
                expected: self.chords.len(),
                actual: chords.len(),
            }
            .into());
        }
        self.chords.copy_from_slice(chords);
        Ok(())
    }

    pub fn fitness(&self) -> f32 {
        self.fitness
    }

    pub fn set_fitness(&mut self, fitness: f32) {
        self.fitness = fitness;
    }

    /// Iterate the runs in slot order. Stops early on a malformed array
    /// rather than looping forever.
    pub fn runs(&self) -> Runs<'_> {
        Runs {
            phrase: self,
            slot: 0,
        }
    }

    /// Runs that carry a pitch.
    pub fn sounding_runs(&self) -> impl Iterator<Item = Run> + '_ {
        self.runs().filter(|run| !run.is_rest())
    }

    pub fn is_run_start(&self, slot: usize) -> bool {
        self.rhythm.get(slot).is_some_and(|&d| d > 0)
    }

    /// Count runs directly from the rhythm array.
    pub fn recount_notes(&self) -> u32 {
        self.rhythm.iter().filter(|&&d| d > 0).count() as u32
    }

    /// Replace the melody with consecutive `(pitch, duration)` runs starting
    /// at slot 0. The runs must cover the phrase exactly.
    pub fn set_runs(&mut self, runs: &[(u8, u16)]) -> Result<(), GaError> {
        self.clear_melody();
        let total = self.pitches.len();
        let mut cursor = 0usize;
        for &(pitch, duration) in runs {
            if duration == 0 {
                self.clear_melody();
                return Err(InvariantViolation::Hole { slot: cursor }.into());
            }
            if cursor + usize::from(duration) > total {
                self.clear_melody();
                return Err(InvariantViolation::Overrun {
                    slot: cursor,
                    duration,
                }
                .into());
            }
            self.pitches[cursor] = pitch;
            self.rhythm[cursor] = duration;
            cursor += usize::from(duration);
        }
        if cursor < total {
            self.clear_melody();
            return Err(InvariantViolation::Hole { slot: cursor }.into());
        }
        self.note_count = runs.len() as u32;
        if let Err(violation) = self.validate() {
            self.clear_melody();
            return Err(violation.into());
        }
        Ok(())
    }

    /// Replace the melody with raw run-length arrays. The note count is
    /// recomputed; the result must validate or the melody is left cleared.
    pub fn load_melody(&mut self, pitches: &[u8], rhythm: &[u16]) -> Result<(), GaError> {
        for len in [pitches.len(), rhythm.len()] {
            if len != self.pitches.len() {
                return Err(InvariantViolation::ArrayLength {
                    expected: self.pitches.len(),
                    actual: len,
                }
                .into());
            }
        }
        self.pitches.copy_from_slice(pitches);
        self.rhythm.copy_from_slice(rhythm);
        self.note_count = self.recount_notes();
        if let Err(violation) = self.validate() {
            self.clear_melody();
            return Err(violation.into());
        }
        Ok(())
    }

    /// Copy melody, harmony and fitness from another phrase of the same
    /// shape. Identity is kept.
    pub fn copy_from(&mut self, other: &Phrase) -> Result<(), GaError> {
        if other.dims != self.dims {
            return Err(InvariantViolation::ArrayLength {
                expected: self.pitches.len(),
                actual: other.pitches.len(),
            }
            .into());
        }
        self.pitches.copy_from_slice(&other.pitches);
        self.rhythm.copy_from_slice(&other.rhythm);
        self.chords.copy_from_slice(&other.chords);
        self.note_count = other.note_count;
        self.fitness = other.fitness;
        Ok(())
    }

    /// Mutable access to both melody arrays at once, for operators that
    /// rewrite pitches or swap halves in place. Callers must keep the run
    /// structure intact or call `refresh_note_count` and `validate`.
    pub(crate) fn melody_mut(&mut self) -> (&mut [u8], &mut [u16]) {
        (&mut self.pitches, &mut self.rhythm)
    }

    pub(crate) fn refresh_note_count(&mut self) {
        self.note_count = self.recount_notes();
    }

    pub fn can_subdivide_at(&self, slot: usize) -> bool {
        self.rhythm.get(slot).is_some_and(|&d| d >= 2 && d % 2 == 0)
    }

    /// Split the run starting at `slot` into two equal halves with the same
    /// pitch. Returns false if there is no evenly divisible run there.
    pub fn subdivide_at(&mut self, slot: usize) -> bool {
        if !self.can_subdivide_at(slot) {
            return false;
        }
        let half = self.rhythm[slot] / 2;
        let second = slot + usize::from(half);
        self.rhythm[slot] = half;
        self.rhythm[second] = half;
        self.pitches[second] = self.pitches[slot];
        self.note_count += 1;
        true
    }

    /// Whether the run at `slot` and the following run have equal
    /// power-of-two length and together form an aligned block inside one
    /// measure.
    pub fn can_merge_at(&self, slot: usize) -> bool {
        let Some(&duration) = self.rhythm.get(slot) else {
            return false;
        };
        if !duration.is_power_of_two() {
            return false;
        }
        let duration = usize::from(duration);
        let next = slot + duration;
        if self.rhythm.get(next).copied() != Some(duration as u16) {
            return false;
        }
        let measure_len = self.dims.measure_len();
        let offset = slot % measure_len;
        let span = duration * 2;
        span <= measure_len && offset % span == 0 && offset + span <= measure_len
    }

    /// Merge the run at `slot` with its equal-length successor. The merged
    /// run keeps the first run's pitch.
    pub fn merge_at(&mut self, slot: usize) -> bool {
        if !self.can_merge_at(slot) {
            return false;
        }
        let duration = self.rhythm[slot];
        let next = slot + usize::from(duration);
        self.rhythm[slot] = duration * 2;
        self.rhythm[next] = 0;
        self.pitches[next] = REST;
        self.note_count -= 1;
        true
    }

    /// Check the run-length partition, pitch range and cached count.
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        let total = self.dims.slot_count();
        if self.pitches.len() != total {
            return Err(InvariantViolation::ArrayLength {
                expected: total,
                actual: self.pitches.len(),
            });
        }
        if self.rhythm.len() != total {
            return Err(InvariantViolation::ArrayLength {
                expected: total,
                actual: self.rhythm.len(),
            });
        }
        if self.chords.len() != self.dims.chord_count() {
            return Err(InvariantViolation::ArrayLength {
                expected: self.dims.chord_count(),
                actual: self.chords.len(),
            });
        }

        let mut remaining = 0usize;
        let mut runs = 0u32;
        for slot in 0..total {
            let duration = self.rhythm[slot];
            let pitch = self.pitches[slot];
            if duration > 0 {
                if remaining > 0 {
                    return Err(InvariantViolation::Overlap { slot });
                }
                if slot + usize::from(duration) > total {
                    return Err(InvariantViolation::Overrun { slot, duration });
                }
                if pitch != REST && !(MIN_PITCH..=MAX_PITCH).contains(&pitch) {
                    return Err(InvariantViolation::PitchOutOfRange { slot, pitch });
                }
                remaining = usize::from(duration) - 1;
                runs += 1;
            } else {
                if remaining == 0 {
                    return Err(InvariantViolation::Hole { slot });
                }
                if pitch != REST {
                    return Err(InvariantViolation::StrayPitch { slot });
                }
                remaining -= 1;
            }
        }

        if runs != self.note_count {
            return Err(InvariantViolation::NoteCountMismatch {
                cached: self.note_count,
                actual: runs,
            });
        }
        Ok(())
    }

    /// Compact one-line rendering: note names with `-` holds, `.` for rest
    /// slots, `|` between measures.
    pub fn summary(&self) -> String {
        let measure_len = self.dims.measure_len();
        let mut out = String::new();
        let mut resting = true;
        for slot in 0..self.rhythm.len() {
            if slot > 0 && slot % measure_len == 0 {
                out.push('|');
            }
            if self.rhythm[slot] > 0 {
                resting = self.pitches[slot] == REST;
                if resting {
                    out.push('.');
                } else {
                    out.push_str(&pitch_name(self.pitches[slot]));
                }
            } else if resting {
                out.push('.');
            } else {
                out.push('-');
            }
        }
        out
    }
}

/// Iterator over a phrase's runs; see `Phrase::runs`.
pub struct Runs<'a> {
    phrase: &'a Phrase,
    slot: usize,
}

impl Iterator for Runs<'_> {
    type Item = Run;

    fn next(&mut self) -> Option<Run> {
        let duration = *self.phrase.rhythm.get(self.slot)?;
        if duration == 0 {
            self.slot = self.phrase.rhythm.len();
            return None;
        }
        let run = Run {
            slot: self.slot,
            pitch: self.phrase.pitches[self.slot],
            duration,
        };
        self.slot += usize::from(duration);
        Some(run)
    }
}

/// Fold an arbitrary pitch back into `MIN_PITCH..=MAX_PITCH` by reflecting
/// off the range boundaries.
pub fn reflect_pitch(value: i32) -> u8 {
    let low = i32::from(MIN_PITCH);
    let high = i32::from(MAX_PITCH);
    let mut v = value;
    while v < low || v > high {
        if v > high {
            v = 2 * high - v;
        }
        if v < low {
            v = 2 * low - v;
        }
    }
    v as u8
}

/// Note name with octave, middle C = "C4".
pub fn pitch_name(pitch: u8) -> String {
    const NAMES: [&str; 12] = [
        "C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B",
    ];
    let octave = i32::from(pitch / 12) - 1;
    format!("{}{}", NAMES[usize::from(pitch % 12)], octave)
}
