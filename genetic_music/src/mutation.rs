// Mutation: one weighted-random operator applied to each new child.
//
// Rhythmic operators change the run structure:
// - Subdivide splits one run into two equal halves.
// - Merge joins two equal, aligned, adjacent runs within a measure.
//
// Both walk the runs in order and roll per eligible run. Base odds depend on
// the run length (long runs split more readily, short runs merge more
// readily); every failed roll raises the odds for the next candidate by 25%.
// The walk repeats until exactly one change lands, so a phrase with any
// eligible run is always changed, and one with none is returned untouched.
//
// Melodic operators rewrite pitches at run starts and leave the rhythm
// alone. Rotate and Retrograde move every run's pitch, rests included.
// Transpose, the two sorts and Inversion only touch sounding notes. Any pitch
// pushed outside the playable range is reflected back off the boundary.

use crate::error::GaError;
use crate::phrase::{MAX_PITCH, MIN_PITCH, Phrase, REST, reflect_pitch};
use genetic_music_prng::EvoRng;
use log::trace;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Odds of splitting a measure-long run, or of merging two single slots.
const BASE_RHYTHM_PROBABILITY: f32 = 0.4;
/// Growth of the odds after each failed roll.
const BACKOFF: f32 = 1.25;
/// Largest transposition, in semitones, either way.
const MAX_TRANSPOSE: i32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    NoOp,
    Subdivide,
    Merge,
    Rotate,
    Transpose,
    SortAscending,
    SortDescending,
    Inversion,
    Retrograde,
}

impl MutationKind {
    pub const ALL: [MutationKind; 9] = [
        MutationKind::NoOp,
        MutationKind::Subdivide,
        MutationKind::Merge,
        MutationKind::Rotate,
        MutationKind::Transpose,
        MutationKind::SortAscending,
        MutationKind::SortDescending,
        MutationKind::Inversion,
        MutationKind::Retrograde,
    ];
}

/// Relative frequency of each operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationWeights {
    pub no_op: u32,
    pub subdivide: u32,
    pub merge: u32,
    pub rotate: u32,
    pub transpose: u32,
    pub sort_ascending: u32,
    pub sort_descending: u32,
    pub inversion: u32,
    pub retrograde: u32,
}

impl Default for MutationWeights {
    fn default() -> Self {
        MutationWeights {
            no_op: 30,
            subdivide: 15,
            merge: 15,
            rotate: 20,
            transpose: 20,
            sort_ascending: 20,
            sort_descending: 20,
            inversion: 20,
            retrograde: 20,
        }
    }
}

impl MutationWeights {
    /// Weights in `MutationKind::ALL` order.
    pub fn as_array(&self) -> [u32; 9] {
        [
            self.no_op,
            self.subdivide,
            self.merge,
            self.rotate,
            self.transpose,
            self.sort_ascending,
            self.sort_descending,
            self.inversion,
            self.retrograde,
        ]
    }

    pub fn total(&self) -> u32 {
        self.as_array().iter().sum()
    }
}

pub struct Mutator {
    weights: [u32; 9],
    rng: EvoRng,
}

impl Mutator {
    pub fn new(weights: &MutationWeights, rng: EvoRng) -> Result<Self, GaError> {
        if weights.total() == 0 {
            return Err(GaError::Config("mutation weights are all zero".into()));
        }
        Ok(Mutator {
            weights: weights.as_array(),
            rng,
        })
    }

    /// Draw an operator, apply it and validate the result.
    pub fn mutate(&mut self, phrase: &mut Phrase) -> Result<MutationKind, GaError> {
        let index = self
            .rng
            .weighted_index(&self.weights)
            .ok_or_else(|| GaError::Config("mutation weights are all zero".into()))?;
        let kind = MutationKind::ALL[index];
        self.apply(kind, phrase)?;
        Ok(kind)
    }

    /// Apply a specific operator. Returns whether the phrase changed.
    pub fn apply(&mut self, kind: MutationKind, phrase: &mut Phrase) -> Result<bool, GaError> {
        let changed = match kind {
            MutationKind::NoOp => false,
            MutationKind::Subdivide => subdivide(phrase, &mut self.rng),
            MutationKind::Merge => merge(phrase, &mut self.rng),
            MutationKind::Rotate => rotate(phrase, &mut self.rng),
            MutationKind::Transpose => transpose(phrase, &mut self.rng),
            MutationKind::SortAscending => sort_pitches(phrase, false),
            MutationKind::SortDescending => sort_pitches(phrase, true),
            MutationKind::Inversion => invert(phrase),
            MutationKind::Retrograde => retrograde(phrase),
        };
        trace!("mutation {kind:?} on phrase {} changed={changed}", phrase.id());
        phrase.validate()?;
        Ok(changed)
    }
}

/// Base odds for splitting a run: halved for each halving below a measure.
fn subdivide_odds(duration: usize, measure_len: usize) -> f32 {
    let mut odds = BASE_RHYTHM_PROBABILITY;
    let mut length = duration;
    while length < measure_len {
        odds *= 0.5;
        length <<= 1;
    }
    odds
}

/// Base odds for merging a pair: halved for each doubling above one slot.
fn merge_odds(duration: usize) -> f32 {
    let mut odds = BASE_RHYTHM_PROBABILITY;
    let mut length = 1;
    while length < duration {
        odds *= 0.5;
        length <<= 1;
    }
    odds
}

/// Walk eligible runs with backoff until one roll succeeds. Returns the
/// chosen run's start slot, or `None` if no run is eligible.
fn pick_run(
    phrase: &Phrase,
    rng: &mut EvoRng,
    eligible: impl Fn(&Phrase, usize) -> bool,
    odds: impl Fn(usize) -> f32,
) -> Option<usize> {
    let mut modifier = 1.0f32;
    loop {
        let mut any = false;
        for run in phrase.runs() {
            if !eligible(phrase, run.slot) {
                continue;
            }
            any = true;
            if rng.next_f32() < odds(usize::from(run.duration)) * modifier {
                return Some(run.slot);
            }
            modifier *= BACKOFF;
        }
        if !any {
            return None;
        }
    }
}

pub fn subdivide(phrase: &mut Phrase, rng: &mut EvoRng) -> bool {
    let measure_len = phrase.dims().measure_len();
    let chosen = pick_run(
        phrase,
        rng,
        |p, slot| p.can_subdivide_at(slot),
        |duration| subdivide_odds(duration, measure_len),
    );
    chosen.is_some_and(|slot| phrase.subdivide_at(slot))
}

pub fn merge(phrase: &mut Phrase, rng: &mut EvoRng) -> bool {
    let chosen = pick_run(phrase, rng, |p, slot| p.can_merge_at(slot), merge_odds);
    chosen.is_some_and(|slot| phrase.merge_at(slot))
}

/// Cyclically shift run pitches (rests included) by 1..count-1 positions.
pub fn rotate(phrase: &mut Phrase, rng: &mut EvoRng) -> bool {
    let starts: Vec<usize> = phrase.runs().map(|r| r.slot).collect();
    if starts.len() < 2 {
        return false;
    }
    let offset = rng.range_usize_inclusive(1, starts.len() - 1);
    let (pitches, _) = phrase.melody_mut();
    let mut queue: VecDeque<u8> = starts.iter().map(|&s| pitches[s]).collect();
    queue.rotate_right(offset);
    for (&slot, pitch) in starts.iter().zip(queue) {
        pitches[slot] = pitch;
    }
    true
}

/// Shift every sounding note by one random offset in [-12, 12].
pub fn transpose(phrase: &mut Phrase, rng: &mut EvoRng) -> bool {
    let offset = rng.range_i32_inclusive(-MAX_TRANSPOSE, MAX_TRANSPOSE);
    if offset == 0 {
        return false;
    }
    let starts: Vec<usize> = phrase.sounding_runs().map(|r| r.slot).collect();
    let (pitches, _) = phrase.melody_mut();
    for slot in starts {
        pitches[slot] = reflect_pitch(i32::from(pitches[slot]) + offset);
    }
    true
}

/// Reorder sounding pitches into ascending or descending order across the
/// sounding run slots. Rests stay where they are.
pub fn sort_pitches(phrase: &mut Phrase, descending: bool) -> bool {
    let starts: Vec<usize> = phrase.sounding_runs().map(|r| r.slot).collect();
    let (pitches, _) = phrase.melody_mut();
    let mut values: Vec<u8> = starts.iter().map(|&s| pitches[s]).collect();
    let before = values.clone();
    if descending {
        values.sort_unstable_by(|a, b| b.cmp(a));
    } else {
        values.sort_unstable();
    }
    for (&slot, &pitch) in starts.iter().zip(&values) {
        pitches[slot] = pitch;
    }
    values != before
}

/// Mirror sounding pitches around their median.
pub fn invert(phrase: &mut Phrase) -> bool {
    let starts: Vec<usize> = phrase.sounding_runs().map(|r| r.slot).collect();
    if starts.is_empty() {
        return false;
    }
    let (pitches, _) = phrase.melody_mut();
    let mut sorted: Vec<u8> = starts.iter().map(|&s| pitches[s]).collect();
    sorted.sort_unstable();
    let n = sorted.len();
    let median = if n % 2 == 1 {
        f32::from(sorted[n / 2])
    } else {
        (f32::from(sorted[n / 2 - 1]) + f32::from(sorted[n / 2])) / 2.0
    };
    let mut changed = false;
    for slot in starts {
        let inverted = (2.0 * median - f32::from(pitches[slot])).round() as i32;
        let pitch = reflect_pitch(inverted);
        changed |= pitch != pitches[slot];
        pitches[slot] = pitch;
    }
    changed
}

/// Reverse the order of run pitches. Durations keep their positions.
pub fn retrograde(phrase: &mut Phrase) -> bool {
    let starts: Vec<usize> = phrase.runs().map(|r| r.slot).collect();
    let (pitches, _) = phrase.melody_mut();
    let reversed: Vec<u8> = starts.iter().rev().map(|&s| pitches[s]).collect();
    let mut changed = false;
    for (&slot, pitch) in starts.iter().zip(reversed) {
        changed |= pitches[slot] != pitch;
        pitches[slot] = pitch;
    }
    changed
}

/// True if every run pitch is a rest or within the playable range.
pub fn pitches_in_range(phrase: &Phrase) -> bool {
    phrase
        .runs()
        .all(|r| r.pitch == REST || (MIN_PITCH..=MAX_PITCH).contains(&r.pitch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phrase::PhraseDims;

    fn phrase(dims: PhraseDims, runs: &[(u8, u16)]) -> Phrase {
        let mut p = Phrase::blank(dims);
        p.set_runs(runs).unwrap();
        p
    }

    fn one_measure(runs: &[(u8, u16)]) -> Phrase {
        phrase(PhraseDims::new(1, 16).unwrap(), runs)
    }

    fn run_pitches(p: &Phrase) -> Vec<u8> {
        p.runs().map(|r| r.pitch).collect()
    }

    fn run_lengths(p: &Phrase) -> Vec<u16> {
        p.runs().map(|r| r.duration).collect()
    }

    #[test]
    fn default_weights_match_table() {
        let w = MutationWeights::default();
        assert_eq!(w.as_array(), [30, 15, 15, 20, 20, 20, 20, 20, 20]);
        assert_eq!(w.total(), 180);
    }

    #[test]
    fn zero_weights_are_rejected() {
        let w = MutationWeights {
            no_op: 0,
            subdivide: 0,
            merge: 0,
            rotate: 0,
            transpose: 0,
            sort_ascending: 0,
            sort_descending: 0,
            inversion: 0,
            retrograde: 0,
        };
        assert!(Mutator::new(&w, EvoRng::new(1)).is_err());
    }

    #[test]
    fn odds_shrink_away_from_extremes() {
        assert_eq!(subdivide_odds(16, 16), 0.4);
        assert_eq!(subdivide_odds(8, 16), 0.2);
        assert_eq!(subdivide_odds(2, 16), 0.05);
        assert_eq!(merge_odds(1), 0.4);
        assert_eq!(merge_odds(4), 0.1);
    }

    #[test]
    fn subdivide_changes_exactly_one_run() {
        let mut rng = EvoRng::new(3);
        for _ in 0..50 {
            let mut p = one_measure(&[(60, 8), (62, 4), (64, 4)]);
            assert!(subdivide(&mut p, &mut rng));
            assert_eq!(p.note_count(), 4);
            p.validate().unwrap();
        }
    }

    #[test]
    fn subdivide_leaves_single_slots_alone() {
        let mut rng = EvoRng::new(3);
        let mut p = phrase(PhraseDims::new(1, 4).unwrap(), &[(60, 1), (62, 1), (64, 1), (65, 1)]);
        let before = p.clone();
        assert!(!subdivide(&mut p, &mut rng));
        assert_eq!(p, before);
    }

    #[test]
    fn merge_changes_exactly_one_pair() {
        let mut rng = EvoRng::new(8);
        for _ in 0..50 {
            let mut p = one_measure(&[(60, 2), (62, 2), (64, 4), (65, 4), (67, 4)]);
            assert!(merge(&mut p, &mut rng));
            assert_eq!(p.note_count(), 4);
            p.validate().unwrap();
        }
    }

    #[test]
    fn merge_without_candidates_is_unchanged() {
        let mut rng = EvoRng::new(8);
        let mut p = one_measure(&[(60, 4), (62, 8), (64, 4)]);
        let before = p.clone();
        assert!(!merge(&mut p, &mut rng));
        assert_eq!(p, before);
    }

    #[test]
    fn rotate_preserves_pitch_multiset_and_rhythm() {
        let mut rng = EvoRng::new(5);
        let mut p = one_measure(&[(60, 4), (REST, 4), (64, 4), (67, 4)]);
        assert!(rotate(&mut p, &mut rng));
        let mut pitches = run_pitches(&p);
        assert_ne!(pitches, vec![60, REST, 64, 67]);
        pitches.sort_unstable();
        assert_eq!(pitches, vec![REST, 60, 64, 67]);
        assert_eq!(run_lengths(&p), vec![4, 4, 4, 4]);
        p.validate().unwrap();
    }

    #[test]
    fn rotate_needs_two_runs() {
        let mut rng = EvoRng::new(5);
        let mut p = one_measure(&[(60, 16)]);
        assert!(!rotate(&mut p, &mut rng));
    }

    #[test]
    fn transpose_reflects_into_range() {
        let mut rng = EvoRng::new(17);
        for _ in 0..200 {
            let mut p = one_measure(&[(MIN_PITCH, 4), (REST, 4), (MAX_PITCH, 4), (60, 4)]);
            transpose(&mut p, &mut rng);
            p.validate().unwrap();
            assert!(pitches_in_range(&p));
            assert_eq!(run_pitches(&p)[1], REST);
        }
    }

    #[test]
    fn sorts_skip_rests() {
        let mut p = one_measure(&[(67, 4), (REST, 4), (60, 4), (64, 4)]);
        assert!(sort_pitches(&mut p, false));
        assert_eq!(run_pitches(&p), vec![60, REST, 64, 67]);
        assert!(sort_pitches(&mut p, true));
        assert_eq!(run_pitches(&p), vec![67, REST, 64, 60]);
        assert!(!sort_pitches(&mut p, true));
    }

    #[test]
    fn inversion_mirrors_around_median() {
        let mut p = one_measure(&[(60, 4), (62, 4), (67, 8)]);
        assert!(invert(&mut p));
        // Median 62: 60 -> 64, 62 -> 62, 67 -> 57.
        assert_eq!(run_pitches(&p), vec![64, 62, 57]);
    }

    #[test]
    fn inversion_with_even_count_uses_mean_of_middle_pair() {
        let mut p = one_measure(&[(60, 4), (64, 4), (REST, 4), (66, 4)]);
        invert(&mut p);
        // Sounding 60, 64, 66: median 64.
        assert_eq!(run_pitches(&p), vec![68, 64, REST, 62]);
        let mut q = one_measure(&[(60, 4), (62, 4), (64, 4), (70, 4)]);
        invert(&mut q);
        // Median (62 + 64) / 2 = 63.
        assert_eq!(run_pitches(&q), vec![66, 64, 62, 56]);
    }

    #[test]
    fn retrograde_reverses_pitches_not_durations() {
        let mut p = one_measure(&[(60, 2), (62, 2), (REST, 4), (67, 8)]);
        assert!(retrograde(&mut p));
        assert_eq!(run_pitches(&p), vec![67, REST, 62, 60]);
        assert_eq!(run_lengths(&p), vec![2, 2, 4, 8]);
        p.validate().unwrap();
    }

    #[test]
    fn pitch_operators_keep_rhythm_and_note_count() {
        let mut mutator = Mutator::new(&MutationWeights::default(), EvoRng::new(4)).unwrap();
        for kind in [
            MutationKind::Transpose,
            MutationKind::SortAscending,
            MutationKind::SortDescending,
            MutationKind::Inversion,
        ] {
            for _ in 0..20 {
                let mut p = phrase(
                    PhraseDims::new(2, 16).unwrap(),
                    &[(64, 2), (60, 2), (REST, 4), (71, 8), (55, 4), (67, 4), (REST, 8)],
                );
                let rhythm = p.rhythm().to_vec();
                let notes = p.note_count();
                mutator.apply(kind, &mut p).unwrap();
                assert_eq!(p.rhythm(), rhythm.as_slice(), "{kind:?}");
                assert_eq!(p.note_count(), notes, "{kind:?}");
            }
        }
    }

    #[test]
    fn mutator_always_leaves_valid_phrases() {
        let mut mutator = Mutator::new(&MutationWeights::default(), EvoRng::new(21)).unwrap();
        let mut p = phrase(
            PhraseDims::new(2, 16).unwrap(),
            &[(60, 8), (62, 4), (REST, 4), (64, 16)],
        );
        let mut seen = std::collections::HashSet::new();
        for _ in 0..2000 {
            seen.insert(mutator.mutate(&mut p).unwrap());
            p.validate().unwrap();
            assert!(pitches_in_range(&p));
        }
        assert_eq!(seen.len(), MutationKind::ALL.len());
    }
}
