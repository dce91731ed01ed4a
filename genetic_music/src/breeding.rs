// Breeding: combining two parents.
//
// Crossover swaps the second half of each measure between the two parents,
// in place. A measure is only swapped when both parents have run boundaries
// at its midpoint and its end, so the swapped region is made of whole runs
// and the partition invariant survives without repair. Measures held by a
// single whole-measure note never qualify. Crossover produces no new phrase;
// the controller snapshots the first (now crossed) parent into a child.
//
// Interpolate writes a new child that sits between the parents, weighted by
// fitness: `r = fB / (fA + fB)`, so `r = 0` reproduces A and `r = 1`
// reproduces B's sounding line. The child is built left to right:
//
// 1. At the cursor, take the remaining length of the run each parent is in,
//    rounded down to a power of two. The larger of the two bounds a segment.
// 2. Inside the segment, at every step, interpolate the two parents'
//    duration exponents by binning `r` over the exponent range, and their
//    pitches linearly. Emit one run, never longer than what is left of the
//    segment, and advance.
//
// Every emitted run is a power of two no longer than either parent's current
// run remainder under `r = 0` or `r = 1`, and the cursor lands exactly on
// the phrase end, so the child is a valid partition by construction.
//
// Rests interpolate by a majority rule: the result is whichever endpoint the
// linear value sits closer to. The child's harmony is copied from the fitter
// parent.

use crate::error::GaError;
use crate::harmony::Chord;
use crate::phrase::{MAX_PITCH, MIN_PITCH, Phrase, REST};
use crate::population::Population;
use crate::pool::PhraseHandle;
use crate::selection::BreedingPair;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreedingPolicy {
    Crossover,
    #[default]
    Interpolate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreedOutcome {
    /// A new child was allocated and registered with the population.
    Child(PhraseHandle),
    /// The parents were recombined where they stand.
    InPlace { measures_swapped: usize },
}

/// Applies the breeding policy. Owns scratch buffers reused across calls.
pub struct Breeder {
    policy: BreedingPolicy,
    pitches: Vec<u8>,
    rhythm: Vec<u16>,
    chords: Vec<Chord>,
    starts_a: Vec<u32>,
    starts_b: Vec<u32>,
}

impl Breeder {
    pub fn new(policy: BreedingPolicy) -> Self {
        Breeder {
            policy,
            pitches: Vec::new(),
            rhythm: Vec::new(),
            chords: Vec::new(),
            starts_a: Vec::new(),
            starts_b: Vec::new(),
        }
    }

    pub fn policy(&self) -> BreedingPolicy {
        self.policy
    }

    pub fn breed(
        &mut self,
        pair: BreedingPair,
        population: &mut Population,
    ) -> Result<BreedOutcome, GaError> {
        match self.policy {
            BreedingPolicy::Crossover => {
                let measures_swapped = match population.phrase_pair_mut(pair.first, pair.second)? {
                    Some((a, b)) => {
                        let swapped = crossover(a, b);
                        a.validate()?;
                        b.validate()?;
                        swapped
                    }
                    None => 0,
                };
                Ok(BreedOutcome::InPlace { measures_swapped })
            }
            BreedingPolicy::Interpolate => {
                {
                    let a = population.phrase(pair.first)?;
                    let b = population.phrase(pair.second)?;
                    a.validate()?;
                    b.validate()?;
                    self.interpolate(a, b);
                }
                let child = population.allocate_child()?;
                let phrase = population.phrase_mut(child)?;
                phrase.load_melody(&self.pitches, &self.rhythm)?;
                phrase.set_chords(&self.chords)?;
                Ok(BreedOutcome::Child(child))
            }
        }
    }

    /// Fill the scratch buffers with the interpolated child of `a` and `b`.
    /// Both parents must be valid.
    fn interpolate(&mut self, a: &Phrase, b: &Phrase) {
        let ratio = interpolation_ratio(a.fitness(), b.fitness());
        let total = a.dims().slot_count();
        fill_run_starts(a, &mut self.starts_a);
        fill_run_starts(b, &mut self.starts_b);
        self.pitches.clear();
        self.pitches.resize(total, REST);
        self.rhythm.clear();
        self.rhythm.resize(total, 0);

        let mut cursor = 0;
        while cursor < total {
            let (_, span_a) = run_at(a, &self.starts_a, cursor);
            let (_, span_b) = run_at(b, &self.starts_b, cursor);
            let segment = 1usize << floor_log2(span_a).max(floor_log2(span_b));
            let segment_end = (cursor + segment).min(total);

            while cursor < segment_end {
                let (pitch_a, rest_a) = run_at(a, &self.starts_a, cursor);
                let (pitch_b, rest_b) = run_at(b, &self.starts_b, cursor);
                let exponent = rhythmic_interpolate(floor_log2(rest_a), floor_log2(rest_b), ratio);
                let duration = prev_power_of_two((1usize << exponent).min(segment_end - cursor));
                self.pitches[cursor] = pitch_interpolate(pitch_a, pitch_b, ratio);
                self.rhythm[cursor] = duration as u16;
                cursor += duration;
            }
        }

        let fitter = if ratio >= 0.5 { b } else { a };
        self.chords.clear();
        self.chords.extend_from_slice(fitter.chords());
    }
}

/// Swap second measure halves between `a` and `b` wherever both allow it.
/// Returns the number of measures swapped.
pub fn crossover(a: &mut Phrase, b: &mut Phrase) -> usize {
    let dims = a.dims();
    if dims != b.dims() {
        return 0;
    }
    let measure_len = dims.measure_len();
    let total = dims.slot_count();
    let mut swapped = 0;
    for measure in 0..dims.num_measures as usize {
        let start = measure * measure_len;
        let mid = start + measure_len / 2;
        let end = start + measure_len;
        if !can_cross(a, start, mid, end, total) || !can_cross(b, start, mid, end, total) {
            continue;
        }
        let (pitches_a, rhythm_a) = a.melody_mut();
        let (pitches_b, rhythm_b) = b.melody_mut();
        pitches_a[mid..end].swap_with_slice(&mut pitches_b[mid..end]);
        rhythm_a[mid..end].swap_with_slice(&mut rhythm_b[mid..end]);
        swapped += 1;
    }
    if swapped > 0 {
        a.refresh_note_count();
        b.refresh_note_count();
    }
    swapped
}

fn can_cross(phrase: &Phrase, start: usize, mid: usize, end: usize, total: usize) -> bool {
    let whole_measure = usize::from(phrase.rhythm()[start]) >= end - start;
    !whole_measure && phrase.is_run_start(mid) && (end == total || phrase.is_run_start(end))
}

/// Weight of parent B in the child: `fB / (fA + fB)`, or 0.5 when the sum
/// is not a positive number.
pub fn interpolation_ratio(fitness_a: f32, fitness_b: f32) -> f32 {
    let sum = fitness_a + fitness_b;
    if !sum.is_finite() || sum <= 0.0 {
        return 0.5;
    }
    (fitness_b / sum).clamp(0.0, 1.0)
}

/// Pick an exponent between `low` and `high` by splitting [0, 1] into one
/// equal bin per exponent and finding the bin holding `alpha`.
pub fn rhythmic_interpolate(low: u32, high: u32, alpha: f32) -> u32 {
    if low == high {
        return low;
    }
    let bins = low.abs_diff(high) + 1;
    let width = 1.0 / bins as f32;
    let step = ((alpha / width).ceil() as i64 - 1).clamp(0, i64::from(bins) - 1) as u32;
    if high > low { low + step } else { low - step }
}

/// Linear pitch blend with the rest majority rule.
pub fn pitch_interpolate(a: u8, b: u8, alpha: f32) -> u8 {
    let (low, high) = (f32::from(a), f32::from(b));
    let value = low + alpha * (high - low);
    if a == REST && b == REST {
        return REST;
    }
    let average = (low + high) / 2.0;
    if a == REST {
        return if value < average { a } else { b };
    }
    if b == REST {
        return if value > average { a } else { b };
    }
    (value.round() as u8).clamp(MIN_PITCH, MAX_PITCH)
}

/// Pitch of the run covering `slot` and the slots left in it from `slot`.
fn run_at(phrase: &Phrase, starts: &[u32], slot: usize) -> (u8, usize) {
    let start = starts[slot] as usize;
    let end = start + usize::from(phrase.rhythm()[start]);
    (phrase.pitches()[start], end - slot)
}

/// For each slot, the slot where its run starts.
fn fill_run_starts(phrase: &Phrase, out: &mut Vec<u32>) {
    out.clear();
    for run in phrase.runs() {
        out.extend(std::iter::repeat_n(run.slot as u32, usize::from(run.duration)));
    }
}

fn floor_log2(value: usize) -> u32 {
    value.max(1).ilog2()
}

fn prev_power_of_two(value: usize) -> usize {
    1 << floor_log2(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{PopulationGenerator, SubdivisionParams};
    use crate::harmony::ChordNumeral;
    use crate::phrase::PhraseDims;
    use genetic_music_prng::EvoRng;

    fn pair_population(
        dims: PhraseDims,
        a: &[(u8, u16)],
        fa: f32,
        b: &[(u8, u16)],
        fb: f32,
    ) -> (Population, BreedingPair) {
        let mut pop = Population::new(2, dims);
        let mut handles = Vec::new();
        for (runs, f) in [(a, fa), (b, fb)] {
            let h = pop.allocate_parent().unwrap();
            let phrase = pop.phrase_mut(h).unwrap();
            phrase.set_runs(runs).unwrap();
            phrase.set_fitness(f);
            handles.push(h);
        }
        let pair = BreedingPair {
            first: handles[0],
            second: handles[1],
        };
        (pop, pair)
    }

    fn sounding_line(phrase: &Phrase) -> Vec<u8> {
        let mut line = Vec::new();
        for run in phrase.runs() {
            line.extend(std::iter::repeat_n(run.pitch, usize::from(run.duration)));
        }
        line
    }

    #[test]
    fn ratio_weights_parent_b() {
        assert_eq!(interpolation_ratio(0.0, 1.0), 1.0);
        assert_eq!(interpolation_ratio(1.0, 0.0), 0.0);
        assert_eq!(interpolation_ratio(0.25, 0.75), 0.75);
        assert_eq!(interpolation_ratio(0.0, 0.0), 0.5);
        assert_eq!(interpolation_ratio(f32::NAN, 0.5), 0.5);
    }

    #[test]
    fn rhythmic_interpolation_hits_endpoints() {
        assert_eq!(rhythmic_interpolate(1, 4, 0.0), 1);
        assert_eq!(rhythmic_interpolate(1, 4, 1.0), 4);
        assert_eq!(rhythmic_interpolate(4, 1, 0.0), 4);
        assert_eq!(rhythmic_interpolate(4, 1, 1.0), 1);
        // Four bins of 0.25: 0.6 falls in the third.
        assert_eq!(rhythmic_interpolate(1, 4, 0.6), 3);
        assert_eq!(rhythmic_interpolate(2, 2, 0.3), 2);
    }

    #[test]
    fn pitch_interpolation_and_rests() {
        assert_eq!(pitch_interpolate(60, 72, 0.5), 66);
        assert_eq!(pitch_interpolate(60, 72, 0.0), 60);
        assert_eq!(pitch_interpolate(60, 72, 1.0), 72);
        assert_eq!(pitch_interpolate(REST, 60, 0.2), REST);
        assert_eq!(pitch_interpolate(REST, 60, 0.8), 60);
        assert_eq!(pitch_interpolate(60, REST, 0.2), 60);
        assert_eq!(pitch_interpolate(60, REST, 0.8), REST);
        assert_eq!(pitch_interpolate(REST, REST, 0.5), REST);
    }

    #[test]
    fn whole_phrase_notes_interpolate_to_fitter_parent() {
        let dims = PhraseDims::new(4, 16).unwrap();
        let (mut pop, pair) = pair_population(dims, &[(48, 64)], 0.0, &[(72, 64)], 1.0);
        let mut breeder = Breeder::new(BreedingPolicy::Interpolate);
        let BreedOutcome::Child(child) = breeder.breed(pair, &mut pop).unwrap() else {
            panic!("interpolation must produce a child");
        };
        let phrase = pop.phrase(child).unwrap();
        phrase.validate().unwrap();
        let runs: Vec<_> = phrase.runs().collect();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].pitch, 72);
        assert_eq!(runs[0].duration, 64);
        assert_eq!(pop.children(), &[child]);
    }

    #[test]
    fn zero_and_one_ratios_reproduce_sounding_lines() {
        let dims = PhraseDims::new(2, 16).unwrap();
        let a: &[(u8, u16)] = &[(60, 8), (62, 8), (64, 4), (REST, 4), (65, 8)];
        let b: &[(u8, u16)] = &[(70, 4), (71, 8), (72, 4), (73, 16)];
        let mut breeder = Breeder::new(BreedingPolicy::Interpolate);

        let (mut pop, pair) = pair_population(dims, a, 0.0, b, 1.0);
        let BreedOutcome::Child(child) = breeder.breed(pair, &mut pop).unwrap() else {
            panic!("expected child");
        };
        let expected = sounding_line(pop.phrase(pair.second).unwrap());
        assert_eq!(sounding_line(pop.phrase(child).unwrap()), expected);

        let (mut pop, pair) = pair_population(dims, a, 1.0, b, 0.0);
        let BreedOutcome::Child(child) = breeder.breed(pair, &mut pop).unwrap() else {
            panic!("expected child");
        };
        let expected = sounding_line(pop.phrase(pair.first).unwrap());
        assert_eq!(sounding_line(pop.phrase(child).unwrap()), expected);
    }

    #[test]
    fn interpolated_children_are_valid_for_random_parents() {
        let dims = PhraseDims::new(4, 16).unwrap();
        let mut breeder = Breeder::new(BreedingPolicy::Interpolate);
        let mut rng = EvoRng::new(99);
        for seed in 0..20 {
            let mut generator = PopulationGenerator::new(
                4,
                dims,
                SubdivisionParams::default(),
                EvoRng::new(seed),
            )
            .unwrap();
            let mut pop = generator.generate().unwrap();
            let parents = pop.parents().to_vec();
            for &h in &parents {
                pop.phrase_mut(h).unwrap().set_fitness(rng.next_f32());
            }
            for i in 0..4 {
                let pair = BreedingPair {
                    first: parents[i],
                    second: parents[(i + 1) % 4],
                };
                let BreedOutcome::Child(child) = breeder.breed(pair, &mut pop).unwrap() else {
                    panic!("expected child");
                };
                let phrase = pop.phrase(child).unwrap();
                phrase.validate().unwrap();
                for run in phrase.runs() {
                    assert!(run.duration.is_power_of_two(), "duration {}", run.duration);
                }
            }
        }
    }

    #[test]
    fn child_harmony_comes_from_fitter_parent() {
        let dims = PhraseDims::new(1, 16).unwrap();
        let (mut pop, pair) = pair_population(dims, &[(60, 16)], 0.2, &[(64, 16)], 0.8);
        let five = Chord::major(ChordNumeral::V);
        pop.phrase_mut(pair.second).unwrap().chords_mut().fill(five);
        let mut breeder = Breeder::new(BreedingPolicy::Interpolate);
        let BreedOutcome::Child(child) = breeder.breed(pair, &mut pop).unwrap() else {
            panic!("expected child");
        };
        assert!(pop.phrase(child).unwrap().chords().iter().all(|&c| c == five));
    }

    #[test]
    fn crossover_swaps_eligible_measure_halves() {
        let dims = PhraseDims::new(2, 16).unwrap();
        let (mut pop, pair) = pair_population(
            dims,
            &[(60, 8), (62, 8), (64, 16)],
            0.5,
            &[(70, 4), (71, 4), (72, 8), (73, 8), (74, 8)],
            0.5,
        );
        let mut breeder = Breeder::new(BreedingPolicy::Crossover);
        let outcome = breeder.breed(pair, &mut pop).unwrap();
        assert_eq!(outcome, BreedOutcome::InPlace { measures_swapped: 1 });

        let a = pop.phrase(pair.first).unwrap();
        let b = pop.phrase(pair.second).unwrap();
        let a_runs: Vec<_> = a.runs().map(|r| (r.pitch, r.duration)).collect();
        let b_runs: Vec<_> = b.runs().map(|r| (r.pitch, r.duration)).collect();
        assert_eq!(a_runs, vec![(60, 8), (72, 8), (64, 16)]);
        assert_eq!(b_runs, vec![(70, 4), (71, 4), (62, 8), (73, 8), (74, 8)]);
        assert_eq!(a.note_count(), 3);
        assert_eq!(b.note_count(), 5);
        assert!(pop.children().is_empty());
    }

    #[test]
    fn crossover_skips_measures_without_shared_midpoint() {
        let dims = PhraseDims::new(1, 16).unwrap();
        let (mut pop, pair) =
            pair_population(dims, &[(60, 4), (62, 12)], 0.5, &[(70, 8), (72, 8)], 0.5);
        let mut breeder = Breeder::new(BreedingPolicy::Crossover);
        let outcome = breeder.breed(pair, &mut pop).unwrap();
        assert_eq!(outcome, BreedOutcome::InPlace { measures_swapped: 0 });
    }

    #[test]
    fn crossover_with_itself_is_a_no_op() {
        let dims = PhraseDims::new(1, 16).unwrap();
        let (mut pop, pair) = pair_population(dims, &[(60, 8), (62, 8)], 0.5, &[(70, 16)], 0.5);
        let before = pop.phrase(pair.first).unwrap().clone();
        let same = BreedingPair {
            first: pair.first,
            second: pair.first,
        };
        let mut breeder = Breeder::new(BreedingPolicy::Crossover);
        let outcome = breeder.breed(same, &mut pop).unwrap();
        assert_eq!(outcome, BreedOutcome::InPlace { measures_swapped: 0 });
        assert_eq!(pop.phrase(pair.first).unwrap(), &before);
    }
}
