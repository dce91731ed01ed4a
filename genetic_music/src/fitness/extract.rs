// Feature extraction and automatic scoring.
//
// Each rule kind reads one integer stream from a phrase:
//
//   Pitch     one value per run, the run's pitch (rests read as 0)
//   Rhythm    one value per run, its duration in slots
//   Interval  signed semitones between consecutive sounding notes
//   Chord     per sounding note, semitones above the governing chord's root
//             folded into the octave below the note (0..=11)
//   Measure   per measure, the number of sounding note onsets
//
// A rule's score is the mean of its curve over the stream. The phrase score
// is the weight-normalized average of all rule scores, clamped into
// [FITNESS_EPSILON, 1] so that no phrase ever falls off the roulette wheel.

use super::clamp_fitness;
use super::rules::{RuleKind, RuleSet};
use crate::phrase::Phrase;

/// Fill `out` with the feature stream `kind` reads from `phrase`.
pub fn extract(kind: RuleKind, phrase: &Phrase, out: &mut Vec<i32>) {
    out.clear();
    match kind {
        RuleKind::Pitch => out.extend(phrase.runs().map(|r| i32::from(r.pitch))),
        RuleKind::Rhythm => out.extend(phrase.runs().map(|r| i32::from(r.duration))),
        RuleKind::Interval => {
            let mut previous: Option<i32> = None;
            for run in phrase.sounding_runs() {
                let pitch = i32::from(run.pitch);
                if let Some(prev) = previous {
                    out.push(pitch - prev);
                }
                previous = Some(pitch);
            }
        }
        RuleKind::Chord => out.extend(phrase.sounding_runs().map(|r| {
            let root = phrase.chord_at(r.slot).root_below(r.pitch);
            i32::from(r.pitch) - i32::from(root)
        })),
        RuleKind::Measure => {
            let dims = phrase.dims();
            out.resize(dims.num_measures as usize, 0);
            for run in phrase.sounding_runs() {
                out[run.slot / dims.measure_len()] += 1;
            }
        }
    }
}

/// Per-kind contribution to a phrase's score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KindScore {
    pub kind: RuleKind,
    /// Weighted mean over this kind's rules.
    pub score: f32,
    /// Sum of this kind's rule weights.
    pub weight: f32,
}

/// Scores phrases against a `RuleSet`.
#[derive(Debug, Clone, Default)]
pub struct FitnessExtractor {
    rules: RuleSet,
}

impl FitnessExtractor {
    pub fn new(rules: RuleSet) -> Self {
        FitnessExtractor { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn rules_mut(&mut self) -> &mut RuleSet {
        &mut self.rules
    }

    /// Score of each rule kind that has at least one rule.
    pub fn breakdown(&self, phrase: &Phrase) -> Vec<KindScore> {
        let mut stream = Vec::with_capacity(phrase.dims().slot_count());
        let mut scores = Vec::with_capacity(RuleKind::ALL.len());
        for kind in RuleKind::ALL {
            let mut rules = self.rules.rules_of(kind).peekable();
            if rules.peek().is_none() {
                continue;
            }
            extract(kind, phrase, &mut stream);
            let mut weighted = 0.0;
            let mut weight = 0.0;
            for rule in rules {
                weighted += rule.weight * self.rules.score_stream(rule, &stream);
                weight += rule.weight;
            }
            let score = if weight > 0.0 { weighted / weight } else { 0.0 };
            scores.push(KindScore {
                kind,
                score,
                weight,
            });
        }
        scores
    }

    /// Overall fitness in [FITNESS_EPSILON, 1].
    pub fn score(&self, phrase: &Phrase) -> f32 {
        let mut weighted = 0.0;
        let mut weight = 0.0;
        for part in self.breakdown(phrase) {
            weighted += part.score * part.weight;
            weight += part.weight;
        }
        let raw = if weight > 0.0 { weighted / weight } else { 0.0 };
        clamp_fitness(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitness::FITNESS_EPSILON;
    use crate::fitness::function::PiecewiseLinear;
    use crate::harmony::{Chord, ChordNumeral};
    use crate::phrase::{PhraseDims, REST};

    fn phrase(runs: &[(u8, u16)]) -> Phrase {
        let mut p = Phrase::blank(PhraseDims::new(2, 8).unwrap());
        p.set_runs(runs).unwrap();
        p
    }

    fn stream(kind: RuleKind, p: &Phrase) -> Vec<i32> {
        let mut out = vec![99];
        extract(kind, p, &mut out);
        out
    }

    #[test]
    fn streams_follow_runs() {
        let p = phrase(&[(60, 2), (REST, 2), (64, 4), (59, 4), (67, 4)]);
        assert_eq!(stream(RuleKind::Pitch, &p), vec![60, 0, 64, 59, 67]);
        assert_eq!(stream(RuleKind::Rhythm, &p), vec![2, 2, 4, 4, 4]);
        assert_eq!(stream(RuleKind::Interval, &p), vec![4, -5, 8]);
        assert_eq!(stream(RuleKind::Measure, &p), vec![2, 2]);
    }

    #[test]
    fn chord_stream_measures_from_root_below() {
        let mut p = phrase(&[(60, 2), (REST, 2), (64, 4), (59, 4), (67, 4)]);
        // Chord blocks are 2 slots: slot 8 lies in block 4.
        p.chords_mut()[4] = Chord::major(ChordNumeral::V);
        assert_eq!(stream(RuleKind::Chord, &p), vec![0, 4, 4, 7]);
    }

    #[test]
    fn no_rules_scores_epsilon() {
        let extractor = FitnessExtractor::new(RuleSet::new());
        let p = phrase(&[(60, 16)]);
        assert_eq!(extractor.score(&p), FITNESS_EPSILON);
        assert!(extractor.breakdown(&p).is_empty());
    }

    #[test]
    fn weights_normalize_across_rules() {
        let mut rules = RuleSet::new();
        let high = rules.create_function("always one");
        for x in [0, 200] {
            rules.function_mut(high).unwrap().add_vertex(x, 1.0);
        }
        let low = rules.create_function("always zero");
        *rules.function_mut(low).unwrap() =
            PiecewiseLinear::from_vertices("always zero", [(-200, 0.0), (200, 0.0)]);

        let a = rules.create_rule(RuleKind::Pitch, high).unwrap();
        let b = rules.create_rule(RuleKind::Rhythm, low).unwrap();
        rules.set_rule_weight(a, 0.75).unwrap();
        rules.set_rule_weight(b, 0.25).unwrap();
        let extractor = FitnessExtractor::new(rules);

        let p = phrase(&[(60, 8), (62, 8)]);
        assert!((extractor.score(&p) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn default_rules_score_in_unit_range() {
        let extractor = FitnessExtractor::new(RuleSet::default_rules());
        let smooth = phrase(&[(60, 4), (62, 4), (64, 4), (65, 4)]);
        let jagged = phrase(&[(21, 1), (108, 1), (21, 14)]);
        let s = extractor.score(&smooth);
        let j = extractor.score(&jagged);
        assert!((FITNESS_EPSILON..=1.0).contains(&s));
        assert!((FITNESS_EPSILON..=1.0).contains(&j));
        assert!(s > j, "smooth {s} should beat jagged {j}");
    }
}
