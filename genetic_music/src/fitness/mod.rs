// Fitness evaluation.
//
// `FitnessEvaluator` is the seam between the evolution loop and whatever
// decides how good a phrase is. Two implementations ship:
//
// - `AutomaticFitness` scores against a rule set (see `extract.rs`). Batch
//   scoring fans out across threads with rayon since phrases are scored
//   independently and the rule set is read-only.
// - `ManualFitness` asks a `Rater` (a person, in the CLI) for a good/bad
//   verdict and averages it into the phrase's previous fitness.
//
// Submodules:
// - `function.rs`: piecewise-linear curves
// - `rules.rs`:    the function/rule database and its JSON form
// - `extract.rs`:  per-kind feature streams and the aggregate score

pub mod extract;
pub mod function;
pub mod rules;

use crate::error::GaError;
use crate::phrase::Phrase;
use crate::population::Population;
use log::{debug, warn};
use rayon::prelude::*;

pub use extract::FitnessExtractor;
pub use rules::{RuleKind, RuleSet};

/// Floor applied to every fitness so no phrase gets a zero-width slice of
/// the roulette wheel.
pub const FITNESS_EPSILON: f32 = 0.001;

/// Clamp a raw score into [FITNESS_EPSILON, 1]. NaN maps to the floor.
pub fn clamp_fitness(raw: f32) -> f32 {
    if raw.is_nan() {
        warn!("fitness evaluated to NaN; using {FITNESS_EPSILON}");
        return FITNESS_EPSILON;
    }
    raw.clamp(FITNESS_EPSILON, 1.0)
}

pub trait FitnessEvaluator {
    /// Fitness of one phrase, in [FITNESS_EPSILON, 1].
    fn evaluate(&mut self, phrase: &Phrase) -> f32;

    /// Fitness of many phrases, in order.
    fn evaluate_batch(&mut self, phrases: &[&Phrase]) -> Vec<f32> {
        phrases.iter().map(|p| self.evaluate(p)).collect()
    }
}

/// Rule-based scoring.
#[derive(Debug, Clone, Default)]
pub struct AutomaticFitness {
    extractor: FitnessExtractor,
}

impl AutomaticFitness {
    pub fn new(rules: RuleSet) -> Self {
        AutomaticFitness {
            extractor: FitnessExtractor::new(rules),
        }
    }

    pub fn extractor(&self) -> &FitnessExtractor {
        &self.extractor
    }
}

impl FitnessEvaluator for AutomaticFitness {
    fn evaluate(&mut self, phrase: &Phrase) -> f32 {
        self.extractor.score(phrase)
    }

    fn evaluate_batch(&mut self, phrases: &[&Phrase]) -> Vec<f32> {
        let extractor = &self.extractor;
        phrases.par_iter().map(|p| extractor.score(p)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rating {
    Good,
    Bad,
}

/// Source of human judgements.
pub trait Rater {
    fn rate(&mut self, phrase: &Phrase) -> Rating;
}

impl<F: FnMut(&Phrase) -> Rating> Rater for F {
    fn rate(&mut self, phrase: &Phrase) -> Rating {
        self(phrase)
    }
}

/// Interactive scoring: the new fitness is the mean of the old fitness and
/// the verdict (1 for good, 0 for bad).
pub struct ManualFitness<R> {
    rater: R,
}

impl<R: Rater> ManualFitness<R> {
    pub fn new(rater: R) -> Self {
        ManualFitness { rater }
    }
}

impl<R: Rater> FitnessEvaluator for ManualFitness<R> {
    fn evaluate(&mut self, phrase: &Phrase) -> f32 {
        let approval = match self.rater.rate(phrase) {
            Rating::Good => 1.0,
            Rating::Bad => 0.0,
        };
        clamp_fitness((phrase.fitness() + approval) / 2.0)
    }
}

/// Re-score every parent and store the results.
pub fn assess_population<E: FitnessEvaluator + ?Sized>(
    population: &mut Population,
    evaluator: &mut E,
) -> Result<(), GaError> {
    let handles = population.parents().to_vec();
    let scores = {
        let phrases = handles
            .iter()
            .map(|&h| population.phrase(h))
            .collect::<Result<Vec<_>, _>>()?;
        evaluator.evaluate_batch(&phrases)
    };
    for (&handle, score) in handles.iter().zip(scores) {
        population.phrase_mut(handle)?.set_fitness(score);
    }
    debug!("assessed {} parents", handles.len());
    Ok(())
}
