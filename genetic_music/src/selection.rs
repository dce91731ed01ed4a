// Parent selection.
//
// Two strategies pick a breeding pair from the current parents:
//
// Roulette: one uniform draw `p` in [0, 1) yields two anti-correlated spin
// points, `p * total` and `((p + 0.5) mod 1) * total`, where `total` is the
// summed parent fitness. Each point walks the cumulative fitness and stops at
// the first parent where the running remainder crosses zero. Nothing forces
// the two picks apart; a dominant parent can be chosen twice.
//
// Tournament: sample `possible_parents` candidates uniformly with
// replacement and keep the fittest. With `rounds > 1` the winner is the best
// of that many independent tournaments. The second parent is re-drawn until
// it differs from the first, with a retry cap and a deterministic fallback.
//
// A population whose fitness cannot drive a roulette wheel (zero, negative or
// NaN total) falls back to the fittest and least fit parents.

use crate::error::GaError;
use crate::population::{Population, by_fitness_desc};
use crate::pool::PhraseHandle;
use genetic_music_prng::EvoRng;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Re-draws allowed when a tournament keeps producing the first parent.
const MAX_TOURNAMENT_RETRIES: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SelectionPolicy {
    #[default]
    Roulette,
    Tournament {
        /// Candidates drawn per tournament.
        possible_parents: u32,
        /// Tournaments whose winners compete for each pick.
        rounds: u32,
    },
}

impl SelectionPolicy {
    pub fn tournament() -> Self {
        SelectionPolicy::Tournament {
            possible_parents: 2,
            rounds: 1,
        }
    }
}

/// Two parents chosen to breed. They may be the same phrase under roulette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreedingPair {
    pub first: PhraseHandle,
    pub second: PhraseHandle,
}

pub struct Selector {
    policy: SelectionPolicy,
    rng: EvoRng,
}

impl Selector {
    pub fn new(policy: SelectionPolicy, rng: EvoRng) -> Self {
        Selector { policy, rng }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    pub fn select(&mut self, population: &Population) -> Result<BreedingPair, GaError> {
        let parents = population.parents();
        let fitness = population.parent_fitness();
        let (a, b) = match self.policy {
            SelectionPolicy::Roulette => {
                if fitness.is_empty() {
                    return Err(GaError::SelectionDegenerate(
                        "no parents to select from".into(),
                    ));
                }
                let p = self.rng.next_f32();
                roulette_pick(&fitness, p).unwrap_or_else(|| {
                    warn!("roulette wheel has no usable fitness; picking best and worst parents");
                    extremes(&fitness)
                })
            }
            SelectionPolicy::Tournament {
                possible_parents,
                rounds,
            } => {
                if fitness.len() < 2 {
                    return Err(GaError::SelectionDegenerate(format!(
                        "tournament needs two parents, population has {}",
                        fitness.len()
                    )));
                }
                let size = possible_parents.max(1);
                let rounds = rounds.max(1);
                let first = self.best_of_rounds(&fitness, size, rounds);
                let mut second = first;
                for _ in 0..MAX_TOURNAMENT_RETRIES {
                    second = self.best_of_rounds(&fitness, size, rounds);
                    if second != first {
                        break;
                    }
                }
                if second == first {
                    warn!("tournament kept choosing parent {first}; using next best");
                    second = best_excluding(&fitness, first);
                }
                (first, second)
            }
        };
        debug!("selected parents {} and {}", a + 1, b + 1);
        Ok(BreedingPair {
            first: parents[a],
            second: parents[b],
        })
    }

    fn best_of_rounds(&mut self, fitness: &[f32], size: u32, rounds: u32) -> usize {
        let mut winner = run_tournament(fitness, size, &mut self.rng);
        for _ in 1..rounds {
            let challenger = run_tournament(fitness, size, &mut self.rng);
            if fitness[challenger] > fitness[winner] {
                winner = challenger;
            }
        }
        winner
    }
}

/// Spin the wheel for both parents from a single draw `p` in [0, 1).
///
/// Returns `None` when the wheel is unusable (total fitness not a positive
/// finite number).
pub fn roulette_pick(fitness: &[f32], p: f32) -> Option<(usize, usize)> {
    let total: f32 = fitness.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return None;
    }
    let spin = |point: f32| {
        let mut remainder = point;
        for (i, &f) in fitness.iter().enumerate() {
            remainder -= f;
            if remainder <= 0.0 {
                return i;
            }
        }
        // Rounding left a sliver past the last parent.
        fitness.len() - 1
    };
    let first = spin(p * total);
    let second = spin(((p + 0.5) % 1.0) * total);
    Some((first, second))
}

fn run_tournament(fitness: &[f32], size: u32, rng: &mut EvoRng) -> usize {
    let mut best = rng.range_usize(0, fitness.len());
    for _ in 1..size {
        let candidate = rng.range_usize(0, fitness.len());
        if fitness[candidate] > fitness[best] {
            best = candidate;
        }
    }
    best
}

/// Indices of the fittest and least fit parents (first and last in a
/// stable descending sort).
fn extremes(fitness: &[f32]) -> (usize, usize) {
    let mut order: Vec<usize> = (0..fitness.len()).collect();
    order.sort_by(|&a, &b| by_fitness_desc(fitness[a], fitness[b]));
    (order[0], order[order.len() - 1])
}

fn best_excluding(fitness: &[f32], excluded: usize) -> usize {
    let mut order: Vec<usize> = (0..fitness.len()).filter(|&i| i != excluded).collect();
    order.sort_by(|&a, &b| by_fitness_desc(fitness[a], fitness[b]));
    order[0]
}
