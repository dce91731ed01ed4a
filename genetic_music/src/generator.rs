// Random initial population.
//
// Each phrase is built measure by measure. A measure's rhythm comes from a
// recursive density-driven split: at layer 0 the whole measure is one
// candidate note; with probability `1 - density` it is cut in half and each
// half is considered again at the next layer. Densities grow with depth
// (times `layer_multiplier` for the first half, times `layer_multiplier +
// sibling_bonus` for the second), so deep splits get progressively less
// likely and second halves are busier than first halves. Splitting stops at
// single slots.
//
// Pitches are uniform over the playable range. Harmony is the fixed template
// I-IV-V-I laid over the four beats of every measure.

use crate::error::GaError;
use crate::harmony::{Chord, TEMPLATE_PROGRESSION};
use crate::phrase::{MAX_PITCH, MIN_PITCH, Phrase, PhraseDims};
use crate::population::Population;
use genetic_music_prng::EvoRng;
use serde::{Deserialize, Serialize};

/// Tuning for the recursive rhythm split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubdivisionParams {
    /// Probability of keeping the whole measure as one note.
    pub base_density: f32,
    /// Density growth per layer for the first half.
    pub layer_multiplier: f32,
    /// Extra growth applied to the second half.
    pub sibling_bonus: f32,
}

impl Default for SubdivisionParams {
    fn default() -> Self {
        SubdivisionParams {
            base_density: 0.15,
            layer_multiplier: 1.55,
            sibling_bonus: 0.2,
        }
    }
}

pub struct PopulationGenerator {
    population_size: usize,
    dims: PhraseDims,
    params: SubdivisionParams,
    rng: EvoRng,
    runs: Vec<(u8, u16)>,
}

impl PopulationGenerator {
    pub fn new(
        population_size: usize,
        dims: PhraseDims,
        params: SubdivisionParams,
        rng: EvoRng,
    ) -> Result<Self, GaError> {
        dims.validate()?;
        if population_size < 2 {
            return Err(GaError::Config(format!(
                "population size {population_size} is too small to breed"
            )));
        }
        Ok(PopulationGenerator {
            population_size,
            dims,
            params,
            rng,
            runs: Vec::with_capacity(dims.slot_count()),
        })
    }

    /// Build a fresh population with every phrase filled and validated.
    pub fn generate(&mut self) -> Result<Population, GaError> {
        let mut population = Population::new(self.population_size, self.dims);
        for _ in 0..self.population_size {
            let handle = population.allocate_parent()?;
            self.fill_phrase(population.phrase_mut(handle)?)?;
        }
        Ok(population)
    }

    /// Overwrite a phrase with a random melody and the template harmony.
    pub fn fill_phrase(&mut self, phrase: &mut Phrase) -> Result<(), GaError> {
        self.runs.clear();
        let measure_len = self.dims.measure_len();
        for _ in 0..self.dims.num_measures {
            self.split(measure_len, 0, self.params.base_density);
        }
        for run in &mut self.runs {
            run.0 = self.rng.range_u8_inclusive(MIN_PITCH, MAX_PITCH);
        }
        phrase.set_runs(&self.runs)?;

        for (i, chord) in phrase.chords_mut().iter_mut().enumerate() {
            *chord = Chord::major(TEMPLATE_PROGRESSION[i % TEMPLATE_PROGRESSION.len()]);
        }
        Ok(())
    }

    fn split(&mut self, measure_len: usize, layer: u32, density: f32) {
        let length = measure_len >> layer;
        let roll = self.rng.next_f32();
        if roll > density && length > 1 {
            let multiplier = self.params.layer_multiplier;
            self.split(measure_len, layer + 1, density * multiplier);
            self.split(
                measure_len,
                layer + 1,
                density * (multiplier + self.params.sibling_bonus),
            );
        } else {
            self.runs.push((0, length as u16));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harmony::ChordNumeral;

    fn generator(size: usize, seed: u64) -> PopulationGenerator {
        PopulationGenerator::new(
            size,
            PhraseDims::new(4, 16).unwrap(),
            SubdivisionParams::default(),
            EvoRng::new(seed),
        )
        .unwrap()
    }

    #[test]
    fn every_generated_phrase_is_valid() {
        let mut g = generator(16, 3);
        let pop = g.generate().unwrap();
        assert_eq!(pop.parents().len(), 16);
        assert_eq!(pop.pool().capacity(), 33);
        for phrase in pop.parent_phrases() {
            phrase.validate().unwrap();
            assert!(phrase.note_count() >= 4);
            for run in phrase.runs() {
                assert!((MIN_PITCH..=MAX_PITCH).contains(&run.pitch));
                assert!(run.duration.is_power_of_two());
                assert!(usize::from(run.duration) <= 16);
                // Runs never cross a bar line.
                assert_eq!(run.slot / 16, (run.end() - 1) / 16);
            }
        }
    }

    #[test]
    fn harmony_follows_template() {
        let mut g = generator(2, 9);
        let pop = g.generate().unwrap();
        let phrase = pop.parent_phrases().next().unwrap();
        let numerals: Vec<_> = phrase.chords().iter().map(|c| c.numeral).collect();
        assert_eq!(numerals.len(), 16);
        for measure in numerals.chunks(4) {
            assert_eq!(
                measure,
                [ChordNumeral::I, ChordNumeral::IV, ChordNumeral::V, ChordNumeral::I]
            );
        }
    }

    #[test]
    fn same_seed_same_population() {
        let a = generator(4, 77).generate().unwrap();
        let b = generator(4, 77).generate().unwrap();
        let left: Vec<_> = a.parent_phrases().map(|p| p.rhythm().to_vec()).collect();
        let right: Vec<_> = b.parent_phrases().map(|p| p.rhythm().to_vec()).collect();
        assert_eq!(left, right);
    }

    #[test]
    fn zero_density_splits_to_single_slots() {
        let mut g = PopulationGenerator::new(
            2,
            PhraseDims::new(1, 8).unwrap(),
            SubdivisionParams {
                base_density: -1.0,
                layer_multiplier: 1.0,
                sibling_bonus: 0.0,
            },
            EvoRng::new(1),
        )
        .unwrap();
        let pop = g.generate().unwrap();
        for phrase in pop.parent_phrases() {
            assert_eq!(phrase.note_count(), 8);
        }
    }

    #[test]
    fn rejects_tiny_population() {
        assert!(
            PopulationGenerator::new(
                1,
                PhraseDims::default(),
                SubdivisionParams::default(),
                EvoRng::new(0)
            )
            .is_err()
        );
    }
}
