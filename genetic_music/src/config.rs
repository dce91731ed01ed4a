// Run configuration.
//
// Everything that shapes an evolutionary run lives in `EvolutionConfig`:
// population size, phrase shape, generation count, seed, the three policy
// choices and the tuning tables for generation and mutation. It is plain
// serde data so a run can be described by a JSON file and reproduced
// exactly; missing fields take their defaults.
//
// `Meter` carries playback-only settings (tempo and time signature) used by
// MIDI export and the synthesizer. It has no effect on evolution.

use crate::breeding::BreedingPolicy;
use crate::error::GaError;
use crate::generator::SubdivisionParams;
use crate::mutation::MutationWeights;
use crate::phrase::PhraseDims;
use crate::population::PruningPolicy;
use crate::selection::SelectionPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Slowest tempo whose quarter note still fits a MIDI tempo event.
pub const MIN_TEMPO_BPM: u16 = 4;
pub const MAX_TEMPO_BPM: u16 = 1000;

/// Tempo and time signature for playback. Chord blocks and slot timing
/// assume four quarter-note beats per measure, so only 4/4 is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Meter {
    /// Beats per minute.
    pub tempo_bpm: u16,
    pub beats_per_bar: u8,
    /// Note value of one beat (4 = quarter note).
    pub beat_unit: u8,
}

impl Default for Meter {
    fn default() -> Self {
        Meter {
            tempo_bpm: 80,
            beats_per_bar: 4,
            beat_unit: 4,
        }
    }
}

impl Meter {
    pub fn validate(&self) -> Result<(), GaError> {
        if !(MIN_TEMPO_BPM..=MAX_TEMPO_BPM).contains(&self.tempo_bpm) {
            return Err(GaError::Config(format!(
                "tempo {} is outside {MIN_TEMPO_BPM}..={MAX_TEMPO_BPM} bpm",
                self.tempo_bpm
            )));
        }
        if u32::from(self.beats_per_bar) != PhraseDims::BEATS_PER_MEASURE || self.beat_unit != 4 {
            return Err(GaError::Config(format!(
                "time signature {}/{} is not supported, phrases are in 4/4",
                self.beats_per_bar, self.beat_unit
            )));
        }
        Ok(())
    }

    /// Seconds occupied by one slot of a measure cut into `subdivision`
    /// slots, where a measure is one whole note.
    pub fn seconds_per_slot(&self, subdivision: u32) -> f64 {
        let seconds_per_beat = 60.0 / f64::from(self.tempo_bpm);
        seconds_per_beat * f64::from(self.beat_unit) / f64::from(subdivision)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub population_size: usize,
    pub dims: PhraseDims,
    pub generations: u32,
    pub seed: u64,
    pub selection: SelectionPolicy,
    pub breeding: BreedingPolicy,
    pub pruning: PruningPolicy,
    pub mutation_weights: MutationWeights,
    pub subdivision: SubdivisionParams,
    pub meter: Meter,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        EvolutionConfig {
            population_size: 8,
            dims: PhraseDims::default(),
            generations: 10,
            seed: 0x6d75_7369_63,
            selection: SelectionPolicy::default(),
            breeding: BreedingPolicy::default(),
            pruning: PruningPolicy::default(),
            mutation_weights: MutationWeights::default(),
            subdivision: SubdivisionParams::default(),
            meter: Meter::default(),
        }
    }
}

impl EvolutionConfig {
    pub fn validate(&self) -> Result<(), GaError> {
        self.dims.validate()?;
        self.meter.validate()?;
        if self.population_size < 2 {
            return Err(GaError::Config(format!(
                "population size {} is too small to breed",
                self.population_size
            )));
        }
        if self.mutation_weights.total() == 0 {
            return Err(GaError::Config("mutation weights are all zero".into()));
        }
        if let SelectionPolicy::Tournament {
            possible_parents: 0,
            ..
        }
        | SelectionPolicy::Tournament { rounds: 0, .. } = self.selection
        {
            return Err(GaError::Config(
                "tournament size and rounds must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, GaError> {
        let config: EvolutionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, GaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, GaError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), GaError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EvolutionConfig::default();
        config.validate().unwrap();
        assert_eq!(config.population_size, 8);
        assert_eq!(config.breeding, BreedingPolicy::Interpolate);
        assert_eq!(config.pruning, PruningPolicy::Generational);
        assert_eq!(config.selection, SelectionPolicy::Roulette);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = EvolutionConfig::from_json(
            r#"{"population_size": 12, "pruning": "elitist",
                "selection": {"policy": "tournament", "possible_parents": 3, "rounds": 2}}"#,
        )
        .unwrap();
        assert_eq!(config.population_size, 12);
        assert_eq!(config.pruning, PruningPolicy::Elitist);
        assert_eq!(
            config.selection,
            SelectionPolicy::Tournament {
                possible_parents: 3,
                rounds: 2
            }
        );
        assert_eq!(config.dims, PhraseDims::default());
        assert_eq!(config.mutation_weights, MutationWeights::default());
    }

    #[test]
    fn invalid_json_configs_are_rejected() {
        assert!(EvolutionConfig::from_json(r#"{"population_size": 1}"#).is_err());
        assert!(
            EvolutionConfig::from_json(r#"{"dims": {"num_measures": 4, "subdivision": 10}}"#)
                .is_err()
        );
        assert!(EvolutionConfig::from_json(r#"{"meter": {"tempo_bpm": 0}}"#).is_err());
        assert!(EvolutionConfig::from_json("not json").is_err());
    }

    #[test]
    fn only_common_time_at_playable_tempi() {
        assert!(Meter::default().validate().is_ok());
        let waltz = Meter {
            beats_per_bar: 3,
            ..Meter::default()
        };
        assert!(waltz.validate().is_err());
        let eighths = Meter {
            beat_unit: 8,
            ..Meter::default()
        };
        assert!(eighths.validate().is_err());
        for tempo_bpm in [MIN_TEMPO_BPM - 1, MAX_TEMPO_BPM + 1] {
            let meter = Meter {
                tempo_bpm,
                ..Meter::default()
            };
            assert!(meter.validate().is_err(), "{tempo_bpm}");
        }
        assert!(EvolutionConfig::from_json(r#"{"meter": {"beats_per_bar": 3}}"#).is_err());
    }

    #[test]
    fn json_round_trip() {
        let config = EvolutionConfig {
            seed: 42,
            breeding: BreedingPolicy::Crossover,
            ..EvolutionConfig::default()
        };
        let back = EvolutionConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn slot_duration_at_default_tempo() {
        let meter = Meter::default();
        // 80 bpm quarter notes: a 16th is 0.1875 s.
        assert!((meter.seconds_per_slot(16) - 0.1875).abs() < 1e-12);
    }
}
