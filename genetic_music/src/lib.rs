// Genetic Music
//
// Evolves short monophonic melodic phrases with a genetic algorithm. A
// population of random phrases is generated, scored against a table of
// piecewise-linear preference curves (or by a listener), and bred, mutated
// and pruned generation after generation. The fittest phrase can be written
// out as MIDI or rendered to a WAV preview.
//
// Architecture:
// - phrase.rs: The genome (run-length pitch and rhythm arrays over a grid of
//   measure subdivisions, plus one chord per beat) and its invariants
// - harmony.rs: Chord numerals and qualities, the I-IV-V-I template
// - pool.rs: Fixed-capacity phrase arena with generation-checked handles
// - population.rs: Parent/child bookkeeping and the three pruning policies
// - generator.rs: Random initial phrases by density-driven recursive splitting
// - selection.rs: Roulette (two anti-correlated spins) and tournament
// - breeding.rs: Whole-measure crossover and fitness-weighted interpolation
// - mutation.rs: Weighted rhythmic and melodic mutation operators
// - fitness/: Curves, the rule database, feature streams and evaluators
// - evolution.rs: The generation loop tying the stages together
// - config.rs: Serializable run configuration and playback meter
// - midi.rs: MIDI export and quantizing import
// - synth.rs: Sine-voice audio rendering and WAV output
// - error.rs: Error types shared by every stage
//
// Randomness comes from `genetic_music_prng`; a run is deterministic given
// its config seed.

pub mod breeding;
pub mod config;
pub mod error;
pub mod evolution;
pub mod fitness;
pub mod generator;
pub mod harmony;
pub mod midi;
pub mod mutation;
pub mod phrase;
pub mod pool;
pub mod population;
pub mod selection;
pub mod synth;
