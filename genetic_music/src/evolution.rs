// The evolution controller.
//
// Owns one population and one instance of every pipeline stage, and drives
// the generation loop:
//
//   repeat `generations` times:
//     while children < population size:
//       select a pair -> breed -> (crossover: snapshot parent A as a child)
//       -> mutate the child -> score the child
//     merge children into parents under the pruning policy
//
// Randomness: the config seed feeds one master `EvoRng`, from which the
// generator, selector and mutator each fork their own stream in that fixed
// order. A run is reproducible from its config alone.
//
// Every phrase leaving breeding or mutation is validated; a violation aborts
// the run with `GaError::Invariant` after returning any unfinished children
// to the pool. Cancellation is cooperative: the token is checked before each
// child, and a cancelled generation returns its unfinished children to the
// pool. Under interpolation the parents are untouched by a cancelled
// generation; crossover edits parents in place, so its partial work stays.
// Crossed parents keep their previous fitness until the next `reassess`.

use crate::breeding::{BreedOutcome, Breeder};
use crate::config::EvolutionConfig;
use crate::error::GaError;
use crate::fitness::{FitnessEvaluator, assess_population};
use crate::generator::PopulationGenerator;
use crate::mutation::Mutator;
use crate::phrase::{Phrase, PhraseId};
use crate::pool::PhraseHandle;
use crate::population::Population;
use crate::selection::Selector;
use genetic_music_prng::EvoRng;
use log::{debug, info};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag for stopping a run from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Outcome of a completed `run`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunReport {
    /// Generations completed by this call.
    pub generations: u32,
    pub best_fitness: f32,
    pub mean_fitness: f32,
    pub best_phrase: Option<PhraseId>,
}

pub struct Evolution<F> {
    config: EvolutionConfig,
    population: Population,
    selector: Selector,
    breeder: Breeder,
    mutator: Mutator,
    fitness: F,
    active: Option<PhraseHandle>,
    generations_run: u32,
}

impl<F: FitnessEvaluator> Evolution<F> {
    /// Generate and score the initial population.
    pub fn new(config: EvolutionConfig, mut fitness: F) -> Result<Self, GaError> {
        config.validate()?;
        let mut master = EvoRng::new(config.seed);
        let mut generator = PopulationGenerator::new(
            config.population_size,
            config.dims,
            config.subdivision,
            master.fork(),
        )?;
        let mut population = generator.generate()?;
        let selector = Selector::new(config.selection, master.fork());
        let mutator = Mutator::new(&config.mutation_weights, master.fork())?;
        let breeder = Breeder::new(config.breeding);

        assess_population(&mut population, &mut fitness)?;
        let active = population.best_parent();
        info!(
            "initial population of {} phrases ({} measures x {} slots), seed {}",
            config.population_size, config.dims.num_measures, config.dims.subdivision, config.seed
        );

        Ok(Evolution {
            config,
            population,
            selector,
            breeder,
            mutator,
            fitness,
            active,
            generations_run: 0,
        })
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    /// Generations completed over the controller's lifetime.
    pub fn generations_run(&self) -> u32 {
        self.generations_run
    }

    /// Current parents, in population order.
    pub fn phrases(&self) -> Vec<&Phrase> {
        self.population.parent_phrases().collect()
    }

    /// The phrase selected for playback or export; defaults to the fittest.
    pub fn active_phrase(&self) -> Option<&Phrase> {
        self.active.and_then(|h| self.population.phrase(h).ok())
    }

    /// Make a current parent the active phrase. Returns false if no parent
    /// has this id.
    pub fn set_active_phrase(&mut self, id: PhraseId) -> bool {
        match self.population.find_parent(id) {
            Some(handle) => {
                self.active = Some(handle);
                true
            }
            None => false,
        }
    }

    /// Re-score every parent with the current evaluator.
    pub fn reassess(&mut self) -> Result<(), GaError> {
        assess_population(&mut self.population, &mut self.fitness)
    }

    pub fn run(&mut self) -> Result<RunReport, GaError> {
        self.run_with_cancel(&CancelToken::new())
    }

    /// Run the configured number of generations, stopping early with
    /// `GaError::Cancelled` if the token fires.
    pub fn run_with_cancel(&mut self, cancel: &CancelToken) -> Result<RunReport, GaError> {
        for _ in 0..self.config.generations {
            self.step(cancel)?;
        }
        self.active = self.population.best_parent();
        let summary = self.population.fitness_summary();
        Ok(RunReport {
            generations: self.config.generations,
            best_fitness: summary.map_or(0.0, |s| s.max),
            mean_fitness: summary.map_or(0.0, |s| s.mean),
            best_phrase: self.active_phrase().map(Phrase::id),
        })
    }

    /// Produce one full generation of children and merge them.
    pub fn step(&mut self, cancel: &CancelToken) -> Result<(), GaError> {
        while self.population.children().len() < self.population.target_size() {
            if cancel.is_cancelled() {
                self.population.discard_children()?;
                info!("cancelled after {} generations", self.generations_run);
                return Err(GaError::Cancelled);
            }
            if let Err(e) = self.produce_child() {
                self.population.discard_children()?;
                return Err(e);
            }
        }

        let report = self.population.merge_children(self.config.pruning)?;
        self.generations_run += 1;
        // Old parents may have been freed.
        self.active = self.population.best_parent();
        if let Some(summary) = self.population.fitness_summary() {
            info!(
                "generation {}: best {:.3}, mean {:.3}, worst {:.3} (kept {}, freed {})",
                self.generations_run,
                summary.max,
                summary.mean,
                summary.min,
                report.kept,
                report.freed
            );
        }
        Ok(())
    }

    fn produce_child(&mut self) -> Result<PhraseHandle, GaError> {
        let pair = self.selector.select(&self.population)?;
        let child = match self.breeder.breed(pair, &mut self.population)? {
            BreedOutcome::Child(child) => child,
            BreedOutcome::InPlace { measures_swapped } => {
                debug!("crossover swapped {measures_swapped} measures");
                let child = self.population.allocate_child()?;
                self.population.copy_phrase(pair.first, child)?;
                child
            }
        };
        let phrase = self.population.phrase_mut(child)?;
        let kind = self.mutator.mutate(phrase)?;
        let score = self.fitness.evaluate(phrase);
        phrase.set_fitness(score);
        debug!("child {} via {kind:?}: fitness {score:.3}", phrase.id());
        Ok(child)
    }
}
