// Genetic Music: CLI entry point.
//
// Evolves a population of phrases and writes the fittest one to MIDI, with
// an optional WAV preview. The pipeline: generate -> evolve -> MIDI -> WAV.
//
// Usage:
//   cargo run -p genetic_music --bin evolve -- [output.mid] [--config FILE]
//     [--population N] [--measures N] [--subdivision N] [--generations N]
//     [--seed N] [--selection roulette|tournament] [--tournament-size N]
//     [--breeding crossover|interpolate] [--pruning generational|elitist|truncation]
//     [--rules FILE] [--save-rules FILE] [--save-config FILE]
//     [--wav FILE] [--tempo BPM] [--manual] [--score FILE.mid]
//
// Flags override values loaded with --config. --manual replaces the rule set
// with yes/no prompts on stdin. --score imports a MIDI file, prints its
// fitness breakdown and exits.
//
// Set RUST_LOG=info for per-generation statistics.

use genetic_music::breeding::BreedingPolicy;
use genetic_music::config::EvolutionConfig;
use genetic_music::error::GaError;
use genetic_music::evolution::Evolution;
use genetic_music::fitness::{
    AutomaticFitness, FitnessEvaluator, FitnessExtractor, ManualFitness, Rating, RuleSet,
};
use genetic_music::midi::{read_midi, write_midi};
use genetic_music::phrase::{Phrase, PhraseDims};
use genetic_music::pool::PhrasePool;
use genetic_music::population::{Population, PruningPolicy};
use genetic_music::selection::SelectionPolicy;
use genetic_music::synth::{DEFAULT_SAMPLE_RATE, SineSynth, Synthesizer, write_wav};
use log::warn;
use std::io::Write;
use std::path::Path;

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();

    let output_path = args
        .get(1)
        .filter(|s| !s.starts_with("--"))
        .map(|s| s.as_str())
        .unwrap_or("phrase.mid");
    let wav_path: Option<String> = parse_flag(&args, "--wav");
    let manual = args.iter().any(|a| a == "--manual");

    let config = match build_config(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    let rules = match parse_flag::<String>(&args, "--rules") {
        Some(path) => match RuleSet::load(Path::new(&path)) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("Failed to load rules from {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => RuleSet::default_rules(),
    };
    if let Some(path) = parse_flag::<String>(&args, "--save-rules") {
        save_or_exit("rules", &path, rules.save(Path::new(&path)));
    }
    if let Some(path) = parse_flag::<String>(&args, "--save-config") {
        save_or_exit("config", &path, config.save(Path::new(&path)));
    }

    if let Some(path) = parse_flag::<String>(&args, "--score") {
        if let Err(e) = score_file(Path::new(&path), config.dims, rules) {
            eprintln!("Error scoring {}: {}", path, e);
            std::process::exit(1);
        }
        return;
    }

    println!("=== Genetic Music ===");
    println!("Output: {}", output_path);
    println!(
        "Population: {} phrases of {} measures x {} slots",
        config.population_size, config.dims.num_measures, config.dims.subdivision
    );
    println!(
        "Policies: {:?} selection, {:?} breeding, {:?} pruning",
        config.selection, config.breeding, config.pruning
    );
    println!("Generations: {}", config.generations);
    println!("Seed: {}", config.seed);
    println!(
        "Fitness: {}",
        if manual {
            "manual".to_string()
        } else {
            format!("{} rules", rules.rule_count())
        }
    );
    println!();

    let result = if manual {
        evolve(config, ManualFitness::new(ask_listener), output_path, wav_path.as_deref())
    } else {
        evolve(config, AutomaticFitness::new(rules), output_path, wav_path.as_deref())
    };
    if let Err(e) = result {
        eprintln!("  Error: {}", e);
        std::process::exit(1);
    }

    println!();
    println!("Play with: timidity {} (or any MIDI player)", output_path);
}

fn evolve<F: FitnessEvaluator>(
    config: EvolutionConfig,
    fitness: F,
    output_path: &str,
    wav_path: Option<&str>,
) -> Result<(), GaError> {
    let meter = config.meter;
    let generations = config.generations;

    println!("[1/4] Generating initial population...");
    let mut evolution = Evolution::new(config, fitness)?;
    print_population(evolution.population());

    println!("[2/4] Evolving for {} generations...", generations);
    let report = evolution.run()?;
    println!(
        "  Best fitness: {:.3} (mean {:.3})",
        report.best_fitness, report.mean_fitness
    );
    print_population(evolution.population());

    let Some(best) = evolution.active_phrase() else {
        return Err(GaError::SelectionDegenerate("no phrase survived".into()));
    };
    println!("  Chosen: {} {}", best.id(), best.summary());

    println!("[3/4] Writing MIDI to {}...", output_path);
    write_midi(best, &meter, Path::new(output_path))?;

    match wav_path {
        Some(path) => {
            println!("[4/4] Rendering audio to {}...", path);
            let mut synth = SineSynth::new(DEFAULT_SAMPLE_RATE, meter);
            let samples = synth.render(best);
            write_wav(&samples, synth.sample_rate(), Path::new(path))?;
            println!(
                "  Done! Duration: {:.1}s",
                samples.len() as f64 / f64::from(synth.sample_rate())
            );
        }
        None => println!("[4/4] No --wav given, skipping audio."),
    }
    Ok(())
}

fn build_config(args: &[String]) -> Result<EvolutionConfig, GaError> {
    let mut config = match parse_flag::<String>(args, "--config") {
        Some(path) => EvolutionConfig::load(Path::new(&path))?,
        None => EvolutionConfig::default(),
    };
    if let Some(n) = parse_flag(args, "--population") {
        config.population_size = n;
    }
    if let Some(n) = parse_flag(args, "--measures") {
        config.dims.num_measures = n;
    }
    if let Some(n) = parse_flag(args, "--subdivision") {
        config.dims.subdivision = n;
    }
    if let Some(n) = parse_flag(args, "--generations") {
        config.generations = n;
    }
    if let Some(s) = parse_flag(args, "--seed") {
        config.seed = s;
    }
    if let Some(bpm) = parse_flag(args, "--tempo") {
        config.meter.tempo_bpm = bpm;
    }
    if let Some(name) = parse_flag::<String>(args, "--selection") {
        config.selection = parse_selection(&name)?;
    }
    if let Some(size) = parse_flag(args, "--tournament-size") {
        match &mut config.selection {
            SelectionPolicy::Tournament {
                possible_parents, ..
            } => *possible_parents = size,
            SelectionPolicy::Roulette => {
                warn!("--tournament-size {} ignored under roulette selection", size)
            }
        }
    }
    if let Some(name) = parse_flag::<String>(args, "--breeding") {
        config.breeding = match name.to_lowercase().as_str() {
            "crossover" => BreedingPolicy::Crossover,
            "interpolate" => BreedingPolicy::Interpolate,
            _ => return Err(GaError::Config(format!("unknown breeding policy '{}'", name))),
        };
    }
    if let Some(name) = parse_flag::<String>(args, "--pruning") {
        config.pruning = match name.to_lowercase().as_str() {
            "generational" => PruningPolicy::Generational,
            "elitist" => PruningPolicy::Elitist,
            "truncation" => PruningPolicy::Truncation,
            _ => return Err(GaError::Config(format!("unknown pruning policy '{}'", name))),
        };
    }
    config.validate()?;
    Ok(config)
}

fn parse_selection(name: &str) -> Result<SelectionPolicy, GaError> {
    match name.to_lowercase().as_str() {
        "roulette" => Ok(SelectionPolicy::Roulette),
        "tournament" => Ok(SelectionPolicy::tournament()),
        _ => Err(GaError::Config(format!("unknown selection policy '{}'", name))),
    }
}

fn score_file(path: &Path, dims: PhraseDims, rules: RuleSet) -> Result<(), GaError> {
    let mut pool = PhrasePool::new(1, dims);
    let handle = pool.alloc()?;
    let phrase = pool.get_mut(handle)?;
    let report = read_midi(path, phrase)?;
    println!(
        "Imported {} notes ({} sharing an onset, {} past the end)",
        report.notes_kept, report.notes_merged, report.notes_dropped
    );
    println!("  {}", phrase.summary());

    let extractor = FitnessExtractor::new(rules);
    for part in extractor.breakdown(phrase) {
        println!(
            "  {:<8} {:.3} (weight {:.2})",
            part.kind.label(),
            part.score,
            part.weight
        );
    }
    println!("  Fitness: {:.3}", extractor.score(phrase));
    Ok(())
}

fn print_population(population: &Population) {
    for (i, phrase) in population.parent_phrases().enumerate() {
        println!("  {:>2}. {:.3}  {}", i + 1, phrase.fitness(), phrase.summary());
    }
}

/// Prompt on stdout, read a y/n verdict from stdin. Anything but "y" is bad.
fn ask_listener(phrase: &Phrase) -> Rating {
    print!("  {} {}  good? [y/N] ", phrase.id(), phrase.summary());
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    match std::io::stdin().read_line(&mut line) {
        Ok(_) if line.trim().eq_ignore_ascii_case("y") => Rating::Good,
        _ => Rating::Bad,
    }
}

fn save_or_exit(what: &str, path: &str, result: Result<(), GaError>) {
    match result {
        Ok(()) => println!("Saved {} to {}", what, path),
        Err(e) => {
            eprintln!("Failed to save {} to {}: {}", what, path, e);
            std::process::exit(1);
        }
    }
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}
