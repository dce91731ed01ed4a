use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use genetic_music::config::EvolutionConfig;
use genetic_music::evolution::{CancelToken, Evolution};
use genetic_music::fitness::{AutomaticFitness, FitnessExtractor, RuleSet};
use genetic_music::generator::{PopulationGenerator, SubdivisionParams};
use genetic_music::phrase::PhraseDims;
use genetic_music::population::PruningPolicy;
use genetic_music_prng::EvoRng;

fn bench_generation_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("generation_step");
    for size in [8usize, 32, 128] {
        let config = EvolutionConfig {
            population_size: size,
            pruning: PruningPolicy::Elitist,
            ..EvolutionConfig::default()
        };
        let fitness = AutomaticFitness::new(RuleSet::default_rules());
        let Ok(mut evolution) = Evolution::new(config, fitness) else {
            continue;
        };
        let token = CancelToken::new();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| evolution.step(black_box(&token)))
        });
    }
    group.finish();
}

fn bench_scoring(c: &mut Criterion) {
    let dims = PhraseDims::default();
    let mut generator =
        match PopulationGenerator::new(64, dims, SubdivisionParams::default(), EvoRng::new(11)) {
            Ok(g) => g,
            Err(_) => return,
        };
    let Ok(population) = generator.generate() else {
        return;
    };
    let extractor = FitnessExtractor::new(RuleSet::default_rules());
    c.bench_function("score_population", |b| {
        b.iter(|| {
            population
                .parent_phrases()
                .map(|p| extractor.score(black_box(p)))
                .sum::<f32>()
        })
    });
}

fn bench_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate");
    for subdivision in [16u32, 64] {
        let Ok(dims) = PhraseDims::new(8, subdivision) else {
            continue;
        };
        let Ok(mut generator) =
            PopulationGenerator::new(32, dims, SubdivisionParams::default(), EvoRng::new(3))
        else {
            continue;
        };
        group.bench_with_input(
            BenchmarkId::from_parameter(subdivision),
            &subdivision,
            |b, _| b.iter(|| generator.generate()),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_generation_step, bench_scoring, bench_generate);
criterion_main!(benches);
