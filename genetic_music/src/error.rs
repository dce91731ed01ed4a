// Error taxonomy for the evolution engine.
//
// Three families matter to callers and tests:
// - `PoolError`: arena misuse (exhaustion, double free, stale or foreign
//   handles). Never recovered from inside the engine; surfaced so the caller
//   can tell a sizing bug from a lifetime bug.
// - `InvariantViolation`: a phrase whose run-length arrays no longer form an
//   exact partition of the slot range. Breeding and mutation validate what
//   they wrote and return these instead of letting a corrupt phrase re-enter
//   the population.
// - Everything else: configuration, selection degeneracy, cancellation and
//   the I/O edges (JSON rule files, MIDI, WAV).

use thiserror::Error;

/// Misuse or exhaustion of the phrase arena (`pool.rs`).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    #[error("phrase pool exhausted (capacity {capacity})")]
    Exhausted { capacity: usize },
    #[error("phrase handle freed twice")]
    DoubleFree,
    #[error("phrase handle refers to a freed slot")]
    StaleHandle,
    #[error("phrase handle was not issued by this pool")]
    ForeignHandle,
}

/// A broken run-length partition or cached count on a `Phrase`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("array length {actual} does not match expected {expected}")]
    ArrayLength { expected: usize, actual: usize },
    #[error("cached note count {cached} differs from actual run count {actual}")]
    NoteCountMismatch { cached: u32, actual: u32 },
    #[error("no run starts at slot {slot} (hole in the measure)")]
    Hole { slot: usize },
    #[error("run starts at slot {slot} inside a held run (overlapping notes)")]
    Overlap { slot: usize },
    #[error("run at slot {slot} with duration {duration} crosses the phrase end")]
    Overrun { slot: usize, duration: u16 },
    #[error("held slot {slot} carries a pitch")]
    StrayPitch { slot: usize },
    #[error("pitch {pitch} at slot {slot} is outside the playable range")]
    PitchOutOfRange { slot: usize, pitch: u8 },
}

/// Top-level error for every fallible engine operation.
#[derive(Debug, Error)]
pub enum GaError {
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("phrase invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),
    #[error("selection failed: {0}")]
    SelectionDegenerate(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("MIDI error: {0}")]
    Midi(String),
    #[error("evolution cancelled")]
    Cancelled,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Wav(#[from] hound::Error),
}
