// The population: two disjoint sets of phrases living in one arena.
//
// `parents` is the current generation, the only set selection reads from.
// `children` collects offspring as the controller produces them. Once the
// children set reaches the target size, `merge_children` folds it back into
// the parents under a pruning policy and returns everything else to the
// pool:
//
// - Generational: every parent is freed; the children become the parents.
// - Elitist: parents and children compete; the best `target_size` survive.
//   Sorting is stable with parents listed first, so ties keep the parent.
// - Truncation: the same best-of-both cut, but children are listed first,
//   so ties favour the newcomer.
//
// Pool accounting is an invariant: after every merge exactly `target_size`
// phrases are live and the children set is empty.

use crate::error::{GaError, PoolError};
use crate::phrase::{Phrase, PhraseDims, PhraseId};
use crate::pool::{PhraseHandle, PhrasePool};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// How children replace parents at the end of a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruningPolicy {
    #[default]
    Generational,
    Elitist,
    Truncation,
}

/// Bookkeeping from one merge, mostly for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeReport {
    pub kept: usize,
    pub freed: usize,
    /// Lowest fitness among survivors.
    pub lowest_kept: Option<f32>,
    /// Highest fitness among the phrases returned to the pool.
    pub highest_freed: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitnessSummary {
    pub min: f32,
    pub mean: f32,
    pub max: f32,
}

/// Descending by fitness with NaN sorted last.
pub(crate) fn by_fitness_desc(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

#[derive(Debug)]
pub struct Population {
    pool: PhrasePool,
    parents: Vec<PhraseHandle>,
    children: Vec<PhraseHandle>,
    target_size: usize,
}

impl Population {
    /// An empty population backed by a pool sized for `target_size`.
    pub fn new(target_size: usize, dims: PhraseDims) -> Self {
        Self::with_pool(PhrasePool::for_population(target_size, dims), target_size)
    }

    pub fn with_pool(pool: PhrasePool, target_size: usize) -> Self {
        Population {
            pool,
            parents: Vec::with_capacity(target_size),
            children: Vec::with_capacity(target_size),
            target_size,
        }
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    pub fn dims(&self) -> PhraseDims {
        self.pool.dims()
    }

    pub fn pool(&self) -> &PhrasePool {
        &self.pool
    }

    pub fn parents(&self) -> &[PhraseHandle] {
        &self.parents
    }

    pub fn children(&self) -> &[PhraseHandle] {
        &self.children
    }

    pub fn phrase(&self, handle: PhraseHandle) -> Result<&Phrase, GaError> {
        Ok(self.pool.get(handle)?)
    }

    pub fn phrase_mut(&mut self, handle: PhraseHandle) -> Result<&mut Phrase, GaError> {
        Ok(self.pool.get_mut(handle)?)
    }

    pub(crate) fn phrase_pair_mut(
        &mut self,
        a: PhraseHandle,
        b: PhraseHandle,
    ) -> Result<Option<(&mut Phrase, &mut Phrase)>, GaError> {
        Ok(self.pool.get_pair_mut(a, b)?)
    }

    /// Parent phrases in population order.
    pub fn parent_phrases(&self) -> impl Iterator<Item = &Phrase> + '_ {
        self.parents.iter().filter_map(|&h| self.pool.get(h).ok())
    }

    /// Fitness of each parent, in population order.
    pub fn parent_fitness(&self) -> Vec<f32> {
        self.parent_phrases().map(Phrase::fitness).collect()
    }

    /// Allocate a phrase straight into the parent set. Used to seed the
    /// first generation.
    pub(crate) fn allocate_parent(&mut self) -> Result<PhraseHandle, GaError> {
        let handle = self.pool.alloc()?;
        self.parents.push(handle);
        Ok(handle)
    }

    /// Allocate a zeroed phrase and register it as a child.
    pub fn allocate_child(&mut self) -> Result<PhraseHandle, GaError> {
        let handle = self.pool.alloc()?;
        self.children.push(handle);
        Ok(handle)
    }

    /// Overwrite `dst` with a copy of `src` (melody, harmony, fitness).
    pub fn copy_phrase(&mut self, src: PhraseHandle, dst: PhraseHandle) -> Result<(), GaError> {
        match self.pool.get_pair_mut(src, dst)? {
            Some((from, to)) => to.copy_from(from),
            None => Ok(()),
        }
    }

    /// Return every unmerged child to the pool.
    pub fn discard_children(&mut self) -> Result<(), GaError> {
        let children = std::mem::take(&mut self.children);
        self.free_all(children)
    }

    /// Free every handle, even past a failure. Reports the first error.
    fn free_all(
        &mut self,
        handles: impl IntoIterator<Item = PhraseHandle>,
    ) -> Result<(), GaError> {
        let mut first_error = None;
        for handle in handles {
            if let Err(e) = self.pool.free(handle) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Fold the children into the parents under `policy`.
    pub fn merge_children(&mut self, policy: PruningPolicy) -> Result<MergeReport, GaError> {
        match policy {
            PruningPolicy::Generational => {
                let mut highest_freed: Option<f32> = None;
                for &handle in &self.parents {
                    let fitness = self.pool.get(handle)?.fitness();
                    highest_freed = Some(highest_freed.map_or(fitness, |h| h.max(fitness)));
                }
                let children = std::mem::take(&mut self.children);
                let outgoing = std::mem::replace(&mut self.parents, children);
                let freed = outgoing.len();
                self.free_all(outgoing)?;
                let lowest_kept = self
                    .parent_phrases()
                    .map(Phrase::fitness)
                    .reduce(f32::min);
                Ok(MergeReport {
                    kept: self.parents.len(),
                    freed,
                    lowest_kept,
                    highest_freed,
                })
            }
            PruningPolicy::Elitist => self.keep_best(false),
            PruningPolicy::Truncation => self.keep_best(true),
        }
    }

    fn keep_best(&mut self, children_first: bool) -> Result<MergeReport, GaError> {
        let (first, second) = if children_first {
            (&self.children, &self.parents)
        } else {
            (&self.parents, &self.children)
        };
        let mut scored = Vec::with_capacity(first.len() + second.len());
        for &handle in first.iter().chain(second) {
            scored.push((handle, self.pool.get(handle)?.fitness()));
        }
        // Stable: equal fitness keeps the incoming order.
        scored.sort_by(|a, b| by_fitness_desc(a.1, b.1));

        let keep = self.target_size.min(scored.len());
        let mut report = MergeReport {
            kept: keep,
            freed: scored.len() - keep,
            lowest_kept: scored[..keep].last().map(|s| s.1),
            highest_freed: scored.get(keep).map(|s| s.1),
        };
        if report.lowest_kept.is_some_and(f32::is_nan) {
            report.lowest_kept = None;
        }
        self.children.clear();
        self.parents.clear();
        self.parents.extend(scored[..keep].iter().map(|s| s.0));
        self.free_all(scored[keep..].iter().map(|s| s.0))?;
        Ok(report)
    }

    /// 1-based position of a phrase among the parents, or 0 if it is not a
    /// current parent.
    pub fn phrase_number_of(&self, id: PhraseId) -> usize {
        self.parents
            .iter()
            .position(|&h| self.pool.get(h).is_ok_and(|p| p.id() == id))
            .map_or(0, |i| i + 1)
    }

    pub fn find_parent(&self, id: PhraseId) -> Option<PhraseHandle> {
        self.parents
            .iter()
            .copied()
            .find(|&h| self.pool.get(h).is_ok_and(|p| p.id() == id))
    }

    /// The fittest parent; the first one wins ties.
    pub fn best_parent(&self) -> Option<PhraseHandle> {
        let mut best: Option<(PhraseHandle, f32)> = None;
        for &handle in &self.parents {
            let Ok(phrase) = self.pool.get(handle) else {
                continue;
            };
            let fitness = phrase.fitness();
            match best {
                Some((_, f)) if by_fitness_desc(fitness, f) != Ordering::Less => {}
                _ => best = Some((handle, fitness)),
            }
        }
        best.map(|(h, _)| h)
    }

    pub fn fitness_summary(&self) -> Option<FitnessSummary> {
        let values: Vec<f32> = self.parent_fitness();
        if values.is_empty() {
            return None;
        }
        let min = values.iter().copied().fold(f32::INFINITY, f32::min);
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        Some(FitnessSummary { min, mean, max })
    }

    /// Check that the parent and child sets are disjoint and all live.
    pub fn check_accounting(&self) -> Result<(), GaError> {
        for (i, h) in self.parents.iter().chain(&self.children).enumerate() {
            if !self.pool.contains(*h) {
                return Err(PoolError::StaleHandle.into());
            }
            if self
                .parents
                .iter()
                .chain(&self.children)
                .skip(i + 1)
                .any(|other| other == h)
            {
                return Err(GaError::Config(format!(
                    "phrase slot {} registered twice",
                    h.index()
                )));
            }
        }
        if self.pool.live_count() != self.parents.len() + self.children.len() {
            return Err(GaError::Config(format!(
                "pool has {} live phrases but population tracks {}",
                self.pool.live_count(),
                self.parents.len() + self.children.len()
            )));
        }
        Ok(())
    }
}
