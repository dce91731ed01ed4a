// Fixed-capacity arena of phrases.
//
// Every phrase buffer a run will ever need is allocated up front: for a
// population of N the pool holds 2N+1 slots (N parents, N children, one
// spare). Allocation pops a free slot, resets its buffers in place and gives
// it a fresh `PhraseId`; freeing pushes the slot back. After warm-up a
// generation performs no heap allocation for phrases.
//
// Callers hold `PhraseHandle`s rather than references. A handle records the
// pool that issued it, the slot index and the slot's generation counter,
// which is bumped on every free. That lets the pool reject, without touching
// its free list:
// - handles from a different pool (`ForeignHandle`),
// - handles to a slot that has since been freed (`StaleHandle`),
// - a second free of the same handle (`DoubleFree`).
//
// The free list is LIFO, so a free followed by an alloc reuses the slot that
// was just released.

use crate::error::PoolError;
use crate::phrase::{Phrase, PhraseDims};
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(1);

/// Reference to a live phrase inside a `PhrasePool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhraseHandle {
    pool: u32,
    index: u32,
    generation: u32,
}

impl PhraseHandle {
    /// Slot index within the issuing pool.
    pub fn index(self) -> usize {
        self.index as usize
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    live: bool,
    phrase: Phrase,
}

#[derive(Debug)]
pub struct PhrasePool {
    id: u32,
    dims: PhraseDims,
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl PhrasePool {
    /// Preallocate `capacity` phrase buffers of the given shape.
    pub fn new(capacity: usize, dims: PhraseDims) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                generation: 0,
                live: false,
                phrase: Phrase::blank(dims),
            })
            .collect();
        PhrasePool {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            dims,
            slots,
            free: (0..capacity as u32).rev().collect(),
        }
    }

    /// Pool sized for one population: parents, children and a spare.
    pub fn for_population(population_size: usize, dims: PhraseDims) -> Self {
        Self::new(2 * population_size + 1, dims)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn dims(&self) -> PhraseDims {
        self.dims
    }

    /// Take a zeroed phrase with a fresh id and neutral fitness.
    pub fn alloc(&mut self) -> Result<PhraseHandle, PoolError> {
        let index = self.free.pop().ok_or(PoolError::Exhausted {
            capacity: self.slots.len(),
        })?;
        let slot = &mut self.slots[index as usize];
        slot.live = true;
        slot.phrase.reset();
        Ok(PhraseHandle {
            pool: self.id,
            index,
            generation: slot.generation,
        })
    }

    /// Return a phrase to the pool. Its contents are cleared and every
    /// outstanding copy of the handle becomes stale.
    pub fn free(&mut self, handle: PhraseHandle) -> Result<(), PoolError> {
        let index = match self.slot_index(handle) {
            Ok(index) => index,
            Err(PoolError::StaleHandle) => return Err(PoolError::DoubleFree),
            Err(e) => return Err(e),
        };
        let slot = &mut self.slots[index];
        slot.phrase.reset();
        slot.live = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Ok(())
    }

    /// Free every slot at once, invalidating all handles.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            if slot.live {
                slot.phrase.reset();
                slot.live = false;
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        self.free.clear();
        self.free.extend((0..self.slots.len() as u32).rev());
    }

    pub fn contains(&self, handle: PhraseHandle) -> bool {
        self.slot_index(handle).is_ok()
    }

    pub fn get(&self, handle: PhraseHandle) -> Result<&Phrase, PoolError> {
        let index = self.slot_index(handle)?;
        Ok(&self.slots[index].phrase)
    }

    pub fn get_mut(&mut self, handle: PhraseHandle) -> Result<&mut Phrase, PoolError> {
        let index = self.slot_index(handle)?;
        Ok(&mut self.slots[index].phrase)
    }

    /// Two distinct live phrases, both mutable.
    ///
    /// Returns `None` when both handles name the same slot.
    pub fn get_pair_mut(
        &mut self,
        a: PhraseHandle,
        b: PhraseHandle,
    ) -> Result<Option<(&mut Phrase, &mut Phrase)>, PoolError> {
        let ia = self.slot_index(a)?;
        let ib = self.slot_index(b)?;
        if ia == ib {
            return Ok(None);
        }
        let (low, high) = (ia.min(ib), ia.max(ib));
        let (head, tail) = self.slots.split_at_mut(high);
        let (first, second) = (&mut head[low].phrase, &mut tail[0].phrase);
        Ok(Some(if ia < ib {
            (first, second)
        } else {
            (second, first)
        }))
    }

    /// Every live phrase with its handle, in slot order.
    pub fn iter_live(&self) -> impl Iterator<Item = (PhraseHandle, &Phrase)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.live)
            .map(|(index, slot)| {
                (
                    PhraseHandle {
                        pool: self.id,
                        index: index as u32,
                        generation: slot.generation,
                    },
                    &slot.phrase,
                )
            })
    }

    fn slot_index(&self, handle: PhraseHandle) -> Result<usize, PoolError> {
        if handle.pool != self.id {
            return Err(PoolError::ForeignHandle);
        }
        let index = handle.index as usize;
        let slot = self.slots.get(index).ok_or(PoolError::ForeignHandle)?;
        if !slot.live || slot.generation != handle.generation {
            return Err(PoolError::StaleHandle);
        }
        Ok(index)
    }
}
