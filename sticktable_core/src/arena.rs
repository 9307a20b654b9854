//! Bounded slot allocator for session entries.
//!
//! One slab of entry slots addressed by stable `(index, generation)`
//! handles. Released slots go on a freelist and come back with a bumped
//! generation, so a handle kept across a release can never alias the
//! slot's next occupant.

use crate::errors::Error;
use crate::types::SessionEntry;

/// Stable handle to an arena slot.
///
/// `Ord` sorts by `(index, generation)`; the Expiration Index relies on
/// this to break ties between entries sharing a deadline tick.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId {
    index: u32,
    generation: u32,
}

impl SlotId {
    /// Smallest handle in sort order; used as a range-scan anchor.
    pub(crate) const ZERO: SlotId = SlotId {
        index: 0,
        generation: 0,
    };
}

struct Slot {
    generation: u32,
    entry: Option<SessionEntry>,
}

/// The entry slab: bump allocation up to `capacity`, freelist reuse after.
pub struct EntryArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    capacity: usize,
}

impl EntryArena {
    /// Reserve the whole slot region up front. Fails (rather than aborting)
    /// when the region cannot be created.
    pub fn with_capacity(capacity: usize) -> Result<Self, Error> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| Error::AllocationFailure)?;
        Ok(EntryArena {
            slots,
            free: Vec::new(),
            capacity,
        })
    }

    /// Place an entry into a slot, reusing a freed one first.
    pub fn insert(&mut self, entry: SessionEntry) -> Result<SlotId, Error> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.entry.is_none());
            slot.entry = Some(entry);
            return Ok(SlotId {
                index,
                generation: slot.generation,
            });
        }
        if self.slots.len() >= self.capacity {
            return Err(Error::AllocationFailure);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 1,
            entry: Some(entry),
        });
        Ok(SlotId {
            index,
            generation: 1,
        })
    }

    /// Release a slot, bumping its generation so the handle goes stale.
    pub fn remove(&mut self, id: SlotId) -> Option<SessionEntry> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(entry)
    }

    pub fn get(&self, id: SlotId) -> Option<&SessionEntry> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut SessionEntry> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    /// Live entry count.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots still obtainable: never-used headroom plus the freelist.
    pub fn available(&self) -> usize {
        self.capacity - self.slots.len() + self.free.len()
    }
}
