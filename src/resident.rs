//! Resident-page table
//!
//! A bounded virtual-to-physical table of the user pages a process has
//! faulted in. Every slot is an `Option`, so an unused slot can never be
//! confused with a page that maps physical address 0. The page-table bridge
//! updates the table whenever it maps, unmaps or moves a frame; once the
//! table is full further pages are still resident (the page table is the
//! authority) but are no longer recorded here.

/// One recorded virtual page and the physical frame behind it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResidentEntry {
    pub va: u64,
    pub pa: u64,
}

#[derive(Clone, Debug)]
pub struct ResidentPageTable {
    slots: Vec<Option<ResidentEntry>>,
}

impl ResidentPageTable {
    pub fn new(capacity: usize) -> Self {
        ResidentPageTable {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Records that `va` is backed by `pa`
    ///
    /// An existing entry for `va` is updated in place.
    ///
    /// Returns:
    /// - true if the page is recorded
    /// - false if the table is full and `va` was not already present
    pub fn insert(&mut self, va: u64, pa: u64) -> bool {
        if let Some(entry) = self.slots.iter_mut().flatten().find(|entry| entry.va == va) {
            entry.pa = pa;
            return true;
        }
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(ResidentEntry { va, pa });
                true
            }
            None => false,
        }
    }

    /// Physical address recorded for `va`
    pub fn lookup(&self, va: u64) -> Option<u64> {
        self.iter().find(|entry| entry.va == va).map(|entry| entry.pa)
    }

    /// Forgets `va`, returning the physical address it was recorded with
    pub fn remove(&mut self, va: u64) -> Option<u64> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| matches!(slot, Some(entry) if entry.va == va))?;
        slot.take().map(|entry| entry.pa)
    }

    /// Forgets every entry with `start <= va < end`, returning how many
    pub fn remove_range(&mut self, start: u64, end: u64) -> usize {
        let mut removed = 0;
        for slot in self.slots.iter_mut() {
            if matches!(slot, Some(entry) if start <= entry.va && entry.va < end) {
                *slot = None;
                removed += 1;
            }
        }
        removed
    }

    /// Moves the entry recorded for `old_va` to `new_va`, keeping its frame
    ///
    /// Returns false if `old_va` was not recorded.
    pub fn rekey(&mut self, old_va: u64, new_va: u64) -> bool {
        match self.slots.iter_mut().flatten().find(|entry| entry.va == old_va) {
            Some(entry) => {
                entry.va = new_va;
                true
            }
            None => false,
        }
    }

    /// Iterates over the recorded entries in slot order
    pub fn iter(&self) -> impl Iterator<Item = &ResidentEntry> {
        self.slots.iter().flatten()
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}
