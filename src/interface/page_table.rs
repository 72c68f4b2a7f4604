// Software page table
use super::{Mapping, PageTable, PteFlags};
use crate::constants::{is_page_aligned, round_down_page};
use crate::error::{VmError, VmResult};
use std::collections::BTreeMap;

/// A page table held in an ordered map of virtual page to (frame, flags).
///
/// Stands in for the hardware walk/allocate primitive: translations,
/// insertions and removals behave like the two-level x86 table they model,
/// and `entries()` visits pages in the same order as a directory walk.
#[derive(Clone, Debug, Default)]
pub struct SoftPageTable {
    entries: BTreeMap<u64, (u64, PteFlags)>,
}

impl SoftPageTable {
    pub fn new() -> Self {
        SoftPageTable {
            entries: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flags of the entry at the page containing `va`
    pub fn flags(&self, va: u64) -> Option<PteFlags> {
        self.entries.get(&round_down_page(va)).map(|(_, flags)| *flags)
    }
}

impl PageTable for SoftPageTable {
    fn translate(&self, va: u64) -> Option<u64> {
        let page = round_down_page(va);
        self.entries
            .get(&page)
            .filter(|(_, flags)| flags.contains(PteFlags::PRESENT))
            .map(|(frame, _)| frame + (va - page))
    }

    fn map_frame(&mut self, va: u64, frame: u64, flags: PteFlags) -> VmResult<()> {
        if !is_page_aligned(va) || !is_page_aligned(frame) {
            return Err(VmError::InvalidArgument("page table entries must be page aligned"));
        }
        if self.entries.contains_key(&va) {
            return Err(VmError::InvalidArgument("page is already mapped"));
        }
        self.entries.insert(va, (frame, flags | PteFlags::PRESENT));
        Ok(())
    }

    fn unmap_frame(&mut self, va: u64) -> Option<u64> {
        self.entries.remove(&round_down_page(va)).map(|(frame, _)| frame)
    }

    fn entries(&self) -> Vec<Mapping> {
        self.entries
            .iter()
            .filter(|(_, (_, flags))| flags.contains(PteFlags::PRESENT))
            .map(|(va, (pa, flags))| Mapping {
                va: *va,
                pa: *pa,
                flags: *flags,
            })
            .collect()
    }
}
