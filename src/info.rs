//! Introspection records
//!
//! `RegionInfo` and `PageMapping` are what the address space reports.
//! `WmapInfo` and `PgdirInfo` are the fixed C-layout records the
//! `getwmapinfo` / `getpgdirinfo` syscalls copy out to user space.

use crate::constants::{MAX_UPAGE_INFO, MAX_WMMAP_INFO};

/// Base, length and resident-page count of one region
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegionInfo {
    pub base: u64,
    pub length: u64,
    pub resident_pages: usize,
}

/// One present user page and the frame behind it
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PageMapping {
    pub va: u64,
    pub pa: u64,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WmapInfo {
    pub total_mmaps: u32,                      // number of valid entries
    pub addr: [u64; MAX_WMMAP_INFO],           // region base addresses
    pub length: [u64; MAX_WMMAP_INFO],         // region lengths
    pub n_loaded_pages: [u32; MAX_WMMAP_INFO], // resident pages per region
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PgdirInfo {
    pub n_upages: u32,              // number of valid entries
    pub va: [u64; MAX_UPAGE_INFO],  // virtual page addresses
    pub pa: [u64; MAX_UPAGE_INFO],  // physical frame addresses
}

impl WmapInfo {
    /// Fills the record from a region query, lowest base first
    pub fn fill(&mut self, regions: &[RegionInfo]) {
        *self = WmapInfo::default();
        for (i, region) in regions.iter().take(MAX_WMMAP_INFO).enumerate() {
            self.addr[i] = region.base;
            self.length[i] = region.length;
            self.n_loaded_pages[i] = region.resident_pages as u32;
        }
        self.total_mmaps = regions.len().min(MAX_WMMAP_INFO) as u32;
    }
}

impl PgdirInfo {
    pub fn fill(&mut self, pages: &[PageMapping]) {
        *self = PgdirInfo::default();
        for (i, page) in pages.iter().take(MAX_UPAGE_INFO).enumerate() {
            self.va[i] = page.va;
            self.pa[i] = page.pa;
        }
        self.n_upages = pages.len().min(MAX_UPAGE_INFO) as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_clears_stale_entries() {
        let mut info = WmapInfo::default();
        info.fill(&[
            RegionInfo { base: 0x6000_0000, length: 0x2000, resident_pages: 1 },
            RegionInfo { base: 0x6000_4000, length: 0x1000, resident_pages: 0 },
        ]);
        assert_eq!(info.total_mmaps, 2);
        assert_eq!(info.n_loaded_pages[0], 1);

        info.fill(&[RegionInfo { base: 0x6000_4000, length: 0x1000, resident_pages: 0 }]);
        assert_eq!(info.total_mmaps, 1);
        assert_eq!(info.addr[0], 0x6000_4000);
        assert_eq!(info.addr[1], 0);
    }

    #[test]
    fn test_pgdir_fill() {
        let mut info = PgdirInfo::default();
        info.fill(&[PageMapping { va: 0x6000_0000, pa: 0 }]);
        assert_eq!(info.n_upages, 1);
        assert_eq!(info.va[0], 0x6000_0000);
        assert_eq!(info.pa[0], 0);
    }
}
