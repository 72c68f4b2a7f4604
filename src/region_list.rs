//! Region list data structure and structure-related operations
//!
//! This file provides the ordered collection of a process's regions. Regions
//! are stored in a `NoditMap` keyed by their `[base, base + length)` interval,
//! so address order and non-overlap are properties of the container itself:
//! there are no head/tail pointers to patch, and insertion, removal and the
//! gap scan are total functions over the map.
//!
//! The free-range test (`is_range_free`) and the first-fit scan (`find_gap`)
//! are the only placement checks in the crate. Map uses both. Remap asks
//! `is_range_free` (ignoring the region itself) whether it can resize in
//! place, and `find_gap` where to relocate.

use crate::error::{VmError, VmResult};
use crate::region::Region;
use nodit::interval::ie;
use nodit::{Interval, NoditMap};

/// Ordered, non-overlapping set of regions with a fixed capacity
#[derive(Clone, Debug)]
pub struct RegionList {
    entries: NoditMap<u64, Interval<u64>, Region>, // Keyed by `[base, end)`
    capacity: usize,                              // max concurrent regions
}

impl RegionList {
    /// Creates an empty region list holding at most `capacity` regions
    pub fn new(capacity: usize) -> Self {
        RegionList {
            entries: NoditMap::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.first_key_value().is_none()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates over the regions in address order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Region> {
        self.entries.iter().map(|(_, region)| region)
    }

    /// Finds the region whose interval contains `addr`
    ///
    /// Returns:
    /// - Some(&Region) if a region covers `addr`
    /// - None if `addr` lies in a gap
    pub fn find_containing(&self, addr: u64) -> Option<&Region> {
        self.entries.get_at_point(addr)
    }

    pub fn find_containing_mut(&mut self, addr: u64) -> Option<&mut Region> {
        self.entries.get_at_point_mut(addr)
    }

    /// Finds the region starting exactly at `base`
    ///
    /// Returns:
    /// - Ok(&Region) if a region starts at `base`
    /// - Err(VmError::NotFound) otherwise, including when `base` falls inside
    ///   a region without being its start
    pub fn find_exact(&self, base: u64) -> VmResult<&Region> {
        match self.entries.get_at_point(base) {
            Some(region) if region.base == base => Ok(region),
            _ => Err(VmError::NotFound(base)),
        }
    }

    pub fn find_exact_mut(&mut self, base: u64) -> VmResult<&mut Region> {
        match self.entries.get_at_point_mut(base) {
            Some(region) if region.base == base => Ok(region),
            _ => Err(VmError::NotFound(base)),
        }
    }

    /// Checks whether `[base, base + length)` is free of regions
    ///
    /// Arguments:
    /// - base: start of the candidate range
    /// - length: byte length of the candidate range
    /// - ignore: base of a region that does not count as an obstacle (the
    ///   region being resized in place)
    ///
    /// Returns false for empty or wrapping ranges
    pub fn is_range_free(&self, base: u64, length: u64, ignore: Option<u64>) -> bool {
        let end = match base.checked_add(length) {
            Some(end) if length > 0 => end,
            _ => return false,
        };
        self.entries
            .overlapping(ie(base, end))
            .all(|(_, region)| Some(region.base) == ignore)
    }

    /// Finds the lowest free range of at least `min_length` bytes
    ///
    /// Scans the regions in address order, treating the space before the
    /// first region, between consecutive regions and after the last region
    /// as candidate gaps, all clipped to `[lower, upper)`. The first gap that
    /// is large enough wins.
    ///
    /// Arguments:
    /// - min_length: bytes needed
    /// - lower: lowest acceptable start address
    /// - upper: exclusive upper bound of the search window
    ///
    /// Returns:
    /// - Ok(base) of the chosen range
    /// - Err(VmError::OutOfSpace) if no gap qualifies
    pub fn find_gap(&self, min_length: u64, lower: u64, upper: u64) -> VmResult<u64> {
        if min_length == 0 || lower >= upper {
            return Err(VmError::OutOfSpace(min_length));
        }

        let fits = |start: u64, limit: u64| match start.checked_add(min_length) {
            Some(end) => end <= limit,
            None => false,
        };

        let mut cursor = lower;
        for region in self.iter() {
            if region.end() <= cursor {
                continue;
            }
            if region.base >= upper {
                break;
            }
            if region.base > cursor && fits(cursor, region.base) {
                return Ok(cursor);
            }
            // the gap before this region is too small, move past it
            cursor = region.end();
            if cursor >= upper {
                return Err(VmError::OutOfSpace(min_length));
            }
        }

        if fits(cursor, upper) {
            Ok(cursor)
        } else {
            Err(VmError::OutOfSpace(min_length))
        }
    }

    /// Inserts a region, keeping address order
    ///
    /// Returns:
    /// - Ok(()) on success
    /// - Err(VmError::RegionLimit) if the list is full
    /// - Err(VmError::Overlap) if the region intersects an existing one; the
    ///   list is left untouched
    pub fn insert(&mut self, region: Region) -> VmResult<()> {
        if self.len() >= self.capacity {
            return Err(VmError::RegionLimit(self.capacity));
        }
        let (base, length) = (region.base, region.length);
        self.entries
            .insert_strict(ie(base, region.end()), region)
            .map_err(|_| VmError::Overlap { base, length })
    }

    /// Detaches and returns the region starting at `base`
    pub fn remove(&mut self, base: u64) -> VmResult<Region> {
        let end = self.find_exact(base)?.end();
        let mut removed: Vec<(Interval<u64>, Region)> =
            self.entries.remove_overlapping(ie(base, end)).collect();
        // non-overlap guarantees the exact match is the only region in range
        debug_assert_eq!(removed.len(), 1);
        removed
            .pop()
            .map(|(_, region)| region)
            .ok_or(VmError::NotFound(base))
    }

    /// Replaces the region starting at `old_base` with `region`
    ///
    /// The new interval may move or change size. The old region does not
    /// count as an obstacle. If the new interval collides with any other
    /// region the old one is restored and Err(VmError::Overlap) returned.
    pub fn replace(&mut self, old_base: u64, region: Region) -> VmResult<Region> {
        let old = self.remove(old_base)?;
        let (base, length) = (region.base, region.length);
        match self.entries.insert_strict(ie(base, region.end()), region) {
            Ok(()) => Ok(old),
            Err(_) => {
                let old_end = old.end();
                // the old interval was free a moment ago
                let _ = self.entries.insert_strict(ie(old_base, old_end), old);
                Err(VmError::Overlap { base, length })
            }
        }
    }

    /// Removes and returns every region, lowest first
    pub fn drain(&mut self) -> Vec<Region> {
        let bases: Vec<u64> = self.iter().map(|region| region.base).collect();
        bases
            .into_iter()
            .filter_map(|base| self.remove(base).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{KERNBASE, MMAPBASE, PAGESIZE};
    use crate::region::{MemoryBackingType, Sharing};

    fn anon(base: u64, pages: u64) -> Region {
        Region::new(
            base,
            pages * PAGESIZE,
            MemoryBackingType::Anonymous,
            Sharing::Private,
            false,
        )
        .unwrap()
    }

    fn bases(list: &RegionList) -> Vec<u64> {
        list.iter().map(|region| region.base).collect()
    }

    #[test]
    fn test_insert_keeps_address_order() {
        let mut list = RegionList::new(16);
        list.insert(anon(MMAPBASE + 8 * PAGESIZE, 1)).unwrap();
        list.insert(anon(MMAPBASE, 2)).unwrap();
        list.insert(anon(MMAPBASE + 4 * PAGESIZE, 1)).unwrap();

        assert_eq!(
            bases(&list),
            vec![MMAPBASE, MMAPBASE + 4 * PAGESIZE, MMAPBASE + 8 * PAGESIZE]
        );
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_insert_rejects_overlap_without_corruption() {
        let mut list = RegionList::new(16);
        list.insert(anon(MMAPBASE, 2)).unwrap();

        // overlaps the second page
        let err = list.insert(anon(MMAPBASE + PAGESIZE, 2)).unwrap_err();
        assert!(matches!(err, VmError::Overlap { .. }));
        assert_eq!(bases(&list), vec![MMAPBASE]);

        // touching is fine
        list.insert(anon(MMAPBASE + 2 * PAGESIZE, 1)).unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_insert_respects_capacity() {
        let mut list = RegionList::new(2);
        list.insert(anon(MMAPBASE, 1)).unwrap();
        list.insert(anon(MMAPBASE + PAGESIZE, 1)).unwrap();
        let err = list.insert(anon(MMAPBASE + 2 * PAGESIZE, 1)).unwrap_err();
        assert!(matches!(err, VmError::RegionLimit(2)));
    }

    #[test]
    fn test_find_containing_and_exact() {
        let mut list = RegionList::new(16);
        list.insert(anon(MMAPBASE, 2)).unwrap();

        assert!(list.find_containing(MMAPBASE + PAGESIZE + 5).is_some());
        assert!(list.find_containing(MMAPBASE + 2 * PAGESIZE).is_none());
        assert!(list.find_exact(MMAPBASE).is_ok());
        assert!(matches!(
            list.find_exact(MMAPBASE + PAGESIZE),
            Err(VmError::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_head_tail_interior_and_sole() {
        let mut list = RegionList::new(16);
        for i in 0..4 {
            list.insert(anon(MMAPBASE + i * 2 * PAGESIZE, 1)).unwrap();
        }

        // interior
        list.remove(MMAPBASE + 2 * PAGESIZE).unwrap();
        assert_eq!(
            bases(&list),
            vec![MMAPBASE, MMAPBASE + 4 * PAGESIZE, MMAPBASE + 6 * PAGESIZE]
        );
        // head
        list.remove(MMAPBASE).unwrap();
        assert_eq!(bases(&list), vec![MMAPBASE + 4 * PAGESIZE, MMAPBASE + 6 * PAGESIZE]);
        // tail
        list.remove(MMAPBASE + 6 * PAGESIZE).unwrap();
        assert_eq!(bases(&list), vec![MMAPBASE + 4 * PAGESIZE]);
        // sole element
        list.remove(MMAPBASE + 4 * PAGESIZE).unwrap();
        assert!(list.is_empty());

        // and the list is still usable
        list.insert(anon(MMAPBASE, 1)).unwrap();
        assert_eq!(bases(&list), vec![MMAPBASE]);
        assert!(matches!(list.remove(MMAPBASE + PAGESIZE), Err(VmError::NotFound(_))));
    }

    #[test]
    fn test_find_gap_first_fit() {
        let mut list = RegionList::new(16);
        assert_eq!(list.find_gap(PAGESIZE, MMAPBASE, KERNBASE).unwrap(), MMAPBASE);

        // [0,2) used, [2,3) free, [3,4) used, [4,..) free
        list.insert(anon(MMAPBASE, 2)).unwrap();
        list.insert(anon(MMAPBASE + 3 * PAGESIZE, 1)).unwrap();

        assert_eq!(
            list.find_gap(PAGESIZE, MMAPBASE, KERNBASE).unwrap(),
            MMAPBASE + 2 * PAGESIZE
        );
        assert_eq!(
            list.find_gap(2 * PAGESIZE, MMAPBASE, KERNBASE).unwrap(),
            MMAPBASE + 4 * PAGESIZE
        );
    }

    #[test]
    fn test_find_gap_before_first_region() {
        let mut list = RegionList::new(16);
        list.insert(anon(MMAPBASE + 2 * PAGESIZE, 1)).unwrap();
        assert_eq!(list.find_gap(2 * PAGESIZE, MMAPBASE, KERNBASE).unwrap(), MMAPBASE);
        assert_eq!(
            list.find_gap(3 * PAGESIZE, MMAPBASE, KERNBASE).unwrap(),
            MMAPBASE + 3 * PAGESIZE
        );
    }

    #[test]
    fn test_find_gap_exact_fit_at_upper_bound() {
        let mut list = RegionList::new(16);
        let upper = MMAPBASE + 4 * PAGESIZE;
        list.insert(anon(MMAPBASE, 3)).unwrap();

        assert_eq!(list.find_gap(PAGESIZE, MMAPBASE, upper).unwrap(), MMAPBASE + 3 * PAGESIZE);
        assert!(matches!(
            list.find_gap(2 * PAGESIZE, MMAPBASE, upper),
            Err(VmError::OutOfSpace(_))
        ));
        list.insert(anon(MMAPBASE + 3 * PAGESIZE, 1)).unwrap();
        assert!(list.find_gap(PAGESIZE, MMAPBASE, upper).is_err());
    }

    #[test]
    fn test_is_range_free_with_ignore() {
        let mut list = RegionList::new(16);
        list.insert(anon(MMAPBASE, 1)).unwrap();
        list.insert(anon(MMAPBASE + 3 * PAGESIZE, 1)).unwrap();

        assert!(!list.is_range_free(MMAPBASE, 2 * PAGESIZE, None));
        assert!(list.is_range_free(MMAPBASE, 3 * PAGESIZE, Some(MMAPBASE)));
        assert!(!list.is_range_free(MMAPBASE, 4 * PAGESIZE, Some(MMAPBASE)));
        assert!(!list.is_range_free(MMAPBASE, 0, None));
    }

    #[test]
    fn test_replace_restores_on_collision() {
        let mut list = RegionList::new(16);
        list.insert(anon(MMAPBASE, 1)).unwrap();
        list.insert(anon(MMAPBASE + 2 * PAGESIZE, 1)).unwrap();

        let grown = anon(MMAPBASE, 3);
        assert!(list.replace(MMAPBASE, grown).is_err());
        assert_eq!(list.find_exact(MMAPBASE).unwrap().length, PAGESIZE);

        let grown = anon(MMAPBASE, 2);
        let old = list.replace(MMAPBASE, grown).unwrap();
        assert_eq!(old.length, PAGESIZE);
        assert_eq!(list.find_exact(MMAPBASE).unwrap().length, 2 * PAGESIZE);
    }
}
