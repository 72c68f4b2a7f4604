//! Address space: the mapping facade
//!
//! An `AddressSpace` is the explicit context every mapping operation runs
//! against. It pairs the region list (what is mapped where) with the
//! page-table bridge (which pages are actually in memory). Mapping is lazy:
//! `map` and a growing `remap` only change the region list, and frames are
//! allocated one page at a time by `handle_fault`.
//!
//! The owning process serializes access with its own lock, so nothing here
//! is internally synchronized.

use crate::bridge::PageTableBridge;
use crate::config::VmConfig;
use crate::constants::{round_down_page, round_up_page, PAGESIZE};
use crate::error::{VmError, VmResult};
use crate::flags::{MapFlags, RemapFlags};
use crate::info::{PageMapping, RegionInfo};
use crate::interface::{BackingStore, FrameAllocator, PageTable, PteFlags};
use crate::region::{MemoryBackingType, Region};
use crate::region_list::RegionList;
use std::sync::Arc;

pub struct AddressSpace {
    config: VmConfig,
    regions: RegionList,
    bridge: PageTableBridge,
}

impl AddressSpace {
    /// Creates an empty address space
    ///
    /// Returns Err(VmError::InvalidConfig) if `config` does not validate
    pub fn new(
        config: VmConfig,
        page_table: Box<dyn PageTable>,
        frames: Arc<dyn FrameAllocator>,
        files: Arc<dyn BackingStore>,
    ) -> VmResult<Self> {
        config.validate()?;
        Ok(AddressSpace {
            config,
            regions: RegionList::new(config.max_regions),
            bridge: PageTableBridge::new(page_table, config.max_resident_pages, frames, files),
        })
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn regions(&self) -> &RegionList {
        &self.regions
    }

    pub fn bridge(&self) -> &PageTableBridge {
        &self.bridge
    }

    /// Maps a new region without allocating any frame
    ///
    /// Arguments:
    /// - hint: wanted base address, only used with `MapFlags::FIXED`; rounded
    ///   down to a page boundary
    /// - length: byte length, rounded up to whole pages
    /// - flags: exactly one of PRIVATE/SHARED, optionally ANONYMOUS and FIXED
    /// - fd: backing file descriptor, ignored for anonymous maps
    ///
    /// Returns:
    /// - Ok(base) of the new region
    /// - Err(InvalidArgument) for a zero length, a length beyond the mappable
    ///   window or bad flags
    /// - Err(BadFileDescriptor) if a file-backed map names an unknown fd
    /// - Err(OutOfRange / Overlap) if a fixed range is unusable
    /// - Err(OutOfSpace) if no gap is large enough
    /// - Err(RegionLimit) if the process already has the maximum regions
    pub fn map(&mut self, hint: u64, length: u64, flags: MapFlags, fd: i32) -> VmResult<u64> {
        let length = self.page_length(length)?;
        let sharing = flags.sharing()?;
        let backing = if flags.is_anonymous() {
            MemoryBackingType::Anonymous
        } else {
            if !self.bridge.files().is_open(fd) {
                return Err(VmError::BadFileDescriptor(fd));
            }
            MemoryBackingType::FileDescriptor { fd, offset: 0 }
        };

        let base = if flags.is_fixed() {
            let base = round_down_page(hint);
            self.check_window(base, length)?;
            if !self.regions.is_range_free(base, length, None) {
                return Err(VmError::Overlap { base, length });
            }
            base
        } else {
            self.regions
                .find_gap(length, self.config.mmap_base, self.config.kern_base)?
        };

        let region = Region::new(base, length, backing, sharing, flags.is_fixed())?;
        self.regions.insert(region)?;
        log::debug!(
            "map {:#x}+{:#x} {:?} {:?}{}",
            base,
            length,
            backing,
            sharing,
            if flags.is_fixed() { " fixed" } else { "" }
        );
        Ok(base)
    }

    /// Unmaps the region starting at `addr`
    ///
    /// Resident pages of a shared file-backed region are written to the file
    /// before any frame is freed. If a write fails the region stays mapped
    /// and untouched.
    ///
    /// Returns:
    /// - Ok(()) once the region and all its frames are gone
    /// - Err(InvalidArgument) if `addr` lies inside a region but is not its base
    /// - Err(NotFound) if no region covers `addr`
    pub fn unmap(&mut self, addr: u64) -> VmResult<()> {
        let region = self.locate(addr)?.clone();
        self.bridge.flush_range(&region, region.base, region.end())?;

        let mut region = self.regions.remove(addr)?;
        let (base, end) = (region.base, region.end());
        let freed = self.bridge.discard_range(&mut region, base, end);
        log::debug!("unmap {:#x}+{:#x}, {} frames freed", base, region.length, freed);
        Ok(())
    }

    /// Resizes the region at `old_addr`, moving it if needed and allowed
    ///
    /// The region is resized in place when `[old_addr, old_addr + new_size)`
    /// overlaps no other region and stays below the kernel boundary. Shrinking
    /// writes back (shared file-backed regions) and frees the pages that fall
    /// off the end. Growing allocates nothing.
    ///
    /// Otherwise, with `RemapFlags::MAYMOVE`, the region moves to the lowest
    /// gap that can hold `new_size` bytes. The old range still counts as
    /// occupied during that search. Resident frames move with the region.
    ///
    /// Returns:
    /// - Ok(base) of the region after the call
    /// - Err(SizeMismatch) if `old_size` is not the recorded length
    /// - Err(InvalidArgument) for a zero `new_size` or an interior `old_addr`
    /// - Err(NotFound) if no region covers `old_addr`
    /// - Err(OutOfSpace) if it cannot grow in place and may not (or cannot) move
    pub fn remap(
        &mut self,
        old_addr: u64,
        old_size: u64,
        new_size: u64,
        flags: RemapFlags,
    ) -> VmResult<u64> {
        let region = self.locate(old_addr)?.clone();
        if old_size != region.length {
            return Err(VmError::SizeMismatch {
                declared: old_size,
                recorded: region.length,
            });
        }
        let new_size = self.page_length(new_size)?;

        let fits_in_place = self.check_window(region.base, new_size).is_ok()
            && self
                .regions
                .is_range_free(region.base, new_size, Some(region.base));

        if fits_in_place {
            self.resize_in_place(region, new_size)
        } else if flags.may_move() {
            self.relocate(region, new_size)
        } else {
            Err(VmError::OutOfSpace(new_size))
        }
    }

    fn resize_in_place(&mut self, region: Region, new_size: u64) -> VmResult<u64> {
        let (base, old_end) = (region.base, region.end());
        let new_end = base + new_size;
        if new_size < region.length {
            self.bridge.flush_range(&region, new_end, old_end)?;
        }

        let mut resized = region.clone();
        if new_size < region.length {
            self.bridge.discard_range(&mut resized, new_end, old_end);
        }
        resized.length = new_size;
        // re-keys the interval in the region list
        self.regions.replace(base, resized)?;
        log::debug!("remap {:#x} in place, {:#x} -> {:#x}", base, region.length, new_size);
        Ok(base)
    }

    fn relocate(&mut self, region: Region, new_size: u64) -> VmResult<u64> {
        let new_base = self
            .regions
            .find_gap(new_size, self.config.mmap_base, self.config.kern_base)?;

        // no longer at the address the caller fixed
        let mut moved = Region::new(new_base, new_size, region.backing, region.sharing, false)?;
        moved.resident_pages = region.resident_pages;
        self.bridge.migrate(&region, new_base, region.pte_flags())?;
        self.regions.replace(region.base, moved)?;
        log::debug!(
            "remap {:#x}+{:#x} moved to {:#x}+{:#x}",
            region.base,
            region.length,
            new_base,
            new_size
        );
        Ok(new_base)
    }

    /// Resolves a page fault at `addr`
    ///
    /// Returns:
    /// - Ok(frame) now backing the page (the existing one if already resident)
    /// - Err(BadAddress) if no region covers `addr`
    /// - Err(OutOfMemory) if no frame could be allocated
    pub fn handle_fault(&mut self, addr: u64) -> VmResult<u64> {
        let region = self
            .regions
            .find_containing_mut(addr)
            .ok_or(VmError::BadAddress(addr))?;
        self.bridge.resolve_fault(region, round_down_page(addr))
    }

    /// Copies `buf.len()` bytes starting at `addr` out of the address space,
    /// faulting in pages on first touch.
    pub fn read_user(&mut self, addr: u64, buf: &mut [u8]) -> VmResult<()> {
        let mut done = 0;
        while done < buf.len() {
            let va = addr
                .checked_add(done as u64)
                .ok_or(VmError::BadAddress(addr))?;
            let page = round_down_page(va);
            let offset = (va - page) as usize;
            let chunk = (PAGESIZE as usize - offset).min(buf.len() - done);
            self.handle_fault(va)?;
            self.bridge.read_page(page, offset, &mut buf[done..done + chunk])?;
            done += chunk;
        }
        Ok(())
    }

    /// Copies `data` into the address space at `addr`, faulting in pages on
    /// first touch.
    pub fn write_user(&mut self, addr: u64, data: &[u8]) -> VmResult<()> {
        let mut done = 0;
        while done < data.len() {
            let va = addr
                .checked_add(done as u64)
                .ok_or(VmError::BadAddress(addr))?;
            let page = round_down_page(va);
            let offset = (va - page) as usize;
            let chunk = (PAGESIZE as usize - offset).min(data.len() - done);
            self.handle_fault(va)?;
            self.bridge.write_page(page, offset, &data[done..done + chunk])?;
            done += chunk;
        }
        Ok(())
    }

    /// Reports every region, lowest base first, into `buf`
    ///
    /// Returns:
    /// - Ok(count) of records written
    /// - Err(BufferTooSmall) if `buf` cannot hold every region; nothing is
    ///   written in that case
    pub fn query_regions(&self, buf: &mut [RegionInfo]) -> VmResult<usize> {
        let needed = self.regions.len();
        if needed > buf.len() {
            return Err(VmError::BufferTooSmall {
                needed,
                capacity: buf.len(),
            });
        }
        for (slot, region) in buf.iter_mut().zip(self.regions.iter()) {
            *slot = RegionInfo {
                base: region.base,
                length: region.length,
                resident_pages: region.resident_pages,
            };
        }
        Ok(needed)
    }

    /// Walks the page table and reports present user pages, lowest address
    /// first, up to the resident-table capacity and the length of `buf`.
    /// Read only.
    ///
    /// Returns the number of records written.
    pub fn query_page_table(&self, buf: &mut [PageMapping]) -> usize {
        let limit = buf.len().min(self.config.max_resident_pages);
        let mut count = 0;
        let user_pages = self
            .bridge
            .page_table()
            .entries()
            .into_iter()
            .filter(|entry| entry.flags.contains(PteFlags::PRESENT | PteFlags::USER));
        for (slot, entry) in buf.iter_mut().zip(user_pages).take(limit) {
            *slot = PageMapping {
                va: entry.va,
                pa: entry.pa,
            };
            count += 1;
        }
        count
    }

    /// Unmaps every region, writing back shared file-backed pages
    ///
    /// Used at process teardown, so a failed write-back is logged and the
    /// frames are freed anyway. Returns the first write-back error, if any.
    pub fn release_all(&mut self) -> VmResult<()> {
        let mut first_error = None;
        for mut region in self.regions.drain() {
            let (base, end) = (region.base, region.end());
            if let Err(e) = self.bridge.flush_range(&region, base, end) {
                log::warn!("write-back of region {:#x} failed during teardown: {}", base, e);
                first_error.get_or_insert(e);
            }
            self.bridge.discard_range(&mut region, base, end);
        }
        log::debug!("address space released");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Checks the structural invariants of the address space
    ///
    /// Returns Err(description) naming the first violation found
    pub fn check_invariants(&self) -> Result<(), String> {
        let page_table = self.bridge.page_table();
        let mut prev_end = self.config.mmap_base;
        for region in self.regions.iter() {
            if region.length == 0 || region.base % PAGESIZE != 0 || region.length % PAGESIZE != 0 {
                return Err(format!("region {:#x} is malformed", region.base));
            }
            if region.base < prev_end {
                return Err(format!("region {:#x} overlaps or is out of order", region.base));
            }
            if region.end() > self.config.kern_base {
                return Err(format!("region {:#x} crosses the kernel boundary", region.base));
            }
            let present = region
                .page_addrs()
                .filter(|page| page_table.translate(*page).is_some())
                .count();
            if present != region.resident_pages {
                return Err(format!(
                    "region {:#x} counts {} resident pages, page table has {}",
                    region.base, region.resident_pages, present
                ));
            }
            prev_end = region.end();
        }

        let mapped: usize = self.regions.iter().map(|region| region.resident_pages).sum();
        if page_table.entries().len() != mapped {
            return Err("page table maps pages outside every region".to_string());
        }

        let resident = self.bridge.resident();
        let expected = resident.capacity().min(mapped);
        if resident.len() != expected {
            return Err(format!(
                "resident table records {} pages, {} expected",
                resident.len(),
                expected
            ));
        }
        for entry in resident.iter() {
            if page_table.translate(entry.va) != Some(entry.pa) {
                return Err(format!("resident entry {:#x} is stale", entry.va));
            }
        }
        Ok(())
    }

    /// Finds the region starting at `addr` for unmap and remap
    fn locate(&self, addr: u64) -> VmResult<&Region> {
        match self.regions.find_containing(addr) {
            Some(region) if region.base == addr => Ok(region),
            Some(_) => Err(VmError::InvalidArgument("address is not the start of a region")),
            None => Err(VmError::NotFound(addr)),
        }
    }

    /// Rounds a requested length up to whole pages and bounds it by the
    /// size of the mappable window
    fn page_length(&self, length: u64) -> VmResult<u64> {
        if length == 0 {
            return Err(VmError::InvalidArgument("length cannot be zero"));
        }
        match round_up_page(length) {
            Some(length) if length <= self.config.window_size() => Ok(length),
            _ => Err(VmError::InvalidArgument("length exceeds the mappable window")),
        }
    }

    fn check_window(&self, base: u64, length: u64) -> VmResult<()> {
        let inside = base >= self.config.mmap_base
            && base
                .checked_add(length)
                .map_or(false, |end| end <= self.config.kern_base);
        if inside {
            Ok(())
        } else {
            Err(VmError::OutOfRange { base, length })
        }
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        if self.regions.is_empty() {
            return;
        }
        if let Err(e) = self.release_all() {
            log::error!("address space dropped with a failed write-back: {}", e);
        }
    }
}
