//! Page-table bridge
//!
//! The bridge owns everything below the region list: the process's page
//! table, its resident-page table, and handles to the shared frame allocator
//! and the backing store. It is the only code that maps, unmaps or moves a
//! frame, so the resident-page table and each region's `resident_pages`
//! counter are updated in the same place as the page table.
//!
//! Releasing pages happens in two passes. `flush_range` copies the resident
//! pages of a shared file-backed region out to the file while every frame is
//! still mapped; `discard_range` then unmaps and frees them. A failed flush
//! therefore leaves the region exactly as it was.

use crate::constants::{is_page_aligned, PAGESIZE};
use crate::error::{VmError, VmResult};
use crate::interface::{BackingStore, FrameAllocator, PageTable, PteFlags};
use crate::region::Region;
use crate::resident::ResidentPageTable;
use std::sync::Arc;

pub struct PageTableBridge {
    page_table: Box<dyn PageTable>,
    resident: ResidentPageTable,
    frames: Arc<dyn FrameAllocator>,
    files: Arc<dyn BackingStore>,
}

impl PageTableBridge {
    pub fn new(
        page_table: Box<dyn PageTable>,
        resident_capacity: usize,
        frames: Arc<dyn FrameAllocator>,
        files: Arc<dyn BackingStore>,
    ) -> Self {
        PageTableBridge {
            page_table,
            resident: ResidentPageTable::new(resident_capacity),
            frames,
            files,
        }
    }

    pub fn page_table(&self) -> &dyn PageTable {
        self.page_table.as_ref()
    }

    pub fn resident(&self) -> &ResidentPageTable {
        &self.resident
    }

    pub fn files(&self) -> &dyn BackingStore {
        self.files.as_ref()
    }

    pub fn frames(&self) -> &dyn FrameAllocator {
        self.frames.as_ref()
    }

    /// Frame currently backing the page at `page`, if resident
    pub fn frame_of(&self, page: u64) -> Option<u64> {
        self.page_table.translate(page)
    }

    /// Brings the page at `page` of `region` into memory
    ///
    /// Allocates one frame, zero-fills it (anonymous) or fills it from the
    /// backing file (file-backed; bytes past end of file read as zero), maps
    /// it with the region's permissions and records it as resident. A page
    /// that is already resident is left alone.
    ///
    /// Returns:
    /// - Ok(frame) backing the page
    /// - Err(VmError::OutOfMemory) if no frame is free
    /// - Err(VmError::BadFileDescriptor / Io) if populating from the file fails;
    ///   the frame is returned to the allocator
    pub fn resolve_fault(&mut self, region: &mut Region, page: u64) -> VmResult<u64> {
        debug_assert!(is_page_aligned(page) && region.contains(page));
        if let Some(frame) = self.page_table.translate(page) {
            return Ok(frame);
        }

        let frame = self.frames.allocate_frame()?;
        if let Err(e) = self.populate(region, page, frame) {
            self.frames.free_frame(frame);
            return Err(e);
        }
        if let Err(e) = self.page_table.map_frame(page, frame, region.pte_flags()) {
            self.frames.free_frame(frame);
            return Err(e);
        }

        region.resident_pages += 1;
        if !self.resident.insert(page, frame) {
            log::trace!("resident table full, {:#x} tracked by page table only", page);
        }
        log::trace!("fault at {:#x} resolved with frame {:#x}", page, frame);
        Ok(frame)
    }

    fn populate(&self, region: &Region, page: u64, frame: u64) -> VmResult<()> {
        match region.file_position(page) {
            Some((fd, offset)) => {
                let mut buf = vec![0u8; PAGESIZE as usize];
                let n = self.files.read_at(fd, offset, &mut buf)?;
                if n < buf.len() {
                    log::trace!("short read of {} bytes from fd {} at {:#x}", n, fd, offset);
                }
                self.frames.write_frame(frame, 0, &buf);
            }
            None => self.frames.zero_frame(frame),
        }
        Ok(())
    }

    /// Writes the resident pages of `region` inside `[start, end)` back to
    /// its file. No-op for regions that are not shared and file-backed.
    ///
    /// Returns the number of pages written.
    pub fn flush_range(&self, region: &Region, start: u64, end: u64) -> VmResult<usize> {
        if !region.needs_write_back() {
            return Ok(0);
        }
        let mut written = 0;
        let mut buf = vec![0u8; PAGESIZE as usize];
        for page in region.page_addrs().filter(|page| start <= *page && *page < end) {
            let frame = match self.page_table.translate(page) {
                Some(frame) => frame,
                None => continue,
            };
            if let Some((fd, offset)) = region.file_position(page) {
                self.frames.read_frame(frame, 0, &mut buf);
                self.files.write_at(fd, offset, &buf)?;
                written += 1;
            }
        }
        if written > 0 {
            log::debug!(
                "wrote back {} pages of region {:#x} in [{:#x}, {:#x})",
                written,
                region.base,
                start,
                end
            );
        }
        Ok(written)
    }

    /// Unmaps and frees every resident page of `region` inside `[start, end)`
    /// without any I/O, forgetting them in the resident-page table.
    ///
    /// Returns the number of frames freed.
    pub fn discard_range(&mut self, region: &mut Region, start: u64, end: u64) -> usize {
        let pages: Vec<u64> = region
            .page_addrs()
            .filter(|page| start <= *page && *page < end)
            .collect();
        let mut freed = 0;
        for page in pages {
            if let Some(frame) = self.page_table.unmap_frame(page) {
                self.frames.free_frame(frame);
                freed += 1;
            }
        }
        self.resident.remove_range(start, end);
        region.resident_pages -= freed;
        self.refill_resident();
        freed
    }

    /// Records resident pages the table had no room for, lowest address
    /// first, until the table is full or every page is recorded
    fn refill_resident(&mut self) {
        if self.resident.len() == self.resident.capacity() {
            return;
        }
        for entry in self.page_table.entries() {
            if self.resident.lookup(entry.va).is_some() {
                continue;
            }
            if !self.resident.insert(entry.va, entry.pa) {
                break;
            }
            log::trace!("resident table now records {:#x}", entry.va);
        }
    }

    /// Moves every resident frame of `old` to the same offset from `new_base`
    ///
    /// Frames are re-mapped, never copied or reallocated, so their contents
    /// follow them. The target range must hold no mapped pages.
    pub fn migrate(&mut self, old: &Region, new_base: u64, flags: PteFlags) -> VmResult<()> {
        for page in old.page_addrs() {
            let frame = match self.page_table.unmap_frame(page) {
                Some(frame) => frame,
                None => continue,
            };
            let new_page = new_base + (page - old.base);
            self.page_table.map_frame(new_page, frame, flags)?;
            self.resident.rekey(page, new_page);
            log::trace!("moved frame {:#x} from {:#x} to {:#x}", frame, page, new_page);
        }
        self.refill_resident();
        Ok(())
    }

    /// Copies bytes out of the resident page at `page`
    pub fn read_page(&self, page: u64, offset: usize, buf: &mut [u8]) -> VmResult<()> {
        let frame = self.page_table.translate(page).ok_or(VmError::BadAddress(page))?;
        self.frames.read_frame(frame, offset, buf);
        Ok(())
    }

    /// Copies bytes into the resident page at `page`
    pub fn write_page(&self, page: u64, offset: usize, data: &[u8]) -> VmResult<()> {
        let frame = self.page_table.translate(page).ok_or(VmError::BadAddress(page))?;
        self.frames.write_frame(frame, offset, data);
        Ok(())
    }
}
