//! Region descriptor
//!
//! A `Region` is one mapped virtual range of a process together with its
//! backing and sharing attributes. Regions never own physical frames
//! directly: the frames of resident pages live in the page table and are
//! only counted here (`resident_pages`).

use crate::constants::{is_page_aligned, PAGESIZE};
use crate::error::{VmError, VmResult};
use crate::interface::PteFlags;

/// Used to identify whether the region is backed anonymously or by an fd
///
/// - Anonymous: zero-filled on first touch, discarded on unmap
/// - FileDescriptor: populated from the file on first touch; `offset` is the
///   file offset that corresponds to the region's base address
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MemoryBackingType {
    Anonymous,
    FileDescriptor { fd: i32, offset: u64 },
}

/// Whether writes to the region are flushed back to its backing file
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Sharing {
    Private,
    Shared,
}

/// A single mapped virtual range.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Region {
    pub base: u64,                  // page aligned start of the range
    pub length: u64,                // positive multiple of PAGESIZE
    pub backing: MemoryBackingType, // zero-fill or populate-from-file
    pub sharing: Sharing,           // write-back vs. discard on unmap
    pub fixed: bool,                // caller demanded this exact base
    pub resident_pages: usize,      // pages faulted in so far
}

impl Region {
    /// Creates a new Region with no resident pages
    ///
    /// Arguments:
    /// - base: page aligned start address
    /// - length: byte length, a positive multiple of the page size
    /// - backing: anonymous or file-backed
    /// - sharing: private or shared
    /// - fixed: whether the caller demanded `base` exactly
    ///
    /// Returns Err(VmError::InvalidArgument) if `base` or `length` breaks the
    /// alignment rules, or if the range wraps around the address space
    pub fn new(
        base: u64,
        length: u64,
        backing: MemoryBackingType,
        sharing: Sharing,
        fixed: bool,
    ) -> VmResult<Self> {
        if length == 0 {
            return Err(VmError::InvalidArgument("region length cannot be zero"));
        }
        if !is_page_aligned(base) || !is_page_aligned(length) {
            return Err(VmError::InvalidArgument("region is not page aligned"));
        }
        if base.checked_add(length).is_none() {
            return Err(VmError::InvalidArgument("region wraps the address space"));
        }
        Ok(Region {
            base,
            length,
            backing,
            sharing,
            fixed,
            resident_pages: 0,
        })
    }

    /// Exclusive end address.
    pub fn end(&self) -> u64 {
        self.base + self.length
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.base <= addr && addr < self.end()
    }

    pub fn page_count(&self) -> u64 {
        self.length / PAGESIZE
    }

    /// Page aligned addresses of every page in the region, lowest first.
    pub fn page_addrs(&self) -> impl Iterator<Item = u64> {
        (self.base..self.end()).step_by(PAGESIZE as usize)
    }

    pub fn is_file_backed(&self) -> bool {
        matches!(self.backing, MemoryBackingType::FileDescriptor { .. })
    }

    /// Shared file-backed regions are the only ones whose pages reach the
    /// backing file when they are released.
    pub fn needs_write_back(&self) -> bool {
        self.sharing == Sharing::Shared && self.is_file_backed()
    }

    /// File descriptor and file offset backing the page at `page_addr`, or
    /// None for anonymous regions.
    pub fn file_position(&self, page_addr: u64) -> Option<(i32, u64)> {
        match self.backing {
            MemoryBackingType::FileDescriptor { fd, offset } => {
                Some((fd, offset + (page_addr - self.base)))
            }
            MemoryBackingType::Anonymous => None,
        }
    }

    /// Page-table permissions granted to the region's frames.
    ///
    /// Both sharing modes hand out writable user pages; sharing only decides
    /// what happens to the contents on release.
    pub fn pte_flags(&self) -> PteFlags {
        PteFlags::PRESENT | PteFlags::USER | PteFlags::WRITABLE
    }
}
