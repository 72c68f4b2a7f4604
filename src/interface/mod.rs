//! Interfaces to the collaborators the region manager is layered on
//!
//! The page-table walker, the physical frame allocator and the file
//! abstraction are not part of the region manager. They are consumed through
//! the three traits below. Each trait also has a host implementation in this
//! module so that an address space can run (and be tested) without a kernel
//! underneath it.

mod file;
mod frame;
mod page_table;

pub use file::*;
pub use frame::*;
pub use page_table::*;

use crate::error::VmResult;
use bitflags::bitflags;

bitflags! {
    /// Page-table entry permission bits (x86 layout)
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PteFlags: u32 {
        const PRESENT = 0x001;
        const WRITABLE = 0x002;
        const USER = 0x004;
    }
}

/// One present translation reported by a page-table walk
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mapping {
    pub va: u64,        // page aligned virtual address
    pub pa: u64,        // physical address of the frame
    pub flags: PteFlags,
}

/// Per-process page table
///
/// All addresses handed to `map_frame` / `unmap_frame` are page aligned.
pub trait PageTable: Send {
    /// Physical address backing `va`, or None if the page is not present
    fn translate(&self, va: u64) -> Option<u64>;

    /// Installs `frame` at `va`. Fails if `va` is already present.
    fn map_frame(&mut self, va: u64, frame: u64, flags: PteFlags) -> VmResult<()>;

    /// Removes the entry at `va` and hands back its frame
    fn unmap_frame(&mut self, va: u64) -> Option<u64>;

    /// Walks the whole table and returns every present entry, lowest
    /// virtual address first. Read only.
    fn entries(&self) -> Vec<Mapping>;
}

/// Physical frame allocator, shared by every process
///
/// Frames are identified by their physical address. Contents are reached
/// through copies so an implementation never has to hand out references
/// into physical memory.
pub trait FrameAllocator: Send + Sync {
    /// Returns a free frame, or Err(VmError::OutOfMemory)
    fn allocate_frame(&self) -> VmResult<u64>;

    /// Returns `frame` to the free pool. Freeing a frame twice is a bug.
    fn free_frame(&self, frame: u64);

    /// Copies `buf.len()` bytes out of `frame`, starting at `offset`
    fn read_frame(&self, frame: u64, offset: usize, buf: &mut [u8]);

    /// Copies `data` into `frame`, starting at `offset`
    fn write_frame(&self, frame: u64, offset: usize, data: &[u8]);

    fn zero_frame(&self, frame: u64) {
        self.write_frame(frame, 0, &[0u8; crate::constants::PAGESIZE as usize]);
    }
}

/// Positioned I/O on a process's file descriptors
pub trait BackingStore: Send + Sync {
    fn is_open(&self, fd: i32) -> bool;

    /// Reads up to `buf.len()` bytes at `offset`; returns the number read,
    /// which is short at end of file
    fn read_at(&self, fd: i32, offset: u64, buf: &mut [u8]) -> VmResult<usize>;

    /// Writes all of `data` at `offset`
    fn write_at(&self, fd: i32, offset: u64, data: &[u8]) -> VmResult<()>;
}
