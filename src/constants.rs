//! This file defines the constants of the wmap address-space layout and the
//! flag values of the `wmap` / `wremap` system-call ABI.
//!
/// ===== Paging =====
///
/// Size of one page (and of one physical frame) in bytes.
pub const PAGESIZE: u64 = 4096;
/// `log2(PAGESIZE)`, used to turn addresses into page numbers.
pub const PAGESHIFT: u64 = 12;

/// ===== Address-space layout =====
///
/// Lowest address a region may occupy. Placement searches start here.
pub const MMAPBASE: u64 = 0x6000_0000;
/// First address owned by the kernel. Every region must end at or below it.
pub const KERNBASE: u64 = 0x8000_0000;

/// ===== Per-process limits =====
///
/// Maximum number of concurrent regions per process. Also the capacity of
/// the `WmapInfo` record filled by `getwmapinfo`.
pub const MAX_WMMAP_INFO: usize = 16;
/// Maximum number of resident pages tracked in the resident-page table and
/// reported by `getpgdirinfo`.
pub const MAX_UPAGE_INFO: usize = 32;

/// ===== wmap flags =====
pub const MAP_PRIVATE: u32 = 0x0001;
pub const MAP_SHARED: u32 = 0x0002;
pub const MAP_ANONYMOUS: u32 = 0x0004;
pub const MAP_FIXED: u32 = 0x0008;

/// ===== wremap flags =====
pub const MREMAP_MAYMOVE: u32 = 0x1;

/// Value returned by the introspection syscalls on success.
pub const SUCCESS: i64 = 0;

/// Round `length` up to the next multiple of `PAGESIZE`.
///
/// # Arguments
/// * `length` - length in bytes
///
/// # Returns
/// * `Some(u64)` - rounded up length
/// * `None` - rounding would overflow `u64`
pub fn round_up_page(length: u64) -> Option<u64> {
    if length % PAGESIZE == 0 {
        Some(length)
    } else {
        (length / PAGESIZE + 1).checked_mul(PAGESIZE)
    }
}

/// Round `addr` down to the page boundary containing it.
pub fn round_down_page(addr: u64) -> u64 {
    addr & !(PAGESIZE - 1)
}

pub fn is_page_aligned(addr: u64) -> bool {
    addr % PAGESIZE == 0
}
