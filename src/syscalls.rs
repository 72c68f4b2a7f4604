//! The wmap system-call family
//!
//! These are the entry points the trap layer calls once it has decoded the
//! raw arguments. Each one looks up the calling process, takes its
//! address-space lock for the whole call and flattens the outcome into an
//! integer: an address or 0 on success, a negated errno on failure.

use crate::constants::{MAX_UPAGE_INFO, MAX_WMMAP_INFO, SUCCESS};
use crate::error::{syscall_error, VmError};
use crate::flags::{MapFlags, RemapFlags};
use crate::info::{PageMapping, PgdirInfo, RegionInfo, WmapInfo};
use crate::process::get_process;

fn fail(e: VmError, syscall: &str) -> i64 {
    syscall_error(e.errno(), syscall, &e.to_string())
}

/// Handler of `wmap`
///
/// # Arguments
/// * `pid` - process issuing the call
/// * `addr` - wanted base address, only honored with `MAP_FIXED`
/// * `length` - bytes to map, rounded up to whole pages
/// * `flags` - `MAP_PRIVATE` or `MAP_SHARED`, plus `MAP_ANONYMOUS` / `MAP_FIXED`
/// * `fd` - backing file descriptor, ignored with `MAP_ANONYMOUS`
///
/// # Returns
/// * `i64` - base address of the new region, or a negated errno
pub fn wmap_syscall(pid: u64, addr: u64, length: u64, flags: u32, fd: i32) -> i64 {
    let process = match get_process(pid) {
        Ok(process) => process,
        Err(e) => return fail(e, "wmap"),
    };
    let flags = match MapFlags::from_raw(flags) {
        Ok(flags) => flags,
        Err(e) => return fail(e, "wmap"),
    };
    let result = process.space().map(addr, length, flags, fd);
    match result {
        Ok(base) => base as i64,
        Err(e) => fail(e, "wmap"),
    }
}

/// Handler of `wunmap`
///
/// # Arguments
/// * `pid` - process issuing the call
/// * `addr` - base address of the region to remove
///
/// # Returns
/// * `i64` - 0 for success, or a negated errno
pub fn wunmap_syscall(pid: u64, addr: u64) -> i64 {
    let process = match get_process(pid) {
        Ok(process) => process,
        Err(e) => return fail(e, "wunmap"),
    };
    let result = process.space().unmap(addr);
    match result {
        Ok(()) => SUCCESS,
        Err(e) => fail(e, "wunmap"),
    }
}

/// Handler of `wremap`
///
/// # Arguments
/// * `pid` - process issuing the call
/// * `oldaddr` - base address of the region to resize
/// * `oldsize` - current length of that region, must match exactly
/// * `newsize` - wanted length, rounded up to whole pages
/// * `flags` - 0 or `MREMAP_MAYMOVE`
///
/// # Returns
/// * `i64` - base address of the region after the call, or a negated errno
pub fn wremap_syscall(pid: u64, oldaddr: u64, oldsize: u64, newsize: u64, flags: u32) -> i64 {
    let process = match get_process(pid) {
        Ok(process) => process,
        Err(e) => return fail(e, "wremap"),
    };
    let flags = match RemapFlags::from_raw(flags) {
        Ok(flags) => flags,
        Err(e) => return fail(e, "wremap"),
    };
    let result = process.space().remap(oldaddr, oldsize, newsize, flags);
    match result {
        Ok(base) => base as i64,
        Err(e) => fail(e, "wremap"),
    }
}

/// Handler of `getwmapinfo`: fills `info` with every region of the process
pub fn getwmapinfo_syscall(pid: u64, info: &mut WmapInfo) -> i64 {
    let process = match get_process(pid) {
        Ok(process) => process,
        Err(e) => return fail(e, "getwmapinfo"),
    };
    let mut regions = [RegionInfo::default(); MAX_WMMAP_INFO];
    let result = process.space().query_regions(&mut regions);
    match result {
        Ok(count) => {
            info.fill(&regions[..count]);
            SUCCESS
        }
        Err(e) => fail(e, "getwmapinfo"),
    }
}

/// Handler of `getpgdirinfo`: fills `info` with the present user pages of
/// the process, lowest address first
pub fn getpgdirinfo_syscall(pid: u64, info: &mut PgdirInfo) -> i64 {
    let process = match get_process(pid) {
        Ok(process) => process,
        Err(e) => return fail(e, "getpgdirinfo"),
    };
    let mut pages = [PageMapping::default(); MAX_UPAGE_INFO];
    let count = process.space().query_page_table(&mut pages);
    info.fill(&pages[..count]);
    SUCCESS
}

/// Page-fault entry point
///
/// Resolves a fault at `addr` for process `pid`. A fault the region manager
/// cannot satisfy (no region covers the address, or no frame is left) marks
/// the process killed; the caller must then terminate it with
/// `exit_process`.
///
/// # Returns
/// * `i64` - 0 once the page is resident, or a negated errno
pub fn pagefault_handler(pid: u64, addr: u64) -> i64 {
    let process = match get_process(pid) {
        Ok(process) => process,
        Err(e) => return fail(e, "pagefault"),
    };
    let result = process.space().handle_fault(addr);
    match result {
        Ok(_) => SUCCESS,
        Err(e) => {
            if matches!(e, VmError::OutOfMemory | VmError::BadAddress(_)) {
                log::error!("process {} killed by fault at {:#x}: {}", pid, addr, e);
                process.kill();
            }
            fail(e, "pagefault")
        }
    }
}
