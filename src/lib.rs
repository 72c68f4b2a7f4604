//! This crate provides `wmap`, a lazy per-process virtual memory region
//! manager.  A process maps ranges of its address space with `wmap`, resizes
//! or moves them with `wremap` and removes them with `wunmap`.  No physical
//! memory is committed at map time: each page gets a frame on first touch,
//! zero-filled for anonymous regions or read from the backing file for
//! file-backed ones.  When a shared file-backed region is unmapped, its
//! resident pages are written back to the file before their frames are freed.
//!
//! The crate is layered as follows:
//!   - `region` / `region_list`: what is mapped where, with placement
//!     (first-fit gap search) and overlap checks
//!   - `bridge` / `resident`: which pages are in memory, and the bounded
//!     virtual to physical table reported to user space
//!   - `space`: the `AddressSpace` facade tying the two together
//!   - `process` / `syscalls`: the process table and the integer syscall
//!     surface
//!
//! The page table, the frame allocator and file I/O are reached through the
//! traits in `interface`, which also has host implementations of all three.

// ********************** CLIPPY DISCUSSION **************************** //
// Base lints give the fullest feedback possible.  They are warnings during
// development; build-denial is only enforced in CI.
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::cargo
)]
// Addresses are u64 and buffers are indexed with usize, so page arithmetic
// casts between the two all over the place.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
// ********************* END CLIPPY DISCUSSION ************************* //

pub mod bridge;
pub mod config;
pub mod constants;
pub mod error;
pub mod flags;
pub mod info;
pub mod interface;
pub mod process;
pub mod region;
pub mod region_list;
pub mod resident;
pub mod space;
pub mod syscalls;

pub use config::VmConfig;
pub use error::{Errno, VmError, VmResult};
pub use flags::{MapFlags, RemapFlags};
pub use info::{PageMapping, PgdirInfo, RegionInfo, WmapInfo};
pub use process::{exit_process, get_process, register_process, Process};
pub use region::{MemoryBackingType, Region, Sharing};
pub use space::AddressSpace;
pub use syscalls::*;
