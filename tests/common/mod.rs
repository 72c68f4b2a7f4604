// ---------- Test helper functions ----------
#![allow(dead_code)]

use lazy_static::lazy_static;
use std::fs::File;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use wmap::interface::{FileTable, FramePool, SoftPageTable};
use wmap::{AddressSpace, MapFlags, VmConfig};

lazy_static! {
    // Serializes tests that go through the global process table.
    static ref TESTMUTEX: Mutex<bool> = Mutex::new(true);
}

static NEXT_PID: AtomicU64 = AtomicU64::new(1000);

/// Takes the test mutex, ignoring poisoning left by a failed test.
pub fn lock() -> MutexGuard<'static, bool> {
    match TESTMUTEX.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Installs env_logger once; RUST_LOG controls the output.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A pid no other test in this binary uses.
pub fn fresh_pid() -> u64 {
    NEXT_PID.fetch_add(1, Ordering::Relaxed)
}

/// An address space with the default layout, a pool of `nframes` frames and
/// an empty file table.
pub fn new_space(nframes: usize) -> (AddressSpace, Arc<FramePool>, Arc<FileTable>) {
    init_logging();
    let frames = Arc::new(FramePool::new(0x10_0000, nframes));
    let files = Arc::new(FileTable::new());
    let space = AddressSpace::new(
        VmConfig::default(),
        Box::new(SoftPageTable::new()),
        frames.clone(),
        files.clone(),
    )
    .unwrap();
    (space, frames, files)
}

/// A temporary file holding `contents`.
pub fn file_with(contents: &[u8]) -> File {
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(contents).unwrap();
    file
}

pub fn anon_private() -> MapFlags {
    MapFlags::PRIVATE | MapFlags::ANONYMOUS
}
