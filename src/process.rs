//! Processes and the global process table
//!
//! A `Process` owns exactly one address space behind its own lock. Every
//! syscall and every page fault of the process takes that lock for its whole
//! duration; nothing is ever locked across processes, so a write-back that
//! blocks on the backing store only stalls its own process.

use crate::config::VmConfig;
use crate::error::{VmError, VmResult};
use crate::interface::{BackingStore, FrameAllocator, SoftPageTable};
use crate::space::AddressSpace;
use dashmap::DashMap;
use lazy_static::lazy_static;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct Process {
    pub pid: u64,
    killed: AtomicBool,
    space: Mutex<AddressSpace>,
}

impl Process {
    /// Creates a process with an empty address space and a fresh page table
    pub fn new(
        pid: u64,
        config: VmConfig,
        frames: Arc<dyn FrameAllocator>,
        files: Arc<dyn BackingStore>,
    ) -> VmResult<Self> {
        let space = AddressSpace::new(config, Box::new(SoftPageTable::new()), frames, files)?;
        Ok(Process {
            pid,
            killed: AtomicBool::new(false),
            space: Mutex::new(space),
        })
    }

    /// Locks the address space for one syscall or fault
    pub fn space(&self) -> MutexGuard<'_, AddressSpace> {
        self.space.lock()
    }

    pub fn kill(&self) {
        self.killed.store(true, Ordering::SeqCst);
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}

lazy_static! {
    // pid -> process. Lookups clone the Arc so the shard lock is never held
    // while an address space is locked.
    static ref PROCESS_TABLE: DashMap<u64, Arc<Process>> = DashMap::new();
}

/// Adds `process` to the process table, replacing any process with that pid
pub fn register_process(process: Process) -> Arc<Process> {
    let process = Arc::new(process);
    if PROCESS_TABLE.insert(process.pid, process.clone()).is_some() {
        log::warn!("pid {} registered twice, old process replaced", process.pid);
    }
    log::debug!("registered process {}", process.pid);
    process
}

pub fn get_process(pid: u64) -> VmResult<Arc<Process>> {
    PROCESS_TABLE
        .get(&pid)
        .map(|entry| entry.value().clone())
        .ok_or(VmError::NoSuchProcess(pid))
}

/// Removes a process and tears down its address space
///
/// Every region is released with write-back and every frame freed, even if
/// some write-back fails; the first failure is returned after cleanup.
pub fn exit_process(pid: u64) -> VmResult<()> {
    let (_, process) = PROCESS_TABLE
        .remove(&pid)
        .ok_or(VmError::NoSuchProcess(pid))?;
    let result = process.space().release_all();
    log::debug!("process {} exited", pid);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::MapFlags;
    use crate::interface::{FileTable, FramePool};

    // The process table is global; these pids are not used elsewhere in the
    // unit tests.
    #[test]
    fn test_register_lookup_exit() {
        let frames = Arc::new(FramePool::new(0, 4));
        let files = Arc::new(FileTable::new());
        let process = Process::new(9001, VmConfig::default(), frames.clone(), files).unwrap();
        let process = register_process(process);

        let base = process
            .space()
            .map(0, 4096, MapFlags::PRIVATE | MapFlags::ANONYMOUS, -1)
            .unwrap();
        process.space().handle_fault(base).unwrap();
        assert_eq!(frames.free_count(), 3);

        assert_eq!(get_process(9001).unwrap().pid, 9001);
        exit_process(9001).unwrap();
        assert_eq!(frames.free_count(), 4);
        assert!(matches!(get_process(9001), Err(VmError::NoSuchProcess(9001))));
        assert!(matches!(exit_process(9001), Err(VmError::NoSuchProcess(9001))));
    }

    #[test]
    fn test_kill_flag() {
        let process = Process::new(
            9002,
            VmConfig::default(),
            Arc::new(FramePool::new(0, 1)),
            Arc::new(FileTable::new()),
        )
        .unwrap();
        assert!(!process.is_killed());
        process.kill();
        assert!(process.is_killed());
    }

    #[test]
    fn test_fault_and_unmap_from_two_threads() {
        let frames = Arc::new(FramePool::new(0, 16));
        let process = Arc::new(
            Process::new(9003, VmConfig::default(), frames.clone(), Arc::new(FileTable::new()))
                .unwrap(),
        );
        let base = process
            .space()
            .map(0, 8 * 4096, MapFlags::PRIVATE | MapFlags::ANONYMOUS, -1)
            .unwrap();

        let faulter = {
            let process = process.clone();
            std::thread::spawn(move || {
                for round in 0..64u64 {
                    let addr = base + (round % 8) * 4096;
                    match process.space().handle_fault(addr) {
                        Ok(_) | Err(VmError::BadAddress(_)) => {}
                        Err(e) => panic!("fault at {:#x} failed with {}", addr, e),
                    }
                }
            })
        };
        let unmapper = {
            let process = process.clone();
            std::thread::spawn(move || {
                std::thread::yield_now();
                process.space().unmap(base).unwrap();
            })
        };
        faulter.join().unwrap();
        unmapper.join().unwrap();

        let space = process.space();
        space.check_invariants().unwrap();
        assert_eq!(space.regions().len(), 0);
        assert_eq!(frames.free_count(), frames.frame_count());
    }
}
