// File descriptor table used as backing store
use super::BackingStore;
use crate::error::{VmError, VmResult};
use dashmap::DashMap;
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// First descriptor handed out by `FileTable::insert`; 0-2 stay reserved
/// for the standard streams.
const FIRST_FD: i32 = 3;

/// Maps a process's file descriptors to host files.
///
/// All I/O is positioned (`pread`/`pwrite` through `FileExt`), so the table
/// never moves a file cursor and concurrent readers do not need a lock.
#[derive(Debug)]
pub struct FileTable {
    files: DashMap<i32, Arc<File>>,
    next_fd: AtomicI32,
}

impl Default for FileTable {
    fn default() -> Self {
        FileTable::new()
    }
}

impl FileTable {
    pub fn new() -> Self {
        FileTable {
            files: DashMap::new(),
            next_fd: AtomicI32::new(FIRST_FD),
        }
    }

    /// Installs `file` under the lowest unused descriptor and returns it
    pub fn insert(&self, file: File) -> i32 {
        let fd = self.next_fd.fetch_add(1, Ordering::Relaxed);
        self.files.insert(fd, Arc::new(file));
        fd
    }

    /// Closes `fd`, returning false if it was not open
    pub fn close(&self, fd: i32) -> bool {
        self.files.remove(&fd).is_some()
    }

    fn get(&self, fd: i32) -> VmResult<Arc<File>> {
        self.files
            .get(&fd)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(VmError::BadFileDescriptor(fd))
    }
}

impl BackingStore for FileTable {
    fn is_open(&self, fd: i32) -> bool {
        self.files.contains_key(&fd)
    }

    fn read_at(&self, fd: i32, offset: u64, buf: &mut [u8]) -> VmResult<usize> {
        // the map guard is dropped before any I/O happens
        let file = self.get(fd)?;
        let mut done = 0;
        while done < buf.len() {
            let n = file.read_at(&mut buf[done..], offset + done as u64)?;
            if n == 0 {
                break;
            }
            done += n;
        }
        Ok(done)
    }

    fn write_at(&self, fd: i32, offset: u64, data: &[u8]) -> VmResult<()> {
        let file = self.get(fd)?;
        file.write_all_at(data, offset)?;
        Ok(())
    }
}
