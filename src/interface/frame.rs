// Physical frame pool
use super::FrameAllocator;
use crate::constants::{is_page_aligned, PAGESIZE};
use crate::error::{VmError, VmResult};
use bit_set::BitSet;
use parking_lot::Mutex;

/// A fixed pool of physical frames backed by host memory.
///
/// Frame `i` lives at physical address `phys_base + i * PAGESIZE`. The set of
/// frames handed out is tracked in a `BitSet`. The pool lock is only held for
/// one frame operation at a time, never across backing-store I/O.
#[derive(Debug)]
pub struct FramePool {
    phys_base: u64,
    nframes: usize,
    inner: Mutex<FramePoolInner>,
}

#[derive(Debug)]
struct FramePoolInner {
    used: BitSet,    // indices of allocated frames
    memory: Vec<u8>, // nframes * PAGESIZE bytes of "physical" memory
}

impl FramePool {
    /// Creates a pool of `nframes` frames starting at `phys_base`
    ///
    /// Panics if `phys_base` is not page aligned.
    pub fn new(phys_base: u64, nframes: usize) -> Self {
        assert!(is_page_aligned(phys_base), "frame pool base must be page aligned");
        FramePool {
            phys_base,
            nframes,
            inner: Mutex::new(FramePoolInner {
                used: BitSet::with_capacity(nframes),
                memory: vec![0u8; nframes * PAGESIZE as usize],
            }),
        }
    }

    pub fn frame_count(&self) -> usize {
        self.nframes
    }

    /// Number of frames currently free
    pub fn free_count(&self) -> usize {
        self.nframes - self.inner.lock().used.len()
    }

    fn index_of(&self, frame: u64) -> usize {
        let index = frame
            .checked_sub(self.phys_base)
            .filter(|off| off % PAGESIZE == 0)
            .map(|off| (off / PAGESIZE) as usize)
            .filter(|index| *index < self.nframes);
        match index {
            Some(index) => index,
            None => panic!("frame {:#x} does not belong to this pool", frame),
        }
    }
}

impl FrameAllocator for FramePool {
    fn allocate_frame(&self) -> VmResult<u64> {
        let mut inner = self.inner.lock();
        let index = (0..self.nframes)
            .find(|index| !inner.used.contains(*index))
            .ok_or(VmError::OutOfMemory)?;
        inner.used.insert(index);
        Ok(self.phys_base + index as u64 * PAGESIZE)
    }

    fn free_frame(&self, frame: u64) {
        let index = self.index_of(frame);
        let mut inner = self.inner.lock();
        if !inner.used.remove(index) {
            panic!("double free of frame {:#x}", frame);
        }
    }

    fn read_frame(&self, frame: u64, offset: usize, buf: &mut [u8]) {
        let start = self.index_of(frame) * PAGESIZE as usize + offset;
        assert!(offset + buf.len() <= PAGESIZE as usize, "read past end of frame");
        let inner = self.inner.lock();
        buf.copy_from_slice(&inner.memory[start..start + buf.len()]);
    }

    fn write_frame(&self, frame: u64, offset: usize, data: &[u8]) {
        let start = self.index_of(frame) * PAGESIZE as usize + offset;
        assert!(offset + data.len() <= PAGESIZE as usize, "write past end of frame");
        let mut inner = self.inner.lock();
        inner.memory[start..start + data.len()].copy_from_slice(data);
    }
}
