//! Error values for the region manager and their errno encoding.
//!
//! Every fallible operation returns a [`VmError`]. The syscall layer turns
//! the error into a negated Linux errno with [`syscall_error`], which is the
//! only place an error is flattened into an integer.

use std::io;
use thiserror::Error;

/// Errno values (matching errno in Linux) returned by the wmap syscalls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Errno {
    ENOENT = 2,  // No such file or directory
    ESRCH = 3,   // No such process
    EIO = 5,     // I/O error
    EBADF = 9,   // Bad file number
    ENOMEM = 12, // Out of memory
    EFAULT = 14, // Bad address
    EEXIST = 17, // File exists
    EINVAL = 22, // Invalid argument
    ERANGE = 34, // Math result not representable
}

impl Errno {
    /// Errno carried by a syscall return value, or None if `ret` is not a
    /// known failure
    pub fn from_syscall_ret(ret: i64) -> Option<Errno> {
        let errno = match ret.checked_neg()? {
            2 => Errno::ENOENT,
            3 => Errno::ESRCH,
            5 => Errno::EIO,
            9 => Errno::EBADF,
            12 => Errno::ENOMEM,
            14 => Errno::EFAULT,
            17 => Errno::EEXIST,
            22 => Errno::EINVAL,
            34 => Errno::ERANGE,
            _ => return None,
        };
        Some(errno)
    }
}

/// Failure of a region-manager operation.
#[derive(Debug, Error)]
pub enum VmError {
    /// Zero length, misaligned or otherwise malformed argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The requested range lies outside `[mmap_base, kern_base)`.
    #[error("range {base:#x}+{length:#x} is outside the mappable window")]
    OutOfRange { base: u64, length: u64 },
    /// A fixed placement intersects an existing region.
    #[error("range {base:#x}+{length:#x} overlaps an existing region")]
    Overlap { base: u64, length: u64 },
    /// No free gap of the requested size exists.
    #[error("no free gap of {0:#x} bytes")]
    OutOfSpace(u64),
    /// No region starts at the given address.
    #[error("no region starts at {0:#x}")]
    NotFound(u64),
    /// The caller's idea of the region size disagrees with the recorded one.
    #[error("declared size {declared:#x} does not match region size {recorded:#x}")]
    SizeMismatch { declared: u64, recorded: u64 },
    /// The output buffer cannot hold every record.
    #[error("buffer holds {capacity} records, {needed} needed")]
    BufferTooSmall { needed: usize, capacity: usize },
    /// The frame allocator is exhausted.
    #[error("out of physical frames")]
    OutOfMemory,
    #[error("per-process region limit of {0} reached")]
    RegionLimit(usize),
    /// An access touched an address no region covers.
    #[error("address {0:#x} is not mapped")]
    BadAddress(u64),
    #[error("bad file descriptor {0}")]
    BadFileDescriptor(i32),
    #[error("no such process {0}")]
    NoSuchProcess(u64),
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// The backing store failed a read or write.
    #[error("backing store I/O failed: {0}")]
    Io(#[from] io::Error),
}

impl VmError {
    /// The errno a syscall reports for this error.
    pub fn errno(&self) -> Errno {
        match self {
            VmError::InvalidArgument(_)
            | VmError::OutOfRange { .. }
            | VmError::SizeMismatch { .. }
            | VmError::InvalidConfig(_) => Errno::EINVAL,
            VmError::Overlap { .. } => Errno::EEXIST,
            VmError::OutOfSpace(_) | VmError::OutOfMemory | VmError::RegionLimit(_) => {
                Errno::ENOMEM
            }
            VmError::NotFound(_) => Errno::ENOENT,
            VmError::BufferTooSmall { .. } => Errno::ERANGE,
            VmError::BadAddress(_) => Errno::EFAULT,
            VmError::BadFileDescriptor(_) => Errno::EBADF,
            VmError::NoSuchProcess(_) => Errno::ESRCH,
            VmError::Io(_) => Errno::EIO,
        }
    }
}

pub type VmResult<T> = Result<T, VmError>;

/// Report a failed syscall and produce its return value.
///
/// # Arguments
/// * `e` - errno to report
/// * `syscall` - name of the failing syscall
/// * `message` - human readable reason, only logged
///
/// # Returns
/// * `i64` - the negated errno
pub fn syscall_error(e: Errno, syscall: &str, message: &str) -> i64 {
    log::debug!("[{}] failed with {:?}: {}", syscall, e, message);
    -(e as i64)
}
