//! Virtual memory: physical frame allocation with refcounting, the
//! page-table core, and page-fault dispatch (copy-on-write plus VFS
//! mmap fault handoff).

pub mod frame;
pub mod page_table;
pub mod pdir;
pub mod pf_table;
pub mod phys_mem;
pub mod vmm;

pub use frame::{FrameAllocator, PhysFrame, FRAME_ALLOCATOR};
pub use page_table::{PageTable, Pte, PteFlags};
pub use pdir::PageDirectory;
pub use vmm::{handle_page_fault, FaultAccess, PageFaultOutcome};

use crate::errno::Errno;

/// Errors internal to the paging core, distinct from the syscall-level
/// `Errno` the same way the reference kernel keeps its `IoResult`
/// payload distinct from the raw `ErrorCode` it wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemError {
    OutOfMemory,
    AddrInUse,
    NotMapped,
}

impl From<MemError> for Errno {
    fn from(e: MemError) -> Errno {
        match e {
            MemError::OutOfMemory => Errno::NoMem,
            MemError::AddrInUse | MemError::NotMapped => Errno::Inval,
        }
    }
}
