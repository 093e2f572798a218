//! An open reference to a filesystem object: position, mode flags, and
//! the inode it targets.

use alloc::sync::Arc;
use bitflags::bitflags;
use spin::Mutex;

use crate::fs::inode::InodeId;

bitflags! {
    #[derive(Default)]
    pub struct OpenFlags: u32 {
        const RDONLY   = 0;
        const WRONLY   = 1 << 0;
        const RDWR     = 1 << 1;
        const APPEND   = 1 << 2;
        const CREAT    = 1 << 3;
        const EXCL     = 1 << 4;
        const TRUNC    = 1 << 5;
        const NONBLOCK = 1 << 6;
        const DIRECTORY = 1 << 7;
    }
}

bitflags! {
    /// Capability bits that vary per filesystem/inode rather than per
    /// open() call.
    #[derive(Default)]
    pub struct SpecFlags: u32 {
        const MMAP_SUPPORTED = 1 << 0;
        const NO_LF = 1 << 1;
    }
}

impl OpenFlags {
    pub fn can_write(self) -> bool {
        self.contains(OpenFlags::WRONLY) || self.contains(OpenFlags::RDWR)
    }

    pub fn can_read(self) -> bool {
        !self.contains(OpenFlags::WRONLY)
    }
}

struct HandleState {
    pub position: u64,
}

/// An open handle. Cloneable (for `dup`/`fork`) via `clone_ref`, which
/// shares the underlying position cursor — exactly like POSIX `dup`,
/// where the duplicated descriptor advances the same file offset.
pub struct FsHandle {
    pub inode: InodeId,
    pub flags: OpenFlags,
    pub spec_flags: SpecFlags,
    state: Arc<Mutex<HandleState>>,
}

impl FsHandle {
    pub fn new(inode: InodeId, flags: OpenFlags, spec_flags: SpecFlags) -> Self {
        FsHandle {
            inode,
            flags,
            spec_flags,
            state: Arc::new(Mutex::new(HandleState { position: 0 })),
        }
    }

    pub fn position(&self) -> u64 {
        self.state.lock().position
    }

    pub fn set_position(&self, pos: u64) {
        self.state.lock().position = pos;
    }

    pub fn advance(&self, delta: u64) -> u64 {
        let mut state = self.state.lock();
        state.position += delta;
        state.position
    }

    /// A handle that shares the same position cursor as `self`, the
    /// way `dup()`/`fork()` duplicate a descriptor.
    pub fn clone_ref(&self) -> Self {
        FsHandle {
            inode: self.inode,
            flags: self.flags,
            spec_flags: self.spec_flags,
            state: self.state.clone(),
        }
    }

    /// An independent handle onto the same inode starting at offset 0,
    /// the way a fresh `open()` call would create (distinct from
    /// `clone_ref`, which shares the cursor).
    pub fn reopen(&self) -> Self {
        FsHandle::new(self.inode, self.flags, self.spec_flags)
    }
}
