//! VFS inode identity and the `FileOps` dispatch trait, the
//! filesystem-agnostic surface every concrete filesystem implements.
//!
//! Grounded on the reference kernel's `filesystem/node.rs`: a node
//! carries an open-handle refcount independent of the filesystem's own
//! link count, and `close()` signals the caller to destroy the
//! underlying object once both drop to zero.

use alloc::boxed::Box;
use core::fmt;

use crate::errno::Errno;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct InodeId(u64);

impl InodeId {
    pub const fn first() -> Self {
        InodeId(0)
    }

    pub const fn next(self) -> Self {
        InodeId(self.0 + 1)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    File,
    Dir,
    Symlink,
}

/// What the caller of `close()` should do once the handle-side
/// refcount has dropped to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Other references remain (e.g. a directory entry); nothing
    /// further to do.
    Keep,
    /// No directory entry and no remaining handle references this
    /// inode; it must be destroyed and its storage released.
    Destroy,
}

/// Operations a concrete filesystem's inode exposes to the VFS layer.
/// Kept as a plain trait object, the way the reference kernel keeps
/// `NodeData(Box<dyn FileOps>)` as its dispatch point. `Any` lets a
/// filesystem (ramfs, in particular) safely recover its concrete
/// directory type from a `dyn FileOps` when it needs more than the
/// common surface offers (directory listing, sparse-block access).
pub trait FileOps: core::any::Any + Send {
    fn kind(&self) -> InodeKind;

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, Errno>;
    fn write(&mut self, offset: u64, buf: &[u8]) -> Result<usize, Errno>;
    fn size(&self) -> u64;
    fn truncate(&mut self, new_size: u64) -> Result<(), Errno>;

    fn as_any(&self) -> &dyn core::any::Any;
    fn as_any_mut(&mut self) -> &mut dyn core::any::Any;

    /// Whether this inode supports being `mmap`'d (ramfs files do;
    /// most device nodes do not).
    fn mmap_supported(&self) -> bool {
        false
    }
}

pub struct Inode {
    pub parent: Option<InodeId>,
    data: Box<dyn FileOps>,
    handle_refcount: u64,
    /// Directory-entry link count; distinct from `handle_refcount`.
    /// An inode with `nlink == 0` but `handle_refcount > 0` stays alive
    /// until the last open handle closes.
    pub nlink: u32,
    /// Set on every inode mirrored in from a read-only mount (FAT32).
    /// `Vfs::open` refuses any write-intent open against it with
    /// `Errno::Rofs`.
    pub readonly: bool,
}

impl fmt::Debug for Inode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Inode {{ parent: {:?}, nlink: {}, handle_refcount: {} }}",
            self.parent, self.nlink, self.handle_refcount
        )
    }
}

impl Inode {
    pub fn new(parent: Option<InodeId>, data: Box<dyn FileOps>) -> Self {
        Inode {
            parent,
            data,
            handle_refcount: 0,
            nlink: 1,
            readonly: false,
        }
    }

    pub fn kind(&self) -> InodeKind {
        self.data.kind()
    }

    pub fn ops(&self) -> &dyn FileOps {
        self.data.as_ref()
    }

    pub fn ops_mut(&mut self) -> &mut dyn FileOps {
        self.data.as_mut()
    }

    pub fn open(&mut self) {
        self.handle_refcount += 1;
    }

    /// Mirrors the reference kernel's `Node::close`: decrements the
    /// handle refcount and reports whether the inode is now orphaned
    /// (no handles, no directory link) and must be destroyed.
    #[must_use]
    pub fn close(&mut self) -> CloseAction {
        assert_ne!(self.handle_refcount, 0, "close: handle refcount already zero");
        self.handle_refcount -= 1;
        if self.handle_refcount == 0 && self.nlink == 0 {
            CloseAction::Destroy
        } else {
            CloseAction::Keep
        }
    }

    pub fn handle_refcount(&self) -> u64 {
        self.handle_refcount
    }

    /// Called on `unlink`/`rmdir`: drops the directory-entry link.
    /// Does not by itself destroy the inode if handles remain open.
    #[must_use]
    pub fn unlink(&mut self) -> CloseAction {
        assert_ne!(self.nlink, 0, "unlink: nlink already zero");
        self.nlink -= 1;
        if self.nlink == 0 && self.handle_refcount == 0 {
            CloseAction::Destroy
        } else {
            CloseAction::Keep
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyFile {
        bytes: alloc::vec::Vec<u8>,
    }

    impl FileOps for DummyFile {
        fn kind(&self) -> InodeKind {
            InodeKind::File
        }
        fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, Errno> {
            let start = offset as usize;
            if start >= self.bytes.len() {
                return Ok(0);
            }
            let n = buf.len().min(self.bytes.len() - start);
            buf[..n].copy_from_slice(&self.bytes[start..start + n]);
            Ok(n)
        }
        fn write(&mut self, offset: u64, buf: &[u8]) -> Result<usize, Errno> {
            let end = offset as usize + buf.len();
            if self.bytes.len() < end {
                self.bytes.resize(end, 0);
            }
            self.bytes[offset as usize..end].copy_from_slice(buf);
            Ok(buf.len())
        }
        fn size(&self) -> u64 {
            self.bytes.len() as u64
        }
        fn truncate(&mut self, new_size: u64) -> Result<(), Errno> {
            self.bytes.resize(new_size as usize, 0);
            Ok(())
        }
        fn as_any(&self) -> &dyn core::any::Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn core::any::Any {
            self
        }
    }

    #[test]
    fn close_reports_destroy_only_once_both_refcounts_hit_zero() {
        let mut inode = Inode::new(None, Box::new(DummyFile { bytes: alloc::vec![] }));
        inode.nlink = 0; // already unlinked before the handle closes
        inode.open();
        assert_eq!(inode.close(), CloseAction::Destroy);
    }

    #[test]
    fn close_keeps_inode_alive_while_still_linked() {
        let mut inode = Inode::new(None, Box::new(DummyFile { bytes: alloc::vec![] }));
        inode.open();
        assert_eq!(inode.close(), CloseAction::Keep);
    }

    #[test]
    fn unlink_then_last_close_destroys() {
        let mut inode = Inode::new(None, Box::new(DummyFile { bytes: alloc::vec![] }));
        inode.open();
        assert_eq!(inode.unlink(), CloseAction::Keep);
        assert_eq!(inode.close(), CloseAction::Destroy);
    }

    #[test]
    fn id_sequence_increments() {
        let a = InodeId::first();
        let b = a.next();
        assert_eq!(b.raw(), a.raw() + 1);
    }
}
