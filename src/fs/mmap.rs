//! mmap of ramfs files and the write-fault path that backs a hole with
//! a real frame on first touch.
//!
//! `mmap` itself only needs to register the mapping; it never pages
//! anything in eagerly. The work happens in `RamfsMappingHandler`,
//! which implements `mm::vmm::MappingFaultHandler` and is handed to
//! `mm::vmm::handle_page_fault` alongside the CoW path. A read fault on
//! a hole maps the shared read-only zero page; a write fault backs the
//! faulting page with a dedicated frame and maps it `RW|USER|SHARED`.
//!
//! The faulting frame and the file's own block storage are two
//! separate buffers (`mm::phys_mem`'s per-frame bytes vs. `RamFile`'s
//! `Box<[u8; PAGE_SIZE]>` blocks), so they are kept coherent explicitly
//! rather than by aliasing: a write fault seeds its frame from the
//! block's current contents on first touch (`seed_frame_from_block`),
//! and `FrameCache::writeback` copies every cached frame's current
//! bytes back into its backing block. The caller is responsible for
//! calling `writeback` when a mapping is torn down (`munmap`) or
//! explicitly synced (`msync`), neither of which this core implements
//! as a syscall — see DESIGN.md.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use spin::Mutex;
use x86_64::VirtAddr;

use crate::config::PAGE_SIZE;
use crate::fs::inode::InodeId;
use crate::fs::ramfs::RamFs;
use crate::mm::frame::{PhysFrame, FRAME_ALLOCATOR};
use crate::mm::pdir::{MapFlags, PageDirectory};
use crate::mm::phys_mem;
use crate::mm::vmm::{FaultAccess, MappingFaultHandler};

#[derive(Debug, Clone, Copy)]
pub struct UserMapping {
    pub vaddr: VirtAddr,
    /// Length in pages.
    pub pages: usize,
    pub file_offset: u64,
    pub inode: InodeId,
    pub writable: bool,
}

impl UserMapping {
    fn covers(&self, vaddr: VirtAddr) -> bool {
        let start = self.vaddr.as_u64();
        let end = start + (self.pages as u64) * PAGE_SIZE as u64;
        (start..end).contains(&vaddr.as_u64())
    }

    fn file_page_for(&self, vaddr: VirtAddr) -> u64 {
        let page_vaddr = vaddr.as_u64() & !(PAGE_SIZE as u64 - 1);
        let delta = page_vaddr - self.vaddr.as_u64();
        self.file_offset + delta
    }
}

/// A process's live `mmap` registrations. One instance per address
/// space; the boot/syscall layer owns it and hands a `RamfsMappingHandler`
/// borrowing it to `handle_page_fault`.
#[derive(Default)]
pub struct MmapTable {
    mappings: Vec<UserMapping>,
}

impl MmapTable {
    pub fn new() -> Self {
        MmapTable { mappings: Vec::new() }
    }

    pub fn register(&mut self, mapping: UserMapping) {
        self.mappings.push(mapping);
    }

    pub fn unregister(&mut self, vaddr: VirtAddr) {
        self.mappings.retain(|m| m.vaddr != vaddr);
    }

    fn find(&self, vaddr: VirtAddr) -> Option<UserMapping> {
        self.mappings.iter().copied().find(|m| m.covers(vaddr))
    }
}

/// Backs each `(inode, file page)` a write fault has touched with a
/// dedicated frame, so repeated faults on the same page return the
/// same content instead of re-zeroing it.
#[derive(Default)]
pub struct FrameCache {
    frames: Mutex<BTreeMap<(InodeId, u64), PhysFrame>>,
}

impl FrameCache {
    pub fn new() -> Self {
        FrameCache {
            frames: Mutex::new(BTreeMap::new()),
        }
    }

    /// Flushes every cached frame's current bytes back into its
    /// backing file's block storage. Call this when a mapping is
    /// unmapped or explicitly synced, so a plain `read()`/`pread` after
    /// the mapping goes away sees what was written through it.
    pub fn writeback(&self, ramfs: &mut RamFs) {
        let cache = self.frames.lock();
        for (&(inode, file_page), &frame) in cache.iter() {
            let Some(node) = ramfs.inode_mut(inode) else { continue };
            let content = phys_mem::read(frame);
            let _ = node.ops_mut().write(file_page, &content);
        }
    }
}

pub struct RamfsMappingHandler<'a> {
    pub ramfs: &'a Mutex<RamFs>,
    pub mappings: &'a MmapTable,
    pub cache: &'a FrameCache,
}

impl<'a> MappingFaultHandler for RamfsMappingHandler<'a> {
    fn try_handle(&self, dir: &mut PageDirectory, vaddr: VirtAddr, access: FaultAccess) -> Option<bool> {
        let mapping = self.mappings.find(vaddr)?;
        let page_vaddr = VirtAddr::new(vaddr.as_u64() & !(PAGE_SIZE as u64 - 1));
        let file_page = mapping.file_page_for(vaddr);

        let mut ramfs = self.ramfs.lock();
        let size = ramfs.inode(mapping.inode)?.ops().size();
        if file_page >= size {
            return Some(false);
        }

        if !access.write {
            let flags = MapFlags::USER | MapFlags::SHARED;
            return Some(dir.map_zero_page(page_vaddr, flags).is_ok());
        }

        if !mapping.writable {
            return Some(false);
        }

        let key = (mapping.inode, file_page);
        let mut cache = self.cache.frames.lock();
        let frame = match cache.get(&key) {
            Some(&f) => f,
            None => {
                let f = match FRAME_ALLOCATOR.lock().allocate() {
                    Ok(f) => f,
                    Err(_) => return Some(false),
                };
                seed_frame_from_block(&mut ramfs, mapping.inode, file_page, f);
                cache.insert(key, f);
                f
            }
        };

        let flags = MapFlags::RW | MapFlags::USER | MapFlags::SHARED;
        Some(dir.map_page(page_vaddr, frame.start_address(), flags).is_ok())
    }
}

/// Copies a ramfs block's current bytes into a freshly allocated
/// frame, so the first write fault on a page sees what was already
/// there (a prior plain `write()`, or nothing past EOF) rather than
/// whatever garbage the allocator handed back.
fn seed_frame_from_block(ramfs: &mut RamFs, inode: InodeId, file_page: u64, frame: PhysFrame) {
    let Some(node) = ramfs.inode_mut(inode) else { return };
    let mut buf = [0u8; PAGE_SIZE];
    let _ = node.ops_mut().read(file_page, &mut buf);
    phys_mem::write(frame, &buf);
}
