//! An address space's page directory: owns the page tables covering
//! its user range, and implements map/unmap/clone/deep_clone/CoW-fault
//! handling over them.
//!
//! Grounded on the reference kernel's hierarchical `Table<L>` walk
//! (`paging/table.rs`), collapsed to the two levels i386 actually has.
//! Page tables themselves live as ordinary heap allocations keyed by
//! directory index rather than being walked through recursive mapping,
//! since the surrounding boot/mapping layer is out of this core's
//! scope; only the frames a PTE ultimately points at are accounted
//! against the physical frame allocator and refcount table.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use x86_64::{PhysAddr, VirtAddr};

use crate::config::ENTRIES_PER_TABLE;
use crate::mm::frame::{PhysFrame, FRAME_ALLOCATOR};
use crate::mm::page_table::{split_virt_addr, PageTable, Pte, PteFlags};
use crate::mm::pf_table;
use crate::mm::phys_mem;
use crate::mm::MemError;

bitflags::bitflags! {
    /// Flags accepted by `map_page`/`map_pages`, a superset of `PteFlags`
    /// with request-only modifiers that never survive into the PTE.
    pub struct MapFlags: u32 {
        const RW                = 1 << 0;
        const USER               = 1 << 1;
        const SHARED             = 1 << 2;
        const DO_ALLOC           = 1 << 3;
        const ZERO_PG            = 1 << 4;
        const BIG_PAGES_ALLOWED  = 1 << 5;
    }
}

pub struct PageDirectory {
    tables: BTreeMap<usize, Box<PageTable>>,
}

impl PageDirectory {
    pub fn new() -> Self {
        PageDirectory {
            tables: BTreeMap::new(),
        }
    }

    fn table_mut(&mut self, pd_index: usize) -> &mut PageTable {
        self.tables
            .entry(pd_index)
            .or_insert_with(|| Box::new(PageTable::empty()))
    }

    fn table(&self, pd_index: usize) -> Option<&PageTable> {
        self.tables.get(&pd_index).map(|b| b.as_ref())
    }

    pub fn lookup(&self, vaddr: VirtAddr) -> Option<Pte> {
        let (pd_index, pt_index) = split_virt_addr(vaddr.as_u64() as u32);
        let pte = self.table(pd_index)?.entry(pt_index);
        if pte.is_unused() {
            None
        } else {
            Some(pte)
        }
    }

    /// Installs a fully-formed PTE verbatim, bypassing `MapFlags`
    /// translation. Used by the CoW fault path (which computes the
    /// exact flag set itself) and by `clone_cow`/`deep_clone`.
    pub fn install_pte(&mut self, vaddr: VirtAddr, pte: Pte) {
        let (pd_index, pt_index) = split_virt_addr(vaddr.as_u64() as u32);
        self.table_mut(pd_index).set_entry(pt_index, pte);
    }

    /// Maps a single 4 KiB page. When `flags` requests `DO_ALLOC`,
    /// `paddr` must be `PhysAddr::zero()` and a fresh frame is taken
    /// from the allocator.
    pub fn map_page(
        &mut self,
        vaddr: VirtAddr,
        paddr: PhysAddr,
        flags: MapFlags,
    ) -> Result<(), MemError> {
        let (pd_index, pt_index) = split_virt_addr(vaddr.as_u64() as u32);
        if let Some(existing) = self.table(pd_index).map(|t| t.entry(pt_index)) {
            if !existing.is_unused() {
                return Err(MemError::AddrInUse);
            }
        }

        let frame_addr = if flags.contains(MapFlags::DO_ALLOC) {
            debug_assert_eq!(paddr.as_u64(), 0, "DO_ALLOC requires a zero paddr hint");
            let frame = FRAME_ALLOCATOR.lock().allocate()?;
            if flags.contains(MapFlags::ZERO_PG) {
                zero_frame(frame);
            }
            frame.start_address()
        } else {
            paddr
        };

        let mut pte_flags = PteFlags::PRESENT;
        if flags.contains(MapFlags::RW) {
            pte_flags.insert(PteFlags::WRITABLE);
        }
        if flags.contains(MapFlags::USER) {
            pte_flags.insert(PteFlags::USER);
        }
        if flags.contains(MapFlags::SHARED) {
            pte_flags.insert(PteFlags::SHARED);
        }

        let table = self.table_mut(pd_index);
        table.set_entry(pt_index, Pte::new(frame_addr, pte_flags));
        pf_table::ref_inc(PhysFrame::containing_address(frame_addr));
        Ok(())
    }

    /// Always maps the shared zero page. Asserts the caller did not
    /// also request `SHARED` (the zero page's shared-ness is implicit,
    /// not PTE-encoded, since it is never CoW-unshared).
    pub fn map_zero_page(&mut self, vaddr: VirtAddr, flags: MapFlags) -> Result<(), MemError> {
        debug_assert!(!flags.contains(MapFlags::SHARED));
        let zero = zero_page_frame();
        let mut effective = flags & !MapFlags::DO_ALLOC;
        let wants_rw = effective.contains(MapFlags::RW);
        effective.remove(MapFlags::RW);
        self.map_page(vaddr, zero.start_address(), effective)?;
        if wants_rw {
            let (pd_index, pt_index) = split_virt_addr(vaddr.as_u64() as u32);
            let table = self.table_mut(pd_index);
            let pte = table.entry(pt_index).mark_cow_with_rw_requested();
            table.set_entry(pt_index, pte);
        }
        Ok(())
    }

    /// Maps up to `count` consecutive pages starting at `vaddr`/`paddr`,
    /// returning the number actually mapped (stops at the first
    /// failure rather than rolling back, matching the bulk contract).
    pub fn map_pages(
        &mut self,
        vaddr: VirtAddr,
        paddr: PhysAddr,
        count: usize,
        flags: MapFlags,
    ) -> usize {
        let mut mapped = 0;
        for i in 0..count {
            let va = VirtAddr::new(vaddr.as_u64() + (i as u64) * 4096);
            let pa = if flags.contains(MapFlags::DO_ALLOC) {
                PhysAddr::new(0)
            } else {
                PhysAddr::new(paddr.as_u64() + (i as u64) * 4096)
            };
            match self.map_page(va, pa, flags) {
                Ok(()) => mapped += 1,
                Err(_) => break,
            }
        }
        mapped
    }

    pub fn unmap_page(&mut self, vaddr: VirtAddr, do_free: bool) {
        let unmapped = self.unmap_page_permissive(vaddr, do_free);
        assert!(unmapped.is_ok(), "unmap_page on an unmapped address");
    }

    pub fn unmap_page_permissive(&mut self, vaddr: VirtAddr, do_free: bool) -> Result<(), MemError> {
        let (pd_index, pt_index) = split_virt_addr(vaddr.as_u64() as u32);
        let pte = match self.tables.get(&pd_index) {
            Some(t) if !t.entry(pt_index).is_unused() => t.entry(pt_index),
            _ => return Err(MemError::NotMapped),
        };
        let frame = PhysFrame::containing_address(pte.addr());
        let zero = zero_page_frame();
        let new_count = pf_table::ref_dec(frame);
        if do_free && new_count == 0 && frame != zero {
            FRAME_ALLOCATOR.lock().free(frame);
        }
        self.table_mut(pd_index).set_entry(pt_index, Pte::unused());
        Ok(())
    }

    /// Shallow copy-on-write clone: every non-`SHARED` user page is
    /// marked CoW in both address spaces and its refcount bumped;
    /// `SHARED` pages are copied verbatim.
    pub fn clone_cow(&mut self) -> Result<PageDirectory, MemError> {
        let mut new_dir = PageDirectory::new();
        let pd_indices: alloc::vec::Vec<usize> = self.tables.keys().copied().collect();
        for pd_index in pd_indices {
            let entries: alloc::vec::Vec<(usize, Pte)> =
                self.tables.get(&pd_index).unwrap().iter().collect();
            for (pt_index, pte) in entries {
                let new_pte = if pte.flags().contains(PteFlags::SHARED) {
                    pte
                } else {
                    pte.mark_cow()
                };
                new_dir.table_mut(pd_index).set_entry(pt_index, new_pte);
                if !pte.flags().contains(PteFlags::SHARED) {
                    self.table_mut(pd_index).set_entry(pt_index, new_pte);
                }
                pf_table::ref_inc(PhysFrame::containing_address(pte.addr()));
            }
        }
        Ok(new_dir)
    }

    /// Eager clone: every user page gets its own freshly allocated,
    /// fully copied frame. Used when CoW is disabled for a fork.
    pub fn deep_clone(&self, read_frame: impl Fn(PhysFrame, &mut [u8; 4096])) -> Result<PageDirectory, MemError> {
        let mut new_dir = PageDirectory::new();
        for (&pd_index, table) in self.tables.iter() {
            for (pt_index, pte) in table.iter() {
                let new_frame = FRAME_ALLOCATOR.lock().allocate()?;
                let mut buf = [0u8; 4096];
                read_frame(PhysFrame::containing_address(pte.addr()), &mut buf);
                write_frame(new_frame, &buf);
                new_dir
                    .table_mut(pd_index)
                    .set_entry(pt_index, Pte::new(new_frame.start_address(), pte.flags()));
                pf_table::ref_inc(new_frame);
            }
        }
        Ok(new_dir)
    }
}

impl Default for PageDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl Pte {
    /// Helper used only by `map_zero_page`: marks a zero-page mapping
    /// as CoW-pending-RW without requiring it to already be writable.
    fn mark_cow_with_rw_requested(self) -> Pte {
        self.with_flags(self.flags() | PteFlags::COW_ORIG_RW)
    }
}

fn zero_page_frame() -> PhysFrame {
    // A single well-known frame reserved by the boot layer and never
    // freed; callers must initialize it to all-zero bytes once at boot.
    PhysFrame::from_start_address(PhysAddr::new(0))
}

fn zero_frame(frame: PhysFrame) {
    phys_mem::write(frame, &[0u8; 4096]);
}

fn write_frame(frame: PhysFrame, buf: &[u8; 4096]) {
    phys_mem::write(frame, buf);
}
