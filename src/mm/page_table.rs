//! Two-level i386-style page table entries. Collapsed from the
//! reference kernel's four-level `Table<L: TableLevel>` hierarchy
//! (which modeled the x86_64 PML4/PDPT/PD/PT chain) down to the single
//! page-directory + page-table chain i386 actually has.

use bitflags::bitflags;
use x86_64::PhysAddr;

use crate::config::{ENTRIES_PER_TABLE, PAGE_SIZE};

bitflags! {
    /// Hardware bits plus three software-available bits (bits 9-11 on
    /// i386) repurposed for copy-on-write bookkeeping.
    #[derive(Default)]
    pub struct PteFlags: u32 {
        const PRESENT       = 1 << 0;
        const WRITABLE      = 1 << 1;
        const USER          = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const NO_CACHE      = 1 << 4;
        const ACCESSED      = 1 << 5;
        const DIRTY         = 1 << 6;
        const HUGE_PAGE     = 1 << 7;
        const GLOBAL        = 1 << 8;
        /// Software-available: page was writable before CoW cloning;
        /// restore `WRITABLE` once the last sibling reference drops.
        const COW_ORIG_RW   = 1 << 9;
        /// Software-available: never CoW-shared, even across clone.
        const SHARED        = 1 << 10;
    }
}

const PHYS_ADDR_MASK: u64 = 0x_FFFF_F000;

/// A single page-table entry.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Pte(u32);

impl Pte {
    pub const fn unused() -> Self {
        Pte(0)
    }

    pub fn new(addr: PhysAddr, flags: PteFlags) -> Self {
        debug_assert_eq!(addr.as_u64() & !PHYS_ADDR_MASK, 0, "unaligned frame in PTE");
        Pte((addr.as_u64() as u32 & PHYS_ADDR_MASK as u32) | flags.bits())
    }

    pub fn is_unused(self) -> bool {
        self.0 == 0
    }

    pub fn flags(self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0 & !(PHYS_ADDR_MASK as u32))
    }

    pub fn addr(self) -> PhysAddr {
        PhysAddr::new((self.0 & PHYS_ADDR_MASK as u32) as u64)
    }

    pub fn is_present(self) -> bool {
        self.flags().contains(PteFlags::PRESENT)
    }

    pub fn with_flags(self, flags: PteFlags) -> Self {
        Pte::new(self.addr(), flags)
    }

    /// Clears `WRITABLE`, sets `COW_ORIG_RW` if it was set, leaving
    /// `SHARED` pages untouched (callers must check `SHARED` first;
    /// asserting here that the two bits never coexist).
    pub fn mark_cow(self) -> Self {
        debug_assert!(
            !self.flags().contains(PteFlags::SHARED),
            "SHARED and COW_ORIG_RW are mutually exclusive"
        );
        let mut flags = self.flags();
        if flags.contains(PteFlags::WRITABLE) {
            flags.remove(PteFlags::WRITABLE);
            flags.insert(PteFlags::COW_ORIG_RW);
        }
        self.with_flags(flags)
    }

    /// Restores write access after the last CoW sibling dropped away.
    pub fn unshare(self) -> Self {
        let mut flags = self.flags();
        if flags.contains(PteFlags::COW_ORIG_RW) {
            flags.remove(PteFlags::COW_ORIG_RW);
            flags.insert(PteFlags::WRITABLE);
        }
        self.with_flags(flags)
    }
}

/// A page table: 1024 entries covering 4 MiB of address space.
#[repr(align(4096))]
pub struct PageTable {
    entries: [Pte; ENTRIES_PER_TABLE],
}

impl PageTable {
    pub const fn empty() -> Self {
        PageTable {
            entries: [Pte::unused(); ENTRIES_PER_TABLE],
        }
    }

    pub fn entry(&self, index: usize) -> Pte {
        self.entries[index]
    }

    pub fn set_entry(&mut self, index: usize, pte: Pte) {
        self.entries[index] = pte;
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.is_unused())
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Pte)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.is_unused())
            .map(|(i, e)| (i, *e))
    }
}

/// Splits a virtual address into (page-directory index, page-table
/// index) on i386's 10/10/12 layout.
pub fn split_virt_addr(vaddr: u32) -> (usize, usize) {
    let pd_index = (vaddr >> 22) as usize;
    let pt_index = ((vaddr >> 12) & 0x3FF) as usize;
    (pd_index, pt_index)
}

static_assertions::const_assert_eq!(PAGE_SIZE, 4096);
static_assertions::assert_eq_size!(Pte, u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_addr_round_trips() {
        let vaddr: u32 = (5 << 22) | (17 << 12) | 0x123;
        let (pd, pt) = split_virt_addr(vaddr);
        assert_eq!(pd, 5);
        assert_eq!(pt, 17);
    }

    #[test]
    fn shared_and_cow_orig_rw_are_mutually_exclusive_by_construction() {
        let pte = Pte::new(PhysAddr::new(0x1000), PteFlags::PRESENT | PteFlags::WRITABLE);
        let cow = pte.mark_cow();
        assert!(cow.flags().contains(PteFlags::COW_ORIG_RW));
        assert!(!cow.flags().contains(PteFlags::WRITABLE));

        let shared = Pte::new(PhysAddr::new(0x2000), PteFlags::PRESENT | PteFlags::SHARED);
        assert!(!shared.flags().contains(PteFlags::COW_ORIG_RW));
    }

    #[test]
    fn unshare_restores_writable() {
        let pte = Pte::new(PhysAddr::new(0x1000), PteFlags::PRESENT | PteFlags::WRITABLE).mark_cow();
        let restored = pte.unshare();
        assert!(restored.flags().contains(PteFlags::WRITABLE));
        assert!(!restored.flags().contains(PteFlags::COW_ORIG_RW));
    }

    #[test]
    fn new_table_is_empty() {
        let table = PageTable::empty();
        assert!(table.is_empty());
        assert_eq!(table.iter().count(), 0);
    }
}
