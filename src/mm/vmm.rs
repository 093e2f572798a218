//! Page-fault dispatch: the copy-on-write path first, then handoff to
//! a registered VFS mapping, falling back to a fatal signal.

use x86_64::VirtAddr;

use crate::mm::frame::{PhysFrame, FRAME_ALLOCATOR};
use crate::mm::page_table::{Pte, PteFlags};
use crate::mm::pdir::PageDirectory;
use crate::mm::pf_table;
use crate::mm::phys_mem;
use crate::mm::MemError;
use crate::task::signal::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultAccess {
    pub write: bool,
    pub present: bool,
    pub user_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFaultOutcome {
    /// The fault was resolved in-place (CoW unshare, or a mapping's
    /// handler populated the page); the faulting instruction may
    /// simply be retried.
    Resolved,
    /// No CoW or mapping handler claimed the fault; deliver SIGSEGV.
    SegFault,
    /// The access was past the end of a backing object; deliver
    /// SIGBUS.
    BusError,
    /// A CoW split ran out of memory; the faulting task cannot be let
    /// back out to user space with a half-resolved write, so it is
    /// killed outright rather than handed SIGSEGV.
    Kill,
    /// A kernel-mode fault with nowhere to route: fatal.
    Fatal,
}

impl PageFaultOutcome {
    /// The signal this outcome implies delivering to the faulting
    /// task, if any. `Resolved` and `Fatal` carry no signal: `Resolved`
    /// means the instruction simply retries, and `Fatal` means there is
    /// no task left to signal.
    pub fn signal(self) -> Option<Signal> {
        match self {
            PageFaultOutcome::SegFault => Some(Signal::Segv),
            PageFaultOutcome::BusError => Some(Signal::Bus),
            PageFaultOutcome::Kill => Some(Signal::Kill),
            PageFaultOutcome::Resolved | PageFaultOutcome::Fatal => None,
        }
    }
}

/// A single registered backing-object fault handler, implemented by
/// the VFS layer (ramfs mmap, in particular). Kept here as a trait so
/// `mm` has no upward dependency on `fs`.
pub trait MappingFaultHandler {
    /// Returns `Some(resolved)` if this mapping claims the address.
    fn try_handle(&self, dir: &mut PageDirectory, vaddr: VirtAddr, access: FaultAccess) -> Option<bool>;
}

/// Resolves a copy-on-write fault on an already-present page. Returns
/// `true` if the fault was a CoW fault at all (whether or not frame
/// copying succeeded); `false` means the caller should keep looking
/// for another handler.
pub fn try_cow_fault(dir: &mut PageDirectory, vaddr: VirtAddr, access: FaultAccess) -> Option<Result<(), MemError>> {
    let pte = dir.lookup(vaddr)?;
    if !access.write || !pte.is_present() {
        return None;
    }
    if !pte.flags().contains(PteFlags::COW_ORIG_RW) {
        return None;
    }

    let frame = PhysFrame::containing_address(pte.addr());
    if pf_table::ref_get(frame) <= 1 {
        // Sole owner: simply restore write access.
        set_pte(dir, vaddr, pte.unshare());
        return Some(Ok(()));
    }

    Some(copy_on_write_split(dir, vaddr, pte, frame))
}

fn copy_on_write_split(
    dir: &mut PageDirectory,
    vaddr: VirtAddr,
    pte: Pte,
    old_frame: PhysFrame,
) -> Result<(), MemError> {
    let new_frame = FRAME_ALLOCATOR.lock().allocate()?;
    copy_frame(old_frame, new_frame);
    pf_table::ref_dec(old_frame);
    pf_table::ref_inc(new_frame);

    let mut flags = pte.flags();
    flags.remove(PteFlags::COW_ORIG_RW);
    flags.insert(PteFlags::WRITABLE);
    set_pte(dir, vaddr, Pte::new(new_frame.start_address(), flags));
    Ok(())
}

fn copy_frame(src: PhysFrame, dst: PhysFrame) {
    phys_mem::copy(src, dst);
}

fn set_pte(dir: &mut PageDirectory, vaddr: VirtAddr, pte: Pte) {
    let aligned = VirtAddr::new(vaddr.as_u64() & !0xFFF);
    dir.install_pte(aligned, pte);
}

/// Top-level dispatch called from the trap handler with interrupts
/// still disabled. `handlers` are tried in registration order after
/// the CoW path declines the fault.
pub fn handle_page_fault(
    dir: &mut PageDirectory,
    vaddr: VirtAddr,
    access: FaultAccess,
    handlers: &[&dyn MappingFaultHandler],
) -> PageFaultOutcome {
    if !access.user_mode && !access.present {
        return PageFaultOutcome::Fatal;
    }

    if let Some(result) = try_cow_fault(dir, vaddr, access) {
        return match result {
            Ok(()) => PageFaultOutcome::Resolved,
            Err(MemError::OutOfMemory) if access.user_mode => PageFaultOutcome::Kill,
            Err(_) => PageFaultOutcome::Fatal,
        };
    }

    for handler in handlers {
        if let Some(resolved) = handler.try_handle(dir, vaddr, access) {
            return if resolved {
                PageFaultOutcome::Resolved
            } else {
                PageFaultOutcome::BusError
            };
        }
    }

    if access.user_mode {
        PageFaultOutcome::SegFault
    } else {
        PageFaultOutcome::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::frame::AvailableRange;
    use crate::mm::pdir::MapFlags;
    use x86_64::PhysAddr;

    fn with_pool<T>(pages: u64, f: impl FnOnce() -> T) -> T {
        FRAME_ALLOCATOR.lock().init(
            &[AvailableRange {
                start: PhysAddr::new(4096),
                end: PhysAddr::new(4096 + pages * 4096),
            }],
            PhysAddr::new(4096 + pages * 4096),
        );
        pf_table::init(PhysAddr::new(4096 + pages * 4096));
        phys_mem::init(PhysAddr::new(4096 + pages * 4096));
        f()
    }

    #[test]
    fn sole_owner_cow_fault_just_restores_write() {
        with_pool(8, || {
            let mut dir = PageDirectory::new();
            dir.map_page(
                VirtAddr::new(0x1000),
                PhysAddr::new(0),
                MapFlags::RW | MapFlags::USER | MapFlags::DO_ALLOC,
            )
            .unwrap();
            // Simulate the state left behind by `clone_cow` on a page
            // that, in this test, has no other sibling referencing it:
            // RW cleared, COW_ORIG_RW set, refcount untouched (still 1).
            let pte = dir.lookup(VirtAddr::new(0x1000)).unwrap();
            let cow_pte = pte.mark_cow();
            dir.install_pte(VirtAddr::new(0x1000), cow_pte);
            let remapped = dir.lookup(VirtAddr::new(0x1000)).unwrap();
            assert!(!remapped.flags().contains(PteFlags::WRITABLE));
            assert!(remapped.flags().contains(PteFlags::COW_ORIG_RW));

            let access = FaultAccess {
                write: true,
                present: true,
                user_mode: true,
            };
            let outcome = handle_page_fault(&mut dir, VirtAddr::new(0x1000), access, &[]);
            assert_eq!(outcome, PageFaultOutcome::Resolved);

            let resolved_pte = dir.lookup(VirtAddr::new(0x1000)).unwrap();
            assert!(resolved_pte.flags().contains(PteFlags::WRITABLE));
            assert!(!resolved_pte.flags().contains(PteFlags::COW_ORIG_RW));
        });
    }

    #[test]
    fn no_handler_claims_fault_is_segfault_in_user_mode() {
        with_pool(8, || {
            let mut dir = PageDirectory::new();
            let access = FaultAccess {
                write: false,
                present: false,
                user_mode: true,
            };
            let outcome = handle_page_fault(&mut dir, VirtAddr::new(0x9000), access, &[]);
            assert_eq!(outcome, PageFaultOutcome::SegFault);
        });
    }

    #[test]
    fn cow_oom_in_user_mode_returns_kill_not_segfault() {
        with_pool(1, || {
            let mut dir = PageDirectory::new();
            dir.map_page(
                VirtAddr::new(0x1000),
                PhysAddr::new(0),
                MapFlags::RW | MapFlags::USER | MapFlags::DO_ALLOC,
            )
            .unwrap();
            // Bumps the frame's refcount to 2 and marks both sides CoW,
            // so the coming write fault takes the multi-owner split
            // path rather than the sole-owner unshare path.
            let _clone = dir.clone_cow().unwrap();

            // The pool's single frame is already mapped; the split has
            // nothing left to allocate into.
            let access = FaultAccess {
                write: true,
                present: true,
                user_mode: true,
            };
            let outcome = handle_page_fault(&mut dir, VirtAddr::new(0x1000), access, &[]);
            assert_eq!(outcome, PageFaultOutcome::Kill);
            assert_eq!(outcome.signal(), Some(Signal::Kill));
        });
    }

    #[test]
    fn copy_on_write_split_duplicates_frame_content() {
        with_pool(8, || {
            let mut dir = PageDirectory::new();
            dir.map_page(
                VirtAddr::new(0x1000),
                PhysAddr::new(0),
                MapFlags::RW | MapFlags::USER | MapFlags::DO_ALLOC,
            )
            .unwrap();
            let parent_frame = PhysFrame::containing_address(dir.lookup(VirtAddr::new(0x1000)).unwrap().addr());
            phys_mem::write(parent_frame, &[0xAAu8; 4096]);

            let mut clone = dir.clone_cow().unwrap();

            let access = FaultAccess {
                write: true,
                present: true,
                user_mode: true,
            };
            let outcome = handle_page_fault(&mut clone, VirtAddr::new(0x1000), access, &[]);
            assert_eq!(outcome, PageFaultOutcome::Resolved);

            let child_frame = PhysFrame::containing_address(clone.lookup(VirtAddr::new(0x1000)).unwrap().addr());
            assert_ne!(child_frame, parent_frame);
            assert_eq!(phys_mem::read(child_frame), [0xAAu8; 4096]);
            assert_eq!(phys_mem::read(parent_frame), [0xAAu8; 4096]);
        });
    }

    #[test]
    fn kernel_mode_unresolved_fault_is_fatal() {
        with_pool(8, || {
            let mut dir = PageDirectory::new();
            let access = FaultAccess {
                write: false,
                present: false,
                user_mode: false,
            };
            let outcome = handle_page_fault(&mut dir, VirtAddr::new(0x9000), access, &[]);
            assert_eq!(outcome, PageFaultOutcome::Fatal);
        });
    }
}
