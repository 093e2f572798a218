//! i386-class primitives backing `mm`'s page-fault and page-table
//! code: the faulting address, single-page TLB invalidation, and
//! halting the core when there's nothing left to run.

use x86_64::instructions::{hlt, tlb};
use x86_64::VirtAddr;

/// The address that faulted, as the CPU last reported it via CR2.
/// Real hardware reads this from the control register in the page
/// fault handler's prologue before `mm::vmm::handle_page_fault` ever
/// runs; this wrapper exists so callers depend on `arch`, not on the
/// register directly.
pub fn faulting_address() -> VirtAddr {
    let raw = x86_64::registers::control::Cr2::read_raw();
    VirtAddr::new_truncate(raw)
}

/// Invalidates the TLB entry for a single page, after its page-table
/// entry has changed (a CoW break, a new mmap mapping, an munmap).
pub fn flush_page(addr: VirtAddr) {
    tlb::flush(addr);
}

/// Invalidates the whole TLB (full address space switch).
pub fn flush_all() {
    tlb::flush_all();
}

/// Parks the core in a low-power wait until the next interrupt, used
/// by the idle task and the panic handler's final halt loop.
pub fn halt() {
    hlt();
}
