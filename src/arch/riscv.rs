//! Nascent RISC-V arch backend. No original-kernel RISC-V behavior is
//! in scope for any of the five subsystems this core implements; this
//! module exists only so the `riscv` feature compiles to something,
//! not to a working port. Every primitive panics if actually called.

use x86_64::VirtAddr;

pub fn faulting_address() -> VirtAddr {
    unimplemented!("riscv arch backend is a stub; no fault reporting exists yet")
}

pub fn flush_page(_addr: VirtAddr) {
    unimplemented!("riscv arch backend is a stub; no TLB model exists yet")
}

pub fn flush_all() {
    unimplemented!("riscv arch backend is a stub; no TLB model exists yet")
}

pub fn halt() {
    unimplemented!("riscv arch backend is a stub; no wfi wrapper exists yet")
}
