// No stdlib or mainfn outside of `cargo test`
#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]
#![cfg_attr(not(test), feature(alloc_error_handler))]
#![cfg_attr(not(test), feature(panic_info_message))]
#![deny(unused_must_use)]

extern crate alloc;

use core::alloc::Layout;

use corvid::{arch, term, Kernel};

/// Kernel heap arena. No physical memory map is discovered at boot
/// (that belongs to a real bootloader handoff, out of scope for this
/// core), so the allocator is backed by a fixed `.bss` array sized for
/// development and self-test use rather than real discovered RAM.
const HEAP_SIZE: usize = 4 * 1024 * 1024;

#[cfg(not(test))]
static mut HEAP: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

#[cfg(not(test))]
#[global_allocator]
static ALLOCATOR: linked_list_allocator::LockedHeap = linked_list_allocator::LockedHeap::empty();

#[cfg(not(test))]
fn init_heap() {
    unsafe {
        ALLOCATOR.lock().init(HEAP.as_mut_ptr(), HEAP_SIZE);
    }
}

#[cfg(not(test))]
#[alloc_error_handler]
fn out_of_memory(layout: Layout) -> ! {
    log::error!("out of memory: requested {} bytes", layout.size());
    loop {
        arch::halt();
    }
}

/// Tracks whether a panic is already unwinding the panic handler
/// itself, so a panic triggered while reporting a panic doesn't
/// recurse forever.
#[cfg(not(test))]
static PANIC_ACTIVE: core::sync::atomic::AtomicBool = core::sync::atomic::AtomicBool::new(false);

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    use core::sync::atomic::Ordering;

    if !PANIC_ACTIVE.swap(true, Ordering::SeqCst) {
        let location = info
            .location()
            .map(|l| alloc::format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| alloc::string::String::from("unknown location"));

        if let Some(msg) = info.message() {
            log::error!("kernel panic at {}: {:?}", location, msg);
        } else {
            log::error!("kernel panic at {}: no message", location);
        }
    }

    loop {
        arch::halt();
    }
}

#[cfg(not(test))]
#[no_mangle]
pub extern "C" fn _start() -> ! {
    init_heap();

    let mut kernel = Kernel::new();
    kernel.write_output(b"booting...\r\n");

    log::info!("Kernel initialized.");
    corvid::syslog::disable_direct_console();

    kernel.tty.kb_mode = term::KbMode::Canonical;

    loop {
        arch::halt();
    }
}

#[cfg(test)]
fn main() {}
