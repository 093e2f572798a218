//! Per-frame byte content, backing the copies that real hardware would
//! perform through a temporary mapping. Shaped like `pf_table`: a
//! `Vec`-backed table indexed by frame number, sized once from the
//! allocator's physical memory limit at boot.
//!
//! Frames above `phys_mem_lim` (device memory, never handed out by
//! `FrameAllocator`) read back as all-zero and silently discard writes,
//! the same "out of range is a no-op" rule `pf_table` uses.

use alloc::vec::Vec;
use spin::Mutex;
use x86_64::PhysAddr;

use crate::config::PAGE_SIZE;
use crate::mm::frame::PhysFrame;

struct ContentTable {
    pages: Vec<[u8; PAGE_SIZE]>,
    phys_mem_lim: u64,
}

impl ContentTable {
    const fn new_empty() -> Self {
        ContentTable {
            pages: Vec::new(),
            phys_mem_lim: 0,
        }
    }

    fn init(&mut self, phys_mem_lim: PhysAddr) {
        self.phys_mem_lim = phys_mem_lim.as_u64();
        let frame_count = (self.phys_mem_lim as usize) / PAGE_SIZE;
        self.pages = alloc::vec![[0u8; PAGE_SIZE]; frame_count];
    }

    fn in_range(&self, frame: PhysFrame) -> bool {
        frame.start_address().as_u64() < self.phys_mem_lim
    }

    fn slot(&self, frame: PhysFrame) -> usize {
        (frame.start_address().as_u64() / PAGE_SIZE as u64) as usize
    }

    fn read(&self, frame: PhysFrame) -> [u8; PAGE_SIZE] {
        if !self.in_range(frame) {
            return [0u8; PAGE_SIZE];
        }
        self.pages[self.slot(frame)]
    }

    fn write(&mut self, frame: PhysFrame, content: &[u8; PAGE_SIZE]) {
        if !self.in_range(frame) {
            return;
        }
        let slot = self.slot(frame);
        self.pages[slot] = *content;
    }

    fn write_at(&mut self, frame: PhysFrame, offset: usize, bytes: &[u8]) {
        if !self.in_range(frame) || offset >= PAGE_SIZE {
            return;
        }
        let slot = self.slot(frame);
        let end = (offset + bytes.len()).min(PAGE_SIZE);
        self.pages[slot][offset..end].copy_from_slice(&bytes[..end - offset]);
    }
}

static TABLE: Mutex<ContentTable> = Mutex::new(ContentTable::new_empty());

pub fn init(phys_mem_lim: PhysAddr) {
    TABLE.lock().init(phys_mem_lim);
}

pub fn read(frame: PhysFrame) -> [u8; PAGE_SIZE] {
    TABLE.lock().read(frame)
}

pub fn write(frame: PhysFrame, content: &[u8; PAGE_SIZE]) {
    TABLE.lock().write(frame, content);
}

pub fn write_at(frame: PhysFrame, offset: usize, bytes: &[u8]) {
    TABLE.lock().write_at(frame, offset, bytes);
}

/// Copies `src`'s content into `dst`, the way the boot/mapping layer's
/// temporary-mapping copy would for a real CoW split.
pub fn copy(src: PhysFrame, dst: PhysFrame) {
    let content = read(src);
    write(dst, &content);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::frame::{AvailableRange, FRAME_ALLOCATOR};

    fn with_pool<T>(pages: u64, f: impl FnOnce() -> T) -> T {
        let lim = PhysAddr::new(4096 + pages * 4096);
        FRAME_ALLOCATOR.lock().init(&[AvailableRange { start: PhysAddr::new(4096), end: lim }], lim);
        init(lim);
        f()
    }

    #[test]
    fn never_written_frame_reads_back_zero() {
        with_pool(4, || {
            let frame = FRAME_ALLOCATOR.lock().allocate().unwrap();
            assert!(read(frame).iter().all(|&b| b == 0));
        });
    }

    #[test]
    fn write_then_read_round_trips() {
        with_pool(4, || {
            let frame = FRAME_ALLOCATOR.lock().allocate().unwrap();
            let content = [0xAAu8; PAGE_SIZE];
            write(frame, &content);
            assert_eq!(read(frame), content);
        });
    }

    #[test]
    fn write_at_patches_only_the_requested_range() {
        with_pool(4, || {
            let frame = FRAME_ALLOCATOR.lock().allocate().unwrap();
            write_at(frame, 10, &[0x42]);
            let content = read(frame);
            assert_eq!(content[10], 0x42);
            assert_eq!(content[9], 0);
            assert_eq!(content[11], 0);
        });
    }

    #[test]
    fn copy_duplicates_content_into_a_distinct_frame() {
        with_pool(4, || {
            let src = FRAME_ALLOCATOR.lock().allocate().unwrap();
            let dst = FRAME_ALLOCATOR.lock().allocate().unwrap();
            write(src, &[0xBBu8; PAGE_SIZE]);
            copy(src, dst);
            assert_eq!(read(dst), [0xBBu8; PAGE_SIZE]);
            assert_ne!(src, dst);
        });
    }

    #[test]
    fn frame_above_phys_mem_lim_is_a_silent_no_op() {
        with_pool(4, || {
            let device_frame = PhysFrame::containing_address(PhysAddr::new(1 << 30));
            write(device_frame, &[0x11u8; PAGE_SIZE]);
            assert!(read(device_frame).iter().all(|&b| b == 0));
        });
    }
}
