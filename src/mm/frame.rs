//! Physical frame allocator: a bitmap over every frame below
//! `phys_mem_lim`, populated from the boot memory map's available
//! ranges minus whatever the boot layer reserved for the kernel image,
//! modules, ramdisk and framebuffer.

use alloc::vec::Vec;
use spin::Mutex;
use x86_64::PhysAddr;

use crate::config::PAGE_SIZE;
use crate::mm::MemError;

/// A physical, page-aligned frame number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysFrame(u64);

impl PhysFrame {
    pub fn from_start_address(addr: PhysAddr) -> Self {
        assert_eq!(addr.as_u64() % PAGE_SIZE as u64, 0, "unaligned frame address");
        PhysFrame(addr.as_u64() / PAGE_SIZE as u64)
    }

    pub fn containing_address(addr: PhysAddr) -> Self {
        PhysFrame(addr.as_u64() / PAGE_SIZE as u64)
    }

    pub fn start_address(self) -> PhysAddr {
        PhysAddr::new(self.0 * PAGE_SIZE as u64)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A closed-open physical address range known to be usable RAM.
#[derive(Debug, Clone, Copy)]
pub struct AvailableRange {
    pub start: PhysAddr,
    pub end: PhysAddr,
}

struct Bitmap {
    /// One bit per frame; `1` means free.
    words: Vec<u64>,
    frame_count: usize,
}

impl Bitmap {
    fn new_all_reserved(frame_count: usize) -> Self {
        let word_count = (frame_count + 63) / 64;
        Bitmap {
            words: alloc::vec![0u64; word_count],
            frame_count,
        }
    }

    fn mark_free(&mut self, idx: usize) {
        self.words[idx / 64] |= 1 << (idx % 64);
    }

    fn is_free(&self, idx: usize) -> bool {
        self.words[idx / 64] & (1 << (idx % 64)) != 0
    }

    fn set_used(&mut self, idx: usize) {
        self.words[idx / 64] &= !(1u64 << (idx % 64));
    }

    fn find_free(&self) -> Option<usize> {
        for (word_idx, word) in self.words.iter().enumerate() {
            if *word != 0 {
                let bit = word.trailing_zeros() as usize;
                let idx = word_idx * 64 + bit;
                if idx < self.frame_count {
                    return Some(idx);
                }
            }
        }
        None
    }
}

pub struct FrameAllocator {
    bitmap: Bitmap,
    free_count: usize,
}

impl FrameAllocator {
    fn new_empty() -> Self {
        FrameAllocator {
            bitmap: Bitmap::new_all_reserved(0),
            free_count: 0,
        }
    }

    /// Initializes the pool from the union of `ranges`, each already
    /// filtered to exclude reserved regions by the boot layer.
    pub fn init(&mut self, ranges: &[AvailableRange], phys_mem_lim: PhysAddr) {
        let frame_count = (phys_mem_lim.as_u64() / PAGE_SIZE as u64) as usize;
        self.bitmap = Bitmap::new_all_reserved(frame_count);
        self.free_count = 0;
        for range in ranges {
            let start_frame = PhysFrame::containing_address(range.start).index();
            let end_frame = PhysFrame::containing_address(range.end).index();
            for idx in start_frame..end_frame.min(frame_count) {
                if !self.bitmap.is_free(idx) {
                    self.bitmap.mark_free(idx);
                    self.free_count += 1;
                }
            }
        }
    }

    pub fn allocate(&mut self) -> Result<PhysFrame, MemError> {
        let idx = self.bitmap.find_free().ok_or(MemError::OutOfMemory)?;
        self.bitmap.set_used(idx);
        self.free_count -= 1;
        Ok(PhysFrame(idx as u64))
    }

    pub fn free(&mut self, frame: PhysFrame) {
        let idx = frame.index();
        assert!(!self.bitmap.is_free(idx), "double free of physical frame");
        self.bitmap.mark_free(idx);
        self.free_count += 1;
    }

    pub fn free_frames(&self) -> usize {
        self.free_count
    }
}

pub static FRAME_ALLOCATOR: Mutex<FrameAllocator> = Mutex::new(FrameAllocator::new_empty());
