//! Per-frame reference counts, backing copy-on-write and shared
//! mappings. Indexed in parallel with the frame allocator's bitmap;
//! absent from the reference kernel's buddy allocator, so this table
//! is the one genuinely new piece of the physical memory layer.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};
use spin::Mutex;
use x86_64::PhysAddr;

use crate::config::PAGE_SIZE;
use crate::mm::frame::PhysFrame;

struct RefcountTable {
    counts: Vec<AtomicU32>,
    phys_mem_lim: u64,
}

impl RefcountTable {
    const fn new_empty() -> Self {
        RefcountTable {
            counts: Vec::new(),
            phys_mem_lim: 0,
        }
    }

    fn init(&mut self, phys_mem_lim: PhysAddr) {
        let frame_count = (phys_mem_lim.as_u64() / PAGE_SIZE as u64) as usize;
        self.counts = (0..frame_count).map(|_| AtomicU32::new(0)).collect();
        self.phys_mem_lim = phys_mem_lim.as_u64();
    }

    fn in_range(&self, frame: PhysFrame) -> bool {
        frame.start_address().as_u64() < self.phys_mem_lim
    }

    fn slot(&self, frame: PhysFrame) -> Option<&AtomicU32> {
        self.counts.get((frame.start_address().as_u64() / PAGE_SIZE as u64) as usize)
    }

    fn ref_inc(&self, frame: PhysFrame) {
        if !self.in_range(frame) {
            return;
        }
        if let Some(slot) = self.slot(frame) {
            slot.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn ref_dec(&self, frame: PhysFrame) -> u32 {
        if !self.in_range(frame) {
            return 0;
        }
        match self.slot(frame) {
            Some(slot) => {
                let prev = slot.fetch_sub(1, Ordering::AcqRel);
                debug_assert!(prev > 0, "refcount underflow");
                prev - 1
            }
            None => 0,
        }
    }

    fn ref_get(&self, frame: PhysFrame) -> u32 {
        if !self.in_range(frame) {
            return 0;
        }
        self.slot(frame).map(|s| s.load(Ordering::Acquire)).unwrap_or(0)
    }
}

static TABLE: Mutex<RefcountTable> = Mutex::new(RefcountTable::new_empty());

/// Must be called once, after the frame allocator has learned
/// `phys_mem_lim` from the boot memory map.
pub fn init(phys_mem_lim: PhysAddr) {
    TABLE.lock().init(phys_mem_lim);
}

/// Increments the refcount of `frame`. A no-op for device memory
/// above `phys_mem_lim`, per the contract in the memory component's
/// design.
pub fn ref_inc(frame: PhysFrame) {
    TABLE.lock().ref_inc(frame);
}

/// Decrements the refcount of `frame` and returns the value after the
/// decrement. A no-op (returning 0) for device memory.
pub fn ref_dec(frame: PhysFrame) -> u32 {
    TABLE.lock().ref_dec(frame)
}

pub fn ref_get(frame: PhysFrame) -> u32 {
    TABLE.lock().ref_get(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(n: u64) -> PhysFrame {
        PhysFrame::from_start_address(PhysAddr::new(n * PAGE_SIZE as u64))
    }

    #[test]
    fn fresh_frame_starts_at_zero() {
        let mut table = RefcountTable::new_empty();
        table.init(PhysAddr::new(4 * PAGE_SIZE as u64));
        assert_eq!(table.ref_get(frame(0)), 0);
    }

    #[test]
    fn inc_dec_round_trips() {
        let mut table = RefcountTable::new_empty();
        table.init(PhysAddr::new(4 * PAGE_SIZE as u64));
        let f = frame(0);
        table.ref_inc(f);
        table.ref_inc(f);
        assert_eq!(table.ref_get(f), 2);
        assert_eq!(table.ref_dec(f), 1);
        assert_eq!(table.ref_dec(f), 0);
    }

    #[test]
    fn device_memory_above_limit_is_noop() {
        let mut table = RefcountTable::new_empty();
        table.init(PhysAddr::new(1 * PAGE_SIZE as u64));
        let device_frame = frame(16);
        table.ref_inc(device_frame);
        assert_eq!(table.ref_get(device_frame), 0);
        assert_eq!(table.ref_dec(device_frame), 0);
    }

    #[test]
    fn global_table_init_and_access() {
        init(PhysAddr::new(2 * PAGE_SIZE as u64));
        let f = frame(0);
        let before = ref_get(f);
        ref_inc(f);
        assert_eq!(ref_get(f), before + 1);
        ref_dec(f);
    }
}
