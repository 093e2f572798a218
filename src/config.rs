//! Kernel-wide tunables, centralized the way the boot-memory-layout
//! constants are in a real kernel's memory module.

/// Bytes per physical/virtual page on the i386 backend.
pub const PAGE_SIZE: usize = 4096;

/// Page table entries per table (i386: 1024 entries, 4 bytes each).
pub const ENTRIES_PER_TABLE: usize = 1024;

/// Bytes covered by a single page table (4 MiB on i386).
pub const BIG_PAGE_SIZE: usize = PAGE_SIZE * ENTRIES_PER_TABLE;

/// Highest PID/TID the allocator will hand out before wrapping to
/// `lowest_available` only.
pub const MAX_PID: u32 = 32_768;

/// Reserved tid for the scheduler's idle task. One past `MAX_PID`, so
/// it can never collide with a real allocated pid.
pub const IDLE_TID: u32 = MAX_PID + 1;

/// Timer ticks a task may run before `need_resched` is forced.
pub const TIME_SLICE_TICKS: u32 = 20;

/// Scrollback rows kept behind the live viewport of a terminal.
pub const EXTRA_BUFFER_ROWS: usize = 200;

/// Default terminal geometry, matching a standard VGA text console.
pub const DEFAULT_ROWS: usize = 25;
pub const DEFAULT_COLS: usize = 80;

/// Capacity of a worker thread's bounded work queue.
pub const WORKER_QUEUE_CAPACITY: usize = 128;

/// Capacity of a TTY's raw input ring.
pub const TTY_INPUT_RING_CAPACITY: usize = 1024;

/// `termios` control-character defaults, mirroring Linux's `TERM=linux`
/// profile (see `stty -a` on a Linux console).
pub mod cc {
    pub const VINTR: u8 = 0x03;
    pub const VQUIT: u8 = 0x1c;
    pub const VERASE: u8 = 0x7f;
    pub const VKILL: u8 = 0x15;
    pub const VEOF: u8 = 0x04;
    pub const VTIME: u8 = 0;
    pub const VMIN: u8 = 1;
    pub const VSTART: u8 = 0x11;
    pub const VSTOP: u8 = 0x13;
    pub const VSUSP: u8 = 0x1a;
    pub const VWERASE: u8 = 0x17;
}
