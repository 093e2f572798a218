//! `log::Log` sink: a ring buffer of recent records plus an optional
//! direct-to-console passthrough used before the terminal subsystem
//! is fully up.

use core::sync::atomic::{AtomicBool, Ordering};

use alloc::collections::VecDeque;
use alloc::string::String;
use spin::Mutex;

const RING_CAPACITY: usize = 512;

static DIRECT_CONSOLE: AtomicBool = AtomicBool::new(true);

struct Ring {
    lines: VecDeque<String>,
}

impl Ring {
    const fn new() -> Self {
        Ring {
            lines: VecDeque::new(),
        }
    }

    fn push(&mut self, line: String) {
        if self.lines.len() >= RING_CAPACITY {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }
}

static RING: Mutex<Ring> = Mutex::new(Ring::new());

struct KernelLogger;

impl log::Log for KernelLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = alloc::format!("[{}] {}", record.level(), record.args());
        if DIRECT_CONSOLE.load(Ordering::Relaxed) {
            crate::driver::console::write_str(&line);
            crate::driver::console::write_str("\n");
        }
        RING.lock().push(line);
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

/// Installs the kernel logger as the global `log` facade sink.
pub fn enable() {
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(log::LevelFilter::Trace))
        .ok();
}

/// Stops mirroring log lines directly to the console, once a real
/// terminal consumer (or nothing at all, on a headless build) has
/// taken over presentation of kernel diagnostics.
pub fn disable_direct_console() {
    DIRECT_CONSOLE.store(false, Ordering::Relaxed);
}

/// Returns a snapshot of the most recent log lines, oldest first.
/// Used by the debug surface and by tests.
pub fn recent_lines() -> alloc::vec::Vec<String> {
    RING.lock().lines.iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_drops_oldest_past_capacity() {
        let mut ring = Ring::new();
        for i in 0..(RING_CAPACITY + 10) {
            ring.push(alloc::format!("{}", i));
        }
        assert_eq!(ring.lines.len(), RING_CAPACITY);
        assert_eq!(ring.lines.front().unwrap(), "10");
    }
}
