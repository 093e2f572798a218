//! Kernel core: virtual memory, scheduling, a VFS with a ramfs and a
//! read-only FAT32 reader, and a VT100/ANSI terminal and TTY layer.
//!
//! `#![no_std]` outside of `cargo test`, the same way the reference
//! kernel's own entry point stays buildable as a hosted binary during
//! development: the test harness needs `std`, so the `no_std` attribute
//! is conditional rather than unconditional.

#![cfg_attr(not(test), no_std)]
#![deny(unused_must_use)]

extern crate alloc;

pub mod arch;
pub mod config;
pub mod driver;
pub mod errno;
pub mod fs;
pub mod mm;
pub mod syslog;
pub mod task;
pub mod term;

/// Brings every subsystem up in dependency order: logging first (so
/// every later step can report itself), then paging, the scheduler,
/// the filesystem, and finally the terminal that will carry kernel
/// diagnostics once it's ready to take over from the raw console.
pub struct Kernel {
    pub vfs: fs::Vfs,
    pub scheduler: task::Scheduler,
    pub vterm: term::VTerm,
    pub tty: term::Tty,
    ansi: term::AnsiParser,
    actions: term::ActionQueue,
}

impl Kernel {
    pub fn new() -> Self {
        syslog::enable();
        log::info!("Kernel core initializing");

        let kernel = Kernel {
            vfs: fs::Vfs::new(),
            scheduler: task::Scheduler::new(),
            vterm: term::VTerm::default(),
            tty: term::Tty::new(),
            ansi: term::AnsiParser::new(),
            actions: term::ActionQueue::default(),
        };

        log::info!("Kernel core initialized");
        kernel
    }

    /// Feeds terminal output bytes through the ANSI filter, queuing
    /// whatever actions and TTY replies fall out. Mirrors the normal,
    /// non-panicking write path: actions go through `self.actions`
    /// rather than touching `self.vterm` directly, so the vterm's own
    /// consumer (wherever it runs) stays the only writer.
    pub fn write_output(&mut self, bytes: &[u8]) {
        for &b in bytes {
            for event in self.ansi.feed(b) {
                match event {
                    term::AnsiEvent::Action(action) => {
                        if !self.actions.try_enqueue(action) {
                            log::warn!("terminal action queue full, dropping action");
                        }
                    }
                    term::AnsiEvent::Reply(bytes) => self.tty.receive_reply(&bytes),
                    term::AnsiEvent::RequestCursorReport => {
                        let report = self.vterm.cursor_report();
                        self.tty.receive_reply(&report);
                    }
                }
            }
        }
        self.vterm.drain(&self.actions);
    }

    /// Bypasses the action queue entirely: applies output synchronously
    /// against the vterm. Used only once a panic has been reported,
    /// when the normal consumer may never run again.
    pub fn write_output_panic(&mut self, bytes: &[u8]) {
        for &b in bytes {
            for event in self.ansi.feed(b) {
                if let term::AnsiEvent::Action(action) = event {
                    self.vterm.apply(action);
                }
            }
        }
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_output_renders_plain_text() {
        let mut kernel = Kernel::new();
        kernel.write_output(b"hi");
        assert_eq!(kernel.vterm.grid().get(0, 0).ch(), b'h');
        assert_eq!(kernel.vterm.grid().get(0, 1).ch(), b'i');
    }

    #[test]
    fn write_output_applies_csi_sequences() {
        let mut kernel = Kernel::new();
        kernel.write_output(b"\x1b[31mX");
        assert_eq!(kernel.vterm.grid().get(0, 0).fg(), 1);
    }

    #[test]
    fn cursor_position_report_loops_back_into_the_tty_as_input() {
        let mut kernel = Kernel::new();
        // Real callers querying cursor position put the tty in raw
        // mode first: a canonical reader would never see a reply with
        // no trailing newline, same as on a real Linux tty.
        kernel.tty.kb_mode = term::KbMode::Raw;
        kernel.write_output(b"\x1b[6n");
        let mut buf = [0u8; 16];
        let n = kernel.tty.read(&mut buf);
        assert!(n > 0);
        assert_eq!(&buf[..n], b"\x1b[1;1R");
    }

    #[test]
    fn panic_write_path_bypasses_the_action_queue() {
        let mut kernel = Kernel::new();
        kernel.write_output_panic(b"panic!");
        assert_eq!(kernel.vterm.grid().get(0, 0).ch(), b'p');
        assert!(kernel.actions.is_empty());
    }
}
