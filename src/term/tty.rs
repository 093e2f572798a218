//! Termios, the three keyboard line disciplines, controlling-terminal
//! bookkeeping, and `KD_TEXT`/`KD_GRAPHICS` mode switching.
//!
//! Grounded on `original_source/kernel/tty/*` for termios defaults and
//! ioctl semantics (`TIOCSCTTY`/`TIOCNOTTY`/`TIOCSPGRP`/`TIOCGPGRP`,
//! `KDSETMODE`). No teacher precedent exists — the teacher has no TTY
//! layer — so blocking reads are kept a mechanism rather than full
//! scheduler integration: `readable_len` reports whether a read can
//! currently proceed (honoring VMIN/ICANON), and the syscall layer
//! that owns a `Task` decides whether to park it on
//! `task::task::WaitObject::Opaque`, registering via `register_waiter`
//! and draining `take_waiters` on wakeup — the same wait-object this
//! crate's own `task::task` doc comment already names for exactly this
//! case ("a VFS read ready-condition").

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use bitflags::bitflags;

use crate::config::{cc, TTY_INPUT_RING_CAPACITY};
use crate::errno::Errno;
use crate::task::id::{Pid, Tid};

bitflags! {
    #[derive(Default)]
    pub struct IFlags: u32 {
        const ICRNL = 1 << 0;
        const IXON  = 1 << 1;
    }
}

bitflags! {
    #[derive(Default)]
    pub struct OFlags: u32 {
        const OPOST = 1 << 0;
        const ONLCR = 1 << 1;
    }
}

bitflags! {
    #[derive(Default)]
    pub struct LFlags: u32 {
        const ISIG    = 1 << 0;
        const ICANON  = 1 << 1;
        const ECHO    = 1 << 2;
        const ECHOE   = 1 << 3;
        const ECHOK   = 1 << 4;
        const ECHOCTL = 1 << 5;
        const ECHOKE  = 1 << 6;
        const IEXTEN  = 1 << 7;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ControlChars {
    pub vintr: u8,
    pub vquit: u8,
    pub verase: u8,
    pub vkill: u8,
    pub veof: u8,
    pub vtime: u8,
    pub vmin: u8,
    pub vstart: u8,
    pub vstop: u8,
    pub vsusp: u8,
    pub vwerase: u8,
}

impl Default for ControlChars {
    fn default() -> Self {
        ControlChars {
            vintr: cc::VINTR,
            vquit: cc::VQUIT,
            verase: cc::VERASE,
            vkill: cc::VKILL,
            veof: cc::VEOF,
            vtime: cc::VTIME,
            vmin: cc::VMIN,
            vstart: cc::VSTART,
            vstop: cc::VSTOP,
            vsusp: cc::VSUSP,
            vwerase: cc::VWERASE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Termios {
    pub iflag: IFlags,
    pub oflag: OFlags,
    pub lflag: LFlags,
    pub cc: ControlChars,
}

impl Default for Termios {
    /// Linux's `TERM=linux` console profile.
    fn default() -> Self {
        Termios {
            iflag: IFlags::ICRNL | IFlags::IXON,
            oflag: OFlags::OPOST | OFlags::ONLCR,
            lflag: LFlags::ISIG
                | LFlags::ICANON
                | LFlags::ECHO
                | LFlags::ECHOE
                | LFlags::ECHOK
                | LFlags::ECHOCTL
                | LFlags::ECHOKE
                | LFlags::IEXTEN,
            cc: ControlChars::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KbMode {
    Canonical,
    Raw,
    MediumRaw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdMode {
    Text,
    Graphics,
}

#[derive(Debug, Clone, Copy)]
pub struct KeyEvent {
    pub scancode: u8,
    pub extended: bool,
    pub print_char: Option<u8>,
    pub pressed: bool,
}

/// A TTY's input-side state: line discipline, control-character
/// handling, session/controlling-process bookkeeping, and the raw
/// byte ring readers drain from.
pub struct Tty {
    pub termios: Termios,
    pub kb_mode: KbMode,
    kd_mode: KdMode,
    input_ring: VecDeque<u8>,
    line_buffer: Vec<u8>,
    /// Bytes already moved from `line_buffer` into `input_ring` by a
    /// completed line, still awaiting a reader.
    line_ready: usize,
    pub session: Option<Pid>,
    pub fg_pgid: Option<Pid>,
    waiters: Vec<Tid>,
}

impl Tty {
    pub fn new() -> Self {
        Tty {
            termios: Termios::default(),
            kb_mode: KbMode::Canonical,
            kd_mode: KdMode::Text,
            input_ring: VecDeque::with_capacity(TTY_INPUT_RING_CAPACITY),
            line_buffer: Vec::new(),
            line_ready: 0,
            session: None,
            fg_pgid: None,
            waiters: Vec::new(),
        }
    }

    fn push_byte(&mut self, b: u8) {
        if self.input_ring.len() < TTY_INPUT_RING_CAPACITY {
            self.input_ring.push_back(b);
        }
    }

    /// Dispatches one keyboard event per the active line discipline.
    pub fn feed_key(&mut self, ev: KeyEvent) {
        match self.kb_mode {
            KbMode::MediumRaw => {
                if ev.extended {
                    self.push_byte(0xe0);
                }
                let code = if ev.pressed { ev.scancode } else { ev.scancode | 0x80 };
                self.push_byte(code);
            }
            KbMode::Raw => {
                if ev.pressed {
                    if let Some(c) = ev.print_char {
                        self.push_byte(c);
                    }
                }
            }
            KbMode::Canonical => self.feed_canonical(ev),
        }
    }

    /// Delivers bytes a device reply (DSR/DA) generated, as opposed to
    /// a physical keystroke: still subject to the active line
    /// discipline (a canonical-mode reader won't see them until a
    /// newline flushes the line, exactly as real ttys behave — callers
    /// that want a reply back immediately, like a cursor-position
    /// query, are expected to put the tty in raw mode first).
    pub fn receive_reply(&mut self, bytes: &[u8]) {
        for &b in bytes {
            match self.kb_mode {
                KbMode::Canonical => self.canonical_push_byte(b),
                _ => self.push_byte(b),
            }
        }
    }

    fn feed_canonical(&mut self, ev: KeyEvent) {
        if !ev.pressed {
            return;
        }
        let Some(c) = ev.print_char else { return };
        self.canonical_push_byte(c);
    }

    fn canonical_push_byte(&mut self, c: u8) {
        if c == self.termios.cc.verase {
            self.line_buffer.pop();
        } else if c == self.termios.cc.vwerase {
            while matches!(self.line_buffer.last(), Some(b' ')) {
                self.line_buffer.pop();
            }
            while matches!(self.line_buffer.last(), Some(b) if *b != b' ') {
                self.line_buffer.pop();
            }
        } else if c == b'\n' || c == b'\r' {
            self.line_buffer.push(b'\n');
            for &b in &self.line_buffer {
                self.push_byte(b);
            }
            self.line_ready += self.line_buffer.len();
            self.line_buffer.clear();
        } else {
            self.line_buffer.push(c);
        }
    }

    /// Bytes a `read()` may currently take without blocking: a
    /// completed line in canonical mode, or `VMIN` bytes otherwise.
    pub fn readable_len(&self) -> usize {
        match self.kb_mode {
            KbMode::Canonical => self.line_ready,
            _ => {
                let len = self.input_ring.len();
                if len >= self.termios.cc.vmin.max(1) as usize {
                    len
                } else {
                    0
                }
            }
        }
    }

    /// Drains up to `buf.len()` ready bytes. Returns the number read;
    /// `0` means the caller should block (or return `EAGAIN` if
    /// `O_NONBLOCK`) rather than treat this as EOF.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = self.readable_len().min(buf.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.input_ring.pop_front().expect("readable_len overcounted");
        }
        if self.kb_mode == KbMode::Canonical {
            self.line_ready = self.line_ready.saturating_sub(n);
        }
        n
    }

    pub fn register_waiter(&mut self, tid: Tid) {
        self.waiters.push(tid);
    }

    pub fn take_waiters(&mut self) -> Vec<Tid> {
        core::mem::take(&mut self.waiters)
    }

    /// `TIOCSCTTY`: a session leader without a controlling terminal
    /// claims this one.
    pub fn set_controlling(&mut self, sid: Pid) -> Result<(), Errno> {
        if self.session.is_some() {
            return Err(Errno::Perm);
        }
        self.session = Some(sid);
        self.fg_pgid = Some(sid);
        Ok(())
    }

    /// `TIOCNOTTY`: detaches the calling session from this terminal,
    /// a no-op if it isn't the one attached.
    pub fn clear_controlling(&mut self, sid: Pid) {
        if self.session == Some(sid) {
            self.session = None;
            self.fg_pgid = None;
        }
    }

    /// `TIOCSPGRP`: only the session currently attached may change the
    /// foreground process group.
    pub fn set_fg_pgid(&mut self, caller_sid: Pid, pgid: Pid) -> Result<(), Errno> {
        if self.session != Some(caller_sid) {
            return Err(Errno::Perm);
        }
        self.fg_pgid = Some(pgid);
        Ok(())
    }

    pub fn kd_mode(&self) -> KdMode {
        self.kd_mode
    }

    pub fn set_kd_mode(&mut self, mode: KdMode) {
        self.kd_mode = mode;
    }

    /// Called when a process holding `KD_GRAPHICS` dies: restores
    /// `KD_TEXT` unless some other live mapping of the framebuffer
    /// still justifies graphics mode.
    pub fn reclaim_on_death(&mut self, fb_mappings_held_elsewhere: bool) {
        if self.kd_mode == KdMode::Graphics && !fb_mappings_held_elsewhere {
            self.kd_mode = KdMode::Text;
        }
    }
}

impl Default for Tty {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(c: u8) -> KeyEvent {
        KeyEvent {
            scancode: 0,
            extended: false,
            print_char: Some(c),
            pressed: true,
        }
    }

    fn pid(n: u32) -> Pid {
        Tid::new(n).unwrap()
    }

    #[test]
    fn canonical_mode_releases_line_on_newline_only() {
        let mut tty = Tty::new();
        for &b in b"hi" {
            tty.feed_key(key(b));
        }
        assert_eq!(tty.readable_len(), 0);
        tty.feed_key(key(b'\n'));
        assert_eq!(tty.readable_len(), 3);
        let mut buf = [0u8; 3];
        assert_eq!(tty.read(&mut buf), 3);
        assert_eq!(&buf, b"hi\n");
    }

    #[test]
    fn verase_removes_last_char_before_line_release() {
        let mut tty = Tty::new();
        for &b in b"hix" {
            tty.feed_key(key(b));
        }
        tty.feed_key(key(cc::VERASE));
        tty.feed_key(key(b'\n'));
        let mut buf = [0u8; 3];
        assert_eq!(tty.read(&mut buf), 3);
        assert_eq!(&buf, b"hi\n");
    }

    #[test]
    fn vwerase_removes_trailing_word_and_its_separating_spaces() {
        let mut tty = Tty::new();
        for &b in b"foo bar" {
            tty.feed_key(key(b));
        }
        tty.feed_key(key(cc::VWERASE));
        tty.feed_key(key(b'\n'));
        let mut buf = [4; 4];
        let n = tty.read(&mut buf);
        assert_eq!(&buf[..n], b"foo\n");
    }

    #[test]
    fn raw_mode_pushes_printable_bytes_immediately() {
        let mut tty = Tty::new();
        tty.kb_mode = KbMode::Raw;
        tty.feed_key(key(b'q'));
        assert_eq!(tty.readable_len(), 1);
        let mut buf = [0u8; 1];
        assert_eq!(tty.read(&mut buf), 1);
        assert_eq!(buf[0], b'q');
    }

    #[test]
    fn medium_raw_encodes_press_and_release_with_extended_prefix() {
        let mut tty = Tty::new();
        tty.kb_mode = KbMode::MediumRaw;
        tty.feed_key(KeyEvent {
            scancode: 0x1c,
            extended: true,
            print_char: None,
            pressed: true,
        });
        tty.feed_key(KeyEvent {
            scancode: 0x1c,
            extended: true,
            print_char: None,
            pressed: false,
        });
        let mut buf = [0u8; 4];
        assert_eq!(tty.read(&mut buf), 4);
        assert_eq!(buf, [0xe0, 0x1c, 0xe0, 0x9c]);
    }

    #[test]
    fn non_canonical_read_waits_for_vmin_bytes() {
        let mut tty = Tty::new();
        tty.kb_mode = KbMode::Raw;
        tty.termios.cc.vmin = 3;
        tty.feed_key(key(b'a'));
        tty.feed_key(key(b'b'));
        assert_eq!(tty.readable_len(), 0);
        tty.feed_key(key(b'c'));
        assert_eq!(tty.readable_len(), 3);
    }

    #[test]
    fn controlling_terminal_claim_is_exclusive() {
        let mut tty = Tty::new();
        let s1 = pid(5);
        let s2 = pid(9);
        assert!(tty.set_controlling(s1).is_ok());
        assert_eq!(tty.set_controlling(s2).unwrap_err(), Errno::Perm);
        assert_eq!(tty.fg_pgid, Some(s1));
    }

    #[test]
    fn only_attached_session_may_set_foreground_group() {
        let mut tty = Tty::new();
        let s1 = pid(5);
        let s2 = pid(9);
        tty.set_controlling(s1).unwrap();
        assert_eq!(tty.set_fg_pgid(s2, pid(20)).unwrap_err(), Errno::Perm);
        assert!(tty.set_fg_pgid(s1, pid(20)).is_ok());
        assert_eq!(tty.fg_pgid, Some(pid(20)));
    }

    #[test]
    fn kd_graphics_is_reclaimed_on_death_without_live_mappings() {
        let mut tty = Tty::new();
        tty.set_kd_mode(KdMode::Graphics);
        tty.reclaim_on_death(true);
        assert_eq!(tty.kd_mode(), KdMode::Graphics);
        tty.reclaim_on_death(false);
        assert_eq!(tty.kd_mode(), KdMode::Text);
    }
}
