//! The tagged action a terminal mutation compiles down to, and the
//! bounded FIFO queue a single consumer drains in order.
//!
//! Grounded on this crate's own `task::worker::WorkerQueue` (bounded
//! `VecDeque` behind a `spin::Mutex`, enqueue-must-never-block), here
//! carrying a real Rust sum type in place of the original's packed C
//! union (`term_action_type`/`struct term_action` in
//! `original_source/modules/console/term_int.h`) per SPEC_FULL.md
//! §4.5's explicit direction to model it as one.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use spin::Mutex;

use crate::config::WORKER_QUEUE_CAPACITY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseMode {
    ToEnd,
    ToStart,
    All,
    /// `ED` mode 3: also discard scrollback.
    AllAndScrollback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteTarget {
    PrevChar,
    PrevWord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMove {
    Abs { row: u16, col: u16 },
    Rel { drow: i16, dcol: i16 },
    /// CNL/CPL: move `drow` lines, then snap the column to 0.
    RelRowSetCol0 { drow: i16 },
    /// VPA: move to an absolute row, column unchanged.
    AbsRow(u16),
    /// CHA/HPA: move to an absolute column, row unchanged.
    AbsCol(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDir {
    Up,
    Down,
}

/// One SGR parameter's effect, applied cumulatively to the vterm's
/// current write attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    Reset,
    Bold,
    Reverse,
    Fg(u8),
    Bg(u8),
    DefaultFg,
    DefaultBg,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TermAction {
    Write(Vec<u8>),
    /// Bypasses the ANSI filter; used for raw framebuffer-mode output.
    DirectWrite(Vec<u8>),
    Delete(DeleteTarget),
    EraseInDisplay(EraseMode),
    EraseInLine(EraseMode),
    /// Buffered scroll of the live viewport (mouse wheel / PageUp).
    Scroll(ScrollDir, u16),
    SetColOffset(u16),
    MoveCursor(CursorMove),
    SaveCursor,
    RestoreCursor,
    SetAttr(AttrOp),
    Reset,
    PauseVideo,
    RestartVideo,
    EnableCursor,
    DisableCursor,
    UseAltBuffer(bool),
    /// SU/SD: scrolls the scroll region immediately, not the viewport.
    NonBufferedScroll(ScrollDir, u16),
    InsertLines(u16),
    DeleteLines(u16),
    /// DECSTBM. `bottom: None` means "last row of the screen" (the
    /// parser has no notion of screen height; the vterm resolves it).
    SetScrollRegion { top: u16, bottom: Option<u16> },
    InsertChars(u16),
    DeleteChars(u16),
    EraseChars(u16),
}

/// A single-consumer FIFO of pending terminal mutations. Producers
/// (VFS writes, the ioctl layer) call `try_enqueue`; the terminal's
/// own consumer drains it with `dequeue` and applies each action under
/// the vterm lock, in order.
pub struct ActionQueue {
    items: Mutex<VecDeque<TermAction>>,
    capacity: usize,
}

impl ActionQueue {
    pub fn new(capacity: usize) -> Self {
        ActionQueue {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Returns `false` (dropping the action) if the queue is full.
    /// Callers that need a guarantee of delivery (panic-mode output)
    /// should bypass the queue entirely rather than retry.
    pub fn try_enqueue(&self, action: TermAction) -> bool {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            return false;
        }
        items.push_back(action);
        true
    }

    pub fn dequeue(&self) -> Option<TermAction> {
        self.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ActionQueue {
    fn default() -> Self {
        Self::new(WORKER_QUEUE_CAPACITY)
    }
}
