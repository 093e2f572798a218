//! The terminal proper: owns the primary and alternate `CellGrid`s,
//! cursor position and attribute state, and the consumer side of the
//! `ActionQueue` that applies each `TermAction` in order.
//!
//! Field shape (`row`/`col`/`col_offset`, separate
//! `main`/`alt_scroll_region`, `saved_cur_row`/`saved_cur_col`,
//! `using_alt_buffer`, `cursor_enabled`) is grounded directly on
//! `original_source/modules/console/vterm_struct.h`'s `struct vterm`;
//! SGR attribute accumulation (bold brightening the stored foreground,
//! reverse baked into the stored colors rather than kept as a
//! separate bit, since `Cell` has none to spare) is grounded on
//! `console.c`'s `tty_csi_m_handler_param`. No teacher precedent
//! exists for any of this — the teacher has no terminal emulator.

use alloc::vec::Vec;

use super::action::{AttrOp, CursorMove, DeleteTarget, EraseMode, ScrollDir, TermAction};
use super::cell::{Cell, CellGrid, DEFAULT_BG, DEFAULT_FG};
use super::ansi::AnsiEvent;
use crate::config::{DEFAULT_COLS, DEFAULT_ROWS, EXTRA_BUFFER_ROWS};

#[derive(Debug, Clone, Copy, Default)]
struct Attr {
    fg: u8,
    bg: u8,
    bold: bool,
    reverse: bool,
}

impl Attr {
    fn reset() -> Self {
        Attr { fg: DEFAULT_FG, bg: DEFAULT_BG, bold: false, reverse: false }
    }

    /// The colors actually baked into a newly written `Cell`: bold
    /// brightens an already-dim foreground, reverse swaps fg/bg before
    /// storage (this cell format keeps no separate reverse bit).
    fn effective_colors(&self) -> (u8, u8) {
        let mut fg = self.fg;
        let bg = self.bg;
        if self.bold && fg < 8 {
            fg += 8;
        }
        if self.reverse {
            (bg, fg)
        } else {
            (fg, bg)
        }
    }
}

pub struct VTerm {
    rows: u16,
    cols: u16,
    primary: CellGrid,
    alt: CellGrid,
    using_alt: bool,
    cursor_visible: bool,
    video_paused: bool,
    row: u16,
    col: u16,
    col_offset: u16,
    saved_row: u16,
    saved_col: u16,
    main_scroll_top: u16,
    main_scroll_bottom: u16,
    alt_scroll_top: u16,
    alt_scroll_bottom: u16,
    attr: Attr,
}

impl VTerm {
    pub fn new(rows: u16, cols: u16) -> Self {
        VTerm {
            rows,
            cols,
            primary: CellGrid::new(rows as usize, cols as usize, EXTRA_BUFFER_ROWS),
            alt: CellGrid::new(rows as usize, cols as usize, 0),
            using_alt: false,
            cursor_visible: true,
            video_paused: false,
            row: 0,
            col: 0,
            col_offset: 0,
            saved_row: 0,
            saved_col: 0,
            main_scroll_top: 0,
            main_scroll_bottom: rows.saturating_sub(1),
            alt_scroll_top: 0,
            alt_scroll_bottom: rows.saturating_sub(1),
            attr: Attr::reset(),
        }
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn cursor(&self) -> (u16, u16) {
        (self.row, self.col)
    }

    pub fn cursor_visible(&self) -> bool {
        self.cursor_visible
    }

    pub fn is_video_paused(&self) -> bool {
        self.video_paused
    }

    pub fn grid(&self) -> &CellGrid {
        if self.using_alt {
            &self.alt
        } else {
            &self.primary
        }
    }

    fn grid_mut(&mut self) -> &mut CellGrid {
        if self.using_alt {
            &mut self.alt
        } else {
            &mut self.primary
        }
    }

    fn scroll_top(&self) -> u16 {
        if self.using_alt {
            self.alt_scroll_top
        } else {
            self.main_scroll_top
        }
    }

    fn scroll_bottom(&self) -> u16 {
        if self.using_alt {
            self.alt_scroll_bottom
        } else {
            self.main_scroll_bottom
        }
    }

    /// Formats a `CPR` reply for `AnsiEvent::RequestCursorReport`
    /// (`DSR` mode 6), which the byte-level parser cannot produce
    /// itself since it has no notion of cursor position.
    pub fn cursor_report(&self) -> Vec<u8> {
        alloc::format!("\x1b[{};{}R", self.row + 1, self.col + 1).into_bytes()
    }

    /// Resolves an `AnsiEvent` into either a reply to hand back to the
    /// reading side of the TTY, or an action applied immediately.
    pub fn handle_ansi_event(&mut self, event: AnsiEvent) -> Option<Vec<u8>> {
        match event {
            AnsiEvent::Action(action) => {
                self.apply(action);
                None
            }
            AnsiEvent::Reply(bytes) => Some(bytes),
            AnsiEvent::RequestCursorReport => Some(self.cursor_report()),
        }
    }

    /// Drains and applies every action currently queued, in order.
    pub fn drain(&mut self, queue: &super::action::ActionQueue) {
        while let Some(action) = queue.dequeue() {
            self.apply(action);
        }
    }

    /// Applies one action. Used both by the queue consumer and, in
    /// panic mode, called directly so output reaches the screen
    /// without depending on the queue or its consumer task.
    pub fn apply(&mut self, action: TermAction) {
        match action {
            TermAction::Write(bytes) | TermAction::DirectWrite(bytes) => {
                for b in bytes {
                    self.write_byte(b);
                }
            }
            TermAction::Delete(DeleteTarget::PrevChar) => self.delete_prev_char(),
            TermAction::Delete(DeleteTarget::PrevWord) => self.delete_prev_word(),
            TermAction::EraseInDisplay(mode) => self.erase_in_display(mode),
            TermAction::EraseInLine(mode) => self.erase_in_line(mode),
            TermAction::Scroll(dir, n) => {
                for _ in 0..n {
                    match dir {
                        ScrollDir::Up => self.grid_mut().scroll_up_one(0, self.rows as usize - 1),
                        ScrollDir::Down => self.grid_mut().scroll_down_one(0, self.rows as usize - 1),
                    }
                }
            }
            TermAction::SetColOffset(n) => self.col_offset = n,
            TermAction::MoveCursor(m) => self.move_cursor(m),
            TermAction::SaveCursor => {
                self.saved_row = self.row;
                self.saved_col = self.col;
            }
            TermAction::RestoreCursor => {
                self.row = self.saved_row;
                self.col = self.saved_col;
            }
            TermAction::SetAttr(op) => self.set_attr(op),
            TermAction::Reset => self.full_reset(),
            TermAction::PauseVideo => self.video_paused = true,
            TermAction::RestartVideo => self.video_paused = false,
            TermAction::EnableCursor => self.cursor_visible = true,
            TermAction::DisableCursor => self.cursor_visible = false,
            TermAction::UseAltBuffer(enable) => self.use_alt_buffer(enable),
            TermAction::NonBufferedScroll(dir, n) => {
                let (top, bottom) = (self.scroll_top() as usize, self.scroll_bottom() as usize);
                for _ in 0..n {
                    match dir {
                        ScrollDir::Up => self.grid_mut().scroll_up_one(top, bottom),
                        ScrollDir::Down => self.grid_mut().scroll_down_one(top, bottom),
                    }
                }
            }
            TermAction::InsertLines(n) => {
                let (row, bottom) = (self.row as usize, self.scroll_bottom() as usize);
                for _ in 0..n {
                    self.grid_mut().scroll_down_one(row, bottom);
                }
            }
            TermAction::DeleteLines(n) => {
                let (row, bottom) = (self.row as usize, self.scroll_bottom() as usize);
                for _ in 0..n {
                    self.grid_mut().scroll_up_one(row, bottom);
                }
            }
            TermAction::SetScrollRegion { top, bottom } => {
                let bottom = bottom.unwrap_or(self.rows.saturating_sub(1));
                let top = top.min(self.rows.saturating_sub(1));
                let bottom = bottom.min(self.rows.saturating_sub(1)).max(top);
                if self.using_alt {
                    self.alt_scroll_top = top;
                    self.alt_scroll_bottom = bottom;
                } else {
                    self.main_scroll_top = top;
                    self.main_scroll_bottom = bottom;
                }
                self.row = top;
                self.col = self.col_offset;
            }
            TermAction::InsertChars(n) => self.insert_chars(n),
            TermAction::DeleteChars(n) => self.delete_chars(n),
            TermAction::EraseChars(n) => self.erase_chars(n),
        }
    }

    fn write_byte(&mut self, b: u8) {
        match b {
            b'\n' => self.newline(),
            b'\r' => self.col = self.col_offset,
            0x08 => {
                if self.col > self.col_offset {
                    self.col -= 1;
                }
            }
            b'\t' => {
                let next = ((self.col / 8) + 1) * 8;
                self.col = next.min(self.cols - 1);
            }
            _ => {
                let (fg, bg) = self.attr.effective_colors();
                let (row, col) = (self.row as usize, self.col as usize);
                self.grid_mut().set(row, col, Cell::new(b, fg, bg));
                self.col += 1;
                if self.col >= self.cols {
                    self.col = self.col_offset;
                    self.newline();
                }
            }
        }
    }

    fn newline(&mut self) {
        if self.row < self.scroll_bottom() {
            self.row += 1;
        } else {
            let (top, bottom) = (self.scroll_top() as usize, self.scroll_bottom() as usize);
            self.grid_mut().scroll_up_one(top, bottom);
        }
    }

    fn delete_prev_char(&mut self) {
        if self.col > self.col_offset {
            self.col -= 1;
            let (row, col) = (self.row as usize, self.col as usize);
            self.grid_mut().set(row, col, Cell::blank());
        }
    }

    fn delete_prev_word(&mut self) {
        let row = self.row as usize;
        while self.col > self.col_offset && self.grid().get(row, self.col as usize - 1).ch() == b' ' {
            self.col -= 1;
            self.grid_mut().set(row, self.col as usize, Cell::blank());
        }
        while self.col > self.col_offset && self.grid().get(row, self.col as usize - 1).ch() != b' ' {
            self.col -= 1;
            self.grid_mut().set(row, self.col as usize, Cell::blank());
        }
    }

    fn erase_in_display(&mut self, mode: EraseMode) {
        let (row, rows, cols) = (self.row as usize, self.rows as usize, self.cols as usize);
        match mode {
            EraseMode::ToEnd => {
                self.blank_range(row, self.col as usize, cols);
                for r in (row + 1)..rows {
                    self.grid_mut().clear_row(r);
                }
            }
            EraseMode::ToStart => {
                for r in 0..row {
                    self.grid_mut().clear_row(r);
                }
                self.blank_range(row, 0, self.col as usize + 1);
            }
            EraseMode::All => self.grid_mut().clear_all(),
            EraseMode::AllAndScrollback => {
                self.grid_mut().clear_all();
                self.grid_mut().discard_scrollback();
            }
        }
    }

    fn erase_in_line(&mut self, mode: EraseMode) {
        let (row, cols) = (self.row as usize, self.cols as usize);
        match mode {
            EraseMode::ToEnd => self.blank_range(row, self.col as usize, cols),
            EraseMode::ToStart => self.blank_range(row, 0, self.col as usize + 1),
            EraseMode::All | EraseMode::AllAndScrollback => self.grid_mut().clear_row(row),
        }
    }

    fn blank_range(&mut self, row: usize, start: usize, end: usize) {
        let end = end.min(self.cols as usize);
        for c in start..end {
            self.grid_mut().set(row, c, Cell::blank());
        }
    }

    fn move_cursor(&mut self, m: CursorMove) {
        let max_row = self.rows.saturating_sub(1);
        let max_col = self.cols.saturating_sub(1);
        match m {
            CursorMove::Abs { row, col } => {
                self.row = row.min(max_row);
                self.col = col.min(max_col);
            }
            CursorMove::Rel { drow, dcol } => {
                self.row = clamp_delta(self.row, drow, max_row);
                self.col = clamp_delta(self.col, dcol, max_col);
            }
            CursorMove::RelRowSetCol0 { drow } => {
                self.row = clamp_delta(self.row, drow, max_row);
                self.col = self.col_offset;
            }
            CursorMove::AbsRow(r) => self.row = r.min(max_row),
            CursorMove::AbsCol(c) => self.col = c.min(max_col),
        }
    }

    fn set_attr(&mut self, op: AttrOp) {
        match op {
            AttrOp::Reset => self.attr = Attr::reset(),
            AttrOp::Bold => self.attr.bold = true,
            AttrOp::Reverse => self.attr.reverse = true,
            AttrOp::Fg(c) => self.attr.fg = c,
            AttrOp::Bg(c) => self.attr.bg = c,
            AttrOp::DefaultFg => self.attr.fg = DEFAULT_FG,
            AttrOp::DefaultBg => self.attr.bg = DEFAULT_BG,
        }
    }

    fn full_reset(&mut self) {
        self.attr = Attr::reset();
        self.primary.clear_all();
        self.alt.clear_all();
        self.using_alt = false;
        self.cursor_visible = true;
        self.video_paused = false;
        self.row = 0;
        self.col = 0;
        self.col_offset = 0;
        self.main_scroll_top = 0;
        self.main_scroll_bottom = self.rows.saturating_sub(1);
        self.alt_scroll_top = 0;
        self.alt_scroll_bottom = self.rows.saturating_sub(1);
    }

    fn use_alt_buffer(&mut self, enable: bool) {
        if enable == self.using_alt {
            return;
        }
        if enable {
            self.saved_row = self.row;
            self.saved_col = self.col;
            self.alt.clear_all();
        }
        self.using_alt = enable;
        if !enable {
            self.row = self.saved_row;
            self.col = self.saved_col;
        } else {
            self.row = 0;
            self.col = 0;
        }
    }

    fn insert_chars(&mut self, n: u16) {
        let (row, cols) = (self.row as usize, self.cols as usize);
        let col = self.col as usize;
        let n = n as usize;
        let mut c = cols;
        while c > col + n {
            c -= 1;
            let moved = self.grid().get(row, c - n);
            self.grid_mut().set(row, c, moved);
        }
        self.blank_range(row, col, (col + n).min(cols));
    }

    fn delete_chars(&mut self, n: u16) {
        let (row, cols) = (self.row as usize, self.cols as usize);
        let col = self.col as usize;
        let n = n as usize;
        for c in col..cols.saturating_sub(n) {
            let moved = self.grid().get(row, c + n);
            self.grid_mut().set(row, c, moved);
        }
        self.blank_range(row, cols.saturating_sub(n), cols);
    }

    fn erase_chars(&mut self, n: u16) {
        let row = self.row as usize;
        let col = self.col as usize;
        self.blank_range(row, col, col + n as usize);
    }
}

fn clamp_delta(base: u16, delta: i16, max: u16) -> u16 {
    let v = base as i32 + delta as i32;
    v.clamp(0, max as i32) as u16
}

impl Default for VTerm {
    fn default() -> Self {
        Self::new(DEFAULT_ROWS as u16, DEFAULT_COLS as u16)
    }
}
