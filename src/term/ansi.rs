//! The byte-level ANSI/VT100 escape filter: `default → esc1 → esc2_*`
//! state machine that turns a raw input byte stream into
//! `TermAction`s, per SPEC_FULL.md §4.5's CSI dispatch table.
//!
//! Grounded on `original_source/modules/console/console.c`'s
//! `tty_csi_ABCD_handler`/`tty_csi_EF_handler`/`tty_csi_m_handler`
//! family (the CSI parameter-parsing and per-final-byte dispatch
//! shape), transcribed into a Rust state enum and a `match` over the
//! final byte rather than the original's function-pointer table.

use alloc::vec;
use alloc::vec::Vec;

use crate::term::action::{AttrOp, CursorMove, DeleteTarget, EraseMode, ScrollDir, TermAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Default,
    Esc1,
    Esc2Csi,
    /// `ESC (` / `ESC )`: next byte selects the G0/G1 charset.
    Esc2Charset,
    /// Saw a final byte we don't recognize the intermediate form of;
    /// skip until a final byte in `0x40..=0x5f` ends it.
    Esc2Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnsiEvent {
    Action(TermAction),
    /// A byte sequence that must be delivered back to the reading
    /// side of the TTY (DSR, DA) rather than applied to the screen.
    Reply(Vec<u8>),
    /// DSR mode 6: the caller must format `\x1b[{row};{col}R` itself,
    /// since the parser has no notion of the current cursor position.
    RequestCursorReport,
}

/// Byte-at-a-time ANSI/VT100 filter. One instance per terminal;
/// carries no data beyond the in-progress escape sequence.
pub struct AnsiParser {
    state: State,
    params: Vec<u16>,
    current: Option<u16>,
    private: bool,
}

impl AnsiParser {
    pub fn new() -> Self {
        AnsiParser {
            state: State::Default,
            params: Vec::new(),
            current: None,
            private: false,
        }
    }

    fn reset_params(&mut self) {
        self.params.clear();
        self.current = None;
        self.private = false;
    }

    /// A 1-based count parameter: omitted or explicitly zero both
    /// mean 1 (the convention real VT100-derived terminals use for
    /// movement/line/char counts).
    fn count_param(&self, idx: usize) -> u16 {
        match self.params.get(idx) {
            None | Some(0) => 1,
            Some(&v) => v,
        }
    }

    /// A 0-based mode parameter (ED/EL): omission and explicit zero
    /// are different only in that omission also means mode 0, so they
    /// collapse to the same value here too.
    fn mode_param(&self, idx: usize) -> u16 {
        *self.params.get(idx).unwrap_or(&0)
    }

    /// Feeds one input byte, returning any events it completed (zero,
    /// one, or — for a multi-parameter SGR — several).
    pub fn feed(&mut self, c: u8) -> Vec<AnsiEvent> {
        match self.state {
            State::Default => {
                if c == 0x1b {
                    self.state = State::Esc1;
                    Vec::new()
                } else {
                    vec![AnsiEvent::Action(TermAction::Write(vec![c]))]
                }
            }
            State::Esc1 => self.feed_esc1(c),
            State::Esc2Csi => self.feed_csi(c),
            State::Esc2Charset => {
                self.state = State::Default;
                Vec::new()
            }
            State::Esc2Unknown => {
                if (0x40..=0x5f).contains(&c) {
                    self.state = State::Default;
                }
                Vec::new()
            }
        }
    }

    fn feed_esc1(&mut self, c: u8) -> Vec<AnsiEvent> {
        match c {
            b'[' => {
                self.reset_params();
                self.state = State::Esc2Csi;
            }
            b'(' | b')' => self.state = State::Esc2Charset,
            _ => self.state = State::Default,
        }
        Vec::new()
    }

    fn feed_csi(&mut self, c: u8) -> Vec<AnsiEvent> {
        match c {
            b'?' => {
                self.private = true;
                Vec::new()
            }
            b'0'..=b'9' => {
                self.current = Some(self.current.unwrap_or(0).saturating_mul(10).saturating_add((c - b'0') as u16));
                Vec::new()
            }
            b';' => {
                self.params.push(self.current.take().unwrap_or(0));
                Vec::new()
            }
            0x20..=0x2F => Vec::new(),
            0x40..=0x7E => {
                if let Some(cur) = self.current.take() {
                    self.params.push(cur);
                } else if self.params.is_empty() {
                    // no parameters at all were seen; leave params empty
                    // so count_param()/mode_param() apply their defaults
                }
                let events = self.dispatch_final(c);
                self.state = State::Default;
                events
            }
            _ => {
                self.state = State::Esc2Unknown;
                Vec::new()
            }
        }
    }

    fn dispatch_final(&mut self, final_byte: u8) -> Vec<AnsiEvent> {
        use AnsiEvent::Action;
        match final_byte {
            b'A' => vec![Action(TermAction::MoveCursor(CursorMove::Rel {
                drow: -(self.count_param(0) as i16),
                dcol: 0,
            }))],
            b'B' => vec![Action(TermAction::MoveCursor(CursorMove::Rel {
                drow: self.count_param(0) as i16,
                dcol: 0,
            }))],
            b'C' => vec![Action(TermAction::MoveCursor(CursorMove::Rel {
                drow: 0,
                dcol: self.count_param(0) as i16,
            }))],
            b'D' => vec![Action(TermAction::MoveCursor(CursorMove::Rel {
                drow: 0,
                dcol: -(self.count_param(0) as i16),
            }))],
            b'E' => vec![Action(TermAction::MoveCursor(CursorMove::RelRowSetCol0 {
                drow: self.count_param(0) as i16,
            }))],
            b'F' => vec![Action(TermAction::MoveCursor(CursorMove::RelRowSetCol0 {
                drow: -(self.count_param(0) as i16),
            }))],
            b'G' => vec![Action(TermAction::MoveCursor(CursorMove::AbsCol(
                self.count_param(0).saturating_sub(1),
            )))],
            b'H' | b'f' => vec![Action(TermAction::MoveCursor(CursorMove::Abs {
                row: self.count_param(0).saturating_sub(1),
                col: self.count_param(1).saturating_sub(1),
            }))],
            b'J' => vec![Action(TermAction::EraseInDisplay(match self.mode_param(0) {
                1 => EraseMode::ToStart,
                2 => EraseMode::All,
                3 => EraseMode::AllAndScrollback,
                _ => EraseMode::ToEnd,
            }))],
            b'K' => vec![Action(TermAction::EraseInLine(match self.mode_param(0) {
                1 => EraseMode::ToStart,
                2 => EraseMode::All,
                _ => EraseMode::ToEnd,
            }))],
            b'S' => vec![Action(TermAction::NonBufferedScroll(ScrollDir::Up, self.count_param(0)))],
            b'T' => vec![Action(TermAction::NonBufferedScroll(ScrollDir::Down, self.count_param(0)))],
            b'L' => vec![Action(TermAction::InsertLines(self.count_param(0)))],
            b'M' => vec![Action(TermAction::DeleteLines(self.count_param(0)))],
            b'P' => vec![Action(TermAction::DeleteChars(self.count_param(0)))],
            b'X' => vec![Action(TermAction::EraseChars(self.count_param(0)))],
            b'@' => vec![Action(TermAction::InsertChars(self.count_param(0)))],
            b'd' => vec![Action(TermAction::MoveCursor(CursorMove::AbsRow(
                self.count_param(0).saturating_sub(1),
            )))],
            b'`' => vec![Action(TermAction::MoveCursor(CursorMove::AbsCol(
                self.count_param(0).saturating_sub(1),
            )))],
            b'm' => self.dispatch_sgr(),
            b'n' => match self.mode_param(0) {
                5 => vec![AnsiEvent::Reply(alloc::vec![0x1b, b'[', b'0', b'n']), ],
                6 => vec![AnsiEvent::RequestCursorReport],
                _ => Vec::new(),
            },
            b's' => vec![Action(TermAction::SaveCursor)],
            b'u' => vec![Action(TermAction::RestoreCursor)],
            b'r' => {
                let top = self.count_param(0).saturating_sub(1);
                let bottom = self.params.get(1).map(|&b| b.saturating_sub(1));
                vec![Action(TermAction::SetScrollRegion { top, bottom })]
            }
            b'c' => vec![AnsiEvent::Reply(alloc::vec![0x1b, b'[', b'?', b'6', b'c'])],
            b'h' if self.private => self.dispatch_private_mode(true),
            b'l' if self.private => self.dispatch_private_mode(false),
            _ => Vec::new(),
        }
    }

    fn dispatch_private_mode(&self, enable: bool) -> Vec<AnsiEvent> {
        let mut events = Vec::new();
        let params = if self.params.is_empty() { &[0u16][..] } else { &self.params[..] };
        for &p in params {
            match p {
                25 => events.push(AnsiEvent::Action(if enable {
                    TermAction::EnableCursor
                } else {
                    TermAction::DisableCursor
                })),
                1049 => events.push(AnsiEvent::Action(TermAction::UseAltBuffer(enable))),
                _ => {}
            }
        }
        events
    }

    fn dispatch_sgr(&self) -> Vec<AnsiEvent> {
        if self.params.is_empty() {
            return vec![AnsiEvent::Action(TermAction::SetAttr(AttrOp::Reset))];
        }
        let mut events = Vec::new();
        for &p in &self.params {
            let op = match p {
                0 => AttrOp::Reset,
                1 => AttrOp::Bold,
                7 => AttrOp::Reverse,
                30..=37 => AttrOp::Fg((p - 30) as u8),
                90..=97 => AttrOp::Fg((p - 90 + 8) as u8),
                39 => AttrOp::DefaultFg,
                40..=47 => AttrOp::Bg((p - 40) as u8),
                100..=107 => AttrOp::Bg((p - 100 + 8) as u8),
                49 => AttrOp::DefaultBg,
                _ => continue,
            };
            events.push(AnsiEvent::Action(TermAction::SetAttr(op)));
        }
        events
    }
}

impl Default for AnsiParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_str(p: &mut AnsiParser, s: &str) -> Vec<AnsiEvent> {
        let mut out = Vec::new();
        for &b in s.as_bytes() {
            out.extend(p.feed(b));
        }
        out
    }

    #[test]
    fn plain_byte_becomes_write_action() {
        let mut p = AnsiParser::new();
        let events = p.feed(b'x');
        assert_eq!(events, vec![AnsiEvent::Action(TermAction::Write(vec![b'x']))]);
    }

    #[test]
    fn cuu_with_omitted_param_defaults_to_one() {
        let mut p = AnsiParser::new();
        let events = feed_str(&mut p, "\x1b[A");
        assert_eq!(
            events,
            vec![AnsiEvent::Action(TermAction::MoveCursor(CursorMove::Rel { drow: -1, dcol: 0 }))]
        );
    }

    #[test]
    fn cup_parses_row_and_col() {
        let mut p = AnsiParser::new();
        let events = feed_str(&mut p, "\x1b[5;10H");
        assert_eq!(
            events,
            vec![AnsiEvent::Action(TermAction::MoveCursor(CursorMove::Abs { row: 4, col: 9 }))]
        );
    }

    #[test]
    fn sgr_multiple_params_each_become_an_action() {
        let mut p = AnsiParser::new();
        let events = feed_str(&mut p, "\x1b[1;31;7m");
        assert_eq!(
            events,
            vec![
                AnsiEvent::Action(TermAction::SetAttr(AttrOp::Bold)),
                AnsiEvent::Action(TermAction::SetAttr(AttrOp::Fg(1))),
                AnsiEvent::Action(TermAction::SetAttr(AttrOp::Reverse)),
            ]
        );
    }

    #[test]
    fn bright_foreground_offsets_by_eight() {
        let mut p = AnsiParser::new();
        let events = feed_str(&mut p, "\x1b[92m");
        assert_eq!(events, vec![AnsiEvent::Action(TermAction::SetAttr(AttrOp::Fg(10)))]);
    }

    #[test]
    fn private_mode_25_toggles_cursor_visibility() {
        let mut p = AnsiParser::new();
        assert_eq!(
            feed_str(&mut p, "\x1b[?25l"),
            vec![AnsiEvent::Action(TermAction::DisableCursor)]
        );
        assert_eq!(
            feed_str(&mut p, "\x1b[?25h"),
            vec![AnsiEvent::Action(TermAction::EnableCursor)]
        );
    }

    #[test]
    fn private_mode_1049_toggles_alt_buffer() {
        let mut p = AnsiParser::new();
        assert_eq!(
            feed_str(&mut p, "\x1b[?1049h"),
            vec![AnsiEvent::Action(TermAction::UseAltBuffer(true))]
        );
    }

    #[test]
    fn dsr_5_replies_immediately() {
        let mut p = AnsiParser::new();
        assert_eq!(feed_str(&mut p, "\x1b[5n"), vec![AnsiEvent::Reply(alloc::vec![0x1b, b'[', b'0', b'n'])]);
    }

    #[test]
    fn dsr_6_requests_cursor_report_from_the_caller() {
        let mut p = AnsiParser::new();
        assert_eq!(feed_str(&mut p, "\x1b[6n"), vec![AnsiEvent::RequestCursorReport]);
    }

    #[test]
    fn decstbm_without_bottom_leaves_it_unresolved() {
        let mut p = AnsiParser::new();
        let events = feed_str(&mut p, "\x1b[5r");
        assert_eq!(
            events,
            vec![AnsiEvent::Action(TermAction::SetScrollRegion { top: 4, bottom: None })]
        );
    }

    #[test]
    fn unknown_csi_final_is_silently_ignored() {
        let mut p = AnsiParser::new();
        assert_eq!(feed_str(&mut p, "\x1b[5z"), Vec::new());
    }
}
