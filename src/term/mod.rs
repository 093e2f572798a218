//! Virtual terminal: VT100/ANSI screen state, the TTY line discipline
//! sitting in front of it, and keyboard scan-code decoding.
//!
//! The pieces compose as: `keyboard::ScancodeDecoder` turns raw
//! controller bytes into `tty::KeyEvent`s, which `tty::Tty::feed_key`
//! turns into readable bytes per the active line discipline.
//! Output-side, `ansi::AnsiParser` turns bytes written to the terminal
//! into `action::TermAction`s (queued on an `action::ActionQueue` for
//! the normal path, applied directly in panic mode), which
//! `vterm::VTerm::apply` resolves against the `cell::CellGrid`.

pub mod action;
pub mod ansi;
pub mod cell;
pub mod keyboard;
pub mod tty;
pub mod vterm;

pub use action::{ActionQueue, TermAction};
pub use ansi::{AnsiEvent, AnsiParser};
pub use cell::{Cell, CellGrid};
pub use keyboard::ScancodeDecoder;
pub use tty::{KdMode, KbMode, KeyEvent, Tty};
pub use vterm::VTerm;
