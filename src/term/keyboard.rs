//! Scan-code-set-1 decoding: tracks the `0xE0` extended-key prefix and
//! shift/caps-lock/num-lock state, and turns a raw byte stream from
//! the keyboard controller into the `KeyEvent`s `Tty::feed_key`
//! expects.
//!
//! Grounded on `original_source/kernel/arch/generic_x86/8042/kb.c`'s
//! state machine (`kb_state`'s `KB_READ_E0_SCANCODE_STATE`,
//! `translate_printable_key`'s shift/caps-lock-aware layout lookup,
//! and capsLock/numLock toggling on `handle_key_pressed`) and the
//! teacher's `src/driver/keyboard/mod.rs` `Keyboard::notify`
//! press/release byte shape (high bit of the scancode marks release).
//! Real port I/O belongs to the arch layer; this module is pure
//! byte-in, event-out translation so it stays unit-testable without a
//! PS/2 controller.

use super::tty::KeyEvent;

const KEY_LEFT_SHIFT: u8 = 0x2a;
const KEY_RIGHT_SHIFT: u8 = 0x36;
const KEY_LEFT_CTRL: u8 = 0x1d;
const KEY_LEFT_ALT: u8 = 0x38;
const KEY_CAPS_LOCK: u8 = 0x3a;
const KEY_NUM_LOCK: u8 = 0x45;

/// US QWERTY, scan-code set 1, unshifted then shifted. Index by the
/// 7-bit scancode (high bit stripped, i.e. the make code).
const LAYOUT_LOWER: [u8; 0x3a] = [
    0, 0x1b, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', 0x08, b'\t',
    b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', b'\n', 0, b'a', b's',
    b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';', b'\'', b'`', 0, b'\\', b'z', b'x', b'c', b'v',
    b'b', b'n', b'm', b',', b'.', b'/', 0,
];

const LAYOUT_UPPER: [u8; 0x3a] = [
    0, 0x1b, b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(', b')', b'_', b'+', 0x08, b'\t',
    b'Q', b'W', b'E', b'R', b'T', b'Y', b'U', b'I', b'O', b'P', b'{', b'}', b'\n', 0, b'A', b'S',
    b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':', b'"', b'~', 0, b'|', b'Z', b'X', b'C', b'V',
    b'B', b'N', b'M', b'<', b'>', b'?', 0,
];

/// Letters, for caps-lock purposes, are exactly the two ranges
/// `0x10..=0x19` (qwertyuiop) and `0x1e..=0x26` (asdfghjkl) and
/// `0x2c..=0x32` (zxcvbnm); caps-lock inverts shift only there, unlike
/// real shift which also affects digits/punctuation.
fn is_letter_scancode(code: u8) -> bool {
    matches!(code, 0x10..=0x19 | 0x1e..=0x26 | 0x2c..=0x32)
}

#[derive(Debug, Clone, Copy, Default)]
struct Modifiers {
    shift: bool,
    ctrl: bool,
    alt: bool,
    caps_lock: bool,
    num_lock: bool,
}

/// Consumes raw bytes from the keyboard controller one at a time and
/// emits a `KeyEvent` once a full scancode (possibly `0xE0`-prefixed)
/// has been assembled.
#[derive(Default)]
pub struct ScancodeDecoder {
    pending_extended: bool,
    mods: Modifiers,
}

impl ScancodeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, byte: u8) -> Option<KeyEvent> {
        if byte == 0xe0 {
            self.pending_extended = true;
            return None;
        }

        let extended = core::mem::take(&mut self.pending_extended);
        let pressed = byte & 0x80 == 0;
        let code = byte & 0x7f;

        match code {
            KEY_LEFT_SHIFT | KEY_RIGHT_SHIFT => {
                self.mods.shift = pressed;
                return None;
            }
            KEY_LEFT_CTRL => {
                self.mods.ctrl = pressed;
                return None;
            }
            KEY_LEFT_ALT => {
                self.mods.alt = pressed;
                return None;
            }
            KEY_CAPS_LOCK if pressed => {
                self.mods.caps_lock = !self.mods.caps_lock;
                return None;
            }
            KEY_NUM_LOCK if pressed => {
                self.mods.num_lock = !self.mods.num_lock;
                return None;
            }
            _ => {}
        }

        let print_char = self.translate_printable(code);

        Some(KeyEvent {
            scancode: code,
            extended,
            print_char,
            pressed,
        })
    }

    fn translate_printable(&self, code: u8) -> Option<u8> {
        let idx = code as usize;
        if idx >= LAYOUT_LOWER.len() {
            return None;
        }
        let shifted = self.mods.shift ^ (self.mods.caps_lock && is_letter_scancode(code));
        let c = if shifted { LAYOUT_UPPER[idx] } else { LAYOUT_LOWER[idx] };
        if c == 0 {
            return None;
        }
        if self.mods.ctrl && c.is_ascii_alphabetic() {
            return Some(c.to_ascii_uppercase() & 0x1f);
        }
        Some(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_key_press_and_release_round_trip() {
        let mut dec = ScancodeDecoder::new();
        let down = dec.feed(0x1e).unwrap(); // 'a' make code
        assert!(down.pressed);
        assert_eq!(down.print_char, Some(b'a'));
        let up = dec.feed(0x1e | 0x80).unwrap();
        assert!(!up.pressed);
        assert_eq!(up.print_char, Some(b'a'));
    }

    #[test]
    fn shift_uppercases_letters() {
        let mut dec = ScancodeDecoder::new();
        dec.feed(KEY_LEFT_SHIFT);
        let ev = dec.feed(0x1e).unwrap();
        assert_eq!(ev.print_char, Some(b'A'));
    }

    #[test]
    fn shift_on_digit_produces_symbol_not_uppercase_digit() {
        let mut dec = ScancodeDecoder::new();
        dec.feed(KEY_LEFT_SHIFT);
        let ev = dec.feed(0x02).unwrap(); // '1' key
        assert_eq!(ev.print_char, Some(b'!'));
    }

    #[test]
    fn caps_lock_affects_letters_but_not_digits() {
        let mut dec = ScancodeDecoder::new();
        dec.feed(KEY_CAPS_LOCK);
        let letter = dec.feed(0x1e).unwrap();
        assert_eq!(letter.print_char, Some(b'A'));
        let digit = dec.feed(0x02).unwrap();
        assert_eq!(digit.print_char, Some(b'1'));
    }

    #[test]
    fn caps_lock_and_shift_cancel_out_on_letters() {
        let mut dec = ScancodeDecoder::new();
        dec.feed(KEY_CAPS_LOCK);
        dec.feed(KEY_LEFT_SHIFT);
        let ev = dec.feed(0x1e).unwrap();
        assert_eq!(ev.print_char, Some(b'a'));
    }

    #[test]
    fn ctrl_maps_letters_to_control_codes() {
        let mut dec = ScancodeDecoder::new();
        dec.feed(KEY_LEFT_CTRL);
        let ev = dec.feed(0x2e).unwrap(); // 'c'
        assert_eq!(ev.print_char, Some(0x03)); // ETX
    }

    #[test]
    fn e0_prefix_is_reported_on_the_following_scancode() {
        let mut dec = ScancodeDecoder::new();
        assert!(dec.feed(0xe0).is_none());
        let ev = dec.feed(0x1c).unwrap(); // keypad enter, extended
        assert!(ev.extended);
    }

    #[test]
    fn modifier_keys_do_not_emit_events() {
        let mut dec = ScancodeDecoder::new();
        assert!(dec.feed(KEY_LEFT_SHIFT).is_none());
        assert!(dec.feed(KEY_LEFT_SHIFT | 0x80).is_none());
    }
}
