//! Signal numbers and process-group delivery order.

use alloc::vec::Vec;
use bitflags::bitflags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Signal {
    Hup = 1,
    Int = 2,
    Quit = 3,
    Ill = 4,
    Kill = 9,
    Segv = 11,
    Pipe = 13,
    Alrm = 14,
    Term = 15,
    Chld = 17,
    Cont = 18,
    Stop = 19,
    Bus = 7,
    Fpe = 8,
}

impl Signal {
    pub fn mask_bit(self) -> u32 {
        1 << (self as u8)
    }
}

bitflags! {
    /// Flags carried alongside a delivered signal, e.g. to mark it as
    /// originating from a synchronous fault so the default handler
    /// doesn't try to resume the faulting instruction.
    #[derive(Default)]
    pub struct SignalFlags: u32 {
        const FL_FAULT = 1 << 0;
    }
}

/// Orders the members of a process group for signal delivery so that
/// the group leader is always delivered to last — delivering to it
/// first could let it exit and orphan the rest of the group before
/// they have received the signal.
pub fn delivery_order(leader_pid: u32, members: &[u32]) -> Vec<u32> {
    let mut ordered: Vec<u32> = members.iter().copied().filter(|&p| p != leader_pid).collect();
    if members.contains(&leader_pid) {
        ordered.push(leader_pid);
    }
    ordered
}

/// A pending-signal bitmask, one bit per signal number (1..=31).
#[derive(Debug, Clone, Copy, Default)]
pub struct PendingSignals(u32);

impl PendingSignals {
    pub fn raise(&mut self, sig: Signal) {
        self.0 |= sig.mask_bit();
    }

    pub fn is_pending(&self, sig: Signal) -> bool {
        self.0 & sig.mask_bit() != 0
    }

    pub fn clear(&mut self, sig: Signal) {
        self.0 &= !sig.mask_bit();
    }

    pub fn any_pending(&self) -> bool {
        self.0 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_leader_delivered_last() {
        let order = delivery_order(3, &[3, 8, 12]);
        assert_eq!(order, alloc::vec![8, 12, 3]);
    }

    #[test]
    fn leader_absent_from_members_is_a_noop_tail() {
        let order = delivery_order(3, &[8, 12]);
        assert_eq!(order, alloc::vec![8, 12]);
    }

    #[test]
    fn pending_signals_raise_clear_round_trip() {
        let mut pending = PendingSignals::default();
        assert!(!pending.any_pending());
        pending.raise(Signal::Kill);
        assert!(pending.is_pending(Signal::Kill));
        assert!(!pending.is_pending(Signal::Term));
        pending.clear(Signal::Kill);
        assert!(!pending.any_pending());
    }
}
