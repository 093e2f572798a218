//! PID/TID allocation, transcribed from the scheduler's
//! `create_new_pid`/`create_new_kernel_tid` dual-candidate walk:
//! track the lowest unused id and the lowest unused id above the
//! current maximum, skipping any candidate that collides with a live
//! process's group or session id (those stay reserved for an orphaned
//! leader until its last member exits).

use core::fmt;
use core::num::NonZeroU32;

use crate::config::MAX_PID;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tid(NonZeroU32);

impl Tid {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Tid)
    }

    pub fn as_u32(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.get())
    }
}

/// A process id is the tid of its main thread.
pub type Pid = Tid;

/// Facts about the live task/process population the id allocator
/// needs in order to skip reserved group/session ids. Supplied by the
/// scheduler rather than queried through a global, so the algorithm
/// stays unit-testable.
pub trait IdSpace {
    /// True if `candidate` is already in use as a live task's id.
    fn is_live_tid(&self, candidate: u32) -> bool;
    /// True if `candidate` equals some live process's pgid or sid
    /// while that process's own pid differs from `candidate` (i.e. the
    /// id is reserved for an orphaned leader).
    fn is_reserved_group_or_session(&self, candidate: u32) -> bool;
}

struct CreateIdCtx {
    lowest_available: u32,
    lowest_after_current_max: u32,
}

impl CreateIdCtx {
    /// Advances `cand` past any id reserved by a dead group/session
    /// leader, mirroring `inc_candicate_if_matches`.
    fn bump_if_reserved(cand: &mut u32, space: &dyn IdSpace) -> bool {
        if space.is_reserved_group_or_session(*cand) {
            *cand += 1;
            true
        } else {
            false
        }
    }

    fn visit(&mut self, tid: u32, space: &dyn IdSpace) {
        if tid < self.lowest_available {
            return;
        }

        let mut restart = false;
        restart |= Self::bump_if_reserved(&mut self.lowest_available, space);
        restart |= Self::bump_if_reserved(&mut self.lowest_after_current_max, space);

        if tid == self.lowest_available {
            self.lowest_available += 1;
        }
        if tid == self.lowest_after_current_max {
            self.lowest_after_current_max += 1;
        }

        let _ = restart;
    }
}

/// Walks `0..=max_id` (the live population reported through `space`),
/// returning the chosen id or `None` if the space is exhausted.
fn create_id_common(space: &dyn IdSpace, current_max: u32, max_id: u32) -> Option<u32> {
    let mut ctx = CreateIdCtx {
        lowest_available: 0,
        lowest_after_current_max: current_max + 1,
    };

    // A single linear pass suffices here: unlike the kernel's live
    // task list (which the real allocator must re-walk whenever a
    // candidate is bumped past a newly discovered collision), this
    // port is handed a closed `IdSpace` describing the *current*
    // population once, so one pass over 0..=current_max converges.
    for tid in 0..=current_max {
        if !space.is_live_tid(tid) {
            continue;
        }
        ctx.visit(tid, space);
    }

    // Keep bumping past any collisions revealed by the visit pass
    // itself (a candidate can be reserved without being a live tid).
    while space.is_reserved_group_or_session(ctx.lowest_available) {
        ctx.lowest_available += 1;
    }
    while space.is_reserved_group_or_session(ctx.lowest_after_current_max) {
        ctx.lowest_after_current_max += 1;
    }

    if ctx.lowest_after_current_max <= max_id {
        Some(ctx.lowest_after_current_max)
    } else if ctx.lowest_available <= max_id {
        Some(ctx.lowest_available)
    } else {
        None
    }
}

/// Allocates the next pid, given the current highest pid in use.
pub fn create_new_pid(space: &dyn IdSpace, current_max_pid: u32) -> Option<Pid> {
    let raw = create_id_common(space, current_max_pid, MAX_PID)?;
    Tid::new(raw)
}

/// Allocates the next kernel tid (kernel threads share the same id
/// space as user pids in this design, unlike user task tids which are
/// always equal to their owning process's pid in the single-threaded
/// process model this core implements).
pub fn create_new_kernel_tid(space: &dyn IdSpace, current_max_tid: u32) -> Option<Tid> {
    let raw = create_id_common(space, current_max_tid, MAX_PID)?;
    Tid::new(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::BTreeSet;

    struct FakeSpace {
        live: BTreeSet<u32>,
        reserved: BTreeSet<u32>,
    }

    impl IdSpace for FakeSpace {
        fn is_live_tid(&self, candidate: u32) -> bool {
            self.live.contains(&candidate)
        }
        fn is_reserved_group_or_session(&self, candidate: u32) -> bool {
            self.reserved.contains(&candidate)
        }
    }

    #[test]
    fn empty_space_allocates_one() {
        let space = FakeSpace {
            live: BTreeSet::new(),
            reserved: BTreeSet::new(),
        };
        // pid 0 is the kernel's reserved process; the allocator itself
        // has no opinion on that, callers seed current_max_pid at 0.
        let pid = create_new_pid(&space, 0).unwrap();
        assert_eq!(pid.as_u32(), 1);
    }

    #[test]
    fn prefers_hole_below_current_max_once_max_is_exhausted() {
        let mut live = BTreeSet::new();
        live.insert(1);
        live.insert(3);
        let space = FakeSpace {
            live,
            reserved: BTreeSet::new(),
        };
        // current_max_pid = 3 -> lowest_after_current_max starts at 4,
        // which is free, so it wins over the hole at 2.
        let pid = create_new_pid(&space, 3).unwrap();
        assert_eq!(pid.as_u32(), 4);
    }

    #[test]
    fn orphaned_group_id_is_skipped() {
        // Scenario 5: pgid 3 is reserved (process 3 died, but group 3
        // lives on through child 8). A fresh pid must not land on 3,
        // nor on 9 (also reserved), so it has to advance to 10.
        let mut live = BTreeSet::new();
        live.insert(8);
        let mut reserved = BTreeSet::new();
        reserved.insert(3);
        reserved.insert(9);
        let space = FakeSpace { live, reserved };

        let pid = create_new_pid(&space, 8).unwrap();
        assert_ne!(pid.as_u32(), 3);
        assert_eq!(pid.as_u32(), 10);
    }

    #[test]
    fn exhausted_space_returns_none() {
        struct AllLive;
        impl IdSpace for AllLive {
            fn is_live_tid(&self, _candidate: u32) -> bool {
                true
            }
            fn is_reserved_group_or_session(&self, _candidate: u32) -> bool {
                false
            }
        }
        assert!(create_id_common(&AllLive, MAX_PID, MAX_PID).is_none());
    }
}
