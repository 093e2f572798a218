//! A single schedulable unit of execution.

use crate::task::id::Tid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Runnable,
    Running,
    Sleeping,
    Zombie,
}

/// Scheduling counters advanced on every timer tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedTicks {
    pub vruntime: u64,
    pub timeslice: u32,
    pub total: u64,
}

/// What a sleeping task is waiting for.
#[derive(Debug, Clone, Copy)]
pub enum WaitObject {
    /// Blocked on an explicit wakeup-timer deadline (absolute tick).
    Timer(u64),
    /// Blocked on a condition external to the scheduler (a VFS read
    /// ready-condition, a child's exit, ...); the scheduler only knows
    /// it's opaque and waits for an explicit wake.
    Opaque,
}

pub struct Task {
    pub tid: Tid,
    pub process_pid: crate::task::id::Pid,
    pub state: TaskState,
    pub ticks: SchedTicks,
    pub wait: Option<WaitObject>,
    pub wakeup_deadline: Option<u64>,
    pub timer_ready: bool,
    pub is_worker: bool,
    pub is_idle: bool,
    pub pending_signals: u32,
}

impl Task {
    pub fn new_main_thread(tid: Tid) -> Self {
        Task {
            tid,
            process_pid: tid,
            state: TaskState::Runnable,
            ticks: SchedTicks::default(),
            wait: None,
            wakeup_deadline: None,
            timer_ready: false,
            is_worker: false,
            is_idle: false,
            pending_signals: 0,
        }
    }

    /// The scheduler's fallback task: never linked into the runnable
    /// list, never advanced by `on_tick`, only ever picked when nothing
    /// else is runnable.
    pub fn new_idle(tid: Tid) -> Self {
        Task {
            is_idle: true,
            ..Task::new_main_thread(tid)
        }
    }

    pub fn is_runnable(&self) -> bool {
        matches!(self.state, TaskState::Runnable | TaskState::Running)
    }

    /// RUNNABLE<->RUNNING, RUNNING->SLEEPING, SLEEPING->RUNNABLE,
    /// RUNNING->ZOMBIE are the only legal transitions; anything else
    /// is an invariant violation the caller must not attempt.
    pub fn change_state(&mut self, next: TaskState) {
        use TaskState::*;
        let legal = matches!(
            (self.state, next),
            (Runnable, Running)
                | (Running, Runnable)
                | (Running, Sleeping)
                | (Sleeping, Runnable)
                | (Running, Zombie)
        );
        assert!(legal, "illegal task state transition {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(n: u32) -> Tid {
        Tid::new(n).unwrap()
    }

    #[test]
    fn legal_transitions_succeed() {
        let mut t = Task::new_main_thread(tid(1));
        t.change_state(TaskState::Running);
        t.change_state(TaskState::Sleeping);
        t.change_state(TaskState::Runnable);
        t.change_state(TaskState::Running);
        t.change_state(TaskState::Zombie);
    }

    #[test]
    #[should_panic(expected = "illegal task state transition")]
    fn zombie_cannot_go_back_to_runnable() {
        let mut t = Task::new_main_thread(tid(1));
        t.change_state(TaskState::Running);
        t.change_state(TaskState::Zombie);
        t.change_state(TaskState::Runnable);
    }

    #[test]
    #[should_panic(expected = "illegal task state transition")]
    fn sleeping_cannot_jump_straight_to_running() {
        let mut t = Task::new_main_thread(tid(1));
        t.change_state(TaskState::Running);
        t.change_state(TaskState::Sleeping);
        t.change_state(TaskState::Running);
    }
}
