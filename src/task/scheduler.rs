//! The vruntime-fair scheduler: an intrusive doubly-linked runnable
//! list over a slab of task slots, keyed by `Tid`, mirroring the
//! reference kernel's index-based linkage (`multitasking/queues.rs`)
//! rather than an `Rc`/`RefCell` graph.

use hashbrown::HashMap;

use crate::config::{IDLE_TID, TIME_SLICE_TICKS};
use crate::task::id::Tid;
use crate::task::task::{Task, TaskState};

struct Slot {
    task: Task,
    prev: Option<Tid>,
    next: Option<Tid>,
}

pub struct Scheduler {
    slots: HashMap<Tid, Slot>,
    head: Option<Tid>,
    tail: Option<Tid>,
    current: Option<Tid>,
    need_resched: bool,
    /// The idle task's tid. Inserted into `slots` at construction but
    /// deliberately never linked into the head/tail list, so it is
    /// excluded from `runnable_iter`/`on_tick` with no special-casing.
    idle: Tid,
}

impl Scheduler {
    pub fn new() -> Self {
        let idle = Tid::new(IDLE_TID).expect("IDLE_TID must be nonzero");
        let mut slots = HashMap::new();
        slots.insert(
            idle,
            Slot {
                task: Task::new_idle(idle),
                prev: None,
                next: None,
            },
        );
        Scheduler {
            slots,
            head: None,
            tail: None,
            current: None,
            need_resched: false,
            idle,
        }
    }

    /// The scheduler's idle task, run only when nothing else is
    /// runnable.
    pub fn idle_tid(&self) -> Tid {
        self.idle
    }

    pub fn add_task(&mut self, task: Task) {
        let tid = task.tid;
        let runnable = task.is_runnable();
        self.slots.insert(
            tid,
            Slot {
                task,
                prev: None,
                next: None,
            },
        );
        if runnable {
            self.link_tail(tid);
        }
        if self.current.is_none() {
            self.current = Some(tid);
        }
    }

    fn link_tail(&mut self, tid: Tid) {
        if let Some(old_tail) = self.tail {
            self.slots.get_mut(&old_tail).unwrap().next = Some(tid);
            self.slots.get_mut(&tid).unwrap().prev = Some(old_tail);
        } else {
            self.head = Some(tid);
        }
        self.tail = Some(tid);
    }

    fn unlink(&mut self, tid: Tid) {
        let (prev, next) = {
            let slot = self.slots.get(&tid).unwrap();
            (slot.prev, slot.next)
        };
        match prev {
            Some(p) => self.slots.get_mut(&p).unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots.get_mut(&n).unwrap().prev = prev,
            None => self.tail = prev,
        }
        if let Some(slot) = self.slots.get_mut(&tid) {
            slot.prev = None;
            slot.next = None;
        }
    }

    fn runnable_iter(&self) -> impl Iterator<Item = Tid> + '_ {
        core::iter::successors(self.head, move |&tid| self.slots.get(&tid).unwrap().next)
    }

    pub fn runnable_count(&self) -> usize {
        self.runnable_iter().count()
    }

    pub fn task(&self, tid: Tid) -> Option<&Task> {
        self.slots.get(&tid).map(|s| &s.task)
    }

    pub fn task_mut(&mut self, tid: Tid) -> Option<&mut Task> {
        self.slots.get_mut(&tid).map(|s| &mut s.task)
    }

    pub fn current(&self) -> Option<Tid> {
        self.current
    }

    /// Called once per timer tick. Advances every runnable, non-idle
    /// task's vruntime by `runnable_count - 1` (tasks alone on the run
    /// queue accrue nothing — there's no contention to be fair about),
    /// and flags a reschedule once a task's timeslice is spent.
    pub fn on_tick(&mut self) {
        let runnable = self.runnable_count();
        let delta = runnable.saturating_sub(1) as u64;
        let tids: alloc::vec::Vec<Tid> = self.runnable_iter().collect();
        for tid in tids {
            let slot = self.slots.get_mut(&tid).unwrap();
            slot.task.ticks.total += 1;
            if slot.task.state == TaskState::Running || slot.task.state == TaskState::Runnable {
                slot.task.ticks.vruntime += delta;
                if !slot.task.is_worker {
                    slot.task.ticks.timeslice += 1;
                    if slot.task.ticks.timeslice >= TIME_SLICE_TICKS {
                        self.need_resched = true;
                    }
                }
            }
        }
    }

    /// Picks the runnable task with the smallest vruntime; a task
    /// whose wakeup timer just fired (`timer_ready`) preempts ties.
    /// Worker threads are only ever preempted by another worker
    /// thread: a normal task never wins the picker away from a running
    /// worker.
    pub fn pick_next(&self) -> Option<Tid> {
        let running_worker = self
            .current
            .and_then(|tid| self.task(tid))
            .filter(|t| t.is_worker && t.state == TaskState::Running);

        let mut best: Option<Tid> = None;
        for tid in self.runnable_iter() {
            let task = &self.slots.get(&tid).unwrap().task;
            if !task.is_runnable() {
                continue;
            }
            if running_worker.is_some() && !task.is_worker {
                continue;
            }
            best = Some(match best {
                None => tid,
                Some(current_best) => {
                    let cb = &self.slots.get(&current_best).unwrap().task;
                    if task.timer_ready && !cb.timer_ready {
                        tid
                    } else if !cb.timer_ready && (task.ticks.vruntime < cb.ticks.vruntime || task.timer_ready) {
                        tid
                    } else {
                        current_best
                    }
                }
            });
        }
        best.or(running_worker.map(|t| t.tid)).or(Some(self.idle))
    }

    pub fn set_state(&mut self, tid: Tid, next: TaskState) {
        let was_runnable = self.task(tid).map(|t| t.is_runnable()).unwrap_or(false);
        if let Some(slot) = self.slots.get_mut(&tid) {
            slot.task.change_state(next);
            if next == TaskState::Sleeping || next == TaskState::Zombie {
                slot.task.ticks.timeslice = 0;
            }
        }
        let is_runnable_now = self.task(tid).map(|t| t.is_runnable()).unwrap_or(false);
        if was_runnable && !is_runnable_now {
            self.unlink(tid);
        } else if !was_runnable && is_runnable_now {
            self.link_tail(tid);
        }
    }

    pub fn need_resched(&self) -> bool {
        self.need_resched
    }

    pub fn clear_need_resched(&mut self) {
        self.need_resched = false;
    }

    pub fn switch_to(&mut self, tid: Tid) {
        self.current = Some(tid);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::id::Tid;

    fn tid(n: u32) -> Tid {
        Tid::new(n).unwrap()
    }

    #[test]
    fn fairness_equalizes_total_ticks_across_busy_tasks() {
        let mut sched = Scheduler::new();
        for i in 1..=4u32 {
            sched.add_task(Task::new_main_thread(tid(i)));
        }
        for _ in 0..4 * 4 * TIME_SLICE_TICKS as usize {
            sched.on_tick();
            if let Some(next) = sched.pick_next() {
                sched.switch_to(next);
                sched.clear_need_resched();
            }
        }
        let totals: alloc::vec::Vec<u64> = (1..=4u32)
            .map(|i| sched.task(tid(i)).unwrap().ticks.total)
            .collect();
        let max = *totals.iter().max().unwrap();
        let min = *totals.iter().min().unwrap();
        assert!(max - min <= 2 * TIME_SLICE_TICKS as u64);
    }

    #[test]
    fn sleeping_task_is_unlinked_and_not_picked() {
        let mut sched = Scheduler::new();
        sched.add_task(Task::new_main_thread(tid(1)));
        sched.add_task(Task::new_main_thread(tid(2)));
        sched.set_state(tid(1), TaskState::Running);
        sched.set_state(tid(1), TaskState::Sleeping);
        assert_eq!(sched.runnable_count(), 1);
        assert_eq!(sched.pick_next(), Some(tid(2)));
    }

    #[test]
    fn worker_thread_only_preempted_by_another_worker() {
        let mut sched = Scheduler::new();
        let mut normal = Task::new_main_thread(tid(1));
        normal.ticks.vruntime = 0;
        let mut worker = Task::new_main_thread(tid(2));
        worker.is_worker = true;
        worker.ticks.vruntime = 1000;
        sched.add_task(normal);
        sched.add_task(worker);
        sched.set_state(tid(2), TaskState::Running);
        sched.switch_to(tid(2));
        // Even though task 1 has a far lower vruntime, the running
        // worker is not displaced by a non-worker candidate.
        assert_eq!(sched.pick_next(), Some(tid(2)));
    }

    #[test]
    fn timer_ready_breaks_ties_over_lower_vruntime() {
        let mut sched = Scheduler::new();
        let mut a = Task::new_main_thread(tid(1));
        a.ticks.vruntime = 5;
        let mut b = Task::new_main_thread(tid(2));
        b.ticks.vruntime = 50;
        b.timer_ready = true;
        sched.add_task(a);
        sched.add_task(b);
        assert_eq!(sched.pick_next(), Some(tid(2)));
    }

    #[test]
    fn timer_ready_wins_even_when_visited_before_a_lower_vruntime_task() {
        // Same two tasks as the tie-break test above, added in the
        // opposite order: the high-vruntime, timer_ready task becomes
        // `best` first, then a lower-vruntime non-ready task must not
        // be allowed to displace it.
        let mut sched = Scheduler::new();
        let mut a = Task::new_main_thread(tid(1));
        a.ticks.vruntime = 100;
        a.timer_ready = true;
        let mut b = Task::new_main_thread(tid(2));
        b.ticks.vruntime = 10;
        sched.add_task(a);
        sched.add_task(b);
        assert_eq!(sched.pick_next(), Some(tid(1)));
    }

    #[test]
    fn idle_task_runs_when_nothing_else_is_runnable() {
        let sched = Scheduler::new();
        assert_eq!(sched.pick_next(), Some(sched.idle_tid()));
    }

    #[test]
    fn idle_task_yields_to_any_runnable_task() {
        let mut sched = Scheduler::new();
        sched.add_task(Task::new_main_thread(tid(1)));
        assert_eq!(sched.pick_next(), Some(tid(1)));
    }

    #[test]
    fn idle_task_is_never_advanced_by_on_tick() {
        let mut sched = Scheduler::new();
        sched.add_task(Task::new_main_thread(tid(1)));
        sched.add_task(Task::new_main_thread(tid(2)));
        sched.on_tick();
        assert_eq!(sched.task(sched.idle_tid()).unwrap().ticks.vruntime, 0);
        assert_eq!(sched.task(tid(1)).unwrap().ticks.vruntime, 1);
    }
}
