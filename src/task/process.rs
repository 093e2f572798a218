//! A process: the unit that owns an address space, a handle table, and
//! a set of tasks (this core models one task per process — no
//! in-process threading beyond the kernel's own worker threads).

use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashMap;

use crate::fs::handle::FsHandle;
use crate::task::id::Pid;

pub struct Process {
    pub pid: Pid,
    pub parent_pid: Option<Pid>,
    pub pgid: Pid,
    pub sid: Pid,
    pub cwd: String,
    pub brk: usize,
    pub initial_brk: usize,
    pub handles: HashMap<u32, FsHandle>,
    pub next_fd: u32,
    pub children: Vec<Pid>,
    pub controlling_tty: Option<u32>,
}

impl Process {
    /// Constructs a new session+group leader, as the first process in
    /// the system (pid 0, the kernel's own process) or the root of a
    /// freshly `setsid`'d tree is.
    pub fn new_session_leader(pid: Pid, cwd: String) -> Self {
        Process {
            pid,
            parent_pid: None,
            pgid: pid,
            sid: pid,
            cwd,
            brk: 0,
            initial_brk: 0,
            handles: HashMap::new(),
            next_fd: 0,
            children: Vec::new(),
            controlling_tty: None,
        }
    }

    pub fn new_child(pid: Pid, parent: &Process) -> Self {
        Process {
            pid,
            parent_pid: Some(parent.pid),
            pgid: parent.pgid,
            sid: parent.sid,
            cwd: parent.cwd.clone(),
            brk: parent.brk,
            initial_brk: parent.initial_brk,
            handles: HashMap::new(),
            next_fd: 0,
            children: Vec::new(),
            controlling_tty: parent.controlling_tty,
        }
    }

    pub fn is_session_leader(&self) -> bool {
        self.pid == self.sid
    }

    pub fn is_group_leader(&self) -> bool {
        self.pid == self.pgid
    }

    pub fn alloc_fd(&mut self, handle: FsHandle) -> u32 {
        let fd = self.next_fd;
        self.next_fd += 1;
        self.handles.insert(fd, handle);
        fd
    }

    pub fn dup_fd(&mut self, src_fd: u32) -> Option<u32> {
        let handle = self.handles.get(&src_fd)?.clone_ref();
        Some(self.alloc_fd(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::id::Tid;

    fn pid(n: u32) -> Pid {
        Tid::new(n).unwrap()
    }

    #[test]
    fn session_leader_is_its_own_group_and_session() {
        let p = Process::new_session_leader(pid(1), String::from("/"));
        assert!(p.is_session_leader());
        assert!(p.is_group_leader());
    }

    #[test]
    fn child_inherits_group_and_session_not_cwd_mutation() {
        let mut parent = Process::new_session_leader(pid(1), String::from("/home"));
        parent.cwd = String::from("/home/alice");
        let child = Process::new_child(pid(2), &parent);
        assert_eq!(child.pgid, parent.pgid);
        assert_eq!(child.sid, parent.sid);
        assert_eq!(child.cwd, "/home/alice");
        assert!(!child.is_session_leader());
    }
}
