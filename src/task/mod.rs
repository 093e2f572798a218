//! Task/process model and the vruntime-fair scheduler.

pub mod id;
pub mod process;
pub mod scheduler;
pub mod signal;
pub mod task;
pub mod worker;

pub use id::{Pid, Tid};
pub use process::Process;
pub use scheduler::Scheduler;
pub use task::{Task, TaskState};
