//! Linux-compatible error codes returned across the syscall boundary.
//!
//! Kept as a plain hand-rolled enum rather than reaching for an
//! error-derive crate: no_std kernel code here has no use for
//! backtraces or `std::error::Error`, just a stable mapping to the
//! negative `errno` values user space expects.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
    Perm,
    NoEnt,
    Io,
    NoExec,
    BadF,
    Again,
    NoMem,
    Acces,
    Fault,
    Exist,
    NotDir,
    IsDir,
    Inval,
    NFile,
    MFile,
    NoSpc,
    Rofs,
    Pipe,
    NameTooLong,
    NotEmpty,
    Range,
    TooBig,
    Intr,
}

impl Errno {
    /// The raw negative value a Linux-ABI syscall would return.
    pub fn as_neg_i32(self) -> i32 {
        -(self.as_i32())
    }

    pub fn as_i32(self) -> i32 {
        match self {
            Errno::Perm => 1,
            Errno::NoEnt => 2,
            Errno::Io => 5,
            Errno::NoExec => 8,
            Errno::BadF => 9,
            Errno::Again => 11,
            Errno::NoMem => 12,
            Errno::Acces => 13,
            Errno::Fault => 14,
            Errno::Exist => 17,
            Errno::NotDir => 20,
            Errno::IsDir => 21,
            Errno::Inval => 22,
            Errno::NFile => 23,
            Errno::MFile => 24,
            Errno::NoSpc => 28,
            Errno::Rofs => 30,
            Errno::Pipe => 32,
            Errno::NameTooLong => 36,
            Errno::NotEmpty => 39,
            Errno::Range => 34,
            Errno::TooBig => 7,
            Errno::Intr => 4,
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Errno::Perm => "EPERM",
            Errno::NoEnt => "ENOENT",
            Errno::Io => "EIO",
            Errno::NoExec => "ENOEXEC",
            Errno::BadF => "EBADF",
            Errno::Again => "EAGAIN",
            Errno::NoMem => "ENOMEM",
            Errno::Acces => "EACCES",
            Errno::Fault => "EFAULT",
            Errno::Exist => "EEXIST",
            Errno::NotDir => "ENOTDIR",
            Errno::IsDir => "EISDIR",
            Errno::Inval => "EINVAL",
            Errno::NFile => "ENFILE",
            Errno::MFile => "EMFILE",
            Errno::NoSpc => "ENOSPC",
            Errno::Rofs => "EROFS",
            Errno::Pipe => "EPIPE",
            Errno::NameTooLong => "ENAMETOOLONG",
            Errno::NotEmpty => "ENOTEMPTY",
            Errno::Range => "ERANGE",
            Errno::TooBig => "E2BIG",
            Errno::Intr => "EINTR",
        };
        f.write_str(name)
    }
}

pub type KResult<T> = Result<T, Errno>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neg_i32_matches_linux_values() {
        assert_eq!(Errno::NoEnt.as_neg_i32(), -2);
        assert_eq!(Errno::Inval.as_neg_i32(), -22);
        assert_eq!(Errno::NotEmpty.as_neg_i32(), -39);
    }

    #[test]
    fn display_uses_symbolic_name() {
        assert_eq!(alloc::format!("{}", Errno::NoSpc), "ENOSPC");
    }
}
