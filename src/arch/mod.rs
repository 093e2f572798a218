//! Arch-selection shim. The `i386`-class backend (the only one
//! actually implemented) is built by default; the `riscv` feature
//! swaps in a stub module instead.
//!
//! Grounded on `memory/mod_other.rs`'s direct use of the `x86_64`
//! crate's instruction wrappers for TLB invalidation and CR2 reads,
//! narrowed here to the i386-compatible subset the `x86_64` crate's
//! `instructions` feature exposes without 64-bit-only paging types.

#[cfg(not(feature = "riscv"))]
mod i386;
#[cfg(not(feature = "riscv"))]
pub use i386::*;

#[cfg(feature = "riscv")]
mod riscv;
#[cfg(feature = "riscv")]
pub use riscv::*;
