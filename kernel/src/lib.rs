//! Lotos Kernel Library
//!
//! The process subsystem of the Lotos teaching kernel: a fixed process
//! table guarded by one spinlock, a per-CPU lottery scheduler, process and
//! thread lifecycle (fork, clone, exit, wait, join, kill), sleep/wakeup,
//! ticket accounting and page write protection.
//!
//! # Structure
//!
//! - [`Kernel`]: owns the table, the per-CPU records and the tick clock
//! - [`platform`]: traits for the collaborators the subsystem drives
//!   (virtual memory, kernel stacks, files, context switch, interrupts)
//! - [`syscall`]: decoding of system calls from the trap frame
//!
//! The crate is `no_std`; tests run on the host against a simulated
//! platform in which every kernel context is a host thread.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod config;
pub mod cpu;
pub mod kernel;
pub mod memory;
pub mod platform;
pub mod process;
pub mod rand;
pub mod scheduler;
pub mod sync;
pub mod syscall;
pub mod time;

#[cfg(test)]
mod tests;

pub use config::KernelConfig;
pub use kernel::{Kernel, TableGuard};
pub use platform::Platform;
pub use process::{Pid, ProcStat, ProcState, ProcessError};
