//! Lotos Userspace Library
//!
//! System call wrappers and thread support for programs running on the
//! Lotos kernel.
//!
//! # Architecture
//!
//! Every call goes through [`syscall::SyscallAbi`]. On the target,
//! [`syscall::Native`] enters the kernel with the `syscall` instruction;
//! tests and simulators provide their own implementation and get the same
//! typed wrappers, the ticket lock and the thread helpers for free.
//!
//! # Example
//!
//! ```rust,ignore
//! use userlib::syscall::{Native, SyscallAbi};
//!
//! Native.settickets(30).unwrap();
//! let pid = Native.fork().unwrap();
//! ```

#![cfg_attr(not(test), no_std)]

pub mod pstat;
pub mod syscall;
pub mod thread;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::pstat::ProcStat;
    pub use crate::syscall::{SyscallAbi, SyscallError, SyscallResult};
    pub use crate::thread::{thread_create, thread_join, StackPool, TicketLock};
}
