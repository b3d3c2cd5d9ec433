//! Process Management
//!
//! This module provides the process table, process and thread lifecycle
//! (fork, clone, exit, wait, join, kill) and ticket accounting.

pub mod context;
pub mod manager;
pub mod stat;
pub mod table;

pub use context::TrapFrame;
pub use manager::ProcessError;
pub use stat::ProcStat;
pub use table::{Pid, Proc, ProcRef, ProcState, ProcTable};
