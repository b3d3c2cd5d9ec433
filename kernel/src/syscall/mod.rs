//! System call handling module.
//!
//! The trap handler saves user registers in the PCB's trap frame and calls
//! [`Kernel::syscall`]. The number arrives in `rax`, up to four arguments
//! in `rdi`, `rsi`, `rdx` and `r10`, and the result goes back in `rax`.
//! Every failure is reported to user mode as -1.

pub mod handlers;

use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::process::ProcessError;

/// System call numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum SyscallNumber {
    // ==========================================
    // Process lifecycle
    // ==========================================
    /// Fork process.
    Fork = 1,
    /// Exit the current process.
    Exit = 2,
    /// Wait for a child process.
    Wait = 3,
    /// Kill a process.
    Kill = 6,

    // ==========================================
    // Process info & memory
    // ==========================================
    /// Get process ID.
    GetPid = 11,
    /// Grow or shrink the user image.
    Sbrk = 12,
    /// Sleep for a number of ticks.
    Sleep = 13,
    /// Ticks since boot.
    Uptime = 14,
    /// Get parent process ID.
    GetPpid = 22,

    // ==========================================
    // Lottery scheduling
    // ==========================================
    /// Set ticket weight.
    SetTickets = 23,
    /// Snapshot of the process table.
    GetPInfo = 24,
    /// Yield CPU.
    Yield = 25,

    // ==========================================
    // Page protection
    // ==========================================
    /// Make pages read-only.
    Mprotect = 26,
    /// Make pages writable again.
    Munprotect = 27,

    // ==========================================
    // Threading
    // ==========================================
    /// Create a thread in the caller's address space.
    Clone = 28,
    /// Wait for a thread.
    Join = 29,
}

impl SyscallNumber {
    /// Every system call, in number order.
    pub const ALL: [SyscallNumber; 16] = [
        SyscallNumber::Fork,
        SyscallNumber::Exit,
        SyscallNumber::Wait,
        SyscallNumber::Kill,
        SyscallNumber::GetPid,
        SyscallNumber::Sbrk,
        SyscallNumber::Sleep,
        SyscallNumber::Uptime,
        SyscallNumber::GetPpid,
        SyscallNumber::SetTickets,
        SyscallNumber::GetPInfo,
        SyscallNumber::Yield,
        SyscallNumber::Mprotect,
        SyscallNumber::Munprotect,
        SyscallNumber::Clone,
        SyscallNumber::Join,
    ];

    /// Name for tracing.
    pub fn name(self) -> &'static str {
        match self {
            SyscallNumber::Fork => "fork",
            SyscallNumber::Exit => "exit",
            SyscallNumber::Wait => "wait",
            SyscallNumber::Kill => "kill",
            SyscallNumber::GetPid => "getpid",
            SyscallNumber::Sbrk => "sbrk",
            SyscallNumber::Sleep => "sleep",
            SyscallNumber::Uptime => "uptime",
            SyscallNumber::GetPpid => "getppid",
            SyscallNumber::SetTickets => "settickets",
            SyscallNumber::GetPInfo => "getpinfo",
            SyscallNumber::Yield => "yield",
            SyscallNumber::Mprotect => "mprotect",
            SyscallNumber::Munprotect => "munprotect",
            SyscallNumber::Clone => "clone",
            SyscallNumber::Join => "join",
        }
    }
}

impl TryFrom<u64> for SyscallNumber {
    type Error = ();

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        SyscallNumber::ALL
            .iter()
            .copied()
            .find(|&num| num as u64 == value)
            .ok_or(())
    }
}

/// Result of a system call handler.
pub type SyscallResult = Result<i64, ProcessError>;

/// Raw argument registers of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallArgs(pub [u64; 4]);

impl SyscallArgs {
    /// Argument `n` as a C `int` (low 32 bits).
    pub fn int(&self, n: usize) -> i32 {
        self.0[n] as u32 as i32
    }

    /// Argument `n` as a user address.
    pub fn addr(&self, n: usize) -> u64 {
        self.0[n]
    }
}

impl<P: Platform> Kernel<P> {
    /// Run the system call described by the running process's trap frame.
    pub fn syscall(&self) {
        let (raw, args) = self.with_trapframe(|tf| (tf.syscall_num(), SyscallArgs(tf.syscall_args())));

        let ret = match SyscallNumber::try_from(raw) {
            Ok(num) => {
                #[cfg(feature = "trace-syscalls")]
                log::trace!("[syscall] {}({:#x?})", num.name(), args.0);

                match handlers::handle(self, num, args) {
                    Ok(value) => value,
                    Err(e) => {
                        log::debug!("[syscall] {} failed: {}", num.name(), e);
                        -1
                    }
                }
            }
            Err(()) => {
                log::warn!(
                    "[syscall] pid {:?}: unknown syscall {}",
                    self.current_pid(),
                    raw
                );
                -1
            }
        };

        #[cfg(feature = "trace-syscalls")]
        log::trace!("[syscall] -> {}", ret);

        self.with_trapframe(|tf| tf.set_return(ret));
    }
}
