//! Raw system call interface.
//!
//! The kernel takes the call number in `rax` and up to four arguments in
//! `rdi`, `rsi`, `rdx` and `r10`, and returns one value in `rax`. Every
//! failure comes back as -1.

use crate::pstat::ProcStat;

/// System call numbers - must match the kernel's `SyscallNumber`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum SyscallNumber {
    // Process lifecycle
    Fork = 1,
    Exit = 2,
    Wait = 3,
    Kill = 6,

    // Process info & memory
    GetPid = 11,
    Sbrk = 12,
    Sleep = 13,
    Uptime = 14,
    GetPpid = 22,

    // Lottery scheduling
    SetTickets = 23,
    GetPInfo = 24,
    Yield = 25,

    // Page protection
    Mprotect = 26,
    Munprotect = 27,

    // Threading
    Clone = 28,
    Join = 29,
}

impl SyscallNumber {
    /// Every system call, in number order.
    pub const ALL: [SyscallNumber; 16] = [
        Self::Fork,
        Self::Exit,
        Self::Wait,
        Self::Kill,
        Self::GetPid,
        Self::Sbrk,
        Self::Sleep,
        Self::Uptime,
        Self::GetPpid,
        Self::SetTickets,
        Self::GetPInfo,
        Self::Yield,
        Self::Mprotect,
        Self::Munprotect,
        Self::Clone,
        Self::Join,
    ];
}

/// System call error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum SyscallError {
    /// The kernel refused the call.
    Failed = -1,
    /// Any other negative value.
    Unknown = -255,
}

impl SyscallError {
    /// Convert raw return value to error.
    pub fn from_raw(val: i64) -> Self {
        match val {
            -1 => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

/// Result type for system calls.
pub type SyscallResult = Result<u64, SyscallError>;

/// Convert raw syscall return value to Result.
#[inline]
pub fn convert_result(ret: i64) -> SyscallResult {
    if ret >= 0 {
        Ok(ret as u64)
    } else {
        Err(SyscallError::from_raw(ret))
    }
}

#[inline]
fn unit(ret: i64) -> Result<(), SyscallError> {
    convert_result(ret).map(|_| ())
}

/// A way into the kernel, plus typed wrappers for every call.
///
/// Implementors supply [`raw_syscall`](Self::raw_syscall). The wrappers
/// that hand the kernel a pointer (`getpinfo`, `join`) can be overridden by
/// callers whose memory is not directly addressable by the kernel.
pub trait SyscallAbi {
    /// Enter the kernel; returns the raw `rax`.
    fn raw_syscall(&self, num: SyscallNumber, args: [u64; 4]) -> i64;

    /// Copy this process. Returns the child's pid, or 0 in the child.
    fn fork(&self) -> SyscallResult {
        convert_result(self.raw_syscall(SyscallNumber::Fork, [0; 4]))
    }

    /// Terminate this process or thread.
    fn exit(&self) -> ! {
        self.raw_syscall(SyscallNumber::Exit, [0; 4]);
        loop {
            core::hint::spin_loop();
        }
    }

    /// Wait for a child process. Returns its pid.
    fn wait(&self) -> SyscallResult {
        convert_result(self.raw_syscall(SyscallNumber::Wait, [0; 4]))
    }

    /// Ask the kernel to kill `pid`.
    fn kill(&self, pid: u64) -> Result<(), SyscallError> {
        unit(self.raw_syscall(SyscallNumber::Kill, [pid, 0, 0, 0]))
    }

    /// Pid of the caller.
    fn getpid(&self) -> u64 {
        self.raw_syscall(SyscallNumber::GetPid, [0; 4]) as u64
    }

    /// Pid of the caller's parent; 0 for the first process.
    fn getppid(&self) -> u64 {
        self.raw_syscall(SyscallNumber::GetPpid, [0; 4]) as u64
    }

    /// Grow or shrink the image by `delta` bytes. Returns the old break.
    fn sbrk(&self, delta: i32) -> SyscallResult {
        convert_result(self.raw_syscall(SyscallNumber::Sbrk, [delta as u64, 0, 0, 0]))
    }

    /// Sleep for `ticks` timer ticks.
    fn sleep(&self, ticks: i32) -> Result<(), SyscallError> {
        unit(self.raw_syscall(SyscallNumber::Sleep, [ticks as u64, 0, 0, 0]))
    }

    /// Timer ticks since boot.
    fn uptime(&self) -> u64 {
        self.raw_syscall(SyscallNumber::Uptime, [0; 4]) as u64
    }

    /// Set the caller's lottery tickets. Must be positive.
    fn settickets(&self, tickets: i32) -> Result<(), SyscallError> {
        unit(self.raw_syscall(SyscallNumber::SetTickets, [tickets as u64, 0, 0, 0]))
    }

    /// Have the kernel write a [`ProcStat`] at user address `addr`.
    fn getpinfo_at(&self, addr: u64) -> Result<(), SyscallError> {
        unit(self.raw_syscall(SyscallNumber::GetPInfo, [addr, 0, 0, 0]))
    }

    /// Snapshot the process table into `stat`.
    fn getpinfo(&self, stat: &mut ProcStat) -> Result<(), SyscallError> {
        self.getpinfo_at(stat as *mut ProcStat as u64)
    }

    /// Give up the CPU.
    fn yield_now(&self) {
        self.raw_syscall(SyscallNumber::Yield, [0; 4]);
    }

    /// Make `pages` pages from `addr` read-only.
    fn mprotect(&self, addr: u64, pages: i32) -> Result<(), SyscallError> {
        unit(self.raw_syscall(SyscallNumber::Mprotect, [addr, pages as u64, 0, 0]))
    }

    /// Make `pages` pages from `addr` writable again.
    fn munprotect(&self, addr: u64, pages: i32) -> Result<(), SyscallError> {
        unit(self.raw_syscall(SyscallNumber::Munprotect, [addr, pages as u64, 0, 0]))
    }

    /// Start a thread at `entry(arg1, arg2)` on the page at `stack`.
    /// Returns its pid.
    fn clone_thread(&self, entry: u64, arg1: u64, arg2: u64, stack: u64) -> SyscallResult {
        convert_result(self.raw_syscall(SyscallNumber::Clone, [entry, arg1, arg2, stack]))
    }

    /// Wait for a thread; its stack page address is stored at `out`.
    fn join_at(&self, out: u64) -> SyscallResult {
        convert_result(self.raw_syscall(SyscallNumber::Join, [out, 0, 0, 0]))
    }

    /// Wait for a thread. Returns its pid and stores its stack in `stack`.
    fn join(&self, stack: &mut u64) -> SyscallResult {
        self.join_at(stack as *mut u64 as u64)
    }
}

/// The `syscall` instruction.
#[derive(Debug, Default)]
pub struct Native;

#[cfg(target_arch = "x86_64")]
impl SyscallAbi for Native {
    #[inline]
    fn raw_syscall(&self, num: SyscallNumber, args: [u64; 4]) -> i64 {
        // SAFETY: the kernel validates every argument it dereferences.
        unsafe { syscall4(num, args[0], args[1], args[2], args[3]) }
    }
}

/// System call with 4 arguments.
///
/// # Safety
///
/// Pointer arguments must be valid for what `nr` does with them.
#[cfg(target_arch = "x86_64")]
#[inline]
pub unsafe fn syscall4(nr: SyscallNumber, arg1: u64, arg2: u64, arg3: u64, arg4: u64) -> i64 {
    let ret: i64;
    // SAFETY: forwarded from the caller.
    unsafe {
        core::arch::asm!(
            "syscall",
            inout("rax") nr as u64 => ret,
            in("rdi") arg1,
            in("rsi") arg2,
            in("rdx") arg3,
            in("r10") arg4,
            out("rcx") _,  // clobbered by syscall
            out("r11") _,  // clobbered by syscall
            options(nostack, preserves_flags)
        );
    }
    ret
}
