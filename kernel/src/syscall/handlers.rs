//! System call handlers.
//!
//! This module decodes arguments for each system call, validates user
//! pointers against the caller's image and forwards to the kernel.

use super::{SyscallArgs, SyscallNumber, SyscallResult};
use crate::kernel::Kernel;
use crate::memory::range_within;
use crate::platform::Platform;
use crate::process::{Pid, ProcStat, ProcessError};

/// Handle a system call.
pub fn handle<P: Platform>(k: &Kernel<P>, syscall: SyscallNumber, args: SyscallArgs) -> SyscallResult {
    match syscall {
        SyscallNumber::Fork => handle_fork(k),
        SyscallNumber::Exit => k.exit(),
        SyscallNumber::Wait => handle_wait(k),
        SyscallNumber::Kill => handle_kill(k, args),
        SyscallNumber::GetPid => handle_getpid(k),
        SyscallNumber::Sbrk => handle_sbrk(k, args),
        SyscallNumber::Sleep => handle_sleep(k, args),
        SyscallNumber::Uptime => Ok(k.uptime() as i64),
        SyscallNumber::GetPpid => handle_getppid(k),
        SyscallNumber::SetTickets => k.settickets(args.int(0)).map(|()| 0),
        SyscallNumber::GetPInfo => handle_getpinfo(k, args),
        SyscallNumber::Yield => {
            k.yield_now();
            Ok(0)
        }
        SyscallNumber::Mprotect => k.mprotect(args.addr(0), args.int(1)).map(|()| 0),
        SyscallNumber::Munprotect => k.munprotect(args.addr(0), args.int(1)).map(|()| 0),
        SyscallNumber::Clone => handle_clone(k, args),
        SyscallNumber::Join => handle_join(k, args),
    }
}

/// Copy `bytes` to `addr` in the running process, which must lie inside
/// its image.
fn copy_to_user<P: Platform>(k: &Kernel<P>, addr: u64, bytes: &[u8]) -> Result<(), ProcessError> {
    check_user_range(k, addr, bytes.len())?;
    let space = k.current_space().ok_or(ProcessError::BadAddress)?;
    k.platform().copy_out(&space, addr, bytes)?;
    Ok(())
}

fn check_user_range<P: Platform>(k: &Kernel<P>, addr: u64, len: usize) -> Result<(), ProcessError> {
    let me = k.current();
    let size = k.lock_table()[me].size;
    if range_within(addr, len, size) {
        Ok(())
    } else {
        Err(ProcessError::BadAddress)
    }
}

fn handle_fork<P: Platform>(k: &Kernel<P>) -> SyscallResult {
    k.fork().map(Pid::as_raw)
}

fn handle_wait<P: Platform>(k: &Kernel<P>) -> SyscallResult {
    k.wait().map(Pid::as_raw)
}

fn handle_kill<P: Platform>(k: &Kernel<P>, args: SyscallArgs) -> SyscallResult {
    let raw = args.int(0);
    let pid = u32::try_from(raw)
        .map(Pid)
        .map_err(|_| ProcessError::InvalidArgument("negative pid"))?;
    k.kill(pid).map(|()| 0)
}

fn handle_getpid<P: Platform>(k: &Kernel<P>) -> SyscallResult {
    k.current_pid()
        .map(Pid::as_raw)
        .ok_or(ProcessError::NotFound(Pid::NONE))
}

fn handle_getppid<P: Platform>(k: &Kernel<P>) -> SyscallResult {
    let me = k.current();
    let table = k.lock_table();
    let ppid = table[me]
        .parent
        .and_then(|parent| table.resolve(parent))
        .map(|parent| parent.pid)
        .unwrap_or(Pid::NONE);
    Ok(ppid.as_raw())
}

fn handle_sbrk<P: Platform>(k: &Kernel<P>, args: SyscallArgs) -> SyscallResult {
    let delta = args.int(0) as isize;
    let old = k.grow(delta)?;
    i64::try_from(old).map_err(|_| ProcessError::OutOfMemory)
}

fn handle_sleep<P: Platform>(k: &Kernel<P>, args: SyscallArgs) -> SyscallResult {
    let n = u64::try_from(args.int(0))
        .map_err(|_| ProcessError::InvalidArgument("negative sleep"))?;
    k.sleep_ticks(n).map(|()| 0)
}

fn handle_getpinfo<P: Platform>(k: &Kernel<P>, args: SyscallArgs) -> SyscallResult {
    let addr = args.addr(0);
    check_user_range(k, addr, ProcStat::ENCODED_LEN)?;
    let bytes = k.getpinfo().to_bytes();
    copy_to_user(k, addr, &bytes)?;
    Ok(0)
}

fn handle_clone<P: Platform>(k: &Kernel<P>, args: SyscallArgs) -> SyscallResult {
    let [entry, arg1, arg2, stack] = args.0;
    k.clone_thread(entry, arg1, arg2, stack).map(Pid::as_raw)
}

fn handle_join<P: Platform>(k: &Kernel<P>, args: SyscallArgs) -> SyscallResult {
    let out = args.addr(0);
    // Check before reaping, so a bad pointer cannot lose the stack.
    check_user_range(k, out, 8)?;
    let (pid, stack) = k.join()?;
    copy_to_user(k, out, &stack.to_le_bytes())?;
    Ok(pid.as_raw())
}
