//! Process Lifecycle Manager
//!
//! Creation (the first process, `fork`, `clone`), termination (`exit`,
//! `kill`) and reclamation (`wait`, `join`), plus address-space growth for
//! a whole thread group.
//!
//! A thread group is every PCB holding the same address-space `Arc`.
//! `wait` only collects children running in a different space and `join`
//! only collects children in the caller's own. Each reclaimed PCB drops its
//! reference; whichever reclaim drops the last one destroys the space.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use super::context::TrapFrame;
use super::table::{Pid, ProcState, ProcTable, Remains};
use crate::config::{CLONE_SENTINEL, INIT_TICKETS, PAGE_SIZE};
use crate::kernel::Kernel;
use crate::memory::{self, VmError};
use crate::platform::Platform;

/// Process lifecycle error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessError {
    /// Process table has no free slot
    TableFull,
    /// Memory allocation failed
    OutOfMemory,
    /// The virtual-memory manager refused the operation
    AddressSpace(VmError),
    /// No child of the requested kind
    NoChildren,
    /// The caller was killed while waiting
    Killed,
    /// No live process has this pid
    NotFound(Pid),
    /// Invalid argument
    InvalidArgument(&'static str),
    /// User address outside the caller's image
    BadAddress,
}

impl From<VmError> for ProcessError {
    fn from(e: VmError) -> Self {
        match e {
            VmError::OutOfMemory => ProcessError::OutOfMemory,
            VmError::BadAddress => ProcessError::BadAddress,
            other => ProcessError::AddressSpace(other),
        }
    }
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::TableFull => write!(f, "process table full"),
            ProcessError::OutOfMemory => write!(f, "out of memory"),
            ProcessError::AddressSpace(e) => write!(f, "address space: {}", e),
            ProcessError::NoChildren => write!(f, "no children"),
            ProcessError::Killed => write!(f, "killed"),
            ProcessError::NotFound(pid) => write!(f, "no process {}", pid),
            ProcessError::InvalidArgument(why) => write!(f, "invalid argument: {}", why),
            ProcessError::BadAddress => write!(f, "bad address"),
        }
    }
}

/// Which children a reaping call collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reap {
    /// Children with their own address space (`wait`).
    Process,
    /// Children sharing the caller's address space (`join`).
    Thread,
}

/// A reclaimed child.
struct Reaped {
    pid: Pid,
    user_stack: u64,
}

/// Bytes of the initial frame of a cloned thread: fake return address,
/// then the two arguments.
pub const CLONE_FRAME_SIZE: usize = 3 * 8;

fn clone_frame(arg1: u64, arg2: u64) -> [u8; CLONE_FRAME_SIZE] {
    let mut frame = [0u8; CLONE_FRAME_SIZE];
    for (word, value) in frame.chunks_exact_mut(8).zip([CLONE_SENTINEL, arg1, arg2]) {
        word.copy_from_slice(&value.to_le_bytes());
    }
    frame
}

impl<P: Platform> Kernel<P> {
    /// Claim a slot and give it a kernel stack and a context that starts
    /// in `fork_return`. The slot is an `Embryo` owned by the caller.
    fn allocate(&self) -> Result<usize, ProcessError> {
        let mut table = self.lock_table();
        let Some(slot) = table.claim() else {
            log::warn!("[proc] process table full");
            return Err(ProcessError::TableFull);
        };
        let Some(kstack) = self.platform.alloc_stack() else {
            table.release(slot);
            log::warn!("[proc] no kernel stack for a new process");
            return Err(ProcessError::OutOfMemory);
        };
        let p = &mut table[slot];
        p.context = self.platform.new_context(&kstack);
        p.kstack = Some(kstack);
        Ok(slot)
    }

    /// Put an embryo back after a failed creation.
    fn abandon(&self, slot: usize) {
        let remains = self.lock_table().release(slot);
        self.dispose(remains);
    }

    /// Free what a released slot owned. Must be called without the table lock.
    fn dispose(&self, remains: Remains<P>) {
        for file in remains.files {
            self.platform.close_file(file);
        }
        if let Some(cwd) = remains.cwd {
            self.platform.put_inode(cwd);
        }
        if let Some(kstack) = remains.kstack {
            self.platform.free_stack(kstack);
        }
        if let Some(space) = remains.space.and_then(Arc::into_inner) {
            self.platform.destroy(space);
        }
    }

    /// Copy what a new PCB inherits from `from`: registers (with a zero
    /// return value), size, tickets, name, open files and working directory.
    fn inherit(&self, table: &mut ProcTable<P>, from: usize, to: usize) {
        let parent = table.proc_ref(from);
        let src = &table[from];
        let files = core::array::from_fn(|fd| {
            src.ofile[fd].as_ref().map(|f| self.platform.dup_file(f))
        });
        let cwd = src.cwd.as_ref().map(|ip| self.platform.dup_inode(ip));
        let (tf, size, tickets) = (src.tf, src.size, src.tickets);
        let name = src.name.clone();

        let child = &mut table[to];
        child.parent = Some(parent);
        child.tf = tf;
        child.tf.rax = 0;
        child.size = size;
        child.tickets = tickets;
        child.ticks = 0;
        child.ofile = files;
        child.cwd = cwd;
        child.set_name(&name);
    }

    /// Create the first user process from `image`, loaded at address 0.
    pub fn userinit(&self, image: &[u8]) -> Result<Pid, ProcessError> {
        if image.len() > PAGE_SIZE {
            return Err(ProcessError::InvalidArgument("init image larger than a page"));
        }
        if self.lock_table().init().is_some() {
            return Err(ProcessError::InvalidArgument("init already created"));
        }

        let slot = self.allocate()?;
        let space = match self.platform.create() {
            Ok(space) => space,
            Err(e) => {
                self.abandon(slot);
                return Err(e.into());
            }
        };
        if let Err(e) = self.platform.init_user(&space, image) {
            self.platform.destroy(space);
            self.abandon(slot);
            return Err(e.into());
        }
        let root = self.platform.root();

        let mut table = self.lock_table();
        let init = table.proc_ref(slot);
        let p = &mut table[slot];
        p.space = Some(Arc::new(space));
        p.size = PAGE_SIZE;
        p.tf = TrapFrame::new_user(0, PAGE_SIZE as u64);
        p.set_name("initcode");
        p.cwd = root;
        p.tickets = INIT_TICKETS;
        p.state = ProcState::Runnable;
        table.set_init(init);

        log::info!("[proc] init is pid {}", init.pid);
        Ok(init.pid)
    }

    /// Create a copy of the running process with its own address space.
    /// The child sees 0 as the result of the system call.
    pub fn fork(&self) -> Result<Pid, ProcessError> {
        let me = self.current();
        let slot = self.allocate()?;

        let (space, size) = {
            let table = self.lock_table();
            (table[me].space.clone(), table[me].size)
        };
        let copy = match space.as_deref() {
            Some(space) => self.platform.duplicate(space, size).map_err(ProcessError::from),
            None => Err(ProcessError::AddressSpace(VmError::NotMapped)),
        };
        drop(space);
        let copy = match copy {
            Ok(copy) => copy,
            Err(e) => {
                log::warn!("[proc] fork: {}", e);
                self.abandon(slot);
                return Err(e);
            }
        };

        let mut table = self.lock_table();
        self.inherit(&mut table, me, slot);
        let child = &mut table[slot];
        child.space = Some(Arc::new(copy));
        child.state = ProcState::Runnable;
        let pid = child.pid;

        log::debug!("[proc] pid {} forked pid {}", table[me].pid, pid);
        Ok(pid)
    }

    /// Create a thread sharing the running process's address space.
    ///
    /// `stack` is one page-aligned page of the caller's image. The thread
    /// starts at `entry` with `arg1` and `arg2` in `rdi`/`rsi` and on the
    /// stack above a fake return address, its stack pointer at the top of
    /// that page minus the frame.
    pub fn clone_thread(&self, entry: u64, arg1: u64, arg2: u64, stack: u64) -> Result<Pid, ProcessError> {
        let me = self.current();
        if !memory::is_page_aligned(stack) {
            return Err(ProcessError::InvalidArgument("thread stack not page aligned"));
        }
        let (space, size) = {
            let table = self.lock_table();
            (table[me].space.clone(), table[me].size)
        };
        let Some(space) = space else {
            return Err(ProcessError::AddressSpace(VmError::NotMapped));
        };
        if !memory::range_within(stack, PAGE_SIZE, size) {
            return Err(ProcessError::BadAddress);
        }

        let slot = self.allocate()?;
        let sp = stack + (PAGE_SIZE - CLONE_FRAME_SIZE) as u64;
        if let Err(e) = self.platform.copy_out(&space, sp, &clone_frame(arg1, arg2)) {
            self.abandon(slot);
            return Err(e.into());
        }

        let mut table = self.lock_table();
        self.inherit(&mut table, me, slot);
        let child = &mut table[slot];
        child.space = Some(space);
        child.tf.rip = entry;
        child.tf.rsp = sp;
        child.tf.rbp = sp;
        child.tf.rdi = arg1;
        child.tf.rsi = arg2;
        child.state = ProcState::Runnable;
        let pid = child.pid;

        log::debug!("[proc] pid {} cloned thread pid {} at {:#x}", table[me].pid, pid, entry);
        Ok(pid)
    }

    /// Terminate the running process. Never returns.
    ///
    /// Children and threads it created are handed to init. The PCB stays a
    /// zombie until its parent (or init) collects it.
    pub fn exit(&self) -> ! {
        let me = self.current();

        let (files, cwd) = {
            let mut table = self.lock_table();
            if table.init().map(|init| init.slot) == Some(me) {
                panic!("init exiting");
            }
            let p = &mut table[me];
            let files: Vec<_> = p.ofile.iter_mut().filter_map(Option::take).collect();
            (files, p.cwd.take())
        };
        for file in files {
            self.platform.close_file(file);
        }
        if let Some(cwd) = cwd {
            self.platform.put_inode(cwd);
        }

        let mut table = self.lock_table();
        let me_ref = table.proc_ref(me);

        // Parent might be sleeping in wait() or join().
        if let Some(parent) = table[me].parent {
            let chan = table.channel_of(parent.slot);
            table.wakeup(chan);
        }

        let init = table.init();
        let mut zombie_orphan = false;
        for p in table.iter_mut() {
            if p.parent == Some(me_ref) {
                p.parent = init;
                zombie_orphan |= p.state == ProcState::Zombie;
            }
        }
        if let (true, Some(init)) = (zombie_orphan, init) {
            let chan = table.channel_of(init.slot);
            table.wakeup(chan);
        }

        table[me].state = ProcState::Zombie;
        log::debug!("[proc] pid {} exited", me_ref.pid);

        self.sched(&mut table);
        panic!("zombie pid {} scheduled", me_ref.pid);
    }

    /// Wait for a child process (own address space) to exit and reclaim it.
    pub fn wait(&self) -> Result<Pid, ProcessError> {
        self.reap(Reap::Process).map(|reaped| reaped.pid)
    }

    /// Wait for a thread of this group to exit and reclaim it.
    ///
    /// Returns its pid and the page-aligned base of its user stack; that
    /// page now belongs to the caller.
    pub fn join(&self) -> Result<(Pid, u64), ProcessError> {
        self.reap(Reap::Thread)
            .map(|reaped| (reaped.pid, reaped.user_stack))
    }

    fn reap(&self, kind: Reap) -> Result<Reaped, ProcessError> {
        let me = self.current();
        let mut table = self.lock_table();
        loop {
            let me_ref = table.proc_ref(me);
            let (have_kids, zombie) = {
                let my_space = table[me].space.as_ref();
                let mut have_kids = false;
                let mut zombie = None;
                for (slot, p) in table.iter().enumerate() {
                    if p.parent != Some(me_ref) {
                        continue;
                    }
                    if p.shares_space(my_space) != (kind == Reap::Thread) {
                        continue;
                    }
                    have_kids = true;
                    if p.state == ProcState::Zombie {
                        zombie = Some(slot);
                        break;
                    }
                }
                (have_kids, zombie)
            };

            if let Some(slot) = zombie {
                let reaped = Reaped {
                    pid: table[slot].pid,
                    user_stack: memory::page_round_down(table[slot].tf.rsp),
                };
                let remains = table.release(slot);
                drop(table);
                self.dispose(remains);
                log::debug!("[proc] pid {} reaped {:?} {}", me_ref.pid, kind, reaped.pid);
                return Ok(reaped);
            }

            if !have_kids {
                return Err(ProcessError::NoChildren);
            }
            if table[me].killed {
                return Err(ProcessError::Killed);
            }

            // exit() of a child wakes this channel.
            let chan = table.channel_of(me);
            self.sleep_locked(chan, &mut table);
        }
    }

    /// Mark `pid` killed. A sleeping target is made runnable so it notices
    /// at its next checkpoint.
    pub fn kill(&self, pid: Pid) -> Result<(), ProcessError> {
        let mut table = self.lock_table();
        let slot = table.find(pid).ok_or(ProcessError::NotFound(pid))?;
        let p = &mut table[slot];
        p.killed = true;
        if p.state == ProcState::Sleeping {
            p.state = ProcState::Runnable;
            p.chan = None;
        }
        log::debug!("[proc] pid {} killed", pid);
        Ok(())
    }

    /// Deferred kill checkpoint, run on the way back to user mode.
    pub fn exit_if_killed(&self) {
        if self.current_killed() {
            self.exit();
        }
    }

    /// Grow (`delta > 0`) or shrink (`delta < 0`) the running process's
    /// image and record the new size in every PCB of its thread group.
    /// Returns the old size.
    pub fn grow(&self, delta: isize) -> Result<usize, ProcessError> {
        let me = self.current();
        let mut table = self.lock_table();
        let old = table[me].size;
        let Some(space) = table[me].space.clone() else {
            return Err(ProcessError::AddressSpace(VmError::NotMapped));
        };

        let new = if delta > 0 {
            let target = old
                .checked_add(delta.unsigned_abs())
                .ok_or(ProcessError::OutOfMemory)?;
            self.platform.grow(&space, old, target)?
        } else if delta < 0 {
            let target = old
                .checked_sub(delta.unsigned_abs())
                .ok_or(ProcessError::InvalidArgument("image would shrink below zero"))?;
            self.platform.shrink(&space, old, target)?
        } else {
            old
        };

        let group = table.propagate_size(&space, new);
        if let Some(kstack) = table[me].kstack.as_ref() {
            self.platform.switch_user(&space, kstack);
        }
        log::debug!(
            "[proc] pid {} resized {:#x} -> {:#x} ({} pcbs)",
            table[me].pid,
            old,
            new,
            group
        );
        Ok(old)
    }
}
