//! Process Table
//!
//! Fixed-capacity table of process control blocks. The table lives inside
//! the kernel's single table spinlock; every state transition and every
//! read of a relationship (parent, channel, address-space identity) happens
//! through a held guard.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::ops::{Index, IndexMut};

use super::context::TrapFrame;
use crate::config::{NOFILE, NPROC, PROC_NAME_LEN};
use crate::platform::{KernelStack, Platform};
use crate::rand::Lcg;
use crate::scheduler::lottery;
use crate::sync::Channel;

/// Process ID type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Pid(pub u32);

impl Pid {
    /// Placeholder pid of an unused slot. Real pids start at 1.
    pub const NONE: Pid = Pid(0);

    /// Value handed back to user mode.
    pub fn as_raw(self) -> i64 {
        i64::from(self.0)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    /// Free slot
    Unused,
    /// Claimed, still being initialized
    Embryo,
    /// Blocked on a channel
    Sleeping,
    /// Waiting for a CPU
    Runnable,
    /// On a CPU
    Running,
    /// Exited, waiting to be reclaimed by its parent
    Zombie,
}

impl ProcState {
    /// Fixed-width label used by `procdump`.
    pub fn label(self) -> &'static str {
        match self {
            ProcState::Unused => "unused",
            ProcState::Embryo => "embryo",
            ProcState::Sleeping => "sleep ",
            ProcState::Runnable => "runble",
            ProcState::Running => "run   ",
            ProcState::Zombie => "zombie",
        }
    }
}

/// Reference to a table slot, valid while the slot still holds `pid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcRef {
    /// Table index.
    pub slot: usize,
    /// Pid the slot held when the reference was taken.
    pub pid: Pid,
}

/// Process control block.
pub struct Proc<P: Platform> {
    /// Process ID
    pub pid: Pid,
    /// Lifecycle state
    pub state: ProcState,
    /// User address space, shared by every thread of a group
    pub space: Option<Arc<P::Space>>,
    /// Size of the user image in bytes
    pub size: usize,
    /// Kernel stack, owned by this PCB alone
    pub kstack: Option<KernelStack>,
    /// Saved user registers
    pub tf: TrapFrame,
    /// Saved kernel context, resumed by the scheduler
    pub context: P::Context,
    /// Parent process or creating thread
    pub parent: Option<ProcRef>,
    /// Display name
    pub name: String,
    /// Open files
    pub ofile: [Option<P::File>; NOFILE],
    /// Current working directory
    pub cwd: Option<P::Inode>,
    /// Set by `kill`, acted on at the next checkpoint
    pub killed: bool,
    /// Channel this process sleeps on, only while `Sleeping`
    pub chan: Option<Channel>,
    /// Lottery weight
    pub tickets: u32,
    /// Number of times the scheduler picked this process
    pub ticks: u64,
}

impl<P: Platform> Proc<P> {
    fn unused() -> Self {
        Self {
            pid: Pid::NONE,
            state: ProcState::Unused,
            space: None,
            size: 0,
            kstack: None,
            tf: TrapFrame::default(),
            context: P::Context::default(),
            parent: None,
            name: String::new(),
            ofile: core::array::from_fn(|_| None),
            cwd: None,
            killed: false,
            chan: None,
            tickets: 0,
            ticks: 0,
        }
    }

    /// Anything but `Unused`.
    pub fn is_used(&self) -> bool {
        self.state != ProcState::Unused
    }

    /// True if this PCB runs in exactly the address space `space`.
    pub fn shares_space(&self, space: Option<&Arc<P::Space>>) -> bool {
        match (self.space.as_ref(), space) {
            (Some(mine), Some(other)) => Arc::ptr_eq(mine, other),
            _ => false,
        }
    }

    /// Set the display name, truncated to `PROC_NAME_LEN - 1` bytes.
    pub fn set_name(&mut self, name: &str) {
        let mut end = name.len().min(PROC_NAME_LEN - 1);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        self.name.clear();
        self.name.push_str(&name[..end]);
    }

    /// Reset the slot to `Unused`, handing back what it owned.
    fn clear(&mut self) -> Remains<P> {
        let remains = Remains {
            kstack: self.kstack.take(),
            space: self.space.take(),
            files: self.ofile.iter_mut().filter_map(Option::take).collect(),
            cwd: self.cwd.take(),
        };
        self.pid = Pid::NONE;
        self.state = ProcState::Unused;
        self.size = 0;
        self.tf = TrapFrame::default();
        self.parent = None;
        self.name.clear();
        self.killed = false;
        self.chan = None;
        self.tickets = 0;
        self.ticks = 0;
        remains
    }
}

/// Resources taken out of a slot under the table lock, to be released
/// after it is dropped.
pub struct Remains<P: Platform> {
    /// Kernel stack to free.
    pub kstack: Option<KernelStack>,
    /// This PCB's reference to its address space.
    pub space: Option<Arc<P::Space>>,
    /// Open files still held.
    pub files: Vec<P::File>,
    /// Working directory still held.
    pub cwd: Option<P::Inode>,
}

/// The process table proper.
pub struct ProcTable<P: Platform> {
    procs: [Proc<P>; NPROC],
    next_pid: u32,
    rng: Lcg,
    init: Option<ProcRef>,
}

impl<P: Platform> ProcTable<P> {
    /// Empty table whose lottery starts from `seed`.
    pub fn new(seed: u32) -> Self {
        Self {
            procs: core::array::from_fn(|_| Proc::unused()),
            next_pid: 1,
            rng: Lcg::new(seed),
            init: None,
        }
    }

    /// All slots in table order.
    pub fn iter(&self) -> impl Iterator<Item = &Proc<P>> {
        self.procs.iter()
    }

    /// All slots in table order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Proc<P>> {
        self.procs.iter_mut()
    }

    /// Reference to the process in `slot`.
    pub fn proc_ref(&self, slot: usize) -> ProcRef {
        ProcRef {
            slot,
            pid: self.procs[slot].pid,
        }
    }

    /// The process `r` names, if the slot still holds it.
    pub fn resolve(&self, r: ProcRef) -> Option<&Proc<P>> {
        self.procs
            .get(r.slot)
            .filter(|p| p.is_used() && p.pid == r.pid)
    }

    /// Slot of the live process with `pid`.
    pub fn find(&self, pid: Pid) -> Option<usize> {
        self.procs.iter().position(|p| p.is_used() && p.pid == pid)
    }

    /// The process orphans are handed to.
    pub fn init(&self) -> Option<ProcRef> {
        self.init
    }

    pub(crate) fn set_init(&mut self, init: ProcRef) {
        self.init = Some(init);
    }

    /// Sleep channel identifying `slot` (what a waiting parent sleeps on).
    pub fn channel_of(&self, slot: usize) -> Channel {
        Channel::of(&self.procs[slot])
    }

    /// Number of slots not `Unused`.
    pub fn used(&self) -> usize {
        self.procs.iter().filter(|p| p.is_used()).count()
    }

    /// Claim the first free slot as an `Embryo` with a fresh pid.
    pub(crate) fn claim(&mut self) -> Option<usize> {
        let slot = self.procs.iter().position(|p| !p.is_used())?;
        let pid = Pid(self.next_pid);
        self.next_pid = self.next_pid.wrapping_add(1).max(1);
        let p = &mut self.procs[slot];
        p.state = ProcState::Embryo;
        p.pid = pid;
        Some(slot)
    }

    /// Return `slot` to `Unused`.
    pub(crate) fn release(&mut self, slot: usize) -> Remains<P> {
        self.procs[slot].clear()
    }

    /// Weighted random pick among `Runnable` slots.
    pub(crate) fn draw_winner(&mut self) -> Option<usize> {
        let weights = self.procs.iter().map(|p| match p.state {
            ProcState::Runnable => p.tickets,
            _ => 0,
        });
        lottery::draw(weights, &mut self.rng)
    }

    /// Make every process sleeping on `chan` runnable. Returns how many woke.
    pub fn wakeup(&mut self, chan: Channel) -> usize {
        let mut woken = 0;
        for p in self.procs.iter_mut() {
            if p.state == ProcState::Sleeping && p.chan == Some(chan) {
                p.state = ProcState::Runnable;
                p.chan = None;
                woken += 1;
            }
        }
        woken
    }

    /// Store `size` in every PCB that runs in `space`.
    pub(crate) fn propagate_size(&mut self, space: &Arc<P::Space>, size: usize) -> usize {
        let mut updated = 0;
        for p in self.procs.iter_mut() {
            if p.shares_space(Some(space)) {
                p.size = size;
                updated += 1;
            }
        }
        updated
    }
}

impl<P: Platform> Index<usize> for ProcTable<P> {
    type Output = Proc<P>;

    fn index(&self, slot: usize) -> &Proc<P> {
        &self.procs[slot]
    }
}

impl<P: Platform> IndexMut<usize> for ProcTable<P> {
    fn index_mut(&mut self, slot: usize) -> &mut Proc<P> {
        &mut self.procs[slot]
    }
}
