//! Process subsystem handle
//!
//! [`Kernel`] owns everything the process subsystem shares between CPUs:
//! the process table behind its single lock, the per-CPU records and the
//! tick clock. Operations are spread over the modules that implement them
//! (`process::manager`, `scheduler`, `sync::sleep`, `syscall`, ...); this
//! module holds construction, per-CPU identity and interrupt nesting.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicU64};

use crate::config::KernelConfig;
use crate::cpu::{Cpu, CpuTable};
use crate::platform::Platform;
use crate::process::{Pid, ProcTable, ProcessError, TrapFrame};
use crate::sync::{IrqNesting, Spinlock, SpinlockGuard};

/// Guard over the process table.
pub type TableGuard<'a, P> = SpinlockGuard<'a, ProcTable<P>>;

/// The process subsystem of one machine.
pub struct Kernel<P: Platform> {
    pub(crate) platform: P,
    pub(crate) table: Spinlock<ProcTable<P>>,
    pub(crate) cpus: CpuTable<P::Context>,
    /// Timer ticks since boot.
    pub(crate) clock: Spinlock<u64>,
    /// Set once the first process has run its one-time initialization.
    pub(crate) first_process_started: AtomicBool,
    /// Total context switches into processes.
    pub(crate) context_switches: AtomicU64,
}

impl<P: Platform> Kernel<P> {
    /// Build the subsystem for `config.ncpu` processors.
    pub fn new(platform: P, config: KernelConfig) -> Result<Self, ProcessError> {
        config.validate().map_err(ProcessError::InvalidArgument)?;
        log::info!(
            "[proc] process table ready: {} cpus, seed {}",
            config.ncpu,
            config.seed
        );
        Ok(Self {
            platform,
            table: Spinlock::new("ptable", ProcTable::new(config.seed)),
            cpus: CpuTable::new(config.ncpu),
            clock: Spinlock::new("time", 0),
            first_process_started: AtomicBool::new(false),
            context_switches: AtomicU64::new(0),
        })
    }

    /// The collaborators this kernel was built with.
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Acquire the table lock.
    pub fn lock_table(&self) -> TableGuard<'_, P> {
        self.table.lock(self)
    }

    /// Record of the executing CPU.
    ///
    /// Interrupts must be off, or the caller could migrate between reading
    /// the CPU id and using the record.
    pub(crate) fn mycpu(&self) -> *mut Cpu<P::Context> {
        if self.platform.interrupts_enabled() {
            panic!("per-cpu record read with interrupts enabled");
        }
        self.cpus.get(self.platform.cpu_id())
    }

    /// Table slot of the process running on this CPU.
    pub fn current_slot(&self) -> Option<usize> {
        self.push_off();
        // SAFETY: interrupts are off, so the record is ours alone.
        let slot = unsafe { (*self.mycpu()).proc };
        self.pop_off();
        slot
    }

    /// Slot of the running process; kernel code calling this without one
    /// is broken.
    pub(crate) fn current(&self) -> usize {
        match self.current_slot() {
            Some(slot) => slot,
            None => panic!("no process running on this cpu"),
        }
    }

    /// Pid of the running process.
    pub fn current_pid(&self) -> Option<Pid> {
        let slot = self.current_slot()?;
        Some(self.lock_table()[slot].pid)
    }

    /// Address space of the running process.
    pub fn current_space(&self) -> Option<Arc<P::Space>> {
        let slot = self.current_slot()?;
        self.lock_table()[slot].space.clone()
    }

    /// Run `f` on the trap frame of the running process.
    pub fn with_trapframe<R>(&self, f: impl FnOnce(&mut TrapFrame) -> R) -> R {
        let slot = self.current();
        let mut table = self.lock_table();
        f(&mut table[slot].tf)
    }

    /// Whether the running process has been killed.
    pub fn current_killed(&self) -> bool {
        let slot = self.current();
        self.lock_table()[slot].killed
    }
}

impl<P: Platform> IrqNesting for Kernel<P> {
    fn push_off(&self) {
        let was_enabled = self.platform.interrupts_enabled();
        self.platform.disable_interrupts();
        let cpu = self.mycpu();
        // SAFETY: interrupts are off.
        unsafe {
            if (*cpu).ncli == 0 {
                (*cpu).intena = was_enabled;
            }
            (*cpu).ncli += 1;
        }
    }

    fn pop_off(&self) {
        let cpu = self.mycpu();
        // SAFETY: `mycpu` checked that interrupts are off.
        unsafe {
            if (*cpu).ncli == 0 {
                panic!("pop_off without matching push_off");
            }
            (*cpu).ncli -= 1;
            if (*cpu).ncli == 0 && (*cpu).intena {
                self.platform.enable_interrupts();
            }
        }
    }

    fn current_cpu(&self) -> usize {
        self.platform.cpu_id()
    }
}
