//! Lottery scheduler.
//!
//! Every CPU runs [`Kernel::scheduler`] after boot. Each round takes the
//! table lock, draws a winner among the runnable processes weighted by
//! their tickets, and switches to it. The process comes back through
//! [`Kernel::sched`], still holding the table lock the round acquired;
//! the lock is released on the far side of each switch, never in between.

pub mod lottery;

use core::sync::atomic::Ordering;

use crate::kernel::{Kernel, TableGuard};
use crate::platform::Platform;
use crate::process::ProcState;

impl<P: Platform> Kernel<P> {
    /// Per-CPU scheduler loop. Never returns.
    ///
    /// An idle CPU spins with interrupts enabled until something becomes
    /// runnable.
    pub fn scheduler(&self) -> ! {
        loop {
            if !self.schedule_once() {
                core::hint::spin_loop();
            }
        }
    }

    /// One lottery round on this CPU. Returns whether a process ran.
    pub fn schedule_once(&self) -> bool {
        // Let devices interrupt between rounds.
        self.platform.enable_interrupts();

        let mut table = self.lock_table();
        let Some(slot) = table.draw_winner() else {
            return false;
        };

        let cpu = self.mycpu();
        let p = &mut table[slot];
        log::trace!("[sched] cpu {} runs pid {}", self.platform.cpu_id(), p.pid);

        // SAFETY: interrupts are off while the table lock is held.
        unsafe { (*cpu).proc = Some(slot) };
        if let (Some(space), Some(kstack)) = (p.space.as_deref(), p.kstack.as_ref()) {
            self.platform.switch_user(space, kstack);
        }
        p.state = ProcState::Running;
        p.ticks += 1;
        let load: *const P::Context = &p.context;

        self.context_switches.fetch_add(1, Ordering::Relaxed);
        // SAFETY: both contexts live in kernel-owned storage, and the table
        // lock is held across the switch as the process expects.
        unsafe { self.platform.switch(&mut (*cpu).scheduler, load) };
        self.platform.switch_kernel();

        // The process is done running for now. It changed its own state
        // before coming back.
        // SAFETY: still on this CPU with interrupts off.
        unsafe { (*cpu).proc = None };
        drop(table);
        true
    }

    /// Switch from the running process to this CPU's scheduler.
    ///
    /// The caller holds the table lock and nothing else, and has already
    /// moved the process out of `Running`. Interrupt-enable state belongs
    /// to the kernel thread, not the CPU, so it is saved and restored here.
    pub(crate) fn sched(&self, table: &mut TableGuard<'_, P>) {
        let slot = self.current();
        if !self.table.holding(self) {
            panic!("sched: table lock not held");
        }
        let cpu = self.mycpu();
        // SAFETY: interrupts are off while a spinlock is held.
        if unsafe { (*cpu).ncli } != 1 {
            panic!("sched: other locks held");
        }
        if table[slot].state == ProcState::Running {
            panic!("sched: process still running");
        }
        if self.platform.interrupts_enabled() {
            panic!("sched: interrupts enabled");
        }

        // SAFETY: as above.
        let intena = unsafe { (*cpu).intena };
        let save: *mut P::Context = &mut table[slot].context;
        // SAFETY: the scheduler context of this CPU outlives the switch,
        // and the table lock passes to the scheduler with it.
        unsafe { self.platform.switch(save, &(*cpu).scheduler) };

        // Possibly resumed on another CPU.
        let cpu = self.mycpu();
        // SAFETY: interrupts are still off.
        unsafe { (*cpu).intena = intena };
    }

    /// Give up the CPU for one scheduling round.
    pub fn yield_now(&self) {
        let slot = self.current();
        let mut table = self.lock_table();
        table[slot].state = ProcState::Runnable;
        self.sched(&mut table);
    }

    /// First kernel code of every new process.
    ///
    /// The scheduler switched here holding the table lock; its guard lives
    /// on the scheduler's stack, so release the lock directly. The file
    /// layer's one-time setup runs in the first process to get here,
    /// because it may sleep.
    pub fn fork_return(&self) {
        // SAFETY: this CPU acquired the lock in `schedule_once` and that
        // guard is dropped by the scheduler only after its next switch.
        unsafe { self.table.force_release(self) };

        if !self.first_process_started.swap(true, Ordering::AcqRel) {
            log::info!("[proc] first process running, initializing file layer");
            self.platform.first_process_init();
        }
    }

    /// Number of switches from a scheduler into a process since boot.
    pub fn context_switches(&self) -> u64 {
        self.context_switches.load(Ordering::Relaxed)
    }
}
