//! Sleep and wakeup
//!
//! A process blocks by recording a channel and switching to the scheduler
//! with the table lock held. `wakeup` needs the same lock to flip a
//! sleeper back to runnable, so a wakeup can never fall between a caller
//! deciding to sleep and its state actually becoming `Sleeping`.

use super::{Channel, SpinlockGuard};
use crate::kernel::{Kernel, TableGuard};
use crate::platform::Platform;
use crate::process::ProcState;

impl<P: Platform> Kernel<P> {
    /// Sleep on `chan` while holding the table lock.
    ///
    /// The lock is given up for the duration of the sleep and held again
    /// on return.
    pub fn sleep_locked(&self, chan: Channel, table: &mut TableGuard<'_, P>) {
        let slot = match self.current_slot() {
            Some(slot) => slot,
            None => panic!("sleep without a process"),
        };

        let p = &mut table[slot];
        p.chan = Some(chan);
        p.state = ProcState::Sleeping;
        log::trace!("[proc] pid {} sleeps on {:#x}", p.pid, chan.key());

        self.sched(table);

        table[slot].chan = None;
    }

    /// Sleep on `chan`, atomically releasing the lock `guard` holds.
    ///
    /// The table lock is taken before `guard` is dropped, so a waker that
    /// must hold `guard`'s lock to change the condition cannot run its
    /// wakeup before this process is asleep. Returns the reacquired guard.
    pub fn sleep_on<'a, T>(&'a self, chan: Channel, guard: SpinlockGuard<'a, T>) -> SpinlockGuard<'a, T> {
        let lock = SpinlockGuard::spinlock(&guard);
        let mut table = self.lock_table();
        drop(guard);

        self.sleep_locked(chan, &mut table);

        drop(table);
        lock.lock(self)
    }

    /// Wake every process sleeping on `chan`. Returns how many woke.
    pub fn wakeup(&self, chan: Channel) -> usize {
        self.lock_table().wakeup(chan)
    }
}
