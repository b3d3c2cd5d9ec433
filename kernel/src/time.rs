//! Tick clock
//!
//! Timer interrupts advance a tick counter kept under its own spinlock.
//! Timed sleeps are built from `sleep_on` on the counter itself, so the
//! lock order is always clock lock, then table lock.

use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::process::ProcessError;
use crate::sync::Channel;

impl<P: Platform> Kernel<P> {
    /// Record one timer tick and wake timed sleepers.
    ///
    /// Called from the timer interrupt of a single CPU.
    pub fn tick(&self) {
        let mut ticks = self.clock.lock(self);
        *ticks += 1;
        self.wakeup(Channel::of(&self.clock));
    }

    /// Ticks since boot.
    pub fn uptime(&self) -> u64 {
        *self.clock.lock(self)
    }

    /// Block the running process for `n` ticks.
    ///
    /// Returns early with `Killed` if the process is killed meanwhile.
    pub fn sleep_ticks(&self, n: u64) -> Result<(), ProcessError> {
        let chan = Channel::of(&self.clock);
        let mut ticks = self.clock.lock(self);
        let start = *ticks;
        while *ticks - start < n {
            if self.current_killed() {
                return Err(ProcessError::Killed);
            }
            ticks = self.sleep_on(chan, ticks);
        }
        Ok(())
    }
}
