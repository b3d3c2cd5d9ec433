//! Interrupt-safe spinlock
//!
//! A FIFO `spin` ticket mutex paired with the per-CPU interrupt nesting counter and a
//! record of the holding CPU. Unlike a plain mutex guard, ownership belongs
//! to the CPU rather than the guard's stack frame: the table lock is taken
//! by one kernel thread and released by whichever thread that CPU switches
//! to next, so release only checks the CPU.

use core::cell::UnsafeCell;
use core::mem;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::mutex::TicketMutex;

/// No CPU holds the lock.
const NO_HOLDER: usize = usize::MAX;

#[cfg(not(test))]
type Relax = spin::relax::Spin;

/// Host threads share cores with the holder, so waiters give theirs up.
#[cfg(test)]
type Relax = spin::relax::Yield;

/// Interrupt nesting the lock brackets its critical section with.
pub trait IrqNesting {
    /// Disable interrupts, remembering the outermost state.
    fn push_off(&self);
    /// Undo one `push_off`; re-enable interrupts at the outermost level.
    fn pop_off(&self);
    /// Executing CPU. Called only between `push_off` and `pop_off`.
    fn current_cpu(&self) -> usize;
}

/// Spinlock guarding `T`.
pub struct Spinlock<T> {
    name: &'static str,
    lock: TicketMutex<(), Relax>,
    holder: AtomicUsize,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for Spinlock<T> {}
unsafe impl<T: Send> Send for Spinlock<T> {}

impl<T> Spinlock<T> {
    /// Create an unlocked spinlock.
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            name,
            lock: TicketMutex::new(()),
            holder: AtomicUsize::new(NO_HOLDER),
            data: UnsafeCell::new(data),
        }
    }

    /// Lock name, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Acquire the lock, disabling interrupts until it is released.
    ///
    /// Waiters are served in arrival order. Panics if this CPU already
    /// holds it.
    pub fn lock<'a>(&'a self, irq: &'a dyn IrqNesting) -> SpinlockGuard<'a, T> {
        irq.push_off();
        let cpu = irq.current_cpu();
        if self.held_by(cpu) {
            panic!("spinlock {}: acquired twice on cpu {}", self.name, cpu);
        }
        mem::forget(self.lock.lock());
        self.holder.store(cpu, Ordering::Relaxed);
        SpinlockGuard { lock: self, irq }
    }

    /// Whether the executing CPU holds the lock.
    pub fn holding(&self, irq: &dyn IrqNesting) -> bool {
        irq.push_off();
        let held = self.held_by(irq.current_cpu());
        irq.pop_off();
        held
    }

    /// Release a lock whose guard lives on another kernel stack.
    ///
    /// # Safety
    ///
    /// The executing CPU must hold the lock, and the guard that acquired it
    /// must never be dropped.
    pub unsafe fn force_release(&self, irq: &dyn IrqNesting) {
        self.release(irq);
    }

    fn held_by(&self, cpu: usize) -> bool {
        self.lock.is_locked() && self.holder.load(Ordering::Relaxed) == cpu
    }

    fn release(&self, irq: &dyn IrqNesting) {
        let cpu = irq.current_cpu();
        if !self.held_by(cpu) {
            panic!("spinlock {}: released on cpu {} without holding it", self.name, cpu);
        }
        self.holder.store(NO_HOLDER, Ordering::Relaxed);
        // SAFETY: acquired in `lock`, whose guard was forgotten.
        unsafe { self.lock.force_unlock() };
        irq.pop_off();
    }
}

/// Access to the data of a held [`Spinlock`]. Dropping it releases the lock.
pub struct SpinlockGuard<'a, T> {
    lock: &'a Spinlock<T>,
    irq: &'a dyn IrqNesting,
}

impl<'a, T> SpinlockGuard<'a, T> {
    /// The lock this guard holds.
    pub fn spinlock(this: &Self) -> &'a Spinlock<T> {
        this.lock
    }
}

impl<T> Deref for SpinlockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the lock is held while the guard exists.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinlockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the lock is held while the guard exists.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinlockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release(self.irq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    /// Nesting counter of one CPU.
    struct FakeIrq {
        cpu: usize,
        depth: Cell<u32>,
        enabled: Cell<bool>,
        saved: Cell<bool>,
    }

    impl FakeIrq {
        fn new() -> Self {
            Self::on_cpu(0)
        }

        fn on_cpu(cpu: usize) -> Self {
            Self {
                cpu,
                depth: Cell::new(0),
                enabled: Cell::new(true),
                saved: Cell::new(false),
            }
        }
    }

    impl IrqNesting for FakeIrq {
        fn push_off(&self) {
            let was = self.enabled.replace(false);
            if self.depth.get() == 0 {
                self.saved.set(was);
            }
            self.depth.set(self.depth.get() + 1);
        }

        fn pop_off(&self) {
            self.depth.set(self.depth.get() - 1);
            if self.depth.get() == 0 && self.saved.get() {
                self.enabled.set(true);
            }
        }

        fn current_cpu(&self) -> usize {
            self.cpu
        }
    }

    #[test]
    fn test_lock_disables_interrupts() {
        let irq = FakeIrq::new();
        let lock = Spinlock::new("test", 5u32);
        {
            let mut guard = lock.lock(&irq);
            *guard += 1;
            assert!(!irq.enabled.get());
            assert!(lock.holding(&irq));
        }
        assert!(irq.enabled.get());
        assert!(!lock.holding(&irq));
        assert_eq!(*lock.lock(&irq), 6);
    }

    #[test]
    fn test_nested_locks() {
        let irq = FakeIrq::new();
        let a = Spinlock::new("a", ());
        let b = Spinlock::new("b", ());
        let ga = a.lock(&irq);
        let gb = b.lock(&irq);
        assert_eq!(irq.depth.get(), 2);
        drop(ga);
        assert!(!irq.enabled.get());
        drop(gb);
        assert!(irq.enabled.get());
    }

    #[test]
    #[should_panic(expected = "acquired twice")]
    fn test_double_acquire_panics() {
        let irq = FakeIrq::new();
        let lock = Spinlock::new("twice", ());
        let _first = lock.lock(&irq);
        let _second = lock.lock(&irq);
    }

    #[test]
    fn test_force_release() {
        let irq = FakeIrq::new();
        let lock = Spinlock::new("handoff", ());
        mem::forget(lock.lock(&irq));
        assert!(lock.holding(&irq));
        unsafe { lock.force_release(&irq) };
        assert!(!lock.holding(&irq));
        assert!(irq.enabled.get());
    }

    #[test]
    fn test_guard_names_its_lock() {
        let irq = FakeIrq::new();
        let lock = Spinlock::new("named", 0u8);
        let guard = lock.lock(&irq);
        assert_eq!(SpinlockGuard::spinlock(&guard).name(), "named");
    }

    #[test]
    fn test_waiter_not_starved_by_busy_cpu() {
        let lock = Arc::new(Spinlock::new("busy", 0u64));
        let stop = Arc::new(AtomicBool::new(false));

        let hammer = {
            let (lock, stop) = (lock.clone(), stop.clone());
            std::thread::spawn(move || {
                let irq = FakeIrq::on_cpu(1);
                while !stop.load(Ordering::SeqCst) {
                    *lock.lock(&irq) += 1;
                }
            })
        };
        // Let the other cpu get going.
        let watcher = FakeIrq::on_cpu(2);
        while *lock.lock(&watcher) < 1000 {
            std::thread::yield_now();
        }

        let irq = FakeIrq::on_cpu(0);
        for _ in 0..100 {
            let guard = lock.lock(&irq);
            assert!(lock.holding(&irq));
            drop(guard);
        }
        stop.store(true, Ordering::SeqCst);
        hammer.join().unwrap();
        assert!(!lock.holding(&irq));
    }
}
