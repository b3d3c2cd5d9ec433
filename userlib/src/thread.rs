//! Threading for userspace.
//!
//! Threads are created with `clone` on a one-page stack carved out of the
//! heap with `sbrk`, and reclaimed with `join`, which hands the stack page
//! back. Mutual exclusion between threads uses [`TicketLock`].

use core::sync::atomic::{AtomicU32, Ordering};

use crate::syscall::{SyscallAbi, SyscallError, SyscallResult};

/// Size of a thread stack.
pub const PAGE_SIZE: u64 = 4096;

/// Most stacks a [`StackPool`] keeps for reuse.
pub const MAX_THREADS: usize = 64;

/// How long a waiter spins before yielding the CPU.
const SPIN_LIMIT: u32 = 1 << 10;

/// Thread entry function type. The kernel passes both arguments in
/// registers, so an `extern "C"` function receives them directly.
pub type ThreadFn = extern "C" fn(arg1: u64, arg2: u64) -> !;

/// Address of `f` as `clone` expects it.
pub fn entry_point(f: ThreadFn) -> u64 {
    f as usize as u64
}

// =============================================================================
// Ticket lock
// =============================================================================

/// FIFO spinlock for threads of one process.
///
/// Each locker draws a ticket and waits for its turn, yielding the CPU
/// while the holder runs.
pub struct TicketLock {
    ticket: AtomicU32,
    turn: AtomicU32,
}

impl TicketLock {
    /// Create an unlocked lock.
    pub const fn new() -> Self {
        Self {
            ticket: AtomicU32::new(0),
            turn: AtomicU32::new(0),
        }
    }

    /// Wait for the lock. `abi` is used to yield while waiting.
    pub fn lock<'a, A: SyscallAbi + ?Sized>(&'a self, abi: &A) -> TicketGuard<'a> {
        let my_turn = self.ticket.fetch_add(1, Ordering::Relaxed);
        let mut spins = 0;
        while self.turn.load(Ordering::Acquire) != my_turn {
            if spins < SPIN_LIMIT {
                spins += 1;
                core::hint::spin_loop();
            } else {
                abi.yield_now();
            }
        }
        TicketGuard { lock: self }
    }

    /// Take the lock only if nobody holds or waits for it.
    pub fn try_lock(&self) -> Option<TicketGuard<'_>> {
        let turn = self.turn.load(Ordering::Acquire);
        self.ticket
            .compare_exchange(turn, turn.wrapping_add(1), Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| TicketGuard { lock: self })
    }

    /// Whether the lock is held or waited for.
    pub fn is_locked(&self) -> bool {
        self.ticket.load(Ordering::Relaxed) != self.turn.load(Ordering::Relaxed)
    }

    fn unlock(&self) {
        self.turn.fetch_add(1, Ordering::Release);
    }
}

impl Default for TicketLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds a [`TicketLock`]; dropping it passes the lock to the next ticket.
pub struct TicketGuard<'a> {
    lock: &'a TicketLock,
}

impl Drop for TicketGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

// =============================================================================
// Stacks
// =============================================================================

/// Page-aligned thread stacks, reused after `join`.
pub struct StackPool {
    free: [u64; MAX_THREADS],
    len: usize,
}

impl StackPool {
    /// An empty pool.
    pub const fn new() -> Self {
        Self {
            free: [0; MAX_THREADS],
            len: 0,
        }
    }

    /// A free stack page, growing the heap when none is left.
    ///
    /// The break is first padded to a page boundary, so the new page is
    /// aligned as `clone` requires.
    pub fn take<A: SyscallAbi + ?Sized>(&mut self, abi: &A) -> SyscallResult {
        if self.len > 0 {
            self.len -= 1;
            return Ok(self.free[self.len]);
        }
        let brk = abi.sbrk(0)?;
        let base = (brk + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
        let grow = i32::try_from(base - brk + PAGE_SIZE).map_err(|_| SyscallError::Failed)?;
        abi.sbrk(grow)?;
        Ok(base)
    }

    /// Return a stack page. Beyond `MAX_THREADS` pages it is dropped.
    pub fn give(&mut self, stack: u64) {
        if self.len < MAX_THREADS {
            self.free[self.len] = stack;
            self.len += 1;
        }
    }

    /// Pages ready for reuse.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no page is ready for reuse.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for StackPool {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Create / join
// =============================================================================

/// Start a thread at `entry(arg1, arg2)` on a stack from `pool`.
///
/// Returns the thread's pid. On failure the stack goes back to the pool.
pub fn thread_create<A: SyscallAbi + ?Sized>(
    abi: &A,
    pool: &mut StackPool,
    entry: u64,
    arg1: u64,
    arg2: u64,
) -> SyscallResult {
    let stack = pool.take(abi)?;
    abi.clone_thread(entry, arg1, arg2, stack).map_err(|e| {
        pool.give(stack);
        e
    })
}

/// Wait for any thread of this process and recycle its stack.
///
/// Returns the thread's pid.
pub fn thread_join<A: SyscallAbi + ?Sized>(abi: &A, pool: &mut StackPool) -> SyscallResult {
    let mut stack = 0;
    let pid = abi.join(&mut stack)?;
    pool.give(stack);
    Ok(pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::tests::MockAbi;
    use crate::syscall::SyscallNumber;
    use std::cell::Cell;
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;

    /// Heap break only; every other call succeeds with 0.
    struct Heap {
        brk: Cell<u64>,
        clone_fails: bool,
    }

    impl SyscallAbi for Heap {
        fn raw_syscall(&self, num: SyscallNumber, args: [u64; 4]) -> i64 {
            match num {
                SyscallNumber::Sbrk => {
                    let old = self.brk.get();
                    self.brk.set(old.wrapping_add(args[0] as u32 as i32 as i64 as u64));
                    old as i64
                }
                SyscallNumber::Clone if self.clone_fails => -1,
                SyscallNumber::Clone => 7,
                _ => 0,
            }
        }
    }

    /// Yields through the host scheduler.
    struct HostYield;

    impl SyscallAbi for HostYield {
        fn raw_syscall(&self, num: SyscallNumber, _args: [u64; 4]) -> i64 {
            if num == SyscallNumber::Yield {
                std::thread::yield_now();
            }
            0
        }
    }

    // =========================================================================
    // Stack pool
    // =========================================================================

    #[test]
    fn test_stack_pool_aligns_break() {
        let heap = Heap { brk: Cell::new(5000), clone_fails: false };
        let mut pool = StackPool::new();

        let stack = pool.take(&heap).unwrap();
        assert_eq!(stack, 8192);
        assert_eq!(heap.brk.get(), 8192 + PAGE_SIZE);

        let next = pool.take(&heap).unwrap();
        assert_eq!(next, 8192 + PAGE_SIZE);
    }

    #[test]
    fn test_stack_pool_reuses_pages() {
        let heap = Heap { brk: Cell::new(4096), clone_fails: false };
        let mut pool = StackPool::new();
        let stack = pool.take(&heap).unwrap();
        pool.give(stack);
        assert_eq!(pool.len(), 1);

        let brk = heap.brk.get();
        assert_eq!(pool.take(&heap), Ok(stack));
        assert_eq!(heap.brk.get(), brk);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_failed_clone_returns_stack() {
        let heap = Heap { brk: Cell::new(4096), clone_fails: true };
        let mut pool = StackPool::new();
        assert_eq!(
            thread_create(&heap, &mut pool, 0x1000, 0, 0),
            Err(SyscallError::Failed)
        );
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_join_recycles_stack() {
        let abi = MockAbi::default();
        abi.replies.borrow_mut().push(9);
        let mut pool = StackPool::new();

        assert_eq!(thread_join(&abi, &mut pool), Ok(9));
        assert_eq!(pool.len(), 1);
        assert_eq!(abi.calls.borrow()[0].0, SyscallNumber::Join);
    }

    // =========================================================================
    // Ticket lock
    // =========================================================================

    #[test]
    fn test_ticket_lock_guard() {
        let lock = TicketLock::new();
        assert!(!lock.is_locked());
        {
            let _guard = lock.lock(&HostYield);
            assert!(lock.is_locked());
            assert!(lock.try_lock().is_none());
        }
        assert!(!lock.is_locked());
        assert!(lock.try_lock().is_some());
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_ticket_lock_excludes() {
        const ROUNDS: u64 = 50_000;
        let lock = Arc::new(TicketLock::new());
        let counter = Arc::new(AtomicU64::new(0));

        let workers: Vec<_> = (0..2)
            .map(|_| {
                let (lock, counter) = (lock.clone(), counter.clone());
                std::thread::spawn(move || {
                    for _ in 0..ROUNDS {
                        let _guard = lock.lock(&HostYield);
                        // Separate load and store: only exclusion keeps this exact.
                        let value = counter.load(Ordering::Relaxed);
                        counter.store(value + 1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 2 * ROUNDS);
    }
}
