//! Per-CPU state
//!
//! Each CPU owns a record of the process it is running, the context of
//! its scheduler loop and the interrupt nesting used by spinlocks. A record
//! is only ever touched by its own CPU with interrupts disabled, which is
//! what makes the unsynchronized cells sound.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::UnsafeCell;

/// State of one CPU.
pub struct Cpu<C> {
    /// Table slot of the process running here, if any.
    pub proc: Option<usize>,
    /// Saved context of this CPU's scheduler loop.
    pub scheduler: C,
    /// Depth of `push_off` nesting.
    pub ncli: u32,
    /// Were interrupts enabled before the outermost `push_off`?
    pub intena: bool,
}

impl<C: Default> Cpu<C> {
    fn new() -> Self {
        Self {
            proc: None,
            scheduler: C::default(),
            ncli: 0,
            intena: false,
        }
    }
}

/// Table of CPU records, indexed by CPU id.
pub struct CpuTable<C> {
    cpus: Box<[UnsafeCell<Cpu<C>>]>,
}

// Each record is reached only from its own CPU with interrupts off.
unsafe impl<C: Send> Sync for CpuTable<C> {}

impl<C: Default> CpuTable<C> {
    /// Records for `ncpu` processors.
    pub fn new(ncpu: usize) -> Self {
        let cpus: Vec<_> = (0..ncpu).map(|_| UnsafeCell::new(Cpu::new())).collect();
        Self {
            cpus: cpus.into_boxed_slice(),
        }
    }
}

impl<C> CpuTable<C> {
    /// Number of CPUs.
    pub fn len(&self) -> usize {
        self.cpus.len()
    }

    /// Raw pointer to the record of CPU `id`.
    ///
    /// Panics on an id the table was not built for.
    pub fn get(&self, id: usize) -> *mut Cpu<C> {
        match self.cpus.get(id) {
            Some(cell) => cell.get(),
            None => panic!("cpu {} not configured ({} cpus)", id, self.cpus.len()),
        }
    }
}
