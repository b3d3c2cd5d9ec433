//! Kernel configuration constants.
//!
//! This module contains compile-time configuration for the process
//! subsystem. Values here size the process table and the per-process
//! resources; `KernelConfig` carries the few knobs chosen at boot.

/// Maximum number of processes (process table capacity).
pub const NPROC: usize = 64;

/// Maximum number of CPUs supported.
pub const NCPU: usize = 8;

/// Open files per process.
pub const NOFILE: usize = 16;

/// Page size (4 KB).
pub const PAGE_SIZE: usize = 4096;

/// Kernel stack size per process (one page).
pub const KSTACK_SIZE: usize = 4096;

/// Maximum length of a process display name.
pub const PROC_NAME_LEN: usize = 16;

/// Ticket weight given to the first process.
pub const INIT_TICKETS: u32 = 1;

/// Default seed of the lottery PRNG.
pub const RAND_SEED: u32 = 999_999;

/// Fake return address pushed below the arguments of a cloned thread.
/// A thread function that returns jumps here and faults.
pub const CLONE_SENTINEL: u64 = 0xffff_ffff_ffff_ffff;

/// Boot-time configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Number of CPUs that will run a scheduler loop.
    pub ncpu: usize,
    /// Initial PRNG state for the lottery.
    pub seed: u32,
}

impl KernelConfig {
    /// Configuration for `ncpu` processors with the default seed.
    pub const fn with_cpus(ncpu: usize) -> Self {
        Self {
            ncpu,
            seed: RAND_SEED,
        }
    }

    /// Check the configuration against the compile-time limits.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.ncpu == 0 {
            return Err("at least one CPU is required");
        }
        if self.ncpu > NCPU {
            return Err("more CPUs than NCPU");
        }
        Ok(())
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::with_cpus(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KernelConfig::default();
        assert_eq!(config.ncpu, 1);
        assert_eq!(config.seed, RAND_SEED);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_limits() {
        assert!(KernelConfig::with_cpus(0).validate().is_err());
        assert!(KernelConfig::with_cpus(NCPU).validate().is_ok());
        assert!(KernelConfig::with_cpus(NCPU + 1).validate().is_err());
    }

    #[test]
    fn test_stack_fits_clone_frame() {
        // sentinel + two arguments
        assert!(3 * 8 < PAGE_SIZE);
        assert_eq!(KSTACK_SIZE % PAGE_SIZE, 0);
    }
}
