//! User address-space vocabulary.
//!
//! The virtual-memory manager itself lives behind
//! [`VirtualMemory`](crate::platform::VirtualMemory); this module holds the
//! types both sides agree on and the page-protection toggle built on top.
//!
//! # Components
//!
//! - **PteFlags**: permission bits of one user page-table entry
//! - **VmError**: failures reported by the virtual-memory manager
//! - **protect**: `mprotect` / `munprotect` over a range of pages

pub mod protect;

use core::fmt;

use bitflags::bitflags;
use x86_64::VirtAddr;

use crate::config::PAGE_SIZE;

bitflags! {
    /// Page table entry flags visible to the process subsystem.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u64 {
        /// Page is present in memory.
        const PRESENT = 1 << 0;
        /// Page is writable.
        const WRITABLE = 1 << 1;
        /// Page is accessible from user mode.
        const USER = 1 << 2;
    }
}

impl PteFlags {
    /// Flags of an ordinary user data page.
    pub const USER_DATA: Self = Self::PRESENT.union(Self::WRITABLE).union(Self::USER);

    /// True for a present page that user code may touch.
    pub fn is_user_page(self) -> bool {
        self.contains(Self::PRESENT | Self::USER)
    }
}

/// Errors reported by the virtual-memory manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// No physical memory left for pages or page tables.
    OutOfMemory,
    /// The address has no page-table entry.
    NotMapped,
    /// The address is outside the user range.
    BadAddress,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::OutOfMemory => write!(f, "out of memory"),
            VmError::NotMapped => write!(f, "page not mapped"),
            VmError::BadAddress => write!(f, "bad user address"),
        }
    }
}

/// Round `addr` down to its page boundary.
pub fn page_round_down(addr: u64) -> u64 {
    VirtAddr::new_truncate(addr).align_down(PAGE_SIZE as u64).as_u64()
}

/// Round `len` up to a whole number of pages.
pub fn page_round_up(len: usize) -> usize {
    (len + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// True if `addr` is a canonical, page-aligned address.
pub fn is_page_aligned(addr: u64) -> bool {
    VirtAddr::try_new(addr)
        .map(|va| va.is_aligned(PAGE_SIZE as u64))
        .unwrap_or(false)
}

/// Check that `[addr, addr + len)` lies inside a user image of `size` bytes.
pub fn range_within(addr: u64, len: usize, size: usize) -> bool {
    let Ok(start) = usize::try_from(addr) else {
        return false;
    };
    match start.checked_add(len) {
        Some(end) => end <= size,
        None => false,
    }
}
