//! Page write protection
//!
//! `mprotect` clears and `munprotect` restores the write bit of a run of
//! user pages. Arguments are checked and every page in the run must be a
//! mapped user page before the first entry changes, so a call either
//! applies to the whole range or to none of it.

use super::{is_page_aligned, range_within, PteFlags};
use crate::config::PAGE_SIZE;
use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::process::ProcessError;

/// Direction of a protection change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Clear the write bit.
    ReadOnly,
    /// Set the write bit.
    ReadWrite,
}

impl<P: Platform> Kernel<P> {
    /// Make `pages` pages starting at `addr` read-only.
    pub fn mprotect(&self, addr: u64, pages: i32) -> Result<(), ProcessError> {
        self.set_access(addr, pages, Access::ReadOnly)
    }

    /// Make `pages` pages starting at `addr` writable again.
    pub fn munprotect(&self, addr: u64, pages: i32) -> Result<(), ProcessError> {
        self.set_access(addr, pages, Access::ReadWrite)
    }

    /// Apply `access` to a page-aligned run of the running process's pages.
    pub fn set_access(&self, addr: u64, pages: i32, access: Access) -> Result<(), ProcessError> {
        if !is_page_aligned(addr) {
            return Err(ProcessError::InvalidArgument("address not page aligned"));
        }
        if pages <= 0 {
            return Err(ProcessError::InvalidArgument("page count must be positive"));
        }
        let len = (pages.unsigned_abs() as usize)
            .checked_mul(PAGE_SIZE)
            .ok_or(ProcessError::BadAddress)?;

        let me = self.current();
        let table = self.lock_table();
        let p = &table[me];
        if !range_within(addr, len, p.size) {
            return Err(ProcessError::BadAddress);
        }
        let Some(space) = p.space.as_deref() else {
            return Err(ProcessError::BadAddress);
        };

        let page_addrs = (0..len).step_by(PAGE_SIZE).map(|offset| addr + offset as u64);
        for page in page_addrs.clone() {
            match self.platform.page_flags(space, page) {
                Some(flags) if flags.is_user_page() => {}
                _ => return Err(ProcessError::BadAddress),
            }
        }

        let (set, clear) = match access {
            Access::ReadOnly => (PteFlags::empty(), PteFlags::WRITABLE),
            Access::ReadWrite => (PteFlags::WRITABLE, PteFlags::empty()),
        };
        for page in page_addrs {
            self.platform.update_flags(space, page, set, clear)?;
        }

        // Reload the address space so stale TLB entries go away.
        if let Some(kstack) = p.kstack.as_ref() {
            self.platform.switch_user(space, kstack);
        }
        log::debug!("[proc] pid {} {:?} {:#x} x{}", p.pid, access, addr, pages);
        Ok(())
    }
}
