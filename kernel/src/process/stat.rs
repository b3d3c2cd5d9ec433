//! Ticket accounting and process introspection.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use super::manager::ProcessError;
use super::table::{Pid, ProcState};
use crate::config::NPROC;
use crate::kernel::Kernel;
use crate::platform::Platform;

/// Point-in-time view of the whole table, one column per slot.
///
/// The user-visible layout is four consecutive `[i32; NPROC]` arrays in
/// field order, little-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(C)]
pub struct ProcStat {
    /// 1 if the slot holds a process
    pub inuse: [i32; NPROC],
    /// Ticket weight
    pub tickets: [i32; NPROC],
    /// Process ID
    pub pid: [i32; NPROC],
    /// Times scheduled
    pub ticks: [i32; NPROC],
}

impl ProcStat {
    /// Size of the encoded snapshot.
    pub const ENCODED_LEN: usize = 4 * NPROC * core::mem::size_of::<i32>();

    /// All slots unused.
    pub const fn empty() -> Self {
        Self {
            inuse: [0; NPROC],
            tickets: [0; NPROC],
            pid: [0; NPROC],
            ticks: [0; NPROC],
        }
    }

    /// Encode in the user-visible layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::ENCODED_LEN);
        for column in [&self.inuse, &self.tickets, &self.pid, &self.ticks] {
            for value in column.iter() {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        out
    }
}

impl Default for ProcStat {
    fn default() -> Self {
        Self::empty()
    }
}

/// One line of `procdump`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcSummary {
    /// Process ID
    pub pid: Pid,
    /// Lifecycle state
    pub state: ProcState,
    /// Display name
    pub name: String,
    /// Ticket weight
    pub tickets: u32,
    /// Times scheduled
    pub ticks: u64,
}

impl fmt::Display for ProcSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} tickets={} ticks={}",
            self.pid,
            self.state.label(),
            self.name,
            self.tickets,
            self.ticks
        )
    }
}

fn clamp_i32(value: u64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

impl<P: Platform> Kernel<P> {
    /// Set the running process's ticket weight.
    pub fn settickets(&self, tickets: i32) -> Result<(), ProcessError> {
        if tickets <= 0 {
            return Err(ProcessError::InvalidArgument("tickets must be positive"));
        }
        let me = self.current();
        let mut table = self.lock_table();
        table[me].tickets = tickets.unsigned_abs();
        log::trace!("[proc] pid {} holds {} tickets", table[me].pid, tickets);
        Ok(())
    }

    /// Snapshot of every slot, taken under the table lock.
    pub fn getpinfo(&self) -> ProcStat {
        let table = self.lock_table();
        let mut stat = ProcStat::empty();
        for (slot, p) in table.iter().enumerate() {
            if !p.is_used() {
                continue;
            }
            stat.inuse[slot] = 1;
            stat.tickets[slot] = clamp_i32(u64::from(p.tickets));
            stat.pid[slot] = clamp_i32(u64::from(p.pid.0));
            stat.ticks[slot] = clamp_i32(p.ticks);
        }
        stat
    }

    /// List every live process and log it at info level.
    pub fn procdump(&self) -> Vec<ProcSummary> {
        let lines: Vec<ProcSummary> = {
            let table = self.lock_table();
            table
                .iter()
                .filter(|p| p.is_used())
                .map(|p| ProcSummary {
                    pid: p.pid,
                    state: p.state,
                    name: p.name.clone(),
                    tickets: p.tickets,
                    ticks: p.ticks,
                })
                .collect()
        };
        for line in &lines {
            log::info!("[proc] {}", line);
        }
        lines
    }
}
