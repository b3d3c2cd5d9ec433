//! Process table snapshots.
//!
//! `getpinfo` fills a [`ProcStat`]: four arrays indexed by table slot,
//! laid out back to back as little-endian `i32`s.

use core::fmt;

/// Process table capacity - must match the kernel's `NPROC`.
pub const NPROC: usize = 64;

/// One snapshot of the kernel's process table.
#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(C)]
pub struct ProcStat {
    /// 1 if the slot holds a process.
    pub inuse: [i32; NPROC],
    /// Lottery tickets.
    pub tickets: [i32; NPROC],
    /// Process ID.
    pub pid: [i32; NPROC],
    /// Times scheduled.
    pub ticks: [i32; NPROC],
}

/// A used slot of a [`ProcStat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsEntry {
    /// Table slot.
    pub slot: usize,
    /// Process ID.
    pub pid: i32,
    /// Lottery tickets.
    pub tickets: i32,
    /// Times scheduled.
    pub ticks: i32,
}

impl ProcStat {
    /// Size of the snapshot as the kernel writes it.
    pub const ENCODED_LEN: usize = 4 * NPROC * 4;

    /// An all-empty snapshot.
    pub const fn new() -> Self {
        Self {
            inuse: [0; NPROC],
            tickets: [0; NPROC],
            pid: [0; NPROC],
            ticks: [0; NPROC],
        }
    }

    /// Decode the kernel's byte layout. `None` if `bytes` is too short.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::ENCODED_LEN {
            return None;
        }
        let mut stat = Self::new();
        let mut words = bytes
            .chunks_exact(4)
            .map(|w| i32::from_le_bytes([w[0], w[1], w[2], w[3]]));
        for column in [
            &mut stat.inuse,
            &mut stat.tickets,
            &mut stat.pid,
            &mut stat.ticks,
        ] {
            for value in column.iter_mut() {
                *value = words.next()?;
            }
        }
        Some(stat)
    }

    /// Used slots, in slot order.
    pub fn entries(&self) -> impl Iterator<Item = PsEntry> + '_ {
        (0..NPROC)
            .filter(|&slot| self.inuse[slot] != 0)
            .map(|slot| PsEntry {
                slot,
                pid: self.pid[slot],
                tickets: self.tickets[slot],
                ticks: self.ticks[slot],
            })
    }
}

impl Default for ProcStat {
    fn default() -> Self {
        Self::new()
    }
}

/// `ps`-style listing: a header, then one line per process.
impl fmt::Display for ProcStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PID\tTICKETS\tTICKS")?;
        for entry in self.entries() {
            writeln!(f, "{}\t{}\t{}", entry.pid, entry.tickets, entry.ticks)?;
        }
        Ok(())
    }
}
