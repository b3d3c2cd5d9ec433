//! Synchronization primitives.
//!
//! - **Spinlock**: interrupt-safe lock whose ownership follows the CPU
//! - **Channel**: opaque key a sleeping process waits on
//! - **sleep**: `sleep` / `wakeup` on top of the process table lock

pub mod sleep;
pub mod spinlock;

pub use spinlock::{IrqNesting, Spinlock, SpinlockGuard};

use core::num::NonZeroUsize;

/// What a sleeping process is waiting for.
///
/// Channels are derived from the address of the object being waited on,
/// so two distinct live objects never share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Channel(NonZeroUsize);

impl Channel {
    /// Channel named by the address of `object`.
    pub fn of<T: ?Sized>(object: &T) -> Self {
        let addr = object as *const T as *const () as usize;
        Channel(NonZeroUsize::new(addr).unwrap_or(NonZeroUsize::MIN))
    }

    /// Channel from a raw non-zero key.
    pub const fn from_raw(key: NonZeroUsize) -> Self {
        Channel(key)
    }

    /// The raw key.
    pub fn key(self) -> usize {
        self.0.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_identity() {
        let a = [0u8; 4];
        let b = [0u8; 4];
        assert_eq!(Channel::of(&a), Channel::of(&a));
        assert_ne!(Channel::of(&a), Channel::of(&b));
        assert_ne!(Channel::of(&a[0]), Channel::of(&a[1]));
        assert_ne!(Channel::of(&a).key(), 0);
    }

    #[test]
    fn test_raw_channel() {
        let key = NonZeroUsize::new(0x1000).unwrap();
        assert_eq!(Channel::from_raw(key).key(), 0x1000);
    }
}
