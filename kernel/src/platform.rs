//! Platform Collaborators
//!
//! Interfaces the process subsystem consumes from the rest of the kernel:
//! interrupt control, the virtual-memory manager, the kernel stack
//! allocator, the file layer and the register-context swap. A concrete
//! kernel (or a host simulation) implements every trait once and hands the
//! value to [`Kernel::new`](crate::Kernel::new).

use crate::memory::{PteFlags, VmError};

/// Per-CPU interrupt control.
pub trait CpuOps: Send + Sync {
    /// Index of the executing CPU. Only meaningful with interrupts off.
    fn cpu_id(&self) -> usize;

    /// Whether interrupts are enabled on this CPU.
    fn interrupts_enabled(&self) -> bool;

    /// Enable interrupts on this CPU.
    fn enable_interrupts(&self);

    /// Disable interrupts on this CPU.
    fn disable_interrupts(&self);
}

/// Virtual-memory manager.
///
/// Address spaces are shared between the PCBs of a thread group, so every
/// operation takes `&Self::Space`; implementations own their locking.
pub trait VirtualMemory: Send + Sync {
    /// One set of user mappings plus the kernel half.
    type Space: Send + Sync;

    /// Create an address space holding only kernel mappings.
    fn create(&self) -> Result<Self::Space, VmError>;

    /// Load `image` at virtual address 0 of a fresh space (first process).
    fn init_user(&self, space: &Self::Space, image: &[u8]) -> Result<(), VmError>;

    /// Copy the first `size` bytes of user memory into a new space.
    fn duplicate(&self, space: &Self::Space, size: usize) -> Result<Self::Space, VmError>;

    /// Map pages so the user image grows from `old` to `new` bytes.
    /// Returns the new size.
    fn grow(&self, space: &Self::Space, old: usize, new: usize) -> Result<usize, VmError>;

    /// Unmap pages so the user image shrinks from `old` to `new` bytes.
    /// Returns the new size.
    fn shrink(&self, space: &Self::Space, old: usize, new: usize) -> Result<usize, VmError>;

    /// Free every user page and page table of `space`.
    fn destroy(&self, space: Self::Space);

    /// Make `space` the active user address space, with `kstack` as the
    /// stack used on the next trap from user mode.
    fn switch_user(&self, space: &Self::Space, kstack: &KernelStack);

    /// Switch to the kernel-only address space.
    fn switch_kernel(&self);

    /// Write `bytes` at user address `addr` of `space`.
    fn copy_out(&self, space: &Self::Space, addr: u64, bytes: &[u8]) -> Result<(), VmError>;

    /// Flags of the entry mapping `addr`, if there is one.
    fn page_flags(&self, space: &Self::Space, addr: u64) -> Option<PteFlags>;

    /// Set then clear flag bits on the entry mapping `addr`.
    fn update_flags(
        &self,
        space: &Self::Space,
        addr: u64,
        set: PteFlags,
        clear: PteFlags,
    ) -> Result<(), VmError>;
}

/// A kernel stack owned by exactly one PCB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelStack {
    /// Lowest address of the stack.
    pub base: u64,
    /// Size in bytes.
    pub size: usize,
}

/// Kernel stack allocator.
pub trait KernelStacks: Send + Sync {
    /// Allocate a stack, or `None` when memory is exhausted.
    fn alloc_stack(&self) -> Option<KernelStack>;

    /// Return a stack to the allocator.
    fn free_stack(&self, stack: KernelStack);
}

/// The file layer as seen by process creation and teardown.
///
/// `dup_*` run with the table lock held and must not block. `close_file`
/// and `put_inode` may block and are called without it.
pub trait FileSystem: Send + Sync {
    /// An open-file reference.
    type File: Send;
    /// An in-memory inode reference.
    type Inode: Send;

    /// Take another reference to an open file.
    fn dup_file(&self, file: &Self::File) -> Self::File;

    /// Drop one reference to an open file.
    fn close_file(&self, file: Self::File);

    /// Reference to the root directory.
    fn root(&self) -> Option<Self::Inode>;

    /// Take another reference to an inode.
    fn dup_inode(&self, inode: &Self::Inode) -> Self::Inode;

    /// Drop one reference to an inode.
    fn put_inode(&self, inode: Self::Inode);

    /// Initialization that must run in process context, once.
    fn first_process_init(&self) {}
}

/// Kernel register-context exchange.
pub trait ContextSwitch: Send + Sync {
    /// Callee-saved register state of a suspended kernel thread.
    type Context: Default + Send;

    /// A context that, when first switched to, runs on `kstack` and calls
    /// [`Kernel::fork_return`](crate::Kernel::fork_return) before returning
    /// to user mode through the PCB's trap frame.
    fn new_context(&self, kstack: &KernelStack) -> Self::Context;

    /// Save the running context into `save` and resume `load`.
    ///
    /// # Safety
    ///
    /// - `save` and `load` must point to live contexts
    /// - the caller must hold the table lock; the resumed side releases it
    unsafe fn switch(&self, save: *mut Self::Context, load: *const Self::Context);
}

/// Everything the process subsystem needs from its host.
pub trait Platform:
    CpuOps + VirtualMemory + KernelStacks + FileSystem + ContextSwitch + 'static
{
}

impl<T> Platform for T where
    T: CpuOps + VirtualMemory + KernelStacks + FileSystem + ContextSwitch + 'static
{
}
