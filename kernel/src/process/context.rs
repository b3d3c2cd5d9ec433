//! Process Trap Frame
//!
//! User register state saved on entry to the kernel and restored on the
//! way back out. System calls read their number and arguments here and
//! leave the return value in `rax`.

/// User code segment selector (0x18 + RPL 3).
pub const USER_CS: u64 = 0x1B;
/// User data/stack segment selector (0x20 + RPL 3).
pub const USER_DS: u64 = 0x23;
/// RFLAGS for user mode: IF set, reserved bit 1 set.
pub const USER_RFLAGS: u64 = 0x200 | 0x2;

/// User register frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct TrapFrame {
    // General purpose registers (callee-saved first)
    /// R15 register
    pub r15: u64,
    /// R14 register
    pub r14: u64,
    /// R13 register
    pub r13: u64,
    /// R12 register
    pub r12: u64,
    /// RBX register
    pub rbx: u64,
    /// RBP register (frame pointer)
    pub rbp: u64,

    // Caller-saved registers
    /// R11 register
    pub r11: u64,
    /// R10 register (fourth syscall argument)
    pub r10: u64,
    /// R9 register
    pub r9: u64,
    /// R8 register
    pub r8: u64,
    /// RDI register (first argument)
    pub rdi: u64,
    /// RSI register (second argument)
    pub rsi: u64,
    /// RDX register (third argument)
    pub rdx: u64,
    /// RCX register
    pub rcx: u64,
    /// RAX register (syscall number in, result out)
    pub rax: u64,

    // Interrupt frame
    /// Instruction pointer
    pub rip: u64,
    /// Code segment
    pub cs: u64,
    /// RFLAGS register
    pub rflags: u64,
    /// Stack pointer
    pub rsp: u64,
    /// Stack segment
    pub ss: u64,
}

impl TrapFrame {
    /// Frame for a first entry into user mode at `entry` with stack `rsp`.
    pub fn new_user(entry: u64, rsp: u64) -> Self {
        Self {
            rip: entry,
            rsp,
            cs: USER_CS,
            ss: USER_DS,
            rflags: USER_RFLAGS,
            ..Self::default()
        }
    }

    /// Get syscall number (from RAX)
    pub fn syscall_num(&self) -> u64 {
        self.rax
    }

    /// Get syscall arguments
    pub fn syscall_args(&self) -> [u64; 4] {
        [self.rdi, self.rsi, self.rdx, self.r10]
    }

    /// Set syscall return value
    pub fn set_return(&mut self, value: i64) {
        self.rax = value as u64;
    }
}
