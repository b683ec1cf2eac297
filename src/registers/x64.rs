//! x86_64 DWARF register numbering and its mapping onto the Linux
//! machine-context layout.
//!
//! The numbering follows the System V x86_64 psABI: rax, rdx, rcx, rbx,
//! rsi, rdi, rbp, rsp, then r8-r15, with the return address column at 16.

use super::Registers;

pub const UNW_X86_64_RAX: usize = 0;
pub const UNW_X86_64_RDX: usize = 1;
pub const UNW_X86_64_RCX: usize = 2;
pub const UNW_X86_64_RBX: usize = 3;
pub const UNW_X86_64_RSI: usize = 4;
pub const UNW_X86_64_RDI: usize = 5;
pub const UNW_X86_64_RBP: usize = 6;
pub const UNW_X86_64_RSP: usize = 7;
pub const UNW_X86_64_R8: usize = 8;
pub const UNW_X86_64_R9: usize = 9;
pub const UNW_X86_64_R10: usize = 10;
pub const UNW_X86_64_R11: usize = 11;
pub const UNW_X86_64_R12: usize = 12;
pub const UNW_X86_64_R13: usize = 13;
pub const UNW_X86_64_R14: usize = 14;
pub const UNW_X86_64_R15: usize = 15;
pub const UNW_X86_64_RIP: usize = 16;

/// Column holding the instruction pointer.
pub const DWARF_IP: usize = UNW_X86_64_RIP;

/// Column holding the stack pointer; restored from the CFA when no rule
/// says otherwise.
pub const DWARF_SP: usize = UNW_X86_64_RSP;

/// Whether a DWARF register number names a column this backend honors.
#[inline]
pub fn is_arch_register(n: usize) -> bool {
    n <= UNW_X86_64_RIP
}

impl Registers {
    /// Initialize from a ptrace/core machine context.
    #[cfg(target_os = "linux")]
    pub fn from_user_regs(mctx: &libc::user_regs_struct) -> Self {
        let mut registers = Self::default();
        registers[UNW_X86_64_RAX] = mctx.rax;
        registers[UNW_X86_64_RDX] = mctx.rdx;
        registers[UNW_X86_64_RCX] = mctx.rcx;
        registers[UNW_X86_64_RBX] = mctx.rbx;
        registers[UNW_X86_64_RSI] = mctx.rsi;
        registers[UNW_X86_64_RDI] = mctx.rdi;
        registers[UNW_X86_64_RBP] = mctx.rbp;
        registers[UNW_X86_64_RSP] = mctx.rsp;
        registers[UNW_X86_64_R8] = mctx.r8;
        registers[UNW_X86_64_R9] = mctx.r9;
        registers[UNW_X86_64_R10] = mctx.r10;
        registers[UNW_X86_64_R11] = mctx.r11;
        registers[UNW_X86_64_R12] = mctx.r12;
        registers[UNW_X86_64_R13] = mctx.r13;
        registers[UNW_X86_64_R14] = mctx.r14;
        registers[UNW_X86_64_R15] = mctx.r15;
        registers[UNW_X86_64_RIP] = mctx.rip;
        registers
    }

    /// Initialize from the `ucontext` the kernel hands a signal handler.
    #[cfg(target_os = "linux")]
    pub fn from_ucontext(ucontext: *mut libc::c_void) -> Option<Self> {
        let ucontext = ucontext as *mut libc::ucontext_t;
        if ucontext.is_null() {
            return None;
        }
        let mcontext = unsafe { (*ucontext).uc_mcontext };
        let mut registers = Self::default();
        registers[UNW_X86_64_RAX] = mcontext.gregs[libc::REG_RAX as usize] as u64;
        registers[UNW_X86_64_RDX] = mcontext.gregs[libc::REG_RDX as usize] as u64;
        registers[UNW_X86_64_RCX] = mcontext.gregs[libc::REG_RCX as usize] as u64;
        registers[UNW_X86_64_RBX] = mcontext.gregs[libc::REG_RBX as usize] as u64;
        registers[UNW_X86_64_RSI] = mcontext.gregs[libc::REG_RSI as usize] as u64;
        registers[UNW_X86_64_RDI] = mcontext.gregs[libc::REG_RDI as usize] as u64;
        registers[UNW_X86_64_RBP] = mcontext.gregs[libc::REG_RBP as usize] as u64;
        registers[UNW_X86_64_RSP] = mcontext.gregs[libc::REG_RSP as usize] as u64;
        registers[UNW_X86_64_R8] = mcontext.gregs[libc::REG_R8 as usize] as u64;
        registers[UNW_X86_64_R9] = mcontext.gregs[libc::REG_R9 as usize] as u64;
        registers[UNW_X86_64_R10] = mcontext.gregs[libc::REG_R10 as usize] as u64;
        registers[UNW_X86_64_R11] = mcontext.gregs[libc::REG_R11 as usize] as u64;
        registers[UNW_X86_64_R12] = mcontext.gregs[libc::REG_R12 as usize] as u64;
        registers[UNW_X86_64_R13] = mcontext.gregs[libc::REG_R13 as usize] as u64;
        registers[UNW_X86_64_R14] = mcontext.gregs[libc::REG_R14 as usize] as u64;
        registers[UNW_X86_64_R15] = mcontext.gregs[libc::REG_R15 as usize] as u64;
        registers[UNW_X86_64_RIP] = mcontext.gregs[libc::REG_RIP as usize] as u64;
        Some(registers)
    }
}
