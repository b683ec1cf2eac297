//! aarch64 DWARF register numbering: x0-x30 occupy columns 0-30 and the
//! stack pointer column 31. The PC has no DWARF number of its own; we carry
//! it in the reserved column 32 and restore it through the return-address
//! register (x30) like every unwinder does.

use super::Registers;

pub const UNW_ARM64_X29: usize = 29;
pub const UNW_ARM64_LR: usize = 30;
pub const UNW_ARM64_SP: usize = 31;
pub const UNW_ARM64_PC: usize = 32;

pub const DWARF_IP: usize = UNW_ARM64_PC;
pub const DWARF_SP: usize = UNW_ARM64_SP;

/// Whether a DWARF register number names a column this backend honors.
#[inline]
pub fn is_arch_register(n: usize) -> bool {
    n <= UNW_ARM64_PC
}

impl Registers {
    /// Initialize from a ptrace/core machine context.
    #[cfg(target_os = "linux")]
    pub fn from_user_regs(mctx: &libc::user_regs_struct) -> Self {
        let mut registers = Self::default();
        for (i, v) in mctx.regs.iter().enumerate() {
            registers[i] = *v;
        }
        registers[UNW_ARM64_SP] = mctx.sp;
        registers[UNW_ARM64_PC] = mctx.pc;
        registers
    }

    /// Initialize from the `ucontext` the kernel hands a signal handler.
    #[cfg(target_os = "linux")]
    pub fn from_ucontext(ucontext: *mut libc::c_void) -> Option<Self> {
        let ucontext = ucontext as *mut libc::ucontext_t;
        if ucontext.is_null() {
            return None;
        }
        let mcontext = unsafe { &(*ucontext).uc_mcontext };
        let mut registers = Self::default();
        for (i, v) in mcontext.regs.iter().enumerate() {
            registers[i] = *v;
        }
        registers[UNW_ARM64_SP] = mcontext.sp;
        registers[UNW_ARM64_PC] = mcontext.pc;
        Some(registers)
    }
}
