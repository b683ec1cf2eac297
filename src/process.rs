//! The traced process: its loaded objects, a byte-addressable view of its
//! memory, and the one-step unwind that walks a register set from callee to
//! caller.

use std::sync::{Arc, OnceLock};

use smallvec::SmallVec;

use crate::dwarf::expression::{evaluate, EvalContext, EvalResult};
use crate::dwarf::frame::{Cie, Fde};
use crate::dwarf::instruction::{self, CfaRule, FrameRow, RegisterUnwind};
use crate::dwarf::{DwarfError, DwarfInfo};
use crate::elf::{ElfObject, PT_LOAD};
use crate::reader::Reader;
use crate::registers::{is_arch_register, Registers, DWARF_IP, DWARF_MAX_REG, DWARF_SP};

/// Knobs for the stack walker.
#[derive(Debug, Copy, Clone)]
pub struct TraceOptions {
    /// Upper bound on frames walked per thread.
    pub max_frames: usize,
    /// Resolve source file and line for each frame.
    pub resolve_source: bool,
    /// Resolve argument values of the enclosing function for each frame.
    pub resolve_args: bool,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            max_frames: 1024,
            resolve_source: true,
            resolve_args: false,
        }
    }
}

/// An ELF object mapped into the process at some load bias.
pub struct LoadedObject {
    pub bias: u64,
    pub elf: Arc<ElfObject>,
    dwarf: OnceLock<DwarfInfo>,
}

impl LoadedObject {
    /// The object's debug info, materialized on first use.
    pub fn dwarf(&self) -> &DwarfInfo {
        self.dwarf.get_or_init(|| DwarfInfo::new(self.elf.clone()))
    }
}

/// One successful unwind step.
pub struct UnwindStep {
    /// The canonical frame address of the frame just unwound.
    pub cfa: u64,
    /// Whether its FDE's CIE carries the signal-handler augmentation.
    pub signal_frame: bool,
    /// The caller's register set.
    pub registers: Registers,
}

/// A stopped process (or core dump): loaded objects plus a reader over its
/// address space. Object registration is fed by the attach collaborator;
/// memory is never written.
pub struct Process {
    memory: Arc<dyn Reader>,
    objects: SmallVec<[LoadedObject; 8]>,
    options: TraceOptions,
    sysent: u64,
}

impl Process {
    pub fn new(memory: Arc<dyn Reader>, options: TraceOptions) -> Self {
        Self {
            memory,
            objects: SmallVec::new(),
            options,
            sysent: 0,
        }
    }

    #[inline]
    pub fn options(&self) -> &TraceOptions {
        &self.options
    }

    #[inline]
    pub fn memory(&self) -> &Arc<dyn Reader> {
        &self.memory
    }

    /// The syscall entry stub address (AT_SYSINFO), if the attach
    /// collaborator found one.
    #[inline]
    pub fn sysent(&self) -> u64 {
        self.sysent
    }

    pub fn set_sysent(&mut self, addr: u64) {
        self.sysent = addr;
    }

    /// Register an object mapped at `bias`.
    pub fn add_object(&mut self, bias: u64, elf: Arc<ElfObject>) {
        log::debug!(
            "object {} loaded at address {:#x}, base={:#x}",
            elf.name(),
            bias,
            elf.base()
        );
        self.objects.push(LoadedObject {
            bias,
            elf,
            dwarf: OnceLock::new(),
        });
    }

    #[inline]
    pub fn objects(&self) -> &[LoadedObject] {
        &self.objects
    }

    /// The loaded object whose PT_LOAD segments cover `pc`.
    pub fn find_object(&self, pc: u64) -> Option<&LoadedObject> {
        for object in &self.objects {
            let objpc = pc.wrapping_sub(object.bias);
            for phdr in object.elf.segments(PT_LOAD) {
                if objpc >= phdr.p_vaddr && objpc < phdr.p_vaddr + phdr.p_memsz {
                    return Some(object);
                }
            }
        }
        None
    }

    /// Address of `symbol`, searching every object or only the one whose
    /// basename matches `object_name`.
    pub fn find_named_symbol(&self, object_name: Option<&str>, symbol: &str) -> Option<u64> {
        for object in &self.objects {
            if let Some(wanted) = object_name {
                let name = object.elf.name();
                let base = name.rsplit('/').next().unwrap_or(&name);
                if base != wanted {
                    continue;
                }
            }
            if let Some(sym) = object.elf.find_symbol_by_name(symbol) {
                return Some(sym.st_value + object.bias);
            }
            if object_name.is_some() {
                break;
            }
        }
        None
    }

    /// One unwind step: compute the frame row for the current PC, derive
    /// the CFA, and restore the caller's registers.
    ///
    /// `Ok(None)` is a lookup miss (no covering object or FDE), which ends
    /// a walk without being an error.
    pub fn unwind_step(&self, registers: &Registers) -> Result<Option<UnwindStep>, DwarfError> {
        let pc = registers.pc();
        let object = match self.find_object(pc) {
            Some(object) => object,
            None => return Ok(None),
        };
        let objpc = pc.wrapping_sub(object.bias);
        let dwarf = object.dwarf();

        // Prefer .debug_frame, fall back to .eh_frame.
        let found: Option<(&Fde, &Cie)> = dwarf
            .debug_frame()
            .and_then(|frame| frame.find_fde(objpc))
            .or_else(|| dwarf.eh_frame().and_then(|frame| frame.find_fde(objpc)));
        let (fde, cie) = match found {
            Some(found) => found,
            None => return Ok(None),
        };

        // The row one byte back describes the call site rather than the
        // return address.
        let io = object.elf.io().clone();
        let row = instruction::execute(
            io.as_ref(),
            cie,
            fde.instructions,
            fde.iloc,
            objpc.saturating_sub(1),
            8,
            object.elf.base(),
        )?;

        let cfa = self.compute_cfa(io.as_ref(), registers, &row)?;

        let mut new_registers = *registers;
        for n in 0..DWARF_MAX_REG {
            if !is_arch_register(n) {
                continue;
            }
            match row.registers[n] {
                // Both leave the caller's value where it already is.
                RegisterUnwind::Undef | RegisterUnwind::Same => {}
                RegisterUnwind::Offset(offset) => {
                    new_registers[n] = self.memory.read_u64(offset_from(cfa, offset))?;
                }
                RegisterUnwind::ValOffset(offset) => {
                    new_registers[n] = offset_from(cfa, offset);
                }
                RegisterUnwind::Register(from) => {
                    new_registers[n] = registers[from as usize];
                }
                RegisterUnwind::Expression(block) => {
                    let ctx = self.eval_context(registers, Some(cfa));
                    let addr = match evaluate(io.as_ref(), block, 8, &ctx, Some(cfa))? {
                        EvalResult::Value(addr) => addr,
                        EvalResult::Register(from) => registers[from as usize],
                    };
                    new_registers[n] = self.memory.read_u64(addr)?;
                }
                RegisterUnwind::ValExpression(block) => {
                    let ctx = self.eval_context(registers, Some(cfa));
                    new_registers[n] = match evaluate(io.as_ref(), block, 8, &ctx, Some(cfa))? {
                        EvalResult::Value(value) => value,
                        EvalResult::Register(from) => registers[from as usize],
                    };
                }
                RegisterUnwind::Arch => return Err(DwarfError::UnsupportedArchRule),
            }
        }

        // The CFA is the caller's stack pointer at the call site; restore
        // SP from it when no rule said otherwise.
        if row.registers[DWARF_SP] == RegisterUnwind::Undef {
            new_registers[DWARF_SP] = cfa;
        }

        let ra = cie.return_address_register as usize;
        if ra >= DWARF_MAX_REG {
            return Err(DwarfError::InvalidRegisterNumber(ra as u64));
        }
        new_registers[DWARF_IP] = new_registers[ra];

        Ok(Some(UnwindStep {
            cfa,
            signal_frame: cie.is_signal_frame,
            registers: new_registers,
        }))
    }

    fn compute_cfa(
        &self,
        io: &dyn Reader,
        registers: &Registers,
        row: &FrameRow,
    ) -> Result<u64, DwarfError> {
        match row.cfa {
            CfaRule::Undef => Err(DwarfError::NoCfaRule),
            CfaRule::RegisterOffset { reg, offset } => {
                Ok(offset_from(registers[reg as usize], offset))
            }
            CfaRule::Expression(block) => {
                // The CFA expression starts from an empty stack.
                let ctx = self.eval_context(registers, None);
                match evaluate(io, block, 8, &ctx, None)? {
                    EvalResult::Value(value) => Ok(value),
                    EvalResult::Register(from) => Ok(registers[from as usize]),
                }
            }
        }
    }

    pub(crate) fn eval_context<'a>(
        &'a self,
        registers: &'a Registers,
        cfa: Option<u64>,
    ) -> EvalContext<'a> {
        EvalContext {
            registers,
            memory: self.memory.as_ref(),
            cfa,
            frame_base: None,
        }
    }
}

#[inline]
fn offset_from(base: u64, offset: i64) -> u64 {
    base.wrapping_add(offset as u64)
}
