//! The stack walker: iterate the one-step unwind into a bounded frame list
//! and annotate each frame with the best symbols available.

use smallvec::SmallVec;

use crate::dwarf::consts::{DW_AT_FRAME_BASE, DW_AT_LOCATION, DW_AT_NAME, DW_TAG_FORMAL_PARAMETER};
use crate::dwarf::expression::{evaluate, EvalResult};
use crate::dwarf::info::{AttrValue, Die, Unit};
use crate::dwarf::DwarfInfo;
use crate::elf::STT_FUNC;
use crate::process::{LoadedObject, Process};
use crate::registers::Registers;

/// One thread to walk, as supplied by the thread-enumeration collaborator.
#[derive(Debug, Copy, Clone)]
pub struct Thread {
    pub id: u64,
    pub kind: u32,
    pub registers: Registers,
}

/// The walked stack of one thread.
#[derive(Debug)]
pub struct ThreadStack {
    pub id: u64,
    pub kind: u32,
    pub frames: SmallVec<[Frame; 16]>,
}

/// One activation record.
#[derive(Debug)]
pub struct Frame {
    pub ip: u64,
    /// Canonical frame address, when the frame row yielded one.
    pub cfa: Option<u64>,
    pub signal_frame: bool,
    pub symbol: Option<FrameSymbol>,
}

/// Best-effort symbolic annotation of a frame.
#[derive(Debug)]
pub struct FrameSymbol {
    /// The object the address fell in.
    pub object: String,
    pub function: Option<String>,
    /// Offset of the address into the function.
    pub offset: u64,
    pub source: Option<(String, u64)>,
    pub args: Vec<FrameArg>,
}

#[derive(Debug)]
pub struct FrameArg {
    pub name: String,
    pub value: ArgValue,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArgValue {
    /// The word at the argument's memory location.
    Word(u64),
    /// The argument lives in a register.
    InRegister(u16),
    Unavailable,
}

/// Steps a register set frame by frame through a process image.
pub struct UnwindCursor<'a> {
    process: &'a Process,
}

impl<'a> UnwindCursor<'a> {
    pub fn new(process: &'a Process) -> Self {
        Self { process }
    }

    /// Attempt to restore the parent function's register state. Returns
    /// `false` once no caller can be recovered: a null PC, or an address
    /// nothing covers.
    pub fn step(&mut self, registers: &mut Registers) -> crate::Result<bool> {
        if registers.pc() == 0 {
            return Ok(false);
        }
        match self.process.unwind_step(registers)? {
            Some(step) => {
                *registers = step.registers;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Process {
    /// Walk and symbolize one stack per supplied thread.
    pub fn trace<I>(&self, threads: I) -> Vec<ThreadStack>
    where
        I: IntoIterator<Item = Thread>,
    {
        threads
            .into_iter()
            .map(|thread| ThreadStack {
                id: thread.id,
                kind: thread.kind,
                frames: self.walk(thread.registers),
            })
            .collect()
    }

    /// Walk one thread's stack up to the configured frame cap.
    pub fn walk(&self, mut registers: Registers) -> SmallVec<[Frame; 16]> {
        let mut frames = SmallVec::new();
        for _ in 0..self.options().max_frames {
            let ip = registers.pc();
            if ip == 0 {
                break;
            }
            match self.unwind_step(&registers) {
                Ok(Some(step)) => {
                    frames.push(self.make_frame(ip, Some(step.cfa), step.signal_frame, &registers));
                    registers = step.registers;
                }
                Ok(None) => {
                    frames.push(self.make_frame(ip, None, false, &registers));
                    break;
                }
                Err(e) => {
                    log::warn!("exception unwinding stack: {}", e);
                    frames.push(self.make_frame(ip, None, false, &registers));
                    break;
                }
            }
        }
        frames
    }

    fn make_frame(
        &self,
        ip: u64,
        cfa: Option<u64>,
        signal_frame: bool,
        registers: &Registers,
    ) -> Frame {
        Frame {
            ip,
            cfa,
            signal_frame,
            symbol: self.symbolize(ip, cfa, registers),
        }
    }

    /// Best-effort symbolization of one frame: subprogram DIE first, ELF
    /// symbol table second, line matrix for the source position.
    fn symbolize(&self, ip: u64, cfa: Option<u64>, registers: &Registers) -> Option<FrameSymbol> {
        if self.sysent() != 0 && ip == self.sysent() {
            return Some(FrameSymbol {
                object: String::new(),
                function: Some("(syscall)".to_string()),
                offset: 0,
                source: None,
                args: Vec::new(),
            });
        }

        let object = self.find_object(ip)?;
        let objpc = ip.wrapping_sub(object.bias);
        // Look one byte back so a return address attributes to the call
        // site rather than whatever follows it.
        let lookup = objpc.saturating_sub(1);
        let dwarf = object.dwarf();

        let mut symbol = FrameSymbol {
            object: object.elf.name(),
            function: None,
            offset: 0,
            source: None,
            args: Vec::new(),
        };

        if let Some(unit) = dwarf.unit_for_addr(lookup) {
            if let Some(die) = unit.function_at(lookup) {
                symbol.function = die.attr(DW_AT_NAME).and_then(|v| dwarf.attr_string(v));
                if let Some((low, _)) = die.pc_range() {
                    symbol.offset = objpc - low;
                }
                if self.options().resolve_args {
                    symbol.args = self.resolve_args(object, dwarf, unit, die, cfa, registers);
                }
            }
        }

        if symbol.function.is_none() {
            if let Some((sym, name)) = object.elf.find_symbol_by_address(lookup, STT_FUNC) {
                symbol.function = Some(name);
                symbol.offset = objpc - sym.st_value;
            }
        }

        if self.options().resolve_source {
            symbol.source = dwarf.source_from_addr(lookup);
        }
        Some(symbol)
    }

    /// Evaluate the locations of a subprogram's formal parameters against
    /// this frame's registers and CFA.
    fn resolve_args(
        &self,
        object: &LoadedObject,
        dwarf: &DwarfInfo,
        unit: &Unit,
        function: &Die,
        cfa: Option<u64>,
        registers: &Registers,
    ) -> Vec<FrameArg> {
        let io = object.elf.io();
        let frame_base = function
            .attr(DW_AT_FRAME_BASE)
            .and_then(|value| match value {
                AttrValue::Block { offset, length } => {
                    let block = crate::dwarf::instruction::Block {
                        offset: *offset,
                        length: *length,
                    };
                    let ctx = self.eval_context(registers, cfa);
                    match evaluate(io.as_ref(), block, unit.addr_size, &ctx, None) {
                        Ok(EvalResult::Value(v)) => Some(v),
                        Ok(EvalResult::Register(r)) => Some(registers[r as usize]),
                        Err(e) => {
                            log::debug!("can't evaluate frame base: {}", e);
                            None
                        }
                    }
                }
                _ => None,
            });

        let mut args = Vec::new();
        for &child in &function.children {
            let die = &unit.dies()[child];
            if die.tag != DW_TAG_FORMAL_PARAMETER {
                continue;
            }
            let name = die
                .attr(DW_AT_NAME)
                .and_then(|v| dwarf.attr_string(v))
                .unwrap_or_else(|| "?".to_string());
            let value = match die.attr(DW_AT_LOCATION) {
                Some(AttrValue::Block { offset, length }) => {
                    let block = crate::dwarf::instruction::Block {
                        offset: *offset,
                        length: *length,
                    };
                    let mut ctx = self.eval_context(registers, cfa);
                    ctx.frame_base = frame_base;
                    match evaluate(io.as_ref(), block, unit.addr_size, &ctx, None) {
                        Ok(EvalResult::Register(r)) => ArgValue::InRegister(r),
                        Ok(EvalResult::Value(addr)) => match self.memory().read_u64(addr) {
                            Ok(word) => ArgValue::Word(word),
                            Err(_) => ArgValue::Unavailable,
                        },
                        Err(_) => ArgValue::Unavailable,
                    }
                }
                _ => ArgValue::Unavailable,
            };
            args.push(FrameArg { name, value });
        }
        args
    }
}

#[cfg(test)]
#[cfg(target_arch = "x86_64")]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dwarf::consts::*;
    use crate::dwarf::frame::tests::build_eh_frame;
    use crate::elf::tests::ElfBuilder;
    use crate::elf::{ElfObject, Phdr, PT_LOAD};
    use crate::process::TraceOptions;
    use crate::reader::{MemReader, SparseMem};
    use crate::registers::{DWARF_IP, DWARF_SP};

    fn uleb(out: &mut Vec<u8>, v: u64) {
        leb128::write::unsigned(out, v).unwrap();
    }

    /// An executable whose debug info describes main(argc) over the whole
    /// text range: frame base is the CFA, argc lives at frame base - 16.
    fn sample_process() -> Process {
        let mut abbrev = Vec::new();
        uleb(&mut abbrev, 1);
        uleb(&mut abbrev, DW_TAG_COMPILE_UNIT);
        abbrev.push(1);
        for (at, form) in [(DW_AT_NAME, DW_FORM_STRING)] {
            uleb(&mut abbrev, at);
            uleb(&mut abbrev, form);
        }
        abbrev.extend_from_slice(&[0, 0]);
        uleb(&mut abbrev, 2);
        uleb(&mut abbrev, DW_TAG_SUBPROGRAM);
        abbrev.push(1);
        for (at, form) in [
            (DW_AT_NAME, DW_FORM_STRING),
            (DW_AT_LOW_PC, DW_FORM_ADDR),
            (DW_AT_HIGH_PC, DW_FORM_ADDR),
            (DW_AT_FRAME_BASE, DW_FORM_BLOCK1),
        ] {
            uleb(&mut abbrev, at);
            uleb(&mut abbrev, form);
        }
        abbrev.extend_from_slice(&[0, 0]);
        uleb(&mut abbrev, 3);
        uleb(&mut abbrev, DW_TAG_FORMAL_PARAMETER);
        abbrev.push(0);
        for (at, form) in [
            (DW_AT_NAME, DW_FORM_STRING),
            (DW_AT_LOCATION, DW_FORM_BLOCK1),
        ] {
            uleb(&mut abbrev, at);
            uleb(&mut abbrev, form);
        }
        abbrev.extend_from_slice(&[0, 0]);
        abbrev.push(0);

        let mut body = Vec::new();
        body.extend_from_slice(&2u16.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes());
        body.push(8);
        uleb(&mut body, 1);
        body.extend_from_slice(b"a.c\0");
        uleb(&mut body, 2);
        body.extend_from_slice(b"main\0");
        body.extend_from_slice(&0x401000u64.to_le_bytes());
        body.extend_from_slice(&0x402000u64.to_le_bytes());
        body.extend_from_slice(&[1, 0x9c]); // frame base: DW_OP_call_frame_cfa
        uleb(&mut body, 3);
        body.extend_from_slice(b"argc\0");
        body.extend_from_slice(&[2, 0x91, 0x70]); // location: DW_OP_fbreg -16
        body.push(0); // end of subprogram children
        body.push(0); // end of compile unit children
        let mut debug_info = Vec::new();
        debug_info.extend_from_slice(&(body.len() as u32).to_le_bytes());
        debug_info.extend_from_slice(&body);

        let mut b = ElfBuilder::new();
        b.phdr(Phdr {
            p_type: PT_LOAD,
            p_flags: 5,
            p_offset: 0,
            p_vaddr: 0x400000,
            p_filesz: 0x2000,
            p_memsz: 0x2000,
        });
        b.section(".text", &[0x90; 32], 0x401000);
        b.section(".eh_frame", &build_eh_frame(&[(0x401000, 0x1000, vec![])]), 0);
        b.section(".debug_info", &debug_info, 0);
        b.section(".debug_abbrev", &abbrev, 0);
        let image = b.build();
        let elf = ElfObject::parse(Arc::new(MemReader::new("exe", image))).unwrap();

        // Saved return address at 0x7fffdff8, argc word at CFA - 16.
        let memory = SparseMem {
            regions: vec![
                (0x7fffdff8, 0x402100u64.to_le_bytes().to_vec()),
                (0x7fffdff0, 0x2au64.to_le_bytes().to_vec()),
            ],
        };
        let mut process = Process::new(
            Arc::new(memory),
            TraceOptions {
                resolve_args: true,
                ..TraceOptions::default()
            },
        );
        process.add_object(0, elf);
        process
    }

    fn initial_registers() -> Registers {
        let mut registers = Registers::default();
        registers[DWARF_SP] = 0x7fffdff8;
        registers[DWARF_IP] = 0x401234;
        registers
    }

    #[test]
    fn test_frame_symbolized_from_die() {
        let process = sample_process();
        let frames = process.walk(initial_registers());
        let symbol = frames[0].symbol.as_ref().unwrap();
        assert_eq!(symbol.function.as_deref(), Some("main"));
        assert_eq!(symbol.offset, 0x234);
    }

    #[test]
    fn test_argument_values_resolved() {
        let process = sample_process();
        let frames = process.walk(initial_registers());
        let symbol = frames[0].symbol.as_ref().unwrap();
        assert_eq!(symbol.args.len(), 1);
        assert_eq!(symbol.args[0].name, "argc");
        assert_eq!(symbol.args[0].value, ArgValue::Word(0x2a));
    }

    #[test]
    fn test_signal_frame_flag_propagates() {
        let process = sample_process();
        let frames = process.walk(initial_registers());
        assert!(!frames[0].signal_frame);
    }
}
