//! The CFI byte-code interpreter: "running" a CIE's and FDE's instructions
//! produces the frame table row describing one code address.

use crate::dwarf::consts::*;
use crate::dwarf::encoding::decode_pointer;
use crate::dwarf::frame::Cie;
use crate::dwarf::stream::DwarfReader;
use crate::dwarf::DwarfError;
use crate::reader::Reader;
use crate::registers::DWARF_MAX_REG;

/// Depth bound for the remember/restore stack.
const STATE_STACK_MAX: usize = 1024;

/// An uninterpreted expression: a byte range in the object's reader.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Block {
    pub offset: u64,
    pub length: u64,
}

/// How to recover one register of the caller's frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum RegisterUnwind {
    #[default]
    Undef,
    Same,
    /// Value lives in memory at CFA + offset.
    Offset(i64),
    /// Value is CFA + offset itself.
    ValOffset(i64),
    /// Value is the current value of another register.
    Register(u16),
    /// Evaluate, then load the value from the resulting address.
    Expression(Block),
    /// Evaluate; the result is the value.
    ValExpression(Block),
    /// Backend-defined; no backend defines any.
    Arch,
}

/// How to compute the canonical frame address.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum CfaRule {
    #[default]
    Undef,
    RegisterOffset {
        reg: u16,
        offset: i64,
    },
    Expression(Block),
}

/// One row of the frame table: a rule per register column plus the CFA
/// rule.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameRow {
    pub registers: [RegisterUnwind; DWARF_MAX_REG],
    pub cfa: CfaRule,
}

impl Default for FrameRow {
    fn default() -> Self {
        Self {
            registers: [RegisterUnwind::Undef; DWARF_MAX_REG],
            cfa: CfaRule::Undef,
        }
    }
}

fn check_register(reg: u64) -> Result<usize, DwarfError> {
    if reg as usize >= DWARF_MAX_REG {
        return Err(DwarfError::InvalidRegisterNumber(reg));
    }
    Ok(reg as usize)
}

/// Build the frame row for `want_addr` within the FDE starting at `iloc`.
///
/// The CIE's initial instructions are run first (from address zero, for
/// address zero) to establish the default row that `restore` opcodes refer
/// back to; the FDE's instructions then refine a copy of it.
pub fn execute(
    io: &dyn Reader,
    cie: &Cie,
    instructions: (u64, u64),
    iloc: u64,
    want_addr: u64,
    addr_size: u8,
    load_base: u64,
) -> Result<FrameRow, DwarfError> {
    let mut default_row = FrameRow::default();
    let initial = FrameRow::default();
    run(
        io, cie, cie.instructions, 0, 0, addr_size, load_base, &mut default_row, &initial,
    )?;
    let mut row = default_row;
    run(
        io,
        cie,
        instructions,
        iloc,
        want_addr,
        addr_size,
        load_base,
        &mut row,
        &default_row,
    )?;
    Ok(row)
}

#[allow(clippy::too_many_arguments)]
fn run(
    io: &dyn Reader,
    cie: &Cie,
    instructions: (u64, u64),
    mut addr: u64,
    want_addr: u64,
    addr_size: u8,
    load_base: u64,
    row: &mut FrameRow,
    default_row: &FrameRow,
) -> Result<(), DwarfError> {
    let mut r = DwarfReader::new(io, instructions.0, instructions.1 - instructions.0);
    r.addr_size = addr_size;
    let mut remembered: Vec<FrameRow> = Vec::new();

    // See DWARF spec section 6.4.2 for the opcode inventory.
    while !r.is_empty() && addr <= want_addr {
        let opcode = r.u8()?;
        let operand = opcode & 0x3f;
        match opcode & 0xc0 {
            DW_CFA_ADVANCE_LOC => {
                addr += operand as u64 * cie.code_align;
                continue;
            }
            DW_CFA_OFFSET => {
                let reg = check_register(operand as u64)?;
                let offset = r.uleb128()? as i64 * cie.data_align;
                row.registers[reg] = RegisterUnwind::Offset(offset);
                continue;
            }
            DW_CFA_RESTORE => {
                let reg = check_register(operand as u64)?;
                row.registers[reg] = default_row.registers[reg];
                continue;
            }
            _ => {}
        }
        match opcode {
            DW_CFA_NOP => {}
            DW_CFA_SET_LOC => {
                addr = decode_pointer(&mut r, cie.pointer_encoding, load_base)?;
            }
            DW_CFA_ADVANCE_LOC1 => {
                addr += r.u8()? as u64 * cie.code_align;
            }
            DW_CFA_ADVANCE_LOC2 => {
                addr += r.u16()? as u64 * cie.code_align;
            }
            DW_CFA_ADVANCE_LOC4 => {
                addr += r.u32()? as u64 * cie.code_align;
            }
            DW_CFA_OFFSET_EXTENDED => {
                let reg = check_register(r.uleb128()?)?;
                let offset = r.uleb128()? as i64 * cie.data_align;
                row.registers[reg] = RegisterUnwind::Offset(offset);
            }
            DW_CFA_OFFSET_EXTENDED_SF => {
                let reg = check_register(r.uleb128()?)?;
                let offset = r.sleb128()? * cie.data_align;
                row.registers[reg] = RegisterUnwind::Offset(offset);
            }
            DW_CFA_RESTORE_EXTENDED => {
                let reg = check_register(r.uleb128()?)?;
                row.registers[reg] = default_row.registers[reg];
            }
            DW_CFA_UNDEFINED => {
                let reg = check_register(r.uleb128()?)?;
                row.registers[reg] = RegisterUnwind::Undef;
            }
            DW_CFA_SAME_VALUE => {
                let reg = check_register(r.uleb128()?)?;
                row.registers[reg] = RegisterUnwind::Same;
            }
            DW_CFA_REGISTER => {
                let reg = check_register(r.uleb128()?)?;
                let from = check_register(r.uleb128()?)?;
                row.registers[reg] = RegisterUnwind::Register(from as u16);
            }
            DW_CFA_REMEMBER_STATE => {
                if remembered.len() >= STATE_STACK_MAX {
                    return Err(DwarfError::StateStackOverflow);
                }
                remembered.push(*row);
            }
            DW_CFA_RESTORE_STATE => {
                *row = remembered.pop().ok_or(DwarfError::NoRememberState)?;
            }
            DW_CFA_DEF_CFA => {
                let reg = check_register(r.uleb128()?)? as u16;
                let offset = r.uleb128()? as i64;
                row.cfa = CfaRule::RegisterOffset { reg, offset };
            }
            DW_CFA_DEF_CFA_SF => {
                let reg = check_register(r.uleb128()?)? as u16;
                let offset = r.sleb128()? * cie.data_align;
                row.cfa = CfaRule::RegisterOffset { reg, offset };
            }
            DW_CFA_DEF_CFA_REGISTER => {
                let reg = check_register(r.uleb128()?)? as u16;
                let offset = match row.cfa {
                    CfaRule::RegisterOffset { offset, .. } => offset,
                    _ => 0,
                };
                row.cfa = CfaRule::RegisterOffset { reg, offset };
            }
            DW_CFA_DEF_CFA_OFFSET => {
                let offset = r.uleb128()? as i64;
                let reg = match row.cfa {
                    CfaRule::RegisterOffset { reg, .. } => reg,
                    _ => 0,
                };
                row.cfa = CfaRule::RegisterOffset { reg, offset };
            }
            DW_CFA_DEF_CFA_OFFSET_SF => {
                let offset = r.sleb128()? * cie.data_align;
                let reg = match row.cfa {
                    CfaRule::RegisterOffset { reg, .. } => reg,
                    _ => 0,
                };
                row.cfa = CfaRule::RegisterOffset { reg, offset };
            }
            DW_CFA_DEF_CFA_EXPRESSION => {
                row.cfa = CfaRule::Expression(read_block(&mut r)?);
            }
            DW_CFA_EXPRESSION => {
                let reg = check_register(r.uleb128()?)?;
                row.registers[reg] = RegisterUnwind::Expression(read_block(&mut r)?);
            }
            DW_CFA_VAL_EXPRESSION => {
                let reg = check_register(r.uleb128()?)?;
                row.registers[reg] = RegisterUnwind::ValExpression(read_block(&mut r)?);
            }
            DW_CFA_VAL_OFFSET => {
                let reg = check_register(r.uleb128()?)?;
                let offset = r.uleb128()? as i64 * cie.data_align;
                row.registers[reg] = RegisterUnwind::ValOffset(offset);
            }
            DW_CFA_VAL_OFFSET_SF => {
                let reg = check_register(r.uleb128()?)?;
                let offset = r.sleb128()? * cie.data_align;
                row.registers[reg] = RegisterUnwind::ValOffset(offset);
            }
            DW_CFA_GNU_ARGS_SIZE => {
                let _ = r.uleb128()?;
            }
            DW_CFA_GNU_NEGATIVE_OFFSET_EXTENDED => {
                let reg = check_register(r.uleb128()?)?;
                let offset = r.uleb128()? as i64 * cie.data_align;
                row.registers[reg] = RegisterUnwind::Offset(-offset);
            }
            _ => return Err(DwarfError::InvalidInstruction(opcode)),
        }
    }
    Ok(())
}

fn read_block(r: &mut DwarfReader) -> Result<Block, DwarfError> {
    let length = r.uleb128()?;
    let offset = r.offset();
    r.skip(length)?;
    Ok(Block { offset, length })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dwarf::consts::*;
    use crate::dwarf::frame::Cie;
    use crate::reader::MemReader;

    /// A CIE whose initial instructions are the classic x86_64 prologue:
    /// `def_cfa rsp, 8; offset rip, 1` with data alignment -8.
    fn cie_with(initial: &[u8], fde: &[u8]) -> (MemReader, Cie, (u64, u64)) {
        let mut image = initial.to_vec();
        let fde_start = image.len() as u64;
        image.extend_from_slice(fde);
        let fde_end = image.len() as u64;
        let cie = Cie {
            offset: 0,
            version: 1,
            augmentation: String::new(),
            code_align: 1,
            data_align: -8,
            return_address_register: 16,
            pointer_encoding: DW_EH_PE_ABSPTR,
            lsda_encoding: DW_EH_PE_OMIT,
            personality: None,
            is_signal_frame: false,
            has_augmentation_data: false,
            instructions: (0, fde_start),
        };
        (
            MemReader::new("cfi", image),
            cie,
            (fde_start, fde_end),
        )
    }

    const PROLOGUE: &[u8] = &[DW_CFA_DEF_CFA, 7, 8, DW_CFA_OFFSET | 16, 1];

    fn execute_at(io: &MemReader, cie: &Cie, fde: (u64, u64), want: u64) -> FrameRow {
        execute(io, cie, fde, 0x401000, want, 8, 0).unwrap()
    }

    #[test]
    fn test_default_prologue_row() {
        let (io, cie, fde) = cie_with(PROLOGUE, &[DW_CFA_NOP, DW_CFA_NOP]);
        let row = execute_at(&io, &cie, fde, 0x401233);
        assert_eq!(row.cfa, CfaRule::RegisterOffset { reg: 7, offset: 8 });
        assert_eq!(row.registers[16], RegisterUnwind::Offset(-8));
        assert_eq!(row.registers[0], RegisterUnwind::Undef);
    }

    #[test]
    fn test_determinism() {
        let (io, cie, fde) = cie_with(
            PROLOGUE,
            &[
                DW_CFA_ADVANCE_LOC | 4,
                DW_CFA_DEF_CFA_OFFSET,
                16,
                DW_CFA_OFFSET | 6,
                2,
            ],
        );
        let first = execute_at(&io, &cie, fde, 0x401233);
        let second = execute_at(&io, &cie, fde, 0x401233);
        assert_eq!(first, second);
    }

    #[test]
    fn test_advance_loc_stops_at_target() {
        let fde_insns = [
            DW_CFA_DEF_CFA_OFFSET,
            16,
            DW_CFA_ADVANCE_LOC | 8,
            DW_CFA_DEF_CFA_OFFSET,
            24,
        ];
        let (io, cie, fde) = cie_with(PROLOGUE, &fde_insns);
        // Before the advance takes effect the offset is still 16.
        let row = execute_at(&io, &cie, fde, 0x401004);
        assert_eq!(row.cfa, CfaRule::RegisterOffset { reg: 7, offset: 16 });
        // At or past iloc+8 the second def_cfa_offset applies.
        let row = execute_at(&io, &cie, fde, 0x401008);
        assert_eq!(row.cfa, CfaRule::RegisterOffset { reg: 7, offset: 24 });
    }

    #[test]
    fn test_restore_refers_to_cie_row() {
        let fde_insns = [
            DW_CFA_OFFSET | 16,
            3,
            DW_CFA_ADVANCE_LOC | 4,
            DW_CFA_RESTORE | 16,
        ];
        let (io, cie, fde) = cie_with(PROLOGUE, &fde_insns);
        let row = execute_at(&io, &cie, fde, 0x401002);
        assert_eq!(row.registers[16], RegisterUnwind::Offset(-24));
        let row = execute_at(&io, &cie, fde, 0x401008);
        assert_eq!(row.registers[16], RegisterUnwind::Offset(-8));
    }

    #[test]
    fn test_remember_restore_state() {
        let fde_insns = [
            DW_CFA_REMEMBER_STATE,
            DW_CFA_DEF_CFA_OFFSET,
            0x20,
            DW_CFA_SAME_VALUE,
            6,
            DW_CFA_ADVANCE_LOC | 4,
            DW_CFA_RESTORE_STATE,
        ];
        let (io, cie, fde) = cie_with(PROLOGUE, &fde_insns);
        let row = execute_at(&io, &cie, fde, 0x401002);
        assert_eq!(row.cfa, CfaRule::RegisterOffset { reg: 7, offset: 0x20 });
        assert_eq!(row.registers[6], RegisterUnwind::Same);
        let row = execute_at(&io, &cie, fde, 0x401008);
        assert_eq!(row.cfa, CfaRule::RegisterOffset { reg: 7, offset: 8 });
        assert_eq!(row.registers[6], RegisterUnwind::Undef);
    }

    #[test]
    fn test_restore_state_without_remember() {
        let (io, cie, fde) = cie_with(PROLOGUE, &[DW_CFA_RESTORE_STATE]);
        let result = execute(&io, &cie, fde, 0x401000, 0x401010, 8, 0);
        assert!(matches!(result, Err(DwarfError::NoRememberState)));
    }

    #[test]
    fn test_expression_blocks_recorded() {
        // def_cfa_expression with a 3-byte block, then val_expression for
        // register 3 with a 1-byte block.
        let fde_insns = [
            DW_CFA_DEF_CFA_EXPRESSION,
            3,
            0x77,
            0x08,
            0x06,
            DW_CFA_VAL_EXPRESSION,
            3,
            1,
            0x30,
        ];
        let (io, cie, fde) = cie_with(PROLOGUE, &fde_insns);
        let row = execute_at(&io, &cie, fde, 0x401004);
        match row.cfa {
            CfaRule::Expression(block) => assert_eq!(block.length, 3),
            other => panic!("unexpected CFA rule {:?}", other),
        }
        match row.registers[3] {
            RegisterUnwind::ValExpression(block) => assert_eq!(block.length, 1),
            other => panic!("unexpected rule {:?}", other),
        }
    }

    #[test]
    fn test_invalid_instruction() {
        let (io, cie, fde) = cie_with(PROLOGUE, &[0x3d]);
        let result = execute(&io, &cie, fde, 0x401000, 0x401010, 8, 0);
        assert!(matches!(result, Err(DwarfError::InvalidInstruction(0x3d))));
    }

    #[test]
    fn test_bad_register_number() {
        let (io, cie, fde) = cie_with(PROLOGUE, &[DW_CFA_UNDEFINED, 0x81, 0x01]);
        let result = execute(&io, &cie, fde, 0x401000, 0x401010, 8, 0);
        assert!(matches!(
            result,
            Err(DwarfError::InvalidRegisterNumber(129))
        ));
    }
}
