use crate::dwarf::consts::*;
use crate::dwarf::stream::DwarfReader;
use crate::dwarf::DwarfError;

/// Decode a pointer-encoded value from a frame section.
///
/// The low nibble of `enc` selects the value format, the high nibble the
/// base the value is relative to. Only absolute and pc-relative bases are
/// meaningful here; `load_base` is the module's load base, added to the
/// position of the encoded bytes for pc-relative values.
pub fn decode_pointer(r: &mut DwarfReader, enc: u8, load_base: u64) -> Result<u64, DwarfError> {
    if enc & DW_EH_PE_INDIRECT != 0 {
        return Err(DwarfError::UnsupportedPointerEncoding(enc));
    }

    let base = match enc & 0x70 {
        DW_EH_PE_ABSPTR => 0,
        DW_EH_PE_PCREL => r.offset() + load_base,
        _ => return Err(DwarfError::UnsupportedPointerEncoding(enc)),
    };

    let value = match enc & 0x0f {
        DW_EH_PE_ABSPTR => r.addr()?,
        DW_EH_PE_ULEB128 => r.uleb128()?,
        DW_EH_PE_UDATA2 => r.u16()? as u64,
        DW_EH_PE_UDATA4 => r.u32()? as u64,
        DW_EH_PE_UDATA8 => r.u64()?,
        DW_EH_PE_SLEB128 => r.sleb128()? as u64,
        DW_EH_PE_SDATA2 => r.int(2)? as u64,
        DW_EH_PE_SDATA4 => r.int(4)? as u64,
        DW_EH_PE_SDATA8 => r.int(8)? as u64,
        v => return Err(DwarfError::InvalidPointerEncoding(v)),
    };

    Ok(base.wrapping_add(value))
}
