use crate::dwarf::stream::DwarfReader;
use crate::dwarf::DwarfError;

/// One `.debug_aranges` set: the code ranges belonging to one compile unit.
#[derive(Debug)]
pub struct ArangeSet {
    pub debug_info_offset: u64,
    pub addr_size: u8,
    pub segdesc_size: u8,
    pub ranges: Vec<(u64, u64)>,
}

impl ArangeSet {
    /// Parse the set at the cursor, leaving the cursor at the next set.
    pub fn parse(r: &mut DwarfReader) -> Result<Self, DwarfError> {
        let start = r.offset();
        let length = r.initial_length()?;
        if length == 0 {
            return Err(DwarfError::ZeroLength(r.offset()));
        }
        let next = r.offset() + length;
        let _version = r.u16()?;
        let debug_info_offset = r.fmt_uint()?;
        let addr_size = r.u8()?;
        let segdesc_size = r.u8()?;

        // Tuples are aligned to twice the address size from the start of
        // the set.
        let tuple_size = addr_size as u64 * 2;
        let used = r.offset() - start;
        let align = (tuple_size - used % tuple_size) % tuple_size;
        r.skip(align)?;

        let mut ranges = Vec::new();
        while r.offset() < next {
            let begin = r.uint(addr_size)?;
            let size = r.uint(addr_size)?;
            if begin == 0 && size == 0 {
                break;
            }
            ranges.push((begin, size));
        }
        r.set_offset(next);
        Ok(Self {
            debug_info_offset,
            addr_size,
            segdesc_size,
            ranges,
        })
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.ranges
            .iter()
            .any(|&(start, len)| start <= addr && addr < start + len)
    }
}

/// Linear scan across all sets: the `.debug_info` offset of the first unit
/// whose ranges cover `addr`.
pub fn unit_offset_for_addr(sets: &[ArangeSet], addr: u64) -> Option<u64> {
    sets.iter()
        .find(|set| set.contains(addr))
        .map(|set| set.debug_info_offset)
}
