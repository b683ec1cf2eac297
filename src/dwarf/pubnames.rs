use crate::dwarf::stream::DwarfReader;
use crate::dwarf::DwarfError;

/// One name from a `.debug_pubnames` set: the `.debug_info` offset of a
/// global DIE, relative to its unit header.
#[derive(Debug)]
pub struct Pubname {
    pub die_offset: u64,
    pub name: String,
}

/// One `.debug_pubnames` set, covering a single compile unit.
#[derive(Debug)]
pub struct PubnameUnit {
    pub unit_offset: u64,
    pub names: Vec<Pubname>,
}

impl PubnameUnit {
    pub fn parse(r: &mut DwarfReader) -> Result<Self, DwarfError> {
        let length = r.initial_length()?;
        if length == 0 {
            return Err(DwarfError::ZeroLength(r.offset()));
        }
        let next = r.offset() + length;
        let _version = r.u16()?;
        let unit_offset = r.fmt_uint()?;
        let _unit_length = r.fmt_uint()?;
        let mut names = Vec::new();
        while r.offset() < next {
            let die_offset = r.fmt_uint()?;
            if die_offset == 0 {
                break;
            }
            names.push(Pubname {
                die_offset,
                name: r.string()?,
            });
        }
        r.set_offset(next);
        Ok(Self { unit_offset, names })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::MemReader;

    #[test]
    fn test_parse_set() {
        let mut body = Vec::new();
        body.extend_from_slice(&2u16.to_le_bytes()); // version
        body.extend_from_slice(&0x40u32.to_le_bytes()); // unit offset
        body.extend_from_slice(&0x100u32.to_le_bytes()); // unit length
        body.extend_from_slice(&0x0bu32.to_le_bytes());
        body.extend_from_slice(b"main\0");
        body.extend_from_slice(&0x2fu32.to_le_bytes());
        body.extend_from_slice(b"helper\0");
        body.extend_from_slice(&0u32.to_le_bytes()); // terminator
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&body);

        let io = MemReader::new("pubnames", bytes.clone());
        let mut r = DwarfReader::new(&io, 0, bytes.len() as u64);
        let set = PubnameUnit::parse(&mut r).unwrap();
        assert_eq!(set.unit_offset, 0x40);
        assert_eq!(set.names.len(), 2);
        assert_eq!(set.names[1].name, "helper");
        assert_eq!(set.names[1].die_offset, 0x2f);
        assert!(r.is_empty());
    }
}
