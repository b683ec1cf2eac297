use std::collections::BTreeMap;

use crate::dwarf::stream::DwarfReader;
use crate::dwarf::DwarfError;

/// One `(name, form)` pair of an abbreviation declaration.
#[derive(Debug, Copy, Clone)]
pub struct AttrSpec {
    pub name: u64,
    pub form: u64,
}

/// One abbreviation: the shape shared by every DIE that cites its code.
#[derive(Debug, Clone)]
pub struct Abbrev {
    pub code: u64,
    pub tag: u64,
    pub has_children: bool,
    pub specs: Vec<AttrSpec>,
}

/// Per-compile-unit table mapping abbreviation code to [Abbrev].
#[derive(Debug, Default, Clone)]
pub struct AbbrevTable {
    abbrevs: BTreeMap<u64, Abbrev>,
}

impl AbbrevTable {
    /// Consume abbreviation declarations until the code-0 terminator.
    pub fn parse(r: &mut DwarfReader) -> Result<Self, DwarfError> {
        let mut abbrevs = BTreeMap::new();
        loop {
            let code = r.uleb128()?;
            if code == 0 {
                return Ok(Self { abbrevs });
            }
            let tag = r.uleb128()?;
            let has_children = r.u8()? != 0;
            let mut specs = Vec::new();
            loop {
                let name = r.uleb128()?;
                let form = r.uleb128()?;
                if name == 0 && form == 0 {
                    break;
                }
                specs.push(AttrSpec { name, form });
            }
            abbrevs.insert(
                code,
                Abbrev {
                    code,
                    tag,
                    has_children,
                    specs,
                },
            );
        }
    }

    pub fn get(&self, code: u64) -> Result<&Abbrev, DwarfError> {
        self.abbrevs
            .get(&code)
            .ok_or(DwarfError::UnknownAbbrevCode(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dwarf::consts::*;
    use crate::reader::MemReader;

    #[test]
    fn test_parse_table() {
        // code 1: compile_unit, children, name=DW_AT_NAME/string;
        // code 2: subprogram, no children, low_pc=addr.
        let bytes = vec![
            1,
            DW_TAG_COMPILE_UNIT as u8,
            1,
            DW_AT_NAME as u8,
            DW_FORM_STRING as u8,
            0,
            0,
            2,
            DW_TAG_SUBPROGRAM as u8,
            0,
            DW_AT_LOW_PC as u8,
            DW_FORM_ADDR as u8,
            0,
            0,
            0, // table terminator
        ];
        let io = MemReader::new("abbrev", bytes);
        let mut r = DwarfReader::new(&io, 0, 15);
        let table = AbbrevTable::parse(&mut r).unwrap();

        let cu = table.get(1).unwrap();
        assert_eq!(cu.tag, DW_TAG_COMPILE_UNIT);
        assert!(cu.has_children);
        assert_eq!(cu.specs.len(), 1);
        assert_eq!(cu.specs[0].name, DW_AT_NAME);

        let sub = table.get(2).unwrap();
        assert!(!sub.has_children);
        assert_eq!(sub.specs[0].form, DW_FORM_ADDR);

        assert!(matches!(
            table.get(3),
            Err(DwarfError::UnknownAbbrevCode(3))
        ));
    }
}
