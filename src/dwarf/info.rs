//! Compile units and their Debugging Information Entries, parsed lazily from
//! `.debug_info` with shapes supplied by `.debug_abbrev`.

use std::collections::BTreeMap;

use crate::dwarf::abbrev::AbbrevTable;
use crate::dwarf::consts::*;
use crate::dwarf::line::LineProgram;
use crate::dwarf::stream::DwarfReader;
use crate::dwarf::{DwarfError, DwarfSections};

/// A raw attribute value, tagged by the shape its form decodes to. The form
/// class is preserved so consumers can insist on the class they expect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Addr(u64),
    Udata(u64),
    Sdata(i64),
    /// Offset into the debug string table.
    Strp(u64),
    /// Inline NUL-terminated string.
    String(String),
    /// Uninterpreted bytes, recorded by position rather than copied.
    /// The offset is absolute within the object's reader.
    Block { offset: u64, length: u64 },
    Flag(bool),
    /// Reference to another DIE, normalized to a `.debug_info` offset.
    Ref(u64),
}

impl AttrValue {
    /// Constant-class accessor: accepts `data1/2/4/8`, `udata` and `sdata`
    /// uniformly and refuses every other form.
    pub fn as_udata(&self) -> Result<u64, DwarfError> {
        match self {
            AttrValue::Udata(v) => Ok(*v),
            AttrValue::Sdata(v) => Ok(*v as u64),
            _ => Err(DwarfError::NotAConstant),
        }
    }
}

/// One Debugging Information Entry: a tag and an attribute bag, with
/// children linked by index into the owning unit's DIE table.
#[derive(Debug, Clone)]
pub struct Die {
    pub tag: u64,
    /// Offset of this DIE within `.debug_info`.
    pub offset: u64,
    attrs: Vec<(u64, AttrValue)>,
    pub children: Vec<usize>,
}

impl Die {
    pub fn attr(&self, name: u64) -> Option<&AttrValue> {
        self.attrs
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    /// The `[low_pc, high_pc)` range of a subprogram. The high bound accepts
    /// both an address form and the constant-offset form newer compilers
    /// emit.
    pub fn pc_range(&self) -> Option<(u64, u64)> {
        let low = match self.attr(DW_AT_LOW_PC)? {
            AttrValue::Addr(a) => *a,
            _ => return None,
        };
        let high = match self.attr(DW_AT_HIGH_PC)? {
            AttrValue::Addr(a) => *a,
            v => low + v.as_udata().ok()?,
        };
        Some((low, high))
    }
}

/// One compile unit: header, abbreviation table, DIE tree and, when the
/// unit names one, its line matrix.
pub struct Unit {
    /// Offset of the unit header within `.debug_info`.
    pub offset: u64,
    pub version: u16,
    pub addr_size: u8,
    pub format: u8,
    dies: Vec<Die>,
    by_offset: BTreeMap<u64, usize>,
    pub root: Option<usize>,
    pub lines: Option<LineProgram>,
}

impl Unit {
    /// Parse the unit at the cursor, leaving the cursor at the next unit.
    pub fn parse(r: &mut DwarfReader, sections: &DwarfSections) -> Result<Self, DwarfError> {
        let info_start = sections.info.offset;
        let unit_offset = r.offset() - info_start;
        let length = r.initial_length()?;
        if length == 0 {
            return Err(DwarfError::ZeroLength(r.offset()));
        }
        let next = r.offset() + length;
        let version = r.u16()?;
        if !(2..=4).contains(&version) {
            return Err(DwarfError::UnsupportedVersion(version));
        }
        let abbrev_offset = r.fmt_uint()?;
        let addr_size = r.u8()?;
        r.addr_size = addr_size;

        let abbrev_section = sections
            .abbrev
            .ok_or(DwarfError::MissingSection(".debug_abbrev"))?;
        let mut abbrev_reader = r.narrow(
            abbrev_section.offset + abbrev_offset,
            abbrev_section.size.saturating_sub(abbrev_offset),
        );
        let abbrevs = AbbrevTable::parse(&mut abbrev_reader)?;

        let mut unit = Self {
            offset: unit_offset,
            version,
            addr_size,
            format: r.format,
            dies: Vec::new(),
            by_offset: BTreeMap::new(),
            root: None,
            lines: None,
        };

        let mut entries = r.narrow(r.offset(), next - r.offset());
        let mut top = Vec::new();
        unit.parse_die_list(&mut entries, &abbrevs, info_start, &mut top)?;
        unit.root = top
            .iter()
            .copied()
            .find(|&i| unit.dies[i].tag == DW_TAG_COMPILE_UNIT);
        r.set_offset(next);

        // The line matrix for this unit lives where the root DIE points.
        let stmt_list = unit
            .root_die()
            .and_then(|root| root.attr(DW_AT_STMT_LIST))
            .and_then(|v| v.as_udata().ok());
        if let (Some(stmt_list), Some(line_section)) = (stmt_list, sections.line) {
            let mut lr = r.narrow(
                line_section.offset + stmt_list,
                line_section.size.saturating_sub(stmt_list),
            );
            lr.addr_size = addr_size;
            match LineProgram::parse(&mut lr) {
                Ok(lines) => unit.lines = Some(lines),
                Err(e) => log::warn!(
                    "can't decode line program at {:#x} for unit at {:#x}: {}",
                    stmt_list,
                    unit_offset,
                    e
                ),
            }
        }
        Ok(unit)
    }

    fn parse_die_list(
        &mut self,
        r: &mut DwarfReader,
        abbrevs: &AbbrevTable,
        info_start: u64,
        out: &mut Vec<usize>,
    ) -> Result<(), DwarfError> {
        while !r.is_empty() {
            let die_offset = r.offset() - info_start;
            let code = r.uleb128()?;
            if code == 0 {
                // Terminates the current sibling list.
                return Ok(());
            }
            let abbrev = abbrevs.get(code)?;
            let mut attrs = Vec::with_capacity(abbrev.specs.len());
            for spec in &abbrev.specs {
                attrs.push((spec.name, self.decode_form(r, spec.form)?));
            }
            let index = self.dies.len();
            self.dies.push(Die {
                tag: abbrev.tag,
                offset: die_offset,
                attrs,
                children: Vec::new(),
            });
            self.by_offset.insert(die_offset, index);
            if abbrev.has_children {
                let mut children = Vec::new();
                self.parse_die_list(r, abbrevs, info_start, &mut children)?;
                self.dies[index].children = children;
            }
            out.push(index);
        }
        Ok(())
    }

    fn decode_form(&self, r: &mut DwarfReader, form: u64) -> Result<AttrValue, DwarfError> {
        Ok(match form {
            DW_FORM_ADDR => AttrValue::Addr(r.uint(self.addr_size)?),
            DW_FORM_DATA1 => AttrValue::Udata(r.u8()? as u64),
            DW_FORM_DATA2 => AttrValue::Udata(r.u16()? as u64),
            DW_FORM_DATA4 => AttrValue::Udata(r.u32()? as u64),
            DW_FORM_DATA8 => AttrValue::Udata(r.u64()?),
            DW_FORM_UDATA => AttrValue::Udata(r.uleb128()?),
            DW_FORM_SDATA => AttrValue::Sdata(r.sleb128()?),
            DW_FORM_SEC_OFFSET => AttrValue::Udata(r.fmt_uint()?),
            DW_FORM_STRP => AttrValue::Strp(r.fmt_uint()?),
            DW_FORM_STRING => AttrValue::String(r.string()?),
            DW_FORM_REF1 => AttrValue::Ref(self.offset + r.u8()? as u64),
            DW_FORM_REF2 => AttrValue::Ref(self.offset + r.u16()? as u64),
            DW_FORM_REF4 => AttrValue::Ref(self.offset + r.u32()? as u64),
            DW_FORM_REF8 => AttrValue::Ref(self.offset + r.u64()?),
            DW_FORM_REF_UDATA => AttrValue::Ref(self.offset + r.uleb128()?),
            DW_FORM_REF_ADDR => AttrValue::Ref(r.fmt_uint()?),
            DW_FORM_BLOCK1 => {
                let length = r.u8()? as u64;
                self.decode_block(r, length)?
            }
            DW_FORM_BLOCK2 => {
                let length = r.u16()? as u64;
                self.decode_block(r, length)?
            }
            DW_FORM_BLOCK4 => {
                let length = r.u32()? as u64;
                self.decode_block(r, length)?
            }
            DW_FORM_BLOCK | DW_FORM_EXPRLOC => {
                let length = r.uleb128()?;
                self.decode_block(r, length)?
            }
            DW_FORM_FLAG => AttrValue::Flag(r.u8()? != 0),
            DW_FORM_FLAG_PRESENT => AttrValue::Flag(true),
            _ => return Err(DwarfError::UnknownForm(form)),
        })
    }

    fn decode_block(&self, r: &mut DwarfReader, length: u64) -> Result<AttrValue, DwarfError> {
        let offset = r.offset();
        r.skip(length)?;
        Ok(AttrValue::Block { offset, length })
    }

    #[inline]
    pub fn dies(&self) -> &[Die] {
        &self.dies
    }

    pub fn root_die(&self) -> Option<&Die> {
        self.root.map(|i| &self.dies[i])
    }

    /// Resolve a reference attribute within this unit by `.debug_info`
    /// offset.
    pub fn die_at_offset(&self, offset: u64) -> Option<&Die> {
        self.by_offset.get(&offset).map(|&i| &self.dies[i])
    }

    /// Whether `offset` (within `.debug_info`) falls inside this unit's
    /// DIE range.
    pub fn contains_offset(&self, offset: u64) -> bool {
        match (self.by_offset.keys().next(), self.by_offset.keys().last()) {
            (Some(&first), Some(&last)) => first <= offset && offset <= last,
            _ => false,
        }
    }

    /// The subprogram DIE whose code range covers `addr`, searching the
    /// whole tree depth-first.
    pub fn function_at(&self, addr: u64) -> Option<&Die> {
        fn descend<'a>(unit: &'a Unit, die: &'a Die, addr: u64) -> Option<&'a Die> {
            if die.tag == DW_TAG_SUBPROGRAM {
                if let Some((low, high)) = die.pc_range() {
                    if low <= addr && addr < high {
                        return Some(die);
                    }
                }
                return None;
            }
            for &child in &die.children {
                if let Some(found) = descend(unit, &unit.dies[child], addr) {
                    return Some(found);
                }
            }
            None
        }
        descend(self, self.root_die()?, addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dwarf::SectionRef;
    use crate::reader::MemReader;

    fn uleb(out: &mut Vec<u8>, v: u64) {
        leb128::write::unsigned(out, v).unwrap();
    }

    /// A unit with one subprogram holding a formal parameter, exercising a
    /// spread of attribute forms.
    fn build_sections() -> (Vec<u8>, u64, u64) {
        let mut abbrev = Vec::new();
        // Abbrev 1: compile unit with children.
        uleb(&mut abbrev, 1);
        uleb(&mut abbrev, DW_TAG_COMPILE_UNIT);
        abbrev.push(1);
        for (at, form) in [(DW_AT_NAME, DW_FORM_STRING)] {
            uleb(&mut abbrev, at);
            uleb(&mut abbrev, form);
        }
        abbrev.extend_from_slice(&[0, 0]);
        // Abbrev 2: subprogram with children.
        uleb(&mut abbrev, 2);
        uleb(&mut abbrev, DW_TAG_SUBPROGRAM);
        abbrev.push(1);
        for (at, form) in [
            (DW_AT_NAME, DW_FORM_STRING),
            (DW_AT_LOW_PC, DW_FORM_ADDR),
            (DW_AT_HIGH_PC, DW_FORM_DATA4),
        ] {
            uleb(&mut abbrev, at);
            uleb(&mut abbrev, form);
        }
        abbrev.extend_from_slice(&[0, 0]);
        // Abbrev 3: formal parameter, leaf.
        uleb(&mut abbrev, 3);
        uleb(&mut abbrev, DW_TAG_FORMAL_PARAMETER);
        abbrev.push(0);
        for (at, form) in [
            (DW_AT_NAME, DW_FORM_STRING),
            (DW_AT_LOCATION, DW_FORM_BLOCK1),
            (0x49, DW_FORM_REF4), // DW_AT_type
        ] {
            uleb(&mut abbrev, at);
            uleb(&mut abbrev, form);
        }
        abbrev.extend_from_slice(&[0, 0]);
        abbrev.push(0); // table terminator

        let mut body = Vec::new();
        body.extend_from_slice(&4u16.to_le_bytes()); // version
        body.extend_from_slice(&0u32.to_le_bytes()); // abbrev offset
        body.push(8); // address size
        // Root: compile unit.
        uleb(&mut body, 1);
        body.extend_from_slice(b"a.c\0");
        // Child: subprogram [0x1000, 0x1000 + 0x40).
        uleb(&mut body, 2);
        body.extend_from_slice(b"main\0");
        body.extend_from_slice(&0x1000u64.to_le_bytes());
        body.extend_from_slice(&0x40u32.to_le_bytes());
        // Grandchild: formal parameter.
        uleb(&mut body, 3);
        body.extend_from_slice(b"argc\0");
        body.push(1); // block length
        body.push(0x91); // DW_OP_fbreg, operand elided in the block below
        body.extend_from_slice(&0x2au32.to_le_bytes()); // DW_AT_type ref4
        body.push(0); // end of subprogram children
        body.push(0); // end of compile unit children

        let mut info = Vec::new();
        info.extend_from_slice(&(body.len() as u32).to_le_bytes());
        info.extend_from_slice(&body);

        let mut image = info.clone();
        let abbrev_off = image.len() as u64;
        image.extend_from_slice(&abbrev);
        (image, abbrev_off, abbrev.len() as u64)
    }

    fn parse_unit() -> Unit {
        let (image, abbrev_off, abbrev_size) = build_sections();
        let info_size = abbrev_off;
        let io = MemReader::new("info", image);
        let sections = DwarfSections {
            info: SectionRef {
                offset: 0,
                size: info_size,
            },
            abbrev: Some(SectionRef {
                offset: abbrev_off,
                size: abbrev_size,
            }),
            line: None,
        };
        let mut r = DwarfReader::new(&io, 0, info_size);
        let unit = Unit::parse(&mut r, &sections).unwrap();
        assert!(r.is_empty());
        unit
    }

    #[test]
    fn test_unit_structure() {
        let unit = parse_unit();
        assert_eq!(unit.version, 4);
        assert_eq!(unit.addr_size, 8);
        let root = unit.root_die().unwrap();
        assert_eq!(root.tag, DW_TAG_COMPILE_UNIT);
        assert_eq!(
            root.attr(DW_AT_NAME),
            Some(&AttrValue::String("a.c".to_string()))
        );
        assert_eq!(root.children.len(), 1);
        let sub = &unit.dies()[root.children[0]];
        assert_eq!(sub.tag, DW_TAG_SUBPROGRAM);
        assert_eq!(sub.children.len(), 1);
    }

    #[test]
    fn test_pc_range_and_function_lookup() {
        let unit = parse_unit();
        let sub = unit.function_at(0x1020).unwrap();
        assert_eq!(sub.pc_range(), Some((0x1000, 0x1040)));
        assert_eq!(
            sub.attr(DW_AT_NAME),
            Some(&AttrValue::String("main".to_string()))
        );
        assert!(unit.function_at(0x1040).is_none());
        assert!(unit.function_at(0xfff).is_none());
    }

    #[test]
    fn test_attr_forms() {
        let unit = parse_unit();
        let sub = unit.function_at(0x1000).unwrap();
        let param = &unit.dies()[sub.children[0]];
        assert!(matches!(
            param.attr(DW_AT_LOCATION),
            Some(AttrValue::Block { length: 1, .. })
        ));
        // ref4 is normalized against the unit start (offset 0 here).
        assert_eq!(param.attr(0x49), Some(&AttrValue::Ref(0x2a)));
        // Integer-class accessor refuses non-constant forms.
        assert!(sub.attr(DW_AT_LOW_PC).unwrap().as_udata().is_err());
        assert_eq!(sub.attr(DW_AT_HIGH_PC).unwrap().as_udata().unwrap(), 0x40);
    }

    #[test]
    fn test_die_by_offset() {
        let unit = parse_unit();
        let sub = unit.function_at(0x1000).unwrap();
        let found = unit.die_at_offset(sub.offset).unwrap();
        assert_eq!(found.tag, DW_TAG_SUBPROGRAM);
        assert!(unit.contains_offset(sub.offset));
        assert!(unit.die_at_offset(0xdead).is_none());
    }
}
