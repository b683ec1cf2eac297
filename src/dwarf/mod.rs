//! DWARF debug information for one ELF object: compile units, line
//! matrices, address ranges, public names and call-frame information, each
//! materialized at most once on first use.

use std::sync::{Arc, OnceLock};

use crate::elf::ElfObject;
use crate::reader::ReadError;

pub mod abbrev;
pub mod aranges;
pub mod consts;
pub mod encoding;
pub mod expression;
pub mod frame;
pub mod info;
pub mod instruction;
pub mod line;
pub mod pubnames;
pub mod stream;

use aranges::ArangeSet;
use frame::{FrameKind, FrameSection};
use info::{AttrValue, Die, Unit};
use pubnames::PubnameUnit;
use stream::DwarfReader;

#[derive(Debug, thiserror::Error)]
pub enum DwarfError {
    #[error("truncated data at {0:#x}")]
    Truncated(u64),

    #[error("can't deal with ints of size {0}")]
    BadIntWidth(u8),

    #[error("truncated LEB128 at {0:#x}")]
    TruncatedLeb128(u64),

    #[error("malformed LEB128 at {0:#x}")]
    MalformedLeb128(u64),

    #[error("unterminated string at {0:#x}")]
    StringTooLong(u64),

    #[error("reserved initial length {0:#x}")]
    ReservedLength(u32),

    #[error("zero-length entry at {0:#x}")]
    ZeroLength(u64),

    #[error("reference to unknown abbreviation code {0}")]
    UnknownAbbrevCode(u64),

    #[error("unsupported DWARF version {0}")]
    UnsupportedVersion(u16),

    #[error("unsupported line table version {0}")]
    UnsupportedLineVersion(u16),

    #[error("line table declares a zero line range")]
    BadLineRange,

    #[error("unknown attribute form {0:#x}")]
    UnknownForm(u64),

    #[error("attribute is not a constant")]
    NotAConstant,

    #[error("object has no {0} section")]
    MissingSection(&'static str),

    #[error("invalid CIE version {0}")]
    CieInvalidVersion(u8),

    #[error("nonzero segment selector size {0}")]
    UnsupportedSegmentation(u8),

    #[error("FDE references unknown CIE at {0:#x}")]
    UnknownCie(u64),

    #[error("unsupported pointer encoding {0:#x}")]
    UnsupportedPointerEncoding(u8),

    #[error("invalid pointer encoding value {0:#x}")]
    InvalidPointerEncoding(u8),

    #[error("invalid call frame instruction {0:#x}")]
    InvalidInstruction(u8),

    #[error("invalid register number {0}")]
    InvalidRegisterNumber(u64),

    #[error("remember-state stack overflow")]
    StateStackOverflow,

    #[error("restore without remembered state")]
    NoRememberState,

    #[error("expression stack overflow")]
    ExpressionStackOverflow,

    #[error("expression stack underflow")]
    ExpressionStackUnderflow,

    #[error("invalid expression opcode {0:#x}")]
    InvalidExpressionOpcode(u8),

    #[error("invalid expression register number {0}")]
    InvalidExpressionRegister(u64),

    #[error("invalid expression deref size {0}")]
    BadDerefSize(u8),

    #[error("expression divides by zero")]
    ExpressionDivideByZero,

    #[error("no frame base for this expression")]
    NoFrameBase,

    #[error("no CFA for this expression")]
    NoCfa,

    #[error("no way to calculate the CFA")]
    NoCfaRule,

    #[error("architectural unwind rule without a backend")]
    UnsupportedArchRule,

    #[error(transparent)]
    Read(#[from] ReadError),
}

/// Location of a section within the object's reader.
#[derive(Debug, Copy, Clone)]
pub struct SectionRef {
    pub offset: u64,
    pub size: u64,
}

/// The sections `.debug_info` parsing needs to see together.
#[derive(Debug, Copy, Clone)]
pub struct DwarfSections {
    pub info: SectionRef,
    pub abbrev: Option<SectionRef>,
    pub line: Option<SectionRef>,
}

/// Per-object DWARF container. Logically immutable: every sub-index is
/// computed at most once behind a one-shot cell and read-only thereafter.
pub struct DwarfInfo {
    elf: Arc<ElfObject>,
    info_sections: Option<DwarfSections>,
    aranges_section: Option<SectionRef>,
    pubnames_section: Option<SectionRef>,
    eh_frame_section: Option<SectionRef>,
    debug_frame_section: Option<SectionRef>,
    /// The string table is loaded eagerly; `strp` attributes are offsets
    /// into this buffer.
    debug_strings: Vec<u8>,
    units: OnceLock<Vec<Unit>>,
    aranges: OnceLock<Vec<ArangeSet>>,
    pubnames: OnceLock<Vec<PubnameUnit>>,
    eh_frame: OnceLock<Option<FrameSection>>,
    debug_frame: OnceLock<Option<FrameSection>>,
}

impl DwarfInfo {
    pub fn new(elf: Arc<ElfObject>) -> Self {
        let section = |name: &str| {
            elf.section_by_name(name).map(|shdr| SectionRef {
                offset: shdr.sh_offset,
                size: shdr.sh_size,
            })
        };
        let info_sections = section(".debug_info").map(|info| DwarfSections {
            info,
            abbrev: section(".debug_abbrev"),
            line: section(".debug_line"),
        });
        let debug_strings = match elf.section_by_name(".debug_str") {
            Some(shdr) => {
                let shdr = *shdr;
                elf.section_data(&shdr).unwrap_or_else(|e| {
                    log::warn!("can't read .debug_str of {}: {}", elf.name(), e);
                    Vec::new()
                })
            }
            None => Vec::new(),
        };
        Self {
            info_sections,
            aranges_section: section(".debug_aranges"),
            pubnames_section: section(".debug_pubnames"),
            eh_frame_section: section(".eh_frame"),
            debug_frame_section: section(".debug_frame"),
            debug_strings,
            elf,
            units: OnceLock::new(),
            aranges: OnceLock::new(),
            pubnames: OnceLock::new(),
            eh_frame: OnceLock::new(),
            debug_frame: OnceLock::new(),
        }
    }

    #[inline]
    pub fn elf(&self) -> &Arc<ElfObject> {
        &self.elf
    }

    /// The compile units, parsed on first use. A decode error empties the
    /// index for this object; other objects are unaffected.
    pub fn units(&self) -> &[Unit] {
        self.units.get_or_init(|| {
            let Some(sections) = self.info_sections else {
                return Vec::new();
            };
            let io = self.elf.io();
            let mut r = DwarfReader::new(io.as_ref(), sections.info.offset, sections.info.size);
            let mut units = Vec::new();
            while !r.is_empty() {
                match Unit::parse(&mut r, &sections) {
                    Ok(unit) => units.push(unit),
                    Err(e) => {
                        log::warn!("can't decode .debug_info for {}: {}", self.elf.name(), e);
                        return Vec::new();
                    }
                }
            }
            log::debug!("{}: {} compile units", self.elf.name(), units.len());
            units
        })
    }

    pub fn aranges(&self) -> &[ArangeSet] {
        self.aranges.get_or_init(|| {
            let Some(section) = self.aranges_section else {
                return Vec::new();
            };
            let io = self.elf.io();
            let mut r = DwarfReader::new(io.as_ref(), section.offset, section.size);
            let mut sets = Vec::new();
            while !r.is_empty() {
                match ArangeSet::parse(&mut r) {
                    Ok(set) => sets.push(set),
                    Err(e) => {
                        log::warn!("can't decode .debug_aranges for {}: {}", self.elf.name(), e);
                        return Vec::new();
                    }
                }
            }
            sets
        })
    }

    pub fn pubnames(&self) -> &[PubnameUnit] {
        self.pubnames.get_or_init(|| {
            let Some(section) = self.pubnames_section else {
                return Vec::new();
            };
            let io = self.elf.io();
            let mut r = DwarfReader::new(io.as_ref(), section.offset, section.size);
            let mut sets = Vec::new();
            while !r.is_empty() {
                match PubnameUnit::parse(&mut r) {
                    Ok(set) => sets.push(set),
                    Err(e) => {
                        log::warn!("can't decode .debug_pubnames for {}: {}", self.elf.name(), e);
                        return Vec::new();
                    }
                }
            }
            sets
        })
    }

    fn frame_section<'a>(
        &self,
        cell: &'a OnceLock<Option<FrameSection>>,
        section: Option<SectionRef>,
        kind: FrameKind,
        name: &str,
    ) -> Option<&'a FrameSection> {
        cell.get_or_init(|| {
            let section = section?;
            match FrameSection::parse(
                self.elf.io().as_ref(),
                section,
                kind,
                self.elf.base(),
                8,
            ) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    log::warn!("can't decode {} for {}: {}", name, self.elf.name(), e);
                    None
                }
            }
        })
        .as_ref()
    }

    pub fn eh_frame(&self) -> Option<&FrameSection> {
        self.frame_section(
            &self.eh_frame,
            self.eh_frame_section,
            FrameKind::EhFrame,
            ".eh_frame",
        )
    }

    pub fn debug_frame(&self) -> Option<&FrameSection> {
        self.frame_section(
            &self.debug_frame,
            self.debug_frame_section,
            FrameKind::DebugFrame,
            ".debug_frame",
        )
    }

    /// The NUL-terminated string at `offset` in the debug string buffer.
    pub fn debug_str(&self, offset: u64) -> Option<&str> {
        let start = offset as usize;
        if start >= self.debug_strings.len() {
            return None;
        }
        let rest = &self.debug_strings[start..];
        let end = rest.iter().position(|&b| b == 0)?;
        std::str::from_utf8(&rest[..end]).ok()
    }

    /// Materialize a string-class attribute value.
    pub fn attr_string(&self, value: &AttrValue) -> Option<String> {
        match value {
            AttrValue::String(s) => Some(s.clone()),
            AttrValue::Strp(offset) => self.debug_str(*offset).map(str::to_string),
            _ => None,
        }
    }

    /// Resolve a reference attribute against the whole of `.debug_info`,
    /// whichever unit the target lives in.
    pub fn die_at(&self, offset: u64) -> Option<&Die> {
        self.units()
            .iter()
            .find(|unit| unit.contains_offset(offset))
            .and_then(|unit| unit.die_at_offset(offset))
    }

    /// The compile unit whose code covers `addr`: an aranges lookup when
    /// the section is present, otherwise a scan over every unit.
    pub fn unit_for_addr(&self, addr: u64) -> Option<&Unit> {
        let sets = self.aranges();
        if !sets.is_empty() {
            let offset = aranges::unit_offset_for_addr(sets, addr)?;
            return self.units().iter().find(|unit| unit.offset == offset);
        }
        // No aranges: try each unit in turn.
        self.units().iter().find(|unit| {
            unit.root_die()
                .and_then(|root| root.pc_range())
                .map(|(low, high)| low <= addr && addr < high)
                .unwrap_or(false)
                || unit.function_at(addr).is_some()
        })
    }

    /// Source file and line for a code address, via the owning unit's line
    /// matrix.
    pub fn source_from_addr(&self, addr: u64) -> Option<(String, u64)> {
        let unit = self.unit_for_addr(addr)?;
        let lines = unit.lines.as_ref()?;
        lines.source(lines.find_row(addr)?)
    }
}
