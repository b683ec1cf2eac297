//! Call Frame Information: CIEs and FDEs parsed out of `.eh_frame` or
//! `.debug_frame`. The section is decoded in two passes, CIEs first, so an
//! FDE can cite a CIE that appears after it.

use std::collections::BTreeMap;

use crate::dwarf::consts::*;
use crate::dwarf::encoding::decode_pointer;
use crate::dwarf::stream::DwarfReader;
use crate::dwarf::{DwarfError, SectionRef};
use crate::reader::Reader;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameKind {
    EhFrame,
    DebugFrame,
}

/// Common Information Entry: the prologue shared by a group of FDEs.
#[derive(Debug, Clone)]
pub struct Cie {
    /// Offset of this entry within its frame section.
    pub offset: u64,
    pub version: u8,
    pub augmentation: String,
    pub code_align: u64,
    pub data_align: i64,
    pub return_address_register: u16,
    pub pointer_encoding: u8,
    pub lsda_encoding: u8,
    pub personality: Option<u64>,
    pub is_signal_frame: bool,
    pub has_augmentation_data: bool,
    /// Initial instruction stream, as absolute reader offsets `[start, end)`.
    pub instructions: (u64, u64),
}

/// Frame Description Entry: the unwind recipe for one code range.
#[derive(Debug, Clone)]
pub struct Fde {
    /// Section-relative offset of the CIE this entry cites.
    pub cie_offset: u64,
    /// Initial code location.
    pub iloc: u64,
    /// Length of the covered code range.
    pub irange: u64,
    /// Instruction stream, as absolute reader offsets `[start, end)`.
    pub instructions: (u64, u64),
}

impl Fde {
    #[inline]
    pub fn contains(&self, pc: u64) -> bool {
        self.iloc <= pc && pc < self.iloc + self.irange
    }
}

/// A fully decoded frame section: CIEs keyed by section offset and FDEs
/// sorted by initial location for binary search.
pub struct FrameSection {
    pub kind: FrameKind,
    cies: BTreeMap<u64, Cie>,
    fdes: Vec<Fde>,
}

struct EntryHeader {
    /// Section-relative offset of the entry (at its length field).
    entry_offset: u64,
    /// Absolute offset of the id field; eh_frame CIE pointers are relative
    /// to it.
    id_offset: u64,
    id: u64,
    /// Absolute offset just past the entry.
    end: u64,
}

impl FrameSection {
    pub fn parse(
        io: &dyn Reader,
        section: SectionRef,
        kind: FrameKind,
        load_base: u64,
        addr_size: u8,
    ) -> Result<Self, DwarfError> {
        let mut out = Self {
            kind,
            cies: BTreeMap::new(),
            fdes: Vec::new(),
        };

        // Pass 1: CIEs.
        let mut r = DwarfReader::new(io, section.offset, section.size);
        r.addr_size = addr_size;
        while let Some(header) = out.entry_header(&mut r, section)? {
            if out.is_cie(header.id) {
                let mut body = r.narrow(r.offset(), header.end - r.offset());
                let cie = out.parse_cie(&mut body, header.entry_offset, header.end, load_base)?;
                out.cies.insert(header.entry_offset, cie);
            }
            r.set_offset(header.end);
        }

        // Pass 2: FDEs, now that every CIE is known.
        let mut r = DwarfReader::new(io, section.offset, section.size);
        r.addr_size = addr_size;
        while let Some(header) = out.entry_header(&mut r, section)? {
            if !out.is_cie(header.id) {
                let cie_offset = match kind {
                    FrameKind::EhFrame => header
                        .id_offset
                        .wrapping_sub(header.id)
                        .wrapping_sub(section.offset),
                    FrameKind::DebugFrame => header.id,
                };
                let cie = out
                    .cies
                    .get(&cie_offset)
                    .ok_or(DwarfError::UnknownCie(cie_offset))?;
                let mut body = r.narrow(r.offset(), header.end - r.offset());
                body.addr_size = addr_size;
                let iloc = decode_pointer(&mut body, cie.pointer_encoding, load_base)?;
                let irange = decode_pointer(&mut body, cie.pointer_encoding & 0x0f, load_base)?;
                if cie.has_augmentation_data {
                    let aug_len = body.uleb128()?;
                    body.skip(aug_len)?;
                }
                out.fdes.push(Fde {
                    cie_offset,
                    iloc,
                    irange,
                    instructions: (body.offset(), header.end),
                });
            }
            r.set_offset(header.end);
        }

        out.fdes.sort_by_key(|fde| fde.iloc);
        Ok(out)
    }

    /// Decode the length/id header of the next entry. `None` means the end
    /// of the section, reached either by exhaustion or a zero terminator.
    fn entry_header(
        &self,
        r: &mut DwarfReader,
        section: SectionRef,
    ) -> Result<Option<EntryHeader>, DwarfError> {
        if r.is_empty() {
            return Ok(None);
        }
        let entry_offset = r.offset() - section.offset;
        let length = r.initial_length()?;
        if length == 0 {
            return Ok(None);
        }
        let id_offset = r.offset();
        let id = r.fmt_uint()?;
        Ok(Some(EntryHeader {
            entry_offset,
            id_offset,
            id,
            end: id_offset + length,
        }))
    }

    fn is_cie(&self, id: u64) -> bool {
        match self.kind {
            FrameKind::EhFrame => id == 0,
            FrameKind::DebugFrame => id == 0xffff_ffff || id == u64::MAX,
        }
    }

    fn parse_cie(
        &self,
        r: &mut DwarfReader,
        offset: u64,
        end: u64,
        load_base: u64,
    ) -> Result<Cie, DwarfError> {
        let version = r.u8()?;
        if version != 1 && version != 3 && version != 4 {
            return Err(DwarfError::CieInvalidVersion(version));
        }
        let augmentation = r.string()?;
        if version == 4 {
            r.addr_size = r.u8()?;
            let segment_size = r.u8()?;
            if segment_size != 0 {
                return Err(DwarfError::UnsupportedSegmentation(segment_size));
            }
        }
        let code_align = r.uleb128()?;
        let data_align = r.sleb128()?;
        let return_address_register = if version == 1 {
            r.u8()? as u16
        } else {
            r.uleb128()? as u16
        };

        let mut cie = Cie {
            offset,
            version,
            augmentation: augmentation.clone(),
            code_align,
            data_align,
            return_address_register,
            pointer_encoding: match self.kind {
                FrameKind::EhFrame => DW_EH_PE_UDATA4,
                FrameKind::DebugFrame => DW_EH_PE_ABSPTR,
            },
            lsda_encoding: DW_EH_PE_OMIT,
            personality: None,
            is_signal_frame: false,
            has_augmentation_data: false,
            instructions: (0, 0),
        };

        let mut chars = augmentation.chars();
        if chars.next() == Some('z') {
            cie.has_augmentation_data = true;
            let aug_len = r.uleb128()?;
            let aug_end = r.offset() + aug_len;
            for c in chars {
                match c {
                    'P' => {
                        let enc = r.u8()?;
                        cie.personality = Some(decode_pointer(r, enc, load_base)?);
                    }
                    'L' => cie.lsda_encoding = r.u8()?,
                    'R' => cie.pointer_encoding = r.u8()?,
                    'S' => cie.is_signal_frame = true,
                    // The augmentation characters describe the data in
                    // order; an unknown one makes the rest of the block
                    // unintelligible.
                    other => {
                        log::warn!("unknown augmentation '{}' in \"{}\"", other, augmentation);
                        break;
                    }
                }
            }
            if r.offset() != aug_end {
                log::warn!(
                    "{} bytes of augmentation ignored",
                    aug_end.saturating_sub(r.offset())
                );
                r.set_offset(aug_end);
            }
        } else if !augmentation.is_empty() {
            log::warn!("augmentation without length delimiter: {}", augmentation);
        }

        cie.instructions = (r.offset(), end);
        Ok(cie)
    }

    /// The FDE covering `pc`, by binary search over sorted initial
    /// locations.
    pub fn find_fde(&self, pc: u64) -> Option<(&Fde, &Cie)> {
        let index = self.fdes.partition_point(|fde| fde.iloc <= pc);
        if index == 0 {
            return None;
        }
        let fde = &self.fdes[index - 1];
        if !fde.contains(pc) {
            return None;
        }
        Some((fde, self.cies.get(&fde.cie_offset)?))
    }

    #[inline]
    pub fn fdes(&self) -> &[Fde] {
        &self.fdes
    }

    pub fn cie(&self, offset: u64) -> Option<&Cie> {
        self.cies.get(&offset)
    }
}
