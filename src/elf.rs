//! A thin view of an ELF image: header, program and section headers, named
//! sections and symbol tables. Only the little-endian 64-bit format is
//! understood; everything is read on demand through the object's [Reader].

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::reader::{ReadError, Reader};

pub const ELFCLASS64: u8 = 2;
pub const ELFDATA2LSB: u8 = 1;
pub const EV_CURRENT: u8 = 1;

pub const PT_LOAD: u32 = 1;
pub const PT_DYNAMIC: u32 = 2;
pub const PT_INTERP: u32 = 3;
pub const PT_NOTE: u32 = 4;

pub const SHF_ALLOC: u64 = 0x2;
pub const SHN_UNDEF: u16 = 0;
pub const STN_UNDEF: u32 = 0;

pub const STT_NOTYPE: u8 = 0;
pub const STT_FUNC: u8 = 2;

pub const NT_GNU_BUILD_ID: u32 = 3;

const PHDR_SIZE: u64 = 56;
const SHDR_SIZE: u64 = 64;
const SYM_SIZE: u64 = 24;

/// Longest string we will chase in a string table.
const MAX_NAME: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum ElfError {
    #[error("{0}: not an ELF image")]
    NotElf(String),

    #[error("{0}: unsupported ELF class {1}")]
    UnsupportedClass(String, u8),

    #[error("{0}: unsupported ELF byte order {1}")]
    UnsupportedEncoding(String, u8),

    #[error(transparent)]
    Read(#[from] ReadError),
}

#[derive(Debug, Default, Copy, Clone)]
pub struct ElfHeader {
    pub e_type: u16,
    pub e_machine: u16,
    pub e_entry: u64,
    pub e_phoff: u64,
    pub e_shoff: u64,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

#[derive(Debug, Default, Copy, Clone)]
pub struct Phdr {
    pub p_type: u32,
    pub p_flags: u32,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
}

#[derive(Debug, Default, Copy, Clone)]
pub struct Shdr {
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u64,
    pub sh_addr: u64,
    pub sh_offset: u64,
    pub sh_size: u64,
    pub sh_link: u32,
    pub sh_entsize: u64,
}

#[derive(Debug, Default, Copy, Clone)]
pub struct Sym {
    pub st_name: u32,
    pub st_info: u8,
    pub st_shndx: u16,
    pub st_value: u64,
    pub st_size: u64,
}

impl Sym {
    #[inline]
    pub fn symbol_type(&self) -> u8 {
        self.st_info & 0xf
    }
}

fn read_phdr(io: &dyn Reader, off: u64) -> Result<Phdr, ReadError> {
    Ok(Phdr {
        p_type: io.read_u32(off)?,
        p_flags: io.read_u32(off + 4)?,
        p_offset: io.read_u64(off + 8)?,
        p_vaddr: io.read_u64(off + 16)?,
        p_filesz: io.read_u64(off + 32)?,
        p_memsz: io.read_u64(off + 40)?,
    })
}

fn read_shdr(io: &dyn Reader, off: u64) -> Result<Shdr, ReadError> {
    Ok(Shdr {
        sh_name: io.read_u32(off)?,
        sh_type: io.read_u32(off + 4)?,
        sh_flags: io.read_u64(off + 8)?,
        sh_addr: io.read_u64(off + 16)?,
        sh_offset: io.read_u64(off + 24)?,
        sh_size: io.read_u64(off + 32)?,
        sh_link: io.read_u32(off + 40)?,
        sh_entsize: io.read_u64(off + 56)?,
    })
}

fn read_sym(io: &dyn Reader, off: u64) -> Result<Sym, ReadError> {
    Ok(Sym {
        st_name: io.read_u32(off)?,
        st_info: io.read_u8(off + 4)?,
        st_shndx: io.read_u16(off + 6)?,
        st_value: io.read_u64(off + 8)?,
        st_size: io.read_u64(off + 16)?,
    })
}

/// Parsed ELF object. Immutable after construction; owns its [Reader] for
/// the lifetime of the attachment.
pub struct ElfObject {
    io: Arc<dyn Reader>,
    header: ElfHeader,
    segments: BTreeMap<u32, Vec<Phdr>>,
    sections: Vec<Shdr>,
    names: BTreeMap<String, usize>,
    interpreter: Option<String>,
    hash: Option<SymHash>,
}

impl ElfObject {
    pub fn parse(io: Arc<dyn Reader>) -> Result<Arc<Self>, ElfError> {
        let mut ident = [0u8; 16];
        io.read_exact_at(0, &mut ident)?;
        if &ident[0..4] != b"\x7fELF" || ident[6] != EV_CURRENT {
            return Err(ElfError::NotElf(io.describe()));
        }
        if ident[4] != ELFCLASS64 {
            return Err(ElfError::UnsupportedClass(io.describe(), ident[4]));
        }
        if ident[5] != ELFDATA2LSB {
            return Err(ElfError::UnsupportedEncoding(io.describe(), ident[5]));
        }

        let header = ElfHeader {
            e_type: io.read_u16(16)?,
            e_machine: io.read_u16(18)?,
            e_entry: io.read_u64(24)?,
            e_phoff: io.read_u64(32)?,
            e_shoff: io.read_u64(40)?,
            e_phentsize: io.read_u16(54)?,
            e_phnum: io.read_u16(56)?,
            e_shentsize: io.read_u16(58)?,
            e_shnum: io.read_u16(60)?,
            e_shstrndx: io.read_u16(62)?,
        };

        let mut segments: BTreeMap<u32, Vec<Phdr>> = BTreeMap::new();
        let mut interpreter = None;
        let mut off = header.e_phoff;
        for _ in 0..header.e_phnum {
            let phdr = read_phdr(io.as_ref(), off)?;
            if phdr.p_type == PT_INTERP {
                interpreter = Some(io.read_string(phdr.p_offset, MAX_NAME)?);
            }
            segments.entry(phdr.p_type).or_default().push(phdr);
            off += header.e_phentsize.max(PHDR_SIZE as u16) as u64;
        }

        let mut sections = Vec::with_capacity(header.e_shnum as usize);
        let mut off = header.e_shoff;
        for _ in 0..header.e_shnum {
            sections.push(read_shdr(io.as_ref(), off)?);
            off += header.e_shentsize.max(SHDR_SIZE as u16) as u64;
        }

        let mut names = BTreeMap::new();
        if header.e_shstrndx != SHN_UNDEF && (header.e_shstrndx as usize) < sections.len() {
            let strings = sections[header.e_shstrndx as usize].sh_offset;
            for (index, shdr) in sections.iter().enumerate() {
                let name = io.read_string(strings + shdr.sh_name as u64, MAX_NAME)?;
                names.insert(name, index);
            }
        }

        let mut obj = Self {
            io,
            header,
            segments,
            sections,
            names,
            interpreter,
            hash: None,
        };
        if let Some(shdr) = obj.section_by_name(".hash").copied() {
            match SymHash::parse(&obj, &shdr) {
                Ok(hash) => obj.hash = Some(hash),
                Err(e) => log::warn!("can't read .hash of {}: {}", obj.name(), e),
            }
        }
        Ok(Arc::new(obj))
    }

    #[inline]
    pub fn io(&self) -> &Arc<dyn Reader> {
        &self.io
    }

    pub fn name(&self) -> String {
        self.io.describe()
    }

    #[inline]
    pub fn header(&self) -> &ElfHeader {
        &self.header
    }

    /// Program headers of one segment type, in file order.
    pub fn segments(&self, p_type: u32) -> &[Phdr] {
        self.segments.get(&p_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn section_by_name(&self, name: &str) -> Option<&Shdr> {
        self.names.get(name).map(|&i| &self.sections[i])
    }

    #[inline]
    pub fn sections(&self) -> &[Shdr] {
        &self.sections
    }

    pub fn interpreter(&self) -> Option<&str> {
        self.interpreter.as_deref()
    }

    /// Lowest virtual address of any PT_LOAD segment.
    pub fn base(&self) -> u64 {
        self.segments(PT_LOAD)
            .iter()
            .map(|p| p.p_vaddr)
            .min()
            .unwrap_or(0)
    }

    /// Read an entire section into memory.
    pub fn section_data(&self, shdr: &Shdr) -> Result<Vec<u8>, ReadError> {
        let mut data = vec![0u8; shdr.sh_size as usize];
        self.io.read_exact_at(shdr.sh_offset, &mut data)?;
        Ok(data)
    }

    /// Contents of the `NT_GNU_BUILD_ID` note, if present.
    pub fn build_id(&self) -> Option<Vec<u8>> {
        for phdr in self.segments(PT_NOTE) {
            let end = phdr.p_offset + phdr.p_filesz;
            let mut off = phdr.p_offset;
            while off + 12 <= end {
                let namesz = self.io.read_u32(off).ok()? as u64;
                let descsz = self.io.read_u32(off + 4).ok()? as u64;
                let n_type = self.io.read_u32(off + 8).ok()?;
                let name_off = off + 12;
                let desc_off = (name_off + namesz + 3) & !3;
                if n_type == NT_GNU_BUILD_ID && namesz == 4 {
                    let mut name = [0u8; 4];
                    self.io.read_exact_at(name_off, &mut name).ok()?;
                    if &name == b"GNU\0" {
                        let mut desc = vec![0u8; descsz as usize];
                        self.io.read_exact_at(desc_off, &mut desc).ok()?;
                        return Some(desc);
                    }
                }
                off = (desc_off + descsz + 3) & !3;
            }
        }
        None
    }

    fn symbol_name(&self, shdr: &Shdr, sym: &Sym) -> Result<String, ReadError> {
        let strings = self
            .sections
            .get(shdr.sh_link as usize)
            .map(|s| s.sh_offset)
            .unwrap_or(0);
        self.io.read_string(strings + sym.st_name as u64, MAX_NAME)
    }

    /// Find the symbol covering `addr`, searching `.dynsym` then `.symtab`.
    ///
    /// A symbol with a size is accepted only if its range covers the address.
    /// Failing that, the zero-size symbol with the highest value at or below
    /// the address wins; this matches the dynamic stubs in stripped images.
    pub fn find_symbol_by_address(&self, addr: u64, symbol_type: u8) -> Option<(Sym, String)> {
        let mut best: Option<(Sym, String)> = None;
        let mut lowest = 0u64;
        for table in [".dynsym", ".symtab"] {
            let shdr = match self.section_by_name(table) {
                Some(s) => *s,
                None => continue,
            };
            let mut off = shdr.sh_offset;
            let end = shdr.sh_offset + shdr.sh_size;
            while off + SYM_SIZE <= end {
                let candidate = match read_sym(self.io.as_ref(), off) {
                    Ok(s) => s,
                    Err(_) => return best,
                };
                off += SYM_SIZE;
                let section = match self.sections.get(candidate.st_shndx as usize) {
                    Some(s) => s,
                    None => continue,
                };
                if section.sh_flags & SHF_ALLOC == 0 {
                    continue;
                }
                if symbol_type != STT_NOTYPE && candidate.symbol_type() != symbol_type {
                    continue;
                }
                if candidate.st_value > addr {
                    continue;
                }
                if candidate.st_size != 0 {
                    if candidate.st_value + candidate.st_size > addr {
                        let name = self.symbol_name(&shdr, &candidate).ok()?;
                        return Some((candidate, name));
                    }
                } else if lowest < candidate.st_value {
                    let name = self.symbol_name(&shdr, &candidate).ok()?;
                    best = Some((candidate, name));
                    lowest = candidate.st_value;
                }
            }
        }
        best
    }

    /// Find a symbol by name: the SysV hash table if present, then a linear
    /// scan of `.dynsym` and `.symtab`.
    pub fn find_symbol_by_name(&self, name: &str) -> Option<Sym> {
        if let Some(hash) = &self.hash {
            if let Some(sym) = hash.find(self, name) {
                return Some(sym);
            }
        }
        for table in [".dynsym", ".symtab"] {
            if let Some(shdr) = self.section_by_name(table).copied() {
                if let Some(sym) = self.linear_symbol_search(&shdr, name) {
                    return Some(sym);
                }
            }
        }
        None
    }

    fn linear_symbol_search(&self, shdr: &Shdr, name: &str) -> Option<Sym> {
        let mut off = shdr.sh_offset;
        let end = shdr.sh_offset + shdr.sh_size;
        while off + SYM_SIZE <= end {
            let candidate = read_sym(self.io.as_ref(), off).ok()?;
            off += SYM_SIZE;
            if self.symbol_name(shdr, &candidate).ok()? == name {
                return Some(candidate);
            }
        }
        None
    }
}

/// The SysV `.hash` section, read into memory up front.
struct SymHash {
    buckets: Vec<u32>,
    chains: Vec<u32>,
    symtab: Shdr,
}

impl SymHash {
    fn parse(obj: &ElfObject, hash: &Shdr) -> Result<Self, ReadError> {
        let io = obj.io.as_ref();
        let nbucket = io.read_u32(hash.sh_offset)? as usize;
        let nchain = io.read_u32(hash.sh_offset + 4)? as usize;
        let mut buckets = Vec::with_capacity(nbucket);
        let mut chains = Vec::with_capacity(nchain);
        let mut off = hash.sh_offset + 8;
        for _ in 0..nbucket {
            buckets.push(io.read_u32(off)?);
            off += 4;
        }
        for _ in 0..nchain {
            chains.push(io.read_u32(off)?);
            off += 4;
        }
        let symtab = obj
            .sections
            .get(hash.sh_link as usize)
            .copied()
            .unwrap_or_default();
        Ok(Self {
            buckets,
            chains,
            symtab,
        })
    }

    fn find(&self, obj: &ElfObject, name: &str) -> Option<Sym> {
        if self.buckets.is_empty() {
            return None;
        }
        let bucket = elf_hash(name) as usize % self.buckets.len();
        let mut index = self.buckets[bucket];
        while index != STN_UNDEF {
            let sym =
                read_sym(obj.io.as_ref(), self.symtab.sh_offset + index as u64 * SYM_SIZE).ok()?;
            if obj.symbol_name(&self.symtab, &sym).ok()? == name {
                return Some(sym);
            }
            index = *self.chains.get(index as usize)?;
        }
        None
    }
}

/// Culled from the System V Application Binary Interface.
fn elf_hash(name: &str) -> u32 {
    let mut h: u32 = 0;
    for c in name.bytes() {
        h = (h << 4).wrapping_add(c as u32);
        let g = h & 0xf000_0000;
        if g != 0 {
            h ^= g >> 24;
        }
        h &= !g;
    }
    h
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::reader::MemReader;
    use byteorder::{ByteOrder, LittleEndian};

    const EHDR_SIZE: u64 = 64;

    /// Incrementally assembles a little ELF64 image for tests.
    pub(crate) struct ElfBuilder {
        data: Vec<u8>,
        phdrs: Vec<Phdr>,
        sections: Vec<(String, Shdr)>,
    }

    impl ElfBuilder {
        pub(crate) fn new() -> Self {
            Self {
                data: vec![0u8; EHDR_SIZE as usize],
                phdrs: Vec::new(),
                sections: Vec::new(),
            }
        }

        pub(crate) fn append(&mut self, bytes: &[u8]) -> u64 {
            let off = self.data.len() as u64;
            self.data.extend_from_slice(bytes);
            off
        }

        pub(crate) fn phdr(&mut self, phdr: Phdr) {
            self.phdrs.push(phdr);
        }

        pub(crate) fn section(&mut self, name: &str, bytes: &[u8], addr: u64) -> u64 {
            let offset = self.append(bytes);
            self.sections.push((
                name.to_string(),
                Shdr {
                    sh_type: 1,
                    sh_flags: SHF_ALLOC,
                    sh_addr: addr,
                    sh_offset: offset,
                    sh_size: bytes.len() as u64,
                    ..Default::default()
                },
            ));
            offset
        }

        pub(crate) fn section_linked(&mut self, name: &str, bytes: &[u8], link: u32) {
            let offset = self.append(bytes);
            self.sections.push((
                name.to_string(),
                Shdr {
                    sh_type: 1,
                    sh_flags: SHF_ALLOC,
                    sh_offset: offset,
                    sh_size: bytes.len() as u64,
                    sh_link: link,
                    ..Default::default()
                },
            ));
        }

        pub(crate) fn build(mut self) -> Vec<u8> {
            // Section 0 is the null section; shstrtab goes last.
            let mut shstrtab = vec![0u8];
            let mut name_offsets = vec![0u32];
            for (name, _) in &self.sections {
                name_offsets.push(shstrtab.len() as u32);
                shstrtab.extend_from_slice(name.as_bytes());
                shstrtab.push(0);
            }
            let strname_off = shstrtab.len() as u32;
            shstrtab.extend_from_slice(b".shstrtab\0");
            let shstrtab_off = self.append(&shstrtab);

            let phoff = self.data.len() as u64;
            for p in &self.phdrs {
                let mut buf = [0u8; PHDR_SIZE as usize];
                LittleEndian::write_u32(&mut buf[0..], p.p_type);
                LittleEndian::write_u32(&mut buf[4..], p.p_flags);
                LittleEndian::write_u64(&mut buf[8..], p.p_offset);
                LittleEndian::write_u64(&mut buf[16..], p.p_vaddr);
                LittleEndian::write_u64(&mut buf[24..], p.p_vaddr);
                LittleEndian::write_u64(&mut buf[32..], p.p_filesz);
                LittleEndian::write_u64(&mut buf[40..], p.p_memsz);
                self.data.extend_from_slice(&buf);
            }

            let shoff = self.data.len() as u64;
            let mut shdrs: Vec<(u32, Shdr)> = vec![(0, Shdr::default())];
            for (i, (_, shdr)) in self.sections.iter().enumerate() {
                shdrs.push((name_offsets[i + 1], *shdr));
            }
            shdrs.push((
                strname_off,
                Shdr {
                    sh_type: 3,
                    sh_offset: shstrtab_off,
                    sh_size: shstrtab.len() as u64,
                    ..Default::default()
                },
            ));
            let shnum = shdrs.len() as u16;
            for (name, s) in &shdrs {
                let mut buf = [0u8; SHDR_SIZE as usize];
                LittleEndian::write_u32(&mut buf[0..], *name);
                LittleEndian::write_u32(&mut buf[4..], s.sh_type);
                LittleEndian::write_u64(&mut buf[8..], s.sh_flags);
                LittleEndian::write_u64(&mut buf[16..], s.sh_addr);
                LittleEndian::write_u64(&mut buf[24..], s.sh_offset);
                LittleEndian::write_u64(&mut buf[32..], s.sh_size);
                LittleEndian::write_u32(&mut buf[40..], s.sh_link);
                self.data.extend_from_slice(&buf);
            }

            // Now fill in the ELF header.
            let d = &mut self.data;
            d[0..4].copy_from_slice(b"\x7fELF");
            d[4] = ELFCLASS64;
            d[5] = ELFDATA2LSB;
            d[6] = EV_CURRENT;
            LittleEndian::write_u16(&mut d[16..], 2); // ET_EXEC
            LittleEndian::write_u16(&mut d[18..], 62); // EM_X86_64
            LittleEndian::write_u64(&mut d[32..], phoff);
            LittleEndian::write_u64(&mut d[40..], shoff);
            LittleEndian::write_u16(&mut d[54..], PHDR_SIZE as u16);
            LittleEndian::write_u16(&mut d[56..], self.phdrs.len() as u16);
            LittleEndian::write_u16(&mut d[58..], SHDR_SIZE as u16);
            LittleEndian::write_u16(&mut d[60..], shnum);
            LittleEndian::write_u16(&mut d[62..], shnum - 1);
            self.data
        }
    }

    pub(crate) fn sym_bytes(syms: &[Sym]) -> Vec<u8> {
        let mut out = Vec::new();
        for s in syms {
            let mut buf = [0u8; SYM_SIZE as usize];
            LittleEndian::write_u32(&mut buf[0..], s.st_name);
            buf[4] = s.st_info;
            LittleEndian::write_u16(&mut buf[6..], s.st_shndx);
            LittleEndian::write_u64(&mut buf[8..], s.st_value);
            LittleEndian::write_u64(&mut buf[16..], s.st_size);
            out.extend_from_slice(&buf);
        }
        out
    }

    fn sample_object() -> Arc<ElfObject> {
        let mut b = ElfBuilder::new();
        b.phdr(Phdr {
            p_type: PT_LOAD,
            p_flags: 5,
            p_offset: 0,
            p_vaddr: 0x400000,
            p_filesz: 0x2000,
            p_memsz: 0x2000,
        });
        b.section(".text", &[0x90u8; 32], 0x401000);
        // Symbols refer to section index 1 (.text); strtab will be index 3.
        let syms = sym_bytes(&[
            Sym::default(),
            Sym {
                st_name: 1,
                st_info: STT_FUNC,
                st_shndx: 1,
                st_value: 0x401000,
                st_size: 0x10,
            },
            Sym {
                st_name: 6,
                st_info: STT_FUNC,
                st_shndx: 1,
                st_value: 0x401010,
                st_size: 0,
            },
        ]);
        b.section_linked(".symtab", &syms, 3);
        b.section_linked(".strtab", b"\0main\0stub\0", 0);
        let image = b.build();
        ElfObject::parse(Arc::new(MemReader::new("test.elf", image))).unwrap()
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let r = Arc::new(MemReader::new("junk", vec![0u8; 128]));
        assert!(matches!(ElfObject::parse(r), Err(ElfError::NotElf(_))));
    }

    #[test]
    fn test_sections_and_segments() {
        let obj = sample_object();
        assert_eq!(obj.segments(PT_LOAD).len(), 1);
        assert!(obj.segments(PT_DYNAMIC).is_empty());
        assert!(obj.section_by_name(".text").is_some());
        assert!(obj.section_by_name(".debug_info").is_none());
        assert_eq!(obj.base(), 0x400000);
    }

    #[test]
    fn test_symbol_by_address() {
        let obj = sample_object();
        let (sym, name) = obj.find_symbol_by_address(0x401004, STT_FUNC).unwrap();
        assert_eq!(name, "main");
        assert_eq!(sym.st_value, 0x401000);
        // Past the sized symbol: fall back to the highest zero-size symbol.
        let (_, name) = obj.find_symbol_by_address(0x401100, STT_FUNC).unwrap();
        assert_eq!(name, "stub");
        assert!(obj.find_symbol_by_address(0x400500, STT_FUNC).is_none());
    }

    #[test]
    fn test_symbol_by_name() {
        let obj = sample_object();
        let sym = obj.find_symbol_by_name("main").unwrap();
        assert_eq!(sym.st_value, 0x401000);
        assert!(obj.find_symbol_by_name("no_such_symbol").is_none());
    }

    #[test]
    fn test_interp_and_build_id() {
        let mut b = ElfBuilder::new();
        let interp = b.append(b"/lib64/ld-linux-x86-64.so.2\0");
        b.phdr(Phdr {
            p_type: PT_INTERP,
            p_flags: 4,
            p_offset: interp,
            p_vaddr: 0,
            p_filesz: 28,
            p_memsz: 28,
        });
        let mut note = Vec::new();
        note.extend_from_slice(&4u32.to_le_bytes()); // namesz
        note.extend_from_slice(&8u32.to_le_bytes()); // descsz
        note.extend_from_slice(&NT_GNU_BUILD_ID.to_le_bytes());
        note.extend_from_slice(b"GNU\0");
        note.extend_from_slice(&[0xca, 0xfe, 0xba, 0xbe, 0xde, 0xad, 0xbe, 0xef]);
        let note_off = b.append(&note);
        b.phdr(Phdr {
            p_type: PT_NOTE,
            p_flags: 4,
            p_offset: note_off,
            p_vaddr: 0,
            p_filesz: note.len() as u64,
            p_memsz: note.len() as u64,
        });
        b.section(".text", &[0x90; 4], 0x1000);
        let image = b.build();
        let obj = ElfObject::parse(Arc::new(MemReader::new("exe", image))).unwrap();
        assert_eq!(obj.interpreter(), Some("/lib64/ld-linux-x86-64.so.2"));
        assert_eq!(
            obj.build_id(),
            Some(vec![0xca, 0xfe, 0xba, 0xbe, 0xde, 0xad, 0xbe, 0xef])
        );
    }

    #[test]
    fn test_elf_hash() {
        // Reference values for the System V hash function.
        assert_eq!(elf_hash(""), 0);
        assert_eq!(elf_hash("printf"), 0x077905a6);
    }
}
