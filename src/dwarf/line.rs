//! The `.debug_line` state machine. Executing a unit's line program yields a
//! matrix of rows mapping code addresses to source positions.

use crate::dwarf::consts::*;
use crate::dwarf::stream::DwarfReader;
use crate::dwarf::DwarfError;

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: String,
    pub directory: u64,
    pub mtime: u64,
    pub length: u64,
}

/// One emitted row of the line matrix.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LineRow {
    pub address: u64,
    pub file: u64,
    pub line: i64,
    pub column: u64,
    pub is_stmt: bool,
    pub basic_block: bool,
    pub end_sequence: bool,
}

#[derive(Debug, Default)]
pub struct LineProgram {
    pub default_is_stmt: bool,
    pub directories: Vec<String>,
    pub files: Vec<FileEntry>,
    pub matrix: Vec<LineRow>,
}

struct State {
    row: LineRow,
}

impl State {
    fn reset(default_is_stmt: bool) -> Self {
        Self {
            row: LineRow {
                address: 0,
                file: 1,
                line: 1,
                column: 0,
                is_stmt: default_is_stmt,
                basic_block: false,
                end_sequence: false,
            },
        }
    }
}

impl LineProgram {
    /// Execute the line program at the cursor. The cursor's address size
    /// must already reflect the owning compile unit.
    pub fn parse(r: &mut DwarfReader) -> Result<Self, DwarfError> {
        let total_length = r.initial_length()?;
        let end = r.offset() + total_length;
        let version = r.u16()?;
        if !(2..=4).contains(&version) {
            return Err(DwarfError::UnsupportedLineVersion(version));
        }
        let prologue_length = r.fmt_uint()?;
        let prologue_end = r.offset() + prologue_length;
        let min_insn_length = r.u8()? as u64;
        if version >= 4 {
            let _max_ops_per_insn = r.u8()?;
        }
        let default_is_stmt = r.u8()? != 0;
        let line_base = r.i8()? as i64;
        let line_range = r.u8()? as u64;
        if line_range == 0 {
            return Err(DwarfError::BadLineRange);
        }
        let opcode_base = r.u8()?;
        let mut opcode_lengths = Vec::with_capacity(opcode_base.saturating_sub(1) as usize);
        for _ in 1..opcode_base {
            opcode_lengths.push(r.u8()?);
        }

        // Directory index 0 is the compilation directory.
        let mut directories = vec![String::new()];
        loop {
            let dir = r.string()?;
            if dir.is_empty() {
                break;
            }
            directories.push(dir);
        }

        // File index 0 is reserved.
        let mut files = vec![FileEntry {
            name: "unknown".to_string(),
            directory: 0,
            mtime: 0,
            length: 0,
        }];
        loop {
            let name = r.string()?;
            if name.is_empty() {
                break;
            }
            files.push(FileEntry {
                name,
                directory: r.uleb128()?,
                mtime: r.uleb128()?,
                length: r.uleb128()?,
            });
        }

        // Tolerate unconsumed prologue bytes.
        if r.offset() < prologue_end {
            log::debug!(
                "skipping {} bytes left in line program prologue",
                prologue_end - r.offset()
            );
            r.set_offset(prologue_end);
        }

        let mut program = Self {
            default_is_stmt,
            directories,
            files,
            matrix: Vec::new(),
        };

        let mut state = State::reset(default_is_stmt);
        while r.offset() < end {
            let opcode = r.u8()?;
            if opcode >= opcode_base {
                // Special opcode.
                let adj = (opcode - opcode_base) as u64;
                state.row.address += (adj / line_range) * min_insn_length;
                state.row.line += line_base + (adj % line_range) as i64;
                program.matrix.push(state.row);
                state.row.basic_block = false;
            } else if opcode == 0 {
                // Extended opcode.
                let length = r.uleb128()?;
                let sub = r.u8()?;
                match sub {
                    DW_LNE_END_SEQUENCE => {
                        state.row.end_sequence = true;
                        program.matrix.push(state.row);
                        state = State::reset(default_is_stmt);
                    }
                    DW_LNE_SET_ADDRESS => {
                        state.row.address = r.uint(r.addr_size)?;
                    }
                    DW_LNE_SET_DISCRIMINATOR => {
                        let _ = r.uleb128()?;
                    }
                    _ => {
                        r.skip(length.saturating_sub(1))?;
                    }
                }
            } else {
                // Standard opcode.
                match opcode {
                    DW_LNS_COPY => {
                        program.matrix.push(state.row);
                        state.row.basic_block = false;
                    }
                    DW_LNS_ADVANCE_PC => {
                        state.row.address += r.uleb128()? * min_insn_length;
                    }
                    DW_LNS_ADVANCE_LINE => {
                        state.row.line += r.sleb128()?;
                    }
                    DW_LNS_SET_FILE => {
                        state.row.file = r.uleb128()?;
                    }
                    DW_LNS_SET_COLUMN => {
                        state.row.column = r.uleb128()?;
                    }
                    DW_LNS_NEGATE_STMT => {
                        state.row.is_stmt = !state.row.is_stmt;
                    }
                    DW_LNS_SET_BASIC_BLOCK => {
                        state.row.basic_block = true;
                    }
                    DW_LNS_CONST_ADD_PC => {
                        let adj = (255 - opcode_base) as u64;
                        state.row.address += (adj / line_range) * min_insn_length;
                    }
                    DW_LNS_FIXED_ADVANCE_PC => {
                        state.row.address += r.u16()? as u64 * min_insn_length;
                    }
                    _ => {
                        // Vendor opcode: its operand count is declared in
                        // the prologue.
                        let args = opcode_lengths
                            .get(opcode as usize - 1)
                            .copied()
                            .unwrap_or(0);
                        for _ in 0..args {
                            let _ = r.uleb128()?;
                        }
                    }
                }
            }
        }
        Ok(program)
    }

    /// Index of the row whose half-open address span covers `addr`.
    pub fn find_row(&self, addr: u64) -> Option<usize> {
        for i in 0..self.matrix.len().saturating_sub(1) {
            if self.matrix[i].end_sequence {
                continue;
            }
            if self.matrix[i].address <= addr && addr < self.matrix[i + 1].address {
                return Some(i);
            }
        }
        None
    }

    /// Render the source position of a matrix row as `(path, line)`.
    pub fn source(&self, index: usize) -> Option<(String, u64)> {
        let row = self.matrix.get(index)?;
        let file = self.files.get(row.file as usize)?;
        let dir = self
            .directories
            .get(file.directory as usize)
            .map(String::as_str)
            .unwrap_or("");
        let path = if dir.is_empty() {
            file.name.clone()
        } else {
            format!("{}/{}", dir, file.name)
        };
        Some((path, row.line.max(0) as u64))
    }
}
