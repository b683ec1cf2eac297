use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};

/// Error raised by [Reader] implementations.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("short read from {store} at {offset:#x}: wanted {wanted} bytes, got {got}")]
    Short {
        store: String,
        offset: u64,
        wanted: usize,
        got: usize,
    },

    #[error("read from {store} at {offset:#x}: {error}")]
    Io {
        store: String,
        offset: u64,
        error: std::io::Error,
    },

    #[error("unterminated string in {store} at {offset:#x}")]
    UnterminatedString { store: String, offset: u64 },
}

/// A byte-addressable random-access view of some backing store: an ELF image
/// on disk, the address space of a stopped process, or a core dump.
///
/// Readers are acquired once at attach time and shared; cursors derived from
/// them borrow the reader and never own it.
pub trait Reader: Send + Sync {
    /// Read up to `buf.len()` bytes starting at `offset`. Returns the number
    /// of bytes actually read, which may be short at end of store.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, ReadError>;

    /// A human-readable label for diagnostics (a path, "core", ...).
    fn describe(&self) -> String;

    /// Fill `buf` entirely or fail.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), ReadError> {
        let got = self.read_at(offset, buf)?;
        if got != buf.len() {
            return Err(ReadError::Short {
                store: self.describe(),
                offset,
                wanted: buf.len(),
                got,
            });
        }
        Ok(())
    }

    fn read_u8(&self, offset: u64) -> Result<u8, ReadError> {
        let mut buf = [0u8; 1];
        self.read_exact_at(offset, &mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&self, offset: u64) -> Result<u16, ReadError> {
        let mut buf = [0u8; 2];
        self.read_exact_at(offset, &mut buf)?;
        Ok(LittleEndian::read_u16(&buf))
    }

    fn read_u32(&self, offset: u64) -> Result<u32, ReadError> {
        let mut buf = [0u8; 4];
        self.read_exact_at(offset, &mut buf)?;
        Ok(LittleEndian::read_u32(&buf))
    }

    fn read_u64(&self, offset: u64) -> Result<u64, ReadError> {
        let mut buf = [0u8; 8];
        self.read_exact_at(offset, &mut buf)?;
        Ok(LittleEndian::read_u64(&buf))
    }

    /// Read a NUL-terminated string. `max` bounds the scan so a missing
    /// terminator cannot run away.
    fn read_string(&self, offset: u64, max: usize) -> Result<String, ReadError> {
        let mut out = Vec::new();
        let mut off = offset;
        loop {
            let b = self.read_u8(off)?;
            if b == 0 {
                return Ok(String::from_utf8_lossy(&out).into_owned());
            }
            if out.len() >= max {
                return Err(ReadError::UnterminatedString {
                    store: self.describe(),
                    offset,
                });
            }
            out.push(b);
            off += 1;
        }
    }
}

/// Reader over a file on disk.
pub struct FileReader {
    path: PathBuf,
    file: File,
}

impl FileReader {
    pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            file,
        })
    }
}

impl Reader for FileReader {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, ReadError> {
        let mut done = 0;
        while done < buf.len() {
            match self.file.read_at(&mut buf[done..], offset + done as u64) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(ReadError::Io {
                        store: self.describe(),
                        offset,
                        error: e,
                    })
                }
            }
        }
        Ok(done)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Reader over an in-memory buffer, e.g. a vdso image captured from a
/// process, or a test fixture.
pub struct MemReader {
    label: String,
    data: Vec<u8>,
}

impl MemReader {
    pub fn new<S: Into<String>>(label: S, data: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            data,
        }
    }
}

impl Reader for MemReader {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, ReadError> {
        if offset >= self.data.len() as u64 {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// A window `[offset, offset + length)` over another reader, re-based to 0.
pub struct OffsetReader {
    upstream: Arc<dyn Reader>,
    offset: u64,
    length: u64,
}

impl OffsetReader {
    pub fn new(upstream: Arc<dyn Reader>, offset: u64, length: u64) -> Self {
        Self {
            upstream,
            offset,
            length,
        }
    }
}

impl Reader for OffsetReader {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, ReadError> {
        if offset >= self.length {
            return Ok(0);
        }
        let n = buf.len().min((self.length - offset) as usize);
        self.upstream.read_at(self.offset + offset, &mut buf[..n])
    }

    fn describe(&self) -> String {
        format!(
            "{}[{:#x},{:#x}]",
            self.upstream.describe(),
            self.offset,
            self.offset + self.length
        )
    }
}

/// Sparse address space for tests: a set of `(base, bytes)` mappings.
#[cfg(test)]
pub(crate) struct SparseMem {
    pub regions: Vec<(u64, Vec<u8>)>,
}

#[cfg(test)]
impl Reader for SparseMem {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, ReadError> {
        for (base, data) in &self.regions {
            if offset >= *base && offset < *base + data.len() as u64 {
                let start = (offset - base) as usize;
                let n = buf.len().min(data.len() - start);
                buf[..n].copy_from_slice(&data[start..start + n]);
                return Ok(n);
            }
        }
        Ok(0)
    }

    fn describe(&self) -> String {
        "sparse memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_reader() {
        let r = MemReader::new("mem", vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(r.read_u8(0).unwrap(), 1);
        assert_eq!(r.read_u16(0).unwrap(), 0x0201);
        assert_eq!(r.read_u32(2).unwrap(), 0x06050403);
        assert_eq!(r.read_u64(0).unwrap(), 0x0807060504030201);
        assert!(r.read_u64(1).is_err());
        assert!(r.read_u8(8).is_err());
    }

    #[test]
    fn test_read_string() {
        let r = MemReader::new("mem", b"hello\0world".to_vec());
        assert_eq!(r.read_string(0, 100).unwrap(), "hello");
        assert!(r.read_string(6, 100).is_err()); // no terminator before EOF
        assert!(r.read_string(0, 3).is_err()); // bound exceeded
    }

    #[test]
    fn test_offset_reader() {
        let upstream = Arc::new(MemReader::new("mem", (0..16).collect()));
        let r = OffsetReader::new(upstream, 4, 8);
        assert_eq!(r.read_u8(0).unwrap(), 4);
        assert_eq!(r.read_u8(7).unwrap(), 11);
        assert!(r.read_u8(8).is_err());
        let mut buf = [0u8; 16];
        assert_eq!(r.read_at(6, &mut buf).unwrap(), 2);
    }
}
