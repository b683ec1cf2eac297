//! This crate extracts symbolic, multi-threaded stack traces from a stopped
//! process or core dump of a native ELF binary. Given the process's loaded
//! objects and a byte-addressable view of its memory, it unwinds each
//! thread's stack through the DWARF Call Frame Information and annotates
//! every frame with function, source position and (optionally) argument
//! values from `.debug_info`.
//!
//! The attach machinery stays outside: whoever stops the process supplies a
//! [Reader] over its memory, registers the loaded objects at their biases,
//! and hands over one register set per thread.
//!
//! ```no_run
//! use std::sync::Arc;
//! use procstack::{ElfObject, FileReader, Process, Registers, Thread, TraceOptions};
//!
//! fn main() -> procstack::Result<()> {
//!     let exe = ElfObject::parse(Arc::new(FileReader::open("/proc/1234/exe")?))?;
//!     let mem = Arc::new(FileReader::open("/proc/1234/mem")?);
//!     let mut process = Process::new(mem, TraceOptions::default());
//!     process.add_object(0, exe);
//!
//!     // One register set per stopped thread, from ptrace or a core note.
//!     let registers = Registers::default();
//!     for stack in process.trace([Thread { id: 1234, kind: 0, registers }]) {
//!         println!("thread: {}", stack.id);
//!         for frame in &stack.frames {
//!             match &frame.symbol {
//!                 Some(sym) => println!(
//!                     "    {:#x} {}+{:#x}",
//!                     frame.ip,
//!                     sym.function.as_deref().unwrap_or("unknown"),
//!                     sym.offset
//!                 ),
//!                 None => println!("    {:#x}", frame.ip),
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Sample output:
//! ```text
//! thread: 1234
//!     0x401234 main+0x234
//!     0x7f3a0c029d90 __libc_start_call_main+0x80
//!     0x7f3a0c029e40 __libc_start_main+0x80
//!     0x401075 _start+0x25
//! ```

pub mod cursor;
pub mod dwarf;
pub mod elf;
pub mod process;
pub mod reader;
pub mod registers;

pub use cursor::{ArgValue, Frame, FrameArg, FrameSymbol, Thread, ThreadStack, UnwindCursor};
pub use dwarf::{DwarfError, DwarfInfo};
pub use elf::{ElfError, ElfObject};
pub use process::{LoadedObject, Process, TraceOptions, UnwindStep};
pub use reader::{FileReader, MemReader, OffsetReader, ReadError, Reader};
pub use registers::{Registers, DWARF_IP, DWARF_MAX_REG, DWARF_SP};

/// A result type that wraps [Error].
pub type Result<T> = std::result::Result<T, Error>;

/// Error definition.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Dwarf(#[from] DwarfError),

    #[error("{0}")]
    Elf(#[from] ElfError),

    #[error("{0}")]
    Read(#[from] ReadError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Fatal attach-time misconfiguration: a missing executable image or
    /// an unresolvable path.
    #[error("{0}")]
    Config(String),
}
