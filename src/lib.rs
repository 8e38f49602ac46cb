//! Zero-copy ELF and DWARF decoding.
//!
//! ```no_run
//! # fn run(bytes: &[u8]) -> elfdwarf::Result<()> {
//! use elfdwarf::{DecodeConfig, ElfFile, Symbolizer};
//!
//! let elf = ElfFile::parse(bytes)?;
//! let dwarf = elf.dwarf()?;
//! let config = DecodeConfig::default();
//! if let Some(loc) = Symbolizer::new(&elf, &dwarf, &config).lookup(0x1000)? {
//!     println!("{:?} {:?}:{}", loc.function, loc.file, loc.line);
//! }
//! # Ok(())
//! # }
//! ```

/// Decoder configuration
pub mod config;
/// Rust and Itanium C++ name demangling
pub mod demangle;
/// Error types
pub mod error;
/// ELF container and DWARF debug-info decoders
pub mod formats;
/// Tracing subscriber setup and logging macros
pub mod logging;

pub use config::DecodeConfig;
pub use error::{Error, Result};
pub use formats::dwarf::{CompileUnit, DwarfInfo, DwarfSections, LineProgram, Location, Symbolizer};
pub use formats::elf::ElfFile;
