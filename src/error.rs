//! Error types for ELF and DWARF decoding.
//!
//! Every variant carries the byte offset at which decoding went wrong so
//! that malformed or unsupported producer output can be diagnosed. The
//! `InUnit` and `InLineProgram` wrappers attach the structural context
//! (which compile unit, which line program) on the way out.

use thiserror::Error;

use crate::formats::dwarf::constants::DwForm;

/// Main error type for decoding operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The first four bytes are not `\x7fELF`
    #[error("Invalid ELF magic")]
    InvalidMagic,

    /// `EI_CLASS` is neither ELFCLASS32 nor ELFCLASS64
    #[error("Invalid ELF class: {0}")]
    InvalidClass(u8),

    /// `EI_DATA` is neither little nor big endian
    #[error("Invalid ELF byte order: {0}")]
    InvalidByteOrder(u8),

    /// A primitive read ran past the end of its view
    #[error("Truncated at {offset:#x}, needed {needed} bytes")]
    Truncated { offset: usize, needed: usize },

    /// A header table or section range exceeds the file buffer
    #[error("Table at {offset:#x} of {size} bytes exceeds buffer of {len} bytes")]
    TruncatedTable { offset: u64, size: u64, len: usize },

    /// The section-name string table index is bad
    #[error("Section {index} is not a valid string table")]
    InvalidStringTable { index: usize },

    /// A string is not valid UTF-8
    #[error("String at {offset:#x} is not UTF-8")]
    InvalidString { offset: usize },

    /// A section required for the requested operation is absent
    #[error("Missing section: {0}")]
    MissingSection(&'static str),

    /// A DIE referenced an abbreviation code its unit does not declare
    #[error("Unknown abbreviation code {code} at offset {offset:#x}")]
    UnknownAbbreviationCode { code: u64, offset: usize },

    /// An abbreviation declaration with an out-of-range code or children flag
    #[error("Malformed abbreviation declaration at offset {offset:#x}")]
    InvalidAbbreviation { offset: usize },

    /// A line-program header field that would make decoding meaningless
    #[error("Invalid line program header field {field} at offset {offset:#x}")]
    InvalidLineHeader { field: &'static str, offset: usize },

    /// An attribute form the decoder does not know how to size
    #[error("Unknown attribute form {form} at offset {offset:#x}")]
    UnknownForm { form: DwForm, offset: usize },

    /// An indexed form that needs a base-offset table
    #[error("Unsupported indirect form {form} at offset {offset:#x}")]
    UnsupportedIndirectForm { form: DwForm, offset: usize },

    /// A standard line-program opcode with no defined meaning
    #[error("Invalid standard opcode {opcode} at offset {offset:#x}")]
    InvalidStandardOpcode { opcode: u8, offset: usize },

    /// A DWARF 5 unit header with an unrecognized unit type
    #[error("Unknown unit type {unit_type:#x} at offset {offset:#x}")]
    UnknownUnitType { unit_type: u8, offset: usize },

    /// A unit or line-program version outside 2..=5
    #[error("Unsupported DWARF version {version} at offset {offset:#x}")]
    UnsupportedVersion { version: u16, offset: usize },

    /// A unit or line-program address size that is not 1, 2, 4 or 8
    #[error("Invalid address size {size} at offset {offset:#x}")]
    InvalidAddressSize { size: u8, offset: usize },

    /// DIE nesting deeper than the configured limit
    #[error("DIE nesting depth {depth} exceeded at offset {offset:#x}")]
    DepthLimitExceeded { depth: usize, offset: usize },

    /// Context: the inner error happened while decoding a compile unit
    #[error("In compile unit at {unit_offset:#x}: {source}")]
    InUnit {
        unit_offset: usize,
        #[source]
        source: Box<Error>,
    },

    /// Context: the inner error happened while decoding a line program
    #[error("In line program at {offset:#x}: {source}")]
    InLineProgram {
        offset: usize,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Strip context wrappers and return the underlying error kind.
    pub fn root(&self) -> &Error {
        match self {
            Error::InUnit { source, .. } | Error::InLineProgram { source, .. } => source.root(),
            other => other,
        }
    }

    pub(crate) fn in_unit(self, unit_offset: usize) -> Error {
        Error::InUnit {
            unit_offset,
            source: Box::new(self),
        }
    }

    pub(crate) fn in_line_program(self, offset: usize) -> Error {
        Error::InLineProgram {
            offset,
            source: Box::new(self),
        }
    }
}

/// Result type alias for decoding operations
pub type Result<T> = std::result::Result<T, Error>;
