//! Line-number programs (`.debug_line`).
//!
//! A program is a byte-code stream run against a small register file
//! ([`LineState`]). Decoding records one [`LineProgramEntry`] per
//! instruction that has an externally visible effect; the entries that
//! append a row to the line table carry a copy of the registers.
//!
//! Decoding is lazy and memoized per program.

use once_cell::unsync::OnceCell;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::formats::dwarf::constants::*;
use crate::formats::dwarf::form::{decode_form, StringSections};
use crate::formats::dwarf::reader::{Encoding, Reader};
use crate::formats::elf::types::ByteOrder;

/// A file-table entry from the header or from `DW_LNE_define_file`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileEntry<'data> {
    pub path: &'data str,
    pub directory_index: u64,
    pub mtime: u64,
    pub length: u64,
    pub md5: Option<[u8; 16]>,
}

/// A DWARF 5 entry-format descriptor: which field, in which form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryFormat {
    pub content_type: DwLnct,
    pub form: DwForm,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineProgramHeader<'data> {
    /// Offset of the header in `.debug_line`
    pub offset: usize,
    pub unit_length: u64,
    pub encoding: Encoding,
    pub segment_selector_size: u8,
    pub header_length: u64,
    pub minimum_instruction_length: u8,
    pub maximum_operations_per_instruction: u8,
    pub default_is_stmt: bool,
    pub line_base: i8,
    pub line_range: u8,
    pub opcode_base: u8,
    pub standard_opcode_lengths: Vec<u8>,
    pub directory_entry_format: Vec<EntryFormat>,
    pub include_directories: Vec<&'data str>,
    pub file_name_entry_format: Vec<EntryFormat>,
    pub file_names: Vec<FileEntry<'data>>,
    /// First opcode of the program
    pub program_offset: usize,
    /// One past the last byte of the program
    pub end_offset: usize,
}

impl<'data> LineProgramHeader<'data> {
    /// Parse the header at `offset`.
    ///
    /// `address_size` comes from the owning unit and is only used before
    /// DWARF 5, whose header records its own.
    pub fn parse(
        debug_line: &'data [u8],
        offset: usize,
        order: ByteOrder,
        address_size: u8,
        strings: &StringSections<'data>,
    ) -> Result<Self> {
        let mut reader = Reader::at(debug_line, offset, order);
        let (unit_length, format) = reader.read_initial_length()?;
        let end_offset = usize::try_from(unit_length)
            .ok()
            .and_then(|len| reader.offset().checked_add(len))
            .filter(|&end| end <= debug_line.len())
            .ok_or(Error::Truncated {
                offset,
                needed: unit_length.saturating_add(format.initial_length_size() as u64) as usize,
            })?;
        let mut reader = Reader::bounded(debug_line, reader.offset(), end_offset, order)?;

        let version_at = reader.offset();
        let version = reader.read_u16()?;
        if !(2..=5).contains(&version) {
            return Err(Error::UnsupportedVersion {
                version,
                offset: version_at,
            });
        }

        let (address_size, segment_selector_size) = if version >= 5 {
            let at = reader.offset();
            let size = reader.read_u8()?;
            if !matches!(size, 1 | 2 | 4 | 8) {
                return Err(Error::InvalidAddressSize { size, offset: at });
            }
            (size, reader.read_u8()?)
        } else {
            (address_size, 0)
        };
        let encoding = Encoding {
            format,
            version,
            address_size,
        };

        let header_length = reader.read_offset(format)?;
        let program_offset = usize::try_from(header_length)
            .ok()
            .and_then(|len| reader.offset().checked_add(len))
            .filter(|&start| start <= end_offset)
            .ok_or(Error::Truncated {
                offset: reader.offset(),
                needed: header_length as usize,
            })?;

        let minimum_instruction_length = reader.read_u8()?;
        let maximum_operations_per_instruction = if version >= 4 {
            reader.read_u8()?
        } else {
            1
        };
        let default_is_stmt = reader.read_u8()? != 0;
        let line_base = reader.read_i8()?;
        let range_at = reader.offset();
        let line_range = reader.read_u8()?;
        if line_range == 0 {
            return Err(Error::InvalidLineHeader {
                field: "line_range",
                offset: range_at,
            });
        }
        let base_at = reader.offset();
        let opcode_base = reader.read_u8()?;
        if opcode_base == 0 {
            return Err(Error::InvalidLineHeader {
                field: "opcode_base",
                offset: base_at,
            });
        }
        let standard_opcode_lengths = reader.read_bytes(usize::from(opcode_base - 1))?.to_vec();

        let mut header = Self {
            offset,
            unit_length,
            encoding,
            segment_selector_size,
            header_length,
            minimum_instruction_length,
            maximum_operations_per_instruction,
            default_is_stmt,
            line_base,
            line_range,
            opcode_base,
            standard_opcode_lengths,
            directory_entry_format: Vec::new(),
            include_directories: Vec::new(),
            file_name_entry_format: Vec::new(),
            file_names: Vec::new(),
            program_offset,
            end_offset,
        };

        if version >= 5 {
            header.directory_entry_format = parse_entry_formats(&mut reader)?;
            let count = reader.read_uleb128()?;
            for _ in 0..count {
                let entry =
                    parse_entry(&mut reader, &header.directory_entry_format, encoding, strings)?;
                header.include_directories.push(entry.path);
            }
            header.file_name_entry_format = parse_entry_formats(&mut reader)?;
            let count = reader.read_uleb128()?;
            for _ in 0..count {
                let entry =
                    parse_entry(&mut reader, &header.file_name_entry_format, encoding, strings)?;
                header.file_names.push(entry);
            }
        } else {
            loop {
                let dir = reader.read_cstr()?;
                if dir.is_empty() {
                    break;
                }
                header.include_directories.push(dir);
            }
            loop {
                let path = reader.read_cstr()?;
                if path.is_empty() {
                    break;
                }
                header.file_names.push(parse_legacy_file(&mut reader, path)?);
            }
        }

        debug!(
            offset,
            version,
            directories = header.include_directories.len(),
            files = header.file_names.len(),
            "line program header"
        );
        Ok(header)
    }

    pub fn version(&self) -> u16 {
        self.encoding.version
    }

    /// `maximum_operations_per_instruction`, with 0 read as 1
    pub fn ops_per_instruction(&self) -> u8 {
        self.maximum_operations_per_instruction.max(1)
    }

    /// Index of the first file-table entry: 1 before DWARF 5, 0 since
    pub fn file_index_base(&self) -> u64 {
        if self.version() >= 5 {
            0
        } else {
            1
        }
    }

    /// Include directory by its version-dependent index.
    ///
    /// Before DWARF 5 index 0 is the unit's compilation directory, which
    /// the header does not record.
    pub fn directory(&self, index: u64) -> Option<&'data str> {
        let index = if self.version() >= 5 {
            index
        } else {
            index.checked_sub(1)?
        };
        self.include_directories
            .get(usize::try_from(index).ok()?)
            .copied()
    }
}

fn parse_entry_formats(reader: &mut Reader<'_>) -> Result<Vec<EntryFormat>> {
    let count = reader.read_u8()?;
    let mut formats = Vec::with_capacity(count.into());
    for _ in 0..count {
        let at = reader.offset();
        let narrow = |v: u64| {
            u16::try_from(v).map_err(|_| Error::InvalidLineHeader {
                field: "entry format",
                offset: at,
            })
        };
        let content_type = DwLnct(narrow(reader.read_uleb128()?)?);
        let form = DwForm(narrow(reader.read_uleb128()?)?);
        formats.push(EntryFormat { content_type, form });
    }
    Ok(formats)
}

/// One DWARF 5 directory or file record; unknown content types are skipped.
fn parse_entry<'data>(
    reader: &mut Reader<'data>,
    formats: &[EntryFormat],
    encoding: Encoding,
    strings: &StringSections<'data>,
) -> Result<FileEntry<'data>> {
    let mut entry = FileEntry::default();
    for format in formats {
        let value = decode_form(reader, format.form, encoding, strings)?;
        match format.content_type {
            DW_LNCT_path => entry.path = value.as_str().unwrap_or_default(),
            DW_LNCT_directory_index => entry.directory_index = value.as_u64().unwrap_or_default(),
            DW_LNCT_timestamp => entry.mtime = value.as_u64().unwrap_or_default(),
            DW_LNCT_size => entry.length = value.as_u64().unwrap_or_default(),
            DW_LNCT_MD5 => entry.md5 = value.as_block().and_then(|b| b.try_into().ok()),
            _ => {}
        }
    }
    Ok(entry)
}

fn parse_legacy_file<'data>(reader: &mut Reader<'data>, path: &'data str) -> Result<FileEntry<'data>> {
    Ok(FileEntry {
        path,
        directory_index: reader.read_uleb128()?,
        mtime: reader.read_uleb128()?,
        length: reader.read_uleb128()?,
        md5: None,
    })
}

/// The line-number state machine registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineState {
    pub address: u64,
    pub op_index: u64,
    pub file: u64,
    pub line: u64,
    pub column: u64,
    pub is_stmt: bool,
    pub basic_block: bool,
    pub end_sequence: bool,
    pub prologue_end: bool,
    pub epilogue_begin: bool,
    pub isa: u64,
    pub discriminator: u64,
}

impl LineState {
    /// Registers at the start of every sequence
    pub fn new(default_is_stmt: bool) -> Self {
        Self {
            address: 0,
            op_index: 0,
            file: 1,
            line: 1,
            column: 0,
            is_stmt: default_is_stmt,
            basic_block: false,
            end_sequence: false,
            prologue_end: false,
            epilogue_begin: false,
            isa: 0,
            discriminator: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Special(u8),
    Standard(DwLns),
    Extended(DwLne),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands<'data> {
    None,
    Unsigned(u64),
    Signed(i64),
    Special {
        line_addend: i64,
        address_addend: u64,
        op_index: u64,
    },
    File(FileEntry<'data>),
    /// Raw operand bytes of an extended opcode the decoder does not know
    Bytes(&'data [u8]),
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineProgramEntry<'data> {
    pub offset: usize,
    pub opcode: Opcode,
    pub operands: Operands<'data>,
    /// Registers after the instruction, for instructions that append a row
    pub state: Option<LineState>,
}

impl<'data> LineProgramEntry<'data> {
    pub fn is_extended(&self) -> bool {
        matches!(self.opcode, Opcode::Extended(_))
    }

    pub fn is_row(&self) -> bool {
        self.state.is_some()
    }
}

#[derive(Debug)]
struct Decoded<'data> {
    entries: Vec<LineProgramEntry<'data>>,
    files: Vec<FileEntry<'data>>,
}

/// A line-number program bound to its section bytes.
#[derive(Debug)]
pub struct LineProgram<'data> {
    header: LineProgramHeader<'data>,
    data: &'data [u8],
    order: ByteOrder,
    decoded: OnceCell<Decoded<'data>>,
}

impl<'data> LineProgram<'data> {
    pub fn parse(
        debug_line: &'data [u8],
        offset: usize,
        order: ByteOrder,
        address_size: u8,
        strings: &StringSections<'data>,
    ) -> Result<Self> {
        let header = LineProgramHeader::parse(debug_line, offset, order, address_size, strings)
            .map_err(|e| e.in_line_program(offset))?;
        Ok(Self {
            header,
            data: debug_line,
            order,
            decoded: OnceCell::new(),
        })
    }

    pub fn header(&self) -> &LineProgramHeader<'data> {
        &self.header
    }

    fn decoded(&self) -> Result<&Decoded<'data>> {
        self.decoded
            .get_or_try_init(|| Interpreter::new(&self.header).run(self.data, self.order))
            .map_err(|e| e.in_line_program(self.header.offset))
    }

    /// Every recorded instruction, decoded on first call
    pub fn entries(&self) -> Result<&[LineProgramEntry<'data>]> {
        self.decoded().map(|d| d.entries.as_slice())
    }

    /// Register snapshots of the rows the program appends
    pub fn rows(&self) -> Result<impl Iterator<Item = &LineState> + '_> {
        Ok(self.entries()?.iter().filter_map(|e| e.state.as_ref()))
    }

    /// Header file table plus entries added by `DW_LNE_define_file`
    pub fn files(&self) -> Result<&[FileEntry<'data>]> {
        self.decoded().map(|d| d.files.as_slice())
    }

    /// File by its version-dependent index
    pub fn file(&self, index: u64) -> Result<Option<&FileEntry<'data>>> {
        let files = self.files()?;
        Ok(index
            .checked_sub(self.header.file_index_base())
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| files.get(i)))
    }

    /// File path joined with its include directory
    pub fn file_path(&self, index: u64) -> Result<Option<String>> {
        let Some(file) = self.file(index)? else {
            return Ok(None);
        };
        let path = match self.header.directory(file.directory_index) {
            Some(dir) if !dir.is_empty() && !file.path.starts_with('/') => {
                format!("{}/{}", dir.trim_end_matches('/'), file.path)
            }
            _ => file.path.to_string(),
        };
        Ok(Some(path))
    }
}

struct Interpreter<'h, 'data> {
    header: &'h LineProgramHeader<'data>,
    state: LineState,
    entries: Vec<LineProgramEntry<'data>>,
    files: Vec<FileEntry<'data>>,
}

impl<'h, 'data> Interpreter<'h, 'data> {
    fn new(header: &'h LineProgramHeader<'data>) -> Self {
        Self {
            header,
            state: LineState::new(header.default_is_stmt),
            entries: Vec::new(),
            files: header.file_names.clone(),
        }
    }

    fn run(mut self, data: &'data [u8], order: ByteOrder) -> Result<Decoded<'data>> {
        let header = self.header;
        let mut reader =
            Reader::bounded(data, header.program_offset, header.end_offset, order)?;

        while !reader.is_empty() {
            let at = reader.offset();
            let opcode = reader.read_u8()?;
            if opcode >= header.opcode_base {
                self.special(at, opcode);
            } else if opcode == 0 {
                self.extended(at, &mut reader)?;
            } else {
                self.standard(at, opcode, &mut reader)?;
            }
        }

        debug!(
            offset = header.offset,
            entries = self.entries.len(),
            "line program decoded"
        );
        Ok(Decoded {
            entries: self.entries,
            files: self.files,
        })
    }

    /// Apply an operation advance to `address` and `op_index`, returning
    /// the address increment.
    fn advance(&mut self, operation_advance: u64) -> u64 {
        let min_len = u64::from(self.header.minimum_instruction_length);
        let max_ops = u64::from(self.header.ops_per_instruction());
        let addend = if max_ops == 1 {
            min_len.wrapping_mul(operation_advance)
        } else {
            let total = self.state.op_index.wrapping_add(operation_advance);
            self.state.op_index = total % max_ops;
            min_len.wrapping_mul(total / max_ops)
        };
        self.state.address = self.state.address.wrapping_add(addend);
        addend
    }

    fn record(&mut self, offset: usize, opcode: Opcode, operands: Operands<'data>) {
        trace!(offset, ?opcode, ?operands, "line op");
        self.entries.push(LineProgramEntry {
            offset,
            opcode,
            operands,
            state: None,
        });
    }

    /// Append a row, then clear the per-row flags.
    fn snapshot(&mut self, offset: usize, opcode: Opcode, operands: Operands<'data>) {
        trace!(offset, ?opcode, address = self.state.address, line = self.state.line, "line row");
        self.entries.push(LineProgramEntry {
            offset,
            opcode,
            operands,
            state: Some(self.state),
        });
        self.state.discriminator = 0;
        self.state.basic_block = false;
        self.state.prologue_end = false;
        self.state.epilogue_begin = false;
    }

    fn special(&mut self, offset: usize, opcode: u8) {
        let header = self.header;
        let adjusted = opcode - header.opcode_base;
        let operation_advance = u64::from(adjusted / header.line_range);
        let line_addend = i64::from(header.line_base) + i64::from(adjusted % header.line_range);

        let address_addend = self.advance(operation_advance);
        self.state.line = self.state.line.wrapping_add_signed(line_addend);
        let op_index = self.state.op_index;
        self.snapshot(
            offset,
            Opcode::Special(opcode),
            Operands::Special {
                line_addend,
                address_addend,
                op_index,
            },
        );
    }

    fn standard(&mut self, offset: usize, opcode: u8, reader: &mut Reader<'data>) -> Result<()> {
        let header = self.header;
        let op = DwLns(opcode);
        let code = Opcode::Standard(op);
        match op {
            DW_LNS_copy => self.snapshot(offset, code, Operands::None),
            DW_LNS_advance_pc => {
                let operand = reader.read_uleb128()?;
                self.advance(operand);
                self.record(offset, code, Operands::Unsigned(operand));
            }
            DW_LNS_advance_line => {
                let operand = reader.read_sleb128()?;
                self.state.line = self.state.line.wrapping_add_signed(operand);
            }
            DW_LNS_set_file => {
                self.state.file = reader.read_uleb128()?;
                self.record(offset, code, Operands::Unsigned(self.state.file));
            }
            DW_LNS_set_column => {
                self.state.column = reader.read_uleb128()?;
                self.record(offset, code, Operands::Unsigned(self.state.column));
            }
            DW_LNS_negate_stmt => {
                self.state.is_stmt = !self.state.is_stmt;
                self.record(offset, code, Operands::None);
            }
            DW_LNS_set_basic_block => {
                self.state.basic_block = true;
                self.record(offset, code, Operands::None);
            }
            DW_LNS_const_add_pc => {
                let adjusted = 255 - header.opcode_base;
                let addend = self.advance(u64::from(adjusted / header.line_range));
                self.record(offset, code, Operands::Unsigned(addend));
            }
            DW_LNS_fixed_advance_pc => {
                let operand = reader.read_u16()?;
                self.state.address = self.state.address.wrapping_add(u64::from(operand));
                self.state.op_index = 0;
                self.record(offset, code, Operands::Unsigned(operand.into()));
            }
            DW_LNS_set_prologue_end => {
                self.state.prologue_end = true;
                self.record(offset, code, Operands::None);
            }
            DW_LNS_set_epilogue_begin => {
                self.state.epilogue_begin = true;
                self.record(offset, code, Operands::None);
            }
            DW_LNS_set_isa => {
                self.state.isa = reader.read_uleb128()?;
                self.record(offset, code, Operands::Unsigned(self.state.isa));
            }
            _ => return Err(Error::InvalidStandardOpcode { opcode, offset }),
        }
        Ok(())
    }

    fn extended(&mut self, offset: usize, reader: &mut Reader<'data>) -> Result<()> {
        let len = reader.read_uleb128()?;
        let len = usize::try_from(len)
            .ok()
            .filter(|&len| len <= reader.remaining())
            .ok_or(Error::Truncated {
                offset: reader.offset(),
                needed: len as usize,
            })?;
        if len == 0 {
            return Ok(());
        }
        let end = reader.offset() + len;
        let op = DwLne(reader.read_u8()?);
        let code = Opcode::Extended(op);

        match op {
            DW_LNE_end_sequence => {
                self.state.end_sequence = true;
                self.snapshot(offset, code, Operands::None);
                self.state = LineState::new(self.header.default_is_stmt);
            }
            DW_LNE_set_address => {
                let width = match len - 1 {
                    w @ (1 | 2 | 4 | 8) => w as u8,
                    _ => self.header.encoding.address_size,
                };
                let address = reader.read_sized(width)?;
                self.state.address = address;
                self.state.op_index = 0;
                self.record(offset, code, Operands::Unsigned(address));
            }
            DW_LNE_define_file => {
                let path = reader.read_cstr()?;
                let file = parse_legacy_file(reader, path)?;
                self.files.push(file);
                self.record(offset, code, Operands::File(file));
            }
            DW_LNE_set_discriminator => {
                self.state.discriminator = reader.read_uleb128()?;
            }
            _ => {
                let bytes = reader.read_bytes(len - 1)?;
                self.record(offset, code, Operands::Bytes(bytes));
            }
        }

        reader.set_offset(end);
        Ok(())
    }
}
