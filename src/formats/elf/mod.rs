//! ELF (Executable and Linkable Format) parser
//!
//! A zero-copy parser: every section, segment and symbol name borrows
//! from the caller's buffer.

pub mod headers;
pub mod sections;
pub mod segments;
pub mod symbols;
pub mod types;
pub mod utils;

use tracing::debug;

use crate::config::DecodeConfig;
use crate::error::{Error, Result};
use crate::formats::dwarf::{DwarfInfo, DwarfSections};
use headers::parse_header;
use sections::SectionTable;
use segments::SegmentTable;
use symbols::SymbolTable;
pub use types::*;

/// A parsed ELF image
#[derive(Debug, Clone)]
pub struct ElfFile<'data> {
    data: &'data [u8],
    header: ElfHeader,
    sections: SectionTable<'data>,
    segments: SegmentTable<'data>,
}

impl<'data> ElfFile<'data> {
    /// Parse the header and both header tables from raw data
    pub fn parse(data: &'data [u8]) -> Result<Self> {
        let header = parse_header(data)?;
        let sections = SectionTable::parse(data, &header)?;
        let segments = SegmentTable::parse(data, &header)?;

        debug!(
            class = header.class().bits(),
            little_endian = header.byte_order().is_little_endian(),
            machine = ?header.machine(),
            sections = sections.count(),
            segments = segments.count(),
            "parsed ELF"
        );

        Ok(Self {
            data,
            header,
            sections,
            segments,
        })
    }

    /// Get ELF header
    pub fn header(&self) -> &ElfHeader {
        &self.header
    }

    /// Get raw data
    pub fn data(&self) -> &'data [u8] {
        self.data
    }

    pub fn class(&self) -> ElfClass {
        self.header.class()
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order()
    }

    /// All sections in header-table order
    pub fn sections(&self) -> &[Section<'data>] {
        self.sections.sections()
    }

    pub fn section_table(&self) -> &SectionTable<'data> {
        &self.sections
    }

    /// All program headers in table order
    pub fn programs(&self) -> &[Segment<'data>] {
        self.segments.segments()
    }

    pub fn segment_table(&self) -> &SegmentTable<'data> {
        &self.segments
    }

    pub fn section_by_name(&self, name: &str) -> Option<&Section<'data>> {
        self.sections.by_name(name)
    }

    pub fn section_by_index(&self, index: usize) -> Option<&Section<'data>> {
        self.sections.by_index(index)
    }

    /// Loadable segment mapping `addr`
    pub fn segment_for_address(&self, addr: u64) -> Option<&Segment<'data>> {
        self.segments.segment_at_vaddr(addr)
    }

    /// Allocated section holding `addr`
    pub fn section_for_address(&self, addr: u64) -> Option<&Section<'data>> {
        self.sections.by_addr(addr)
    }

    /// File offset backing `addr`, if a LOAD segment maps it from the file
    pub fn address_to_offset(&self, addr: u64) -> Option<u64> {
        self.segments.vaddr_to_offset(addr)
    }

    /// Reader over the first `SHT_SYMTAB` section
    pub fn symbol_table(&self) -> Result<Option<SymbolTable<'data>>> {
        self.symbols_of_type(SHT_SYMTAB)
    }

    /// Reader over the first `SHT_DYNSYM` section
    pub fn dynamic_symbol_table(&self) -> Result<Option<SymbolTable<'data>>> {
        self.symbols_of_type(SHT_DYNSYM)
    }

    fn symbols_of_type(&self, sh_type: u32) -> Result<Option<SymbolTable<'data>>> {
        let Some(symtab) = self.sections.by_type(sh_type) else {
            return Ok(None);
        };

        // Names live in the string table named by sh_link
        let strtab_idx = symtab.link() as usize;
        let strtab = self
            .sections
            .by_index(strtab_idx)
            .ok_or(Error::InvalidStringTable { index: strtab_idx })?;

        SymbolTable::new(symtab, strtab, self.class()).map(Some)
    }

    /// Check if binary has debug info
    pub fn has_dwarf_info(&self) -> bool {
        self.sections.has_debug_info()
    }

    /// Byte views of the DWARF sections.
    ///
    /// `.debug_info` and `.debug_abbrev` are required; the string and
    /// line sections are empty when absent.
    pub fn dwarf_sections(&self) -> Result<DwarfSections<'data>> {
        let required = |name: &'static str| {
            self.section_by_name(name)
                .map(|s| s.data())
                .ok_or(Error::MissingSection(name))
        };
        let optional = |name: &str| self.section_by_name(name).map(|s| s.data()).unwrap_or_default();

        Ok(DwarfSections {
            debug_info: required(".debug_info")?,
            debug_abbrev: required(".debug_abbrev")?,
            debug_str: optional(".debug_str"),
            debug_line: optional(".debug_line"),
            debug_line_str: optional(".debug_line_str"),
            order: self.byte_order(),
        })
    }

    /// DWARF decoder over this file's debug sections
    pub fn dwarf(&self) -> Result<DwarfInfo<'data>> {
        self.dwarf_with_config(DecodeConfig::default())
    }

    pub fn dwarf_with_config(&self, config: DecodeConfig) -> Result<DwarfInfo<'data>> {
        Ok(DwarfInfo::with_config(self.dwarf_sections()?, config))
    }
}
