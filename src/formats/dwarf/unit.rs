//! Unit headers and compile units.

use once_cell::unsync::OnceCell;
use tracing::debug;

use crate::config::DecodeConfig;
use crate::error::{Error, Result};
use crate::formats::dwarf::abbrev::Abbreviations;
use crate::formats::dwarf::constants::*;
use crate::formats::dwarf::die::{Die, DieParser, DieTree};
use crate::formats::dwarf::info::DwarfSections;
use crate::formats::dwarf::line::LineProgram;
use crate::formats::dwarf::reader::{Encoding, Format, Reader};
use crate::formats::elf::types::ByteOrder;

/// Kind of unit, with the extra header fields DWARF 5 attaches to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitType {
    Compile,
    Type { signature: u64, type_offset: u64 },
    Partial,
    Skeleton { dwo_id: u64 },
    SplitCompile { dwo_id: u64 },
    SplitType { signature: u64, type_offset: u64 },
}

impl UnitType {
    pub fn code(&self) -> DwUt {
        match self {
            UnitType::Compile => DW_UT_compile,
            UnitType::Type { .. } => DW_UT_type,
            UnitType::Partial => DW_UT_partial,
            UnitType::Skeleton { .. } => DW_UT_skeleton,
            UnitType::SplitCompile { .. } => DW_UT_split_compile,
            UnitType::SplitType { .. } => DW_UT_split_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitHeader {
    /// Offset of the header in `.debug_info`
    pub offset: usize,
    pub unit_length: u64,
    pub encoding: Encoding,
    pub unit_type: UnitType,
    pub debug_abbrev_offset: u64,
    pub first_die_offset: usize,
    /// `offset + unit_length + initial-length size`
    pub end_offset: usize,
}

impl UnitHeader {
    /// Parse the unit header at `offset` in `.debug_info`.
    pub fn parse(debug_info: &[u8], offset: usize, order: ByteOrder) -> Result<Self> {
        let mut reader = Reader::at(debug_info, offset, order);
        let (unit_length, format) = reader.read_initial_length()?;
        let total = unit_length.saturating_add(format.initial_length_size() as u64);
        let end_offset = usize::try_from(total)
            .ok()
            .and_then(|total| offset.checked_add(total))
            .filter(|&end| end <= debug_info.len())
            .ok_or(Error::Truncated {
                offset,
                needed: total as usize,
            })?;
        let mut reader = Reader::bounded(debug_info, reader.offset(), end_offset, order)?;

        let version_at = reader.offset();
        let version = reader.read_u16()?;
        if !(2..=5).contains(&version) {
            return Err(Error::UnsupportedVersion {
                version,
                offset: version_at,
            });
        }

        let (unit_type, address_size, debug_abbrev_offset) = if version >= 5 {
            let type_at = reader.offset();
            let code = DwUt(reader.read_u8()?);
            let address_size = reader.read_u8()?;
            let abbrev = reader.read_offset(format)?;
            let unit_type = match code {
                DW_UT_compile => UnitType::Compile,
                DW_UT_partial => UnitType::Partial,
                DW_UT_skeleton => UnitType::Skeleton {
                    dwo_id: reader.read_u64()?,
                },
                DW_UT_split_compile => UnitType::SplitCompile {
                    dwo_id: reader.read_u64()?,
                },
                DW_UT_type | DW_UT_split_type => {
                    let signature = reader.read_u64()?;
                    let type_offset = reader.read_offset(format)?;
                    if code == DW_UT_type {
                        UnitType::Type {
                            signature,
                            type_offset,
                        }
                    } else {
                        UnitType::SplitType {
                            signature,
                            type_offset,
                        }
                    }
                }
                DwUt(unit_type) => {
                    return Err(Error::UnknownUnitType {
                        unit_type,
                        offset: type_at,
                    })
                }
            };
            (unit_type, address_size, abbrev)
        } else {
            let abbrev = reader.read_offset(format)?;
            (UnitType::Compile, reader.read_u8()?, abbrev)
        };

        if !matches!(address_size, 1 | 2 | 4 | 8) {
            return Err(Error::InvalidAddressSize {
                size: address_size,
                offset,
            });
        }

        Ok(Self {
            offset,
            unit_length,
            encoding: Encoding {
                format,
                version,
                address_size,
            },
            unit_type,
            debug_abbrev_offset,
            first_die_offset: reader.offset(),
            end_offset,
        })
    }

    pub fn format(&self) -> Format {
        self.encoding.format
    }

    pub fn version(&self) -> u16 {
        self.encoding.version
    }

    pub fn address_size(&self) -> u8 {
        self.encoding.address_size
    }

    /// Bytes from the start of the unit to its first entry
    pub fn header_size(&self) -> usize {
        self.first_die_offset - self.offset
    }

    /// Bytes covered by the whole unit, initial length included
    pub fn total_size(&self) -> usize {
        self.end_offset - self.offset
    }
}

/// A unit of `.debug_info` with its abbreviations, entries and line program.
///
/// Entries and the line program are decoded on first request and kept.
#[derive(Debug)]
pub struct CompileUnit<'data> {
    header: UnitHeader,
    abbrevs: Abbreviations,
    sections: DwarfSections<'data>,
    max_die_depth: usize,
    entries: OnceCell<DieTree<'data>>,
    line_program: OnceCell<Option<LineProgram<'data>>>,
}

impl<'data> CompileUnit<'data> {
    /// Parse the header and abbreviation table of the unit at `offset`.
    pub fn parse(sections: DwarfSections<'data>, offset: usize, config: &DecodeConfig) -> Result<Self> {
        let parse = || -> Result<(UnitHeader, Abbreviations)> {
            let header = UnitHeader::parse(sections.debug_info, offset, sections.order)?;
            let abbrev_offset = usize::try_from(header.debug_abbrev_offset).map_err(|_| {
                Error::Truncated {
                    offset: usize::MAX,
                    needed: 1,
                }
            })?;
            let abbrevs = Abbreviations::parse(sections.debug_abbrev, abbrev_offset, sections.order)?;
            debug!(
                offset,
                version = header.version(),
                unit_type = %header.unit_type.code(),
                address_size = header.address_size(),
                abbreviations = abbrevs.len(),
                "unit"
            );
            Ok((header, abbrevs))
        };
        let (header, abbrevs) = parse().map_err(|e| e.in_unit(offset))?;

        Ok(Self {
            header,
            abbrevs,
            sections,
            max_die_depth: config.max_die_depth,
            entries: OnceCell::new(),
            line_program: OnceCell::new(),
        })
    }

    pub fn header(&self) -> &UnitHeader {
        &self.header
    }

    pub fn offset(&self) -> usize {
        self.header.offset
    }

    pub fn abbreviations(&self) -> &Abbreviations {
        &self.abbrevs
    }

    /// Entry tree of the unit, decoded on first call
    pub fn entries(&self) -> Result<&DieTree<'data>> {
        self.entries
            .get_or_try_init(|| {
                let strings = self.sections.strings();
                DieParser {
                    reader: Reader::bounded(
                        self.sections.debug_info,
                        self.header.first_die_offset,
                        self.header.end_offset,
                        self.sections.order,
                    )?,
                    encoding: self.header.encoding,
                    abbrevs: &self.abbrevs,
                    strings: &strings,
                    max_depth: self.max_die_depth,
                    unit_offset: self.header.offset,
                    dies: Vec::new(),
                }
                .parse_tree()
            })
            .map_err(|e| e.in_unit(self.header.offset))
    }

    /// The unit's first top-level entry
    pub fn root(&self) -> Result<Option<&Die<'data>>> {
        Ok(self.entries()?.roots().next())
    }

    /// `DW_AT_name` of the root entry
    pub fn name(&self) -> Result<Option<&'data str>> {
        Ok(self.root()?.and_then(|die| die.name()))
    }

    /// Line program named by the root entry's `DW_AT_stmt_list`, if any
    pub fn line_program(&self) -> Result<Option<&LineProgram<'data>>> {
        self.line_program
            .get_or_try_init(|| {
                let Some(offset) = self
                    .root()?
                    .and_then(|die| die.value(DW_AT_stmt_list))
                    .and_then(|v| v.as_u64())
                else {
                    return Ok(None);
                };
                if self.sections.debug_line.is_empty() {
                    return Err(Error::MissingSection(".debug_line"));
                }
                let offset = usize::try_from(offset).map_err(|_| Error::Truncated {
                    offset: usize::MAX,
                    needed: 1,
                })?;
                LineProgram::parse(
                    self.sections.debug_line,
                    offset,
                    self.sections.order,
                    self.header.address_size(),
                    &self.sections.strings(),
                )
                .map(Some)
            })
            .map(Option::as_ref)
    }
}
