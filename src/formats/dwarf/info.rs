//! Unit enumeration over `.debug_info`.

use once_cell::unsync::OnceCell;
use tracing::debug;

use crate::config::DecodeConfig;
use crate::error::Result;
use crate::formats::dwarf::form::StringSections;
use crate::formats::dwarf::line::LineProgram;
use crate::formats::dwarf::unit::CompileUnit;
use crate::formats::elf::types::ByteOrder;
use crate::{log_error, span_trace};

/// Raw bytes of the DWARF sections the decoder reads.
///
/// Absent optional sections are empty slices.
#[derive(Debug, Clone, Copy)]
pub struct DwarfSections<'data> {
    pub debug_info: &'data [u8],
    pub debug_abbrev: &'data [u8],
    pub debug_str: &'data [u8],
    pub debug_line: &'data [u8],
    pub debug_line_str: &'data [u8],
    pub order: ByteOrder,
}

impl<'data> DwarfSections<'data> {
    pub fn new(debug_info: &'data [u8], debug_abbrev: &'data [u8], order: ByteOrder) -> Self {
        Self {
            debug_info,
            debug_abbrev,
            debug_str: &[],
            debug_line: &[],
            debug_line_str: &[],
            order,
        }
    }

    pub fn strings(&self) -> StringSections<'data> {
        StringSections {
            debug_str: self.debug_str,
            debug_line_str: self.debug_line_str,
        }
    }
}

/// Entry point to the DWARF data of one file.
#[derive(Debug)]
pub struct DwarfInfo<'data> {
    sections: DwarfSections<'data>,
    config: DecodeConfig,
    units: OnceCell<Vec<CompileUnit<'data>>>,
}

impl<'data> DwarfInfo<'data> {
    pub fn new(sections: DwarfSections<'data>) -> Self {
        Self::with_config(sections, DecodeConfig::default())
    }

    pub fn with_config(sections: DwarfSections<'data>, config: DecodeConfig) -> Self {
        Self {
            sections,
            config,
            units: OnceCell::new(),
        }
    }

    pub fn sections(&self) -> &DwarfSections<'data> {
        &self.sections
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    /// Every unit in `.debug_info`, in section order.
    ///
    /// Units are found by hopping from each header to the next using the
    /// unit length; the list is built once and kept.
    pub fn compile_units(&self) -> Result<&[CompileUnit<'data>]> {
        self.units
            .get_or_try_init(|| {
                let span = span_trace!("compile_units", size = self.sections.debug_info.len());
                let _guard = span.enter();

                let mut units = Vec::new();
                let mut offset = 0;
                while offset < self.sections.debug_info.len() {
                    let unit = CompileUnit::parse(self.sections, offset, &self.config)
                        .map_err(|e| log_error!(e, "unit header"))?;
                    offset = unit.header().end_offset;
                    units.push(unit);
                }
                debug!(units = units.len(), "enumerated compile units");
                Ok(units)
            })
            .map(Vec::as_slice)
    }

    /// The unit whose header starts at `offset`
    pub fn unit_at(&self, offset: usize) -> Result<Option<&CompileUnit<'data>>> {
        let units = self.compile_units()?;
        Ok(units
            .binary_search_by_key(&offset, |u| u.offset())
            .ok()
            .map(|i| &units[i]))
    }

    /// Line program of `unit`, if its root entry names one
    pub fn line_program_for<'a>(
        &self,
        unit: &'a CompileUnit<'data>,
    ) -> Result<Option<&'a LineProgram<'data>>> {
        unit.line_program()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::formats::dwarf::constants::*;
    use crate::formats::dwarf::form::AttributeValue;

    // 1: compile_unit, no children, (name, strp)
    const ABBREV: &[u8] = &[0x01, 0x11, 0x00, 0x03, 0x0e, 0x00, 0x00, 0x00];

    fn unit(name_offset: u32, code: u8) -> Vec<u8> {
        let mut body = 4u16.to_le_bytes().to_vec();
        body.extend_from_slice(&0u32.to_le_bytes());
        body.push(8);
        body.push(code);
        body.extend_from_slice(&name_offset.to_le_bytes());
        let mut out = (body.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(&body);
        out
    }

    fn sections<'a>(info: &'a [u8], strings: &'a [u8]) -> DwarfSections<'a> {
        DwarfSections {
            debug_str: strings,
            ..DwarfSections::new(info, ABBREV, ByteOrder::Little)
        }
    }

    #[test]
    fn test_single_unit_with_strp_name() {
        let info = unit(0, 1);
        let dwarf = DwarfInfo::new(sections(&info, b"test.c\0"));
        let units = dwarf.compile_units().unwrap();
        assert_eq!(units.len(), 1);

        let tree = units[0].entries().unwrap();
        let roots: Vec<_> = tree.roots().collect();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].tag, DW_TAG_compile_unit);
        assert_eq!(
            roots[0].value(DW_AT_name),
            Some(AttributeValue::String("test.c"))
        );
        assert_eq!(units[0].name().unwrap(), Some("test.c"));
        // No DW_AT_stmt_list
        assert!(dwarf.line_program_for(&units[0]).unwrap().is_none());
    }

    #[test]
    fn test_units_are_chained_and_memoized() {
        let mut info = unit(0, 1);
        info.extend(unit(4, 1));
        let dwarf = DwarfInfo::new(sections(&info, b"one\0two\0"));

        let units = dwarf.compile_units().unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].offset(), 16);
        assert_eq!(units[1].name().unwrap(), Some("two"));
        assert!(std::ptr::eq(units, dwarf.compile_units().unwrap()));

        assert_eq!(dwarf.unit_at(16).unwrap().unwrap().offset(), 16);
        assert!(dwarf.unit_at(3).unwrap().is_none());
    }

    #[test]
    fn test_unknown_abbreviation_reports_unit() {
        let mut info = unit(0, 1);
        info.extend(unit(0, 7));
        let dwarf = DwarfInfo::new(sections(&info, b"x\0"));
        let units = dwarf.compile_units().unwrap();
        assert!(units[0].entries().is_ok());

        let err = units[1].entries().unwrap_err();
        assert!(matches!(err, Error::InUnit { unit_offset: 16, .. }));
        assert_eq!(
            err.root(),
            &Error::UnknownAbbreviationCode {
                code: 7,
                offset: 16 + 11
            }
        );
    }

    #[test]
    fn test_failed_enumeration_is_not_cached() {
        let mut info = unit(0, 1);
        info.truncate(10);
        let dwarf = DwarfInfo::new(sections(&info, b"x\0"));
        assert!(dwarf.compile_units().is_err());
        assert!(dwarf.compile_units().is_err());
    }
}
