//! Decoded values checked against gimli's reader and constant tables.

mod common;

use common::{sample_debug_abbrev, sample_debug_info, sample_debug_line, SAMPLE_DEBUG_STR};
use elfdwarf::formats::dwarf::constants::*;
use elfdwarf::formats::dwarf::{DwarfInfo, DwarfSections, LineProgram, StringSections};
use elfdwarf::formats::elf::types::ByteOrder;

fn endian(order: ByteOrder) -> gimli::RunTimeEndian {
    match order {
        ByteOrder::Little => gimli::RunTimeEndian::Little,
        ByteOrder::Big => gimli::RunTimeEndian::Big,
    }
}

#[test]
fn constant_codes_agree() {
    assert_eq!(DW_TAG_compile_unit.0, gimli::DW_TAG_compile_unit.0);
    assert_eq!(DW_TAG_subprogram.0, gimli::DW_TAG_subprogram.0);
    assert_eq!(DW_TAG_variable.0, gimli::DW_TAG_variable.0);
    assert_eq!(DW_TAG_inlined_subroutine.0, gimli::DW_TAG_inlined_subroutine.0);
    assert_eq!(DW_AT_name.0, gimli::DW_AT_name.0);
    assert_eq!(DW_AT_stmt_list.0, gimli::DW_AT_stmt_list.0);
    assert_eq!(DW_AT_high_pc.0, gimli::DW_AT_high_pc.0);
    assert_eq!(DW_AT_linkage_name.0, gimli::DW_AT_linkage_name.0);
    assert_eq!(DW_AT_MIPS_linkage_name.0, gimli::DW_AT_MIPS_linkage_name.0);
    assert_eq!(DW_FORM_strp.0, gimli::DW_FORM_strp.0);
    assert_eq!(DW_FORM_line_strp.0, gimli::DW_FORM_line_strp.0);
    assert_eq!(DW_FORM_implicit_const.0, gimli::DW_FORM_implicit_const.0);
    assert_eq!(DW_FORM_data16.0, gimli::DW_FORM_data16.0);
    assert_eq!(DW_FORM_addrx.0, gimli::DW_FORM_addrx.0);
    assert_eq!(DW_LNS_copy.0, gimli::DW_LNS_copy.0);
    assert_eq!(DW_LNS_set_isa.0, gimli::DW_LNS_set_isa.0);
    assert_eq!(DW_LNE_end_sequence.0, gimli::DW_LNE_end_sequence.0);
    assert_eq!(DW_LNE_set_discriminator.0, gimli::DW_LNE_set_discriminator.0);
    assert_eq!(DW_LNCT_path.0, gimli::DW_LNCT_path.0);
    assert_eq!(DW_LNCT_MD5.0, gimli::DW_LNCT_MD5.0);
    assert_eq!(DW_UT_compile.0, gimli::DW_UT_compile.0);
    assert_eq!(DW_UT_split_type.0, gimli::DW_UT_split_type.0);
}

#[test]
fn constant_names_agree() {
    assert_eq!(
        DW_TAG_subprogram.to_string(),
        gimli::DW_TAG_subprogram.to_string()
    );
    assert_eq!(DW_AT_low_pc.to_string(), gimli::DW_AT_low_pc.to_string());
    assert_eq!(DW_FORM_sdata.to_string(), gimli::DW_FORM_sdata.to_string());
    assert_eq!(
        DW_LNS_advance_pc.to_string(),
        gimli::DW_LNS_advance_pc.to_string()
    );
    assert_eq!(DwTag(0x5555).name(), None);
}

#[test]
fn unit_headers_agree() {
    for order in [ByteOrder::Little, ByteOrder::Big] {
        for address_size in [4u8, 8] {
            let mut info = sample_debug_info(order, address_size);
            info.extend(sample_debug_info(order, address_size));
            let abbrev = sample_debug_abbrev();

            let ours = DwarfInfo::new(DwarfSections {
                debug_str: SAMPLE_DEBUG_STR,
                ..DwarfSections::new(&info, &abbrev, order)
            });
            let units = ours.compile_units().unwrap();

            let theirs = gimli::DebugInfo::new(&info, endian(order));
            let mut headers = theirs.units();
            let mut count = 0;
            while let Some(header) = headers.next().unwrap() {
                let unit = &units[count];
                assert_eq!(unit.header().unit_length, header.unit_length() as u64);
                assert_eq!(unit.header().version(), header.version());
                assert_eq!(unit.header().address_size(), header.address_size());
                count += 1;
            }
            assert_eq!(count, units.len());
        }
    }
}

#[test]
fn line_rows_agree() {
    for order in [ByteOrder::Little, ByteOrder::Big] {
        for address_size in [4u8, 8] {
            let line = sample_debug_line(order, address_size);

            let ours = LineProgram::parse(&line, 0, order, address_size, &StringSections::default())
                .unwrap();
            let ours: Vec<_> = ours
                .rows()
                .unwrap()
                .map(|r| (r.address, r.line, r.column, r.end_sequence))
                .collect();

            let debug_line = gimli::DebugLine::new(&line, endian(order));
            let program = debug_line
                .program(gimli::DebugLineOffset(0), address_size, None, None)
                .unwrap();
            let mut rows = program.rows();
            let mut theirs = Vec::new();
            while let Some((_, row)) = rows.next_row().unwrap() {
                let column = match row.column() {
                    gimli::ColumnType::LeftEdge => 0,
                    gimli::ColumnType::Column(c) => c.get(),
                };
                theirs.push((
                    row.address(),
                    row.line().map_or(0, |l| l.get()),
                    column,
                    row.end_sequence(),
                ));
            }

            assert_eq!(ours, theirs, "{order:?}/{address_size}");
        }
    }
}
