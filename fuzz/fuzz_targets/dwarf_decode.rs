#![no_main]
use elfdwarf::formats::dwarf::{DwarfInfo, DwarfSections};
use elfdwarf::formats::elf::types::ByteOrder;
use libfuzzer_sys::fuzz_target;

// Input layout: [abbrev_len: u8][line_len: u8][abbrev][line][info]
fuzz_target!(|data: &[u8]| {
    let [abbrev_len, line_len, rest @ ..] = data else {
        return;
    };
    let (abbrev_len, line_len) = (*abbrev_len as usize, *line_len as usize);
    if rest.len() < abbrev_len + line_len {
        return;
    }
    let (abbrev, rest) = rest.split_at(abbrev_len);
    let (line, info) = rest.split_at(line_len);

    for order in [ByteOrder::Little, ByteOrder::Big] {
        let dwarf = DwarfInfo::new(DwarfSections {
            debug_line: line,
            ..DwarfSections::new(info, abbrev, order)
        });
        let Ok(units) = dwarf.compile_units() else {
            continue;
        };
        for unit in units {
            let _ = unit.entries();
            if let Ok(Some(program)) = unit.line_program() {
                let _ = program.entries();
            }
        }
    }
});
