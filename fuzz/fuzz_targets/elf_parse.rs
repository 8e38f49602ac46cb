#![no_main]
use elfdwarf::{DecodeConfig, ElfFile, Symbolizer};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(elf) = ElfFile::parse(data) else {
        return;
    };
    for table in [elf.symbol_table(), elf.dynamic_symbol_table()]
        .into_iter()
        .flatten()
        .flatten()
    {
        let _ = table.iter().filter_map(Result::ok).count();
    }
    let Ok(dwarf) = elf.dwarf() else {
        return;
    };
    let config = DecodeConfig::default();
    let _ = Symbolizer::new(&elf, &dwarf, &config).lookup(elf.header().entry_point());
});
