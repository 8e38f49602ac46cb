//! Common test utilities and helpers.
//!
//! Integration tests build their inputs in memory: an ELF image writer,
//! a byte writer for DWARF sections, and one ready-made program with
//! debug info shared by the lookup tests.

#![allow(dead_code)]

use elfdwarf::formats::elf::types::{
    ByteOrder, ElfClass, ElfHeader, ElfIdent, SectionFlags, SHT_DYNSYM, SHT_PROGBITS, SHT_STRTAB,
    SHT_SYMTAB, STB_GLOBAL, STT_FUNC, STT_OBJECT,
};
use elfdwarf::formats::elf::utils::{write_u16, write_u32, write_word};

/// Growable little/big-endian byte buffer
pub struct Writer {
    pub order: ByteOrder,
    pub buf: Vec<u8>,
}

impl Writer {
    pub fn new(order: ByteOrder) -> Self {
        Self {
            order,
            buf: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        write_u16(&mut self.buf, v, self.order);
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        write_u32(&mut self.buf, v, self.order);
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        write_word(&mut self.buf, v, ElfClass::Elf64, self.order);
        self
    }

    /// Address of `size` bytes (4 or 8)
    pub fn addr(&mut self, size: u8, v: u64) -> &mut Self {
        match size {
            4 => self.u32(v as u32),
            _ => self.u64(v),
        }
    }

    pub fn uleb(&mut self, v: u64) -> &mut Self {
        gimli::leb128::write::unsigned(&mut self.buf, v).unwrap();
        self
    }

    pub fn sleb(&mut self, v: i64) -> &mut Self {
        gimli::leb128::write::signed(&mut self.buf, v).unwrap();
        self
    }

    pub fn cstr(&mut self, s: &str) -> &mut Self {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
        self
    }

    pub fn bytes(&mut self, b: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(b);
        self
    }

    /// Overwrite four bytes at `at`
    pub fn patch_u32(&mut self, at: usize, v: u32) {
        let bytes = match self.order {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        };
        self.buf[at..at + 4].copy_from_slice(&bytes);
    }

    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

/// A symbol to place in a generated symbol table
#[derive(Debug, Clone, Copy)]
pub struct Sym {
    pub name: &'static str,
    pub value: u64,
    pub size: u64,
    pub info: u8,
    pub shndx: u16,
}

impl Sym {
    pub fn func(name: &'static str, value: u64, size: u64) -> Self {
        Self {
            name,
            value,
            size,
            info: (STB_GLOBAL << 4) | STT_FUNC,
            shndx: 1,
        }
    }

    pub fn object(name: &'static str, value: u64, size: u64) -> Self {
        Self {
            info: (STB_GLOBAL << 4) | STT_OBJECT,
            ..Self::func(name, value, size)
        }
    }
}

struct SectionSpec {
    name: String,
    sh_type: u32,
    flags: u64,
    addr: u64,
    link: u32,
    entsize: u64,
    data: Vec<u8>,
}

/// In-memory ELF image writer.
///
/// Layout: file header, program headers, section contents, the
/// section-name string table, then the section header table.
pub struct ElfBuilder {
    class: ElfClass,
    order: ByteOrder,
    sections: Vec<SectionSpec>,
    loads: Vec<(usize, u32)>,
}

impl ElfBuilder {
    pub fn new(class: ElfClass, order: ByteOrder) -> Self {
        Self {
            class,
            order,
            sections: Vec::new(),
            loads: Vec::new(),
        }
    }

    /// Add a non-allocated section
    pub fn section(mut self, name: &str, sh_type: u32, data: Vec<u8>) -> Self {
        self.sections.push(SectionSpec {
            name: name.to_string(),
            sh_type,
            flags: 0,
            addr: 0,
            link: 0,
            entsize: 0,
            data,
        });
        self
    }

    /// Add executable code at `addr`, mapped by its own `PT_LOAD`
    pub fn text(mut self, addr: u64, data: Vec<u8>) -> Self {
        self.sections.push(SectionSpec {
            name: ".text".to_string(),
            sh_type: SHT_PROGBITS,
            flags: (SectionFlags::ALLOC | SectionFlags::EXECINSTR).bits(),
            addr,
            link: 0,
            entsize: 0,
            data,
        });
        self.loads.push((self.sections.len() - 1, 0x5));
        self
    }

    /// Add `.symtab` and its `.strtab`
    pub fn symbols(self, syms: &[Sym]) -> Self {
        self.symbol_table(SHT_SYMTAB, ".symtab", ".strtab", syms)
    }

    /// Add `.dynsym` and its `.dynstr`
    pub fn dynamic_symbols(self, syms: &[Sym]) -> Self {
        self.symbol_table(SHT_DYNSYM, ".dynsym", ".dynstr", syms)
    }

    fn symbol_table(mut self, sh_type: u32, name: &str, strname: &str, syms: &[Sym]) -> Self {
        let mut strtab = Writer::new(self.order);
        strtab.u8(0);
        let mut table = Writer::new(self.order);
        // Null symbol
        table.bytes(&vec![0; self.class.symbol_size()]);
        for sym in syms {
            let st_name = strtab.len() as u32;
            strtab.cstr(sym.name);
            match self.class {
                ElfClass::Elf32 => {
                    table
                        .u32(st_name)
                        .u32(sym.value as u32)
                        .u32(sym.size as u32)
                        .u8(sym.info)
                        .u8(0)
                        .u16(sym.shndx);
                }
                ElfClass::Elf64 => {
                    table
                        .u32(st_name)
                        .u8(sym.info)
                        .u8(0)
                        .u16(sym.shndx)
                        .u64(sym.value)
                        .u64(sym.size);
                }
            }
        }

        // Section 0 is the null section, so the string table lands at len + 2
        let strtab_index = self.sections.len() as u32 + 2;
        self.sections.push(SectionSpec {
            name: name.to_string(),
            sh_type,
            flags: 0,
            addr: 0,
            link: strtab_index,
            entsize: self.class.symbol_size() as u64,
            data: table.finish(),
        });
        self.section(strname, SHT_STRTAB, strtab.finish())
    }

    pub fn build(self) -> Vec<u8> {
        let class = self.class;
        let order = self.order;
        let phoff = class.header_size() as u64;
        let phnum = self.loads.len();

        let mut out = vec![0u8; phoff as usize + phnum * class.program_header_size()];

        let mut shstrtab = Writer::new(order);
        shstrtab.u8(0);
        let mut placed = Vec::with_capacity(self.sections.len());
        for spec in &self.sections {
            while out.len() % 8 != 0 {
                out.push(0);
            }
            let name = shstrtab.len() as u32;
            shstrtab.cstr(&spec.name);
            placed.push((name, out.len() as u64));
            out.extend_from_slice(&spec.data);
        }
        let shstrtab_name = shstrtab.len() as u32;
        shstrtab.cstr(".shstrtab");
        let shstrtab_offset = out.len() as u64;
        let shstrtab = shstrtab.finish();
        out.extend_from_slice(&shstrtab);
        while out.len() % 8 != 0 {
            out.push(0);
        }

        let shoff = out.len() as u64;
        let mut table = Vec::new();
        let shdr = |out: &mut Vec<u8>, f: [u64; 10]| {
            write_u32(out, f[0] as u32, order);
            write_u32(out, f[1] as u32, order);
            for v in &f[2..6] {
                write_word(out, *v, class, order);
            }
            write_u32(out, f[6] as u32, order);
            write_u32(out, f[7] as u32, order);
            write_word(out, f[8], class, order);
            write_word(out, f[9], class, order);
        };
        shdr(&mut table, [0; 10]);
        for (spec, (name, offset)) in self.sections.iter().zip(&placed) {
            shdr(
                &mut table,
                [
                    *name as u64,
                    spec.sh_type as u64,
                    spec.flags,
                    spec.addr,
                    *offset,
                    spec.data.len() as u64,
                    spec.link as u64,
                    0,
                    1,
                    spec.entsize,
                ],
            );
        }
        shdr(
            &mut table,
            [
                shstrtab_name as u64,
                SHT_STRTAB as u64,
                0,
                0,
                shstrtab_offset,
                shstrtab.len() as u64,
                0,
                0,
                1,
                0,
            ],
        );
        out.extend_from_slice(&table);

        let mut phdrs = Vec::new();
        for &(index, flags) in &self.loads {
            let spec = &self.sections[index];
            let (offset, size) = (placed[index].1, spec.data.len() as u64);
            write_u32(&mut phdrs, 1, order);
            match class {
                ElfClass::Elf32 => {
                    for v in [offset, spec.addr, spec.addr, size, size] {
                        write_word(&mut phdrs, v, class, order);
                    }
                    write_u32(&mut phdrs, flags, order);
                    write_word(&mut phdrs, 0x1000, class, order);
                }
                ElfClass::Elf64 => {
                    write_u32(&mut phdrs, flags, order);
                    for v in [offset, spec.addr, spec.addr, size, size, 0x1000] {
                        write_word(&mut phdrs, v, class, order);
                    }
                }
            }
        }
        let phdrs_end = phoff as usize + phdrs.len();
        out[phoff as usize..phdrs_end].copy_from_slice(&phdrs);

        let header = ElfHeader {
            ident: ElfIdent {
                class,
                data: order,
                version: 1,
                osabi: 0,
                abiversion: 0,
            },
            e_type: 2,
            e_machine: if class == ElfClass::Elf64 { 62 } else { 3 },
            e_version: 1,
            e_entry: self.sections.iter().find(|s| s.name == ".text").map_or(0, |s| s.addr),
            e_phoff: if phnum == 0 { 0 } else { phoff },
            e_shoff: shoff,
            e_flags: 0,
            e_ehsize: class.header_size() as u16,
            e_phentsize: class.program_header_size() as u16,
            e_phnum: phnum as u16,
            e_shentsize: class.section_header_size() as u16,
            e_shnum: self.sections.len() as u16 + 2,
            e_shstrndx: self.sections.len() as u16 + 1,
        };
        let encoded = header.to_bytes();
        out[..encoded.len()].copy_from_slice(&encoded);
        out
    }
}

// DWARF attribute and form codes used by the sample program
const DW_TAG_COMPILE_UNIT: u64 = 0x11;
const DW_TAG_SUBPROGRAM: u64 = 0x2e;
const DW_TAG_VARIABLE: u64 = 0x34;
const DW_AT_NAME: u64 = 0x03;
const DW_AT_STMT_LIST: u64 = 0x10;
const DW_AT_LOW_PC: u64 = 0x11;
const DW_AT_HIGH_PC: u64 = 0x12;
const DW_AT_LINKAGE_NAME: u64 = 0x6e;
const DW_FORM_ADDR: u64 = 0x01;
const DW_FORM_DATA4: u64 = 0x06;
const DW_FORM_STRING: u64 = 0x08;
const DW_FORM_STRP: u64 = 0x0e;
const DW_FORM_SEC_OFFSET: u64 = 0x17;

/// `.debug_str` of the sample program: `main.c` at 0, `_Z6helperi` at 7
pub const SAMPLE_DEBUG_STR: &[u8] = b"main.c\0_Z6helperi\0";

/// `.debug_abbrev` of the sample program.
///
/// 1: compile_unit (children) name/strp stmt_list low_pc high_pc
/// 2: subprogram (children) name/string low_pc high_pc
/// 3: subprogram name/string linkage_name/strp low_pc high_pc
/// 4: variable name/string
pub fn sample_debug_abbrev() -> Vec<u8> {
    let mut w = Writer::new(ByteOrder::Little);
    let decl = |w: &mut Writer, code: u64, tag: u64, children: bool, attrs: &[(u64, u64)]| {
        w.uleb(code).uleb(tag).u8(children as u8);
        for &(name, form) in attrs {
            w.uleb(name).uleb(form);
        }
        w.u8(0).u8(0);
    };
    let pc = [(DW_AT_LOW_PC, DW_FORM_ADDR), (DW_AT_HIGH_PC, DW_FORM_DATA4)];
    decl(
        &mut w,
        1,
        DW_TAG_COMPILE_UNIT,
        true,
        &[
            (DW_AT_NAME, DW_FORM_STRP),
            (DW_AT_STMT_LIST, DW_FORM_SEC_OFFSET),
            pc[0],
            pc[1],
        ],
    );
    decl(
        &mut w,
        2,
        DW_TAG_SUBPROGRAM,
        true,
        &[(DW_AT_NAME, DW_FORM_STRING), pc[0], pc[1]],
    );
    decl(
        &mut w,
        3,
        DW_TAG_SUBPROGRAM,
        false,
        &[
            (DW_AT_NAME, DW_FORM_STRING),
            (DW_AT_LINKAGE_NAME, DW_FORM_STRP),
            pc[0],
            pc[1],
        ],
    );
    decl(&mut w, 4, DW_TAG_VARIABLE, false, &[(DW_AT_NAME, DW_FORM_STRING)]);
    w.u8(0);
    w.finish()
}

/// One DWARF 4 unit (32-bit format) describing:
///
/// ```text
/// compile_unit "main.c"  [0x1000, 0x1100)
///   subprogram "main"    [0x1000, 0x1040)
///     subprogram "helper" (_Z6helperi) [0x1010, 0x1020)
///     variable "x"
///   subprogram "other"   [0x1040, 0x1060)
/// ```
pub fn sample_debug_info(order: ByteOrder, address_size: u8) -> Vec<u8> {
    let mut w = Writer::new(order);
    w.u32(0).u16(4).u32(0).u8(address_size);

    w.uleb(1).u32(0).u32(0).addr(address_size, 0x1000).u32(0x100);
    w.uleb(2).cstr("main").addr(address_size, 0x1000).u32(0x40);
    w.uleb(3)
        .cstr("helper")
        .u32(7)
        .addr(address_size, 0x1010)
        .u32(0x10);
    w.uleb(4).cstr("x");
    w.u8(0);
    w.uleb(2).cstr("other").addr(address_size, 0x1040).u32(0x20);
    w.u8(0);
    w.u8(0);

    let unit_length = (w.len() - 4) as u32;
    w.patch_u32(0, unit_length);
    w.finish()
}

/// DWARF 4 line program for the sample unit.
///
/// Rows: 0x1000 L10, 0x1010 L11, 0x1040 L13 C5, 0x1060 end_sequence,
/// then a second sequence 0x2000 L1, 0x2010 end_sequence. Every row
/// refers to file 1, `src/main.c`.
pub fn sample_debug_line(order: ByteOrder, address_size: u8) -> Vec<u8> {
    let mut w = Writer::new(order);
    w.u32(0).u16(4);
    let header_length_at = w.len();
    w.u32(0);
    let header_start = w.len();
    // min_inst, max_ops, default_is_stmt, line_base, line_range, opcode_base
    w.u8(1).u8(1).u8(1).u8((-5i8) as u8).u8(14).u8(13);
    w.bytes(&[0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]);
    w.cstr("src").u8(0);
    w.cstr("main.c").uleb(1).uleb(0).uleb(0).u8(0);
    let header_length = (w.len() - header_start) as u32;
    w.patch_u32(header_length_at, header_length);

    let set_address = |w: &mut Writer, addr: u64| {
        w.u8(0).uleb(1 + address_size as u64).u8(0x02).addr(address_size, addr);
    };
    let end_sequence = |w: &mut Writer| {
        w.u8(0).uleb(1).u8(0x01);
    };

    set_address(&mut w, 0x1000);
    // advance_line 9, copy
    w.u8(0x03).sleb(9).u8(0x01);
    // special: address += 0x10, line += 1
    w.u8((1 + 5) + 14 * 0x10 + 13);
    // set_column 5, advance_pc 0x30, special: line += 2
    w.u8(0x05).uleb(5);
    w.u8(0x02).uleb(0x30);
    w.u8((2 + 5) + 13);
    // advance_pc 0x20
    w.u8(0x02).uleb(0x20);
    end_sequence(&mut w);

    set_address(&mut w, 0x2000);
    // copy at line 1
    w.u8(0x01);
    w.u8(0x02).uleb(0x10);
    end_sequence(&mut w);

    let unit_length = (w.len() - 4) as u32;
    w.patch_u32(0, unit_length);
    w.finish()
}

/// The sample program as an ELF image with `.symtab` and `.dynsym`.
///
/// `cold_path` covers the second line sequence and has no DWARF entry;
/// `exported` lives only in the dynamic table.
pub fn sample_elf(class: ElfClass, order: ByteOrder) -> Vec<u8> {
    let address_size = class.word_size() as u8;
    ElfBuilder::new(class, order)
        .text(0x1000, vec![0x90; 0x1100])
        .section(".debug_abbrev", SHT_PROGBITS, sample_debug_abbrev())
        .section(".debug_info", SHT_PROGBITS, sample_debug_info(order, address_size))
        .section(".debug_str", SHT_PROGBITS, SAMPLE_DEBUG_STR.to_vec())
        .section(".debug_line", SHT_PROGBITS, sample_debug_line(order, address_size))
        .symbols(&[
            Sym::func("main", 0x1000, 0x40),
            Sym::func("cold_path", 0x2000, 0x10),
            Sym::object("counter", 0x3000, 8),
        ])
        .dynamic_symbols(&[Sym::func("exported", 0x4000, 0x20)])
        .build()
}
