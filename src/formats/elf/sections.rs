//! Section table management

use std::collections::HashMap;

use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::formats::elf::types::*;
use crate::formats::elf::utils::{read_word, EndianRead};

/// Section table with names resolved through the section-name string table
#[derive(Debug, Clone)]
pub struct SectionTable<'data> {
    sections: Vec<Section<'data>>,
    by_name: HashMap<&'data str, usize>,
}

impl<'data> SectionTable<'data> {
    /// Parse section table from ELF data.
    ///
    /// Headers are read first; names are resolved in a second pass once the
    /// section at `e_shstrndx` is known to be a string table.
    pub fn parse(data: &'data [u8], header: &ElfHeader) -> Result<Self> {
        let class = header.ident.class;
        let order = header.ident.data;
        let sh_num = header.e_shnum as usize;

        if sh_num == 0 || header.e_shoff == 0 {
            return Ok(Self {
                sections: Vec::new(),
                by_name: HashMap::new(),
            });
        }

        let records = record_offsets(
            data.len(),
            header.e_shoff,
            sh_num,
            header.e_shentsize as usize,
            class.section_header_size(),
        )?;

        let mut sections = Vec::with_capacity(sh_num);
        for (index, offset) in records.enumerate() {
            let sh = parse_section_header(data, offset, class, order)?;
            let span = if sh.sh_type == SHT_NOBITS {
                ByteSpan::empty(sh.sh_offset, order)
            } else {
                ByteSpan::new(data, sh.sh_offset, sh.sh_size, order)?
            };
            sections.push(Section {
                index,
                header: sh,
                name: "",
                span,
            });
        }

        let shstrndx = header.e_shstrndx as usize;
        if shstrndx == SHN_UNDEF as usize {
            warn!("ELF has no section-name string table; section names left empty");
        } else {
            let strtab = match sections.get(shstrndx) {
                Some(s) if s.header.sh_type == SHT_STRTAB => s.span,
                _ => return Err(Error::InvalidStringTable { index: shstrndx }),
            };
            for section in &mut sections {
                section.name = strtab.cstr(section.header.sh_name as usize)?;
            }
        }

        let mut by_name = HashMap::new();
        for section in &sections {
            trace!(
                index = section.index,
                name = section.name,
                sh_type = section.header.sh_type,
                size = section.header.sh_size,
                "section"
            );
            // First section wins on duplicate names
            by_name.entry(section.name).or_insert(section.index);
        }

        Ok(Self { sections, by_name })
    }

    /// Get section by name
    pub fn by_name(&self, name: &str) -> Option<&Section<'data>> {
        self.by_name.get(name).and_then(|&idx| self.by_index(idx))
    }

    /// Get section by index
    pub fn by_index(&self, index: usize) -> Option<&Section<'data>> {
        self.sections.get(index)
    }

    /// First section of the given type
    pub fn by_type(&self, sh_type: u32) -> Option<&Section<'data>> {
        self.sections.iter().find(|s| s.header.sh_type == sh_type)
    }

    /// Find allocated section containing virtual address
    pub fn by_addr(&self, addr: u64) -> Option<&Section<'data>> {
        self.sections.iter().find(|s| {
            s.is_allocated() && s.header.sh_addr <= addr && addr - s.header.sh_addr < s.header.sh_size
        })
    }

    /// Get all sections
    pub fn sections(&self) -> &[Section<'data>] {
        &self.sections
    }

    /// Count sections
    pub fn count(&self) -> usize {
        self.sections.len()
    }

    /// Check if any section carries DWARF debug info
    pub fn has_debug_info(&self) -> bool {
        self.by_name.contains_key(".debug_info")
    }
}

/// File offsets of `count` fixed-size records starting at `table_offset`.
///
/// Fails with `TruncatedTable` when the whole table does not fit in the
/// buffer or when the declared stride is smaller than one record.
pub(crate) fn record_offsets(
    buffer_len: usize,
    table_offset: u64,
    count: usize,
    stride: usize,
    record_size: usize,
) -> Result<impl Iterator<Item = usize>> {
    let total = (count as u64).saturating_mul(stride as u64);
    let truncated = Error::TruncatedTable {
        offset: table_offset,
        size: total,
        len: buffer_len,
    };
    if stride < record_size {
        return Err(truncated);
    }
    let end = table_offset.checked_add(total).ok_or_else(|| truncated.clone())?;
    if end > buffer_len as u64 {
        return Err(truncated);
    }
    let start = table_offset as usize;
    Ok((0..count).map(move |i| start + i * stride))
}

/// Parse a single section header
fn parse_section_header(
    data: &[u8],
    offset: usize,
    class: ElfClass,
    order: ByteOrder,
) -> Result<SectionHeader> {
    let word = class.word_size();
    // sh_name, sh_type, then four class-width words
    let mut at = offset + 8;
    let mut next_word = || {
        let value = read_word(data, at, class, order);
        at += word;
        value
    };
    let sh_flags = next_word()?;
    let sh_addr = next_word()?;
    let sh_offset = next_word()?;
    let sh_size = next_word()?;
    let link_at = offset + 8 + 4 * word;

    Ok(SectionHeader {
        sh_name: data.read_u32(offset, order)?,
        sh_type: data.read_u32(offset + 4, order)?,
        sh_flags,
        sh_addr,
        sh_offset,
        sh_size,
        sh_link: data.read_u32(link_at, order)?,
        sh_info: data.read_u32(link_at + 4, order)?,
        sh_addralign: read_word(data, link_at + 8, class, order)?,
        sh_entsize: read_word(data, link_at + 8 + word, class, order)?,
    })
}
