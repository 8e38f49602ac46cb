//! Program header table management

use crate::error::Result;
use crate::formats::elf::sections::record_offsets;
use crate::formats::elf::types::*;
use crate::formats::elf::utils::{read_word, EndianRead};

/// Segment table for program header management
#[derive(Debug, Clone)]
pub struct SegmentTable<'data> {
    segments: Vec<Segment<'data>>,
}

impl<'data> SegmentTable<'data> {
    /// Parse segment table from ELF data
    pub fn parse(data: &'data [u8], header: &ElfHeader) -> Result<Self> {
        let class = header.ident.class;
        let order = header.ident.data;
        let ph_num = header.e_phnum as usize;

        if ph_num == 0 || header.e_phoff == 0 {
            return Ok(Self {
                segments: Vec::new(),
            });
        }

        let records = record_offsets(
            data.len(),
            header.e_phoff,
            ph_num,
            header.e_phentsize as usize,
            class.program_header_size(),
        )?;

        let mut segments = Vec::with_capacity(ph_num);
        for offset in records {
            let ph = parse_program_header(data, offset, class, order)?;
            let span = ByteSpan::new(data, ph.p_offset, ph.p_filesz, order)?;
            segments.push(Segment { header: ph, span });
        }

        Ok(Self { segments })
    }

    /// Convert virtual address to file offset
    pub fn vaddr_to_offset(&self, vaddr: u64) -> Option<u64> {
        let seg = self
            .load_segments()
            .find(|seg| seg.contains_vaddr(vaddr))?;
        let delta = vaddr - seg.header.p_vaddr;
        // In memory but not in file
        (delta < seg.header.p_filesz).then(|| seg.header.p_offset + delta)
    }

    /// Find loadable segment containing virtual address
    pub fn segment_at_vaddr(&self, vaddr: u64) -> Option<&Segment<'data>> {
        self.load_segments().find(|seg| seg.contains_vaddr(vaddr))
    }

    /// Get all LOAD segments
    pub fn load_segments(&self) -> impl Iterator<Item = &Segment<'data>> + '_ {
        self.segments
            .iter()
            .filter(|seg| seg.header.p_type == PT_LOAD)
    }

    /// Get all segments in table order
    pub fn segments(&self) -> &[Segment<'data>] {
        &self.segments
    }

    /// Count segments
    pub fn count(&self) -> usize {
        self.segments.len()
    }
}

/// Parse a single program header.
///
/// ELF64 moves `p_flags` up next to `p_type` to keep the words aligned;
/// ELF32 keeps it after `p_memsz`.
fn parse_program_header(
    data: &[u8],
    offset: usize,
    class: ElfClass,
    order: ByteOrder,
) -> Result<ProgramHeader> {
    let word = class.word_size();
    let p_type = data.read_u32(offset, order)?;
    let (p_flags, first_word) = match class {
        ElfClass::Elf32 => (data.read_u32(offset + 24, order)?, offset + 4),
        ElfClass::Elf64 => (data.read_u32(offset + 4, order)?, offset + 8),
    };
    let field = |n: usize| read_word(data, first_word + n * word, class, order);
    let p_align_at = match class {
        ElfClass::Elf32 => offset + 28,
        ElfClass::Elf64 => offset + 48,
    };

    Ok(ProgramHeader {
        p_type,
        p_flags,
        p_offset: field(0)?,
        p_vaddr: field(1)?,
        p_paddr: field(2)?,
        p_filesz: field(3)?,
        p_memsz: field(4)?,
        p_align: read_word(data, p_align_at, class, order)?,
    })
}
