//! Core ELF types and constants

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::formats::elf::utils::{read_cstring, EndianRead};

/// ELF magic number
pub const ELF_MAGIC: &[u8; 4] = b"\x7fELF";

/// ELF class (32-bit or 64-bit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElfClass {
    Elf32 = 1,
    Elf64 = 2,
}

impl ElfClass {
    pub fn from_u8(val: u8) -> Result<Self> {
        match val {
            1 => Ok(ElfClass::Elf32),
            2 => Ok(ElfClass::Elf64),
            _ => Err(Error::InvalidClass(val)),
        }
    }

    pub fn bits(&self) -> u8 {
        match self {
            ElfClass::Elf32 => 32,
            ElfClass::Elf64 => 64,
        }
    }

    /// Size in bytes of a native address/offset
    pub fn word_size(&self) -> usize {
        match self {
            ElfClass::Elf32 => 4,
            ElfClass::Elf64 => 8,
        }
    }

    pub fn header_size(&self) -> usize {
        match self {
            ElfClass::Elf32 => 52,
            ElfClass::Elf64 => 64,
        }
    }

    pub fn section_header_size(&self) -> usize {
        match self {
            ElfClass::Elf32 => 40,
            ElfClass::Elf64 => 64,
        }
    }

    pub fn program_header_size(&self) -> usize {
        match self {
            ElfClass::Elf32 => 32,
            ElfClass::Elf64 => 56,
        }
    }

    pub fn symbol_size(&self) -> usize {
        match self {
            ElfClass::Elf32 => 16,
            ElfClass::Elf64 => 24,
        }
    }
}

/// Byte order of every multi-byte field in the file (`EI_DATA`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByteOrder {
    Little = 1,
    Big = 2,
}

impl ByteOrder {
    pub fn from_u8(val: u8) -> Result<Self> {
        match val {
            1 => Ok(ByteOrder::Little),
            2 => Ok(ByteOrder::Big),
            _ => Err(Error::InvalidByteOrder(val)),
        }
    }

    pub fn is_little_endian(&self) -> bool {
        matches!(self, ByteOrder::Little)
    }
}

/// ELF file type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElfType {
    None,
    Relocatable,
    Executable,
    SharedObject,
    Core,
    Other(u16),
}

impl From<u16> for ElfType {
    fn from(val: u16) -> Self {
        match val {
            0 => ElfType::None,
            1 => ElfType::Relocatable,
            2 => ElfType::Executable,
            3 => ElfType::SharedObject,
            4 => ElfType::Core,
            other => ElfType::Other(other),
        }
    }
}

/// ELF machine architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElfMachine {
    None,
    Sparc,
    X86,
    Mips,
    PowerPC,
    PowerPC64,
    S390,
    ARM,
    X86_64,
    Xtensa,
    AArch64,
    RiscV,
    Other(u16),
}

impl From<u16> for ElfMachine {
    fn from(val: u16) -> Self {
        match val {
            0 => ElfMachine::None,
            2 => ElfMachine::Sparc,
            3 => ElfMachine::X86,
            8 => ElfMachine::Mips,
            20 => ElfMachine::PowerPC,
            21 => ElfMachine::PowerPC64,
            22 => ElfMachine::S390,
            40 => ElfMachine::ARM,
            62 => ElfMachine::X86_64,
            94 => ElfMachine::Xtensa,
            183 => ElfMachine::AArch64,
            243 => ElfMachine::RiscV,
            other => ElfMachine::Other(other),
        }
    }
}

/// ELF identification (first 16 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfIdent {
    pub class: ElfClass,
    pub data: ByteOrder,
    pub version: u8,
    pub osabi: u8,
    pub abiversion: u8,
}

/// ELF header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfHeader {
    pub ident: ElfIdent,
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u64,
    pub e_phoff: u64,
    pub e_shoff: u64,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

impl ElfHeader {
    pub fn class(&self) -> ElfClass {
        self.ident.class
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.ident.data
    }

    pub fn file_type(&self) -> ElfType {
        ElfType::from(self.e_type)
    }

    pub fn machine(&self) -> ElfMachine {
        ElfMachine::from(self.e_machine)
    }

    pub fn entry_point(&self) -> u64 {
        self.e_entry
    }
}

/// Section header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u64,
    pub sh_addr: u64,
    pub sh_offset: u64,
    pub sh_size: u64,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u64,
    pub sh_entsize: u64,
}

/// Section types
pub const SHT_NULL: u32 = 0;
pub const SHT_PROGBITS: u32 = 1;
pub const SHT_SYMTAB: u32 = 2;
pub const SHT_STRTAB: u32 = 3;
pub const SHT_RELA: u32 = 4;
pub const SHT_HASH: u32 = 5;
pub const SHT_DYNAMIC: u32 = 6;
pub const SHT_NOTE: u32 = 7;
pub const SHT_NOBITS: u32 = 8;
pub const SHT_REL: u32 = 9;
pub const SHT_DYNSYM: u32 = 11;

/// Classified `sh_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionType {
    Null,
    ProgBits,
    SymTab,
    StrTab,
    Rela,
    Hash,
    Dynamic,
    Note,
    NoBits,
    Rel,
    DynSym,
    Other(u32),
}

impl From<u32> for SectionType {
    fn from(val: u32) -> Self {
        match val {
            SHT_NULL => SectionType::Null,
            SHT_PROGBITS => SectionType::ProgBits,
            SHT_SYMTAB => SectionType::SymTab,
            SHT_STRTAB => SectionType::StrTab,
            SHT_RELA => SectionType::Rela,
            SHT_HASH => SectionType::Hash,
            SHT_DYNAMIC => SectionType::Dynamic,
            SHT_NOTE => SectionType::Note,
            SHT_NOBITS => SectionType::NoBits,
            SHT_REL => SectionType::Rel,
            SHT_DYNSYM => SectionType::DynSym,
            other => SectionType::Other(other),
        }
    }
}

bitflags! {
    /// Section flags (`sh_flags`); unknown bits are retained
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SectionFlags: u64 {
        const WRITE = 0x1;
        const ALLOC = 0x2;
        const EXECINSTR = 0x4;
        const MERGE = 0x10;
        const STRINGS = 0x20;
        const INFO_LINK = 0x40;
        const LINK_ORDER = 0x80;
        const GROUP = 0x200;
        const TLS = 0x400;
        const COMPRESSED = 0x800;
        const _ = !0;
    }
}

/// Special section indices
pub const SHN_UNDEF: u16 = 0;
pub const SHN_LORESERVE: u16 = 0xff00;
pub const SHN_ABS: u16 = 0xfff1;
pub const SHN_COMMON: u16 = 0xfff2;
pub const SHN_XINDEX: u16 = 0xffff;

/// Program header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramHeader {
    pub p_type: u32,
    pub p_flags: u32,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_paddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
    pub p_align: u64,
}

/// Program header types
pub const PT_NULL: u32 = 0;
pub const PT_LOAD: u32 = 1;
pub const PT_DYNAMIC: u32 = 2;
pub const PT_INTERP: u32 = 3;
pub const PT_NOTE: u32 = 4;
pub const PT_SHLIB: u32 = 5;
pub const PT_PHDR: u32 = 6;
pub const PT_TLS: u32 = 7;
pub const PT_GNU_EH_FRAME: u32 = 0x6474e550;
pub const PT_GNU_STACK: u32 = 0x6474e551;
pub const PT_GNU_RELRO: u32 = 0x6474e552;

/// Classified `p_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentType {
    Null,
    Load,
    Dynamic,
    Interp,
    Note,
    Shlib,
    Phdr,
    Tls,
    GnuEhFrame,
    GnuStack,
    GnuRelro,
    Other(u32),
}

impl From<u32> for SegmentType {
    fn from(val: u32) -> Self {
        match val {
            PT_NULL => SegmentType::Null,
            PT_LOAD => SegmentType::Load,
            PT_DYNAMIC => SegmentType::Dynamic,
            PT_INTERP => SegmentType::Interp,
            PT_NOTE => SegmentType::Note,
            PT_SHLIB => SegmentType::Shlib,
            PT_PHDR => SegmentType::Phdr,
            PT_TLS => SegmentType::Tls,
            PT_GNU_EH_FRAME => SegmentType::GnuEhFrame,
            PT_GNU_STACK => SegmentType::GnuStack,
            PT_GNU_RELRO => SegmentType::GnuRelro,
            other => SegmentType::Other(other),
        }
    }
}

bitflags! {
    /// Segment permission flags (`p_flags`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SegmentFlags: u32 {
        const X = 0x1;
        const W = 0x2;
        const R = 0x4;
        const _ = !0;
    }
}

/// Raw symbol entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolEntry {
    pub st_name: u32,
    pub st_value: u64,
    pub st_size: u64,
    pub st_info: u8,
    pub st_other: u8,
    pub st_shndx: u16,
}

/// Symbol binding
pub const STB_LOCAL: u8 = 0;
pub const STB_GLOBAL: u8 = 1;
pub const STB_WEAK: u8 = 2;

/// Symbol types
pub const STT_NOTYPE: u8 = 0;
pub const STT_OBJECT: u8 = 1;
pub const STT_FUNC: u8 = 2;
pub const STT_SECTION: u8 = 3;
pub const STT_FILE: u8 = 4;
pub const STT_COMMON: u8 = 5;
pub const STT_TLS: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolBind {
    Local,
    Global,
    Weak,
    Other(u8),
}

impl From<u8> for SymbolBind {
    fn from(val: u8) -> Self {
        match val {
            STB_LOCAL => SymbolBind::Local,
            STB_GLOBAL => SymbolBind::Global,
            STB_WEAK => SymbolBind::Weak,
            other => SymbolBind::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolType {
    NoType,
    Object,
    Func,
    Section,
    File,
    Common,
    Tls,
    Other(u8),
}

impl From<u8> for SymbolType {
    fn from(val: u8) -> Self {
        match val {
            STT_NOTYPE => SymbolType::NoType,
            STT_OBJECT => SymbolType::Object,
            STT_FUNC => SymbolType::Func,
            STT_SECTION => SymbolType::Section,
            STT_FILE => SymbolType::File,
            STT_COMMON => SymbolType::Common,
            STT_TLS => SymbolType::Tls,
            other => SymbolType::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolVisibility {
    Default,
    Internal,
    Hidden,
    Protected,
}

impl From<u8> for SymbolVisibility {
    fn from(st_other: u8) -> Self {
        match st_other & 0x3 {
            0 => SymbolVisibility::Default,
            1 => SymbolVisibility::Internal,
            2 => SymbolVisibility::Hidden,
            _ => SymbolVisibility::Protected,
        }
    }
}

/// Classified `st_shndx`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionIndex {
    Undefined,
    Absolute,
    Common,
    /// Real index lives in `SHT_SYMTAB_SHNDX`
    Extended,
    Index(u16),
    Reserved(u16),
}

impl From<u16> for SectionIndex {
    fn from(val: u16) -> Self {
        match val {
            SHN_UNDEF => SectionIndex::Undefined,
            SHN_ABS => SectionIndex::Absolute,
            SHN_COMMON => SectionIndex::Common,
            SHN_XINDEX => SectionIndex::Extended,
            v if v >= SHN_LORESERVE => SectionIndex::Reserved(v),
            v => SectionIndex::Index(v),
        }
    }
}

/// A non-owning view into the file buffer, tagged with its byte order.
///
/// `offset` is the position of `data` inside the original file, so
/// `offset + data.len()` never exceeds the buffer length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSpan<'data> {
    offset: u64,
    data: &'data [u8],
    order: ByteOrder,
}

impl<'data> ByteSpan<'data> {
    /// Slice `size` bytes at `offset` out of `file`, failing with
    /// `TruncatedTable` when the range does not fit.
    pub fn new(file: &'data [u8], offset: u64, size: u64, order: ByteOrder) -> Result<Self> {
        let truncated = Error::TruncatedTable {
            offset,
            size,
            len: file.len(),
        };
        let start = usize::try_from(offset).map_err(|_| truncated.clone())?;
        let len = usize::try_from(size).map_err(|_| truncated.clone())?;
        let end = start.checked_add(len).ok_or_else(|| truncated.clone())?;
        let data = file.get(start..end).ok_or(truncated)?;
        Ok(Self {
            offset,
            data,
            order,
        })
    }

    pub fn empty(offset: u64, order: ByteOrder) -> Self {
        Self {
            offset,
            data: &[],
            order,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes(&self) -> &'data [u8] {
        self.data
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    pub fn read_u16(&self, offset: usize) -> Result<u16> {
        self.data.read_u16(offset, self.order)
    }

    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        self.data.read_u32(offset, self.order)
    }

    pub fn read_u64(&self, offset: usize) -> Result<u64> {
        self.data.read_u64(offset, self.order)
    }

    /// Null-terminated string starting at `offset` within the span
    pub fn cstr(&self, offset: usize) -> Result<&'data str> {
        read_cstring(self.data, offset)
    }
}

/// Section with its resolved name and raw bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section<'data> {
    pub index: usize,
    pub header: SectionHeader,
    pub name: &'data str,
    pub span: ByteSpan<'data>,
}

impl<'data> Section<'data> {
    pub fn name(&self) -> &'data str {
        self.name
    }

    pub fn data(&self) -> &'data [u8] {
        self.span.bytes()
    }

    pub fn section_type(&self) -> SectionType {
        SectionType::from(self.header.sh_type)
    }

    pub fn flags(&self) -> SectionFlags {
        SectionFlags::from_bits_retain(self.header.sh_flags)
    }

    pub fn size(&self) -> u64 {
        self.header.sh_size
    }

    pub fn addr(&self) -> u64 {
        self.header.sh_addr
    }

    pub fn link(&self) -> u32 {
        self.header.sh_link
    }

    pub fn is_executable(&self) -> bool {
        self.flags().contains(SectionFlags::EXECINSTR)
    }

    pub fn is_writable(&self) -> bool {
        self.flags().contains(SectionFlags::WRITE)
    }

    pub fn is_allocated(&self) -> bool {
        self.flags().contains(SectionFlags::ALLOC)
    }
}

/// Program segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'data> {
    pub header: ProgramHeader,
    pub span: ByteSpan<'data>,
}

impl<'data> Segment<'data> {
    pub fn segment_type(&self) -> SegmentType {
        SegmentType::from(self.header.p_type)
    }

    pub fn flags(&self) -> SegmentFlags {
        SegmentFlags::from_bits_retain(self.header.p_flags)
    }

    pub fn data(&self) -> &'data [u8] {
        self.span.bytes()
    }

    pub fn is_executable(&self) -> bool {
        self.flags().contains(SegmentFlags::X)
    }

    pub fn is_writable(&self) -> bool {
        self.flags().contains(SegmentFlags::W)
    }

    pub fn is_readable(&self) -> bool {
        self.flags().contains(SegmentFlags::R)
    }

    pub fn contains_vaddr(&self, addr: u64) -> bool {
        addr >= self.header.p_vaddr
            && addr - self.header.p_vaddr < self.header.p_memsz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_codes_pass_through() {
        assert_eq!(ElfMachine::from(0x1234), ElfMachine::Other(0x1234));
        assert_eq!(SectionType::from(0x6ffffff6), SectionType::Other(0x6ffffff6));
        assert_eq!(SegmentType::from(PT_GNU_STACK), SegmentType::GnuStack);
        assert_eq!(SymbolBind::from(10), SymbolBind::Other(10));
        assert_eq!(SymbolType::from(STT_FUNC), SymbolType::Func);
        assert_eq!(SymbolVisibility::from(0xfe), SymbolVisibility::Hidden);
    }

    #[test]
    fn test_section_index_classes() {
        assert_eq!(SectionIndex::from(0), SectionIndex::Undefined);
        assert_eq!(SectionIndex::from(7), SectionIndex::Index(7));
        assert_eq!(SectionIndex::from(SHN_ABS), SectionIndex::Absolute);
        assert_eq!(SectionIndex::from(SHN_COMMON), SectionIndex::Common);
        assert_eq!(SectionIndex::from(0xff10), SectionIndex::Reserved(0xff10));
    }

    #[test]
    fn test_byte_span_bounds() {
        let file = [0u8; 16];
        let span = ByteSpan::new(&file, 8, 8, ByteOrder::Little).unwrap();
        assert_eq!(span.offset(), 8);
        assert_eq!(span.len(), 8);

        assert!(matches!(
            ByteSpan::new(&file, 12, 8, ByteOrder::Little),
            Err(Error::TruncatedTable { offset: 12, size: 8, len: 16 })
        ));
        assert!(ByteSpan::new(&file, u64::MAX, 2, ByteOrder::Little).is_err());
    }

    #[test]
    fn test_flags_retain_unknown_bits() {
        let flags = SectionFlags::from_bits_retain(0x8000_0006);
        assert!(flags.contains(SectionFlags::ALLOC | SectionFlags::EXECINSTR));
        assert_eq!(flags.bits(), 0x8000_0006);
    }
}
