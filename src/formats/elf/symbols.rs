//! Symbol table reader.
//!
//! Symbols are decoded one at a time on demand: `get` gives random access
//! by index and `iter` a lazy forward walk that can be restarted by
//! calling it again. Names resolve through the string table named by the
//! symbol table's `sh_link`.

use crate::error::{Error, Result};
use crate::formats::elf::types::*;
use crate::formats::elf::utils::EndianRead;

/// A decoded symbol with its resolved name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol<'data> {
    pub index: usize,
    pub name: &'data str,
    pub entry: SymbolEntry,
}

impl<'data> Symbol<'data> {
    pub fn name(&self) -> &'data str {
        self.name
    }

    pub fn value(&self) -> u64 {
        self.entry.st_value
    }

    pub fn size(&self) -> u64 {
        self.entry.st_size
    }

    pub fn bind(&self) -> SymbolBind {
        SymbolBind::from(self.entry.st_info >> 4)
    }

    pub fn symbol_type(&self) -> SymbolType {
        SymbolType::from(self.entry.st_info & 0xf)
    }

    pub fn visibility(&self) -> SymbolVisibility {
        SymbolVisibility::from(self.entry.st_other)
    }

    pub fn section_index(&self) -> SectionIndex {
        SectionIndex::from(self.entry.st_shndx)
    }

    pub fn is_function(&self) -> bool {
        self.symbol_type() == SymbolType::Func
    }

    pub fn is_undefined(&self) -> bool {
        self.section_index() == SectionIndex::Undefined
    }

    /// Whether `addr` lies in `[value, value + size)`
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.value() && addr - self.value() < self.size()
    }
}

/// Lazy reader over a `SHT_SYMTAB` or `SHT_DYNSYM` section
#[derive(Debug, Clone, Copy)]
pub struct SymbolTable<'data> {
    symbols: ByteSpan<'data>,
    strings: ByteSpan<'data>,
    class: ElfClass,
    entry_size: usize,
}

impl<'data> SymbolTable<'data> {
    /// Build a reader over `symtab` whose names live in `strtab`.
    ///
    /// A zero `sh_entsize` falls back to the class's native symbol size.
    pub fn new(symtab: &Section<'data>, strtab: &Section<'data>, class: ElfClass) -> Result<Self> {
        let entry_size = match symtab.header.sh_entsize as usize {
            0 => class.symbol_size(),
            n if n < class.symbol_size() => {
                return Err(Error::TruncatedTable {
                    offset: symtab.span.offset(),
                    size: symtab.header.sh_size,
                    len: symtab.span.len(),
                })
            }
            n => n,
        };
        Ok(Self {
            symbols: symtab.span,
            strings: strtab.span,
            class,
            entry_size,
        })
    }

    /// Number of entries (`size / entry_size`)
    pub fn count(&self) -> usize {
        self.symbols.len() / self.entry_size
    }

    /// Decode the symbol at `index`
    pub fn get(&self, index: usize) -> Result<Symbol<'data>> {
        if index >= self.count() {
            return Err(Error::Truncated {
                offset: index * self.entry_size,
                needed: self.entry_size,
            });
        }
        let entry = parse_symbol(self.symbols, index * self.entry_size, self.class)?;
        let name = if entry.st_name == 0 {
            ""
        } else {
            self.strings.cstr(entry.st_name as usize)?
        };
        Ok(Symbol { index, name, entry })
    }

    /// Lazy forward walk over every symbol
    pub fn iter(&self) -> SymbolIter<'data> {
        SymbolIter {
            table: *self,
            next: 0,
        }
    }

    /// First symbol with the given name
    pub fn by_name(&self, name: &str) -> Result<Option<Symbol<'data>>> {
        for sym in self.iter() {
            let sym = sym?;
            if sym.name == name {
                return Ok(Some(sym));
            }
        }
        Ok(None)
    }

    /// Function symbol whose `[value, value + size)` covers `addr`
    pub fn function_at(&self, addr: u64) -> Result<Option<Symbol<'data>>> {
        for sym in self.iter() {
            let sym = sym?;
            if sym.is_function() && sym.contains(addr) {
                return Ok(Some(sym));
            }
        }
        Ok(None)
    }
}

/// Iterator produced by [`SymbolTable::iter`]
pub struct SymbolIter<'data> {
    table: SymbolTable<'data>,
    next: usize,
}

impl<'data> Iterator for SymbolIter<'data> {
    type Item = Result<Symbol<'data>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.table.count() {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(self.table.get(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.table.count().saturating_sub(self.next);
        (left, Some(left))
    }
}

/// Parse a single symbol entry
fn parse_symbol(span: ByteSpan<'_>, offset: usize, class: ElfClass) -> Result<SymbolEntry> {
    let data = span.bytes();
    let order = span.byte_order();
    match class {
        ElfClass::Elf32 => Ok(SymbolEntry {
            st_name: data.read_u32(offset, order)?,
            st_value: data.read_u32(offset + 4, order)? as u64,
            st_size: data.read_u32(offset + 8, order)? as u64,
            st_info: data.read_u8(offset + 12)?,
            st_other: data.read_u8(offset + 13)?,
            st_shndx: data.read_u16(offset + 14, order)?,
        }),
        ElfClass::Elf64 => Ok(SymbolEntry {
            st_name: data.read_u32(offset, order)?,
            st_info: data.read_u8(offset + 4)?,
            st_other: data.read_u8(offset + 5)?,
            st_shndx: data.read_u16(offset + 6, order)?,
            st_value: data.read_u64(offset + 8, order)?,
            st_size: data.read_u64(offset + 16, order)?,
        }),
    }
}
