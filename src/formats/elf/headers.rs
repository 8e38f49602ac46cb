//! ELF header parsing

use crate::error::{Error, Result};
use crate::formats::elf::types::*;
use crate::formats::elf::utils::{read_word, write_u16, write_u32, write_word, EndianRead};

/// Parse ELF identification bytes
pub fn parse_ident(data: &[u8]) -> Result<ElfIdent> {
    if data.len() < 4 || &data[0..4] != ELF_MAGIC {
        return Err(Error::InvalidMagic);
    }
    if data.len() < 16 {
        return Err(Error::Truncated {
            offset: 0,
            needed: 16,
        });
    }

    let class = ElfClass::from_u8(data[4])?;
    let order = ByteOrder::from_u8(data[5])?;

    Ok(ElfIdent {
        class,
        data: order,
        version: data[6],
        osabi: data[7],
        abiversion: data[8],
    })
}

/// Parse ELF header.
///
/// After the identification bytes the layout only differs in the width of
/// `e_entry`, `e_phoff` and `e_shoff`, so the fields are read with a running
/// cursor whose word size comes from the class.
pub fn parse_header(data: &[u8]) -> Result<ElfHeader> {
    let ident = parse_ident(data)?;
    let class = ident.class;
    let order = ident.data;

    if data.len() < class.header_size() {
        return Err(Error::Truncated {
            offset: 0,
            needed: class.header_size(),
        });
    }

    let word = class.word_size();
    let e_type = data.read_u16(16, order)?;
    let e_machine = data.read_u16(18, order)?;
    let e_version = data.read_u32(20, order)?;

    let mut offset = 24;
    let e_entry = read_word(data, offset, class, order)?;
    offset += word;
    let e_phoff = read_word(data, offset, class, order)?;
    offset += word;
    let e_shoff = read_word(data, offset, class, order)?;
    offset += word;

    Ok(ElfHeader {
        ident,
        e_type,
        e_machine,
        e_version,
        e_entry,
        e_phoff,
        e_shoff,
        e_flags: data.read_u32(offset, order)?,
        e_ehsize: data.read_u16(offset + 4, order)?,
        e_phentsize: data.read_u16(offset + 6, order)?,
        e_phnum: data.read_u16(offset + 8, order)?,
        e_shentsize: data.read_u16(offset + 10, order)?,
        e_shnum: data.read_u16(offset + 12, order)?,
        e_shstrndx: data.read_u16(offset + 14, order)?,
    })
}

impl ElfHeader {
    /// Re-encode the header into its on-disk form.
    ///
    /// Padding bytes in `e_ident` are written as zero, so the output matches
    /// any header produced by a conforming toolchain.
    pub fn to_bytes(&self) -> Vec<u8> {
        let class = self.ident.class;
        let order = self.ident.data;
        let mut out = Vec::with_capacity(class.header_size());

        out.extend_from_slice(ELF_MAGIC);
        out.push(class as u8);
        out.push(order as u8);
        out.push(self.ident.version);
        out.push(self.ident.osabi);
        out.push(self.ident.abiversion);
        out.resize(16, 0);

        write_u16(&mut out, self.e_type, order);
        write_u16(&mut out, self.e_machine, order);
        write_u32(&mut out, self.e_version, order);
        write_word(&mut out, self.e_entry, class, order);
        write_word(&mut out, self.e_phoff, class, order);
        write_word(&mut out, self.e_shoff, class, order);
        write_u32(&mut out, self.e_flags, order);
        write_u16(&mut out, self.e_ehsize, order);
        write_u16(&mut out, self.e_phentsize, order);
        write_u16(&mut out, self.e_phnum, order);
        write_u16(&mut out, self.e_shentsize, order);
        write_u16(&mut out, self.e_shnum, order);
        write_u16(&mut out, self.e_shstrndx, order);

        out
    }
}
