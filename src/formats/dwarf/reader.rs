//! Cursor over a DWARF section.
//!
//! Offsets are section-relative. Every read is bounds-checked and fails
//! with `Truncated` instead of reading past the view.

use crate::error::{Error, Result};
use crate::formats::elf::types::ByteOrder;
use crate::formats::elf::utils::{read_cstring, EndianRead};

/// Width of section offsets inside a unit, chosen by the initial length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Dwarf32,
    Dwarf64,
}

impl Format {
    /// Size in bytes of an offset-width value
    pub fn offset_size(&self) -> u8 {
        match self {
            Format::Dwarf32 => 4,
            Format::Dwarf64 => 8,
        }
    }

    /// Size in bytes of the initial-length field itself
    pub fn initial_length_size(&self) -> usize {
        match self {
            Format::Dwarf32 => 4,
            Format::Dwarf64 => 12,
        }
    }
}

/// Per-unit parameters every form read depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Encoding {
    pub format: Format,
    pub version: u16,
    pub address_size: u8,
}

/// Forward-only cursor over a section slice.
#[derive(Debug, Clone, Copy)]
pub struct Reader<'data> {
    data: &'data [u8],
    offset: usize,
    order: ByteOrder,
}

impl<'data> Reader<'data> {
    pub fn new(data: &'data [u8], order: ByteOrder) -> Self {
        Self {
            data,
            offset: 0,
            order,
        }
    }

    /// Reader positioned at `offset`
    pub fn at(data: &'data [u8], offset: usize, order: ByteOrder) -> Self {
        Self {
            data,
            offset,
            order,
        }
    }

    /// Reader over `data[..end]` positioned at `offset`, so reads stop at `end`
    pub fn bounded(data: &'data [u8], offset: usize, end: usize, order: ByteOrder) -> Result<Self> {
        let data = data.get(..end).ok_or(Error::Truncated {
            offset,
            needed: end.saturating_sub(offset),
        })?;
        Ok(Self::at(data, offset, order))
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Bytes left before the end of the view
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let value = self.data.read_u8(self.offset)?;
        self.offset += 1;
        Ok(value)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.read_u8().map(|v| v as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let value = self.data.read_u16(self.offset, self.order)?;
        self.offset += 2;
        Ok(value)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let value = self.data.read_u32(self.offset, self.order)?;
        self.offset += 4;
        Ok(value)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let value = self.data.read_u64(self.offset, self.order)?;
        self.offset += 8;
        Ok(value)
    }

    /// Unsigned value of 1, 2, 4 or 8 bytes, used for target addresses.
    pub fn read_sized(&mut self, size: u8) -> Result<u64> {
        match size {
            1 => self.read_u8().map(u64::from),
            2 => self.read_u16().map(u64::from),
            4 => self.read_u32().map(u64::from),
            8 => self.read_u64(),
            _ => Err(Error::InvalidAddressSize {
                size,
                offset: self.offset,
            }),
        }
    }

    pub fn read_address(&mut self, address_size: u8) -> Result<u64> {
        self.read_sized(address_size)
    }

    /// Offset-width value (4 bytes for DWARF32, 8 for DWARF64)
    pub fn read_offset(&mut self, format: Format) -> Result<u64> {
        match format {
            Format::Dwarf32 => self.read_u32().map(u64::from),
            Format::Dwarf64 => self.read_u64(),
        }
    }

    /// Initial length and the format its sentinel selects.
    ///
    /// `0xffff_ffff` announces a 64-bit length; other values in the
    /// reserved range `0xffff_fff0..` are taken as plain 32-bit lengths.
    pub fn read_initial_length(&mut self) -> Result<(u64, Format)> {
        let value = self.read_u32()?;
        if value == 0xffff_ffff {
            Ok((self.read_u64()?, Format::Dwarf64))
        } else {
            Ok((u64::from(value), Format::Dwarf32))
        }
    }

    /// Unsigned LEB128. Payload bits past the 64th are dropped.
    pub fn read_uleb128(&mut self) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift < 64 {
                result |= u64::from(byte & 0x7f) << shift;
            }
            shift += 7;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
    }

    /// Signed LEB128, sign-extended from the last byte's bit 6.
    pub fn read_sleb128(&mut self) -> Result<i64> {
        let mut result = 0i64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift < 64 {
                result |= i64::from(byte & 0x7f) << shift;
            }
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < 64 && byte & 0x40 != 0 {
                    result |= -1i64 << shift;
                }
                return Ok(result);
            }
        }
    }

    /// Null-terminated string read in place; the terminator is consumed.
    pub fn read_cstr(&mut self) -> Result<&'data str> {
        let s = read_cstring(self.data, self.offset)?;
        self.offset += s.len() + 1;
        Ok(s)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'data [u8]> {
        let start = self.offset;
        let bytes = start
            .checked_add(len)
            .and_then(|end| self.data.get(start..end))
            .ok_or(Error::Truncated {
                offset: start,
                needed: len,
            })?;
        self.offset += len;
        Ok(bytes)
    }
}
