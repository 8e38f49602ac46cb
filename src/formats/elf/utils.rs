//! Utility functions for ELF parsing

use crate::error::{Error, Result};
use crate::formats::elf::types::{ByteOrder, ElfClass};

/// Trait for reading values with endianness support
pub trait EndianRead {
    fn read_u8(&self, offset: usize) -> Result<u8>;
    fn read_u16(&self, offset: usize, order: ByteOrder) -> Result<u16>;
    fn read_u32(&self, offset: usize, order: ByteOrder) -> Result<u32>;
    fn read_u64(&self, offset: usize, order: ByteOrder) -> Result<u64>;
}

fn fixed<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N]> {
    offset
        .checked_add(N)
        .and_then(|end| data.get(offset..end))
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(Error::Truncated { offset, needed: N })
}

impl EndianRead for [u8] {
    fn read_u8(&self, offset: usize) -> Result<u8> {
        self.get(offset)
            .copied()
            .ok_or(Error::Truncated { offset, needed: 1 })
    }

    fn read_u16(&self, offset: usize, order: ByteOrder) -> Result<u16> {
        let bytes = fixed::<2>(self, offset)?;
        Ok(match order {
            ByteOrder::Little => u16::from_le_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
        })
    }

    fn read_u32(&self, offset: usize, order: ByteOrder) -> Result<u32> {
        let bytes = fixed::<4>(self, offset)?;
        Ok(match order {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        })
    }

    fn read_u64(&self, offset: usize, order: ByteOrder) -> Result<u64> {
        let bytes = fixed::<8>(self, offset)?;
        Ok(match order {
            ByteOrder::Little => u64::from_le_bytes(bytes),
            ByteOrder::Big => u64::from_be_bytes(bytes),
        })
    }
}

/// Read an address or offset based on ELF class
pub fn read_word(data: &[u8], offset: usize, class: ElfClass, order: ByteOrder) -> Result<u64> {
    match class {
        ElfClass::Elf32 => data.read_u32(offset, order).map(u64::from),
        ElfClass::Elf64 => data.read_u64(offset, order),
    }
}

/// Write an address or offset based on ELF class
pub fn write_word(out: &mut Vec<u8>, value: u64, class: ElfClass, order: ByteOrder) {
    match class {
        ElfClass::Elf32 => write_u32(out, value as u32, order),
        ElfClass::Elf64 => match order {
            ByteOrder::Little => out.extend_from_slice(&value.to_le_bytes()),
            ByteOrder::Big => out.extend_from_slice(&value.to_be_bytes()),
        },
    }
}

pub fn write_u16(out: &mut Vec<u8>, value: u16, order: ByteOrder) {
    match order {
        ByteOrder::Little => out.extend_from_slice(&value.to_le_bytes()),
        ByteOrder::Big => out.extend_from_slice(&value.to_be_bytes()),
    }
}

pub fn write_u32(out: &mut Vec<u8>, value: u32, order: ByteOrder) {
    match order {
        ByteOrder::Little => out.extend_from_slice(&value.to_le_bytes()),
        ByteOrder::Big => out.extend_from_slice(&value.to_be_bytes()),
    }
}

/// Read a null-terminated string from data.
///
/// The terminator must lie inside `data`; an offset at or past the end, or
/// a string that runs off the end, is `Truncated`.
pub fn read_cstring(data: &[u8], offset: usize) -> Result<&str> {
    let slice = data.get(offset..).unwrap_or_default();
    let end = memchr::memchr(0, slice).ok_or(Error::Truncated {
        offset,
        needed: slice.len() + 1,
    })?;

    std::str::from_utf8(&slice[..end]).map_err(|_| Error::InvalidString { offset })
}
