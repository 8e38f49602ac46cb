//! Attribute form decoding.
//!
//! `decode_form` maps a form code to the primitive read it stands for and
//! applies the post-processing DWARF consumers expect: string-section
//! forms come back as the string itself, flag forms as booleans.

use crate::error::{Error, Result};
use crate::formats::dwarf::constants::*;
use crate::formats::dwarf::reader::{Encoding, Reader};
use crate::formats::elf::utils::read_cstring;

/// Decoded attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeValue<'data> {
    /// Target address (`DW_FORM_addr`)
    Address(u64),
    /// Constants, references and section offsets
    Unsigned(u64),
    /// `DW_FORM_sdata` and implicit constants
    Signed(i64),
    /// Blocks, expressions and 16-byte data
    Block(&'data [u8]),
    /// Inline strings and resolved string-section references
    String(&'data str),
    Flag(bool),
}

impl<'data> AttributeValue<'data> {
    /// Value as an unsigned integer, for any integral variant.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            AttributeValue::Address(v) | AttributeValue::Unsigned(v) => Some(v),
            AttributeValue::Signed(v) => u64::try_from(v).ok(),
            AttributeValue::Flag(v) => Some(u64::from(v)),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            AttributeValue::Signed(v) => Some(v),
            AttributeValue::Address(v) | AttributeValue::Unsigned(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&'data str> {
        match *self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&'data [u8]> {
        match *self {
            AttributeValue::Block(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match *self {
            AttributeValue::Flag(f) => Some(f),
            _ => None,
        }
    }
}

/// The string sections string-reference forms resolve against.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSections<'data> {
    pub debug_str: &'data [u8],
    pub debug_line_str: &'data [u8],
}

impl<'data> StringSections<'data> {
    pub fn debug_str(&self, offset: u64) -> Result<&'data str> {
        lookup(self.debug_str, offset)
    }

    pub fn debug_line_str(&self, offset: u64) -> Result<&'data str> {
        lookup(self.debug_line_str, offset)
    }
}

fn lookup(section: &[u8], offset: u64) -> Result<&str> {
    let offset = usize::try_from(offset).map_err(|_| Error::Truncated {
        offset: usize::MAX,
        needed: 1,
    })?;
    read_cstring(section, offset)
}

/// Whether `form` needs an index table (`.debug_addr`, `.debug_str_offsets`,
/// `.debug_loclists`, `.debug_rnglists`) to resolve.
pub fn is_indexed(form: DwForm) -> bool {
    matches!(
        form,
        DW_FORM_strx
            | DW_FORM_strx1
            | DW_FORM_strx2
            | DW_FORM_strx3
            | DW_FORM_strx4
            | DW_FORM_addrx
            | DW_FORM_addrx1
            | DW_FORM_addrx2
            | DW_FORM_addrx3
            | DW_FORM_addrx4
            | DW_FORM_loclistx
            | DW_FORM_rnglistx
            | DW_FORM_GNU_addr_index
            | DW_FORM_GNU_str_index
    )
}

/// Decode one attribute value of `form` at the reader's position.
///
/// `DW_FORM_implicit_const` never reaches here: its value lives in the
/// abbreviation declaration, so meeting it in the entry stream is an
/// `UnknownForm` error.
pub fn decode_form<'data>(
    reader: &mut Reader<'data>,
    form: DwForm,
    encoding: Encoding,
    strings: &StringSections<'data>,
) -> Result<AttributeValue<'data>> {
    let offset = reader.offset();
    let value = match form {
        DW_FORM_addr => AttributeValue::Address(reader.read_address(encoding.address_size)?),

        DW_FORM_data1 | DW_FORM_ref1 => AttributeValue::Unsigned(reader.read_u8()?.into()),
        DW_FORM_data2 | DW_FORM_ref2 => AttributeValue::Unsigned(reader.read_u16()?.into()),
        DW_FORM_data4 | DW_FORM_ref4 | DW_FORM_ref_sup4 => {
            AttributeValue::Unsigned(reader.read_u32()?.into())
        }
        DW_FORM_data8 | DW_FORM_ref8 | DW_FORM_ref_sig8 | DW_FORM_ref_sup8 => {
            AttributeValue::Unsigned(reader.read_u64()?)
        }
        DW_FORM_data16 => AttributeValue::Block(reader.read_bytes(16)?),

        DW_FORM_udata | DW_FORM_ref_udata => AttributeValue::Unsigned(reader.read_uleb128()?),
        DW_FORM_sdata => AttributeValue::Signed(reader.read_sleb128()?),

        DW_FORM_sec_offset | DW_FORM_GNU_ref_alt | DW_FORM_strp_sup | DW_FORM_GNU_strp_alt => {
            AttributeValue::Unsigned(reader.read_offset(encoding.format)?)
        }
        DW_FORM_ref_addr => {
            // DWARF 2 sized this like an address
            let value = if encoding.version <= 2 {
                reader.read_address(encoding.address_size)?
            } else {
                reader.read_offset(encoding.format)?
            };
            AttributeValue::Unsigned(value)
        }

        DW_FORM_block1 => {
            let len = reader.read_u8()?;
            AttributeValue::Block(reader.read_bytes(len.into())?)
        }
        DW_FORM_block2 => {
            let len = reader.read_u16()?;
            AttributeValue::Block(reader.read_bytes(len.into())?)
        }
        DW_FORM_block4 => {
            let len = reader.read_u32()?;
            AttributeValue::Block(reader.read_bytes(to_len(len.into(), offset)?)?)
        }
        DW_FORM_block | DW_FORM_exprloc => {
            let len = reader.read_uleb128()?;
            AttributeValue::Block(reader.read_bytes(to_len(len, offset)?)?)
        }

        DW_FORM_string => AttributeValue::String(reader.read_cstr()?),
        DW_FORM_strp => {
            let at = reader.read_offset(encoding.format)?;
            AttributeValue::String(strings.debug_str(at)?)
        }
        DW_FORM_line_strp => {
            let at = reader.read_offset(encoding.format)?;
            AttributeValue::String(strings.debug_line_str(at)?)
        }

        DW_FORM_flag => AttributeValue::Flag(reader.read_u8()? != 0),
        DW_FORM_flag_present => AttributeValue::Flag(true),

        DW_FORM_indirect => {
            let code = reader.read_uleb128()?;
            let actual = u16::try_from(code)
                .map(DwForm)
                .map_err(|_| Error::UnknownForm {
                    form: DW_FORM_indirect,
                    offset,
                })?;
            return decode_form(reader, actual, encoding, strings);
        }

        form if is_indexed(form) => {
            return Err(Error::UnsupportedIndirectForm { form, offset });
        }
        form => return Err(Error::UnknownForm { form, offset }),
    };
    Ok(value)
}

fn to_len(len: u64, offset: usize) -> Result<usize> {
    usize::try_from(len).map_err(|_| Error::Truncated {
        offset,
        needed: usize::MAX,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::dwarf::reader::Format;
    use crate::formats::elf::types::ByteOrder;

    const V4_32: Encoding = Encoding {
        format: Format::Dwarf32,
        version: 4,
        address_size: 8,
    };

    fn decode<'a>(
        data: &'a [u8],
        form: DwForm,
        encoding: Encoding,
        strings: &StringSections<'a>,
    ) -> Result<(AttributeValue<'a>, usize)> {
        let mut r = Reader::new(data, ByteOrder::Little);
        let value = decode_form(&mut r, form, encoding, strings)?;
        Ok((value, r.offset()))
    }

    #[test]
    fn test_fixed_width_forms() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let strings = StringSections::default();
        assert_eq!(
            decode(&data, DW_FORM_data1, V4_32, &strings).unwrap(),
            (AttributeValue::Unsigned(0x01), 1)
        );
        assert_eq!(
            decode(&data, DW_FORM_data2, V4_32, &strings).unwrap(),
            (AttributeValue::Unsigned(0x0201), 2)
        );
        assert_eq!(
            decode(&data, DW_FORM_ref4, V4_32, &strings).unwrap(),
            (AttributeValue::Unsigned(0x04030201), 4)
        );
        assert_eq!(
            decode(&data, DW_FORM_addr, V4_32, &strings).unwrap(),
            (AttributeValue::Address(0x0807060504030201), 8)
        );
    }

    #[test]
    fn test_string_forms() {
        let strings = StringSections {
            debug_str: b"\0test.c\0",
            debug_line_str: b"/src\0",
        };
        let (value, len) = decode(&[1, 0, 0, 0], DW_FORM_strp, V4_32, &strings).unwrap();
        assert_eq!(value.as_str(), Some("test.c"));
        assert_eq!(len, 4);

        let (value, _) = decode(&[0, 0, 0, 0], DW_FORM_line_strp, V4_32, &strings).unwrap();
        assert_eq!(value, AttributeValue::String("/src"));

        let (value, len) = decode(b"main\0rest", DW_FORM_string, V4_32, &strings).unwrap();
        assert_eq!(value, AttributeValue::String("main"));
        assert_eq!(len, 5);

        // Past the end of .debug_str
        assert!(decode(&[0x40, 0, 0, 0], DW_FORM_strp, V4_32, &strings).is_err());
    }

    #[test]
    fn test_string_reference_bounds() {
        let strings = StringSections {
            debug_str: b"test.c\0",
            debug_line_str: b"/src",
        };
        // Offset equal to the section length
        assert_eq!(
            decode(&[7, 0, 0, 0], DW_FORM_strp, V4_32, &strings),
            Err(Error::Truncated {
                offset: 7,
                needed: 1
            })
        );
        // Section ends before the terminator
        assert_eq!(
            decode(&[0, 0, 0, 0], DW_FORM_line_strp, V4_32, &strings),
            Err(Error::Truncated {
                offset: 0,
                needed: 5
            })
        );
        // In-place string cut off by the end of the unit
        assert!(decode(b"main", DW_FORM_string, V4_32, &strings).is_err());
    }

    #[test]
    fn test_flags_and_blocks() {
        let strings = StringSections::default();
        assert_eq!(
            decode(&[], DW_FORM_flag_present, V4_32, &strings).unwrap(),
            (AttributeValue::Flag(true), 0)
        );
        assert_eq!(
            decode(&[2], DW_FORM_flag, V4_32, &strings).unwrap(),
            (AttributeValue::Flag(true), 1)
        );
        assert_eq!(
            decode(&[0x02, 0x91, 0x70], DW_FORM_exprloc, V4_32, &strings).unwrap(),
            (AttributeValue::Block(&[0x91, 0x70]), 3)
        );
        let data16 = [0xaa; 16];
        assert_eq!(
            decode(&data16, DW_FORM_data16, V4_32, &strings).unwrap(),
            (AttributeValue::Block(&data16), 16)
        );
        assert!(decode(&[0x05, 0x01], DW_FORM_block1, V4_32, &strings).is_err());
    }

    #[test]
    fn test_ref_addr_width_by_version() {
        let data = [1, 0, 0, 0, 0, 0, 0, 0];
        let strings = StringSections::default();
        let v2 = Encoding { version: 2, ..V4_32 };
        assert_eq!(decode(&data, DW_FORM_ref_addr, v2, &strings).unwrap().1, 8);
        assert_eq!(decode(&data, DW_FORM_ref_addr, V4_32, &strings).unwrap().1, 4);
        let v4_64 = Encoding {
            format: Format::Dwarf64,
            ..V4_32
        };
        assert_eq!(decode(&data, DW_FORM_sec_offset, v4_64, &strings).unwrap().1, 8);
    }

    #[test]
    fn test_indirect_form() {
        // DW_FORM_indirect -> DW_FORM_sdata, value -2
        let strings = StringSections::default();
        assert_eq!(
            decode(&[0x0d, 0x7e], DW_FORM_indirect, V4_32, &strings).unwrap(),
            (AttributeValue::Signed(-2), 2)
        );
    }

    #[test]
    fn test_indexed_forms_are_unsupported() {
        let strings = StringSections::default();
        for form in [DW_FORM_strx1, DW_FORM_addrx, DW_FORM_rnglistx, DW_FORM_GNU_str_index] {
            assert_eq!(
                decode(&[0; 8], form, V4_32, &strings),
                Err(Error::UnsupportedIndirectForm { form, offset: 0 })
            );
        }
    }

    #[test]
    fn test_unknown_forms() {
        let strings = StringSections::default();
        assert_eq!(
            decode(&[0; 8], DwForm(0x7f), V4_32, &strings),
            Err(Error::UnknownForm {
                form: DwForm(0x7f),
                offset: 0
            })
        );
        assert!(matches!(
            decode(&[0; 8], DW_FORM_implicit_const, V4_32, &strings),
            Err(Error::UnknownForm { .. })
        ));
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(AttributeValue::Signed(-1).as_u64(), None);
        assert_eq!(AttributeValue::Signed(5).as_u64(), Some(5));
        assert_eq!(AttributeValue::Flag(true).as_u64(), Some(1));
        assert_eq!(AttributeValue::Unsigned(9).as_i64(), Some(9));
        assert_eq!(AttributeValue::Block(&[1]).as_str(), None);
        assert_eq!(AttributeValue::Flag(false).as_flag(), Some(false));
    }
}
