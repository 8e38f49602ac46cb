//! Abbreviation tables (`.debug_abbrev`).

use std::collections::HashMap;

use tracing::trace;

use crate::error::{Error, Result};
use crate::formats::dwarf::constants::*;
use crate::formats::dwarf::reader::Reader;
use crate::formats::elf::types::ByteOrder;

/// One `(attribute, form)` pair of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSpec {
    pub name: DwAt,
    pub form: DwForm,
    /// Value carried by `DW_FORM_implicit_const`
    pub implicit_const: Option<i64>,
}

/// A single abbreviation declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abbreviation {
    pub code: u64,
    pub tag: DwTag,
    pub has_children: bool,
    pub attributes: Vec<AttributeSpec>,
}

/// Declarations of one table, keyed by their unit-local code.
#[derive(Debug, Clone, Default)]
pub struct Abbreviations {
    declarations: HashMap<u64, Abbreviation>,
}

impl Abbreviations {
    /// Parse the table starting at `offset` up to its zero-code terminator.
    pub fn parse(debug_abbrev: &[u8], offset: usize, order: ByteOrder) -> Result<Self> {
        let mut reader = Reader::at(debug_abbrev, offset, order);
        let mut declarations = HashMap::new();

        loop {
            let start = reader.offset();
            let code = reader.read_uleb128()?;
            if code == 0 {
                break;
            }
            let tag = DwTag(narrow(reader.read_uleb128()?, start)?);
            let has_children = match reader.read_u8()? {
                0 => false,
                1 => true,
                _ => return Err(Error::InvalidAbbreviation { offset: start }),
            };

            let mut attributes = Vec::new();
            loop {
                let name = reader.read_uleb128()?;
                let form = reader.read_uleb128()?;
                if name == 0 && form == 0 {
                    break;
                }
                let form = DwForm(narrow(form, start)?);
                let implicit_const = if form == DW_FORM_implicit_const {
                    Some(reader.read_sleb128()?)
                } else {
                    None
                };
                attributes.push(AttributeSpec {
                    name: DwAt(narrow(name, start)?),
                    form,
                    implicit_const,
                });
            }

            trace!(code, %tag, has_children, attributes = attributes.len(), "abbreviation");
            declarations.insert(
                code,
                Abbreviation {
                    code,
                    tag,
                    has_children,
                    attributes,
                },
            );
        }

        Ok(Self { declarations })
    }

    pub fn get(&self, code: u64) -> Option<&Abbreviation> {
        self.declarations.get(&code)
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

fn narrow(value: u64, offset: usize) -> Result<u16> {
    u16::try_from(value).map_err(|_| Error::InvalidAbbreviation { offset })
}
