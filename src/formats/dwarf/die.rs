//! Debugging information entries.
//!
//! The entries of one unit live in a flat arena in preorder; parents and
//! children refer to each other through [`DieId`] indices, and an entry
//! names its unit by the unit's `.debug_info` offset.

use tracing::trace;

use crate::error::{Error, Result};
use crate::formats::dwarf::abbrev::Abbreviations;
use crate::formats::dwarf::constants::*;
use crate::formats::dwarf::form::{decode_form, AttributeValue, StringSections};
use crate::formats::dwarf::reader::{Encoding, Reader};

/// Index of an entry in its unit's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DieId(pub(crate) usize);

impl DieId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A decoded attribute: name, form and value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute<'data> {
    pub name: DwAt,
    pub form: DwForm,
    pub value: AttributeValue<'data>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Die<'data> {
    /// Offset of the entry in `.debug_info`
    pub offset: usize,
    /// Bytes covered by the entry, its children and their closing null entry
    pub size: usize,
    pub code: u64,
    pub tag: DwTag,
    pub has_children: bool,
    pub attributes: Vec<Attribute<'data>>,
    pub children: Vec<DieId>,
    pub parent: Option<DieId>,
    /// Offset of the owning unit's header in `.debug_info`
    pub unit_offset: usize,
}

impl<'data> Die<'data> {
    pub fn attr(&self, name: DwAt) -> Option<&Attribute<'data>> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn value(&self, name: DwAt) -> Option<AttributeValue<'data>> {
        self.attr(name).map(|a| a.value)
    }

    /// `DW_AT_name` when it decoded to a string
    pub fn name(&self) -> Option<&'data str> {
        self.value(DW_AT_name).and_then(|v| v.as_str())
    }

    /// `DW_AT_linkage_name`, or the pre-DWARF 4 `DW_AT_MIPS_linkage_name`
    pub fn linkage_name(&self) -> Option<&'data str> {
        self.value(DW_AT_linkage_name)
            .or_else(|| self.value(DW_AT_MIPS_linkage_name))
            .and_then(|v| v.as_str())
    }

    /// `[low_pc, high_pc)`.
    ///
    /// Since DWARF 4 `high_pc` is an offset from `low_pc` unless it
    /// decoded to an address, directly or through `DW_FORM_indirect`.
    pub fn pc_range(&self) -> Option<(u64, u64)> {
        let low = self.value(DW_AT_low_pc)?.as_u64()?;
        let end = match self.value(DW_AT_high_pc)? {
            AttributeValue::Address(high) => high,
            offset => low.wrapping_add(offset.as_u64()?),
        };
        Some((low, end))
    }

    pub fn contains_address(&self, address: u64) -> bool {
        self.pc_range()
            .is_some_and(|(low, high)| low <= address && address < high)
    }
}

/// Arena holding every entry of one unit.
#[derive(Debug, Clone, Default)]
pub struct DieTree<'data> {
    dies: Vec<Die<'data>>,
    roots: Vec<DieId>,
    padding: usize,
}

impl<'data> DieTree<'data> {
    pub fn get(&self, id: DieId) -> Option<&Die<'data>> {
        self.dies.get(id.0)
    }

    /// Top-level entries in order
    pub fn roots(&self) -> impl Iterator<Item = &Die<'data>> + '_ {
        self.roots.iter().filter_map(|&id| self.get(id))
    }

    pub fn root_ids(&self) -> &[DieId] {
        &self.roots
    }

    /// Bytes of null entries between or after the top-level entries
    pub fn padding(&self) -> usize {
        self.padding
    }

    pub fn children(&self, id: DieId) -> impl Iterator<Item = &Die<'data>> + '_ {
        self.get(id)
            .map(|die| die.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|&child| self.get(child))
    }

    pub fn parent(&self, id: DieId) -> Option<&Die<'data>> {
        self.get(id)?.parent.and_then(|p| self.get(p))
    }

    /// Every entry in preorder
    pub fn iter(&self) -> impl Iterator<Item = (DieId, &Die<'data>)> + '_ {
        self.dies.iter().enumerate().map(|(i, die)| (DieId(i), die))
    }

    pub fn len(&self) -> usize {
        self.dies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dies.is_empty()
    }

    /// Nesting depth of `id`; top-level entries are at depth 0
    pub fn depth(&self, id: DieId) -> usize {
        let mut depth = 0;
        let mut current = self.get(id).and_then(|d| d.parent);
        while let Some(parent) = current {
            depth += 1;
            current = self.get(parent).and_then(|d| d.parent);
        }
        depth
    }
}

/// Everything entry decoding needs from its unit.
pub(crate) struct DieParser<'a, 'data> {
    pub reader: Reader<'data>,
    pub encoding: Encoding,
    pub abbrevs: &'a Abbreviations,
    pub strings: &'a StringSections<'data>,
    pub max_depth: usize,
    pub unit_offset: usize,
    pub dies: Vec<Die<'data>>,
}

impl<'a, 'data> DieParser<'a, 'data> {
    /// Decode top-level entries until the reader reaches the end of its view.
    ///
    /// Null entries at the top level are padding: they are not kept as
    /// roots, but their bytes are counted in [`DieTree::padding`].
    pub fn parse_tree(mut self) -> Result<DieTree<'data>> {
        let mut roots = Vec::new();
        let mut padding = 0;
        while !self.reader.is_empty() {
            let start = self.reader.offset();
            match self.parse_die(0, None)? {
                Some(id) => roots.push(id),
                None => padding += self.reader.offset() - start,
            }
        }
        Ok(DieTree {
            dies: self.dies,
            roots,
            padding,
        })
    }

    /// Decode one entry and, recursively, its children.
    ///
    /// Returns `None` for a null entry, which only ever ends a children list.
    pub fn parse_die(&mut self, depth: usize, parent: Option<DieId>) -> Result<Option<DieId>> {
        let offset = self.reader.offset();
        let code = self.reader.read_uleb128()?;
        if code == 0 {
            return Ok(None);
        }
        if depth >= self.max_depth {
            return Err(Error::DepthLimitExceeded { depth, offset });
        }

        let abbrevs = self.abbrevs;
        let abbrev = abbrevs
            .get(code)
            .ok_or(Error::UnknownAbbreviationCode { code, offset })?;

        let mut attributes = Vec::with_capacity(abbrev.attributes.len());
        for spec in &abbrev.attributes {
            let value = match spec.implicit_const {
                Some(value) => AttributeValue::Signed(value),
                None => decode_form(&mut self.reader, spec.form, self.encoding, self.strings)?,
            };
            attributes.push(Attribute {
                name: spec.name,
                form: spec.form,
                value,
            });
        }

        trace!(offset, code, tag = %abbrev.tag, depth, "die");

        let id = DieId(self.dies.len());
        self.dies.push(Die {
            offset,
            size: 0,
            code,
            tag: abbrev.tag,
            has_children: abbrev.has_children,
            attributes,
            children: Vec::new(),
            parent,
            unit_offset: self.unit_offset,
        });

        if abbrev.has_children {
            let mut children = Vec::new();
            while let Some(child) = self.parse_die(depth + 1, Some(id))? {
                children.push(child);
            }
            self.dies[id.0].children = children;
        }
        self.dies[id.0].size = self.reader.offset() - offset;

        Ok(Some(id))
    }
}
