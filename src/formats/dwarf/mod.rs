//! DWARF debugging information decoder.
//!
//! Units are enumerated from `.debug_info`; each unit decodes its entry
//! tree and line program on demand.

pub mod abbrev;
pub mod constants;
pub mod die;
pub mod form;
pub mod info;
pub mod line;
pub mod lookup;
pub mod reader;
pub mod unit;

pub use abbrev::{Abbreviation, Abbreviations, AttributeSpec};
pub use die::{Attribute, Die, DieId, DieTree};
pub use form::{AttributeValue, StringSections};
pub use info::{DwarfInfo, DwarfSections};
pub use line::{
    EntryFormat, FileEntry, LineProgram, LineProgramEntry, LineProgramHeader, LineState, Opcode,
    Operands,
};
pub use lookup::{Location, Symbolizer};
pub use reader::{Encoding, Format, Reader};
pub use unit::{CompileUnit, UnitHeader, UnitType};
