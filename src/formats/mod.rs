//! Binary format decoders.

pub mod dwarf;
pub mod elf;
