//! Address-to-source queries.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::DecodeConfig;
use crate::demangle::demangle_or_original;
use crate::error::Result;
use crate::formats::dwarf::constants::DW_TAG_subprogram;
use crate::formats::dwarf::die::{Die, DieTree};
use crate::formats::dwarf::info::DwarfInfo;
use crate::formats::dwarf::line::LineState;
use crate::formats::dwarf::unit::CompileUnit;
use crate::formats::elf::ElfFile;
use crate::{log_error, span_trace};

/// Source position of an instruction address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub function: Option<String>,
    pub file: Option<String>,
    /// 0 when no line row covers the address
    pub line: u64,
    pub column: u64,
    pub discriminator: u64,
}

/// Resolves addresses against DWARF data, falling back to ELF symbols.
pub struct Symbolizer<'a, 'data> {
    elf: &'a ElfFile<'data>,
    dwarf: &'a DwarfInfo<'data>,
    config: &'a DecodeConfig,
}

impl<'a, 'data> Symbolizer<'a, 'data> {
    pub fn new(elf: &'a ElfFile<'data>, dwarf: &'a DwarfInfo<'data>, config: &'a DecodeConfig) -> Self {
        Self { elf, dwarf, config }
    }

    /// Function and source line of `address`, or `None` when neither is known.
    pub fn lookup(&self, address: u64) -> Result<Option<Location>> {
        let span = span_trace!("lookup", address);
        let _guard = span.enter();

        let function = self.function_name(address)?;
        let row = self.line_row(address)?;
        trace!(?function, found_row = row.is_some(), "lookup result");

        Ok(match (function, row) {
            (None, None) => None,
            (function, None) => Some(Location {
                function,
                ..Location::default()
            }),
            (function, Some((state, file))) => Some(Location {
                function,
                file,
                line: state.line,
                column: state.column,
                discriminator: state.discriminator,
            }),
        })
    }

    /// Name of the innermost subprogram covering `address`, else of the
    /// covering `STT_FUNC` symbol.
    ///
    /// Units whose entries fail to decode are skipped.
    pub fn function_name(&self, address: u64) -> Result<Option<String>> {
        for unit in self.units() {
            let Ok(tree) = unit
                .entries()
                .map_err(|e| log_error!(e, "skipping unit entries"))
            else {
                continue;
            };
            if let Some(name) = innermost_subprogram(tree, address).and_then(|d| self.die_name(d)) {
                return Ok(Some(name));
            }
        }

        for table in [self.elf.symbol_table()?, self.elf.dynamic_symbol_table()?]
            .into_iter()
            .flatten()
        {
            if let Some(sym) = table.function_at(address)? {
                return Ok(Some(self.display_name(sym.name())));
            }
        }
        Ok(None)
    }

    /// Row opening the line-table range that holds `address`, and its file path.
    ///
    /// A row that ends a sequence never opens a range. Units whose line
    /// program fails to decode are skipped.
    pub fn line_row(&self, address: u64) -> Result<Option<(LineState, Option<String>)>> {
        for unit in self.units() {
            let program = match unit.line_program() {
                Ok(Some(program)) => program,
                Ok(None) => continue,
                Err(e) => {
                    log_error!(e, "skipping line program");
                    continue;
                }
            };
            let Ok(rows) = program
                .rows()
                .map_err(|e| log_error!(e, "skipping line rows"))
            else {
                continue;
            };
            let rows: Vec<&LineState> = rows.collect();
            let hit = rows.windows(2).find(|pair| {
                let (prev, next) = (pair[0], pair[1]);
                !prev.end_sequence && prev.address <= address && address < next.address
            });
            if let Some(pair) = hit {
                let state = *pair[0];
                let file = program
                    .file_path(state.file)
                    .map_err(|e| log_error!(e, "unresolved file"))
                    .unwrap_or_default();
                return Ok(Some((state, file)));
            }
        }
        Ok(None)
    }

    /// Units that decoded; an unreadable `.debug_info` yields none
    fn units(&self) -> &'a [CompileUnit<'data>] {
        self.dwarf
            .compile_units()
            .map_err(|e| log_error!(e, "skipping debug info"))
            .unwrap_or_default()
    }

    /// Linkage name demangled when enabled, else the plain name
    fn die_name(&self, die: &Die<'data>) -> Option<String> {
        if self.config.demangle_names {
            if let Some(linkage) = die.linkage_name() {
                return Some(demangle_or_original(linkage));
            }
        }
        die.name()
            .or_else(|| die.linkage_name())
            .map(str::to_string)
    }

    fn display_name(&self, name: &str) -> String {
        if self.config.demangle_names {
            demangle_or_original(name)
        } else {
            name.to_string()
        }
    }
}

/// Deepest `DW_TAG_subprogram` whose pc range holds `address`
fn innermost_subprogram<'t, 'data>(tree: &'t DieTree<'data>, address: u64) -> Option<&'t Die<'data>> {
    tree.iter()
        .filter(|(_, die)| die.tag == DW_TAG_subprogram && die.contains_address(address))
        .max_by_key(|(id, _)| tree.depth(*id))
        .map(|(_, die)| die)
}
