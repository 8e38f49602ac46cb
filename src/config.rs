//! Decoder configuration.

use serde::{Deserialize, Serialize};

/// Knobs for DWARF decoding and address queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Deepest DIE nesting accepted before failing with `DepthLimitExceeded`
    pub max_die_depth: usize,
    /// Demangle linkage and symbol names in address queries
    pub demangle_names: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            max_die_depth: 256,
            demangle_names: true,
        }
    }
}

impl DecodeConfig {
    /// Create configuration with a custom DIE depth limit
    pub fn with_max_die_depth(mut self, depth: usize) -> Self {
        self.max_die_depth = depth;
        self
    }

    /// Enable or disable name demangling
    pub fn with_demangling(mut self, enabled: bool) -> Self {
        self.demangle_names = enabled;
        self
    }
}
