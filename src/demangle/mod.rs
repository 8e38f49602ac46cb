//! Demangler helpers for Rust and C++ (Itanium) symbols.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolFlavor {
    Rust,
    Itanium,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemangleResult {
    pub original: String,
    pub demangled: String,
    pub flavor: SymbolFlavor,
}

fn looks_itanium(s: &str) -> bool {
    s.starts_with("_Z") || s.starts_with("__Z")
}

pub fn detect_flavor(s: &str) -> SymbolFlavor {
    if rustc_demangle::try_demangle(s).is_ok() {
        return SymbolFlavor::Rust;
    }
    if looks_itanium(s) && cpp_demangle::Symbol::new(s).is_ok() {
        return SymbolFlavor::Itanium;
    }
    SymbolFlavor::Unknown
}

/// Attempt to demangle a single symbol. Returns None when not recognized.
pub fn demangle_one(s: &str) -> Option<DemangleResult> {
    // Rust (v0 + legacy) demangler
    if let Ok(dm) = rustc_demangle::try_demangle(s) {
        return Some(DemangleResult {
            original: s.to_string(),
            demangled: dm.to_string(),
            flavor: SymbolFlavor::Rust,
        });
    }
    // C++ (Itanium) demangler
    if looks_itanium(s) {
        if let Ok(sym) = cpp_demangle::Symbol::new(s) {
            return Some(DemangleResult {
                original: s.to_string(),
                demangled: sym.to_string(),
                flavor: SymbolFlavor::Itanium,
            });
        }
    }
    None
}

/// Demangled form of `s`, or `s` itself when it is not a mangled name.
pub fn demangle_or_original(s: &str) -> String {
    demangle_one(s)
        .map(|r| r.demangled)
        .unwrap_or_else(|| s.to_string())
}
