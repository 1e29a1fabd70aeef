/// Controls cross-module visibility of functions and globals (spec §3, §4.5).
///
/// - `Internal`: module-private (default); `il_io`'s serializer omits the
///   keyword for this variant, for backward compatibility with text
///   written before linkage was printed at all.
/// - `Export`: defined here, visible to the linker.
/// - `Import`: declared here, resolved by the linker against an export or
///   an internal in the entry module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Linkage {
    Internal,
    Export,
    Import,
}

impl Linkage {
    pub fn keyword(self) -> Option<&'static str> {
        match self {
            Linkage::Internal => None,
            Linkage::Export => Some("export"),
            Linkage::Import => Some("import"),
        }
    }

    pub fn from_keyword(s: &str) -> Option<Linkage> {
        match s {
            "export" => Some(Linkage::Export),
            "import" => Some(Linkage::Import),
            _ => None,
        }
    }
}

impl Default for Linkage {
    fn default() -> Self {
        Linkage::Internal
    }
}
