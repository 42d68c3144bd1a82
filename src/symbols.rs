//! Address to symbol name resolution.

use std::collections::BTreeMap;

/// A symbol covering some address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Symbol name, as the resolver reports it
    pub name: String,
    /// Address the symbol starts at
    pub start_address: u64,
}

/// Best-effort address to symbol lookup.
pub trait SymbolResolver {
    /// Returns the nearest symbol at or below `address`, if any.
    fn resolve(&self, address: u64) -> Option<Symbol>;
}

/// Returns the name of the symbol that starts exactly at `address`.
///
/// An address inside a symbol but not at its start is anonymous: we list
/// function starts, not the symbols containing them.
pub fn name_at<R>(resolver: &R, address: u64) -> Option<String>
where
    R: SymbolResolver + ?Sized,
{
    resolver
        .resolve(address)
        .filter(|sym| sym.start_address == address)
        .map(|sym| sym.name)
}

/// A resolver that never finds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSymbols;

impl SymbolResolver for NoSymbols {
    fn resolve(&self, _address: u64) -> Option<Symbol> {
        None
    }
}

/// An in-memory symbol table keyed by start address.
#[derive(Debug, Default, Clone)]
pub struct SymbolMap {
    symbols: BTreeMap<u64, String>,
}

impl SymbolMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a symbol starting at `address`, replacing any previous one.
    pub fn insert(&mut self, address: u64, name: impl Into<String>) {
        self.symbols.insert(address, name.into());
    }

    /// Returns the number of symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Returns true if the map holds no symbols.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(u64, S)> for SymbolMap {
    fn from_iter<I: IntoIterator<Item = (u64, S)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (address, name) in iter {
            map.insert(address, name);
        }
        map
    }
}

impl SymbolResolver for SymbolMap {
    fn resolve(&self, address: u64) -> Option<Symbol> {
        self.symbols
            .range(..=address)
            .next_back()
            .map(|(&start_address, name)| Symbol {
                name: name.clone(),
                start_address,
            })
    }
}

// =============================================================================
// dladdr
// =============================================================================

/// Resolves addresses in the current process with `dladdr(3)`.
///
/// `dladdr` reports the nearest exported or dynamic symbol at or below the
/// address; stripped local functions usually come back with a neighbour's
/// name, which [`name_at`] then discards.
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct DladdrResolver;

#[cfg(unix)]
impl SymbolResolver for DladdrResolver {
    fn resolve(&self, address: u64) -> Option<Symbol> {
        let addr = usize::try_from(address).ok()?;
        let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };

        // SAFETY: dladdr only inspects the address; it never dereferences it.
        let found = unsafe { libc::dladdr(addr as *const libc::c_void, &mut info) };
        if found == 0 || info.dli_sname.is_null() {
            return None;
        }

        let name = unsafe { std::ffi::CStr::from_ptr(info.dli_sname) };
        Some(Symbol {
            name: name.to_string_lossy().into_owned(),
            start_address: info.dli_saddr as u64,
        })
    }
}
