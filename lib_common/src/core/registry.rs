//! # Symbol Registry
//!
//! Bidirectional mapping between a configured symbol (e.g. `"ETHBTC"`) and the
//! dense slot index used to address its record in the
//! [`SnapshotStore`](crate::core::store::SnapshotStore).
//!
//! Slots are assigned once, in configuration order, and the mapping never
//! changes afterwards. Lookups for unknown symbols return `None`; they never
//! insert and never fall back to slot 0.

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Configuration errors detected while building the registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No symbols were configured.
    #[error("symbol list cannot be empty")]
    Empty,

    /// A configured symbol is empty or whitespace only.
    #[error("symbol at position {position} is blank")]
    Blank { position: usize },

    /// The same symbol appears twice in the configuration.
    #[error("symbol '{symbol}' is configured more than once (positions {first} and {second})")]
    Duplicate {
        symbol: String,
        first: usize,
        second: usize,
    },
}

/// Dense index of a registered symbol, in `[0, registry.len())`.
///
/// Only the registry mints slots, so a `Slot` obtained from [`SymbolRegistry::lookup`]
/// is always in range for a store built with the same length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot(usize);

impl Slot {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    /// The raw index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Immutable symbol <-> slot mapping, fixed at startup.
#[derive(Debug, Clone)]
pub struct SymbolRegistry {
    symbols: Vec<String>,
    slots: HashMap<String, Slot>,
}

impl SymbolRegistry {
    /// Registers `symbols` in order. Symbols are case-sensitive and kept verbatim.
    pub fn new(symbols: Vec<String>) -> Result<Self, RegistryError> {
        if symbols.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut slots = HashMap::with_capacity(symbols.len());
        for (position, symbol) in symbols.iter().enumerate() {
            if symbol.trim().is_empty() {
                return Err(RegistryError::Blank { position });
            }
            if let Some(first) = slots.insert(symbol.clone(), Slot::new(position)) {
                return Err(RegistryError::Duplicate {
                    symbol: symbol.clone(),
                    first: first.index(),
                    second: position,
                });
            }
        }

        Ok(Self { symbols, slots })
    }

    /// Resolves a symbol to its slot. `None` means the symbol is not registered.
    #[inline]
    pub fn lookup(&self, symbol: &str) -> Option<Slot> {
        self.slots.get(symbol).copied()
    }

    /// The symbol registered at `slot`.
    pub fn symbol(&self, slot: Slot) -> &str {
        &self.symbols[slot.index()]
    }

    /// All symbols, in slot order.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Iterates `(slot, symbol)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Slot, &str)> + '_ {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (Slot::new(i), s.as_str()))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
