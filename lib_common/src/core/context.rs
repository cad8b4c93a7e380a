//! # Ticker Context
//!
//! The single owner of the registry, the store and the feed health. Built once
//! at startup and shared as `Arc<TickerContext>` between the ingestion task
//! (sole writer) and the HTTP handlers (readers).

use crate::core::health::FeedHealth;
use crate::core::registry::{RegistryError, Slot, SymbolRegistry};
use crate::core::store::{Quote, SnapshotStore, StaticFields, TickerRecord};

pub struct TickerContext {
    registry: SymbolRegistry,
    store: SnapshotStore,
    health: FeedHealth,
}

impl TickerContext {
    /// Registers `symbols` and sizes the store to match.
    pub fn new(symbols: Vec<String>) -> Result<Self, RegistryError> {
        let registry = SymbolRegistry::new(symbols)?;
        let store = SnapshotStore::with_slots(registry.len());
        Ok(Self {
            registry,
            store,
            health: FeedHealth::new(),
        })
    }

    pub fn registry(&self) -> &SymbolRegistry {
        &self.registry
    }

    pub fn health(&self) -> &FeedHealth {
        &self.health
    }

    #[inline]
    pub fn lookup(&self, symbol: &str) -> Option<Slot> {
        self.registry.lookup(symbol)
    }

    pub fn read_one(&self, slot: Slot) -> TickerRecord {
        self.store.read_one(slot)
    }

    pub fn read_all(&self) -> Vec<TickerRecord> {
        self.store.read_all()
    }

    /// Lookup and read in one step; `None` for unregistered symbols.
    pub fn read_symbol(&self, symbol: &str) -> Option<TickerRecord> {
        self.lookup(symbol).map(|slot| self.store.read_one(slot))
    }

    pub fn set_static(&self, slot: Slot, fields: StaticFields) {
        self.store.set_static(slot, fields);
    }

    pub fn write_quote(&self, slot: Slot, quote: Quote) {
        self.store.write_quote(slot, quote);
    }

    /// Writes `quote` into the slot of `symbol`. Returns `false`, writing
    /// nothing, when the symbol is not registered.
    pub fn apply_quote(&self, symbol: &str, quote: Quote) -> bool {
        match self.lookup(symbol) {
            Some(slot) => {
                self.store.write_quote(slot, quote);
                true
            }
            None => false,
        }
    }
}
