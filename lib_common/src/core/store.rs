//! # Per-Slot Snapshot Store
//!
//! One [`TickerRecord`] per registered symbol, each behind its own mutex. The
//! guards form an array index-aligned with the slot space, so a writer on one
//! symbol never contends with a reader of another.
//!
//! ## Consistency
//!
//! - [`SnapshotStore::read_one`] returns a copy taken under the slot guard: it
//!   always reflects exactly one complete [`SnapshotStore::write_quote`] call,
//!   never a mix of two.
//! - [`SnapshotStore::read_all`] locks and copies every slot independently.
//!   Each element is internally consistent but the elements were captured at
//!   slightly different instants. There is no global lock across slots.
//!
//! Critical sections are a fixed-size field copy or overwrite; no I/O and no
//! `.await` ever happens under a guard.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::core::registry::Slot;

/// Cached market snapshot for one symbol.
///
/// Serializes to `{id, fullName, ask, bid, last, open, low, high, feeCurrency}`.
/// Quote values stay decimal strings exactly as the exchange sent them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerRecord {
    /// Base currency id (e.g. `"ETH"` for `"ETHBTC"`).
    pub id: String,
    pub full_name: String,
    pub ask: String,
    pub bid: String,
    pub last: String,
    pub open: String,
    pub low: String,
    pub high: String,
    pub fee_currency: String,
}

impl TickerRecord {
    /// The six quote fields of this record.
    pub fn quote(&self) -> Quote {
        Quote {
            ask: self.ask.clone(),
            bid: self.bid.clone(),
            last: self.last.clone(),
            open: self.open.clone(),
            low: self.low.clone(),
            high: self.high.clone(),
        }
    }
}

/// The quote fields overwritten by every streaming update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Quote {
    pub ask: String,
    pub bid: String,
    pub last: String,
    pub open: String,
    pub low: String,
    pub high: String,
}

/// Fields resolved once during initialization and never touched by streaming.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticFields {
    pub id: String,
    pub full_name: String,
    pub fee_currency: String,
}

/// Fixed-length table of ticker records with one guard per slot.
pub struct SnapshotStore {
    slots: Box<[Mutex<TickerRecord>]>,
}

impl SnapshotStore {
    /// Allocates `len` zero-valued records. The store is never resized.
    pub fn with_slots(len: usize) -> Self {
        let slots = (0..len)
            .map(|_| Mutex::new(TickerRecord::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { slots }
    }

    // A record is always replaced field by field under its guard with plain
    // string moves, so a poisoned guard still holds a complete value.
    fn guard(&self, slot: Slot) -> MutexGuard<'_, TickerRecord> {
        self.slots[slot.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes the write-once fields. Called during initialization, before any
    /// reader or the streaming task exists; it still takes the guard.
    pub fn set_static(&self, slot: Slot, fields: StaticFields) {
        let mut record = self.guard(slot);
        record.id = fields.id;
        record.full_name = fields.full_name;
        record.fee_currency = fields.fee_currency;
    }

    /// Overwrites exactly the six quote fields of `slot`.
    pub fn write_quote(&self, slot: Slot, quote: Quote) {
        let mut record = self.guard(slot);
        record.ask = quote.ask;
        record.bid = quote.bid;
        record.last = quote.last;
        record.open = quote.open;
        record.low = quote.low;
        record.high = quote.high;
    }

    /// Copy of the record at `slot`.
    pub fn read_one(&self, slot: Slot) -> TickerRecord {
        self.guard(slot).clone()
    }

    /// Copies of every record in slot order, each taken under its own guard.
    pub fn read_all(&self) -> Vec<TickerRecord> {
        self.slots
            .iter()
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .collect()
    }
}
