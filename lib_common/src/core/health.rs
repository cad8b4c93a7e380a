//! # Feed Health
//!
//! Lock-free view of the ingestion subsystem for the HTTP layer. The streaming
//! task is the only writer; handlers read it to tell whether the cache is live
//! or frozen after the upstream connection went away.
//!
//! All counters use `Ordering::Relaxed`: each value is an independent tally and
//! nothing else is synchronized through them.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

/// Lifecycle of the upstream feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedState {
    /// Static fields are being resolved; no subscription sent yet.
    Initializing = 0,
    /// Subscriptions sent, updates flowing into the store.
    Streaming = 1,
    /// The connection was lost. The cache is frozen at its last values.
    Disconnected = 2,
}

impl FeedState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => FeedState::Initializing,
            1 => FeedState::Streaming,
            _ => FeedState::Disconnected,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeedState::Initializing => "initializing",
            FeedState::Streaming => "streaming",
            FeedState::Disconnected => "disconnected",
        }
    }
}

const NEVER: i64 = i64::MIN;

/// Shared feed state and ingestion counters.
pub struct FeedHealth {
    state: AtomicU8,
    updates_applied: AtomicU64,
    decode_errors: AtomicU64,
    unknown_symbols: AtomicU64,
    ignored_messages: AtomicU64,
    /// Local receive time of the last applied update, UTC millis.
    last_update_ms: AtomicI64,
    /// Exchange timestamp carried by the last applied update, UTC millis.
    last_event_ms: AtomicI64,
    /// When the feed last entered `Streaming`, UTC millis.
    streaming_since_ms: AtomicI64,
}

/// Point-in-time copy of [`FeedHealth`], serialized by the `/health` route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatus {
    pub state: FeedState,
    pub updates_applied: u64,
    pub decode_errors: u64,
    pub unknown_symbols: u64,
    pub ignored_messages: u64,
    pub last_update: Option<DateTime<Utc>>,
    pub last_event: Option<DateTime<Utc>>,
}

impl Default for FeedHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedHealth {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(FeedState::Initializing as u8),
            updates_applied: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            unknown_symbols: AtomicU64::new(0),
            ignored_messages: AtomicU64::new(0),
            last_update_ms: AtomicI64::new(NEVER),
            last_event_ms: AtomicI64::new(NEVER),
            streaming_since_ms: AtomicI64::new(NEVER),
        }
    }

    pub fn state(&self) -> FeedState {
        FeedState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn set_state(&self, state: FeedState) {
        let prev = FeedState::from_u8(self.state.swap(state as u8, Ordering::Relaxed));
        if state == FeedState::Streaming && prev != FeedState::Streaming {
            self.streaming_since_ms
                .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        }
        if prev != state {
            log::info!("Feed state: {} -> {}", prev.as_str(), state.as_str());
        }
    }

    /// Records an applied update. `event_time` is the exchange timestamp, if any.
    pub fn record_update(&self, event_time: Option<DateTime<Utc>>) {
        self.record_update_at(Utc::now(), event_time);
    }

    /// Same as [`record_update`](Self::record_update) with an explicit local
    /// receive time.
    pub fn record_update_at(&self, received: DateTime<Utc>, event_time: Option<DateTime<Utc>>) {
        self.updates_applied.fetch_add(1, Ordering::Relaxed);
        self.last_update_ms
            .store(received.timestamp_millis(), Ordering::Relaxed);
        if let Some(ts) = event_time {
            self.last_event_ms
                .store(ts.timestamp_millis(), Ordering::Relaxed);
        }
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown_symbol(&self) {
        self.unknown_symbols.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ignored(&self) {
        self.ignored_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        millis_to_utc(self.last_update_ms.load(Ordering::Relaxed))
    }

    /// True when the feed is disconnected, or when it is streaming but nothing
    /// was applied within `max_age`. A feed that never received an update is
    /// aged from the moment it started streaming.
    pub fn is_stale(&self, max_age: Duration) -> bool {
        match self.state() {
            FeedState::Disconnected => true,
            FeedState::Initializing => false,
            FeedState::Streaming => match self.last_update().or_else(|| {
                millis_to_utc(self.streaming_since_ms.load(Ordering::Relaxed))
            }) {
                Some(ts) => {
                    let age = Utc::now().signed_duration_since(ts);
                    age.to_std().map(|age| age > max_age).unwrap_or(false)
                }
                None => false,
            },
        }
    }

    pub fn snapshot(&self) -> FeedStatus {
        FeedStatus {
            state: self.state(),
            updates_applied: self.updates_applied.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            unknown_symbols: self.unknown_symbols.load(Ordering::Relaxed),
            ignored_messages: self.ignored_messages.load(Ordering::Relaxed),
            last_update: self.last_update(),
            last_event: millis_to_utc(self.last_event_ms.load(Ordering::Relaxed)),
        }
    }
}

fn millis_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    if ms == NEVER {
        return None;
    }
    Utc.timestamp_millis_opt(ms).single()
}
