//! Dedupe/debounce maps (§3, §5).
//!
//! `LevelDedupe` guards grid-trigger re-firing on `(token, level)` within a
//! 30s window. `FillDedupe` guards the position tracker against double-
//! counting a replayed `OrderFilled` event, keyed by `(order_id, filled_at)`
//! with 1s tolerance, pruned after an hour.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use super::market::Side;

const LEVEL_TTL_SECS: i64 = 30;
const FILL_TTL_SECS: i64 = 3600;
const FILL_TOLERANCE_SECS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LevelKey {
    pub side: Side,
    pub level_cents: i64,
}

/// `processedLevel: levelKey -> timestamp`.
#[derive(Debug, Default)]
pub struct LevelDedupe {
    entries: HashMap<LevelKey, DateTime<Utc>>,
}

impl LevelDedupe {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if `key` fired within the last 30s (still deduped).
    pub fn is_recent(&self, key: LevelKey, now: DateTime<Utc>) -> bool {
        self.entries
            .get(&key)
            .is_some_and(|ts| now - *ts < Duration::seconds(LEVEL_TTL_SECS))
    }

    pub fn mark(&mut self, key: LevelKey, now: DateTime<Utc>) {
        self.entries.insert(key, now);
    }

    /// Release rule for `Failed(allowRetry)` plans (§4.4): the level is made
    /// eligible to fire again immediately, rather than waiting out the TTL.
    pub fn release(&mut self, key: LevelKey) {
        self.entries.remove(&key);
    }

    pub fn prune(&mut self, now: DateTime<Utc>) {
        self.entries
            .retain(|_, ts| now - *ts < Duration::seconds(LEVEL_TTL_SECS));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// `processedFill: orderId -> fillTimestamp`, with a second index so a
/// replay inside the 1s tolerance window is recognized as the same event
/// even if the timestamp isn't bit-identical.
#[derive(Debug, Default)]
pub struct FillDedupe {
    entries: HashMap<String, DateTime<Utc>>,
}

impl FillDedupe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` (and records the fill) iff this is a *new* fill for
    /// `order_id` — i.e. either unseen, or seen at a timestamp more than 1s
    /// away from `filled_at`. Call exactly once per inbound order-update
    /// that carries a fill, before mutating the position tracker.
    pub fn observe(&mut self, order_id: &str, filled_at: DateTime<Utc>) -> bool {
        match self.entries.get(order_id) {
            Some(prev) if (filled_at - *prev).abs() < Duration::seconds(FILL_TOLERANCE_SECS) => false,
            _ => {
                self.entries.insert(order_id.to_string(), filled_at);
                true
            }
        }
    }

    pub fn prune(&mut self, now: DateTime<Utc>) {
        self.entries
            .retain(|_, ts| now - *ts < Duration::seconds(FILL_TTL_SECS));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
