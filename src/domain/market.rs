//! Market identity and price-event types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of the binary market (UP or DOWN).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Up,
    Down,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Up => Side::Down,
            Side::Down => Side::Up,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Up => "UP",
            Side::Down => "DOWN",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single trading cycle, identified by a stable slug. Carries the two
/// asset ids and the cycle boundary. No state on a `Market` survives past
/// `end_time`; a new slug observed anywhere triggers a full per-market reset
/// in the strategy loop (see `engine::strategy_loop`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub slug: String,
    pub condition_id: String,
    pub up_token_id: String,
    pub down_token_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl Market {
    pub fn token_id(&self, side: Side) -> &str {
        match side {
            Side::Up => &self.up_token_id,
            Side::Down => &self.down_token_id,
        }
    }

    pub fn side_of_token(&self, token_id: &str) -> Option<Side> {
        if token_id == self.up_token_id {
            Some(Side::Up)
        } else if token_id == self.down_token_id {
            Some(Side::Down)
        } else {
            None
        }
    }

    /// Seconds remaining until cycle end, floored at zero.
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.end_time - now).num_seconds().max(0)
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }
}

/// A price update pushed by the market-data feed into the strategy loop's
/// price queue. `old_price` is best-effort (the feed's own last-known value,
/// not guaranteed to equal what the loop itself last saw).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceEvent {
    pub market_slug: String,
    pub side: Side,
    pub old_price: Option<Decimal>,
    pub new_price: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_opposite_is_involution() {
        assert_eq!(Side::Up.opposite(), Side::Down);
        assert_eq!(Side::Down.opposite(), Side::Up);
        assert_eq!(Side::Up.opposite().opposite(), Side::Up);
    }

    fn market() -> Market {
        let now = Utc::now();
        Market {
            slug: "btc-15m-1".into(),
            condition_id: "cond-1".into(),
            up_token_id: "up-tok".into(),
            down_token_id: "down-tok".into(),
            start_time: now,
            end_time: now + chrono::Duration::seconds(900),
        }
    }

    #[test]
    fn side_of_token_resolves_both_sides() {
        let m = market();
        assert_eq!(m.side_of_token("up-tok"), Some(Side::Up));
        assert_eq!(m.side_of_token("down-tok"), Some(Side::Down));
        assert_eq!(m.side_of_token("other"), None);
    }

    #[test]
    fn seconds_remaining_floors_at_zero() {
        let m = market();
        assert!(m.seconds_remaining(m.start_time) > 0);
        assert_eq!(m.seconds_remaining(m.end_time + chrono::Duration::seconds(10)), 0);
    }
}
