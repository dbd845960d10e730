//! Bounded queues feeding the strategy loop, and the price coalescer (§4.1,
//! §5). The coalescer is the one piece of memory touched by both a
//! background caller (the price-feed callback) and the loop; it is guarded
//! by a short-held `std::sync::Mutex`, never held across an `.await`.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::{PriceEvent, Side};

/// Last-writer-wins per token. A full price queue degrades to "keep only the
/// newest sample per side" rather than blocking or dropping the whole update.
#[derive(Default)]
pub struct PriceCoalescer {
    latest: Mutex<HashMap<Side, PriceEvent>>,
}

impl PriceCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: PriceEvent) {
        let mut guard = self.latest.lock().expect("price coalescer mutex poisoned");
        guard.insert(event.side, event);
    }

    /// Drains at most one UP and one DOWN event, UP first (§5 deterministic
    /// tie-break), clearing the coalescer atomically.
    pub fn drain(&self) -> Vec<PriceEvent> {
        let mut guard = self.latest.lock().expect("price coalescer mutex poisoned");
        let mut out = Vec::with_capacity(2);
        if let Some(up) = guard.remove(&Side::Up) {
            out.push(up);
        }
        if let Some(down) = guard.remove(&Side::Down) {
            out.push(down);
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.latest.lock().expect("price coalescer mutex poisoned").is_empty()
    }
}

/// Default bounded capacities for the loop's inbound channels. Exceeding
/// `COMMAND_RESULT` or `ORDER_UPDATE` capacity drops the oldest message with
/// an error log (§4.1); the price channel instead relies on the coalescer
/// above and so never needs to drop.
pub const ORDER_UPDATE_QUEUE_CAPACITY: usize = 256;
pub const COMMAND_RESULT_QUEUE_CAPACITY: usize = 256;
pub const COMMAND_QUEUE_CAPACITY: usize = 64;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn event(side: Side, price: rust_decimal::Decimal) -> PriceEvent {
        PriceEvent {
            market_slug: "slug".into(),
            side,
            old_price: None,
            new_price: price,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn coalescer_keeps_only_latest_per_side() {
        let coalescer = PriceCoalescer::new();
        coalescer.push(event(Side::Up, dec!(0.50)));
        coalescer.push(event(Side::Up, dec!(0.55)));
        coalescer.push(event(Side::Down, dec!(0.40)));
        let drained = coalescer.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].side, Side::Up);
        assert_eq!(drained[0].new_price, dec!(0.55));
        assert_eq!(drained[1].side, Side::Down);
        assert!(coalescer.is_empty());
    }
}
