//! The Flatten / End-of-Cycle Guard (§4.8). Grounded in
//! `strategy::strategies::split_arb::SplitArbEngine::check_positions`'s
//! event-ending-soon exit trigger, generalized from "exit a single
//! unhedged position" to "cancel entries then FAK-liquidate both sides of
//! the whole market."

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Position, Side};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlattenConfig {
    pub flatten_seconds_before_end: i64,
    pub stop_new_entries_seconds: i64,
    pub freeze_low_cents: Decimal,
    pub freeze_high_cents: Decimal,
    pub cancel_entry_orders_on_freeze: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct LiquidationOrder {
    pub side: Side,
    pub shares: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct FlattenAction {
    pub cancel_entries: bool,
    pub liquidations: Vec<LiquidationOrder>,
}

impl FlattenAction {
    fn is_noop(&self) -> bool {
        !self.cancel_entries && self.liquidations.is_empty()
    }
}

pub struct FlattenGuard {
    config: FlattenConfig,
    flattened_this_cycle: bool,
}

impl FlattenGuard {
    pub fn new(config: FlattenConfig) -> Self {
        Self { config, flattened_this_cycle: false }
    }

    pub fn reset_for_new_cycle(&mut self) {
        self.flattened_this_cycle = false;
    }

    /// True once inside the flatten window and not yet flattened this cycle.
    pub fn should_flatten(&self, seconds_remaining: i64) -> bool {
        !self.flattened_this_cycle && seconds_remaining <= self.config.flatten_seconds_before_end
    }

    pub fn should_stop_new_entries(&self, seconds_remaining: i64) -> bool {
        seconds_remaining <= self.config.stop_new_entries_seconds
    }

    /// §4.8 freeze guard: either side at or past the cent extremes blocks
    /// new entries, independent of the flatten window.
    pub fn is_price_frozen(&self, up_price_cents: Decimal, down_price_cents: Decimal) -> bool {
        let extreme = |p: Decimal| p <= self.config.freeze_low_cents || p >= self.config.freeze_high_cents;
        extreme(up_price_cents) || extreme(down_price_cents)
    }

    /// Build the one-time flatten action: cancel entries, then a FAK sell of
    /// every non-zero side. Sets `flattened_this_cycle` so this never fires
    /// twice in the same cycle.
    pub fn flatten(&mut self, position: &Position) -> Option<FlattenAction> {
        if self.flattened_this_cycle {
            return None;
        }
        self.flattened_this_cycle = true;

        let mut liquidations = Vec::new();
        if position.up_shares > Decimal::ZERO {
            liquidations.push(LiquidationOrder { side: Side::Up, shares: position.up_shares });
        }
        if position.down_shares > Decimal::ZERO {
            liquidations.push(LiquidationOrder { side: Side::Down, shares: position.down_shares });
        }

        let action = FlattenAction { cancel_entries: true, liquidations };
        if action.is_noop() {
            None
        } else {
            Some(action)
        }
    }

    /// Whether open entry orders should be canceled right now under the
    /// freeze guard, per `cancelEntryOrdersOnFreeze`.
    pub fn should_cancel_entries_on_freeze(&self) -> bool {
        self.config.cancel_entry_orders_on_freeze
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config() -> FlattenConfig {
        FlattenConfig {
            flatten_seconds_before_end: 15,
            stop_new_entries_seconds: 30,
            freeze_low_cents: dec!(1),
            freeze_high_cents: dec!(99),
            cancel_entry_orders_on_freeze: true,
        }
    }

    #[test]
    fn flattens_once_per_cycle() {
        let mut guard = FlattenGuard::new(config());
        let mut position = Position::default();
        position.add_fill(Side::Up, dec!(10), dec!(0.5));
        position.add_fill(Side::Down, dec!(4), dec!(0.3));

        assert!(guard.should_flatten(10));
        let action = guard.flatten(&position).expect("first flatten fires");
        assert!(action.cancel_entries);
        assert_eq!(action.liquidations.len(), 2);

        assert!(!guard.should_flatten(5));
        assert!(guard.flatten(&position).is_none());

        guard.reset_for_new_cycle();
        assert!(guard.should_flatten(10));
    }

    #[test]
    fn freeze_guard_trips_at_either_extreme() {
        let guard = FlattenGuard::new(config());
        assert!(guard.is_price_frozen(dec!(0.5), dec!(99.5)));
        assert!(guard.is_price_frozen(dec!(0.5), dec!(0.5)));
        assert!(!guard.is_price_frozen(dec!(40), dec!(58)));
    }

    #[test]
    fn one_sided_position_liquidates_only_that_side() {
        let mut guard = FlattenGuard::new(config());
        let mut position = Position::default();
        position.add_fill(Side::Up, dec!(10), dec!(0.5));
        let action = guard.flatten(&position).unwrap();
        assert_eq!(action.liquidations.len(), 1);
        assert_eq!(action.liquidations[0].side, Side::Up);
    }
}
