//! The Strong-Hedge/Supplement Engine (§4.5): a debounced corrective-buy
//! sizer that tops up the lighter side when `min_profit` has drifted below
//! target — distinct from a HedgePlan's own first hedge leg, which is
//! handled entirely inside `domain::plan`. Grounded in the teacher's
//! `strategy::dump_hedge::DumpHedgeEngine` (debounced, one-pending-hedge-
//! per-event bookkeeping around a `RwLock<HashMap<...>>`) combined with
//! `RiskBrain::required_supplement_shares` for the sizing math.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Position, Side};

use super::risk::RiskBrain;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplementConfig {
    /// Minimum seconds between two supplement attempts on the same market.
    pub debounce_seconds: i64,
    /// Seconds before cycle end during which `target` is forced to zero
    /// (the hedge-lock window — any guaranteed non-negative outcome is
    /// accepted rather than holding out for the full profit target).
    pub hedge_lock_window_seconds: i64,
    /// Smallest supplement worth submitting; below this the corrective buy
    /// is skipped as not worth the order-book impact and fees.
    pub min_supplement_shares: Decimal,
}

pub struct SupplementEngine {
    config: SupplementConfig,
    last_attempt: HashMap<String, DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
pub struct SupplementPlan {
    pub side: Side,
    pub shares: Decimal,
}

impl SupplementEngine {
    pub fn new(config: SupplementConfig) -> Self {
        Self { config, last_attempt: HashMap::new() }
    }

    fn debounced(&self, market_slug: &str, now: DateTime<Utc>) -> bool {
        self.last_attempt
            .get(market_slug)
            .is_some_and(|ts| now - *ts < Duration::seconds(self.config.debounce_seconds))
    }

    /// Effective profit target for `market_slug` right now: `0` once inside
    /// the hedge-lock window, else the caller's configured target.
    pub fn effective_target(&self, target: Decimal, seconds_to_cycle_end: i64) -> Decimal {
        if seconds_to_cycle_end <= self.config.hedge_lock_window_seconds {
            Decimal::ZERO
        } else {
            target
        }
    }

    /// Decide whether `market_slug` needs a corrective buy right now, and
    /// if so, on which side and how many shares. Returns `None` when
    /// debounced, already at target, or the computed size rounds to below
    /// `min_supplement_shares`.
    pub fn evaluate(
        &mut self,
        market_slug: &str,
        position: &Position,
        risk: &RiskBrain,
        target: Decimal,
        seconds_to_cycle_end: i64,
        hedge_price: Decimal,
        now: DateTime<Utc>,
    ) -> Option<SupplementPlan> {
        if self.debounced(market_slug, now) {
            return None;
        }

        let effective_target = self.effective_target(target, seconds_to_cycle_end);
        let shares = risk.required_supplement_shares(position, effective_target, hedge_price)?;
        if shares < self.config.min_supplement_shares {
            return None;
        }

        // The side to buy is always the one currently dragging min_profit
        // down, i.e. whichever outcome's profit is the minimum.
        let side = if position.profit_if_up() <= position.profit_if_down() { Side::Up } else { Side::Down };

        self.last_attempt.insert(market_slug.to_string(), now);
        Some(SupplementPlan { side, shares })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::risk::{RiskBrain, RiskConfig};
    use rust_decimal_macros::dec;

    fn risk() -> RiskBrain {
        RiskBrain::new(RiskConfig {
            target_total_cost: dec!(0.97),
            min_profit_target: dec!(0.02),
            max_exposure_ratio: dec!(0.5),
            max_single_exposure: dec!(1000),
            max_total_exposure: dec!(2000),
            enable_double_side: false,
            max_net_exposure_shares: dec!(50),
        })
    }

    fn engine() -> SupplementEngine {
        SupplementEngine::new(SupplementConfig {
            debounce_seconds: 5,
            hedge_lock_window_seconds: 90,
            min_supplement_shares: dec!(1),
        })
    }

    #[test]
    fn supplements_when_below_target_and_not_debounced() {
        let mut engine = engine();
        let risk = risk();
        // Scenario 4 from SPEC_FULL.md §8.
        let position = Position {
            up_shares: dec!(10),
            down_shares: dec!(6),
            up_cost: dec!(6.2),
            down_cost: dec!(2.3),
        };
        let now = Utc::now();
        let plan = engine
            .evaluate("market-1", &position, &risk, dec!(0.0), 500, dec!(0.40), now)
            .expect("should supplement");
        assert_eq!(plan.side, Side::Down);
        assert!(plan.shares > Decimal::ZERO);
    }

    #[test]
    fn debounce_blocks_immediate_reattempt() {
        let mut engine = engine();
        let risk = risk();
        let position = Position {
            up_shares: dec!(10),
            down_shares: dec!(6),
            up_cost: dec!(6.2),
            down_cost: dec!(2.3),
        };
        let now = Utc::now();
        assert!(engine.evaluate("market-1", &position, &risk, dec!(0.0), 500, dec!(0.40), now).is_some());
        assert!(engine.evaluate("market-1", &position, &risk, dec!(0.0), 500, dec!(0.40), now + Duration::seconds(2)).is_none());
    }

    #[test]
    fn hedge_lock_window_forces_zero_target() {
        let engine = engine();
        assert_eq!(engine.effective_target(dec!(0.05), 30), Decimal::ZERO);
        assert_eq!(engine.effective_target(dec!(0.05), 200), dec!(0.05));
    }

    #[test]
    fn no_supplement_needed_when_already_locked_at_target() {
        let mut engine = engine();
        let risk = risk();
        let mut position = Position::default();
        position.add_fill(Side::Up, dec!(10), dec!(0.40));
        position.add_fill(Side::Down, dec!(10), dec!(0.40));
        let now = Utc::now();
        assert!(engine.evaluate("market-1", &position, &risk, dec!(0.02), 500, dec!(0.40), now).is_none());
    }
}
