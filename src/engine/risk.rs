//! The Risk/Arbitrage Brain (§4.3): pure decision functions over a
//! `Position` snapshot plus the current top-of-book. Grounded in the
//! teacher's `strategy::core::risk::{RiskConfig, RiskCheck, RiskState}`
//! shape (a config struct + a pass/fail-with-reason result type) and in
//! `split_arb::SplitArbEngine::check_new_entry`/`check_hedge`'s
//! `target_total_cost - entry_price` hedge-price arithmetic.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Position, Side};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Target combined cost of one UP share + one DOWN share (e.g. 0.97).
    pub target_total_cost: Decimal,
    /// Minimum guaranteed per-pair profit a plan must lock to be worth entering.
    pub min_profit_target: Decimal,
    /// Maximum fraction of the pair that may sit unhedged (`exposureRatio`).
    pub max_exposure_ratio: Decimal,
    /// Maximum single-side notional this market may hold.
    pub max_single_exposure: Decimal,
    /// Maximum aggregate notional across all open plans.
    pub max_total_exposure: Decimal,
    /// Paired-grid double-side mode: switches the inventory gate from the
    /// ratio-based check to the literal absolute-share-count one below.
    pub enable_double_side: bool,
    /// Absolute share-count imbalance that trips the double-side gate.
    pub max_net_exposure_shares: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskVerdict {
    Allow,
    Deny { reason: String },
}

impl RiskVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RiskVerdict::Allow)
    }
}

pub struct RiskBrain {
    config: RiskConfig,
}

impl RiskBrain {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// The most this market may pay for the opposite side's hedge while
    /// still respecting `target_total_cost`, given an already-filled entry
    /// at `entry_price`, clamped to `best_ask` on the hedge side when a
    /// live quote is available (§4.3).
    pub fn max_hedge_price(&self, entry_price: Decimal, best_ask: Option<Decimal>) -> Decimal {
        let target = self.config.target_total_cost - entry_price;
        match best_ask {
            Some(ask) if ask < target => ask,
            _ => target,
        }
    }

    /// Whether a fill at `entry_price` followed by a hedge at `hedge_price`
    /// would lock at least `min_profit_target` per pair.
    pub fn would_lock_target(&self, entry_price: Decimal, hedge_price: Decimal) -> bool {
        let total = entry_price + hedge_price;
        Decimal::ONE - total >= self.config.min_profit_target
    }

    /// Entry gate: may this market open a *new* plan on `side` at
    /// `entry_price` given its current aggregate exposure?
    pub fn allow_entry(&self, position: &Position, side: Side, entry_price: Decimal, size: Decimal) -> RiskVerdict {
        let notional = entry_price * size;
        let current_side_notional = match side {
            Side::Up => position.up_cost,
            Side::Down => position.down_cost,
        };
        if current_side_notional + notional > self.config.max_single_exposure {
            return RiskVerdict::Deny {
                reason: format!(
                    "entry would push {side:?} exposure to {}, over max_single_exposure {}",
                    current_side_notional + notional,
                    self.config.max_single_exposure
                ),
            };
        }
        if position.total_cost() + notional > self.config.max_total_exposure {
            return RiskVerdict::Deny {
                reason: format!(
                    "entry would push total exposure to {}, over max_total_exposure {}",
                    position.total_cost() + notional,
                    self.config.max_total_exposure
                ),
            };
        }
        RiskVerdict::Allow
    }

    /// Inventory-neutrality gate (§4.3): deny further one-sided entries once
    /// `exposureRatio` exceeds the configured maximum, forcing the engine to
    /// hedge existing inventory before adding more of the heavier side. In
    /// double-side mode this is replaced by the literal absolute-share gate:
    /// once `|upShares - downShares|` reaches `max_net_exposure_shares`, only
    /// the deficit side may enter.
    pub fn allow_additional_exposure(&self, position: &Position, side: Side) -> RiskVerdict {
        if self.config.enable_double_side {
            let net = (position.up_shares - position.down_shares).abs();
            if net < self.config.max_net_exposure_shares {
                return RiskVerdict::Allow;
            }
            let deficit_side = if position.up_shares <= position.down_shares { Side::Up } else { Side::Down };
            return if side == deficit_side {
                RiskVerdict::Allow
            } else {
                RiskVerdict::Deny {
                    reason: format!(
                        "net exposure {net} shares at/over max_net_exposure_shares {}, only {deficit_side:?} may enter",
                        self.config.max_net_exposure_shares
                    ),
                }
            };
        }

        let heavier_side_is_this_one = match side {
            Side::Up => position.up_shares >= position.down_shares,
            Side::Down => position.down_shares >= position.up_shares,
        };
        if heavier_side_is_this_one && position.exposure_ratio() > self.config.max_exposure_ratio {
            RiskVerdict::Deny {
                reason: format!(
                    "exposure_ratio {} exceeds max_exposure_ratio {} on the heavier side",
                    position.exposure_ratio(),
                    self.config.max_exposure_ratio
                ),
            }
        } else {
            RiskVerdict::Allow
        }
    }

    /// Shares of the opposite side needed to bring `min_profit` up to
    /// `target`, holding the opposite side's average price fixed at
    /// `hedge_price`. Returns `None` when already at or above target (no
    /// supplement needed) or when `hedge_price >= 1` (supplementing could
    /// never help, since each added share costs more than its payout).
    pub fn required_supplement_shares(&self, position: &Position, target: Decimal, hedge_price: Decimal) -> Option<Decimal> {
        if position.min_profit() >= target {
            return None;
        }
        if hedge_price >= Decimal::ONE {
            return None;
        }
        // Buying `x` more shares of the lighter side at `hedge_price` moves
        // that side's profit-if-its-outcome by `x * (1 - hedge_price)` and
        // leaves the other side's profit unchanged except for the added
        // cost `x * hedge_price`. We need the new min_profit across both
        // legs to reach `target`; solve against whichever leg is currently
        // the minimum, since that's the one we're trying to lift.
        let shortfall = target - position.min_profit();
        let gain_per_share = Decimal::ONE - hedge_price;
        if gain_per_share <= Decimal::ZERO {
            return None;
        }
        Some((shortfall / gain_per_share).max(Decimal::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn brain() -> RiskBrain {
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

    #[test]
    fn max_hedge_price_leaves_room_for_target_cost() {
        let brain = brain();
        assert_eq!(brain.max_hedge_price(dec!(0.60), None), dec!(0.37));
    }

    #[test]
    fn max_hedge_price_clamps_to_best_ask() {
        let brain = brain();
        // unclamped target would be 0.37, but the book only offers down to 0.33.
        assert_eq!(brain.max_hedge_price(dec!(0.60), Some(dec!(0.33))), dec!(0.33));
        // a worse (higher) ask than target_total_cost allows doesn't loosen the cap.
        assert_eq!(brain.max_hedge_price(dec!(0.60), Some(dec!(0.50))), dec!(0.37));
    }

    #[test]
    fn would_lock_target_respects_min_profit() {
        let brain = brain();
        assert!(brain.would_lock_target(dec!(0.60), dec!(0.36)));
        assert!(!brain.would_lock_target(dec!(0.60), dec!(0.39)));
    }

    #[test]
    fn entry_denied_once_single_exposure_exceeded() {
        let brain = RiskBrain::new(RiskConfig {
            target_total_cost: dec!(0.97),
            min_profit_target: dec!(0.02),
            max_exposure_ratio: dec!(0.5),
            max_single_exposure: dec!(100),
            max_total_exposure: dec!(2000),
            enable_double_side: false,
            max_net_exposure_shares: dec!(50),
        });
        let mut position = Position::default();
        position.add_fill(Side::Up, dec!(100), dec!(0.9));
        let verdict = brain.allow_entry(&position, Side::Up, dec!(0.9), dec!(50));
        assert!(!verdict.is_allowed());
    }

    #[test]
    fn inventory_gate_blocks_further_growth_of_heavier_side() {
        let brain = brain();
        let mut position = Position::default();
        position.add_fill(Side::Up, dec!(10), dec!(0.5));
        // down_shares stays 0 -> exposure_ratio == 1.0, over the 0.5 max.
        let verdict = brain.allow_additional_exposure(&position, Side::Up);
        assert!(!verdict.is_allowed());
        // the lighter (down) side should still be allowed to grow, since
        // buying it is exactly what closes the gap.
        let verdict_down = brain.allow_additional_exposure(&position, Side::Down);
        assert!(verdict_down.is_allowed());
    }

    #[test]
    fn double_side_gate_uses_absolute_share_count_not_ratio() {
        let brain = RiskBrain::new(RiskConfig {
            target_total_cost: dec!(0.97),
            min_profit_target: dec!(0.02),
            max_exposure_ratio: dec!(0.5),
            max_single_exposure: dec!(1000),
            max_total_exposure: dec!(2000),
            enable_double_side: true,
            max_net_exposure_shares: dec!(20),
        });
        let mut position = Position::default();
        position.add_fill(Side::Up, dec!(15), dec!(0.5));
        position.add_fill(Side::Down, dec!(10), dec!(0.4));
        // net = 5, under the 20-share threshold: both sides still allowed.
        assert!(brain.allow_additional_exposure(&position, Side::Up).is_allowed());
        assert!(brain.allow_additional_exposure(&position, Side::Down).is_allowed());

        position.add_fill(Side::Up, dec!(15), dec!(0.5));
        // net = 20, at the threshold: only the deficit (down) side may enter.
        assert!(!brain.allow_additional_exposure(&position, Side::Up).is_allowed());
        assert!(brain.allow_additional_exposure(&position, Side::Down).is_allowed());
    }

    #[test]
    fn required_supplement_shares_none_when_already_at_target() {
        let brain = brain();
        let mut position = Position::default();
        position.add_fill(Side::Up, dec!(10), dec!(0.40));
        position.add_fill(Side::Down, dec!(10), dec!(0.40));
        assert_eq!(brain.required_supplement_shares(&position, dec!(0.02), dec!(0.5)), None);
    }

    #[test]
    fn required_supplement_shares_computes_shortfall_over_gain() {
        let brain = brain();
        // Scenario 4 from SPEC_FULL.md §8: upShares=10 downShares=6, profit_if_down = -2.5.
        let position = Position {
            up_shares: dec!(10),
            down_shares: dec!(6),
            up_cost: dec!(6.2),
            down_cost: dec!(2.3),
        };
        let target = dec!(0.0);
        let hedge_price = dec!(0.40);
        let shares = brain.required_supplement_shares(&position, target, hedge_price).unwrap();
        // shortfall = 0 - (-2.5) = 2.5, gain_per_share = 1 - 0.40 = 0.60
        assert_eq!(shares, dec!(2.5) / dec!(0.60));
    }
}
