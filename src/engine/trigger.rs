//! Velocity and Grid triggers (§4.2): decide when streaming price samples
//! should spawn a new HedgePlan. Grounded in the teacher's
//! `strategy::core::price_cache::PriceCache` (simple per-token cache) and
//! `strategy::detectors::dump::DumpDetector`'s rolling-window-with-TTL
//! pattern, generalized from "rolling high + single drop-pct threshold" to
//! the full move+velocity+classification contract this spec requires.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::Side;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityConfig {
    pub window_seconds: i64,
    pub max_samples: usize,
    pub min_move_cents: Decimal,
    pub min_velocity_cents_per_sec: Decimal,
    pub fast_velocity_threshold: Decimal,
    pub velocity_comparison_multiplier: Decimal,
    pub prefer_higher_price: bool,
    pub min_preferred_price_cents: Decimal,
    pub aggressiveness: Decimal,
    /// How many past velocity computations to average for fast/slow
    /// classification ("avgVelocityOverHistoryWindow").
    pub velocity_history_len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSpeed {
    Fast,
    Slow,
}

#[derive(Debug, Clone, Copy)]
pub struct VelocityFiring {
    pub side: Side,
    pub velocity_cents_per_sec: Decimal,
    pub move_cents: Decimal,
    pub speed: TriggerSpeed,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    ts: DateTime<Utc>,
    price_cents: Decimal,
}

#[derive(Default)]
struct TokenState {
    samples: VecDeque<Sample>,
    velocity_history: VecDeque<Decimal>,
}

pub struct VelocityTrigger {
    config: VelocityConfig,
    state: HashMap<Side, TokenState>,
    seen_any: HashSet<Side>,
}

impl VelocityTrigger {
    pub fn new(config: VelocityConfig) -> Self {
        Self { config, state: HashMap::new(), seen_any: HashSet::new() }
    }

    pub fn reset(&mut self) {
        self.state.clear();
        self.seen_any.clear();
    }

    /// Feed one side's new price sample. Returns the computed `(move, velocity)`
    /// for that side if enough history exists, purely for observability/tests;
    /// call `evaluate` afterward to decide whether to actually fire.
    pub fn record(&mut self, side: Side, price_cents: Decimal, now: DateTime<Utc>) {
        let first_for_token = !self.seen_any.contains(&side);
        self.seen_any.insert(side);

        let entry = self.state.entry(side).or_default();
        entry.samples.push_back(Sample { ts: now, price_cents });
        let cutoff = now - Duration::seconds(self.config.window_seconds);
        while entry.samples.len() > self.config.max_samples
            || entry.samples.front().is_some_and(|s| s.ts < cutoff)
        {
            if entry.samples.front().is_some_and(|s| s.ts < cutoff) || entry.samples.len() > self.config.max_samples {
                entry.samples.pop_front();
            } else {
                break;
            }
        }

        if first_for_token {
            // §4.2: the first sample after reset is recorded only.
            return;
        }

        if let Some((move_cents, velocity)) = self.move_and_velocity(side) {
            let entry = self.state.get_mut(&side).unwrap();
            entry.velocity_history.push_back(velocity);
            if entry.velocity_history.len() > self.config.velocity_history_len.max(1) {
                entry.velocity_history.pop_front();
            }
        }
    }

    fn move_and_velocity(&self, side: Side) -> Option<(Decimal, Decimal)> {
        let entry = self.state.get(&side)?;
        if entry.samples.len() < 2 {
            return None;
        }
        let first = entry.samples.front()?;
        let last = entry.samples.back()?;
        let dt_secs = Decimal::from((last.ts - first.ts).num_milliseconds()) / Decimal::from(1000);
        if dt_secs <= Decimal::ZERO {
            return None;
        }
        let move_cents = last.price_cents - first.price_cents;
        let velocity = move_cents / dt_secs;
        Some((move_cents, velocity))
    }

    fn classify(&self, side: Side, velocity: Decimal) -> TriggerSpeed {
        let avg_history = self
            .state
            .get(&side)
            .map(|s| {
                if s.velocity_history.is_empty() {
                    Decimal::ZERO
                } else {
                    s.velocity_history.iter().sum::<Decimal>() / Decimal::from(s.velocity_history.len())
                }
            })
            .unwrap_or(Decimal::ZERO);

        let is_fast = velocity.abs() >= self.config.fast_velocity_threshold
            && velocity.abs() >= self.config.velocity_comparison_multiplier * avg_history.abs();
        if is_fast {
            TriggerSpeed::Fast
        } else {
            TriggerSpeed::Slow
        }
    }

    /// Evaluate both sides after a batch of `record` calls and decide which
    /// (if either) fires, applying the §4.2 tie-break when both qualify.
    pub fn evaluate(&self, prices_cents: &HashMap<Side, Decimal>) -> Option<VelocityFiring> {
        let mut candidates: Vec<VelocityFiring> = Vec::new();
        for side in [Side::Up, Side::Down] {
            let Some((move_cents, velocity)) = self.move_and_velocity(side) else { continue };
            if move_cents >= self.config.min_move_cents
                && velocity.abs() >= self.config.min_velocity_cents_per_sec
            {
                candidates.push(VelocityFiring {
                    side,
                    velocity_cents_per_sec: velocity,
                    move_cents,
                    speed: self.classify(side, velocity),
                });
            }
        }

        match candidates.len() {
            0 => None,
            1 => Some(candidates[0]),
            _ => {
                let (a, b) = (candidates[0], candidates[1]);
                if a.velocity_cents_per_sec.abs() != b.velocity_cents_per_sec.abs() {
                    Some(if a.velocity_cents_per_sec.abs() > b.velocity_cents_per_sec.abs() { a } else { b })
                } else if self.config.prefer_higher_price {
                    let price_a = prices_cents.get(&a.side).copied().unwrap_or(Decimal::ZERO);
                    let price_b = prices_cents.get(&b.side).copied().unwrap_or(Decimal::ZERO);
                    let winner = if price_a >= price_b { a } else { b };
                    let winner_price = prices_cents.get(&winner.side).copied().unwrap_or(Decimal::ZERO);
                    if winner_price >= self.config.min_preferred_price_cents {
                        Some(winner)
                    } else {
                        Some(if a.side == Side::Up { a } else { b })
                    }
                } else {
                    Some(if a.side == Side::Up { a } else { b })
                }
            }
        }
    }

    /// Slow-path limit price, per §4.2: `bid + aggressiveness * (ask - bid)`.
    pub fn slow_path_price(&self, bid: Decimal, ask: Decimal) -> Decimal {
        bid + self.config.aggressiveness * (ask - bid)
    }
}

/// Ascending integer-cent grid levels. Fires on an *upward crossing* onto a
/// level (prior price strictly below, new price exactly equal), mirroring
/// the teacher's `DumpDetector`'s one-shot-per-rolling-high pattern but keyed
/// by a fixed level list rather than a rolling max.
pub struct GridTrigger {
    levels: Vec<i64>,
    prior_price_cents: HashMap<Side, i64>,
    seen_any: HashSet<Side>,
}

impl GridTrigger {
    pub fn new(mut levels: Vec<i64>) -> Self {
        levels.sort_unstable();
        levels.dedup();
        Self { levels, prior_price_cents: HashMap::new(), seen_any: HashSet::new() }
    }

    pub fn reset(&mut self) {
        self.prior_price_cents.clear();
        self.seen_any.clear();
    }

    fn highest_level_at_or_below(&self, price_cents: i64) -> Option<i64> {
        self.levels.iter().rev().find(|&&l| l <= price_cents).copied()
    }

    /// Returns `Some(level)` if this update is an upward crossing onto a
    /// grid level (caller still must check the level-dedupe map). Always
    /// records the new price as the "prior" for next time.
    pub fn record_and_check(&mut self, side: Side, price_cents: i64) -> Option<i64> {
        let first_for_token = !self.seen_any.contains(&side);
        self.seen_any.insert(side);
        let prior = self.prior_price_cents.insert(side, price_cents);

        if first_for_token {
            return None;
        }

        let level = self.highest_level_at_or_below(price_cents)?;
        let prior = prior?;
        if prior < level && price_cents == level {
            Some(level)
        } else {
            None
        }
    }
}
