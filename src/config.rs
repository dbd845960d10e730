//! Layered application configuration (SPEC_FULL.md §1A, §6). Grounded in the
//! teacher's `config.rs` (736 lines): defaults set in code, layered with an
//! optional TOML file, then environment variables carrying a crate-specific
//! prefix, via the `config` crate. `validate()` collects every violation
//! rather than failing fast on the first one.

use std::path::Path;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

const ENV_PREFIX: &str = "HEDGE_ENGINE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderExecutionMode {
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub window_seconds: i64,
    pub min_move_cents: Decimal,
    pub min_velocity_cents_per_sec: Decimal,
    pub fast_velocity_threshold: Decimal,
    pub velocity_comparison_multiplier: Decimal,
    pub prefer_higher_price: bool,
    pub min_preferred_price_cents: Decimal,
    pub aggressiveness: Decimal,
    pub velocity_history_len: usize,
    pub grid_levels: Vec<i64>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            window_seconds: 10,
            min_move_cents: dec!(3),
            min_velocity_cents_per_sec: dec!(1),
            fast_velocity_threshold: dec!(5),
            velocity_comparison_multiplier: dec!(2),
            prefer_higher_price: true,
            min_preferred_price_cents: dec!(50),
            aggressiveness: dec!(0.5),
            velocity_history_len: 5,
            grid_levels: vec![55, 60, 65, 70, 75, 80, 85, 90],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderConfig {
    pub order_size: Decimal,
    pub hedge_order_size: Decimal,
    pub min_order_size: Decimal,
    pub hedge_offset_cents: Decimal,
    pub min_entry_price_cents: Decimal,
    pub max_entry_price_cents: Decimal,
    pub execution_mode: OrderExecutionMode,
    pub sequential_check_interval_ms: u64,
    pub sequential_max_wait_ms: u64,
    pub supplement_max_buy_slippage_cents: Decimal,
    pub entry_max_buy_slippage_cents: Decimal,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            order_size: dec!(10),
            hedge_order_size: dec!(0),
            min_order_size: dec!(1.1),
            hedge_offset_cents: dec!(1),
            min_entry_price_cents: dec!(5),
            max_entry_price_cents: dec!(95),
            execution_mode: OrderExecutionMode::Sequential,
            sequential_check_interval_ms: 200,
            sequential_max_wait_ms: 8000,
            supplement_max_buy_slippage_cents: dec!(2),
            entry_max_buy_slippage_cents: dec!(2),
        }
    }
}

impl OrderConfig {
    /// §6: "if hedge is 0, use entry size".
    pub fn effective_hedge_size(&self) -> Decimal {
        if self.hedge_order_size.is_zero() { self.order_size } else { self.hedge_order_size }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    pub max_trades_per_cycle: u32,
    pub max_rounds_per_period: u32,
    pub cycle_end_protection_minutes: i64,
    pub stop_new_entries_seconds: i64,
    pub flatten_seconds_before_end: i64,
    pub cancel_entry_orders_on_freeze: bool,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            max_trades_per_cycle: 20,
            max_rounds_per_period: 20,
            cycle_end_protection_minutes: 2,
            stop_new_entries_seconds: 30,
            flatten_seconds_before_end: 15,
            cancel_entry_orders_on_freeze: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfigOptions {
    pub profit_target: Decimal,
    pub max_unhedged_loss: Decimal,
    pub hard_stop_price: Decimal,
    pub elastic_stop_price: Decimal,
    pub max_exposure_ratio: Decimal,
    pub max_single_exposure: Decimal,
    pub max_total_exposure: Decimal,
    pub enable_double_side: bool,
    pub max_net_exposure_shares: Decimal,
    pub take_profit_cents: Decimal,
    pub stop_loss_cents: Decimal,
    pub max_hold_seconds: i64,
    pub partial_take_profits: Vec<Decimal>,
}

impl Default for RiskConfigOptions {
    fn default() -> Self {
        Self {
            profit_target: dec!(2),
            max_unhedged_loss: dec!(5),
            hard_stop_price: dec!(0.05),
            elastic_stop_price: dec!(0.10),
            max_exposure_ratio: dec!(0.5),
            max_single_exposure: dec!(1000),
            max_total_exposure: dec!(5000),
            enable_double_side: false,
            max_net_exposure_shares: dec!(50),
            take_profit_cents: dec!(5),
            stop_loss_cents: dec!(5),
            max_hold_seconds: 600,
            partial_take_profits: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupplementConfigOptions {
    pub enable_adhoc_strong_hedge: bool,
    pub strong_hedge_debounce_seconds: i64,
    pub health_log_interval_seconds: i64,
    pub hedge_lock_window_seconds: i64,
    pub min_supplement_shares: Decimal,
}

impl Default for SupplementConfigOptions {
    fn default() -> Self {
        Self {
            enable_adhoc_strong_hedge: true,
            strong_hedge_debounce_seconds: 5,
            health_log_interval_seconds: 60,
            hedge_lock_window_seconds: 90,
            min_supplement_shares: dec!(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: Option<String>,
    pub quiet: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { log_dir: None, quiet: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub market_slug: Option<String>,
    pub dry_run: bool,
    pub triggers: TriggerConfig,
    pub orders: OrderConfig,
    pub cycle: CycleConfig,
    pub risk: RiskConfigOptions,
    pub supplement: SupplementConfigOptions,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            market_slug: None,
            dry_run: true,
            triggers: TriggerConfig::default(),
            orders: OrderConfig::default(),
            cycle: CycleConfig::default(),
            risk: RiskConfigOptions::default(),
            supplement: SupplementConfigOptions::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// A config usable with no file on disk, for tests and `--dry-run`.
    pub fn default_config() -> Self {
        Self::default()
    }

    /// Loads code defaults, then an optional TOML file at `path`, then
    /// `HEDGE_ENGINE__`-prefixed environment overrides (`__` nests, e.g.
    /// `HEDGE_ENGINE__RISK__PROFIT_TARGET`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();
        let defaults_json = serde_json::to_value(&defaults)?;

        let mut builder = config::Config::builder().add_source(config::Config::try_from(&defaults_json)?);

        if let Some(path) = path {
            if path.exists() {
                builder = builder.add_source(config::File::from(path));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let settled = builder.build()?;
        Ok(settled.try_deserialize()?)
    }

    /// Collects *every* fatal-misconfiguration violation (§7), rather than
    /// stopping at the first one, so a CLI `validate-config` run reports the
    /// full list in one pass.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.orders.max_entry_price_cents <= self.orders.min_entry_price_cents {
            errors.push(format!(
                "max_entry_price_cents ({}) must be greater than min_entry_price_cents ({})",
                self.orders.max_entry_price_cents, self.orders.min_entry_price_cents
            ));
        }
        if self.orders.order_size <= Decimal::ZERO {
            errors.push("order_size must be positive".to_string());
        }
        if self.risk.profit_target < Decimal::ZERO {
            errors.push("profit_target must be non-negative".to_string());
        }
        if self.risk.max_exposure_ratio <= Decimal::ZERO || self.risk.max_exposure_ratio > Decimal::ONE {
            errors.push("max_exposure_ratio must be in (0, 1]".to_string());
        }
        if self.cycle.flatten_seconds_before_end > self.cycle.stop_new_entries_seconds {
            errors.push(
                "flatten_seconds_before_end must be <= stop_new_entries_seconds (flatten happens no earlier than the entry cutoff)"
                    .to_string(),
            );
        }
        if self.cycle.max_trades_per_cycle == 0 {
            errors.push("max_trades_per_cycle must be positive".to_string());
        }
        if self.triggers.grid_levels.windows(2).any(|w| w[0] >= w[1]) {
            errors.push("grid_levels must be strictly ascending".to_string());
        }
        if self.triggers.grid_levels.iter().any(|&l| !(0..=100).contains(&l)) {
            errors.push("grid_levels must all be within [0, 100] cents".to_string());
        }
        if self.supplement.hedge_lock_window_seconds < 0 {
            errors.push("hedge_lock_window_seconds must be non-negative".to_string());
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

impl From<Vec<String>> for EngineError {
    fn from(errors: Vec<String>) -> Self {
        EngineError::validation(errors.join("; "))
    }
}
