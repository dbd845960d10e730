//! The exchange client capability set required by §6. Grounded in the
//! teacher's `exchange::traits::ExchangeClient`, narrowed to exactly the six
//! capabilities the engine needs (no market-discovery/balance/history
//! surface — those belong to the CLI/API shell, not the core).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{OrderRequest, OrderStatus};
use crate::error::Result;

/// The exchange's authoritative response to a placed order.
#[derive(Debug, Clone)]
pub struct AckedOrder {
    pub order_id: String,
    pub size: Decimal,
    pub status: OrderStatus,
    pub filled_at: Option<DateTime<Utc>>,
}

/// Pushed by the exchange into the registered order-update callback whenever
/// an order's status or fill progresses.
#[derive(Debug, Clone)]
pub struct OrderUpdate {
    pub order_id: String,
    pub status: OrderStatus,
    pub filled_size: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct TopOfBook {
    pub up_bid: Option<Decimal>,
    pub up_ask: Option<Decimal>,
    pub down_bid: Option<Decimal>,
    pub down_ask: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

/// Implemented once per exchange. `DryRunExchange` is the reference/fixture
/// implementation shipped with this crate; a live adapter substitutes the
/// same six methods and nothing else (§9 design note).
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn place_order(&self, request: &OrderRequest) -> Result<AckedOrder>;

    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    /// Forces the exchange to re-query and push a fresh `OrderUpdate` for
    /// `order_id` through whatever channel the implementation's updates
    /// arrive on. No return payload — the update itself, if any, flows back
    /// out-of-band (see `DryRunExchange` for the in-memory pattern).
    async fn sync_order_status(&self, order_id: &str) -> Result<()>;

    async fn get_best_price(&self, token_id: &str) -> Result<(Option<Decimal>, Option<Decimal>)>;

    async fn get_top_of_book(&self, market_slug: &str) -> Result<TopOfBook>;
}
