//! Order value types: requests, acked orders, and lifecycle status.

use super::market::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

/// FAK = fill-and-kill (immediate-or-cancel). GTC = good-til-cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Fak,
    Gtc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Open,
    Partial,
    Filled,
    Canceled,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Failed)
    }

    pub fn has_any_fill(&self) -> bool {
        matches!(self, OrderStatus::Partial | OrderStatus::Filled)
    }
}

/// What the strategy loop wants placed. Carries a locally-generated
/// `client_order_id` used to correlate the eventual ack before a server
/// `order_id` exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: Uuid,
    pub market_slug: String,
    pub token_id: String,
    pub side: Side,
    pub order_side: OrderSide,
    pub order_type: OrderType,
    pub price: Decimal,
    pub size: Decimal,
    pub is_entry: bool,
}

impl OrderRequest {
    pub fn buy(
        market_slug: impl Into<String>,
        token_id: impl Into<String>,
        side: Side,
        price: Decimal,
        size: Decimal,
        order_type: OrderType,
        is_entry: bool,
    ) -> Self {
        Self {
            client_order_id: Uuid::new_v4(),
            market_slug: market_slug.into(),
            token_id: token_id.into(),
            side,
            order_side: OrderSide::Buy,
            order_type,
            price,
            size,
            is_entry,
        }
    }

    pub fn sell(
        market_slug: impl Into<String>,
        token_id: impl Into<String>,
        side: Side,
        price: Decimal,
        size: Decimal,
        order_type: OrderType,
    ) -> Self {
        Self {
            client_order_id: Uuid::new_v4(),
            market_slug: market_slug.into(),
            token_id: token_id.into(),
            side,
            order_side: OrderSide::Sell,
            order_type,
            price,
            size,
            is_entry: false,
        }
    }
}

/// A tracked order: the loop's local copy, kept in sync with the exchange
/// via acks and order-update events. `order_id` starts as the client id and
/// is replaced by the server-assigned id exactly once, on ack (§3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub client_order_id: Uuid,
    pub market_slug: String,
    pub token_id: String,
    pub side: Side,
    pub order_side: OrderSide,
    pub order_type: OrderType,
    pub price: Decimal,
    pub requested_size: Decimal,
    pub filled_size: Decimal,
    pub status: OrderStatus,
    pub is_entry: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn from_request(request: &OrderRequest, now: DateTime<Utc>) -> Self {
        Self {
            order_id: request.client_order_id.to_string(),
            client_order_id: request.client_order_id,
            market_slug: request.market_slug.clone(),
            token_id: request.token_id.clone(),
            side: request.side,
            order_side: request.order_side,
            order_type: request.order_type,
            price: request.price,
            requested_size: request.size,
            filled_size: Decimal::ZERO,
            status: OrderStatus::Pending,
            is_entry: request.is_entry,
            created_at: now,
            updated_at: now,
            filled_at: None,
        }
    }

    /// Apply an authoritative ack: rewrite the order id, clamp/replace size,
    /// and adopt the initial status. Never treated as a fill event by itself
    /// (see SPEC_FULL.md §9 decision) — only the order-update path recognizes
    /// fills, through the dedupe map.
    pub fn apply_ack(
        &mut self,
        server_order_id: &str,
        acked_size: Decimal,
        initial_status: OrderStatus,
        now: DateTime<Utc>,
    ) {
        self.order_id = server_order_id.to_string();
        self.requested_size = acked_size;
        self.status = initial_status;
        self.updated_at = now;
    }

    /// Apply a later order-update. `filled_size` is only ever raised, never
    /// lowered, matching the monotonic invariant in §3.
    pub fn apply_update(&mut self, status: OrderStatus, filled_size: Decimal, now: DateTime<Utc>) {
        self.status = status;
        if filled_size > self.filled_size {
            self.filled_size = filled_size;
            if self.filled_size >= self.requested_size {
                self.filled_at.get_or_insert(now);
            }
        }
        self.updated_at = now;
    }

    pub fn fill_ratio(&self) -> Decimal {
        if self.requested_size.is_zero() {
            Decimal::ZERO
        } else {
            self.filled_size / self.requested_size
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> OrderRequest {
        OrderRequest::buy("slug", "up-tok", Side::Up, dec!(0.62), dec!(10), OrderType::Gtc, true)
    }

    #[test]
    fn filled_size_is_monotonic_across_updates() {
        let now = Utc::now();
        let mut order = Order::from_request(&request(), now);
        order.apply_update(OrderStatus::Partial, dec!(4), now);
        assert_eq!(order.filled_size, dec!(4));
        // A stale update with a lower filled_size must not regress the field.
        order.apply_update(OrderStatus::Partial, dec!(2), now);
        assert_eq!(order.filled_size, dec!(4));
        order.apply_update(OrderStatus::Filled, dec!(10), now);
        assert_eq!(order.filled_size, dec!(10));
        assert!(order.filled_at.is_some());
    }

    #[test]
    fn ack_rewrites_identity_without_counting_as_a_fill() {
        let now = Utc::now();
        let mut order = Order::from_request(&request(), now);
        let local_id = order.order_id.clone();
        order.apply_ack("server-123", dec!(8), OrderStatus::Open, now);
        assert_ne!(order.order_id, local_id);
        assert_eq!(order.order_id, "server-123");
        assert_eq!(order.requested_size, dec!(8));
        assert_eq!(order.filled_size, Decimal::ZERO);
    }

    #[test]
    fn fill_ratio_handles_zero_size() {
        let now = Utc::now();
        let mut req = request();
        req.size = Decimal::ZERO;
        let order = Order::from_request(&req, now);
        assert_eq!(order.fill_ratio(), Decimal::ZERO);
    }
}
