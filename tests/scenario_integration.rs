//! End-to-end drives of the strategy loop against `DryRunExchange`, covering
//! the concrete scenarios from SPEC_FULL.md §8 that need more than one
//! module to exercise: a full grid-trigger-to-settlement round trip, and the
//! freeze guard blocking a new entry outright.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use paired_hedge_engine::config::AppConfig;
use paired_hedge_engine::domain::{Market, Side};
use paired_hedge_engine::engine::executor::{command_channel, CommandExecutor};
use paired_hedge_engine::engine::queues::{COMMAND_RESULT_QUEUE_CAPACITY, ORDER_UPDATE_QUEUE_CAPACITY};
use paired_hedge_engine::engine::{PriceCoalescer, StrategyLoop};
use paired_hedge_engine::exchange::{DryRunExchange, ExchangeClient};
use rust_decimal_macros::dec;
use tokio::sync::mpsc;

fn market(now: chrono::DateTime<Utc>, cycle_seconds: i64) -> Market {
    Market {
        slug: "btc-updown-15m-test".into(),
        condition_id: "cond-test".into(),
        up_token_id: "up-tok".into(),
        down_token_id: "down-tok".into(),
        start_time: now,
        end_time: now + chrono::Duration::seconds(cycle_seconds),
    }
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default_config();
    config.triggers.grid_levels = vec![62];
    config.orders.order_size = dec!(10);
    config.orders.hedge_order_size = dec!(10);
    config.orders.min_order_size = dec!(1);
    config.risk.profit_target = dec!(2);
    config
}

/// Wires a `StrategyLoop` to a `DryRunExchange` via its command executor and
/// the unbounded->bounded order-update bridge, the same shape `main.rs` uses.
struct Harness {
    strategy_loop: StrategyLoop,
    price_coalescer: Arc<PriceCoalescer>,
}

fn build_harness(market: Market, config: AppConfig, fill_delay: Duration) -> Harness {
    let (order_update_tx, order_update_rx) = mpsc::unbounded_channel();
    let (bounded_tx, bounded_rx) = mpsc::channel(ORDER_UPDATE_QUEUE_CAPACITY);
    tokio::spawn(async move {
        let mut rx = order_update_rx;
        while let Some(update) = rx.recv().await {
            let _ = bounded_tx.send(update).await;
        }
    });

    let exchange: Arc<dyn ExchangeClient> = Arc::new(DryRunExchange::new(order_update_tx, fill_delay));
    let (command_tx, command_rx) = command_channel();
    let (result_tx, result_rx) = mpsc::channel(COMMAND_RESULT_QUEUE_CAPACITY);
    let executor = CommandExecutor::new(exchange, command_rx, result_tx);
    tokio::spawn(executor.run());

    let price_coalescer = Arc::new(PriceCoalescer::new());
    let strategy_loop = StrategyLoop::new(market, config, price_coalescer.clone(), bounded_rx, result_rx, command_tx);

    Harness { strategy_loop, price_coalescer }
}

fn push_price(coalescer: &PriceCoalescer, market_slug: &str, side: Side, price: rust_decimal::Decimal) {
    coalescer.push(paired_hedge_engine::domain::PriceEvent {
        market_slug: market_slug.to_string(),
        side,
        old_price: None,
        new_price: price,
        timestamp: Utc::now(),
    });
}

#[tokio::test]
async fn grid_entry_and_hedge_settle_to_done_with_locked_profit() {
    // Scenario 1: prior UP 60c, new UP 62c crosses the only grid level.
    // Both legs fill in the dry-run exchange and the plan reaches Done with
    // the exact 0.20 min-profit figure from SPEC_FULL.md §8.
    let now = Utc::now();
    let mkt = market(now, 900);
    let slug = mkt.slug.clone();
    let config = test_config();
    let Harness { mut strategy_loop, price_coalescer } = build_harness(mkt, config, Duration::from_millis(20));

    let driver = {
        let coalescer = price_coalescer.clone();
        let slug = slug.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            push_price(&coalescer, &slug, Side::Down, dec!(0.38));
            push_price(&coalescer, &slug, Side::Up, dec!(0.60));
            tokio::time::sleep(Duration::from_millis(60)).await;
            push_price(&coalescer, &slug, Side::Up, dec!(0.62));
        })
    };

    let _ = tokio::time::timeout(Duration::from_millis(800), strategy_loop.run()).await;
    driver.abort();

    assert_eq!(strategy_loop.plan_count(), 1, "exactly one plan should have fired on the single grid level");
    let position = strategy_loop.position();
    assert_eq!(position.up_shares, dec!(10));
    assert_eq!(position.down_shares, dec!(10));
    assert_eq!(position.min_profit(), dec!(0.20));
    assert!(position.is_locked());
}

#[tokio::test]
async fn frozen_price_blocks_new_entries() {
    // Scenario 6: UP at 99c freezes the book; the grid level at 62 (below
    // the freeze price but still a fresh crossing) must not fire a plan.
    let now = Utc::now();
    let mkt = market(now, 900);
    let slug = mkt.slug.clone();
    let config = test_config();
    let Harness { mut strategy_loop, price_coalescer } = build_harness(mkt, config, Duration::from_millis(20));

    let driver = {
        let coalescer = price_coalescer.clone();
        let slug = slug.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            push_price(&coalescer, &slug, Side::Down, dec!(0.01));
            push_price(&coalescer, &slug, Side::Up, dec!(0.99));
            tokio::time::sleep(Duration::from_millis(60)).await;
            push_price(&coalescer, &slug, Side::Up, dec!(0.62));
        })
    };

    let _ = tokio::time::timeout(Duration::from_millis(400), strategy_loop.run()).await;
    driver.abort();

    assert_eq!(strategy_loop.plan_count(), 0, "frozen book must not spawn a new hedge plan");
}

#[tokio::test]
async fn first_sample_after_reset_never_fires() {
    // Boundary behavior: the very first price sample for a side only
    // records; it cannot itself be an upward crossing.
    let now = Utc::now();
    let mkt = market(now, 900);
    let slug = mkt.slug.clone();
    let config = test_config();
    let Harness { mut strategy_loop, price_coalescer } = build_harness(mkt, config, Duration::from_millis(20));

    let driver = {
        let coalescer = price_coalescer.clone();
        let slug = slug.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            push_price(&coalescer, &slug, Side::Down, dec!(0.38));
            push_price(&coalescer, &slug, Side::Up, dec!(0.62));
        })
    };

    let _ = tokio::time::timeout(Duration::from_millis(300), strategy_loop.run()).await;
    driver.abort();

    assert_eq!(strategy_loop.plan_count(), 0, "a bare first sample at the level must not count as a crossing");
}
