//! The Strategy Loop (§4.1, §5): the single task that owns every piece of
//! mutable strategy state and consumes its inbound queues in fixed
//! priority — command results, then order updates, then coalesced price
//! signals, then the periodic tick. Grounded in the teacher's
//! `strategy::strategies::two_leg::TwoLegStrategy::run` (a `tokio::select!`
//! dispatch loop around one market) generalized to this spec's five-way
//! priority and full plan/supplement/flatten machinery.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, OrderExecutionMode};
use crate::domain::{
    FillDedupe, HedgePlan, LevelDedupe, LevelKey, Market, Order, OrderRequest, OrderStatus, OrderTemplate, OrderType,
    Position, Side,
};
use crate::exchange::{OrderUpdate, TopOfBook};

use super::executor::{Command, CommandKind, CommandOutcome, CommandResult};
use super::flatten::{FlattenConfig, FlattenGuard};
use super::queues::PriceCoalescer;
use super::risk::{RiskBrain, RiskConfig};
use super::supplement::{SupplementConfig, SupplementEngine};
use super::trigger::{GridTrigger, TriggerSpeed, VelocityConfig, VelocityFiring, VelocityTrigger};

/// Which leg of a plan an outbound/in-flight order belongs to, so an
/// arriving ack or update can be routed back without re-deriving it from
/// the plan's current state (which may have moved on).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leg {
    Entry,
    Hedge,
    Supplement,
}

fn cents(price: Decimal) -> i64 {
    (price * Decimal::from(100))
        .round()
        .try_into()
        .unwrap_or(0)
}

pub struct StrategyLoop {
    market: Market,
    config: AppConfig,

    position: Position,
    plans: HashMap<Uuid, HedgePlan>,
    orders: HashMap<String, Order>,
    leg_of_order: HashMap<String, (Uuid, Leg)>,

    level_dedupe: LevelDedupe,
    fill_dedupe: FillDedupe,

    velocity: VelocityTrigger,
    grid: GridTrigger,
    risk: RiskBrain,
    supplement: SupplementEngine,
    flatten: FlattenGuard,

    latest_price: HashMap<Side, Decimal>,
    top_of_book: Option<TopOfBook>,
    last_book_refresh_at: Option<DateTime<Utc>>,
    trades_this_cycle: u32,
    rounds_this_cycle: u32,

    price_coalescer: Arc<PriceCoalescer>,
    order_updates: mpsc::Receiver<OrderUpdate>,
    command_results: mpsc::Receiver<CommandResult>,
    commands: mpsc::Sender<Command>,
}

impl StrategyLoop {
    pub fn new(
        market: Market,
        config: AppConfig,
        price_coalescer: Arc<PriceCoalescer>,
        order_updates: mpsc::Receiver<OrderUpdate>,
        command_results: mpsc::Receiver<CommandResult>,
        commands: mpsc::Sender<Command>,
    ) -> Self {
        let velocity_cfg = VelocityConfig {
            window_seconds: config.triggers.window_seconds,
            max_samples: 256,
            min_move_cents: config.triggers.min_move_cents,
            min_velocity_cents_per_sec: config.triggers.min_velocity_cents_per_sec,
            fast_velocity_threshold: config.triggers.fast_velocity_threshold,
            velocity_comparison_multiplier: config.triggers.velocity_comparison_multiplier,
            prefer_higher_price: config.triggers.prefer_higher_price,
            min_preferred_price_cents: config.triggers.min_preferred_price_cents,
            aggressiveness: config.triggers.aggressiveness,
            velocity_history_len: config.triggers.velocity_history_len,
        };
        let risk_cfg = RiskConfig {
            target_total_cost: Decimal::ONE - config.risk.profit_target / Decimal::from(100),
            min_profit_target: config.risk.profit_target / Decimal::from(100),
            max_exposure_ratio: config.risk.max_exposure_ratio,
            max_single_exposure: config.risk.max_single_exposure,
            max_total_exposure: config.risk.max_total_exposure,
            enable_double_side: config.risk.enable_double_side,
            max_net_exposure_shares: config.risk.max_net_exposure_shares,
        };
        let supplement_cfg = SupplementConfig {
            debounce_seconds: config.supplement.strong_hedge_debounce_seconds,
            hedge_lock_window_seconds: config.supplement.hedge_lock_window_seconds,
            min_supplement_shares: config.supplement.min_supplement_shares,
        };
        let flatten_cfg = FlattenConfig {
            flatten_seconds_before_end: config.cycle.flatten_seconds_before_end,
            stop_new_entries_seconds: config.cycle.stop_new_entries_seconds,
            freeze_low_cents: Decimal::ONE,
            freeze_high_cents: Decimal::from(99),
            cancel_entry_orders_on_freeze: config.cycle.cancel_entry_orders_on_freeze,
        };

        Self {
            market,
            config,
            position: Position::default(),
            plans: HashMap::new(),
            orders: HashMap::new(),
            leg_of_order: HashMap::new(),
            level_dedupe: LevelDedupe::new(),
            fill_dedupe: FillDedupe::new(),
            velocity: VelocityTrigger::new(velocity_cfg),
            grid: GridTrigger::new(config_grid_levels(&config)),
            risk: RiskBrain::new(risk_cfg),
            supplement: SupplementEngine::new(supplement_cfg),
            flatten: FlattenGuard::new(flatten_cfg),
            latest_price: HashMap::new(),
            top_of_book: None,
            last_book_refresh_at: None,
            trades_this_cycle: 0,
            rounds_this_cycle: 0,
            price_coalescer,
            order_updates,
            command_results,
            commands,
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn plan_count(&self) -> usize {
        self.plans.len()
    }

    /// Resets all per-market state on a cycle change (§6 "Cycle
    /// notification"). Callers detect the slug change and swap in a new
    /// `Market` before calling this.
    pub fn reset_for_new_market(&mut self, market: Market) {
        info!(old = %self.market.slug, new = %market.slug, "cycle rollover, resetting strategy state");
        self.market = market;
        self.position = Position::default();
        self.plans.clear();
        self.orders.clear();
        self.leg_of_order.clear();
        self.level_dedupe.clear();
        self.fill_dedupe.clear();
        self.velocity.reset();
        self.grid.reset();
        self.flatten.reset_for_new_cycle();
        self.latest_price.clear();
        self.top_of_book = None;
        self.last_book_refresh_at = None;
        self.trades_this_cycle = 0;
        self.rounds_this_cycle = 0;
    }

    fn best_ask(&self, side: Side) -> Option<Decimal> {
        self.top_of_book.as_ref().and_then(|b| match side {
            Side::Up => b.up_ask,
            Side::Down => b.down_ask,
        })
    }

    fn best_bid(&self, side: Side) -> Option<Decimal> {
        self.top_of_book.as_ref().and_then(|b| match side {
            Side::Up => b.up_bid,
            Side::Down => b.down_bid,
        })
    }

    /// Runs until both inbound channels close. Priority, per §5: command
    /// results, then order updates, then coalesced price signals, then the
    /// periodic tick — implemented with `biased` so earlier branches are
    /// always preferred when more than one is ready.
    pub async fn run(&mut self) {
        let mut ticker = interval(StdDuration::from_millis(250));
        loop {
            let price_pending = !self.price_coalescer.is_empty();
            tokio::select! {
                biased;

                result = self.command_results.recv() => {
                    match result {
                        Some(result) => self.handle_command_result(result, Utc::now()),
                        None => { debug!("command result channel closed"); break; }
                    }
                }

                update = self.order_updates.recv(), if true => {
                    match update {
                        Some(update) => self.handle_order_update(update, Utc::now()).await,
                        None => { debug!("order update channel closed"); break; }
                    }
                }

                _ = async {}, if price_pending => {
                    self.drain_price_events(Utc::now()).await;
                }

                _ = ticker.tick() => {
                    self.on_tick(Utc::now()).await;
                }
            }
        }
    }

    // ---- price path ----

    async fn drain_price_events(&mut self, now: DateTime<Utc>) {
        for event in self.price_coalescer.drain() {
            self.latest_price.insert(event.side, event.new_price);
            self.velocity.record(event.side, event.new_price * Decimal::from(100), event.timestamp);

            let grid_level = self.grid.record_and_check(event.side, cents(event.new_price));
            if let Some(level) = grid_level {
                self.try_fire_grid(event.side, level, now).await;
            }
        }

        if let Some(firing) = self.velocity.evaluate(&self.latest_price.iter().map(|(s, p)| (*s, *p * Decimal::from(100))).collect()) {
            self.try_fire_velocity(firing, now).await;
        }
    }

    async fn try_fire_grid(&mut self, side: Side, level_cents: i64, now: DateTime<Utc>) {
        let key = LevelKey { side, level_cents };
        if self.level_dedupe.is_recent(key, now) {
            return;
        }
        self.level_dedupe.mark(key, now);
        self.spawn_plan(side, Decimal::from(level_cents) / Decimal::from(100), key, now).await;
    }

    /// §4.2: fast velocity takes the ask for an immediate entry; slow
    /// velocity uses the bid/ask-interpolated limit price instead.
    async fn try_fire_velocity(&mut self, firing: VelocityFiring, now: DateTime<Utc>) {
        let side = firing.side;
        let Some(&last_traded) = self.latest_price.get(&side) else { return };
        let key = LevelKey { side, level_cents: cents(last_traded) };
        if self.level_dedupe.is_recent(key, now) {
            return;
        }
        self.level_dedupe.mark(key, now);

        let entry_price = match firing.speed {
            TriggerSpeed::Fast => self.best_ask(side).unwrap_or(last_traded),
            TriggerSpeed::Slow => {
                let bid = self.best_bid(side).unwrap_or(last_traded);
                let ask = self.best_ask(side).unwrap_or(last_traded);
                self.velocity.slow_path_price(bid, ask)
            }
        };
        self.spawn_plan(side, entry_price, key, now).await;
    }

    async fn spawn_plan(&mut self, side: Side, entry_price: Decimal, key: LevelKey, now: DateTime<Utc>) {
        if self.flatten.should_stop_new_entries(self.market.seconds_remaining(now)) {
            return;
        }
        let up = self.latest_price.get(&Side::Up).copied().unwrap_or(Decimal::ZERO);
        let down = self.latest_price.get(&Side::Down).copied().unwrap_or(Decimal::ZERO);
        if self.flatten.is_price_frozen(up * Decimal::from(100), down * Decimal::from(100)) {
            return;
        }
        if self.trades_this_cycle >= self.config.cycle.max_trades_per_cycle {
            return;
        }
        if !self.risk.allow_entry(&self.position, side, entry_price, self.config.orders.order_size).is_allowed() {
            return;
        }
        if !self.risk.allow_additional_exposure(&self.position, side).is_allowed() {
            return;
        }

        let hedge_side = side.opposite();
        let hedge_price = self.risk.max_hedge_price(entry_price, self.best_ask(hedge_side));
        let hedge_size = self.config.orders.effective_hedge_size();

        let entry_template = OrderTemplate {
            side,
            token_id: self.market.token_id(side).to_string(),
            price: entry_price,
            size: self.config.orders.order_size,
            order_type: OrderType::Fak,
        };
        let hedge_template = OrderTemplate {
            side: hedge_side,
            token_id: self.market.token_id(hedge_side).to_string(),
            price: hedge_price,
            size: hedge_size,
            order_type: OrderType::Gtc,
        };

        let mut plan = HedgePlan::new(self.market.slug.clone(), key, entry_template.clone(), hedge_template, now);
        let plan_id = plan.plan_id;
        let client_order_id = Uuid::new_v4();
        plan.entry_order_id = Some(client_order_id.to_string());

        let request = OrderRequest::buy(
            &self.market.slug,
            &entry_template.token_id,
            entry_template.side,
            entry_template.price,
            entry_template.size,
            entry_template.order_type,
            true,
        );
        self.leg_of_order.insert(request.client_order_id.to_string(), (plan_id, Leg::Entry));

        self.plans.insert(plan_id, plan);
        self.trades_this_cycle += 1;
        self.rounds_this_cycle += 1;

        info!(%plan_id, %side, %entry_price, "firing new hedge plan");
        self.dispatch(plan_id, CommandKind::PlaceEntry(request), StdDuration::from_secs(20)).await;

        // §6 `orderExecutionMode`: parallel mode places the hedge leg right
        // away instead of waiting for the entry fill. The plan's state
        // machine stays on the entry path; `handle_command_result` and
        // `handle_order_update` detect the hedge racing ahead of it and
        // fold the result in without an illegal state transition (§7
        // "out-of-order leg fill").
        if self.config.orders.execution_mode == OrderExecutionMode::Parallel {
            if let Some(plan) = self.plans.get(&plan_id) {
                let hedge_request = OrderRequest::buy(
                    &self.market.slug,
                    &plan.hedge_template.token_id,
                    plan.hedge_template.side,
                    plan.hedge_template.price,
                    plan.hedge_template.size,
                    plan.hedge_template.order_type,
                    false,
                );
                self.leg_of_order.insert(hedge_request.client_order_id.to_string(), (plan_id, Leg::Hedge));
                self.dispatch(plan_id, CommandKind::PlaceHedge(hedge_request), StdDuration::from_secs(20)).await;
            }
        }
    }

    // ---- command-result path ----

    fn handle_command_result(&mut self, result: CommandResult, now: DateTime<Utc>) {
        let CommandResult { plan_id, outcome } = result;

        if let CommandOutcome::BookRefreshed(book) = outcome {
            self.top_of_book = Some(book);
            return;
        }
        if let CommandOutcome::BookRefreshFailed(err) = outcome {
            warn!(error = %err, "book refresh failed, keeping last-known quote");
            return;
        }

        // Supplement/flatten orders may be plan-scoped (tied to a real
        // HedgePlan via `maybe_supplement`'s scoped path) or ad-hoc (a
        // synthetic id with no owning plan, e.g. flatten liquidation). The
        // acked order_id is correlated unconditionally so the resulting
        // fill isn't dropped by `handle_order_update` either way.
        if let CommandOutcome::SupplementAcked(acked) = &outcome {
            self.leg_of_order.insert(acked.order_id.clone(), (plan_id, Leg::Supplement));
        }

        let Some(plan) = self.plans.get_mut(&plan_id) else {
            match &outcome {
                CommandOutcome::SupplementAcked(_) => {
                    debug!(%plan_id, "ad-hoc supplement/flatten order acked, no owning plan to update");
                }
                CommandOutcome::SupplementFailed(err) => {
                    warn!(%plan_id, error = %err, "ad-hoc supplement/flatten order failed");
                }
                _ => warn!(%plan_id, "command result for unknown or superseded plan"),
            }
            return;
        };

        match outcome {
            CommandOutcome::EntryAcked(acked) => {
                self.leg_of_order.insert(acked.order_id.clone(), (plan_id, Leg::Entry));
                let requested = plan.entry_template.size;
                let min_order_size = self.config.orders.min_order_size;
                plan.entry_acked_with_size(acked.order_id, requested, acked.size, min_order_size, now);
            }
            CommandOutcome::EntryFailed(err) => {
                self.level_dedupe.release(plan.level_key);
                plan.entry_submit_failed(err.to_string(), now);
            }
            CommandOutcome::HedgeAcked(acked) => {
                self.leg_of_order.insert(acked.order_id.clone(), (plan_id, Leg::Hedge));
                if plan.state == crate::domain::PlanState::HedgeSubmitting {
                    plan.hedge_acked(acked.order_id, now);
                } else {
                    // Parallel mode: the hedge leg was dispatched alongside
                    // the entry and raced ahead of it. Record the order id
                    // without transitioning state; the entry's own fill
                    // handling drives the plan's state machine from here.
                    plan.hedge_order_id = Some(acked.order_id);
                }
            }
            CommandOutcome::HedgeFailed(err) => {
                if plan.state == crate::domain::PlanState::HedgeSubmitting {
                    plan.hedge_submit_failed(err.to_string(), now);
                } else {
                    debug!(%plan_id, error = %err, "parallel-mode hedge submit failed ahead of entry; will resubmit once entry fills");
                }
            }
            CommandOutcome::CancelAcked => {
                plan.cancel_acked(now);
            }
            CommandOutcome::CancelFailed(err) => {
                warn!(%plan_id, error = %err, "hedge cancel failed, will retry on next state-age timeout");
            }
            CommandOutcome::SyncRequested => {
                plan.mark_synced(now);
            }
            CommandOutcome::SyncFailed(err) => {
                warn!(%plan_id, error = %err, "sync command failed");
            }
            CommandOutcome::SupplementAcked(_) => {
                plan.supplement_settled(now);
            }
            CommandOutcome::SupplementFailed(err) => {
                warn!(%plan_id, error = %err, "supplement order failed");
                plan.supplement_settled(now);
            }
            CommandOutcome::BookRefreshed(_) | CommandOutcome::BookRefreshFailed(_) => unreachable!("handled above"),
        }

        if plan.is_done() {
            if plan.state == crate::domain::PlanState::Failed && plan.allow_retry {
                self.level_dedupe.release(plan.level_key);
            }
        }
    }

    // ---- order-update path ----

    async fn handle_order_update(&mut self, update: OrderUpdate, now: DateTime<Utc>) {
        let Some(&(plan_id, leg)) = self.leg_of_order.get(&update.order_id) else {
            debug!(order_id = %update.order_id, "order update for unknown order (likely a superseded plan)");
            return;
        };

        let is_new_fill = update.status.has_any_fill() && self.fill_dedupe.observe(&update.order_id, update.timestamp);
        let mut fill_side_price = None;
        if is_new_fill {
            if let Some(plan) = self.plans.get(&plan_id) {
                let side = match leg {
                    Leg::Entry => plan.entry_template.side,
                    Leg::Hedge | Leg::Supplement => plan.hedge_template.side,
                };
                let price = match leg {
                    Leg::Entry => plan.entry_template.price,
                    Leg::Hedge | Leg::Supplement => plan.hedge_template.price,
                };
                self.position.add_fill(side, update.filled_size, price);
                fill_side_price = Some((side, price));
            }
        }

        let Some(plan) = self.plans.get_mut(&plan_id) else { return };

        let mut hedge_request = None;
        let mut out_of_order_hedge_fill = None;
        match (leg, update.status) {
            (Leg::Entry, OrderStatus::Filled) => {
                // Every plan spawned by this loop carries a hedge leg.
                plan.entry_filled(true, now);
                if let Some(existing_hedge_order_id) = plan.hedge_order_id.clone() {
                    // Parallel mode: the hedge leg already raced ahead and
                    // was acked before the entry settled. Catch the state
                    // machine up to HedgeOpen instead of resubmitting.
                    plan.hedge_acked(existing_hedge_order_id, now);
                } else {
                    let request = OrderRequest::buy(
                        &self.market.slug,
                        &plan.hedge_template.token_id,
                        plan.hedge_template.side,
                        plan.hedge_template.price,
                        plan.hedge_template.size,
                        plan.hedge_template.order_type,
                        false,
                    );
                    self.leg_of_order.insert(request.client_order_id.to_string(), (plan_id, Leg::Hedge));
                    hedge_request = Some(request);
                }
            }
            (Leg::Entry, OrderStatus::Failed | OrderStatus::Canceled) => {
                plan.entry_order_failed(format!("entry order ended in {:?}", update.status), now);
            }
            (Leg::Hedge, OrderStatus::Filled) => {
                if plan.state == crate::domain::PlanState::HedgeOpen {
                    plan.hedge_filled(now);
                } else {
                    // §7 "Out-of-order leg fill": the hedge settled before
                    // the entry did (a parallel-mode race). Roll back the
                    // position delta just recorded for this fill, neutralize
                    // with an opposing sell, and let the entry's own fill
                    // handling re-issue a fresh hedge once it lands.
                    plan.hedge_order_id = None;
                    out_of_order_hedge_fill = fill_side_price;
                }
            }
            (Leg::Hedge, OrderStatus::Failed | OrderStatus::Canceled) => {
                if plan.state == crate::domain::PlanState::HedgeOpen {
                    plan.hedge_order_failed(format!("hedge order ended in {:?}", update.status), now);
                } else {
                    debug!(%plan_id, status = ?update.status, "parallel-mode hedge leg ended before entry settled; will resubmit once entry fills");
                }
            }
            (Leg::Supplement, OrderStatus::Filled) => {
                // Supplement settlement itself is driven by the command
                // result (`SupplementAcked`/`SupplementFailed`); the fill
                // just advances the position tracker, already done above.
            }
            _ => {}
        }

        if plan.is_done() && plan.state == crate::domain::PlanState::Failed && plan.allow_retry {
            self.level_dedupe.release(plan.level_key);
        }

        if let Some(request) = hedge_request {
            self.dispatch(plan_id, CommandKind::PlaceHedge(request), StdDuration::from_secs(20)).await;
        }

        if let Some((side, price)) = out_of_order_hedge_fill {
            self.position.add_fill(side, -update.filled_size, price);
            let neutralize_price = self.best_bid(side).unwrap_or(price);
            let sell = OrderRequest::sell(&self.market.slug, self.market.token_id(side), side, neutralize_price, update.filled_size, OrderType::Fak);
            let dispatch_id = Uuid::new_v4();
            self.leg_of_order.insert(sell.client_order_id.to_string(), (dispatch_id, Leg::Supplement));
            warn!(%plan_id, %side, shares = %update.filled_size, "out-of-order hedge fill ahead of entry, rolling back and neutralizing");
            self.dispatch(dispatch_id, CommandKind::Supplement(sell), StdDuration::from_secs(15)).await;
        }
    }

    // ---- periodic tick ----

    async fn on_tick(&mut self, now: DateTime<Utc>) {
        self.level_dedupe.prune(now);
        self.fill_dedupe.prune(now);

        let seconds_remaining = self.market.seconds_remaining(now);

        if self.last_book_refresh_at.map_or(true, |t| now - t >= chrono::Duration::seconds(1)) {
            self.last_book_refresh_at = Some(now);
            self.dispatch(Uuid::nil(), CommandKind::RefreshBook { market_slug: self.market.slug.clone() }, StdDuration::from_secs(5)).await;
        }

        let plan_ids: Vec<Uuid> = self.plans.keys().copied().collect();
        for plan_id in plan_ids {
            self.tick_plan(plan_id, now).await;
        }

        if self.flatten.should_flatten(seconds_remaining) {
            if let Some(action) = self.flatten.flatten(&self.position) {
                self.execute_flatten(action, now).await;
            }
        }

        // §4.5: the ad-hoc strong-hedge path only fires unconditionally
        // inside the hedge-lock window; outside it, it only runs when a
        // plan is actually active to be scoped against.
        if self.config.supplement.enable_adhoc_strong_hedge
            && (!self.plans.is_empty() || seconds_remaining <= self.config.supplement.hedge_lock_window_seconds)
        {
            self.maybe_supplement(seconds_remaining, now).await;
        }
    }

    async fn tick_plan(&mut self, plan_id: Uuid, now: DateTime<Utc>) {
        let Some(plan) = self.plans.get_mut(&plan_id) else { return };

        if plan.entry_submit_timed_out(now) {
            self.level_dedupe.release(plan.level_key);
            return;
        }
        if plan.hedge_open_timed_out(now) {
            let order_id = plan.hedge_order_id.clone();
            drop(plan);
            if let Some(order_id) = order_id {
                self.dispatch(plan_id, CommandKind::CancelHedge { order_id }, StdDuration::from_secs(10)).await;
            }
            return;
        }
        if plan.cancel_timed_out(now) {
            return;
        }
        if plan.retry_exhausted(now) {
            plan.retries_exhausted(now);
            return;
        }
        if plan.retry_ready(now) {
            let hedge_price = self.latest_price.get(&plan.hedge_template.side).copied().unwrap_or(plan.hedge_template.price);
            let best_ask = self.top_of_book.as_ref().and_then(|b| match plan.hedge_template.side {
                Side::Up => b.up_ask,
                Side::Down => b.down_ask,
            });
            let refreshed = self.risk.max_hedge_price(plan.entry_template.price, best_ask).min(hedge_price);
            plan.begin_hedge_resubmit(refreshed, now);
            let request = OrderRequest::buy(
                &self.market.slug,
                &plan.hedge_template.token_id,
                plan.hedge_template.side,
                plan.hedge_template.price,
                plan.hedge_template.size,
                plan.hedge_template.order_type,
                false,
            );
            self.leg_of_order.insert(request.client_order_id.to_string(), (plan_id, Leg::Hedge));
            self.dispatch(plan_id, CommandKind::PlaceHedge(request), StdDuration::from_secs(20)).await;
            return;
        }
        if plan.entry_needs_sync(now) {
            if let Some(order_id) = plan.entry_order_id.clone() {
                plan.mark_synced(now);
                self.dispatch(plan_id, CommandKind::SyncEntry { order_id }, StdDuration::from_secs(10)).await;
            }
        }
    }

    async fn maybe_supplement(&mut self, seconds_remaining: i64, now: DateTime<Utc>) {
        let target = self.config.risk.profit_target / Decimal::from(100);

        let deficit_side =
            if self.position.profit_if_up() <= self.position.profit_if_down() { Side::Up } else { Side::Down };
        let hedge_price = self
            .best_ask(deficit_side)
            .or_else(|| self.latest_price.get(&deficit_side).copied())
            .unwrap_or(Decimal::ZERO);
        if hedge_price.is_zero() {
            return;
        }

        let plan = self.supplement.evaluate(
            &self.market.slug,
            &self.position,
            &self.risk,
            target,
            seconds_remaining,
            hedge_price,
            now,
        );

        let Some(plan) = plan else { return };

        let request = OrderRequest::buy(
            &self.market.slug,
            self.market.token_id(plan.side),
            plan.side,
            hedge_price + self.config.orders.supplement_max_buy_slippage_cents / Decimal::from(100),
            plan.shares,
            OrderType::Fak,
            false,
        );

        // Route through whichever open plan actually owns this hedge side so
        // its Supplementing state transition is real, not a bookkeeping
        // no-op; only fall back to an ad-hoc id when no such plan exists
        // (e.g. all plans already Done but the position itself is unbalanced).
        let mut owning_plan_id = None;
        for p in self.plans.values_mut() {
            if p.hedge_template.side == plan.side && !p.is_done() {
                p.begin_supplement(now);
                owning_plan_id = Some(p.plan_id);
                break;
            }
        }
        let dispatch_id = owning_plan_id.unwrap_or_else(Uuid::new_v4);

        info!(side = %plan.side, shares = %plan.shares, plan_id = ?owning_plan_id, "submitting strong-hedge supplement");
        self.leg_of_order.insert(request.client_order_id.to_string(), (dispatch_id, Leg::Supplement));
        self.dispatch(dispatch_id, CommandKind::Supplement(request), StdDuration::from_secs(15)).await;
    }

    async fn execute_flatten(&mut self, action: super::flatten::FlattenAction, now: DateTime<Utc>) {
        if action.cancel_entries {
            for plan in self.plans.values() {
                if plan.state == crate::domain::PlanState::EntrySubmitting || plan.state == crate::domain::PlanState::EntryOpen {
                    debug!(plan_id = %plan.plan_id, "flatten: entry order left to expire (FAK orders self-cancel)");
                }
            }
        }
        for liquidation in action.liquidations {
            let bid = self
                .best_bid(liquidation.side)
                .or_else(|| self.latest_price.get(&liquidation.side).copied())
                .unwrap_or(Decimal::ZERO);
            let request = OrderRequest::sell(
                &self.market.slug,
                self.market.token_id(liquidation.side),
                liquidation.side,
                bid,
                liquidation.shares,
                OrderType::Fak,
            );
            let plan_id = Uuid::new_v4();
            self.leg_of_order.insert(request.client_order_id.to_string(), (plan_id, Leg::Supplement));
            info!(side = %liquidation.side, shares = %liquidation.shares, "flatten: liquidating residual inventory");
            self.dispatch(plan_id, CommandKind::Supplement(request), StdDuration::from_secs(15)).await;
        }
        let _ = now;
    }

    async fn dispatch(&mut self, plan_id: Uuid, kind: CommandKind, timeout_budget: StdDuration) {
        if self.commands.try_send(Command { plan_id, kind, timeout_budget }).is_err() {
            warn!(%plan_id, "command queue saturated, dropping dispatch");
            if let Some(plan) = self.plans.get_mut(&plan_id) {
                if plan.state == crate::domain::PlanState::EntrySubmitting {
                    self.level_dedupe.release(plan.level_key);
                    plan.entry_submit_failed("command queue saturated", Utc::now());
                }
            }
        }
    }
}

fn config_grid_levels(config: &AppConfig) -> Vec<i64> {
    config.triggers.grid_levels.clone()
}
