//! HedgePlan: the lifecycle object for one entry→hedge pair (§3, §4.4).
//!
//! The state set and its typed `can_transition_to` gate are grounded in the
//! teacher's `domain::state::StrategyState` pattern; the transition *events*
//! (ack, order update, timeout, cancel, retry) are grounded in
//! `strategy::strategies::two_leg::TwoLegStrategy`'s dispatch methods, generalized
//! from the teacher's single two-leg cycle to the full retry/cancel/supplement
//! machine this spec requires.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::dedupe::LevelKey;
use super::market::Side;
use super::order::{OrderStatus, OrderType};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanState {
    EntrySubmitting,
    EntryOpen,
    HedgeSubmitting,
    HedgeOpen,
    HedgeCanceling,
    RetryWait,
    Supplementing,
    Done,
    Failed,
}

impl PlanState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanState::Done | PlanState::Failed)
    }

    /// Exhaustive gate over valid (from, to) pairs, in the spirit of the
    /// teacher's `StrategyState::can_transition_to`. Used defensively by
    /// `HedgePlan::force_state` and by tests; the plan's own event methods
    /// below are the normal way state changes, and always produce valid pairs.
    pub fn can_transition_to(&self, to: PlanState) -> bool {
        use PlanState::*;
        matches!(
            (*self, to),
            (EntrySubmitting, EntryOpen)
                | (EntrySubmitting, Failed)
                | (EntryOpen, HedgeSubmitting)
                | (EntryOpen, Done)
                | (EntryOpen, Failed)
                | (HedgeSubmitting, HedgeOpen)
                | (HedgeSubmitting, RetryWait)
                | (HedgeOpen, Done)
                | (HedgeOpen, RetryWait)
                | (HedgeOpen, HedgeCanceling)
                | (HedgeCanceling, RetryWait)
                | (RetryWait, HedgeSubmitting)
                | (RetryWait, Failed)
                | (EntryOpen, Supplementing)
                | (HedgeOpen, Supplementing)
                | (Done, Supplementing)
                | (Supplementing, EntryOpen)
                | (Supplementing, HedgeOpen)
                | (Supplementing, Done)
        )
    }
}

/// Desired shape of one leg's order, refreshed before each (re)submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderTemplate {
    pub side: Side,
    pub token_id: String,
    pub price: Decimal,
    pub size: Decimal,
    pub order_type: OrderType,
}

const MAX_ATTEMPTS_DEFAULT: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgePlan {
    pub plan_id: Uuid,
    pub market_slug: String,
    pub level_key: LevelKey,
    pub state: PlanState,

    pub entry_template: OrderTemplate,
    pub hedge_template: OrderTemplate,

    pub entry_order_id: Option<String>,
    pub hedge_order_id: Option<String>,
    pub entry_status: Option<OrderStatus>,
    pub hedge_status: Option<OrderStatus>,

    pub entry_attempts: u32,
    pub hedge_attempts: u32,
    pub max_attempts: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub state_entered_at: DateTime<Utc>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_cancel_at: Option<DateTime<Utc>>,

    pub supplement_in_flight: bool,
    pub last_supplement_at: Option<DateTime<Utc>>,
    /// State the plan was in before entering `Supplementing`, restored when
    /// the supplement command result arrives.
    pub pre_supplement_state: Option<PlanState>,

    /// Set when a `Failed` transition should release the level-dedupe entry
    /// immediately (§4.4 "Level-dedupe release rules").
    pub allow_retry: bool,
    pub last_error: Option<String>,
}

impl HedgePlan {
    pub fn new(
        market_slug: impl Into<String>,
        level_key: LevelKey,
        entry_template: OrderTemplate,
        hedge_template: OrderTemplate,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            plan_id: Uuid::new_v4(),
            market_slug: market_slug.into(),
            level_key,
            state: PlanState::EntrySubmitting,
            entry_template,
            hedge_template,
            entry_order_id: None,
            hedge_order_id: None,
            entry_status: None,
            hedge_status: None,
            entry_attempts: 0,
            hedge_attempts: 0,
            max_attempts: MAX_ATTEMPTS_DEFAULT,
            next_retry_at: None,
            state_entered_at: now,
            last_sync_at: None,
            last_cancel_at: None,
            supplement_in_flight: false,
            last_supplement_at: None,
            pre_supplement_state: None,
            allow_retry: false,
            last_error: None,
        }
    }

    fn transition(&mut self, to: PlanState, now: DateTime<Utc>) {
        debug_assert!(
            self.state.can_transition_to(to),
            "illegal plan transition {:?} -> {:?}",
            self.state,
            to
        );
        self.state = to;
        self.state_entered_at = now;
    }

    pub fn state_age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.state_entered_at
    }

    fn backoff_delay(attempts: u32) -> chrono::Duration {
        let capped = attempts.min(3);
        chrono::Duration::seconds(1i64 << capped)
    }

    // ---- EntrySubmitting ----

    pub fn entry_acked(&mut self, order_id: String, now: DateTime<Utc>) {
        self.entry_order_id = Some(order_id);
        self.transition(PlanState::EntryOpen, now);
    }

    /// §7 "Ack size/id mismatch" / §8 scenario 2: when the exchange acks a
    /// different size than requested, the hedge leg is scaled by the same
    /// ratio, then raised back to `min_order_size` worth of shares if the
    /// scaled size would fall under the exchange's USDC floor.
    pub fn entry_acked_with_size(
        &mut self,
        order_id: String,
        requested_size: Decimal,
        acked_size: Decimal,
        min_order_size: Decimal,
        now: DateTime<Utc>,
    ) {
        if requested_size > Decimal::ZERO && acked_size != requested_size {
            let ratio = acked_size / requested_size;
            let mut scaled = self.hedge_template.size * ratio;
            if scaled * self.hedge_template.price < min_order_size && self.hedge_template.price > Decimal::ZERO {
                scaled = min_order_size / self.hedge_template.price;
            }
            self.hedge_template.size = scaled;
        }
        self.entry_acked(order_id, now);
    }

    pub fn entry_submit_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.last_error = Some(error.into());
        self.allow_retry = true;
        self.transition(PlanState::Failed, now);
    }

    /// §4.4: `stateAge > submitTimeout (~35s) --> Failed(allowRetry)`.
    pub fn entry_submit_timed_out(&mut self, now: DateTime<Utc>) -> bool {
        if self.state == PlanState::EntrySubmitting && self.state_age(now) > chrono::Duration::seconds(35) {
            self.last_error = Some("entry submit timeout".into());
            self.allow_retry = true;
            self.transition(PlanState::Failed, now);
            true
        } else {
            false
        }
    }

    // ---- EntryOpen ----

    /// Double-side means a hedge leg is required; single-side entries finish
    /// as soon as the entry fills.
    pub fn entry_filled(&mut self, double_side: bool, now: DateTime<Utc>) {
        if double_side {
            self.transition(PlanState::HedgeSubmitting, now);
        } else {
            self.transition(PlanState::Done, now);
        }
    }

    pub fn entry_order_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.last_error = Some(error.into());
        self.allow_retry = true;
        self.transition(PlanState::Failed, now);
    }

    pub fn entry_needs_sync(&self, now: DateTime<Utc>) -> bool {
        self.state == PlanState::EntryOpen
            && self.state_age(now) > chrono::Duration::seconds(5)
            && self
                .last_sync_at
                .is_none_or(|ts| now - ts > chrono::Duration::seconds(5))
    }

    pub fn mark_synced(&mut self, now: DateTime<Utc>) {
        self.last_sync_at = Some(now);
    }

    // ---- HedgeSubmitting ----

    pub fn hedge_acked(&mut self, order_id: String, now: DateTime<Utc>) {
        self.hedge_order_id = Some(order_id);
        self.hedge_attempts += 1;
        self.transition(PlanState::HedgeOpen, now);
    }

    pub fn hedge_submit_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.last_error = Some(error.into());
        self.hedge_attempts += 1;
        self.next_retry_at = Some(now + Self::backoff_delay(self.hedge_attempts));
        self.transition(PlanState::RetryWait, now);
    }

    // ---- HedgeOpen ----

    pub fn hedge_filled(&mut self, now: DateTime<Utc>) {
        self.transition(PlanState::Done, now);
    }

    pub fn hedge_order_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.last_error = Some(error.into());
        self.next_retry_at = Some(now + Self::backoff_delay(self.hedge_attempts));
        self.transition(PlanState::RetryWait, now);
    }

    /// §4.4: hedge sits open too long without an update -> cancel-and-replace.
    pub fn hedge_open_timed_out(&mut self, now: DateTime<Utc>) -> bool {
        let stale_cancel = self
            .last_cancel_at
            .is_none_or(|ts| now - ts > chrono::Duration::seconds(10));
        if self.state == PlanState::HedgeOpen
            && self.state_age(now) > chrono::Duration::seconds(10)
            && stale_cancel
        {
            self.transition(PlanState::HedgeCanceling, now);
            true
        } else {
            false
        }
    }

    pub fn hedge_needs_sync(&self, now: DateTime<Utc>) -> bool {
        self.state == PlanState::HedgeOpen && self.state_age(now) > chrono::Duration::seconds(5)
    }

    // ---- HedgeCanceling ----

    pub fn cancel_acked(&mut self, now: DateTime<Utc>) {
        self.last_cancel_at = Some(now);
        self.next_retry_at = Some(now + chrono::Duration::seconds(2));
        self.transition(PlanState::RetryWait, now);
    }

    /// §4.4: `stateAge > cancelTimeout (~12s) --> RetryWait (force)`.
    pub fn cancel_timed_out(&mut self, now: DateTime<Utc>) -> bool {
        if self.state == PlanState::HedgeCanceling && self.state_age(now) > chrono::Duration::seconds(12) {
            self.last_cancel_at = Some(now);
            self.next_retry_at = Some(now + chrono::Duration::seconds(2));
            self.transition(PlanState::RetryWait, now);
            true
        } else {
            false
        }
    }

    // ---- RetryWait ----

    /// Returns `true` if the plan should resubmit the hedge now (caller
    /// refreshes `hedge_template.price` first, per §4.4, then calls
    /// `begin_hedge_resubmit`).
    pub fn retry_ready(&self, now: DateTime<Utc>) -> bool {
        self.state == PlanState::RetryWait
            && self.next_retry_at.is_some_and(|t| now >= t)
            && self.hedge_attempts < self.max_attempts
    }

    pub fn retry_exhausted(&self, now: DateTime<Utc>) -> bool {
        self.state == PlanState::RetryWait
            && self.next_retry_at.is_some_and(|t| now >= t)
            && self.hedge_attempts >= self.max_attempts
    }

    pub fn begin_hedge_resubmit(&mut self, refreshed_price: Decimal, now: DateTime<Utc>) {
        self.hedge_template.price = refreshed_price;
        self.transition(PlanState::HedgeSubmitting, now);
    }

    pub fn retries_exhausted(&mut self, now: DateTime<Utc>) {
        self.last_error = Some("max hedge attempts exceeded".into());
        self.allow_retry = false;
        self.transition(PlanState::Failed, now);
    }

    // ---- Supplementing ----

    pub fn begin_supplement(&mut self, now: DateTime<Utc>) {
        if self.state != PlanState::Supplementing {
            self.pre_supplement_state = Some(self.state);
            self.supplement_in_flight = true;
            self.transition(PlanState::Supplementing, now);
        }
    }

    pub fn supplement_settled(&mut self, now: DateTime<Utc>) {
        self.supplement_in_flight = false;
        self.last_supplement_at = Some(now);
        let resume = self.pre_supplement_state.take().unwrap_or(PlanState::Done);
        self.transition(resume, now);
    }

    pub fn is_done(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn template(side: Side) -> OrderTemplate {
        OrderTemplate {
            side,
            token_id: format!("{side}-tok"),
            price: dec!(0.5),
            size: dec!(10),
            order_type: OrderType::Gtc,
        }
    }

    fn plan() -> HedgePlan {
        let now = Utc::now();
        HedgePlan::new(
            "slug",
            LevelKey { side: Side::Up, level_cents: 62 },
            template(Side::Up),
            template(Side::Down),
            now,
        )
    }

    #[test]
    fn happy_path_to_done() {
        let mut p = plan();
        let t0 = p.state_entered_at;
        p.entry_acked("srv-1".into(), t0);
        assert_eq!(p.state, PlanState::EntryOpen);
        p.entry_filled(true, t0);
        assert_eq!(p.state, PlanState::HedgeSubmitting);
        p.hedge_acked("srv-2".into(), t0);
        assert_eq!(p.state, PlanState::HedgeOpen);
        p.hedge_filled(t0);
        assert_eq!(p.state, PlanState::Done);
        assert!(p.is_done());
    }

    #[test]
    fn single_side_skips_hedge_leg() {
        let mut p = plan();
        let t0 = p.state_entered_at;
        p.entry_acked("srv-1".into(), t0);
        p.entry_filled(false, t0);
        assert_eq!(p.state, PlanState::Done);
    }

    #[test]
    fn ack_size_mismatch_rescales_hedge_leg() {
        // Scenario 2: requested entry size 10, server acks 8. Hedge size
        // scales by the 0.8 ratio (from 10 -> 8), well above the floor.
        let mut p = plan();
        let t0 = p.state_entered_at;
        p.entry_acked_with_size("srv-1".into(), dec!(10), dec!(8), dec!(1), t0);
        assert_eq!(p.state, PlanState::EntryOpen);
        assert_eq!(p.hedge_template.size, dec!(8));
    }

    #[test]
    fn ack_size_mismatch_clamps_to_min_order_size_floor() {
        // Same ratio, but the hedge price is low enough that 8 shares would
        // fall under the exchange's minimum order notional of 5 USDC, so the
        // hedge size is raised back to min_order_size / hedge_price instead.
        let mut p = plan();
        p.hedge_template.price = dec!(0.40);
        let t0 = p.state_entered_at;
        p.entry_acked_with_size("srv-1".into(), dec!(10), dec!(8), dec!(5), t0);
        assert_eq!(p.hedge_template.size, dec!(5) / dec!(0.40));
    }

    #[test]
    fn ack_size_match_leaves_hedge_template_untouched() {
        let mut p = plan();
        let t0 = p.state_entered_at;
        p.entry_acked_with_size("srv-1".into(), dec!(10), dec!(10), dec!(1), t0);
        assert_eq!(p.hedge_template.size, dec!(10));
    }

    #[test]
    fn backoff_doubles_and_caps_at_eight_seconds() {
        assert_eq!(HedgePlan::backoff_delay(0), chrono::Duration::seconds(1));
        assert_eq!(HedgePlan::backoff_delay(1), chrono::Duration::seconds(2));
        assert_eq!(HedgePlan::backoff_delay(2), chrono::Duration::seconds(4));
        assert_eq!(HedgePlan::backoff_delay(3), chrono::Duration::seconds(8));
        assert_eq!(HedgePlan::backoff_delay(10), chrono::Duration::seconds(8));
    }

    #[test]
    fn cancel_and_replace_scenario() {
        // Scenario 3: hedge stuck open -> cancel -> retry wait -> resubmit.
        let mut p = plan();
        let t0 = p.state_entered_at;
        p.entry_acked("srv-1".into(), t0);
        p.entry_filled(true, t0);
        p.hedge_acked("srv-2".into(), t0);
        assert_eq!(p.state, PlanState::HedgeOpen);

        let t1 = t0 + chrono::Duration::seconds(11);
        assert!(p.hedge_open_timed_out(t1));
        assert_eq!(p.state, PlanState::HedgeCanceling);

        p.cancel_acked(t1);
        assert_eq!(p.state, PlanState::RetryWait);
        assert!(!p.retry_ready(t1));

        let t2 = t1 + chrono::Duration::seconds(3);
        assert!(p.retry_ready(t2));
        p.begin_hedge_resubmit(dec!(0.40), t2);
        assert_eq!(p.state, PlanState::HedgeSubmitting);
        assert_eq!(p.hedge_template.price, dec!(0.40));
    }

    #[test]
    fn retry_exhaustion_fails_without_retry() {
        let mut p = plan();
        let t0 = p.state_entered_at;
        p.entry_acked("srv-1".into(), t0);
        p.entry_filled(true, t0);
        p.hedge_submit_failed("boom", t0);
        p.hedge_submit_failed("boom", t0);
        p.hedge_submit_failed("boom", t0);
        assert_eq!(p.hedge_attempts, 3);
        assert!(p.retry_exhausted(p.next_retry_at.unwrap()));
        p.retries_exhausted(p.next_retry_at.unwrap());
        assert_eq!(p.state, PlanState::Failed);
        assert!(!p.allow_retry);
    }

    #[test]
    fn supplement_resumes_interrupted_state() {
        let mut p = plan();
        let t0 = p.state_entered_at;
        p.entry_acked("srv-1".into(), t0);
        p.entry_filled(true, t0);
        p.hedge_acked("srv-2".into(), t0);
        assert_eq!(p.state, PlanState::HedgeOpen);
        p.begin_supplement(t0);
        assert_eq!(p.state, PlanState::Supplementing);
        assert!(p.supplement_in_flight);
        p.supplement_settled(t0);
        assert_eq!(p.state, PlanState::HedgeOpen);
        assert!(!p.supplement_in_flight);
    }
}
