//! The Command Executor (§4.6): the one auxiliary task allowed to block on
//! exchange I/O. It drains a serialized command queue one at a time and
//! posts a `CommandResult` back to the strategy loop — it never touches
//! `HedgePlan`/`Position` state directly. Grounded in the teacher's
//! `strategy::core::executor::OrderExecutor` (retry/timeout wrapper around
//! `PolymarketClient`), narrowed from "executor owns retry policy" to
//! "executor only executes one attempt per command; retry policy lives in
//! `HedgePlan` back in the loop" per this spec's ownership split.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::OrderRequest;
use crate::error::OrderError;
use crate::exchange::{AckedOrder, ExchangeClient, TopOfBook};

use super::queues::COMMAND_QUEUE_CAPACITY;

#[derive(Debug, Clone)]
pub enum CommandKind {
    PlaceEntry(OrderRequest),
    PlaceHedge(OrderRequest),
    CancelHedge { order_id: String },
    SyncEntry { order_id: String },
    SyncHedge { order_id: String },
    Supplement(OrderRequest),
    /// Market-wide, not plan-scoped: the loop dispatches this under a nil
    /// `plan_id` and refreshes its cached top-of-book on the result.
    RefreshBook { market_slug: String },
}

#[derive(Debug, Clone)]
pub struct Command {
    pub plan_id: Uuid,
    pub kind: CommandKind,
    pub timeout_budget: StdDuration,
}

#[derive(Debug, Clone)]
pub enum CommandOutcome {
    EntryAcked(AckedOrder),
    EntryFailed(OrderError),
    HedgeAcked(AckedOrder),
    HedgeFailed(OrderError),
    CancelAcked,
    CancelFailed(OrderError),
    SyncRequested,
    SyncFailed(OrderError),
    SupplementAcked(AckedOrder),
    SupplementFailed(OrderError),
    BookRefreshed(TopOfBook),
    BookRefreshFailed(OrderError),
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub plan_id: Uuid,
    pub outcome: CommandOutcome,
}

pub fn command_channel() -> (mpsc::Sender<Command>, mpsc::Receiver<Command>) {
    mpsc::channel(COMMAND_QUEUE_CAPACITY)
}

pub struct CommandExecutor {
    exchange: Arc<dyn ExchangeClient>,
    commands: mpsc::Receiver<Command>,
    results: mpsc::Sender<CommandResult>,
}

impl CommandExecutor {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        commands: mpsc::Receiver<Command>,
        results: mpsc::Sender<CommandResult>,
    ) -> Self {
        Self { exchange, commands, results }
    }

    /// Runs until the command channel closes (the loop dropped its sender,
    /// i.e. is shutting down). Commands execute strictly one at a time: the
    /// next `recv()` doesn't happen until the current command's future
    /// resolves or times out, which is what makes this task safe to block on.
    pub async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            let result = self.execute(command.clone()).await;
            if self.results.send(result).await.is_err() {
                warn!("command result channel closed, executor shutting down");
                break;
            }
        }
        debug!("command executor stopped");
    }

    async fn execute(&self, command: Command) -> CommandResult {
        let plan_id = command.plan_id;
        let outcome = match command.kind {
            CommandKind::PlaceEntry(req) => match self.place(&req, command.timeout_budget).await {
                Ok(acked) => CommandOutcome::EntryAcked(acked),
                Err(e) => CommandOutcome::EntryFailed(e),
            },
            CommandKind::PlaceHedge(req) => match self.place(&req, command.timeout_budget).await {
                Ok(acked) => CommandOutcome::HedgeAcked(acked),
                Err(e) => CommandOutcome::HedgeFailed(e),
            },
            CommandKind::Supplement(req) => match self.place(&req, command.timeout_budget).await {
                Ok(acked) => CommandOutcome::SupplementAcked(acked),
                Err(e) => CommandOutcome::SupplementFailed(e),
            },
            CommandKind::CancelHedge { order_id } => {
                match timeout(command.timeout_budget, self.exchange.cancel_order(&order_id)).await {
                    Ok(Ok(())) => CommandOutcome::CancelAcked,
                    Ok(Err(e)) => CommandOutcome::CancelFailed(OrderError::Rejected(e.to_string())),
                    Err(_) => CommandOutcome::CancelFailed(OrderError::Timeout {
                        elapsed_ms: command.timeout_budget.as_millis() as u64,
                    }),
                }
            }
            CommandKind::SyncEntry { order_id } | CommandKind::SyncHedge { order_id } => {
                match timeout(command.timeout_budget, self.exchange.sync_order_status(&order_id)).await {
                    Ok(Ok(())) => CommandOutcome::SyncRequested,
                    Ok(Err(e)) => CommandOutcome::SyncFailed(OrderError::Rejected(e.to_string())),
                    Err(_) => CommandOutcome::SyncFailed(OrderError::Timeout {
                        elapsed_ms: command.timeout_budget.as_millis() as u64,
                    }),
                }
            }
            CommandKind::RefreshBook { market_slug } => {
                match timeout(command.timeout_budget, self.exchange.get_top_of_book(&market_slug)).await {
                    Ok(Ok(book)) => CommandOutcome::BookRefreshed(book),
                    Ok(Err(e)) => CommandOutcome::BookRefreshFailed(OrderError::Rejected(e.to_string())),
                    Err(_) => CommandOutcome::BookRefreshFailed(OrderError::Timeout {
                        elapsed_ms: command.timeout_budget.as_millis() as u64,
                    }),
                }
            }
        };
        CommandResult { plan_id, outcome }
    }

    async fn place(&self, req: &OrderRequest, budget: StdDuration) -> Result<AckedOrder, OrderError> {
        match timeout(budget, self.exchange.place_order(req)).await {
            Ok(Ok(acked)) => Ok(acked),
            Ok(Err(e)) => Err(OrderError::Rejected(e.to_string())),
            Err(_) => Err(OrderError::Timeout { elapsed_ms: budget.as_millis() as u64 }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderType, Side};
    use crate::exchange::DryRunExchange;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    #[tokio::test]
    async fn entry_command_round_trips_to_acked_outcome() {
        let (update_tx, _update_rx) = mpsc::unbounded_channel();
        let exchange: Arc<dyn ExchangeClient> = Arc::new(DryRunExchange::new(update_tx, Duration::ZERO));
        let (cmd_tx, cmd_rx) = command_channel();
        let (res_tx, mut res_rx) = mpsc::channel(8);
        let executor = CommandExecutor::new(exchange, cmd_rx, res_tx);
        tokio::spawn(executor.run());

        let plan_id = Uuid::new_v4();
        let req = OrderRequest::buy("slug", "up-tok", Side::Up, dec!(0.5), dec!(10), OrderType::Fak, true);
        cmd_tx
            .send(Command { plan_id, kind: CommandKind::PlaceEntry(req), timeout_budget: Duration::from_secs(1) })
            .await
            .unwrap();

        let result = res_rx.recv().await.unwrap();
        assert_eq!(result.plan_id, plan_id);
        assert!(matches!(result.outcome, CommandOutcome::EntryAcked(_)));
    }

    #[tokio::test]
    async fn cancel_command_reports_acked() {
        let (update_tx, _update_rx) = mpsc::unbounded_channel();
        let exchange: Arc<dyn ExchangeClient> = Arc::new(DryRunExchange::new(update_tx, Duration::from_millis(100)));
        let req = OrderRequest::buy("slug", "down-tok", Side::Down, dec!(0.4), dec!(5), OrderType::Gtc, false);
        let acked = exchange.place_order(&req).await.unwrap();

        let (cmd_tx, cmd_rx) = command_channel();
        let (res_tx, mut res_rx) = mpsc::channel(8);
        let executor = CommandExecutor::new(exchange, cmd_rx, res_tx);
        tokio::spawn(executor.run());

        let plan_id = Uuid::new_v4();
        cmd_tx
            .send(Command {
                plan_id,
                kind: CommandKind::CancelHedge { order_id: acked.order_id },
                timeout_budget: Duration::from_secs(1),
            })
            .await
            .unwrap();

        let result = res_rx.recv().await.unwrap();
        assert!(matches!(result.outcome, CommandOutcome::CancelAcked));
    }
}
