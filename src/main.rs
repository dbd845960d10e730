use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use paired_hedge_engine::cli::{Cli, Commands};
use paired_hedge_engine::config::AppConfig;
use paired_hedge_engine::domain::Market;
use paired_hedge_engine::engine::executor::{command_channel, CommandExecutor};
use paired_hedge_engine::engine::{PriceCoalescer, StrategyLoop};
use paired_hedge_engine::exchange::{DryRunExchange, ExchangeClient};
use paired_hedge_engine::{logging, supervisor};
use tokio::sync::mpsc;
use tracing::{error, info};

fn load_config(cli: &Cli) -> AppConfig {
    let mut config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    if cli.dry_run {
        config.dry_run = true;
    }
    config
}

fn validate_or_exit(config: &AppConfig) {
    if let Err(errors) = config.validate() {
        eprintln!("configuration is invalid:");
        for e in &errors {
            eprintln!("  - {e}");
        }
        std::process::exit(1);
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.quiet {
        logging::init_logging_simple();
    } else {
        logging::init_logging(cli.log_dir.as_deref());
    }

    match &cli.command {
        Commands::ValidateConfig => {
            let config = load_config(&cli);
            validate_or_exit(&config);
            info!("configuration is valid");
        }
        Commands::Run { market } => {
            let config = load_config(&cli);
            validate_or_exit(&config);
            run(config, market.clone()).await;
        }
    }
}

async fn run(config: AppConfig, market_slug: String) {
    let now = Utc::now();
    let market = Market {
        slug: market_slug.clone(),
        condition_id: format!("{market_slug}-condition"),
        up_token_id: format!("{market_slug}-up"),
        down_token_id: format!("{market_slug}-down"),
        start_time: now,
        end_time: now + chrono::Duration::seconds(900),
    };

    let (order_update_tx, order_update_rx) = mpsc::unbounded_channel();
    let (order_update_tx_bounded, order_update_rx_bounded) =
        mpsc::channel(paired_hedge_engine::engine::queues::ORDER_UPDATE_QUEUE_CAPACITY);
    // The exchange trait speaks in unbounded updates (it never blocks a
    // fill callback on backpressure); bridge it onto the loop's bounded
    // inbound channel so a slow loop degrades by dropping, per §4.1.
    tokio::spawn(bridge_order_updates(order_update_rx, order_update_tx_bounded));

    let exchange: Arc<dyn ExchangeClient> = Arc::new(DryRunExchange::new(order_update_tx, Duration::from_millis(400)));

    let (command_tx, command_rx) = command_channel();
    let (result_tx, result_rx) = mpsc::channel(paired_hedge_engine::engine::queues::COMMAND_RESULT_QUEUE_CAPACITY);

    let executor = CommandExecutor::new(exchange.clone(), command_rx, result_tx);
    tokio::spawn(executor.run());

    let price_coalescer = Arc::new(PriceCoalescer::new());

    let mut strategy_loop = StrategyLoop::new(
        market,
        config,
        price_coalescer,
        order_update_rx_bounded,
        result_rx,
        command_tx,
    );

    info!(market = %market_slug, "starting strategy loop");
    if let Err(e) = supervisor::run_supervised(strategy_loop.run(), Duration::from_secs(10)).await {
        error!(error = %e, "supervisor exited with error");
        std::process::exit(1);
    }
}

async fn bridge_order_updates(
    mut unbounded_rx: mpsc::UnboundedReceiver<paired_hedge_engine::exchange::OrderUpdate>,
    bounded_tx: mpsc::Sender<paired_hedge_engine::exchange::OrderUpdate>,
) {
    while let Some(update) = unbounded_rx.recv().await {
        if bounded_tx.try_send(update).is_err() {
            tracing::warn!("order update queue saturated, dropping oldest-pending update");
        }
    }
}
