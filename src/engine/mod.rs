pub mod executor;
pub mod flatten;
pub mod queues;
pub mod risk;
pub mod strategy_loop;
pub mod supplement;
pub mod trigger;

pub use executor::{Command, CommandExecutor, CommandKind, CommandOutcome, CommandResult};
pub use flatten::{FlattenConfig, FlattenGuard};
pub use queues::PriceCoalescer;
pub use risk::{RiskBrain, RiskConfig, RiskVerdict};
pub use strategy_loop::StrategyLoop;
pub use supplement::{SupplementConfig, SupplementEngine};
pub use trigger::{GridTrigger, TriggerSpeed, VelocityConfig, VelocityTrigger};
