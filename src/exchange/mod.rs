mod dry_run;
mod traits;

pub use dry_run::DryRunExchange;
pub use traits::{AckedOrder, ExchangeClient, OrderUpdate, TopOfBook};
