pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod logging;
pub mod supervisor;

pub use config::AppConfig;
pub use error::{EngineError, OrderError, Result};
