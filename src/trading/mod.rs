//! Trading layer: risk policy, position sizing, and order/exit management.

pub mod config;
pub mod execution;
pub mod risk;

pub use config::{ExecutionConfig, RiskConfig, StopParams};
pub use execution::{CloseEvent, ExecutionEngine, ExecutionReport};
pub use risk::{EntryValidation, RiskManager};
