//! CLI command handlers.

pub mod config;
pub mod info;
pub mod simulate;

pub use config::{run_config_schema, run_config_show, run_config_validate};
pub use info::run_info;
pub use simulate::{SimulateInput, run_simulate};
