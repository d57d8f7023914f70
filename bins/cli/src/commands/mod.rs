//! CLI command handlers.

pub mod config;
pub mod info;
pub mod init;
pub mod run;

pub use config::{run_config_show, run_config_validate};
pub use info::run_info;
pub use init::run_config_init;
pub use run::{RunCommandInput, run_sync};
