//! CLI Adapter
//!
//! Command-line interface for the chain sniper.
//! Uses clap derive macros for argument parsing.

mod commands;

pub use commands::{
    BalancesCmd, CliApp, Command, CreateWalletCmd, PositionsCmd, RunCmd, SweepsCmd, DEFAULT_CONFIG_PATH,
};

use anyhow::Result;

/// Initialize the CLI application
pub fn init() -> CliApp {
    use clap::Parser;
    CliApp::parse()
}

/// Execute the CLI command
pub async fn execute(app: CliApp) -> Result<()> {
    commands::execute(app).await
}
