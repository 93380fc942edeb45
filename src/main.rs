//! chain-sniper - multi-chain new-pool sniper
//!
//! Watches Solana and EVM DEXes for new pools and trades them behind a risk gate.

use anyhow::Result;

use chain_sniper::adapters::cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (secrets go here, not in the config file)
    dotenvy::dotenv().ok();

    let app = cli::init();
    cli::execute(app).await
}
