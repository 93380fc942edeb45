//! Risk Analyzer
//!
//! Fetches the token's account / contract state and scores it with
//! `RiskScorer`. Fails closed: any RPC error scores the maximum risk.
//! Results are never cached.

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapters::solana::instructions::is_token_program;
use crate::domain::chain::{ChainFamily, ChainRegistry};
use crate::domain::risk::{ContractFacts, RiskAssessment, RiskScorer, DEFAULT_HIGH_LIQUIDITY, DEFAULT_LOW_LIQUIDITY};
use crate::ports::chain::{AccountSnapshot, ChainClient};

/// Smallest plausible SPL mint account
pub const SOLANA_MIN_CODE_SIZE: usize = 82;

/// Smallest plausible ERC-20 bytecode
pub const EVM_MIN_CODE_SIZE: usize = 100;

/// Liquidity tiers in whole native units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiquidityTiers {
    pub low: f64,
    pub high: f64,
}

impl Default for LiquidityTiers {
    fn default() -> Self {
        Self {
            low: DEFAULT_LOW_LIQUIDITY,
            high: DEFAULT_HIGH_LIQUIDITY,
        }
    }
}

pub fn min_code_size(family: ChainFamily) -> usize {
    match family {
        ChainFamily::Solana => SOLANA_MIN_CODE_SIZE,
        ChainFamily::Evm => EVM_MIN_CODE_SIZE,
    }
}

/// Whether the account looks like real token code for its chain family
fn contract_facts(family: ChainFamily, account: &AccountSnapshot) -> ContractFacts {
    let verified_code = match family {
        ChainFamily::Solana => {
            account.executable || account.owner.as_deref().is_some_and(is_token_program)
        }
        ChainFamily::Evm => account.executable && !account.data.is_empty(),
    };
    ContractFacts {
        verified_code,
        balance: account.balance,
        code_size: account.data_len(),
    }
}

pub struct RiskAnalyzer {
    registry: Arc<ChainRegistry>,
    clients: HashMap<String, Arc<dyn ChainClient>>,
    tiers: LiquidityTiers,
}

impl RiskAnalyzer {
    pub fn new(
        registry: Arc<ChainRegistry>,
        clients: HashMap<String, Arc<dyn ChainClient>>,
        tiers: LiquidityTiers,
    ) -> Self {
        Self {
            registry,
            clients,
            tiers,
        }
    }

    /// Risk score in `[0, 1]` for a token on a chain
    pub async fn analyze(&self, token_address: &str, chain_id: &str, liquidity: f64) -> f64 {
        self.assess(token_address, chain_id, liquidity).await.score
    }

    /// Full assessment with the contributing factors
    pub async fn assess(&self, token_address: &str, chain_id: &str, liquidity: f64) -> RiskAssessment {
        let chain = match self.registry.get_chain(chain_id) {
            Ok(chain) => chain,
            Err(e) => return RiskAssessment::fail_closed(e.to_string()),
        };
        let client = match self.clients.get(chain_id) {
            Some(client) => client,
            None => return RiskAssessment::fail_closed(format!("no client for {}", chain_id)),
        };

        let account = match client.get_account(token_address).await {
            Ok(account) => account,
            Err(e) => {
                tracing::warn!(
                    "Risk check for {} on {} failed, scoring as max risk: {}",
                    token_address,
                    chain_id,
                    e
                );
                return RiskAssessment::fail_closed(e.to_string());
            }
        };

        let scorer = RiskScorer::new(chain.min_account_balance, min_code_size(chain.family))
            .with_liquidity_tiers(self.tiers.low, self.tiers.high);
        let facts = account.as_ref().map(|a| contract_facts(chain.family, a));
        let assessment = scorer.assess(facts.as_ref(), liquidity);

        tracing::debug!(
            "Risk {} on {}: {:.2} (contract {:.2}, liquidity {:.2}, {} factors)",
            token_address,
            chain_id,
            assessment.score,
            assessment.contract_score,
            assessment.liquidity_score,
            assessment.factors.len()
        );
        assessment
    }
}
