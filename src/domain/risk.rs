//! Token Risk Scoring
//!
//! Pure scoring of a freshly listed token from on-chain contract facts and
//! pool liquidity. Produces a score in [0, 1] where 0 is safest.
//!
//! - Contract checks (weight 0.6): verified code, balance floor, code size
//! - Liquidity depth (weight 0.4): tiered thresholds
//!
//! Fetching the facts lives in the application layer; anything that could
//! not be fetched must be scored as `MAX_RISK` by the caller.

use serde::{Deserialize, Serialize};

/// Score assigned when facts are missing or unreadable
pub const MAX_RISK: f64 = 1.0;

/// Weight of the contract-level checks
pub const CONTRACT_WEIGHT: f64 = 0.6;

/// Weight of the liquidity-depth checks
pub const LIQUIDITY_WEIGHT: f64 = 0.4;

/// Default liquidity tier boundaries (native units)
pub const DEFAULT_LOW_LIQUIDITY: f64 = 1_000.0;
pub const DEFAULT_HIGH_LIQUIDITY: f64 = 10_000.0;

/// Penalties applied by the contract checks
pub const UNVERIFIED_PENALTY: f64 = 0.3;
pub const LOW_BALANCE_PENALTY: f64 = 0.3;
pub const SMALL_CODE_PENALTY: f64 = 0.4;

/// What the chain told us about the token's account/contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractFacts {
    /// Executable program, token-program owned mint, or deployed EVM code
    pub verified_code: bool,
    /// Account balance in base units
    pub balance: u128,
    /// Account data / bytecode length
    pub code_size: usize,
}

/// A single check that contributed to the score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    pub penalty: f64,
    pub description: String,
}

/// Detailed scoring result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: f64,
    pub contract_score: f64,
    pub liquidity_score: f64,
    pub factors: Vec<RiskFactor>,
}

impl RiskAssessment {
    /// Assessment for a token whose state could not be read
    pub fn fail_closed(reason: impl Into<String>) -> Self {
        Self {
            score: MAX_RISK,
            contract_score: MAX_RISK,
            liquidity_score: MAX_RISK,
            factors: vec![RiskFactor {
                name: "Unreadable state".to_string(),
                penalty: MAX_RISK,
                description: reason.into(),
            }],
        }
    }
}

/// Thresholds for scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScorer {
    /// Balance floor in base units (rent / storage)
    pub min_account_balance: u128,
    /// Smallest plausible code/data size in bytes
    pub min_code_size: usize,
    pub low_liquidity: f64,
    pub high_liquidity: f64,
}

impl Default for RiskScorer {
    fn default() -> Self {
        Self {
            min_account_balance: 1_000_000,
            min_code_size: 100,
            low_liquidity: DEFAULT_LOW_LIQUIDITY,
            high_liquidity: DEFAULT_HIGH_LIQUIDITY,
        }
    }
}

impl RiskScorer {
    pub fn new(min_account_balance: u128, min_code_size: usize) -> Self {
        Self {
            min_account_balance,
            min_code_size,
            ..Default::default()
        }
    }

    pub fn with_liquidity_tiers(mut self, low: f64, high: f64) -> Self {
        self.low_liquidity = low;
        self.high_liquidity = high;
        self
    }

    /// Contract-level score. `None` means the account does not exist.
    pub fn contract_score(&self, facts: Option<&ContractFacts>, factors: &mut Vec<RiskFactor>) -> f64 {
        let facts = match facts {
            Some(f) => f,
            None => {
                factors.push(RiskFactor {
                    name: "Missing account".to_string(),
                    penalty: MAX_RISK,
                    description: "Token account does not exist".to_string(),
                });
                return MAX_RISK;
            }
        };

        let mut score = 0.0;

        if !facts.verified_code {
            score += UNVERIFIED_PENALTY;
            factors.push(RiskFactor {
                name: "Unverified code".to_string(),
                penalty: UNVERIFIED_PENALTY,
                description: "Account is neither executable nor owned by a known token program".to_string(),
            });
        }

        if facts.balance < self.min_account_balance {
            score += LOW_BALANCE_PENALTY;
            factors.push(RiskFactor {
                name: "Low balance".to_string(),
                penalty: LOW_BALANCE_PENALTY,
                description: format!(
                    "Account holds {} base units, floor is {}",
                    facts.balance, self.min_account_balance
                ),
            });
        }

        if facts.code_size < self.min_code_size {
            score += SMALL_CODE_PENALTY;
            factors.push(RiskFactor {
                name: "Small code".to_string(),
                penalty: SMALL_CODE_PENALTY,
                description: format!(
                    "Code/data is {} bytes, minimum plausible is {}",
                    facts.code_size, self.min_code_size
                ),
            });
        }

        f64::min(score, MAX_RISK)
    }

    /// Liquidity-depth score
    pub fn liquidity_score(&self, liquidity: f64) -> f64 {
        if !liquidity.is_finite() || liquidity <= 0.0 {
            MAX_RISK
        } else if liquidity < self.low_liquidity {
            0.8
        } else if liquidity < self.high_liquidity {
            0.5
        } else {
            0.2
        }
    }

    /// Weighted combination of both checks
    pub fn assess(&self, facts: Option<&ContractFacts>, liquidity: f64) -> RiskAssessment {
        let mut factors = Vec::new();
        let contract_score = self.contract_score(facts, &mut factors);
        let liquidity_score = self.liquidity_score(liquidity);

        if liquidity_score > 0.2 {
            factors.push(RiskFactor {
                name: "Shallow liquidity".to_string(),
                penalty: liquidity_score,
                description: format!("Pool liquidity is {:.4}", liquidity),
            });
        }

        let score = (CONTRACT_WEIGHT * contract_score + LIQUIDITY_WEIGHT * liquidity_score)
            .clamp(0.0, MAX_RISK);

        RiskAssessment {
            score,
            contract_score,
            liquidity_score,
            factors,
        }
    }
}
