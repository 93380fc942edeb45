//! Configuration Module
//!
//! Loads and validates configuration from TOML files.

pub mod builtin;
pub mod loader;

pub use builtin::{builtin_chain, BuiltinChain, BUILTIN_CHAINS};
pub use loader::{
    expand_path, load_config, ChainSection, Config, ConfigError, DexSection, EngineSection, LedgerSection,
    LoggingSection, RiskSection, WalletsSection,
};
