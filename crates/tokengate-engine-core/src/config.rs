use serde::{Deserialize, Serialize};

use crate::domain::{AccountAddress, ApprovalAmount};

/// Fee knobs passed through to the backend on every send. EVM backends read
/// `gas_limit`; Tron backends read `fee_limit` (sun).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeOptions {
    pub gas_limit: Option<u64>,
    pub fee_limit: Option<u64>,
}

impl Default for FeeOptions {
    fn default() -> Self {
        Self {
            gas_limit: None,
            fee_limit: Some(100_000_000),
        }
    }
}

/// Everything the engine treats as deployment configuration rather than
/// code: target token, spender, amounts, timing, and chain policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub token_contract: AccountAddress,
    pub spender: AccountAddress,
    pub default_amount: ApprovalAmount,
    pub fee: FeeOptions,
    pub probe_interval_ms: u64,
    pub probe_max_attempts: u32,
    pub poll_interval_ms: u64,
    pub poll_max_attempts: u32,
    /// Deep link offered (not followed) when a mobile user agent has no
    /// injected provider.
    pub deep_link_template: Option<String>,
    pub expected_chain_id: Option<u64>,
    /// When false a chain mismatch is logged as a warning and connect
    /// proceeds; when true it fails the connect.
    pub enforce_expected_chain: bool,
}

impl EngineConfig {
    pub fn for_token(token_contract: AccountAddress, spender: AccountAddress) -> Self {
        Self {
            token_contract,
            spender,
            ..Self::default()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            token_contract: AccountAddress::new("0x0000000000000000000000000000000000000000"),
            spender: AccountAddress::new("0x0000000000000000000000000000000000000000"),
            default_amount: ApprovalAmount::Unlimited,
            fee: FeeOptions::default(),
            probe_interval_ms: 800,
            probe_max_attempts: 15,
            poll_interval_ms: 2_000,
            poll_max_attempts: 30,
            deep_link_template: None,
            expected_chain_id: None,
            enforce_expected_chain: false,
        }
    }
}
