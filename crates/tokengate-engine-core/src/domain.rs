use std::fmt;

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimestampMs(pub u64);

impl TimestampMs {
    pub fn saturating_add_ms(self, ms: u64) -> Self {
        Self(self.0.saturating_add(ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    Evm,
    Tron,
}

impl ProviderKind {
    /// Base-unit exponent of the native coin (wei for EVM chains, sun for Tron).
    pub fn native_exponent(self) -> u8 {
        match self {
            ProviderKind::Evm => 18,
            ProviderKind::Tron => 6,
        }
    }

    pub fn native_symbol(self) -> &'static str {
        match self {
            ProviderKind::Evm => "ETH",
            ProviderKind::Tron => "TRX",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Evm => write!(f, "evm"),
            ProviderKind::Tron => write!(f, "tron"),
        }
    }
}

/// Wallet or contract address in the backend's native encoding
/// (0x-hex for EVM, base58check for Tron). The engine treats it as opaque;
/// adapters validate per kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountAddress(String);

impl AccountAddress {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountAddress {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

/// Snapshot of an injected provider taken by the probe. Immutable once
/// captured for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderHandle {
    pub kind: ProviderKind,
    pub ready: bool,
    pub native_address: Option<AccountAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub address: AccountAddress,
    pub chain_id: u64,
    pub kind: ProviderKind,
    pub connected_at: TimestampMs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDescriptor {
    pub contract_address: AccountAddress,
    pub decimals: u8,
    pub symbol: String,
    pub name: String,
}

/// Allowance as read from the chain. Never cached: re-read immediately
/// before any decision that depends on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceSnapshot {
    pub owner: AccountAddress,
    pub spender: AccountAddress,
    pub raw_amount: U256,
    pub observed_at: TimestampMs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalAmount {
    Limited(U256),
    Unlimited,
}

impl ApprovalAmount {
    pub fn raw(self) -> U256 {
        match self {
            ApprovalAmount::Limited(raw) => raw,
            ApprovalAmount::Unlimited => U256::MAX,
        }
    }

    pub fn is_unlimited(self) -> bool {
        matches!(self, ApprovalAmount::Unlimited)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub token: AccountAddress,
    pub spender: AccountAddress,
    pub amount: ApprovalAmount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub tx_id: String,
    pub submitted_at: TimestampMs,
    pub status: TxStatus,
    pub fee_consumed: Option<U256>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// Append-only log line consumed by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowLogEntry {
    pub at: TimestampMs,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("malformed decimal amount: {0}")]
    Malformed(String),
    #[error("fraction has more than {0} digits")]
    ExcessPrecision(u8),
    #[error("amount exceeds 256 bits")]
    Overflow,
}

fn pow10(decimals: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals as u64))
}

/// Renders raw base units as a decimal string with exactly `decimals`
/// fractional digits. Integer arithmetic only; a one-base-unit balance of a
/// six-decimal token prints as "0.000001", never as zero.
pub fn format_base_units(raw: U256, decimals: u8) -> String {
    if decimals == 0 {
        return raw.to_string();
    }
    let divisor = pow10(decimals);
    let whole = raw / divisor;
    let frac = (raw % divisor).to_string();
    format!("{whole}.{frac:0>width$}", width = decimals as usize)
}

/// Parses a decimal string back into base units. Inverse of
/// [`format_base_units`] for any value it produced.
pub fn parse_base_units(text: &str, decimals: u8) -> Result<U256, AmountError> {
    let (whole_text, frac_text) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text, ""),
    };
    if whole_text.is_empty() && frac_text.is_empty() {
        return Err(AmountError::Malformed(text.to_owned()));
    }
    if frac_text.len() > decimals as usize {
        return Err(AmountError::ExcessPrecision(decimals));
    }

    let whole = if whole_text.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(whole_text, 10)
            .map_err(|_| AmountError::Malformed(text.to_owned()))?
    };
    let mut frac = U256::ZERO;
    if !frac_text.is_empty() {
        frac = U256::from_str_radix(frac_text, 10)
            .map_err(|_| AmountError::Malformed(text.to_owned()))?;
        for _ in frac_text.len()..decimals as usize {
            frac = frac
                .checked_mul(U256::from(10u64))
                .ok_or(AmountError::Overflow)?;
        }
    }

    whole
        .checked_mul(pow10(decimals))
        .and_then(|scaled| scaled.checked_add(frac))
        .ok_or(AmountError::Overflow)
}
