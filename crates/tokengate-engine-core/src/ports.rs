use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::FeeOptions;
use crate::domain::{AccountAddress, ProviderHandle, ProviderKind};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no wallet provider injected into the host environment")]
    ProviderNotFound,
    #[error("wallet provider is present but not ready")]
    ProviderNotReady,
    #[error("user rejected the wallet prompt")]
    UserRejected,
    #[error("provider exposed no accounts")]
    NoAccounts,
    #[error("wrong network: expected chain {expected}, provider reports {actual}")]
    NetworkMismatch { expected: u64, actual: u64 },
    #[error("insufficient fee resources: {0}")]
    InsufficientResources(String),
    #[error("broadcast rejected by node: {0}")]
    Broadcast(String),
    #[error("read failed: {0}")]
    Read(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("no live session")]
    NoSession,
    #[error("session changed since the run was prepared")]
    StaleSession,
    #[error("approval workflow already in progress")]
    RunInFlight,
    #[error("illegal workflow transition: {0}")]
    IllegalTransition(String),
    #[error("port not implemented: {0}")]
    NotImplemented(&'static str),
}

/// Account context returned by a successful provider connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedAccount {
    pub address: AccountAddress,
    pub chain_id: u64,
}

/// One non-blocking status check of a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxProbe {
    Pending,
    Confirmed { fee_consumed: Option<U256> },
    Failed { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderEventKind {
    AccountsChanged,
    ChainChanged,
}

/// Raw provider-surface event captured by an adapter, drained by the driver
/// and translated into `WorkflowEngine::on_accounts_changed` /
/// `on_chain_changed` calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub sequence: u64,
    pub kind: ProviderEventKind,
    pub value: String,
}

/// Uniform interface over one wallet backend. Both the EVM-style and the
/// Tron-style adapters implement the same five chain operations so the
/// workflow never branches on provider shape.
pub trait ChainClientPort {
    fn kind(&self) -> ProviderKind;

    /// Requests account access and reads the active chain id.
    fn connect(&self) -> Result<ConnectedAccount, EngineError>;

    /// Native-coin balance in base units (wei / sun).
    fn native_balance(&self, address: &AccountAddress) -> Result<U256, EngineError>;

    /// Read-only contract call.
    fn call(
        &self,
        contract: &AccountAddress,
        method: &str,
        args: &[Value],
    ) -> Result<Value, EngineError>;

    /// State-changing contract call. Returns the transaction id immediately
    /// after broadcast; confirmation is the poller's job.
    fn send(
        &self,
        contract: &AccountAddress,
        method: &str,
        args: &[Value],
        fee: &FeeOptions,
    ) -> Result<String, EngineError>;

    fn transaction_status(&self, tx_id: &str) -> Result<TxProbe, EngineError>;

    fn sign_message(
        &self,
        address: &AccountAddress,
        message: &str,
    ) -> Result<String, EngineError>;

    fn drain_events(&self) -> Result<Vec<ProviderEvent>, EngineError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostProfile {
    pub mobile: bool,
    pub user_agent: Option<String>,
}

/// The probe's view of the host environment's injected-provider slots.
pub trait HostPort {
    fn probe_once(&self) -> Result<Option<ProviderHandle>, EngineError>;
    fn profile(&self) -> Result<HostProfile, EngineError>;
}

pub trait ClockPort {
    fn now_ms(&self) -> Result<u64, EngineError>;
}
