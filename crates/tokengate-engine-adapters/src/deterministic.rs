//! In-memory chain used when no real provider surface is configured, and by
//! the test suites. One scripted token contract, scripted failures, and a
//! transaction ledger whose confirmation timing is controlled by the caller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::{keccak256, U256};
use serde_json::Value;

use tokengate_engine_core::{
    AccountAddress, ConnectedAccount, EngineError, FeeOptions, ProviderEvent, ProviderEventKind,
    ProviderKind, TxProbe,
};

/// Failure injected at the next matching operation. Stays armed until
/// cleared so retry behavior can be scripted too.
#[derive(Debug, Clone)]
pub enum ScriptedFailure {
    UserRejected,
    NoAccounts,
    NotReady,
    InsufficientResources(String),
    Broadcast(String),
    Transport(String),
}

impl ScriptedFailure {
    fn to_error(&self) -> EngineError {
        match self {
            ScriptedFailure::UserRejected => EngineError::UserRejected,
            ScriptedFailure::NoAccounts => EngineError::NoAccounts,
            ScriptedFailure::NotReady => EngineError::ProviderNotReady,
            ScriptedFailure::InsufficientResources(detail) => {
                EngineError::InsufficientResources(detail.clone())
            }
            ScriptedFailure::Broadcast(detail) => EngineError::Broadcast(detail.clone()),
            ScriptedFailure::Transport(detail) => EngineError::Transport(detail.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SentCall {
    pub contract: AccountAddress,
    pub method: String,
    pub args: Vec<Value>,
}

#[derive(Debug)]
struct SimTx {
    checks: u32,
}

#[derive(Debug)]
struct SimState {
    kind: ProviderKind,
    accounts: Vec<AccountAddress>,
    chain_id: u64,
    native_balances: HashMap<String, U256>,
    token_decimals: u8,
    token_symbol: Option<String>,
    token_name: Option<String>,
    balances: HashMap<String, U256>,
    allowances: HashMap<(String, String), U256>,
    connect_failure: Option<ScriptedFailure>,
    send_failure: Option<ScriptedFailure>,
    fail_decimals_read: bool,
    fail_balance_read: bool,
    fail_allowance_read: bool,
    /// Status checks a transaction stays pending for before confirming;
    /// `u32::MAX` never confirms.
    confirm_after_checks: u32,
    chain_failure_reason: Option<String>,
    fee_per_tx: Option<U256>,
    txs: HashMap<String, SimTx>,
    sent: Vec<SentCall>,
    read_log: Vec<String>,
    status_checks: u64,
    connect_count: u64,
    next_tx: u64,
    events: Vec<ProviderEvent>,
    event_seq: u64,
}

#[derive(Debug, Clone)]
pub struct DeterministicChain {
    state: Arc<Mutex<SimState>>,
}

impl DeterministicChain {
    pub fn new(kind: ProviderKind, chain_id: u64, account: AccountAddress) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                kind,
                accounts: vec![account],
                chain_id,
                native_balances: HashMap::new(),
                token_decimals: 6,
                token_symbol: Some("USDT".to_owned()),
                token_name: Some("Tether USD".to_owned()),
                balances: HashMap::new(),
                allowances: HashMap::new(),
                connect_failure: None,
                send_failure: None,
                fail_decimals_read: false,
                fail_balance_read: false,
                fail_allowance_read: false,
                confirm_after_checks: 1,
                chain_failure_reason: None,
                fee_per_tx: None,
                txs: HashMap::new(),
                sent: Vec::new(),
                read_log: Vec::new(),
                status_checks: 0,
                connect_count: 0,
                next_tx: 0,
                events: Vec::new(),
                event_seq: 0,
            })),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, SimState>, EngineError> {
        self.state
            .lock()
            .map_err(|e| EngineError::Transport(format!("deterministic chain lock poisoned: {e}")))
    }

    fn lock_scripting(&self) -> MutexGuard<'_, SimState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ---- scripting surface -------------------------------------------------

    pub fn set_connect_failure(&self, failure: Option<ScriptedFailure>) {
        self.lock_scripting().connect_failure = failure;
    }

    pub fn set_send_failure(&self, failure: Option<ScriptedFailure>) {
        self.lock_scripting().send_failure = failure;
    }

    pub fn set_token(&self, decimals: u8, symbol: Option<&str>, name: Option<&str>) {
        let mut g = self.lock_scripting();
        g.token_decimals = decimals;
        g.token_symbol = symbol.map(str::to_owned);
        g.token_name = name.map(str::to_owned);
    }

    pub fn fail_decimals_read(&self, fail: bool) {
        self.lock_scripting().fail_decimals_read = fail;
    }

    pub fn fail_balance_read(&self, fail: bool) {
        self.lock_scripting().fail_balance_read = fail;
    }

    pub fn fail_allowance_read(&self, fail: bool) {
        self.lock_scripting().fail_allowance_read = fail;
    }

    pub fn set_confirm_after_checks(&self, checks: u32) {
        self.lock_scripting().confirm_after_checks = checks;
    }

    pub fn fail_on_chain(&self, reason: Option<&str>) {
        self.lock_scripting().chain_failure_reason = reason.map(str::to_owned);
    }

    pub fn set_fee_per_tx(&self, fee: Option<U256>) {
        self.lock_scripting().fee_per_tx = fee;
    }

    pub fn fund_native(&self, address: &AccountAddress, raw: U256) {
        self.lock_scripting()
            .native_balances
            .insert(address.to_string(), raw);
    }

    pub fn fund_token(&self, owner: &AccountAddress, raw: U256) {
        self.lock_scripting().balances.insert(owner.to_string(), raw);
    }

    pub fn set_allowance(&self, owner: &AccountAddress, spender: &AccountAddress, raw: U256) {
        self.lock_scripting()
            .allowances
            .insert((owner.to_string(), spender.to_string()), raw);
    }

    pub fn allowance(&self, owner: &AccountAddress, spender: &AccountAddress) -> U256 {
        self.lock_scripting()
            .allowances
            .get(&(owner.to_string(), spender.to_string()))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    pub fn send_count(&self) -> usize {
        self.lock_scripting().sent.len()
    }

    pub fn sent_calls(&self) -> Vec<SentCall> {
        self.lock_scripting().sent.clone()
    }

    pub fn read_log(&self) -> Vec<String> {
        self.lock_scripting().read_log.clone()
    }

    pub fn status_check_count(&self) -> u64 {
        self.lock_scripting().status_checks
    }

    pub fn connect_count(&self) -> u64 {
        self.lock_scripting().connect_count
    }

    pub fn inject_accounts_changed(&self, accounts: Vec<AccountAddress>) {
        let mut g = self.lock_scripting();
        let payload = serde_json::json!(accounts.iter().map(|a| a.to_string()).collect::<Vec<_>>())
            .to_string();
        g.accounts = accounts;
        push_event(&mut g, ProviderEventKind::AccountsChanged, payload);
    }

    pub fn inject_chain_changed(&self, chain_id: u64) {
        let mut g = self.lock_scripting();
        g.chain_id = chain_id;
        push_event(&mut g, ProviderEventKind::ChainChanged, chain_id.to_string());
    }

    // ---- chain surface -----------------------------------------------------

    pub fn connect(&self) -> Result<ConnectedAccount, EngineError> {
        let mut g = self.lock()?;
        g.connect_count += 1;
        if let Some(failure) = &g.connect_failure {
            return Err(failure.to_error());
        }
        let address = g.accounts.first().cloned().ok_or(EngineError::NoAccounts)?;
        Ok(ConnectedAccount {
            address,
            chain_id: g.chain_id,
        })
    }

    pub fn native_balance(&self, address: &AccountAddress) -> Result<U256, EngineError> {
        let g = self.lock()?;
        Ok(g.native_balances
            .get(address.as_str())
            .copied()
            .unwrap_or(U256::ZERO))
    }

    pub fn call(
        &self,
        _contract: &AccountAddress,
        method: &str,
        args: &[Value],
    ) -> Result<Value, EngineError> {
        let mut g = self.lock()?;
        g.read_log.push(method.to_owned());
        match method {
            "decimals" => {
                if g.fail_decimals_read {
                    return Err(EngineError::Read("decimals call reverted".to_owned()));
                }
                Ok(Value::from(g.token_decimals))
            }
            "symbol" => g
                .token_symbol
                .clone()
                .map(Value::String)
                .ok_or_else(|| EngineError::Read("symbol not implemented".to_owned())),
            "name" => g
                .token_name
                .clone()
                .map(Value::String)
                .ok_or_else(|| EngineError::Read("name not implemented".to_owned())),
            "balanceOf" => {
                if g.fail_balance_read {
                    return Err(EngineError::Read("balanceOf call reverted".to_owned()));
                }
                let owner = string_arg(args, 0)?;
                let raw = g.balances.get(&owner).copied().unwrap_or(U256::ZERO);
                Ok(Value::String(raw.to_string()))
            }
            "allowance" => {
                if g.fail_allowance_read {
                    return Err(EngineError::Read("allowance call reverted".to_owned()));
                }
                let owner = string_arg(args, 0)?;
                let spender = string_arg(args, 1)?;
                let raw = g
                    .allowances
                    .get(&(owner, spender))
                    .copied()
                    .unwrap_or(U256::ZERO);
                Ok(Value::String(raw.to_string()))
            }
            other => Err(EngineError::Validation(format!(
                "method not in the token fragment: {other}"
            ))),
        }
    }

    pub fn send(
        &self,
        contract: &AccountAddress,
        method: &str,
        args: &[Value],
        _fee: &FeeOptions,
    ) -> Result<String, EngineError> {
        let mut g = self.lock()?;
        if let Some(failure) = &g.send_failure {
            return Err(failure.to_error());
        }
        if method != "approve" {
            return Err(EngineError::Validation(format!(
                "method not in the token fragment: {method}"
            )));
        }
        let owner = g
            .accounts
            .first()
            .cloned()
            .ok_or(EngineError::NoAccounts)?;
        let spender = string_arg(args, 0)?;
        let amount = string_arg(args, 1)?;
        let raw = U256::from_str_radix(&amount, 10)
            .map_err(|e| EngineError::Validation(format!("invalid approve amount: {e}")))?;
        g.allowances.insert((owner.to_string(), spender), raw);

        g.next_tx += 1;
        let tx_id = format!("0x{:064x}", g.next_tx);
        g.txs.insert(tx_id.clone(), SimTx { checks: 0 });
        g.sent.push(SentCall {
            contract: contract.clone(),
            method: method.to_owned(),
            args: args.to_vec(),
        });
        Ok(tx_id)
    }

    pub fn transaction_status(&self, tx_id: &str) -> Result<TxProbe, EngineError> {
        let mut g = self.lock()?;
        g.status_checks += 1;
        let confirm_after = g.confirm_after_checks;
        let failure = g.chain_failure_reason.clone();
        let fee = g.fee_per_tx;
        let tx = g
            .txs
            .get_mut(tx_id)
            .ok_or_else(|| EngineError::Read(format!("unknown transaction: {tx_id}")))?;
        tx.checks += 1;
        if let Some(reason) = failure {
            return Ok(TxProbe::Failed { reason });
        }
        if tx.checks >= confirm_after {
            Ok(TxProbe::Confirmed { fee_consumed: fee })
        } else {
            Ok(TxProbe::Pending)
        }
    }

    pub fn sign_message(
        &self,
        address: &AccountAddress,
        message: &str,
    ) -> Result<String, EngineError> {
        let g = self.lock()?;
        if !g.accounts.iter().any(|a| a == address) {
            return Err(EngineError::NoAccounts);
        }
        // Stable fake signature: 64 bytes of keccak material plus a v byte.
        let mut seed = Vec::new();
        seed.extend_from_slice(address.as_str().as_bytes());
        seed.extend_from_slice(message.as_bytes());
        let hash = keccak256(seed);
        let mut sig = Vec::with_capacity(65);
        sig.extend_from_slice(hash.as_slice());
        sig.extend_from_slice(hash.as_slice());
        sig.push(27);
        Ok(format!("0x{}", alloy::hex::encode(sig)))
    }

    pub fn drain_events(&self) -> Result<Vec<ProviderEvent>, EngineError> {
        let mut g = self.lock()?;
        Ok(std::mem::take(&mut g.events))
    }

    pub fn kind(&self) -> ProviderKind {
        self.lock_scripting().kind
    }

    pub fn update_accounts(&self, accounts: Vec<AccountAddress>) -> Result<(), EngineError> {
        let mut g = self.lock()?;
        if g.accounts != accounts {
            let payload =
                serde_json::json!(accounts.iter().map(|a| a.to_string()).collect::<Vec<_>>())
                    .to_string();
            g.accounts = accounts;
            push_event(&mut g, ProviderEventKind::AccountsChanged, payload);
        }
        Ok(())
    }

    pub fn update_chain(&self, chain_id: u64) -> Result<(), EngineError> {
        let mut g = self.lock()?;
        if g.chain_id != chain_id {
            g.chain_id = chain_id;
            push_event(&mut g, ProviderEventKind::ChainChanged, chain_id.to_string());
        }
        Ok(())
    }

    pub fn first_account(&self) -> Option<AccountAddress> {
        self.lock_scripting().accounts.first().cloned()
    }
}

fn push_event(state: &mut SimState, kind: ProviderEventKind, value: String) {
    state.event_seq += 1;
    let sequence = state.event_seq;
    state.events.push(ProviderEvent {
        sequence,
        kind,
        value,
    });
}

fn string_arg(args: &[Value], index: usize) -> Result<String, EngineError> {
    args.get(index)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| EngineError::Validation(format!("string argument {index} expected")))
}
