//! Tron-style backend. Same capability surface as the EVM adapter, but the
//! address encoding is base58check over a 0x41-prefixed payload, the fee
//! model is an energy fee limit, and the node API is TronGrid-shaped.

use alloy::primitives::U256;
use serde_json::Value;
use sha2::{Digest, Sha256};

use tokengate_engine_core::{
    AccountAddress, ChainClientPort, ConnectedAccount, EngineError, FeeOptions, ProviderEvent,
    ProviderKind, TxProbe,
};

use crate::abi;
use crate::deterministic::DeterministicChain;
use crate::AdapterConfig;

pub const TRON_ADDRESS_PREFIX: u8 = 0x41;
/// Chain id TronLink-style providers report for mainnet (0x2b6653dc).
pub const TRON_MAINNET_CHAIN_ID: u64 = 728_126_428;

const DEFAULT_ACCOUNT: &str = "TJRabPrwbZy45sbavfcjinPJC18kjpRTv8";
const DEFAULT_FEE_LIMIT: u64 = 100_000_000;

// ---- base58check address codec ---------------------------------------------

fn checksum(payload: &[u8]) -> [u8; 4] {
    let first = Sha256::digest(payload);
    let second = Sha256::digest(&first[..]);
    let mut out = [0u8; 4];
    out.copy_from_slice(&second[..4]);
    out
}

/// Decodes a base58check Tron address to its 21-byte payload.
fn decode_payload(address: &str) -> Result<[u8; 21], EngineError> {
    let decoded = bs58::decode(address)
        .into_vec()
        .map_err(|e| EngineError::Validation(format!("invalid base58 address: {e}")))?;
    if decoded.len() != 25 {
        return Err(EngineError::Validation(format!(
            "tron address must decode to 25 bytes, got {}",
            decoded.len()
        )));
    }
    let (payload, check) = decoded.split_at(21);
    if check != checksum(payload).as_slice() {
        return Err(EngineError::Validation("tron address checksum mismatch".to_owned()));
    }
    if payload[0] != TRON_ADDRESS_PREFIX {
        return Err(EngineError::Validation(format!(
            "unexpected tron address prefix: {:#04x}",
            payload[0]
        )));
    }
    let mut out = [0u8; 21];
    out.copy_from_slice(payload);
    Ok(out)
}

pub fn validate_address(address: &str) -> bool {
    address.starts_with('T') && decode_payload(address).is_ok()
}

/// Base58check address from a 41-prefixed hex payload.
pub fn hex_to_base58(hex_addr: &str) -> Result<String, EngineError> {
    let bytes = alloy::hex::decode(hex_addr.trim_start_matches("0x"))
        .map_err(|e| EngineError::Validation(format!("invalid hex address: {e}")))?;
    if bytes.len() != 21 || bytes[0] != TRON_ADDRESS_PREFIX {
        return Err(EngineError::Validation(
            "hex address must be 21 bytes with a 0x41 prefix".to_owned(),
        ));
    }
    let mut full = bytes;
    let check = checksum(&full);
    full.extend_from_slice(&check);
    Ok(bs58::encode(full).into_string())
}

/// 41-prefixed hex payload of a base58check address.
pub fn base58_to_hex(address: &str) -> Result<String, EngineError> {
    Ok(alloy::hex::encode(decode_payload(address)?))
}

/// 0x-prefixed 20-byte form used when packing a Tron address into an ABI
/// word.
pub fn base58_to_evm_hex(address: &str) -> Result<String, EngineError> {
    let payload = decode_payload(address)?;
    Ok(format!("0x{}", alloy::hex::encode(&payload[1..])))
}

// ---- adapter ----------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TronWebAdapter {
    mode: ProviderMode,
    chain: DeterministicChain,
}

#[derive(Debug, Clone)]
enum ProviderMode {
    Disabled(String),
    Deterministic,
    #[cfg(not(target_arch = "wasm32"))]
    Proxy(ProxyRuntime),
}

#[derive(Debug, Clone)]
#[cfg(not(target_arch = "wasm32"))]
struct ProxyRuntime {
    base_url: String,
    account: Option<String>,
    client: reqwest::blocking::Client,
}

impl Default for TronWebAdapter {
    fn default() -> Self {
        Self::with_config(AdapterConfig::from_env())
    }
}

impl TronWebAdapter {
    pub fn with_config(config: AdapterConfig) -> Self {
        #[cfg(target_arch = "wasm32")]
        let mode = if config.strict_runtime_required() {
            ProviderMode::Disabled(
                "tron browser surface is only reachable through the async wallet bridge".to_owned(),
            )
        } else {
            ProviderMode::Deterministic
        };

        #[cfg(not(target_arch = "wasm32"))]
        let mode = if let Some(ref base_url) = config.tron_proxy_url {
            let timeout = std::time::Duration::from_millis(config.http_timeout_ms);
            match reqwest::blocking::Client::builder().timeout(timeout).build() {
                Ok(client) => ProviderMode::Proxy(ProxyRuntime {
                    base_url: base_url.trim_end_matches('/').to_owned(),
                    account: config.tron_account.clone(),
                    client,
                }),
                Err(e) => {
                    if config.strict_runtime_required() {
                        ProviderMode::Disabled(format!(
                            "failed to initialize tron proxy client in production profile: {e}"
                        ))
                    } else {
                        ProviderMode::Deterministic
                    }
                }
            }
        } else if config.strict_runtime_required() {
            ProviderMode::Disabled(
                "tron proxy URL not configured in production runtime profile".to_owned(),
            )
        } else {
            ProviderMode::Deterministic
        };

        Self {
            mode,
            chain: DeterministicChain::new(
                ProviderKind::Tron,
                TRON_MAINNET_CHAIN_ID,
                AccountAddress::new(DEFAULT_ACCOUNT),
            ),
        }
    }

    pub fn deterministic() -> Self {
        Self {
            mode: ProviderMode::Deterministic,
            chain: DeterministicChain::new(
                ProviderKind::Tron,
                TRON_MAINNET_CHAIN_ID,
                AccountAddress::new(DEFAULT_ACCOUNT),
            ),
        }
    }

    pub fn chain_handle(&self) -> DeterministicChain {
        self.chain.clone()
    }

    pub fn debug_inject_accounts_changed(&self, accounts: Vec<AccountAddress>) {
        self.chain.inject_accounts_changed(accounts);
    }

    fn check_mode(&self) -> Result<(), EngineError> {
        if let ProviderMode::Disabled(reason) = &self.mode {
            return Err(EngineError::Validation(reason.clone()));
        }
        Ok(())
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn proxy(&self) -> Option<&ProxyRuntime> {
        match &self.mode {
            ProviderMode::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn post(&self, proxy: &ProxyRuntime, path: &str, body: Value) -> Result<Value, EngineError> {
        tracing::debug!(path, "tron proxy request");
        let url = format!("{}/{}", proxy.base_url, path.trim_start_matches('/'));
        let response = proxy
            .client
            .post(url)
            .json(&body)
            .send()
            .map_err(|e| EngineError::Transport(format!("tron proxy request failed: {e}")))?;
        let status = response.status();
        let body: Value = response
            .json()
            .map_err(|e| EngineError::Transport(format!("tron proxy json decode failed: {e}")))?;
        if !status.is_success() {
            return Err(EngineError::Transport(format!(
                "tron proxy status {status}: {body}"
            )));
        }
        Ok(body)
    }

    /// Re-encodes base58 address arguments as 0x-hex words so the shared
    /// ABI codec can pack them.
    #[cfg(not(target_arch = "wasm32"))]
    fn abi_parameter(&self, method: &str, args: &[Value]) -> Result<String, EngineError> {
        let mut evm_args = Vec::with_capacity(args.len());
        for arg in args {
            match arg.as_str() {
                Some(raw) if validate_address(raw) => {
                    evm_args.push(Value::String(base58_to_evm_hex(raw)?));
                }
                _ => evm_args.push(arg.clone()),
            }
        }
        let calldata = abi::encode_call(method, &evm_args)?;
        // Strip "0x" and the 4-byte selector; the node takes them separately.
        Ok(calldata[10..].to_owned())
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn classify_broadcast(code: Option<&str>, message: &str) -> EngineError {
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("energy") || lowered.contains("bandwidth") || lowered.contains("balance") {
        EngineError::InsufficientResources(message.to_owned())
    } else {
        EngineError::Broadcast(format!(
            "{}: {message}",
            code.unwrap_or("BROADCAST_ERROR")
        ))
    }
}

impl ChainClientPort for TronWebAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Tron
    }

    fn connect(&self) -> Result<ConnectedAccount, EngineError> {
        self.check_mode()?;

        #[cfg(not(target_arch = "wasm32"))]
        if let Some(proxy) = self.proxy() {
            let account = proxy.account.clone().ok_or(EngineError::NoAccounts)?;
            if !validate_address(&account) {
                return Err(EngineError::Validation(format!(
                    "configured tron account is not a valid address: {account}"
                )));
            }
            let address = AccountAddress::new(account);
            self.chain.update_accounts(vec![address.clone()])?;
            return Ok(ConnectedAccount {
                address,
                chain_id: TRON_MAINNET_CHAIN_ID,
            });
        }

        self.chain.connect()
    }

    fn native_balance(&self, address: &AccountAddress) -> Result<U256, EngineError> {
        self.check_mode()?;

        #[cfg(not(target_arch = "wasm32"))]
        if let Some(proxy) = self.proxy() {
            let body = self.post(
                proxy,
                "wallet/getaccount",
                serde_json::json!({ "address": address.as_str(), "visible": true }),
            )?;
            // A never-funded account answers with an empty object.
            let sun = body.get("balance").and_then(Value::as_u64).unwrap_or(0);
            return Ok(U256::from(sun));
        }

        self.chain.native_balance(address)
    }

    fn call(
        &self,
        contract: &AccountAddress,
        method: &str,
        args: &[Value],
    ) -> Result<Value, EngineError> {
        self.check_mode()?;

        #[cfg(not(target_arch = "wasm32"))]
        if let Some(proxy) = self.proxy() {
            let owner = self
                .chain
                .first_account()
                .map(|a| a.to_string())
                .unwrap_or_else(|| DEFAULT_ACCOUNT.to_owned());
            let body = self.post(
                proxy,
                "wallet/triggerconstantcontract",
                serde_json::json!({
                    "owner_address": owner,
                    "contract_address": contract.as_str(),
                    "function_selector": abi::method_signature(method)?,
                    "parameter": self.abi_parameter(method, args)?,
                    "visible": true,
                }),
            )?;
            let raw = body
                .get("constant_result")
                .and_then(Value::as_array)
                .and_then(|results| results.first())
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    EngineError::Read(format!("constant call returned no result: {body}"))
                })?;
            return match method {
                "symbol" | "name" => Ok(Value::String(abi::decode_string(raw)?)),
                _ => Ok(Value::String(abi::decode_uint(raw)?.to_string())),
            };
        }

        self.chain.call(contract, method, args)
    }

    fn send(
        &self,
        contract: &AccountAddress,
        method: &str,
        args: &[Value],
        fee: &FeeOptions,
    ) -> Result<String, EngineError> {
        self.check_mode()?;

        #[cfg(not(target_arch = "wasm32"))]
        if let Some(proxy) = self.proxy() {
            let owner = self.chain.first_account().ok_or(EngineError::NoAccounts)?;
            let trigger = self.post(
                proxy,
                "wallet/triggersmartcontract",
                serde_json::json!({
                    "owner_address": owner.as_str(),
                    "contract_address": contract.as_str(),
                    "function_selector": abi::method_signature(method)?,
                    "parameter": self.abi_parameter(method, args)?,
                    "fee_limit": fee.fee_limit.unwrap_or(DEFAULT_FEE_LIMIT),
                    "visible": true,
                }),
            )?;
            let transaction = trigger.get("transaction").cloned().ok_or_else(|| {
                EngineError::Broadcast(format!("trigger returned no transaction: {trigger}"))
            })?;
            let tx_id = transaction
                .get("txID")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or_else(|| EngineError::Broadcast("transaction has no txID".to_owned()))?;

            // The bridge holds the signer; this adapter never sees a key.
            let broadcast =
                self.post(proxy, "wallet/broadcasttransaction", transaction)?;
            if broadcast.get("result").and_then(Value::as_bool) != Some(true) {
                let code = broadcast.get("code").and_then(Value::as_str);
                let message = broadcast
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("broadcast rejected");
                return Err(classify_broadcast(code, message));
            }
            return Ok(tx_id);
        }

        self.chain.send(contract, method, args, fee)
    }

    fn transaction_status(&self, tx_id: &str) -> Result<TxProbe, EngineError> {
        self.check_mode()?;

        #[cfg(not(target_arch = "wasm32"))]
        if let Some(proxy) = self.proxy() {
            let body = self.post(
                proxy,
                "wallet/gettransactioninfobyid",
                serde_json::json!({ "value": tx_id }),
            )?;
            // The node answers an empty object until the transaction lands.
            if body.as_object().is_some_and(|obj| obj.is_empty()) {
                return Ok(TxProbe::Pending);
            }
            let receipt_result = body
                .get("receipt")
                .and_then(|receipt| receipt.get("result"))
                .and_then(Value::as_str);
            return match receipt_result {
                Some("SUCCESS") => Ok(TxProbe::Confirmed {
                    fee_consumed: body.get("fee").and_then(Value::as_u64).map(U256::from),
                }),
                Some(other) => Ok(TxProbe::Failed {
                    reason: other.to_owned(),
                }),
                None if body.get("blockNumber").is_some() => Ok(TxProbe::Confirmed {
                    fee_consumed: body.get("fee").and_then(Value::as_u64).map(U256::from),
                }),
                None => Ok(TxProbe::Pending),
            };
        }

        self.chain.transaction_status(tx_id)
    }

    fn sign_message(
        &self,
        address: &AccountAddress,
        message: &str,
    ) -> Result<String, EngineError> {
        self.check_mode()?;

        #[cfg(not(target_arch = "wasm32"))]
        if self.proxy().is_some() {
            return Err(EngineError::NotImplemented(
                "tron message signing needs the wallet surface",
            ));
        }

        self.chain.sign_message(address, message)
    }

    fn drain_events(&self) -> Result<Vec<ProviderEvent>, EngineError> {
        self.chain.drain_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // USDT mainnet contract in both encodings.
    const USDT_BASE58: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";
    const USDT_HEX: &str = "41a614f803b6fd780986a42c78ec9c7f77e6ded13c";

    #[test]
    fn known_contract_address_round_trips() {
        assert_eq!(base58_to_hex(USDT_BASE58).expect("decode"), USDT_HEX);
        assert_eq!(hex_to_base58(USDT_HEX).expect("encode"), USDT_BASE58);
    }

    #[test]
    fn evm_word_form_strips_the_prefix() {
        assert_eq!(
            base58_to_evm_hex(USDT_BASE58).expect("convert"),
            format!("0x{}", &USDT_HEX[2..])
        );
    }

    #[test]
    fn validation_rejects_mangled_addresses() {
        assert!(validate_address(USDT_BASE58));
        assert!(!validate_address("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6u"));
        assert!(!validate_address("0x1000000000000000000000000000000000000001"));
        assert!(!validate_address("T123"));
    }

    #[test]
    fn deterministic_mode_reports_tron_chain_id() {
        let adapter = TronWebAdapter::deterministic();
        let connected = adapter.connect().expect("connect");
        assert_eq!(connected.chain_id, TRON_MAINNET_CHAIN_ID);
        assert!(connected.address.as_str().starts_with('T'));
    }
}
