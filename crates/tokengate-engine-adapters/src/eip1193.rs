use alloy::primitives::{Address, U256};
use serde_json::Value;

use tokengate_engine_core::{
    AccountAddress, ChainClientPort, ConnectedAccount, EngineError, FeeOptions, ProviderEvent,
    ProviderKind, TxProbe,
};

use crate::abi;
use crate::deterministic::DeterministicChain;
use crate::AdapterConfig;

/// EVM-style backend over an injected `window.ethereum`-shaped provider.
/// Native builds can forward to a JSON-RPC proxy bridge; without one the
/// deterministic in-memory chain stands in.
#[derive(Debug, Clone)]
pub struct Eip1193Adapter {
    mode: ProviderMode,
    chain: DeterministicChain,
}

#[derive(Debug, Clone)]
enum ProviderMode {
    Disabled(String),
    Deterministic,
    #[cfg(not(target_arch = "wasm32"))]
    Proxy(ProxyRuntime),
    #[cfg(target_arch = "wasm32")]
    Browser,
}

#[derive(Debug, Clone)]
#[cfg(not(target_arch = "wasm32"))]
struct ProxyRuntime {
    base_url: String,
    client: reqwest::blocking::Client,
}

const DEFAULT_ACCOUNT: &str = "0x1000000000000000000000000000000000000001";
const DEFAULT_CHAIN_ID: u64 = 56;

impl Default for Eip1193Adapter {
    fn default() -> Self {
        Self::with_config(AdapterConfig::from_env())
    }
}

impl Eip1193Adapter {
    pub fn with_config(config: AdapterConfig) -> Self {
        #[cfg(target_arch = "wasm32")]
        let mode = if browser::provider_available() {
            ProviderMode::Browser
        } else if config.strict_runtime_required() {
            ProviderMode::Disabled(
                "EIP-1193 browser provider not found in production runtime profile".to_owned(),
            )
        } else {
            ProviderMode::Deterministic
        };

        #[cfg(not(target_arch = "wasm32"))]
        let mode = if let Some(ref base_url) = config.eip1193_proxy_url {
            let timeout = std::time::Duration::from_millis(config.http_timeout_ms);
            match reqwest::blocking::Client::builder().timeout(timeout).build() {
                Ok(client) => ProviderMode::Proxy(ProxyRuntime {
                    base_url: base_url.clone(),
                    client,
                }),
                Err(e) => {
                    if config.strict_runtime_required() {
                        ProviderMode::Disabled(format!(
                            "failed to initialize EIP-1193 proxy client in production profile: {e}"
                        ))
                    } else {
                        ProviderMode::Deterministic
                    }
                }
            }
        } else if config.strict_runtime_required() {
            ProviderMode::Disabled(
                "EIP-1193 proxy URL not configured in production runtime profile".to_owned(),
            )
        } else {
            ProviderMode::Deterministic
        };

        Self {
            mode,
            chain: DeterministicChain::new(
                ProviderKind::Evm,
                DEFAULT_CHAIN_ID,
                AccountAddress::new(DEFAULT_ACCOUNT),
            ),
        }
    }

    pub fn deterministic() -> Self {
        Self {
            mode: ProviderMode::Deterministic,
            chain: DeterministicChain::new(
                ProviderKind::Evm,
                DEFAULT_CHAIN_ID,
                AccountAddress::new(DEFAULT_ACCOUNT),
            ),
        }
    }

    /// Scripting handle for the in-memory chain (deterministic mode) and the
    /// provider snapshot cache (proxy mode).
    pub fn chain_handle(&self) -> DeterministicChain {
        self.chain.clone()
    }

    pub fn debug_inject_accounts_changed(&self, accounts: Vec<AccountAddress>) {
        self.chain.inject_accounts_changed(accounts);
    }

    pub fn debug_inject_chain_changed(&self, chain_id: u64) {
        self.chain.inject_chain_changed(chain_id);
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
    fn rpc(&self, proxy: &ProxyRuntime, method: &str, params: Value) -> Result<Value, RpcError> {
        tracing::debug!(method, "eip1193 proxy request");
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = proxy
            .client
            .post(&proxy.base_url)
            .json(&payload)
            .send()
            .map_err(|e| RpcError::transport(format!("eip1193 proxy request failed: {e}")))?;
        let status = response.status();
        let body: Value = response
            .json()
            .map_err(|e| RpcError::transport(format!("eip1193 proxy json decode failed: {e}")))?;
        if !status.is_success() {
            return Err(RpcError::transport(format!(
                "eip1193 proxy status {status}: {body}"
            )));
        }
        if let Some(err) = body.get("error") {
            return Err(RpcError {
                code: err.get("code").and_then(Value::as_i64),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                    .unwrap_or_else(|| err.to_string()),
            });
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| RpcError::transport("eip1193 proxy missing result".to_owned()))
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug)]
struct RpcError {
    code: Option<i64>,
    message: String,
}

#[cfg(not(target_arch = "wasm32"))]
impl RpcError {
    fn transport(message: String) -> Self {
        Self {
            code: None,
            message,
        }
    }

    /// EIP-1193 user-rejection code.
    const USER_REJECTED: i64 = 4001;

    fn into_prompt_error(self) -> EngineError {
        if self.code == Some(Self::USER_REJECTED) {
            EngineError::UserRejected
        } else {
            EngineError::Transport(self.message)
        }
    }

    fn into_read_error(self) -> EngineError {
        if self.code.is_some() {
            EngineError::Read(self.message)
        } else {
            EngineError::Transport(self.message)
        }
    }

    /// Broadcast failures are classified post-hoc from the node's error
    /// text; there is no pre-flight fee estimate.
    fn into_send_error(self) -> EngineError {
        if self.code == Some(Self::USER_REJECTED) {
            EngineError::UserRejected
        } else if self.message.to_ascii_lowercase().contains("insufficient") {
            EngineError::InsufficientResources(self.message)
        } else if self.code.is_some() {
            EngineError::Broadcast(self.message)
        } else {
            EngineError::Transport(self.message)
        }
    }
}

impl ChainClientPort for Eip1193Adapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Evm
    }

    fn connect(&self) -> Result<ConnectedAccount, EngineError> {
        self.check_mode()?;

        #[cfg(not(target_arch = "wasm32"))]
        if let Some(proxy) = self.proxy() {
            let result = self
                .rpc(proxy, "eth_requestAccounts", serde_json::json!([]))
                .map_err(RpcError::into_prompt_error)?;
            let accounts = parse_accounts(&result)?;
            let address = accounts.first().cloned().ok_or(EngineError::NoAccounts)?;
            let chain_raw = self
                .rpc(proxy, "eth_chainId", serde_json::json!([]))
                .map_err(RpcError::into_read_error)?;
            let chain_id = json_chain_id_to_u64(&chain_raw)?;
            self.chain.update_accounts(accounts)?;
            self.chain.update_chain(chain_id)?;
            return Ok(ConnectedAccount { address, chain_id });
        }

        #[cfg(target_arch = "wasm32")]
        if matches!(self.mode, ProviderMode::Browser) {
            return Err(EngineError::NotImplemented(
                "wasm sync connect is unavailable; use wasm_connect_async",
            ));
        }

        self.chain.connect()
    }

    fn native_balance(&self, address: &AccountAddress) -> Result<U256, EngineError> {
        self.check_mode()?;

        #[cfg(not(target_arch = "wasm32"))]
        if let Some(proxy) = self.proxy() {
            let result = self
                .rpc(
                    proxy,
                    "eth_getBalance",
                    serde_json::json!([address.as_str(), "latest"]),
                )
                .map_err(RpcError::into_read_error)?;
            let raw = result
                .as_str()
                .ok_or_else(|| EngineError::Read("eth_getBalance must return hex".to_owned()))?;
            return abi::decode_uint(raw);
        }

        #[cfg(target_arch = "wasm32")]
        if matches!(self.mode, ProviderMode::Browser) {
            return Err(EngineError::NotImplemented(
                "wasm sync native_balance is unavailable",
            ));
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
            let data = abi::encode_call(method, args)?;
            let result = self
                .rpc(
                    proxy,
                    "eth_call",
                    serde_json::json!([{ "to": contract.as_str(), "data": data }, "latest"]),
                )
                .map_err(RpcError::into_read_error)?;
            let raw = result
                .as_str()
                .ok_or_else(|| EngineError::Read("eth_call must return hex".to_owned()))?;
            return match method {
                "symbol" | "name" => Ok(Value::String(abi::decode_string(raw)?)),
                _ => Ok(Value::String(abi::decode_uint(raw)?.to_string())),
            };
        }

        #[cfg(target_arch = "wasm32")]
        if matches!(self.mode, ProviderMode::Browser) {
            return Err(EngineError::NotImplemented("wasm sync call is unavailable"));
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
            let from = self.chain.first_account().ok_or(EngineError::NoAccounts)?;
            let data = abi::encode_call(method, args)?;
            let mut tx = serde_json::json!({
                "from": from.as_str(),
                "to": contract.as_str(),
                "data": data,
            });
            if let Some(gas) = fee.gas_limit {
                tx["gas"] = Value::String(format!("0x{gas:x}"));
            }
            let result = self
                .rpc(proxy, "eth_sendTransaction", serde_json::json!([tx]))
                .map_err(RpcError::into_send_error)?;
            return result
                .as_str()
                .map(str::to_owned)
                .ok_or_else(|| EngineError::Broadcast("missing transaction hash".to_owned()));
        }

        #[cfg(target_arch = "wasm32")]
        if matches!(self.mode, ProviderMode::Browser) {
            return Err(EngineError::NotImplemented(
                "wasm sync send is unavailable; use wasm_send_async",
            ));
        }

        self.chain.send(contract, method, args, fee)
    }

    fn transaction_status(&self, tx_id: &str) -> Result<TxProbe, EngineError> {
        self.check_mode()?;

        #[cfg(not(target_arch = "wasm32"))]
        if let Some(proxy) = self.proxy() {
            let receipt = self
                .rpc(
                    proxy,
                    "eth_getTransactionReceipt",
                    serde_json::json!([tx_id]),
                )
                .map_err(RpcError::into_read_error)?;
            if receipt.is_null() {
                return Ok(TxProbe::Pending);
            }
            let status = receipt.get("status").and_then(Value::as_str);
            return match status {
                Some("0x1") => Ok(TxProbe::Confirmed {
                    fee_consumed: receipt_fee(&receipt),
                }),
                Some("0x0") => Ok(TxProbe::Failed {
                    reason: "execution reverted".to_owned(),
                }),
                _ => Ok(TxProbe::Pending),
            };
        }

        #[cfg(target_arch = "wasm32")]
        if matches!(self.mode, ProviderMode::Browser) {
            return Err(EngineError::NotImplemented(
                "wasm sync transaction_status is unavailable",
            ));
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
        if let Some(proxy) = self.proxy() {
            let payload = format!("0x{}", alloy::hex::encode(message.as_bytes()));
            let result = self
                .rpc(
                    proxy,
                    "personal_sign",
                    serde_json::json!([payload, address.as_str()]),
                )
                .map_err(RpcError::into_prompt_error)?;
            return result
                .as_str()
                .map(str::to_owned)
                .ok_or_else(|| EngineError::Transport("missing signature".to_owned()));
        }

        #[cfg(target_arch = "wasm32")]
        if matches!(self.mode, ProviderMode::Browser) {
            return Err(EngineError::NotImplemented(
                "wasm sync sign_message is unavailable; use wasm_sign_message_async",
            ));
        }

        self.chain.sign_message(address, message)
    }

    fn drain_events(&self) -> Result<Vec<ProviderEvent>, EngineError> {
        self.chain.drain_events()
    }
}

fn parse_accounts(result: &Value) -> Result<Vec<AccountAddress>, EngineError> {
    let arr = result
        .as_array()
        .ok_or_else(|| EngineError::Transport("eth_requestAccounts: array expected".to_owned()))?;
    let mut accounts = Vec::with_capacity(arr.len());
    for item in arr {
        let raw = item
            .as_str()
            .ok_or_else(|| EngineError::Transport("eth_requestAccounts: string expected".to_owned()))?;
        raw.parse::<Address>()
            .map_err(|e| EngineError::Validation(format!("invalid account address: {e}")))?;
        accounts.push(AccountAddress::new(raw));
    }
    Ok(accounts)
}

fn json_chain_id_to_u64(value: &Value) -> Result<u64, EngineError> {
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    let s = value
        .as_str()
        .ok_or_else(|| EngineError::Validation("chain id must be string or number".to_owned()))?;
    parse_chain_id_str(s)
}

pub(crate) fn parse_chain_id_str(raw: &str) -> Result<u64, EngineError> {
    if let Some(hex_digits) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u64::from_str_radix(hex_digits, 16)
            .map_err(|e| EngineError::Validation(format!("invalid hex chain id: {e}")))
    } else {
        raw.parse()
            .map_err(|e| EngineError::Validation(format!("invalid chain id: {e}")))
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn receipt_fee(receipt: &Value) -> Option<U256> {
    let gas_used = receipt
        .get("gasUsed")
        .and_then(Value::as_str)
        .and_then(|raw| abi::decode_uint(raw).ok())?;
    let gas_price = receipt
        .get("effectiveGasPrice")
        .and_then(Value::as_str)
        .and_then(|raw| abi::decode_uint(raw).ok())?;
    gas_used.checked_mul(gas_price)
}

/// Browser-injected provider access. Snapshot reads are synchronous through
/// `Reflect`; anything that pops a wallet prompt goes through the async
/// `request` promise.
#[cfg(target_arch = "wasm32")]
mod browser {
    use wasm_bindgen::{JsCast, JsValue};

    use tokengate_engine_core::EngineError;

    pub fn provider_available() -> bool {
        provider().is_ok()
    }

    pub fn provider() -> Result<JsValue, EngineError> {
        let window = web_sys::window()
            .ok_or_else(|| EngineError::Transport("missing window".to_owned()))?;
        let provider = get_prop(&window.into(), "ethereum")?;
        if provider.is_null() || provider.is_undefined() {
            return Err(EngineError::ProviderNotFound);
        }
        Ok(provider)
    }

    pub fn get_prop(target: &JsValue, key: &str) -> Result<JsValue, EngineError> {
        js_sys::Reflect::get(target, &JsValue::from_str(key)).map_err(|e| {
            EngineError::Transport(format!("read provider property {key} failed: {e:?}"))
        })
    }

    pub async fn request(
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, EngineError> {
        let provider = provider()?;
        let request_fn = get_prop(&provider, "request")
            .ok()
            .and_then(|v| v.dyn_into::<js_sys::Function>().ok())
            .ok_or(EngineError::NotImplemented(
                "window.ethereum.request is unavailable",
            ))?;

        let payload = serde_json::json!({ "method": method, "params": params });
        let payload_js = serde_wasm_bindgen::to_value(&payload)
            .map_err(|e| EngineError::Transport(format!("failed to encode wasm request: {e}")))?;
        let promise_js = request_fn.call1(&provider, &payload_js).map_err(|e| {
            EngineError::Transport(format!("provider request dispatch failed: {e:?}"))
        })?;
        let promise = promise_js.dyn_into::<js_sys::Promise>().map_err(|_| {
            EngineError::Transport("provider request did not return Promise".to_owned())
        })?;
        let result_js = wasm_bindgen_futures::JsFuture::from(promise)
            .await
            .map_err(|e| EngineError::Transport(format!("provider request rejected: {e:?}")))?;
        serde_wasm_bindgen::from_value(result_js)
            .map_err(|e| EngineError::Transport(format!("failed to decode wasm response: {e}")))
    }
}

#[cfg(target_arch = "wasm32")]
impl Eip1193Adapter {
    pub async fn wasm_connect_async(&self) -> Result<ConnectedAccount, EngineError> {
        self.check_mode()?;
        let accounts_raw = browser::request("eth_requestAccounts", serde_json::json!([])).await?;
        let accounts = parse_accounts(&accounts_raw)?;
        let address = accounts.first().cloned().ok_or(EngineError::NoAccounts)?;
        let chain_raw = browser::request("eth_chainId", serde_json::json!([])).await?;
        let chain_id = json_chain_id_to_u64(&chain_raw)?;
        self.chain.update_accounts(accounts)?;
        self.chain.update_chain(chain_id)?;
        Ok(ConnectedAccount { address, chain_id })
    }

    pub async fn wasm_send_async(
        &self,
        contract: &AccountAddress,
        method: &str,
        args: &[Value],
        fee: &FeeOptions,
    ) -> Result<String, EngineError> {
        self.check_mode()?;
        let from = self.chain.first_account().ok_or(EngineError::NoAccounts)?;
        let data = abi::encode_call(method, args)?;
        let mut tx = serde_json::json!({
            "from": from.as_str(),
            "to": contract.as_str(),
            "data": data,
        });
        if let Some(gas) = fee.gas_limit {
            tx["gas"] = Value::String(format!("0x{gas:x}"));
        }
        let result = browser::request("eth_sendTransaction", serde_json::json!([tx])).await?;
        result
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| EngineError::Broadcast("missing transaction hash".to_owned()))
    }

    pub async fn wasm_sign_message_async(
        &self,
        address: &AccountAddress,
        message: &str,
    ) -> Result<String, EngineError> {
        self.check_mode()?;
        let payload = format!("0x{}", alloy::hex::encode(message.as_bytes()));
        let result = browser::request(
            "personal_sign",
            serde_json::json!([payload, address.as_str()]),
        )
        .await?;
        result
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| EngineError::Transport("missing signature".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_id_strings_parse_in_both_radixes() {
        assert_eq!(parse_chain_id_str("0x38").expect("hex"), 56);
        assert_eq!(parse_chain_id_str("56").expect("decimal"), 56);
        assert!(parse_chain_id_str("bogus").is_err());
    }

    #[test]
    fn deterministic_mode_answers_the_token_fragment() {
        let adapter = Eip1193Adapter::deterministic();
        let account = adapter.chain_handle().first_account().expect("account");
        let connected = adapter.connect().expect("connect");
        assert_eq!(connected.address, account);
        assert_eq!(connected.chain_id, 56);

        let decimals = adapter
            .call(&AccountAddress::new("0xCAFE"), "decimals", &[])
            .expect("decimals");
        assert_eq!(decimals, Value::from(6u8));
    }
}
