use alloy::primitives::U256;
use serde_json::Value;

use crate::domain::{AccountAddress, TokenDescriptor};
use crate::ports::{ChainClientPort, EngineError};

pub const FALLBACK_SYMBOL: &str = "UNKNOWN";
pub const FALLBACK_NAME: &str = "Unknown Token";

/// Typed token reads over a connected backend. All amounts stay in raw base
/// units; decimal rendering happens at the log boundary.
pub struct TokenAccessor<'a> {
    client: &'a dyn ChainClientPort,
}

impl<'a> TokenAccessor<'a> {
    pub fn new(client: &'a dyn ChainClientPort) -> Self {
        Self { client }
    }

    /// Reads `decimals`, `symbol`, and `name`. A missing symbol or name
    /// degrades to descriptor defaults; a decimals failure is fatal because
    /// nothing downstream can be rendered without it.
    pub fn describe(&self, contract: &AccountAddress) -> Result<TokenDescriptor, EngineError> {
        let decimals = self
            .client
            .call(contract, "decimals", &[])
            .and_then(|v| value_to_u8(&v))?;
        let symbol = self
            .client
            .call(contract, "symbol", &[])
            .ok()
            .and_then(|v| value_to_string(&v))
            .unwrap_or_else(|| FALLBACK_SYMBOL.to_owned());
        let name = self
            .client
            .call(contract, "name", &[])
            .ok()
            .and_then(|v| value_to_string(&v))
            .unwrap_or_else(|| FALLBACK_NAME.to_owned());

        Ok(TokenDescriptor {
            contract_address: contract.clone(),
            decimals,
            symbol,
            name,
        })
    }

    pub fn balance_of(
        &self,
        owner: &AccountAddress,
        contract: &AccountAddress,
    ) -> Result<U256, EngineError> {
        self.client
            .call(contract, "balanceOf", &[Value::String(owner.to_string())])
            .and_then(|v| value_to_u256(&v))
    }

    pub fn allowance_of(
        &self,
        owner: &AccountAddress,
        spender: &AccountAddress,
        contract: &AccountAddress,
    ) -> Result<U256, EngineError> {
        self.client
            .call(
                contract,
                "allowance",
                &[
                    Value::String(owner.to_string()),
                    Value::String(spender.to_string()),
                ],
            )
            .and_then(|v| value_to_u256(&v))
    }
}

/// Adapters answer reads as JSON: decimal strings, 0x-hex strings, or plain
/// numbers are all accepted.
pub fn value_to_u256(value: &Value) -> Result<U256, EngineError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| EngineError::Read(format!("non-integer amount: {n}"))),
        Value::String(s) => {
            let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                U256::from_str_radix(hex, 16)
            } else {
                U256::from_str_radix(s, 10)
            };
            parsed.map_err(|e| EngineError::Read(format!("invalid amount '{s}': {e}")))
        }
        other => Err(EngineError::Read(format!("unexpected amount value: {other}"))),
    }
}

fn value_to_u8(value: &Value) -> Result<u8, EngineError> {
    let wide = value_to_u256(value)?;
    u8::try_from(wide).map_err(|_| EngineError::Read(format!("decimals out of range: {wide}")))
}

fn value_to_string(value: &Value) -> Option<String> {
    value.as_str().map(|s| s.to_owned()).filter(|s| !s.is_empty())
}
