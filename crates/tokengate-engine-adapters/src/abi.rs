//! Minimal ERC-20 calldata codec. The approval engine only ever touches the
//! fixed ERC-20 fragment, so selectors are derived from hardcoded method
//! signatures and arguments are plain 32-byte words.

use std::str::FromStr;

use alloy::hex;
use alloy::primitives::{keccak256, Address, U256};
use serde_json::Value;

use tokengate_engine_core::EngineError;

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash.as_slice()[0..4]);
    out
}

pub fn method_signature(method: &str) -> Result<&'static str, EngineError> {
    Ok(match method {
        "decimals" => "decimals()",
        "symbol" => "symbol()",
        "name" => "name()",
        "totalSupply" => "totalSupply()",
        "balanceOf" => "balanceOf(address)",
        "allowance" => "allowance(address,address)",
        "approve" => "approve(address,uint256)",
        other => {
            return Err(EngineError::Validation(format!(
                "method not in the token fragment: {other}"
            )))
        }
    })
}

fn param_types(signature: &str) -> Vec<&str> {
    let inner = signature
        .split_once('(')
        .and_then(|(_, rest)| rest.strip_suffix(')'))
        .unwrap_or("");
    if inner.is_empty() {
        Vec::new()
    } else {
        inner.split(',').collect()
    }
}

fn arg_str(arg: &Value) -> Result<&str, EngineError> {
    arg.as_str()
        .ok_or_else(|| EngineError::Validation(format!("string argument expected, got {arg}")))
}

fn encode_word(ty: &str, arg: &Value) -> Result<[u8; 32], EngineError> {
    let mut word = [0u8; 32];
    match ty {
        "address" => {
            let address = Address::from_str(arg_str(arg)?)
                .map_err(|e| EngineError::Validation(format!("invalid address argument: {e}")))?;
            word[12..].copy_from_slice(address.as_slice());
        }
        "uint256" => {
            let raw = arg_str(arg)?;
            let amount = if let Some(hex_digits) = raw.strip_prefix("0x") {
                U256::from_str_radix(hex_digits, 16)
            } else {
                U256::from_str_radix(raw, 10)
            }
            .map_err(|e| EngineError::Validation(format!("invalid uint argument '{raw}': {e}")))?;
            word.copy_from_slice(&amount.to_be_bytes::<32>());
        }
        other => {
            return Err(EngineError::Validation(format!(
                "unsupported parameter type: {other}"
            )))
        }
    }
    Ok(word)
}

/// Encodes a token-fragment call as 0x-prefixed calldata.
pub fn encode_call(method: &str, args: &[Value]) -> Result<String, EngineError> {
    let signature = method_signature(method)?;
    let types = param_types(signature);
    if types.len() != args.len() {
        return Err(EngineError::Validation(format!(
            "argument count mismatch for {method}: expected {}, got {}",
            types.len(),
            args.len()
        )));
    }

    let mut data = selector(signature).to_vec();
    for (ty, arg) in types.iter().zip(args) {
        data.extend_from_slice(&encode_word(ty, arg)?);
    }
    Ok(format!("0x{}", hex::encode(data)))
}

/// Decodes a single uint word from return data.
pub fn decode_uint(data: &str) -> Result<U256, EngineError> {
    let digits = data.strip_prefix("0x").unwrap_or(data);
    if digits.is_empty() {
        return Err(EngineError::Read("empty return data".to_owned()));
    }
    let word = digits.get(0..digits.len().min(64)).unwrap_or(digits);
    U256::from_str_radix(word, 16)
        .map_err(|e| EngineError::Read(format!("invalid uint return data: {e}")))
}

/// Decodes an ABI string return value. Non-standard tokens that answer with
/// a bare bytes32 are tolerated by trimming trailing zero bytes.
pub fn decode_string(data: &str) -> Result<String, EngineError> {
    let digits = data.strip_prefix("0x").unwrap_or(data);
    let bytes = hex::decode(digits)
        .map_err(|e| EngineError::Read(format!("invalid string return data: {e}")))?;
    if bytes.is_empty() {
        return Err(EngineError::Read("empty return data".to_owned()));
    }

    if bytes.len() >= 64 {
        let offset = word_as_usize(&bytes[0..32]);
        if let Some(length_word) = offset
            .checked_add(32)
            .filter(|end| *end <= bytes.len())
            .map(|end| &bytes[offset..end])
        {
            let length = word_as_usize(length_word);
            let start = offset + 32;
            if let Some(text) = start
                .checked_add(length)
                .filter(|end| *end <= bytes.len())
                .map(|end| &bytes[start..end])
            {
                return Ok(String::from_utf8_lossy(text).into_owned());
            }
        }
    }

    let trimmed: Vec<u8> = bytes.iter().copied().take_while(|b| *b != 0).collect();
    Ok(String::from_utf8_lossy(&trimmed).into_owned())
}

fn word_as_usize(word: &[u8]) -> usize {
    word.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_match_the_erc20_fragment() {
        assert_eq!(selector("approve(address,uint256)"), [0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(selector("balanceOf(address)"), [0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(selector("allowance(address,address)"), [0xdd, 0x62, 0xed, 0x3e]);
        assert_eq!(selector("decimals()"), [0x31, 0x3c, 0xe5, 0x67]);
    }

    #[test]
    fn unlimited_approval_calldata_matches_the_canonical_shape() {
        let data = encode_call(
            "approve",
            &[
                Value::String("0xdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef".to_owned()),
                Value::String(U256::MAX.to_string()),
            ],
        )
        .expect("encode");
        assert_eq!(
            data,
            format!(
                "0x095ea7b3{}{}",
                "000000000000000000000000deadbeefdeadbeefdeadbeefdeadbeefdeadbeef",
                "f".repeat(64)
            )
        );
    }

    #[test]
    fn uint_return_data_round_trips() {
        let balance = U256::from(100_000_000u64);
        let data = format!("0x{}", hex::encode(balance.to_be_bytes::<32>()));
        assert_eq!(decode_uint(&data).expect("decode"), balance);
    }

    #[test]
    fn standard_string_return_decodes() {
        // offset 0x20, length 4, "USDT"
        let data = format!(
            "0x{:064x}{:064x}{}",
            32,
            4,
            format!("{:0<64}", hex::encode("USDT"))
        );
        assert_eq!(decode_string(&data).expect("decode"), "USDT");
    }

    #[test]
    fn bytes32_symbol_is_tolerated() {
        let data = format!("0x{:0<64}", hex::encode("MKR"));
        assert_eq!(decode_string(&data).expect("decode"), "MKR");
    }

    #[test]
    fn argument_count_is_enforced() {
        let err = encode_call("approve", &[]).expect_err("must fail");
        assert!(err.to_string().contains("argument count mismatch"));
    }
}
