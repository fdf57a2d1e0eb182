//! Solidity ABI call-data codec
//!
//! Wraps an `ethabi::Contract` and indexes its functions by name and by 4-byte
//! selector. Call data is `selector ++ abi_encode(args)`; results are plain
//! `abi_encode(outputs)` as returned by an `eth_call`.
//!
//! Values cross the boundary as `serde_json::Value` so workers never handle
//! `ethabi::Token` directly:
//!
//! | Solidity            | JSON                                              |
//! |---------------------|---------------------------------------------------|
//! | `address`           | `"0x…"` (20 bytes hex)                            |
//! | `uintN` / `intN`    | number when it fits 64 bits, else decimal string  |
//! | `bool`              | bool                                              |
//! | `string`            | string                                            |
//! | `bytes` / `bytesN`  | `"0x…"` hex                                       |
//! | `T[]`, `T[N]`, tuple| array                                             |

use crate::error::{CodecError, Result};
use ethabi::{Address, Contract, Function, Param, ParamType, Token, Uint as U256};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// Selector width in bytes
pub const SELECTOR_LEN: usize = 4;

const FORMAT: &str = "abi";

/// Named, typed function parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbiParam {
    pub name: String,
    /// Canonical Solidity type, e.g. `uint256`, `address[]`
    pub kind: String,
}

/// Function metadata derived once from the ABI
#[derive(Debug, Clone)]
pub struct AbiFunctionInfo {
    pub name: String,
    /// Canonical signature, e.g. `transfer(address,uint256)`
    pub signature: String,
    pub inputs: Vec<AbiParam>,
    pub outputs: Vec<AbiParam>,
    pub selector: [u8; SELECTOR_LEN],
    function: Function,
}

impl AbiFunctionInfo {
    fn from_function(function: &Function) -> Self {
        let signature = canonical_signature(&function.name, &function.inputs);
        Self {
            name: function.name.clone(),
            signature,
            inputs: function.inputs.iter().map(to_abi_param).collect(),
            outputs: function.outputs.iter().map(to_abi_param).collect(),
            selector: function.short_signature(),
            function: function.clone(),
        }
    }

    /// Selector as `0x`-prefixed hex
    pub fn selector_hex(&self) -> String {
        format!("0x{}", hex::encode(self.selector))
    }
}

/// Codec for one contract ABI
#[derive(Debug, Clone)]
pub struct AbiCodec {
    functions: HashMap<String, AbiFunctionInfo>,
    selectors: HashMap<[u8; SELECTOR_LEN], String>,
}

impl AbiCodec {
    /// Build from a parsed contract
    pub fn new(contract: &Contract) -> Self {
        let mut functions = HashMap::new();
        let mut selectors = HashMap::new();

        for function in contract.functions() {
            if functions.contains_key(&function.name) {
                // Overloads share a name; the first definition wins the name lookup
                debug!("Skipping overloaded ABI function {}", function.name);
                continue;
            }
            let info = AbiFunctionInfo::from_function(function);
            selectors.insert(info.selector, info.name.clone());
            functions.insert(info.name.clone(), info);
        }

        Self {
            functions,
            selectors,
        }
    }

    /// Build from ABI JSON text (the `abi` array emitted by solc)
    pub fn from_json(abi_json: &str) -> Result<Self> {
        let contract = Contract::load(abi_json.as_bytes())
            .map_err(|e| CodecError::InvalidAbi(e.to_string()))?;
        Ok(Self::new(&contract))
    }

    pub fn function(&self, name: &str) -> Option<&AbiFunctionInfo> {
        self.functions.get(name)
    }

    /// All indexed functions, sorted by name
    pub fn functions(&self) -> Vec<&AbiFunctionInfo> {
        let mut list: Vec<_> = self.functions.values().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    /// Name of the function whose selector matches the first 4 bytes of `data`
    pub fn detect_function(&self, data: &[u8]) -> Option<&str> {
        let selector: [u8; SELECTOR_LEN] = data.get(..SELECTOR_LEN)?.try_into().ok()?;
        self.selectors.get(&selector).map(String::as_str)
    }

    /// Decode call data for `name` into a parameter-name → value mapping
    pub fn decode_function_call(&self, name: &str, data: &[u8]) -> Result<Map<String, Value>> {
        let info = self.lookup(name)?;

        if data.len() < SELECTOR_LEN {
            return Err(CodecError::decode(
                FORMAT,
                format!(
                    "call data is {} bytes, shorter than the {}-byte selector",
                    data.len(),
                    SELECTOR_LEN
                ),
            ));
        }

        let (selector, args) = data.split_at(SELECTOR_LEN);
        if selector != info.selector {
            return Err(CodecError::decode(
                FORMAT,
                format!(
                    "selector 0x{} does not match {} ({})",
                    hex::encode(selector),
                    info.signature,
                    info.selector_hex()
                ),
            ));
        }

        let tokens = info
            .function
            .decode_input(args)
            .map_err(|e| CodecError::decode(FORMAT, format!("{}: {}", info.signature, e)))?;

        Ok(info
            .function
            .inputs
            .iter()
            .zip(tokens)
            .enumerate()
            .map(|(index, (param, token))| (param_key(&param.name, index), token_to_json(token)))
            .collect())
    }

    /// Encode call data for `name` from a parameter-name → value mapping
    pub fn encode_function_call(&self, name: &str, args: &Map<String, Value>) -> Result<Vec<u8>> {
        let info = self.lookup(name)?;
        let tokens = info
            .function
            .inputs
            .iter()
            .enumerate()
            .map(|(index, param)| {
                let key = param_key(&param.name, index);
                let value = args.get(&key).ok_or_else(|| {
                    CodecError::encode(FORMAT, format!("missing argument '{}' for {}", key, name))
                })?;
                json_to_token(&param.kind, value).map_err(|reason| {
                    CodecError::encode(FORMAT, format!("argument '{}': {}", key, reason))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info.function
            .encode_input(&tokens)
            .map_err(|e| CodecError::encode(FORMAT, e.to_string()))
    }

    /// Encode a worker result as the return data of `name`.
    ///
    /// A function with exactly one output accepts the bare value; otherwise the
    /// value must be an object keyed by output name (`param<i>` if unnamed).
    pub fn encode_function_result(&self, name: &str, value: &Value) -> Result<Vec<u8>> {
        let info = self.lookup(name)?;
        let outputs = &info.function.outputs;

        let named = match value {
            Value::Object(map) => {
                outputs.len() != 1 || map.contains_key(&param_key(&outputs[0].name, 0))
            }
            _ => false,
        };

        let tokens = if named {
            let map = value.as_object().ok_or_else(|| {
                CodecError::encode(FORMAT, "expected an object of named outputs")
            })?;
            outputs
                .iter()
                .enumerate()
                .map(|(index, param)| {
                    let key = param_key(&param.name, index);
                    let field = map.get(&key).ok_or_else(|| {
                        CodecError::encode(
                            FORMAT,
                            format!("missing output field '{}' for {}", key, info.signature),
                        )
                    })?;
                    json_to_token(&param.kind, field).map_err(|reason| {
                        CodecError::encode(FORMAT, format!("output '{}': {}", key, reason))
                    })
                })
                .collect::<Result<Vec<_>>>()?
        } else if outputs.len() == 1 {
            vec![json_to_token(&outputs[0].kind, value)
                .map_err(|reason| CodecError::encode(FORMAT, reason))?]
        } else {
            return Err(CodecError::encode(
                FORMAT,
                format!(
                    "{} has {} outputs; expected an object keyed by output name",
                    info.signature,
                    outputs.len()
                ),
            ));
        };

        Ok(ethabi::encode(&tokens))
    }

    fn lookup(&self, name: &str) -> Result<&AbiFunctionInfo> {
        self.functions
            .get(name)
            .ok_or_else(|| CodecError::UnknownFunction(name.to_string()))
    }
}

fn to_abi_param(param: &Param) -> AbiParam {
    AbiParam {
        name: param.name.clone(),
        kind: param.kind.to_string(),
    }
}

fn canonical_signature(name: &str, inputs: &[Param]) -> String {
    let types: Vec<String> = inputs.iter().map(|p| p.kind.to_string()).collect();
    format!("{}({})", name, types.join(","))
}

fn param_key(name: &str, index: usize) -> String {
    if name.is_empty() {
        format!("param{}", index)
    } else {
        name.to_string()
    }
}

fn hex_string(bytes: &[u8]) -> Value {
    Value::String(format!("0x{}", hex::encode(bytes)))
}

fn u256_to_json(value: U256) -> Value {
    if value.bits() <= 64 {
        Value::from(value.low_u64())
    } else {
        Value::String(value.to_string())
    }
}

fn int_to_json(value: U256) -> Value {
    if !value.bit(255) {
        return u256_to_json(value);
    }
    let magnitude = value.overflowing_neg().0;
    if magnitude.bits() <= 63 {
        Value::from(-(magnitude.low_u64() as i64))
    } else {
        Value::String(format!("-{}", magnitude))
    }
}

/// Convert a decoded token into its JSON form
pub fn token_to_json(token: Token) -> Value {
    match token {
        Token::Address(address) => hex_string(address.as_bytes()),
        Token::FixedBytes(bytes) | Token::Bytes(bytes) => hex_string(&bytes),
        Token::Int(value) => int_to_json(value),
        Token::Uint(value) => u256_to_json(value),
        Token::Bool(flag) => Value::Bool(flag),
        Token::String(text) => Value::String(text),
        Token::FixedArray(items) | Token::Array(items) | Token::Tuple(items) => {
            Value::Array(items.into_iter().map(token_to_json).collect())
        }
    }
}

fn parse_hex(value: &Value) -> std::result::Result<Vec<u8>, String> {
    let text = value
        .as_str()
        .ok_or_else(|| format!("expected hex string, got {}", value))?;
    let digits = text.strip_prefix("0x").unwrap_or(text);
    hex::decode(digits).map_err(|e| format!("invalid hex '{}': {}", text, e))
}

fn parse_unsigned(value: &Value) -> std::result::Result<U256, String> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| format!("{} is not an unsigned integer", n)),
        Value::String(text) => match text.strip_prefix("0x") {
            Some(digits) => {
                let padded = if digits.len() % 2 == 1 {
                    format!("0{}", digits)
                } else {
                    digits.to_string()
                };
                let bytes = hex::decode(&padded)
                    .map_err(|e| format!("invalid hex integer '{}': {}", text, e))?;
                if bytes.len() > 32 {
                    return Err(format!("hex integer '{}' exceeds 256 bits", text));
                }
                Ok(U256::from_big_endian(&bytes))
            }
            None => U256::from_dec_str(text)
                .map_err(|e| format!("invalid decimal integer '{}': {:?}", text, e)),
        },
        other => Err(format!("expected integer, got {}", other)),
    }
}

fn parse_signed(value: &Value) -> std::result::Result<(bool, U256), String> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(v) if v < 0 => Ok((true, U256::from(v.unsigned_abs()))),
            Some(v) => Ok((false, U256::from(v as u64))),
            None => parse_unsigned(value).map(|m| (false, m)),
        },
        Value::String(text) => match text.strip_prefix('-') {
            Some(rest) => parse_unsigned(&Value::String(rest.to_string())).map(|m| (true, m)),
            None => parse_unsigned(value).map(|m| (false, m)),
        },
        other => Err(format!("expected integer, got {}", other)),
    }
}

fn expect_array(value: &Value) -> std::result::Result<&Vec<Value>, String> {
    value
        .as_array()
        .ok_or_else(|| format!("expected array, got {}", value))
}

/// Convert a JSON value into a token of the given ABI type
pub fn json_to_token(kind: &ParamType, value: &Value) -> std::result::Result<Token, String> {
    match kind {
        ParamType::Address => {
            let bytes = parse_hex(value)?;
            if bytes.len() != 20 {
                return Err(format!("address must be 20 bytes, got {}", bytes.len()));
            }
            Ok(Token::Address(Address::from_slice(&bytes)))
        }
        ParamType::Bytes => parse_hex(value).map(Token::Bytes),
        ParamType::FixedBytes(size) => {
            let bytes = parse_hex(value)?;
            if bytes.len() != *size {
                return Err(format!("bytes{} requires {} bytes, got {}", size, size, bytes.len()));
            }
            Ok(Token::FixedBytes(bytes))
        }
        ParamType::Uint(size) => {
            let number = parse_unsigned(value)?;
            if number.bits() > *size {
                return Err(format!("{} does not fit in uint{}", number, size));
            }
            Ok(Token::Uint(number))
        }
        ParamType::Int(size) => {
            let (negative, magnitude) = parse_signed(value)?;
            // intN holds magnitudes up to 2^(N-1) (negative) or 2^(N-1) - 1
            let limit = U256::from(2u64).pow(U256::from((*size - 1) as u64));
            if (negative && magnitude > limit) || (!negative && magnitude >= limit) {
                return Err(format!("value does not fit in int{}", size));
            }
            let encoded = if negative {
                magnitude.overflowing_neg().0
            } else {
                magnitude
            };
            Ok(Token::Int(encoded))
        }
        ParamType::Bool => value
            .as_bool()
            .map(Token::Bool)
            .ok_or_else(|| format!("expected bool, got {}", value)),
        ParamType::String => value
            .as_str()
            .map(|s| Token::String(s.to_string()))
            .ok_or_else(|| format!("expected string, got {}", value)),
        ParamType::Array(inner) => expect_array(value)?
            .iter()
            .map(|item| json_to_token(inner, item))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Token::Array),
        ParamType::FixedArray(inner, size) => {
            let items = expect_array(value)?;
            if items.len() != *size {
                return Err(format!("expected {} elements, got {}", size, items.len()));
            }
            items
                .iter()
                .map(|item| json_to_token(inner, item))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Token::FixedArray)
        }
        ParamType::Tuple(kinds) => {
            let items = expect_array(value)?;
            if items.len() != kinds.len() {
                return Err(format!(
                    "tuple expects {} elements, got {}",
                    kinds.len(),
                    items.len()
                ));
            }
            kinds
                .iter()
                .zip(items)
                .map(|(kind, item)| json_to_token(kind, item))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Token::Tuple)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) const ERC20_ABI: &str = r#"[
        {"type":"function","name":"transfer","stateMutability":"nonpayable",
         "inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],
         "outputs":[{"name":"","type":"bool"}]},
        {"type":"function","name":"balanceOf","stateMutability":"view",
         "inputs":[{"name":"owner","type":"address"}],
         "outputs":[{"name":"balance","type":"uint256"}]},
        {"type":"function","name":"quote","stateMutability":"view",
         "inputs":[{"name":"","type":"int24"},{"name":"","type":"bytes"}],
         "outputs":[{"name":"price","type":"uint256"},{"name":"ok","type":"bool"}]}
    ]"#;

    fn codec() -> AbiCodec {
        AbiCodec::from_json(ERC20_ABI).unwrap()
    }

    #[test]
    fn test_function_index_has_canonical_signatures() {
        let codec = codec();
        let transfer = codec.function("transfer").unwrap();
        assert_eq!(transfer.signature, "transfer(address,uint256)");
        assert_eq!(transfer.selector_hex(), "0xa9059cbb");
        assert_eq!(transfer.inputs[1].kind, "uint256");

        let names: Vec<_> = codec.functions().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["balanceOf", "quote", "transfer"]);
    }

    #[test]
    fn test_decode_transfer_call() {
        let codec = codec();
        let args = json!({
            "to": "0x00000000000000000000000000000000000000aa",
            "amount": 1_000_000u64
        });
        let data = codec
            .encode_function_call("transfer", args.as_object().unwrap())
            .unwrap();
        assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(data.len(), 4 + 64);

        assert_eq!(codec.detect_function(&data), Some("transfer"));
        let decoded = codec.decode_function_call("transfer", &data).unwrap();
        assert_eq!(Value::Object(decoded), args);
    }

    #[test]
    fn test_unnamed_params_use_positional_keys() {
        let codec = codec();
        let args = json!({"param0": -42, "param1": "0xdeadbeef"});
        let data = codec
            .encode_function_call("quote", args.as_object().unwrap())
            .unwrap();
        let decoded = codec.decode_function_call("quote", &data).unwrap();
        assert_eq!(decoded["param0"], json!(-42));
        assert_eq!(decoded["param1"], json!("0xdeadbeef"));
    }

    #[test]
    fn test_short_or_mismatched_call_data_fails() {
        let codec = codec();
        let err = codec.decode_function_call("transfer", &[0xa9, 0x05]).unwrap_err();
        assert!(err.is_decode());

        let err = codec
            .decode_function_call("transfer", &[0xde, 0xad, 0xbe, 0xef, 0, 0])
            .unwrap_err();
        assert!(err.to_string().contains("does not match transfer(address,uint256)"));

        // Selector right, arguments truncated
        let err = codec
            .decode_function_call("transfer", &[0xa9, 0x05, 0x9c, 0xbb, 0x00])
            .unwrap_err();
        assert!(err.is_decode());

        assert_eq!(
            codec.decode_function_call("mint", &[0; 4]).unwrap_err(),
            CodecError::UnknownFunction("mint".to_string())
        );
    }

    #[test]
    fn test_detect_function_requires_selector_width() {
        let codec = codec();
        assert_eq!(codec.detect_function(&[0xa9, 0x05, 0x9c]), None);
        assert_eq!(codec.detect_function(&[0x01, 0x02, 0x03, 0x04]), None);
    }

    #[test]
    fn test_encode_single_output_accepts_bare_value() {
        let codec = codec();
        let encoded = codec.encode_function_result("balanceOf", &json!(25)).unwrap();
        assert_eq!(encoded.len(), 32);
        assert_eq!(encoded[31], 25);

        let named = codec
            .encode_function_result("balanceOf", &json!({"balance": 25}))
            .unwrap();
        assert_eq!(named, encoded);
    }

    #[test]
    fn test_encode_multi_output_requires_named_fields() {
        let codec = codec();
        let encoded = codec
            .encode_function_result("quote", &json!({"price": "340282366920938463463374607431768211456", "ok": true}))
            .unwrap();
        assert_eq!(encoded.len(), 64);

        let err = codec
            .encode_function_result("quote", &json!({"price": 1}))
            .unwrap_err();
        assert!(err.to_string().contains("missing output field 'ok'"));

        let err = codec.encode_function_result("quote", &json!(1)).unwrap_err();
        assert!(err.is_encode());
    }

    #[test]
    fn test_encode_rejects_type_mismatch() {
        let codec = codec();
        let err = codec
            .encode_function_result("transfer", &json!("yes"))
            .unwrap_err();
        assert!(err.to_string().contains("expected bool"));

        let err = json_to_token(&ParamType::Uint(8), &json!(256)).unwrap_err();
        assert!(err.contains("does not fit in uint8"));
        assert!(json_to_token(&ParamType::Int(8), &json!(-128)).is_ok());
        assert!(json_to_token(&ParamType::Int(8), &json!(128)).is_err());
    }

    #[test]
    fn test_large_integers_round_trip_as_strings() {
        let big = U256::from_dec_str("340282366920938463463374607431768211456").unwrap();
        assert_eq!(
            token_to_json(Token::Uint(big)),
            json!("340282366920938463463374607431768211456")
        );
        let negative = json_to_token(&ParamType::Int(256), &json!("-340282366920938463463374607431768211456")).unwrap();
        assert_eq!(
            token_to_json(negative),
            json!("-340282366920938463463374607431768211456")
        );
    }

    #[test]
    fn test_invalid_abi_is_reported() {
        let err = AbiCodec::from_json("{not an abi").unwrap_err();
        assert!(matches!(err, CodecError::InvalidAbi(_)));
    }
}
