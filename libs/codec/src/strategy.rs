//! Serialization strategies
//!
//! A strategy converts between payload bytes and a [`PayloadValue`]. Three are
//! provided: `raw` (bytes pass through), `json` (UTF-8 JSON text) and `number`
//! (exactly 8 bytes, big-endian `u64`).

use crate::error::{CodecError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Typed value moved in and out of a payload
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadValue {
    Bytes(Vec<u8>),
    Text(String),
    Json(Value),
    Number(u64),
}

/// Strategy selector, as written in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Raw,
    Json,
    Number,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Raw => "raw",
            StrategyKind::Json => "json",
            StrategyKind::Number => "number",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(StrategyKind::Raw),
            "json" => Ok(StrategyKind::Json),
            "number" => Ok(StrategyKind::Number),
            other => Err(CodecError::decode(
                "strategy",
                format!("unknown serialization strategy '{}'", other),
            )),
        }
    }
}

/// Converts between payload bytes and typed values
pub trait SerializationStrategy: Send + Sync + fmt::Debug {
    fn kind(&self) -> StrategyKind;

    fn serialize(&self, value: &PayloadValue) -> Result<Vec<u8>>;

    fn deserialize(&self, bytes: &[u8]) -> Result<PayloadValue>;

    /// Cheap check whether `deserialize` would succeed
    fn can_deserialize(&self, bytes: &[u8]) -> bool {
        self.deserialize(bytes).is_ok()
    }
}

/// Bytes in, bytes out. Accepts text on the way out.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawStrategy;

impl SerializationStrategy for RawStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Raw
    }

    fn serialize(&self, value: &PayloadValue) -> Result<Vec<u8>> {
        match value {
            PayloadValue::Bytes(bytes) => Ok(bytes.clone()),
            PayloadValue::Text(text) => Ok(text.as_bytes().to_vec()),
            other => Err(CodecError::encode(
                "raw",
                format!("raw strategy requires bytes or string input, got {}", describe(other)),
            )),
        }
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<PayloadValue> {
        Ok(PayloadValue::Bytes(bytes.to_vec()))
    }

    fn can_deserialize(&self, _bytes: &[u8]) -> bool {
        true
    }
}

/// UTF-8 JSON text
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonStrategy;

impl SerializationStrategy for JsonStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Json
    }

    fn serialize(&self, value: &PayloadValue) -> Result<Vec<u8>> {
        let json = match value {
            PayloadValue::Json(json) => json.clone(),
            PayloadValue::Text(text) => Value::String(text.clone()),
            PayloadValue::Number(n) => Value::from(*n),
            PayloadValue::Bytes(_) => {
                return Err(CodecError::encode(
                    "json",
                    "raw bytes have no JSON representation",
                ))
            }
        };
        serde_json::to_vec(&json).map_err(|e| CodecError::encode("json", e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<PayloadValue> {
        let text =
            std::str::from_utf8(bytes).map_err(|e| CodecError::decode("json", e.to_string()))?;
        serde_json::from_str(text)
            .map(PayloadValue::Json)
            .map_err(|e| CodecError::decode("json", e.to_string()))
    }
}

/// Exactly 8 bytes, big-endian unsigned 64-bit integer
#[derive(Debug, Default, Clone, Copy)]
pub struct NumberStrategy;

impl NumberStrategy {
    pub const WIDTH: usize = 8;
}

impl SerializationStrategy for NumberStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Number
    }

    fn serialize(&self, value: &PayloadValue) -> Result<Vec<u8>> {
        let n = match value {
            PayloadValue::Number(n) => *n,
            PayloadValue::Json(json) => json.as_u64().ok_or_else(|| {
                CodecError::encode("number", format!("{} is not an unsigned 64-bit integer", json))
            })?,
            other => {
                return Err(CodecError::encode(
                    "number",
                    format!("number strategy requires an integer, got {}", describe(other)),
                ))
            }
        };
        Ok(n.to_be_bytes().to_vec())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<PayloadValue> {
        let array: [u8; NumberStrategy::WIDTH] = bytes.try_into().map_err(|_| {
            CodecError::decode(
                "number",
                format!("expected exactly {} bytes, got {}", Self::WIDTH, bytes.len()),
            )
        })?;
        Ok(PayloadValue::Number(u64::from_be_bytes(array)))
    }

    fn can_deserialize(&self, bytes: &[u8]) -> bool {
        bytes.len() == Self::WIDTH
    }
}

/// Strategy instance for a configured kind
pub fn strategy_for(kind: StrategyKind) -> Box<dyn SerializationStrategy> {
    match kind {
        StrategyKind::Raw => Box::new(RawStrategy),
        StrategyKind::Json => Box::new(JsonStrategy),
        StrategyKind::Number => Box::new(NumberStrategy),
    }
}

fn describe(value: &PayloadValue) -> &'static str {
    match value {
        PayloadValue::Bytes(_) => "bytes",
        PayloadValue::Text(_) => "text",
        PayloadValue::Json(_) => "json",
        PayloadValue::Number(_) => "number",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_accepts_bytes_and_text_only() {
        let raw = RawStrategy;
        assert_eq!(raw.serialize(&PayloadValue::Text("hi".into())).unwrap(), b"hi");
        assert_eq!(raw.serialize(&PayloadValue::Bytes(vec![0, 1])).unwrap(), vec![0, 1]);
        assert!(raw.serialize(&PayloadValue::Number(5)).unwrap_err().is_encode());
        assert!(raw.can_deserialize(&[0xff, 0x00]));
    }

    #[test]
    fn test_json_rejects_invalid_utf8_and_text() {
        let strategy = JsonStrategy;
        assert!(strategy.deserialize(&[0xff, 0xfe]).unwrap_err().is_decode());
        assert!(!strategy.can_deserialize(b"{not json"));
        assert_eq!(
            strategy.deserialize(br#"{"n":5}"#).unwrap(),
            PayloadValue::Json(json!({"n": 5}))
        );
    }

    #[test]
    fn test_number_requires_exactly_eight_bytes() {
        let strategy = NumberStrategy;
        let bytes = strategy.serialize(&PayloadValue::Number(0x0102)).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(strategy.deserialize(&bytes).unwrap(), PayloadValue::Number(258));

        assert!(!strategy.can_deserialize(&[0; 7]));
        let err = strategy.deserialize(&[0; 9]).unwrap_err();
        assert!(err.to_string().contains("expected exactly 8 bytes, got 9"));
    }

    #[test]
    fn test_number_accepts_json_integers() {
        let bytes = NumberStrategy.serialize(&PayloadValue::Json(json!(25))).unwrap();
        assert_eq!(u64::from_be_bytes(bytes.try_into().unwrap()), 25);
        assert!(NumberStrategy.serialize(&PayloadValue::Json(json!(-1))).is_err());
    }

    #[test]
    fn test_strategy_kind_parsing() {
        assert_eq!("JSON".parse::<StrategyKind>().unwrap(), StrategyKind::Json);
        assert_eq!(strategy_for(StrategyKind::Number).kind(), StrategyKind::Number);
        assert!("protobuf".parse::<StrategyKind>().is_err());
    }
}
