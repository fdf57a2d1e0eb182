//! Payload format auto-detection
//!
//! The `ExecuteTask` payload carries no format tag, so the decoder classifies it
//! heuristically. Every candidate format gets a fixed confidence and the highest
//! one wins:
//!
//! | Candidate | Condition                                   | Confidence |
//! |-----------|---------------------------------------------|------------|
//! | JSON      | parses as UTF-8 JSON                        | 0.9        |
//! | ABI       | at least 4 bytes (selector width)           | 0.8        |
//! | Text      | non-empty UTF-8 without control characters  | 0.7        |
//! | Raw       | always                                      | 0.5        |
//!
//! The ABI rule is a width check only. Plain text of four or more bytes is
//! classified as ABI unless it also parses as JSON; callers that attach an
//! [`AbiCodec`] can tell a real call apart via [`DecodedValue::Abi::function`].
//! Decoding never fails.

use crate::abi::{AbiCodec, SELECTOR_LEN};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub const JSON_CONFIDENCE: f32 = 0.9;
pub const ABI_CONFIDENCE: f32 = 0.8;
pub const TEXT_CONFIDENCE: f32 = 0.7;
pub const RAW_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadFormat {
    Abi,
    Json,
    Text,
    Raw,
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PayloadFormat::Abi => "abi",
            PayloadFormat::Json => "json",
            PayloadFormat::Text => "text",
            PayloadFormat::Raw => "raw",
        };
        f.write_str(name)
    }
}

/// Classified payload content
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    /// Call data: selector plus encoded arguments
    Abi {
        selector: [u8; SELECTOR_LEN],
        /// Function whose selector matched, when a codec is attached
        function: Option<String>,
        data: Vec<u8>,
    },
    Json(Value),
    Text(String),
    Raw(Vec<u8>),
}

/// Classification result
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPayload {
    pub value: DecodedValue,
    pub confidence: f32,
}

impl DecodedPayload {
    pub fn format(&self) -> PayloadFormat {
        match self.value {
            DecodedValue::Abi { .. } => PayloadFormat::Abi,
            DecodedValue::Json(_) => PayloadFormat::Json,
            DecodedValue::Text(_) => PayloadFormat::Text,
            DecodedValue::Raw(_) => PayloadFormat::Raw,
        }
    }
}

/// Heuristic payload classifier
#[derive(Debug, Clone, Default)]
pub struct PayloadAutoDecoder {
    abi: Option<Arc<AbiCodec>>,
}

impl PayloadAutoDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an ABI codec used to resolve selectors to function names
    pub fn with_abi(abi: Arc<AbiCodec>) -> Self {
        Self { abi: Some(abi) }
    }

    pub fn abi(&self) -> Option<&Arc<AbiCodec>> {
        self.abi.as_ref()
    }

    /// Classify `bytes`, picking the highest-confidence candidate
    pub fn decode(&self, bytes: &[u8]) -> DecodedPayload {
        let mut best = self.abi_candidate(bytes);

        for candidate in [json_candidate(bytes), text_candidate(bytes)]
            .into_iter()
            .flatten()
        {
            if best
                .as_ref()
                .map_or(true, |current| candidate.confidence > current.confidence)
            {
                best = Some(candidate);
            }
        }

        best.unwrap_or_else(|| raw_candidate(bytes))
    }

    /// Classify `bytes` ignoring the ABI width heuristic
    pub fn decode_non_abi(&self, bytes: &[u8]) -> DecodedPayload {
        json_candidate(bytes)
            .or_else(|| text_candidate(bytes))
            .unwrap_or_else(|| raw_candidate(bytes))
    }

    fn abi_candidate(&self, bytes: &[u8]) -> Option<DecodedPayload> {
        let selector: [u8; SELECTOR_LEN] = bytes.get(..SELECTOR_LEN)?.try_into().ok()?;
        let function = self
            .abi
            .as_ref()
            .and_then(|abi| abi.detect_function(bytes))
            .map(str::to_string);
        Some(DecodedPayload {
            value: DecodedValue::Abi {
                selector,
                function,
                data: bytes.to_vec(),
            },
            confidence: ABI_CONFIDENCE,
        })
    }
}

fn json_candidate(bytes: &[u8]) -> Option<DecodedPayload> {
    let text = std::str::from_utf8(bytes).ok()?;
    let value = serde_json::from_str::<Value>(text).ok()?;
    Some(DecodedPayload {
        value: DecodedValue::Json(value),
        confidence: JSON_CONFIDENCE,
    })
}

fn text_candidate(bytes: &[u8]) -> Option<DecodedPayload> {
    if bytes.is_empty() {
        return None;
    }
    let text = std::str::from_utf8(bytes).ok()?;
    if text
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
    {
        return None;
    }
    Some(DecodedPayload {
        value: DecodedValue::Text(text.to_string()),
        confidence: TEXT_CONFIDENCE,
    })
}

fn raw_candidate(bytes: &[u8]) -> DecodedPayload {
    DecodedPayload {
        value: DecodedValue::Raw(bytes.to_vec()),
        confidence: RAW_CONFIDENCE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_supersedes_abi_width_guess() {
        let decoded = PayloadAutoDecoder::new().decode(br#"{"n":5}"#);
        assert_eq!(decoded.format(), PayloadFormat::Json);
        assert_eq!(decoded.confidence, JSON_CONFIDENCE);
        assert_eq!(decoded.value, DecodedValue::Json(json!({"n": 5})));
    }

    #[test]
    fn test_short_json_number_is_json() {
        let decoded = PayloadAutoDecoder::new().decode(b"42");
        assert_eq!(decoded.value, DecodedValue::Json(json!(42)));
    }

    #[test]
    fn test_four_plus_bytes_of_text_classify_as_abi() {
        let decoded = PayloadAutoDecoder::new().decode(b"hello");
        assert_eq!(decoded.format(), PayloadFormat::Abi);
        assert_eq!(decoded.confidence, ABI_CONFIDENCE);
        match decoded.value {
            DecodedValue::Abi { selector, function, .. } => {
                assert_eq!(&selector, b"hell");
                assert!(function.is_none());
            }
            other => panic!("expected ABI classification, got {:?}", other),
        }
    }

    #[test]
    fn test_short_text_and_binary() {
        let decoder = PayloadAutoDecoder::new();
        assert_eq!(
            decoder.decode(b"hey").value,
            DecodedValue::Text("hey".to_string())
        );
        // Control characters disqualify text
        assert_eq!(decoder.decode(&[0x01, 0x02]).value, DecodedValue::Raw(vec![1, 2]));
        assert_eq!(decoder.decode(&[]).confidence, RAW_CONFIDENCE);
        assert_eq!(decoder.decode(&[0xff, 0xfe, 0xfd]).format(), PayloadFormat::Raw);
    }

    #[test]
    fn test_decode_non_abi_skips_width_heuristic() {
        let decoder = PayloadAutoDecoder::new();
        assert_eq!(
            decoder.decode_non_abi(b"hello\n").value,
            DecodedValue::Text("hello\n".to_string())
        );
        assert_eq!(
            decoder.decode_non_abi(&[0, 0, 0, 0, 1]).format(),
            PayloadFormat::Raw
        );
    }

    #[test]
    fn test_attached_codec_resolves_selector() {
        let abi = AbiCodec::from_json(
            r#"[{"type":"function","name":"square","stateMutability":"pure",
                 "inputs":[{"name":"n","type":"uint256"}],
                 "outputs":[{"name":"","type":"uint256"}]}]"#,
        )
        .unwrap();
        let call = abi
            .encode_function_call("square", json!({"n": 7}).as_object().unwrap())
            .unwrap();

        let decoded = PayloadAutoDecoder::with_abi(Arc::new(abi)).decode(&call);
        match decoded.value {
            DecodedValue::Abi { function, data, .. } => {
                assert_eq!(function.as_deref(), Some("square"));
                assert_eq!(data, call);
            }
            other => panic!("expected ABI classification, got {:?}", other),
        }
    }
}
