//! # Performer Payload Codec
//!
//! Converts between the opaque `ExecuteTask` payload bytes and the typed values
//! a worker operates on, and back again for results.
//!
//! ## Components
//!
//! - [`strategy`]: fixed serialization strategies (`raw`, `json`, `number`)
//! - [`auto_decoder`]: heuristic format classification with confidence scores
//! - [`abi`]: Solidity ABI call-data decoding and result encoding via `ethabi`
//!
//! ## Usage
//!
//! ```rust
//! use performer_codec::{PayloadAutoDecoder, PayloadFormat};
//!
//! let decoded = PayloadAutoDecoder::new().decode(br#"{"n":5}"#);
//! assert_eq!(decoded.format(), PayloadFormat::Json);
//! ```

pub mod abi;
pub mod auto_decoder;
pub mod error;
pub mod strategy;

pub use abi::{AbiCodec, AbiFunctionInfo, AbiParam, SELECTOR_LEN};
pub use auto_decoder::{DecodedPayload, DecodedValue, PayloadAutoDecoder, PayloadFormat};
pub use error::{CodecError, Result};
pub use strategy::{
    strategy_for, JsonStrategy, NumberStrategy, PayloadValue, RawStrategy,
    SerializationStrategy, StrategyKind,
};
