//! Codec errors
//!
//! Every variant names the format or function involved so that a failed task
//! can be diagnosed from its error message alone.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    /// Payload could not be decoded under the selected format
    #[error("Decode error ({format}): {reason}")]
    Decode { format: String, reason: String },

    /// Value could not be encoded under the selected format
    #[error("Encode error ({format}): {reason}")]
    Encode { format: String, reason: String },

    /// Function name is not part of the loaded ABI
    #[error("Unknown ABI function: {0}")]
    UnknownFunction(String),

    /// The ABI definition itself could not be parsed
    #[error("Invalid ABI definition: {0}")]
    InvalidAbi(String),
}

impl CodecError {
    pub fn decode(format: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            format: format.into(),
            reason: reason.into(),
        }
    }

    pub fn encode(format: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Encode {
            format: format.into(),
            reason: reason.into(),
        }
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }

    pub fn is_encode(&self) -> bool {
        matches!(self, Self::Encode { .. })
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
