//! Task request and response types

use serde::{Deserialize, Serialize};

/// A task-execution request as received from the RPC surface.
///
/// Immutable once received: the processor and every pipeline stage only borrow it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Caller-assigned identifier, unique per in-flight task
    pub task_id: String,
    /// Opaque payload, base64 on the JSON wire
    #[serde(with = "payload_base64")]
    pub payload: Vec<u8>,
}

impl TaskRequest {
    pub fn new(task_id: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            task_id: task_id.into(),
            payload: payload.into(),
        }
    }

    /// Payload size in bytes
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }
}

/// The result of a task execution.
///
/// `task_id` must equal the originating request's `task_id`; the processor
/// rejects responses that do not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub task_id: String,
    #[serde(with = "payload_base64")]
    pub result: Vec<u8>,
}

impl TaskResponse {
    pub fn new(task_id: impl Into<String>, result: impl Into<Vec<u8>>) -> Self {
        Self {
            task_id: task_id.into(),
            result: result.into(),
        }
    }

    /// Result size in bytes
    pub fn result_size(&self) -> usize {
        self.result.len()
    }
}

/// Serde adapter encoding `Vec<u8>` as standard base64 text
pub mod payload_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format_uses_base64() {
        let request = TaskRequest::new("t1", b"{\"n\":5}".to_vec());
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"task_id":"t1","payload":"eyJuIjo1fQ=="}"#);

        let parsed: TaskRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, request);
        assert_eq!(parsed.payload_size(), 7);
    }

    #[test]
    fn test_invalid_base64_is_rejected() {
        let result: Result<TaskRequest, _> =
            serde_json::from_str(r#"{"task_id":"t1","payload":"!!not-base64!!"}"#);
        assert!(result.is_err());
    }
}
