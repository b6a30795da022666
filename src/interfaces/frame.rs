//! OCPP-J message framing
//!
//! - **Call**       `[2, "<uniqueId>", "<action>", {<payload>}]`
//! - **CallResult** `[3, "<uniqueId>", {<payload>}]`
//! - **CallError**  `[4, "<uniqueId>", "<errorCode>", "<errorDescription>", {<errorDetails>}]`

use serde_json::Value;
use thiserror::Error;

const MSG_TYPE_CALL: u64 = 2;
const MSG_TYPE_CALL_RESULT: u64 = 3;
const MSG_TYPE_CALL_ERROR: u64 = 4;

/// A parsed OCPP-J frame.
#[derive(Debug, Clone, PartialEq)]
pub enum OcppFrame {
    Call {
        unique_id: String,
        action: String,
        payload: Value,
    },
    CallResult {
        unique_id: String,
        payload: Value,
    },
    CallError {
        unique_id: String,
        error_code: String,
        error_description: String,
        error_details: Value,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Frame is not a non-empty array")]
    NotAnArray,

    #[error("Unknown message type: {0}")]
    UnknownMessageType(u64),

    #[error("Expected at least {expected} fields, got {got}")]
    MissingFields { expected: usize, got: usize },

    #[error("Field type mismatch: {0}")]
    FieldTypeMismatch(&'static str),
}

impl OcppFrame {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
        let arr = match value {
            Value::Array(arr) if !arr.is_empty() => arr,
            _ => return Err(FrameError::NotAnArray),
        };

        let msg_type = arr[0]
            .as_u64()
            .ok_or(FrameError::FieldTypeMismatch("messageTypeId must be a number"))?;
        let expected = match msg_type {
            MSG_TYPE_CALL | MSG_TYPE_CALL_ERROR => 4,
            MSG_TYPE_CALL_RESULT => 3,
            other => return Err(FrameError::UnknownMessageType(other)),
        };
        if arr.len() < expected {
            return Err(FrameError::MissingFields {
                expected,
                got: arr.len(),
            });
        }

        let unique_id = arr[1]
            .as_str()
            .ok_or(FrameError::FieldTypeMismatch("uniqueId must be a string"))?
            .to_string();

        let frame = match msg_type {
            MSG_TYPE_CALL => Self::Call {
                unique_id,
                action: arr[2]
                    .as_str()
                    .ok_or(FrameError::FieldTypeMismatch("action must be a string"))?
                    .to_string(),
                payload: arr[3].clone(),
            },
            MSG_TYPE_CALL_RESULT => Self::CallResult {
                unique_id,
                payload: arr[2].clone(),
            },
            _ => Self::CallError {
                unique_id,
                error_code: arr[2].as_str().unwrap_or("InternalError").to_string(),
                error_description: arr[3].as_str().unwrap_or("").to_string(),
                error_details: arr.get(4).cloned().unwrap_or_else(empty_object),
            },
        };
        Ok(frame)
    }

    pub fn serialize(&self) -> String {
        let arr = match self {
            Self::Call {
                unique_id,
                action,
                payload,
            } => vec![
                Value::from(MSG_TYPE_CALL),
                Value::from(unique_id.as_str()),
                Value::from(action.as_str()),
                payload.clone(),
            ],
            Self::CallResult { unique_id, payload } => vec![
                Value::from(MSG_TYPE_CALL_RESULT),
                Value::from(unique_id.as_str()),
                payload.clone(),
            ],
            Self::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => vec![
                Value::from(MSG_TYPE_CALL_ERROR),
                Value::from(unique_id.as_str()),
                Value::from(error_code.as_str()),
                Value::from(error_description.as_str()),
                error_details.clone(),
            ],
        };
        Value::Array(arr).to_string()
    }

    pub fn unique_id(&self) -> &str {
        match self {
            Self::Call { unique_id, .. }
            | Self::CallResult { unique_id, .. }
            | Self::CallError { unique_id, .. } => unique_id,
        }
    }

    pub fn error_response(
        unique_id: impl Into<String>,
        error_code: impl Into<String>,
        error_description: impl Into<String>,
    ) -> Self {
        Self::CallError {
            unique_id: unique_id.into(),
            error_code: error_code.into(),
            error_description: error_description.into(),
            error_details: empty_object(),
        }
    }
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}
