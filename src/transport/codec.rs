//! JSON framing for protocol messages.
//!
//! Each message or response is one JSON object; the lock name and member
//! identities travel as plain strings.

use super::message::{LockMessage, LockResponse};
use crate::error::{LockError, Result};

pub fn encode_message(message: &LockMessage) -> Result<Vec<u8>> {
    serde_json::to_vec(message)
        .map_err(|e| LockError::Codec(format!("failed to encode {} message: {}", message.kind(), e)))
}

pub fn decode_message(bytes: &[u8]) -> Result<LockMessage> {
    serde_json::from_slice(bytes)
        .map_err(|e| LockError::Codec(format!("failed to decode lock message: {}", e)))
}

pub fn encode_response(response: &LockResponse) -> Result<Vec<u8>> {
    serde_json::to_vec(response)
        .map_err(|e| LockError::Codec(format!("failed to encode lock response: {}", e)))
}

pub fn decode_response(bytes: &[u8]) -> Result<LockResponse> {
    serde_json::from_slice(bytes)
        .map_err(|e| LockError::Codec(format!("failed to decode lock response: {}", e)))
}
