//! Value encoding for the `*_value` socket helpers

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::IpcError;

pub fn encode_value<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, IpcError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| IpcError::Serialization(e.to_string()))
}

pub fn decode_value<T: DeserializeOwned>(payload: &[u8]) -> Result<T, IpcError> {
    serde_json::from_slice(payload).map_err(|e| IpcError::Deserialization(e.to_string()))
}
