//! Request body encoding: JSON object of the event fields, gzip-compressed.

use std::{collections::BTreeMap, io::Write};

use bytes::Bytes;
use flate2::{write::GzEncoder, Compression};
use serde_json::Value;

use crate::error::DeliveryError;

/// Serializes the field map as a JSON object in key order.
///
/// # Errors
///
/// Returns `DeliveryError::Fatal` if serialization fails.
pub fn encode_json(fields: &BTreeMap<String, Value>) -> Result<Vec<u8>, DeliveryError> {
    serde_json::to_vec(fields).map_err(|e| DeliveryError::fatal(format!("failed to encode event: {e}")))
}

/// Gzip-compresses `data`.
///
/// # Errors
///
/// Returns `DeliveryError::Fatal` if the encoder fails.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, DeliveryError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2 + 32), Compression::default());
    encoder
        .write_all(data)
        .and_then(|()| encoder.finish())
        .map_err(|e| DeliveryError::fatal(format!("failed to compress event: {e}")))
}

/// Produces the request body for a field map.
///
/// # Errors
///
/// Returns `DeliveryError::Fatal` if encoding or compression fails.
pub fn encode(fields: &BTreeMap<String, Value>) -> Result<Bytes, DeliveryError> {
    let json = encode_json(fields)?;
    compress(&json).map(Bytes::from)
}
