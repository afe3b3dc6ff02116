//! Shared helpers for operation response parsers.
//!
//! Service failures come in a handful of shapes depending on the API family:
//! `{"message": ..., "error": true}`, `{"error": {"message": ...}}`, `{"error_message": ...}` and the
//! publish-style tuple `[0, "message", ...]`. All of them become [`Error::ApiStatus`] with the
//! service's text unmodified.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::endpoint::OperationType;
use crate::endpoint::status::StatusMetadata;
use crate::errors::{Error, Result};

/// Reject non-2xx responses and 2xx bodies that flag an error.
pub(crate) fn ensure_success(
    operation: OperationType,
    body: &[u8],
    status: &StatusMetadata,
) -> Result<()> {
    let code = status.status_code.unwrap_or_default();
    let is_http_success = (200..300).contains(&code);

    if is_http_success && !flags_error(body) {
        return Ok(());
    }

    let message = service_message(body).unwrap_or_else(|| fallback_message(code, body));
    Err(Error::ApiStatus {
        operation,
        status: code,
        message,
    })
}

/// Decode a JSON body into `T`, keeping the raw body on failure.
pub(crate) fn decode_json<T: DeserializeOwned>(operation: OperationType, body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|err| Error::parsing(operation, body, err))
}

/// [`ensure_success`] followed by [`decode_json`].
pub(crate) fn parse_json<T: DeserializeOwned>(
    operation: OperationType,
    body: &[u8],
    status: &StatusMetadata,
) -> Result<T> {
    ensure_success(operation, body, status)?;
    decode_json(operation, body)
}

/// Extract the service's own error text, if the body carries one.
pub(crate) fn service_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    match &value {
        Value::Object(map) => map
            .get("error")
            .and_then(|e| e.get("message"))
            .or_else(|| map.get("message"))
            .or_else(|| map.get("error_message"))
            .or_else(|| map.get("error").filter(|e| e.is_string()))
            .and_then(Value::as_str)
            .map(str::to_string),
        Value::Array(items) => match items.as_slice() {
            [Value::Number(flag), Value::String(message), ..] if flag.as_u64() == Some(0) => {
                Some(message.clone())
            }
            _ => None,
        },
        _ => None,
    }
}

fn flags_error(body: &[u8]) -> bool {
    let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) else {
        return false;
    };
    match map.get("error") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Object(_)) => true,
        _ => false,
    }
}

fn fallback_message(code: u16, body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if !text.is_empty() {
        return text.to_string();
    }
    reqwest::StatusCode::from_u16(code)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("Unknown Error")
        .to_string()
}
