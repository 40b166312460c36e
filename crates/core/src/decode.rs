// crates/core/src/decode.rs
//! Incremental line decoder for the generator tool's JSON stream.
//!
//! Each wire line is read into a generic envelope first to extract the
//! `"type"` discriminator, then re-decoded into the concrete [`Event`]
//! variant. Unrecognized discriminators become [`Event::Unknown`] rather
//! than errors, so the decoder stays forward-compatible with generator
//! versions it has never seen.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde_json::Value;

use crate::error::DecodeError;
use crate::event::{Event, StreamEvent};

/// Nested discriminators accepted inside the `stream_event` envelope.
const STREAM_KINDS: &[&str] = &[
    "message_start",
    "content_block_start",
    "content_block_delta",
    "content_block_stop",
    "message_delta",
    "message_stop",
];

/// Decode one wire line into an [`Event`].
///
/// This function never panics. Malformed JSON, a missing or non-string
/// discriminator, truncated input, embedded NUL bytes, invalid byte
/// sequences, and oversized or deeply nested documents all come back as
/// `Err(DecodeError)`; any fault inside the decoder itself is caught and
/// reported as [`DecodeError::InternalFault`]. Nesting depth is bounded by
/// serde_json's recursion limit, so adversarial input cannot grow the
/// stack.
pub fn decode(bytes: &[u8]) -> Result<Event, DecodeError> {
    match catch_unwind(AssertUnwindSafe(|| decode_line(bytes))) {
        Ok(result) => result,
        Err(_) => Err(DecodeError::InternalFault),
    }
}

fn decode_line(bytes: &[u8]) -> Result<Event, DecodeError> {
    let value: Value = serde_json::from_slice(bytes).map_err(DecodeError::malformed)?;

    let kind = match value.get("type").and_then(Value::as_str) {
        Some(kind) => kind.to_string(),
        None => {
            return Err(DecodeError::malformed(
                "missing or non-string type discriminator",
            ))
        }
    };

    match kind.as_str() {
        "session_start" => Ok(Event::SessionStart(concrete(value)?)),
        "assistant" => Ok(Event::TurnMessage(concrete(value)?)),
        "user" => Ok(Event::UserTurn(concrete(value)?)),
        "result" => Ok(Event::TurnResult(concrete(value)?)),
        "compaction_boundary" => Ok(Event::CompactionBoundary(concrete(value)?)),
        "stream_event" => unwrap_stream(value, bytes),
        _ => Ok(unknown(kind, bytes)),
    }
}

/// Re-decode the envelope into a concrete payload type.
fn concrete<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(DecodeError::malformed)
}

/// Unwrap the `stream_event` envelope around a nested partial-message event.
///
/// A wrapper with no nested event, or one whose nested discriminator is not
/// a known stream kind, falls back to [`Event::Unknown`] so the line is
/// preserved instead of rejected.
fn unwrap_stream(mut value: Value, bytes: &[u8]) -> Result<Event, DecodeError> {
    let nested = match value.get_mut("event") {
        Some(event) if event.is_object() => event.take(),
        _ => return Ok(unknown("stream_event".to_string(), bytes)),
    };

    let sub_kind = nested
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_string);
    match sub_kind.as_deref() {
        Some(sub) if STREAM_KINDS.contains(&sub) => {
            let event: StreamEvent =
                serde_json::from_value(nested).map_err(DecodeError::malformed)?;
            Ok(Event::Stream(event))
        }
        Some(sub) => Ok(unknown(format!("stream_event:{sub}"), bytes)),
        None => Ok(unknown("stream_event".to_string(), bytes)),
    }
}

fn unknown(kind: String, bytes: &[u8]) -> Event {
    Event::Unknown {
        kind,
        raw: String::from_utf8_lossy(bytes).into_owned(),
    }
}
