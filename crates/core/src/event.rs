// crates/core/src/event.rs
//! Typed event model for the generator tool's line-delimited JSON stream.
//!
//! One wire line decodes into one [`Event`]. The wire format is a tagged
//! union keyed by a top-level `"type"` field; unrecognized tags land in
//! [`Event::Unknown`] so new generator versions never break consumers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One decoded unit from the input stream.
///
/// Immutable once decoded. `Unknown` preserves the raw line together with
/// its discriminator so callers can log or forward it untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SessionStart(SessionInfo),
    /// An assistant turn (wire tag `assistant`).
    TurnMessage(Turn),
    /// A user turn (wire tag `user`), including tool-result continuations.
    UserTurn(Turn),
    /// A partial-message event unwrapped from the `stream_event` envelope.
    Stream(StreamEvent),
    /// The terminating record for a turn (wire tag `result`).
    TurnResult(TurnResult),
    /// A history-compaction marker.
    CompactionBoundary(CompactionInfo),
    /// Any line whose discriminator is not recognized.
    Unknown { kind: String, raw: String },
}

impl Event {
    /// Re-encode this event as one wire line.
    ///
    /// `decode(event.to_line().as_bytes())` reproduces the same logical
    /// value for every constructible variant; `Unknown` round-trips its
    /// preserved raw line verbatim.
    pub fn to_line(&self) -> String {
        match self {
            Event::SessionStart(info) => tagged_line("session_start", info),
            Event::TurnMessage(turn) => tagged_line("assistant", turn),
            Event::UserTurn(turn) => tagged_line("user", turn),
            Event::Stream(ev) => {
                let event = serde_json::to_value(ev).unwrap_or(Value::Null);
                let mut map = Map::new();
                map.insert("type".into(), Value::String("stream_event".into()));
                map.insert("event".into(), event);
                Value::Object(map).to_string()
            }
            Event::TurnResult(result) => tagged_line("result", result),
            Event::CompactionBoundary(info) => tagged_line("compaction_boundary", info),
            Event::Unknown { raw, .. } => raw.clone(),
        }
    }
}

fn tagged_line<T: Serialize>(tag: &str, payload: &T) -> String {
    let mut map = match serde_json::to_value(payload) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    map.insert("type".into(), Value::String(tag.into()));
    Value::Object(map).to_string()
}

/// Session identity announced at stream start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// A complete assistant or user turn. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<TurnBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// The message object nested inside a turn line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Turn content is either a bare string or an array of content blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// One semantic unit inside a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    RedactedThinking {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
    },
    #[serde(rename = "tool_use")]
    ToolInvocation {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
    },
    #[serde(rename = "tool_result")]
    ToolOutcome {
        #[serde(rename = "tool_use_id", default)]
        invocation_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<OutcomeContent>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<OutcomeMeta>,
    },
    #[serde(other)]
    Other,
}

/// Tool-outcome content arrives as an array of blocks or as a bare string.
///
/// Decoding tries the shapes in declaration order; `Raw` accepts whatever is
/// left so this field can never fail to decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutcomeContent {
    Blocks(Vec<ContentBlock>),
    Text(String),
    Raw(Value),
}

/// Tool-outcome metadata arrives as a structured record or a bare string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutcomeMeta {
    Record(OutcomeRecord),
    Text(String),
    Raw(Value),
}

/// The structured shape of tool-outcome metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Partial-message events nested inside the `stream_event` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<TurnBody>,
    },
    ContentBlockStart {
        #[serde(default)]
        index: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_block: Option<ContentBlock>,
    },
    ContentBlockDelta {
        #[serde(default)]
        index: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delta: Option<Delta>,
    },
    ContentBlockStop {
        #[serde(default)]
        index: u64,
    },
    MessageDelta {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delta: Option<MessageDeltaBody>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    MessageStop,
}

/// One streamed chunk of text, reasoning, or tool input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    TextDelta {
        #[serde(default)]
        text: String,
    },
    ThinkingDelta {
        #[serde(default)]
        thinking: String,
    },
    InputJsonDelta {
        #[serde(default)]
        partial_json: String,
    },
    #[serde(other)]
    Other,
}

/// Trailing fields of a `message_delta` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageDeltaBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<String>,
}

/// The terminating record for a turn, carrying authoritative usage totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// Marker payload for a history-compaction boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompactionInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_tokens: Option<u64>,
}

/// Token counts attached to turns, stream deltas, and the turn result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}
