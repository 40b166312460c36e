// crates/core/src/tools.rs
//! Lifecycle tracking for tool invocations.
//!
//! The ledger is the single authoritative id → record map. Records move
//! forward only: creation enters `Pending` (block start, no input yet) or
//! `Running` (fully formed invocation), and the only terminal transition is
//! a matching outcome. Outcomes for unknown ids are ignored; a record is
//! never fabricated from its result.

use std::collections::HashMap;

use serde::Serialize;

/// Where a tool invocation is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ToolStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ToolStatus::Completed | ToolStatus::Failed)
    }
}

/// One tool invocation, from first sighting to outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    /// Raw encoded parameters. May fill incrementally from streamed
    /// fragments before the complete invocation arrives.
    pub input: String,
    pub status: ToolStatus,
    pub result: Option<String>,
    pub is_error: bool,
}

impl ToolCallRecord {
    fn new(id: &str, name: &str, status: ToolStatus) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            input: String::new(),
            status,
            result: None,
            is_error: false,
        }
    }
}

/// Authoritative id → [`ToolCallRecord`] map.
#[derive(Debug, Clone, Default)]
pub struct ToolCallLedger {
    records: HashMap<String, ToolCallRecord>,
}

impl ToolCallLedger {
    /// First sighting via a stream block start: the record exists but has
    /// no input yet. An existing record is left as it is.
    pub fn upsert_pending(&mut self, id: &str, name: &str) -> &ToolCallRecord {
        self.records
            .entry(id.to_string())
            .or_insert_with(|| ToolCallRecord::new(id, name, ToolStatus::Pending))
    }

    /// A fully formed invocation: create or merge. Merging updates the name
    /// and input and promotes `Pending` to `Running`, but a terminal record
    /// is never mutated.
    pub fn upsert_running(
        &mut self,
        id: &str,
        name: &str,
        input: Option<String>,
    ) -> &ToolCallRecord {
        let record = self
            .records
            .entry(id.to_string())
            .or_insert_with(|| ToolCallRecord::new(id, name, ToolStatus::Running));
        if !record.status.is_terminal() {
            record.status = ToolStatus::Running;
            if !name.is_empty() {
                record.name = name.to_string();
            }
            if let Some(input) = input {
                record.input = input;
            }
        }
        record
    }

    /// Append a streamed input fragment. No-op for unknown ids and for
    /// records that already reached a terminal status.
    pub fn append_input(&mut self, id: &str, fragment: &str) -> Option<&ToolCallRecord> {
        let record = self.records.get_mut(id)?;
        if !record.status.is_terminal() {
            record.input.push_str(fragment);
        }
        Some(record)
    }

    /// The one terminal transition, triggered by a matching outcome.
    ///
    /// Returns `None` for an unknown id, leaving the ledger untouched.
    /// A duplicate outcome for an already-terminal record overwrites the
    /// previous result instead of being rejected.
    pub fn complete(
        &mut self,
        id: &str,
        result: Option<String>,
        is_error: bool,
    ) -> Option<&ToolCallRecord> {
        let record = self.records.get_mut(id)?;
        if record.status.is_terminal() {
            tracing::debug!(id, "duplicate terminal outcome overwrites prior result");
        }
        record.status = if is_error {
            ToolStatus::Failed
        } else {
            ToolStatus::Completed
        };
        record.result = result;
        record.is_error = is_error;
        Some(record)
    }

    pub fn get(&self, id: &str) -> Option<&ToolCallRecord> {
        self.records.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolCallRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
