// crates/core/src/stream.rs
//! Buffers for in-progress streamed content.
//!
//! Stream deltas arrive at arbitrary chunk boundaries; these buffers simply
//! append fragments in arrival order. Tool-input fragments are addressed by
//! block index on the wire, so the accumulator keeps an open-block table
//! mapping each index to the tool id it was opened for.

use std::collections::HashMap;

/// Partial text, reasoning, and tool-input accumulated between message
/// boundaries. The whole set clears together, never partially.
#[derive(Debug, Clone, Default)]
pub struct StreamAccumulator {
    partial_text: String,
    partial_thinking: String,
    partial_tool_input: HashMap<String, String>,
    open_blocks: HashMap<u64, String>,
}

impl StreamAccumulator {
    pub fn push_text(&mut self, chunk: &str) {
        self.partial_text.push_str(chunk);
    }

    pub fn push_thinking(&mut self, chunk: &str) {
        self.partial_thinking.push_str(chunk);
    }

    /// Register a tool block opening at `index` so later fragments for that
    /// index can be routed to the tool's buffer.
    pub fn open_tool_block(&mut self, index: u64, tool_id: &str) {
        self.open_blocks.insert(index, tool_id.to_string());
        self.partial_tool_input
            .entry(tool_id.to_string())
            .or_default();
    }

    /// Append a raw JSON fragment to the buffer of the tool opened at
    /// `index`. Returns the tool id the fragment was routed to, or `None`
    /// when no block was opened at that index (the fragment is dropped).
    pub fn push_tool_input(&mut self, index: u64, fragment: &str) -> Option<&str> {
        let tool_id = self.open_blocks.get(&index)?;
        if let Some(buffer) = self.partial_tool_input.get_mut(tool_id) {
            buffer.push_str(fragment);
        }
        Some(tool_id.as_str())
    }

    pub fn text(&self) -> &str {
        &self.partial_text
    }

    pub fn thinking(&self) -> &str {
        &self.partial_thinking
    }

    pub fn tool_input(&self, tool_id: &str) -> Option<&str> {
        self.partial_tool_input.get(tool_id).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.partial_text.is_empty()
            && self.partial_thinking.is_empty()
            && self.partial_tool_input.is_empty()
    }

    /// Reset every buffer category at once.
    pub fn clear(&mut self) {
        self.partial_text.clear();
        self.partial_thinking.clear();
        self.partial_tool_input.clear();
        self.open_blocks.clear();
    }
}
