// crates/core/src/usage.rs
use serde::Serialize;

use crate::event::Usage;

/// Running token counters for a session.
///
/// Counters never decrease. Every usage record on the wire is treated as a
/// monotone snapshot, so [`merge`](TokenLedger::merge) takes the per-counter
/// maximum; the terminating result record's totals arrive last and therefore
/// win. `total` is recomputed as `input + output` on every update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenLedger {
    pub input: u64,
    pub output: u64,
    pub cache_write: u64,
    pub cache_read: u64,
    pub total: u64,
}

impl TokenLedger {
    pub fn merge(&mut self, usage: &Usage) {
        self.input = self.input.max(usage.input_tokens);
        self.output = self.output.max(usage.output_tokens);
        self.cache_write = self.cache_write.max(usage.cache_creation_input_tokens);
        self.cache_read = self.cache_read.max(usage.cache_read_input_tokens);
        self.total = self.input + self.output;
    }
}
