// crates/core/src/agents.rs
//! Hierarchical agent contexts.
//!
//! Agents form a tree rooted at a sentinel context created when the session
//! starts. Parent links are plain ids resolved through one authoritative
//! id → context map, so the tree has no owning pointers and no cycles. Each
//! context carries a denormalized snapshot list of the tool calls attributed
//! to it while it held focus; the authoritative records live in the
//! [`ToolCallLedger`](crate::tools::ToolCallLedger).

use std::collections::HashMap;

use serde::Serialize;

use crate::tools::ToolCallRecord;

/// Id of the root context. Child agents use their spawning tool-invocation
/// id instead.
pub const ROOT_AGENT_ID: &str = "root";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Running,
    Done,
    Failed,
}

/// One agent in the tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentContext {
    pub id: String,
    /// Type label, e.g. the spawn tool's `subagent_type` argument.
    pub kind: String,
    pub description: Option<String>,
    pub status: AgentStatus,
    /// Parent id; `None` only for the root.
    pub parent: Option<String>,
    /// `parent.depth + 1`, fixed at creation.
    pub depth: u32,
    /// Unix seconds from the spawning line's timestamp, when present.
    pub started_at: Option<i64>,
    /// Denormalized snapshots of the tool calls attributed to this agent.
    pub tools: Vec<ToolCallRecord>,
}

/// Arena of agent contexts with creation-order iteration.
#[derive(Debug, Clone, Default)]
pub struct AgentTree {
    contexts: HashMap<String, AgentContext>,
    order: Vec<String>,
}

impl AgentTree {
    /// Create (or replace) the root context. Returns `true` when a prior
    /// root existed; its tool attributions are dropped with it.
    pub fn install_root(&mut self, started_at: Option<i64>) -> bool {
        let replaced = self
            .contexts
            .insert(
                ROOT_AGENT_ID.to_string(),
                AgentContext {
                    id: ROOT_AGENT_ID.to_string(),
                    kind: "session".to_string(),
                    description: None,
                    status: AgentStatus::Idle,
                    parent: None,
                    depth: 0,
                    started_at,
                    tools: Vec::new(),
                },
            )
            .is_some();
        if !replaced {
            self.order.push(ROOT_AGENT_ID.to_string());
        }
        replaced
    }

    /// Create a child context under `parent_id`. No-op when the parent is
    /// unknown or the id is already taken (a repeated spawn sighting).
    pub fn spawn(
        &mut self,
        parent_id: &str,
        id: &str,
        kind: &str,
        description: Option<String>,
        started_at: Option<i64>,
    ) -> Option<&AgentContext> {
        if self.contexts.contains_key(id) {
            return self.contexts.get(id);
        }
        let depth = self.contexts.get(parent_id)?.depth + 1;
        self.contexts.insert(
            id.to_string(),
            AgentContext {
                id: id.to_string(),
                kind: kind.to_string(),
                description,
                status: AgentStatus::Running,
                parent: Some(parent_id.to_string()),
                depth,
                started_at,
                tools: Vec::new(),
            },
        );
        self.order.push(id.to_string());
        self.contexts.get(id)
    }

    pub fn get(&self, id: &str) -> Option<&AgentContext> {
        self.contexts.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.contexts.contains_key(id)
    }

    pub fn set_status(&mut self, id: &str, status: AgentStatus) {
        if let Some(context) = self.contexts.get_mut(id) {
            context.status = status;
        }
    }

    /// Upsert a snapshot copy of `record` into the agent's owned list,
    /// keeping the denormalized view in lockstep with the ledger.
    pub fn mirror_tool(&mut self, agent_id: &str, record: &ToolCallRecord) {
        let Some(context) = self.contexts.get_mut(agent_id) else {
            return;
        };
        match context.tools.iter_mut().find(|t| t.id == record.id) {
            Some(snapshot) => *snapshot = record.clone(),
            None => context.tools.push(record.clone()),
        }
    }

    /// Contexts in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &AgentContext> {
        self.order.iter().filter_map(|id| self.contexts.get(id))
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

/// Parse an RFC 3339 timestamp to unix seconds.
pub(crate) fn parse_timestamp(ts: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.timestamp())
}
