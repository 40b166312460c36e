// crates/core/src/session.rs
//! Session state driven by decoded events.
//!
//! `SessionState` is a pure state machine: feed it events with
//! [`apply`](SessionState::apply), read the projections. Mutators never
//! fail; anything that cannot be applied degrades to a silent no-op so one
//! odd line can never wedge the session. There is no internal locking;
//! callers that share a state across threads must serialize access around
//! each `apply`.

use std::collections::HashMap;

use serde_json::Value;

use crate::agents::{parse_timestamp, AgentContext, AgentStatus, AgentTree, ROOT_AGENT_ID};
use crate::event::{
    Content, ContentBlock, Delta, Event, OutcomeContent, SessionInfo, StreamEvent, Turn,
    TurnResult,
};
use crate::stream::StreamAccumulator;
use crate::tools::{ToolCallLedger, ToolCallRecord};
use crate::usage::TokenLedger;

/// Default name of the tool whose invocation spawns a child agent.
pub const DEFAULT_SPAWN_TOOL: &str = "Task";

/// Aggregate session model: agent tree, tool ledger, token ledger, and the
/// in-flight stream buffers.
#[derive(Debug)]
pub struct SessionState {
    session_id: Option<String>,
    model: Option<String>,
    agents: AgentTree,
    focus: String,
    tools: ToolCallLedger,
    /// Which agent's denormalized list holds each tool record.
    owners: HashMap<String, String>,
    usage: TokenLedger,
    stream: StreamAccumulator,
    spawn_tool: String,
    compactions: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::with_spawn_tool(DEFAULT_SPAWN_TOOL)
    }

    /// Use a custom spawn-tool name instead of [`DEFAULT_SPAWN_TOOL`].
    pub fn with_spawn_tool(name: &str) -> Self {
        Self {
            session_id: None,
            model: None,
            agents: AgentTree::default(),
            focus: ROOT_AGENT_ID.to_string(),
            tools: ToolCallLedger::default(),
            owners: HashMap::new(),
            usage: TokenLedger::default(),
            stream: StreamAccumulator::default(),
            spawn_tool: name.to_string(),
            compactions: 0,
        }
    }

    /// Apply one decoded event. Never fails.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::SessionStart(info) => self.apply_session_start(info),
            Event::TurnMessage(turn) | Event::UserTurn(turn) => self.apply_turn(turn),
            Event::Stream(ev) => self.apply_stream(ev),
            Event::TurnResult(result) => self.apply_result(result),
            Event::CompactionBoundary(_) => self.compactions += 1,
            Event::Unknown { kind, .. } => {
                tracing::debug!(kind = %kind, "unrecognized event ignored");
            }
        }
    }

    fn apply_session_start(&mut self, info: &SessionInfo) {
        if let Some(id) = &info.session_id {
            self.session_id = Some(id.clone());
        }
        if let Some(model) = &info.model {
            self.model = Some(model.clone());
        }
        let started_at = info.timestamp.as_deref().and_then(parse_timestamp);
        if self.agents.install_root(started_at) {
            // A repeated start replaces the root; tool calls attributed to
            // the old root stay in the ledger but lose their agent owner.
            self.owners.retain(|_, owner| owner != ROOT_AGENT_ID);
            tracing::warn!("repeated session start replaced the root agent");
        }
        self.focus = ROOT_AGENT_ID.to_string();
    }

    fn apply_turn(&mut self, turn: &Turn) {
        if let Some(body) = &turn.message {
            if let Some(usage) = &body.usage {
                self.usage.merge(usage);
            }
            if let Some(Content::Blocks(blocks)) = &body.content {
                for block in blocks {
                    match block {
                        ContentBlock::ToolInvocation { id, name, input } => {
                            self.record_invocation(
                                id,
                                name,
                                input.as_ref(),
                                turn.timestamp.as_deref(),
                            );
                        }
                        ContentBlock::ToolOutcome {
                            invocation_id,
                            content,
                            is_error,
                            ..
                        } => {
                            self.record_outcome(
                                invocation_id,
                                content.as_ref(),
                                is_error.unwrap_or(false),
                            );
                        }
                        // Text and reasoning blocks are informational here;
                        // their streamed counterparts already passed through
                        // the accumulator.
                        ContentBlock::Text { .. }
                        | ContentBlock::Thinking { .. }
                        | ContentBlock::RedactedThinking { .. }
                        | ContentBlock::Other => {}
                    }
                }
            }
        }
        // A complete turn is a message boundary: in-flight buffers are done.
        self.stream.clear();
    }

    fn apply_stream(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::MessageStart { message } => {
                if let Some(usage) = message.as_ref().and_then(|m| m.usage.as_ref()) {
                    self.usage.merge(usage);
                }
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                if let Some(ContentBlock::ToolInvocation { id, name, .. }) = content_block {
                    if !id.is_empty() {
                        self.tools.upsert_pending(id, name);
                        self.stream.open_tool_block(*index, id);
                        self.attach_to_focus(id);
                        self.mirror(id);
                    }
                }
            }
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                Some(Delta::TextDelta { text }) => self.stream.push_text(text),
                Some(Delta::ThinkingDelta { thinking }) => self.stream.push_thinking(thinking),
                Some(Delta::InputJsonDelta { partial_json }) => {
                    let routed = self
                        .stream
                        .push_tool_input(*index, partial_json)
                        .map(str::to_string);
                    if let Some(id) = routed {
                        self.tools.append_input(&id, partial_json);
                        self.mirror(&id);
                    }
                }
                Some(Delta::Other) | None => {}
            },
            // Block-stop is a boundary hook; assembly happens on the final
            // turn message.
            StreamEvent::ContentBlockStop { .. } => {}
            StreamEvent::MessageDelta { usage, .. } => {
                if let Some(usage) = usage {
                    self.usage.merge(usage);
                }
            }
            StreamEvent::MessageStop => self.stream.clear(),
        }
    }

    fn apply_result(&mut self, result: &TurnResult) {
        if let Some(usage) = &result.usage {
            self.usage.merge(usage);
        }
    }

    /// Upsert a fully formed invocation into the ledger and the focus
    /// agent's list; an invocation of the spawn tool also creates a child
    /// agent under the current focus without switching focus.
    fn record_invocation(
        &mut self,
        id: &str,
        name: &str,
        input: Option<&Value>,
        timestamp: Option<&str>,
    ) {
        if id.is_empty() {
            return;
        }
        let input_text = input.map(Value::to_string);
        self.tools.upsert_running(id, name, input_text);
        self.attach_to_focus(id);
        self.mirror(id);

        if name == self.spawn_tool {
            let kind = input
                .and_then(|v| v.get("subagent_type"))
                .and_then(Value::as_str)
                .unwrap_or(name);
            let description = input
                .and_then(|v| v.get("description"))
                .and_then(Value::as_str)
                .map(String::from);
            let started_at = timestamp.and_then(parse_timestamp);
            let parent = self.focus.clone();
            self.agents
                .spawn(&parent, id, kind, description, started_at);
        }
    }

    /// Complete the matching record; unknown ids are ignored. When the
    /// invocation spawned a child agent, the outcome also settles that
    /// agent's status.
    fn record_outcome(&mut self, id: &str, content: Option<&OutcomeContent>, is_error: bool) {
        let result_text = content.map(outcome_text);
        if self.tools.complete(id, result_text, is_error).is_none() {
            tracing::debug!(id, "outcome for unknown tool invocation ignored");
            return;
        }
        self.mirror(id);
        if self.agents.contains(id) {
            let status = if is_error {
                AgentStatus::Failed
            } else {
                AgentStatus::Done
            };
            self.agents.set_status(id, status);
        }
    }

    /// Switch focus to a known agent and mark it running. Unknown ids leave
    /// focus untouched; this channel is advisory, for display attribution.
    pub fn set_focus(&mut self, agent_id: &str) {
        if self.agents.contains(agent_id) {
            self.focus = agent_id.to_string();
            self.agents.set_status(agent_id, AgentStatus::Running);
        } else {
            tracing::debug!(agent_id, "focus switch to unknown agent ignored");
        }
    }

    /// Drop in-flight stream buffers, exactly like a message-stop boundary.
    /// Safe to call more than once.
    pub fn flush(&mut self) {
        self.stream.clear();
    }

    fn attach_to_focus(&mut self, tool_id: &str) {
        self.owners
            .entry(tool_id.to_string())
            .or_insert_with(|| self.focus.clone());
    }

    /// Copy the current ledger record into its owning agent's list.
    fn mirror(&mut self, tool_id: &str) {
        let Some(owner) = self.owners.get(tool_id) else {
            return;
        };
        if let Some(record) = self.tools.get(tool_id) {
            self.agents.mirror_tool(owner, record);
        }
    }

    // ------------------------------------------------------------------
    // Read-only projections
    // ------------------------------------------------------------------

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn focus_id(&self) -> &str {
        &self.focus
    }

    pub fn focus_agent(&self) -> Option<&AgentContext> {
        self.agents.get(&self.focus)
    }

    pub fn agent(&self, id: &str) -> Option<&AgentContext> {
        self.agents.get(id)
    }

    /// Agents in creation order, root first.
    pub fn agents(&self) -> impl Iterator<Item = &AgentContext> {
        self.agents.iter()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn tool_call(&self, id: &str) -> Option<&ToolCallRecord> {
        self.tools.get(id)
    }

    pub fn tool_call_count(&self) -> usize {
        self.tools.len()
    }

    pub fn usage(&self) -> &TokenLedger {
        &self.usage
    }

    pub fn partial_text(&self) -> &str {
        self.stream.text()
    }

    pub fn partial_thinking(&self) -> &str {
        self.stream.thinking()
    }

    pub fn partial_tool_input(&self, tool_id: &str) -> Option<&str> {
        self.stream.tool_input(tool_id)
    }

    pub fn compactions(&self) -> u64 {
        self.compactions
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Flatten tool-outcome content to display text: block arrays concatenate
/// their text blocks, scalars pass through, anything else keeps its raw
/// JSON form.
fn outcome_text(content: &OutcomeContent) -> String {
    match content {
        OutcomeContent::Text(text) => text.clone(),
        OutcomeContent::Blocks(blocks) => {
            let mut parts = Vec::new();
            for block in blocks {
                if let ContentBlock::Text { text } = block {
                    parts.push(text.as_str());
                }
            }
            parts.join("\n")
        }
        OutcomeContent::Raw(value) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode;
    use crate::tools::ToolStatus;
    use pretty_assertions::assert_eq;

    fn apply_line(state: &mut SessionState, line: &str) {
        state.apply(&decode(line.as_bytes()).expect("decodable test line"));
    }

    fn spawn_line(id: &str) -> String {
        format!(
            r#"{{"type":"assistant","message":{{"role":"assistant","content":[{{"type":"tool_use","id":"{id}","name":"Task","input":{{"subagent_type":"explorer","description":"look around"}}}}]}}}}"#
        )
    }

    #[test]
    fn session_start_creates_root_and_sets_focus() {
        let mut state = SessionState::new();
        apply_line(
            &mut state,
            r#"{"type":"session_start","session_id":"s1","model":"m-large"}"#,
        );
        assert_eq!(state.session_id(), Some("s1"));
        assert_eq!(state.model(), Some("m-large"));
        assert_eq!(state.focus_id(), ROOT_AGENT_ID);
        let root = state.focus_agent().unwrap();
        assert_eq!(root.depth, 0);
        assert_eq!(root.status, AgentStatus::Idle);
    }

    #[test]
    fn spawn_then_outcome_then_result_scenario() {
        let mut state = SessionState::new();
        apply_line(
            &mut state,
            r#"{"type":"session_start","session_id":"s1","model":"m"}"#,
        );
        apply_line(&mut state, &spawn_line("t1"));
        apply_line(
            &mut state,
            r#"{"type":"user","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","content":"done","is_error":false}]}}"#,
        );
        apply_line(
            &mut state,
            r#"{"type":"result","subtype":"success","usage":{"input_tokens":10,"output_tokens":5}}"#,
        );

        let child = state.agent("t1").expect("child agent");
        assert_eq!(child.depth, 1);
        assert_eq!(child.parent.as_deref(), Some(ROOT_AGENT_ID));
        assert_eq!(child.kind, "explorer");
        assert_eq!(child.description.as_deref(), Some("look around"));
        assert_eq!(child.status, AgentStatus::Done);

        let record = state.tool_call("t1").unwrap();
        assert_eq!(record.status, ToolStatus::Completed);
        assert_eq!(record.result.as_deref(), Some("done"));

        assert_eq!(state.usage().total, 15);
    }

    #[test]
    fn advancing_focus_chain_builds_depth_n() {
        let mut state = SessionState::new();
        apply_line(&mut state, r#"{"type":"session_start","session_id":"s"}"#);
        let ids = ["c1", "c2", "c3", "c4"];
        let mut previous_focus = ROOT_AGENT_ID.to_string();
        for (n, id) in ids.iter().enumerate() {
            apply_line(&mut state, &spawn_line(id));
            let child = state.agent(id).unwrap();
            assert_eq!(child.depth, n as u32 + 1);
            assert_eq!(child.parent.as_deref(), Some(previous_focus.as_str()));
            state.set_focus(id);
            previous_focus = id.to_string();
        }
    }

    #[test]
    fn spawned_child_does_not_steal_focus() {
        let mut state = SessionState::new();
        apply_line(&mut state, r#"{"type":"session_start","session_id":"s"}"#);
        apply_line(&mut state, &spawn_line("t1"));
        assert_eq!(state.focus_id(), ROOT_AGENT_ID);
    }

    #[test]
    fn focus_switch_to_unknown_agent_is_ignored() {
        let mut state = SessionState::new();
        apply_line(&mut state, r#"{"type":"session_start","session_id":"s"}"#);
        state.set_focus("nobody");
        assert_eq!(state.focus_id(), ROOT_AGENT_ID);
    }

    #[test]
    fn focus_switch_marks_agent_running() {
        let mut state = SessionState::new();
        apply_line(&mut state, r#"{"type":"session_start","session_id":"s"}"#);
        apply_line(&mut state, &spawn_line("t1"));
        state.set_focus("t1");
        assert_eq!(state.focus_id(), "t1");
        assert_eq!(state.agent("t1").unwrap().status, AgentStatus::Running);
    }

    #[test]
    fn outcome_for_unknown_id_changes_nothing() {
        let mut state = SessionState::new();
        apply_line(&mut state, r#"{"type":"session_start","session_id":"s"}"#);
        apply_line(
            &mut state,
            r#"{"type":"user","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"ghost","content":"?"}]}}"#,
        );
        assert_eq!(state.tool_call_count(), 0);
    }

    #[test]
    fn tool_calls_mirror_into_the_focus_agents_list() {
        let mut state = SessionState::new();
        apply_line(&mut state, r#"{"type":"session_start","session_id":"s"}"#);
        apply_line(
            &mut state,
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"Bash","input":{"cmd":"ls"}}]}}"#,
        );
        let root = state.agent(ROOT_AGENT_ID).unwrap();
        assert_eq!(root.tools.len(), 1);
        assert_eq!(root.tools[0].status, ToolStatus::Running);

        apply_line(
            &mut state,
            r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":"ok"}]}}"#,
        );
        let root = state.agent(ROOT_AGENT_ID).unwrap();
        assert_eq!(root.tools.len(), 1);
        assert_eq!(root.tools[0].status, ToolStatus::Completed);
        assert_eq!(root.tools[0].result.as_deref(), Some("ok"));
    }

    #[test]
    fn streamed_text_assembles_then_clears_on_message_stop() {
        let mut state = SessionState::new();
        apply_line(&mut state, r#"{"type":"session_start","session_id":"s"}"#);
        apply_line(
            &mut state,
            r#"{"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hel"}}}"#,
        );
        apply_line(
            &mut state,
            r#"{"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"lo"}}}"#,
        );
        assert_eq!(state.partial_text(), "Hello");

        apply_line(
            &mut state,
            r#"{"type":"stream_event","event":{"type":"message_stop"}}"#,
        );
        assert_eq!(state.partial_text(), "");
    }

    #[test]
    fn streamed_tool_input_fills_pending_record() {
        let mut state = SessionState::new();
        apply_line(&mut state, r#"{"type":"session_start","session_id":"s"}"#);
        apply_line(
            &mut state,
            r#"{"type":"stream_event","event":{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"t1","name":"Write"}}}"#,
        );
        assert_eq!(state.tool_call("t1").unwrap().status, ToolStatus::Pending);

        apply_line(
            &mut state,
            r#"{"type":"stream_event","event":{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"path\":"}}}"#,
        );
        apply_line(
            &mut state,
            r#"{"type":"stream_event","event":{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"\"a.rs\"}"}}}"#,
        );
        assert_eq!(state.partial_tool_input("t1"), Some("{\"path\":\"a.rs\"}"));
        assert_eq!(state.tool_call("t1").unwrap().input, "{\"path\":\"a.rs\"}");
    }

    #[test]
    fn complete_turn_clears_stream_buffers() {
        let mut state = SessionState::new();
        apply_line(&mut state, r#"{"type":"session_start","session_id":"s"}"#);
        apply_line(
            &mut state,
            r#"{"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"mull"}}}"#,
        );
        assert_eq!(state.partial_thinking(), "mull");
        apply_line(
            &mut state,
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"final"}]}}"#,
        );
        assert_eq!(state.partial_thinking(), "");
    }

    #[test]
    fn message_delta_usage_reaches_the_ledger() {
        let mut state = SessionState::new();
        apply_line(&mut state, r#"{"type":"session_start","session_id":"s"}"#);
        apply_line(
            &mut state,
            r#"{"type":"stream_event","event":{"type":"message_delta","usage":{"output_tokens":7}}}"#,
        );
        assert_eq!(state.usage().output, 7);
    }

    #[test]
    fn repeated_session_start_replaces_root_and_orphans_records() {
        let mut state = SessionState::new();
        apply_line(&mut state, r#"{"type":"session_start","session_id":"s1"}"#);
        apply_line(
            &mut state,
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"Bash","input":{}}]}}"#,
        );
        assert_eq!(state.agent(ROOT_AGENT_ID).unwrap().tools.len(), 1);

        apply_line(&mut state, r#"{"type":"session_start","session_id":"s2"}"#);
        assert_eq!(state.session_id(), Some("s2"));
        // The fresh root starts empty; the record survives in the ledger.
        assert!(state.agent(ROOT_AGENT_ID).unwrap().tools.is_empty());
        assert!(state.tool_call("t1").is_some());
    }

    #[test]
    fn compaction_boundary_is_counted() {
        let mut state = SessionState::new();
        apply_line(&mut state, r#"{"type":"compaction_boundary","trigger":"auto"}"#);
        assert_eq!(state.compactions(), 1);
    }

    #[test]
    fn flush_is_idempotent() {
        let mut state = SessionState::new();
        apply_line(&mut state, r#"{"type":"session_start","session_id":"s"}"#);
        apply_line(
            &mut state,
            r#"{"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"x"}}}"#,
        );
        state.flush();
        assert_eq!(state.partial_text(), "");
        state.flush();
        assert_eq!(state.partial_text(), "");
    }

    #[test]
    fn custom_spawn_tool_name_is_honored() {
        let mut state = SessionState::with_spawn_tool("Delegate");
        apply_line(&mut state, r#"{"type":"session_start","session_id":"s"}"#);
        apply_line(
            &mut state,
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"Delegate","input":{"subagent_type":"worker"}}]}}"#,
        );
        apply_line(&mut state, &spawn_line("t2"));
        assert!(state.agent("t1").is_some());
        // "Task" is no longer the spawn tool for this state.
        assert!(state.agent("t2").is_none());
    }

    #[test]
    fn null_safe_payloads_are_tolerated() {
        let mut state = SessionState::new();
        apply_line(&mut state, r#"{"type":"assistant"}"#);
        apply_line(&mut state, r#"{"type":"assistant","message":null}"#);
        apply_line(
            &mut state,
            r#"{"type":"stream_event","event":{"type":"content_block_delta","index":0}}"#,
        );
        apply_line(
            &mut state,
            r#"{"type":"stream_event","event":{"type":"message_delta"}}"#,
        );
        apply_line(&mut state, r#"{"type":"result"}"#);
        assert_eq!(state.usage().total, 0);
    }

    #[test]
    fn outcome_block_array_content_flattens_to_text() {
        let mut state = SessionState::new();
        apply_line(&mut state, r#"{"type":"session_start","session_id":"s"}"#);
        apply_line(
            &mut state,
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"Read","input":{}}]}}"#,
        );
        apply_line(
            &mut state,
            r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":[{"type":"text","text":"line one"},{"type":"text","text":"line two"}]}]}}"#,
        );
        assert_eq!(
            state.tool_call("t1").unwrap().result.as_deref(),
            Some("line one\nline two")
        );
    }
}
