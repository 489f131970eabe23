//! Structured project facts, rolling summary, and transcript continuity
//! carried across persona handoffs (spec.md §4.4). Lives entirely in memory
//! for the life of one session — nothing here is persisted across restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

const MAX_TRANSCRIPT_TAIL: usize = 12;
const MAX_SUMMARY_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectFacts {
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub budget: Option<String>,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub timeline: Option<String>,
    #[serde(default)]
    pub diy_or_contractor: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredState {
    #[serde(default)]
    pub project: ProjectFacts,
    #[serde(default)]
    pub open_questions: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub materials_discussed: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ConversationState {
    pub structured: StructuredState,
    pub summary: String,
    pub transcript_tail: Vec<Turn>,
    pub full_transcript: Vec<Turn>,
    pub session_start: DateTime<Utc>,
    pub turn_count: u64,
    pub agent_seen: HashMap<String, bool>,
}

impl Default for ConversationState {
    fn default() -> Self {
        let mut agent_seen = HashMap::new();
        agent_seen.insert("bob".to_string(), false);
        agent_seen.insert("alice".to_string(), false);
        Self {
            structured: StructuredState::default(),
            summary: String::new(),
            transcript_tail: Vec::new(),
            full_transcript: Vec::new(),
            session_start: Utc::now(),
            turn_count: 0,
            agent_seen,
        }
    }
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `text` spoken by `speaker` to both the full transcript and the
    /// bounded tail, trimming the tail to the last 12 entries.
    pub fn add_turn(&mut self, speaker: &str, text: &str) {
        let turn = Turn { speaker: speaker.to_string(), text: text.to_string(), timestamp: Utc::now() };
        self.full_transcript.push(turn.clone());
        self.transcript_tail.push(turn);
        if self.transcript_tail.len() > MAX_TRANSCRIPT_TAIL {
            let overflow = self.transcript_tail.len() - MAX_TRANSCRIPT_TAIL;
            self.transcript_tail.drain(..overflow);
        }
        self.turn_count += 1;
    }

    /// Append the turn to the rolling summary, keeping only the trailing
    /// `MAX_SUMMARY_CHARS` characters.
    pub fn append_summary(&mut self, user_text: &str, agent_text: &str) {
        self.summary.push_str(&format!(" User: {user_text}. Agent: {agent_text}."));
        if self.summary.len() > MAX_SUMMARY_CHARS {
            let cut = self.summary.len() - MAX_SUMMARY_CHARS;
            self.summary = self.summary[cut..].to_string();
        }
    }

    /// Merge a JSON patch emitted by the background state-extraction call.
    /// Scalar project fields overwrite when non-null; list fields append
    /// unique (exact-string) entries. Malformed patches are the caller's
    /// concern — this assumes `updates` already parsed as JSON.
    pub fn merge_updates(&mut self, updates: &Value) {
        if let Some(project) = updates.get("project").and_then(Value::as_object) {
            let p = &mut self.structured.project;
            if let Some(room) = project.get("room").and_then(Value::as_str) {
                p.room = Some(room.to_string());
            }
            if let Some(budget) = project.get("budget").and_then(Value::as_str) {
                p.budget = Some(budget.to_string());
            }
            if let Some(timeline) = project.get("timeline").and_then(Value::as_str) {
                p.timeline = Some(timeline.to_string());
            }
            if let Some(doc) = project.get("diy_or_contractor").and_then(Value::as_str) {
                p.diy_or_contractor = Some(doc.to_string());
            }
            merge_list_field(&mut p.goals, project.get("goals"));
            merge_list_field(&mut p.constraints, project.get("constraints"));
        }

        merge_list_field(&mut self.structured.open_questions, updates.get("open_questions"));
        merge_list_field(&mut self.structured.risks, updates.get("risks"));
        merge_list_field(&mut self.structured.decisions, updates.get("decisions"));
        merge_list_field(&mut self.structured.materials_discussed, updates.get("materials_discussed"));
    }

    /// Pretty-printed structured state for LLM context injection.
    pub fn get_state_summary(&self) -> String {
        serde_json::to_string_pretty(&self.structured).unwrap_or_default()
    }

    /// Ordered, labeled handoff block: known facts, open questions, risks,
    /// last user message, and a focus line tailored to the receiving persona.
    pub fn generate_handoff_note(&self, receiving_persona: &str) -> String {
        let mut notes = Vec::new();
        let p = &self.structured.project;
        if p.room.is_some() || p.budget.is_some() || !p.goals.is_empty() || !p.constraints.is_empty() {
            notes.push("WHAT WE KNOW:".to_string());
            if let Some(room) = &p.room {
                notes.push(format!("- Room: {room}"));
            }
            if let Some(budget) = &p.budget {
                notes.push(format!("- Budget: {budget}"));
            }
            if !p.goals.is_empty() {
                notes.push(format!("- Goals: {}", p.goals.join(", ")));
            }
            if !p.constraints.is_empty() {
                notes.push(format!("- Constraints: {}", p.constraints.join(", ")));
            }
        }

        if !self.structured.open_questions.is_empty() {
            notes.push(format!("\nOPEN QUESTIONS: {}", self.structured.open_questions.join(", ")));
        }
        if !self.structured.risks.is_empty() {
            notes.push(format!("\nKNOWN RISKS: {}", self.structured.risks.join(", ")));
        }

        if let Some(last_user) = self.transcript_tail.iter().rev().find(|t| t.speaker == "user") {
            notes.push(format!("\nLAST USER MESSAGE: {}", last_user.text));
        }

        let focus = if receiving_persona == "alice" {
            "Address technical concerns, risks, permits/codes, sequencing, or material trade-offs."
        } else {
            "Provide actionable next steps, create task list, or help with high-level planning."
        };
        notes.push(format!("\nRECOMMENDED FOCUS: {focus}"));
        notes.join("\n")
    }
}

fn merge_list_field(target: &mut Vec<String>, update: Option<&Value>) {
    let Some(update) = update else { return };
    match update {
        Value::Array(items) => {
            for item in items {
                if let Some(s) = item.as_str() {
                    if !target.iter().any(|existing| existing == s) {
                        target.push(s.to_string());
                    }
                }
            }
        }
        Value::String(s) => {
            if !target.iter().any(|existing| existing == s) {
                target.push(s.clone());
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_turn_trims_tail_but_keeps_full_transcript() {
        let mut state = ConversationState::new();
        for i in 0..20 {
            state.add_turn("user", &format!("turn {i}"));
        }
        assert_eq!(state.transcript_tail.len(), MAX_TRANSCRIPT_TAIL);
        assert_eq!(state.full_transcript.len(), 20);
        assert_eq!(state.turn_count, 20);
        assert_eq!(state.transcript_tail.last().unwrap().text, "turn 19");
    }

    #[test]
    fn summary_truncates_to_trailing_window() {
        let mut state = ConversationState::new();
        for i in 0..50 {
            state.append_summary(&format!("question {i}"), &format!("answer {i}"));
        }
        assert!(state.summary.len() <= MAX_SUMMARY_CHARS);
    }

    #[test]
    fn merge_updates_overwrites_scalars_and_dedups_lists() {
        let mut state = ConversationState::new();
        state.structured.project.goals.push("open floor plan".to_string());

        let patch = json!({
            "project": {
                "room": "kitchen",
                "goals": ["open floor plan", "more storage"]
            },
            "risks": ["asbestos in old tile"]
        });
        state.merge_updates(&patch);

        assert_eq!(state.structured.project.room.as_deref(), Some("kitchen"));
        assert_eq!(state.structured.project.goals, vec!["open floor plan", "more storage"]);
        assert_eq!(state.structured.risks, vec!["asbestos in old tile"]);
    }

    #[test]
    fn handoff_note_includes_last_user_message_and_focus() {
        let mut state = ConversationState::new();
        state.structured.project.room = Some("kitchen".to_string());
        state.add_turn("user", "what permits do I need?");
        let note = state.generate_handoff_note("alice");
        assert!(note.contains("kitchen"));
        assert!(note.contains("what permits do I need?"));
        assert!(note.contains("risks, permits/codes"));
    }
}
