//! Persona definitions and LLM message-sequence construction (spec.md §4.3).
//! Two personas: Bob, a warm intake planner, and Alice, a structured
//! technical specialist. Both forbid re-introducing themselves after the
//! first turn and require context continuity across a handoff.

use voice_agent_core::Message;

use crate::state::ConversationState;

const BOB_SYSTEM_PROMPT: &str = "You are Bob, a friendly and approachable home renovation planning assistant.

YOUR ROLE:
- Help homeowners clarify their renovation goals and requirements
- Ask 1-3 targeted clarifying questions per turn (don't overwhelm)
- Gather key details: room, budget, timeline, scope, DIY vs contractor preference
- Create simple, actionable checklists and rough plans
- Be warm, conversational, and encouraging

YOUR STYLE:
- Friendly and concise (2-4 sentences typically)
- Ask practical questions: \"Is that wall load-bearing?\" \"What's your timeline?\" \"Doing this yourself or hiring pros?\"
- Give high-level guidance: \"Here's what I'd focus on first...\"
- Avoid deep technical details - that's Alice's domain

IMPORTANT CONSTRAINTS:
- Never provide professional engineering, legal, or licensed trade advice
- Always recommend consulting licensed professionals for structural, electrical, plumbing work
- Keep permit/code discussions general - suggest they check with local authorities

WHEN TO SUGGEST ALICE:
- If user asks technical questions about permits, codes, structural concerns
- If they want detailed material comparisons or risk analysis
You can say: \"That's getting into Alice's specialty - want me to bring her in?\"

CRITICAL INSTRUCTION:
- Never say your name except in the very first greeting of the session.
- On transfer, do not introduce yourself again. Continue immediately with context.";

const ALICE_SYSTEM_PROMPT: &str = "You are Alice, a knowledgeable home renovation specialist focused on technical guidance and risk management.

YOUR ROLE:
- Provide detailed technical guidance on materials, methods, and sequencing
- Identify risks, code considerations, and common pitfalls
- Explain permit requirements and inspection processes (in general terms)
- Give rough cost breakdowns and trade-off analysis

YOUR STYLE:
- Structured and methodical (but not dry)
- Risk-aware: \"Here's what could go wrong and how to avoid it\"
- Detail-oriented: material pros/cons, typical costs, sequence of work
- Use bullet points or numbered lists when helpful

IMPORTANT CONSTRAINTS:
- Never provide professional engineering, legal, or licensed trade advice
- Always emphasize: \"Consult a licensed [engineer/electrician/plumber] for specifics\"
- Permit guidance must be general: \"Typically permits are needed for X, but check your local jurisdiction\"

WHEN TO SUGGEST BOB:
- If user wants to shift back to high-level planning or task lists
You can say: \"Want me to send you back to Bob for next steps?\"

CRITICAL INSTRUCTION:
- Never say your name except in the very first greeting of the session.
- On transfer, do not introduce yourself again. Continue immediately with context.";

fn system_prompt(persona: &str) -> &'static str {
    match persona {
        "alice" => ALICE_SYSTEM_PROMPT,
        _ => BOB_SYSTEM_PROMPT,
    }
}

pub struct PersonaManager {
    pub current_persona: String,
}

impl PersonaManager {
    pub fn new(starting_persona: impl Into<String>) -> Self {
        Self { current_persona: starting_persona.into().to_lowercase() }
    }

    /// Attempt a handoff to `target`. Returns the handoff line spoken in the
    /// outgoing persona's voice; never errors.
    pub fn transfer_to(&mut self, target: &str) -> String {
        let target = target.to_lowercase();
        if target != "bob" && target != "alice" {
            return "Sorry, I didn't understand that transfer request.".to_string();
        }
        if target == self.current_persona {
            return format!("You're already talking to {}!", title_case(&target));
        }

        let handoff = if target == "alice" {
            "Bringing Alice in. She can help with the technical details."
        } else {
            "Switching back to Bob. He'll help you with next steps."
        };
        self.current_persona = target;
        handoff.to_string()
    }

    /// Build the ordered message sequence for one LLM call: persona system
    /// prompt, optional context block (state/summary/transcript/handoff
    /// note), self-introduction suppression, and the final user turn.
    pub fn build_messages(&self, user_input: &str, state: &mut ConversationState, is_transfer: bool) -> Vec<Message> {
        let mut messages = vec![Message::system(system_prompt(&self.current_persona))];

        let mut context_parts = Vec::new();
        context_parts.push("PROJECT STATE:".to_string());
        context_parts.push(state.get_state_summary());

        if !state.summary.is_empty() {
            context_parts.push(format!("\nCONVERSATION SUMMARY:\n{}", state.summary));
        }

        if !state.transcript_tail.is_empty() {
            context_parts.push("\nRECENT CONVERSATION:".to_string());
            let start = state.transcript_tail.len().saturating_sub(6);
            for turn in &state.transcript_tail[start..] {
                context_parts.push(format!("{}: {}", turn.speaker.to_uppercase(), turn.text));
            }
        }

        if is_transfer {
            let handoff = state.generate_handoff_note(&self.current_persona);
            context_parts.push(format!("\nHANDOFF NOTE:\n{handoff}"));
            context_parts.push("\nDO NOT GREET. DO NOT STATE YOUR NAME. Continue immediately with context.".to_string());
        }

        messages.push(Message::system(context_parts.join("\n")));

        let seen = state.agent_seen.entry(self.current_persona.clone()).or_insert(false);
        if *seen {
            messages.push(Message::system(
                "You have already introduced yourself. DO NOT say your name or greeting again.",
            ));
        } else {
            *seen = true;
        }

        messages.push(Message::user(user_input));
        messages
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_to_same_persona_is_a_no_op_reply() {
        let mut pm = PersonaManager::new("bob");
        let reply = pm.transfer_to("bob");
        assert_eq!(reply, "You're already talking to Bob!");
        assert_eq!(pm.current_persona, "bob");
    }

    #[test]
    fn transfer_to_unknown_persona_does_not_change_state() {
        let mut pm = PersonaManager::new("bob");
        let reply = pm.transfer_to("carol");
        assert!(reply.contains("didn't understand"));
        assert_eq!(pm.current_persona, "bob");
    }

    #[test]
    fn transfer_to_alice_updates_current_persona() {
        let mut pm = PersonaManager::new("bob");
        let reply = pm.transfer_to("alice");
        assert!(reply.contains("Alice"));
        assert_eq!(pm.current_persona, "alice");
    }

    #[test]
    fn first_turn_marks_persona_seen_but_does_not_suppress_intro() {
        let pm = PersonaManager::new("bob");
        let mut state = ConversationState::new();
        let messages = pm.build_messages("hi there", &mut state, false);
        assert!(!messages.iter().any(|m| m.content.contains("DO NOT say your name")));
        assert_eq!(state.agent_seen.get("bob"), Some(&true));
    }

    #[test]
    fn second_turn_suppresses_self_introduction() {
        let pm = PersonaManager::new("bob");
        let mut state = ConversationState::new();
        let _ = pm.build_messages("hi there", &mut state, false);
        let messages = pm.build_messages("what's next", &mut state, false);
        assert!(messages.iter().any(|m| m.content.contains("DO NOT say your name")));
    }

    #[test]
    fn transfer_injects_handoff_note_and_no_greeting_instruction() {
        let pm = PersonaManager::new("alice");
        let mut state = ConversationState::new();
        state.structured.project.room = Some("bathroom".to_string());
        let messages = pm.build_messages("what permits do I need", &mut state, true);
        let context = &messages[1].content;
        assert!(context.contains("HANDOFF NOTE"));
        assert!(context.contains("DO NOT GREET"));
    }
}
