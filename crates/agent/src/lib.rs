//! Persona framework and per-turn orchestration: the transfer router,
//! persona manager, conversation state, guardrail filter, and the pipeline
//! that stitches them together with the streaming clients (spec.md §4.2-4.7).

pub mod error;
pub mod guardrail;
pub mod orchestrator;
pub mod persona;
pub mod router;
pub mod state;

pub use error::{AgentError, AgentResult};
pub use guardrail::{GuardrailFilter, GuardrailResult};
pub use orchestrator::{run_turn, PipelineDeps, TurnOutcome};
pub use persona::PersonaManager;
pub use router::{detect_transfer, TransferMatch};
pub use state::ConversationState;
