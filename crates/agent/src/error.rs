use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("unknown persona: {0}")]
    UnknownPersona(String),
}

pub type AgentResult<T> = std::result::Result<T, AgentError>;
