//! # intent-agent
//!
//! Resolves a free-text request to one API operation through a language-model
//! oracle, extracts its arguments and dispatches the authenticated call.

mod agent;
pub mod config;
mod error;
pub mod oracle;
pub mod pipeline;

#[cfg(test)]
mod testing;

pub use agent::{
    AgentOptions, ApiAgent, ExecuteRequest, RequestContext, ResolutionResult, SpecConfig,
    DEFAULT_MODEL,
};
pub use config::AgentConfig;
pub use error::{AgentError, AgentResult, OracleStage};
pub use oracle::{OpenAiOracle, Oracle, OracleError};
