//! Error types for the agent

use api_catalog::CatalogError;
use thiserror::Error;

use crate::oracle::OracleError;

/// Result type alias for agent operations
pub type AgentResult<T> = std::result::Result<T, AgentError>;

/// Pipeline stage that talked to the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleStage {
    Selection,
    Extraction,
}

impl std::fmt::Display for OracleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleStage::Selection => write!(f, "selecting operation"),
            OracleStage::Extraction => write!(f, "parsing arguments"),
        }
    }
}

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// Spec compilation, auth or transport failure; surfaced verbatim
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("There's an error {stage}: {source}")]
    Oracle {
        stage: OracleStage,
        #[source]
        source: OracleError,
    },

    #[error("Cannot find operation for '{0}'")]
    UnresolvedIntent(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AgentError {
    pub(crate) fn oracle(stage: OracleStage, source: OracleError) -> Self {
        AgentError::Oracle { stage, source }
    }
}
