//! Agent error types.

use thiserror::Error;
use voxhub_core::ProviderError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Model kept calling tools after {0} rounds")]
    ToolRounds(usize),
}
