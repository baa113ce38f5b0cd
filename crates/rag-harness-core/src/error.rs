//! Error taxonomy for query processing.

use thiserror::Error;

/// Failure of a query request.
///
/// Web search problems never appear here: the search collaborator degrades
/// to an empty result instead of failing the request.
#[derive(Debug, Error)]
pub enum RagError {
    /// Rejected before retrieval started (empty query, bad result count).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Embedding the query or querying the vector store failed.
    #[error("retrieval failed: {0:#}")]
    Retrieval(anyhow::Error),
    /// The generation service failed to produce an answer.
    #[error("generation failed: {0:#}")]
    Generation(anyhow::Error),
}

impl RagError {
    /// `true` for errors caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(self, RagError::InvalidRequest(_))
    }
}
