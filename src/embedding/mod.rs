//! Embedding contract and the in-memory vector store.
//!
//! The engine never chooses an embedding model. Sentence vectors arrive with
//! the segmenter's output; the [`EmbeddingService`] trait is the contract for
//! the few vectors the engine may still need (anchor seed phrases missing from
//! the input's term table).

pub mod store;

use async_trait::async_trait;

use crate::JuryscopeError;

pub use store::VectorStore;

/// Service trait for generating text embeddings.
///
/// Implementations must be deterministic for identical text within a run.
/// The engine does not cache vectors across runs.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Generate embedding for a single text string.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, JuryscopeError>;

    /// Embedding dimensionality.
    fn dimensions(&self) -> usize;

    /// Whether the provider can currently serve requests.
    fn is_available(&self) -> bool;
}

/// No-op embedding service.
///
/// Always reports as unavailable and returns errors for embed operations.
/// Used when every vector the run needs is supplied with the input.
pub struct NoopEmbeddingService;

impl Default for NoopEmbeddingService {
    fn default() -> Self {
        Self::new()
    }
}

impl NoopEmbeddingService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmbeddingService for NoopEmbeddingService {
    async fn embed_text(&self, _text: &str) -> Result<Vec<f32>, JuryscopeError> {
        Err(JuryscopeError::external(
            "embedding",
            "Embedding service is not available (noop)",
        ))
    }

    fn dimensions(&self) -> usize {
        0
    }

    fn is_available(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_embedding_service_is_unavailable() {
        let service = NoopEmbeddingService::new();
        assert!(!service.is_available());
        let err = service.embed_text("hello").await.unwrap_err();
        assert!(matches!(err, JuryscopeError::ExternalService { .. }));
    }
}
