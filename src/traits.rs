//! Capability traits for the external services the pipeline leans on.
//!
//! These are intentionally minimal. The crate ships HTTP implementations
//! ([`crate::embedding::HttpEmbedder`], [`crate::llm::ChatCompletionClient`])
//! and a flat index ([`crate::vector_index::FlatL2Index`]); tests and other
//! deployments can plug in their own.

use crate::error::CapabilityError;

/// Turns text into fixed-dimension vectors.
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// Embeds every text; the output has one vector per input, in order.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CapabilityError>;
}

/// Nearest-neighbour search over a corpus built once.
pub trait VectorIndex: Send + Sync {
    /// Number of indexed vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `k` `(row, distance)` pairs, nearest first.
    fn nearest(&self, query: &[f32], k: usize) -> Vec<(usize, f32)>;
}

/// Request/response text generation service.
pub trait CodeGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// Sends one system instruction and one prompt, returns the reply text.
    fn complete(&self, system: &str, prompt: &str) -> Result<String, CapabilityError>;
}
