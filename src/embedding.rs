//! HTTP adapter for an OpenAI-compatible embeddings endpoint.

use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::error::CapabilityError;
use crate::traits::Embedder;

#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    config: EmbeddingConfig,
    client: reqwest::blocking::Client,
}

impl HttpEmbedder {
    pub fn new(config: EmbeddingConfig) -> Result<Self, CapabilityError> {
        if !config.enabled {
            return Err(CapabilityError::Unavailable(
                "embedding disabled by configuration".to_string(),
            ));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl Embedder for HttpEmbedder {
    fn name(&self) -> &str {
        &self.config.model
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CapabilityError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let body = self
            .client
            .post(url)
            .json(&EmbeddingRequest {
                model: &self.config.model,
                input: texts,
            })
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<EmbeddingResponse>())?;

        order_rows(body.data, texts.len())
    }
}

/// Puts rows back in input order; servers may reorder them.
fn order_rows(mut rows: Vec<EmbeddingRow>, expected: usize) -> Result<Vec<Vec<f32>>, CapabilityError> {
    if rows.len() != expected {
        return Err(CapabilityError::Protocol(format!(
            "expected {} embeddings, got {}",
            expected,
            rows.len()
        )));
    }
    if rows.iter().all(|row| row.index.is_some()) {
        rows.sort_by_key(|row| row.index);
    }
    Ok(rows.into_iter().map(|row| row.embedding).collect())
}
