//! Client for an OpenAI-compatible chat completions service.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GenerationConfig;
use crate::error::CapabilityError;
use crate::traits::CodeGenerator;

/// How long the availability probe may take.
const PROBE_TIMEOUT_SECS: u64 = 2;

#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    config: GenerationConfig,
    client: reqwest::blocking::Client,
}

impl ChatCompletionClient {
    pub fn new(config: GenerationConfig) -> Result<Self, CapabilityError> {
        if !config.enabled {
            return Err(CapabilityError::Unavailable(
                "remote generation disabled by configuration".to_string(),
            ));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Builds the client and checks that the service answers `GET /models`.
    pub fn connect(config: GenerationConfig) -> Result<Self, CapabilityError> {
        let client = Self::new(config)?;
        client.probe()?;
        Ok(client)
    }

    fn probe(&self) -> Result<(), CapabilityError> {
        let url = format!("{}/models", self.base_url());
        self.authorized(self.client.get(url))
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .send()
            .and_then(|resp| resp.error_for_status())?;
        Ok(())
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn authorized(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl CodeGenerator for ChatCompletionClient {
    fn name(&self) -> &str {
        &self.config.model
    }

    fn complete(&self, system: &str, prompt: &str) -> Result<String, CapabilityError> {
        let url = format!("{}/chat/completions", self.base_url());
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: prompt },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let body = self
            .authorized(self.client.post(url))
            .json(&request)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<ChatResponse>())?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| CapabilityError::Protocol("reply has no message content".to_string()))?;

        debug!(model = %self.config.model, chars = content.len(), "remote generation replied");
        Ok(content.trim().to_string())
    }
}
