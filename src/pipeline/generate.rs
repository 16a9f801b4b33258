//! Explanation generation: label text → plain-language explanation.
//!
//! One blocking-style request to an Ollama-compatible `/api/generate`
//! endpoint, no streaming and no retries. All prompt wording lives in
//! [`crate::prompts`]; this module only dispatches and classifies failures.
//!
//! ## Failure classification
//!
//! | What happened | Error |
//! |---|---|
//! | text was empty | [`GenerationError::EmptyInput`] (nothing sent) |
//! | TCP connect failed | [`GenerationError::ServiceUnavailable`] |
//! | request exceeded timeout | [`GenerationError::Timeout`] |
//! | non-2xx status | [`GenerationError::BackendStatus`] |
//! | 2xx, `response` missing or blank | [`GenerationError::EmptyResponse`] |
//! | anything else | [`GenerationError::Other`] |

use crate::config::{ExplainConfig, Language};
use crate::error::GenerationError;
use crate::output::{Explanation, ExtractedText};
use crate::pipeline::postprocess;
use crate::prompts::build_prompt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Longest error body kept in [`GenerationError::BackendStatus`].
const MAX_ERROR_BODY: usize = 300;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

/// HTTP client for an Ollama-compatible text-generation backend.
///
/// Holds only immutable settings and a connection pool, so one client can
/// serve any number of concurrent requests.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    url: String,
    model: String,
    timeout_secs: u64,
}

impl OllamaClient {
    /// Build a client from the pipeline configuration.
    pub fn new(config: &ExplainConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GenerationError::Other(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: config.generate_url(),
            model: config.model.clone(),
            timeout_secs: config.request_timeout_secs,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send `prompt` and return the generated text.
    pub async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let start = Instant::now();
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        debug!(
            model = %self.model,
            url = %self.url,
            prompt_chars = prompt.len(),
            "Sending generate request"
        );

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            let body: String = text.trim().chars().take(MAX_ERROR_BODY).collect();
            warn!(status = status.as_u16(), body = %body, "Backend returned an error status");
            return Err(GenerationError::BackendStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| GenerationError::Other(format!("invalid JSON from backend: {e}")))?;

        debug!(
            "{:?} prompt tokens, {:?} output tokens, {:?}",
            parsed.prompt_eval_count,
            parsed.eval_count,
            start.elapsed()
        );

        match parsed.response {
            Some(r) if !r.trim().is_empty() => Ok(r),
            _ => Err(GenerationError::EmptyResponse),
        }
    }

    fn classify(&self, e: reqwest::Error) -> GenerationError {
        if e.is_connect() {
            GenerationError::ServiceUnavailable {
                endpoint: self.url.clone(),
            }
        } else if e.is_timeout() {
            GenerationError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            GenerationError::Other(e.to_string())
        }
    }
}

/// Explain `text` in plain `language`.
///
/// Returns [`GenerationError::EmptyInput`] for empty text without touching
/// the network. The model output is cleaned by
/// [`postprocess::clean_explanation`] before it is returned.
pub async fn simplify(
    client: &OllamaClient,
    text: &ExtractedText,
    language: Language,
) -> Result<Explanation, GenerationError> {
    if text.is_empty() {
        return Err(GenerationError::EmptyInput);
    }

    let prompt = build_prompt(text.as_str(), language);
    let raw = client.generate(&prompt).await?;
    let cleaned = postprocess::clean_explanation(&raw);
    if cleaned.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }

    info!(%language, chars = cleaned.len(), "Explanation generated");
    Ok(Explanation::new(cleaned, language))
}
