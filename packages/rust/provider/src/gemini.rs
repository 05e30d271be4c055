//! Google Gemini (Generative Language REST API) capability.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use url::Url;

use postforge_shared::{PostforgeError, ProviderConfig, RenderedPrompt, Result};

use crate::Capability;

const USER_AGENT: &str = concat!("postforge/", env!("CARGO_PKG_VERSION"));

/// Calls `models/{model}:generateContent`, optionally with the
/// `google_search` tool for grounded answers.
#[derive(Debug, Clone)]
pub struct GeminiCapability {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    search_model: String,
    temperature: f32,
}

impl GeminiCapability {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Url::parse(&config.base_url).map_err(|e| {
            PostforgeError::config(format!("invalid provider base_url '{}': {e}", config.base_url))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PostforgeError::external(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            search_model: config.search_model.clone(),
            temperature: config.temperature,
        })
    }

    fn endpoint(&self, model: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/models/{model}:generateContent", self.base_url))
            .map_err(|e| PostforgeError::config(format!("invalid model endpoint: {e}")))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    async fn call(&self, model: &str, prompt: &RenderedPrompt, grounded: bool) -> Result<String> {
        debug!(
            model,
            grounded,
            system_len = prompt.system.len(),
            human_len = prompt.human.len(),
            "calling Gemini"
        );

        let body = GenerateRequest {
            system_instruction: (!prompt.system.is_empty()).then(|| Content {
                role: None,
                parts: vec![Part {
                    text: prompt.system.clone(),
                }],
            }),
            contents: vec![Content {
                role: Some("user".into()),
                parts: vec![Part {
                    text: prompt.human.clone(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
            tools: if grounded {
                vec![Tool {
                    google_search: serde_json::Map::new(),
                }]
            } else {
                Vec::new()
            },
        };

        let response = self
            .client
            .post(self.endpoint(model)?)
            .json(&body)
            .send()
            .await
            .map_err(|e| PostforgeError::external(format!("{model}: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!(model, %status, "Gemini API returned error status");
            return Err(PostforgeError::external(format!(
                "{model}: HTTP {status}: {}",
                detail.trim()
            )));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            PostforgeError::external(format!("{model}: malformed response: {}", e.without_url()))
        })?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(PostforgeError::external(format!(
                "{model}: response contained no text"
            )));
        }

        debug!(model, response_len = text.len(), "Gemini call succeeded");
        Ok(text)
    }
}

#[async_trait]
impl Capability for GeminiCapability {
    async fn generate(&self, prompt: &RenderedPrompt) -> Result<String> {
        self.call(&self.model, prompt, false).await
    }

    async fn search_generate(&self, prompt: &RenderedPrompt) -> Result<String> {
        self.call(&self.search_model, prompt, true).await
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Tool {
    google_search: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}
