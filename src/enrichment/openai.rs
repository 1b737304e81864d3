//! OpenAI-compatible chat-completions provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capture::ExchangeRecord;
use crate::config::EnrichmentConfig;
use crate::enrichment::provider::{EnrichmentError, EnrichmentProvider};

const SYSTEM_PROMPT: &str = "\
You label HTTP traffic between media automation services (Sonarr, Radarr, \
Prowlarr, download clients). Given one request/response exchange, reply with \
ONE short line: the operation (e.g. indexer search, RSS sync, queue poll, \
series lookup, health check) followed by the notable outcome (e.g. number of \
results, error reason). No preamble, no quotes.";

/// Body previews sent to the provider are cut to this many characters.
const PROMPT_PREVIEW_CHARS: usize = 1500;

/// Longest error body kept from a failed provider call.
const ERROR_BODY_CHARS: usize = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiProvider {
    pub fn new(config: &EnrichmentConfig, api_key: &str) -> Result<Self, EnrichmentError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl EnrichmentProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.model
    }

    async fn annotate(&self, record: &ExchangeRecord) -> Result<String, EnrichmentError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user_prompt(record))],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        tracing::debug!(
            exchange_id = %record.id,
            model = %self.model,
            url = %self.url,
            "Sending enrichment request"
        );

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(EnrichmentError::Status {
                status: status.as_u16(),
                body: truncate(&body, ERROR_BODY_CHARS).to_string(),
            });
        }

        parse_completion(&body)
    }
}

/// Extract the first choice's content from a completion response body.
fn parse_completion(body: &str) -> Result<String, EnrichmentError> {
    let parsed: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| EnrichmentError::Malformed(e.to_string()))?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| EnrichmentError::Malformed("no choices in response".to_string()))?;

    let label = content.trim();
    if label.is_empty() {
        return Err(EnrichmentError::Malformed("empty completion".to_string()));
    }
    Ok(label.to_string())
}

fn user_prompt(record: &ExchangeRecord) -> String {
    let mut lines = vec![format!("Request: {} {}", record.method, record.path)];
    if let Some(query) = &record.query {
        lines.push(format!("Query: {}", query));
    }
    match record.response_status {
        Some(status) => lines.push(format!("Status: {}", status)),
        None => lines.push("Status: none".to_string()),
    }
    if let Some(error) = &record.error {
        lines.push(format!("Proxy error: {}", error));
    }
    lines.push(format!("Request body ({} bytes):", record.request_body_size));
    if let Some(preview) = &record.request_body_preview {
        lines.push(truncate(preview, PROMPT_PREVIEW_CHARS).to_string());
    }
    lines.push(format!("Response body ({} bytes):", record.response_body_size));
    if let Some(preview) = &record.response_body_preview {
        lines.push(truncate(preview, PROMPT_PREVIEW_CHARS).to_string());
    }
    lines.join("\n")
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
