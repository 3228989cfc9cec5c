//! HTTP Content Generator
//!
//! Calls a hosted messages-style model API for one chapter at a time and
//! parses the model's JSON reply into [`ChapterContent`].
//! Successive calls rotate over the configured endpoints and models.

use async_trait::async_trait;
use bookgen_core::domain::{ChapterContent, ChapterTask, GeneratedChapter, GenerationParams};
use bookgen_core::error::{AppError, Result};
use bookgen_core::port::{ContentGenerator, GenerationError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::pacer::RequestPacer;

pub const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
pub const DEFAULT_API_VERSION: &str = "2023-06-01";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upstream error bodies are cut to this many characters in error messages
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Chapter params use this model name to defer to the rotation
const ROTATION_MODEL: &str = "default";

const SYSTEM_PROMPT: &str = "You write one chapter of a study book at a time. \
Reply with a single JSON object and nothing else, shaped as \
{\"title\": string, \"summary\": string, \
\"sections\": [{\"heading\": string, \"body\": string}], \
\"vocabulary\": [{\"term\": string, \"reading\": string, \"meaning\": string}], \
\"exercises\": [{\"question\": string, \"answer\": string}]}.";

#[derive(Debug, Clone)]
pub struct HttpGeneratorConfig {
    pub endpoints: Vec<String>,
    pub models: Vec<String>,
    pub api_key: Option<String>,
    pub api_version: String,
    pub request_timeout: Duration,
    /// 0 disables pacing
    pub requests_per_minute: u32,
    pub burst: u32,
}

impl Default for HttpGeneratorConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![DEFAULT_ENDPOINT.to_string()],
            models: vec![DEFAULT_MODEL.to_string()],
            api_key: None,
            api_version: DEFAULT_API_VERSION.to_string(),
            request_timeout: Duration::from_secs(120),
            requests_per_minute: 0,
            burst: 10,
        }
    }
}

pub struct HttpContentGenerator {
    client: Client,
    config: HttpGeneratorConfig,
    cursor: AtomicUsize,
    pacer: Option<RequestPacer>,
}

impl HttpContentGenerator {
    pub fn new(config: HttpGeneratorConfig) -> Result<Self> {
        if config.endpoints.is_empty() {
            return Err(AppError::Config(
                "generator.endpoints must name at least one endpoint".to_string(),
            ));
        }
        if config.models.is_empty() {
            return Err(AppError::Config(
                "generator.models must name at least one model".to_string(),
            ));
        }

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let pacer = (config.requests_per_minute > 0)
            .then(|| RequestPacer::new(config.burst, config.requests_per_minute));

        Ok(Self {
            client,
            config,
            cursor: AtomicUsize::new(0),
            pacer,
        })
    }

    /// Pick the endpoint and model for the next call.
    ///
    /// An explicit model in the chapter params wins over the rotation.
    fn next_target(&self, params: &GenerationParams) -> (&str, String) {
        let n = self.cursor.fetch_add(1, Ordering::Relaxed);
        let endpoint = &self.config.endpoints[n % self.config.endpoints.len()];
        let model = if params.model.is_empty() || params.model == ROTATION_MODEL {
            self.config.models[n % self.config.models.len()].clone()
        } else {
            params.model.clone()
        };
        (endpoint, model)
    }

    fn map_send_error(&self, error: reqwest::Error) -> GenerationError {
        if error.is_timeout() {
            GenerationError::Timeout(self.config.request_timeout.as_millis() as u64)
        } else {
            GenerationError::Transport(error.to_string())
        }
    }
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    async fn generate(&self, task: &ChapterTask) -> std::result::Result<GeneratedChapter, GenerationError> {
        if let Some(pacer) = &self.pacer {
            pacer.acquire().await;
        }

        let (endpoint, model) = self.next_target(&task.params);
        debug!(
            job_id = %task.job_id,
            chapter = task.chapter_number,
            endpoint = %endpoint,
            model = %model,
            "Requesting chapter content"
        );

        let body = MessagesRequest {
            model: &model,
            max_tokens: task.params.max_tokens,
            temperature: task.params.temperature,
            system: SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content: &task.prompt,
            }],
        };

        let mut request = self
            .client
            .post(endpoint)
            .header("anthropic-version", &self.config.api_version)
            .json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await.map_err(|e| self.map_send_error(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            let error = map_status(status.as_u16(), &text);
            warn!(chapter = task.chapter_number, error = %error, "Content request rejected");
            return Err(error);
        }

        let reply: MessagesResponse = serde_json::from_str(&text)
            .map_err(|e| GenerationError::Malformed(format!("response envelope: {}", e)))?;
        let content = parse_chapter_content(&reply.text())?;

        Ok(GeneratedChapter {
            content,
            tokens_used: reply.usage.input_tokens + reply.usage.output_tokens,
            model: reply.model.unwrap_or(model),
        })
    }
}

// Messages API request/response structures
#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    model: Option<String>,
    #[serde(default)]
    usage: Usage,
}

impl MessagesResponse {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Map a non-2xx response to a generation error.
pub(crate) fn map_status(status: u16, body: &str) -> GenerationError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.chars().take(MAX_ERROR_BODY_CHARS).collect());

    match status {
        429 => GenerationError::Quota(message),
        _ => GenerationError::Api { status, message },
    }
}

/// Parse the model's reply into chapter content.
///
/// Tolerates a fenced code block and prose around the JSON object.
pub(crate) fn parse_chapter_content(reply: &str) -> std::result::Result<ChapterContent, GenerationError> {
    let unfenced = strip_code_fence(reply);
    let start = unfenced.find('{');
    let end = unfenced.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &unfenced[start..=end],
        _ => {
            return Err(GenerationError::Malformed(
                "reply contains no JSON object".to_string(),
            ))
        }
    };

    let content: ChapterContent = serde_json::from_str(json)
        .map_err(|e| GenerationError::Malformed(format!("chapter JSON: {}", e)))?;

    if content.title.trim().is_empty() {
        return Err(GenerationError::Malformed("chapter title is empty".to_string()));
    }
    if content.sections.is_empty() {
        return Err(GenerationError::Malformed("chapter has no sections".to_string()));
    }
    Ok(content)
}

fn strip_code_fence(reply: &str) -> &str {
    let Some(open) = reply.find("```") else {
        return reply;
    };
    let after_open = &reply[open + 3..];
    // Skip the info string (e.g. "json") up to the end of the fence line
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    }
}
