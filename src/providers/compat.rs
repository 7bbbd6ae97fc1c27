//! OpenAI-compatible upstream client
//!
//! One client implementation serves every vendor whose chat completions API
//! speaks the openai wire dialect; per-vendor differences are limited to base
//! URL, credential source and auth header style. Two shared reqwest clients
//! back all instances: a bounded one for unary calls and one without a total
//! timeout for long-lived streams.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::models::chat::{ChatRequest, ChatResponse, Message, Tool, ToolChoice, Verbosity};
use crate::models::wire::{UpstreamChatResponse, UpstreamErrorResponse};
use crate::providers::sse::{self, SseLineReader};
use crate::providers::{ChunkCallback, Provider};
use crate::utils::context::RequestContext;
use crate::utils::error::{ProviderError, ProviderResult};

/// Upstream response bodies are capped at 10 MiB.
const MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

const USER_AGENT: &str = concat!("aigateway/", env!("CARGO_PKG_VERSION"));

static SHARED_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(50)
        .pool_idle_timeout(Duration::from_secs(90))
        .user_agent(USER_AGENT)
        .build()
        .expect("failed to build shared HTTP client")
});

// No total timeout: streams stay open as long as chunks keep arriving; the
// idle-timeout context is what reaps stalled streams.
static SHARED_STREAM_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(50)
        .pool_idle_timeout(Duration::from_secs(90))
        .user_agent(USER_AGENT)
        .build()
        .expect("failed to build shared streaming HTTP client")
});

/// Settings for one openai-compatible upstream.
#[derive(Debug, Clone, Default)]
pub struct CompatConfig {
    pub base_url: String,
    /// Key fixed at construction; a per-request key takes precedence.
    pub api_key: Option<String>,
    /// Some vendors (Azure) want the key in a custom header instead of
    /// `Authorization: Bearer`.
    pub api_key_header: Option<String>,
    pub extra_headers: Vec<(String, String)>,
}

/// Provider backed by an openai-compatible chat completions API.
#[derive(Debug, Clone)]
pub struct OpenAICompatProvider {
    name: String,
    cfg: CompatConfig,
}

impl OpenAICompatProvider {
    pub fn new(name: impl Into<String>, cfg: CompatConfig) -> Self {
        Self {
            name: name.into(),
            cfg,
        }
    }

    /// Full chat completions URL. Azure deployment URLs already include the
    /// operation path and are used as-is.
    fn endpoint_url(&self) -> String {
        let base = self.cfg.base_url.trim_end_matches('/');
        if base.contains("openai.azure.com") {
            return base.to_string();
        }
        format!("{base}/chat/completions")
    }

    /// Per-request key wins over the one fixed at construction.
    fn effective_key<'a>(&'a self, request: &'a ChatRequest) -> &'a str {
        if !request.api_key.is_empty() {
            &request.api_key
        } else {
            self.cfg.api_key.as_deref().unwrap_or("")
        }
    }

    fn apply_headers(
        &self,
        mut builder: reqwest::RequestBuilder,
        request: &ChatRequest,
    ) -> reqwest::RequestBuilder {
        let key = self.effective_key(request);

        match &self.cfg.api_key_header {
            Some(header) => builder = builder.header(header.as_str(), key),
            None if !key.is_empty() => builder = builder.bearer_auth(key),
            None => {}
        }

        for (name, value) in &self.cfg.extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder
    }
}

#[async_trait]
impl Provider for OpenAICompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, request: &ChatRequest) -> ProviderResult<ChatResponse> {
        let body = to_compat_request(request, false);
        debug!(provider = %self.name, model = %request.model, "Sending chat completion request");

        let builder = self
            .apply_headers(SHARED_CLIENT.post(self.endpoint_url()), request)
            .json(&body);

        let response = send_cancellable(builder, &request.context).await?;
        let status = response.status().as_u16();
        let bytes = read_body_limited(response, &request.context).await?;
        check_error(status, &bytes)?;

        let raw: UpstreamChatResponse = serde_json::from_slice(&bytes)
            .map_err(|err| ProviderError::internal(format!("failed to parse response: {err}")))?;

        let content = raw
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        Ok(ChatResponse {
            id: raw.id,
            model: raw.model,
            content,
            raw: bytes,
        })
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
        on_chunk: ChunkCallback<'_>,
    ) -> ProviderResult<()> {
        let body = to_compat_request(request, true);
        debug!(provider = %self.name, model = %request.model, "Sending streaming chat completion request");

        let builder = self
            .apply_headers(SHARED_STREAM_CLIENT.post(self.endpoint_url()), request)
            .header("Accept", "text/event-stream")
            .json(&body);

        let response = send_cancellable(builder, &request.context).await?;
        let status = response.status().as_u16();

        if !(200..300).contains(&status) {
            let bytes = read_body_limited(response, &request.context).await?;
            check_error(status, &bytes)?;
            // check_error always rejects non-2xx; this is unreachable.
            return Err(ProviderError::internal("unexpected upstream status"));
        }

        let mut reader = SseLineReader::new();
        let mut stream = response.bytes_stream();

        loop {
            let item = tokio::select! {
                _ = request.context.cancelled() => {
                    return Err(request.context.cancellation_error());
                }
                item = stream.next() => item,
            };

            match item {
                None => break,
                Some(Err(err)) => {
                    return Err(ProviderError::internal(format!(
                        "failed to read stream: {err}"
                    )));
                }
                Some(Ok(bytes)) => reader.push(&bytes),
            }

            while let Some(line) = reader.next_line()? {
                if line.trim().is_empty() {
                    continue;
                }

                let Some(data) = sse::data_payload(&line) else {
                    continue;
                };

                if sse::is_done_marker(data) {
                    return Ok(());
                }

                match sse::parse_stream_chunk(data.as_bytes()) {
                    Ok(chunk) => on_chunk(&chunk)?,
                    Err(err) => {
                        // A malformed chunk is dropped rather than killing
                        // the whole stream.
                        warn!(provider = %self.name, error = %err, data, "Failed to parse stream chunk");
                        continue;
                    }
                }
            }
        }

        Ok(())
    }
}

async fn send_cancellable(
    builder: reqwest::RequestBuilder,
    ctx: &RequestContext,
) -> ProviderResult<reqwest::Response> {
    tokio::select! {
        _ = ctx.cancelled() => Err(ctx.cancellation_error()),
        result = builder.send() => result.map_err(|err| {
            ProviderError::service_unavailable(
                format!("failed to execute request: {err}"),
                "request_failed",
            )
        }),
    }
}

/// Read at most [`MAX_RESPONSE_BYTES`] of the body, observing cancellation
/// between reads. Oversized bodies are truncated at the cap.
async fn read_body_limited(
    response: reqwest::Response,
    ctx: &RequestContext,
) -> ProviderResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut stream = response.bytes_stream();

    loop {
        let item = tokio::select! {
            _ = ctx.cancelled() => return Err(ctx.cancellation_error()),
            item = stream.next() => item,
        };

        match item {
            None => break,
            Some(Err(err)) => {
                return Err(ProviderError::internal(format!(
                    "failed to read response: {err}"
                )));
            }
            Some(Ok(bytes)) => {
                let remaining = MAX_RESPONSE_BYTES - out.len();
                let take = remaining.min(bytes.len());
                out.extend_from_slice(&bytes[..take]);
                if take < bytes.len() {
                    break;
                }
            }
        }
    }

    Ok(out)
}

/// Inspect the status code and turn an error body into a [`ProviderError`].
fn check_error(status: u16, body: &[u8]) -> ProviderResult<()> {
    if (200..300).contains(&status) {
        return Ok(());
    }

    if let Ok(parsed) = serde_json::from_slice::<UpstreamErrorResponse>(body) {
        if !parsed.error.message.is_empty() {
            return Err(ProviderError::upstream(
                status,
                parsed.error.message,
                parsed.error.error_type,
                parsed.error.code.unwrap_or_default(),
                parsed.error.param.unwrap_or_default(),
                body.to_vec(),
            ));
        }
    }

    Err(ProviderError::upstream(
        status,
        format!("API returned status {status}"),
        String::new(),
        String::new(),
        String::new(),
        body.to_vec(),
    ))
}

// ---------------------------------------------------------------------------
// Upstream request body
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CompatChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logit_bias: Option<HashMap<String, i32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logprobs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_logprobs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<CompatResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<CompatStreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verbosity: Option<Verbosity>,
}

#[derive(Debug, Serialize)]
struct CompatResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    json_schema: Option<CompatJsonSchema>,
}

#[derive(Debug, Serialize)]
struct CompatJsonSchema {
    name: String,
    schema: serde_json::Value,
    strict: bool,
}

#[derive(Debug, Serialize)]
struct CompatStreamOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    include_usage: Option<bool>,
}

/// Map the domain request onto the upstream body. Absent options are omitted
/// entirely.
fn to_compat_request(request: &ChatRequest, force_stream: bool) -> CompatChatRequest {
    let options = &request.options;

    let response_format = options.response_format.as_ref().map(|format| {
        let json_schema = if format.format_type == "json_schema" {
            format.schema.as_ref().map(|schema| CompatJsonSchema {
                name: "response".to_string(),
                schema: schema.clone(),
                strict: true,
            })
        } else {
            None
        };

        CompatResponseFormat {
            format_type: format.format_type.clone(),
            json_schema,
        }
    });

    let stream_options = options
        .stream_options
        .as_ref()
        .filter(|so| so.include_usage.is_some())
        .map(|so| CompatStreamOptions {
            include_usage: so.include_usage,
        });

    let stream = if force_stream {
        Some(true)
    } else {
        options.stream
    };

    CompatChatRequest {
        model: request.model.clone(),
        messages: request.messages.clone(),
        frequency_penalty: options.frequency_penalty,
        logit_bias: options.logit_bias.clone(),
        logprobs: options.logprobs,
        top_logprobs: options.top_logprobs,
        max_tokens: options.max_tokens,
        n: options.n,
        presence_penalty: options.presence_penalty,
        response_format,
        seed: options.seed,
        stop: options.stop.clone(),
        stream,
        stream_options,
        temperature: options.temperature,
        tool_choice: options.tool_choice.clone(),
        tools: options.tools.clone(),
        top_p: options.top_p,
        user: options.user.clone(),
        parallel_tool_calls: options.parallel_tool_calls,
        verbosity: options.verbosity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{ChatOptions, ResponseFormat, Role};

    fn request_with_options(options: ChatOptions) -> ChatRequest {
        ChatRequest {
            model: "gpt-4o".to_string(),
            messages: vec![Message::new(Role::User, "hi")],
            options,
            api_key: String::new(),
            context: RequestContext::new(),
        }
    }

    #[test]
    fn test_absent_options_are_omitted() {
        let request = request_with_options(ChatOptions::default());
        let body = to_compat_request(&request, false);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["model"], "gpt-4o");
        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("stream").is_none());
        assert!(json.get("tools").is_none());
    }

    #[test]
    fn test_force_stream_overrides_absent_flag() {
        let request = request_with_options(ChatOptions::default());
        let body = to_compat_request(&request, true);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stream"], true);
    }

    #[test]
    fn test_json_schema_response_format() {
        let options = ChatOptions {
            response_format: Some(ResponseFormat {
                format_type: "json_schema".to_string(),
                schema: Some(serde_json::json!({"type": "object"})),
            }),
            ..Default::default()
        };

        let request = request_with_options(options);
        let json = serde_json::to_value(to_compat_request(&request, false)).unwrap();

        assert_eq!(json["response_format"]["type"], "json_schema");
        assert_eq!(json["response_format"]["json_schema"]["name"], "response");
        assert_eq!(json["response_format"]["json_schema"]["strict"], true);
    }

    #[test]
    fn test_endpoint_url_building() {
        let provider = OpenAICompatProvider::new(
            "openai",
            CompatConfig {
                base_url: "https://api.openai.com/v1/".to_string(),
                ..Default::default()
            },
        );
        assert_eq!(
            provider.endpoint_url(),
            "https://api.openai.com/v1/chat/completions"
        );

        let azure = OpenAICompatProvider::new(
            "azure",
            CompatConfig {
                base_url: "https://foo.openai.azure.com/openai/deployments/d/chat/completions?api-version=1".to_string(),
                ..Default::default()
            },
        );
        assert!(azure.endpoint_url().contains("openai.azure.com"));
        assert!(!azure.endpoint_url().ends_with("/chat/completions"));
    }

    #[test]
    fn test_per_request_key_wins() {
        let provider = OpenAICompatProvider::new(
            "openai",
            CompatConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: Some("construction-key".to_string()),
                ..Default::default()
            },
        );

        let mut request = request_with_options(ChatOptions::default());
        assert_eq!(provider.effective_key(&request), "construction-key");

        request.api_key = "request-key".to_string();
        assert_eq!(provider.effective_key(&request), "request-key");
    }

    #[test]
    fn test_check_error_parses_upstream_envelope() {
        let body = br#"{"error":{"message":"quota exceeded","type":"insufficient_quota","code":"quota"}}"#;
        let err = check_error(429, body).unwrap_err();
        assert_eq!(err.status_code, 429);
        assert_eq!(err.message, "quota exceeded");
        assert_eq!(err.error_type, "insufficient_quota");
        assert!(err.raw.is_some());
    }

    #[test]
    fn test_check_error_fallback_message() {
        let err = check_error(502, b"<html>bad gateway</html>").unwrap_err();
        assert_eq!(err.status_code, 502);
        assert_eq!(err.message, "API returned status 502");
    }

    #[test]
    fn test_check_error_accepts_2xx() {
        assert!(check_error(200, b"{}").is_ok());
        assert!(check_error(204, b"").is_ok());
    }
}
