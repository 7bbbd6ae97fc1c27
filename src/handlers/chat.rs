//! Chat completions handler
//!
//! Validates the inbound request, resolves the provider chain and dispatches
//! to the streaming or non-streaming path. The non-streaming path re-parses
//! the upstream `raw` bytes into the unified shape; the streaming path
//! re-serializes unified chunks as SSE frames while tracking idle activity
//! and per-choice accumulation.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{error, info, warn};

use crate::handlers::AppState;
use crate::models::chat::{ChatRequest, ChatResponse, StreamChunk};
use crate::models::wire::{
    ChatRequestPayload, ChatResponsePayload, ChoicePayload, MessagePayload, UpstreamChatResponse,
    UsagePayload,
};
use crate::providers::Provider;
use crate::utils::context::{IdleTracker, RequestContext};
use crate::utils::error::{ProviderError, ProviderResult};

/// Query parameters that can toggle behavior when the matching option field
/// is absent from the body.
#[derive(Debug, Default, Deserialize)]
pub struct ChatQuery {
    pub stream: Option<String>,
    pub raw: Option<String>,
    #[serde(rename = "includeAccumulated")]
    pub include_accumulated: Option<String>,
}

fn truthy(value: &str) -> bool {
    value == "true" || value == "1"
}

/// Handle chat completion requests.
///
/// POST /api/v1/chat/completions
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChatQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let api_key = match authorize(&headers) {
        Ok(key) => key,
        Err(err) => return err.into_response(),
    };

    let payload: ChatRequestPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            error!(error = %err, "Failed to decode request");
            return ProviderError::validation("Invalid request body", "invalid_json")
                .into_response();
        }
    };

    if let Err(err) = validate_payload(&payload) {
        return err.into_response();
    }

    let mut options = payload.options.unwrap_or_default();

    // Query parameters only fill in fields the body left absent.
    if options.stream.is_none() {
        if let Some(value) = query.stream.as_deref() {
            options.stream = Some(truthy(value));
        }
    }

    let include_raw = options
        .raw
        .unwrap_or_else(|| query.raw.as_deref().map(truthy).unwrap_or(false));

    let include_accumulated = options.include_accumulated.unwrap_or_else(|| {
        query
            .include_accumulated
            .as_deref()
            .map(truthy)
            .unwrap_or(false)
    });

    let (provider, model) = match state
        .registry
        .resolve(&payload.model, payload.endpoint.as_deref())
    {
        Ok(resolved) => resolved,
        Err(err) => {
            error!(model = %payload.model, error = %err, "Invalid provider/model");
            return err.into_response();
        }
    };

    let ctx = RequestContext::new();
    let request = ChatRequest {
        model,
        messages: payload.messages,
        options: options.into_options(),
        api_key,
        context: ctx.clone(),
    };

    info!(
        provider = provider.name(),
        model = %request.model,
        structured = request.options.response_format.is_some(),
        stream = request.options.is_streaming(),
        "Processing chat request"
    );

    if request.options.is_streaming() {
        handle_streaming_chat(&state, ctx, provider, request, include_raw, include_accumulated)
    } else {
        handle_chat(&state, ctx, provider, request, include_raw, include_accumulated).await
    }
}

/// Extract and check the bearer credential.
fn authorize(headers: &HeaderMap) -> ProviderResult<String> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if auth_header.is_empty() {
        return Err(ProviderError::unauthorized("missing Authorization header"));
    }

    let Some(api_key) = auth_header.strip_prefix("Bearer ") else {
        return Err(ProviderError::validation(
            "invalid Authorization header format",
            "invalid_auth_format",
        ));
    };

    if api_key.is_empty() {
        return Err(ProviderError::unauthorized(
            "missing API key in Authorization header",
        ));
    }

    Ok(api_key.to_string())
}

const MAX_MESSAGES: usize = 1000;

fn validate_payload(payload: &ChatRequestPayload) -> ProviderResult<()> {
    if payload.model.is_empty() {
        return Err(ProviderError::validation("model is required", "missing_model"));
    }

    if payload.messages.is_empty() {
        return Err(ProviderError::validation(
            "messages are required",
            "missing_messages",
        ));
    }

    if payload.messages.len() > MAX_MESSAGES {
        return Err(ProviderError::validation(
            format!("too many messages (max {MAX_MESSAGES})"),
            "too_many_messages",
        ));
    }

    Ok(())
}

/// Non-streaming path: absolute deadline, then re-parse the raw upstream
/// body into the unified shape.
async fn handle_chat(
    state: &AppState,
    ctx: RequestContext,
    provider: Arc<dyn Provider>,
    request: ChatRequest,
    include_raw: bool,
    include_accumulated: bool,
) -> Response {
    let timeout = Duration::from_secs(state.settings.request.timeout_secs);

    let result = tokio::select! {
        result = provider.chat(&request) => result,
        _ = tokio::time::sleep(timeout) => {
            ctx.cancel();
            Err(ProviderError::cancelled("request timed out"))
        }
    };

    let response = match result {
        Ok(response) => response,
        Err(err) => {
            error!(error = %err, "Chat request failed");
            return err.into_response();
        }
    };

    let mut payload = parse_raw_response(&response);

    if include_accumulated {
        payload.content = Some(response.content.clone());
    }

    if include_raw && !response.raw.is_empty() {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&response.raw) {
            payload.raw = Some(value);
        }
    }

    if request.options.response_format.is_some() && !response.content.is_empty() {
        match serde_json::from_str::<serde_json::Value>(&response.content) {
            Ok(parsed) => payload.parsed = Some(parsed),
            Err(err) => {
                warn!(error = %err, "Failed to parse structured response as JSON");
            }
        }
    }

    Json(payload).into_response()
}

fn parse_raw_response(response: &ChatResponse) -> ChatResponsePayload {
    if !response.raw.is_empty() {
        match serde_json::from_slice::<UpstreamChatResponse>(&response.raw) {
            Ok(upstream) => return upstream.into_payload(),
            Err(err) => {
                warn!(error = %err, "Failed to parse raw response, using basic fields");
            }
        }
    }

    ChatResponsePayload {
        id: response.id.clone(),
        object: "chat.completion".to_string(),
        model: response.model.clone(),
        ..Default::default()
    }
}

/// Streaming path: SSE response fed by the provider callback, with idle
/// tracking and per-choice accumulation.
fn handle_streaming_chat(
    state: &AppState,
    ctx: RequestContext,
    provider: Arc<dyn Provider>,
    request: ChatRequest,
    include_raw: bool,
    include_accumulated: bool,
) -> Response {
    let idle_timeout = Duration::from_secs(state.settings.request.idle_timeout_secs);

    let (tx, rx) = mpsc::unbounded_channel::<Result<Event, Infallible>>();

    let idle = IdleTracker::new();
    idle.watch(ctx.clone(), idle_timeout);

    let include_accumulated_in_message = request
        .options
        .stream_options
        .as_ref()
        .and_then(|so| so.include_accumulated)
        .unwrap_or(false);

    tokio::spawn(async move {
        let mut accumulated: HashMap<u32, String> = HashMap::new();
        idle.touch();

        let result = provider
            .chat_stream(&request, &mut |chunk: &StreamChunk| {
                // Activity is recorded for every chunk, including trailing
                // usage-only chunks with no choices.
                idle.touch();

                let payload = stream_chunk_payload(
                    chunk,
                    &mut accumulated,
                    include_accumulated_in_message,
                    include_raw,
                    include_accumulated,
                );

                let json = serde_json::to_string(&payload).map_err(|err| {
                    ProviderError::internal(format!("failed to serialize stream chunk: {err}"))
                })?;

                tx.send(Ok(Event::default().data(json)))
                    .map_err(|_| ProviderError::cancelled("client disconnected"))?;

                Ok(())
            })
            .await;

        match result {
            Ok(()) => {
                let _ = tx.send(Ok(Event::default().data("[DONE]")));
            }
            Err(err) => {
                error!(error = %err, "Streaming chat request failed");
                // One final error event; no [DONE] after a failure.
                let _ = tx.send(Ok(Event::default().data(err.to_body().to_string())));
            }
        }

        // Stops the idle watcher on every exit path.
        ctx.cancel();
    });

    info!("Starting streaming response transmission");

    let stream = UnboundedReceiverStream::new(rx);
    let sse = Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    );

    let mut response = sse.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));

    response
}

/// Build the unified payload for one stream chunk, updating the per-choice
/// accumulator.
fn stream_chunk_payload(
    chunk: &StreamChunk,
    accumulated: &mut HashMap<u32, String>,
    include_accumulated_in_message: bool,
    include_raw: bool,
    include_accumulated: bool,
) -> ChatResponsePayload {
    let mut choices = Vec::with_capacity(chunk.choices.len());

    for choice in &chunk.choices {
        let mut message = MessagePayload {
            role: choice
                .delta
                .role
                .clone()
                .unwrap_or_else(|| "assistant".to_string()),
            content: String::new(),
            ..Default::default()
        };

        if let Some(delta) = &choice.delta.content {
            message.content = delta.clone();

            let entry = accumulated.entry(choice.index).or_default();
            entry.push_str(delta);

            if include_accumulated_in_message && !entry.is_empty() {
                message.accumulated_content = Some(entry.clone());
            }
        }

        choices.push(ChoicePayload {
            index: choice.index,
            message,
            finish_reason: choice.finish_reason.clone().unwrap_or_default(),
            logprobs: None,
        });
    }

    let content = match chunk.choices.first() {
        Some(first) => accumulated.get(&first.index).cloned().unwrap_or_default(),
        None => accumulated.get(&0).cloned().unwrap_or_default(),
    };

    let mut payload = ChatResponsePayload {
        id: chunk.id.clone(),
        object: chunk.object.clone(),
        created: chunk.created,
        model: chunk.model.clone(),
        system_fingerprint: chunk.system_fingerprint.clone(),
        service_tier: chunk.service_tier.clone(),
        choices,
        usage: chunk.usage.map(UsagePayload::from),
        ..Default::default()
    };

    if include_accumulated {
        payload.content = Some(content);
    }

    if include_raw && !chunk.raw.is_empty() {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&chunk.raw) {
            payload.raw = Some(value);
        }
    }

    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{Delta, Message, Role, StreamChoice};

    fn payload_with(model: &str, message_count: usize) -> ChatRequestPayload {
        ChatRequestPayload {
            model: model.to_string(),
            endpoint: None,
            messages: (0..message_count)
                .map(|i| Message::new(Role::User, format!("message {i}")))
                .collect(),
            options: None,
        }
    }

    fn bearer(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn test_authorize() {
        assert!(authorize(&HeaderMap::new()).is_err());

        let err = authorize(&bearer("Basic abc")).unwrap_err();
        assert_eq!(err.code, "invalid_auth_format");
        assert_eq!(err.status_code, 400);

        let err = authorize(&bearer("Bearer ")).unwrap_err();
        assert_eq!(err.status_code, 401);

        let key = authorize(&bearer("Bearer sk-test")).unwrap();
        assert_eq!(key, "sk-test");
    }

    #[test]
    fn test_validate_payload_boundaries() {
        assert!(validate_payload(&payload_with("openai/gpt-4o", 1)).is_ok());
        assert!(validate_payload(&payload_with("openai/gpt-4o", 1000)).is_ok());

        let err = validate_payload(&payload_with("openai/gpt-4o", 1001)).unwrap_err();
        assert_eq!(err.code, "too_many_messages");

        let err = validate_payload(&payload_with("", 1)).unwrap_err();
        assert_eq!(err.code, "missing_model");

        let err = validate_payload(&payload_with("openai/gpt-4o", 0)).unwrap_err();
        assert_eq!(err.code, "missing_messages");
    }

    fn delta_chunk(index: u32, content: &str) -> StreamChunk {
        StreamChunk {
            id: "chunk-1".to_string(),
            object: "chat.completion.chunk".to_string(),
            created: 1_700_000_000,
            model: "gpt-4o".to_string(),
            choices: vec![StreamChoice {
                index,
                delta: Delta {
                    role: None,
                    content: Some(content.to_string()),
                    tool_calls: Vec::new(),
                },
                finish_reason: None,
                logprobs: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_stream_accumulation_per_choice() {
        let mut accumulated = HashMap::new();

        let p1 = stream_chunk_payload(&delta_chunk(0, "he"), &mut accumulated, true, false, false);
        assert_eq!(p1.choices[0].message.content, "he");
        assert_eq!(
            p1.choices[0].message.accumulated_content.as_deref(),
            Some("he")
        );

        let p2 = stream_chunk_payload(&delta_chunk(0, "llo"), &mut accumulated, true, false, false);
        assert_eq!(p2.choices[0].message.content, "llo");
        assert_eq!(
            p2.choices[0].message.accumulated_content.as_deref(),
            Some("hello")
        );

        // A second choice index accumulates independently.
        let p3 = stream_chunk_payload(&delta_chunk(1, "yo"), &mut accumulated, true, false, false);
        assert_eq!(
            p3.choices[0].message.accumulated_content.as_deref(),
            Some("yo")
        );
        assert_eq!(accumulated[&0], "hello");
    }

    #[test]
    fn test_stream_chunk_without_choices_keeps_usage() {
        let chunk = StreamChunk {
            id: "chunk-2".to_string(),
            usage: Some(crate::models::chat::Usage {
                prompt_tokens: 1,
                completion_tokens: 2,
                total_tokens: 3,
            }),
            ..Default::default()
        };

        let mut accumulated = HashMap::new();
        let payload = stream_chunk_payload(&chunk, &mut accumulated, false, false, false);
        assert!(payload.choices.is_empty());
        assert_eq!(payload.usage.unwrap().total_tokens, 3);
    }

    #[test]
    fn test_default_role_is_assistant() {
        let mut accumulated = HashMap::new();
        let payload = stream_chunk_payload(&delta_chunk(0, "x"), &mut accumulated, false, false, false);
        assert_eq!(payload.choices[0].message.role, "assistant");
    }

    #[test]
    fn test_parse_raw_response_falls_back_to_basic_fields() {
        let response = ChatResponse {
            id: "r1".to_string(),
            model: "gpt-4o".to_string(),
            content: "hi".to_string(),
            raw: b"not json".to_vec(),
        };

        let payload = parse_raw_response(&response);
        assert_eq!(payload.id, "r1");
        assert_eq!(payload.object, "chat.completion");
        assert!(payload.choices.is_empty());
    }
}
