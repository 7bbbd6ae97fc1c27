//! HTTP wire formats
//!
//! Two families of shapes live here:
//!
//! * the gateway's own surface (camelCase): the inbound request payload and
//!   the unified response payload returned to clients, for both the sync and
//!   the streaming path;
//! * the upstream openai-compatible shapes (snake_case) used to re-parse the
//!   `raw` bytes a provider hands back.
//!
//! Conversions into the domain model (`models::chat`) happen here so the
//! handler stays thin.

use serde::{Deserialize, Serialize};

use crate::models::chat::{
    ChatOptions, FunctionTool, Message, ResponseFormat, StreamOptions, Tool, ToolChoice,
    ToolResolution, Usage, Verbosity,
};

// ---------------------------------------------------------------------------
// Inbound request payload
// ---------------------------------------------------------------------------

/// Body of `POST /api/v1/chat/completions`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequestPayload {
    #[serde(default)]
    pub model: String,
    /// Required only for endpoint-based providers (e.g. an Azure deployment).
    pub endpoint: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub options: Option<ChatOptionsPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatOptionsPayload {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub stop: Option<Vec<String>>,
    pub verbosity: Option<Verbosity>,

    pub response_format: Option<ResponseFormatPayload>,

    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub logit_bias: Option<std::collections::HashMap<String, i32>>,
    pub logprobs: Option<bool>,
    pub top_logprobs: Option<u32>,
    pub n: Option<u32>,
    pub seed: Option<i64>,
    pub user: Option<String>,

    pub tools: Option<Vec<ToolPayload>>,
    pub tool_choice: Option<ToolChoice>,
    pub parallel_tool_calls: Option<bool>,
    pub tool_resolution: Option<ToolResolutionPayload>,

    pub stream: Option<bool>,
    pub stream_options: Option<StreamOptionsPayload>,
    pub raw: Option<bool>,
    pub include_accumulated: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolPayload {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: Option<FunctionPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionPayload {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolResolutionPayload {
    #[serde(rename = "type")]
    pub resolution_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamOptionsPayload {
    pub include_usage: Option<bool>,
    pub include_accumulated: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseFormatPayload {
    #[serde(rename = "type")]
    pub format_type: String,
    pub schema: Option<serde_json::Value>,
}

impl ChatOptionsPayload {
    /// Convert the payload into domain options, dropping the handler-only
    /// toggles (`raw`, `includeAccumulated`).
    pub fn into_options(self) -> ChatOptions {
        ChatOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
            stop: self.stop,
            verbosity: self.verbosity,
            response_format: self.response_format.map(|f| ResponseFormat {
                format_type: f.format_type,
                schema: f.schema,
            }),
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
            logit_bias: self.logit_bias,
            logprobs: self.logprobs,
            top_logprobs: self.top_logprobs,
            n: self.n,
            seed: self.seed,
            user: self.user,
            tools: self.tools.map(|tools| {
                tools
                    .into_iter()
                    .map(|tool| Tool {
                        tool_type: tool.tool_type,
                        function: tool.function.map(|f| FunctionTool {
                            name: f.name,
                            description: f.description,
                            parameters: f.parameters,
                        }),
                    })
                    .collect()
            }),
            tool_choice: self.tool_choice,
            parallel_tool_calls: self.parallel_tool_calls,
            tool_resolution: self.tool_resolution.map(|r| ToolResolution {
                resolution_type: r.resolution_type,
            }),
            stream: self.stream,
            stream_options: self.stream_options.map(|s| StreamOptions {
                include_usage: s.include_usage,
                include_accumulated: s.include_accumulated,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound unified response payload
// ---------------------------------------------------------------------------

/// Unified response shape for the sync path; the streaming path reuses it
/// with `choices[].message.content` carrying the delta.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponsePayload {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
    pub choices: Vec<ChoicePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsagePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_tier: Option<String>,
    /// Accumulated text, echoed only when `includeAccumulated` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Content parsed as JSON, attached when a response format was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<serde_json::Value>,
    /// Raw upstream body, echoed only when `raw` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoicePayload {
    pub index: u32,
    pub message: MessagePayload,
    #[serde(default)]
    pub finish_reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<LogprobsPayload>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accumulated_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallPayload>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallPayload {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCallPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallPayload {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogprobsPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<LogprobContentPayload>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogprobContentPayload {
    pub token: String,
    pub logprob: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_logprobs: Option<Vec<TopLogprobPayload>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopLogprobPayload {
    pub token: String,
    pub logprob: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsagePayload {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens_details: Option<TokensDetailsPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens_details: Option<TokensDetailsPayload>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokensDetailsPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_prediction_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_prediction_tokens: Option<u32>,
}

impl From<Usage> for UsagePayload {
    fn from(usage: Usage) -> Self {
        UsagePayload {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            prompt_tokens_details: None,
            completion_tokens_details: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Upstream raw shapes (snake_case, openai-compatible)
// ---------------------------------------------------------------------------

/// Full non-streaming upstream response as found in `ChatResponse::raw`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamChatResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    pub system_fingerprint: Option<String>,
    #[serde(default)]
    pub choices: Vec<UpstreamChoice>,
    pub usage: Option<UpstreamUsage>,
    pub service_tier: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub message: UpstreamMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
    pub logprobs: Option<UpstreamLogprobs>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    pub refusal: Option<String>,
    #[serde(default)]
    pub annotations: Vec<serde_json::Value>,
    #[serde(default)]
    pub tool_calls: Vec<UpstreamToolCall>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub call_type: String,
    #[serde(default)]
    pub function: UpstreamFunctionCall,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamFunctionCall {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamLogprobs {
    #[serde(default)]
    pub content: Vec<UpstreamLogprobContent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamLogprobContent {
    pub token: String,
    pub logprob: f64,
    pub bytes: Option<Vec<i64>>,
    #[serde(default)]
    pub top_logprobs: Vec<UpstreamTopLogprob>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamTopLogprob {
    pub token: String,
    pub logprob: f64,
    pub bytes: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
    pub prompt_tokens_details: Option<UpstreamTokensDetails>,
    pub completion_tokens_details: Option<UpstreamTokensDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamTokensDetails {
    pub cached_tokens: Option<u32>,
    pub audio_tokens: Option<u32>,
    pub reasoning_tokens: Option<u32>,
    pub accepted_prediction_tokens: Option<u32>,
    pub rejected_prediction_tokens: Option<u32>,
}

/// A single upstream SSE chunk body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamStreamChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    pub system_fingerprint: Option<String>,
    pub service_tier: Option<String>,
    #[serde(default)]
    pub choices: Vec<UpstreamStreamChoice>,
    pub usage: Option<UpstreamUsage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamStreamChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: UpstreamDelta,
    pub finish_reason: Option<String>,
    pub logprobs: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamDelta {
    pub role: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<serde_json::Value>,
}

/// Error envelope returned by openai-compatible upstreams.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamErrorResponse {
    pub error: UpstreamErrorDetail,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub param: Option<String>,
}

impl UpstreamChatResponse {
    /// Map the upstream shape onto the gateway's camelCase payload.
    pub fn into_payload(self) -> ChatResponsePayload {
        let choices = self
            .choices
            .into_iter()
            .map(|choice| {
                let tool_calls: Vec<ToolCallPayload> = choice
                    .message
                    .tool_calls
                    .into_iter()
                    .map(|tc| ToolCallPayload {
                        id: tc.id,
                        call_type: tc.call_type,
                        function: FunctionCallPayload {
                            name: tc.function.name,
                            arguments: tc.function.arguments,
                        },
                    })
                    .collect();

                let logprobs = choice.logprobs.map(|lp| LogprobsPayload {
                    content: Some(
                        lp.content
                            .into_iter()
                            .map(|entry| LogprobContentPayload {
                                token: entry.token,
                                logprob: entry.logprob,
                                bytes: entry.bytes,
                                top_logprobs: Some(
                                    entry
                                        .top_logprobs
                                        .into_iter()
                                        .map(|top| TopLogprobPayload {
                                            token: top.token,
                                            logprob: top.logprob,
                                            bytes: top.bytes,
                                        })
                                        .collect(),
                                ),
                            })
                            .collect(),
                    ),
                });

                ChoicePayload {
                    index: choice.index,
                    finish_reason: choice.finish_reason.unwrap_or_default(),
                    logprobs,
                    message: MessagePayload {
                        role: choice.message.role,
                        content: choice.message.content.unwrap_or_default(),
                        accumulated_content: None,
                        refusal: choice.message.refusal,
                        annotations: if choice.message.annotations.is_empty() {
                            None
                        } else {
                            Some(choice.message.annotations)
                        },
                        tool_calls: if tool_calls.is_empty() {
                            None
                        } else {
                            Some(tool_calls)
                        },
                    },
                }
            })
            .collect();

        ChatResponsePayload {
            id: self.id,
            object: self.object,
            created: self.created,
            model: self.model,
            system_fingerprint: self.system_fingerprint,
            choices,
            usage: self.usage.map(UpstreamUsage::into_payload),
            service_tier: self.service_tier,
            content: None,
            parsed: None,
            raw: None,
        }
    }
}

impl UpstreamUsage {
    fn into_payload(self) -> UsagePayload {
        UsagePayload {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
            prompt_tokens_details: self.prompt_tokens_details.map(UpstreamTokensDetails::into_payload),
            completion_tokens_details: self
                .completion_tokens_details
                .map(UpstreamTokensDetails::into_payload),
        }
    }
}

impl UpstreamTokensDetails {
    fn into_payload(self) -> TokensDetailsPayload {
        TokensDetailsPayload {
            cached_tokens: self.cached_tokens,
            audio_tokens: self.audio_tokens,
            reasoning_tokens: self.reasoning_tokens,
            accepted_prediction_tokens: self.accepted_prediction_tokens,
            rejected_prediction_tokens: self.rejected_prediction_tokens,
        }
    }
}
