//! Provider-agnostic chat domain model
//!
//! The types every provider client, resilience wrapper and handler exchange.
//! Nothing in here is tied to a particular vendor's wire format; translation
//! happens at the edges (`models::wire` for the HTTP surface, the provider
//! clients for upstream APIs).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::utils::RequestContext;

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single conversation turn. Ordering is significant and preserved
/// end-to-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Requested response length/detail hint supported by some upstreams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Low,
    Medium,
    High,
}

/// Structured-output request: `text`, `json_object` or `json_schema` with an
/// attached schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
}

/// A tool the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionTool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionTool {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// Upstream tool-choice contract: either a mode string (`"auto"`, `"none"`,
/// `"required"`) or an object naming one function. Serialized according to
/// the active variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    Mode(String),
    Function(ToolChoiceFunction),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolChoiceFunction {
    #[serde(rename = "type")]
    pub choice_type: String,
    pub function: FunctionName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionName {
    pub name: String,
}

impl ToolChoice {
    /// Convenience constructor for the function-pinning variant.
    pub fn function(name: impl Into<String>) -> Self {
        ToolChoice::Function(ToolChoiceFunction {
            choice_type: "function".to_string(),
            function: FunctionName { name: name.into() },
        })
    }
}

/// How tool calls returned by the model should be resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResolution {
    #[serde(rename = "type")]
    pub resolution_type: String,
}

/// Streaming sub-options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamOptions {
    pub include_usage: Option<bool>,
    pub include_accumulated: Option<bool>,
}

/// Per-call tuning knobs. Every field is optional; `None` means "do not send
/// to upstream".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub stop: Option<Vec<String>>,
    pub verbosity: Option<Verbosity>,

    pub response_format: Option<ResponseFormat>,

    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub logit_bias: Option<HashMap<String, i32>>,
    pub logprobs: Option<bool>,
    pub top_logprobs: Option<u32>,
    pub n: Option<u32>,
    pub seed: Option<i64>,
    pub user: Option<String>,

    pub tools: Option<Vec<Tool>>,
    pub tool_choice: Option<ToolChoice>,
    pub parallel_tool_calls: Option<bool>,
    pub tool_resolution: Option<ToolResolution>,

    pub stream: Option<bool>,
    pub stream_options: Option<StreamOptions>,
}

impl ChatOptions {
    pub fn is_streaming(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

/// Gateway-internal chat request handed to the provider pipeline.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Bare model name; the provider prefix has already been resolved away.
    pub model: String,
    pub messages: Vec<Message>,
    pub options: ChatOptions,
    /// Caller's bearer credential, forwarded to upstreams that accept a
    /// per-request key.
    pub api_key: String,
    /// Cancellation signal shared by every layer handling this request.
    pub context: RequestContext,
}

/// Normalized non-streaming result.
///
/// `content` mirrors choice\[0\]'s text when the upstream returned multiple
/// choices; `raw` keeps the untouched upstream body for pass-through.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub id: String,
    pub model: String,
    pub content: String,
    pub raw: Vec<u8>,
}

/// Token accounting reported by upstreams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Incremental message fragment inside a stream chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delta {
    pub role: Option<String>,
    pub content: Option<String>,
    /// Partial tool-call records, passed through untyped.
    pub tool_calls: Vec<serde_json::Value>,
}

/// One choice slot within a stream chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
    pub logprobs: Option<serde_json::Value>,
}

/// Unified streaming chunk. For any choice index, concatenating the
/// `delta.content` fragments in arrival order reproduces the final message
/// content for that choice.
#[derive(Debug, Clone, Default)]
pub struct StreamChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub system_fingerprint: Option<String>,
    pub service_tier: Option<String>,
    pub choices: Vec<StreamChoice>,
    pub usage: Option<Usage>,
    /// Raw bytes of this chunk as received from the upstream.
    pub raw: Vec<u8>,
}
